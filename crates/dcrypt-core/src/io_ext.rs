use std::io::{self, Read, Write};

pub const COPY_BUFFER_LEN: usize = 8192;

/// Tracks how many bytes have been pulled through the inner reader.
///
/// Header length checks compare against this offset, so they work on
/// non-seekable input such as stdin.
#[derive(Debug)]
pub struct CountingReader<R> {
    inner: R,
    position: u64,
}

impl<R: Read> CountingReader<R> {
    pub fn new(inner: R) -> Self {
        Self { inner, position: 0 }
    }

    pub fn position(&self) -> u64 {
        self.position
    }

    pub fn get_mut(&mut self) -> &mut R {
        &mut self.inner
    }

    pub fn into_inner(self) -> R {
        self.inner
    }
}

impl<R: Read> Read for CountingReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let read = self.inner.read(buf)?;
        self.position += read as u64;
        Ok(read)
    }
}

pub fn read_exact_or_err<R: Read + ?Sized>(reader: &mut R, buf: &mut [u8]) -> io::Result<()> {
    reader.read_exact(buf)
}

/// Copies until EOF, passing every chunk through `transform` first.
pub fn copy_transform<R, W, F>(reader: &mut R, writer: &mut W, mut transform: F) -> io::Result<u64>
where
    R: Read + ?Sized,
    W: Write + ?Sized,
    F: FnMut(&mut [u8]),
{
    let mut buffer = [0u8; COPY_BUFFER_LEN];
    let mut total = 0u64;

    loop {
        let read = match reader.read(&mut buffer) {
            Ok(0) => break,
            Ok(read) => read,
            Err(err) if err.kind() == io::ErrorKind::Interrupted => continue,
            Err(err) => return Err(err),
        };
        transform(&mut buffer[..read]);
        writer.write_all(&buffer[..read])?;
        total += read as u64;
    }

    Ok(total)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn counting_reader_tracks_offset() {
        let mut reader = CountingReader::new(Cursor::new(vec![1u8, 2, 3, 4, 5]));
        let mut buf = [0u8; 3];
        read_exact_or_err(&mut reader, &mut buf).unwrap();
        assert_eq!(reader.position(), 3);
        let mut rest = Vec::new();
        reader.read_to_end(&mut rest).unwrap();
        assert_eq!(reader.position(), 5);
    }

    #[test]
    fn copy_transform_spans_chunks() {
        let input = vec![0x0fu8; COPY_BUFFER_LEN * 2 + 17];
        let mut out = Vec::new();
        let copied =
            copy_transform(&mut Cursor::new(&input), &mut out, |chunk| {
                chunk.iter_mut().for_each(|b| *b ^= 0xff)
            })
            .unwrap();
        assert_eq!(copied, input.len() as u64);
        assert!(out.iter().all(|b| *b == 0xf0));
    }
}
