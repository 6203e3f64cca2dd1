//! Stream-level DER reading.
//!
//! v2 headers embed algorithm identifiers as bare DER elements inside a
//! byte stream whose length is only known after the fact, so elements are
//! read tag by tag from any `Read`. Content decoding is left to `pkcs8`.

use std::io::{self, Read};

use pkcs8::ObjectIdentifier;
use thiserror::Error;

pub const TAG_OBJECT_IDENTIFIER: u8 = 0x06;

/// Long-form lengths wider than this are rejected.
pub const MAX_LENGTH_OCTETS: usize = 4;
pub const MAX_ELEMENT_LEN: usize = 64 * 1024;

#[derive(Debug, Error)]
pub enum DerError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
    #[error("truncated DER element")]
    Truncated,
    #[error("unexpected DER tag: expected {expected:#04x}, found {found:#04x}")]
    UnexpectedTag { expected: u8, found: u8 },
    #[error("unsupported DER length octet: {0:#04x}")]
    UnsupportedLength(u8),
    #[error("DER element too large: {0} bytes")]
    TooLarge(usize),
    #[error("invalid object identifier")]
    InvalidOid,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DerElement {
    pub tag: u8,
    pub content: Vec<u8>,
    /// Bytes consumed from the stream: tag, length octets and content.
    pub encoded_len: usize,
}

pub fn read_element<R: Read>(reader: &mut R) -> Result<DerElement, DerError> {
    let tag = read_byte(reader)?;
    let (len, len_octets) = read_length(reader)?;
    if len > MAX_ELEMENT_LEN {
        return Err(DerError::TooLarge(len));
    }

    let mut content = vec![0u8; len];
    read_exact_truncated(reader, &mut content)?;

    Ok(DerElement {
        tag,
        content,
        encoded_len: 1 + len_octets + len,
    })
}

/// Reads one OBJECT IDENTIFIER element, returning it with its encoded size.
pub fn read_oid<R: Read>(reader: &mut R) -> Result<(ObjectIdentifier, usize), DerError> {
    let element = read_element(reader)?;
    if element.tag != TAG_OBJECT_IDENTIFIER {
        return Err(DerError::UnexpectedTag {
            expected: TAG_OBJECT_IDENTIFIER,
            found: element.tag,
        });
    }
    let oid =
        ObjectIdentifier::from_bytes(&element.content).map_err(|_| DerError::InvalidOid)?;
    Ok((oid, element.encoded_len))
}

fn read_length<R: Read>(reader: &mut R) -> Result<(usize, usize), DerError> {
    let first = read_byte(reader)?;
    if first & 0x80 == 0 {
        return Ok((first as usize, 1));
    }

    let count = (first & 0x7f) as usize;
    if count == 0 || count > MAX_LENGTH_OCTETS {
        return Err(DerError::UnsupportedLength(first));
    }

    let mut len = 0usize;
    for _ in 0..count {
        len = (len << 8) | read_byte(reader)? as usize;
    }
    Ok((len, 1 + count))
}

fn read_byte<R: Read>(reader: &mut R) -> Result<u8, DerError> {
    let mut buf = [0u8; 1];
    read_exact_truncated(reader, &mut buf)?;
    Ok(buf[0])
}

fn read_exact_truncated<R: Read>(reader: &mut R, buf: &mut [u8]) -> Result<(), DerError> {
    match reader.read_exact(buf) {
        Ok(()) => Ok(()),
        Err(err) if err.kind() == io::ErrorKind::UnexpectedEof => Err(DerError::Truncated),
        Err(err) => Err(DerError::Io(err)),
    }
}
