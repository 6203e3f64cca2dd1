use std::io::{self, Read};

use dcrypt_core::crypto::ids::AlgorithmId;
use dcrypt_core::der::read_oid;
use dcrypt_core::io_ext::{read_exact_or_err, CountingReader};
use tracing::debug;

use crate::container::{
    Container, ContainerFlags, ContainerV1, ContainerV2, FormatError, KeyType, RecipientRecord,
    FINGERPRINT_LEN, MAGIC, MAX_FIELD_LEN, V1_HEADER_OVERHEAD, VERSION_1, VERSION_2,
};

/// Parses the magic, version and header. On success the reader is
/// positioned at the first payload byte.
pub fn read_container<R: Read>(reader: &mut CountingReader<R>) -> Result<Container, FormatError> {
    let mut magic = [0u8; MAGIC.len()];
    read_exact_truncated(reader, &mut magic)?;
    if magic != MAGIC {
        return Err(FormatError::InvalidMagic { found: magic });
    }

    match read_u8(reader)? {
        VERSION_1 => read_v1(reader).map(Container::V1),
        VERSION_2 => read_v2(reader).map(Container::V2),
        other => Err(FormatError::UnsupportedVersion(other)),
    }
}

fn read_v1<R: Read>(reader: &mut CountingReader<R>) -> Result<ContainerV1, FormatError> {
    let declared = read_u16(reader)?;
    let ephemeral_key = read_field_u16(reader)?;
    let fingerprint = read_field_u16(reader)?;
    let key_digest = read_field_u16(reader)?;
    let wrapped_key = read_field_u16(reader)?;
    let reserved = read_u16(reader)?;

    let container = ContainerV1 {
        header_len: u64::from(declared) + V1_HEADER_OVERHEAD,
        recipient: RecipientRecord {
            key_type: KeyType::Ec,
            fingerprint,
            ephemeral_key,
            wrapped_key,
            key_digest,
        },
        reserved,
        consumed: reader.position(),
    };
    debug!(
        header_len = container.header_len,
        consumed = container.consumed,
        "read v1 header"
    );
    Ok(container)
}

fn read_v2<R: Read>(reader: &mut CountingReader<R>) -> Result<ContainerV2, FormatError> {
    let flags = ContainerFlags::from_bits(read_u32(reader)?);
    let header_len = u64::from(read_u32(reader)?);
    let (cipher, _) = read_oid(reader)?;
    let (digest, _) = read_oid(reader)?;
    let kdf_rounds = read_u32(reader)?;
    let derived_key_len = read_u32(reader)?;
    let count = read_u8(reader)?;

    let mut recipients = Vec::with_capacity(count as usize);
    for _ in 0..count {
        let key_type = KeyType::try_from(read_u8(reader)?)?;
        let mut fingerprint = vec![0u8; FINGERPRINT_LEN];
        read_exact_truncated(reader, &mut fingerprint)?;
        let ephemeral_key = read_field_u32(reader)?;
        let wrapped_key = read_field_u32(reader)?;
        let key_digest = read_field_u32(reader)?;
        recipients.push(RecipientRecord {
            key_type,
            fingerprint,
            ephemeral_key,
            wrapped_key,
            key_digest,
        });
    }

    let container = ContainerV2 {
        flags,
        header_len,
        cipher: AlgorithmId::from_oid(cipher),
        digest: AlgorithmId::from_oid(digest),
        kdf_rounds,
        derived_key_len,
        recipients,
        consumed: reader.position(),
    };
    debug!(
        header_len = container.header_len,
        consumed = container.consumed,
        recipients = container.recipients.len(),
        cipher = %container.cipher,
        "read v2 header"
    );
    Ok(container)
}

fn read_field_u16<R: Read>(reader: &mut R) -> Result<Vec<u8>, FormatError> {
    let len = read_u16(reader)? as usize;
    read_field(reader, len)
}

fn read_field_u32<R: Read>(reader: &mut R) -> Result<Vec<u8>, FormatError> {
    let len = read_u32(reader)? as usize;
    read_field(reader, len)
}

fn read_field<R: Read>(reader: &mut R, len: usize) -> Result<Vec<u8>, FormatError> {
    if len > MAX_FIELD_LEN {
        return Err(FormatError::FieldTooLarge(len));
    }
    let mut field = vec![0u8; len];
    read_exact_truncated(reader, &mut field)?;
    Ok(field)
}

fn read_exact_truncated<R: Read>(reader: &mut R, buf: &mut [u8]) -> Result<(), FormatError> {
    match read_exact_or_err(reader, buf) {
        Ok(()) => Ok(()),
        Err(err) if err.kind() == io::ErrorKind::UnexpectedEof => Err(FormatError::Truncated),
        Err(err) => Err(FormatError::Io(err)),
    }
}

fn read_u8<R: Read>(reader: &mut R) -> Result<u8, FormatError> {
    let mut buf = [0u8; 1];
    read_exact_truncated(reader, &mut buf)?;
    Ok(buf[0])
}

fn read_u16<R: Read>(reader: &mut R) -> Result<u16, FormatError> {
    let mut buf = [0u8; 2];
    read_exact_truncated(reader, &mut buf)?;
    Ok(u16::from_be_bytes(buf))
}

fn read_u32<R: Read>(reader: &mut R) -> Result<u32, FormatError> {
    let mut buf = [0u8; 4];
    read_exact_truncated(reader, &mut buf)?;
    Ok(u32::from_be_bytes(buf))
}
