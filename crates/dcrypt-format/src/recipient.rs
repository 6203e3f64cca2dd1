use dcrypt_core::crypto::public_key::{PrivateKey, FINGERPRINT_LEN};
use dcrypt_core::ct_eq;

use crate::container::{ContainerV2, FormatError};

/// Which header record a private key was matched to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecipientMatch {
    pub index: usize,
    /// `false` for v1 files, whose single record is used without a
    /// fingerprint check.
    pub verified: bool,
}

pub fn provided_fingerprint(key: &PrivateKey) -> Result<[u8; FINGERPRINT_LEN], FormatError> {
    Ok(key.fingerprint()?)
}

pub fn find_recipient(
    container: &ContainerV2,
    fingerprint: &[u8],
) -> Result<RecipientMatch, FormatError> {
    if !container.header_len_matches() {
        return Err(FormatError::HeaderLengthMismatch {
            expected: container.header_len,
            found: container.consumed,
        });
    }

    container
        .recipients
        .iter()
        .position(|record| ct_eq(&record.fingerprint, fingerprint))
        .map(|index| RecipientMatch {
            index,
            verified: true,
        })
        .ok_or(FormatError::RecipientNotFound)
}

pub fn implicit_v1_recipient() -> RecipientMatch {
    RecipientMatch {
        index: 0,
        verified: false,
    }
}
