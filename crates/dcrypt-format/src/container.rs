use std::fmt;
use std::io;

use dcrypt_core::crypto::ids::{AlgorithmId, CipherId, DigestId};
use dcrypt_core::{CryptoError, DerError};
use thiserror::Error;

pub const MAGIC: [u8; 9] = *b"CRYPTED\x03\x07";

pub const VERSION_1: u8 = 1;
pub const VERSION_2: u8 = 2;

/// A v1 header declares `L`; the full header is `L + 12` bytes.
pub const V1_HEADER_OVERHEAD: u64 = 12;
pub const FINGERPRINT_LEN: usize = 32;
pub const MAX_FIELD_LEN: usize = 64 * 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ContainerFlags(u32);

impl ContainerFlags {
    pub const HMAC_INTEGRITY: u32 = 0x01;
    pub const AEAD_INTEGRITY: u32 = 0x02;
    pub const NO_INTEGRITY: u32 = 0x04;
    pub const VERSION_1_ENCRYPTION: u32 = 0x08;
    pub const SAME_CIPHER_FOR_KEY_AND_DATA: u32 = 0x10;

    const NAMES: [(u32, &'static str); 5] = [
        (Self::HMAC_INTEGRITY, "hmac-integrity"),
        (Self::AEAD_INTEGRITY, "aead-integrity"),
        (Self::NO_INTEGRITY, "no-integrity"),
        (Self::VERSION_1_ENCRYPTION, "version-1-encryption"),
        (Self::SAME_CIPHER_FOR_KEY_AND_DATA, "same-cipher-for-key-and-data"),
    ];

    pub fn from_bits(bits: u32) -> Self {
        Self(bits)
    }

    pub fn bits(self) -> u32 {
        self.0
    }

    pub fn contains(self, flag: u32) -> bool {
        self.0 & flag == flag
    }

    pub fn names(self) -> Vec<&'static str> {
        Self::NAMES
            .iter()
            .filter(|(bit, _)| self.contains(*bit))
            .map(|(_, name)| *name)
            .collect()
    }

    pub fn unknown_bits(self) -> u32 {
        let known = Self::NAMES.iter().fold(0, |acc, (bit, _)| acc | bit);
        self.0 & !known
    }
}

impl fmt::Display for ContainerFlags {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#010x}", self.0)?;
        let mut names: Vec<String> = self.names().iter().map(|n| n.to_string()).collect();
        if self.unknown_bits() != 0 {
            names.push(format!("unknown {:#x}", self.unknown_bits()));
        }
        if !names.is_empty() {
            write!(f, " ({})", names.join(", "))?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyType {
    Rsa = 1,
    Ec = 2,
}

impl KeyType {
    pub fn name(self) -> &'static str {
        match self {
            KeyType::Rsa => "RSA",
            KeyType::Ec => "EC",
        }
    }
}

impl TryFrom<u8> for KeyType {
    type Error = FormatError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            1 => Ok(KeyType::Rsa),
            2 => Ok(KeyType::Ec),
            other => Err(FormatError::InvalidKeyType(other)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecipientRecord {
    pub key_type: KeyType,
    pub fingerprint: Vec<u8>,
    pub ephemeral_key: Vec<u8>,
    pub wrapped_key: Vec<u8>,
    pub key_digest: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContainerV1 {
    pub header_len: u64,
    pub recipient: RecipientRecord,
    pub reserved: u16,
    pub consumed: u64,
}

impl ContainerV1 {
    pub const CIPHER: CipherId = CipherId::Aes256Ctr;
    pub const DIGEST: DigestId = DigestId::Sha256;

    pub fn header_len_matches(&self) -> bool {
        self.header_len == self.consumed
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContainerV2 {
    pub flags: ContainerFlags,
    pub header_len: u64,
    pub cipher: AlgorithmId,
    pub digest: AlgorithmId,
    pub kdf_rounds: u32,
    pub derived_key_len: u32,
    pub recipients: Vec<RecipientRecord>,
    pub consumed: u64,
}

impl ContainerV2 {
    pub fn header_len_matches(&self) -> bool {
        self.header_len == self.consumed
    }

    pub fn cipher_id(&self) -> Result<CipherId, FormatError> {
        CipherId::try_from(&self.cipher).map_err(|_| FormatError::Unsupported(self.cipher.to_string()))
    }

    pub fn digest_id(&self) -> Result<DigestId, FormatError> {
        DigestId::try_from(&self.digest).map_err(|_| FormatError::Unsupported(self.digest.to_string()))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Container {
    V1(ContainerV1),
    V2(ContainerV2),
}

impl Container {
    pub fn version(&self) -> u8 {
        match self {
            Container::V1(_) => VERSION_1,
            Container::V2(_) => VERSION_2,
        }
    }

    pub fn header_len(&self) -> u64 {
        match self {
            Container::V1(c) => c.header_len,
            Container::V2(c) => c.header_len,
        }
    }

    /// Stream offset right after the last header field.
    pub fn consumed(&self) -> u64 {
        match self {
            Container::V1(c) => c.consumed,
            Container::V2(c) => c.consumed,
        }
    }

    pub fn recipients(&self) -> &[RecipientRecord] {
        match self {
            Container::V1(c) => std::slice::from_ref(&c.recipient),
            Container::V2(c) => &c.recipients,
        }
    }

    /// Findings that do not stop decoding. A v2 length mismatch is not
    /// listed here: it fails recipient matching instead.
    pub fn header_warnings(&self) -> Vec<Warning> {
        let mut warnings = Vec::new();
        if let Container::V1(c) = self {
            if c.reserved != 0 {
                warnings.push(Warning::ReservedNonZero(c.reserved));
            }
            if !c.header_len_matches() {
                warnings.push(Warning::HeaderLengthMismatch {
                    expected: c.header_len,
                    found: c.consumed,
                });
            }
        }
        warnings
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Warning {
    #[error("reserved header field is {0:#06x}, expected 0")]
    ReservedNonZero(u16),
    #[error("header length mismatch: header says {expected}, read {found}")]
    HeaderLengthMismatch { expected: u64, found: u64 },
    #[error("content key digest does not match")]
    KeyDigestMismatch,
    #[error("declared derived key length {declared} is shorter than the {needed} bytes used")]
    DerivedKeyLengthShort { declared: usize, needed: usize },
    #[error("payload integrity check failed")]
    IntegrityMismatch,
}

#[derive(Debug, Error)]
pub enum FormatError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
    #[error("crypto error: {0}")]
    Crypto(#[from] CryptoError),
    #[error("DER error: {0}")]
    Der(DerError),
    #[error("truncated input")]
    Truncated,
    #[error("invalid magic")]
    InvalidMagic { found: [u8; 9] },
    #[error("unsupported version: {0}")]
    UnsupportedVersion(u8),
    #[error("invalid recipient key type: {0}")]
    InvalidKeyType(u8),
    #[error("header field too large: {0} bytes")]
    FieldTooLarge(usize),
    #[error("payload too short: {found} bytes, need at least {needed}")]
    PayloadTooShort { found: usize, needed: usize },
    #[error("content key too short: {found} bytes, need {needed}")]
    ContentKeyTooShort { found: usize, needed: usize },
    #[error("invalid KDF rounds: {0}")]
    InvalidKdfRounds(u32),
    #[error("declared derived-key length {declared} exceeds {max} bytes")]
    DerivedKeyTooLong { declared: u32, max: u32 },
    #[error("header length mismatch: header says {expected}, read {found}")]
    HeaderLengthMismatch { expected: u64, found: u64 },
    #[error("no recipient matches the private key")]
    RecipientNotFound,
    #[error("content key verification failed")]
    KeyVerification,
    #[error("authentication tag mismatch")]
    TagMismatch,
    #[error("payload integrity check failed")]
    IntegrityMismatch,
    #[error("a private key is required to decrypt")]
    MissingPrivateKey,
    #[error("unsupported: {0}")]
    Unsupported(String),
}

impl FormatError {
    /// Malformed or truncated input, as opposed to key or integrity failures.
    pub fn is_format_error(&self) -> bool {
        matches!(
            self,
            FormatError::Truncated
                | FormatError::InvalidMagic { .. }
                | FormatError::Der(_)
                | FormatError::InvalidKeyType(_)
                | FormatError::FieldTooLarge(_)
                | FormatError::PayloadTooShort { .. }
                | FormatError::ContentKeyTooShort { .. }
                | FormatError::InvalidKdfRounds(_)
                | FormatError::DerivedKeyTooLong { .. }
        )
    }
}

impl From<DerError> for FormatError {
    fn from(err: DerError) -> Self {
        match err {
            DerError::Truncated => FormatError::Truncated,
            DerError::Io(err) => FormatError::Io(err),
            other => FormatError::Der(other),
        }
    }
}
