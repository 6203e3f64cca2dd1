use thiserror::Error;

pub mod aead;
pub mod cipher;
pub mod hash;
pub mod ids;
pub mod kdf;
pub mod public_key;

#[derive(Debug, Error)]
pub enum CryptoError {
    #[error("invalid key length: expected {expected}, found {found}")]
    InvalidKeyLength { expected: usize, found: usize },
    #[error("invalid nonce length: expected {expected}, found {found}")]
    InvalidNonceLength { expected: usize, found: usize },
    #[error("invalid tag length: expected {expected}, found {found}")]
    InvalidTagLength { expected: usize, found: usize },
    #[error("invalid KDF iteration count: {0}")]
    InvalidIterations(u32),
    #[error("invalid peer public key")]
    InvalidPeerKey,
    #[error("private key parse error: {0}")]
    KeyParse(String),
    #[error("key encoding error: {0}")]
    KeyEncode(String),
    #[error("unsupported private key: {0}")]
    UnsupportedKey(String),
    #[error("unsupported algorithm: {0}")]
    UnsupportedAlgorithm(String),
    #[error("{0} is not an AEAD cipher")]
    NotAead(&'static str),
    #[error("invalid padding")]
    InvalidPadding,
    #[error("authentication failed")]
    AuthFailed,
}
