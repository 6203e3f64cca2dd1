use hmac::{Hmac, Mac};
use sha2::{Digest, Sha256, Sha384, Sha512};

use crate::crypto::ids::DigestId;
use crate::crypto::CryptoError;

pub const SHA256_LEN: usize = 32;

pub fn sha256(data: &[u8]) -> [u8; SHA256_LEN] {
    Sha256::digest(data).into()
}

impl DigestId {
    /// Hashes the concatenation of `parts`.
    pub fn digest(self, parts: &[&[u8]]) -> Vec<u8> {
        match self {
            DigestId::Sha256 => digest_parts::<Sha256>(parts),
            DigestId::Sha384 => digest_parts::<Sha384>(parts),
            DigestId::Sha512 => digest_parts::<Sha512>(parts),
        }
    }

    pub fn hmac(self, key: &[u8], data: &[u8]) -> Result<Vec<u8>, CryptoError> {
        let tag = match self {
            DigestId::Sha256 => {
                let mut mac = new_hmac::<Hmac<Sha256>>(key)?;
                mac.update(data);
                mac.finalize().into_bytes().to_vec()
            }
            DigestId::Sha384 => {
                let mut mac = new_hmac::<Hmac<Sha384>>(key)?;
                mac.update(data);
                mac.finalize().into_bytes().to_vec()
            }
            DigestId::Sha512 => {
                let mut mac = new_hmac::<Hmac<Sha512>>(key)?;
                mac.update(data);
                mac.finalize().into_bytes().to_vec()
            }
        };
        Ok(tag)
    }

    /// Constant-time HMAC check of `tag` over `data`.
    pub fn verify_hmac(self, key: &[u8], data: &[u8], tag: &[u8]) -> Result<bool, CryptoError> {
        let ok = match self {
            DigestId::Sha256 => {
                let mut mac = new_hmac::<Hmac<Sha256>>(key)?;
                mac.update(data);
                mac.verify_slice(tag).is_ok()
            }
            DigestId::Sha384 => {
                let mut mac = new_hmac::<Hmac<Sha384>>(key)?;
                mac.update(data);
                mac.verify_slice(tag).is_ok()
            }
            DigestId::Sha512 => {
                let mut mac = new_hmac::<Hmac<Sha512>>(key)?;
                mac.update(data);
                mac.verify_slice(tag).is_ok()
            }
        };
        Ok(ok)
    }
}

/// Content-key digest stored in v2 recipient records:
/// `h = H(key)`, then `h = H(h || be32(i))` for `i` in `1..=rounds`.
pub fn iterated_key_digest(digest: DigestId, key: &[u8], rounds: u32) -> Vec<u8> {
    let mut h = digest.digest(&[key]);
    for i in 1..=rounds {
        h = digest.digest(&[&h, &i.to_be_bytes()]);
    }
    h
}

fn digest_parts<D: Digest>(parts: &[&[u8]]) -> Vec<u8> {
    let mut hasher = D::new();
    for part in parts {
        hasher.update(part);
    }
    hasher.finalize().to_vec()
}

fn new_hmac<M: Mac + hmac::digest::KeyInit>(key: &[u8]) -> Result<M, CryptoError> {
    <M as Mac>::new_from_slice(key).map_err(|_| CryptoError::InvalidKeyLength {
        expected: 0,
        found: key.len(),
    })
}
