use aes_gcm::aead::{AeadInPlace, KeyInit, Nonce, Tag};
use aes_gcm::{Aes128Gcm, Aes256Gcm};
use chacha20poly1305::ChaCha20Poly1305;
use zeroize::Zeroizing;

use crate::crypto::ids::CipherId;
use crate::crypto::CryptoError;

pub const AEAD_NONCE_LEN: usize = 12;
pub const AEAD_TAG_LEN: usize = 16;

/// Authenticated decryption where the tag is a required argument, so a
/// caller cannot obtain plaintext without it being checked.
pub trait AeadCipher {
    fn set_aad(&mut self, aad: &[u8]);

    fn decrypt_and_verify(
        &self,
        ciphertext: &[u8],
        tag: &[u8],
    ) -> Result<Zeroizing<Vec<u8>>, CryptoError>;
}

pub struct AeadDecryptor {
    cipher: CipherId,
    key: Zeroizing<Vec<u8>>,
    nonce: [u8; AEAD_NONCE_LEN],
    aad: Vec<u8>,
}

impl AeadDecryptor {
    pub fn new(cipher: CipherId, key: &[u8], nonce: &[u8]) -> Result<Self, CryptoError> {
        if !cipher.is_aead() {
            return Err(CryptoError::NotAead(cipher.name()));
        }
        if key.len() != cipher.key_len() {
            return Err(CryptoError::InvalidKeyLength {
                expected: cipher.key_len(),
                found: key.len(),
            });
        }
        let nonce: [u8; AEAD_NONCE_LEN] =
            nonce
                .try_into()
                .map_err(|_| CryptoError::InvalidNonceLength {
                    expected: AEAD_NONCE_LEN,
                    found: nonce.len(),
                })?;

        Ok(Self {
            cipher,
            key: Zeroizing::new(key.to_vec()),
            nonce,
            aad: Vec::new(),
        })
    }
}

impl AeadCipher for AeadDecryptor {
    fn set_aad(&mut self, aad: &[u8]) {
        self.aad = aad.to_vec();
    }

    fn decrypt_and_verify(
        &self,
        ciphertext: &[u8],
        tag: &[u8],
    ) -> Result<Zeroizing<Vec<u8>>, CryptoError> {
        if tag.len() != AEAD_TAG_LEN {
            return Err(CryptoError::InvalidTagLength {
                expected: AEAD_TAG_LEN,
                found: tag.len(),
            });
        }

        let mut buffer = Zeroizing::new(ciphertext.to_vec());
        match self.cipher {
            CipherId::Aes128Gcm => {
                let aead = Aes128Gcm::new_from_slice(&self.key).map_err(|_| self.key_error())?;
                open_detached(&aead, &self.nonce, &self.aad, buffer.as_mut_slice(), tag)?
            }
            CipherId::Aes256Gcm => {
                let aead = Aes256Gcm::new_from_slice(&self.key).map_err(|_| self.key_error())?;
                open_detached(&aead, &self.nonce, &self.aad, buffer.as_mut_slice(), tag)?
            }
            CipherId::ChaCha20Poly1305 => {
                let aead =
                    ChaCha20Poly1305::new_from_slice(&self.key).map_err(|_| self.key_error())?;
                open_detached(&aead, &self.nonce, &self.aad, buffer.as_mut_slice(), tag)?
            }
            other => return Err(CryptoError::NotAead(other.name())),
        }
        Ok(buffer)
    }
}

impl AeadDecryptor {
    fn key_error(&self) -> CryptoError {
        CryptoError::InvalidKeyLength {
            expected: self.cipher.key_len(),
            found: self.key.len(),
        }
    }
}

fn open_detached<A: AeadInPlace>(
    aead: &A,
    nonce: &[u8],
    aad: &[u8],
    buffer: &mut [u8],
    tag: &[u8],
) -> Result<(), CryptoError> {
    aead.decrypt_in_place_detached(
        Nonce::<A>::from_slice(nonce),
        aad,
        buffer,
        Tag::<A>::from_slice(tag),
    )
    .map_err(|_| CryptoError::AuthFailed)
}
