use std::io::{Read, Write};

use dcrypt_core::crypto::aead::{AeadCipher, AeadDecryptor, AEAD_TAG_LEN};
use dcrypt_core::crypto::cipher::{cbc_decrypt, CtrCipher, ZERO_IV};
use dcrypt_core::crypto::ids::CipherId;
use dcrypt_core::io_ext::copy_transform;
use dcrypt_core::CryptoError;
use tracing::debug;
use zeroize::Zeroizing;

use crate::container::{ContainerFlags, ContainerV1, ContainerV2, FormatError, Warning};

pub const AAD_LEN: usize = 16;

/// A v2 content key split into cipher key, nonce/IV and AAD. The AAD
/// block doubles as the HMAC key for HMAC-integrity files.
pub struct ContentKeyMaterial {
    pub key: Zeroizing<Vec<u8>>,
    pub nonce: Zeroizing<Vec<u8>>,
    pub aad: Zeroizing<Vec<u8>>,
}

impl ContentKeyMaterial {
    pub fn required_len(cipher: CipherId) -> usize {
        cipher.key_len() + cipher.nonce_len() + AAD_LEN
    }

    pub fn split(cipher: CipherId, bytes: &[u8]) -> Result<Self, FormatError> {
        let needed = Self::required_len(cipher);
        if bytes.len() < needed {
            return Err(FormatError::ContentKeyTooShort {
                found: bytes.len(),
                needed,
            });
        }

        let (key, rest) = bytes.split_at(cipher.key_len());
        let (nonce, rest) = rest.split_at(cipher.nonce_len());
        Ok(Self {
            key: Zeroizing::new(key.to_vec()),
            nonce: Zeroizing::new(nonce.to_vec()),
            aad: Zeroizing::new(rest[..AAD_LEN].to_vec()),
        })
    }
}

/// What a payload decrypt produced.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PayloadOutcome {
    pub bytes_written: u64,
    /// Authentication tag or HMAC split off the payload; empty when none.
    pub trailer: Vec<u8>,
}

/// AES-256-CTR with a zero IV, streamed. No trailer.
pub fn decrypt_v1(
    content_key: &[u8],
    input: &mut dyn Read,
    output: &mut dyn Write,
) -> Result<PayloadOutcome, FormatError> {
    let needed = ContainerV1::CIPHER.key_len();
    if content_key.len() < needed {
        return Err(FormatError::ContentKeyTooShort {
            found: content_key.len(),
            needed,
        });
    }

    let mut cipher = CtrCipher::new(content_key, &ZERO_IV)?;
    let bytes_written = copy_transform(input, output, |chunk| cipher.apply(chunk))?;
    output.flush()?;
    Ok(PayloadOutcome {
        bytes_written,
        trailer: Vec::new(),
    })
}

/// Reads the rest of the input, splits off the trailer and decrypts.
/// Nothing is written unless the tag (or HMAC) verifies.
pub fn decrypt_v2(
    container: &ContainerV2,
    content_key: &[u8],
    input: &mut dyn Read,
    output: &mut dyn Write,
    warn_on_integrity_failure: bool,
    warnings: &mut Vec<Warning>,
) -> Result<PayloadOutcome, FormatError> {
    let cipher = container.cipher_id()?;
    let material = ContentKeyMaterial::split(cipher, content_key)?;

    let mut payload = Vec::new();
    input.read_to_end(&mut payload)?;
    debug!(payload_len = payload.len(), cipher = cipher.name(), "read payload");

    let mut trailer = Vec::new();
    let plaintext = if cipher.is_aead() {
        let (ciphertext, tag) = split_trailer(&payload, AEAD_TAG_LEN)?;
        trailer.extend_from_slice(tag);
        let mut aead = AeadDecryptor::new(cipher, &material.key, &material.nonce)?;
        aead.set_aad(&material.aad);
        aead.decrypt_and_verify(ciphertext, tag)
            .map_err(|err| match err {
                CryptoError::AuthFailed => FormatError::TagMismatch,
                other => FormatError::Crypto(other),
            })?
    } else {
        let ciphertext = if container.flags.contains(ContainerFlags::HMAC_INTEGRITY) {
            let digest = container.digest_id()?;
            let (ciphertext, mac) = split_trailer(&payload, digest.output_len())?;
            trailer.extend_from_slice(mac);
            if !digest.verify_hmac(&material.aad, ciphertext, mac)? {
                if !warn_on_integrity_failure {
                    return Err(FormatError::IntegrityMismatch);
                }
                warnings.push(Warning::IntegrityMismatch);
            }
            ciphertext
        } else {
            &payload[..]
        };
        decrypt_unauthenticated(cipher, &material, ciphertext)?
    };

    output.write_all(&plaintext)?;
    output.flush()?;
    Ok(PayloadOutcome {
        bytes_written: plaintext.len() as u64,
        trailer,
    })
}

fn decrypt_unauthenticated(
    cipher: CipherId,
    material: &ContentKeyMaterial,
    ciphertext: &[u8],
) -> Result<Zeroizing<Vec<u8>>, FormatError> {
    match cipher {
        CipherId::Aes128Cbc | CipherId::Aes256Cbc => {
            Ok(cbc_decrypt(cipher, &material.key, &material.nonce, ciphertext)?)
        }
        other => Err(FormatError::Unsupported(other.name().to_string())),
    }
}

fn split_trailer(payload: &[u8], trailer_len: usize) -> Result<(&[u8], &[u8]), FormatError> {
    if payload.len() < trailer_len {
        return Err(FormatError::PayloadTooShort {
            found: payload.len(),
            needed: trailer_len,
        });
    }
    Ok(payload.split_at(payload.len() - trailer_len))
}
