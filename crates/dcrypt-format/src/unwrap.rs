//! Content-key recovery.
//!
//! v1 derives an AES-256-CTR key from the SHA-256 of the ECDH secret and
//! checks the result against a plain SHA-256 digest. v2 EC records run
//! PBKDF2 over the ECDH secret and unwrap with AES-256-CBC (or the
//! container's AEAD cipher). v2 RSA records carry the content key under
//! RSA-OAEP. Both v2 paths finish with an iterated digest check.

use std::fmt;

use dcrypt_core::crypto::aead::{AeadCipher, AeadDecryptor, AEAD_TAG_LEN};
use dcrypt_core::crypto::cipher::{aes256_ctr, cbc_decrypt, ZERO_IV};
use dcrypt_core::crypto::hash::{iterated_key_digest, sha256, SHA256_LEN};
use dcrypt_core::crypto::ids::CipherId;
use dcrypt_core::crypto::kdf::{derive_v1_wrapping_key, pbkdf2_derive};
use dcrypt_core::crypto::public_key::PrivateKey;
use dcrypt_core::{ct_eq, CryptoError};
use tracing::debug;
use zeroize::Zeroizing;

use crate::container::{
    ContainerFlags, ContainerV1, ContainerV2, FormatError, KeyType, RecipientRecord, Warning,
};
use crate::payload::ContentKeyMaterial;

pub const KEY_DIGEST_ROUNDS: u32 = 2048;
pub const WRAP_KEY_LEN: usize = 32;
pub const WRAP_IV_LEN: usize = 16;
/// Upper bound on the derived-key length a v2 header may declare.
pub const MAX_DERIVED_KEY_LEN: u32 = 1024;
/// Upper bound on v2 PBKDF2 rounds.
pub const MAX_KDF_ROUNDS: u32 = 1_000_000;

/// Where the v2 PBKDF2 salt comes from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SaltSource {
    /// Ephemeral key of the first record in the header.
    #[default]
    FirstRecipient,
    /// Ephemeral key of the record that matched the private key.
    MatchedRecipient,
}

pub struct UnwrapResult {
    /// ECDH output, or the OAEP plaintext for RSA records.
    pub shared_secret: Zeroizing<Vec<u8>>,
    /// PBKDF2 salt; `None` for v1 and RSA records.
    pub salt: Option<Vec<u8>>,
    pub wrapping_key: Zeroizing<Vec<u8>>,
    pub wrapping_iv: Zeroizing<Vec<u8>>,
    pub content_key: Zeroizing<Vec<u8>>,
    pub key_digest_valid: bool,
}

impl fmt::Debug for UnwrapResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UnwrapResult")
            .field("content_key_len", &self.content_key.len())
            .field("key_digest_valid", &self.key_digest_valid)
            .finish_non_exhaustive()
    }
}

pub fn unwrap_v1(container: &ContainerV1, key: &PrivateKey) -> Result<UnwrapResult, FormatError> {
    let record = &container.recipient;
    if record.key_digest.len() != SHA256_LEN {
        return Err(FormatError::KeyVerification);
    }

    let shared_secret = key.diffie_hellman(&record.ephemeral_key)?;
    let wrapping_key = derive_v1_wrapping_key(&shared_secret);
    let content_key = aes256_ctr(wrapping_key.as_slice(), &ZERO_IV, &record.wrapped_key)?;

    if !ct_eq(&sha256(&content_key), &record.key_digest) {
        return Err(FormatError::KeyVerification);
    }

    Ok(UnwrapResult {
        shared_secret,
        salt: None,
        wrapping_key: Zeroizing::new(wrapping_key.to_vec()),
        wrapping_iv: Zeroizing::new(ZERO_IV.to_vec()),
        content_key,
        key_digest_valid: true,
    })
}

pub fn unwrap_v2(
    container: &ContainerV2,
    index: usize,
    key: &PrivateKey,
    salt_source: SaltSource,
    strict_key_digest: bool,
    warnings: &mut Vec<Warning>,
) -> Result<UnwrapResult, FormatError> {
    let record = container
        .recipients
        .get(index)
        .ok_or(FormatError::RecipientNotFound)?;
    let digest = container.digest_id()?;
    if record.key_type == KeyType::Rsa {
        return unwrap_v2_rsa(container, record, key, strict_key_digest, warnings);
    }
    if container.kdf_rounds == 0 || container.kdf_rounds > MAX_KDF_ROUNDS {
        return Err(FormatError::InvalidKdfRounds(container.kdf_rounds));
    }
    if container.derived_key_len > MAX_DERIVED_KEY_LEN {
        return Err(FormatError::DerivedKeyTooLong {
            declared: container.derived_key_len,
            max: MAX_DERIVED_KEY_LEN,
        });
    }

    let same_cipher = container
        .flags
        .contains(ContainerFlags::SAME_CIPHER_FOR_KEY_AND_DATA);
    let aead_cipher = if same_cipher {
        let cipher = container.cipher_id()?;
        if !cipher.is_aead() {
            return Err(FormatError::Unsupported(format!(
                "key wrapping with non-AEAD cipher {}",
                cipher.name()
            )));
        }
        Some(cipher)
    } else {
        None
    };

    let needed = match aead_cipher {
        Some(cipher) => ContentKeyMaterial::required_len(cipher),
        None => WRAP_KEY_LEN + WRAP_IV_LEN,
    };
    let declared = container.derived_key_len as usize;
    if declared < needed {
        warnings.push(Warning::DerivedKeyLengthShort { declared, needed });
    }

    let salt = match salt_source {
        SaltSource::FirstRecipient => &container.recipients[0].ephemeral_key,
        SaltSource::MatchedRecipient => &record.ephemeral_key,
    };

    // PBKDF2 output blocks are independent, so bytes past `needed` never
    // influence the unwrap and are not derived.
    let shared_secret = key.diffie_hellman(&record.ephemeral_key)?;
    let derived = pbkdf2_derive(digest, &shared_secret, salt, container.kdf_rounds, needed)?;
    debug!(
        rounds = container.kdf_rounds,
        derived_len = derived.len(),
        "derived wrapping key material"
    );

    let (wrapping_key, wrapping_iv, content_key) = match aead_cipher {
        Some(cipher) => unwrap_aead(cipher, &derived, &record.wrapped_key)?,
        None => {
            let wrapping_key = &derived[..WRAP_KEY_LEN];
            let wrapping_iv = &derived[WRAP_KEY_LEN..WRAP_KEY_LEN + WRAP_IV_LEN];
            let content_key = cbc_decrypt(
                CipherId::Aes256Cbc,
                wrapping_key,
                wrapping_iv,
                &record.wrapped_key,
            )?;
            (
                Zeroizing::new(wrapping_key.to_vec()),
                Zeroizing::new(wrapping_iv.to_vec()),
                content_key,
            )
        }
    };

    let key_digest_valid =
        check_key_digest(container, record, &content_key, strict_key_digest, warnings)?;

    Ok(UnwrapResult {
        shared_secret,
        salt: Some(salt.clone()),
        wrapping_key,
        wrapping_iv,
        content_key,
        key_digest_valid,
    })
}

fn unwrap_v2_rsa(
    container: &ContainerV2,
    record: &RecipientRecord,
    key: &PrivateKey,
    strict_key_digest: bool,
    warnings: &mut Vec<Warning>,
) -> Result<UnwrapResult, FormatError> {
    let content_key = key
        .oaep_decrypt(&record.wrapped_key)
        .map_err(|err| match err {
            CryptoError::AuthFailed => FormatError::KeyVerification,
            other => FormatError::Crypto(other),
        })?;
    debug!(content_key_len = content_key.len(), "unwrapped RSA-OAEP record");

    let key_digest_valid =
        check_key_digest(container, record, &content_key, strict_key_digest, warnings)?;

    Ok(UnwrapResult {
        shared_secret: content_key.clone(),
        salt: None,
        wrapping_key: Zeroizing::new(Vec::new()),
        wrapping_iv: Zeroizing::new(Vec::new()),
        content_key,
        key_digest_valid,
    })
}

fn check_key_digest(
    container: &ContainerV2,
    record: &RecipientRecord,
    content_key: &[u8],
    strict_key_digest: bool,
    warnings: &mut Vec<Warning>,
) -> Result<bool, FormatError> {
    let computed = iterated_key_digest(container.digest_id()?, content_key, KEY_DIGEST_ROUNDS);
    if ct_eq(&computed, &record.key_digest) {
        return Ok(true);
    }
    if strict_key_digest {
        return Err(FormatError::KeyVerification);
    }
    warnings.push(Warning::KeyDigestMismatch);
    Ok(false)
}

type UnwrappedParts = (
    Zeroizing<Vec<u8>>,
    Zeroizing<Vec<u8>>,
    Zeroizing<Vec<u8>>,
);

fn unwrap_aead(
    cipher: CipherId,
    derived: &[u8],
    wrapped_key: &[u8],
) -> Result<UnwrappedParts, FormatError> {
    let material = ContentKeyMaterial::split(cipher, derived)?;
    if wrapped_key.len() < AEAD_TAG_LEN {
        return Err(FormatError::TagMismatch);
    }
    let (ciphertext, tag) = wrapped_key.split_at(wrapped_key.len() - AEAD_TAG_LEN);

    let mut aead = AeadDecryptor::new(cipher, &material.key, &material.nonce)?;
    aead.set_aad(&material.aad);
    let content_key = aead
        .decrypt_and_verify(ciphertext, tag)
        .map_err(|err| match err {
            CryptoError::AuthFailed => FormatError::TagMismatch,
            other => FormatError::Crypto(other),
        })?;

    Ok((material.key, material.nonce, content_key))
}
