use aes::{Aes128, Aes256};
use cbc::cipher::block_padding::Pkcs7;
use cbc::cipher::{BlockDecryptMut, KeyIvInit, StreamCipher};
use zeroize::Zeroizing;

use crate::crypto::ids::CipherId;
use crate::crypto::CryptoError;

pub const AES_BLOCK_LEN: usize = 16;
pub const ZERO_IV: [u8; AES_BLOCK_LEN] = [0u8; AES_BLOCK_LEN];

type Aes256Ctr = ctr::Ctr128BE<Aes256>;
type Aes128CbcDec = cbc::Decryptor<Aes128>;
type Aes256CbcDec = cbc::Decryptor<Aes256>;

/// AES-256-CTR keystream with a 128-bit big-endian counter, applied in
/// place chunk by chunk.
pub struct CtrCipher {
    inner: Aes256Ctr,
}

impl CtrCipher {
    pub fn new(key: &[u8], iv: &[u8]) -> Result<Self, CryptoError> {
        check_len(key, 32, iv, AES_BLOCK_LEN)?;
        let inner = Aes256Ctr::new_from_slices(key, iv).map_err(|_| {
            CryptoError::InvalidKeyLength {
                expected: 32,
                found: key.len(),
            }
        })?;
        Ok(Self { inner })
    }

    pub fn apply(&mut self, buf: &mut [u8]) {
        self.inner.apply_keystream(buf);
    }
}

pub fn aes256_ctr(key: &[u8], iv: &[u8], data: &[u8]) -> Result<Zeroizing<Vec<u8>>, CryptoError> {
    let mut cipher = CtrCipher::new(key, iv)?;
    let mut out = Zeroizing::new(data.to_vec());
    cipher.apply(out.as_mut_slice());
    Ok(out)
}

/// CBC decryption with PKCS#7 unpadding.
pub fn cbc_decrypt(
    cipher: CipherId,
    key: &[u8],
    iv: &[u8],
    data: &[u8],
) -> Result<Zeroizing<Vec<u8>>, CryptoError> {
    check_len(key, cipher.key_len(), iv, AES_BLOCK_LEN)?;
    let plain = match cipher {
        CipherId::Aes128Cbc => Aes128CbcDec::new_from_slices(key, iv)
            .map_err(|_| CryptoError::InvalidKeyLength {
                expected: 16,
                found: key.len(),
            })?
            .decrypt_padded_vec_mut::<Pkcs7>(data),
        CipherId::Aes256Cbc => Aes256CbcDec::new_from_slices(key, iv)
            .map_err(|_| CryptoError::InvalidKeyLength {
                expected: 32,
                found: key.len(),
            })?
            .decrypt_padded_vec_mut::<Pkcs7>(data),
        other => return Err(CryptoError::UnsupportedAlgorithm(other.name().to_string())),
    };
    plain
        .map(Zeroizing::new)
        .map_err(|_| CryptoError::InvalidPadding)
}

fn check_len(key: &[u8], key_len: usize, iv: &[u8], iv_len: usize) -> Result<(), CryptoError> {
    if key.len() != key_len {
        return Err(CryptoError::InvalidKeyLength {
            expected: key_len,
            found: key.len(),
        });
    }
    if iv.len() != iv_len {
        return Err(CryptoError::InvalidNonceLength {
            expected: iv_len,
            found: iv.len(),
        });
    }
    Ok(())
}
