use pbkdf2::pbkdf2_hmac;
use sha2::{Sha256, Sha384, Sha512};
use zeroize::Zeroizing;

use crate::crypto::hash::{sha256, SHA256_LEN};
use crate::crypto::ids::DigestId;
use crate::crypto::CryptoError;

/// PBKDF2 with HMAC over the container digest.
pub fn pbkdf2_derive(
    digest: DigestId,
    password: &[u8],
    salt: &[u8],
    rounds: u32,
    output_len: usize,
) -> Result<Zeroizing<Vec<u8>>, CryptoError> {
    if rounds == 0 {
        return Err(CryptoError::InvalidIterations(rounds));
    }

    let mut output = Zeroizing::new(vec![0u8; output_len]);
    match digest {
        DigestId::Sha256 => pbkdf2_hmac::<Sha256>(password, salt, rounds, output.as_mut_slice()),
        DigestId::Sha384 => pbkdf2_hmac::<Sha384>(password, salt, rounds, output.as_mut_slice()),
        DigestId::Sha512 => pbkdf2_hmac::<Sha512>(password, salt, rounds, output.as_mut_slice()),
    }
    Ok(output)
}

/// Version 1 wrapping key: SHA-256 of the ECDH shared secret.
pub fn derive_v1_wrapping_key(shared_secret: &[u8]) -> Zeroizing<[u8; SHA256_LEN]> {
    Zeroizing::new(sha256(shared_secret))
}
