use aes_gcm::aead::{AeadInPlace, KeyInit};
use aes_gcm::{Aes128Gcm, Aes256Gcm};
use chacha20poly1305::ChaCha20Poly1305;
use dcrypt_core::crypto::aead::{AeadCipher, AeadDecryptor, AEAD_NONCE_LEN};
use dcrypt_core::crypto::ids::CipherId;
use dcrypt_core::CryptoError;

fn seal(cipher: CipherId, key: &[u8], nonce: &[u8], aad: &[u8], data: &[u8]) -> (Vec<u8>, Vec<u8>) {
    let mut buffer = data.to_vec();
    let tag = match cipher {
        CipherId::Aes128Gcm => Aes128Gcm::new_from_slice(key)
            .expect("key")
            .encrypt_in_place_detached(nonce.into(), aad, &mut buffer)
            .expect("seal")
            .to_vec(),
        CipherId::Aes256Gcm => Aes256Gcm::new_from_slice(key)
            .expect("key")
            .encrypt_in_place_detached(nonce.into(), aad, &mut buffer)
            .expect("seal")
            .to_vec(),
        CipherId::ChaCha20Poly1305 => ChaCha20Poly1305::new_from_slice(key)
            .expect("key")
            .encrypt_in_place_detached(nonce.into(), aad, &mut buffer)
            .expect("seal")
            .to_vec(),
        other => panic!("{} is not AEAD", other.name()),
    };
    (buffer, tag)
}

fn roundtrip(cipher: CipherId, data: &[u8]) {
    let key = vec![0x11u8; cipher.key_len()];
    let nonce = [0x22u8; AEAD_NONCE_LEN];
    let aad = [0x33u8; 16];
    let (ct, tag) = seal(cipher, &key, &nonce, &aad, data);

    let mut aead = AeadDecryptor::new(cipher, &key, &nonce).expect("decryptor");
    aead.set_aad(&aad);
    let plain = aead.decrypt_and_verify(&ct, &tag).expect("open");
    assert_eq!(plain.as_slice(), data);
}

#[test]
fn roundtrip_every_aead_cipher() {
    for cipher in [
        CipherId::Aes128Gcm,
        CipherId::Aes256Gcm,
        CipherId::ChaCha20Poly1305,
    ] {
        roundtrip(cipher, b"");
        roundtrip(cipher, b"Subject: hello\r\n\r\nbody\r\n");
        roundtrip(cipher, &vec![0xAB; 70_000]);
    }
}

#[test]
fn tampered_tag_is_rejected() {
    let key = [0x44u8; 32];
    let nonce = [0x55u8; AEAD_NONCE_LEN];
    let (ct, mut tag) = seal(CipherId::ChaCha20Poly1305, &key, &nonce, b"", b"message");
    tag[15] ^= 0x01;

    let aead = AeadDecryptor::new(CipherId::ChaCha20Poly1305, &key, &nonce).expect("decryptor");
    let err = aead.decrypt_and_verify(&ct, &tag).unwrap_err();
    assert!(matches!(err, CryptoError::AuthFailed));
}
