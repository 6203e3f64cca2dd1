use aes::Aes256;
use aes_gcm::aead::{AeadInPlace, KeyInit};
use aes_gcm::{Aes128Gcm, Aes256Gcm};
use cbc::cipher::block_padding::Pkcs7;
use cbc::cipher::{BlockEncryptMut, KeyIvInit};
use chacha20poly1305::ChaCha20Poly1305;
use dcrypt_core::crypto::cipher::{aes256_ctr, ZERO_IV};
use dcrypt_core::crypto::hash::{iterated_key_digest, sha256};
use dcrypt_core::crypto::ids::{AlgorithmId, CipherId, DigestId};
use dcrypt_core::crypto::kdf::pbkdf2_derive;
use dcrypt_core::crypto::public_key::{PrivateKey, PublicKey};
use pkcs8::der::{pem, Encode};
use pkcs8::{EncodePrivateKey, LineEnding, ObjectIdentifier};
use rand_core::{OsRng, RngCore};

pub const MAGIC: [u8; 9] = *b"CRYPTED\x03\x07";

const FLAG_HMAC: u32 = 0x01;
const FLAG_AEAD: u32 = 0x02;
const FLAG_SAME_CIPHER: u32 = 0x10;
const KEY_TYPE_RSA: u8 = 1;
const KEY_DIGEST_ROUNDS: u32 = 2048;
const TAG_LEN: usize = 16;
const AAD_LEN: usize = 16;

/// Salt used for every recipient's PBKDF2 run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SaltMode {
    FirstRecipient,
    OwnEphemeral,
}

#[derive(Debug, Clone)]
pub struct V2Options {
    pub cipher: CipherId,
    pub digest: DigestId,
    /// Written instead of the cipher's OID when set.
    pub cipher_oid: Option<ObjectIdentifier>,
    pub flags: u32,
    pub rounds: u32,
    /// Declared derived-key length; defaults to what unwrapping needs.
    pub derived_len: Option<u32>,
    pub salt: SaltMode,
    /// Type byte for EC recipients; RSA recipients are always written as 1.
    pub key_type: u8,
    pub header_len_delta: i64,
    pub corrupt_key_digest: bool,
}

impl Default for V2Options {
    fn default() -> Self {
        Self {
            cipher: CipherId::Aes256Gcm,
            digest: DigestId::Sha256,
            cipher_oid: None,
            flags: FLAG_AEAD,
            rounds: 2048,
            derived_len: None,
            salt: SaltMode::FirstRecipient,
            key_type: 2,
            header_len_delta: 0,
            corrupt_key_digest: false,
        }
    }
}

impl V2Options {
    pub fn with_cipher(cipher: CipherId) -> Self {
        let flags = if cipher.is_aead() { FLAG_AEAD } else { FLAG_HMAC };
        Self {
            cipher,
            flags,
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct V1Options {
    pub reserved: u16,
    pub header_len_delta: i64,
    pub corrupt_key_digest: bool,
}

#[derive(Debug, Clone)]
pub struct Encoded {
    pub bytes: Vec<u8>,
    pub content_key: Vec<u8>,
    /// Offset of the first payload byte.
    pub header_end: usize,
}

pub fn encode_v2(recipients: &[PublicKey], plaintext: &[u8], options: &V2Options) -> Encoded {
    assert!(!recipients.is_empty(), "at least one recipient");
    let cipher = options.cipher;
    let digest = options.digest;
    let same_cipher = options.flags & FLAG_SAME_CIPHER != 0;

    let content_key = random_bytes(cipher.key_len() + cipher.nonce_len() + AAD_LEN);
    let ephemerals: Vec<Option<PrivateKey>> = recipients
        .iter()
        .map(|r| r.curve().map(PrivateKey::generate))
        .collect();
    let ephemeral_bytes = |ephemeral: &Option<PrivateKey>| {
        ephemeral
            .as_ref()
            .map(|key| key.public_key().to_bytes())
            .unwrap_or_default()
    };
    let first_salt = ephemeral_bytes(&ephemerals[0]);

    let needed = if same_cipher {
        content_key.len()
    } else {
        48
    };

    let mut records = Vec::new();
    for (recipient, ephemeral) in recipients.iter().zip(&ephemerals) {
        let ephemeral_pub = ephemeral_bytes(ephemeral);
        let (key_type, wrapped) = match ephemeral {
            None => (
                KEY_TYPE_RSA,
                recipient.oaep_encrypt(&content_key).expect("oaep"),
            ),
            Some(ephemeral) => {
                let shared = ephemeral
                    .diffie_hellman(&recipient.to_bytes())
                    .expect("ecdh");
                let salt = match options.salt {
                    SaltMode::FirstRecipient => first_salt.clone(),
                    SaltMode::OwnEphemeral => ephemeral_pub.clone(),
                };
                let derived =
                    pbkdf2_derive(digest, &shared, &salt, options.rounds, needed).expect("pbkdf2");

                let wrapped = if same_cipher {
                    let (key, rest) = derived.split_at(cipher.key_len());
                    let (nonce, aad) = rest.split_at(cipher.nonce_len());
                    aead_seal(cipher, key, nonce, &aad[..AAD_LEN], &content_key)
                } else {
                    cbc::Encryptor::<Aes256>::new_from_slices(&derived[..32], &derived[32..48])
                        .expect("cbc key")
                        .encrypt_padded_vec_mut::<Pkcs7>(&content_key)
                };
                (options.key_type, wrapped)
            }
        };

        let mut key_digest = iterated_key_digest(digest, &content_key, KEY_DIGEST_ROUNDS);
        if options.corrupt_key_digest {
            key_digest[0] ^= 0x01;
        }

        records.push(key_type);
        records.extend_from_slice(&recipient.fingerprint().expect("fingerprint"));
        push_u32_field(&mut records, &ephemeral_pub);
        push_u32_field(&mut records, &wrapped);
        push_u32_field(&mut records, &key_digest);
    }

    let cipher_oid = options.cipher_oid.unwrap_or_else(|| oid_for(cipher.name()));
    let mut body = Vec::new();
    body.extend_from_slice(&cipher_oid.to_der().expect("oid"));
    body.extend_from_slice(&oid_for(digest.name()).to_der().expect("oid"));
    body.extend_from_slice(&options.rounds.to_be_bytes());
    body.extend_from_slice(&options.derived_len.unwrap_or(needed as u32).to_be_bytes());
    body.push(recipients.len() as u8);
    body.extend_from_slice(&records);

    let header_len = (MAGIC.len() + 1 + 8 + body.len()) as i64 + options.header_len_delta;

    let mut bytes = MAGIC.to_vec();
    bytes.push(2);
    bytes.extend_from_slice(&options.flags.to_be_bytes());
    bytes.extend_from_slice(&(header_len as u32).to_be_bytes());
    bytes.extend_from_slice(&body);
    let header_end = bytes.len();

    let (key, rest) = content_key.split_at(cipher.key_len());
    let (nonce, aad) = rest.split_at(cipher.nonce_len());
    if cipher.is_aead() {
        bytes.extend_from_slice(&aead_seal(cipher, key, nonce, aad, plaintext));
    } else {
        let ciphertext = match cipher {
            CipherId::Aes128Cbc => cbc::Encryptor::<aes::Aes128>::new_from_slices(key, nonce)
                .expect("cbc key")
                .encrypt_padded_vec_mut::<Pkcs7>(plaintext),
            CipherId::Aes256Cbc => cbc::Encryptor::<Aes256>::new_from_slices(key, nonce)
                .expect("cbc key")
                .encrypt_padded_vec_mut::<Pkcs7>(plaintext),
            other => panic!("{} is not a v2 payload cipher", other.name()),
        };
        bytes.extend_from_slice(&ciphertext);
        if options.flags & FLAG_HMAC != 0 {
            bytes.extend_from_slice(&digest.hmac(aad, &ciphertext).expect("hmac"));
        }
    }

    Encoded {
        bytes,
        content_key,
        header_end,
    }
}

pub fn encode_v1(recipient: &PublicKey, plaintext: &[u8], options: &V1Options) -> Encoded {
    let ephemeral = PrivateKey::generate(recipient.curve().expect("v1 recipients are EC keys"));
    let shared = ephemeral
        .diffie_hellman(&recipient.to_bytes())
        .expect("ecdh");
    let wrapping_key = sha256(&shared);

    let content_key = random_bytes(32);
    let wrapped = aes256_ctr(&wrapping_key, &ZERO_IV, &content_key).expect("ctr");
    let mut key_digest = sha256(&content_key);
    if options.corrupt_key_digest {
        key_digest[0] ^= 0x01;
    }

    let mut fields = Vec::new();
    push_u16_field(&mut fields, &ephemeral.public_key().to_bytes());
    push_u16_field(&mut fields, &recipient.fingerprint().expect("fingerprint"));
    push_u16_field(&mut fields, &key_digest);
    push_u16_field(&mut fields, &wrapped);
    fields.extend_from_slice(&options.reserved.to_be_bytes());

    let declared = fields.len() as i64 + options.header_len_delta;

    let mut bytes = MAGIC.to_vec();
    bytes.push(1);
    bytes.extend_from_slice(&(declared as u16).to_be_bytes());
    bytes.extend_from_slice(&fields);
    let header_end = bytes.len();

    bytes.extend_from_slice(&aes256_ctr(&content_key, &ZERO_IV, plaintext).expect("ctr"));

    Encoded {
        bytes,
        content_key,
        header_end,
    }
}

/// A v1 container whose four fields are all empty.
pub fn v1_zero_length_container() -> Vec<u8> {
    let mut bytes = MAGIC.to_vec();
    bytes.push(1);
    bytes.extend_from_slice(&10u16.to_be_bytes());
    bytes.extend_from_slice(&[0u8; 10]);
    bytes
}

pub fn private_key_pem(key: &PrivateKey) -> String {
    match key {
        PrivateKey::P256(secret) => secret.to_pkcs8_pem(LineEnding::LF).expect("pem").to_string(),
        PrivateKey::P384(secret) => secret.to_pkcs8_pem(LineEnding::LF).expect("pem").to_string(),
        PrivateKey::P521(secret) => secret.to_pkcs8_pem(LineEnding::LF).expect("pem").to_string(),
        PrivateKey::X25519(scalar) => {
            let mut der = vec![
                0x30, 0x2e, 0x02, 0x01, 0x00, 0x30, 0x05, 0x06, 0x03, 0x2b, 0x65, 0x6e, 0x04, 0x22,
                0x04, 0x20,
            ];
            der.extend_from_slice(scalar.as_slice());
            pem::encode_string("PRIVATE KEY", LineEnding::LF, &der).expect("pem")
        }
        PrivateKey::Rsa(secret) => secret.to_pkcs8_pem(LineEnding::LF).expect("pem").to_string(),
    }
}

fn aead_seal(cipher: CipherId, key: &[u8], nonce: &[u8], aad: &[u8], data: &[u8]) -> Vec<u8> {
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
        other => panic!("{} is not an AEAD cipher", other.name()),
    };
    assert_eq!(tag.len(), TAG_LEN);
    buffer.extend_from_slice(&tag);
    buffer
}

fn oid_for(name: &str) -> ObjectIdentifier {
    AlgorithmId::by_name(name)
        .unwrap_or_else(|| panic!("no OID for {name}"))
        .oid
}

fn random_bytes(len: usize) -> Vec<u8> {
    let mut bytes = vec![0u8; len];
    OsRng.fill_bytes(&mut bytes);
    bytes
}

fn push_u16_field(out: &mut Vec<u8>, field: &[u8]) {
    out.extend_from_slice(&(field.len() as u16).to_be_bytes());
    out.extend_from_slice(field);
}

fn push_u32_field(out: &mut Vec<u8>, field: &[u8]) {
    out.extend_from_slice(&(field.len() as u32).to_be_bytes());
    out.extend_from_slice(field);
}
