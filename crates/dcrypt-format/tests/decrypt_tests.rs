use std::io::{self, Cursor};

use dcrypt_core::crypto::ids::{CipherId, DigestId};
use dcrypt_core::crypto::public_key::{Curve, PrivateKey};
use dcrypt_core::ObjectIdentifier;
use dcrypt_format::{
    decode, decrypt, DecodeOptions, DecodeRequest, DecodeResult, FormatError, KeyType,
    SaltSource, Warning, MAX_DERIVED_KEY_LEN, MAX_KDF_ROUNDS,
};
use dcrypt_testkit::{
    encode_v1, encode_v2, flip_byte, sample_bytes, v1_zero_length_container, SaltMode, V1Options,
    V2Options,
};

fn decrypt_bytes(
    bytes: &[u8],
    key: &PrivateKey,
    options: DecodeOptions,
) -> (Result<DecodeResult, FormatError>, Vec<u8>) {
    let mut output = Vec::new();
    let result = decrypt(&mut Cursor::new(bytes), &mut output, key, options);
    (result, output)
}

fn decode_bytes(bytes: &[u8], key: &PrivateKey) -> (DecodeResult, Vec<u8>) {
    let mut input = Cursor::new(bytes);
    let mut output = Vec::new();
    let result = decode(DecodeRequest {
        private_key: Some(key),
        want_info: true,
        input: &mut input,
        output: &mut output,
        options: DecodeOptions::default(),
    })
    .expect("header parses");
    (result, output)
}

#[test]
fn v2_roundtrip_every_curve() {
    let data = sample_bytes(4096);
    for curve in [Curve::P256, Curve::P384, Curve::P521, Curve::X25519] {
        let key = PrivateKey::generate(curve);
        let encoded = encode_v2(&[key.public_key()], &data, &V2Options::default());

        let (result, output) = decrypt_bytes(&encoded.bytes, &key, DecodeOptions::default());
        let result = result.unwrap_or_else(|err| panic!("{curve}: {err}"));
        assert_eq!(output, data, "{curve}");
        assert_eq!(result.bytes_written, data.len() as u64);
        assert_eq!(result.recipient_index, Some(0));
        assert!(result.recipient_verified);
        assert!(result.warnings.is_empty());
        let unwrap = result.unwrap.expect("unwrap result");
        assert!(unwrap.key_digest_valid);
        assert_eq!(unwrap.content_key.as_slice(), encoded.content_key.as_slice());
    }
}

#[test]
fn v2_roundtrip_every_cipher() {
    let data = sample_bytes(1000);
    let key = PrivateKey::generate(Curve::P256);
    for cipher in [
        CipherId::Aes256Gcm,
        CipherId::Aes128Gcm,
        CipherId::ChaCha20Poly1305,
        CipherId::Aes256Cbc,
        CipherId::Aes128Cbc,
    ] {
        let encoded = encode_v2(&[key.public_key()], &data, &V2Options::with_cipher(cipher));
        let (result, output) = decrypt_bytes(&encoded.bytes, &key, DecodeOptions::default());
        result.unwrap_or_else(|err| panic!("{}: {err}", cipher.name()));
        assert_eq!(output, data, "{}", cipher.name());
    }
}

#[test]
fn v2_other_digests() {
    let data = sample_bytes(300);
    let key = PrivateKey::generate(Curve::P384);
    for digest in [DigestId::Sha384, DigestId::Sha512] {
        let options = V2Options {
            digest,
            ..V2Options::with_cipher(CipherId::Aes256Cbc)
        };
        let encoded = encode_v2(&[key.public_key()], &data, &options);
        let (result, output) = decrypt_bytes(&encoded.bytes, &key, DecodeOptions::default());
        result.unwrap_or_else(|err| panic!("{}: {err}", digest.name()));
        assert_eq!(output, data);
    }
}

#[test]
fn v2_empty_payload() {
    let key = PrivateKey::generate(Curve::P256);
    let encoded = encode_v2(&[key.public_key()], b"", &V2Options::default());
    assert_eq!(encoded.bytes.len(), encoded.header_end + 16);

    let (result, output) = decrypt_bytes(&encoded.bytes, &key, DecodeOptions::default());
    assert_eq!(result.expect("decrypt").bytes_written, 0);
    assert!(output.is_empty());
}

#[test]
fn multi_recipient_matching_is_order_independent() {
    let data = sample_bytes(200);
    let keys: Vec<PrivateKey> = [Curve::P256, Curve::X25519, Curve::P521]
        .into_iter()
        .map(PrivateKey::generate)
        .collect();
    let publics: Vec<_> = keys.iter().map(PrivateKey::public_key).collect();
    let encoded = encode_v2(&publics, &data, &V2Options::default());

    for (index, key) in keys.iter().enumerate() {
        let (result, output) = decrypt_bytes(&encoded.bytes, key, DecodeOptions::default());
        let result = result.expect("decrypt");
        assert_eq!(result.recipient_index, Some(index));
        assert_eq!(output, data);
    }

    let stranger = PrivateKey::generate(Curve::P256);
    let (result, output) = decrypt_bytes(&encoded.bytes, &stranger, DecodeOptions::default());
    assert!(matches!(result, Err(FormatError::RecipientNotFound)));
    assert!(output.is_empty());
}

#[test]
fn salt_from_matched_recipient_is_opt_in() {
    let data = sample_bytes(128);
    let first = PrivateKey::generate(Curve::P256);
    let second = PrivateKey::generate(Curve::P256);
    let options = V2Options {
        salt: SaltMode::OwnEphemeral,
        ..V2Options::default()
    };
    let encoded = encode_v2(&[first.public_key(), second.public_key()], &data, &options);

    // Default salt (first record) breaks the unwrap for the second recipient.
    let (result, _) = decrypt_bytes(&encoded.bytes, &second, DecodeOptions::default());
    assert!(result.is_err());

    let matched = DecodeOptions {
        salt_source: SaltSource::MatchedRecipient,
        ..DecodeOptions::default()
    };
    let (result, output) = decrypt_bytes(&encoded.bytes, &second, matched);
    result.expect("decrypt with matched salt");
    assert_eq!(output, data);
}

#[test]
fn v2_header_length_mismatch_blocks_matching() {
    let key = PrivateKey::generate(Curve::P256);
    let options = V2Options {
        header_len_delta: 1,
        ..V2Options::default()
    };
    let encoded = encode_v2(&[key.public_key()], b"secret", &options);

    let (result, output) = decode_bytes(&encoded.bytes, &key);
    assert!(matches!(
        result.decrypt_error,
        Some(FormatError::HeaderLengthMismatch { expected, found })
            if expected == found + 1
    ));
    assert_eq!(result.recipient_index, None);
    assert!(output.is_empty());
}

#[test]
fn v2_key_digest_mismatch_warns() {
    let data = sample_bytes(50);
    let key = PrivateKey::generate(Curve::P256);
    let options = V2Options {
        corrupt_key_digest: true,
        ..V2Options::default()
    };
    let encoded = encode_v2(&[key.public_key()], &data, &options);

    let (result, output) = decrypt_bytes(&encoded.bytes, &key, DecodeOptions::default());
    let result = result.expect("lenient decrypt");
    assert_eq!(result.warnings, vec![Warning::KeyDigestMismatch]);
    assert!(!result.unwrap.as_ref().expect("unwrap").key_digest_valid);
    assert_eq!(output, data);

    let strict = DecodeOptions {
        strict_key_digest: true,
        ..DecodeOptions::default()
    };
    let (result, output) = decrypt_bytes(&encoded.bytes, &key, strict);
    assert!(matches!(result, Err(FormatError::KeyVerification)));
    assert!(output.is_empty());
}

#[test]
fn v2_short_derived_length_warns() {
    let key = PrivateKey::generate(Curve::P256);
    let options = V2Options {
        derived_len: Some(32),
        ..V2Options::default()
    };
    let encoded = encode_v2(&[key.public_key()], b"data", &options);

    let (result, output) = decrypt_bytes(&encoded.bytes, &key, DecodeOptions::default());
    let result = result.expect("decrypt");
    assert_eq!(
        result.warnings,
        vec![Warning::DerivedKeyLengthShort {
            declared: 32,
            needed: 48
        }]
    );
    assert_eq!(output, b"data");
}

#[test]
fn aead_tag_is_the_last_sixteen_bytes() {
    let key = PrivateKey::generate(Curve::P256);
    let encoded = encode_v2(&[key.public_key()], &sample_bytes(40), &V2Options::default());
    assert_eq!(encoded.bytes.len() - encoded.header_end, 40 + 16);

    let (result, _) = decrypt_bytes(&encoded.bytes, &key, DecodeOptions::default());
    let tag = &encoded.bytes[encoded.bytes.len() - 16..];
    assert_eq!(result.expect("decrypt").trailer, tag);

    let mut tampered = encoded.bytes.clone();
    let last = tampered.len() - 1;
    flip_byte(&mut tampered, last);
    let (result, output) = decrypt_bytes(&tampered, &key, DecodeOptions::default());
    assert!(matches!(result, Err(FormatError::TagMismatch)));
    assert!(output.is_empty());

    let mut tampered = encoded.bytes.clone();
    flip_byte(&mut tampered, encoded.header_end);
    let (result, output) = decrypt_bytes(&tampered, &key, DecodeOptions::default());
    assert!(matches!(result, Err(FormatError::TagMismatch)));
    assert!(output.is_empty());
}

#[test]
fn aead_payload_shorter_than_tag() {
    let key = PrivateKey::generate(Curve::P256);
    let encoded = encode_v2(&[key.public_key()], b"", &V2Options::default());
    let truncated = &encoded.bytes[..encoded.header_end + 15];

    let (result, output) = decrypt_bytes(truncated, &key, DecodeOptions::default());
    let err = result.unwrap_err();
    assert!(matches!(
        err,
        FormatError::PayloadTooShort {
            found: 15,
            needed: 16
        }
    ));
    assert!(err.is_format_error());
    assert!(output.is_empty());
}

#[test]
fn hmac_integrity_failure_and_warn_mode() {
    let data = sample_bytes(100);
    let key = PrivateKey::generate(Curve::P256);
    let encoded = encode_v2(
        &[key.public_key()],
        &data,
        &V2Options::with_cipher(CipherId::Aes256Cbc),
    );
    let mut tampered = encoded.bytes.clone();
    let last = tampered.len() - 1;
    flip_byte(&mut tampered, last);

    let (result, output) = decrypt_bytes(&tampered, &key, DecodeOptions::default());
    assert!(matches!(result, Err(FormatError::IntegrityMismatch)));
    assert!(output.is_empty());

    let warn = DecodeOptions {
        warn_on_integrity_failure: true,
        ..DecodeOptions::default()
    };
    let (result, output) = decrypt_bytes(&tampered, &key, warn);
    assert_eq!(result.expect("warn mode").warnings, vec![Warning::IntegrityMismatch]);
    assert_eq!(output, data);
}

#[test]
fn same_cipher_key_wrapping() {
    let data = sample_bytes(512);
    let key = PrivateKey::generate(Curve::X25519);
    let options = V2Options {
        flags: 0x02 | 0x10,
        ..V2Options::with_cipher(CipherId::ChaCha20Poly1305)
    };
    let encoded = encode_v2(&[key.public_key()], &data, &options);

    let (result, output) = decrypt_bytes(&encoded.bytes, &key, DecodeOptions::default());
    result.expect("decrypt");
    assert_eq!(output, data);
}

#[test]
fn same_cipher_flag_needs_aead() {
    let key = PrivateKey::generate(Curve::P256);
    let plain = encode_v2(
        &[key.public_key()],
        b"x",
        &V2Options::with_cipher(CipherId::Aes256Cbc),
    );
    // Set the same-cipher bit on an otherwise valid CBC container.
    let mut bytes = plain.bytes.clone();
    bytes[13] |= 0x10;

    let (result, _) = decrypt_bytes(&bytes, &key, DecodeOptions::default());
    assert!(matches!(result, Err(FormatError::Unsupported(_))));
}

#[test]
fn zero_kdf_rounds() {
    let key = PrivateKey::generate(Curve::P256);
    let encoded = encode_v2(&[key.public_key()], b"x", &V2Options::default());
    let mut bytes = encoded.bytes.clone();
    // rounds sit right after the two OIDs (11 bytes each).
    let rounds_at = 9 + 1 + 8 + 11 + 11;
    assert_eq!(&bytes[rounds_at..rounds_at + 4], &2048u32.to_be_bytes());
    bytes[rounds_at..rounds_at + 4].copy_from_slice(&0u32.to_be_bytes());

    let (result, _) = decrypt_bytes(&bytes, &key, DecodeOptions::default());
    assert!(matches!(result, Err(FormatError::InvalidKdfRounds(0))));
}

#[test]
fn oversized_derived_length_is_rejected_before_derivation() {
    let key = PrivateKey::generate(Curve::P256);
    let options = V2Options {
        derived_len: Some(256 * 1024 * 1024),
        ..V2Options::default()
    };
    let encoded = encode_v2(&[key.public_key()], b"x", &options);

    let (result, output) = decrypt_bytes(&encoded.bytes, &key, DecodeOptions::default());
    match result {
        Err(err @ FormatError::DerivedKeyTooLong { declared, max }) => {
            assert_eq!(declared, 256 * 1024 * 1024);
            assert_eq!(max, MAX_DERIVED_KEY_LEN);
            assert!(err.is_format_error());
        }
        other => panic!("expected DerivedKeyTooLong, got {other:?}"),
    }
    assert!(output.is_empty());

    let at_cap = V2Options {
        derived_len: Some(MAX_DERIVED_KEY_LEN),
        ..V2Options::default()
    };
    let encoded = encode_v2(&[key.public_key()], b"x", &at_cap);
    let (result, output) = decrypt_bytes(&encoded.bytes, &key, DecodeOptions::default());
    assert!(result.expect("decrypt at the cap").warnings.is_empty());
    assert_eq!(output, b"x");
}

#[test]
fn excessive_kdf_rounds_are_rejected() {
    let key = PrivateKey::generate(Curve::P256);
    let encoded = encode_v2(&[key.public_key()], b"x", &V2Options::default());
    let mut bytes = encoded.bytes.clone();
    let rounds_at = 9 + 1 + 8 + 11 + 11;
    for rounds in [MAX_KDF_ROUNDS + 1, u32::MAX] {
        bytes[rounds_at..rounds_at + 4].copy_from_slice(&rounds.to_be_bytes());
        let (result, output) = decrypt_bytes(&bytes, &key, DecodeOptions::default());
        assert!(
            matches!(result, Err(FormatError::InvalidKdfRounds(r)) if r == rounds),
            "{rounds}"
        );
        assert!(output.is_empty());
    }
}

#[test]
fn rsa_recipient_roundtrip() {
    let data = sample_bytes(2000);
    let key = PrivateKey::generate_rsa(1024).expect("rsa key");
    for cipher in [CipherId::Aes256Gcm, CipherId::Aes128Cbc] {
        let encoded = encode_v2(&[key.public_key()], &data, &V2Options::with_cipher(cipher));

        let (result, output) = decrypt_bytes(&encoded.bytes, &key, DecodeOptions::default());
        let result = result.unwrap_or_else(|err| panic!("{}: {err}", cipher.name()));
        assert_eq!(output, data, "{}", cipher.name());
        assert!(result.warnings.is_empty());
        let unwrap = result.unwrap.expect("unwrap result");
        assert!(unwrap.key_digest_valid);
        assert!(unwrap.salt.is_none());
        assert_eq!(unwrap.content_key.as_slice(), encoded.content_key.as_slice());
    }
}

#[test]
fn rsa_and_ec_recipients_share_a_container() {
    let data = sample_bytes(333);
    let rsa = PrivateKey::generate_rsa(1024).expect("rsa key");
    let ec = PrivateKey::generate(Curve::X25519);
    let encoded = encode_v2(
        &[rsa.public_key(), ec.public_key()],
        &data,
        &V2Options::default(),
    );

    let (result, output) = decode_bytes(&encoded.bytes, &rsa);
    assert!(result.decrypt_error.is_none(), "{:?}", result.decrypt_error);
    assert_eq!(result.container.recipients()[0].key_type, KeyType::Rsa);
    assert_eq!(result.recipient_index, Some(0));
    assert_eq!(output, data);

    // The first record is RSA, so its empty ephemeral field salts the EC derivation.
    let (result, output) = decrypt_bytes(&encoded.bytes, &ec, DecodeOptions::default());
    assert_eq!(result.expect("ec recipient").recipient_index, Some(1));
    assert_eq!(output, data);

    let stranger = PrivateKey::generate_rsa(1024).expect("rsa key");
    let (result, _) = decrypt_bytes(&encoded.bytes, &stranger, DecodeOptions::default());
    assert!(matches!(result, Err(FormatError::RecipientNotFound)));
}

#[test]
fn rsa_wrapped_key_tampering_fails_verification() {
    let key = PrivateKey::generate_rsa(1024).expect("rsa key");
    let encoded = encode_v2(&[key.public_key()], b"secret", &V2Options::default());
    let mut bytes = encoded.bytes.clone();
    // type(1) + fingerprint(32) + empty ephemeral(4) + wrapped length(4)
    let wrapped_at = encoded.header_end - (1 + 32 + 4 + 4 + 128 + 4 + 32) + 1 + 32 + 4 + 4;
    flip_byte(&mut bytes, wrapped_at + 10);

    let (result, output) = decrypt_bytes(&bytes, &key, DecodeOptions::default());
    assert!(matches!(result, Err(FormatError::KeyVerification)));
    assert!(output.is_empty());
}

#[test]
fn rsa_key_digest_mismatch_follows_strict_mode() {
    let key = PrivateKey::generate_rsa(1024).expect("rsa key");
    let options = V2Options {
        corrupt_key_digest: true,
        ..V2Options::default()
    };
    let encoded = encode_v2(&[key.public_key()], b"hello", &options);

    let (result, output) = decrypt_bytes(&encoded.bytes, &key, DecodeOptions::default());
    assert_eq!(result.expect("lenient").warnings, vec![Warning::KeyDigestMismatch]);
    assert_eq!(output, b"hello");

    let strict = DecodeOptions {
        strict_key_digest: true,
        ..DecodeOptions::default()
    };
    let (result, _) = decrypt_bytes(&encoded.bytes, &key, strict);
    assert!(matches!(result, Err(FormatError::KeyVerification)));
}

#[test]
fn unknown_cipher_fails_only_at_decrypt() {
    let key = PrivateKey::generate(Curve::P256);
    let options = V2Options {
        cipher_oid: Some(ObjectIdentifier::new_unwrap("1.3.6.1.4.1.99999.1")),
        ..V2Options::default()
    };
    let encoded = encode_v2(&[key.public_key()], b"x", &options);

    let (result, _) = decode_bytes(&encoded.bytes, &key);
    assert!(matches!(result.decrypt_error, Some(FormatError::Unsupported(_))));
    assert!(result.unwrap.is_some());
}

#[test]
fn v1_roundtrip_streams_large_payload() {
    let data = sample_bytes(3 * 8192 + 5);
    for curve in [Curve::P256, Curve::X25519] {
        let key = PrivateKey::generate(curve);
        let encoded = encode_v1(&key.public_key(), &data, &V1Options::default());
        let (result, output) = decrypt_bytes(&encoded.bytes, &key, DecodeOptions::default());
        let result = result.unwrap_or_else(|err| panic!("{curve}: {err}"));
        assert_eq!(output, data);
        assert!(!result.recipient_verified);
        assert_eq!(result.bytes_written, data.len() as u64);
    }
}

#[test]
fn v1_key_digest_mismatch_is_fatal() {
    let key = PrivateKey::generate(Curve::P256);
    let options = V1Options {
        corrupt_key_digest: true,
        ..V1Options::default()
    };
    let encoded = encode_v1(&key.public_key(), b"data", &options);
    let (result, output) = decrypt_bytes(&encoded.bytes, &key, DecodeOptions::default());
    assert!(matches!(result, Err(FormatError::KeyVerification)));
    assert!(output.is_empty());
}

#[test]
fn v1_wrong_key_fails_verification() {
    let key = PrivateKey::generate(Curve::P256);
    let other = PrivateKey::generate(Curve::P256);
    let encoded = encode_v1(&key.public_key(), b"data", &V1Options::default());
    let (result, output) = decrypt_bytes(&encoded.bytes, &other, DecodeOptions::default());
    assert!(matches!(result, Err(FormatError::KeyVerification)));
    assert!(output.is_empty());
}

#[test]
fn v1_header_mismatch_is_only_a_warning() {
    let key = PrivateKey::generate(Curve::P256);
    let options = V1Options {
        header_len_delta: -3,
        ..V1Options::default()
    };
    let encoded = encode_v1(&key.public_key(), b"still readable", &options);
    let (result, output) = decrypt_bytes(&encoded.bytes, &key, DecodeOptions::default());
    let result = result.expect("decrypt");
    assert!(matches!(
        result.warnings.as_slice(),
        [Warning::HeaderLengthMismatch { .. }]
    ));
    assert_eq!(output, b"still readable");
}

#[test]
fn v1_zero_length_fields() {
    let key = PrivateKey::generate(Curve::P256);
    let bytes = v1_zero_length_container();
    let (result, output) = decrypt_bytes(&bytes, &key, DecodeOptions::default());
    assert!(matches!(result, Err(FormatError::KeyVerification)));
    assert!(output.is_empty());
}

#[test]
fn info_without_key_parses_only() {
    let key = PrivateKey::generate(Curve::P256);
    let encoded = encode_v2(&[key.public_key()], b"x", &V2Options::default());
    let mut input = Cursor::new(&encoded.bytes);
    let mut sink = io::sink();

    let result = decode(DecodeRequest {
        private_key: None,
        want_info: true,
        input: &mut input,
        output: &mut sink,
        options: DecodeOptions::default(),
    })
    .expect("parse");
    assert_eq!(result.container.version(), 2);
    assert!(result.provided_fingerprint.is_none());
    assert!(result.unwrap.is_none());
    assert!(result.is_success());
}

#[test]
fn no_key_and_no_info_is_rejected() {
    let mut input = Cursor::new(b"not even read".to_vec());
    let mut sink = io::sink();

    let err = decode(DecodeRequest {
        private_key: None,
        want_info: false,
        input: &mut input,
        output: &mut sink,
        options: DecodeOptions::default(),
    })
    .unwrap_err();
    assert!(matches!(err, FormatError::MissingPrivateKey));
    assert_eq!(input.position(), 0);
}
