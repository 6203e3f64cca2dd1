use std::io::{self, Write};

use dcrypt_core::crypto::cipher::ZERO_IV;
use dcrypt_format::{
    Container, ContainerFlags, ContentKeyMaterial, DecodeResult, KeyType, RecipientRecord,
};

const KEY_WIDTH: usize = 15;

/// Pads `key` to a fixed column. Levels above one are indented and bulleted:
/// `format_line("Key", "00", 2)` gives `"  - Key        : 00"`.
pub fn format_line(key: &str, value: impl std::fmt::Display, level: usize) -> String {
    if level <= 1 {
        return format!("{key:<KEY_WIDTH$}: {value}");
    }
    let indent = level * 2;
    let width = KEY_WIDTH.saturating_sub(indent);
    format!("{:>indent$}{key:<width$}: {value}", "- ")
}

pub fn render(result: &DecodeResult) -> Vec<String> {
    let container = &result.container;
    let mut out = vec![format_line("Version", container.version(), 1)];

    if let Container::V2(v2) = container {
        if v2.flags.bits() != 0 {
            out.push(format_line("Flags", v2.flags, 1));
        }
    }
    out.push(format_line(
        "Header length",
        format!("{} (read {})", container.header_len(), container.consumed()),
        1,
    ));
    if let Container::V2(v2) = container {
        if !v2.header_len_matches() {
            out.push(format!(
                "Error: header length mismatch (read {}, expected {})",
                v2.consumed, v2.header_len
            ));
        }
    }
    match container {
        Container::V1(_) => {
            out.push(format_line("Cipher algo", "aes-256-ctr", 1));
            out.push(format_line("Digest algo", "sha256", 1));
        }
        Container::V2(v2) => {
            out.push(format_line("Cipher algo", &v2.cipher, 1));
            out.push(format_line("Digest algo", &v2.digest, 1));
        }
    }

    if let (Some(index), Some(unwrap)) = (result.recipient_index, result.unwrap.as_ref()) {
        let record = &container.recipients()[index];
        out.push(String::new());

        match container {
            Container::V1(_) => {
                out.extend([
                    "Encryption key decryption".to_string(),
                    format_line("Secret", hex::encode(unwrap.shared_secret.as_slice()), 2),
                    format_line("Encryption", hex::encode(&record.wrapped_key), 2),
                    format_line("Key", hex::encode(unwrap.wrapping_key.as_slice()), 2),
                    format_line("IV", hex::encode(unwrap.wrapping_iv.as_slice()), 2),
                    String::new(),
                    "Decryption".to_string(),
                    format_line("Key", hex::encode(unwrap.content_key.as_slice()), 2),
                    format_line("IV", hex::encode(ZERO_IV), 2),
                ]);
            }
            Container::V2(v2) => {
                out.extend([
                    "Key derivation".to_string(),
                    format_line("Rounds", v2.kdf_rounds, 2),
                    format_line("Secret", hex::encode(unwrap.shared_secret.as_slice()), 2),
                    format_line(
                        "Salt",
                        hex::encode(unwrap.salt.as_deref().unwrap_or_default()),
                        2,
                    ),
                ]);
                if record.key_type == KeyType::Ec {
                    out.extend([
                        String::new(),
                        "Encryption key decryption".to_string(),
                        format_line("Encryption", hex::encode(&record.wrapped_key), 2),
                        format_line("Key", hex::encode(unwrap.wrapping_key.as_slice()), 2),
                        format_line("IV", hex::encode(unwrap.wrapping_iv.as_slice()), 2),
                    ]);
                }

                out.push(String::new());
                out.push("Decryption".to_string());
                let material = v2.cipher_id().ok().and_then(|cipher| {
                    ContentKeyMaterial::split(cipher, &unwrap.content_key).ok()
                });
                match material {
                    Some(material) => {
                        out.push(format_line("Key", hex::encode(material.key.as_slice()), 2));
                        out.push(format_line("IV", hex::encode(material.nonce.as_slice()), 2));
                        if v2.flags.contains(ContainerFlags::HMAC_INTEGRITY) {
                            out.push(format_line("HMAC", hex::encode(material.aad.as_slice()), 2));
                        } else if v2.flags.contains(ContainerFlags::AEAD_INTEGRITY) {
                            out.push(format_line("AAD", hex::encode(material.aad.as_slice()), 2));
                            out.push(format_line("TAG", hex::encode(&result.trailer), 2));
                        }
                    }
                    None => {
                        let key = hex::encode(unwrap.content_key.as_slice());
                        out.push(format_line("Key", key, 2));
                    }
                }
            }
        }
    } else if let Some(index) = result.recipient_index {
        out.push(String::new());
        out.push(format!(
            "Key {} matches the key provided, but its content key could not be recovered",
            index + 1
        ));
    } else if result.provided_fingerprint.is_some() {
        out.push("None of the keys match the key provided".to_string());
    }

    if let Some(fingerprint) = result.provided_fingerprint {
        out.push(format_line("Provided key", hex::encode(fingerprint), 1));
    }

    let recipients = container.recipients();
    if !recipients.is_empty() {
        let suffix = if recipients.len() > 1 { "s" } else { "" };
        out.push(String::new());
        out.push(format!("Key{suffix} (total: {})", recipients.len()));
        for record in recipients {
            push_recipient(&mut out, record);
        }
    }

    out
}

fn push_recipient(out: &mut Vec<String>, record: &RecipientRecord) {
    out.extend([
        format_line("Key type", record.key_type.name(), 2),
        format_line("Key digest", hex::encode(&record.fingerprint), 2),
        format_line("Peer key", hex::encode(&record.ephemeral_key), 2),
        format_line("Encrypted", hex::encode(&record.wrapped_key), 2),
        format_line("Kd hash", hex::encode(&record.key_digest), 2),
    ]);
}

pub fn write_report(result: &DecodeResult, out: &mut dyn Write) -> io::Result<()> {
    for line in render(result) {
        writeln!(out, "{line}")?;
    }
    out.flush()
}
