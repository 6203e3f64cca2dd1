#![deny(warnings)]
#![deny(clippy::all)]

use std::env;
use std::io::{self, Cursor};

use dcrypt_core::crypto::ids::{CipherId, DigestId};
use dcrypt_core::crypto::public_key::{Curve, PrivateKey};
use dcrypt_format::{
    decode, decrypt, Container, DecodeOptions, DecodeRequest, DecodeResult, FormatError, MAGIC,
};
use dcrypt_testkit::{
    encode_v1, encode_v2, sample_bytes, v1_zero_length_container, SaltMode, V1Options, V2Options,
};

const DEFAULT_ITERS: u64 = 200;
const DEFAULT_MAX_LEN: usize = 4096;
const DEFAULT_SEED: u64 = 0xA5A5_5A5A_1234_5678;
const SEED_DATA_LEN: usize = 64;

// The decoder itself accepts up to MAX_KDF_ROUNDS. Cases above this
// lower bound are parsed but not unwrapped so a run stays short.
const MAX_FUZZ_ROUNDS: u32 = 50_000;

const V2_FLAGS_OFFSET: usize = 10;
const V2_HEADER_LEN_OFFSET: usize = 14;
const V2_OID_OFFSET: usize = 18;
const V1_LEN_OFFSET: usize = 10;

fn main() {
    let args: Vec<String> = env::args().collect();
    let iters = parse_arg(&args, "--iters")
        .and_then(|v| v.parse::<u64>().ok())
        .unwrap_or(DEFAULT_ITERS);
    let max_len = parse_arg(&args, "--max-len")
        .and_then(|v| v.parse::<usize>().ok())
        .unwrap_or(DEFAULT_MAX_LEN);
    let seed = env::var("DCRYPT_FUZZ_SEED")
        .ok()
        .and_then(|v| v.parse::<u64>().ok())
        .unwrap_or(DEFAULT_SEED);

    let keys = [
        PrivateKey::generate(Curve::P256),
        PrivateKey::generate(Curve::X25519),
        PrivateKey::generate(Curve::P384),
    ];
    let seeds = build_seeds(&keys);
    exercise_valid_seeds(&seeds, &keys);

    let mut rng = XorShift64::new(seed);
    let mut stats = FuzzStats::default();

    for _ in 0..iters {
        let case = if rng.next_u64() % 100 < 80 {
            mutate_seed(&mut rng, &seeds, max_len)
        } else {
            random_case(&mut rng, max_len)
        };

        run_case(&mut stats, &case, &keys[case.key % keys.len()]);
    }

    println!(
        "fuzz-lite completed: {} iterations (headers ok: {}, decrypt ok: {}, warnings: {})",
        iters, stats.header_ok, stats.decrypt_ok, stats.warnings
    );
}

fn parse_arg<'a>(args: &'a [String], name: &str) -> Option<&'a str> {
    args.iter()
        .position(|arg| arg == name)
        .and_then(|idx| args.get(idx + 1))
        .map(|s| s.as_str())
}

struct SeedCase {
    bytes: Vec<u8>,
    /// Index into the key table.
    key: usize,
    /// Expected plaintext for untouched seeds.
    plaintext: Option<Vec<u8>>,
}

#[derive(Default)]
struct FuzzStats {
    header_ok: u64,
    decrypt_ok: u64,
    warnings: u64,
}

struct FuzzCase {
    bytes: Vec<u8>,
    key: usize,
}

fn build_seeds(keys: &[PrivateKey]) -> Vec<SeedCase> {
    let data = sample_bytes(SEED_DATA_LEN);
    let mut seeds = vec![
        SeedCase {
            bytes: Vec::new(),
            key: 0,
            plaintext: None,
        },
        SeedCase {
            bytes: v1_zero_length_container(),
            key: 0,
            plaintext: None,
        },
    ];

    for (key_idx, key) in keys.iter().enumerate() {
        for cipher in [
            CipherId::Aes256Gcm,
            CipherId::ChaCha20Poly1305,
            CipherId::Aes256Cbc,
            CipherId::Aes128Cbc,
        ] {
            let options = V2Options {
                rounds: 64,
                ..V2Options::with_cipher(cipher)
            };
            seeds.push(SeedCase {
                bytes: encode_v2(&[key.public_key()], &data, &options).bytes,
                key: key_idx,
                plaintext: Some(data.clone()),
            });
        }

        seeds.push(SeedCase {
            bytes: encode_v1(&key.public_key(), &data, &V1Options::default()).bytes,
            key: key_idx,
            plaintext: Some(data.clone()),
        });
    }

    let recipients: Vec<_> = keys.iter().map(PrivateKey::public_key).collect();
    let multi = V2Options {
        digest: DigestId::Sha512,
        rounds: 32,
        salt: SaltMode::FirstRecipient,
        ..V2Options::default()
    };
    seeds.push(SeedCase {
        bytes: encode_v2(&recipients, &data, &multi).bytes,
        key: keys.len() - 1,
        plaintext: Some(data.clone()),
    });

    seeds
}

fn exercise_valid_seeds(seeds: &[SeedCase], keys: &[PrivateKey]) {
    for seed in seeds {
        let Some(expected) = seed.plaintext.as_ref() else {
            continue;
        };
        let mut output = Vec::new();
        let result = decrypt(
            &mut Cursor::new(&seed.bytes),
            &mut output,
            &keys[seed.key],
            DecodeOptions::default(),
        );
        if let Err(err) = result {
            eprintln!("fuzz-lite: valid seed failed to decrypt: {err}");
            std::process::exit(1);
        }
        if output != *expected {
            eprintln!("fuzz-lite: valid seed decrypted to the wrong plaintext");
            std::process::exit(1);
        }
    }
}

fn mutate_seed(rng: &mut XorShift64, seeds: &[SeedCase], max_len: usize) -> FuzzCase {
    let seed = &seeds[(rng.next_u64() as usize) % seeds.len()];
    let mut bytes = seed.bytes.clone();
    mutate_bytes(rng, &mut bytes, max_len);
    if rng.next_u64() % 100 < 20 {
        splice_with_seed(rng, &mut bytes, seeds, max_len);
    }
    FuzzCase {
        bytes,
        key: seed.key,
    }
}

fn random_case(rng: &mut XorShift64, max_len: usize) -> FuzzCase {
    let len = (rng.next_u64() as usize) % (max_len + 1);
    let mut bytes = vec![0u8; len];
    rng.fill_bytes(&mut bytes);
    if bytes.len() > MAGIC.len() && rng.next_u64() % 2 == 0 {
        bytes[..MAGIC.len()].copy_from_slice(&MAGIC);
        bytes[MAGIC.len()] = 1 + (rng.next_u64() % 2) as u8;
    }
    FuzzCase {
        bytes,
        key: rng.next_u64() as usize,
    }
}

fn run_case(stats: &mut FuzzStats, case: &FuzzCase, key: &PrivateKey) {
    let header = match decode_with(&case.bytes, None) {
        Ok(result) => result,
        Err(_) => return,
    };
    stats.header_ok += 1;

    if let Container::V2(v2) = &header.container {
        if v2.kdf_rounds > MAX_FUZZ_ROUNDS {
            return;
        }
    }

    match decode_with(&case.bytes, Some(key)) {
        Ok(result) => {
            stats.warnings += result.warnings.len() as u64;
            if result.is_success() {
                stats.decrypt_ok += 1;
            }
        }
        Err(err) => {
            eprintln!("fuzz-lite: header parsed once but not twice: {err}");
            std::process::exit(1);
        }
    }
}

fn decode_with(bytes: &[u8], key: Option<&PrivateKey>) -> Result<DecodeResult, FormatError> {
    decode(DecodeRequest {
        private_key: key,
        want_info: true,
        input: &mut Cursor::new(bytes),
        output: &mut io::sink(),
        options: DecodeOptions::default(),
    })
}

fn mutate_bytes(rng: &mut XorShift64, bytes: &mut Vec<u8>, max_len: usize) {
    if bytes.is_empty() && max_len > 0 {
        bytes.push(0);
    }

    let mutations = 1 + (rng.next_u64() % 6) as usize;
    for _ in 0..mutations {
        match rng.next_u64() % 8 {
            0 => flip_byte(rng, bytes),
            1 => insert_byte(rng, bytes, max_len),
            2 => delete_byte(rng, bytes),
            3 => truncate_bytes(rng, bytes),
            4 => overwrite_range(rng, bytes),
            5 | 6 => structured_header_tweak(rng, bytes),
            _ => forge_length(rng, bytes),
        }
    }
}

fn flip_byte(rng: &mut XorShift64, bytes: &mut [u8]) {
    if bytes.is_empty() {
        return;
    }
    let idx = (rng.next_u64() as usize) % bytes.len();
    bytes[idx] ^= (rng.next_u64() as u8) | 1;
}

fn insert_byte(rng: &mut XorShift64, bytes: &mut Vec<u8>, max_len: usize) {
    if bytes.len() >= max_len {
        return;
    }
    let idx = (rng.next_u64() as usize) % (bytes.len() + 1);
    let value = rng.next_u64() as u8;
    bytes.insert(idx, value);
}

fn delete_byte(rng: &mut XorShift64, bytes: &mut Vec<u8>) {
    if bytes.is_empty() {
        return;
    }
    let idx = (rng.next_u64() as usize) % bytes.len();
    bytes.remove(idx);
}

fn truncate_bytes(rng: &mut XorShift64, bytes: &mut Vec<u8>) {
    if bytes.is_empty() {
        return;
    }
    let new_len = (rng.next_u64() as usize) % (bytes.len() + 1);
    bytes.truncate(new_len);
}

fn overwrite_range(rng: &mut XorShift64, bytes: &mut [u8]) {
    if bytes.is_empty() {
        return;
    }
    let start = (rng.next_u64() as usize) % bytes.len();
    let len = ((rng.next_u64() as usize) % 8).max(1);
    for i in 0..len {
        if start + i >= bytes.len() {
            break;
        }
        bytes[start + i] = rng.next_u64() as u8;
    }
}

/// Rewrites the fixed-position fields right after the magic.
fn structured_header_tweak(rng: &mut XorShift64, bytes: &mut [u8]) {
    if bytes.len() < V2_OID_OFFSET + 2 {
        return;
    }
    match rng.next_u64() % 6 {
        0 => bytes[..MAGIC.len()].copy_from_slice(&MAGIC),
        1 => bytes[MAGIC.len()] = (rng.next_u64() % 4) as u8,
        2 => {
            let flags = read_u32(bytes, V2_FLAGS_OFFSET) | (1u32 << (rng.next_u64() % 6));
            write_u32(bytes, V2_FLAGS_OFFSET, flags);
        }
        3 => {
            let current = read_u32(bytes, V2_HEADER_LEN_OFFSET);
            let delta = (rng.next_u64() % 5) as u32;
            let value = current.wrapping_add(delta).wrapping_sub(2);
            write_u32(bytes, V2_HEADER_LEN_OFFSET, value);
        }
        4 => {
            // DER length octet of the cipher OID.
            bytes[V2_OID_OFFSET + 1] = match rng.next_u64() % 3 {
                0 => 0x80,
                1 => 0x84,
                _ => rng.next_u64() as u8,
            };
        }
        _ => {
            let current = u16::from_be_bytes([bytes[V1_LEN_OFFSET], bytes[V1_LEN_OFFSET + 1]]);
            let value = current.wrapping_add((rng.next_u64() % 3) as u16).wrapping_sub(1);
            bytes[V1_LEN_OFFSET..V1_LEN_OFFSET + 2].copy_from_slice(&value.to_be_bytes());
        }
    }
}

/// Plants an oversized or zero length prefix somewhere in the header area.
fn forge_length(rng: &mut XorShift64, bytes: &mut [u8]) {
    if bytes.len() < V2_OID_OFFSET + 4 {
        return;
    }
    let window = std::cmp::min(bytes.len(), 256) - 4;
    let offset = V2_OID_OFFSET + (rng.next_u64() as usize) % (window - V2_OID_OFFSET + 1);
    let value = match rng.next_u64() % 4 {
        0 => 0,
        1 => u32::MAX,
        2 => 0x0001_0001,
        _ => (rng.next_u64() % 128) as u32,
    };
    write_u32(bytes, offset, value);
}

fn splice_with_seed(rng: &mut XorShift64, bytes: &mut Vec<u8>, seeds: &[SeedCase], max_len: usize) {
    if seeds.is_empty() || max_len == 0 {
        return;
    }
    let other = &seeds[(rng.next_u64() as usize) % seeds.len()].bytes;
    if other.is_empty() {
        return;
    }
    let split_self = (rng.next_u64() as usize) % (bytes.len() + 1);
    let split_other = (rng.next_u64() as usize) % (other.len() + 1);
    let mut combined = Vec::with_capacity(std::cmp::min(max_len, split_self + other.len()));
    combined.extend_from_slice(&bytes[..split_self]);
    combined.extend_from_slice(&other[split_other..]);
    if combined.len() > max_len {
        combined.truncate(max_len);
    }
    *bytes = combined;
}

fn read_u32(bytes: &[u8], offset: usize) -> u32 {
    let mut buf = [0u8; 4];
    buf.copy_from_slice(&bytes[offset..offset + 4]);
    u32::from_be_bytes(buf)
}

fn write_u32(bytes: &mut [u8], offset: usize, value: u32) {
    bytes[offset..offset + 4].copy_from_slice(&value.to_be_bytes());
}

struct XorShift64 {
    state: u64,
}

impl XorShift64 {
    fn new(seed: u64) -> Self {
        Self { state: seed.max(1) }
    }

    fn next_u64(&mut self) -> u64 {
        let mut x = self.state;
        x ^= x << 13;
        x ^= x >> 7;
        x ^= x << 17;
        self.state = x;
        x
    }

    fn fill_bytes(&mut self, buf: &mut [u8]) {
        let mut offset = 0;
        while offset < buf.len() {
            let next = self.next_u64().to_le_bytes();
            let to_copy = std::cmp::min(next.len(), buf.len() - offset);
            buf[offset..offset + to_copy].copy_from_slice(&next[..to_copy]);
            offset += to_copy;
        }
    }
}
