#![deny(warnings)]
#![deny(clippy::all)]

//! Test fixtures. The encoder here exists only so the decoder can be
//! exercised end to end; it is not part of any shipped API.

pub mod encoder;

pub use encoder::{
    encode_v1, encode_v2, private_key_pem, v1_zero_length_container, Encoded, SaltMode, V1Options,
    V2Options, MAGIC,
};

pub fn sample_bytes(len: usize) -> Vec<u8> {
    (0..len).map(|i| (i % 251) as u8).collect()
}

pub fn flip_byte(buf: &mut [u8], index: usize) {
    if buf.is_empty() {
        return;
    }

    let idx = index % buf.len();
    buf[idx] ^= 0xFF;
}
