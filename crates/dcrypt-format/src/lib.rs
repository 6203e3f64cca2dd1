#![deny(warnings)]
#![deny(clippy::all)]

pub mod container;
pub mod decode;
pub mod payload;
pub mod reader;
pub mod recipient;
pub mod unwrap;

pub use container::{
    Container, ContainerFlags, ContainerV1, ContainerV2, FormatError, KeyType, RecipientRecord,
    Warning, FINGERPRINT_LEN, MAGIC, MAX_FIELD_LEN, V1_HEADER_OVERHEAD, VERSION_1, VERSION_2,
};
pub use decode::{decode, decrypt, ContainerScheme, DecodeOptions, DecodeRequest, DecodeResult};
pub use payload::{ContentKeyMaterial, PayloadOutcome};
pub use reader::read_container;
pub use recipient::RecipientMatch;
pub use unwrap::{
    SaltSource, UnwrapResult, KEY_DIGEST_ROUNDS, MAX_DERIVED_KEY_LEN, MAX_KDF_ROUNDS,
};
