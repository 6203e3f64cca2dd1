#![deny(warnings)]
#![deny(clippy::all)]

pub mod crypto;
pub mod der;
pub mod io_ext;
pub mod util;

pub use crypto::CryptoError;
pub use der::DerError;
pub use pkcs8::ObjectIdentifier;
pub use util::ct_eq;
