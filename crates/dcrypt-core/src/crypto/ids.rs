use std::fmt;

use crate::crypto::CryptoError;
use pkcs8::ObjectIdentifier;

/// Algorithm identifier as it appears in a header: the OID plus its name
/// when the OID is one we know.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AlgorithmId {
    pub oid: ObjectIdentifier,
    pub name: Option<&'static str>,
}

const KNOWN_ALGORITHMS: &[(ObjectIdentifier, &str)] = &[
    (ObjectIdentifier::new_unwrap("2.16.840.1.101.3.4.1.2"), "aes-128-cbc"),
    (ObjectIdentifier::new_unwrap("2.16.840.1.101.3.4.1.6"), "aes-128-gcm"),
    (ObjectIdentifier::new_unwrap("2.16.840.1.101.3.4.1.42"), "aes-256-cbc"),
    (ObjectIdentifier::new_unwrap("2.16.840.1.101.3.4.1.46"), "aes-256-gcm"),
    (ObjectIdentifier::new_unwrap("1.2.840.113549.1.9.16.3.18"), "chacha20-poly1305"),
    (ObjectIdentifier::new_unwrap("2.16.840.1.101.3.4.2.1"), "sha256"),
    (ObjectIdentifier::new_unwrap("2.16.840.1.101.3.4.2.2"), "sha384"),
    (ObjectIdentifier::new_unwrap("2.16.840.1.101.3.4.2.3"), "sha512"),
];

impl AlgorithmId {
    pub fn from_oid(oid: ObjectIdentifier) -> Self {
        let name = KNOWN_ALGORITHMS
            .iter()
            .find(|(known, _)| *known == oid)
            .map(|(_, name)| *name);
        Self { oid, name }
    }

    pub fn by_name(name: &str) -> Option<Self> {
        KNOWN_ALGORITHMS
            .iter()
            .find(|(_, known)| *known == name)
            .map(|(oid, known)| Self {
                oid: *oid,
                name: Some(*known),
            })
    }
}

impl fmt::Display for AlgorithmId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.name {
            Some(name) => write!(f, "{name} ({})", self.oid),
            None => write!(f, "unknown ({})", self.oid),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CipherId {
    Aes128Cbc,
    Aes256Cbc,
    Aes256Ctr,
    Aes128Gcm,
    Aes256Gcm,
    ChaCha20Poly1305,
}

impl CipherId {
    pub fn name(self) -> &'static str {
        match self {
            CipherId::Aes128Cbc => "aes-128-cbc",
            CipherId::Aes256Cbc => "aes-256-cbc",
            CipherId::Aes256Ctr => "aes-256-ctr",
            CipherId::Aes128Gcm => "aes-128-gcm",
            CipherId::Aes256Gcm => "aes-256-gcm",
            CipherId::ChaCha20Poly1305 => "chacha20-poly1305",
        }
    }

    pub fn key_len(self) -> usize {
        match self {
            CipherId::Aes128Cbc | CipherId::Aes128Gcm => 16,
            _ => 32,
        }
    }

    pub fn nonce_len(self) -> usize {
        if self.is_aead() {
            12
        } else {
            16
        }
    }

    pub fn is_aead(self) -> bool {
        matches!(
            self,
            CipherId::Aes128Gcm | CipherId::Aes256Gcm | CipherId::ChaCha20Poly1305
        )
    }
}

impl TryFrom<&AlgorithmId> for CipherId {
    type Error = CryptoError;

    fn try_from(value: &AlgorithmId) -> Result<Self, Self::Error> {
        match value.name {
            Some("aes-128-cbc") => Ok(CipherId::Aes128Cbc),
            Some("aes-256-cbc") => Ok(CipherId::Aes256Cbc),
            Some("aes-128-gcm") => Ok(CipherId::Aes128Gcm),
            Some("aes-256-gcm") => Ok(CipherId::Aes256Gcm),
            Some("chacha20-poly1305") => Ok(CipherId::ChaCha20Poly1305),
            _ => Err(CryptoError::UnsupportedAlgorithm(format!(
                "cipher {}",
                value.oid
            ))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DigestId {
    Sha256,
    Sha384,
    Sha512,
}

impl DigestId {
    pub fn name(self) -> &'static str {
        match self {
            DigestId::Sha256 => "sha256",
            DigestId::Sha384 => "sha384",
            DigestId::Sha512 => "sha512",
        }
    }

    pub fn output_len(self) -> usize {
        match self {
            DigestId::Sha256 => 32,
            DigestId::Sha384 => 48,
            DigestId::Sha512 => 64,
        }
    }
}

impl TryFrom<&AlgorithmId> for DigestId {
    type Error = CryptoError;

    fn try_from(value: &AlgorithmId) -> Result<Self, Self::Error> {
        match value.name {
            Some("sha256") => Ok(DigestId::Sha256),
            Some("sha384") => Ok(DigestId::Sha384),
            Some("sha512") => Ok(DigestId::Sha512),
            _ => Err(CryptoError::UnsupportedAlgorithm(format!(
                "digest {}",
                value.oid
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_and_unknown_oids() {
        let gcm = AlgorithmId::from_oid(ObjectIdentifier::new_unwrap("2.16.840.1.101.3.4.1.46"));
        assert_eq!(gcm.name, Some("aes-256-gcm"));
        assert_eq!(gcm.to_string(), "aes-256-gcm (2.16.840.1.101.3.4.1.46)");
        assert_eq!(CipherId::try_from(&gcm).unwrap(), CipherId::Aes256Gcm);

        let odd = AlgorithmId::from_oid(ObjectIdentifier::new_unwrap("1.2.3.4"));
        assert_eq!(odd.name, None);
        assert_eq!(odd.to_string(), "unknown (1.2.3.4)");
        assert!(matches!(
            CipherId::try_from(&odd),
            Err(CryptoError::UnsupportedAlgorithm(_))
        ));
        assert!(DigestId::try_from(&odd).is_err());
    }

    #[test]
    fn cipher_is_not_a_digest() {
        let cbc = AlgorithmId::by_name("aes-256-cbc").unwrap();
        assert!(DigestId::try_from(&cbc).is_err());
        assert_eq!(CipherId::try_from(&cbc).unwrap().nonce_len(), 16);
    }

    #[test]
    fn sizes() {
        assert_eq!(CipherId::Aes128Gcm.key_len(), 16);
        assert_eq!(CipherId::ChaCha20Poly1305.key_len(), 32);
        assert_eq!(CipherId::ChaCha20Poly1305.nonce_len(), 12);
        assert_eq!(DigestId::Sha384.output_len(), 48);
    }
}
