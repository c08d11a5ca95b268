//! Hash Operations
//!
//! SHA-1 and SHA-2 hashing, and the digest-info forms used as signing input.

use digest::Digest;
use sha1::Sha1;
use sha2::{Sha256, Sha384, Sha512};

use super::ecc::EccCurve;
use crate::tlv::{tags, TLVBuilder};

/// Hash algorithm types
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HashAlgorithm {
    SHA1,
    SHA256,
    SHA384,
    SHA512,
}

impl HashAlgorithm {
    /// DER object identifier content bytes
    pub fn oid(self) -> &'static [u8] {
        match self {
            HashAlgorithm::SHA1 => &[0x2B, 0x0E, 0x03, 0x02, 0x1A],
            HashAlgorithm::SHA256 => &[0x60, 0x86, 0x48, 0x01, 0x65, 0x03, 0x04, 0x02, 0x01],
            HashAlgorithm::SHA384 => &[0x60, 0x86, 0x48, 0x01, 0x65, 0x03, 0x04, 0x02, 0x02],
            HashAlgorithm::SHA512 => &[0x60, 0x86, 0x48, 0x01, 0x65, 0x03, 0x04, 0x02, 0x03],
        }
    }
}

/// Hash Operations
pub struct HashOperations;

impl HashOperations {
    /// Compute SHA-1 hash
    pub fn sha1(data: &[u8]) -> Vec<u8> {
        let mut hasher = Sha1::new();
        hasher.update(data);
        hasher.finalize().to_vec()
    }

    /// Compute SHA-256 hash
    pub fn sha256(data: &[u8]) -> Vec<u8> {
        let mut hasher = Sha256::new();
        hasher.update(data);
        hasher.finalize().to_vec()
    }

    /// Compute SHA-384 hash
    pub fn sha384(data: &[u8]) -> Vec<u8> {
        let mut hasher = Sha384::new();
        hasher.update(data);
        hasher.finalize().to_vec()
    }

    /// Compute SHA-512 hash
    pub fn sha512(data: &[u8]) -> Vec<u8> {
        let mut hasher = Sha512::new();
        hasher.update(data);
        hasher.finalize().to_vec()
    }

    /// Compute hash using specified algorithm
    pub fn hash(algorithm: HashAlgorithm, data: &[u8]) -> Vec<u8> {
        match algorithm {
            HashAlgorithm::SHA1 => Self::sha1(data),
            HashAlgorithm::SHA256 => Self::sha256(data),
            HashAlgorithm::SHA384 => Self::sha384(data),
            HashAlgorithm::SHA512 => Self::sha512(data),
        }
    }

    /// Get the output size for an algorithm
    pub fn output_size(algorithm: HashAlgorithm) -> usize {
        match algorithm {
            HashAlgorithm::SHA1 => 20,
            HashAlgorithm::SHA256 => 32,
            HashAlgorithm::SHA384 => 48,
            HashAlgorithm::SHA512 => 64,
        }
    }
}

/// Signing input for card signature commands
pub struct DigestInfo;

impl DigestInfo {
    /// ECDSA signing input: the bare hash of `message`
    ///
    /// The card signs whatever it receives, so no algorithm identifier is
    /// attached. The hash follows the curve size.
    pub fn ecdsa(curve: EccCurve, message: &[u8]) -> Vec<u8> {
        HashOperations::hash(curve.hash_algorithm(), message)
    }

    /// PKCS#1 v1.5 DigestInfo: `30 { 30 { 06 oid, 05 00 }, 04 hash }`
    pub fn pkcs1(algorithm: HashAlgorithm, message: &[u8]) -> Vec<u8> {
        let digest = HashOperations::hash(algorithm, message);
        let algorithm_id = TLVBuilder::new()
            .add(tags::OBJECT_IDENTIFIER, algorithm.oid())
            .add(tags::NULL, &[])
            .wrap(tags::SEQUENCE)
            .build();

        TLVBuilder::new()
            .add_raw(&algorithm_id)
            .add(tags::OCTET_STRING, &digest)
            .wrap(tags::SEQUENCE)
            .build()
    }
}
