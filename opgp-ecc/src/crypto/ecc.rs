//! ECC Operations (NIST P-256, P-384, P-521, secp256k1)
//!
//! Key generation, ECDSA and ECDH using the p256, p384, p521 and k256 crates.
//! Everything is exchanged as raw bytes: scalars as big-endian field
//! elements, public keys as uncompressed SEC1 points (`04 || x || y`).

use std::fmt;
use std::str::FromStr;

use log::debug;
use p256::ecdsa::signature::hazmat::{PrehashSigner, PrehashVerifier};
use rand::rngs::OsRng;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::hash::HashAlgorithm;

/// ECC operation errors
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum EccError {
    #[error("invalid key: {0}")]
    InvalidKey(String),

    #[error("invalid signature: {0}")]
    InvalidSignature(String),

    #[error("signing failed: {0}")]
    SigningFailed(String),

    #[error("unsupported curve: {0}")]
    UnsupportedCurve(String),
}

/// Curve OIDs (DER content bytes, without tag and length)
pub struct CurveOID;

impl CurveOID {
    pub const NIST_P256: &'static [u8] = &[0x2A, 0x86, 0x48, 0xCE, 0x3D, 0x03, 0x01, 0x07];
    pub const NIST_P384: &'static [u8] = &[0x2B, 0x81, 0x04, 0x00, 0x22];
    pub const NIST_P521: &'static [u8] = &[0x2B, 0x81, 0x04, 0x00, 0x23];
    pub const SECP256K1: &'static [u8] = &[0x2B, 0x81, 0x04, 0x00, 0x0A];
}

/// ECC curve types
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EccCurve {
    #[serde(rename = "nistp256", alias = "p256", alias = "ansix9p256r1")]
    P256,
    #[serde(rename = "nistp384", alias = "p384", alias = "ansix9p384r1")]
    P384,
    #[serde(rename = "nistp521", alias = "p521", alias = "ansix9p521r1")]
    P521,
    #[serde(rename = "secp256k1")]
    Secp256k1,
}

impl EccCurve {
    /// Every supported curve
    pub const ALL: [EccCurve; 4] = [
        EccCurve::P256,
        EccCurve::P384,
        EccCurve::P521,
        EccCurve::Secp256k1,
    ];

    /// Curve OID as stored in algorithm attributes and fingerprints
    pub fn oid(self) -> &'static [u8] {
        match self {
            EccCurve::P256 => CurveOID::NIST_P256,
            EccCurve::P384 => CurveOID::NIST_P384,
            EccCurve::P521 => CurveOID::NIST_P521,
            EccCurve::Secp256k1 => CurveOID::SECP256K1,
        }
    }

    /// Look up a curve by OID
    pub fn from_oid(oid: &[u8]) -> Option<Self> {
        Self::ALL.into_iter().find(|curve| curve.oid() == oid)
    }

    pub fn name(self) -> &'static str {
        match self {
            EccCurve::P256 => "nistp256",
            EccCurve::P384 => "nistp384",
            EccCurve::P521 => "nistp521",
            EccCurve::Secp256k1 => "secp256k1",
        }
    }

    /// Size of a field element, and of the private scalar
    pub fn field_size(self) -> usize {
        match self {
            EccCurve::P256 | EccCurve::Secp256k1 => 32,
            EccCurve::P384 => 48,
            EccCurve::P521 => 66,
        }
    }

    /// Size of an uncompressed public point
    pub fn public_key_size(self) -> usize {
        1 + 2 * self.field_size()
    }

    /// Hash producing the ECDSA signing input on this curve
    pub fn hash_algorithm(self) -> HashAlgorithm {
        match self {
            EccCurve::P256 | EccCurve::Secp256k1 => HashAlgorithm::SHA256,
            EccCurve::P384 => HashAlgorithm::SHA384,
            EccCurve::P521 => HashAlgorithm::SHA512,
        }
    }
}

impl fmt::Display for EccCurve {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for EccCurve {
    type Err = EccError;

    /// Accepts curve names and hex-encoded OIDs
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "nistp256" | "p256" | "p-256" | "ansix9p256r1" | "prime256v1" => Ok(EccCurve::P256),
            "nistp384" | "p384" | "p-384" | "ansix9p384r1" | "secp384r1" => Ok(EccCurve::P384),
            "nistp521" | "p521" | "p-521" | "ansix9p521r1" | "secp521r1" => Ok(EccCurve::P521),
            "secp256k1" => Ok(EccCurve::Secp256k1),
            other => hex::decode(other)
                .ok()
                .and_then(|oid| EccCurve::from_oid(&oid))
                .ok_or_else(|| EccError::UnsupportedCurve(s.to_string())),
        }
    }
}

/// Run `$body` with `$ec` bound to the curve crate of `$curve`
macro_rules! with_curve {
    ($curve:expr, $ec:ident => $body:expr) => {
        match $curve {
            EccCurve::P256 => {
                use p256 as $ec;
                $body
            }
            EccCurve::P384 => {
                use p384 as $ec;
                $body
            }
            EccCurve::P521 => {
                use p521 as $ec;
                $body
            }
            EccCurve::Secp256k1 => {
                use k256 as $ec;
                $body
            }
        }
    };
}

/// ECC Operations
pub struct EccOperations;

impl EccOperations {
    /// Generate a new ECC key pair
    /// Returns (private_key_bytes, public_key_bytes)
    pub fn generate_keypair(curve: EccCurve) -> Result<(Vec<u8>, Vec<u8>), EccError> {
        debug!("Generating {} keypair", curve);

        with_curve!(curve, ec => {
            let signing_key = ec::ecdsa::SigningKey::random(&mut OsRng);
            let point = ec::ecdsa::VerifyingKey::from(&signing_key).to_encoded_point(false);
            Ok((signing_key.to_bytes().to_vec(), point.as_bytes().to_vec()))
        })
    }

    /// Get the public key from a private key
    pub fn get_public_key(curve: EccCurve, private_key: &[u8]) -> Result<Vec<u8>, EccError> {
        Self::check_private_key(curve, private_key)?;

        with_curve!(curve, ec => {
            let signing_key = ec::ecdsa::SigningKey::from_slice(private_key)
                .map_err(|e| EccError::InvalidKey(e.to_string()))?;
            let point = ec::ecdsa::VerifyingKey::from(&signing_key).to_encoded_point(false);
            Ok(point.as_bytes().to_vec())
        })
    }

    /// Sign an already computed digest
    /// Returns the raw signature `r || s`, each component padded to the field size
    pub fn sign_prehash(curve: EccCurve, private_key: &[u8], digest: &[u8]) -> Result<Vec<u8>, EccError> {
        Self::check_private_key(curve, private_key)?;

        with_curve!(curve, ec => {
            let signing_key = ec::ecdsa::SigningKey::from_slice(private_key)
                .map_err(|e| EccError::InvalidKey(e.to_string()))?;
            let signature: ec::ecdsa::Signature = signing_key
                .sign_prehash(digest)
                .map_err(|e| EccError::SigningFailed(e.to_string()))?;
            Ok(signature.to_bytes().to_vec())
        })
    }

    /// Verify a DER signature (`30 { 02 r, 02 s }`) over a digest
    ///
    /// A well-formed signature that does not match yields `Ok(false)`.
    pub fn verify(
        curve: EccCurve,
        public_key: &[u8],
        digest: &[u8],
        signature_der: &[u8],
    ) -> Result<bool, EccError> {
        with_curve!(curve, ec => {
            let verifying_key = ec::ecdsa::VerifyingKey::from_sec1_bytes(public_key)
                .map_err(|e| EccError::InvalidKey(e.to_string()))?;
            let signature = ec::ecdsa::Signature::from_der(signature_der)
                .map_err(|e| EccError::InvalidSignature(e.to_string()))?;
            Ok(verifying_key.verify_prehash(digest, &signature).is_ok())
        })
    }

    /// Perform ECDH key agreement
    /// Returns the shared secret (x-coordinate of the shared point)
    pub fn ecdh(curve: EccCurve, private_key: &[u8], peer_public_key: &[u8]) -> Result<Vec<u8>, EccError> {
        Self::check_private_key(curve, private_key)?;

        debug!(
            "{} ECDH: private {} bytes, public {} bytes",
            curve,
            private_key.len(),
            peer_public_key.len()
        );

        with_curve!(curve, ec => {
            let secret_key = ec::SecretKey::from_slice(private_key)
                .map_err(|e| EccError::InvalidKey(format!("Invalid private key: {}", e)))?;
            let public_key = ec::PublicKey::from_sec1_bytes(peer_public_key)
                .map_err(|e| EccError::InvalidKey(format!("Invalid public key: {}", e)))?;
            let shared = ec::ecdh::diffie_hellman(secret_key.to_nonzero_scalar(), public_key.as_affine());
            Ok(shared.raw_secret_bytes().to_vec())
        })
    }

    /// Check that `point` is an uncompressed point on `curve`
    pub fn validate_public_key(curve: EccCurve, point: &[u8]) -> bool {
        if point.len() != curve.public_key_size() || point[0] != 0x04 {
            return false;
        }

        with_curve!(curve, ec => ec::PublicKey::from_sec1_bytes(point).is_ok())
    }

    fn check_private_key(curve: EccCurve, private_key: &[u8]) -> Result<(), EccError> {
        if private_key.len() != curve.field_size() {
            return Err(EccError::InvalidKey(format!(
                "Invalid {} key length: expected {}, got {}",
                curve,
                curve.field_size(),
                private_key.len()
            )));
        }
        Ok(())
    }
}
