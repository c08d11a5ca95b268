//! Cryptographic Operations
//!
//! Key material for OpenPGP ECC slots: key generation, ECDSA, ECDH,
//! digests and fingerprints.

pub mod ecc;
pub mod fingerprint;
pub mod hash;

pub use self::ecc::{CurveOID, EccCurve, EccError, EccOperations};
pub use self::fingerprint::{calculate_fingerprint_ecdsa, current_timestamp, fingerprint_and_date, KeyFingerprint};
pub use self::hash::{DigestInfo, HashAlgorithm, HashOperations};
