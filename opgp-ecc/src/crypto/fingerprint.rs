//! OpenPGP Key Fingerprint Calculation
//!
//! Calculates OpenPGP v4 fingerprints of ECC public keys using SHA-1.

use std::time::{SystemTime, UNIX_EPOCH};

use sha1::{Digest, Sha1};

use super::ecc::EccCurve;

/// OpenPGP public-key algorithm IDs
pub const ALGORITHM_ECDH: u8 = 18;
pub const ALGORITHM_ECDSA: u8 = 19;

/// Fingerprint and generation date of a key, in the form stored on the card
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyFingerprint {
    /// 20-byte SHA-1 fingerprint (C7/C8/C9)
    pub fingerprint: Vec<u8>,
    /// Creation time, big-endian Unix seconds (CE/CF/D0)
    pub created: [u8; 4],
}

/// Bit count of a big-endian integer, as in an OpenPGP MPI header
pub fn mpi_bits(value: &[u8]) -> u16 {
    match value.iter().position(|&b| b != 0) {
        Some(first) => {
            let significant = value.len() - first;
            ((significant - 1) * 8) as u16 + (8 - value[first].leading_zeros() as u16)
        }
        None => 0,
    }
}

/// Calculate OpenPGP v4 fingerprint for an ECDSA key
///
/// Format: SHA-1(0x99 || 2-byte packet length || packet body)
/// Packet body: version(1) || timestamp(4) || algorithm(1) || OID || MPI(point)
pub fn calculate_fingerprint_ecdsa(
    public_key: &[u8], // Uncompressed point (65 bytes for P-256, 97 for P-384, 133 for P-521)
    curve_oid: &[u8],
    timestamp: u32,
) -> Vec<u8> {
    let mut packet = Vec::new();
    packet.push(4); // Version 4
    packet.extend_from_slice(&timestamp.to_be_bytes());
    packet.push(ALGORITHM_ECDSA);

    // OID length + OID
    packet.push(curve_oid.len() as u8);
    packet.extend_from_slice(curve_oid);

    // MPI for public key
    let significant = public_key.iter().position(|&b| b != 0).unwrap_or(public_key.len());
    packet.extend_from_slice(&mpi_bits(public_key).to_be_bytes());
    packet.extend_from_slice(&public_key[significant..]);

    // Hash with prefix
    let packet_len = packet.len() as u16;
    let mut hasher = Sha1::new();
    hasher.update([0x99]);
    hasher.update(packet_len.to_be_bytes());
    hasher.update(&packet);

    hasher.finalize().to_vec()
}

/// Fingerprint and date DO values for a key generated on `curve`
pub fn fingerprint_and_date(curve: EccCurve, public_key: &[u8], timestamp: u32) -> KeyFingerprint {
    KeyFingerprint {
        fingerprint: calculate_fingerprint_ecdsa(public_key, curve.oid(), timestamp),
        created: timestamp.to_be_bytes(),
    }
}

/// Get current Unix timestamp
pub fn current_timestamp() -> u32 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs() as u32
}
