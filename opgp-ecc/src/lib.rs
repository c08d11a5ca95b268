//! OpenPGP card key management for ECDSA and ECDH keys
//!
//! This crate builds and reads the data objects an OpenPGP card exchanges
//! for ECC keys, and sends them as APDUs:
//!
//! - [`tlv`]: the BER-TLV codec
//! - [`openpgp::templates`]: signature, key import, ECDH and public key objects
//! - [`crypto`]: P-256, P-384, P-521 and secp256k1 keys, digests and fingerprints
//! - [`card`]: the command client, its configuration and the transport trait
//! - [`openpgp`]: a virtual card and the provisioning workflow
//!
//! The supported curves are NIST P-256, NIST P-384, NIST P-521 and secp256k1.

pub mod apdu;
pub mod card;
pub mod crypto;
pub mod openpgp;
pub mod tlv;
