//! TLV (Tag-Length-Value) encoding and decoding
//!
//! This module implements the ISO 7816 BER-TLV subset used by OpenPGP
//! cards: one- and two-byte tags, short and long form lengths, and
//! constructed objects nested by the tag class bit.
//!
//! # Example
//! ```ignore
//! use opgp_ecc::tlv::{tags, TLV};
//!
//! let response = TLV::parse(&card_bytes)?;
//! let point = response.require(tags::ECC_PUBLIC_KEY)?;
//! ```

mod encoder;
mod parser;

pub use encoder::{TLVBuilder, TLVEncoder};
pub use parser::{
    is_constructed_tag, read_list, read_single, read_taglen_list, Malformed, TLVError, TLVValue, TLV,
};

/// Convert a byte slice to a spaced hex string for logs
pub fn hexify(value: &[u8]) -> String {
    value
        .iter()
        .map(|b| format!("{:02X}", b))
        .collect::<Vec<_>>()
        .join(" ")
}

/// OpenPGP tag constants used by ECC key management
pub mod tags {
    // Application related data
    pub const APPLICATION_RELATED_DATA: u16 = 0x006E;
    pub const DISCRETIONARY_DATA: u16 = 0x0073;
    pub const SECURITY_SUPPORT_TEMPLATE: u16 = 0x007A;
    pub const SIGNATURE_COUNTER: u16 = 0x0093;

    // Algorithm attributes, one per key slot
    pub const ALGORITHM_ATTRIBUTES_SIG: u16 = 0x00C1;
    pub const ALGORITHM_ATTRIBUTES_DEC: u16 = 0x00C2;
    pub const ALGORITHM_ATTRIBUTES_AUT: u16 = 0x00C3;
    pub const PW_STATUS_BYTES: u16 = 0x00C4;
    pub const FINGERPRINTS: u16 = 0x00C5;
    pub const KEY_TIMESTAMPS: u16 = 0x00CD;

    // Individual fingerprints
    pub const FINGERPRINT_SIG: u16 = 0x00C7;
    pub const FINGERPRINT_DEC: u16 = 0x00C8;
    pub const FINGERPRINT_AUT: u16 = 0x00C9;

    // Key timestamps
    pub const TIMESTAMP_SIG: u16 = 0x00CE;
    pub const TIMESTAMP_DEC: u16 = 0x00CF;
    pub const TIMESTAMP_AUT: u16 = 0x00D0;

    // Key data
    pub const PUBLIC_KEY_TEMPLATE: u16 = 0x7F49;
    pub const EXTENDED_HEADER_LIST: u16 = 0x004D;
    pub const PRIVATE_KEY_TEMPLATE: u16 = 0x7F48;
    pub const CONCATENATED_KEY_DATA: u16 = 0x5F48;

    // CRT (Control Reference Template) tags
    pub const CRT_SIG: u16 = 0x00B6;
    pub const CRT_DEC: u16 = 0x00B8;
    pub const CRT_AUT: u16 = 0x00A4;

    // Public key components (within 7F49)
    pub const RSA_MODULUS: u16 = 0x0081;
    pub const RSA_EXPONENT: u16 = 0x0082;
    pub const ECC_PUBLIC_KEY: u16 = 0x0086;

    // Private key components (within 7F48)
    pub const ECC_PRIVATE_KEY: u16 = 0x0092;
    pub const ECC_IMPORT_PUBLIC_KEY: u16 = 0x0099;

    // ECDH cipher DO for PSO:DECIPHER
    pub const CIPHER_DO: u16 = 0x00A6;

    // DER signature value
    pub const SEQUENCE: u16 = 0x0030;
    pub const INTEGER: u16 = 0x0002;
    pub const OCTET_STRING: u16 = 0x0004;
    pub const NULL: u16 = 0x0005;
    pub const OBJECT_IDENTIFIER: u16 = 0x0006;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hexify() {
        assert_eq!(hexify(&[0x7F, 0x49, 0x00]), "7F 49 00");
        assert_eq!(hexify(&[]), "");
    }

    #[test]
    fn test_round_trip_nested_tree() {
        let mut root = TLV::empty(tags::PUBLIC_KEY_TEMPLATE);
        root.append(tags::RSA_MODULUS, vec![0xC3; 256]).unwrap();
        root.append(tags::RSA_EXPONENT, vec![0x01, 0x00, 0x01]).unwrap();

        let encoded = root.encode();
        let parsed = TLV::parse(&encoded).unwrap();
        assert_eq!(parsed, root);
        assert_eq!(parsed.encode(), encoded);
    }

    #[test]
    fn test_canonical_length_boundaries() {
        for (size, header) in [
            (127usize, vec![0x04, 0x7F]),
            (128, vec![0x04, 0x81, 0x80]),
            (300, vec![0x04, 0x82, 0x01, 0x2C]),
        ] {
            let encoded = TLV::new(tags::OCTET_STRING, vec![0x5A; size]).encode();
            assert_eq!(&encoded[..header.len()], header.as_slice());
            assert_eq!(encoded.len(), header.len() + size);
        }
    }
}
