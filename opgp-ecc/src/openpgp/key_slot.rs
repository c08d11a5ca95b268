//! OpenPGP key slots and the data objects attached to each

use crate::crypto::fingerprint::{ALGORITHM_ECDH, ALGORITHM_ECDSA};
use crate::tlv::tags;

/// One of the three key slots of an OpenPGP card
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum KeySlot {
    Signature,
    Decryption,
    Authentication,
}

impl KeySlot {
    pub const ALL: [KeySlot; 3] = [KeySlot::Signature, KeySlot::Decryption, KeySlot::Authentication];

    /// Slot for key number 1, 2 or 3
    pub fn from_key_number(number: u8) -> Option<Self> {
        match number {
            1 => Some(KeySlot::Signature),
            2 => Some(KeySlot::Decryption),
            3 => Some(KeySlot::Authentication),
            _ => None,
        }
    }

    pub fn key_number(self) -> u8 {
        match self {
            KeySlot::Signature => 1,
            KeySlot::Decryption => 2,
            KeySlot::Authentication => 3,
        }
    }

    /// Control reference template selecting this slot
    pub fn crt_tag(self) -> u16 {
        match self {
            KeySlot::Signature => tags::CRT_SIG,
            KeySlot::Decryption => tags::CRT_DEC,
            KeySlot::Authentication => tags::CRT_AUT,
        }
    }

    pub fn from_crt_tag(tag: u16) -> Option<Self> {
        Self::ALL.into_iter().find(|slot| slot.crt_tag() == tag)
    }

    /// Algorithm attributes DO (C1-C3)
    pub fn attributes_tag(self) -> u16 {
        match self {
            KeySlot::Signature => tags::ALGORITHM_ATTRIBUTES_SIG,
            KeySlot::Decryption => tags::ALGORITHM_ATTRIBUTES_DEC,
            KeySlot::Authentication => tags::ALGORITHM_ATTRIBUTES_AUT,
        }
    }

    /// Fingerprint DO (C7-C9)
    pub fn fingerprint_tag(self) -> u16 {
        match self {
            KeySlot::Signature => tags::FINGERPRINT_SIG,
            KeySlot::Decryption => tags::FINGERPRINT_DEC,
            KeySlot::Authentication => tags::FINGERPRINT_AUT,
        }
    }

    /// Generation date DO (CE-D0)
    pub fn timestamp_tag(self) -> u16 {
        match self {
            KeySlot::Signature => tags::TIMESTAMP_SIG,
            KeySlot::Decryption => tags::TIMESTAMP_DEC,
            KeySlot::Authentication => tags::TIMESTAMP_AUT,
        }
    }

    /// OpenPGP algorithm ID of an ECC key in this slot
    ///
    /// The decryption slot holds ECDH keys, the others ECDSA keys.
    pub fn ecc_algorithm_id(self) -> u8 {
        match self {
            KeySlot::Decryption => ALGORITHM_ECDH,
            KeySlot::Signature | KeySlot::Authentication => ALGORITHM_ECDSA,
        }
    }
}
