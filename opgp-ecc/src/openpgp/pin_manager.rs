//! PIN Manager for the virtual card
//!
//! Holds PW1 and PW3 as SHA-256 hashes with their retry counters.

use sha2::{Digest, Sha256};

/// Retries granted to each password
pub const MAX_RETRIES: u8 = 3;

/// Password types
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PINType {
    /// User PIN, for both the 81 and 82 references
    PW1,
    /// Admin PIN (83)
    PW3,
}

impl PINType {
    fn length_range(self) -> (usize, usize) {
        match self {
            PINType::PW1 => (6, 127),
            PINType::PW3 => (8, 127),
        }
    }
}

struct StoredPin {
    hash: Vec<u8>,
    retries: u8,
}

impl StoredPin {
    fn new(pin: &[u8]) -> Self {
        Self {
            hash: PINManager::hash_pin(pin),
            retries: MAX_RETRIES,
        }
    }
}

/// PIN Manager handles PIN verification and retry counters
pub struct PINManager {
    pw1: StoredPin,
    pw3: StoredPin,
}

impl PINManager {
    pub fn new(user_pin: &[u8], admin_pin: &[u8]) -> Self {
        Self {
            pw1: StoredPin::new(user_pin),
            pw3: StoredPin::new(admin_pin),
        }
    }

    /// Hash a PIN using SHA-256
    pub fn hash_pin(pin: &[u8]) -> Vec<u8> {
        let mut hasher = Sha256::new();
        hasher.update(pin);
        hasher.finalize().to_vec()
    }

    /// Verify a PIN, consuming a retry on failure
    ///
    /// A blocked PIN (no retries left) never verifies.
    pub fn verify_pin(&mut self, pin_type: PINType, pin: &[u8]) -> bool {
        let (min_len, max_len) = pin_type.length_range();
        let stored = self.stored_mut(pin_type);

        if stored.retries == 0 {
            return false;
        }

        if pin.len() >= min_len && pin.len() <= max_len && Self::hash_pin(pin) == stored.hash {
            stored.retries = MAX_RETRIES;
            true
        } else {
            stored.retries = stored.retries.saturating_sub(1);
            false
        }
    }

    /// Get retry counter for a PIN type
    pub fn retries(&self, pin_type: PINType) -> u8 {
        match pin_type {
            PINType::PW1 => self.pw1.retries,
            PINType::PW3 => self.pw3.retries,
        }
    }

    fn stored_mut(&mut self, pin_type: PINType) -> &mut StoredPin {
        match pin_type {
            PINType::PW1 => &mut self.pw1,
            PINType::PW3 => &mut self.pw3,
        }
    }
}
