//! Security State for the virtual card
//!
//! Tracks which PINs have been verified in the current session.

/// Security conditions for OpenPGP card operations
#[allow(non_camel_case_types)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SecurityCondition {
    /// PW1 verified for signing (mode 81)
    PW1_81,
    /// PW1 verified for decryption/authentication (mode 82)
    PW1_82,
    /// PW3 (admin PIN) verified
    PW3,
}

impl SecurityCondition {
    /// Condition granted by VERIFY with this P2
    pub fn from_reference(p2: u8) -> Option<Self> {
        match p2 {
            0x81 => Some(SecurityCondition::PW1_81),
            0x82 => Some(SecurityCondition::PW1_82),
            0x83 => Some(SecurityCondition::PW3),
            _ => None,
        }
    }
}

/// Tracks security state for the current session
#[derive(Debug, Default)]
pub struct SecurityState {
    pw1_81_verified: bool,
    pw1_82_verified: bool,
    pw3_verified: bool,
    /// PW1 status byte (C4, first byte): keep PW1/81 after a signature
    pw1_valid_multiple: bool,
}

impl SecurityState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set or clear a security condition
    pub fn set(&mut self, condition: SecurityCondition, verified: bool) {
        match condition {
            SecurityCondition::PW1_81 => self.pw1_81_verified = verified,
            SecurityCondition::PW1_82 => self.pw1_82_verified = verified,
            SecurityCondition::PW3 => self.pw3_verified = verified,
        }
    }

    /// Check if a security condition is satisfied
    pub fn is_verified(&self, condition: SecurityCondition) -> bool {
        match condition {
            SecurityCondition::PW1_81 => self.pw1_81_verified,
            SecurityCondition::PW1_82 => self.pw1_82_verified,
            SecurityCondition::PW3 => self.pw3_verified,
        }
    }

    /// Clear all security conditions (on card reset or power cycle)
    pub fn clear_all(&mut self) {
        self.pw1_81_verified = false;
        self.pw1_82_verified = false;
        self.pw3_verified = false;
    }

    /// Called after a signing operation
    /// If PW1 is not set to "valid for multiple commands", clear PW1_81
    pub fn after_sign(&mut self) {
        if !self.pw1_valid_multiple {
            self.pw1_81_verified = false;
        }
    }

    pub fn set_pw1_valid_multiple(&mut self, valid: bool) {
        self.pw1_valid_multiple = valid;
    }

    pub fn pw1_valid_multiple(&self) -> bool {
        self.pw1_valid_multiple
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_initial_state() {
        let state = SecurityState::new();
        assert!(!state.is_verified(SecurityCondition::PW1_81));
        assert!(!state.is_verified(SecurityCondition::PW1_82));
        assert!(!state.is_verified(SecurityCondition::PW3));
        assert!(!state.pw1_valid_multiple());
    }

    #[test]
    fn test_set_and_clear() {
        let mut state = SecurityState::new();
        state.set(SecurityCondition::PW1_81, true);
        state.set(SecurityCondition::PW3, true);
        assert!(state.is_verified(SecurityCondition::PW1_81));
        assert!(!state.is_verified(SecurityCondition::PW1_82));

        state.set(SecurityCondition::PW3, false);
        assert!(!state.is_verified(SecurityCondition::PW3));

        state.clear_all();
        assert!(!state.is_verified(SecurityCondition::PW1_81));
    }

    #[test]
    fn test_after_sign_single() {
        let mut state = SecurityState::new();
        state.set(SecurityCondition::PW1_81, true);
        state.after_sign();
        assert!(!state.is_verified(SecurityCondition::PW1_81));
    }

    #[test]
    fn test_after_sign_multiple() {
        let mut state = SecurityState::new();
        state.set_pw1_valid_multiple(true);
        state.set(SecurityCondition::PW1_81, true);
        state.after_sign();
        assert!(state.is_verified(SecurityCondition::PW1_81));
    }

    #[test]
    fn test_from_reference() {
        assert_eq!(SecurityCondition::from_reference(0x82), Some(SecurityCondition::PW1_82));
        assert_eq!(SecurityCondition::from_reference(0x84), None);
    }
}
