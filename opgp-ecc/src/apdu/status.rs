//! Status Word (SW) constants for APDU responses
//!
//! ISO 7816-4 status words indicating command execution results.

/// Status Word constants
pub struct SW;

impl SW {
    // Success
    pub const SUCCESS: u16 = 0x9000;

    // Execution errors
    pub const EXEC_ERROR: u16 = 0x6400;

    // Checking errors
    pub const WRONG_LENGTH: u16 = 0x6700;
    pub const SECURITY_STATUS_NOT_SATISFIED: u16 = 0x6982;
    pub const AUTH_METHOD_BLOCKED: u16 = 0x6983;
    pub const CONDITIONS_NOT_SATISFIED: u16 = 0x6985;
    pub const WRONG_DATA: u16 = 0x6A80;
    pub const REFERENCED_DATA_NOT_FOUND: u16 = 0x6A88;
    pub const WRONG_P1_P2: u16 = 0x6B00;
    pub const INS_NOT_SUPPORTED: u16 = 0x6D00;
    pub const CLA_NOT_SUPPORTED: u16 = 0x6E00;

    /// Create a "more data available" status word (61xx)
    /// The low byte counts the bytes still available, 00 when 256 or more
    #[inline]
    pub fn bytes_remaining(remaining: usize) -> u16 {
        0x6100 | if remaining > 0xFF { 0 } else { remaining as u16 }
    }

    /// Create a warning with counter (63Cx)
    /// Used to indicate PIN retry count remaining
    #[inline]
    pub fn counter_warning(retries: u8) -> u16 {
        0x63C0 | ((retries & 0x0F) as u16)
    }

    /// Check if a status word is a counter warning (63Cx)
    #[inline]
    pub fn is_counter_warning(sw: u16) -> bool {
        (sw & 0xFFF0) == 0x63C0
    }

    /// Extract retry count from counter warning (63Cx)
    #[inline]
    pub fn get_retry_count(sw: u16) -> Option<u8> {
        if Self::is_counter_warning(sw) {
            Some((sw & 0x0F) as u8)
        } else {
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bytes_remaining() {
        assert_eq!(SW::bytes_remaining(0), 0x6100);
        assert_eq!(SW::bytes_remaining(16), 0x6110);
        assert_eq!(SW::bytes_remaining(255), 0x61FF);
        assert_eq!(SW::bytes_remaining(256), 0x6100);
        assert_eq!(SW::bytes_remaining(300), 0x6100);
    }

    #[test]
    fn test_counter_warning() {
        assert_eq!(SW::counter_warning(3), 0x63C3);
        assert_eq!(SW::counter_warning(0), 0x63C0);
        assert!(!SW::is_counter_warning(0x6300));
        assert_eq!(SW::get_retry_count(0x63C2), Some(2));
        assert_eq!(SW::get_retry_count(0x9000), None);
    }
}
