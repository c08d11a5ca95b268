//! APDU (Application Protocol Data Unit) handling
//!
//! Command serialization and parsing for ISO 7816-4 APDUs, plus response
//! parsing and status words.
//!
//! # Example
//! ```ignore
//! use opgp_ecc::apdu::{parse_apdu, APDU, ins};
//!
//! let cmd = APDU::with_data(0x00, ins::VERIFY, 0x00, 0x81, b"123456".to_vec());
//! let raw = cmd.to_bytes(false)?;
//! assert_eq!(parse_apdu(&raw)?, cmd);
//! ```

mod response;
mod status;

pub use response::Response;
pub use status::SW;

use thiserror::Error;

/// Largest data field of a short APDU
pub const SHORT_MAX_DATA: usize = 255;

/// Largest data field of an extended APDU
pub const EXTENDED_MAX_DATA: usize = 65535;

/// Errors that can occur while encoding or parsing APDUs
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum APDUError {
    #[error("APDU too short: expected at least 4 bytes, got {0}")]
    TooShort(usize),

    #[error("response too short: expected at least 2 status bytes, got {0}")]
    ResponseTooShort(usize),

    #[error("Invalid APDU length")]
    InvalidLength,

    #[error("Invalid extended APDU format")]
    InvalidExtendedFormat,

    #[error("{len} data bytes do not fit a {} APDU", apdu_form(.extended))]
    DataTooLong { len: usize, extended: bool },

    #[error("Le {le} does not fit a {} APDU", apdu_form(.extended))]
    LeTooLarge { le: u32, extended: bool },
}

fn apdu_form(extended: &bool) -> &'static str {
    if *extended {
        "extended"
    } else {
        "short"
    }
}

/// An APDU command
///
/// # Fields
/// - `cla`: Class byte (bit 4 marks command chaining)
/// - `ins`: Instruction byte
/// - `p1`, `p2`: Parameter bytes
/// - `data`: Command data (may be empty)
/// - `le`: Expected response length (None if not specified)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct APDU {
    /// Class byte (CLA)
    pub cla: u8,
    /// Instruction byte (INS)
    pub ins: u8,
    /// Parameter 1 (P1)
    pub p1: u8,
    /// Parameter 2 (P2)
    pub p2: u8,
    /// Command data (may be empty)
    pub data: Vec<u8>,
    /// Expected response length (Le), None if not specified
    pub le: Option<u32>,
}

impl APDU {
    /// Create a new APDU with just the header (CLA, INS, P1, P2)
    pub fn new(cla: u8, ins: u8, p1: u8, p2: u8) -> Self {
        Self::with_data(cla, ins, p1, p2, Vec::new())
    }

    /// Create a new APDU with data
    pub fn with_data(cla: u8, ins: u8, p1: u8, p2: u8, data: Vec<u8>) -> Self {
        Self {
            cla,
            ins,
            p1,
            p2,
            data,
            le: None,
        }
    }

    /// Set the expected response length
    pub fn expect(mut self, le: u32) -> Self {
        self.le = Some(le);
        self
    }

    /// Check if this is a chained APDU (CLA bit 4 set)
    pub fn is_chained(&self) -> bool {
        (self.cla & 0x10) != 0
    }

    /// Get P1-P2 combined as a u16 (useful for PSO commands)
    pub fn p1p2(&self) -> u16 {
        ((self.p1 as u16) << 8) | (self.p2 as u16)
    }

    /// Serialize to the short or extended wire form
    ///
    /// - Short: CLA INS P1 P2 [Lc Data] [Le], Le=256 encoded as 00
    /// - Extended: CLA INS P1 P2 00 [Lc1 Lc2 Data] [Le1 Le2], Le=65536 encoded as 00 00
    pub fn to_bytes(&self, extended: bool) -> Result<Vec<u8>, APDUError> {
        let max_data = if extended { EXTENDED_MAX_DATA } else { SHORT_MAX_DATA };
        if self.data.len() > max_data {
            return Err(APDUError::DataTooLong {
                len: self.data.len(),
                extended,
            });
        }

        let mut out = vec![self.cla, self.ins, self.p1, self.p2];

        if extended {
            if !self.data.is_empty() || self.le.is_some() {
                out.push(0x00);
            }
            if !self.data.is_empty() {
                out.extend_from_slice(&(self.data.len() as u16).to_be_bytes());
                out.extend_from_slice(&self.data);
            }
            if let Some(le) = self.le {
                if le == 0 || le > 65536 {
                    return Err(APDUError::LeTooLarge { le, extended });
                }
                out.extend_from_slice(&((le & 0xFFFF) as u16).to_be_bytes());
            }
        } else {
            if !self.data.is_empty() {
                out.push(self.data.len() as u8);
                out.extend_from_slice(&self.data);
            }
            if let Some(le) = self.le {
                if le == 0 || le > 256 {
                    return Err(APDUError::LeTooLarge { le, extended });
                }
                out.push((le & 0xFF) as u8);
            }
        }

        Ok(out)
    }
}

/// Parse raw bytes into an APDU
///
/// Supports both short and extended APDU formats:
/// - Short: CLA INS P1 P2 [Lc Data] [Le]
/// - Extended: CLA INS P1 P2 00 Lc1 Lc2 Data [Le1 Le2]
///
/// A body starting with 00 and longer than one byte is extended: a short
/// Lc is never zero.
pub fn parse_apdu(data: &[u8]) -> Result<APDU, APDUError> {
    if data.len() < 4 {
        return Err(APDUError::TooShort(data.len()));
    }

    let (cla, ins, p1, p2) = (data[0], data[1], data[2], data[3]);
    let body = &data[4..];

    let (payload, le) = match body {
        [] => (Vec::new(), None),
        [0x00, rest @ ..] if !rest.is_empty() => parse_extended_body(rest)?,
        _ => parse_short_body(body)?,
    };

    Ok(APDU {
        cla,
        ins,
        p1,
        p2,
        data: payload,
        le,
    })
}

/// Short body (Lc/Le up to 255/256)
fn parse_short_body(body: &[u8]) -> Result<(Vec<u8>, Option<u32>), APDUError> {
    let short_le = |b: u8| if b == 0 { 256 } else { b as u32 };

    // Le only
    if let [le] = body {
        return Ok((Vec::new(), Some(short_le(*le))));
    }

    let lc = body[0] as usize;
    match body.len() - 1 {
        n if n == lc => Ok((body[1..].to_vec(), None)),
        n if n == lc + 1 => Ok((body[1..=lc].to_vec(), Some(short_le(body[lc + 1])))),
        _ => Err(APDUError::InvalidLength),
    }
}

/// Extended body after the leading 00 (Lc/Le up to 65535/65536)
fn parse_extended_body(body: &[u8]) -> Result<(Vec<u8>, Option<u32>), APDUError> {
    let word = |hi: u8, lo: u8| ((hi as u32) << 8) | lo as u32;
    let extended_le = |w: u32| if w == 0 { 65536 } else { w };

    match body {
        // Le only
        [hi, lo] => Ok((Vec::new(), Some(extended_le(word(*hi, *lo))))),
        [hi, lo, rest @ ..] => {
            let lc = word(*hi, *lo) as usize;
            if lc == 0 {
                return Err(APDUError::InvalidExtendedFormat);
            }
            match rest.len() {
                n if n == lc => Ok((rest.to_vec(), None)),
                n if n == lc + 2 => Ok((
                    rest[..lc].to_vec(),
                    Some(extended_le(word(rest[lc], rest[lc + 1]))),
                )),
                _ => Err(APDUError::InvalidLength),
            }
        }
        _ => Err(APDUError::InvalidExtendedFormat),
    }
}

/// OpenPGP Instruction bytes
pub mod ins {
    pub const GET_DATA: u8 = 0xCA;
    pub const VERIFY: u8 = 0x20;
    pub const PUT_DATA: u8 = 0xDA;
    pub const PUT_DATA_ODD: u8 = 0xDB;
    pub const GENERATE_ASYMMETRIC_KEY_PAIR: u8 = 0x47;
    pub const PSO: u8 = 0x2A;
    pub const INTERNAL_AUTHENTICATE: u8 = 0x88;
    pub const GET_RESPONSE: u8 = 0xC0;
}

/// PSO (Perform Security Operation) P1-P2 values
pub mod pso {
    /// Compute Digital Signature (P1=0x9E, P2=0x9A)
    pub const CDS: u16 = 0x9E9A;
    /// Decipher (P1=0x80, P2=0x86)
    pub const DECIPHER: u16 = 0x8086;
}

/// CLA byte of a chained command that is not the last one
pub const CLA_CHAINING: u8 = 0x10;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_case1_no_data_no_le() {
        let apdu = parse_apdu(&[0x00, 0xCA, 0x00, 0xC4]).unwrap();
        assert_eq!(apdu, APDU::new(0x00, ins::GET_DATA, 0x00, 0xC4));
        assert_eq!(apdu.to_bytes(false).unwrap(), vec![0x00, 0xCA, 0x00, 0xC4]);
    }

    #[test]
    fn test_case2_le_only() {
        let apdu = parse_apdu(&[0x00, 0xCA, 0x00, 0x6E, 0x00]).unwrap();
        assert_eq!(apdu.ins, 0xCA);
        assert!(apdu.data.is_empty());
        assert_eq!(apdu.le, Some(256)); // 0x00 means 256
    }

    #[test]
    fn test_case3_lc_data() {
        let raw = hex::decode("0020008106313233343536").unwrap();
        let apdu = parse_apdu(&raw).unwrap();
        assert_eq!(apdu.ins, ins::VERIFY);
        assert_eq!(apdu.data, b"123456");
        assert!(apdu.le.is_none());
        assert_eq!(apdu.to_bytes(false).unwrap(), raw);
    }

    #[test]
    fn test_case4_lc_data_le() {
        let cmd = APDU::with_data(0x00, ins::GENERATE_ASYMMETRIC_KEY_PAIR, 0x80, 0x00, vec![0xB6, 0x00])
            .expect(256);
        let raw = cmd.to_bytes(false).unwrap();
        assert_eq!(raw, hex::decode("0047800002B60000").unwrap());
        assert_eq!(parse_apdu(&raw).unwrap(), cmd);
    }

    #[test]
    fn test_extended_encoding() {
        let cmd = APDU::with_data(0x00, ins::PUT_DATA_ODD, 0x3F, 0xFF, vec![0xAB; 300]);
        let raw = cmd.to_bytes(true).unwrap();
        assert_eq!(&raw[..7], &[0x00, 0xDB, 0x3F, 0xFF, 0x00, 0x01, 0x2C]);
        assert_eq!(raw.len(), 7 + 300);
        assert_eq!(parse_apdu(&raw).unwrap(), cmd);

        let cmd = cmd.expect(65536);
        let raw = cmd.to_bytes(true).unwrap();
        assert_eq!(&raw[raw.len() - 2..], &[0x00, 0x00]);
        assert_eq!(parse_apdu(&raw).unwrap(), cmd);
    }

    #[test]
    fn test_extended_le_only() {
        let cmd = APDU::new(0x00, ins::GET_RESPONSE, 0x00, 0x00).expect(65536);
        let raw = cmd.to_bytes(true).unwrap();
        assert_eq!(raw, vec![0x00, 0xC0, 0x00, 0x00, 0x00, 0x00, 0x00]);
        assert_eq!(parse_apdu(&raw).unwrap(), cmd);
    }

    #[test]
    fn test_short_form_limits() {
        let cmd = APDU::with_data(0x00, ins::PUT_DATA_ODD, 0x3F, 0xFF, vec![0x00; 256]);
        assert_eq!(
            cmd.to_bytes(false),
            Err(APDUError::DataTooLong { len: 256, extended: false })
        );
        assert!(cmd.to_bytes(true).is_ok());

        let cmd = APDU::new(0x00, ins::GET_DATA, 0x00, 0x6E).expect(1024);
        assert_eq!(
            cmd.to_bytes(false),
            Err(APDUError::LeTooLarge { le: 1024, extended: false })
        );
    }

    #[test]
    fn test_chained_command() {
        let apdu = parse_apdu(&[0x10, 0xDB, 0x3F, 0xFF, 0x04, 0x01, 0x02, 0x03, 0x04]).unwrap();
        assert!(apdu.is_chained());
        assert_eq!(apdu.cla, CLA_CHAINING);
    }

    #[test]
    fn test_p1p2_helper() {
        let apdu = parse_apdu(&[0x00, 0x2A, 0x9E, 0x9A]).unwrap();
        assert_eq!(apdu.p1p2(), pso::CDS);
    }

    #[test]
    fn test_invalid_lengths() {
        assert_eq!(parse_apdu(&[0x00, 0xA4, 0x04]), Err(APDUError::TooShort(3)));
        assert_eq!(
            parse_apdu(&[0x00, 0xDA, 0x00, 0xC4, 0x05, 0x01]),
            Err(APDUError::InvalidLength)
        );
        assert_eq!(
            parse_apdu(&[0x00, 0xDA, 0x00, 0xC4, 0x00, 0x00, 0x03, 0x01]),
            Err(APDUError::InvalidLength)
        );
    }
}
