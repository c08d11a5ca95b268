//! Card client errors

use thiserror::Error;

use crate::apdu::APDUError;
use crate::crypto::{EccCurve, EccError};
use crate::tlv::TLVError;

/// Errors raised while talking to a card
#[derive(Debug, Error)]
pub enum CardError {
    /// The byte pipe to the card failed
    #[error("transport error: {0}")]
    Transport(String),

    /// The card answered with a status word other than 9000
    #[error("card returned status {0:04X}")]
    Status(u16),

    /// The card refused a command reported only as success or failure
    #[error("card rejected {0}")]
    Rejected(&'static str),

    #[error(transparent)]
    Tlv(#[from] TLVError),

    #[error(transparent)]
    Ecc(#[from] EccError),

    #[error(transparent)]
    Apdu(#[from] APDUError),

    /// The card returned a public key that is not a point on the expected curve
    #[error("card returned an invalid {0} public key")]
    InvalidPublicKey(EccCurve),

    /// A raw signature that does not split into `r || s`
    #[error("raw signature of {0} bytes cannot be split into r and s")]
    InvalidSignature(usize),

    #[error("unsupported operation: {0}")]
    UnsupportedOperation(&'static str),
}
