//! Byte-level link to a card

use super::CardError;

/// Sends one command APDU and returns the raw response, status word included
///
/// Implement this over PC/SC or any other reader stack. Responses are
/// returned unmodified; `61xx` and error statuses are handled by
/// [`CardClient`](super::CardClient).
pub trait CardTransport {
    fn transmit(&mut self, apdu: &[u8]) -> Result<Vec<u8>, CardError>;
}

impl<T: CardTransport + ?Sized> CardTransport for &mut T {
    fn transmit(&mut self, apdu: &[u8]) -> Result<Vec<u8>, CardError> {
        (**self).transmit(apdu)
    }
}

impl<T: CardTransport + ?Sized> CardTransport for Box<T> {
    fn transmit(&mut self, apdu: &[u8]) -> Result<Vec<u8>, CardError> {
        (**self).transmit(apdu)
    }
}
