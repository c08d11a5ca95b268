//! OpenPGP card command client
//!
//! Builds command APDUs, sends them through a [`CardTransport`] and
//! collects responses. Long commands go out as extended APDUs or, when the
//! reader cannot do extended length, as a chain of short ones. `61xx`
//! answers are drained with GET RESPONSE.

use log::{debug, warn};

use super::{CardError, CardTransport};
use crate::apdu::{ins, Response, APDU, CLA_CHAINING, SHORT_MAX_DATA, SW};
use crate::crypto::EccCurve;
use crate::openpgp::{templates, KeySlot};
use crate::tlv::{hexify, TLVEncoder};

/// Password references for VERIFY (P2)
pub mod pw {
    /// PW1 for PSO:CDS
    pub const PW1_SIGN: u8 = 0x81;
    /// PW1 for decryption and authentication
    pub const PW1_OTHER: u8 = 0x82;
    /// PW3, the admin password
    pub const PW3: u8 = 0x83;
}

/// GENERATE ASYMMETRIC KEY PAIR modes (P1)
const GENERATE: u8 = 0x80;
const READ_PUBLIC_KEY: u8 = 0x81;

/// OpenPGP command client over a card transport
pub struct CardClient<T: CardTransport> {
    transport: T,
    extended_length: bool,
}

impl<T: CardTransport> CardClient<T> {
    pub fn new(transport: T, extended_length: bool) -> Self {
        Self {
            transport,
            extended_length,
        }
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }

    pub fn into_inner(self) -> T {
        self.transport
    }

    pub fn extended_length(&self) -> bool {
        self.extended_length
    }

    /// Send a command and collect its complete response
    ///
    /// The returned status word is the one of the last exchange. Only
    /// transport and encoding failures are errors here.
    pub fn transceive(&mut self, command: &APDU) -> Result<Response, CardError> {
        let mut response = self.send_command(command)?;
        let mut data = std::mem::take(&mut response.data);

        while let Some(available) = response.available_response() {
            let le = if available == 0 { 256 } else { available as u32 };
            let get_response = APDU::new(0x00, ins::GET_RESPONSE, 0x00, 0x00).expect(le);
            response = self.exchange(&get_response, false)?;
            data.append(&mut response.data);
        }

        debug!(
            "INS {:02X} -> SW {:04X}, {} bytes",
            command.ins,
            response.sw(),
            data.len()
        );
        Ok(Response::new(data, response.sw()))
    }

    /// VERIFY: present a password for `pw_ref` (see [`pw`])
    pub fn verify(&mut self, pw_ref: u8, pin: &[u8]) -> Result<bool, CardError> {
        let command = APDU::with_data(0x00, ins::VERIFY, 0x00, pw_ref, pin.to_vec());
        let response = self.transceive(&command)?;
        if let Some(retries) = SW::get_retry_count(response.sw()) {
            warn!("PW {:02X} rejected, {} retries left", pw_ref, retries);
        }
        Ok(response.is_okay())
    }

    /// PUT DATA (even INS)
    pub fn put_data(&mut self, p1: u8, p2: u8, data: &[u8]) -> Result<bool, CardError> {
        let command = APDU::with_data(0x00, ins::PUT_DATA, p1, p2, data.to_vec());
        self.transceive_ok(&command)
    }

    /// PUT DATA for a DO addressed by its tag
    pub fn put_data_object(&mut self, tag: u16, data: &[u8]) -> Result<bool, CardError> {
        let [p1, p2] = tag.to_be_bytes();
        self.put_data(p1, p2, data)
    }

    /// PUT DATA (odd INS), used for key import with `3F FF`
    pub fn put_data_odd(&mut self, p1: u8, p2: u8, data: &[u8]) -> Result<bool, CardError> {
        let command = APDU::with_data(0x00, ins::PUT_DATA_ODD, p1, p2, data.to_vec());
        self.transceive_ok(&command)
    }

    /// GET DATA
    pub fn get_data(&mut self, p1: u8, p2: u8) -> Result<Vec<u8>, CardError> {
        let command = APDU::new(0x00, ins::GET_DATA, p1, p2).expect(self.max_le());
        self.transceive_data(&command)
    }

    /// GET DATA for a DO addressed by its tag
    pub fn get_data_object(&mut self, tag: u16) -> Result<Vec<u8>, CardError> {
        let [p1, p2] = tag.to_be_bytes();
        self.get_data(p1, p2)
    }

    /// Generate a key pair in `slot`; returns the `7F49` public key template
    pub fn generate_key(&mut self, slot: KeySlot) -> Result<Vec<u8>, CardError> {
        self.asymmetric_key_pair(GENERATE, slot)
    }

    /// Read the public key of `slot`; returns the `7F49` public key template
    pub fn read_public_key(&mut self, slot: KeySlot) -> Result<Vec<u8>, CardError> {
        self.asymmetric_key_pair(READ_PUBLIC_KEY, slot)
    }

    /// PERFORM SECURITY OPERATION
    pub fn pso(&mut self, p1: u8, p2: u8, data: &[u8]) -> Result<Vec<u8>, CardError> {
        let command = APDU::with_data(0x00, ins::PSO, p1, p2, data.to_vec()).expect(self.max_le());
        self.transceive_data(&command)
    }

    /// INTERNAL AUTHENTICATE with the authentication key
    pub fn internal_authenticate(&mut self, data: &[u8]) -> Result<Vec<u8>, CardError> {
        let command = APDU::with_data(0x00, ins::INTERNAL_AUTHENTICATE, 0x00, 0x00, data.to_vec())
            .expect(self.max_le());
        self.transceive_data(&command)
    }

    /// Select an ECC algorithm for `slot`
    pub fn set_algorithm_attributes(&mut self, slot: KeySlot, curve: EccCurve) -> Result<bool, CardError> {
        let attributes = templates::algorithm_attributes(slot, curve);
        self.put_data_object(slot.attributes_tag(), &attributes)
    }

    fn asymmetric_key_pair(&mut self, mode: u8, slot: KeySlot) -> Result<Vec<u8>, CardError> {
        let crt = TLVEncoder::encode(slot.crt_tag(), &[]);
        let command = APDU::with_data(0x00, ins::GENERATE_ASYMMETRIC_KEY_PAIR, mode, 0x00, crt)
            .expect(self.max_le());
        self.transceive_data(&command)
    }

    fn transceive_ok(&mut self, command: &APDU) -> Result<bool, CardError> {
        Ok(self.transceive(command)?.is_okay())
    }

    fn transceive_data(&mut self, command: &APDU) -> Result<Vec<u8>, CardError> {
        let response = self.transceive(command)?;
        if !response.is_okay() {
            return Err(CardError::Status(response.sw()));
        }
        Ok(response.data)
    }

    fn max_le(&self) -> u32 {
        if self.extended_length {
            65536
        } else {
            256
        }
    }

    /// Send a command, chaining it when it does not fit a short APDU
    fn send_command(&mut self, command: &APDU) -> Result<Response, CardError> {
        if self.extended_length || command.data.len() <= SHORT_MAX_DATA {
            return self.exchange(command, self.extended_length);
        }

        let mut blocks = command.data.chunks(SHORT_MAX_DATA).peekable();
        while let Some(block) = blocks.next() {
            let last = blocks.peek().is_none();
            let part = APDU {
                cla: if last { command.cla } else { command.cla | CLA_CHAINING },
                data: block.to_vec(),
                le: if last { command.le } else { None },
                ..command.clone()
            };

            let response = self.exchange(&part, false)?;
            if last || !response.is_okay() {
                return Ok(response);
            }
        }

        // chunks() of non-empty data yields at least one block
        Err(CardError::UnsupportedOperation("chaining an empty command"))
    }

    fn exchange(&mut self, command: &APDU, extended: bool) -> Result<Response, CardError> {
        let raw = command.to_bytes(extended)?;
        debug!(
            "> {} ({} data bytes)",
            hexify(&raw[..4]),
            command.data.len()
        );
        let raw_response = self.transport.transmit(&raw)?;
        Ok(Response::from_bytes(&raw_response)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;

    /// Replays canned responses and records every command
    #[derive(Default)]
    struct ScriptedTransport {
        responses: VecDeque<Vec<u8>>,
        sent: Vec<Vec<u8>>,
    }

    impl ScriptedTransport {
        fn new(responses: &[&str]) -> Self {
            Self {
                responses: responses.iter().map(|r| hex::decode(r).unwrap()).collect(),
                sent: Vec::new(),
            }
        }
    }

    impl CardTransport for ScriptedTransport {
        fn transmit(&mut self, apdu: &[u8]) -> Result<Vec<u8>, CardError> {
            self.sent.push(apdu.to_vec());
            self.responses
                .pop_front()
                .ok_or_else(|| CardError::Transport("no response scripted".to_string()))
        }
    }

    fn sent_hex(client: &CardClient<ScriptedTransport>) -> Vec<String> {
        client.transport().sent.iter().map(hex::encode_upper).collect()
    }

    #[test]
    fn test_transport_access() {
        let mut client = CardClient::new(ScriptedTransport::new(&[]), true);
        assert!(client.extended_length());
        assert!(matches!(
            client.get_data_object(0x006E),
            Err(CardError::Transport(_))
        ));

        client
            .transport_mut()
            .responses
            .push_back(hex::decode("9000").unwrap());
        assert!(client.verify(pw::PW1_SIGN, b"123456").unwrap());

        let transport = client.into_inner();
        assert_eq!(transport.sent.len(), 2);
        assert!(transport.responses.is_empty());
    }

    #[test]
    fn test_verify() {
        let mut client = CardClient::new(ScriptedTransport::new(&["9000", "63C2"]), false);
        assert!(client.verify(pw::PW3, b"12345678").unwrap());
        assert!(!client.verify(pw::PW1_SIGN, b"000000").unwrap());
        assert_eq!(
            sent_hex(&client),
            vec!["00200083083132333435363738", "0020008106303030303030"]
        );
    }

    #[test]
    fn test_generate_key_command() {
        let mut client = CardClient::new(ScriptedTransport::new(&["7F4904860204AA9000"]), false);
        let response = client.generate_key(KeySlot::Authentication).unwrap();
        assert_eq!(response, hex::decode("7F4904860204AA").unwrap());
        assert_eq!(sent_hex(&client), vec!["0047800002A40000"]);
    }

    #[test]
    fn test_read_public_key_extended() {
        let mut client = CardClient::new(ScriptedTransport::new(&["7F49009000"]), true);
        client.read_public_key(KeySlot::Signature).unwrap();
        assert_eq!(sent_hex(&client), vec!["00478100000002B6000000"]);
    }

    #[test]
    fn test_get_response_loop() {
        let mut client = CardClient::new(
            ScriptedTransport::new(&["01026103", "0304056101", "069000"]),
            false,
        );
        let data = client.pso(0x9E, 0x9A, &[0xAA; 32]).unwrap();
        assert_eq!(data, vec![0x01, 0x02, 0x03, 0x04, 0x05, 0x06]);

        let sent = sent_hex(&client);
        assert_eq!(sent.len(), 3);
        assert_eq!(sent[1], "00C0000003");
        assert_eq!(sent[2], "00C0000001");
    }

    #[test]
    fn test_get_response_zero_means_256() {
        let mut client = CardClient::new(ScriptedTransport::new(&["6100", "AB9000"]), false);
        assert_eq!(client.get_data(0x00, 0x6E).unwrap(), vec![0xAB]);
        assert_eq!(sent_hex(&client)[1], "00C0000000");
    }

    #[test]
    fn test_error_status() {
        let mut client = CardClient::new(ScriptedTransport::new(&["6982", "6A88"]), false);
        assert!(matches!(
            client.internal_authenticate(&[0x01; 32]),
            Err(CardError::Status(0x6982))
        ));
        assert!(!client.put_data(0x00, 0xC7, &[0x00; 20]).unwrap());
    }

    #[test]
    fn test_command_chaining() {
        let mut client = CardClient::new(
            ScriptedTransport::new(&["9000", "9000", "9000"]),
            false,
        );
        let data = vec![0x5A; 600];
        assert!(client.put_data_odd(0x3F, 0xFF, &data).unwrap());

        let sent = &client.transport().sent;
        assert_eq!(sent.len(), 3);
        assert_eq!(&sent[0][..5], &[0x10, 0xDB, 0x3F, 0xFF, 0xFF]);
        assert_eq!(&sent[1][..5], &[0x10, 0xDB, 0x3F, 0xFF, 0xFF]);
        assert_eq!(&sent[2][..5], &[0x00, 0xDB, 0x3F, 0xFF, 0x5A]); // 600 - 2 * 255 = 90
        assert_eq!(sent[2].len(), 5 + 90);
    }

    #[test]
    fn test_chaining_stops_on_error() {
        let mut client = CardClient::new(ScriptedTransport::new(&["6982"]), false);
        assert!(!client.put_data_odd(0x3F, 0xFF, &[0x00; 300]).unwrap());
        assert_eq!(client.transport().sent.len(), 1);
    }

    #[test]
    fn test_extended_length_no_chaining() {
        let mut client = CardClient::new(ScriptedTransport::new(&["9000"]), true);
        assert!(client.put_data_odd(0x3F, 0xFF, &[0x00; 300]).unwrap());
        let sent = &client.transport().sent;
        assert_eq!(sent.len(), 1);
        assert_eq!(&sent[0][..7], &[0x00, 0xDB, 0x3F, 0xFF, 0x00, 0x01, 0x2C]);
    }

    #[test]
    fn test_set_algorithm_attributes() {
        let mut client = CardClient::new(ScriptedTransport::new(&["9000"]), false);
        assert!(client
            .set_algorithm_attributes(KeySlot::Decryption, EccCurve::Secp256k1)
            .unwrap());
        assert_eq!(sent_hex(&client), vec!["00DA00C206122B8104000A"]);
    }

    #[test]
    fn test_transport_failure() {
        let mut client = CardClient::new(ScriptedTransport::default(), false);
        assert!(matches!(
            client.get_data_object(0x00C4),
            Err(CardError::Transport(_))
        ));
    }

    #[test]
    fn test_short_status_response() {
        let mut client = CardClient::new(ScriptedTransport::new(&["90"]), false);
        assert!(matches!(client.get_data(0x00, 0xC4), Err(CardError::Apdu(_))));
    }
}
