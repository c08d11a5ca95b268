//! Virtual OpenPGP card
//!
//! A loopback [`CardTransport`] keeping ECC keys in memory. It answers the
//! commands used to provision and exercise ECC keys: VERIFY, PUT DATA, key
//! import, key generation, PSO and INTERNAL AUTHENTICATE, GET DATA and
//! GET RESPONSE, including command chaining and extended length.

use log::{debug, info, warn};

use super::pin_manager::{PINManager, PINType};
use super::security_state::{SecurityCondition, SecurityState};
use super::templates;
use super::KeySlot;
use crate::apdu::{ins, parse_apdu, pso, Response, APDU, CLA_CHAINING, EXTENDED_MAX_DATA, SW};
use crate::card::{CardError, CardTransport, ClientConfig};
use crate::crypto::{current_timestamp, fingerprint_and_date, EccCurve, EccOperations};
use crate::tlv::{tags, TLVBuilder, TLV};

/// Fingerprint DO size
const FINGERPRINT_LEN: usize = 20;
/// Generation date DO size
const TIMESTAMP_LEN: usize = 4;
/// P1 P2 of PUT DATA (odd INS) carrying a private key template
const KEY_IMPORT_P1P2: u16 = 0x3FFF;
/// The signature counter is three bytes wide
const MAX_SIGNATURE_COUNT: u32 = 0x00FF_FFFF;

/// Slot related data objects addressed by PUT DATA / GET DATA
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SlotObject {
    Attributes,
    Fingerprint,
    Timestamp,
}

impl SlotObject {
    fn lookup(tag: u16) -> Option<(KeySlot, SlotObject)> {
        KeySlot::ALL.into_iter().find_map(|slot| {
            if tag == slot.attributes_tag() {
                Some((slot, SlotObject::Attributes))
            } else if tag == slot.fingerprint_tag() {
                Some((slot, SlotObject::Fingerprint))
            } else if tag == slot.timestamp_tag() {
                Some((slot, SlotObject::Timestamp))
            } else {
                None
            }
        })
    }
}

/// Key material and metadata of one slot
#[derive(Debug, Clone)]
struct SlotState {
    curve: EccCurve,
    private_key: Vec<u8>,
    public_key: Vec<u8>,
    fingerprint: Vec<u8>,
    timestamp: [u8; TIMESTAMP_LEN],
}

impl SlotState {
    fn new() -> Self {
        Self {
            curve: EccCurve::P256,
            private_key: Vec::new(),
            public_key: Vec::new(),
            fingerprint: vec![0u8; FINGERPRINT_LEN],
            timestamp: [0u8; TIMESTAMP_LEN],
        }
    }

    fn has_key(&self) -> bool {
        !self.private_key.is_empty()
    }

    fn set_key(&mut self, private_key: Vec<u8>, public_key: Vec<u8>) {
        self.private_key = private_key;
        self.public_key = public_key;
        self.fingerprint = vec![0u8; FINGERPRINT_LEN];
        self.timestamp = [0u8; TIMESTAMP_LEN];
    }

    fn clear_key(&mut self) {
        self.set_key(Vec::new(), Vec::new());
    }
}

/// In-memory OpenPGP card holding ECC keys
pub struct VirtualCard {
    slots: [SlotState; 3],
    pin_manager: PINManager,
    security_state: SecurityState,
    signature_counter: u32,
    response_buffer: Vec<u8>,
    response_offset: usize,
    command_buffer: Vec<u8>,
    chaining_ins: Option<u8>,
    /// Current command's Le (expected response length)
    current_le: Option<u32>,
}

impl Default for VirtualCard {
    /// A card with the factory PINs
    fn default() -> Self {
        Self::new(b"123456", b"12345678")
    }
}

impl VirtualCard {
    pub fn new(user_pin: &[u8], admin_pin: &[u8]) -> Self {
        Self {
            slots: [SlotState::new(), SlotState::new(), SlotState::new()],
            pin_manager: PINManager::new(user_pin, admin_pin),
            security_state: SecurityState::new(),
            signature_counter: 0,
            response_buffer: Vec::new(),
            response_offset: 0,
            command_buffer: Vec::new(),
            chaining_ins: None,
            current_le: None,
        }
    }

    /// A card personalised with the PINs of `config`
    pub fn from_config(config: &ClientConfig) -> Self {
        Self::new(config.user_pin.as_bytes(), config.admin_pin.as_bytes())
    }

    /// Number of signatures computed with the signature key
    pub fn signature_counter(&self) -> u32 {
        self.signature_counter
    }

    /// Curve selected for `slot`
    pub fn curve(&self, slot: KeySlot) -> EccCurve {
        self.slot(slot).curve
    }

    /// Public key held in `slot`, if any
    pub fn public_key(&self, slot: KeySlot) -> Option<&[u8]> {
        let state = self.slot(slot);
        state.has_key().then_some(state.public_key.as_slice())
    }

    /// Drop the session state, as on a power cycle
    ///
    /// Keys, data objects and retry counters survive.
    pub fn reset(&mut self) {
        self.security_state.clear_all();
        self.response_buffer.clear();
        self.response_offset = 0;
        self.command_buffer.clear();
        self.chaining_ins = None;
        self.current_le = None;
    }

    /// Process an APDU command and return the response
    pub fn process_apdu(&mut self, cmd: &APDU) -> Response {
        // Store the Le value for response sizing
        self.current_le = cmd.le;

        if cmd.cla & !CLA_CHAINING != 0x00 {
            return Response::error(SW::CLA_NOT_SUPPORTED);
        }

        // Handle GET_RESPONSE first (for response chaining)
        if cmd.ins == ins::GET_RESPONSE {
            return self.handle_get_response(cmd);
        }

        // A new command discards an unread response
        self.response_buffer.clear();
        self.response_offset = 0;

        if cmd.is_chained() {
            return self.handle_command_chaining(cmd);
        }

        // If we had chained commands, combine them
        let effective_cmd = if !self.command_buffer.is_empty() {
            if self.chaining_ins != Some(cmd.ins) {
                self.command_buffer.clear();
                self.chaining_ins = None;
                return Response::error(SW::CONDITIONS_NOT_SATISFIED);
            }

            let mut combined_data = std::mem::take(&mut self.command_buffer);
            self.chaining_ins = None;
            if combined_data.len() + cmd.data.len() > EXTENDED_MAX_DATA {
                return Response::error(SW::WRONG_LENGTH);
            }
            combined_data.extend_from_slice(&cmd.data);

            APDU {
                data: combined_data,
                ..cmd.clone()
            }
        } else {
            self.chaining_ins = None;
            cmd.clone()
        };

        debug!(
            "INS {:02X} P1P2 {:04X}, {} data bytes",
            effective_cmd.ins,
            effective_cmd.p1p2(),
            effective_cmd.data.len()
        );

        match effective_cmd.ins {
            ins::GET_DATA => self.handle_get_data(&effective_cmd),
            ins::VERIFY => self.handle_verify(&effective_cmd),
            ins::PUT_DATA => self.handle_put_data(&effective_cmd),
            ins::PUT_DATA_ODD => self.handle_put_data_odd(&effective_cmd),
            ins::GENERATE_ASYMMETRIC_KEY_PAIR => self.handle_generate_key(&effective_cmd),
            ins::PSO => self.handle_pso(&effective_cmd),
            ins::INTERNAL_AUTHENTICATE => self.handle_internal_authenticate(&effective_cmd),
            _ => Response::error(SW::INS_NOT_SUPPORTED),
        }
    }

    /// Handle command chaining (CLA bit 4 set)
    fn handle_command_chaining(&mut self, cmd: &APDU) -> Response {
        if self.chaining_ins.is_none() {
            self.chaining_ins = Some(cmd.ins);
            self.command_buffer.clear();
        } else if self.chaining_ins != Some(cmd.ins) {
            self.command_buffer.clear();
            self.chaining_ins = None;
            return Response::error(SW::CONDITIONS_NOT_SATISFIED);
        }

        if self.command_buffer.len() + cmd.data.len() > EXTENDED_MAX_DATA {
            warn!("Chained command exceeds {} bytes", EXTENDED_MAX_DATA);
            self.command_buffer.clear();
            self.chaining_ins = None;
            return Response::error(SW::WRONG_LENGTH);
        }

        self.command_buffer.extend_from_slice(&cmd.data);
        Response::ok()
    }

    /// Handle GET_RESPONSE for response chaining
    fn handle_get_response(&mut self, cmd: &APDU) -> Response {
        if self.response_buffer.is_empty() {
            return Response::error(SW::CONDITIONS_NOT_SATISFIED);
        }

        let le = cmd.le.unwrap_or(256) as usize;
        let remaining = self.response_buffer.len() - self.response_offset;
        let chunk_size = le.min(remaining);

        let start = self.response_offset;
        let data = self.response_buffer[start..start + chunk_size].to_vec();
        self.response_offset += chunk_size;

        let new_remaining = self.response_buffer.len() - self.response_offset;
        if new_remaining == 0 {
            self.response_buffer.clear();
            self.response_offset = 0;
            Response::success(data)
        } else {
            Response::more_data(data, new_remaining)
        }
    }

    /// Create response with chaining if needed
    fn create_response(&mut self, data: Vec<u8>) -> Response {
        let max_response = self.current_le.unwrap_or(256) as usize;

        if data.len() <= max_response {
            return Response::success(data);
        }

        let chunk = data[..max_response].to_vec();
        let remaining = data.len() - max_response;
        self.response_buffer = data;
        self.response_offset = max_response;
        Response::more_data(chunk, remaining)
    }

    // =========================================================================
    // Command Handlers
    // =========================================================================

    fn handle_get_data(&mut self, cmd: &APDU) -> Response {
        let tag = cmd.p1p2();

        let data = match tag {
            tags::APPLICATION_RELATED_DATA => self.build_application_data(),
            tags::SECURITY_SUPPORT_TEMPLATE => TLVBuilder::new()
                .add(tags::SIGNATURE_COUNTER, &self.signature_counter_bytes())
                .wrap(tags::SECURITY_SUPPORT_TEMPLATE)
                .build(),
            tags::SIGNATURE_COUNTER => self.signature_counter_bytes(),
            tags::PW_STATUS_BYTES => self.pw_status_bytes(),
            tags::FINGERPRINTS => self.fingerprints(),
            tags::KEY_TIMESTAMPS => self.key_timestamps(),
            _ => match SlotObject::lookup(tag) {
                Some((slot, object)) => self.slot_object(slot, object),
                None => return Response::error(SW::REFERENCED_DATA_NOT_FOUND),
            },
        };

        self.create_response(data)
    }

    /// Handle VERIFY command
    fn handle_verify(&mut self, cmd: &APDU) -> Response {
        let Some(condition) = SecurityCondition::from_reference(cmd.p2) else {
            return Response::error(SW::WRONG_P1_P2);
        };
        let pin_type = match condition {
            SecurityCondition::PW3 => PINType::PW3,
            SecurityCondition::PW1_81 | SecurityCondition::PW1_82 => PINType::PW1,
        };

        match cmd.p1 {
            0x00 => {}
            // Reset the verification status
            0xFF if cmd.data.is_empty() => {
                self.security_state.set(condition, false);
                return Response::ok();
            }
            _ => return Response::error(SW::WRONG_P1_P2),
        }

        // Empty data = check status
        if cmd.data.is_empty() {
            let retries = self.pin_manager.retries(pin_type);
            if retries == 0 {
                return Response::error(SW::AUTH_METHOD_BLOCKED);
            }
            if self.security_state.is_verified(condition) {
                return Response::ok();
            }
            return Response::error(SW::counter_warning(retries));
        }

        if self.pin_manager.verify_pin(pin_type, &cmd.data) {
            self.security_state.set(condition, true);
            Response::ok()
        } else {
            self.security_state.set(condition, false);
            let retries = self.pin_manager.retries(pin_type);
            warn!("{:?} verification failed, {} retries left", pin_type, retries);

            if retries == 0 {
                Response::error(SW::AUTH_METHOD_BLOCKED)
            } else {
                Response::error(SW::counter_warning(retries))
            }
        }
    }

    fn handle_put_data(&mut self, cmd: &APDU) -> Response {
        if !self.security_state.is_verified(SecurityCondition::PW3) {
            return Response::error(SW::SECURITY_STATUS_NOT_SATISFIED);
        }

        let tag = cmd.p1p2();
        if tag == tags::PW_STATUS_BYTES {
            let valid_multiple = match cmd.data.first().copied() {
                Some(0x00) => false,
                Some(0x01) => true,
                _ => return Response::error(SW::WRONG_DATA),
            };
            self.security_state.set_pw1_valid_multiple(valid_multiple);
            return Response::ok();
        }

        let Some((slot, object)) = SlotObject::lookup(tag) else {
            return Response::error(SW::REFERENCED_DATA_NOT_FOUND);
        };

        match object {
            SlotObject::Attributes => self.put_algorithm_attributes(slot, &cmd.data),
            SlotObject::Fingerprint => {
                if cmd.data.len() != FINGERPRINT_LEN {
                    return Response::error(SW::WRONG_LENGTH);
                }
                self.slot_mut(slot).fingerprint = cmd.data.clone();
                Response::ok()
            }
            SlotObject::Timestamp => {
                let Ok(timestamp) = <[u8; TIMESTAMP_LEN]>::try_from(cmd.data.as_slice()) else {
                    return Response::error(SW::WRONG_LENGTH);
                };
                self.slot_mut(slot).timestamp = timestamp;
                Response::ok()
            }
        }
    }

    fn put_algorithm_attributes(&mut self, slot: KeySlot, attributes: &[u8]) -> Response {
        if attributes.first() != Some(&slot.ecc_algorithm_id()) {
            return Response::error(SW::WRONG_DATA);
        }
        let Some(curve) = templates::curve_from_attributes(attributes) else {
            return Response::error(SW::WRONG_DATA);
        };

        let state = self.slot_mut(slot);
        if state.curve != curve {
            // Keys of the old algorithm are unusable
            state.clear_key();
            state.curve = curve;
        }
        debug!("{:?} slot set to {}", slot, curve);
        Response::ok()
    }

    fn handle_put_data_odd(&mut self, cmd: &APDU) -> Response {
        if cmd.p1p2() != KEY_IMPORT_P1P2 {
            return Response::error(SW::REFERENCED_DATA_NOT_FOUND);
        }
        if !self.security_state.is_verified(SecurityCondition::PW3) {
            return Response::error(SW::SECURITY_STATUS_NOT_SATISFIED);
        }

        let import = match templates::parse_private_key_template(&cmd.data) {
            Ok(import) => import,
            Err(e) => {
                debug!("Rejecting key import: {}", e);
                return Response::error(SW::WRONG_DATA);
            }
        };
        let Some(slot) = KeySlot::from_crt_tag(import.key_type) else {
            return Response::error(SW::WRONG_DATA);
        };
        let Some(private_key) = import.component(tags::ECC_PRIVATE_KEY) else {
            return Response::error(SW::WRONG_DATA);
        };

        let curve = self.slot(slot).curve;
        let public_key = match EccOperations::get_public_key(curve, private_key) {
            Ok(public_key) => public_key,
            Err(e) => {
                debug!("Rejecting key import: {}", e);
                return Response::error(SW::WRONG_DATA);
            }
        };
        if let Some(declared) = import.component(tags::ECC_IMPORT_PUBLIC_KEY) {
            if declared != public_key.as_slice() {
                return Response::error(SW::WRONG_DATA);
            }
        }

        self.slot_mut(slot).set_key(private_key.to_vec(), public_key);
        info!("Imported {} key into {:?} slot", curve, slot);
        Response::ok()
    }

    fn handle_generate_key(&mut self, cmd: &APDU) -> Response {
        // P1: 0x80 = generate, 0x81 = read existing public key
        let generate = match cmd.p1 {
            0x80 => true,
            0x81 => false,
            _ => return Response::error(SW::WRONG_P1_P2),
        };

        let Some(slot) = TLV::parse(&cmd.data)
            .ok()
            .and_then(|crt| KeySlot::from_crt_tag(crt.tag()))
        else {
            return Response::error(SW::WRONG_DATA);
        };

        if generate {
            if !self.security_state.is_verified(SecurityCondition::PW3) {
                return Response::error(SW::SECURITY_STATUS_NOT_SATISFIED);
            }

            let curve = self.slot(slot).curve;
            let (private_key, public_key) = match EccOperations::generate_keypair(curve) {
                Ok(pair) => pair,
                Err(e) => {
                    warn!("Key generation failed: {}", e);
                    return Response::error(SW::EXEC_ERROR);
                }
            };
            let generated = fingerprint_and_date(curve, &public_key, current_timestamp());

            let state = self.slot_mut(slot);
            state.set_key(private_key, public_key);
            state.fingerprint = generated.fingerprint;
            state.timestamp = generated.created;
            info!("Generated {} key in {:?} slot", curve, slot);
        } else if !self.slot(slot).has_key() {
            return Response::error(SW::REFERENCED_DATA_NOT_FOUND);
        }

        let template = templates::public_key_template(&self.slot(slot).public_key);
        self.create_response(template.encode())
    }

    fn handle_pso(&mut self, cmd: &APDU) -> Response {
        match cmd.p1p2() {
            pso::CDS => self.handle_pso_sign(cmd),
            pso::DECIPHER => self.handle_pso_decipher(cmd),
            _ => Response::error(SW::WRONG_P1_P2),
        }
    }

    /// Handle PSO: Compute Digital Signature
    fn handle_pso_sign(&mut self, cmd: &APDU) -> Response {
        if !self.security_state.is_verified(SecurityCondition::PW1_81) {
            return Response::error(SW::SECURITY_STATUS_NOT_SATISFIED);
        }

        let signature = match self.sign_with(KeySlot::Signature, &cmd.data) {
            Ok(signature) => signature,
            Err(sw) => return Response::error(sw),
        };

        self.signature_counter = (self.signature_counter + 1).min(MAX_SIGNATURE_COUNT);
        self.security_state.after_sign();

        self.create_response(signature)
    }

    /// Handle PSO: Decipher (ECDH)
    fn handle_pso_decipher(&mut self, cmd: &APDU) -> Response {
        if !self.security_state.is_verified(SecurityCondition::PW1_82) {
            return Response::error(SW::SECURITY_STATUS_NOT_SATISFIED);
        }

        let state = self.slot(KeySlot::Decryption);
        if !state.has_key() {
            return Response::error(SW::REFERENCED_DATA_NOT_FOUND);
        }

        let peer = match templates::ecdh_point_from_container(&cmd.data) {
            Ok(peer) => peer,
            Err(e) => {
                debug!("Malformed cipher DO: {}", e);
                return Response::error(SW::WRONG_DATA);
            }
        };
        let shared_secret = match EccOperations::ecdh(state.curve, &state.private_key, &peer) {
            Ok(secret) => secret,
            Err(e) => {
                debug!("ECDH failed: {}", e);
                return Response::error(SW::WRONG_DATA);
            }
        };

        self.create_response(shared_secret)
    }

    fn handle_internal_authenticate(&mut self, cmd: &APDU) -> Response {
        if !self.security_state.is_verified(SecurityCondition::PW1_82) {
            return Response::error(SW::SECURITY_STATUS_NOT_SATISFIED);
        }

        match self.sign_with(KeySlot::Authentication, &cmd.data) {
            Ok(signature) => self.create_response(signature),
            Err(sw) => Response::error(sw),
        }
    }

    /// Raw ECDSA signature over `digest` with the key in `slot`
    fn sign_with(&self, slot: KeySlot, digest: &[u8]) -> Result<Vec<u8>, u16> {
        let state = self.slot(slot);
        if !state.has_key() {
            return Err(SW::REFERENCED_DATA_NOT_FOUND);
        }

        EccOperations::sign_prehash(state.curve, &state.private_key, digest).map_err(|e| {
            debug!("Signing with {:?} key failed: {}", slot, e);
            SW::WRONG_DATA
        })
    }

    // =========================================================================
    // Data objects
    // =========================================================================

    fn slot_object(&self, slot: KeySlot, object: SlotObject) -> Vec<u8> {
        let state = self.slot(slot);
        match object {
            SlotObject::Attributes => templates::algorithm_attributes(slot, state.curve),
            SlotObject::Fingerprint => state.fingerprint.clone(),
            SlotObject::Timestamp => state.timestamp.to_vec(),
        }
    }

    /// PW status bytes: validity, maximum lengths, retry counters
    fn pw_status_bytes(&self) -> Vec<u8> {
        vec![
            self.security_state.pw1_valid_multiple() as u8,
            0x7F,
            0x7F,
            0x7F,
            self.pin_manager.retries(PINType::PW1),
            0x00,
            self.pin_manager.retries(PINType::PW3),
        ]
    }

    fn fingerprints(&self) -> Vec<u8> {
        self.slots.iter().flat_map(|s| s.fingerprint.iter().copied()).collect()
    }

    fn key_timestamps(&self) -> Vec<u8> {
        self.slots.iter().flat_map(|s| s.timestamp).collect()
    }

    fn signature_counter_bytes(&self) -> Vec<u8> {
        self.signature_counter.to_be_bytes()[1..].to_vec()
    }

    /// Build Application Related Data (6E)
    fn build_application_data(&self) -> Vec<u8> {
        let mut discretionary = TLVBuilder::new();
        for slot in KeySlot::ALL {
            discretionary = discretionary.add(
                slot.attributes_tag(),
                &templates::algorithm_attributes(slot, self.slot(slot).curve),
            );
        }

        discretionary
            .add(tags::PW_STATUS_BYTES, &self.pw_status_bytes())
            .add(tags::FINGERPRINTS, &self.fingerprints())
            .add(tags::KEY_TIMESTAMPS, &self.key_timestamps())
            .wrap(tags::DISCRETIONARY_DATA)
            .wrap(tags::APPLICATION_RELATED_DATA)
            .build()
    }

    fn slot(&self, slot: KeySlot) -> &SlotState {
        &self.slots[slot.key_number() as usize - 1]
    }

    fn slot_mut(&mut self, slot: KeySlot) -> &mut SlotState {
        &mut self.slots[slot.key_number() as usize - 1]
    }
}

impl CardTransport for VirtualCard {
    fn transmit(&mut self, apdu: &[u8]) -> Result<Vec<u8>, CardError> {
        let response = match parse_apdu(apdu) {
            Ok(cmd) => self.process_apdu(&cmd),
            Err(e) => {
                warn!("Malformed APDU: {}", e);
                Response::error(SW::WRONG_LENGTH)
            }
        };
        Ok(response.to_bytes())
    }
}
