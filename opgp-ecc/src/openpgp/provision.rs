//! ECC key provisioning workflow
//!
//! Drives a card through the steps of putting ECDSA and ECDH keys on it:
//! selecting the curve, generating or importing keys, registering their
//! fingerprints, and checking signatures and key agreement against local
//! computations.

use log::{debug, info};

use super::templates;
use super::KeySlot;
use crate::apdu::pso;
use crate::card::{pw, CardClient, CardError, CardTransport, ClientConfig};
use crate::crypto::{current_timestamp, fingerprint_and_date, DigestInfo, EccOperations, KeyFingerprint};
use crate::tlv::tags;

/// P1 P2 of PUT DATA (odd INS) for private key import
const KEY_IMPORT: (u8, u8) = (0x3F, 0xFF);

/// Outcome of an on-card key generation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GeneratedKey {
    /// Uncompressed point returned by the card
    pub public_key: Vec<u8>,
    /// Fingerprint and date written to the slot's DOs
    pub fingerprint: KeyFingerprint,
}

/// Provisioning operations over a card client
pub struct Provisioner<T: CardTransport> {
    client: CardClient<T>,
    config: ClientConfig,
}

impl<T: CardTransport> Provisioner<T> {
    pub fn new(transport: T, config: ClientConfig) -> Self {
        let client = CardClient::new(transport, config.extended_length);
        Self { client, config }
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub fn client(&self) -> &CardClient<T> {
        &self.client
    }

    pub fn client_mut(&mut self) -> &mut CardClient<T> {
        &mut self.client
    }

    pub fn into_inner(self) -> CardClient<T> {
        self.client
    }

    /// Prepare the card for ECC keys
    ///
    /// Verifies PW3, keeps PW1 valid for several signatures and selects the
    /// configured curve on all three slots.
    pub fn setup(&mut self) -> Result<(), CardError> {
        let admin_pin = self.config.admin_pin.clone();
        let verified = self.client.verify(pw::PW3, admin_pin.as_bytes())?;
        require(verified, "PW3 verification")?;

        let updated = self.client.put_data_object(tags::PW_STATUS_BYTES, &[0x01])?;
        require(updated, "PW status bytes")?;

        for slot in KeySlot::ALL {
            let updated = self.client.set_algorithm_attributes(slot, self.config.curve)?;
            require(updated, "algorithm attributes")?;
        }

        info!("Card set up for {} keys", self.config.curve);
        Ok(())
    }

    /// Verify PW1 for signing and for the other private key operations
    pub fn verify_user(&mut self) -> Result<(), CardError> {
        let user_pin = self.config.user_pin.clone();
        for pw_ref in [pw::PW1_SIGN, pw::PW1_OTHER] {
            let verified = self.client.verify(pw_ref, user_pin.as_bytes())?;
            require(verified, "PW1 verification")?;
        }
        Ok(())
    }

    /// Generate a key in `slot` and register its fingerprint and date
    pub fn generate_and_register(&mut self, slot: KeySlot) -> Result<GeneratedKey, CardError> {
        let response = self.client.generate_key(slot)?;
        let public_key = self.card_point(&response)?;

        let fingerprint = fingerprint_and_date(self.config.curve, &public_key, current_timestamp());
        let updated = self
            .client
            .put_data_object(slot.fingerprint_tag(), &fingerprint.fingerprint)?;
        require(updated, "fingerprint")?;
        let updated = self
            .client
            .put_data_object(slot.timestamp_tag(), &fingerprint.created)?;
        require(updated, "generation date")?;

        info!("Generated {} key in {:?} slot", self.config.curve, slot);
        Ok(GeneratedKey {
            public_key,
            fingerprint,
        })
    }

    /// Generate a key pair locally and import it into `slot`
    ///
    /// Returns `(private_key, public_key)`.
    pub fn import_key(&mut self, slot: KeySlot) -> Result<(Vec<u8>, Vec<u8>), CardError> {
        let (private_key, public_key) = EccOperations::generate_keypair(self.config.curve)?;
        let template = templates::private_key_template(slot.crt_tag(), &private_key, &public_key);

        let (p1, p2) = KEY_IMPORT;
        let imported = self.client.put_data_odd(p1, p2, &template.encode())?;
        require(imported, "key import")?;

        info!("Imported {} key into {:?} slot", self.config.curve, slot);
        Ok((private_key, public_key))
    }

    /// Have the card sign `message` with the key in `slot` and check the result
    ///
    /// The signature slot signs with PSO:CDS, the authentication slot with
    /// INTERNAL AUTHENTICATE.
    pub fn check_signature(&mut self, slot: KeySlot, message: &[u8]) -> Result<bool, CardError> {
        let curve = self.config.curve;
        let response = self.client.read_public_key(slot)?;
        let public_key = self.card_point(&response)?;
        let digest = DigestInfo::ecdsa(curve, message);

        let raw = match slot {
            KeySlot::Signature => {
                let [p1, p2] = pso::CDS.to_be_bytes();
                self.client.pso(p1, p2, &digest)?
            }
            KeySlot::Authentication => self.client.internal_authenticate(&digest)?,
            KeySlot::Decryption => {
                return Err(CardError::UnsupportedOperation("signing with the decryption key"))
            }
        };

        let container = templates::raw_signature_to_container(&raw)
            .ok_or(CardError::InvalidSignature(raw.len()))?;
        let valid = EccOperations::verify(curve, &public_key, &digest, &container.encode())?;
        debug!("{:?} signature valid: {}", slot, valid);
        Ok(valid)
    }

    /// Run PSO:DECIPHER with an ephemeral key and compare the shared secrets
    pub fn check_ecdh(&mut self) -> Result<bool, CardError> {
        let curve = self.config.curve;
        let response = self.client.read_public_key(KeySlot::Decryption)?;
        let card_public = self.card_point(&response)?;

        let (ephemeral_private, ephemeral_public) = EccOperations::generate_keypair(curve)?;
        let container = templates::ecdh_public_key_container(&ephemeral_public);

        let [p1, p2] = pso::DECIPHER.to_be_bytes();
        let card_secret = self.client.pso(p1, p2, &container.encode())?;
        let local_secret = EccOperations::ecdh(curve, &ephemeral_private, &card_public)?;
        Ok(card_secret == local_secret)
    }

    /// Point of a `7F49` response, checked against the configured curve
    fn card_point(&self, response: &[u8]) -> Result<Vec<u8>, CardError> {
        let curve = self.config.curve;
        let components = templates::public_key_components(response)?;
        match components.point() {
            Some(point) if EccOperations::validate_public_key(curve, point) => Ok(point.to_vec()),
            _ => Err(CardError::InvalidPublicKey(curve)),
        }
    }
}

fn require(accepted: bool, what: &'static str) -> Result<(), CardError> {
    if accepted {
        Ok(())
    } else {
        Err(CardError::Rejected(what))
    }
}
