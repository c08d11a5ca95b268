//! OpenPGP card objects and workflows for ECC keys
//!
//! Data-object templates, key slots, a virtual card to run against and the
//! provisioning workflow.

pub mod applet;
mod key_slot;
pub mod pin_manager;
pub mod provision;
pub mod security_state;
pub mod templates;

pub use applet::VirtualCard;
pub use key_slot::KeySlot;
pub use pin_manager::PINManager;
pub use provision::{GeneratedKey, Provisioner};
pub use security_state::SecurityState;
