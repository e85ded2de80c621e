//! Core functionality for signed vitals.
//!
//! This module contains:
//! - The signal window that smooths derived beat rates
//! - The reading type and its canonical encoding
//! - The HMAC codec and authenticated messages

pub mod canonical;
pub mod mac;
pub mod message;
pub mod reading;
pub mod window;

// Re-export commonly used types
pub use canonical::{encode, CanonicalBytes};
pub use mac::{
    generate_key_hex, sign, verify, verify_hex, write_key_file, KeyError, SharedKey, Tag, TAG_SIZE,
};
pub use message::AuthenticatedMessage;
pub use reading::{InvalidReading, Reading};
pub use window::{bpm_from_interval, SignalWindow};
