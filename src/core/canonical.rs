//! Producer-side canonical encoder.
//!
//! The encoding rule is a protocol contract shared with the gateway, which
//! carries its own implementation (`verify::canonical`):
//!
//! 1. Keys appear in the fixed order `tempC`, `bpm`, `avg_bpm` as
//!    `{"tempC":<v>,"bpm":<v>,"avg_bpm":<v>}` with no whitespace.
//! 2. A continuous value is multiplied by `10^p` in binary64, rounded half
//!    away from zero to an integer, and rendered as that integer with a `.`
//!    inserted `p` digits from the right. `p` is 2 for `tempC`, 1 for `bpm`.
//!    A `-` is written only when the integer is non-zero.
//! 3. `avg_bpm` is a plain base-10 integer.
//!
//! Any change here must be mirrored on the gateway and in the golden vectors.

use crate::core::reading::{Reading, BPM_PLACES, TEMP_PLACES};

/// The deterministic serialization of a [`Reading`].
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CanonicalBytes(Vec<u8>);

impl CanonicalBytes {
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.0
    }

    /// View as text. The encoding is always ASCII.
    pub fn as_str(&self) -> &str {
        std::str::from_utf8(&self.0).unwrap_or_default()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl AsRef<[u8]> for CanonicalBytes {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

/// Encode a reading into its canonical bytes.
pub fn encode(reading: &Reading) -> CanonicalBytes {
    let mut out = String::with_capacity(48);
    out.push_str("{\"tempC\":");
    push_fixed(&mut out, reading.temp_c(), TEMP_PLACES);
    out.push_str(",\"bpm\":");
    push_fixed(&mut out, reading.bpm(), BPM_PLACES);
    out.push_str(",\"avg_bpm\":");
    out.push_str(&reading.avg_bpm().to_string());
    out.push('}');
    CanonicalBytes(out.into_bytes())
}

fn push_fixed(out: &mut String, value: f64, places: u32) {
    let scale = 10u64.pow(places);
    let scaled = (value * scale as f64).round() as i64;
    if scaled < 0 {
        out.push('-');
    }
    let magnitude = scaled.unsigned_abs();
    out.push_str(&format!(
        "{}.{:0width$}",
        magnitude / scale,
        magnitude % scale,
        width = places as usize
    ));
}
