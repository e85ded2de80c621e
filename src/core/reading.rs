//! The structured reading carried in every authenticated message.

use serde::Serialize;

/// Decimal places carried by `tempC`.
pub const TEMP_PLACES: u32 = 2;

/// Decimal places carried by `bpm`.
pub const BPM_PLACES: u32 = 1;

/// Largest magnitude a continuous field may hold.
///
/// Keeps the scaled integer used by the encoders well inside `i64`.
pub const MAX_MAGNITUDE: f64 = 1.0e12;

/// Round `value` half away from zero at `places` decimal places.
///
/// The scaling happens in binary64, exactly as the canonical encoders do,
/// so a quantized value always re-encodes to the same text.
pub fn quantize(value: f64, places: u32) -> f64 {
    let scale = 10f64.powi(places as i32);
    (value * scale).round() / scale
}

/// A reading that cannot be represented on the wire.
#[derive(Debug, Clone, PartialEq)]
pub enum InvalidReading {
    NonFinite(&'static str),
    OutOfBounds(&'static str),
}

impl std::fmt::Display for InvalidReading {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            InvalidReading::NonFinite(field) => write!(f, "{field} is not a finite number"),
            InvalidReading::OutOfBounds(field) => write!(f, "{field} exceeds the encodable range"),
        }
    }
}

impl std::error::Error for InvalidReading {}

/// One published measurement.
///
/// Field set and order (`tempC`, `bpm`, `avg_bpm`) are part of the protocol.
/// Continuous fields are quantized to their protocol precision on
/// construction, so what is sent is exactly what was signed.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Reading {
    #[serde(rename = "tempC")]
    temp_c: f64,
    bpm: f64,
    avg_bpm: u32,
}

impl Reading {
    pub fn new(temp_c: f64, bpm: f64, avg_bpm: u32) -> Result<Self, InvalidReading> {
        Ok(Self {
            temp_c: checked("tempC", temp_c, TEMP_PLACES)?,
            bpm: checked("bpm", bpm, BPM_PLACES)?,
            avg_bpm,
        })
    }

    /// Temperature in degrees Celsius, two decimals.
    pub fn temp_c(&self) -> f64 {
        self.temp_c
    }

    /// Instantaneous rate, one decimal.
    pub fn bpm(&self) -> f64 {
        self.bpm
    }

    /// Windowed average rate, whole beats per minute.
    pub fn avg_bpm(&self) -> u32 {
        self.avg_bpm
    }
}

fn checked(field: &'static str, value: f64, places: u32) -> Result<f64, InvalidReading> {
    if !value.is_finite() {
        return Err(InvalidReading::NonFinite(field));
    }
    if value.abs() > MAX_MAGNITUDE {
        return Err(InvalidReading::OutOfBounds(field));
    }
    Ok(quantize(value, places))
}

/// Round a windowed mean to the integral `avg_bpm` field.
pub fn average_to_count(average: f64) -> u32 {
    if average.is_finite() && average > 0.0 {
        average.round().min(u32::MAX as f64) as u32
    } else {
        0
    }
}
