//! Gateway-side canonical encoder.
//!
//! An independent implementation of the canonical encoding rule documented
//! in `core::canonical`. The gateway re-derives the bytes from the fields it
//! parsed; it never accepts a canonical string from the producer.

/// Powers of ten for the supported precisions.
const SCALE: [f64; 3] = [1.0, 10.0, 100.0];

const TEMP_PLACES: usize = 2;
const BPM_PLACES: usize = 1;

/// Derive canonical bytes from received field values.
pub fn derive(temp_c: f64, bpm: f64, avg_bpm: u32) -> Vec<u8> {
    let mut buf = Vec::with_capacity(48);
    buf.extend_from_slice(b"{\"tempC\":");
    put_fixed(&mut buf, temp_c, TEMP_PLACES);
    buf.extend_from_slice(b",\"bpm\":");
    put_fixed(&mut buf, bpm, BPM_PLACES);
    buf.extend_from_slice(b",\"avg_bpm\":");
    put_digits(&mut buf, u64::from(avg_bpm), 1);
    buf.push(b'}');
    buf
}

/// Write `value` rounded half away from zero at `places` decimals.
fn put_fixed(buf: &mut Vec<u8>, value: f64, places: usize) {
    let scaled = (value * SCALE[places]).round() as i64;
    if scaled < 0 {
        buf.push(b'-');
    }

    put_digits(buf, scaled.unsigned_abs(), places + 1);
    let point = buf.len() - places;
    buf.insert(point, b'.');
}

/// Write `n` in base 10 using at least `min_digits` digits.
fn put_digits(buf: &mut Vec<u8>, mut n: u64, min_digits: usize) {
    let mut digits = [0u8; 20];
    let mut count = 0;
    while n > 0 || count < min_digits {
        digits[count] = b'0' + (n % 10) as u8;
        n /= 10;
        count += 1;
    }
    buf.extend(digits[..count].iter().rev());
}
