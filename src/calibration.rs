//! Clock-skew calibration persisted in non-volatile memory.
//!
//! The record sits at physical address 0: a little-endian `u32` magic
//! followed by the skew factor as IEEE-754 binary32. A bad magic means the
//! device is uncalibrated and runs with factor 1.0.

use crate::store::Eeprom;

/// Magic marking a valid calibration record.
pub const CALIBRATION_MAGIC: u32 = 0xDEAD_BEEF;

/// Lower bound of acceptable skew factors.
pub const MIN_SKEW: f32 = 0.95;

/// Upper bound of acceptable skew factors.
pub const MAX_SKEW: f32 = 1.05;

const RECORD_LEN: usize = 8;

/// Persisted calibration state.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Calibration {
    /// Hardware-clock milliseconds per internal (show-time) millisecond
    pub skew: f32,
}

impl Default for Calibration {
    fn default() -> Self {
        Self { skew: 1.0 }
    }
}

/// Read the calibration record.
///
/// Returns `None` when the magic does not match; callers should treat that
/// as an uncalibrated device (skew 1.0).
pub fn read_calibration(memory: &dyn Eeprom) -> Option<Calibration> {
    if memory.len() < RECORD_LEN {
        return None;
    }
    let magic = u32::from_le_bytes([
        memory.read_byte(0),
        memory.read_byte(1),
        memory.read_byte(2),
        memory.read_byte(3),
    ]);
    if magic != CALIBRATION_MAGIC {
        return None;
    }
    let skew = f32::from_le_bytes([
        memory.read_byte(4),
        memory.read_byte(5),
        memory.read_byte(6),
        memory.read_byte(7),
    ]);
    Some(Calibration { skew })
}

/// Write a calibration record (magic included).
pub fn write_calibration(memory: &mut dyn Eeprom, calibration: Calibration) {
    if memory.len() < RECORD_LEN {
        return;
    }
    let magic = CALIBRATION_MAGIC.to_le_bytes();
    let skew = calibration.skew.to_le_bytes();
    for (offset, &byte) in magic.iter().chain(skew.iter()).enumerate() {
        memory.write_byte(offset, byte);
    }
}

/// Overwrite the record with the uncalibrated default.
pub fn reset_calibration(memory: &mut dyn Eeprom) {
    write_calibration(memory, Calibration::default());
}

/// Conclude a calibration run.
///
/// `show_ms` is the known show-time length of the run; `measured_ms` is
/// what the hardware clock counted over the same run. Returns the skew
/// factor when it falls inside the acceptance band, `None` otherwise
/// (a wildly off factor means the run was invalid, not that the clock is
/// really that bad).
#[allow(clippy::cast_precision_loss)]
pub fn finish_calibration(show_ms: u64, measured_ms: u64) -> Option<f32> {
    if show_ms == 0 {
        return None;
    }
    let factor = measured_ms as f32 / show_ms as f32;
    if (MIN_SKEW..=MAX_SKEW).contains(&factor) {
        Some(factor)
    } else {
        None
    }
}
