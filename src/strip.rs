//! PWM output seam and voltage compensation.

use crate::color::Rgb;

/// Abstract LED strip driver.
///
/// Implement this for your platform's PWM peripheral. The executor is
/// generic over this trait.
pub trait StripDriver {
    /// Drive the strip to the given color
    fn set_color(&mut self, color: Rgb);
}

/// Duty-cycle window of one channel.
#[derive(Debug, Clone, Copy)]
pub struct DutyRange {
    /// Duty below which the channel's LEDs do not open
    pub min: u8,
    /// Duty producing the channel's full contribution to quasi-white
    pub max: u8,
}

impl DutyRange {
    /// The full 0..=255 range (no compensation).
    pub const FULL: Self = Self { min: 0, max: 255 };
}

/// Per-channel duty windows derived from the supply voltage and the LED
/// threshold voltages.
#[derive(Debug, Clone, Copy)]
pub struct PwmLimits {
    pub red: DutyRange,
    pub green: DutyRange,
    pub blue: DutyRange,
}

impl Default for PwmLimits {
    fn default() -> Self {
        Self {
            red: DutyRange::FULL,
            green: DutyRange::FULL,
            blue: DutyRange::FULL,
        }
    }
}

/// Driver wrapper that compensates for the non-linear brightness response
/// of voltage-driven strips.
///
/// Each channel is remapped through a cubic curve and scaled into its duty
/// window before reaching the inner driver.
pub struct CompensatedStrip<D: StripDriver> {
    inner: D,
    limits: PwmLimits,
}

impl<D: StripDriver> CompensatedStrip<D> {
    pub const fn new(inner: D, limits: PwmLimits) -> Self {
        Self { inner, limits }
    }

    /// Access the wrapped driver.
    pub fn inner_mut(&mut self) -> &mut D {
        &mut self.inner
    }

    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    fn compensate(value: u8, range: DutyRange) -> u8 {
        if value == 0 {
            return 0;
        }
        let normalized = f32::from(value) / 255.0;
        let curved = normalized * normalized * normalized;
        let span = f32::from(range.max) - f32::from(range.min);
        (f32::from(range.min) + span * curved + 0.5) as u8
    }
}

impl<D: StripDriver> StripDriver for CompensatedStrip<D> {
    fn set_color(&mut self, color: Rgb) {
        self.inner.set_color(Rgb {
            r: Self::compensate(color.r, self.limits.red),
            g: Self::compensate(color.g, self.limits.green),
            b: Self::compensate(color.b, self.limits.blue),
        });
    }
}
