//! Easing functions for color transitions.
//!
//! The table index is part of the bytecode ABI: new modes are appended at
//! the tail, existing entries are never reordered. All functions are pure
//! maps from pre-easing progress to post-easing progress; back, elastic and
//! bounce modes intentionally overshoot `[0, 1]`.
//!
//! See <https://easings.net> for the catalogue.

use core::f32::consts::{FRAC_PI_2, PI};

use libm::{cosf, exp2f, sinf, sqrtf};

/// Signature of an easing function.
pub type EasingFn = fn(f32) -> f32;

/// Easing modes addressable from the bytecode.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
#[repr(u8)]
pub enum EasingMode {
    #[default]
    Linear = 0,
    InSine = 1,
    OutSine = 2,
    InOutSine = 3,
    InQuad = 4,
    OutQuad = 5,
    InOutQuad = 6,
    InCubic = 7,
    OutCubic = 8,
    InOutCubic = 9,
    InQuart = 10,
    OutQuart = 11,
    InOutQuart = 12,
    InQuint = 13,
    OutQuint = 14,
    InOutQuint = 15,
    InExpo = 16,
    OutExpo = 17,
    InOutExpo = 18,
    InCirc = 19,
    OutCirc = 20,
    InOutCirc = 21,
    InBack = 22,
    OutBack = 23,
    InOutBack = 24,
    InElastic = 25,
    OutElastic = 26,
    InOutElastic = 27,
    InBounce = 28,
    OutBounce = 29,
    InOutBounce = 30,
}

/// Number of easing modes in the table.
pub const NUM_EASING_MODES: usize = 31;

impl EasingMode {
    /// Look up a mode from its bytecode value.
    pub fn from_raw(value: u8) -> Option<Self> {
        use EasingMode::*;
        const MODES: [EasingMode; NUM_EASING_MODES] = [
            Linear, InSine, OutSine, InOutSine, InQuad, OutQuad, InOutQuad, InCubic, OutCubic,
            InOutCubic, InQuart, OutQuart, InOutQuart, InQuint, OutQuint, InOutQuint, InExpo,
            OutExpo, InOutExpo, InCirc, OutCirc, InOutCirc, InBack, OutBack, InOutBack, InElastic,
            OutElastic, InOutElastic, InBounce, OutBounce, InOutBounce,
        ];
        MODES.get(value as usize).copied()
    }

    /// Apply this mode's easing function to a progress value.
    pub fn apply(self, progress: f32) -> f32 {
        EASING_TABLE[self as usize](progress)
    }
}

/// The fixed mode-to-function table. Indexed by [`EasingMode`].
pub static EASING_TABLE: [EasingFn; NUM_EASING_MODES] = [
    linear,
    in_sine,
    out_sine,
    in_out_sine,
    in_quad,
    out_quad,
    in_out_quad,
    in_cubic,
    out_cubic,
    in_out_cubic,
    in_quart,
    out_quart,
    in_out_quart,
    in_quint,
    out_quint,
    in_out_quint,
    in_expo,
    out_expo,
    in_out_expo,
    in_circ,
    out_circ,
    in_out_circ,
    in_back,
    out_back,
    in_out_back,
    in_elastic,
    out_elastic,
    in_out_elastic,
    in_bounce,
    out_bounce,
    in_out_bounce,
];

fn linear(p: f32) -> f32 {
    p
}

fn in_sine(p: f32) -> f32 {
    sinf((p - 1.0) * FRAC_PI_2) + 1.0
}

fn out_sine(p: f32) -> f32 {
    sinf(p * FRAC_PI_2)
}

fn in_out_sine(p: f32) -> f32 {
    0.5 * (1.0 - cosf(p * PI))
}

fn in_quad(p: f32) -> f32 {
    p * p
}

fn out_quad(p: f32) -> f32 {
    -(p * (p - 2.0))
}

fn in_out_quad(p: f32) -> f32 {
    if p < 0.5 {
        2.0 * p * p
    } else {
        -2.0 * p * p + 4.0 * p - 1.0
    }
}

fn in_cubic(p: f32) -> f32 {
    p * p * p
}

fn out_cubic(p: f32) -> f32 {
    let f = p - 1.0;
    f * f * f + 1.0
}

fn in_out_cubic(p: f32) -> f32 {
    if p < 0.5 {
        4.0 * p * p * p
    } else {
        let f = 2.0 * p - 2.0;
        0.5 * f * f * f + 1.0
    }
}

fn in_quart(p: f32) -> f32 {
    p * p * p * p
}

fn out_quart(p: f32) -> f32 {
    let f = p - 1.0;
    f * f * f * (1.0 - p) + 1.0
}

fn in_out_quart(p: f32) -> f32 {
    if p < 0.5 {
        8.0 * p * p * p * p
    } else {
        let f = p - 1.0;
        -8.0 * f * f * f * f + 1.0
    }
}

fn in_quint(p: f32) -> f32 {
    p * p * p * p * p
}

fn out_quint(p: f32) -> f32 {
    let f = p - 1.0;
    f * f * f * f * f + 1.0
}

fn in_out_quint(p: f32) -> f32 {
    if p < 0.5 {
        16.0 * p * p * p * p * p
    } else {
        let f = 2.0 * p - 2.0;
        0.5 * f * f * f * f * f + 1.0
    }
}

fn in_expo(p: f32) -> f32 {
    if p <= 0.0 {
        p
    } else {
        exp2f(10.0 * (p - 1.0))
    }
}

fn out_expo(p: f32) -> f32 {
    if p >= 1.0 {
        p
    } else {
        1.0 - exp2f(-10.0 * p)
    }
}

fn in_out_expo(p: f32) -> f32 {
    if p <= 0.0 || p >= 1.0 {
        p
    } else if p < 0.5 {
        0.5 * exp2f(20.0 * p - 10.0)
    } else {
        -0.5 * exp2f(-20.0 * p + 10.0) + 1.0
    }
}

fn in_circ(p: f32) -> f32 {
    1.0 - sqrtf(1.0 - p * p)
}

fn out_circ(p: f32) -> f32 {
    sqrtf((2.0 - p) * p)
}

fn in_out_circ(p: f32) -> f32 {
    if p < 0.5 {
        0.5 * (1.0 - sqrtf(1.0 - 4.0 * p * p))
    } else {
        0.5 * (sqrtf(-(2.0 * p - 3.0) * (2.0 * p - 1.0)) + 1.0)
    }
}

fn in_back(p: f32) -> f32 {
    p * p * p - p * sinf(p * PI)
}

fn out_back(p: f32) -> f32 {
    let f = 1.0 - p;
    1.0 - (f * f * f - f * sinf(f * PI))
}

fn in_out_back(p: f32) -> f32 {
    if p < 0.5 {
        let f = 2.0 * p;
        0.5 * (f * f * f - f * sinf(f * PI))
    } else {
        let f = 1.0 - (2.0 * p - 1.0);
        0.5 * (1.0 - (f * f * f - f * sinf(f * PI))) + 0.5
    }
}

fn in_elastic(p: f32) -> f32 {
    sinf(13.0 * FRAC_PI_2 * p) * exp2f(10.0 * (p - 1.0))
}

fn out_elastic(p: f32) -> f32 {
    sinf(-13.0 * FRAC_PI_2 * (p + 1.0)) * exp2f(-10.0 * p) + 1.0
}

fn in_out_elastic(p: f32) -> f32 {
    if p < 0.5 {
        0.5 * sinf(13.0 * FRAC_PI_2 * (2.0 * p)) * exp2f(10.0 * (2.0 * p - 1.0))
    } else {
        0.5 * (sinf(-13.0 * FRAC_PI_2 * (2.0 * p - 1.0 + 1.0)) * exp2f(-10.0 * (2.0 * p - 1.0)) + 2.0)
    }
}

fn in_bounce(p: f32) -> f32 {
    1.0 - out_bounce(1.0 - p)
}

fn out_bounce(p: f32) -> f32 {
    if p < 4.0 / 11.0 {
        (121.0 * p * p) / 16.0
    } else if p < 8.0 / 11.0 {
        (363.0 / 40.0) * p * p - (99.0 / 10.0) * p + 17.0 / 5.0
    } else if p < 9.0 / 10.0 {
        (4356.0 / 361.0) * p * p - (35442.0 / 1805.0) * p + 16061.0 / 1805.0
    } else {
        (54.0 / 5.0) * p * p - (513.0 / 25.0) * p + 268.0 / 25.0
    }
}

fn in_out_bounce(p: f32) -> f32 {
    if p < 0.5 {
        0.5 * in_bounce(2.0 * p)
    } else {
        0.5 * out_bounce(2.0 * p - 1.0) + 0.5
    }
}
