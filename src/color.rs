use smart_leds::RGB8;

pub type Rgb = RGB8;

/// All channels off.
pub const BLACK: Rgb = Rgb { r: 0, g: 0, b: 0 };

/// All channels at full duty.
pub const WHITE: Rgb = Rgb {
    r: 255,
    g: 255,
    b: 255,
};

/// Create a gray shade (all channels equal)
pub const fn gray(level: u8) -> Rgb {
    Rgb {
        r: level,
        g: level,
        b: level,
    }
}

/// Linearly interpolate between two colors.
///
/// `progress` 0.0 yields `from`, 1.0 yields `to`. Values outside `[0, 1]`
/// are allowed (easing functions may overshoot); each component clamps to
/// `[0, 255]`.
pub fn fade_color(from: Rgb, to: Rgb, progress: f32) -> Rgb {
    Rgb {
        r: fade_component(from.r, to.r, progress),
        g: fade_component(from.g, to.g, progress),
        b: fade_component(from.b, to.b, progress),
    }
}

#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn fade_component(from: u8, to: u8, progress: f32) -> u8 {
    let value = f32::from(from) + (f32::from(to) - f32::from(from)) * progress;
    if value <= 0.0 {
        0
    } else if value >= 255.0 {
        255
    } else {
        (value + 0.5) as u8
    }
}

/// Split the common white component out of an RGB color.
///
/// Returns the residual color and the extracted white level, for strips
/// with a dedicated white channel.
pub const fn split_white(color: Rgb) -> (Rgb, u8) {
    let white = min3(color.r, color.g, color.b);
    (
        Rgb {
            r: color.r - white,
            g: color.g - white,
            b: color.b - white,
        },
        white,
    )
}

const fn min3(a: u8, b: u8, c: u8) -> u8 {
    let ab = if a < b { a } else { b };
    if ab < c {
        ab
    } else {
        c
    }
}
