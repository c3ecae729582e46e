/// An RGBA color with 8 bits per channel, straight (non-premultiplied) alpha.
///
/// Used for clear colors and for building solid test images.
///
/// # Examples
///
/// ```
/// use strata::Color;
///
/// let red = Color::rgb(255, 0, 0);
/// assert_eq!(red.normalize(), [1.0, 0.0, 0.0, 1.0]);
///
/// let translucent_blue = Color::rgba(0, 0, 255, 128);
/// assert_eq!(translucent_blue.to_array(), [0, 0, 255, 128]);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Color(pub [u8; 4]);

impl Color {
    /// All channels zero. The default clear color of off-screen targets.
    pub const TRANSPARENT: Self = Self([0, 0, 0, 0]);
    /// Opaque black. The default clear color of the screen.
    pub const BLACK: Self = Self([0, 0, 0, 255]);
    /// Opaque white.
    pub const WHITE: Self = Self([255, 255, 255, 255]);

    /// Creates a fully opaque color.
    pub fn rgb(r: u8, g: u8, b: u8) -> Self {
        Self([r, g, b, 255])
    }

    /// Creates a color with an explicit alpha channel, where 0 is fully transparent.
    pub fn rgba(r: u8, g: u8, b: u8, a: u8) -> Self {
        Self([r, g, b, a])
    }

    /// Channel values mapped to `[0.0, 1.0]`.
    pub fn normalize(&self) -> [f32; 4] {
        normalize_rgba_color(&self.0)
    }

    pub fn to_array(&self) -> [u8; 4] {
        self.0
    }
}

pub(crate) fn normalize_rgba_color(color: &[u8; 4]) -> [f32; 4] {
    [
        color[0] as f32 / 255.0,
        color[1] as f32 / 255.0,
        color[2] as f32 / 255.0,
        color[3] as f32 / 255.0,
    ]
}

/// Maps a `[0.0, 1.0]` channel back to 8 bits, rounding to nearest.
pub(crate) fn quantize_channel(value: f32) -> u8 {
    (value.clamp(0.0, 1.0) * 255.0).round() as u8
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quantize_inverts_normalize() {
        for value in [0u8, 1, 76, 128, 254, 255] {
            let normalized = Color::rgb(value, value, value).normalize();
            assert_eq!(quantize_channel(normalized[0]), value);
        }
    }

    #[test]
    fn quantize_clamps_out_of_range_values() {
        assert_eq!(quantize_channel(-0.5), 0);
        assert_eq!(quantize_channel(3.0), 255);
    }
}
