use std::sync::Arc;

use crate::shaders::{GRAYSCALE_FS, INVERT_FS, SEPIA_FS};

/// The color operation a filter layer applies to everything beneath it.
///
/// Every built-in effect blends between the input color and the processed color:
/// `mix(color, effect(color), intensity)`, so an intensity of `0.0` is a pass-through.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum FilterEffect {
    /// Luma grayscale with weights `0.299`, `0.587`, `0.114`.
    #[default]
    Grayscale,
    /// Classic sepia tone matrix, clamped to `1.0` per channel.
    Sepia,
    /// `1.0 - rgb`, alpha untouched.
    Invert,
    /// A user-provided WGSL fragment stage declaring `fs_main`.
    ///
    /// The stage can read `u.intensity`, `t_input` and `s_input`, and receives the
    /// `VertexOutput` produced by the shared vertex stage.
    Custom(Arc<str>),
}

impl FilterEffect {
    pub fn custom(wgsl: impl Into<Arc<str>>) -> Self {
        Self::Custom(wgsl.into())
    }

    /// Short, stable name used in resource labels and log fields.
    pub fn label(&self) -> &'static str {
        match self {
            FilterEffect::Grayscale => "grayscale",
            FilterEffect::Sepia => "sepia",
            FilterEffect::Invert => "invert",
            FilterEffect::Custom(_) => "custom",
        }
    }

    pub(crate) fn fragment_source(&self) -> &str {
        match self {
            FilterEffect::Grayscale => GRAYSCALE_FS,
            FilterEffect::Sepia => SEPIA_FS,
            FilterEffect::Invert => INVERT_FS,
            FilterEffect::Custom(source) => source,
        }
    }

    /// Applies the effect to one straight-alpha color on the CPU.
    ///
    /// Returns `None` for [`FilterEffect::Custom`], whose behavior only exists as WGSL.
    pub fn apply(&self, color: [f32; 4], intensity: f32) -> Option<[f32; 4]> {
        let [r, g, b, a] = color;
        let processed = match self {
            FilterEffect::Grayscale => {
                let gray = 0.299 * r + 0.587 * g + 0.114 * b;
                [gray, gray, gray]
            }
            FilterEffect::Sepia => [
                (0.393 * r + 0.769 * g + 0.189 * b).min(1.0),
                (0.349 * r + 0.686 * g + 0.168 * b).min(1.0),
                (0.272 * r + 0.534 * g + 0.131 * b).min(1.0),
            ],
            FilterEffect::Invert => [1.0 - r, 1.0 - g, 1.0 - b],
            FilterEffect::Custom(_) => return None,
        };

        Some([
            mix(r, processed[0], intensity),
            mix(g, processed[1], intensity),
            mix(b, processed[2], intensity),
            a,
        ])
    }
}

fn mix(from: f32, to: f32, amount: f32) -> f32 {
    from + (to - from) * amount
}
