use std::fmt;

use strata::{Color, GpuBackend, Target};

/// Maximum per-channel difference tolerated by default. Covers rounding differences
/// between the CPU filters and their WGSL counterparts.
pub const DEFAULT_TOLERANCE: u8 = 5;

/// The color one canvas pixel must have after a frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PixelExpectation {
    pub x: u32,
    pub y: u32,
    pub color: Color,
    pub tolerance: u8,
    pub label: &'static str,
}

impl PixelExpectation {
    pub fn new(x: u32, y: u32, color: Color, label: &'static str) -> Self {
        Self {
            x,
            y,
            color,
            tolerance: DEFAULT_TOLERANCE,
            label,
        }
    }

    pub fn opaque(x: u32, y: u32, r: u8, g: u8, b: u8, label: &'static str) -> Self {
        Self::new(x, y, Color::rgb(r, g, b), label)
    }

    pub fn gray(x: u32, y: u32, level: u8, label: &'static str) -> Self {
        Self::opaque(x, y, level, level, level, label)
    }

    pub fn with_tolerance(mut self, tolerance: u8) -> Self {
        self.tolerance = tolerance;
        self
    }

    fn matches(&self, actual: [u8; 4]) -> bool {
        self.color
            .to_array()
            .iter()
            .zip(actual)
            .all(|(&expected, actual)| expected.abs_diff(actual) <= self.tolerance)
    }
}

/// Why one expectation did not hold.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PixelFailure {
    OutsideCanvas {
        label: &'static str,
        x: u32,
        y: u32,
        canvas: (u32, u32),
    },
    /// The read-back buffer is shorter than `width * height * 4`.
    Truncated { label: &'static str, len: usize },
    Mismatch {
        label: &'static str,
        x: u32,
        y: u32,
        expected: Color,
        actual: [u8; 4],
        tolerance: u8,
    },
}

impl PixelFailure {
    pub fn label(&self) -> &'static str {
        match self {
            Self::OutsideCanvas { label, .. }
            | Self::Truncated { label, .. }
            | Self::Mismatch { label, .. } => label,
        }
    }
}

impl fmt::Display for PixelFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::OutsideCanvas { label, x, y, canvas } => {
                write!(f, "[{label}] ({x},{y}) is outside the {}x{} canvas", canvas.0, canvas.1)
            }
            Self::Truncated { label, len } => {
                write!(f, "[{label}] read-back holds only {len} bytes")
            }
            Self::Mismatch {
                label,
                x,
                y,
                expected,
                actual,
                tolerance,
            } => write!(
                f,
                "[{label}] ({x},{y}) expected rgba{:?} ±{tolerance}, got rgba{actual:?}",
                expected.to_array()
            ),
        }
    }
}

/// Checks expectations against a `read_pixels` result: tightly packed RGBA8 rows, top
/// row first. An empty result means every expectation held.
pub fn check_pixels(
    pixels: &[u8],
    width: u32,
    height: u32,
    expectations: &[PixelExpectation],
) -> Vec<PixelFailure> {
    expectations
        .iter()
        .filter_map(|expectation| {
            let PixelExpectation { x, y, label, .. } = *expectation;
            if x >= width || y >= height {
                return Some(PixelFailure::OutsideCanvas {
                    label,
                    x,
                    y,
                    canvas: (width, height),
                });
            }

            let offset = (y as usize * width as usize + x as usize) * 4;
            let Some(actual) = pixels
                .get(offset..offset + 4)
                .and_then(|rgba| <[u8; 4]>::try_from(rgba).ok())
            else {
                return Some(PixelFailure::Truncated {
                    label,
                    len: pixels.len(),
                });
            };

            (!expectation.matches(actual)).then(|| PixelFailure::Mismatch {
                label,
                x,
                y,
                expected: expectation.color,
                actual,
                tolerance: expectation.tolerance,
            })
        })
        .collect()
}

/// Panics with every failed expectation listed.
pub fn assert_pixels(pixels: &[u8], width: u32, height: u32, expectations: &[PixelExpectation]) {
    let failures = check_pixels(pixels, width, height, expectations);
    if !failures.is_empty() {
        let report: Vec<String> = failures.iter().map(ToString::to_string).collect();
        panic!(
            "{} pixel expectation(s) failed:\n{}",
            failures.len(),
            report.join("\n")
        );
    }
}

/// Reads the screen back from `gpu` and asserts `expectations` against it.
pub fn assert_screen_pixels<B: GpuBackend + ?Sized>(gpu: &mut B, expectations: &[PixelExpectation]) {
    let (width, height) = gpu.viewport_size();
    let pixels = gpu
        .read_pixels(Target::Screen)
        .unwrap_or_else(|| panic!("screen of {width}x{height} is not readable"));
    assert_pixels(&pixels, width, height, expectations);
}
