/// Failures raised by a [`GpuBackend`](crate::GpuBackend).
///
/// The compositor never lets these escape a frame: the owning layer logs the error and
/// stays non-drawable, and the rest of the stack keeps rendering.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum GpuError {
    /// A shader failed to compile or its pipeline failed to link.
    #[error("shader program `{label}` failed to build: {message}")]
    ShaderCompilation { label: String, message: String },
    /// An off-screen target could not be allocated or failed completeness validation.
    #[error("render target {width}x{height} is incomplete: {reason}")]
    IncompleteTarget {
        width: u32,
        height: u32,
        reason: String,
    },
    /// The backend could not allocate a texture.
    #[error("texture allocation failed: {0}")]
    TextureAllocation(String),
    /// The requested capability exists but this backend cannot provide it.
    #[error("{0} is not supported by this backend")]
    Unsupported(String),
    #[error("no suitable GPU adapter was found")]
    NoAdapter,
    #[error("failed to create the GPU device: {0}")]
    Device(String),
    /// The presentable surface could not be acquired for this frame.
    #[error("surface is unavailable: {0}")]
    Surface(String),
}

/// Rejections raised when building an [`Image`](crate::Image) from raw bytes.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ImageError {
    #[error("image dimensions must be non-zero, got {width}x{height}")]
    ZeroSized { width: u32, height: u32 },
    #[error("expected {expected} bytes of RGBA8 data for a {width}x{height} image, got {actual}")]
    LengthMismatch {
        width: u32,
        height: u32,
        expected: usize,
        actual: usize,
    },
}
