use crate::color::Color;
use crate::gpu::BlendMode;

/// Settings of a [`Compositor`](crate::Compositor).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CompositorConfig {
    /// Color the screen is cleared to at the start of every frame.
    pub clear_color: Color,
    /// Global blending enabled when the surface is created.
    pub blend_mode: BlendMode,
}

impl Default for CompositorConfig {
    fn default() -> Self {
        Self {
            clear_color: Color::BLACK,
            blend_mode: BlendMode::SourceOver,
        }
    }
}

impl CompositorConfig {
    pub fn with_clear_color(mut self, clear_color: Color) -> Self {
        self.clear_color = clear_color;
        self
    }

    pub fn with_blend_mode(mut self, blend_mode: BlendMode) -> Self {
        self.blend_mode = blend_mode;
        self
    }
}

/// Surface and adapter settings of a [`WgpuBackend`](crate::gpu::wgpu_backend::WgpuBackend).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WgpuBackendConfig {
    pub vsync: bool,
    /// Ask for a surface alpha mode that lets the window show through.
    pub transparent: bool,
    pub power_preference: wgpu::PowerPreference,
}

impl Default for WgpuBackendConfig {
    fn default() -> Self {
        Self {
            vsync: true,
            transparent: false,
            power_preference: wgpu::PowerPreference::HighPerformance,
        }
    }
}

impl WgpuBackendConfig {
    pub fn with_vsync(mut self, vsync: bool) -> Self {
        self.vsync = vsync;
        self
    }

    pub fn with_transparent(mut self, transparent: bool) -> Self {
        self.transparent = transparent;
        self
    }

    pub fn with_power_preference(mut self, power_preference: wgpu::PowerPreference) -> Self {
        self.power_preference = power_preference;
        self
    }
}
