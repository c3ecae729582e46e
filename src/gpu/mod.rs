//! The seam between the compositor and a GPU API.
//!
//! [`GpuBackend`] mirrors an immediate-mode 2D API: programs, textures and off-screen
//! targets are created up front and referenced by handle, one target is bound at a
//! time, and draws go into whatever is bound.

pub mod software;
pub mod wgpu_backend;

use crate::color::Color;
use crate::error::GpuError;
use crate::filter::FilterEffect;
use crate::id::{ProgramId, TargetId, TextureId};
use crate::image_data::Image;

/// The 4x4 identity, column-major.
pub const IDENTITY_MVP: [[f32; 4]; 4] = [
    [1.0, 0.0, 0.0, 0.0],
    [0.0, 1.0, 0.0, 0.0],
    [0.0, 0.0, 1.0, 0.0],
    [0.0, 0.0, 0.0, 1.0],
];

/// Where draws land.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Target {
    /// The presentable surface (or the headless output texture).
    Screen,
    /// An off-screen render target created with [`GpuBackend::create_target`].
    Offscreen(TargetId),
}

/// Global blending applied to every draw.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BlendMode {
    /// Standard alpha compositing: `src * a + dst * (1 - a)`.
    #[default]
    SourceOver,
    /// The source replaces the destination.
    Replace,
}

/// What a program computes, independent of any shading language.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ShaderSource {
    /// Samples the texture unmodified.
    Passthrough,
    /// Samples the texture and applies a filter scaled by the draw's intensity.
    Filter(FilterEffect),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProgramDescriptor<'a> {
    pub label: &'a str,
    pub source: &'a ShaderSource,
}

/// Quad geometry with its texture mapping.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Quad {
    /// Covers normalized device coordinates `[-1, 1]` on both axes. Texture row 0 is at
    /// the top of the target.
    #[default]
    FullScreen,
    /// Covers the model square `[-0.5, 0.5]` on both axes, texture row 0 at model
    /// `y = -0.5`. Meant for projections that put pixel row 0 at the top.
    Centered,
}

/// A single quad vertex: model position and texture coordinate.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct QuadVertex {
    pub position: [f32; 2],
    pub uv: [f32; 2],
}

/// Both quads are drawn as the triangles `(0, 1, 2)` and `(0, 2, 3)`.
pub const QUAD_INDICES: [u16; 6] = [0, 1, 2, 0, 2, 3];

impl Quad {
    pub fn vertices(&self) -> [QuadVertex; 4] {
        match self {
            Quad::FullScreen => [
                QuadVertex { position: [-1.0, -1.0], uv: [0.0, 1.0] },
                QuadVertex { position: [1.0, -1.0], uv: [1.0, 1.0] },
                QuadVertex { position: [1.0, 1.0], uv: [1.0, 0.0] },
                QuadVertex { position: [-1.0, 1.0], uv: [0.0, 0.0] },
            ],
            Quad::Centered => [
                QuadVertex { position: [-0.5, -0.5], uv: [0.0, 0.0] },
                QuadVertex { position: [0.5, -0.5], uv: [1.0, 0.0] },
                QuadVertex { position: [0.5, 0.5], uv: [1.0, 1.0] },
                QuadVertex { position: [-0.5, 0.5], uv: [0.0, 1.0] },
            ],
        }
    }
}

/// One textured quad draw into the bound target.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct QuadDraw {
    pub program: ProgramId,
    pub texture: TextureId,
    /// Column-major model-view-projection matrix.
    pub mvp: [[f32; 4]; 4],
    /// Filter strength in `[0, 1]`. Ignored by pass-through programs.
    pub intensity: f32,
    pub quad: Quad,
}

impl QuadDraw {
    /// A full-screen, identity-transformed draw at intensity 0.
    pub fn full_screen(program: ProgramId, texture: TextureId) -> Self {
        Self {
            program,
            texture,
            mvp: IDENTITY_MVP,
            intensity: 0.0,
            quad: Quad::FullScreen,
        }
    }

    pub fn with_intensity(mut self, intensity: f32) -> Self {
        self.intensity = intensity;
        self
    }
}

/// An immediate-mode GPU API as seen by the compositor.
///
/// Implementations own every resource behind the handles they return. Handles that are
/// stale or were never issued must be tolerated: the call logs and does nothing.
pub trait GpuBackend {
    /// Starts a frame. Surface backends acquire the next presentable texture here.
    fn begin_frame(&mut self) -> Result<(), GpuError>;

    /// Finishes a frame and presents it.
    fn end_frame(&mut self) -> Result<(), GpuError>;

    fn set_blend_mode(&mut self, mode: BlendMode);

    fn create_program(&mut self, descriptor: &ProgramDescriptor<'_>) -> Result<ProgramId, GpuError>;

    fn delete_program(&mut self, program: ProgramId);

    /// Uploads a decoded image into a new texture.
    fn create_texture(&mut self, image: &Image) -> Result<TextureId, GpuError>;

    fn delete_texture(&mut self, texture: TextureId);

    /// Allocates an off-screen target and its backing texture, both sized `size`.
    fn create_target(&mut self, size: (u32, u32)) -> Result<(TargetId, TextureId), GpuError>;

    /// Deletes the target together with its backing texture.
    fn delete_target(&mut self, target: TargetId);

    /// Makes `target` the destination of subsequent clears and draws. Never clears.
    fn bind_target(&mut self, target: Target);

    /// Clears the bound target.
    fn clear(&mut self, color: Color);

    /// Draws one textured quad into the bound target.
    fn draw_quad(&mut self, draw: &QuadDraw);

    /// The size of the screen target.
    fn viewport_size(&self) -> (u32, u32);

    /// Reconfigures the screen target.
    fn resize(&mut self, size: (u32, u32));

    /// Reads a target back as tightly packed RGBA8 rows, top row first.
    fn read_pixels(&mut self, target: Target) -> Option<Vec<u8>>;
}
