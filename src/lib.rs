//! A layer-stack compositor for GPU rendering.
//!
//! Content, transform and filter layers are stacked by Z-order. Each frame the
//! [`Compositor`] draws plain stacks straight to the screen and routes stacks containing
//! filters through off-screen targets, so every filter applies to everything beneath it.
//!
//! GPU access goes through [`GpuBackend`]. [`gpu::wgpu_backend::WgpuBackend`] renders
//! with `wgpu`; [`gpu::software::SoftwareBackend`] is a CPU reference used headless and
//! in tests.

pub use wgpu;

mod blit;
mod color;
mod compositor;
mod config;
mod error;
mod filter;
pub mod gpu;
mod id;
mod image_data;
pub mod layer;
mod render_queue;
mod shaders;
mod target;
mod transform;

pub use color::Color;
pub use compositor::Compositor;
pub use config::{CompositorConfig, WgpuBackendConfig};
pub use error::{GpuError, ImageError};
pub use filter::FilterEffect;
pub use gpu::{BlendMode, GpuBackend, ProgramDescriptor, Quad, QuadDraw, ShaderSource, Target};
pub use id::{LayerId, ProgramId, TargetId, TextureId};
pub use image_data::Image;
pub use layer::{ContentLayer, FilterLayer, FilterState, Layer, LayerVariant, TransformLayer};
pub use render_queue::{CompositorHandle, RenderTask};
pub use target::RenderTarget;
pub use transform::Transform2D;
