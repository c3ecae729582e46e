use tracing::error;

use crate::gpu::{GpuBackend, ProgramDescriptor, QuadDraw, ShaderSource};
use crate::id::ProgramId;
use crate::image_data::Image;
use crate::layer::texture_slot::TextureSlot;

/// Draws its image over the whole target, untransformed.
#[derive(Debug, Default)]
pub struct ContentLayer {
    program: Option<ProgramId>,
    slot: TextureSlot,
}

impl ContentLayer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queues `image` for upload; uploads at once when resources are ready.
    ///
    /// Returns `true` if a new texture went live.
    pub fn set_image(&mut self, gpu: &mut dyn GpuBackend, image: Image) -> bool {
        self.slot.set_pending(image);
        self.program.is_some() && self.slot.upload(gpu)
    }

    pub(crate) fn set_pending_image(&mut self, image: Image) {
        self.slot.set_pending(image);
    }

    /// `true` once a texture has been uploaded.
    pub fn is_loaded(&self) -> bool {
        self.slot.texture().is_some()
    }

    pub fn content_size(&self) -> (u32, u32) {
        self.slot.content_size()
    }

    pub(crate) fn on_surface_created(&mut self, gpu: &mut dyn GpuBackend) {
        if self.program.is_none() {
            self.program = create_passthrough_program(gpu, "content_layer");
        }
        if self.program.is_some() {
            self.slot.upload(gpu);
        }
    }

    pub(crate) fn draw(&self, gpu: &mut dyn GpuBackend) {
        if let (Some(program), Some(texture)) = (self.program, self.slot.texture()) {
            gpu.draw_quad(&QuadDraw::full_screen(program, texture));
        }
    }

    pub(crate) fn release(&mut self, gpu: &mut dyn GpuBackend) {
        self.slot.release(gpu);
        if let Some(program) = self.program.take() {
            gpu.delete_program(program);
        }
    }
}

pub(crate) fn create_passthrough_program(
    gpu: &mut dyn GpuBackend,
    label: &str,
) -> Option<ProgramId> {
    let descriptor = ProgramDescriptor {
        label,
        source: &ShaderSource::Passthrough,
    };
    gpu.create_program(&descriptor)
        .inspect_err(|err| error!(label, error = %err, "layer program failed to build"))
        .ok()
}
