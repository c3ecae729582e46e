use crate::gpu::{GpuBackend, Quad, QuadDraw, IDENTITY_MVP};
use crate::id::ProgramId;
use crate::image_data::Image;
use crate::layer::content::create_passthrough_program;
use crate::layer::texture_slot::TextureSlot;
use crate::transform::{layer_mvp_or_identity, Transform2D};

/// Draws its image at a position, scale and rotation in target pixel space.
///
/// The MVP is rebuilt whenever the transform, the viewport or the content size changes.
/// Until both sizes are known it stays the identity and the layer does not draw.
#[derive(Debug)]
pub struct TransformLayer {
    program: Option<ProgramId>,
    slot: TextureSlot,
    transform: Transform2D,
    viewport: (u32, u32),
    mvp: [[f32; 4]; 4],
    placeable: bool,
}

impl Default for TransformLayer {
    fn default() -> Self {
        Self::new(Transform2D::default())
    }
}

impl TransformLayer {
    pub fn new(transform: Transform2D) -> Self {
        Self {
            program: None,
            slot: TextureSlot::default(),
            transform,
            viewport: (0, 0),
            mvp: IDENTITY_MVP,
            placeable: false,
        }
    }

    /// Queues `image` for upload; uploads at once when resources are ready.
    ///
    /// Returns `true` if a new texture went live.
    pub fn set_image(&mut self, gpu: &mut dyn GpuBackend, image: Image) -> bool {
        self.slot.set_pending(image);
        let uploaded = self.program.is_some() && self.slot.upload(gpu);
        self.update_mvp();
        uploaded
    }

    pub(crate) fn set_pending_image(&mut self, image: Image) {
        self.slot.set_pending(image);
    }

    /// Returns `true` if the value changed.
    pub fn set_position(&mut self, x: f32, y: f32) -> bool {
        if self.transform.position == (x, y) {
            return false;
        }
        self.transform.position = (x, y);
        self.update_mvp();
        true
    }

    /// Returns `true` if the value changed.
    pub fn set_scale(&mut self, scale: f32) -> bool {
        if self.transform.scale == scale {
            return false;
        }
        self.transform.scale = scale;
        self.update_mvp();
        true
    }

    /// Returns `true` if the value changed.
    pub fn set_rotation(&mut self, degrees: f32) -> bool {
        if self.transform.rotation_degrees == degrees {
            return false;
        }
        self.transform.rotation_degrees = degrees;
        self.update_mvp();
        true
    }

    pub fn transform(&self) -> Transform2D {
        self.transform
    }

    pub fn position(&self) -> (f32, f32) {
        self.transform.position
    }

    pub fn scale(&self) -> f32 {
        self.transform.scale
    }

    pub fn rotation(&self) -> f32 {
        self.transform.rotation_degrees
    }

    /// The current column-major MVP. Identity while sizes are unknown.
    pub fn mvp(&self) -> [[f32; 4]; 4] {
        self.mvp
    }

    pub fn is_loaded(&self) -> bool {
        self.slot.texture().is_some()
    }

    pub fn content_size(&self) -> (u32, u32) {
        self.slot.content_size()
    }

    pub(crate) fn on_surface_created(&mut self, gpu: &mut dyn GpuBackend) {
        if self.program.is_none() {
            self.program = create_passthrough_program(gpu, "transform_layer");
        }
        if self.program.is_some() && self.slot.upload(gpu) {
            self.update_mvp();
        }
    }

    pub(crate) fn on_surface_changed(&mut self, size: (u32, u32)) {
        self.viewport = size;
        self.update_mvp();
    }

    pub(crate) fn draw(&self, gpu: &mut dyn GpuBackend) {
        if !self.placeable {
            return;
        }
        if let (Some(program), Some(texture)) = (self.program, self.slot.texture()) {
            gpu.draw_quad(&QuadDraw {
                program,
                texture,
                mvp: self.mvp,
                intensity: 0.0,
                quad: Quad::Centered,
            });
        }
    }

    pub(crate) fn release(&mut self, gpu: &mut dyn GpuBackend) {
        self.slot.release(gpu);
        if let Some(program) = self.program.take() {
            gpu.delete_program(program);
        }
        self.update_mvp();
    }

    fn update_mvp(&mut self) {
        (self.mvp, self.placeable) =
            layer_mvp_or_identity(&self.transform, self.viewport, self.slot.content_size());
    }
}
