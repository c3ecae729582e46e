use euclid::{Angle, Transform3D, UnknownUnit};

use crate::gpu::IDENTITY_MVP;

pub(crate) type Matrix = Transform3D<f32, UnknownUnit, UnknownUnit>;

/// Placement of a transform layer in target pixel space.
///
/// `position` is where the content's center lands, with `(0, 0)` at the top-left of the
/// target. `scale` multiplies the content's own pixel size and `rotation_degrees` turns it
/// about its center.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Transform2D {
    pub position: (f32, f32),
    pub scale: f32,
    pub rotation_degrees: f32,
}

impl Default for Transform2D {
    fn default() -> Self {
        Self {
            position: (0.0, 0.0),
            scale: 1.0,
            rotation_degrees: 0.0,
        }
    }
}

impl Transform2D {
    pub fn new(position: (f32, f32), scale: f32, rotation_degrees: f32) -> Self {
        Self {
            position,
            scale,
            rotation_degrees,
        }
    }

    /// `Translate(position) * Rotate(rotation) * Scale(content * scale)`, applied to the
    /// unit quad centered on the origin.
    pub(crate) fn model_matrix(&self, content_size: (u32, u32)) -> Matrix {
        let scale = Matrix::scale(
            content_size.0 as f32 * self.scale,
            content_size.1 as f32 * self.scale,
            1.0,
        );
        let rotation = Matrix::rotation(0.0, 0.0, 1.0, Angle::degrees(self.rotation_degrees));
        let translation = Matrix::translation(self.position.0, self.position.1, 0.0);

        scale.then(&rotation).then(&translation)
    }
}

/// Orthographic projection from pixel coordinates (origin top-left, y down) to normalized
/// device coordinates (origin center, y up).
pub(crate) fn pixel_projection(viewport: (u32, u32)) -> Option<Matrix> {
    let (width, height) = viewport;
    if width == 0 || height == 0 {
        return None;
    }
    Some(Matrix::ortho(0.0, width as f32, height as f32, 0.0, -1.0, 1.0))
}

/// Full model-view-projection matrix for a transformed quad, column-major.
///
/// `None` when the viewport or content size is still unknown: callers fall back to
/// [`IDENTITY_MVP`] and suppress the draw.
pub(crate) fn layer_mvp(
    transform: &Transform2D,
    viewport: (u32, u32),
    content_size: (u32, u32),
) -> Option<[[f32; 4]; 4]> {
    if content_size.0 == 0 || content_size.1 == 0 {
        return None;
    }
    let projection = pixel_projection(viewport)?;
    let mvp = transform.model_matrix(content_size).then(&projection);
    Some(mvp.to_arrays())
}

/// Like [`layer_mvp`] but collapsing unknown sizes to the identity.
pub(crate) fn layer_mvp_or_identity(
    transform: &Transform2D,
    viewport: (u32, u32),
    content_size: (u32, u32),
) -> ([[f32; 4]; 4], bool) {
    match layer_mvp(transform, viewport, content_size) {
        Some(mvp) => (mvp, true),
        None => (IDENTITY_MVP, false),
    }
}
