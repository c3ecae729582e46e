//! Layer variants and the capability set the compositor drives them through.

mod content;
mod filter;
mod texture_slot;
mod transformed;

pub use content::ContentLayer;
pub use filter::{FilterLayer, FilterState};
pub use transformed::TransformLayer;

use crate::filter::FilterEffect;
use crate::gpu::{GpuBackend, Target};
use crate::image_data::Image;
use crate::transform::Transform2D;

/// One drawable entry of the layer stack.
#[derive(Debug)]
pub enum LayerVariant {
    /// An image covering the whole target.
    Content(ContentLayer),
    /// An image placed with position, scale and rotation.
    Transform(TransformLayer),
    /// A filter over everything beneath it.
    Filter(FilterLayer),
}

/// A layer with its Z-order. Higher Z draws later, on top.
///
/// # Examples
///
/// ```
/// use strata::{Color, FilterEffect, Image, Layer, Transform2D};
///
/// let photo = Layer::content()
///     .with_image(Image::filled(4, 4, Color::rgb(200, 40, 40)).unwrap());
/// let sticker = Layer::transform(Transform2D::new((2.0, 2.0), 0.5, 15.0)).with_z_order(1);
/// let mono = Layer::filter(FilterEffect::Grayscale).with_z_order(2);
///
/// assert!(!photo.is_filter());
/// assert_eq!(sticker.z_order(), 1);
/// assert!(mono.is_filter());
/// ```
#[derive(Debug)]
pub struct Layer {
    z_order: i32,
    variant: LayerVariant,
}

impl Layer {
    pub fn new(variant: LayerVariant) -> Self {
        Self { z_order: 0, variant }
    }

    pub fn content() -> Self {
        Self::new(LayerVariant::Content(ContentLayer::new()))
    }

    pub fn transform(transform: Transform2D) -> Self {
        Self::new(LayerVariant::Transform(TransformLayer::new(transform)))
    }

    pub fn filter(effect: FilterEffect) -> Self {
        Self::new(LayerVariant::Filter(FilterLayer::new(effect)))
    }

    pub fn with_z_order(mut self, z_order: i32) -> Self {
        self.z_order = z_order;
        self
    }

    /// Attaches an image to be uploaded once the layer's resources exist.
    /// Ignored by filter layers.
    pub fn with_image(mut self, image: Image) -> Self {
        match &mut self.variant {
            LayerVariant::Content(layer) => layer.set_pending_image(image),
            LayerVariant::Transform(layer) => layer.set_pending_image(image),
            LayerVariant::Filter(_) => {}
        }
        self
    }

    /// Sets the starting intensity of a filter layer. Ignored by other variants.
    pub fn with_intensity(mut self, intensity: f32) -> Self {
        if let LayerVariant::Filter(filter) = &mut self.variant {
            filter.set_intensity(intensity);
        }
        self
    }

    pub fn z_order(&self) -> i32 {
        self.z_order
    }

    pub fn set_z_order(&mut self, z_order: i32) {
        self.z_order = z_order;
    }

    pub fn variant(&self) -> &LayerVariant {
        &self.variant
    }

    pub fn variant_mut(&mut self) -> &mut LayerVariant {
        &mut self.variant
    }

    pub fn is_filter(&self) -> bool {
        matches!(self.variant, LayerVariant::Filter(_))
    }

    pub fn as_filter(&self) -> Option<&FilterLayer> {
        match &self.variant {
            LayerVariant::Filter(filter) => Some(filter),
            _ => None,
        }
    }

    pub fn as_filter_mut(&mut self) -> Option<&mut FilterLayer> {
        match &mut self.variant {
            LayerVariant::Filter(filter) => Some(filter),
            _ => None,
        }
    }

    pub fn as_transform_mut(&mut self) -> Option<&mut TransformLayer> {
        match &mut self.variant {
            LayerVariant::Transform(layer) => Some(layer),
            _ => None,
        }
    }

    /// Whether a content texture is live. Filters count as loaded once their program is.
    pub fn is_loaded(&self) -> bool {
        match &self.variant {
            LayerVariant::Content(layer) => layer.is_loaded(),
            LayerVariant::Transform(layer) => layer.is_loaded(),
            LayerVariant::Filter(filter) => filter.state() == FilterState::ProgramReady,
        }
    }

    /// Uploads `image` into a content or transform layer.
    ///
    /// Returns `None` for filters, otherwise whether a new texture went live.
    pub(crate) fn set_image(&mut self, gpu: &mut dyn GpuBackend, image: Image) -> Option<bool> {
        match &mut self.variant {
            LayerVariant::Content(layer) => Some(layer.set_image(gpu, image)),
            LayerVariant::Transform(layer) => Some(layer.set_image(gpu, image)),
            LayerVariant::Filter(_) => None,
        }
    }

    pub(crate) fn on_surface_created(&mut self, gpu: &mut dyn GpuBackend) {
        match &mut self.variant {
            LayerVariant::Content(layer) => layer.on_surface_created(gpu),
            LayerVariant::Transform(layer) => layer.on_surface_created(gpu),
            LayerVariant::Filter(filter) => filter.on_surface_created(gpu),
        }
    }

    pub(crate) fn on_surface_changed(&mut self, gpu: &mut dyn GpuBackend, size: (u32, u32)) {
        match &mut self.variant {
            LayerVariant::Content(_) => {}
            LayerVariant::Transform(layer) => layer.on_surface_changed(size),
            LayerVariant::Filter(filter) => filter.on_surface_changed(gpu, size),
        }
    }

    /// Draws into `destination`, which the compositor has already bound.
    pub(crate) fn draw(&self, gpu: &mut dyn GpuBackend, destination: Target) {
        match &self.variant {
            LayerVariant::Content(layer) => layer.draw(gpu),
            LayerVariant::Transform(layer) => layer.draw(gpu),
            LayerVariant::Filter(filter) => filter.draw(gpu, destination),
        }
    }

    pub(crate) fn release(&mut self, gpu: &mut dyn GpuBackend) {
        match &mut self.variant {
            LayerVariant::Content(layer) => layer.release(gpu),
            LayerVariant::Transform(layer) => layer.release(gpu),
            LayerVariant::Filter(filter) => filter.release(gpu),
        }
    }
}
