use strata::gpu::software::SoftwareBackend;
use strata::{
    Color, Compositor, CompositorConfig, FilterEffect, GpuBackend, Image, Layer, Transform2D,
};

use crate::expectations::PixelExpectation;

pub const CANVAS_WIDTH: u32 = 80;
pub const CANVAS_HEIGHT: u32 = 60;

pub const RED: Color = Color([255, 0, 0, 255]);
pub const GREEN: Color = Color([0, 255, 0, 255]);
pub const BLUE: Color = Color([0, 0, 255, 255]);

/// Gray level the luminance weights give pure red.
const RED_LUMA: u8 = 76;

/// Builds a scene into `compositor` and returns the pixels it must produce.
pub type SceneBuilder<B> = fn(&mut Compositor<B>) -> Vec<PixelExpectation>;

/// Every scene with its name, for running the whole set against one backend.
pub fn all_scenes<B: GpuBackend + 'static>() -> Vec<(&'static str, SceneBuilder<B>)> {
    vec![
        ("plain_stack", build_plain_stack::<B> as SceneBuilder<B>),
        ("single_filter", build_single_filter::<B> as SceneBuilder<B>),
        ("adjacent_filters", build_adjacent_filters::<B> as SceneBuilder<B>),
        ("interleaved_filters", build_interleaved_filters::<B> as SceneBuilder<B>),
        ("disabled_filter", build_disabled_filter::<B> as SceneBuilder<B>),
        ("half_intensity", build_half_intensity::<B> as SceneBuilder<B>),
        ("main", build_main_scene::<B> as SceneBuilder<B>),
    ]
}

/// A software compositor with its surface created and sized to the test canvas.
pub fn prepared_software_compositor() -> Compositor<SoftwareBackend> {
    let mut compositor = Compositor::new(
        SoftwareBackend::new((CANVAS_WIDTH, CANVAS_HEIGHT)),
        CompositorConfig::default(),
    );
    compositor.on_surface_created();
    compositor.on_surface_changed(CANVAS_WIDTH, CANVAS_HEIGHT);
    compositor
}

fn full_canvas(color: Color) -> Image {
    solid(CANVAS_WIDTH, CANVAS_HEIGHT, color)
}

fn solid(width: u32, height: u32, color: Color) -> Image {
    Image::filled(width, height, color).expect("scene images are never empty")
}

fn sticker(color: Color, size: u32, center: (f32, f32), z_order: i32) -> Layer {
    Layer::transform(Transform2D::new(center, 1.0, 0.0))
        .with_image(solid(size, size, color))
        .with_z_order(z_order)
}

/// Background plus a sticker, no filters.
pub fn build_plain_stack<B: GpuBackend + 'static>(
    compositor: &mut Compositor<B>,
) -> Vec<PixelExpectation> {
    compositor.add_layer(Layer::content().with_image(full_canvas(RED)));
    compositor.add_layer(sticker(BLUE, 20, (20.0, 15.0), 1));

    vec![
        PixelExpectation::opaque(20, 15, 0, 0, 255, "sticker_center"),
        PixelExpectation::opaque(11, 6, 0, 0, 255, "sticker_top_left"),
        PixelExpectation::opaque(60, 45, 255, 0, 0, "background"),
        PixelExpectation::opaque(9, 4, 255, 0, 0, "just_outside_sticker"),
    ]
}

/// One grayscale filter over a red background.
pub fn build_single_filter<B: GpuBackend + 'static>(
    compositor: &mut Compositor<B>,
) -> Vec<PixelExpectation> {
    compositor.add_layer(Layer::content().with_image(full_canvas(RED)));
    compositor.add_layer(Layer::filter(FilterEffect::Grayscale).with_z_order(1));

    vec![
        PixelExpectation::gray(0, 0, RED_LUMA, "corner"),
        PixelExpectation::gray(40, 30, RED_LUMA, "center"),
        PixelExpectation::gray(79, 59, RED_LUMA, "far_corner"),
    ]
}

/// Two filters with nothing between them; the second reads the first one's output.
pub fn build_adjacent_filters<B: GpuBackend + 'static>(
    compositor: &mut Compositor<B>,
) -> Vec<PixelExpectation> {
    compositor.add_layer(Layer::content().with_image(full_canvas(RED)));
    compositor.add_layer(Layer::filter(FilterEffect::Grayscale).with_z_order(1));
    compositor.add_layer(Layer::filter(FilterEffect::Invert).with_z_order(2));

    vec![
        PixelExpectation::gray(10, 10, 255 - RED_LUMA, "inverted_gray"),
        PixelExpectation::gray(70, 50, 255 - RED_LUMA, "inverted_gray_far"),
    ]
}

/// `[content, filter, content, filter]`: the sticker sits between the filters, so only
/// the upper filter applies to it.
pub fn build_interleaved_filters<B: GpuBackend + 'static>(
    compositor: &mut Compositor<B>,
) -> Vec<PixelExpectation> {
    compositor.add_layer(Layer::content().with_image(full_canvas(RED)));
    compositor.add_layer(Layer::filter(FilterEffect::Grayscale).with_z_order(1));
    compositor.add_layer(sticker(GREEN, 20, (40.0, 30.0), 2));
    compositor.add_layer(Layer::filter(FilterEffect::Invert).with_z_order(3));

    vec![
        PixelExpectation::gray(5, 5, 255 - RED_LUMA, "background_both_filters"),
        PixelExpectation::opaque(40, 30, 255, 0, 255, "sticker_inverted_only"),
        PixelExpectation::opaque(31, 21, 255, 0, 255, "sticker_corner"),
        PixelExpectation::gray(29, 19, 255 - RED_LUMA, "outside_sticker"),
    ]
}

/// A disabled filter passes its input through untouched.
pub fn build_disabled_filter<B: GpuBackend + 'static>(
    compositor: &mut Compositor<B>,
) -> Vec<PixelExpectation> {
    compositor.add_layer(Layer::content().with_image(full_canvas(RED)));
    let filter = compositor.add_layer(Layer::filter(FilterEffect::Invert).with_z_order(1));
    compositor.set_filter_enabled(filter, false);

    vec![PixelExpectation::opaque(40, 30, 255, 0, 0, "unfiltered")]
}

/// Intensity blends between the input and the filtered color.
pub fn build_half_intensity<B: GpuBackend + 'static>(
    compositor: &mut Compositor<B>,
) -> Vec<PixelExpectation> {
    compositor.add_layer(Layer::content().with_image(full_canvas(RED)));
    compositor.add_layer(
        Layer::filter(FilterEffect::Invert)
            .with_z_order(1)
            .with_intensity(0.5),
    );

    vec![PixelExpectation::gray(40, 30, 128, "half_inverted")]
}

/// Interleaved filters with a sticker above the top filter, which stays unfiltered.
pub fn build_main_scene<B: GpuBackend + 'static>(
    compositor: &mut Compositor<B>,
) -> Vec<PixelExpectation> {
    let mut expectations = build_interleaved_filters(compositor);
    compositor.add_layer(sticker(BLUE, 10, (10.0, 10.0), 4));

    expectations.retain(|expectation| expectation.label != "background_both_filters");
    expectations.extend([
        PixelExpectation::opaque(10, 10, 0, 0, 255, "top_sticker_unfiltered"),
        PixelExpectation::gray(5, 55, 255 - RED_LUMA, "background_both_filters"),
    ]);
    expectations
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expectations::assert_screen_pixels;

    #[test]
    fn every_scene_renders_on_the_software_backend() {
        for (name, build) in all_scenes::<SoftwareBackend>() {
            let mut compositor = prepared_software_compositor();
            let expectations = build(&mut compositor);
            assert!(compositor.pump(), "{name}: no frame drawn");
            assert_screen_pixels(compositor.backend_mut(), &expectations);
        }
    }
}
