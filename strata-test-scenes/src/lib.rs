//! Reusable compositing scenes with pixel expectations, shared by the integration tests
//! and the benchmarks.

pub mod expectations;
pub mod scene;
pub mod shaders;

pub use expectations::{
    assert_pixels, assert_screen_pixels, check_pixels, PixelExpectation, PixelFailure,
};
pub use scene::{
    all_scenes, build_main_scene, prepared_software_compositor, SceneBuilder, CANVAS_HEIGHT,
    CANVAS_WIDTH,
};
