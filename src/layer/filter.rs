use tracing::{debug, error, warn};

use crate::color::Color;
use crate::filter::FilterEffect;
use crate::gpu::{GpuBackend, ProgramDescriptor, QuadDraw, ShaderSource, Target};
use crate::id::{ProgramId, TargetId, TextureId};
use crate::shaders::validate_custom_filter;
use crate::target::IntermediateTarget;

/// Lifecycle of a filter layer's program.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterState {
    /// No program yet, or the last build failed. The filter does not draw.
    Uninitialized,
    /// The program is built and the filter draws whenever it has an input.
    ProgramReady,
}

/// Applies a [`FilterEffect`] to everything composited beneath it.
///
/// Drawing is two sub-passes. With the filter enabled, the input is processed into the
/// filter's own target at the configured intensity. That texture is then presented into
/// the destination the compositor picked at intensity `0.0`. When the destination is the
/// filter's own target the second sub-pass is skipped, since a target never samples
/// itself. A disabled filter presents its input unchanged.
#[derive(Debug)]
pub struct FilterLayer {
    effect: FilterEffect,
    program: Option<ProgramId>,
    intensity: f32,
    enabled: bool,
    target: IntermediateTarget,
    input: Option<TextureId>,
    viewport: (u32, u32),
    surface_ready: bool,
}

impl FilterLayer {
    pub fn new(effect: FilterEffect) -> Self {
        Self {
            effect,
            program: None,
            intensity: 1.0,
            enabled: true,
            target: IntermediateTarget::new("filter_layer"),
            input: None,
            viewport: (0, 0),
            surface_ready: false,
        }
    }

    pub fn effect(&self) -> &FilterEffect {
        &self.effect
    }

    /// Swaps the effect. Once the surface exists the program is rebuilt immediately,
    /// including after an earlier build failed.
    pub fn set_effect(&mut self, gpu: &mut dyn GpuBackend, effect: FilterEffect) {
        self.effect = effect;
        if let Some(program) = self.program.take() {
            gpu.delete_program(program);
        }
        if self.surface_ready {
            self.build_program(gpu);
        }
    }

    /// Sets the strength, clamped to `[0, 1]`. NaN counts as `0.0`.
    ///
    /// Returns `true` if the value changed.
    pub fn set_intensity(&mut self, intensity: f32) -> bool {
        let intensity = if intensity.is_nan() {
            0.0
        } else {
            intensity.clamp(0.0, 1.0)
        };
        if self.intensity == intensity {
            return false;
        }
        self.intensity = intensity;
        true
    }

    pub fn intensity(&self) -> f32 {
        self.intensity
    }

    /// Returns `true` if the value changed.
    pub fn set_enabled(&mut self, enabled: bool) -> bool {
        let changed = self.enabled != enabled;
        self.enabled = enabled;
        changed
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn state(&self) -> FilterState {
        if self.program.is_some() {
            FilterState::ProgramReady
        } else {
            FilterState::Uninitialized
        }
    }

    /// Texture holding this filter's processed output.
    pub fn output_texture(&self) -> Option<TextureId> {
        self.target.get().map(|target| target.texture)
    }

    /// The filter's dedicated off-screen target.
    pub fn target(&self) -> Option<TargetId> {
        self.target.get().map(|target| target.target)
    }

    pub fn input(&self) -> Option<TextureId> {
        self.input
    }

    pub(crate) fn set_input(&mut self, input: Option<TextureId>) {
        self.input = input;
    }

    pub(crate) fn on_surface_created(&mut self, gpu: &mut dyn GpuBackend) {
        self.surface_ready = true;
        if self.program.is_none() {
            self.build_program(gpu);
        }
    }

    pub(crate) fn on_surface_changed(&mut self, gpu: &mut dyn GpuBackend, size: (u32, u32)) {
        self.viewport = size;
        self.target.recreate(gpu, size);
    }

    pub(crate) fn draw(&self, gpu: &mut dyn GpuBackend, destination: Target) {
        let (Some(program), Some(input)) = (self.program, self.input) else {
            return;
        };

        if !self.enabled {
            gpu.bind_target(destination);
            gpu.draw_quad(&QuadDraw::full_screen(program, input));
            return;
        }

        let Some(own) = self.target.get() else {
            if destination == Target::Screen {
                // Single pass straight into the destination.
                warn!(viewport = ?self.viewport, "filter target missing, applying filter directly");
                gpu.bind_target(destination);
                gpu.draw_quad(&QuadDraw::full_screen(program, input).with_intensity(self.intensity));
            }
            return;
        };

        gpu.bind_target(own.as_target());
        gpu.clear(Color::TRANSPARENT);
        gpu.draw_quad(&QuadDraw::full_screen(program, input).with_intensity(self.intensity));

        if destination == own.as_target() {
            return;
        }

        gpu.bind_target(destination);
        gpu.draw_quad(&QuadDraw::full_screen(program, own.texture));
    }

    pub(crate) fn release(&mut self, gpu: &mut dyn GpuBackend) {
        self.target.release(gpu);
        if let Some(program) = self.program.take() {
            gpu.delete_program(program);
        }
        self.input = None;
        self.surface_ready = false;
    }

    fn build_program(&mut self, gpu: &mut dyn GpuBackend) {
        let label = format!("filter_{}", self.effect.label());

        if let FilterEffect::Custom(source) = &self.effect {
            if let Err(err) = validate_custom_filter(&label, source) {
                error!(error = %err, "custom filter rejected");
                return;
            }
        }

        let source = ShaderSource::Filter(self.effect.clone());
        match gpu.create_program(&ProgramDescriptor {
            label: &label,
            source: &source,
        }) {
            Ok(program) => {
                debug!(%program, effect = self.effect.label(), "filter program ready");
                self.program = Some(program);
            }
            Err(err) => error!(effect = self.effect.label(), error = %err, "filter program failed to build"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gpu::software::{GpuCommand, SoftwareBackend};
    use crate::image_data::Image;

    fn ready_filter(gpu: &mut SoftwareBackend, effect: FilterEffect) -> FilterLayer {
        let mut filter = FilterLayer::new(effect);
        filter.on_surface_created(gpu);
        filter.on_surface_changed(gpu, (2, 2));
        filter
    }

    fn red_input(gpu: &mut SoftwareBackend) -> TextureId {
        gpu.create_texture(&Image::filled(2, 2, Color::rgb(255, 0, 0)).unwrap())
            .unwrap()
    }

    #[test]
    fn intensity_is_clamped() {
        let mut filter = FilterLayer::new(FilterEffect::Grayscale);
        filter.set_intensity(3.0);
        assert_eq!(filter.intensity(), 1.0);
        filter.set_intensity(-1.0);
        assert_eq!(filter.intensity(), 0.0);
        filter.set_intensity(0.5);
        assert!(filter.set_intensity(f32::NAN));
        assert_eq!(filter.intensity(), 0.0);
        assert!(!filter.set_intensity(0.0));
    }

    #[test]
    fn state_follows_program_lifecycle() {
        let mut gpu = SoftwareBackend::new((2, 2));
        let mut filter = FilterLayer::new(FilterEffect::Invert);
        assert_eq!(filter.state(), FilterState::Uninitialized);

        filter.on_surface_created(&mut gpu);
        assert_eq!(filter.state(), FilterState::ProgramReady);

        filter.release(&mut gpu);
        assert_eq!(filter.state(), FilterState::Uninitialized);
    }

    #[test]
    fn draw_without_input_is_silent() {
        let mut gpu = SoftwareBackend::new((2, 2));
        let filter = ready_filter(&mut gpu, FilterEffect::Grayscale);

        gpu.begin_frame().unwrap();
        filter.draw(&mut gpu, Target::Screen);
        assert!(gpu.commands().is_empty());
    }

    #[test]
    fn dual_pass_presents_processed_output() {
        let mut gpu = SoftwareBackend::new((2, 2));
        let mut filter = ready_filter(&mut gpu, FilterEffect::Invert);
        let input = red_input(&mut gpu);
        filter.set_input(Some(input));

        gpu.begin_frame().unwrap();
        filter.draw(&mut gpu, Target::Screen);

        let own = Target::Offscreen(filter.target().unwrap());
        let binds: Vec<_> = gpu
            .commands()
            .iter()
            .filter_map(|command| match command {
                GpuCommand::Bind(target) => Some(*target),
                _ => None,
            })
            .collect();
        assert_eq!(binds, vec![own, Target::Screen]);
        assert_eq!(gpu.screen_pixel(0, 0), Some([0, 255, 255, 255]));
    }

    #[test]
    fn drawing_into_own_target_skips_the_second_pass() {
        let mut gpu = SoftwareBackend::new((2, 2));
        let mut filter = ready_filter(&mut gpu, FilterEffect::Invert);
        let input = red_input(&mut gpu);
        filter.set_input(Some(input));
        let own = Target::Offscreen(filter.target().unwrap());

        gpu.begin_frame().unwrap();
        filter.draw(&mut gpu, own);

        let draws = gpu
            .commands()
            .iter()
            .filter(|command| matches!(command, GpuCommand::Draw { .. }))
            .count();
        assert_eq!(draws, 1);
        let pixels = gpu.read_pixels(own).unwrap();
        assert_eq!(&pixels[..4], &[0, 255, 255, 255]);
    }

    #[test]
    fn disabled_filter_passes_input_through() {
        let mut gpu = SoftwareBackend::new((2, 2));
        let mut filter = ready_filter(&mut gpu, FilterEffect::Invert);
        let input = red_input(&mut gpu);
        filter.set_input(Some(input));
        filter.set_enabled(false);

        gpu.begin_frame().unwrap();
        filter.draw(&mut gpu, Target::Screen);
        assert_eq!(gpu.screen_pixel(1, 1), Some([255, 0, 0, 255]));
    }

    #[test]
    fn set_effect_rebuilds_a_live_program() {
        let mut gpu = SoftwareBackend::new((2, 2));
        let mut filter = ready_filter(&mut gpu, FilterEffect::Grayscale);
        let input = red_input(&mut gpu);
        filter.set_input(Some(input));

        filter.set_effect(&mut gpu, FilterEffect::Invert);
        assert_eq!(gpu.live_programs(), 1);

        gpu.begin_frame().unwrap();
        filter.draw(&mut gpu, Target::Screen);
        assert_eq!(gpu.screen_pixel(0, 0), Some([0, 255, 255, 255]));
    }

    #[test]
    fn failed_custom_program_leaves_filter_uninitialized() {
        let mut gpu = SoftwareBackend::new((2, 2));
        let mut filter = ready_filter(&mut gpu, FilterEffect::Grayscale);

        filter.set_effect(&mut gpu, FilterEffect::custom("fn not_an_entry_point() {}"));
        assert_eq!(filter.state(), FilterState::Uninitialized);
        assert_eq!(gpu.live_programs(), 0);
    }

    #[test]
    fn valid_effect_recovers_from_a_failed_build() {
        let mut gpu = SoftwareBackend::new((2, 2));
        let mut filter = ready_filter(&mut gpu, FilterEffect::custom("fn not_an_entry_point() {}"));
        assert_eq!(filter.state(), FilterState::Uninitialized);

        filter.set_effect(&mut gpu, FilterEffect::Invert);

        assert_eq!(filter.state(), FilterState::ProgramReady);
        assert_eq!(gpu.live_programs(), 1);
    }

    #[test]
    fn effect_set_before_the_surface_builds_nothing() {
        let mut gpu = SoftwareBackend::new((2, 2));
        let mut filter = FilterLayer::new(FilterEffect::Grayscale);

        filter.set_effect(&mut gpu, FilterEffect::Sepia);
        assert_eq!(filter.state(), FilterState::Uninitialized);
        assert_eq!(gpu.live_programs(), 0);

        filter.on_surface_created(&mut gpu);
        assert_eq!(filter.state(), FilterState::ProgramReady);
    }

    #[test]
    fn release_is_idempotent_and_frees_target() {
        let mut gpu = SoftwareBackend::new((2, 2));
        let mut filter = ready_filter(&mut gpu, FilterEffect::Sepia);

        filter.release(&mut gpu);
        filter.release(&mut gpu);

        assert_eq!(gpu.live_targets(), 0);
        assert_eq!(gpu.live_programs(), 0);
        assert_eq!(filter.output_texture(), None);
    }
}
