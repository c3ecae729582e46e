//! A deterministic CPU rasterizer behind [`GpuBackend`].
//!
//! Pixels are stored as straight-alpha `f32` RGBA, textures are sampled nearest with
//! clamp-to-edge, and pixel centers sit at `i + 0.5`. Every command issued during a
//! frame is recorded so callers can assert on what was bound, cleared and drawn.

use ahash::{HashMap, HashMapExt};
use tracing::{debug, warn};

use crate::color::{quantize_channel, Color};
use crate::error::GpuError;
use crate::filter::FilterEffect;
use crate::gpu::{
    BlendMode, GpuBackend, ProgramDescriptor, Quad, QuadDraw, ShaderSource, Target, QUAD_INDICES,
};
use crate::id::{ProgramId, TargetId, TextureId};
use crate::image_data::Image;

/// Largest edge accepted by [`SoftwareBackend::create_target`].
pub const MAX_TARGET_EDGE: u32 = 8192;

/// A command recorded by [`SoftwareBackend`] since the last `begin_frame`.
#[derive(Debug, Clone, PartialEq)]
pub enum GpuCommand {
    CreateTarget { target: TargetId, size: (u32, u32) },
    DeleteTarget(TargetId),
    Bind(Target),
    Clear { target: Target, color: Color },
    Draw {
        target: Target,
        program: ProgramId,
        texture: TextureId,
        intensity: f32,
        quad: Quad,
    },
}

#[derive(Debug, Clone)]
struct Pixmap {
    width: u32,
    height: u32,
    pixels: Vec<[f32; 4]>,
}

impl Pixmap {
    fn new(size: (u32, u32)) -> Self {
        Self {
            width: size.0,
            height: size.1,
            pixels: vec![[0.0; 4]; size.0 as usize * size.1 as usize],
        }
    }

    fn from_image(image: &Image) -> Self {
        let pixels = image
            .pixels()
            .chunks_exact(4)
            .map(|rgba| Color::rgba(rgba[0], rgba[1], rgba[2], rgba[3]).normalize())
            .collect();
        Self {
            width: image.width(),
            height: image.height(),
            pixels,
        }
    }

    fn fill(&mut self, color: Color) {
        let normalized = color.normalize();
        self.pixels.iter_mut().for_each(|pixel| *pixel = normalized);
    }

    fn sample_nearest(&self, uv: [f32; 2]) -> [f32; 4] {
        let x = ((uv[0] * self.width as f32).floor() as i64).clamp(0, self.width as i64 - 1);
        let y = ((uv[1] * self.height as f32).floor() as i64).clamp(0, self.height as i64 - 1);
        self.pixels[y as usize * self.width as usize + x as usize]
    }

    fn to_rgba8(&self) -> Vec<u8> {
        self.pixels
            .iter()
            .flat_map(|pixel| pixel.map(quantize_channel))
            .collect()
    }
}

/// CPU implementation of [`GpuBackend`], used headless and in tests.
///
/// # Examples
///
/// ```
/// use strata::gpu::software::SoftwareBackend;
/// use strata::{Color, GpuBackend, Target};
///
/// let mut gpu = SoftwareBackend::new((4, 4));
/// gpu.begin_frame().unwrap();
/// gpu.bind_target(Target::Screen);
/// gpu.clear(Color::rgb(255, 0, 0));
/// gpu.end_frame().unwrap();
///
/// assert_eq!(gpu.screen_pixel(0, 0), Some([255, 0, 0, 255]));
/// ```
#[derive(Debug)]
pub struct SoftwareBackend {
    screen: Pixmap,
    textures: HashMap<TextureId, Pixmap>,
    targets: HashMap<TargetId, TextureId>,
    programs: HashMap<ProgramId, ShaderSource>,
    bound: Target,
    blend_mode: BlendMode,
    next_handle: u64,
    commands: Vec<GpuCommand>,
    frames_presented: u64,
    fail_target_allocation: bool,
}

impl SoftwareBackend {
    pub fn new(size: (u32, u32)) -> Self {
        Self {
            screen: Pixmap::new(size),
            textures: HashMap::new(),
            targets: HashMap::new(),
            programs: HashMap::new(),
            bound: Target::Screen,
            blend_mode: BlendMode::default(),
            next_handle: 0,
            commands: Vec::new(),
            frames_presented: 0,
            fail_target_allocation: false,
        }
    }

    /// Commands issued since the last `begin_frame`.
    pub fn commands(&self) -> &[GpuCommand] {
        &self.commands
    }

    /// Number of off-screen targets currently allocated.
    pub fn live_targets(&self) -> usize {
        self.targets.len()
    }

    /// Number of textures currently allocated, target backing textures included.
    pub fn live_textures(&self) -> usize {
        self.textures.len()
    }

    /// The texture backing `target`, while the target is alive.
    pub fn target_texture(&self, target: TargetId) -> Option<TextureId> {
        self.targets.get(&target).copied()
    }

    pub fn live_programs(&self) -> usize {
        self.programs.len()
    }

    pub fn frames_presented(&self) -> u64 {
        self.frames_presented
    }

    pub fn blend_mode(&self) -> BlendMode {
        self.blend_mode
    }

    /// Makes every following `create_target` fail as an incomplete framebuffer.
    pub fn set_target_allocation_failure(&mut self, fail: bool) {
        self.fail_target_allocation = fail;
    }

    /// The screen pixel at `(x, y)` as RGBA8.
    pub fn screen_pixel(&self, x: u32, y: u32) -> Option<[u8; 4]> {
        if x >= self.screen.width || y >= self.screen.height {
            return None;
        }
        let pixel = self.screen.pixels[y as usize * self.screen.width as usize + x as usize];
        Some(pixel.map(quantize_channel))
    }

    fn next_handle(&mut self) -> u64 {
        self.next_handle += 1;
        self.next_handle
    }
}

impl GpuBackend for SoftwareBackend {
    fn begin_frame(&mut self) -> Result<(), GpuError> {
        self.commands.clear();
        self.bound = Target::Screen;
        Ok(())
    }

    fn end_frame(&mut self) -> Result<(), GpuError> {
        self.frames_presented += 1;
        Ok(())
    }

    fn set_blend_mode(&mut self, mode: BlendMode) {
        self.blend_mode = mode;
    }

    fn create_program(&mut self, descriptor: &ProgramDescriptor<'_>) -> Result<ProgramId, GpuError> {
        if let ShaderSource::Filter(FilterEffect::Custom(_)) = descriptor.source {
            return Err(GpuError::Unsupported(format!(
                "custom WGSL filter `{}`",
                descriptor.label
            )));
        }

        let program = ProgramId(self.next_handle());
        self.programs.insert(program, descriptor.source.clone());
        debug!(%program, label = descriptor.label, "created program");
        Ok(program)
    }

    fn delete_program(&mut self, program: ProgramId) {
        if self.programs.remove(&program).is_none() {
            debug!(%program, "delete of unknown program ignored");
        }
    }

    fn create_texture(&mut self, image: &Image) -> Result<TextureId, GpuError> {
        let texture = TextureId(self.next_handle());
        self.textures.insert(texture, Pixmap::from_image(image));
        Ok(texture)
    }

    fn delete_texture(&mut self, texture: TextureId) {
        if self.targets.values().any(|backing| *backing == texture) {
            warn!(%texture, "refusing to delete a target's backing texture directly");
            return;
        }
        if self.textures.remove(&texture).is_none() {
            debug!(%texture, "delete of unknown texture ignored");
        }
    }

    fn create_target(&mut self, size: (u32, u32)) -> Result<(TargetId, TextureId), GpuError> {
        let (width, height) = size;
        if width == 0 || height == 0 || width > MAX_TARGET_EDGE || height > MAX_TARGET_EDGE {
            return Err(GpuError::IncompleteTarget {
                width,
                height,
                reason: format!("dimensions must be within 1..={MAX_TARGET_EDGE}"),
            });
        }
        if self.fail_target_allocation {
            return Err(GpuError::IncompleteTarget {
                width,
                height,
                reason: "framebuffer attachment incomplete".into(),
            });
        }

        let target = TargetId(self.next_handle());
        let texture = TextureId(self.next_handle());
        self.textures.insert(texture, Pixmap::new(size));
        self.targets.insert(target, texture);
        self.commands.push(GpuCommand::CreateTarget { target, size });
        Ok((target, texture))
    }

    fn delete_target(&mut self, target: TargetId) {
        match self.targets.remove(&target) {
            Some(texture) => {
                self.textures.remove(&texture);
                self.commands.push(GpuCommand::DeleteTarget(target));
            }
            None => debug!(%target, "delete of unknown target ignored"),
        }
    }

    fn bind_target(&mut self, target: Target) {
        self.bound = target;
        self.commands.push(GpuCommand::Bind(target));
    }

    fn clear(&mut self, color: Color) {
        self.commands.push(GpuCommand::Clear {
            target: self.bound,
            color,
        });

        match self.bound {
            Target::Screen => self.screen.fill(color),
            Target::Offscreen(target) => {
                let texture = self.targets.get(&target).copied();
                match texture.and_then(|texture| self.textures.get_mut(&texture)) {
                    Some(pixmap) => pixmap.fill(color),
                    None => warn!(%target, "clear of a deleted target ignored"),
                }
            }
        }
    }

    fn draw_quad(&mut self, draw: &QuadDraw) {
        self.commands.push(GpuCommand::Draw {
            target: self.bound,
            program: draw.program,
            texture: draw.texture,
            intensity: draw.intensity,
            quad: draw.quad,
        });

        let Some(program) = self.programs.get(&draw.program) else {
            warn!(program = %draw.program, "draw with unknown program skipped");
            return;
        };
        let blend_mode = self.blend_mode;

        match self.bound {
            Target::Screen => {
                let Some(source) = self.textures.get(&draw.texture) else {
                    warn!(texture = %draw.texture, "draw with unknown texture skipped");
                    return;
                };
                rasterize(&mut self.screen, source, program, draw, blend_mode);
            }
            Target::Offscreen(target) => {
                let Some(&backing) = self.targets.get(&target) else {
                    warn!(%target, "draw into a deleted target skipped");
                    return;
                };
                if backing == draw.texture {
                    warn!(%target, "draw sampling the bound target's own texture skipped");
                    return;
                }
                let Some(mut destination) = self.textures.remove(&backing) else {
                    return;
                };
                match self.textures.get(&draw.texture) {
                    Some(source) => rasterize(&mut destination, source, program, draw, blend_mode),
                    None => warn!(texture = %draw.texture, "draw with unknown texture skipped"),
                }
                self.textures.insert(backing, destination);
            }
        }
    }

    fn viewport_size(&self) -> (u32, u32) {
        (self.screen.width, self.screen.height)
    }

    fn resize(&mut self, size: (u32, u32)) {
        if size != self.viewport_size() {
            self.screen = Pixmap::new(size);
        }
    }

    fn read_pixels(&mut self, target: Target) -> Option<Vec<u8>> {
        match target {
            Target::Screen => Some(self.screen.to_rgba8()),
            Target::Offscreen(target) => {
                let texture = self.targets.get(&target)?;
                self.textures.get(texture).map(Pixmap::to_rgba8)
            }
        }
    }
}

fn rasterize(
    destination: &mut Pixmap,
    source: &Pixmap,
    program: &ShaderSource,
    draw: &QuadDraw,
    blend_mode: BlendMode,
) {
    let (width, height) = (destination.width as f32, destination.height as f32);
    let vertices = draw.quad.vertices();

    // Model space to pixel space. Pixel row 0 is the top of the target.
    let corners: Vec<[f32; 2]> = vertices
        .iter()
        .map(|vertex| {
            let [x, y] = vertex.position;
            let m = &draw.mvp;
            let clip_x = m[0][0] * x + m[1][0] * y + m[3][0];
            let clip_y = m[0][1] * x + m[1][1] * y + m[3][1];
            let clip_w = m[0][3] * x + m[1][3] * y + m[3][3];
            let (ndc_x, ndc_y) = (clip_x / clip_w, clip_y / clip_w);
            [(ndc_x + 1.0) * 0.5 * width, (1.0 - ndc_y) * 0.5 * height]
        })
        .collect();

    let min_x = corners.iter().map(|c| c[0]).fold(f32::INFINITY, f32::min);
    let max_x = corners.iter().map(|c| c[0]).fold(f32::NEG_INFINITY, f32::max);
    let min_y = corners.iter().map(|c| c[1]).fold(f32::INFINITY, f32::min);
    let max_y = corners.iter().map(|c| c[1]).fold(f32::NEG_INFINITY, f32::max);
    if !(min_x.is_finite() && max_x.is_finite() && min_y.is_finite() && max_y.is_finite()) {
        return;
    }

    let start_x = min_x.floor().max(0.0) as u32;
    let end_x = (max_x.ceil().min(width) as u32).min(destination.width);
    let start_y = min_y.floor().max(0.0) as u32;
    let end_y = (max_y.ceil().min(height) as u32).min(destination.height);

    let triangles = [
        [QUAD_INDICES[0], QUAD_INDICES[1], QUAD_INDICES[2]],
        [QUAD_INDICES[3], QUAD_INDICES[4], QUAD_INDICES[5]],
    ];

    for py in start_y..end_y {
        for px in start_x..end_x {
            let point = [px as f32 + 0.5, py as f32 + 0.5];
            let uv = triangles.iter().find_map(|triangle| {
                let [a, b, c] = triangle.map(|index| index as usize);
                barycentric(point, corners[a], corners[b], corners[c]).map(|[wa, wb, wc]| {
                    let (ua, ub, uc) = (vertices[a].uv, vertices[b].uv, vertices[c].uv);
                    [
                        wa * ua[0] + wb * ub[0] + wc * uc[0],
                        wa * ua[1] + wb * ub[1] + wc * uc[1],
                    ]
                })
            });
            let Some(uv) = uv else {
                continue;
            };

            let texel = source.sample_nearest(uv);
            let color = match program {
                ShaderSource::Passthrough => texel,
                ShaderSource::Filter(effect) => effect.apply(texel, draw.intensity).unwrap_or(texel),
            };

            let index = py as usize * destination.width as usize + px as usize;
            destination.pixels[index] = blend(color, destination.pixels[index], blend_mode);
        }
    }
}

/// Barycentric weights of `p` in triangle `abc`, or `None` when `p` lies outside.
fn barycentric(p: [f32; 2], a: [f32; 2], b: [f32; 2], c: [f32; 2]) -> Option<[f32; 3]> {
    let edge = |from: [f32; 2], to: [f32; 2], point: [f32; 2]| {
        (to[0] - from[0]) * (point[1] - from[1]) - (to[1] - from[1]) * (point[0] - from[0])
    };

    let area = edge(a, b, c);
    if area.abs() < f32::EPSILON {
        return None;
    }

    let wa = edge(b, c, p) / area;
    let wb = edge(c, a, p) / area;
    let wc = edge(a, b, p) / area;
    (wa >= 0.0 && wb >= 0.0 && wc >= 0.0).then_some([wa, wb, wc])
}

fn blend(source: [f32; 4], destination: [f32; 4], mode: BlendMode) -> [f32; 4] {
    match mode {
        BlendMode::Replace => source,
        BlendMode::SourceOver => {
            let alpha = source[3];
            [
                source[0] * alpha + destination[0] * (1.0 - alpha),
                source[1] * alpha + destination[1] * (1.0 - alpha),
                source[2] * alpha + destination[2] * (1.0 - alpha),
                alpha + destination[3] * (1.0 - alpha),
            ]
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gpu::IDENTITY_MVP;

    fn passthrough(gpu: &mut SoftwareBackend) -> ProgramId {
        gpu.create_program(&ProgramDescriptor {
            label: "passthrough",
            source: &ShaderSource::Passthrough,
        })
        .unwrap()
    }

    #[test]
    fn full_screen_draw_keeps_image_orientation() {
        let mut gpu = SoftwareBackend::new((2, 2));
        let program = passthrough(&mut gpu);
        #[rustfmt::skip]
        let image = Image::from_rgba8(2, 2, vec![
            255, 0, 0, 255,   0, 255, 0, 255,
            0, 0, 255, 255,   255, 255, 255, 255,
        ])
        .unwrap();
        let texture = gpu.create_texture(&image).unwrap();

        gpu.begin_frame().unwrap();
        gpu.draw_quad(&QuadDraw::full_screen(program, texture));

        assert_eq!(gpu.screen_pixel(0, 0), Some([255, 0, 0, 255]));
        assert_eq!(gpu.screen_pixel(1, 0), Some([0, 255, 0, 255]));
        assert_eq!(gpu.screen_pixel(0, 1), Some([0, 0, 255, 255]));
        assert_eq!(gpu.screen_pixel(1, 1), Some([255, 255, 255, 255]));
    }

    #[test]
    fn source_over_blends_translucent_texels() {
        let mut gpu = SoftwareBackend::new((1, 1));
        let program = passthrough(&mut gpu);
        let texture = gpu
            .create_texture(&Image::filled(1, 1, Color::rgba(255, 255, 255, 128)).unwrap())
            .unwrap();

        gpu.clear(Color::BLACK);
        gpu.draw_quad(&QuadDraw::full_screen(program, texture));

        let [r, g, b, a] = gpu.screen_pixel(0, 0).unwrap();
        assert_eq!((r, g, b, a), (128, 128, 128, 255));
    }

    #[test]
    fn deleting_a_target_frees_its_texture() {
        let mut gpu = SoftwareBackend::new((4, 4));
        let (target, _texture) = gpu.create_target((4, 4)).unwrap();
        assert_eq!((gpu.live_targets(), gpu.live_textures()), (1, 1));

        gpu.delete_target(target);
        assert_eq!((gpu.live_targets(), gpu.live_textures()), (0, 0));
    }

    #[test]
    fn zero_sized_target_is_incomplete() {
        let mut gpu = SoftwareBackend::new((4, 4));
        let error = gpu.create_target((0, 4)).unwrap_err();
        assert!(matches!(error, GpuError::IncompleteTarget { width: 0, .. }));
    }

    #[test]
    fn injected_allocation_failure_rejects_targets() {
        let mut gpu = SoftwareBackend::new((4, 4));
        gpu.set_target_allocation_failure(true);
        assert!(gpu.create_target((4, 4)).is_err());
        assert_eq!(gpu.live_targets(), 0);
    }

    #[test]
    fn sampling_the_bound_target_is_refused() {
        let mut gpu = SoftwareBackend::new((2, 2));
        let program = passthrough(&mut gpu);
        let (target, texture) = gpu.create_target((2, 2)).unwrap();

        gpu.bind_target(Target::Offscreen(target));
        gpu.clear(Color::WHITE);
        gpu.draw_quad(&QuadDraw {
            program,
            texture,
            mvp: IDENTITY_MVP,
            intensity: 0.0,
            quad: Quad::FullScreen,
        });

        let pixels = gpu.read_pixels(Target::Offscreen(target)).unwrap();
        assert!(pixels.iter().all(|&channel| channel == 255));
    }

    #[test]
    fn custom_filters_are_unsupported() {
        let mut gpu = SoftwareBackend::new((2, 2));
        let source = ShaderSource::Filter(FilterEffect::custom("@fragment fn fs_main() {}"));
        let result = gpu.create_program(&ProgramDescriptor {
            label: "tint",
            source: &source,
        });
        assert!(matches!(result, Err(GpuError::Unsupported(_))));
        assert_eq!(gpu.live_programs(), 0);
    }

    #[test]
    fn begin_frame_resets_the_command_trace() {
        let mut gpu = SoftwareBackend::new((2, 2));
        gpu.clear(Color::BLACK);
        assert_eq!(gpu.commands().len(), 1);

        gpu.begin_frame().unwrap();
        assert!(gpu.commands().is_empty());
    }

    #[test]
    fn filter_program_applies_its_effect() {
        let mut gpu = SoftwareBackend::new((1, 1));
        let program = gpu
            .create_program(&ProgramDescriptor {
                label: "invert",
                source: &ShaderSource::Filter(FilterEffect::Invert),
            })
            .unwrap();
        let texture = gpu
            .create_texture(&Image::filled(1, 1, Color::rgb(255, 0, 0)).unwrap())
            .unwrap();

        gpu.draw_quad(&QuadDraw::full_screen(program, texture).with_intensity(1.0));
        assert_eq!(gpu.screen_pixel(0, 0), Some([0, 255, 255, 255]));
    }
}
