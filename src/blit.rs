use tracing::error;

use crate::gpu::{GpuBackend, ProgramDescriptor, QuadDraw, ShaderSource};
use crate::id::{ProgramId, TextureId};

/// Full-viewport pass-through draw of one texture into the bound target.
///
/// The program is built on first use and kept until [`Blitter::release`].
#[derive(Debug, Default)]
pub(crate) struct Blitter {
    program: Option<ProgramId>,
}

impl Blitter {
    /// Draws `texture` over the bound target. Returns `false` if no program is available.
    pub(crate) fn blit(&mut self, gpu: &mut dyn GpuBackend, texture: TextureId) -> bool {
        let Some(program) = self.program(gpu) else {
            return false;
        };
        gpu.draw_quad(&QuadDraw::full_screen(program, texture));
        true
    }

    fn program(&mut self, gpu: &mut dyn GpuBackend) -> Option<ProgramId> {
        if self.program.is_none() {
            let descriptor = ProgramDescriptor {
                label: "blit",
                source: &ShaderSource::Passthrough,
            };
            match gpu.create_program(&descriptor) {
                Ok(program) => self.program = Some(program),
                Err(err) => error!(error = %err, "blit program failed to build"),
            }
        }
        self.program
    }

    pub(crate) fn release(&mut self, gpu: &mut dyn GpuBackend) {
        if let Some(program) = self.program.take() {
            gpu.delete_program(program);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::color::Color;
    use crate::gpu::software::SoftwareBackend;
    use crate::image_data::Image;

    #[test]
    fn program_is_built_once_and_reused() {
        let mut gpu = SoftwareBackend::new((2, 2));
        let texture = gpu
            .create_texture(&Image::filled(2, 2, Color::WHITE).unwrap())
            .unwrap();
        let mut blitter = Blitter::default();

        assert!(blitter.blit(&mut gpu, texture));
        assert!(blitter.blit(&mut gpu, texture));

        assert_eq!(gpu.live_programs(), 1);
        assert_eq!(gpu.screen_pixel(1, 1), Some([255, 255, 255, 255]));
    }

    #[test]
    fn release_deletes_the_program() {
        let mut gpu = SoftwareBackend::new((2, 2));
        let texture = gpu
            .create_texture(&Image::filled(2, 2, Color::WHITE).unwrap())
            .unwrap();
        let mut blitter = Blitter::default();
        blitter.blit(&mut gpu, texture);

        blitter.release(&mut gpu);
        assert_eq!(gpu.live_programs(), 0);
    }
}
