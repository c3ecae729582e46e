use tracing::{debug, error};

use crate::gpu::{GpuBackend, Target};
use crate::id::{TargetId, TextureId};

/// A live off-screen target and its backing texture.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RenderTarget {
    pub target: TargetId,
    pub texture: TextureId,
    pub size: (u32, u32),
}

impl RenderTarget {
    pub fn as_target(&self) -> Target {
        Target::Offscreen(self.target)
    }
}

/// Owner of at most one off-screen target, sized to the viewport.
///
/// Resizing always tears the old pair down before allocating the new one; targets are
/// never resized in place.
#[derive(Debug)]
pub(crate) struct IntermediateTarget {
    label: &'static str,
    current: Option<RenderTarget>,
}

impl IntermediateTarget {
    pub(crate) fn new(label: &'static str) -> Self {
        Self {
            label,
            current: None,
        }
    }

    pub(crate) fn get(&self) -> Option<RenderTarget> {
        self.current
    }

    /// Replaces the current pair with one sized `size`. A zero size only releases.
    ///
    /// Allocation failures are logged and leave the owner without a target.
    pub(crate) fn recreate(&mut self, gpu: &mut dyn GpuBackend, size: (u32, u32)) {
        self.release(gpu);

        if size.0 == 0 || size.1 == 0 {
            return;
        }

        match gpu.create_target(size) {
            Ok((target, texture)) => {
                debug!(label = self.label, %target, ?size, "allocated intermediate target");
                self.current = Some(RenderTarget {
                    target,
                    texture,
                    size,
                });
            }
            Err(err) => {
                error!(label = self.label, ?size, error = %err, "intermediate target is unusable");
            }
        }
    }

    pub(crate) fn release(&mut self, gpu: &mut dyn GpuBackend) {
        if let Some(current) = self.current.take() {
            gpu.delete_target(current.target);
        }
    }
}
