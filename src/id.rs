use std::fmt;
use std::hash::Hash;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Stable handle of a layer inside a [`Compositor`](crate::Compositor).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct LayerId(pub u64);

/// Handle of a texture owned by a [`GpuBackend`](crate::GpuBackend).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TextureId(pub u64);

/// Handle of a compiled shader program owned by a [`GpuBackend`](crate::GpuBackend).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ProgramId(pub u64);

/// Handle of an off-screen render target (framebuffer object) owned by a
/// [`GpuBackend`](crate::GpuBackend).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TargetId(pub u64);

impl fmt::Display for LayerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "layer#{}", self.0)
    }
}

impl fmt::Display for TextureId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "texture#{}", self.0)
    }
}

impl fmt::Display for ProgramId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "program#{}", self.0)
    }
}

impl fmt::Display for TargetId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "target#{}", self.0)
    }
}

/// Hands out layer ids. Shared between the compositor and its handles so ids can be
/// reserved on any thread before the layer reaches the render thread.
#[derive(Debug, Clone, Default)]
pub(crate) struct LayerIdAllocator {
    next: Arc<AtomicU64>,
}

impl LayerIdAllocator {
    pub(crate) fn next(&self) -> LayerId {
        LayerId(self.next.fetch_add(1, Ordering::Relaxed) + 1)
    }
}
