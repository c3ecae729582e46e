//! The ordered hand-off from other threads to the render thread.
//!
//! Messages are consumed in submission order by [`Compositor::process_pending`], so a
//! mutation sent before a redraw request is visible in that redraw.

use std::fmt;
use std::sync::mpsc::{self, Receiver, Sender, TryRecvError};
use std::sync::{Arc, Mutex};

use tracing::debug;

use crate::compositor::Compositor;
use crate::filter::FilterEffect;
use crate::gpu::GpuBackend;
use crate::id::{LayerId, LayerIdAllocator};
use crate::image_data::Image;
use crate::layer::Layer;

/// Work executed on the render thread with exclusive access to the compositor.
pub type RenderTask<B> = Box<dyn FnOnce(&mut Compositor<B>) + Send>;

pub(crate) enum RenderMessage<B: GpuBackend> {
    Task(RenderTask<B>),
    Redraw,
}

type WakeCallback = Arc<dyn Fn() + Send + Sync>;

/// Callback that tells the host a message is waiting, e.g. by waking its event loop.
#[derive(Clone, Default)]
pub(crate) struct Waker {
    callback: Arc<Mutex<Option<WakeCallback>>>,
}

impl Waker {
    pub(crate) fn set(&self, callback: Option<WakeCallback>) {
        if let Ok(mut slot) = self.callback.lock() {
            *slot = callback;
        }
    }

    pub(crate) fn wake(&self) {
        let callback = self.callback.lock().ok().and_then(|slot| slot.clone());
        if let Some(callback) = callback {
            callback();
        }
    }
}

pub(crate) struct RenderQueue<B: GpuBackend> {
    sender: Sender<RenderMessage<B>>,
    receiver: Receiver<RenderMessage<B>>,
    waker: Waker,
}

impl<B: GpuBackend> RenderQueue<B> {
    pub(crate) fn new() -> Self {
        let (sender, receiver) = mpsc::channel();
        Self {
            sender,
            receiver,
            waker: Waker::default(),
        }
    }

    pub(crate) fn push(&self, message: RenderMessage<B>) {
        // The receiver lives next to this sender, so sending cannot fail.
        let _ = self.sender.send(message);
        self.waker.wake();
    }

    pub(crate) fn try_next(&self) -> Option<RenderMessage<B>> {
        match self.receiver.try_recv() {
            Ok(message) => Some(message),
            Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => None,
        }
    }

    pub(crate) fn waker(&self) -> &Waker {
        &self.waker
    }

    pub(crate) fn sender(&self) -> Sender<RenderMessage<B>> {
        self.sender.clone()
    }
}

/// A cloneable, `Send` handle for mutating a [`Compositor`] from any thread.
///
/// Every call enqueues a message for the render thread and returns immediately.
/// Methods return `false` once the compositor has been dropped.
pub struct CompositorHandle<B: GpuBackend> {
    sender: Sender<RenderMessage<B>>,
    ids: LayerIdAllocator,
    waker: Waker,
}

impl<B: GpuBackend> Clone for CompositorHandle<B> {
    fn clone(&self) -> Self {
        Self {
            sender: self.sender.clone(),
            ids: self.ids.clone(),
            waker: self.waker.clone(),
        }
    }
}

impl<B: GpuBackend> fmt::Debug for CompositorHandle<B> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CompositorHandle").finish_non_exhaustive()
    }
}

impl<B: GpuBackend + 'static> CompositorHandle<B> {
    pub(crate) fn new(queue: &RenderQueue<B>, ids: LayerIdAllocator) -> Self {
        Self {
            sender: queue.sender(),
            ids,
            waker: queue.waker().clone(),
        }
    }

    /// Queues `task` to run on the render thread before the next frame.
    pub fn run_on_render_thread(
        &self,
        task: impl FnOnce(&mut Compositor<B>) + Send + 'static,
    ) -> bool {
        self.send(RenderMessage::Task(Box::new(task)))
    }

    /// Asks the render thread to draw a frame once earlier messages are applied.
    pub fn request_redraw(&self) -> bool {
        self.send(RenderMessage::Redraw)
    }

    /// Reserves an id for `layer` and queues its insertion.
    pub fn add_layer(&self, layer: Layer) -> LayerId {
        let id = self.ids.next();
        self.run_on_render_thread(move |compositor| compositor.insert_layer(id, layer));
        id
    }

    pub fn remove_layer(&self, id: LayerId) -> bool {
        self.run_on_render_thread(move |compositor| {
            compositor.remove_layer(id);
        })
    }

    pub fn move_layer_up(&self, id: LayerId) -> bool {
        self.run_on_render_thread(move |compositor| {
            compositor.move_layer_up(id);
        })
    }

    pub fn move_layer_down(&self, id: LayerId) -> bool {
        self.run_on_render_thread(move |compositor| {
            compositor.move_layer_down(id);
        })
    }

    pub fn clear(&self) -> bool {
        self.run_on_render_thread(|compositor| compositor.clear())
    }

    pub fn set_z_order(&self, id: LayerId, z_order: i32) -> bool {
        self.run_on_render_thread(move |compositor| compositor.set_z_order(id, z_order))
    }

    pub fn set_image(&self, id: LayerId, image: Image) -> bool {
        self.run_on_render_thread(move |compositor| compositor.set_image(id, image))
    }

    pub fn set_position(&self, id: LayerId, x: f32, y: f32) -> bool {
        self.run_on_render_thread(move |compositor| compositor.set_position(id, x, y))
    }

    pub fn set_scale(&self, id: LayerId, scale: f32) -> bool {
        self.run_on_render_thread(move |compositor| compositor.set_scale(id, scale))
    }

    pub fn set_rotation(&self, id: LayerId, degrees: f32) -> bool {
        self.run_on_render_thread(move |compositor| compositor.set_rotation(id, degrees))
    }

    pub fn set_intensity(&self, id: LayerId, intensity: f32) -> bool {
        self.run_on_render_thread(move |compositor| compositor.set_intensity(id, intensity))
    }

    pub fn set_filter_enabled(&self, id: LayerId, enabled: bool) -> bool {
        self.run_on_render_thread(move |compositor| compositor.set_filter_enabled(id, enabled))
    }

    pub fn set_effect(&self, id: LayerId, effect: FilterEffect) -> bool {
        self.run_on_render_thread(move |compositor| compositor.set_effect(id, effect))
    }

    fn send(&self, message: RenderMessage<B>) -> bool {
        if self.sender.send(message).is_err() {
            debug!("compositor is gone, message dropped");
            return false;
        }
        self.waker.wake();
        true
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;
    use crate::gpu::software::SoftwareBackend;

    #[test]
    fn messages_come_out_in_submission_order() {
        let queue = RenderQueue::<SoftwareBackend>::new();
        queue.push(RenderMessage::Task(Box::new(|_| {})));
        queue.push(RenderMessage::Redraw);

        assert!(matches!(queue.try_next(), Some(RenderMessage::Task(_))));
        assert!(matches!(queue.try_next(), Some(RenderMessage::Redraw)));
        assert!(queue.try_next().is_none());
    }

    #[test]
    fn every_push_wakes_the_host() {
        let queue = RenderQueue::<SoftwareBackend>::new();
        let wakes = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&wakes);
        let callback: WakeCallback = Arc::new(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        queue.waker().set(Some(callback));

        let handle = CompositorHandle::new(&queue, LayerIdAllocator::default());
        assert!(handle.request_redraw());
        queue.push(RenderMessage::Redraw);

        assert_eq!(wakes.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn waking_without_a_callback_is_harmless() {
        let waker = Waker::default();
        waker.wake();
        waker.set(None);
        waker.wake();
    }
}
