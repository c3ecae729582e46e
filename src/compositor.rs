use ahash::{HashMap, HashMapExt};
use smallvec::SmallVec;
use tracing::{debug, trace, trace_span, warn};

use crate::blit::Blitter;
use crate::color::Color;
use crate::config::CompositorConfig;
use crate::filter::FilterEffect;
use crate::gpu::{GpuBackend, Target};
use crate::id::{LayerId, LayerIdAllocator};
use crate::image_data::Image;
use crate::layer::{FilterState, Layer};
use crate::render_queue::{CompositorHandle, RenderMessage, RenderQueue};
use crate::target::{IntermediateTarget, RenderTarget};

#[derive(Debug)]
struct LayerRecord {
    layer: Layer,
    /// Insertion sequence, the tie-break between equal Z-orders.
    sequence: u64,
}

/// Owns the layer stack and renders it, chaining filter outputs through off-screen
/// targets.
///
/// Every method must be called on the thread that owns the GPU backend. Other threads go
/// through a [`CompositorHandle`].
///
/// # Examples
///
/// ```
/// use strata::gpu::software::SoftwareBackend;
/// use strata::{Color, Compositor, CompositorConfig, FilterEffect, Image, Layer};
///
/// let mut compositor = Compositor::new(SoftwareBackend::new((8, 8)), CompositorConfig::default());
/// compositor.on_surface_created();
/// compositor.on_surface_changed(8, 8);
///
/// let red = Image::filled(8, 8, Color::rgb(255, 0, 0)).unwrap();
/// compositor.add_layer(Layer::content().with_image(red));
/// compositor.add_layer(Layer::filter(FilterEffect::Invert).with_z_order(1));
///
/// assert!(compositor.pump());
/// assert_eq!(compositor.backend().screen_pixel(4, 4), Some([0, 255, 255, 255]));
/// ```
pub struct Compositor<B: GpuBackend> {
    gpu: B,
    config: CompositorConfig,
    layers: HashMap<LayerId, LayerRecord>,
    next_sequence: u64,
    ids: LayerIdAllocator,
    shared_target: IntermediateTarget,
    blitter: Option<Blitter>,
    surface_created: bool,
    viewport: (u32, u32),
    queue: RenderQueue<B>,
    redraw_requested: bool,
}

impl<B: GpuBackend + 'static> Compositor<B> {
    pub fn new(gpu: B, config: CompositorConfig) -> Self {
        Self {
            gpu,
            config,
            layers: HashMap::new(),
            next_sequence: 0,
            ids: LayerIdAllocator::default(),
            shared_target: IntermediateTarget::new("shared"),
            blitter: None,
            surface_created: false,
            viewport: (0, 0),
            queue: RenderQueue::new(),
            redraw_requested: false,
        }
    }

    /// A handle for queueing work from other threads.
    pub fn handle(&self) -> CompositorHandle<B> {
        CompositorHandle::new(&self.queue, self.ids.clone())
    }

    /// Installs the callback invoked whenever a message is queued for the render thread.
    pub fn set_wake_callback(&mut self, callback: impl Fn() + Send + Sync + 'static) {
        self.queue.waker().set(Some(std::sync::Arc::new(callback)));
    }

    pub fn backend(&self) -> &B {
        &self.gpu
    }

    pub fn backend_mut(&mut self) -> &mut B {
        &mut self.gpu
    }

    pub fn config(&self) -> &CompositorConfig {
        &self.config
    }

    pub fn viewport(&self) -> (u32, u32) {
        self.viewport
    }

    pub fn len(&self) -> usize {
        self.layers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.layers.is_empty()
    }

    pub fn contains(&self, id: LayerId) -> bool {
        self.layers.contains_key(&id)
    }

    pub fn layer(&self, id: LayerId) -> Option<&Layer> {
        self.layers.get(&id).map(|record| &record.layer)
    }

    /// The shared intermediate target, while one is allocated.
    pub fn shared_target(&self) -> Option<RenderTarget> {
        self.shared_target.get()
    }

    /// Runs `f` with the layer and the backend. `None` if the id is unknown.
    pub fn with_layer<R>(
        &mut self,
        id: LayerId,
        f: impl FnOnce(&mut Layer, &mut dyn GpuBackend) -> R,
    ) -> Option<R> {
        let record = self.layers.get_mut(&id)?;
        Some(f(&mut record.layer, &mut self.gpu))
    }

    /// Layer ids sorted by Z-order, ties in insertion order.
    pub fn render_order(&self) -> Vec<LayerId> {
        let mut order: Vec<(i32, u64, LayerId)> = self
            .layers
            .iter()
            .map(|(id, record)| (record.layer.z_order(), record.sequence, *id))
            .collect();
        order.sort_unstable_by_key(|&(z_order, sequence, _)| (z_order, sequence));
        order.into_iter().map(|(_, _, id)| id).collect()
    }

    /// Appends `layer` to the stack.
    ///
    /// Once the surface exists, the layer's own initialisation and a redraw are queued on
    /// the render queue; existing layers are not touched. The queued step builds programs
    /// right away but only sizes the layer when the viewport is non-zero, so a layer added
    /// between surface creation and the first resize is sized by `on_surface_changed`.
    pub fn add_layer(&mut self, layer: Layer) -> LayerId {
        let id = self.ids.next();
        self.insert_layer(id, layer);
        id
    }

    pub(crate) fn insert_layer(&mut self, id: LayerId, layer: Layer) {
        let sequence = self.next_sequence;
        self.next_sequence += 1;
        debug!(layer = %id, z_order = layer.z_order(), filter = layer.is_filter(), "layer added");
        self.layers.insert(id, LayerRecord { layer, sequence });

        if self.surface_created {
            self.queue
                .push(RenderMessage::Task(Box::new(move |compositor: &mut Compositor<B>| {
                    compositor.initialize_layer(id)
                })));
            self.queue.push(RenderMessage::Redraw);
        }
    }

    fn initialize_layer(&mut self, id: LayerId) {
        let viewport = self.viewport;
        let Some(record) = self.layers.get_mut(&id) else {
            debug!(layer = %id, "layer removed before initialisation");
            return;
        };
        record.layer.on_surface_created(&mut self.gpu);
        if viewport.0 > 0 && viewport.1 > 0 {
            record.layer.on_surface_changed(&mut self.gpu, viewport);
        }
    }

    /// Removes the layer and releases its GPU resources before returning.
    pub fn remove_layer(&mut self, id: LayerId) -> bool {
        match self.layers.remove(&id) {
            Some(mut record) => {
                record.layer.release(&mut self.gpu);
                debug!(layer = %id, "layer removed");
                self.request_redraw();
                true
            }
            None => {
                warn!(layer = %id, "remove of unknown layer ignored");
                false
            }
        }
    }

    /// Releases every layer and empties the stack.
    pub fn clear(&mut self) {
        for (_, mut record) in self.layers.drain() {
            record.layer.release(&mut self.gpu);
        }
        self.request_redraw();
    }

    /// Swaps Z-order with the next layer in render order. `false` at the top of the stack.
    pub fn move_layer_up(&mut self, id: LayerId) -> bool {
        self.swap_with_neighbour(id, true)
    }

    /// Swaps Z-order with the previous layer in render order. `false` at the bottom.
    pub fn move_layer_down(&mut self, id: LayerId) -> bool {
        self.swap_with_neighbour(id, false)
    }

    fn swap_with_neighbour(&mut self, id: LayerId, upwards: bool) -> bool {
        let order = self.render_order();
        let Some(position) = order.iter().position(|candidate| *candidate == id) else {
            warn!(layer = %id, "move of unknown layer ignored");
            return false;
        };
        let neighbour_position = if upwards {
            position + 1
        } else {
            match position.checked_sub(1) {
                Some(previous) => previous,
                None => return false,
            }
        };
        let Some(&neighbour) = order.get(neighbour_position) else {
            return false;
        };

        let (Some(this), Some(other)) = (self.layers.get(&id), self.layers.get(&neighbour)) else {
            return false;
        };
        let (this_key, other_key) = (
            (this.layer.z_order(), this.sequence),
            (other.layer.z_order(), other.sequence),
        );

        // Swapping the whole sort key keeps the two layers adjacent, so the opposite
        // move is always an exact inverse.
        if let Some(record) = self.layers.get_mut(&id) {
            record.layer.set_z_order(other_key.0);
            record.sequence = other_key.1;
        }
        if let Some(record) = self.layers.get_mut(&neighbour) {
            record.layer.set_z_order(this_key.0);
            record.sequence = this_key.1;
        }

        trace!(layer = %id, %neighbour, upwards, "layer moved");
        self.request_redraw();
        true
    }

    pub fn set_z_order(&mut self, id: LayerId, z_order: i32) {
        let changed = self.update_layer(id, "set_z_order", |layer, _| {
            let changed = layer.z_order() != z_order;
            layer.set_z_order(z_order);
            Some(changed)
        });
        if changed {
            self.request_redraw();
        }
    }

    /// Sets the image of a content or transform layer.
    pub fn set_image(&mut self, id: LayerId, image: Image) {
        let uploaded = self.update_layer(id, "set_image", |layer, gpu| layer.set_image(gpu, image));
        if uploaded {
            self.request_redraw();
        }
    }

    pub fn set_position(&mut self, id: LayerId, x: f32, y: f32) {
        let changed = self.update_layer(id, "set_position", |layer, _| {
            layer.as_transform_mut().map(|layer| layer.set_position(x, y))
        });
        if changed {
            self.request_redraw();
        }
    }

    pub fn set_scale(&mut self, id: LayerId, scale: f32) {
        let changed = self.update_layer(id, "set_scale", |layer, _| {
            layer.as_transform_mut().map(|layer| layer.set_scale(scale))
        });
        if changed {
            self.request_redraw();
        }
    }

    pub fn set_rotation(&mut self, id: LayerId, degrees: f32) {
        let changed = self.update_layer(id, "set_rotation", |layer, _| {
            layer.as_transform_mut().map(|layer| layer.set_rotation(degrees))
        });
        if changed {
            self.request_redraw();
        }
    }

    pub fn set_intensity(&mut self, id: LayerId, intensity: f32) {
        let changed = self.update_layer(id, "set_intensity", |layer, _| {
            layer.as_filter_mut().map(|filter| filter.set_intensity(intensity))
        });
        if changed {
            self.request_redraw();
        }
    }

    pub fn set_filter_enabled(&mut self, id: LayerId, enabled: bool) {
        let changed = self.update_layer(id, "set_filter_enabled", |layer, _| {
            layer.as_filter_mut().map(|filter| filter.set_enabled(enabled))
        });
        if changed {
            self.request_redraw();
        }
    }

    /// Replaces a filter's effect. Its program is rebuilt once the surface exists.
    pub fn set_effect(&mut self, id: LayerId, effect: FilterEffect) {
        let applied = self.update_layer(id, "set_effect", |layer, gpu| {
            layer.as_filter_mut().map(|filter| {
                filter.set_effect(gpu, effect);
                true
            })
        });
        if applied {
            self.request_redraw();
        }
    }

    /// Applies `update` to a layer. `None` from `update` means the layer has the wrong kind.
    fn update_layer(
        &mut self,
        id: LayerId,
        operation: &'static str,
        update: impl FnOnce(&mut Layer, &mut dyn GpuBackend) -> Option<bool>,
    ) -> bool {
        match self.with_layer(id, update) {
            Some(Some(changed)) => changed,
            Some(None) => {
                warn!(layer = %id, operation, "operation does not apply to this layer kind");
                false
            }
            None => {
                warn!(layer = %id, operation, "operation on unknown layer ignored");
                false
            }
        }
    }

    /// Surface (re)creation: enables blending and lets every layer build its programs.
    pub fn on_surface_created(&mut self) {
        debug!(layers = self.layers.len(), "surface created");
        self.gpu.set_blend_mode(self.config.blend_mode);
        if let Some(mut blitter) = self.blitter.take() {
            blitter.release(&mut self.gpu);
        }
        for record in self.layers.values_mut() {
            record.layer.on_surface_created(&mut self.gpu);
        }
        self.surface_created = true;
    }

    /// Surface resize: notifies every layer and reallocates the shared target.
    pub fn on_surface_changed(&mut self, width: u32, height: u32) {
        let size = (width, height);
        debug!(?size, "surface changed");
        self.viewport = size;
        self.gpu.resize(size);
        for record in self.layers.values_mut() {
            record.layer.on_surface_changed(&mut self.gpu, size);
        }
        self.shared_target.recreate(&mut self.gpu, size);
        self.request_redraw();
    }

    /// Marks the compositor as needing a frame and wakes the host.
    pub fn request_redraw(&mut self) {
        self.redraw_requested = true;
        self.queue.waker().wake();
    }

    pub fn needs_redraw(&self) -> bool {
        self.redraw_requested
    }

    /// Runs every queued message in order. Returns whether a frame is wanted.
    pub fn process_pending(&mut self) -> bool {
        while let Some(message) = self.queue.try_next() {
            match message {
                RenderMessage::Task(task) => task(self),
                RenderMessage::Redraw => self.redraw_requested = true,
            }
        }
        self.redraw_requested
    }

    /// Processes pending messages and draws a frame if one was requested.
    pub fn pump(&mut self) -> bool {
        if self.process_pending() {
            self.on_draw_frame();
            true
        } else {
            false
        }
    }

    /// Renders one frame.
    pub fn on_draw_frame(&mut self) {
        let span = trace_span!("compositor_frame", layers = self.layers.len());
        let _entered = span.enter();
        self.redraw_requested = false;

        if let Err(err) = self.gpu.begin_frame() {
            warn!(error = %err, "frame skipped");
            return;
        }

        let order = self.render_order();
        let boundaries: SmallVec<[usize; 4]> = order
            .iter()
            .enumerate()
            .filter(|(_, id)| self.is_active_filter(**id))
            .map(|(position, _)| position)
            .collect();
        trace!(layers = order.len(), boundaries = ?boundaries.as_slice(), "partitioned frame");

        if boundaries.is_empty() {
            self.gpu.bind_target(Target::Screen);
            self.gpu.clear(self.config.clear_color);
            for id in &order {
                self.draw_layer(*id, Target::Screen);
            }
        } else if let Some(shared) = self.chainable_shared_target(&order, &boundaries) {
            self.draw_chained(&order, &boundaries, shared);
        } else {
            warn!(
                viewport = ?self.viewport,
                "intermediate targets unavailable, drawing without filters"
            );
            self.gpu.bind_target(Target::Screen);
            self.gpu.clear(self.config.clear_color);
            for id in &order {
                if !self.is_filter(*id) {
                    self.draw_layer(*id, Target::Screen);
                }
            }
        }

        if let Err(err) = self.gpu.end_frame() {
            warn!(error = %err, "frame could not be presented");
        }
    }

    fn draw_chained(&mut self, order: &[LayerId], boundaries: &[usize], shared: RenderTarget) {
        let shared_target = shared.as_target();
        self.gpu.bind_target(shared_target);
        self.gpu.clear(Color::TRANSPARENT);
        for id in &order[..boundaries[0]] {
            self.draw_layer(*id, shared_target);
        }

        let mut input = shared.texture;
        for (index, &position) in boundaries.iter().enumerate() {
            let filter_id = order[position];
            let next_boundary = boundaries.get(index + 1).copied();

            let Some(record) = self.layers.get_mut(&filter_id) else {
                continue;
            };
            let Some(filter) = record.layer.as_filter_mut() else {
                continue;
            };
            filter.set_input(Some(input));
            let own = filter.target().map(Target::Offscreen);
            let own_texture = filter.output_texture();

            let (destination, clear_color) = match (next_boundary, own) {
                (None, _) => (Target::Screen, self.config.clear_color),
                (Some(_), Some(own)) => (own, Color::TRANSPARENT),
                (Some(_), None) => return,
            };
            self.gpu.bind_target(destination);
            self.gpu.clear(clear_color);
            record.layer.draw(&mut self.gpu, destination);

            let Some(next) = next_boundary else {
                for id in &order[position + 1..] {
                    self.draw_layer(*id, Target::Screen);
                }
                return;
            };
            let Some(own_texture) = own_texture else {
                return;
            };

            let between = &order[position + 1..next];
            if between.is_empty() {
                input = own_texture;
                continue;
            }

            self.gpu.bind_target(shared_target);
            self.gpu.clear(Color::TRANSPARENT);
            self.blitter
                .get_or_insert_with(Blitter::default)
                .blit(&mut self.gpu, own_texture);
            for id in between {
                self.draw_layer(*id, shared_target);
            }
            input = shared.texture;
        }
    }

    /// The shared target, if it and the own target of every non-last filter exist.
    fn chainable_shared_target(&self, order: &[LayerId], boundaries: &[usize]) -> Option<RenderTarget> {
        let shared = self.shared_target.get()?;
        let (_, chained) = boundaries.split_last()?;
        let all_targets = chained.iter().all(|&position| {
            self.layers
                .get(&order[position])
                .and_then(|record| record.layer.as_filter())
                .and_then(|filter| filter.target())
                .is_some()
        });
        all_targets.then_some(shared)
    }

    fn draw_layer(&mut self, id: LayerId, destination: Target) {
        if let Some(record) = self.layers.get(&id) {
            record.layer.draw(&mut self.gpu, destination);
        }
    }

    fn is_filter(&self, id: LayerId) -> bool {
        self.layers
            .get(&id)
            .is_some_and(|record| record.layer.is_filter())
    }

    /// Filters without a program draw nothing, so they do not split the frame.
    fn is_active_filter(&self, id: LayerId) -> bool {
        self.layers
            .get(&id)
            .and_then(|record| record.layer.as_filter())
            .is_some_and(|filter| filter.state() == FilterState::ProgramReady)
    }
}

impl<B: GpuBackend> Drop for Compositor<B> {
    fn drop(&mut self) {
        for (_, mut record) in self.layers.drain() {
            record.layer.release(&mut self.gpu);
        }
        self.shared_target.release(&mut self.gpu);
        if let Some(mut blitter) = self.blitter.take() {
            blitter.release(&mut self.gpu);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gpu::software::{GpuCommand, SoftwareBackend};
    use crate::transform::Transform2D;

    const SIZE: (u32, u32) = (8, 8);

    fn compositor() -> Compositor<SoftwareBackend> {
        let mut compositor = Compositor::new(SoftwareBackend::new(SIZE), CompositorConfig::default());
        compositor.on_surface_created();
        compositor.on_surface_changed(SIZE.0, SIZE.1);
        compositor
    }

    fn solid(color: Color) -> Layer {
        Layer::content().with_image(Image::filled(SIZE.0, SIZE.1, color).unwrap())
    }

    fn binds(gpu: &SoftwareBackend) -> Vec<Target> {
        gpu.commands()
            .iter()
            .filter_map(|command| match command {
                GpuCommand::Bind(target) => Some(*target),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn render_order_is_stable_for_equal_z() {
        let mut compositor = compositor();
        let a = compositor.add_layer(Layer::content().with_z_order(1));
        let b = compositor.add_layer(Layer::content());
        let c = compositor.add_layer(Layer::content().with_z_order(1));
        let d = compositor.add_layer(Layer::content());

        assert_eq!(compositor.render_order(), vec![b, d, a, c]);

        compositor.remove_layer(d);
        assert_eq!(compositor.render_order(), vec![b, a, c]);
    }

    #[test]
    fn move_up_then_down_restores_order() {
        let mut compositor = compositor();
        let a = compositor.add_layer(Layer::content());
        let b = compositor.add_layer(Layer::content().with_z_order(5));
        let c = compositor.add_layer(Layer::content().with_z_order(5));
        let original = compositor.render_order();

        assert!(compositor.move_layer_up(a));
        assert_eq!(compositor.render_order(), vec![b, a, c]);
        assert!(compositor.move_layer_down(a));
        assert_eq!(compositor.render_order(), original);

        assert!(compositor.move_layer_up(b));
        assert_eq!(compositor.render_order(), vec![a, c, b]);
        assert!(compositor.move_layer_down(b));
        assert_eq!(compositor.render_order(), original);
    }

    #[test]
    fn move_round_trip_across_different_z_restores_order() {
        let mut compositor = compositor();
        let b = compositor.add_layer(Layer::content().with_z_order(1));
        let c = compositor.add_layer(Layer::content().with_z_order(1));
        let a = compositor.add_layer(Layer::content());
        assert_eq!(compositor.render_order(), vec![a, b, c]);

        assert!(compositor.move_layer_up(a));
        assert_eq!(compositor.render_order(), vec![b, a, c]);
        assert!(compositor.move_layer_down(a));
        assert_eq!(compositor.render_order(), vec![a, b, c]);

        assert!(compositor.move_layer_down(c));
        assert_eq!(compositor.render_order(), vec![a, c, b]);
        assert!(compositor.move_layer_up(c));
        assert_eq!(compositor.render_order(), vec![a, b, c]);
    }

    #[test]
    fn effect_swap_revives_a_filter_whose_program_failed() {
        let mut compositor = compositor();
        compositor.add_layer(solid(Color::rgb(255, 0, 0)));
        let filter = compositor.add_layer(
            Layer::filter(FilterEffect::custom("@fragment fn fs_main() {}")).with_z_order(1),
        );
        compositor.pump();
        assert_eq!(compositor.backend().screen_pixel(3, 3), Some([255, 0, 0, 255]));

        compositor.set_effect(filter, FilterEffect::Invert);
        assert!(compositor.pump());

        let state = compositor.layer(filter).and_then(Layer::as_filter).map(|f| f.state());
        assert_eq!(state, Some(FilterState::ProgramReady));
        assert_eq!(compositor.backend().screen_pixel(3, 3), Some([0, 255, 255, 255]));
    }

    #[test]
    fn moves_at_the_stack_edges_are_no_ops() {
        let mut compositor = compositor();
        let bottom = compositor.add_layer(Layer::content());
        let top = compositor.add_layer(Layer::content().with_z_order(1));

        assert!(!compositor.move_layer_down(bottom));
        assert!(!compositor.move_layer_up(top));
        assert_eq!(compositor.render_order(), vec![bottom, top]);
    }

    #[test]
    fn plain_stack_never_touches_intermediate_targets() {
        let mut compositor = compositor();
        compositor.add_layer(solid(Color::rgb(255, 0, 0)));
        compositor.add_layer(Layer::transform(Transform2D::new((4.0, 4.0), 1.0, 0.0)).with_z_order(1));
        compositor.pump();

        assert_eq!(binds(compositor.backend()), vec![Target::Screen]);
        assert!(!compositor
            .backend()
            .commands()
            .iter()
            .any(|command| matches!(command, GpuCommand::CreateTarget { .. })));
    }

    #[test]
    fn empty_stack_is_a_clear_only_frame() {
        let mut compositor = compositor();
        compositor.add_layer(solid(Color::WHITE));
        compositor.pump();
        compositor.clear();

        compositor.on_draw_frame();

        assert_eq!(
            compositor.backend().commands(),
            &[
                GpuCommand::Bind(Target::Screen),
                GpuCommand::Clear {
                    target: Target::Screen,
                    color: Color::BLACK
                }
            ]
        );
        assert_eq!(compositor.backend().screen_pixel(0, 0), Some([0, 0, 0, 255]));
    }

    #[test]
    fn single_filter_renders_through_shared_target() {
        let mut compositor = compositor();
        compositor.add_layer(solid(Color::rgb(255, 0, 0)));
        let filter = compositor.add_layer(Layer::filter(FilterEffect::Invert).with_z_order(1));
        compositor.pump();

        let shared = Target::Offscreen(compositor.shared_target().unwrap().target);
        let own = Target::Offscreen(compositor.layer(filter).unwrap().as_filter().unwrap().target().unwrap());
        assert_eq!(binds(compositor.backend()), vec![shared, Target::Screen, own, Target::Screen]);
        assert_eq!(compositor.backend().screen_pixel(3, 3), Some([0, 255, 255, 255]));
    }

    #[test]
    fn layers_added_after_surface_are_initialised_through_the_queue() {
        let mut compositor = compositor();
        let existing = compositor.add_layer(solid(Color::WHITE));
        compositor.pump();
        let programs_before = compositor.backend().live_programs();

        let added = compositor.add_layer(solid(Color::rgb(0, 0, 255)).with_z_order(1));
        assert!(!compositor.layer(added).unwrap().is_loaded());

        assert!(compositor.pump());
        assert!(compositor.layer(added).unwrap().is_loaded());
        assert!(compositor.layer(existing).unwrap().is_loaded());
        assert_eq!(compositor.backend().live_programs(), programs_before + 1);
        assert_eq!(compositor.backend().screen_pixel(0, 0), Some([0, 0, 255, 255]));
    }

    #[test]
    fn layer_added_before_the_first_resize_is_sized_by_it() {
        let mut compositor = Compositor::new(SoftwareBackend::new(SIZE), CompositorConfig::default());
        compositor.on_surface_created();
        let filter = compositor.add_layer(Layer::filter(FilterEffect::Invert));
        compositor.pump();

        let filter_layer = || compositor.layer(filter).and_then(Layer::as_filter);
        assert_eq!(filter_layer().map(|f| f.state()), Some(FilterState::ProgramReady));
        assert_eq!(filter_layer().and_then(|f| f.target()), None);

        compositor.on_surface_changed(SIZE.0, SIZE.1);
        let target = compositor
            .layer(filter)
            .and_then(Layer::as_filter)
            .and_then(|f| f.target());
        assert!(target.is_some());
    }

    #[test]
    fn remove_releases_resources_immediately() {
        let mut compositor = compositor();
        let filter = compositor.add_layer(Layer::filter(FilterEffect::Grayscale));
        compositor.pump();
        assert_eq!(compositor.backend().live_targets(), 2);

        assert!(compositor.remove_layer(filter));
        assert_eq!(compositor.backend().live_targets(), 1);
        assert_eq!(compositor.backend().live_programs(), 0);
        assert!(!compositor.remove_layer(filter));
    }

    #[test]
    fn resizing_to_the_same_size_keeps_one_shared_pair() {
        let mut compositor = compositor();
        for _ in 0..4 {
            compositor.on_surface_changed(SIZE.0, SIZE.1);
        }
        assert_eq!(compositor.backend().live_targets(), 1);
        assert_eq!(compositor.backend().live_textures(), 1);
    }

    #[test]
    fn setters_on_the_wrong_layer_kind_do_nothing() {
        let mut compositor = compositor();
        let content = compositor.add_layer(solid(Color::WHITE));
        compositor.pump();

        compositor.set_intensity(content, 0.2);
        compositor.set_position(content, 1.0, 1.0);
        compositor.set_rotation(LayerId(999), 10.0);

        assert!(!compositor.needs_redraw());
    }

    #[test]
    fn unchanged_transform_does_not_request_redraw() {
        let mut compositor = compositor();
        let sticker = compositor.add_layer(Layer::transform(Transform2D::new((1.0, 1.0), 1.0, 0.0)));
        compositor.pump();

        compositor.set_position(sticker, 1.0, 1.0);
        assert!(!compositor.needs_redraw());

        compositor.set_position(sticker, 2.0, 1.0);
        assert!(compositor.needs_redraw());
    }

    #[test]
    fn missing_shared_target_degrades_to_unfiltered_frame() {
        let mut compositor = Compositor::new(SoftwareBackend::new(SIZE), CompositorConfig::default());
        compositor.backend_mut().set_target_allocation_failure(true);
        compositor.on_surface_created();
        compositor.on_surface_changed(SIZE.0, SIZE.1);
        compositor.add_layer(solid(Color::rgb(255, 0, 0)));
        compositor.add_layer(Layer::filter(FilterEffect::Invert).with_z_order(1));

        compositor.pump();

        assert_eq!(compositor.backend().screen_pixel(0, 0), Some([255, 0, 0, 255]));
    }

    #[test]
    fn handle_messages_apply_in_order_before_redraw() {
        let mut compositor = compositor();
        let handle = compositor.handle();

        let id = handle.add_layer(solid(Color::rgb(255, 0, 0)));
        handle.set_image(id, Image::filled(SIZE.0, SIZE.1, Color::rgb(0, 255, 0)).unwrap());
        handle.request_redraw();

        assert!(compositor.pump());
        assert!(compositor.contains(id));
        assert_eq!(compositor.backend().screen_pixel(0, 0), Some([0, 255, 0, 255]));
    }

    #[test]
    fn image_for_a_removed_layer_is_dropped() {
        let mut compositor = compositor();
        let handle = compositor.handle();
        let id = handle.add_layer(solid(Color::WHITE));
        compositor.pump();

        handle.remove_layer(id);
        handle.set_image(id, Image::filled(2, 2, Color::WHITE).unwrap());
        compositor.pump();

        assert!(!compositor.contains(id));
        assert_eq!(compositor.backend().live_textures(), 1);
        assert_eq!(compositor.backend().live_programs(), 0);
    }
}
