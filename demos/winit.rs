//! Interactive layer stack in a window.
//!
//! `cargo run --example winit [path/to/image.png]`
//!
//! Keys: `S` toggles the sepia filter, `Up`/`Down` move it through the stack, `Escape`
//! quits. A background thread spins the sticker and pulses the invert filter through a
//! [`CompositorHandle`].

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use futures::executor::block_on;
use strata::gpu::wgpu_backend::WgpuBackend;
use strata::{
    Color, Compositor, CompositorConfig, CompositorHandle, FilterEffect, Image, Layer, LayerId,
    Transform2D, WgpuBackendConfig,
};
use winit::application::ApplicationHandler;
use winit::event::{ElementState, KeyEvent, WindowEvent};
use winit::event_loop::{ActiveEventLoop, EventLoop, EventLoopProxy};
use winit::keyboard::{Key, NamedKey};
use winit::window::{Window, WindowId};

#[derive(Debug, Clone, Copy)]
enum DemoEvent {
    Wake,
}

struct Scene {
    sepia: LayerId,
    sepia_enabled: bool,
}

struct App {
    proxy: EventLoopProxy<DemoEvent>,
    background: Image,
    window: Option<Arc<Window>>,
    compositor: Option<Compositor<WgpuBackend>>,
    scene: Option<Scene>,
    running: Arc<AtomicBool>,
}

impl App {
    fn new(proxy: EventLoopProxy<DemoEvent>, background: Image) -> Self {
        Self {
            proxy,
            background,
            window: None,
            compositor: None,
            scene: None,
            running: Arc::new(AtomicBool::new(true)),
        }
    }

    fn build_scene(&mut self, compositor: &mut Compositor<WgpuBackend>, size: (u32, u32)) {
        compositor.add_layer(Layer::content().with_image(self.background.clone()));
        let sepia = compositor.add_layer(Layer::filter(FilterEffect::Sepia).with_z_order(1));

        let sticker = compositor.add_layer(
            Layer::transform(Transform2D::new(
                (size.0 as f32 / 2.0, size.1 as f32 / 2.0),
                1.0,
                0.0,
            ))
            .with_image(checkerboard(128, Color::rgb(240, 200, 40), Color::rgb(40, 40, 40)))
            .with_z_order(2),
        );
        let invert = compositor.add_layer(
            Layer::filter(FilterEffect::Invert)
                .with_z_order(3)
                .with_intensity(0.0),
        );

        spawn_animator(compositor.handle(), sticker, invert, Arc::clone(&self.running));
        self.scene = Some(Scene {
            sepia,
            sepia_enabled: true,
        });
    }

    fn handle_key(&mut self, event_loop: &ActiveEventLoop, key: &Key) {
        let (Some(compositor), Some(scene)) = (&mut self.compositor, &mut self.scene) else {
            return;
        };
        match key {
            Key::Named(NamedKey::Escape) => event_loop.exit(),
            Key::Named(NamedKey::ArrowUp) => {
                compositor.move_layer_up(scene.sepia);
            }
            Key::Named(NamedKey::ArrowDown) => {
                compositor.move_layer_down(scene.sepia);
            }
            Key::Character(character) if character.as_str() == "s" => {
                scene.sepia_enabled = !scene.sepia_enabled;
                compositor.set_filter_enabled(scene.sepia, scene.sepia_enabled);
            }
            _ => {}
        }
    }
}

impl ApplicationHandler<DemoEvent> for App {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.window.is_some() {
            return;
        }
        let window = Arc::new(
            event_loop
                .create_window(Window::default_attributes().with_title("strata"))
                .unwrap(),
        );

        let window_size = window.inner_size();
        let physical_size = (window_size.width, window_size.height);

        let backend = match block_on(WgpuBackend::new(
            window.clone(),
            physical_size,
            WgpuBackendConfig::default(),
        )) {
            Ok(backend) => backend,
            Err(err) => {
                eprintln!("failed to create the GPU backend: {err}");
                event_loop.exit();
                return;
            }
        };

        let mut compositor = Compositor::new(backend, CompositorConfig::default());
        let proxy = self.proxy.clone();
        compositor.set_wake_callback(move || {
            let _ = proxy.send_event(DemoEvent::Wake);
        });
        compositor.on_surface_created();
        compositor.on_surface_changed(physical_size.0, physical_size.1);
        self.build_scene(&mut compositor, physical_size);

        self.window = Some(window);
        self.compositor = Some(compositor);
    }

    fn user_event(&mut self, _event_loop: &ActiveEventLoop, event: DemoEvent) {
        match event {
            DemoEvent::Wake => {
                if let Some(window) = &self.window {
                    window.request_redraw();
                }
            }
        }
    }

    fn window_event(
        &mut self,
        event_loop: &ActiveEventLoop,
        window_id: WindowId,
        event: WindowEvent,
    ) {
        let Some(window) = self.window.clone() else {
            return;
        };
        if window_id != window.id() {
            return;
        }

        match event {
            WindowEvent::CloseRequested => event_loop.exit(),
            WindowEvent::Resized(physical_size) => {
                if let Some(compositor) = &mut self.compositor {
                    compositor.on_surface_changed(physical_size.width, physical_size.height);
                }
            }
            WindowEvent::KeyboardInput {
                event:
                    KeyEvent {
                        logical_key,
                        state: ElementState::Pressed,
                        ..
                    },
                ..
            } => self.handle_key(event_loop, &logical_key),
            WindowEvent::RedrawRequested => {
                if let Some(compositor) = &mut self.compositor {
                    compositor.pump();
                }
            }
            _ => {}
        }
    }

    fn exiting(&mut self, _event_loop: &ActiveEventLoop) {
        self.running.store(false, Ordering::Relaxed);
    }
}

/// Spins the sticker and pulses the invert filter until `running` is cleared or the
/// compositor goes away.
fn spawn_animator(
    handle: CompositorHandle<WgpuBackend>,
    sticker: LayerId,
    invert: LayerId,
    running: Arc<AtomicBool>,
) {
    thread::spawn(move || {
        let start = Instant::now();
        while running.load(Ordering::Relaxed) {
            let elapsed = start.elapsed().as_secs_f32();
            let pulse = (elapsed.sin() * 0.5 + 0.5) * 0.6;
            let alive = handle.set_rotation(sticker, (elapsed * 45.0) % 360.0)
                && handle.set_intensity(invert, pulse);
            if !alive {
                break;
            }
            thread::sleep(Duration::from_millis(16));
        }
    });
}

fn checkerboard(size: u32, light: Color, dark: Color) -> Image {
    let mut pixels = Vec::with_capacity((size * size * 4) as usize);
    for y in 0..size {
        for x in 0..size {
            let color = if (x / 16 + y / 16) % 2 == 0 { light } else { dark };
            pixels.extend_from_slice(&color.to_array());
        }
    }
    Image::from_rgba8(size, size, pixels).unwrap()
}

fn load_background() -> Image {
    let Some(path) = std::env::args().nth(1) else {
        return checkerboard(512, Color::rgb(70, 110, 180), Color::rgb(180, 90, 60));
    };
    let decoded = image::open(&path)
        .unwrap_or_else(|err| panic!("failed to open {path}: {err}"))
        .to_rgba8();
    let (width, height) = decoded.dimensions();
    Image::from_rgba8(width, height, decoded.into_raw()).unwrap()
}

pub fn main() {
    env_logger::init();
    let event_loop = EventLoop::<DemoEvent>::with_user_event()
        .build()
        .expect("To create the event loop");

    let mut app = App::new(event_loop.create_proxy(), load_background());
    let _ = event_loop.run_app(&mut app);
}
