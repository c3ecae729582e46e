/// Compositing regression tests on the CPU reference backend.
///
/// Every scene is rendered through the full compositor and checked pixel by pixel, then
/// the command trace is inspected to confirm how the frame was partitioned.
///
/// Run with:   cargo test --test compositing_regression
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;

use strata::gpu::software::{GpuCommand, SoftwareBackend};
use strata::{Color, Compositor, FilterEffect, GpuBackend, Image, Layer, Target};
use strata_test_scenes::{
    all_scenes, assert_pixels, build_main_scene, prepared_software_compositor, PixelExpectation,
    CANVAS_HEIGHT, CANVAS_WIDTH,
};

fn render(compositor: &mut Compositor<SoftwareBackend>) -> Vec<u8> {
    assert!(compositor.pump(), "expected a frame to be drawn");
    compositor
        .backend_mut()
        .read_pixels(Target::Screen)
        .expect("software screen is readable")
}

fn screen_binds(compositor: &Compositor<SoftwareBackend>) -> usize {
    compositor
        .backend()
        .commands()
        .iter()
        .filter(|command| matches!(command, GpuCommand::Bind(Target::Screen)))
        .count()
}

#[test]
fn scenes_match_their_pixel_expectations() {
    for (name, build) in all_scenes::<SoftwareBackend>() {
        let mut compositor = prepared_software_compositor();
        let expectations = build(&mut compositor);
        let pixels = render(&mut compositor);
        eprintln!("checking scene {name}");
        assert_pixels(&pixels, CANVAS_WIDTH, CANVAS_HEIGHT, &expectations);
    }
}

#[test]
fn empty_stack_clears_to_the_configured_color() {
    let mut compositor = prepared_software_compositor();
    let pixels = render(&mut compositor);

    assert_pixels(
        &pixels,
        CANVAS_WIDTH,
        CANVAS_HEIGHT,
        &[
            PixelExpectation::opaque(0, 0, 0, 0, 0, "top_left"),
            PixelExpectation::opaque(79, 59, 0, 0, 0, "bottom_right"),
        ],
    );
    assert_eq!(screen_binds(&compositor), 1);
    assert!(compositor
        .backend()
        .commands()
        .iter()
        .all(|command| !matches!(command, GpuCommand::Draw { .. })));
}

#[test]
fn main_scene_draws_trailing_layers_straight_to_the_screen() {
    let mut compositor = prepared_software_compositor();
    build_main_scene(&mut compositor);
    render(&mut compositor);

    let commands = compositor.backend().commands();
    let last_screen_bind = commands
        .iter()
        .rposition(|command| matches!(command, GpuCommand::Bind(Target::Screen)))
        .expect("the top filter presents to the screen");
    let draws_after = commands[last_screen_bind..]
        .iter()
        .filter(|command| {
            matches!(
                command,
                GpuCommand::Draw {
                    target: Target::Screen,
                    ..
                }
            )
        })
        .count();

    // The top filter's output plus the unfiltered sticker.
    assert_eq!(draws_after, 2);
}

#[test]
fn no_draw_samples_the_target_it_renders_into() {
    let mut compositor = prepared_software_compositor();
    build_main_scene(&mut compositor);
    render(&mut compositor);

    let backend = compositor.backend();
    for command in backend.commands() {
        if let GpuCommand::Draw {
            target: Target::Offscreen(target),
            texture,
            ..
        } = command
        {
            assert_ne!(
                backend.target_texture(*target),
                Some(*texture),
                "draw into {target} sampled its own texture",
            );
        }
    }
}

#[test]
fn reordering_moves_content_out_from_under_a_filter() {
    let mut compositor = prepared_software_compositor();
    let red = Image::filled(CANVAS_WIDTH, CANVAS_HEIGHT, Color::rgb(255, 0, 0)).unwrap();
    let content = compositor.add_layer(Layer::content().with_image(red));
    compositor.add_layer(Layer::filter(FilterEffect::Invert).with_z_order(1));

    let pixels = render(&mut compositor);
    assert_pixels(
        &pixels,
        CANVAS_WIDTH,
        CANVAS_HEIGHT,
        &[PixelExpectation::opaque(40, 30, 0, 255, 255, "inverted")],
    );

    assert!(compositor.move_layer_up(content));
    let pixels = render(&mut compositor);
    assert_pixels(
        &pixels,
        CANVAS_WIDTH,
        CANVAS_HEIGHT,
        &[PixelExpectation::opaque(40, 30, 255, 0, 0, "above_filter")],
    );
}

#[test]
fn removing_every_filter_returns_to_the_direct_path() {
    let mut compositor = prepared_software_compositor();
    let red = Image::filled(CANVAS_WIDTH, CANVAS_HEIGHT, Color::rgb(255, 0, 0)).unwrap();
    compositor.add_layer(Layer::content().with_image(red));
    let filter = compositor.add_layer(Layer::filter(FilterEffect::Grayscale).with_z_order(1));
    render(&mut compositor);
    assert_eq!(screen_binds(&compositor), 2);

    assert!(compositor.remove_layer(filter));
    let pixels = render(&mut compositor);

    assert_eq!(screen_binds(&compositor), 1);
    assert!(compositor
        .backend()
        .commands()
        .iter()
        .all(|command| !matches!(command, GpuCommand::Bind(Target::Offscreen(_)))));
    assert_pixels(
        &pixels,
        CANVAS_WIDTH,
        CANVAS_HEIGHT,
        &[PixelExpectation::opaque(40, 30, 255, 0, 0, "unfiltered")],
    );
}

#[test]
fn resizing_keeps_one_target_per_owner() {
    let mut compositor = prepared_software_compositor();
    build_main_scene(&mut compositor);
    render(&mut compositor);
    // Shared target plus one per filter.
    assert_eq!(compositor.backend().live_targets(), 3);

    for step in 1..=4 {
        compositor.on_surface_changed(CANVAS_WIDTH + step * 10, CANVAS_HEIGHT + step * 5);
        render(&mut compositor);
        assert_eq!(compositor.backend().live_targets(), 3);
    }
}

#[test]
fn clearing_releases_every_layer_resource() {
    let mut compositor = prepared_software_compositor();
    build_main_scene(&mut compositor);
    render(&mut compositor);

    compositor.clear();
    render(&mut compositor);

    let backend = compositor.backend();
    assert_eq!(backend.live_targets(), 1);
    // The compositor keeps its blit program.
    assert_eq!(backend.live_programs(), 1);
    // Only the shared target's backing texture is left.
    assert_eq!(backend.live_textures(), 1);
}

#[test]
fn handles_queue_work_from_other_threads() {
    let mut compositor = prepared_software_compositor();
    let wakes = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&wakes);
    compositor.set_wake_callback(move || {
        counter.fetch_add(1, Ordering::SeqCst);
    });

    let handle = compositor.handle();
    let worker = thread::spawn(move || {
        let red = Image::filled(CANVAS_WIDTH, CANVAS_HEIGHT, Color::rgb(255, 0, 0)).unwrap();
        let content = handle.add_layer(Layer::content());
        let filter = handle.add_layer(Layer::filter(FilterEffect::Invert).with_z_order(1));
        assert!(handle.set_image(content, red));
        assert!(handle.set_intensity(filter, 0.0));
        assert!(handle.set_intensity(filter, 1.0));
        (content, filter)
    });
    let (content, filter) = worker.join().expect("worker thread panicked");

    assert!(wakes.load(Ordering::SeqCst) > 0);
    assert!(compositor.is_empty());

    let pixels = render(&mut compositor);

    assert!(compositor.contains(content));
    assert!(compositor.contains(filter));
    assert_eq!(compositor.render_order(), vec![content, filter]);
    assert_pixels(
        &pixels,
        CANVAS_WIDTH,
        CANVAS_HEIGHT,
        &[PixelExpectation::opaque(40, 30, 0, 255, 255, "inverted_red")],
    );
}

#[test]
fn handles_outliving_the_compositor_report_failure() {
    let compositor = prepared_software_compositor();
    let handle = compositor.handle();
    drop(compositor);

    assert!(!handle.request_redraw());
}
