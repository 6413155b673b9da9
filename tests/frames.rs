mod common;

use common::{orchestrator, small_state};
use oitlab::rendering::RenderError;
use oitlab::rendering::orchestrator::{FrameReport, MAIN_CLEAR_VALUES};
use oitlab::rendering::state::{Algorithm, AntialiasingMode, State};
use oitlab_gpu::ObjectKind;
use oitlab_gpu::command::{Command, CommandList};
use oitlab_gpu::headless::HeadlessDevice;
use oitlab_gpu::types::Extent2D;

fn draws(list: &CommandList) -> Vec<(u32, u32)> {
    list.commands()
        .iter()
        .filter_map(|command| match command {
            Command::DrawIndexed {
                index_count,
                first_index,
                ..
            } => Some((*first_index, *index_count)),
            _ => None,
        })
        .collect()
}

fn fullscreen_draws(list: &CommandList) -> usize {
    list.commands()
        .iter()
        .filter(|command| matches!(command, Command::Draw { vertex_count: 3, .. }))
        .count()
}

fn last_frame(device: &HeadlessDevice) -> &CommandList {
    device.submitted().last().unwrap()
}

#[test_log::test]
fn every_algorithm_renders_in_every_antialiasing_mode() {
    let mut device = HeadlessDevice::default();
    let (mut orchestrator, _) = orchestrator(small_state());

    for algorithm in Algorithm::ALL {
        for aa_type in AntialiasingMode::ALL {
            let mut state = small_state();
            state.algorithm = algorithm;
            state.aa_type = aa_type;
            state.tail_blend = aa_type.id() % 2 == 0;
            orchestrator.request(state);

            for _ in 0..2 {
                let report = orchestrator.render_frame(&mut device).unwrap();
                assert_eq!(report.algorithm, algorithm);
                assert!(!report.reverted);
            }
        }
    }

    assert_eq!(orchestrator.frames_rendered(), 7 * 6 * 2);
    orchestrator.destroy(&mut device).unwrap();
    assert_eq!(device.live_count(), 0);
    assert_eq!(device.created_count(ObjectKind::Fence), 2);
}

#[test]
fn transparent_objects_come_first() {
    let mut device = HeadlessDevice::default();
    let mut state = small_state();
    state.num_objects = 10;
    state.percent_transparent = 50;
    let (mut orchestrator, _) = orchestrator(state);

    let report = orchestrator.render_frame(&mut device).unwrap();
    assert_eq!((report.num_transparent, report.num_opaque), (5, 5));

    let ipo = orchestrator.reconciler().resources().scene.as_ref().unwrap().indices_per_object;
    // opaque first, then the spinlock color pass over the transparent prefix
    assert_eq!(draws(last_frame(&device)), [(5 * ipo, 5 * ipo), (0, 5 * ipo)]);
    assert_eq!(fullscreen_draws(last_frame(&device)), 1);
}

#[test]
fn empty_partitions_skip_their_draws() {
    let mut device = HeadlessDevice::default();
    let mut state = small_state();
    state.percent_transparent = 0;
    let (mut orchestrator, _) = orchestrator(state.clone());

    let report = orchestrator.render_frame(&mut device).unwrap();
    assert_eq!(report.num_transparent, 0);
    assert_eq!(draws(last_frame(&device)).len(), 1);
    // the composite still resolves the (empty) storage
    assert_eq!(fullscreen_draws(last_frame(&device)), 1);

    state.percent_transparent = 100;
    orchestrator.request(state);
    orchestrator.render_frame(&mut device).unwrap();
    let frame = last_frame(&device);
    let ipo = orchestrator.reconciler().resources().scene.as_ref().unwrap().indices_per_object;
    assert_eq!(draws(frame), [(0, 16 * ipo)]);
    assert!(
        !frame
            .commands()
            .iter()
            .any(|command| matches!(command, Command::BindPipeline(pipeline)
                if *pipeline == orchestrator.reconciler().resources().pipelines.as_ref().unwrap().opaque))
    );
}

#[test]
fn frame_slots_rotate() {
    let mut device = HeadlessDevice::default();
    let (mut orchestrator, _) = orchestrator(small_state());

    let slots = (0..5)
        .map(|_| orchestrator.render_frame(&mut device).unwrap().slot)
        .collect::<Vec<_>>();
    assert_eq!(slots, [0, 1, 0, 1, 0]);
    assert!(device.in_flight_count() <= 2);

    let uniforms = orchestrator.reconciler().resources().uniforms.as_ref().unwrap();
    for slot in 0..2 {
        let buffer = uniforms.handle(slot).unwrap();
        let written = device.uniform_contents(buffer).unwrap();
        assert_eq!(written.len() as u64, device.buffer_desc(buffer).unwrap().size);
        assert!(written.len() as u64 >= uniforms.size());
    }
}

#[test]
fn main_pass_clears_to_grey() {
    let mut device = HeadlessDevice::default();
    let (mut orchestrator, _) = orchestrator(small_state());
    orchestrator.render_frame(&mut device).unwrap();

    let begin = last_frame(&device)
        .commands()
        .iter()
        .find_map(|command| match command {
            Command::BeginRenderPass { clear_values, .. } => Some(clear_values.clone()),
            _ => None,
        })
        .unwrap();
    assert_eq!(begin, MAIN_CLEAR_VALUES);
}

fn frame_with(aa_type: AntialiasingMode) -> (HeadlessDevice, Vec<Command>, FrameReport) {
    let mut device = HeadlessDevice::default();
    let mut state = small_state();
    state.aa_type = aa_type;
    let (mut orchestrator, _) = orchestrator(state);
    let report = orchestrator.render_frame(&mut device).unwrap();
    let commands = last_frame(&device).commands().to_vec();
    (device, commands, report)
}

#[test]
fn multisampling_resolves() {
    let (device, commands, report) = frame_with(AntialiasingMode::Msaa4x);
    let resolve = commands.iter().find_map(|command| match command {
        Command::ResolveImage { src, dst, extent } => Some((*src, *dst, *extent)),
        _ => None,
    });
    let (src, dst, extent) = resolve.unwrap();
    assert_eq!(device.image_desc(src).unwrap().samples, 4);
    assert_eq!(dst, report.display.image);
    assert_eq!(extent, Extent2D::new(64, 32));
}

#[test]
fn supersampling_blits() {
    let (_, commands, report) = frame_with(AntialiasingMode::Super4x);
    let blit = commands.iter().find_map(|command| match command {
        Command::BlitImage {
            dst,
            src_extent,
            dst_extent,
            ..
        } => Some((*dst, *src_extent, *dst_extent)),
        _ => None,
    });
    assert_eq!(
        blit,
        Some((report.display.image, Extent2D::new(128, 64), Extent2D::new(64, 32)))
    );
    assert!(!commands.iter().any(|command| matches!(command, Command::ResolveImage { .. })));
}

#[test]
fn without_antialiasing_the_color_image_is_displayed() {
    let (device, commands, report) = frame_with(AntialiasingMode::None);
    assert!(
        !commands
            .iter()
            .any(|command| matches!(command, Command::ResolveImage { .. } | Command::BlitImage { .. }))
    );
    assert_eq!(device.image_desc(report.display.image).unwrap().label, "colorImage");
}

#[test]
fn weighted_switches_render_passes() {
    let mut device = HeadlessDevice::default();
    let mut state = small_state();
    state.algorithm = Algorithm::Weighted;
    let (mut orchestrator, _) = orchestrator(state);
    orchestrator.render_frame(&mut device).unwrap();

    let commands = last_frame(&device).commands();
    let passes = commands
        .iter()
        .filter(|command| matches!(command, Command::BeginRenderPass { .. }))
        .count();
    let subpasses = commands
        .iter()
        .filter(|command| matches!(command, Command::NextSubpass))
        .count();
    assert_eq!((passes, subpasses), (2, 1));
    assert!(
        !commands
            .iter()
            .any(|command| matches!(command, Command::ClearColorImage { .. } | Command::FillBuffer { .. }))
    );
}

#[test]
fn loop_clears_before_the_render_pass() {
    let mut device = HeadlessDevice::default();
    let mut state = small_state();
    state.algorithm = Algorithm::Loop;
    let (mut orchestrator, _) = orchestrator(state);
    orchestrator.render_frame(&mut device).unwrap();

    let commands = last_frame(&device).commands();
    let fill = commands
        .iter()
        .position(|command| matches!(command, Command::FillBuffer { .. }))
        .unwrap();
    let begin = commands
        .iter()
        .position(|command| matches!(command, Command::BeginRenderPass { .. }))
        .unwrap();
    assert!(fill < begin);
    // depth, color and composite
    assert_eq!(draws(last_frame(&device)).len(), 2);
    assert_eq!(fullscreen_draws(last_frame(&device)), 1);
}

#[test_log::test]
fn shader_failure_keeps_rendering_the_applied_algorithm() {
    let mut device = HeadlessDevice::default();
    let (mut orchestrator, failing) = orchestrator(small_state());
    orchestrator.render_frame(&mut device).unwrap();

    failing.set(true);
    let mut weighted = small_state();
    weighted.algorithm = Algorithm::Weighted;
    orchestrator.request(weighted);

    let report = orchestrator.render_frame(&mut device).unwrap();
    assert!(report.reverted);
    assert_eq!(report.algorithm, Algorithm::Spinlock);
    assert_eq!(orchestrator.requested(), &small_state());

    // nothing is retried until a new configuration is requested
    let report = orchestrator.render_frame(&mut device).unwrap();
    assert!(!report.reverted);
    assert!(report.rebuilt.is_empty());
}

#[test]
fn shader_failure_on_the_first_frame_is_fatal() {
    let mut device = HeadlessDevice::default();
    let (mut orchestrator, failing) = orchestrator(small_state());
    failing.set(true);
    assert!(matches!(
        orchestrator.render_frame(&mut device),
        Err(RenderError::Shader(_))
    ));
    assert_eq!(device.live_count(), 0);
}

#[test]
fn changing_frame_slots_recreates_fences() {
    let mut device = HeadlessDevice::default();
    let (mut orchestrator, _) = orchestrator(small_state());
    orchestrator.render_frame(&mut device).unwrap();
    assert_eq!(device.live_count_of(ObjectKind::Fence), 2);

    let mut surface = common::surface();
    surface.frame_slots = 3;
    orchestrator.resize(surface);
    let report = orchestrator.render_frame(&mut device).unwrap();
    assert_eq!(report.slot, 0);
    assert_eq!(device.live_count_of(ObjectKind::Fence), 3);
    assert_eq!(device.destroyed_count(ObjectKind::Fence), 2);
}

#[test]
fn uniform_only_changes_reach_the_uniforms() {
    let mut device = HeadlessDevice::default();
    let (mut orchestrator, _) = orchestrator(small_state());
    orchestrator.render_frame(&mut device).unwrap();

    let mut state: State = small_state();
    state.alpha_min = 0.75;
    orchestrator.request(state);
    let report = orchestrator.render_frame(&mut device).unwrap();
    assert!(report.rebuilt.is_empty());
    assert_eq!(orchestrator.reconciler().applied().map(|applied| applied.alpha_min), Some(0.75));
}
