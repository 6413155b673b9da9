use oitlab_gpu::command::CommandList;
use oitlab_gpu::headless::HeadlessDevice;
use oitlab_gpu::image::ImageAndView;
use oitlab_gpu::shader::ShaderStage;
use oitlab_gpu::types::*;
use oitlab_gpu::{
    DescriptorSetHandle, DeviceCapabilities, FramebufferHandle, GpuDevice, GpuError, ObjectKind, PipelineHandle,
    PipelineLayoutHandle, RenderPassHandle, SubmitInfo,
};
use std::time::Duration;

struct Setup {
    color: ImageAndView,
    render_pass: RenderPassHandle,
    framebuffer: FramebufferHandle,
    pipeline_layout: PipelineLayoutHandle,
    pipeline: PipelineHandle,
    set: DescriptorSetHandle,
}

const EXTENT: Extent2D = Extent2D::new(4, 4);

fn uniform_desc() -> BufferDesc {
    BufferDesc {
        label: "uniforms".into(),
        size: 256,
        usage: BufferUsage::UNIFORM_BUFFER,
    }
}

fn setup(device: &mut HeadlessDevice) -> Setup {
    let color = ImageAndView::create(
        device,
        ImageDesc {
            label: "color".into(),
            format: Format::B8G8R8A8Srgb,
            extent: EXTENT,
            samples: 1,
            layers: 1,
            usage: ImageUsage::COLOR_ATTACHMENT,
        },
    )
    .unwrap();

    let render_pass = device
        .create_render_pass(&RenderPassDesc {
            label: "pass".into(),
            attachments: vec![AttachmentDesc {
                format: Format::B8G8R8A8Srgb,
                samples: 1,
                load: LoadOp::Clear,
                store: StoreOp::Store,
                initial_layout: ImageLayout::ColorAttachment,
                final_layout: ImageLayout::ColorAttachment,
            }],
            subpasses: vec![SubpassDesc {
                color: vec![0],
                ..Default::default()
            }],
            dependencies: vec![],
        })
        .unwrap();

    let framebuffer = device
        .create_framebuffer(&FramebufferDesc {
            label: "framebuffer".into(),
            render_pass,
            attachments: vec![color.view],
            extent: EXTENT,
        })
        .unwrap();

    let set_layout = device
        .create_descriptor_set_layout(&DescriptorSetLayoutDesc {
            label: "layout".into(),
            bindings: vec![DescriptorBinding {
                binding: 0,
                ty: DescriptorType::UniformBuffer,
                stages: ShaderStages::VERTEX,
            }],
        })
        .unwrap();
    let pool = device.create_descriptor_pool(set_layout, 1).unwrap();
    let set = device.allocate_descriptor_sets(pool, set_layout, 1).unwrap()[0];

    let pipeline_layout = device
        .create_pipeline_layout(&PipelineLayoutDesc {
            label: "pipeline layout".into(),
            set_layouts: vec![set_layout],
        })
        .unwrap();

    let vertex = device
        .create_shader_module(&ShaderModuleDesc {
            label: "vert".into(),
            stage: ShaderStage::Vertex,
            code: vec![1],
        })
        .unwrap();
    let fragment = device
        .create_shader_module(&ShaderModuleDesc {
            label: "frag".into(),
            stage: ShaderStage::Fragment,
            code: vec![1],
        })
        .unwrap();

    let pipeline = device
        .create_graphics_pipeline(&GraphicsPipelineDesc {
            label: "pipeline".into(),
            layout: pipeline_layout,
            render_pass,
            subpass: 0,
            vertex,
            fragment,
            vertex_layout: None,
            cull_mode: CullMode::None,
            front_face_ccw: true,
            depth_test: false,
            depth_write: false,
            depth_compare: CompareOp::Always,
            samples: 1,
            sample_shading: false,
            blend: vec![BlendAttachment::DISABLED],
            viewport: EXTENT,
        })
        .unwrap();

    Setup {
        color,
        render_pass,
        framebuffer,
        pipeline_layout,
        pipeline,
        set,
    }
}

fn record_draw(setup: &mut Setup, bind_set: bool) -> CommandList {
    let mut cmd = CommandList::new("draw");
    setup.color.transition_to(&mut cmd, ImageLayout::ColorAttachment);
    cmd.begin_render_pass(
        setup.render_pass,
        setup.framebuffer,
        EXTENT,
        vec![oitlab_gpu::command::ClearValue::Color([0.0; 4])],
    );
    cmd.bind_pipeline(setup.pipeline);
    if bind_set {
        cmd.bind_descriptor_set(setup.pipeline_layout, setup.set);
    }
    cmd.draw(3);
    cmd.end_render_pass();
    cmd
}

#[test]
fn valid_draw_is_accepted() {
    let mut device = HeadlessDevice::default();
    let mut setup = setup(&mut device);
    let cmd = record_draw(&mut setup, true);
    device.submit(SubmitInfo::new(cmd)).unwrap();
    assert_eq!(device.in_flight_count(), 1);
    assert_eq!(device.image_layout(setup.color.image), ImageLayout::ColorAttachment);
}

#[test]
fn draw_without_descriptor_set_is_rejected() {
    let mut device = HeadlessDevice::default();
    let mut setup = setup(&mut device);
    let cmd = record_draw(&mut setup, false);
    let result = device.submit(SubmitInfo::new(cmd));
    assert!(matches!(result, Err(GpuError::InvalidCommand { .. })));
    // nothing of a rejected submission is applied.
    assert_eq!(device.in_flight_count(), 0);
    assert_eq!(device.image_layout(setup.color.image), ImageLayout::Undefined);
}

#[test]
fn draw_outside_render_pass_is_rejected() {
    let mut device = HeadlessDevice::default();
    let setup = setup(&mut device);
    let mut cmd = CommandList::new("stray draw");
    cmd.bind_pipeline(setup.pipeline);
    cmd.draw(3);
    assert!(device.submit(SubmitInfo::new(cmd)).is_err());
}

#[test]
fn zero_count_draw_is_rejected() {
    let mut device = HeadlessDevice::default();
    let mut setup = setup(&mut device);
    let mut cmd = CommandList::new("empty draw");
    setup.color.transition_to(&mut cmd, ImageLayout::ColorAttachment);
    cmd.begin_render_pass(
        setup.render_pass,
        setup.framebuffer,
        EXTENT,
        vec![oitlab_gpu::command::ClearValue::Color([0.0; 4])],
    );
    cmd.bind_pipeline(setup.pipeline);
    cmd.bind_descriptor_set(setup.pipeline_layout, setup.set);
    cmd.draw(0);
    cmd.end_render_pass();
    let err = device.submit(SubmitInfo::new(cmd)).unwrap_err();
    assert!(err.to_string().contains("zero-count"), "{err}");
}

#[test]
fn objects_in_flight_cannot_be_destroyed() {
    let mut device = HeadlessDevice::default();
    let mut setup = setup(&mut device);
    let cmd = record_draw(&mut setup, true);
    device.submit(SubmitInfo::new(cmd)).unwrap();

    // referenced through the framebuffer only
    let result = device.destroy_image_view(setup.color.view);
    assert!(matches!(result, Err(GpuError::InUse { .. })));
    assert!(matches!(
        device.destroy_framebuffer(setup.framebuffer),
        Err(GpuError::InUse { .. })
    ));

    device.wait_idle().unwrap();
    device.destroy_framebuffer(setup.framebuffer).unwrap();
    setup.color.destroy(&mut device).unwrap();
}

#[test]
fn views_have_to_go_before_their_image() {
    let mut device = HeadlessDevice::default();
    let setup = setup(&mut device);
    assert!(matches!(
        device.destroy_image(setup.color.image),
        Err(GpuError::DependentsAlive { .. })
    ));
}

#[test]
fn descriptor_writes_are_type_checked() {
    let mut device = HeadlessDevice::default();
    let setup = setup(&mut device);
    let storage = device
        .create_buffer(&BufferDesc {
            label: "storage".into(),
            size: 64,
            usage: BufferUsage::STORAGE_BUFFER,
        })
        .unwrap();
    let uniform = device.create_buffer(&uniform_desc()).unwrap();

    let bad = DescriptorWrite {
        set: setup.set,
        binding: 0,
        resource: DescriptorResource::Buffer {
            buffer: storage,
            offset: 0,
            range: 64,
        },
    };
    assert!(matches!(
        device.update_descriptor_sets(&[bad]),
        Err(GpuError::InvalidDescriptorWrite { .. })
    ));

    let good = DescriptorWrite {
        set: setup.set,
        binding: 0,
        resource: DescriptorResource::Buffer {
            buffer: uniform,
            offset: 0,
            range: 256,
        },
    };
    device.update_descriptor_sets(&[good]).unwrap();
    assert_eq!(device.descriptor_binding(setup.set, 0), Some(good.resource));
}

#[test]
fn uniform_writes_wait_for_the_gpu() {
    let mut device = HeadlessDevice::default();
    let mut setup = setup(&mut device);
    let uniform = device.create_buffer(&uniform_desc()).unwrap();
    device
        .update_descriptor_sets(&[DescriptorWrite {
            set: setup.set,
            binding: 0,
            resource: DescriptorResource::Buffer {
                buffer: uniform,
                offset: 0,
                range: 256,
            },
        }])
        .unwrap();

    let fence = device.create_fence(false).unwrap();
    let cmd = record_draw(&mut setup, true);
    device.submit(SubmitInfo::new(cmd).with_fence(fence)).unwrap();

    assert!(matches!(
        device.write_buffer(uniform, 0, &[1, 2, 3, 4]),
        Err(GpuError::InUse { .. })
    ));
    assert!(device.wait_for_fence(fence, Duration::from_secs(1)).unwrap());
    device.write_buffer(uniform, 0, &[1, 2, 3, 4]).unwrap();
    assert_eq!(&device.uniform_contents(uniform).unwrap()[..4], &[1, 2, 3, 4]);
}

#[test]
fn fences_follow_submission_order() {
    let mut device = HeadlessDevice::default();
    let first = device.create_fence(false).unwrap();
    let second = device.create_fence(false).unwrap();
    let never = device.create_fence(false).unwrap();

    device
        .submit(SubmitInfo::new(CommandList::new("first")).with_fence(first))
        .unwrap();
    device
        .submit(SubmitInfo::new(CommandList::new("second")).with_fence(second))
        .unwrap();

    assert!(device.wait_for_fence(second, Duration::from_millis(1)).unwrap());
    assert!(device.wait_for_fence(first, Duration::from_millis(1)).unwrap());
    assert_eq!(device.in_flight_count(), 0);
    assert!(!device.wait_for_fence(never, Duration::from_millis(1)).unwrap());

    // signaled fences have to be reset before they are reused.
    assert!(device
        .submit(SubmitInfo::new(CommandList::new("third")).with_fence(first))
        .is_err());
    device.reset_fence(first).unwrap();
    device
        .submit(SubmitInfo::new(CommandList::new("third")).with_fence(first))
        .unwrap();
}

#[test]
fn memory_budget_is_enforced() {
    let mut device = HeadlessDevice::new(DeviceCapabilities::default()).with_memory_budget(1024);
    let desc = BufferDesc {
        label: "big".into(),
        size: 2048,
        usage: BufferUsage::STORAGE_BUFFER,
    };
    assert!(matches!(device.create_buffer(&desc), Err(GpuError::OutOfMemory { .. })));
    assert_eq!(device.live_count_of(ObjectKind::Buffer), 0);
}

#[test]
fn destroying_a_pool_frees_its_sets() {
    let mut device = HeadlessDevice::default();
    let layout = device
        .create_descriptor_set_layout(&DescriptorSetLayoutDesc {
            label: "layout".into(),
            bindings: vec![],
        })
        .unwrap();
    let pool = device.create_descriptor_pool(layout, 3).unwrap();
    let sets = device.allocate_descriptor_sets(pool, layout, 3).unwrap();
    assert!(device.allocate_descriptor_sets(pool, layout, 1).is_err());

    device.destroy_descriptor_pool(pool).unwrap();
    assert!(sets.iter().all(|set| !device.is_alive(*set)));
    assert_eq!(device.destroyed_count(ObjectKind::DescriptorSet), 3);
}
