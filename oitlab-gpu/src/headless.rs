//! A [`GpuDevice`] without a GPU.
//!
//! Nothing is executed, but everything is checked: handles have to be alive and of the right
//! kind, command streams have to be well-formed (render pass nesting, bound pipelines, image
//! layouts), descriptor writes have to match their layout, and no object may be destroyed or
//! rewritten while a submission that references it has not been waited for. Submissions only
//! retire through [`GpuDevice::wait_for_fence`] or [`GpuDevice::wait_idle`], so forgetting a
//! synchronization point surfaces as [`GpuError::InUse`] instead of silent corruption.

use crate::GpuError;
use crate::command::{Command, CommandList};
use crate::device::{DeviceCapabilities, GpuDevice, SubmitInfo};
use crate::handles::*;
use crate::shader::ShaderStage;
use crate::types::*;
use itertools::Itertools;
use log::trace;
use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};
use std::time::Duration;

#[derive(Debug)]
enum ObjectInfo {
    Image(ImageDesc),
    ImageView { image: ImageHandle },
    Buffer(BufferDesc),
    BufferView { buffer: BufferHandle },
    RenderPass(RenderPassDesc),
    Framebuffer(FramebufferDesc),
    DescriptorSetLayout(DescriptorSetLayoutDesc),
    DescriptorPool { layout: DescriptorSetLayoutHandle, max_sets: u32, allocated: u32 },
    DescriptorSet { pool: DescriptorPoolHandle, layout: DescriptorSetLayoutHandle, bindings: HashMap<u32, DescriptorResource> },
    PipelineLayout(PipelineLayoutDesc),
    Pipeline(GraphicsPipelineDesc),
    ShaderModule { stage: ShaderStage },
    Fence { signaled: bool },
    Semaphore,
}

impl ObjectInfo {
    fn kind(&self) -> ObjectKind {
        match self {
            ObjectInfo::Image(_) => ObjectKind::Image,
            ObjectInfo::ImageView { .. } => ObjectKind::ImageView,
            ObjectInfo::Buffer(_) => ObjectKind::Buffer,
            ObjectInfo::BufferView { .. } => ObjectKind::BufferView,
            ObjectInfo::RenderPass(_) => ObjectKind::RenderPass,
            ObjectInfo::Framebuffer(_) => ObjectKind::Framebuffer,
            ObjectInfo::DescriptorSetLayout(_) => ObjectKind::DescriptorSetLayout,
            ObjectInfo::DescriptorPool { .. } => ObjectKind::DescriptorPool,
            ObjectInfo::DescriptorSet { .. } => ObjectKind::DescriptorSet,
            ObjectInfo::PipelineLayout(_) => ObjectKind::PipelineLayout,
            ObjectInfo::Pipeline(_) => ObjectKind::Pipeline,
            ObjectInfo::ShaderModule { .. } => ObjectKind::ShaderModule,
            ObjectInfo::Fence { .. } => ObjectKind::Fence,
            ObjectInfo::Semaphore => ObjectKind::Semaphore,
        }
    }

    /// The object that owns this one and must outlive it.
    fn parent(&self) -> Option<u64> {
        match self {
            ObjectInfo::ImageView { image } => Some(image.raw()),
            ObjectInfo::BufferView { buffer } => Some(buffer.raw()),
            _ => None,
        }
    }
}

#[derive(Debug)]
struct LiveObject {
    label: String,
    info: ObjectInfo,
}

#[derive(Debug)]
struct Submission {
    fence: Option<FenceHandle>,
    referenced: HashSet<u64>,
}

struct ActivePass {
    render_pass: RenderPassHandle,
    framebuffer: FramebufferDesc,
    subpass: u32,
    subpass_count: u32,
}

#[derive(Default)]
struct RecordingState {
    pass: Option<ActivePass>,
    pipeline: Option<PipelineHandle>,
    descriptor_set_bound: bool,
    vertex_buffer_bound: bool,
    index_buffer_bound: bool,
}

#[derive(Debug, Default)]
pub struct HeadlessDevice {
    capabilities: DeviceCapabilities,
    memory_budget: Option<u64>,
    allocated_bytes: u64,
    next_raw: u64,
    objects: HashMap<u64, LiveObject>,
    created: BTreeMap<ObjectKind, usize>,
    destroyed: BTreeMap<ObjectKind, usize>,
    in_flight: VecDeque<Submission>,
    image_layouts: HashMap<u64, ImageLayout>,
    uniform_contents: HashMap<u64, Vec<u8>>,
    submitted: Vec<CommandList>,
    wait_idle_calls: usize,
}

impl HeadlessDevice {
    pub fn new(capabilities: DeviceCapabilities) -> Self {
        Self {
            capabilities,
            ..Default::default()
        }
    }

    /// Image and buffer allocations beyond `bytes` fail with [`GpuError::OutOfMemory`].
    pub fn with_memory_budget(mut self, bytes: u64) -> Self {
        self.memory_budget = Some(bytes);
        self
    }

    pub fn live_count(&self) -> usize {
        self.objects.len()
    }

    pub fn live_count_of(&self, kind: ObjectKind) -> usize {
        self.objects.values().filter(|obj| obj.info.kind() == kind).count()
    }

    /// Sorted labels of all live objects of `kind`.
    pub fn live_labels(&self, kind: ObjectKind) -> Vec<String> {
        self.objects
            .values()
            .filter(|obj| obj.info.kind() == kind)
            .map(|obj| obj.label.clone())
            .sorted()
            .collect_vec()
    }

    pub fn created_count(&self, kind: ObjectKind) -> usize {
        self.created.get(&kind).copied().unwrap_or_default()
    }

    pub fn destroyed_count(&self, kind: ObjectKind) -> usize {
        self.destroyed.get(&kind).copied().unwrap_or_default()
    }

    pub fn total_created(&self) -> usize {
        self.created.values().sum()
    }

    pub fn total_destroyed(&self) -> usize {
        self.destroyed.values().sum()
    }

    pub fn allocated_bytes(&self) -> u64 {
        self.allocated_bytes
    }

    pub fn is_alive<H: Handle>(&self, handle: H) -> bool {
        self.lookup(handle).is_ok()
    }

    pub fn image_desc(&self, image: ImageHandle) -> Option<&ImageDesc> {
        match self.lookup(image).ok()?.info {
            ObjectInfo::Image(ref desc) => Some(desc),
            _ => None,
        }
    }

    pub fn buffer_desc(&self, buffer: BufferHandle) -> Option<&BufferDesc> {
        match self.lookup(buffer).ok()?.info {
            ObjectInfo::Buffer(ref desc) => Some(desc),
            _ => None,
        }
    }

    pub fn pipeline_desc(&self, pipeline: PipelineHandle) -> Option<&GraphicsPipelineDesc> {
        match self.lookup(pipeline).ok()?.info {
            ObjectInfo::Pipeline(ref desc) => Some(desc),
            _ => None,
        }
    }

    pub fn render_pass_desc(&self, render_pass: RenderPassHandle) -> Option<&RenderPassDesc> {
        match self.lookup(render_pass).ok()?.info {
            ObjectInfo::RenderPass(ref desc) => Some(desc),
            _ => None,
        }
    }

    pub fn descriptor_layout_desc(&self, layout: DescriptorSetLayoutHandle) -> Option<&DescriptorSetLayoutDesc> {
        match self.lookup(layout).ok()?.info {
            ObjectInfo::DescriptorSetLayout(ref desc) => Some(desc),
            _ => None,
        }
    }

    pub fn descriptor_binding(&self, set: DescriptorSetHandle, binding: u32) -> Option<DescriptorResource> {
        match self.lookup(set).ok()?.info {
            ObjectInfo::DescriptorSet { ref bindings, .. } => bindings.get(&binding).copied(),
            _ => None,
        }
    }

    /// Layout of the image after all submitted work, as far as the device has seen it.
    pub fn image_layout(&self, image: ImageHandle) -> ImageLayout {
        self.image_layouts
            .get(&image.raw())
            .copied()
            .unwrap_or(ImageLayout::Undefined)
    }

    /// Last contents written into a uniform buffer through [`GpuDevice::write_buffer`].
    pub fn uniform_contents(&self, buffer: BufferHandle) -> Option<&[u8]> {
        self.uniform_contents.get(&buffer.raw()).map(Vec::as_slice)
    }

    pub fn submitted(&self) -> &[CommandList] {
        &self.submitted
    }

    pub fn take_submitted(&mut self) -> Vec<CommandList> {
        std::mem::take(&mut self.submitted)
    }

    pub fn in_flight_count(&self) -> usize {
        self.in_flight.len()
    }

    pub fn wait_idle_calls(&self) -> usize {
        self.wait_idle_calls
    }

    fn insert(&mut self, label: &str, info: ObjectInfo) -> u64 {
        self.next_raw += 1;
        let raw = self.next_raw;
        let kind = info.kind();
        trace!("Created {kind} {raw} \"{label}\"");
        *self.created.entry(kind).or_default() += 1;
        self.objects.insert(
            raw,
            LiveObject {
                label: label.to_string(),
                info,
            },
        );
        raw
    }

    fn lookup<H: Handle>(&self, handle: H) -> Result<&LiveObject, GpuError> {
        self.lookup_erased(handle.erased())
    }

    fn lookup_erased(&self, handle: AnyHandle) -> Result<&LiveObject, GpuError> {
        match self.objects.get(&handle.raw) {
            Some(obj) if obj.info.kind() == handle.kind => Ok(obj),
            _ => Err(GpuError::InvalidHandle {
                kind: handle.kind,
                raw: handle.raw,
            }),
        }
    }

    fn ensure_not_in_flight(&self, raw: u64) -> Result<(), GpuError> {
        if self.in_flight.iter().any(|sub| sub.referenced.contains(&raw))
            && let Some(obj) = self.objects.get(&raw)
        {
            return Err(GpuError::InUse {
                kind: obj.info.kind(),
                label: obj.label.clone(),
            });
        }
        Ok(())
    }

    fn remove<H: Handle>(&mut self, handle: H) -> Result<LiveObject, GpuError> {
        let raw = handle.raw();
        let label = self.lookup(handle)?.label.clone();
        self.ensure_not_in_flight(raw)?;

        if self.objects.values().any(|obj| obj.info.parent() == Some(raw)) {
            return Err(GpuError::DependentsAlive { kind: H::KIND, label });
        }

        let obj = self.objects.remove(&raw).ok_or(GpuError::InvalidHandle { kind: H::KIND, raw })?;
        trace!("Destroyed {} {raw} \"{}\"", H::KIND, obj.label);
        *self.destroyed.entry(H::KIND).or_default() += 1;
        self.image_layouts.remove(&raw);
        self.uniform_contents.remove(&raw);
        Ok(obj)
    }

    fn allocate_memory(&mut self, label: &str, requested: u64) -> Result<(), GpuError> {
        if let Some(budget) = self.memory_budget
            && self.allocated_bytes + requested > budget
        {
            return Err(GpuError::OutOfMemory {
                label: label.to_string(),
                requested,
            });
        }
        self.allocated_bytes += requested;
        Ok(())
    }

    fn creation_failed(kind: ObjectKind, reason: impl Into<String>) -> GpuError {
        GpuError::CreationFailed {
            kind,
            reason: reason.into(),
        }
    }

    /// Everything a set of directly referenced handles keeps alive on the GPU.
    fn expand_references(&self, direct: impl IntoIterator<Item = u64>) -> HashSet<u64> {
        let mut result = HashSet::new();
        let mut stack = direct.into_iter().collect_vec();

        while let Some(raw) = stack.pop() {
            // descriptors may still point at destroyed resources the bound pipelines don't use.
            let Some(obj) = self.objects.get(&raw) else {
                continue;
            };
            if !result.insert(raw) {
                continue;
            }

            match &obj.info {
                ObjectInfo::ImageView { image } => stack.push(image.raw()),
                ObjectInfo::BufferView { buffer } => stack.push(buffer.raw()),
                ObjectInfo::Framebuffer(desc) => stack.extend(desc.attachments.iter().map(|view| view.raw())),
                ObjectInfo::DescriptorSet { bindings, .. } => {
                    stack.extend(bindings.values().map(|resource| match resource {
                        DescriptorResource::Buffer { buffer, .. } => buffer.raw(),
                        DescriptorResource::TexelBuffer(view) => view.raw(),
                        DescriptorResource::Image { view, .. } => view.raw(),
                    }))
                }
                ObjectInfo::Pipeline(desc) => stack.push(desc.layout.raw()),
                _ => {}
            }
        }

        result
    }

    fn image_of_view(&self, view: ImageViewHandle) -> Result<(ImageHandle, &ImageDesc), GpuError> {
        let ObjectInfo::ImageView { image } = self.lookup(view)?.info else {
            unreachable!("lookup checks the kind");
        };

        match &self.lookup(image)?.info {
            ObjectInfo::Image(desc) => Ok((image, desc)),
            _ => unreachable!("lookup checks the kind"),
        }
    }

    fn validate_commands(
        &self,
        list: &CommandList,
        layouts: &mut HashMap<u64, ImageLayout>,
    ) -> Result<HashSet<u64>, GpuError> {
        let invalid = |index: usize, reason: String| GpuError::InvalidCommand {
            list: list.label().to_string(),
            index,
            reason,
        };

        let mut state = RecordingState::default();
        let mut direct = vec![];

        for (index, command) in list.commands().iter().enumerate() {
            for handle in command.referenced() {
                self.lookup_erased(handle).map_err(|e| invalid(index, e.to_string()))?;
                direct.push(handle.raw);
            }

            let current_layout = |layouts: &HashMap<u64, ImageLayout>, image: ImageHandle| {
                layouts
                    .get(&image.raw())
                    .copied()
                    .unwrap_or(ImageLayout::Undefined)
            };

            match command {
                Command::ImageBarrier {
                    image,
                    old_layout,
                    new_layout,
                    ..
                } => {
                    let current = current_layout(layouts, *image);
                    if *old_layout != ImageLayout::Undefined && *old_layout != current {
                        return Err(invalid(
                            index,
                            format!("barrier expects {old_layout:?}, but the image is in {current:?}"),
                        ));
                    }
                    layouts.insert(image.raw(), *new_layout);
                }
                Command::MemoryBarrier { .. } => {}
                Command::ClearColorImage { image, .. } => {
                    if state.pass.is_some() {
                        return Err(invalid(index, "clear inside a render pass".into()));
                    }
                    let desc = self.image_desc(*image).ok_or_else(|| invalid(index, "not an image".into()))?;
                    if !desc.usage.contains(ImageUsage::TRANSFER_DST) {
                        return Err(invalid(index, format!("{} lacks TRANSFER_DST usage", desc.label)));
                    }
                    let current = current_layout(layouts, *image);
                    if !matches!(current, ImageLayout::General | ImageLayout::TransferDst) {
                        return Err(invalid(index, format!("{} cleared in layout {current:?}", desc.label)));
                    }
                }
                Command::FillBuffer {
                    buffer,
                    offset,
                    size,
                    ..
                } => {
                    if state.pass.is_some() {
                        return Err(invalid(index, "fill inside a render pass".into()));
                    }
                    let desc = self
                        .buffer_desc(*buffer)
                        .ok_or_else(|| invalid(index, "not a buffer".into()))?;
                    if offset % 4 != 0 || size % 4 != 0 {
                        return Err(invalid(index, "fill offset and size must be multiples of 4".into()));
                    }
                    if offset + size > desc.size {
                        return Err(invalid(
                            index,
                            format!("fill of {size} bytes at {offset} exceeds {} ({} bytes)", desc.label, desc.size),
                        ));
                    }
                    if !desc.usage.contains(BufferUsage::TRANSFER_DST) {
                        return Err(invalid(index, format!("{} lacks TRANSFER_DST usage", desc.label)));
                    }
                }
                Command::BeginRenderPass {
                    render_pass,
                    framebuffer,
                    extent,
                    clear_values,
                } => {
                    if state.pass.is_some() {
                        return Err(invalid(index, "render pass begun inside another one".into()));
                    }
                    let pass_desc = self
                        .render_pass_desc(*render_pass)
                        .ok_or_else(|| invalid(index, "not a render pass".into()))?;
                    let ObjectInfo::Framebuffer(fb_desc) = &self.lookup(*framebuffer)?.info else {
                        unreachable!("referenced handles are kind checked");
                    };
                    if fb_desc.render_pass != *render_pass {
                        return Err(invalid(index, format!("{} belongs to another render pass", fb_desc.label)));
                    }
                    if fb_desc.extent != *extent {
                        return Err(invalid(index, "render area differs from the framebuffer".into()));
                    }

                    for (attachment_index, (attachment, view)) in
                        pass_desc.attachments.iter().zip(&fb_desc.attachments).enumerate()
                    {
                        if attachment.load == LoadOp::Clear && attachment_index >= clear_values.len() {
                            return Err(invalid(index, format!("missing clear value for attachment {attachment_index}")));
                        }
                        let (image, _) = self.image_of_view(*view)?;
                        let current = current_layout(layouts, image);
                        if attachment.initial_layout != ImageLayout::Undefined && attachment.initial_layout != current {
                            return Err(invalid(
                                index,
                                format!(
                                    "attachment {attachment_index} of {} expected in {:?}, but is in {current:?}",
                                    pass_desc.label, attachment.initial_layout
                                ),
                            ));
                        }
                    }

                    state.pass = Some(ActivePass {
                        render_pass: *render_pass,
                        framebuffer: fb_desc.clone(),
                        subpass: 0,
                        subpass_count: pass_desc.subpasses.len() as u32,
                    });
                    state.pipeline = None;
                }
                Command::NextSubpass => {
                    let pass = state
                        .pass
                        .as_mut()
                        .ok_or_else(|| invalid(index, "next subpass outside a render pass".into()))?;
                    if pass.subpass + 1 >= pass.subpass_count {
                        return Err(invalid(index, "no further subpass".into()));
                    }
                    pass.subpass += 1;
                    state.pipeline = None;
                }
                Command::EndRenderPass => {
                    let pass = state
                        .pass
                        .take()
                        .ok_or_else(|| invalid(index, "end outside a render pass".into()))?;
                    if pass.subpass + 1 != pass.subpass_count {
                        return Err(invalid(index, "render pass ended before its last subpass".into()));
                    }
                    let pass_desc = self
                        .render_pass_desc(pass.render_pass)
                        .ok_or_else(|| invalid(index, "render pass destroyed".into()))?;
                    for (attachment, view) in pass_desc.attachments.iter().zip(&pass.framebuffer.attachments) {
                        let (image, _) = self.image_of_view(*view)?;
                        layouts.insert(image.raw(), attachment.final_layout);
                    }
                    state.pipeline = None;
                }
                Command::BindPipeline(pipeline) => state.pipeline = Some(*pipeline),
                Command::BindDescriptorSet { layout, set } => {
                    let ObjectInfo::DescriptorSet { layout: set_layout, .. } = &self.lookup(*set)?.info else {
                        unreachable!("referenced handles are kind checked");
                    };
                    let ObjectInfo::PipelineLayout(layout_desc) = &self.lookup(*layout)?.info else {
                        unreachable!("referenced handles are kind checked");
                    };
                    if !layout_desc.set_layouts.contains(set_layout) {
                        return Err(invalid(index, "descriptor set incompatible with the pipeline layout".into()));
                    }
                    state.descriptor_set_bound = true;
                }
                Command::BindVertexBuffer { buffer, .. } => {
                    self.check_buffer_usage(*buffer, BufferUsage::VERTEX_BUFFER)
                        .map_err(|reason| invalid(index, reason))?;
                    state.vertex_buffer_bound = true;
                }
                Command::BindIndexBuffer { buffer, .. } => {
                    self.check_buffer_usage(*buffer, BufferUsage::INDEX_BUFFER)
                        .map_err(|reason| invalid(index, reason))?;
                    state.index_buffer_bound = true;
                }
                Command::Draw { vertex_count, .. } | Command::DrawIndexed {
                    index_count: vertex_count,
                    ..
                } => {
                    let indexed = matches!(command, Command::DrawIndexed { .. });
                    if *vertex_count == 0 {
                        return Err(invalid(index, "zero-count draw".into()));
                    }
                    let pass = state
                        .pass
                        .as_ref()
                        .ok_or_else(|| invalid(index, "draw outside a render pass".into()))?;
                    let pipeline = state
                        .pipeline
                        .ok_or_else(|| invalid(index, "draw without a bound pipeline".into()))?;
                    let pipeline_desc = self
                        .pipeline_desc(pipeline)
                        .ok_or_else(|| invalid(index, "pipeline destroyed".into()))?;
                    if pipeline_desc.render_pass != pass.render_pass || pipeline_desc.subpass != pass.subpass {
                        return Err(invalid(
                            index,
                            format!(
                                "pipeline {} targets subpass {} of another pass than the active subpass {}",
                                pipeline_desc.label, pipeline_desc.subpass, pass.subpass
                            ),
                        ));
                    }
                    if !state.descriptor_set_bound {
                        return Err(invalid(index, "draw without a bound descriptor set".into()));
                    }
                    if indexed && !state.index_buffer_bound {
                        return Err(invalid(index, "indexed draw without an index buffer".into()));
                    }
                    if pipeline_desc.vertex_layout.is_some() && !state.vertex_buffer_bound {
                        return Err(invalid(index, "draw without a vertex buffer".into()));
                    }
                }
                Command::ResolveImage { src, dst, .. } | Command::BlitImage { src, dst, .. } => {
                    if state.pass.is_some() {
                        return Err(invalid(index, "transfer inside a render pass".into()));
                    }
                    let resolve = matches!(command, Command::ResolveImage { .. });
                    let src_desc = self.image_desc(*src).ok_or_else(|| invalid(index, "not an image".into()))?;
                    let dst_desc = self.image_desc(*dst).ok_or_else(|| invalid(index, "not an image".into()))?;
                    if resolve && src_desc.samples == 1 {
                        return Err(invalid(index, format!("resolve from single sampled {}", src_desc.label)));
                    }
                    if !resolve && src_desc.samples != 1 {
                        return Err(invalid(index, format!("blit from multisampled {}", src_desc.label)));
                    }
                    if dst_desc.samples != 1 {
                        return Err(invalid(index, format!("transfer into multisampled {}", dst_desc.label)));
                    }
                    if current_layout(layouts, *src) != ImageLayout::TransferSrc
                        || current_layout(layouts, *dst) != ImageLayout::TransferDst
                    {
                        return Err(invalid(index, "transfer images are not in transfer layouts".into()));
                    }
                }
            }
        }

        if state.pass.is_some() {
            return Err(invalid(list.len(), "command list ends inside a render pass".into()));
        }

        Ok(self.expand_references(direct))
    }

    fn check_buffer_usage(&self, buffer: BufferHandle, usage: BufferUsage) -> Result<(), String> {
        let desc = self.buffer_desc(buffer).ok_or_else(|| "not a buffer".to_string())?;
        if desc.usage.contains(usage) {
            Ok(())
        } else {
            Err(format!("{} lacks {usage:?} usage", desc.label))
        }
    }

    fn check_descriptor_write(&self, write: &DescriptorWrite) -> Result<(), String> {
        let set = self.lookup(write.set).map_err(|e| e.to_string())?;
        let ObjectInfo::DescriptorSet { layout, .. } = &set.info else {
            unreachable!("lookup checks the kind");
        };
        let layout_desc = self
            .descriptor_layout_desc(*layout)
            .ok_or_else(|| "descriptor set layout destroyed".to_string())?;
        let binding = layout_desc
            .bindings
            .iter()
            .find(|b| b.binding == write.binding)
            .ok_or_else(|| format!("binding {} not part of {}", write.binding, layout_desc.label))?;

        match (binding.ty, write.resource) {
            (DescriptorType::UniformBuffer, DescriptorResource::Buffer { buffer, .. }) => {
                self.check_buffer_usage(buffer, BufferUsage::UNIFORM_BUFFER)
            }
            (DescriptorType::StorageBuffer, DescriptorResource::Buffer { buffer, .. }) => {
                self.check_buffer_usage(buffer, BufferUsage::STORAGE_BUFFER)
            }
            (DescriptorType::StorageTexelBuffer, DescriptorResource::TexelBuffer(view)) => {
                let ObjectInfo::BufferView { buffer } = self.lookup(view).map_err(|e| e.to_string())?.info else {
                    unreachable!("lookup checks the kind");
                };
                self.check_buffer_usage(buffer, BufferUsage::STORAGE_TEXEL_BUFFER)
            }
            (DescriptorType::StorageImage, DescriptorResource::Image { view, .. })
            | (DescriptorType::InputAttachment, DescriptorResource::Image { view, .. }) => {
                let (_, desc) = self.image_of_view(view).map_err(|e| e.to_string())?;
                let required = if binding.ty == DescriptorType::StorageImage {
                    ImageUsage::STORAGE
                } else {
                    ImageUsage::INPUT_ATTACHMENT
                };
                if desc.usage.contains(required) {
                    Ok(())
                } else {
                    Err(format!("{} lacks {required:?} usage", desc.label))
                }
            }
            (ty, resource) => Err(format!("binding {} of type {ty:?} cannot hold {resource:?}", write.binding)),
        }
    }

    fn retire_through(&mut self, count: usize) {
        for submission in self.in_flight.drain(..count) {
            if let Some(fence) = submission.fence
                && let Some(LiveObject {
                    info: ObjectInfo::Fence { signaled },
                    ..
                }) = self.objects.get_mut(&fence.raw())
            {
                *signaled = true;
            }
        }
    }
}

impl GpuDevice for HeadlessDevice {
    fn capabilities(&self) -> &DeviceCapabilities {
        &self.capabilities
    }

    fn create_image(&mut self, desc: &ImageDesc) -> Result<ImageHandle, GpuError> {
        if desc.extent.width == 0 || desc.extent.height == 0 || desc.layers == 0 {
            return Err(Self::creation_failed(ObjectKind::Image, format!("{} has an empty extent", desc.label)));
        }
        if !desc.samples.is_power_of_two() || desc.samples > self.capabilities.max_color_samples {
            return Err(Self::creation_failed(
                ObjectKind::Image,
                format!("{} samples are not supported for {}", desc.samples, desc.label),
            ));
        }
        self.allocate_memory(&desc.label, desc.size_in_bytes())?;
        Ok(ImageHandle::from_raw(self.insert(&desc.label, ObjectInfo::Image(desc.clone()))))
    }

    fn destroy_image(&mut self, image: ImageHandle) -> Result<(), GpuError> {
        if let ObjectInfo::Image(desc) = self.remove(image)?.info {
            self.allocated_bytes -= desc.size_in_bytes();
        }
        Ok(())
    }

    fn create_image_view(&mut self, image: ImageHandle, label: &str) -> Result<ImageViewHandle, GpuError> {
        self.lookup(image)?;
        Ok(ImageViewHandle::from_raw(self.insert(label, ObjectInfo::ImageView { image })))
    }

    fn destroy_image_view(&mut self, view: ImageViewHandle) -> Result<(), GpuError> {
        self.remove(view).map(|_| ())
    }

    fn create_buffer(&mut self, desc: &BufferDesc) -> Result<BufferHandle, GpuError> {
        if desc.size == 0 {
            return Err(Self::creation_failed(ObjectKind::Buffer, format!("{} has a size of zero", desc.label)));
        }
        self.allocate_memory(&desc.label, desc.size)?;
        Ok(BufferHandle::from_raw(self.insert(&desc.label, ObjectInfo::Buffer(desc.clone()))))
    }

    fn destroy_buffer(&mut self, buffer: BufferHandle) -> Result<(), GpuError> {
        if let ObjectInfo::Buffer(desc) = self.remove(buffer)?.info {
            self.allocated_bytes -= desc.size;
        }
        Ok(())
    }

    fn create_buffer_view(&mut self, buffer: BufferHandle, format: Format) -> Result<BufferViewHandle, GpuError> {
        let desc = self
            .buffer_desc(buffer)
            .ok_or(GpuError::InvalidHandle {
                kind: ObjectKind::Buffer,
                raw: buffer.raw(),
            })?;
        if !desc
            .usage
            .intersects(BufferUsage::STORAGE_TEXEL_BUFFER | BufferUsage::UNIFORM_TEXEL_BUFFER)
        {
            return Err(Self::creation_failed(
                ObjectKind::BufferView,
                format!("{} is not a texel buffer", desc.label),
            ));
        }
        if desc.size % format.bytes_per_texel() != 0 {
            return Err(Self::creation_failed(
                ObjectKind::BufferView,
                format!("{} is not a multiple of the {format:?} texel size", desc.label),
            ));
        }
        let label = format!("{} view", desc.label);
        Ok(BufferViewHandle::from_raw(self.insert(&label, ObjectInfo::BufferView { buffer })))
    }

    fn destroy_buffer_view(&mut self, view: BufferViewHandle) -> Result<(), GpuError> {
        self.remove(view).map(|_| ())
    }

    fn write_buffer(&mut self, buffer: BufferHandle, offset: u64, data: &[u8]) -> Result<(), GpuError> {
        self.lookup(buffer)?;
        self.ensure_not_in_flight(buffer.raw())?;
        let desc = self.buffer_desc(buffer).ok_or(GpuError::InvalidHandle {
            kind: ObjectKind::Buffer,
            raw: buffer.raw(),
        })?;
        if offset + data.len() as u64 > desc.size {
            return Err(GpuError::InvalidSubmission {
                reason: format!("write of {} bytes at {offset} exceeds {}", data.len(), desc.label),
            });
        }

        if desc.usage.contains(BufferUsage::UNIFORM_BUFFER) {
            let size = desc.size as usize;
            let contents = self.uniform_contents.entry(buffer.raw()).or_default();
            contents.resize(size, 0);
            contents[offset as usize..offset as usize + data.len()].copy_from_slice(data);
        }
        Ok(())
    }

    fn create_render_pass(&mut self, desc: &RenderPassDesc) -> Result<RenderPassHandle, GpuError> {
        if desc.subpasses.is_empty() {
            return Err(Self::creation_failed(ObjectKind::RenderPass, format!("{} has no subpass", desc.label)));
        }
        let attachment_count = desc.attachments.len() as u32;
        let out_of_range = desc.subpasses.iter().any(|subpass| {
            subpass
                .color
                .iter()
                .chain(&subpass.input)
                .chain(subpass.depth.iter())
                .any(|&attachment| attachment >= attachment_count)
        });
        if out_of_range {
            return Err(Self::creation_failed(
                ObjectKind::RenderPass,
                format!("{} references a missing attachment", desc.label),
            ));
        }
        Ok(RenderPassHandle::from_raw(self.insert(&desc.label, ObjectInfo::RenderPass(desc.clone()))))
    }

    fn destroy_render_pass(&mut self, render_pass: RenderPassHandle) -> Result<(), GpuError> {
        self.remove(render_pass).map(|_| ())
    }

    fn create_framebuffer(&mut self, desc: &FramebufferDesc) -> Result<FramebufferHandle, GpuError> {
        let pass = self.render_pass_desc(desc.render_pass).ok_or(GpuError::InvalidHandle {
            kind: ObjectKind::RenderPass,
            raw: desc.render_pass.raw(),
        })?;
        if pass.attachments.len() != desc.attachments.len() {
            return Err(Self::creation_failed(
                ObjectKind::Framebuffer,
                format!("{} attachment count does not match {}", desc.label, pass.label),
            ));
        }
        for (attachment, view) in pass.attachments.iter().zip(&desc.attachments) {
            let (_, image) = self.image_of_view(*view)?;
            if image.format != attachment.format || image.samples != attachment.samples || image.extent != desc.extent {
                return Err(Self::creation_failed(
                    ObjectKind::Framebuffer,
                    format!("{} is incompatible with {}", image.label, pass.label),
                ));
            }
        }
        Ok(FramebufferHandle::from_raw(self.insert(&desc.label, ObjectInfo::Framebuffer(desc.clone()))))
    }

    fn destroy_framebuffer(&mut self, framebuffer: FramebufferHandle) -> Result<(), GpuError> {
        self.remove(framebuffer).map(|_| ())
    }

    fn create_descriptor_set_layout(
        &mut self,
        desc: &DescriptorSetLayoutDesc,
    ) -> Result<DescriptorSetLayoutHandle, GpuError> {
        if !desc.bindings.iter().map(|b| b.binding).all_unique() {
            return Err(Self::creation_failed(
                ObjectKind::DescriptorSetLayout,
                format!("{} declares a binding twice", desc.label),
            ));
        }
        Ok(DescriptorSetLayoutHandle::from_raw(
            self.insert(&desc.label, ObjectInfo::DescriptorSetLayout(desc.clone())),
        ))
    }

    fn destroy_descriptor_set_layout(&mut self, layout: DescriptorSetLayoutHandle) -> Result<(), GpuError> {
        self.remove(layout).map(|_| ())
    }

    fn create_descriptor_pool(
        &mut self,
        layout: DescriptorSetLayoutHandle,
        max_sets: u32,
    ) -> Result<DescriptorPoolHandle, GpuError> {
        let label = format!("{} pool", self.lookup(layout)?.label);
        Ok(DescriptorPoolHandle::from_raw(self.insert(
            &label,
            ObjectInfo::DescriptorPool {
                layout,
                max_sets,
                allocated: 0,
            },
        )))
    }

    fn destroy_descriptor_pool(&mut self, pool: DescriptorPoolHandle) -> Result<(), GpuError> {
        let sets = self
            .objects
            .iter()
            .filter_map(|(&raw, obj)| match obj.info {
                ObjectInfo::DescriptorSet { pool: owner, .. } if owner == pool => Some(raw),
                _ => None,
            })
            .collect_vec();

        self.lookup(pool)?;
        for &raw in &sets {
            self.ensure_not_in_flight(raw)?;
        }
        for raw in sets {
            self.remove(DescriptorSetHandle::from_raw(raw))?;
        }
        self.remove(pool).map(|_| ())
    }

    fn allocate_descriptor_sets(
        &mut self,
        pool: DescriptorPoolHandle,
        layout: DescriptorSetLayoutHandle,
        count: u32,
    ) -> Result<Vec<DescriptorSetHandle>, GpuError> {
        let pool_label = self.lookup(pool)?.label.clone();
        let layout_label = self.lookup(layout)?.label.clone();
        let Some(LiveObject {
            info:
                ObjectInfo::DescriptorPool {
                    layout: pool_layout,
                    max_sets,
                    allocated,
                },
            ..
        }) = self.objects.get_mut(&pool.raw())
        else {
            unreachable!("lookup checks the kind");
        };

        if *pool_layout != layout {
            return Err(Self::creation_failed(
                ObjectKind::DescriptorSet,
                format!("{pool_label} serves another layout"),
            ));
        }
        if *allocated + count > *max_sets {
            return Err(Self::creation_failed(
                ObjectKind::DescriptorSet,
                format!("{pool_label} is exhausted"),
            ));
        }
        *allocated += count;

        Ok((0..count)
            .map(|i| {
                DescriptorSetHandle::from_raw(self.insert(
                    &format!("{layout_label} set {i}"),
                    ObjectInfo::DescriptorSet {
                        pool,
                        layout,
                        bindings: HashMap::new(),
                    },
                ))
            })
            .collect_vec())
    }

    fn update_descriptor_sets(&mut self, writes: &[DescriptorWrite]) -> Result<(), GpuError> {
        for write in writes {
            self.check_descriptor_write(write)
                .map_err(|reason| GpuError::InvalidDescriptorWrite { reason })?;
            self.ensure_not_in_flight(write.set.raw())?;
        }

        for write in writes {
            if let Some(LiveObject {
                info: ObjectInfo::DescriptorSet { bindings, .. },
                ..
            }) = self.objects.get_mut(&write.set.raw())
            {
                bindings.insert(write.binding, write.resource);
            }
        }
        Ok(())
    }

    fn create_pipeline_layout(&mut self, desc: &PipelineLayoutDesc) -> Result<PipelineLayoutHandle, GpuError> {
        for layout in &desc.set_layouts {
            self.lookup(*layout)?;
        }
        Ok(PipelineLayoutHandle::from_raw(
            self.insert(&desc.label, ObjectInfo::PipelineLayout(desc.clone())),
        ))
    }

    fn destroy_pipeline_layout(&mut self, layout: PipelineLayoutHandle) -> Result<(), GpuError> {
        self.remove(layout).map(|_| ())
    }

    fn create_graphics_pipeline(&mut self, desc: &GraphicsPipelineDesc) -> Result<PipelineHandle, GpuError> {
        let failed = |reason: String| Self::creation_failed(ObjectKind::Pipeline, format!("{}: {reason}", desc.label));

        self.lookup(desc.layout)?;
        for (module, expected) in [(desc.vertex, ShaderStage::Vertex), (desc.fragment, ShaderStage::Fragment)] {
            let ObjectInfo::ShaderModule { stage } = self.lookup(module)?.info else {
                unreachable!("lookup checks the kind");
            };
            if stage != expected {
                return Err(failed(format!("{stage:?} module used as {expected:?} stage")));
            }
        }

        let pass = self.render_pass_desc(desc.render_pass).ok_or(GpuError::InvalidHandle {
            kind: ObjectKind::RenderPass,
            raw: desc.render_pass.raw(),
        })?;
        let subpass = pass
            .subpasses
            .get(desc.subpass as usize)
            .ok_or_else(|| failed(format!("subpass {} does not exist", desc.subpass)))?;
        if subpass.color.len() != desc.blend.len() {
            return Err(failed(format!(
                "{} blend states for {} color attachments",
                desc.blend.len(),
                subpass.color.len()
            )));
        }
        let attachment_samples = subpass
            .color
            .iter()
            .chain(subpass.depth.iter())
            .map(|&index| pass.attachments[index as usize].samples)
            .collect_vec();
        if attachment_samples.iter().any(|&samples| samples != desc.samples) {
            return Err(failed(format!(
                "{} samples, but the subpass attachments have {attachment_samples:?}",
                desc.samples
            )));
        }
        if desc.sample_shading && !self.capabilities.sample_rate_shading {
            return Err(failed("sample rate shading is not supported".into()));
        }

        Ok(PipelineHandle::from_raw(self.insert(&desc.label, ObjectInfo::Pipeline(desc.clone()))))
    }

    fn destroy_pipeline(&mut self, pipeline: PipelineHandle) -> Result<(), GpuError> {
        self.remove(pipeline).map(|_| ())
    }

    fn create_shader_module(&mut self, desc: &ShaderModuleDesc) -> Result<ShaderModuleHandle, GpuError> {
        if desc.code.is_empty() {
            return Err(Self::creation_failed(
                ObjectKind::ShaderModule,
                format!("{} has no code", desc.label),
            ));
        }
        Ok(ShaderModuleHandle::from_raw(
            self.insert(&desc.label, ObjectInfo::ShaderModule { stage: desc.stage }),
        ))
    }

    fn destroy_shader_module(&mut self, module: ShaderModuleHandle) -> Result<(), GpuError> {
        self.remove(module).map(|_| ())
    }

    fn create_fence(&mut self, signaled: bool) -> Result<FenceHandle, GpuError> {
        Ok(FenceHandle::from_raw(self.insert("fence", ObjectInfo::Fence { signaled })))
    }

    fn destroy_fence(&mut self, fence: FenceHandle) -> Result<(), GpuError> {
        if self.in_flight.iter().any(|sub| sub.fence == Some(fence)) {
            return Err(GpuError::InUse {
                kind: ObjectKind::Fence,
                label: "fence".into(),
            });
        }
        self.remove(fence).map(|_| ())
    }

    fn create_semaphore(&mut self) -> Result<SemaphoreHandle, GpuError> {
        Ok(SemaphoreHandle::from_raw(self.insert("semaphore", ObjectInfo::Semaphore)))
    }

    fn destroy_semaphore(&mut self, semaphore: SemaphoreHandle) -> Result<(), GpuError> {
        self.remove(semaphore).map(|_| ())
    }

    fn submit(&mut self, submit: SubmitInfo) -> Result<(), GpuError> {
        for semaphore in submit.wait_semaphores.iter().chain(&submit.signal_semaphores) {
            self.lookup(*semaphore)?;
        }

        if let Some(fence) = submit.fence {
            let ObjectInfo::Fence { signaled } = self.lookup(fence)?.info else {
                unreachable!("lookup checks the kind");
            };
            if signaled || self.in_flight.iter().any(|sub| sub.fence == Some(fence)) {
                return Err(GpuError::InvalidSubmission {
                    reason: "submitted with a fence that has not been reset".into(),
                });
            }
        }

        let mut layouts = self.image_layouts.clone();
        let referenced = self.validate_commands(&submit.commands, &mut layouts)?;
        self.image_layouts = layouts;

        trace!(
            "Submitted \"{}\" with {} commands, referencing {} objects",
            submit.commands.label(),
            submit.commands.len(),
            referenced.len()
        );
        self.in_flight.push_back(Submission {
            fence: submit.fence,
            referenced,
        });
        self.submitted.push(submit.commands);
        Ok(())
    }

    fn wait_for_fence(&mut self, fence: FenceHandle, timeout: Duration) -> Result<bool, GpuError> {
        let ObjectInfo::Fence { signaled } = self.lookup(fence)?.info else {
            unreachable!("lookup checks the kind");
        };
        if signaled {
            return Ok(true);
        }

        // The queue executes in submission order, so everything before the fence is done too.
        match self.in_flight.iter().position(|sub| sub.fence == Some(fence)) {
            Some(position) => {
                self.retire_through(position + 1);
                Ok(true)
            }
            None => {
                trace!("Fence {} would never signal, giving up after {timeout:?}", fence.raw());
                Ok(false)
            }
        }
    }

    fn reset_fence(&mut self, fence: FenceHandle) -> Result<(), GpuError> {
        if self.in_flight.iter().any(|sub| sub.fence == Some(fence)) {
            return Err(GpuError::InUse {
                kind: ObjectKind::Fence,
                label: "fence".into(),
            });
        }
        match self.objects.get_mut(&fence.raw()) {
            Some(LiveObject {
                info: ObjectInfo::Fence { signaled },
                ..
            }) => {
                *signaled = false;
                Ok(())
            }
            _ => Err(GpuError::InvalidHandle {
                kind: ObjectKind::Fence,
                raw: fence.raw(),
            }),
        }
    }

    fn wait_idle(&mut self) -> Result<(), GpuError> {
        self.wait_idle_calls += 1;
        let count = self.in_flight.len();
        self.retire_through(count);
        Ok(())
    }
}
