//! In-memory backend that validates how a renderer uses the device.
//!
//! [`HeadlessBackend`] implements [`RenderBackend`] without a GPU. Regions
//! are byte vectors, command sequences keep their [`CommandList`], and GPU
//! execution is modeled as a queue of pending submissions that completes
//! when its fence is waited on (or on [`wait_idle`](RenderBackend::wait_idle)).
//!
//! Misuse that a real driver would turn into corruption or a hang is
//! reported as an error instead:
//!
//! - writing a region or descriptor set referenced by a pending submission
//! - recording or destroying a sequence that is pending execution
//! - submitting with a fence that was not reset
//! - waiting on a fence no submission will signal
//! - submitting a sequence whose bound descriptors were rewritten since it
//!   was recorded (unless the binding updates after bind)
//! - submitting a sequence that references destroyed objects
//! - recreating the swapchain while framebuffers or submissions are alive
//!
//! Tests drive swapchain invalidation through
//! [`invalidate_swapchain`](HeadlessBackend::invalidate_swapchain) and
//! [`invalidate_swapchain_at_present`](HeadlessBackend::invalidate_swapchain_at_present).

use std::collections::{HashMap, HashSet};

use ash::vk;
use bytemuck::Pod;
use tracing::debug;

use crate::backend::{
    FramebufferDesc, GraphicsPipelineDesc, ImageDesc, PipelineLayoutDesc, RenderBackend,
    SwapchainStatus,
};
use crate::command::{Command, CommandList};
use crate::descriptor::DescriptorBinding;
use crate::error::{RhiError, RhiResult};
use crate::handle::{
    CommandSequenceHandle, DescriptorSetHandle, DescriptorSetLayoutHandle, FenceHandle,
    FramebufferHandle, ImageHandle, MeshHandle, PipelineHandle, PipelineLayoutHandle,
    RegionHandle, SemaphoreHandle,
};

/// Something observable the backend did, in call order.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BackendEvent {
    /// Bytes were written into a region.
    RegionWritten {
        /// Target region.
        region: RegionHandle,
        /// Byte offset.
        offset: u64,
        /// Number of bytes.
        len: usize,
    },
    /// A uniform buffer binding was pointed at a region.
    BufferDescriptorWritten {
        /// Descriptor set.
        set: DescriptorSetHandle,
        /// Binding index.
        binding: u32,
        /// Bound region.
        region: RegionHandle,
    },
    /// One element of an image array binding was written.
    ImageDescriptorWritten {
        /// Descriptor set.
        set: DescriptorSetHandle,
        /// Binding index.
        binding: u32,
        /// Array element.
        array_element: u32,
        /// Bound image.
        image: ImageHandle,
    },
    /// A command sequence was (re-)recorded.
    Recorded(CommandSequenceHandle),
    /// A command sequence was submitted.
    Submitted {
        /// Submitted sequence.
        sequence: CommandSequenceHandle,
        /// Fence signaled on completion.
        fence: FenceHandle,
    },
    /// A swapchain image was presented.
    Presented {
        /// Slot the image is paired with.
        slot: usize,
    },
    /// The swapchain was recreated with a new extent.
    SwapchainRecreated(vk::Extent2D),
    /// The device drained all pending work.
    WaitIdle,
}

/// Counters over the backend's lifetime.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct HeadlessStats {
    /// Region writes.
    pub region_writes: usize,
    /// Descriptor writes of either kind.
    pub descriptor_writes: usize,
    /// Command sequence recordings.
    pub records: usize,
    /// Queue submissions.
    pub submits: usize,
    /// Presentations, including out-of-date ones.
    pub presents: usize,
    /// Swapchain recreations.
    pub swapchain_recreations: usize,
    /// Graphics pipelines created.
    pub pipelines_created: usize,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum FenceState {
    Signaled,
    Unsignaled,
    Pending,
}

struct BindingState {
    desc: DescriptorBinding,
    region: Option<RegionHandle>,
    images: Vec<Option<ImageHandle>>,
}

struct DescriptorSet {
    bindings: Vec<BindingState>,
}

impl DescriptorSet {
    fn binding_mut(&mut self, binding: u32) -> Option<&mut BindingState> {
        self.bindings.iter_mut().find(|b| b.desc.binding == binding)
    }

    fn binding(&self, binding: u32) -> Option<&BindingState> {
        self.bindings.iter().find(|b| b.desc.binding == binding)
    }
}

#[derive(Default)]
struct Sequence {
    commands: Option<CommandList>,
    record_count: usize,
    stale: Option<String>,
}

#[derive(Default)]
struct Submission {
    sequence: Option<CommandSequenceHandle>,
    fence: Option<FenceHandle>,
    regions: HashSet<RegionHandle>,
    images: HashSet<ImageHandle>,
    sets: HashSet<DescriptorSetHandle>,
    framebuffers: HashSet<FramebufferHandle>,
    pipelines: HashSet<PipelineHandle>,
}

/// A [`RenderBackend`] backed by host memory.
///
/// # Example
///
/// ```
/// use ash::vk;
/// use inflight_rhi::RenderBackend;
/// use inflight_rhi::headless::HeadlessBackend;
///
/// let mut backend = HeadlessBackend::new(vk::Extent2D { width: 640, height: 480 }, 2);
/// let region = backend.create_region(16, vk::BufferUsageFlags::UNIFORM_BUFFER).unwrap();
/// backend.write_region(region, 0, &[1, 2, 3, 4]).unwrap();
/// assert_eq!(&backend.region_bytes(region).unwrap()[..4], &[1, 2, 3, 4]);
/// ```
pub struct HeadlessBackend {
    next_id: u64,
    extent: vk::Extent2D,
    image_count: usize,
    acquired: Vec<bool>,
    out_of_date: bool,
    next_extent: Option<vk::Extent2D>,
    present_failure: Option<vk::Extent2D>,

    regions: HashMap<RegionHandle, Vec<u8>>,
    images: HashMap<ImageHandle, ImageDesc>,
    textures: HashSet<ImageHandle>,
    framebuffers: HashMap<FramebufferHandle, FramebufferDesc>,
    set_layouts: HashMap<DescriptorSetLayoutHandle, Vec<DescriptorBinding>>,
    pipeline_layouts: HashMap<PipelineLayoutHandle, PipelineLayoutDesc>,
    pipelines: HashMap<PipelineHandle, GraphicsPipelineDesc>,
    sets: HashMap<DescriptorSetHandle, DescriptorSet>,
    sequences: HashMap<CommandSequenceHandle, Sequence>,
    fences: HashMap<FenceHandle, FenceState>,
    semaphores: HashMap<SemaphoreHandle, bool>,
    meshes: HashMap<MeshHandle, u32>,

    pending: Vec<Submission>,
    events: Vec<BackendEvent>,
    stats: HeadlessStats,
}

impl HeadlessBackend {
    /// Creates a backend with a swapchain of `image_count` images.
    pub fn new(extent: vk::Extent2D, image_count: usize) -> Self {
        Self {
            next_id: 1,
            extent,
            image_count,
            acquired: vec![false; image_count],
            out_of_date: false,
            next_extent: None,
            present_failure: None,
            regions: HashMap::new(),
            images: HashMap::new(),
            textures: HashSet::new(),
            framebuffers: HashMap::new(),
            set_layouts: HashMap::new(),
            pipeline_layouts: HashMap::new(),
            pipelines: HashMap::new(),
            sets: HashMap::new(),
            sequences: HashMap::new(),
            fences: HashMap::new(),
            semaphores: HashMap::new(),
            meshes: HashMap::new(),
            pending: Vec::new(),
            events: Vec::new(),
            stats: HeadlessStats::default(),
        }
    }

    fn alloc_id(&mut self) -> u64 {
        let id = self.next_id;
        self.next_id += 1;
        id
    }

    // ---- Test hooks ----

    /// Makes the next [`begin_frame`](RenderBackend::begin_frame) report
    /// out-of-date; the swapchain takes `extent` when recreated.
    pub fn invalidate_swapchain(&mut self, extent: vk::Extent2D) {
        debug!("Swapchain invalidated, next extent {}x{}", extent.width, extent.height);
        self.out_of_date = true;
        self.next_extent = Some(extent);
    }

    /// Makes the next [`present`](RenderBackend::present) report
    /// out-of-date; the swapchain takes `extent` when recreated.
    pub fn invalidate_swapchain_at_present(&mut self, extent: vk::Extent2D) {
        self.present_failure = Some(extent);
    }

    /// Registers uploaded mesh data with `index_count` indices.
    pub fn register_mesh(&mut self, index_count: u32) -> MeshHandle {
        let mesh = MeshHandle::from_raw(self.alloc_id());
        self.meshes.insert(mesh, index_count);
        mesh
    }

    /// Creates a sampled texture image owned by the caller.
    pub fn create_texture(&mut self, extent: vk::Extent2D) -> ImageHandle {
        let image = ImageHandle::from_raw(self.alloc_id());
        self.images
            .insert(image, ImageDesc::sampled(extent, vk::Format::R8G8B8A8_SRGB));
        self.textures.insert(image);
        image
    }

    // ---- Inspection ----

    /// Raw contents of a region.
    pub fn region_bytes(&self, region: RegionHandle) -> Option<&[u8]> {
        self.regions.get(&region).map(Vec::as_slice)
    }

    /// Contents of a region as a sequence of `T`.
    pub fn read_region<T: Pod>(&self, region: RegionHandle) -> Option<Vec<T>> {
        let bytes = self.regions.get(&region)?;
        Some(
            bytes
                .chunks_exact(std::mem::size_of::<T>())
                .map(bytemuck::pod_read_unaligned)
                .collect(),
        )
    }

    /// Commands last recorded into `sequence`.
    pub fn recorded_commands(&self, sequence: CommandSequenceHandle) -> Option<&CommandList> {
        self.sequences.get(&sequence)?.commands.as_ref()
    }

    /// Number of times `sequence` was recorded.
    pub fn record_count(&self, sequence: CommandSequenceHandle) -> usize {
        self.sequences
            .get(&sequence)
            .map_or(0, |s| s.record_count)
    }

    /// Region bound to a uniform buffer binding.
    pub fn bound_region(&self, set: DescriptorSetHandle, binding: u32) -> Option<RegionHandle> {
        self.sets.get(&set)?.binding(binding)?.region
    }

    /// Image bound to one element of an image array binding.
    pub fn bound_image(
        &self,
        set: DescriptorSetHandle,
        binding: u32,
        array_element: u32,
    ) -> Option<ImageHandle> {
        let state = self.sets.get(&set)?.binding(binding)?;
        state
            .images
            .get(array_element as usize)
            .copied()
            .flatten()
    }

    /// Description a pipeline was created with.
    pub fn pipeline_desc(&self, pipeline: PipelineHandle) -> Option<&GraphicsPipelineDesc> {
        self.pipelines.get(&pipeline)
    }

    /// Number of live graphics pipelines.
    pub fn pipeline_count(&self) -> usize {
        self.pipelines.len()
    }

    /// Number of live framebuffers.
    pub fn framebuffer_count(&self) -> usize {
        self.framebuffers.len()
    }

    /// Number of submissions not yet completed.
    pub fn pending_submissions(&self) -> usize {
        self.pending.len()
    }

    /// Objects created through the trait and not yet destroyed.
    ///
    /// Textures and meshes registered through the test hooks are not counted.
    pub fn live_objects(&self) -> usize {
        self.regions.len()
            + (self.images.len() - self.textures.len())
            + self.framebuffers.len()
            + self.set_layouts.len()
            + self.pipeline_layouts.len()
            + self.pipelines.len()
            + self.sets.len()
            + self.sequences.len()
            + self.fences.len()
            + self.semaphores.len()
    }

    /// Event log in call order.
    pub fn events(&self) -> &[BackendEvent] {
        &self.events
    }

    /// Clears the event log.
    pub fn clear_events(&mut self) {
        self.events.clear();
    }

    /// Lifetime counters.
    pub fn stats(&self) -> HeadlessStats {
        self.stats
    }

    // ---- Validation helpers ----

    fn region_in_use(&self, region: RegionHandle) -> bool {
        self.pending.iter().any(|s| s.regions.contains(&region))
    }

    fn set_in_use(&self, set: DescriptorSetHandle) -> bool {
        self.pending.iter().any(|s| s.sets.contains(&set))
    }

    fn sequence_in_use(&self, sequence: CommandSequenceHandle) -> bool {
        self.pending.iter().any(|s| s.sequence == Some(sequence))
    }

    fn complete_fence(&mut self, fence: FenceHandle) {
        self.pending.retain(|s| s.fence != Some(fence));
        self.fences.insert(fence, FenceState::Signaled);
    }

    fn stale_sequences_binding(&mut self, set: DescriptorSetHandle, binding: u32) {
        for (handle, sequence) in &mut self.sequences {
            let binds_set = sequence
                .commands
                .as_ref()
                .is_some_and(|c| c.descriptor_sets().any(|s| s == set));
            if binds_set {
                debug!("{handle} invalidated by write to {set} binding {binding}");
                sequence.stale = Some(format!("{set} binding {binding} was rewritten"));
            }
        }
    }

    fn validate_commands(&self, commands: &CommandList) -> RhiResult<()> {
        for command in commands.commands() {
            match command {
                Command::BeginRenderPass {
                    framebuffer,
                    extent,
                    ..
                } => {
                    let desc = self
                        .framebuffers
                        .get(framebuffer)
                        .ok_or_else(|| RhiError::InvalidHandle(framebuffer.to_string()))?;
                    if desc.extent != *extent {
                        return Err(RhiError::InvalidHandle(format!(
                            "{framebuffer} is {}x{}, render pass is {}x{}",
                            desc.extent.width, desc.extent.height, extent.width, extent.height
                        )));
                    }
                }
                Command::BindPipeline(pipeline) => {
                    if !self.pipelines.contains_key(pipeline) {
                        return Err(RhiError::InvalidHandle(pipeline.to_string()));
                    }
                }
                Command::BindDescriptorSet { layout, set } => {
                    if !self.pipeline_layouts.contains_key(layout) {
                        return Err(RhiError::InvalidHandle(layout.to_string()));
                    }
                    if !self.sets.contains_key(set) {
                        return Err(RhiError::InvalidHandle(set.to_string()));
                    }
                }
                Command::PushConstants {
                    layout,
                    stages,
                    offset,
                    data,
                } => {
                    let desc = self
                        .pipeline_layouts
                        .get(layout)
                        .ok_or_else(|| RhiError::InvalidHandle(layout.to_string()))?;
                    check_push_constant_range(desc, *stages, *offset, data.len())?;
                }
                Command::DrawMesh { mesh, index_count } => {
                    let available = self
                        .meshes
                        .get(mesh)
                        .ok_or_else(|| RhiError::InvalidHandle(mesh.to_string()))?;
                    if index_count > available {
                        return Err(RhiError::OutOfBounds {
                            offset: 0,
                            len: u64::from(*index_count),
                            size: u64::from(*available),
                        });
                    }
                }
                Command::EndRenderPass => {}
            }
        }
        Ok(())
    }

    fn build_submission(&self, commands: &CommandList) -> RhiResult<Submission> {
        let mut submission = Submission::default();
        for command in commands.commands() {
            match command {
                Command::BeginRenderPass { framebuffer, .. } => {
                    let desc = self
                        .framebuffers
                        .get(framebuffer)
                        .ok_or_else(|| RhiError::InvalidHandle(framebuffer.to_string()))?;
                    submission.framebuffers.insert(*framebuffer);
                    submission.images.insert(desc.depth);
                }
                Command::BindPipeline(pipeline) => {
                    if !self.pipelines.contains_key(pipeline) {
                        return Err(RhiError::InvalidHandle(pipeline.to_string()));
                    }
                    submission.pipelines.insert(*pipeline);
                }
                Command::BindDescriptorSet { set, .. } => {
                    let state = self
                        .sets
                        .get(set)
                        .ok_or_else(|| RhiError::InvalidHandle(set.to_string()))?;
                    submission.sets.insert(*set);
                    for binding in &state.bindings {
                        if let Some(region) = binding.region {
                            if !self.regions.contains_key(&region) {
                                return Err(RhiError::InvalidHandle(region.to_string()));
                            }
                            submission.regions.insert(region);
                        }
                        for image in binding.images.iter().flatten() {
                            if !self.images.contains_key(image) {
                                return Err(RhiError::InvalidHandle(image.to_string()));
                            }
                            submission.images.insert(*image);
                        }
                    }
                }
                Command::DrawMesh { mesh, .. } => {
                    if !self.meshes.contains_key(mesh) {
                        return Err(RhiError::InvalidHandle(mesh.to_string()));
                    }
                }
                Command::PushConstants { .. } | Command::EndRenderPass => {}
            }
        }
        Ok(submission)
    }
}

fn check_push_constant_range(
    layout: &PipelineLayoutDesc,
    stages: vk::ShaderStageFlags,
    offset: u32,
    len: usize,
) -> RhiResult<()> {
    let end = u64::from(offset) + len as u64;
    let covered = layout.push_constant_ranges.iter().any(|range| {
        range.stage_flags.contains(stages)
            && range.offset <= offset
            && end <= u64::from(range.offset) + u64::from(range.size)
    });
    if covered {
        Ok(())
    } else {
        let size = layout
            .push_constant_ranges
            .iter()
            .filter(|range| range.stage_flags.contains(stages))
            .map(|range| u64::from(range.offset) + u64::from(range.size))
            .max()
            .unwrap_or(0);
        Err(RhiError::OutOfBounds {
            offset: u64::from(offset),
            len: len as u64,
            size,
        })
    }
}

impl RenderBackend for HeadlessBackend {
    fn create_region(
        &mut self,
        size: u64,
        _usage: vk::BufferUsageFlags,
    ) -> RhiResult<RegionHandle> {
        let len = usize::try_from(size)
            .map_err(|_| RhiError::VulkanError(vk::Result::ERROR_OUT_OF_HOST_MEMORY))?;
        let region = RegionHandle::from_raw(self.alloc_id());
        self.regions.insert(region, vec![0; len]);
        debug!("{region} created ({size} bytes)");
        Ok(region)
    }

    fn write_region(&mut self, region: RegionHandle, offset: u64, data: &[u8]) -> RhiResult<()> {
        if self.region_in_use(region) {
            return Err(RhiError::ResourceInUse(region.to_string()));
        }
        let bytes = self
            .regions
            .get_mut(&region)
            .ok_or_else(|| RhiError::InvalidHandle(region.to_string()))?;
        let size = bytes.len() as u64;
        let end = offset + data.len() as u64;
        if end > size {
            return Err(RhiError::OutOfBounds {
                offset,
                len: data.len() as u64,
                size,
            });
        }
        // `end <= size` and `size` came from a usize
        bytes[offset as usize..end as usize].copy_from_slice(data);

        self.stats.region_writes += 1;
        self.events.push(BackendEvent::RegionWritten {
            region,
            offset,
            len: data.len(),
        });
        Ok(())
    }

    fn destroy_region(&mut self, region: RegionHandle) -> RhiResult<()> {
        if self.region_in_use(region) {
            return Err(RhiError::ResourceInUse(region.to_string()));
        }
        self.regions
            .remove(&region)
            .map(|_| ())
            .ok_or_else(|| RhiError::InvalidHandle(region.to_string()))
    }

    fn create_image(&mut self, desc: &ImageDesc) -> RhiResult<ImageHandle> {
        let image = ImageHandle::from_raw(self.alloc_id());
        self.images.insert(image, *desc);
        Ok(image)
    }

    fn destroy_image(&mut self, image: ImageHandle) -> RhiResult<()> {
        if self.framebuffers.values().any(|fb| fb.depth == image)
            || self.pending.iter().any(|s| s.images.contains(&image))
        {
            return Err(RhiError::ResourceInUse(image.to_string()));
        }
        self.textures.remove(&image);
        self.images
            .remove(&image)
            .map(|_| ())
            .ok_or_else(|| RhiError::InvalidHandle(image.to_string()))
    }

    fn create_framebuffer(&mut self, desc: &FramebufferDesc) -> RhiResult<FramebufferHandle> {
        if desc.image_index >= self.image_count {
            return Err(RhiError::InvalidHandle(format!(
                "swapchain image {}",
                desc.image_index
            )));
        }
        if !self.images.contains_key(&desc.depth) {
            return Err(RhiError::InvalidHandle(desc.depth.to_string()));
        }
        if desc.extent != self.extent {
            return Err(RhiError::SwapchainBusy(format!(
                "framebuffer extent {}x{} does not match swapchain {}x{}",
                desc.extent.width, desc.extent.height, self.extent.width, self.extent.height
            )));
        }
        let framebuffer = FramebufferHandle::from_raw(self.alloc_id());
        self.framebuffers.insert(framebuffer, *desc);
        Ok(framebuffer)
    }

    fn destroy_framebuffer(&mut self, framebuffer: FramebufferHandle) -> RhiResult<()> {
        if self
            .pending
            .iter()
            .any(|s| s.framebuffers.contains(&framebuffer))
        {
            return Err(RhiError::ResourceInUse(framebuffer.to_string()));
        }
        self.framebuffers
            .remove(&framebuffer)
            .map(|_| ())
            .ok_or_else(|| RhiError::InvalidHandle(framebuffer.to_string()))
    }

    fn create_descriptor_set_layout(
        &mut self,
        bindings: &[DescriptorBinding],
    ) -> RhiResult<DescriptorSetLayoutHandle> {
        let layout = DescriptorSetLayoutHandle::from_raw(self.alloc_id());
        self.set_layouts.insert(layout, bindings.to_vec());
        Ok(layout)
    }

    fn destroy_descriptor_set_layout(
        &mut self,
        layout: DescriptorSetLayoutHandle,
    ) -> RhiResult<()> {
        self.set_layouts
            .remove(&layout)
            .map(|_| ())
            .ok_or_else(|| RhiError::InvalidHandle(layout.to_string()))
    }

    fn create_pipeline_layout(
        &mut self,
        desc: &PipelineLayoutDesc,
    ) -> RhiResult<PipelineLayoutHandle> {
        if let Some(missing) = desc
            .set_layouts
            .iter()
            .find(|l| !self.set_layouts.contains_key(l))
        {
            return Err(RhiError::InvalidHandle(missing.to_string()));
        }
        let layout = PipelineLayoutHandle::from_raw(self.alloc_id());
        self.pipeline_layouts.insert(layout, desc.clone());
        Ok(layout)
    }

    fn destroy_pipeline_layout(&mut self, layout: PipelineLayoutHandle) -> RhiResult<()> {
        self.pipeline_layouts
            .remove(&layout)
            .map(|_| ())
            .ok_or_else(|| RhiError::InvalidHandle(layout.to_string()))
    }

    fn create_graphics_pipeline(
        &mut self,
        desc: &GraphicsPipelineDesc,
    ) -> RhiResult<PipelineHandle> {
        if !self.pipeline_layouts.contains_key(&desc.layout) {
            return Err(RhiError::InvalidHandle(desc.layout.to_string()));
        }
        let pipeline = PipelineHandle::from_raw(self.alloc_id());
        self.pipelines.insert(pipeline, desc.clone());
        self.stats.pipelines_created += 1;
        debug!(
            "{pipeline} created ({} vertex attributes, {}x{})",
            desc.vertex_layout.attribute_count(),
            desc.extent.width,
            desc.extent.height
        );
        Ok(pipeline)
    }

    fn destroy_graphics_pipeline(&mut self, pipeline: PipelineHandle) -> RhiResult<()> {
        if self.pending.iter().any(|s| s.pipelines.contains(&pipeline)) {
            return Err(RhiError::ResourceInUse(pipeline.to_string()));
        }
        self.pipelines
            .remove(&pipeline)
            .map(|_| ())
            .ok_or_else(|| RhiError::InvalidHandle(pipeline.to_string()))
    }

    fn allocate_descriptor_set(
        &mut self,
        layout: DescriptorSetLayoutHandle,
    ) -> RhiResult<DescriptorSetHandle> {
        let bindings = self
            .set_layouts
            .get(&layout)
            .ok_or_else(|| RhiError::InvalidHandle(layout.to_string()))?
            .iter()
            .map(|desc| BindingState {
                desc: *desc,
                region: None,
                images: vec![None; desc.count as usize],
            })
            .collect();
        let set = DescriptorSetHandle::from_raw(self.alloc_id());
        self.sets.insert(set, DescriptorSet { bindings });
        Ok(set)
    }

    fn free_descriptor_set(&mut self, set: DescriptorSetHandle) -> RhiResult<()> {
        if self.set_in_use(set) {
            return Err(RhiError::ResourceInUse(set.to_string()));
        }
        self.sets
            .remove(&set)
            .map(|_| ())
            .ok_or_else(|| RhiError::InvalidHandle(set.to_string()))
    }

    fn write_buffer_descriptor(
        &mut self,
        set: DescriptorSetHandle,
        binding: u32,
        region: RegionHandle,
    ) -> RhiResult<()> {
        if self.set_in_use(set) {
            return Err(RhiError::ResourceInUse(set.to_string()));
        }
        if !self.regions.contains_key(&region) {
            return Err(RhiError::InvalidHandle(region.to_string()));
        }
        let state = self
            .sets
            .get_mut(&set)
            .ok_or_else(|| RhiError::InvalidHandle(set.to_string()))?
            .binding_mut(binding)
            .filter(|b| b.desc.ty == vk::DescriptorType::UNIFORM_BUFFER)
            .ok_or_else(|| RhiError::InvalidHandle(format!("{set} uniform binding {binding}")))?;
        state.region = Some(region);
        let updates_after_bind = state.desc.updates_after_bind();

        if !updates_after_bind {
            self.stale_sequences_binding(set, binding);
        }
        self.stats.descriptor_writes += 1;
        self.events.push(BackendEvent::BufferDescriptorWritten {
            set,
            binding,
            region,
        });
        Ok(())
    }

    fn write_image_descriptor(
        &mut self,
        set: DescriptorSetHandle,
        binding: u32,
        array_element: u32,
        image: ImageHandle,
    ) -> RhiResult<()> {
        if self.set_in_use(set) {
            return Err(RhiError::ResourceInUse(set.to_string()));
        }
        if !self.images.contains_key(&image) {
            return Err(RhiError::InvalidHandle(image.to_string()));
        }
        let state = self
            .sets
            .get_mut(&set)
            .ok_or_else(|| RhiError::InvalidHandle(set.to_string()))?
            .binding_mut(binding)
            .filter(|b| b.desc.ty == vk::DescriptorType::COMBINED_IMAGE_SAMPLER)
            .ok_or_else(|| RhiError::InvalidHandle(format!("{set} image binding {binding}")))?;
        let count = state.images.len() as u64;
        let element = state
            .images
            .get_mut(array_element as usize)
            .ok_or(RhiError::OutOfBounds {
                offset: u64::from(array_element),
                len: 1,
                size: count,
            })?;
        *element = Some(image);
        let updates_after_bind = state.desc.updates_after_bind();

        if !updates_after_bind {
            self.stale_sequences_binding(set, binding);
        }
        self.stats.descriptor_writes += 1;
        self.events.push(BackendEvent::ImageDescriptorWritten {
            set,
            binding,
            array_element,
            image,
        });
        Ok(())
    }

    fn create_command_sequence(&mut self) -> RhiResult<CommandSequenceHandle> {
        let sequence = CommandSequenceHandle::from_raw(self.alloc_id());
        self.sequences.insert(sequence, Sequence::default());
        Ok(sequence)
    }

    fn record_command_sequence(
        &mut self,
        sequence: CommandSequenceHandle,
        commands: &CommandList,
    ) -> RhiResult<()> {
        if self.sequence_in_use(sequence) {
            return Err(RhiError::ResourceInUse(sequence.to_string()));
        }
        self.validate_commands(commands)?;
        let state = self
            .sequences
            .get_mut(&sequence)
            .ok_or_else(|| RhiError::InvalidHandle(sequence.to_string()))?;
        state.commands = Some(commands.clone());
        state.record_count += 1;
        state.stale = None;

        self.stats.records += 1;
        self.events.push(BackendEvent::Recorded(sequence));
        Ok(())
    }

    fn destroy_command_sequence(&mut self, sequence: CommandSequenceHandle) -> RhiResult<()> {
        if self.sequence_in_use(sequence) {
            return Err(RhiError::ResourceInUse(sequence.to_string()));
        }
        self.sequences
            .remove(&sequence)
            .map(|_| ())
            .ok_or_else(|| RhiError::InvalidHandle(sequence.to_string()))
    }

    fn create_fence(&mut self, signaled: bool) -> RhiResult<FenceHandle> {
        let fence = FenceHandle::from_raw(self.alloc_id());
        let state = if signaled {
            FenceState::Signaled
        } else {
            FenceState::Unsignaled
        };
        self.fences.insert(fence, state);
        Ok(fence)
    }

    fn wait_for_fence(&mut self, fence: FenceHandle, _timeout_ns: u64) -> RhiResult<()> {
        match self.fences.get(&fence) {
            None => Err(RhiError::InvalidHandle(fence.to_string())),
            Some(FenceState::Signaled) => Ok(()),
            Some(FenceState::Unsignaled) => Err(RhiError::FenceNeverSignaled(fence.raw())),
            Some(FenceState::Pending) => {
                self.complete_fence(fence);
                Ok(())
            }
        }
    }

    fn reset_fence(&mut self, fence: FenceHandle) -> RhiResult<()> {
        match self.fences.get_mut(&fence) {
            None => Err(RhiError::InvalidHandle(fence.to_string())),
            Some(FenceState::Pending) => Err(RhiError::ResourceInUse(fence.to_string())),
            Some(state) => {
                *state = FenceState::Unsignaled;
                Ok(())
            }
        }
    }

    fn destroy_fence(&mut self, fence: FenceHandle) -> RhiResult<()> {
        match self.fences.get(&fence) {
            None => Err(RhiError::InvalidHandle(fence.to_string())),
            Some(FenceState::Pending) => Err(RhiError::ResourceInUse(fence.to_string())),
            Some(_) => {
                self.fences.remove(&fence);
                Ok(())
            }
        }
    }

    fn create_semaphore(&mut self) -> RhiResult<SemaphoreHandle> {
        let semaphore = SemaphoreHandle::from_raw(self.alloc_id());
        self.semaphores.insert(semaphore, false);
        Ok(semaphore)
    }

    fn destroy_semaphore(&mut self, semaphore: SemaphoreHandle) -> RhiResult<()> {
        self.semaphores
            .remove(&semaphore)
            .map(|_| ())
            .ok_or_else(|| RhiError::InvalidHandle(semaphore.to_string()))
    }

    fn begin_frame(&mut self, slot: usize) -> RhiResult<SwapchainStatus> {
        if slot >= self.image_count {
            return Err(RhiError::InvalidHandle(format!("swapchain image {slot}")));
        }
        if self.out_of_date {
            return Ok(SwapchainStatus::OutOfDate);
        }
        if self.acquired[slot] {
            return Err(RhiError::SwapchainBusy(format!(
                "swapchain image {slot} already acquired"
            )));
        }
        self.acquired[slot] = true;
        Ok(SwapchainStatus::Ready)
    }

    fn submit(
        &mut self,
        sequence: CommandSequenceHandle,
        signal: SemaphoreHandle,
        fence: FenceHandle,
    ) -> RhiResult<()> {
        match self.fences.get(&fence) {
            None => return Err(RhiError::InvalidHandle(fence.to_string())),
            Some(FenceState::Signaled) => return Err(RhiError::FenceNotReset(fence.raw())),
            Some(FenceState::Pending) => return Err(RhiError::ResourceInUse(fence.to_string())),
            Some(FenceState::Unsignaled) => {}
        }
        match self.semaphores.get(&signal) {
            None => return Err(RhiError::InvalidHandle(signal.to_string())),
            Some(true) => {
                return Err(RhiError::ResourceInUse(format!(
                    "{signal} still signaled"
                )));
            }
            Some(false) => {}
        }
        if self.sequence_in_use(sequence) {
            return Err(RhiError::ResourceInUse(sequence.to_string()));
        }
        let state = self
            .sequences
            .get(&sequence)
            .ok_or_else(|| RhiError::InvalidHandle(sequence.to_string()))?;
        if let Some(reason) = &state.stale {
            return Err(RhiError::StaleCommandSequence(format!("{sequence}: {reason}")));
        }
        let commands = state.commands.as_ref().ok_or_else(|| {
            RhiError::StaleCommandSequence(format!("{sequence} was never recorded"))
        })?;

        let mut submission = self.build_submission(commands)?;
        submission.sequence = Some(sequence);
        submission.fence = Some(fence);
        self.pending.push(submission);
        self.fences.insert(fence, FenceState::Pending);
        self.semaphores.insert(signal, true);

        self.stats.submits += 1;
        self.events
            .push(BackendEvent::Submitted { sequence, fence });
        Ok(())
    }

    fn present(&mut self, slot: usize, wait: SemaphoreHandle) -> RhiResult<SwapchainStatus> {
        if !self.acquired.get(slot).copied().unwrap_or(false) {
            return Err(RhiError::InvalidHandle(format!(
                "swapchain image {slot} presented without being acquired"
            )));
        }
        match self.semaphores.get_mut(&wait) {
            None => return Err(RhiError::InvalidHandle(wait.to_string())),
            Some(false) => {
                return Err(RhiError::InvalidHandle(format!(
                    "{wait} waited on but never signaled"
                )));
            }
            Some(signaled) => *signaled = false,
        }
        self.acquired[slot] = false;
        self.stats.presents += 1;
        self.events.push(BackendEvent::Presented { slot });

        if let Some(extent) = self.present_failure.take() {
            self.out_of_date = true;
            self.next_extent = Some(extent);
            return Ok(SwapchainStatus::OutOfDate);
        }
        Ok(SwapchainStatus::Ready)
    }

    fn swapchain_extent(&self) -> vk::Extent2D {
        self.extent
    }

    fn swapchain_format(&self) -> vk::Format {
        vk::Format::B8G8R8A8_SRGB
    }

    fn depth_format(&self) -> vk::Format {
        vk::Format::D32_SFLOAT
    }

    fn swapchain_image_count(&self) -> usize {
        self.image_count
    }

    fn recreate_swapchain(&mut self) -> RhiResult<()> {
        if !self.framebuffers.is_empty() {
            return Err(RhiError::SwapchainBusy(format!(
                "{} framebuffers still alive",
                self.framebuffers.len()
            )));
        }
        if !self.pending.is_empty() {
            return Err(RhiError::SwapchainBusy(format!(
                "{} submissions still pending",
                self.pending.len()
            )));
        }
        if let Some(extent) = self.next_extent.take() {
            self.extent = extent;
        }
        self.out_of_date = false;
        self.acquired.iter_mut().for_each(|a| *a = false);

        self.stats.swapchain_recreations += 1;
        self.events
            .push(BackendEvent::SwapchainRecreated(self.extent));
        debug!(
            "Swapchain recreated at {}x{}",
            self.extent.width, self.extent.height
        );
        Ok(())
    }

    fn wait_idle(&mut self) -> RhiResult<()> {
        let fences: Vec<FenceHandle> = self.pending.iter().filter_map(|s| s.fence).collect();
        for fence in fences {
            self.complete_fence(fence);
        }
        self.events.push(BackendEvent::WaitIdle);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const EXTENT: vk::Extent2D = vk::Extent2D {
        width: 320,
        height: 240,
    };

    struct Fixture {
        backend: HeadlessBackend,
        region: RegionHandle,
        set: DescriptorSetHandle,
        layout: PipelineLayoutHandle,
        sequence: CommandSequenceHandle,
        fence: FenceHandle,
        semaphore: SemaphoreHandle,
    }

    fn fixture() -> Fixture {
        let mut backend = HeadlessBackend::new(EXTENT, 2);
        let set_layout = backend
            .create_descriptor_set_layout(&[
                DescriptorBinding::uniform_buffer(0, vk::ShaderStageFlags::VERTEX),
                DescriptorBinding::combined_image_sampler_array(
                    1,
                    4,
                    vk::ShaderStageFlags::FRAGMENT,
                )
                .partially_bound(),
            ])
            .unwrap();
        let layout = backend
            .create_pipeline_layout(&PipelineLayoutDesc {
                set_layouts: vec![set_layout],
                push_constant_ranges: vec![vk::PushConstantRange {
                    stage_flags: vk::ShaderStageFlags::VERTEX,
                    offset: 0,
                    size: 4,
                }],
            })
            .unwrap();
        let region = backend
            .create_region(64, vk::BufferUsageFlags::UNIFORM_BUFFER)
            .unwrap();
        let set = backend.allocate_descriptor_set(set_layout).unwrap();
        backend.write_buffer_descriptor(set, 0, region).unwrap();

        let sequence = backend.create_command_sequence().unwrap();
        let mut list = CommandList::new();
        list.bind_descriptor_set(layout, set);
        backend.record_command_sequence(sequence, &list).unwrap();

        let fence = backend.create_fence(true).unwrap();
        let semaphore = backend.create_semaphore().unwrap();
        Fixture {
            backend,
            region,
            set,
            layout,
            sequence,
            fence,
            semaphore,
        }
    }

    #[test]
    fn test_submit_requires_reset_fence() {
        let mut f = fixture();
        let err = f.backend.submit(f.sequence, f.semaphore, f.fence).unwrap_err();
        assert!(matches!(err, RhiError::FenceNotReset(_)));

        f.backend.reset_fence(f.fence).unwrap();
        f.backend.submit(f.sequence, f.semaphore, f.fence).unwrap();
        assert_eq!(f.backend.pending_submissions(), 1);
    }

    #[test]
    fn test_region_write_rejected_while_pending() {
        let mut f = fixture();
        f.backend.reset_fence(f.fence).unwrap();
        f.backend.submit(f.sequence, f.semaphore, f.fence).unwrap();

        let err = f.backend.write_region(f.region, 0, &[0; 4]).unwrap_err();
        assert!(matches!(err, RhiError::ResourceInUse(_)));

        f.backend.wait_for_fence(f.fence, u64::MAX).unwrap();
        f.backend.write_region(f.region, 0, &[0; 4]).unwrap();
    }

    #[test]
    fn test_wait_on_unsubmitted_fence_fails() {
        let mut f = fixture();
        f.backend.reset_fence(f.fence).unwrap();
        let err = f.backend.wait_for_fence(f.fence, u64::MAX).unwrap_err();
        assert!(matches!(err, RhiError::FenceNeverSignaled(_)));
    }

    #[test]
    fn test_buffer_descriptor_rewrite_stales_sequence() {
        let mut f = fixture();
        let other = f
            .backend
            .create_region(64, vk::BufferUsageFlags::UNIFORM_BUFFER)
            .unwrap();
        f.backend.write_buffer_descriptor(f.set, 0, other).unwrap();
        f.backend.reset_fence(f.fence).unwrap();

        let err = f.backend.submit(f.sequence, f.semaphore, f.fence).unwrap_err();
        assert!(matches!(err, RhiError::StaleCommandSequence(_)));
    }

    #[test]
    fn test_update_after_bind_keeps_sequence_valid() {
        let mut f = fixture();
        let texture = f.backend.create_texture(EXTENT);
        f.backend.write_image_descriptor(f.set, 1, 3, texture).unwrap();
        f.backend.reset_fence(f.fence).unwrap();

        f.backend.submit(f.sequence, f.semaphore, f.fence).unwrap();
        assert_eq!(f.backend.bound_image(f.set, 1, 3), Some(texture));
    }

    #[test]
    fn test_image_element_out_of_bounds() {
        let mut f = fixture();
        let texture = f.backend.create_texture(EXTENT);
        let err = f
            .backend
            .write_image_descriptor(f.set, 1, 4, texture)
            .unwrap_err();
        assert!(matches!(err, RhiError::OutOfBounds { size: 4, .. }));
    }

    #[test]
    fn test_push_constants_outside_range_rejected() {
        let mut f = fixture();
        let mut list = CommandList::new();
        list.push_constants(f.layout, vk::ShaderStageFlags::FRAGMENT, 0, &1u32);
        let err = f
            .backend
            .record_command_sequence(f.sequence, &list)
            .unwrap_err();
        assert!(matches!(err, RhiError::OutOfBounds { .. }));
    }

    #[test]
    fn test_recreate_swapchain_requires_no_framebuffers() {
        let mut backend = HeadlessBackend::new(EXTENT, 2);
        let depth = backend
            .create_image(&ImageDesc::depth(EXTENT, backend.depth_format()))
            .unwrap();
        let framebuffer = backend
            .create_framebuffer(&FramebufferDesc {
                image_index: 0,
                depth,
                extent: EXTENT,
            })
            .unwrap();

        let next = vk::Extent2D {
            width: 640,
            height: 480,
        };
        backend.invalidate_swapchain(next);
        assert_eq!(backend.begin_frame(0).unwrap(), SwapchainStatus::OutOfDate);
        assert!(matches!(
            backend.recreate_swapchain().unwrap_err(),
            RhiError::SwapchainBusy(_)
        ));

        backend.destroy_framebuffer(framebuffer).unwrap();
        backend.recreate_swapchain().unwrap();
        assert_eq!(backend.swapchain_extent(), next);
        assert_eq!(backend.begin_frame(0).unwrap(), SwapchainStatus::Ready);
    }

    #[test]
    fn test_present_requires_signaled_semaphore() {
        let mut f = fixture();
        f.backend.begin_frame(1).unwrap();
        assert!(f.backend.present(1, f.semaphore).is_err());

        f.backend.reset_fence(f.fence).unwrap();
        f.backend.submit(f.sequence, f.semaphore, f.fence).unwrap();
        assert_eq!(
            f.backend.present(1, f.semaphore).unwrap(),
            SwapchainStatus::Ready
        );
        assert_eq!(f.backend.stats().presents, 1);
    }

    #[test]
    fn test_read_region_as_pod() {
        let mut f = fixture();
        f.backend
            .write_region(f.region, 4, bytemuck::bytes_of(&9u32))
            .unwrap();
        let words: Vec<u32> = f.backend.read_region(f.region).unwrap();
        assert_eq!(words.len(), 16);
        assert_eq!(words[1], 9);
    }
}
