//! The device interface consumed by the renderer.
//!
//! [`RenderBackend`] is the narrow surface through which the frame
//! synchronization core reaches the graphics device, queue and swapchain.
//! Every object is referred to through a typed handle (see
//! [`handle`](crate::handle)); the backend owns the native objects.
//!
//! # Frame protocol
//!
//! For a slot `s` the renderer issues, in order:
//!
//! 1. [`wait_for_fence`](RenderBackend::wait_for_fence) on the slot fence
//! 2. [`begin_frame(s)`](RenderBackend::begin_frame) to acquire the paired image
//! 3. region and descriptor writes, optionally a re-record
//! 4. [`reset_fence`](RenderBackend::reset_fence), [`submit`](RenderBackend::submit)
//! 5. [`present(s)`](RenderBackend::present)
//!
//! An [`SwapchainStatus::OutOfDate`] result from `begin_frame` or `present`
//! asks the caller to rebuild its swapchain-dependent objects and call
//! [`recreate_swapchain`](RenderBackend::recreate_swapchain).

use std::path::PathBuf;

use ash::vk;

use crate::command::CommandList;
use crate::descriptor::DescriptorBinding;
use crate::error::RhiResult;
use crate::handle::{
    CommandSequenceHandle, DescriptorSetHandle, DescriptorSetLayoutHandle, FenceHandle,
    FramebufferHandle, ImageHandle, PipelineHandle, PipelineLayoutHandle, RegionHandle,
    SemaphoreHandle,
};
use crate::vertex::VertexLayout;

/// Result of acquiring or presenting a swapchain image.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SwapchainStatus {
    /// The image was acquired or presented.
    Ready,
    /// The swapchain no longer matches the surface and must be recreated.
    OutOfDate,
}

/// Description of an image to create.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ImageDesc {
    /// Image dimensions.
    pub extent: vk::Extent2D,
    /// Pixel format.
    pub format: vk::Format,
    /// Usage flags.
    pub usage: vk::ImageUsageFlags,
    /// Aspect of the default view.
    pub aspect: vk::ImageAspectFlags,
}

impl ImageDesc {
    /// Depth attachment that can also be sampled.
    pub fn depth(extent: vk::Extent2D, format: vk::Format) -> Self {
        Self {
            extent,
            format,
            usage: vk::ImageUsageFlags::DEPTH_STENCIL_ATTACHMENT | vk::ImageUsageFlags::SAMPLED,
            aspect: vk::ImageAspectFlags::DEPTH,
        }
    }

    /// Color image sampled by shaders.
    pub fn sampled(extent: vk::Extent2D, format: vk::Format) -> Self {
        Self {
            extent,
            format,
            usage: vk::ImageUsageFlags::SAMPLED | vk::ImageUsageFlags::TRANSFER_DST,
            aspect: vk::ImageAspectFlags::COLOR,
        }
    }
}

/// Framebuffer over one swapchain image plus the shared depth target.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FramebufferDesc {
    /// Index of the swapchain image used as color attachment.
    pub image_index: usize,
    /// Depth attachment.
    pub depth: ImageHandle,
    /// Framebuffer dimensions; must match the swapchain extent.
    pub extent: vk::Extent2D,
}

/// Pipeline layout description.
#[derive(Clone, Debug, Default)]
pub struct PipelineLayoutDesc {
    /// Descriptor set layouts, by set index.
    pub set_layouts: Vec<DescriptorSetLayoutHandle>,
    /// Push constant ranges.
    pub push_constant_ranges: Vec<vk::PushConstantRange>,
}

/// Graphics pipeline description.
///
/// Shader modules are referenced by path; the backend loads and compiles
/// them.
#[derive(Clone, Debug)]
pub struct GraphicsPipelineDesc {
    /// Layout the pipeline is created against.
    pub layout: PipelineLayoutHandle,
    /// Compiled SPIR-V vertex shader.
    pub vertex_shader: PathBuf,
    /// Compiled SPIR-V fragment shader.
    pub fragment_shader: PathBuf,
    /// Vertex input layout.
    pub vertex_layout: VertexLayout,
    /// Color attachment format.
    pub color_format: vk::Format,
    /// Depth attachment format.
    pub depth_format: vk::Format,
    /// Fixed viewport and scissor extent.
    pub extent: vk::Extent2D,
    /// Front-facing winding.
    pub front_face: vk::FrontFace,
    /// Culled faces.
    pub cull_mode: vk::CullModeFlags,
    /// Rasterization samples.
    pub samples: vk::SampleCountFlags,
}

/// Device, queue and swapchain operations used by the renderer.
///
/// All methods take `&mut self`: the renderer drives a backend from a single
/// control thread. Destroying an object still referenced by unfinished GPU
/// work is an error, not undefined behavior.
pub trait RenderBackend {
    /// Creates a host-visible region of `size` bytes.
    fn create_region(&mut self, size: u64, usage: vk::BufferUsageFlags) -> RhiResult<RegionHandle>;

    /// Overwrites `data.len()` bytes of a region starting at `offset`.
    ///
    /// # Errors
    ///
    /// Fails if the region is referenced by a pending submission or the
    /// write is out of bounds.
    fn write_region(&mut self, region: RegionHandle, offset: u64, data: &[u8]) -> RhiResult<()>;

    /// Destroys a region.
    fn destroy_region(&mut self, region: RegionHandle) -> RhiResult<()>;

    /// Creates an image with a default view.
    fn create_image(&mut self, desc: &ImageDesc) -> RhiResult<ImageHandle>;

    /// Destroys an image and its view.
    fn destroy_image(&mut self, image: ImageHandle) -> RhiResult<()>;

    /// Creates a framebuffer for one swapchain image.
    fn create_framebuffer(&mut self, desc: &FramebufferDesc) -> RhiResult<FramebufferHandle>;

    /// Destroys a framebuffer.
    fn destroy_framebuffer(&mut self, framebuffer: FramebufferHandle) -> RhiResult<()>;

    /// Creates a descriptor set layout.
    fn create_descriptor_set_layout(
        &mut self,
        bindings: &[DescriptorBinding],
    ) -> RhiResult<DescriptorSetLayoutHandle>;

    /// Destroys a descriptor set layout.
    fn destroy_descriptor_set_layout(&mut self, layout: DescriptorSetLayoutHandle)
    -> RhiResult<()>;

    /// Creates a pipeline layout.
    fn create_pipeline_layout(&mut self, desc: &PipelineLayoutDesc)
    -> RhiResult<PipelineLayoutHandle>;

    /// Destroys a pipeline layout.
    fn destroy_pipeline_layout(&mut self, layout: PipelineLayoutHandle) -> RhiResult<()>;

    /// Creates a graphics pipeline.
    fn create_graphics_pipeline(&mut self, desc: &GraphicsPipelineDesc)
    -> RhiResult<PipelineHandle>;

    /// Destroys a graphics pipeline.
    fn destroy_graphics_pipeline(&mut self, pipeline: PipelineHandle) -> RhiResult<()>;

    /// Allocates a descriptor set from `layout`.
    fn allocate_descriptor_set(
        &mut self,
        layout: DescriptorSetLayoutHandle,
    ) -> RhiResult<DescriptorSetHandle>;

    /// Returns a descriptor set to its pool.
    fn free_descriptor_set(&mut self, set: DescriptorSetHandle) -> RhiResult<()>;

    /// Points a uniform buffer binding at a region.
    fn write_buffer_descriptor(
        &mut self,
        set: DescriptorSetHandle,
        binding: u32,
        region: RegionHandle,
    ) -> RhiResult<()>;

    /// Writes one element of an image array binding.
    fn write_image_descriptor(
        &mut self,
        set: DescriptorSetHandle,
        binding: u32,
        array_element: u32,
        image: ImageHandle,
    ) -> RhiResult<()>;

    /// Allocates an empty command sequence.
    fn create_command_sequence(&mut self) -> RhiResult<CommandSequenceHandle>;

    /// Replaces the contents of a command sequence.
    ///
    /// # Errors
    ///
    /// Fails if the sequence is pending execution or the list references
    /// unknown handles.
    fn record_command_sequence(
        &mut self,
        sequence: CommandSequenceHandle,
        commands: &CommandList,
    ) -> RhiResult<()>;

    /// Frees a command sequence.
    fn destroy_command_sequence(&mut self, sequence: CommandSequenceHandle) -> RhiResult<()>;

    /// Creates a fence, optionally in the signaled state.
    fn create_fence(&mut self, signaled: bool) -> RhiResult<FenceHandle>;

    /// Blocks until the fence is signaled or `timeout_ns` elapses.
    fn wait_for_fence(&mut self, fence: FenceHandle, timeout_ns: u64) -> RhiResult<()>;

    /// Returns a signaled fence to the unsignaled state.
    fn reset_fence(&mut self, fence: FenceHandle) -> RhiResult<()>;

    /// Destroys a fence.
    fn destroy_fence(&mut self, fence: FenceHandle) -> RhiResult<()>;

    /// Creates a semaphore.
    fn create_semaphore(&mut self) -> RhiResult<SemaphoreHandle>;

    /// Destroys a semaphore.
    fn destroy_semaphore(&mut self, semaphore: SemaphoreHandle) -> RhiResult<()>;

    /// Acquires the swapchain image paired with `slot`.
    fn begin_frame(&mut self, slot: usize) -> RhiResult<SwapchainStatus>;

    /// Submits a command sequence, signaling `signal` and `fence` on completion.
    fn submit(
        &mut self,
        sequence: CommandSequenceHandle,
        signal: SemaphoreHandle,
        fence: FenceHandle,
    ) -> RhiResult<()>;

    /// Presents the image paired with `slot` once `wait` is signaled.
    fn present(&mut self, slot: usize, wait: SemaphoreHandle) -> RhiResult<SwapchainStatus>;

    /// Current swapchain extent.
    fn swapchain_extent(&self) -> vk::Extent2D;

    /// Swapchain color format.
    fn swapchain_format(&self) -> vk::Format;

    /// Preferred depth attachment format.
    fn depth_format(&self) -> vk::Format;

    /// Number of swapchain images.
    fn swapchain_image_count(&self) -> usize;

    /// Recreates the swapchain against the current surface.
    ///
    /// # Errors
    ///
    /// Fails while framebuffers over the old images are still alive.
    fn recreate_swapchain(&mut self) -> RhiResult<()>;

    /// Blocks until all submitted work has completed.
    fn wait_idle(&mut self) -> RhiResult<()>;
}
