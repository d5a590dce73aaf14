//! Swapchain-dependent targets and their rebuild.
//!
//! When the swapchain is invalidated (resize, surface loss, out-of-date
//! present) everything sized from the swapchain is torn down and recreated:
//!
//! 1. wait for the device to go idle
//! 2. destroy the graphics pipeline (its viewport is baked in)
//! 3. destroy the per-slot framebuffers, then the depth target
//! 4. recreate the swapchain
//! 5. recreate depth target, framebuffers and pipeline at the new extent
//!
//! Resource regions, descriptor sets and dirty tracking are untouched; the
//! caller marks command sequences (and the camera, whose projection aspect
//! follows the extent) dirty afterwards.

use ash::vk;
use tracing::{debug, info, warn};

use inflight_core::{RendererConfig, Winding};
use inflight_rhi::handle::{FramebufferHandle, ImageHandle, PipelineHandle, PipelineLayoutHandle};
use inflight_rhi::{FramebufferDesc, GraphicsPipelineDesc, ImageDesc, RenderBackend, VertexLayout};

use crate::error::{RendererError, RendererResult};

/// Depth target plus one framebuffer per slot.
#[derive(Debug)]
pub struct SwapchainTargets {
    extent: vk::Extent2D,
    depth: Option<ImageHandle>,
    framebuffers: Vec<FramebufferHandle>,
}

impl SwapchainTargets {
    /// Creates the targets for the backend's current swapchain.
    ///
    /// # Errors
    ///
    /// Returns [`RendererError::SlotImageMismatch`] unless the swapchain has
    /// exactly `slots` images, and any backend error from creation.
    pub fn create<B: RenderBackend>(backend: &mut B, slots: usize) -> RendererResult<Self> {
        let images = backend.swapchain_image_count();
        if images != slots {
            return Err(RendererError::SlotImageMismatch { images, slots });
        }

        let extent = backend.swapchain_extent();
        if extent.width == 0 || extent.height == 0 {
            warn!(
                "Creating swapchain targets for a zero-sized extent {}x{}",
                extent.width, extent.height
            );
        }
        let depth = backend.create_image(&ImageDesc::depth(extent, backend.depth_format()))?;
        let framebuffers = (0..slots)
            .map(|image_index| {
                backend.create_framebuffer(&FramebufferDesc {
                    image_index,
                    depth,
                    extent,
                })
            })
            .collect::<Result<Vec<_>, _>>()?;

        debug!(
            "Created depth target and {} framebuffers at {}x{}",
            framebuffers.len(),
            extent.width,
            extent.height
        );
        Ok(Self {
            extent,
            depth: Some(depth),
            framebuffers,
        })
    }

    /// Extent the targets were created at.
    #[inline]
    pub fn extent(&self) -> vk::Extent2D {
        self.extent
    }

    /// Framebuffer of the image paired with `slot`.
    #[inline]
    pub fn framebuffer(&self, slot: usize) -> Option<FramebufferHandle> {
        self.framebuffers.get(slot).copied()
    }

    /// Depth target.
    #[inline]
    pub fn depth(&self) -> Option<ImageHandle> {
        self.depth
    }

    /// Width over height, or `None` for a degenerate extent.
    pub fn aspect(&self) -> Option<f32> {
        (self.extent.width > 0 && self.extent.height > 0)
            .then(|| self.extent.width as f32 / self.extent.height as f32)
    }

    /// Destroys framebuffers, then the depth target. Calling it twice is a no-op.
    pub fn destroy<B: RenderBackend>(&mut self, backend: &mut B) -> RendererResult<()> {
        for framebuffer in self.framebuffers.drain(..) {
            backend.destroy_framebuffer(framebuffer)?;
        }
        if let Some(depth) = self.depth.take() {
            backend.destroy_image(depth)?;
        }
        Ok(())
    }
}

/// Inputs of the main graphics pipeline.
#[derive(Clone, Copy, Debug)]
pub struct PipelineSource<'a> {
    /// Shader paths and rasterizer settings.
    pub config: &'a RendererConfig,
    /// Pipeline layout.
    pub layout: PipelineLayoutHandle,
    /// Vertex layout of the bound scene.
    pub vertex_layout: &'a VertexLayout,
}

/// Creates the main graphics pipeline at `extent`.
pub fn create_pipeline<B: RenderBackend>(
    backend: &mut B,
    source: &PipelineSource<'_>,
    extent: vk::Extent2D,
) -> RendererResult<PipelineHandle> {
    let front_face = match source.config.front_face {
        Winding::Clockwise => vk::FrontFace::CLOCKWISE,
        Winding::CounterClockwise => vk::FrontFace::COUNTER_CLOCKWISE,
    };
    let desc = GraphicsPipelineDesc {
        layout: source.layout,
        vertex_shader: source.config.vertex_shader_path(),
        fragment_shader: source.config.fragment_shader_path(),
        vertex_layout: source.vertex_layout.clone(),
        color_format: backend.swapchain_format(),
        depth_format: backend.depth_format(),
        extent,
        front_face,
        cull_mode: vk::CullModeFlags::BACK,
        samples: vk::SampleCountFlags::TYPE_1,
    };
    let pipeline = backend.create_graphics_pipeline(&desc)?;
    debug!("Main pipeline created at {}x{}", extent.width, extent.height);
    Ok(pipeline)
}

/// Rebuilds every swapchain-dependent object.
///
/// `pipeline` is recreated only when `source` is given (a scene is bound).
pub fn rebuild<B: RenderBackend>(
    backend: &mut B,
    targets: &mut SwapchainTargets,
    pipeline: &mut Option<PipelineHandle>,
    source: Option<PipelineSource<'_>>,
    slots: usize,
) -> RendererResult<()> {
    backend.wait_idle()?;

    if let Some(old) = pipeline.take() {
        backend.destroy_graphics_pipeline(old)?;
    }
    targets.destroy(backend)?;

    backend.recreate_swapchain()?;

    *targets = SwapchainTargets::create(backend, slots)?;
    if let Some(source) = source {
        *pipeline = Some(create_pipeline(backend, &source, targets.extent())?);
    }

    info!(
        "Swapchain rebuilt at {}x{}",
        targets.extent.width, targets.extent.height
    );
    Ok(())
}
