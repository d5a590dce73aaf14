//! Frame synchronization.
//!
//! [`Renderer`] owns the frame slots, the dirty tracker and the swapchain
//! targets, and turns scene mutations into per-slot GPU work. Each call to
//! [`Renderer::render_one_frame`] services exactly one slot, so a mutation
//! reaches every in-flight copy of the data after N consecutive frames.

use ash::vk;
use tracing::{debug, info};

use inflight_core::RendererConfig;
use inflight_rhi::handle::{DescriptorSetLayoutHandle, PipelineHandle, PipelineLayoutHandle};
use inflight_rhi::{PipelineLayoutDesc, RenderBackend, SwapchainStatus, VertexLayout};
use inflight_scene::{Scene, SceneDirt, TextureId};

use crate::dirty::{DirtyCategory, DirtyTracker};
use crate::error::{RendererError, RendererResult};
use crate::frame_slot::FrameSlot;
use crate::rebuild::{self, PipelineSource, SwapchainTargets};
use crate::recorder::{DrawTargets, record_draw_commands};
use crate::ubo::{CameraUbo, GpuLight, descriptor_bindings, push_constant_ranges};

/// What one frame did.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FrameReport {
    /// Slot that was serviced and submitted.
    pub slot: usize,
    /// Number of frames presented so far, this one included.
    pub frame: u64,
    /// Uniform categories rewritten for the slot, in servicing order.
    pub refreshed: Vec<DirtyCategory>,
    /// Whether the slot's command sequence was re-recorded.
    pub re_recorded: bool,
    /// Whether the swapchain was rebuilt during this frame.
    pub swapchain_rebuilt: bool,
}

/// Result of [`Renderer::render_one_frame`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum FrameOutcome {
    /// A frame was submitted and presented.
    Presented(FrameReport),
    /// The swapchain was out of date when acquiring; it was rebuilt and
    /// nothing was submitted. Scene dirt is left for the next frame.
    SwapchainRebuilt,
}

impl FrameOutcome {
    /// The report of a presented frame.
    pub fn report(&self) -> Option<&FrameReport> {
        match self {
            FrameOutcome::Presented(report) => Some(report),
            FrameOutcome::SwapchainRebuilt => None,
        }
    }
}

/// Scene properties baked into recorded command sequences.
#[derive(Debug, Default)]
struct DrawShape {
    light_count: usize,
    texture_ids: Vec<TextureId>,
}

impl DrawShape {
    fn of(scene: &Scene) -> Self {
        Self {
            light_count: scene.lights().len(),
            texture_ids: scene.texture_ids().collect(),
        }
    }
}

/// Frames-in-flight renderer over a [`RenderBackend`].
///
/// # Example
///
/// ```
/// use glam::Mat4;
/// use inflight_core::RendererConfig;
/// use inflight_renderer::Renderer;
/// use inflight_rhi::{HeadlessBackend, vk};
/// use inflight_scene::{Material, MaterialId, Primitive, Scene, Texture, TextureId};
///
/// let config = RendererConfig::default();
/// let mut backend = HeadlessBackend::new(vk::Extent2D { width: 640, height: 480 }, 2);
/// let mesh = backend.register_mesh(36);
/// let image = backend.create_texture(vk::Extent2D { width: 4, height: 4 });
///
/// let mut scene = Scene::default();
/// scene.insert_texture(TextureId(0), Texture::new(image));
/// scene.insert_material(MaterialId(0), Material::textured(TextureId(0), TextureId(0)));
/// scene.add_primitive(Primitive::new(mesh, 36, MaterialId(0)), Mat4::IDENTITY);
///
/// let mut renderer = Renderer::initialize(backend, config).unwrap();
/// renderer.bind_scene(&scene).unwrap();
/// for _ in 0..4 {
///     renderer.render_one_frame(&mut scene).unwrap();
/// }
/// let backend = renderer.shutdown().unwrap();
/// assert_eq!(backend.live_objects(), 0);
/// ```
pub struct Renderer<B: RenderBackend> {
    backend: B,
    config: RendererConfig,
    tracker: DirtyTracker,
    slots: Vec<FrameSlot>,
    current_slot: usize,
    frame_count: u64,
    set_layout: DescriptorSetLayoutHandle,
    pipeline_layout: PipelineLayoutHandle,
    pipeline: Option<PipelineHandle>,
    targets: SwapchainTargets,
    vertex_layout: Option<VertexLayout>,
    shape: DrawShape,
    swapchain_invalidated: bool,
}

impl<B: RenderBackend> Renderer<B> {
    /// Creates the per-slot resources and swapchain targets.
    ///
    /// No pipeline exists until [`bind_scene`](Self::bind_scene).
    ///
    /// # Arguments
    ///
    /// * `backend` - Device backend; its swapchain must have exactly
    ///   `config.frames_in_flight` images
    /// * `config` - Renderer configuration
    ///
    /// # Errors
    ///
    /// Returns [`RendererError::Config`] for an invalid configuration,
    /// [`RendererError::SlotImageMismatch`] when the swapchain image count
    /// differs from the number of frames in flight, or a backend error.
    pub fn initialize(mut backend: B, config: RendererConfig) -> RendererResult<Self> {
        config.validate()?;
        let slot_count = config.frames_in_flight;
        let images = backend.swapchain_image_count();
        if images != slot_count {
            return Err(RendererError::SlotImageMismatch {
                images,
                slots: slot_count,
            });
        }

        let extent = backend.swapchain_extent();
        info!(
            "Initializing renderer ({}x{}, {} frames in flight)",
            extent.width, extent.height, slot_count
        );

        let max_textures = u32::try_from(config.max_textures).map_err(|_| {
            RendererError::CapacityExceeded {
                what: "texture",
                requested: config.max_textures,
                max: u32::MAX as usize,
            }
        })?;
        let set_layout = backend.create_descriptor_set_layout(&descriptor_bindings(max_textures))?;
        let pipeline_layout = backend.create_pipeline_layout(&PipelineLayoutDesc {
            set_layouts: vec![set_layout],
            push_constant_ranges: push_constant_ranges().to_vec(),
        })?;

        let slots = (0..slot_count)
            .map(|index| FrameSlot::create(&mut backend, index, set_layout, &config))
            .collect::<RendererResult<Vec<_>>>()?;
        let targets = SwapchainTargets::create(&mut backend, slot_count)?;

        info!("Renderer initialized");
        Ok(Self {
            backend,
            config,
            tracker: DirtyTracker::new(slot_count),
            slots,
            current_slot: 0,
            frame_count: 0,
            set_layout,
            pipeline_layout,
            pipeline: None,
            targets,
            vertex_layout: None,
            shape: DrawShape::default(),
            swapchain_invalidated: false,
        })
    }

    /// Builds the graphics pipeline for `scene` and marks every category dirty.
    ///
    /// Binding again (for example with a different vertex layout) replaces
    /// the pipeline after the device goes idle.
    pub fn bind_scene(&mut self, scene: &Scene) -> RendererResult<()> {
        self.backend.wait_idle()?;
        if let Some(old) = self.pipeline.take() {
            self.backend.destroy_graphics_pipeline(old)?;
        }

        let vertex_layout = scene.vertex_layout().clone();
        let source = PipelineSource {
            config: &self.config,
            layout: self.pipeline_layout,
            vertex_layout: &vertex_layout,
        };
        let pipeline = rebuild::create_pipeline(&mut self.backend, &source, self.targets.extent())?;

        info!(
            "Scene bound: {} primitives, {} lights, {} textures",
            scene.primitive_count(),
            scene.lights().len(),
            scene.textures().len()
        );
        self.pipeline = Some(pipeline);
        self.vertex_layout = Some(vertex_layout);
        self.shape = DrawShape::of(scene);
        self.tracker.mark_all();
        Ok(())
    }

    /// Requests a swapchain rebuild before the next frame.
    pub fn notify_swapchain_invalidated(&mut self) {
        debug!("Swapchain invalidation requested");
        self.swapchain_invalidated = true;
    }

    /// Services and submits the next frame slot.
    ///
    /// `scene` must be the scene last given to [`bind_scene`](Self::bind_scene):
    /// the slots only hold what its mutation bits reported. Switching scenes
    /// goes through `bind_scene` again.
    ///
    /// # Errors
    ///
    /// Returns [`RendererError::NoSceneBound`] before
    /// [`bind_scene`](Self::bind_scene),
    /// [`RendererError::VertexLayoutMismatch`] when `scene` does not match the
    /// bound pipeline's vertex layout, a configuration violation when the
    /// scene does not fit (see [`RendererError`]), or a backend error. An
    /// out-of-date swapchain is never an error.
    pub fn render_one_frame(&mut self, scene: &mut Scene) -> RendererResult<FrameOutcome> {
        if self.pipeline.is_none() {
            return Err(RendererError::NoSceneBound);
        }
        if self.vertex_layout.as_ref() != Some(scene.vertex_layout()) {
            return Err(RendererError::VertexLayoutMismatch);
        }

        let mut swapchain_rebuilt = false;
        if self.swapchain_invalidated {
            debug!("Rebuilding swapchain before acquire");
            self.rebuild_swapchain()?;
            swapchain_rebuilt = true;
        }

        let slot = self.current_slot;
        let fence = self.slots[slot].fence();
        self.backend.wait_for_fence(fence, u64::MAX)?;

        if self.backend.begin_frame(slot)? == SwapchainStatus::OutOfDate {
            debug!("Swapchain out of date, rebuilding");
            self.rebuild_swapchain()?;
            return Ok(FrameOutcome::SwapchainRebuilt);
        }

        self.observe_scene(scene);
        let refreshed = self.service_uniforms(slot, scene)?;
        let re_recorded = self.service_commands(slot, scene)?;

        let frame_slot = &self.slots[slot];
        let (sequence, semaphore) = (frame_slot.sequence(), frame_slot.semaphore());
        self.backend.reset_fence(fence)?;
        self.backend.submit(sequence, semaphore, fence)?;
        let status = self.backend.present(slot, semaphore)?;

        self.current_slot = (slot + 1) % self.slots.len();
        self.frame_count += 1;

        if status == SwapchainStatus::OutOfDate {
            debug!("Present reported out of date, rebuilding");
            self.rebuild_swapchain()?;
            swapchain_rebuilt = true;
        }

        Ok(FrameOutcome::Presented(FrameReport {
            slot,
            frame: self.frame_count,
            refreshed,
            re_recorded,
            swapchain_rebuilt,
        }))
    }

    /// Waits for the device, destroys every renderer object and returns the backend.
    pub fn shutdown(mut self) -> RendererResult<B> {
        self.backend.wait_idle()?;
        if let Some(pipeline) = self.pipeline.take() {
            self.backend.destroy_graphics_pipeline(pipeline)?;
        }
        self.targets.destroy(&mut self.backend)?;
        for slot in self.slots.drain(..) {
            slot.destroy(&mut self.backend)?;
        }
        self.backend.destroy_pipeline_layout(self.pipeline_layout)?;
        self.backend.destroy_descriptor_set_layout(self.set_layout)?;
        info!("Renderer shut down after {} frames", self.frame_count);
        Ok(self.backend)
    }

    /// Number of slots still stale for `category`.
    #[inline]
    pub fn pending(&self, category: DirtyCategory) -> usize {
        self.tracker.pending(category)
    }

    /// Resources of slot `index`.
    #[inline]
    pub fn slot(&self, index: usize) -> Option<&FrameSlot> {
        self.slots.get(index)
    }

    /// Slot the next frame will service.
    #[inline]
    pub fn current_slot(&self) -> usize {
        self.current_slot
    }

    /// Number of frames in flight.
    #[inline]
    pub fn slot_count(&self) -> usize {
        self.slots.len()
    }

    /// Frames presented so far.
    #[inline]
    pub fn frame_count(&self) -> u64 {
        self.frame_count
    }

    /// Current graphics pipeline, if a scene is bound.
    #[inline]
    pub fn pipeline(&self) -> Option<PipelineHandle> {
        self.pipeline
    }

    /// Current swapchain extent as seen by the renderer.
    #[inline]
    pub fn extent(&self) -> vk::Extent2D {
        self.targets.extent()
    }

    /// Renderer configuration.
    #[inline]
    pub fn config(&self) -> &RendererConfig {
        &self.config
    }

    /// The device backend.
    #[inline]
    pub fn backend(&self) -> &B {
        &self.backend
    }

    /// The device backend, mutably.
    #[inline]
    pub fn backend_mut(&mut self) -> &mut B {
        &mut self.backend
    }

    /// Folds the scene's mutation bits into the tracker.
    fn observe_scene(&mut self, scene: &mut Scene) {
        let dirt = scene.take_dirt();
        if dirt.is_empty() {
            return;
        }
        debug!("Scene dirt {:?}", dirt);

        if dirt.contains(SceneDirt::CAMERA) {
            self.tracker.mark_dirty(DirtyCategory::Camera);
        }
        if dirt.contains(SceneDirt::XFORMS) {
            self.tracker.mark_dirty(DirtyCategory::Transforms);
        }
        if dirt.contains(SceneDirt::LIGHTS) {
            self.tracker.mark_dirty(DirtyCategory::Lights);
            let light_count = scene.lights().len();
            if light_count != self.shape.light_count {
                self.shape.light_count = light_count;
                self.tracker.mark_dirty(DirtyCategory::Commands);
            }
        }
        if dirt.contains(SceneDirt::TEXTURES) {
            self.tracker.mark_dirty(DirtyCategory::Textures);
            let ids: Vec<TextureId> = scene.texture_ids().collect();
            if ids != self.shape.texture_ids {
                self.shape.texture_ids = ids;
                self.tracker.mark_dirty(DirtyCategory::Commands);
            }
        }
        if dirt.intersects(SceneDirt::PRIMITIVES | SceneDirt::MATERIALS) {
            self.tracker.mark_dirty(DirtyCategory::Commands);
        }
    }

    /// Rewrites the slot's stale regions and texture descriptors.
    fn service_uniforms(
        &mut self,
        slot: usize,
        scene: &Scene,
    ) -> RendererResult<Vec<DirtyCategory>> {
        let mut refreshed = Vec::new();
        let backend = &mut self.backend;
        let frame_slot = &mut self.slots[slot];

        if self.tracker.consume(DirtyCategory::Camera, slot) {
            let camera = CameraUbo::from_camera(scene.camera(), self.targets.aspect());
            frame_slot.write_camera(backend, &camera)?;
            self.tracker.decrement(DirtyCategory::Camera, slot);
            refreshed.push(DirtyCategory::Camera);
        }

        if self.tracker.consume(DirtyCategory::Transforms, slot) {
            let grown = frame_slot.write_xforms(backend, scene.xforms(), self.config.max_primitives)?;
            if grown {
                self.tracker.invalidate(DirtyCategory::Commands, slot);
            }
            self.tracker.decrement(DirtyCategory::Transforms, slot);
            refreshed.push(DirtyCategory::Transforms);
        }

        if self.tracker.consume(DirtyCategory::Lights, slot) {
            let lights: Vec<GpuLight> = scene.lights().iter().map(GpuLight::from).collect();
            let grown = frame_slot.write_lights(backend, &lights, self.config.max_lights)?;
            if grown {
                self.tracker.invalidate(DirtyCategory::Commands, slot);
            }
            self.tracker.decrement(DirtyCategory::Lights, slot);
            refreshed.push(DirtyCategory::Lights);
        }

        if self.tracker.consume(DirtyCategory::Textures, slot) {
            frame_slot.write_textures(backend, scene.textures(), self.config.max_textures)?;
            self.tracker.decrement(DirtyCategory::Textures, slot);
            refreshed.push(DirtyCategory::Textures);
        }

        if !refreshed.is_empty() {
            debug!("Slot {} refreshed {:?}", slot, refreshed);
        }
        Ok(refreshed)
    }

    /// Re-records the slot's command sequence if it is stale.
    fn service_commands(&mut self, slot: usize, scene: &Scene) -> RendererResult<bool> {
        if !self.tracker.consume(DirtyCategory::Commands, slot) {
            return Ok(false);
        }
        let pipeline = self.pipeline.ok_or(RendererError::NoSceneBound)?;
        let framebuffer =
            self.targets
                .framebuffer(slot)
                .ok_or(RendererError::SlotImageMismatch {
                    images: self.backend.swapchain_image_count(),
                    slots: self.slots.len(),
                })?;

        let frame_slot = &self.slots[slot];
        let targets = DrawTargets {
            framebuffer,
            extent: self.targets.extent(),
            pipeline,
            pipeline_layout: self.pipeline_layout,
            descriptor_set: frame_slot.descriptor_set(),
            clear_color: self.config.clear_color,
            clear_depth: self.config.clear_depth,
            xform_capacity: frame_slot.xform_region().capacity(),
            max_textures: self.config.max_textures,
        };
        let commands = record_draw_commands(&targets, scene)?;
        self.backend
            .record_command_sequence(frame_slot.sequence(), &commands)?;
        self.tracker.decrement(DirtyCategory::Commands, slot);

        debug!(
            "Slot {} re-recorded ({} draws, {} commands)",
            slot,
            commands.draw_count(),
            commands.len()
        );
        Ok(true)
    }

    /// Recreates every swapchain-sized object and marks sequences and camera dirty.
    fn rebuild_swapchain(&mut self) -> RendererResult<()> {
        let source = self.vertex_layout.as_ref().map(|vertex_layout| PipelineSource {
            config: &self.config,
            layout: self.pipeline_layout,
            vertex_layout,
        });
        rebuild::rebuild(
            &mut self.backend,
            &mut self.targets,
            &mut self.pipeline,
            source,
            self.slots.len(),
        )?;
        self.swapchain_invalidated = false;
        self.tracker.mark_dirty(DirtyCategory::Commands);
        self.tracker.mark_dirty(DirtyCategory::Camera);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::Mat4;
    use inflight_rhi::HeadlessBackend;
    use inflight_scene::{Material, MaterialId, PointLight, Primitive, Texture};

    const EXTENT: vk::Extent2D = vk::Extent2D {
        width: 320,
        height: 240,
    };

    fn setup() -> (Renderer<HeadlessBackend>, Scene) {
        let mut backend = HeadlessBackend::new(EXTENT, 2);
        let mesh = backend.register_mesh(36);
        let image = backend.create_texture(vk::Extent2D {
            width: 4,
            height: 4,
        });

        let mut scene = Scene::default();
        scene.insert_texture(TextureId(0), Texture::new(image));
        scene.insert_material(MaterialId(0), Material::textured(TextureId(0), TextureId(0)));
        scene.add_primitive(Primitive::new(mesh, 36, MaterialId(0)), Mat4::IDENTITY);
        scene.add_light(PointLight::default());

        let mut renderer = Renderer::initialize(backend, RendererConfig::default()).unwrap();
        renderer.bind_scene(&scene).unwrap();
        (renderer, scene)
    }

    #[test]
    fn test_first_frames_service_everything() {
        let (mut renderer, mut scene) = setup();

        let outcome = renderer.render_one_frame(&mut scene).unwrap();
        let report = outcome.report().unwrap();
        assert_eq!(report.slot, 0);
        assert_eq!(
            report.refreshed,
            vec![
                DirtyCategory::Camera,
                DirtyCategory::Transforms,
                DirtyCategory::Lights,
                DirtyCategory::Textures
            ]
        );
        assert!(report.re_recorded);
        for category in DirtyCategory::ALL {
            assert_eq!(renderer.pending(category), 1);
        }
    }

    #[test]
    fn test_slots_advance_round_robin() {
        let (mut renderer, mut scene) = setup();
        let slots: Vec<usize> = (0..5)
            .map(|_| {
                renderer
                    .render_one_frame(&mut scene)
                    .unwrap()
                    .report()
                    .unwrap()
                    .slot
            })
            .collect();
        assert_eq!(slots, vec![0, 1, 0, 1, 0]);
        assert_eq!(renderer.frame_count(), 5);
    }

    #[test]
    fn test_render_without_scene_fails() {
        let backend = HeadlessBackend::new(EXTENT, 2);
        let mut renderer = Renderer::initialize(backend, RendererConfig::default()).unwrap();
        let err = renderer.render_one_frame(&mut Scene::default()).unwrap_err();
        assert!(matches!(err, RendererError::NoSceneBound));
    }

    #[test]
    fn test_scene_with_other_vertex_layout_rejected() {
        let (mut renderer, _) = setup();
        let layout = VertexLayout::new(&[12, 16]).unwrap();
        let mut other = Scene::new(layout);

        let err = renderer.render_one_frame(&mut other).unwrap_err();
        assert!(matches!(err, RendererError::VertexLayoutMismatch));
        assert_eq!(renderer.frame_count(), 0);
    }

    #[test]
    fn test_initialize_rejects_image_count_mismatch() {
        let backend = HeadlessBackend::new(EXTENT, 3);
        let err = Renderer::initialize(backend, RendererConfig::default())
            .err()
            .unwrap();
        assert!(matches!(
            err,
            RendererError::SlotImageMismatch {
                images: 3,
                slots: 2
            }
        ));
    }

    #[test]
    fn test_initialize_rejects_invalid_config() {
        let backend = HeadlessBackend::new(EXTENT, 2);
        let config = RendererConfig {
            frames_in_flight: 0,
            ..RendererConfig::default()
        };
        let err = Renderer::initialize(backend, config).err().unwrap();
        assert!(matches!(err, RendererError::Config(_)));
    }

    #[test]
    fn test_camera_aspect_follows_extent() {
        let (mut renderer, mut scene) = setup();
        renderer.render_one_frame(&mut scene).unwrap();

        let region = renderer.slot(0).unwrap().camera_region().handle();
        let stored: Vec<CameraUbo> = renderer.backend().read_region(region).unwrap();
        let expected = CameraUbo::from_camera(scene.camera(), Some(320.0 / 240.0));
        assert_eq!(stored[0], expected);
    }
}
