//! Per-slot resources for frames in flight.
//!
//! Each of the N frame slots owns everything one in-flight frame touches,
//! so the CPU can rewrite slot `s` while the GPU still reads slot `s + 1`:
//!
//! - a command sequence, re-recorded only when draw content changes
//! - a completion fence (created signaled so the first wait returns)
//! - a semaphore ordering presentation after rendering
//! - one resource region per uniform category (camera, transforms, lights)
//! - a descriptor set binding those regions and the texture array
//! - the texture binding table mirroring the slot's texture array
//!
//! # Synchronization Flow
//!
//! ```text
//! 1. Wait on the slot fence (previous use of this slot finished)
//! 2. Rewrite stale regions and descriptors
//! 3. Re-record the command sequence if needed
//! 4. Reset the fence, submit signaling fence and semaphore
//! 5. Present (waits on the semaphore)
//! ```

use std::collections::BTreeMap;

use ash::vk;
use glam::Mat4;
use tracing::debug;

use inflight_core::RendererConfig;
use inflight_rhi::RenderBackend;
use inflight_rhi::handle::{
    CommandSequenceHandle, DescriptorSetHandle, DescriptorSetLayoutHandle, FenceHandle,
    ImageHandle, RegionHandle, SemaphoreHandle,
};
use inflight_scene::{Texture, TextureId};

use crate::error::{RendererError, RendererResult};
use crate::ubo::{
    CAMERA_BINDING, CameraUbo, GpuLight, LIGHTS_BINDING, TEXTURES_BINDING, XFORM_SIZE,
    XFORMS_BINDING,
};

/// A host-visible uniform region holding up to `capacity` elements.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ResourceRegion {
    handle: RegionHandle,
    capacity: usize,
    element_size: usize,
}

impl ResourceRegion {
    /// Fails with [`RendererError::CapacityExceeded`] when the byte size
    /// does not fit the address space.
    fn create<B: RenderBackend>(
        backend: &mut B,
        capacity: usize,
        element_size: usize,
        what: &'static str,
    ) -> RendererResult<Self> {
        let size = capacity
            .checked_mul(element_size)
            .and_then(|bytes| u64::try_from(bytes).ok())
            .ok_or(RendererError::CapacityExceeded {
                what,
                requested: capacity,
                max: usize::MAX / element_size.max(1),
            })?;
        let handle = backend.create_region(size, vk::BufferUsageFlags::UNIFORM_BUFFER)?;
        Ok(Self {
            handle,
            capacity,
            element_size,
        })
    }

    /// Backend handle of the region.
    #[inline]
    pub fn handle(&self) -> RegionHandle {
        self.handle
    }

    /// Number of elements the region holds.
    #[inline]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Size of the region in bytes.
    #[inline]
    pub fn size(&self) -> usize {
        self.capacity * self.element_size
    }
}

/// Resources owned by one frame slot.
#[derive(Debug)]
pub struct FrameSlot {
    index: usize,
    sequence: CommandSequenceHandle,
    fence: FenceHandle,
    semaphore: SemaphoreHandle,
    descriptor_set: DescriptorSetHandle,
    camera: ResourceRegion,
    xforms: ResourceRegion,
    lights: ResourceRegion,
    textures: BTreeMap<TextureId, ImageHandle>,
}

impl FrameSlot {
    /// Creates the resources of slot `index`.
    ///
    /// # Arguments
    ///
    /// * `backend` - The device backend
    /// * `index` - Slot index, also the paired swapchain image index
    /// * `set_layout` - Layout of the slot's descriptor set
    /// * `config` - Initial region capacities
    ///
    /// # Errors
    ///
    /// Returns an error if any resource creation fails.
    pub fn create<B: RenderBackend>(
        backend: &mut B,
        index: usize,
        set_layout: DescriptorSetLayoutHandle,
        config: &RendererConfig,
    ) -> RendererResult<Self> {
        let camera = ResourceRegion::create(backend, 1, CameraUbo::SIZE, "camera")?;
        let xforms =
            ResourceRegion::create(backend, config.primitive_capacity, XFORM_SIZE, "primitive")?;
        let lights =
            ResourceRegion::create(backend, config.light_capacity, GpuLight::SIZE, "light")?;

        let descriptor_set = backend.allocate_descriptor_set(set_layout)?;
        backend.write_buffer_descriptor(descriptor_set, CAMERA_BINDING, camera.handle)?;
        backend.write_buffer_descriptor(descriptor_set, XFORMS_BINDING, xforms.handle)?;
        backend.write_buffer_descriptor(descriptor_set, LIGHTS_BINDING, lights.handle)?;

        let sequence = backend.create_command_sequence()?;
        // Signaled so the first wait on this slot returns immediately
        let fence = backend.create_fence(true)?;
        let semaphore = backend.create_semaphore()?;

        debug!("Created frame slot {}", index);
        Ok(Self {
            index,
            sequence,
            fence,
            semaphore,
            descriptor_set,
            camera,
            xforms,
            lights,
            textures: BTreeMap::new(),
        })
    }

    /// Slot index.
    #[inline]
    pub fn index(&self) -> usize {
        self.index
    }

    /// Command sequence of the slot.
    #[inline]
    pub fn sequence(&self) -> CommandSequenceHandle {
        self.sequence
    }

    /// Completion fence of the slot.
    #[inline]
    pub fn fence(&self) -> FenceHandle {
        self.fence
    }

    /// Render-finished semaphore of the slot.
    #[inline]
    pub fn semaphore(&self) -> SemaphoreHandle {
        self.semaphore
    }

    /// Descriptor set of the slot.
    #[inline]
    pub fn descriptor_set(&self) -> DescriptorSetHandle {
        self.descriptor_set
    }

    /// Camera region.
    #[inline]
    pub fn camera_region(&self) -> &ResourceRegion {
        &self.camera
    }

    /// Transform region.
    #[inline]
    pub fn xform_region(&self) -> &ResourceRegion {
        &self.xforms
    }

    /// Light region.
    #[inline]
    pub fn light_region(&self) -> &ResourceRegion {
        &self.lights
    }

    /// Texture ids bound in this slot's texture array.
    #[inline]
    pub fn texture_table(&self) -> &BTreeMap<TextureId, ImageHandle> {
        &self.textures
    }

    /// Writes the camera block.
    pub fn write_camera<B: RenderBackend>(
        &mut self,
        backend: &mut B,
        camera: &CameraUbo,
    ) -> RendererResult<()> {
        backend.write_region(self.camera.handle, 0, bytemuck::bytes_of(camera))?;
        Ok(())
    }

    /// Writes one matrix per primitive, growing the region if needed.
    ///
    /// Returns `true` when the region was reallocated, which rewrites the
    /// slot's descriptor set and so invalidates its command sequence.
    pub fn write_xforms<B: RenderBackend>(
        &mut self,
        backend: &mut B,
        xforms: &[Mat4],
        max: usize,
    ) -> RendererResult<bool> {
        let grown = grow_region(
            backend,
            self.descriptor_set,
            XFORMS_BINDING,
            &mut self.xforms,
            xforms.len(),
            max,
            "primitive",
        )?;
        if !xforms.is_empty() {
            backend.write_region(self.xforms.handle, 0, bytemuck::cast_slice(xforms))?;
        }
        if grown {
            debug!(
                "Slot {} transform region grown to {} entries",
                self.index, self.xforms.capacity
            );
        }
        Ok(grown)
    }

    /// Writes one record per light, growing the region if needed.
    ///
    /// Returns `true` when the region was reallocated.
    pub fn write_lights<B: RenderBackend>(
        &mut self,
        backend: &mut B,
        lights: &[GpuLight],
        max: usize,
    ) -> RendererResult<bool> {
        let grown = grow_region(
            backend,
            self.descriptor_set,
            LIGHTS_BINDING,
            &mut self.lights,
            lights.len(),
            max,
            "light",
        )?;
        if !lights.is_empty() {
            backend.write_region(self.lights.handle, 0, bytemuck::cast_slice(lights))?;
        }
        if grown {
            debug!(
                "Slot {} light region grown to {} entries",
                self.index, self.lights.capacity
            );
        }
        Ok(grown)
    }

    /// Writes the texture array: one descriptor per active texture, at the
    /// array element equal to its id. Ids no longer in the scene are dropped
    /// from the binding table.
    pub fn write_textures<B: RenderBackend>(
        &mut self,
        backend: &mut B,
        textures: &BTreeMap<TextureId, Texture>,
        max_textures: usize,
    ) -> RendererResult<()> {
        for (&id, texture) in textures {
            if id.0 as usize >= max_textures {
                return Err(RendererError::TextureIdOutOfRange {
                    id,
                    max: max_textures,
                });
            }
            backend.write_image_descriptor(
                self.descriptor_set,
                TEXTURES_BINDING,
                id.0,
                texture.image,
            )?;
            self.textures.insert(id, texture.image);
        }
        self.textures.retain(|id, _| textures.contains_key(id));
        Ok(())
    }

    /// Destroys every resource of the slot.
    ///
    /// The slot's fence must not be pending.
    pub fn destroy<B: RenderBackend>(self, backend: &mut B) -> RendererResult<()> {
        backend.destroy_semaphore(self.semaphore)?;
        backend.destroy_fence(self.fence)?;
        backend.destroy_command_sequence(self.sequence)?;
        backend.free_descriptor_set(self.descriptor_set)?;
        backend.destroy_region(self.lights.handle)?;
        backend.destroy_region(self.xforms.handle)?;
        backend.destroy_region(self.camera.handle)?;
        debug!("Destroyed frame slot {}", self.index);
        Ok(())
    }
}

/// Reallocates `region` when `count` exceeds its capacity.
///
/// The new capacity is the next power of two of `count`, capped at `max`.
fn grow_region<B: RenderBackend>(
    backend: &mut B,
    set: DescriptorSetHandle,
    binding: u32,
    region: &mut ResourceRegion,
    count: usize,
    max: usize,
    what: &'static str,
) -> RendererResult<bool> {
    if count > max {
        return Err(RendererError::CapacityExceeded {
            what,
            requested: count,
            max,
        });
    }
    if count <= region.capacity {
        return Ok(false);
    }

    let capacity = count
        .checked_next_power_of_two()
        .map_or(max, |capacity| capacity.min(max));
    let grown = ResourceRegion::create(backend, capacity, region.element_size, what)?;
    backend.write_buffer_descriptor(set, binding, grown.handle)?;
    backend.destroy_region(region.handle)?;
    *region = grown;
    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use inflight_rhi::HeadlessBackend;

    use crate::ubo::descriptor_bindings;

    fn setup(config: &RendererConfig) -> (HeadlessBackend, FrameSlot) {
        let mut backend = HeadlessBackend::new(
            vk::Extent2D {
                width: 64,
                height: 64,
            },
            1,
        );
        let layout = backend
            .create_descriptor_set_layout(&descriptor_bindings(config.max_textures as u32))
            .unwrap();
        let slot = FrameSlot::create(&mut backend, 0, layout, config).unwrap();
        (backend, slot)
    }

    #[test]
    fn test_create_binds_regions() {
        let config = RendererConfig::default();
        let (backend, slot) = setup(&config);

        let set = slot.descriptor_set();
        assert_eq!(
            backend.bound_region(set, CAMERA_BINDING),
            Some(slot.camera_region().handle())
        );
        assert_eq!(
            backend.bound_region(set, XFORMS_BINDING),
            Some(slot.xform_region().handle())
        );
        assert_eq!(slot.xform_region().size(), config.primitive_capacity * 64);
        assert_eq!(slot.light_region().capacity(), config.light_capacity);
    }

    #[test]
    fn test_xforms_within_capacity_do_not_grow() {
        let config = RendererConfig::default();
        let (mut backend, mut slot) = setup(&config);
        let xforms = [Mat4::IDENTITY; 4];

        assert!(!slot.write_xforms(&mut backend, &xforms, 1024).unwrap());
        let stored: Vec<Mat4> = backend.read_region(slot.xform_region().handle()).unwrap();
        assert_eq!(&stored[..4], &xforms);
    }

    #[test]
    fn test_xforms_grow_to_next_power_of_two() {
        let config = RendererConfig {
            primitive_capacity: 2,
            ..RendererConfig::default()
        };
        let (mut backend, mut slot) = setup(&config);
        let old = slot.xform_region().handle();

        assert!(slot.write_xforms(&mut backend, &[Mat4::IDENTITY; 5], 64).unwrap());
        assert_eq!(slot.xform_region().capacity(), 8);
        assert_ne!(slot.xform_region().handle(), old);
        assert!(backend.region_bytes(old).is_none());
        assert_eq!(
            backend.bound_region(slot.descriptor_set(), XFORMS_BINDING),
            Some(slot.xform_region().handle())
        );
    }

    #[test]
    fn test_growth_is_capped_at_max() {
        let config = RendererConfig {
            light_capacity: 1,
            ..RendererConfig::default()
        };
        let (mut backend, mut slot) = setup(&config);

        let lights = [GpuLight::default(); 5];
        assert!(slot.write_lights(&mut backend, &lights, 6).unwrap());
        assert_eq!(slot.light_region().capacity(), 6);

        let err = slot
            .write_lights(&mut backend, &[GpuLight::default(); 7], 6)
            .unwrap_err();
        assert!(matches!(
            err,
            RendererError::CapacityExceeded {
                what: "light",
                requested: 7,
                max: 6
            }
        ));
    }

    #[test]
    fn test_oversized_capacity_is_error() {
        let huge = usize::MAX / 2;
        let config = RendererConfig {
            primitive_capacity: huge,
            max_primitives: huge,
            ..RendererConfig::default()
        };
        assert!(config.validate().is_ok());

        let mut backend = HeadlessBackend::new(
            vk::Extent2D {
                width: 64,
                height: 64,
            },
            1,
        );
        let layout = backend
            .create_descriptor_set_layout(&descriptor_bindings(config.max_textures as u32))
            .unwrap();
        let err = FrameSlot::create(&mut backend, 0, layout, &config).unwrap_err();
        assert!(matches!(
            err,
            RendererError::CapacityExceeded {
                what: "primitive",
                requested,
                ..
            } if requested == huge
        ));
    }

    #[test]
    fn test_growth_beyond_address_space_is_error() {
        let config = RendererConfig {
            primitive_capacity: 1,
            max_primitives: usize::MAX,
            ..RendererConfig::default()
        };
        let (mut backend, mut slot) = setup(&config);
        let region = slot.xform_region().handle();

        let err = grow_region(
            &mut backend,
            slot.descriptor_set(),
            XFORMS_BINDING,
            &mut slot.xforms,
            usize::MAX / 2 + 2,
            usize::MAX,
            "primitive",
        )
        .unwrap_err();
        assert!(matches!(err, RendererError::CapacityExceeded { what: "primitive", .. }));
        assert_eq!(slot.xform_region().handle(), region);
    }

    #[test]
    fn test_texture_table_drops_removed_ids() {
        let config = RendererConfig::default();
        let (mut backend, mut slot) = setup(&config);
        let a = backend.create_texture(vk::Extent2D {
            width: 1,
            height: 1,
        });
        let b = backend.create_texture(vk::Extent2D {
            width: 1,
            height: 1,
        });

        let mut textures = BTreeMap::new();
        textures.insert(TextureId(1), Texture::new(a));
        textures.insert(TextureId(5), Texture::new(b));
        slot.write_textures(&mut backend, &textures, 16).unwrap();
        assert_eq!(
            backend.bound_image(slot.descriptor_set(), TEXTURES_BINDING, 5),
            Some(b)
        );

        textures.remove(&TextureId(1));
        slot.write_textures(&mut backend, &textures, 16).unwrap();
        let ids: Vec<_> = slot.texture_table().keys().copied().collect();
        assert_eq!(ids, vec![TextureId(5)]);
    }

    #[test]
    fn test_texture_id_out_of_range() {
        let config = RendererConfig::default();
        let (mut backend, mut slot) = setup(&config);
        let image = backend.create_texture(vk::Extent2D {
            width: 1,
            height: 1,
        });
        let mut textures = BTreeMap::new();
        textures.insert(TextureId(16), Texture::new(image));

        let err = slot.write_textures(&mut backend, &textures, 16).unwrap_err();
        assert!(matches!(err, RendererError::TextureIdOutOfRange { max: 16, .. }));
    }

    #[test]
    fn test_destroy_releases_everything() {
        let config = RendererConfig::default();
        let (mut backend, slot) = setup(&config);
        let before = backend.live_objects();
        slot.destroy(&mut backend).unwrap();
        // Regions, set, sequence, fence and semaphore
        assert_eq!(before - backend.live_objects(), 7);
    }
}
