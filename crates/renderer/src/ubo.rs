//! GPU-visible data layouts.
//!
//! These structures must match the shader uniform blocks and push constant
//! blocks exactly. All structures use `#[repr(C)]` for predictable memory
//! layout and implement `Pod` and `Zeroable` for safe byte casting.
//!
//! # Descriptor set 0
//!
//! | binding | content | stages |
//! |---|---|---|
//! | 0 | [`CameraUbo`] | vertex, fragment |
//! | 1 | one `mat4` per primitive | vertex |
//! | 2 | one [`GpuLight`] per light | fragment |
//! | 3 | `sampler2D[max_textures]`, indexed by texture id | fragment |
//!
//! # Push constants
//!
//! | offset | content | stage |
//! |---|---|---|
//! | 0 | primitive index (`u32`) | vertex |
//! | 4 | light count (`u32`) | fragment |
//! | 16 | [`MaterialConstants`] | fragment |

use ash::vk;
use bytemuck::{Pod, Zeroable};
use glam::{Mat4, Vec4};
use inflight_rhi::DescriptorBinding;
use inflight_scene::{Camera, Light, Material};

/// Camera uniform block binding.
pub const CAMERA_BINDING: u32 = 0;
/// Primitive transform array binding.
pub const XFORMS_BINDING: u32 = 1;
/// Light array binding.
pub const LIGHTS_BINDING: u32 = 2;
/// Texture array binding.
pub const TEXTURES_BINDING: u32 = 3;

/// Push constant offset of the primitive index.
pub const PRIMITIVE_INDEX_OFFSET: u32 = 0;
/// Push constant offset of the light count.
pub const LIGHT_COUNT_OFFSET: u32 = 4;
/// Push constant offset of the material block; 8 bytes of padding precede it.
pub const MATERIAL_OFFSET: u32 = 16;

/// Size in bytes of one primitive transform.
pub const XFORM_SIZE: usize = std::mem::size_of::<Mat4>();

/// Camera uniform buffer data.
///
/// # Memory Layout
///
/// - Offset 0: view matrix (64 bytes)
/// - Offset 64: projection matrix (64 bytes)
/// - Offset 128: camera world matrix (64 bytes)
/// - Offset 192: viewProjection matrix (64 bytes)
/// - Total size: 256 bytes
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Pod, Zeroable)]
pub struct CameraUbo {
    /// View matrix (world to view space).
    pub view: Mat4,
    /// Projection matrix (view to clip space).
    pub projection: Mat4,
    /// Camera-to-world matrix.
    pub world: Mat4,
    /// Combined view-projection matrix.
    pub view_projection: Mat4,
}

impl CameraUbo {
    /// Size of the struct in bytes.
    pub const SIZE: usize = std::mem::size_of::<Self>();

    /// Builds the camera block, overriding the projection aspect.
    ///
    /// `aspect` normally comes from the swapchain extent, so a resize is
    /// reflected without the scene owner touching the camera.
    pub fn from_camera(camera: &Camera, aspect: Option<f32>) -> Self {
        let mut camera = camera.clone();
        if let Some(aspect) = aspect {
            camera.set_aspect(aspect);
        }
        let view = camera.view_matrix();
        let projection = camera.projection_matrix();
        Self {
            view,
            projection,
            world: camera.world_matrix(),
            view_projection: projection * view,
        }
    }
}

/// One light record.
///
/// # Memory Layout
///
/// - Offset 0: position, w = kind code (16 bytes)
/// - Offset 16: color, w = intensity (16 bytes)
/// - Offset 32: direction, w = radius (16 bytes)
/// - Offset 48: inner and outer cone cosines, zw unused (16 bytes)
/// - Total size: 64 bytes
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Pod, Zeroable)]
pub struct GpuLight {
    /// Position and kind.
    pub position: Vec4,
    /// Color and intensity.
    pub color: Vec4,
    /// Direction and radius.
    pub direction: Vec4,
    /// Cone cutoffs.
    pub cone: Vec4,
}

impl GpuLight {
    /// Size of the struct in bytes.
    pub const SIZE: usize = std::mem::size_of::<Self>();
}

impl From<&Light> for GpuLight {
    fn from(light: &Light) -> Self {
        let kind = light.kind_code() as f32;
        let color = light.color().extend(light.intensity());
        match light {
            Light::Directional(l) => Self {
                position: Vec4::new(0.0, 0.0, 0.0, kind),
                color,
                direction: l.direction.extend(0.0),
                cone: Vec4::ZERO,
            },
            Light::Point(l) => Self {
                position: l.position.extend(kind),
                color,
                direction: Vec4::new(0.0, 0.0, 0.0, l.radius),
                cone: Vec4::ZERO,
            },
            Light::Spot(l) => Self {
                position: l.position.extend(kind),
                color,
                direction: l.direction.extend(l.radius),
                cone: Vec4::new(l.inner_cutoff, l.outer_cutoff, 0.0, 0.0),
            },
        }
    }
}

/// Per-draw material push constants.
///
/// # Memory Layout
///
/// - Offset 0: base color (16 bytes)
/// - Offset 16: roughness, metallic (8 bytes)
/// - Offset 24: albedo and roughness texture ids (8 bytes)
/// - Total size: 32 bytes
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Pod, Zeroable)]
pub struct MaterialConstants {
    /// Base color (albedo)
    pub base_color: Vec4,
    /// Roughness factor
    pub roughness: f32,
    /// Metallic factor
    pub metallic: f32,
    /// Index of the albedo texture in the texture array
    pub albedo_texture: u32,
    /// Index of the roughness texture in the texture array
    pub roughness_texture: u32,
}

impl MaterialConstants {
    /// Size of the struct in bytes.
    pub const SIZE: usize = std::mem::size_of::<Self>();

    /// Packs a material whose texture ids were already resolved.
    pub fn new(material: &Material, albedo_texture: u32, roughness_texture: u32) -> Self {
        Self {
            base_color: material.base_color,
            roughness: material.roughness,
            metallic: material.metallic,
            albedo_texture,
            roughness_texture,
        }
    }
}

/// Bindings of descriptor set 0.
pub fn descriptor_bindings(max_textures: u32) -> [DescriptorBinding; 4] {
    [
        DescriptorBinding::uniform_buffer(
            CAMERA_BINDING,
            vk::ShaderStageFlags::VERTEX | vk::ShaderStageFlags::FRAGMENT,
        ),
        DescriptorBinding::uniform_buffer(XFORMS_BINDING, vk::ShaderStageFlags::VERTEX),
        DescriptorBinding::uniform_buffer(LIGHTS_BINDING, vk::ShaderStageFlags::FRAGMENT),
        DescriptorBinding::combined_image_sampler_array(
            TEXTURES_BINDING,
            max_textures,
            vk::ShaderStageFlags::FRAGMENT,
        )
        .partially_bound(),
    ]
}

/// Push constant ranges of the main pipeline layout.
pub fn push_constant_ranges() -> [vk::PushConstantRange; 2] {
    let fragment_end = MATERIAL_OFFSET + MaterialConstants::SIZE as u32;
    [
        vk::PushConstantRange {
            stage_flags: vk::ShaderStageFlags::VERTEX,
            offset: PRIMITIVE_INDEX_OFFSET,
            size: std::mem::size_of::<u32>() as u32,
        },
        vk::PushConstantRange {
            stage_flags: vk::ShaderStageFlags::FRAGMENT,
            offset: LIGHT_COUNT_OFFSET,
            size: fragment_end - LIGHT_COUNT_OFFSET,
        },
    ]
}
