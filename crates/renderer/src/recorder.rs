//! Draw pass recording.
//!
//! [`record_draw_commands`] is a pure function of the scene content and the
//! slot's render targets: recording twice without a content change yields
//! equal command lists. The renderer only calls it when a slot's command
//! sequence is stale.

use ash::vk;
use inflight_rhi::CommandList;
use inflight_rhi::handle::{
    DescriptorSetHandle, FramebufferHandle, PipelineHandle, PipelineLayoutHandle,
};
use inflight_scene::{Material, MaterialId, Scene, TextureId};

use crate::error::{RendererError, RendererResult};
use crate::ubo::{LIGHT_COUNT_OFFSET, MATERIAL_OFFSET, MaterialConstants, PRIMITIVE_INDEX_OFFSET};

/// Everything a slot's draw pass binds besides scene content.
#[derive(Clone, Copy, Debug)]
pub struct DrawTargets {
    /// Framebuffer of the slot's swapchain image.
    pub framebuffer: FramebufferHandle,
    /// Render area.
    pub extent: vk::Extent2D,
    /// Graphics pipeline.
    pub pipeline: PipelineHandle,
    /// Layout of the pipeline.
    pub pipeline_layout: PipelineLayoutHandle,
    /// The slot's descriptor set.
    pub descriptor_set: DescriptorSetHandle,
    /// Color clear value.
    pub clear_color: [f32; 4],
    /// Depth clear value.
    pub clear_depth: f32,
    /// Number of transforms the slot's region holds.
    pub xform_capacity: usize,
    /// Size of the texture array.
    pub max_textures: usize,
}

/// Records the full draw pass for `scene`.
///
/// # Errors
///
/// - [`RendererError::CapacityExceeded`] if the scene has more primitives
///   than the slot's transform region holds
/// - [`RendererError::UnknownMaterial`] if a primitive's material is missing
/// - [`RendererError::MaterialMissingTexture`] if a drawn material lacks an
///   albedo or roughness texture
/// - [`RendererError::TextureIdOutOfRange`] if a material texture id does
///   not fit the texture array
/// - [`RendererError::UnknownTexture`] if a material texture id is not in
///   the scene
pub fn record_draw_commands(targets: &DrawTargets, scene: &Scene) -> RendererResult<CommandList> {
    let primitives = scene.primitives();
    if primitives.len() > targets.xform_capacity {
        return Err(RendererError::CapacityExceeded {
            what: "primitive",
            requested: primitives.len(),
            max: targets.xform_capacity,
        });
    }
    let light_count = u32::try_from(scene.lights().len()).map_err(|_| {
        RendererError::CapacityExceeded {
            what: "light",
            requested: scene.lights().len(),
            max: u32::MAX as usize,
        }
    })?;

    let mut list = CommandList::new();
    list.begin_render_pass(
        targets.framebuffer,
        targets.extent,
        targets.clear_color,
        targets.clear_depth,
    );
    list.bind_pipeline(targets.pipeline);
    list.bind_descriptor_set(targets.pipeline_layout, targets.descriptor_set);
    list.push_constants(
        targets.pipeline_layout,
        vk::ShaderStageFlags::FRAGMENT,
        LIGHT_COUNT_OFFSET,
        &light_count,
    );

    for (index, primitive) in (0u32..).zip(primitives) {
        let material = scene
            .material(primitive.material)
            .ok_or(RendererError::UnknownMaterial {
                primitive: index as usize,
                material: primitive.material,
            })?;
        let constants =
            material_constants(scene, primitive.material, material, targets.max_textures)?;

        list.push_constants(
            targets.pipeline_layout,
            vk::ShaderStageFlags::VERTEX,
            PRIMITIVE_INDEX_OFFSET,
            &index,
        );
        list.push_constants(
            targets.pipeline_layout,
            vk::ShaderStageFlags::FRAGMENT,
            MATERIAL_OFFSET,
            &constants,
        );
        list.draw_mesh(primitive.mesh, primitive.index_count);
    }

    list.end_render_pass();
    Ok(list)
}

fn material_constants(
    scene: &Scene,
    id: MaterialId,
    material: &Material,
    max_textures: usize,
) -> RendererResult<MaterialConstants> {
    let albedo = texture_slot(scene, id, material.albedo_texture, "albedo", max_textures)?;
    let roughness = texture_slot(
        scene,
        id,
        material.roughness_texture,
        "roughness",
        max_textures,
    )?;
    Ok(MaterialConstants::new(material, albedo, roughness))
}

fn texture_slot(
    scene: &Scene,
    material: MaterialId,
    texture: Option<TextureId>,
    slot: &'static str,
    max_textures: usize,
) -> RendererResult<u32> {
    let id = texture.ok_or(RendererError::MaterialMissingTexture { material, slot })?;
    if id.0 as usize >= max_textures {
        return Err(RendererError::TextureIdOutOfRange {
            id,
            max: max_textures,
        });
    }
    if !scene.textures().contains_key(&id) {
        return Err(RendererError::UnknownTexture { material, slot, id });
    }
    Ok(id.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::Mat4;
    use inflight_rhi::Command;
    use inflight_rhi::handle::{ImageHandle, MeshHandle};
    use inflight_scene::{PointLight, Primitive, Texture};

    fn targets() -> DrawTargets {
        DrawTargets {
            framebuffer: FramebufferHandle::from_raw(1),
            extent: vk::Extent2D {
                width: 100,
                height: 100,
            },
            pipeline: PipelineHandle::from_raw(2),
            pipeline_layout: PipelineLayoutHandle::from_raw(3),
            descriptor_set: DescriptorSetHandle::from_raw(4),
            clear_color: [0.0, 0.0, 0.0, 1.0],
            clear_depth: 1.0,
            xform_capacity: 16,
            max_textures: 16,
        }
    }

    fn scene() -> Scene {
        let mut scene = Scene::default();
        scene.insert_texture(TextureId(0), Texture::new(ImageHandle::from_raw(20)));
        scene.insert_texture(TextureId(1), Texture::new(ImageHandle::from_raw(21)));
        scene.insert_material(MaterialId(0), Material::textured(TextureId(0), TextureId(1)));
        scene.add_primitive(
            Primitive::new(MeshHandle::from_raw(10), 36, MaterialId(0)),
            Mat4::IDENTITY,
        );
        scene.add_primitive(
            Primitive::new(MeshHandle::from_raw(11), 6, MaterialId(0)),
            Mat4::IDENTITY,
        );
        scene.add_light(PointLight::default());
        scene
    }

    #[test]
    fn test_draw_pass_structure() {
        let list = record_draw_commands(&targets(), &scene()).unwrap();
        let commands = list.commands();

        assert!(matches!(commands[0], Command::BeginRenderPass { .. }));
        assert!(matches!(commands[1], Command::BindPipeline(_)));
        assert!(matches!(commands[2], Command::BindDescriptorSet { .. }));
        match &commands[3] {
            Command::PushConstants { offset, data, .. } => {
                assert_eq!(*offset, LIGHT_COUNT_OFFSET);
                assert_eq!(data.as_slice(), 1u32.to_ne_bytes().as_slice());
            }
            other => panic!("expected light count push, got {other:?}"),
        }
        // Three commands per primitive
        assert_eq!(list.len(), 4 + 2 * 3 + 1);
        assert_eq!(list.draw_count(), 2);
        assert!(matches!(commands.last(), Some(Command::EndRenderPass)));
    }

    #[test]
    fn test_primitive_index_pushed_per_draw() {
        let list = record_draw_commands(&targets(), &scene()).unwrap();
        let indices: Vec<Vec<u8>> = list
            .commands()
            .iter()
            .filter_map(|c| match c {
                Command::PushConstants {
                    stages, data, ..
                } if *stages == vk::ShaderStageFlags::VERTEX => Some(data.clone()),
                _ => None,
            })
            .collect();
        assert_eq!(
            indices,
            vec![0u32.to_ne_bytes().to_vec(), 1u32.to_ne_bytes().to_vec()]
        );
    }

    #[test]
    fn test_recording_is_deterministic() {
        let scene = scene();
        assert_eq!(
            record_draw_commands(&targets(), &scene).unwrap(),
            record_draw_commands(&targets(), &scene).unwrap()
        );
    }

    #[test]
    fn test_missing_roughness_texture_is_error() {
        let mut scene = scene();
        scene
            .update_material(MaterialId(0), |m| m.roughness_texture = None)
            .unwrap();
        let err = record_draw_commands(&targets(), &scene).unwrap_err();
        assert!(matches!(
            err,
            RendererError::MaterialMissingTexture {
                slot: "roughness",
                ..
            }
        ));
    }

    #[test]
    fn test_unknown_material_is_error() {
        let mut scene = scene();
        scene.set_primitive_material(1, MaterialId(9)).unwrap();
        let err = record_draw_commands(&targets(), &scene).unwrap_err();
        assert!(matches!(
            err,
            RendererError::UnknownMaterial {
                primitive: 1,
                material: MaterialId(9)
            }
        ));
    }

    #[test]
    fn test_texture_missing_from_scene_is_error() {
        let mut scene = scene();
        scene
            .update_material(MaterialId(0), |m| m.roughness_texture = Some(TextureId(7)))
            .unwrap();
        let err = record_draw_commands(&targets(), &scene).unwrap_err();
        assert!(matches!(
            err,
            RendererError::UnknownTexture {
                material: MaterialId(0),
                slot: "roughness",
                id: TextureId(7)
            }
        ));
    }

    #[test]
    fn test_primitives_beyond_capacity_rejected() {
        let targets = DrawTargets {
            xform_capacity: 1,
            ..targets()
        };
        let err = record_draw_commands(&targets, &scene()).unwrap_err();
        assert!(matches!(err, RendererError::CapacityExceeded { what: "primitive", .. }));
    }
}
