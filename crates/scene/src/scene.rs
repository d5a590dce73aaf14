//! The mutable scene observed by the renderer.
//!
//! The scene is owned by the application. Every mutator records what it
//! touched in a [`SceneDirt`] mask; the renderer reads and clears that mask
//! once per frame through [`Scene::take_dirt`] and never mutates anything
//! else.
//!
//! # Example
//!
//! ```
//! use glam::Mat4;
//! use inflight_rhi::handle::MeshHandle;
//! use inflight_scene::{MaterialId, Primitive, Scene, SceneDirt};
//!
//! let mut scene = Scene::default();
//! scene.take_dirt();
//!
//! let cube = scene.add_primitive(
//!     Primitive::new(MeshHandle::from_raw(1), 36, MaterialId(0)),
//!     Mat4::IDENTITY,
//! );
//! scene.set_xform(cube, Mat4::from_scale(glam::Vec3::splat(2.0))).unwrap();
//!
//! assert_eq!(scene.take_dirt(), SceneDirt::PRIMITIVES | SceneDirt::XFORMS);
//! assert!(scene.dirt().is_empty());
//! ```

use std::collections::BTreeMap;

use glam::Mat4;
use inflight_rhi::VertexLayout;
use inflight_rhi::handle::MeshHandle;

use crate::camera::Camera;
use crate::dirt::SceneDirt;
use crate::error::{SceneError, SceneResult};
use crate::light::Light;
use crate::material::{Material, MaterialId};
use crate::texture::{Texture, TextureId};

/// One drawable: a mesh drawn with a material.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Primitive {
    /// Uploaded mesh.
    pub mesh: MeshHandle,
    /// Number of indices drawn.
    pub index_count: u32,
    /// Material used for shading.
    pub material: MaterialId,
}

impl Primitive {
    /// Creates a primitive.
    pub fn new(mesh: MeshHandle, index_count: u32, material: MaterialId) -> Self {
        Self {
            mesh,
            index_count,
            material,
        }
    }
}

/// Scene content plus its mutation mask.
#[derive(Clone, Debug)]
pub struct Scene {
    camera: Camera,
    primitives: Vec<Primitive>,
    xforms: Vec<Mat4>,
    lights: Vec<Light>,
    materials: BTreeMap<MaterialId, Material>,
    textures: BTreeMap<TextureId, Texture>,
    vertex_layout: VertexLayout,
    dirt: SceneDirt,
}

impl Default for Scene {
    fn default() -> Self {
        Self::new(VertexLayout::position_normal_uv())
    }
}

impl Scene {
    /// Creates an empty scene whose meshes use `vertex_layout`.
    ///
    /// A new scene reports every category dirty.
    pub fn new(vertex_layout: VertexLayout) -> Self {
        Self {
            camera: Camera::default(),
            primitives: Vec::new(),
            xforms: Vec::new(),
            lights: Vec::new(),
            materials: BTreeMap::new(),
            textures: BTreeMap::new(),
            vertex_layout,
            dirt: SceneDirt::all(),
        }
    }

    // ---- Mutation mask ----

    /// Categories mutated since the last [`take_dirt`](Self::take_dirt).
    #[inline]
    pub fn dirt(&self) -> SceneDirt {
        self.dirt
    }

    /// Returns the mutation mask and clears it.
    pub fn take_dirt(&mut self) -> SceneDirt {
        std::mem::take(&mut self.dirt)
    }

    /// Flags categories as mutated without changing content.
    pub fn mark(&mut self, dirt: SceneDirt) {
        self.dirt |= dirt;
    }

    // ---- Camera ----

    /// The scene camera.
    pub fn camera(&self) -> &Camera {
        &self.camera
    }

    /// Mutable access to the camera; flags it dirty.
    pub fn camera_mut(&mut self) -> &mut Camera {
        self.dirt |= SceneDirt::CAMERA;
        &mut self.camera
    }

    /// Replaces the camera.
    pub fn set_camera(&mut self, camera: Camera) {
        self.camera = camera;
        self.dirt |= SceneDirt::CAMERA;
    }

    // ---- Primitives ----

    /// Primitives in draw order.
    pub fn primitives(&self) -> &[Primitive] {
        &self.primitives
    }

    /// World transforms, parallel to [`primitives`](Self::primitives).
    pub fn xforms(&self) -> &[Mat4] {
        &self.xforms
    }

    /// Number of primitives.
    pub fn primitive_count(&self) -> usize {
        self.primitives.len()
    }

    /// Appends a primitive and returns its index.
    pub fn add_primitive(&mut self, primitive: Primitive, xform: Mat4) -> usize {
        self.primitives.push(primitive);
        self.xforms.push(xform);
        self.dirt |= SceneDirt::PRIMITIVES | SceneDirt::XFORMS;
        self.primitives.len() - 1
    }

    /// Removes a primitive; later primitives shift down by one.
    pub fn remove_primitive(&mut self, index: usize) -> SceneResult<Primitive> {
        if index >= self.primitives.len() {
            return Err(SceneError::UnknownPrimitive(index));
        }
        self.xforms.remove(index);
        self.dirt |= SceneDirt::PRIMITIVES | SceneDirt::XFORMS;
        Ok(self.primitives.remove(index))
    }

    /// Sets the world transform of a primitive.
    pub fn set_xform(&mut self, index: usize, xform: Mat4) -> SceneResult<()> {
        let slot = self
            .xforms
            .get_mut(index)
            .ok_or(SceneError::UnknownPrimitive(index))?;
        *slot = xform;
        self.dirt |= SceneDirt::XFORMS;
        Ok(())
    }

    /// Reassigns the material of a primitive.
    pub fn set_primitive_material(&mut self, index: usize, material: MaterialId) -> SceneResult<()> {
        let primitive = self
            .primitives
            .get_mut(index)
            .ok_or(SceneError::UnknownPrimitive(index))?;
        primitive.material = material;
        self.dirt |= SceneDirt::PRIMITIVES;
        Ok(())
    }

    // ---- Lights ----

    /// Lights in upload order.
    pub fn lights(&self) -> &[Light] {
        &self.lights
    }

    /// Appends a light and returns its index.
    pub fn add_light(&mut self, light: impl Into<Light>) -> usize {
        self.lights.push(light.into());
        self.dirt |= SceneDirt::LIGHTS;
        self.lights.len() - 1
    }

    /// Replaces a light.
    pub fn set_light(&mut self, index: usize, light: impl Into<Light>) -> SceneResult<()> {
        let slot = self
            .lights
            .get_mut(index)
            .ok_or(SceneError::UnknownLight(index))?;
        *slot = light.into();
        self.dirt |= SceneDirt::LIGHTS;
        Ok(())
    }

    /// Removes a light; later lights shift down by one.
    pub fn remove_light(&mut self, index: usize) -> SceneResult<Light> {
        if index >= self.lights.len() {
            return Err(SceneError::UnknownLight(index));
        }
        self.dirt |= SceneDirt::LIGHTS;
        Ok(self.lights.remove(index))
    }

    // ---- Materials ----

    /// Looks up a material.
    pub fn material(&self, id: MaterialId) -> Option<&Material> {
        self.materials.get(&id)
    }

    /// All materials by id.
    pub fn materials(&self) -> &BTreeMap<MaterialId, Material> {
        &self.materials
    }

    /// Inserts or replaces a material, returning the previous one.
    pub fn insert_material(&mut self, id: MaterialId, material: Material) -> Option<Material> {
        self.dirt |= SceneDirt::MATERIALS;
        self.materials.insert(id, material)
    }

    /// Edits a material in place.
    pub fn update_material(
        &mut self,
        id: MaterialId,
        edit: impl FnOnce(&mut Material),
    ) -> SceneResult<()> {
        let material = self
            .materials
            .get_mut(&id)
            .ok_or(SceneError::UnknownMaterial(id))?;
        edit(material);
        self.dirt |= SceneDirt::MATERIALS;
        Ok(())
    }

    /// Removes a material. Primitives still using it fail to draw.
    pub fn remove_material(&mut self, id: MaterialId) -> SceneResult<Material> {
        let material = self
            .materials
            .remove(&id)
            .ok_or(SceneError::UnknownMaterial(id))?;
        self.dirt |= SceneDirt::MATERIALS;
        Ok(material)
    }

    // ---- Textures ----

    /// All textures by id.
    pub fn textures(&self) -> &BTreeMap<TextureId, Texture> {
        &self.textures
    }

    /// Active texture ids in ascending order.
    pub fn texture_ids(&self) -> impl Iterator<Item = TextureId> + '_ {
        self.textures.keys().copied()
    }

    /// Inserts or replaces a texture, returning the previous one.
    pub fn insert_texture(&mut self, id: TextureId, texture: Texture) -> Option<Texture> {
        self.dirt |= SceneDirt::TEXTURES;
        self.textures.insert(id, texture)
    }

    /// Removes a texture.
    pub fn remove_texture(&mut self, id: TextureId) -> SceneResult<Texture> {
        let texture = self
            .textures
            .remove(&id)
            .ok_or(SceneError::UnknownTexture(id))?;
        self.dirt |= SceneDirt::TEXTURES;
        Ok(texture)
    }

    // ---- Geometry ----

    /// Vertex layout shared by every mesh in the scene.
    pub fn vertex_layout(&self) -> &VertexLayout {
        &self.vertex_layout
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::light::PointLight;
    use inflight_rhi::handle::ImageHandle;

    fn clean_scene() -> Scene {
        let mut scene = Scene::default();
        scene.take_dirt();
        scene
    }

    fn primitive() -> Primitive {
        Primitive::new(MeshHandle::from_raw(1), 6, MaterialId(0))
    }

    #[test]
    fn test_new_scene_is_fully_dirty() {
        let mut scene = Scene::default();
        assert_eq!(scene.take_dirt(), SceneDirt::all());
        assert_eq!(scene.take_dirt(), SceneDirt::empty());
    }

    #[test]
    fn test_camera_mut_marks_camera() {
        let mut scene = clean_scene();
        scene.camera_mut().set_aspect(1.0);
        assert_eq!(scene.dirt(), SceneDirt::CAMERA);
    }

    #[test]
    fn test_xforms_stay_parallel_to_primitives() {
        let mut scene = clean_scene();
        scene.add_primitive(primitive(), Mat4::IDENTITY);
        let second = scene.add_primitive(primitive(), Mat4::from_scale(glam::Vec3::splat(2.0)));
        scene.remove_primitive(0).unwrap();

        assert_eq!(second, 1);
        assert_eq!(scene.primitives().len(), scene.xforms().len());
        assert_eq!(scene.xforms()[0], Mat4::from_scale(glam::Vec3::splat(2.0)));
    }

    #[test]
    fn test_set_xform_marks_only_xforms() {
        let mut scene = clean_scene();
        scene.add_primitive(primitive(), Mat4::IDENTITY);
        scene.take_dirt();

        scene.set_xform(0, Mat4::ZERO).unwrap();
        assert_eq!(scene.take_dirt(), SceneDirt::XFORMS);
    }

    #[test]
    fn test_out_of_range_edits_fail_without_marking() {
        let mut scene = clean_scene();
        assert!(matches!(
            scene.set_xform(3, Mat4::IDENTITY),
            Err(SceneError::UnknownPrimitive(3))
        ));
        assert!(matches!(
            scene.set_light(0, PointLight::default()),
            Err(SceneError::UnknownLight(0))
        ));
        assert!(scene.dirt().is_empty());
    }

    #[test]
    fn test_material_and_texture_edits() {
        let mut scene = clean_scene();
        scene.insert_material(MaterialId(1), Material::textured(TextureId(0), TextureId(1)));
        scene
            .update_material(MaterialId(1), |m| m.roughness = 0.9)
            .unwrap();
        assert_eq!(scene.take_dirt(), SceneDirt::MATERIALS);

        scene.insert_texture(TextureId(4), Texture::new(ImageHandle::from_raw(9)));
        scene.insert_texture(TextureId(2), Texture::new(ImageHandle::from_raw(8)));
        assert_eq!(scene.take_dirt(), SceneDirt::TEXTURES);

        let ids: Vec<_> = scene.texture_ids().collect();
        assert_eq!(ids, vec![TextureId(2), TextureId(4)]);
        assert!(matches!(
            scene.remove_texture(TextureId(7)),
            Err(SceneError::UnknownTexture(TextureId(7)))
        ));
    }
}
