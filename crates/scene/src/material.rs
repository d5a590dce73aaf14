//! Material definitions.

use std::fmt;

use glam::Vec4;

use crate::texture::TextureId;

/// Key of a material in the scene.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MaterialId(pub u32);

impl fmt::Display for MaterialId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "material {}", self.0)
    }
}

/// PBR material properties.
///
/// A material is drawable only once both texture slots are assigned.
#[derive(Debug, Clone, PartialEq)]
pub struct Material {
    /// Base color (albedo)
    pub base_color: Vec4,
    /// Roughness factor (0.0 = smooth, 1.0 = rough)
    pub roughness: f32,
    /// Metallic factor (0.0 = dielectric, 1.0 = metal)
    pub metallic: f32,
    /// Albedo texture
    pub albedo_texture: Option<TextureId>,
    /// Roughness texture
    pub roughness_texture: Option<TextureId>,
}

impl Default for Material {
    fn default() -> Self {
        Self {
            base_color: Vec4::new(1.0, 1.0, 1.0, 1.0),
            roughness: 0.5,
            metallic: 0.0,
            albedo_texture: None,
            roughness_texture: None,
        }
    }
}

impl Material {
    /// Material with both texture slots assigned.
    pub fn textured(albedo: TextureId, roughness: TextureId) -> Self {
        Self {
            albedo_texture: Some(albedo),
            roughness_texture: Some(roughness),
            ..Self::default()
        }
    }

    /// Replace the base color.
    pub fn with_base_color(mut self, base_color: Vec4) -> Self {
        self.base_color = base_color;
        self
    }

    /// Replace roughness and metallic factors.
    pub fn with_factors(mut self, roughness: f32, metallic: f32) -> Self {
        self.roughness = roughness;
        self.metallic = metallic;
        self
    }
}
