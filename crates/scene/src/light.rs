//! Light definitions for the scene.

use glam::Vec3;

/// A directional light (sun-like).
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct DirectionalLight {
    /// Light direction (normalized)
    pub direction: Vec3,
    /// Light color
    pub color: Vec3,
    /// Light intensity
    pub intensity: f32,
}

impl Default for DirectionalLight {
    fn default() -> Self {
        Self {
            direction: Vec3::new(0.0, -1.0, 0.0),
            color: Vec3::ONE,
            intensity: 1.0,
        }
    }
}

/// A point light (omnidirectional).
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct PointLight {
    /// Light position in world space
    pub position: Vec3,
    /// Attenuation radius
    pub radius: f32,
    /// Light color
    pub color: Vec3,
    /// Light intensity
    pub intensity: f32,
}

impl Default for PointLight {
    fn default() -> Self {
        Self {
            position: Vec3::ZERO,
            radius: 10.0,
            color: Vec3::ONE,
            intensity: 1.0,
        }
    }
}

/// A spot light (cone-shaped).
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SpotLight {
    /// Light position in world space
    pub position: Vec3,
    /// Light direction (normalized)
    pub direction: Vec3,
    /// Light color
    pub color: Vec3,
    /// Light intensity
    pub intensity: f32,
    /// Attenuation radius
    pub radius: f32,
    /// Inner cone angle cosine
    pub inner_cutoff: f32,
    /// Outer cone angle cosine
    pub outer_cutoff: f32,
}

impl Default for SpotLight {
    fn default() -> Self {
        Self {
            position: Vec3::ZERO,
            direction: Vec3::new(0.0, -1.0, 0.0),
            color: Vec3::ONE,
            intensity: 1.0,
            radius: 10.0,
            inner_cutoff: 0.9, // ~25 degrees
            outer_cutoff: 0.8, // ~37 degrees
        }
    }
}

/// Any light the scene can hold.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Light {
    /// Sun-like light.
    Directional(DirectionalLight),
    /// Omnidirectional light.
    Point(PointLight),
    /// Cone light.
    Spot(SpotLight),
}

impl Light {
    /// Shader-side discriminant of the light kind.
    pub fn kind_code(&self) -> u32 {
        match self {
            Light::Directional(_) => 0,
            Light::Point(_) => 1,
            Light::Spot(_) => 2,
        }
    }

    /// Light color.
    pub fn color(&self) -> Vec3 {
        match self {
            Light::Directional(l) => l.color,
            Light::Point(l) => l.color,
            Light::Spot(l) => l.color,
        }
    }

    /// Light intensity.
    pub fn intensity(&self) -> f32 {
        match self {
            Light::Directional(l) => l.intensity,
            Light::Point(l) => l.intensity,
            Light::Spot(l) => l.intensity,
        }
    }
}

impl From<DirectionalLight> for Light {
    fn from(light: DirectionalLight) -> Self {
        Light::Directional(light)
    }
}

impl From<PointLight> for Light {
    fn from(light: PointLight) -> Self {
        Light::Point(light)
    }
}

impl From<SpotLight> for Light {
    fn from(light: SpotLight) -> Self {
        Light::Spot(light)
    }
}
