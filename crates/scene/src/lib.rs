//! Scene state and components.
//!
//! This crate provides the application-owned scene:
//! - Camera, lights, materials and textures
//! - Primitives with their world transforms
//! - The [`SceneDirt`] mask the renderer consumes once per frame

pub mod camera;
pub mod dirt;
mod error;
pub mod light;
pub mod material;
pub mod scene;
pub mod texture;
pub mod transform;

pub use camera::{Camera, Projection};
pub use dirt::SceneDirt;
pub use error::{SceneError, SceneResult};
pub use light::{DirectionalLight, Light, PointLight, SpotLight};
pub use material::{Material, MaterialId};
pub use scene::{Primitive, Scene};
pub use texture::{Texture, TextureId};
pub use transform::Transform;
