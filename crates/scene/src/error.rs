//! Scene error types.

use thiserror::Error;

use crate::material::MaterialId;
use crate::texture::TextureId;

/// Error type for scene edits.
#[derive(Error, Debug)]
pub enum SceneError {
    /// Primitive index past the end of the primitive list.
    #[error("No primitive at index {0}")]
    UnknownPrimitive(usize),

    /// Light index past the end of the light list.
    #[error("No light at index {0}")]
    UnknownLight(usize),

    /// The scene holds no material with this id.
    #[error("Unknown {0}")]
    UnknownMaterial(MaterialId),

    /// The scene holds no texture with this id.
    #[error("Unknown {0}")]
    UnknownTexture(TextureId),
}

/// Result type alias for scene operations.
pub type SceneResult<T> = Result<T, SceneError>;
