//! Textures referenced by materials.

use std::fmt;

use inflight_rhi::handle::ImageHandle;

/// Sparse texture key. Doubles as the element index in the shader's
/// texture array.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TextureId(pub u32);

impl fmt::Display for TextureId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "texture {}", self.0)
    }
}

/// An uploaded, sampleable texture.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Texture {
    /// Image holding the texels.
    pub image: ImageHandle,
}

impl Texture {
    /// Wraps an uploaded image.
    pub fn new(image: ImageHandle) -> Self {
        Self { image }
    }
}
