//! Renderer error types.
//!
//! Every variant except the wrapped backend errors is a configuration
//! violation: the scene or the swapchain does not fit what the renderer was
//! initialized for. None of them are retried; swapchain invalidation is
//! handled internally and never surfaces as an error.

use inflight_rhi::RhiError;
use inflight_scene::{MaterialId, SceneError, TextureId};
use thiserror::Error;

/// Renderer error type.
#[derive(Error, Debug)]
pub enum RendererError {
    /// Device or resource failure
    #[error("RHI error: {0}")]
    Rhi(#[from] RhiError),

    /// Invalid scene edit
    #[error("Scene error: {0}")]
    Scene(#[from] SceneError),

    /// Invalid configuration
    #[error("Configuration error: {0}")]
    Config(#[from] inflight_core::Error),

    /// A frame was requested before any scene was bound
    #[error("No scene bound; call bind_scene before rendering")]
    NoSceneBound,

    /// The scene holds more items than the configured maximum
    #[error("{what} count {requested} exceeds the maximum of {max}")]
    CapacityExceeded {
        /// Kind of item.
        what: &'static str,
        /// Number the scene asked for.
        requested: usize,
        /// Configured maximum.
        max: usize,
    },

    /// A drawn material lacks one of its texture slots
    #[error("{material} has no {slot} texture")]
    MaterialMissingTexture {
        /// Offending material.
        material: MaterialId,
        /// `"albedo"` or `"roughness"`.
        slot: &'static str,
    },

    /// A drawn material references a texture the scene does not hold
    #[error("{material} uses {id} as its {slot} texture, but the scene has no such texture")]
    UnknownTexture {
        /// Offending material.
        material: MaterialId,
        /// `"albedo"` or `"roughness"`.
        slot: &'static str,
        /// Missing texture.
        id: TextureId,
    },

    /// The scene passed to a frame does not match the bound vertex layout
    #[error("Scene vertex layout differs from the one bound with bind_scene")]
    VertexLayoutMismatch,

    /// A primitive references a material the scene does not hold
    #[error("Primitive {primitive} uses unknown {material}")]
    UnknownMaterial {
        /// Primitive index.
        primitive: usize,
        /// Missing material.
        material: MaterialId,
    },

    /// A texture id does not fit the shader's texture array
    #[error("{id} is outside the texture array of {max} entries")]
    TextureIdOutOfRange {
        /// Offending id.
        id: TextureId,
        /// Array size.
        max: usize,
    },

    /// Pre-recorded sequences pair each slot with one swapchain image
    #[error("Swapchain has {images} images but {slots} frames are in flight")]
    SlotImageMismatch {
        /// Swapchain image count.
        images: usize,
        /// Configured frames in flight.
        slots: usize,
    },
}

/// Result type alias for renderer operations.
pub type RendererResult<T> = Result<T, RendererError>;
