//! Frames-in-flight synchronization core.
//!
//! This crate keeps N copies of per-frame GPU state coherent with a mutable
//! scene while up to N frames execute concurrently:
//! - Per-category dirty tracking across frame slots
//! - Per-slot resource regions, descriptors and command sequences
//! - Command sequence re-recording only when draw content changes
//! - Swapchain-dependent target rebuilds

pub mod dirty;
mod error;
pub mod frame_slot;
pub mod rebuild;
pub mod recorder;
mod renderer;
pub mod ubo;

pub use dirty::{DirtyCategory, DirtyTracker};
pub use error::{RendererError, RendererResult};
pub use frame_slot::{FrameSlot, ResourceRegion};
pub use renderer::{FrameOutcome, FrameReport, Renderer};
