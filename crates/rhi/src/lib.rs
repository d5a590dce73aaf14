//! Device interface (Render Hardware Interface).
//!
//! This crate defines the narrow surface the frame synchronization core
//! uses to reach the GPU:
//! - Typed object handles
//! - The [`RenderBackend`] trait (regions, images, descriptors, pipelines,
//!   command sequences, fences, semaphores, swapchain)
//! - Backend-independent command lists
//! - Vertex input and descriptor layout descriptions
//! - A validating in-memory backend for tests and headless runs

mod error;

pub mod backend;
pub mod command;
pub mod descriptor;
pub mod handle;
pub mod headless;
pub mod vertex;

pub use backend::{
    FramebufferDesc, GraphicsPipelineDesc, ImageDesc, PipelineLayoutDesc, RenderBackend,
    SwapchainStatus,
};
pub use command::{Command, CommandList};
pub use descriptor::DescriptorBinding;
pub use error::{RhiError, RhiResult};
pub use headless::HeadlessBackend;
pub use vertex::VertexLayout;

// Re-export ash types that users might need
pub use ash::vk;
