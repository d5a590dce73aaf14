//! RHI-specific error types.

use thiserror::Error;

/// RHI-specific error type.
#[derive(Error, Debug)]
pub enum RhiError {
    /// Vulkan API error
    #[error("Vulkan error: {0}")]
    VulkanError(#[from] ash::vk::Result),

    /// A handle that was never created or was already destroyed
    #[error("Invalid handle: {0}")]
    InvalidHandle(String),

    /// A resource is still referenced by a submission that has not completed
    #[error("Resource in use by the GPU: {0}")]
    ResourceInUse(String),

    /// A write fell outside the bounds of a resource region
    #[error("Write of {len} bytes at offset {offset} exceeds region size {size}")]
    OutOfBounds {
        /// Byte offset of the write.
        offset: u64,
        /// Length of the write.
        len: u64,
        /// Size of the region.
        size: u64,
    },

    /// A fence was submitted without being reset first
    #[error("Fence {0} submitted while still signaled")]
    FenceNotReset(u64),

    /// A fence was waited on that no pending submission will ever signal
    #[error("Fence {0} would never be signaled")]
    FenceNeverSignaled(u64),

    /// A vertex attribute size has no matching float format
    #[error("Unsupported vertex attribute size: {0} bytes")]
    UnsupportedVertexAttribute(u32),

    /// A command sequence was submitted after a descriptor it binds was rewritten
    #[error("Command sequence must be re-recorded: {0}")]
    StaleCommandSequence(String),

    /// The swapchain cannot be recreated while dependent objects exist
    #[error("Swapchain busy: {0}")]
    SwapchainBusy(String),
}

/// Result type alias for RHI operations.
pub type RhiResult<T> = std::result::Result<T, RhiError>;
