//! Typed handles for objects owned by a [`RenderBackend`](crate::RenderBackend).
//!
//! Handles are plain ids. They carry no lifetime; the backend validates them
//! on use and reports [`RhiError::InvalidHandle`](crate::RhiError::InvalidHandle)
//! for stale ones.

macro_rules! define_handle {
    ($($(#[$meta:meta])* $name:ident;)*) => {
        $(
            $(#[$meta])*
            #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
            pub struct $name(u64);

            impl $name {
                /// Wraps a raw backend id.
                #[inline]
                pub const fn from_raw(raw: u64) -> Self {
                    Self(raw)
                }

                /// Returns the raw backend id.
                #[inline]
                pub const fn raw(self) -> u64 {
                    self.0
                }
            }

            impl std::fmt::Display for $name {
                fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                    write!(f, "{}#{}", stringify!($name), self.0)
                }
            }
        )*
    };
}

define_handle! {
    /// Host-visible memory region backing a uniform block.
    RegionHandle;
    /// GPU image (depth target or sampled texture).
    ImageHandle;
    /// Framebuffer bound to one swapchain image.
    FramebufferHandle;
    /// Descriptor set layout.
    DescriptorSetLayoutHandle;
    /// Pipeline layout (descriptor set layouts plus push constant ranges).
    PipelineLayoutHandle;
    /// Graphics pipeline state object.
    PipelineHandle;
    /// Descriptor set instance.
    DescriptorSetHandle;
    /// Recorded command sequence.
    CommandSequenceHandle;
    /// GPU-to-CPU completion fence.
    FenceHandle;
    /// GPU-to-GPU semaphore.
    SemaphoreHandle;
    /// Uploaded vertex and index data of one mesh.
    MeshHandle;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_raw_round_trip() {
        let fence = FenceHandle::from_raw(42);
        assert_eq!(fence.raw(), 42);
        assert_eq!(fence, FenceHandle::from_raw(42));
    }

    #[test]
    fn test_display_names_kind() {
        assert_eq!(RegionHandle::from_raw(7).to_string(), "RegionHandle#7");
    }
}
