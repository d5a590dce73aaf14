//! Descriptor set layout descriptions.
//!
//! A [`DescriptorBinding`] describes one binding slot of a descriptor set
//! layout. The builder functions mirror the common binding kinds:
//!
//! ```
//! use ash::vk;
//! use inflight_rhi::descriptor::DescriptorBinding;
//!
//! let bindings = [
//!     DescriptorBinding::uniform_buffer(0, vk::ShaderStageFlags::VERTEX),
//!     DescriptorBinding::combined_image_sampler_array(1, 16, vk::ShaderStageFlags::FRAGMENT)
//!         .partially_bound(),
//! ];
//! assert_eq!(bindings[1].count, 16);
//! ```

use ash::vk;

/// One binding of a descriptor set layout.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DescriptorBinding {
    /// Binding index.
    pub binding: u32,
    /// Descriptor type.
    pub ty: vk::DescriptorType,
    /// Number of array elements.
    pub count: u32,
    /// Shader stages that can access this binding.
    pub stages: vk::ShaderStageFlags,
    /// Extra binding flags (partially bound, update after bind).
    pub flags: vk::DescriptorBindingFlags,
}

impl DescriptorBinding {
    /// Creates a uniform buffer binding.
    ///
    /// # Arguments
    ///
    /// * `binding` - The binding index
    /// * `stages` - The shader stages that can access this binding
    #[inline]
    pub fn uniform_buffer(binding: u32, stages: vk::ShaderStageFlags) -> Self {
        Self {
            binding,
            ty: vk::DescriptorType::UNIFORM_BUFFER,
            count: 1,
            stages,
            flags: vk::DescriptorBindingFlags::empty(),
        }
    }

    /// Creates an array of combined image samplers.
    ///
    /// # Arguments
    ///
    /// * `binding` - The binding index
    /// * `count` - Number of array elements
    /// * `stages` - The shader stages that can access this binding
    #[inline]
    pub fn combined_image_sampler_array(
        binding: u32,
        count: u32,
        stages: vk::ShaderStageFlags,
    ) -> Self {
        Self {
            binding,
            ty: vk::DescriptorType::COMBINED_IMAGE_SAMPLER,
            count,
            stages,
            flags: vk::DescriptorBindingFlags::empty(),
        }
    }

    /// Allows array elements to stay unwritten and to be rewritten while
    /// recorded command sequences still reference the set.
    #[inline]
    pub fn partially_bound(mut self) -> Self {
        self.flags |= vk::DescriptorBindingFlags::PARTIALLY_BOUND
            | vk::DescriptorBindingFlags::UPDATE_AFTER_BIND;
        self
    }

    /// Whether writes to this binding leave recorded command sequences valid.
    #[inline]
    pub fn updates_after_bind(&self) -> bool {
        self.flags
            .contains(vk::DescriptorBindingFlags::UPDATE_AFTER_BIND)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_uniform_buffer_binding() {
        let binding = DescriptorBinding::uniform_buffer(2, vk::ShaderStageFlags::FRAGMENT);
        assert_eq!(binding.binding, 2);
        assert_eq!(binding.ty, vk::DescriptorType::UNIFORM_BUFFER);
        assert_eq!(binding.count, 1);
        assert!(!binding.updates_after_bind());
    }

    #[test]
    fn test_partially_bound_sets_flags() {
        let binding =
            DescriptorBinding::combined_image_sampler_array(3, 8, vk::ShaderStageFlags::FRAGMENT)
                .partially_bound();
        assert!(binding.updates_after_bind());
        assert!(
            binding
                .flags
                .contains(vk::DescriptorBindingFlags::PARTIALLY_BOUND)
        );
    }
}
