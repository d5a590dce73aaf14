//! Vertex input descriptions.
//!
//! Scenes describe their mesh data as a list of attribute sizes, one
//! de-interleaved stream per attribute (position, normal, uv, ...). The
//! [`VertexLayout`] turns that into Vulkan vertex input descriptions.
//!
//! # Shader Locations
//!
//! Attribute `i` is read from binding `i` at location `i`, offset 0.

use ash::vk;

use crate::error::{RhiError, RhiResult};

/// Vertex layout of every mesh in a scene.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct VertexLayout {
    attribute_sizes: Vec<u32>,
}

impl VertexLayout {
    /// Creates a layout from per-attribute byte sizes.
    ///
    /// # Errors
    ///
    /// Returns [`RhiError::UnsupportedVertexAttribute`] if a size is not
    /// 4, 8, 12 or 16 bytes (one to four 32-bit floats).
    pub fn new(attribute_sizes: &[u32]) -> RhiResult<Self> {
        if let Some(&bad) = attribute_sizes.iter().find(|&&s| float_format(s).is_none()) {
            return Err(RhiError::UnsupportedVertexAttribute(bad));
        }
        Ok(Self {
            attribute_sizes: attribute_sizes.to_vec(),
        })
    }

    /// Position, normal, uv: the layout of the built-in meshes.
    pub fn position_normal_uv() -> Self {
        Self {
            attribute_sizes: vec![12, 12, 8],
        }
    }

    /// Returns the attribute sizes in bytes.
    #[inline]
    pub fn attribute_sizes(&self) -> &[u32] {
        &self.attribute_sizes
    }

    /// Returns the number of attributes.
    #[inline]
    pub fn attribute_count(&self) -> usize {
        self.attribute_sizes.len()
    }

    /// Get the vertex input binding descriptions.
    ///
    /// One per-vertex binding per attribute stream.
    pub fn binding_descriptions(&self) -> Vec<vk::VertexInputBindingDescription> {
        self.attribute_sizes
            .iter()
            .zip(0u32..)
            .map(|(&size, binding)| vk::VertexInputBindingDescription {
                binding,
                stride: size,
                input_rate: vk::VertexInputRate::VERTEX,
            })
            .collect()
    }

    /// Get the vertex attribute descriptions.
    pub fn attribute_descriptions(&self) -> Vec<vk::VertexInputAttributeDescription> {
        self.attribute_sizes
            .iter()
            .zip(0u32..)
            .filter_map(|(&size, location)| {
                float_format(size).map(|format| vk::VertexInputAttributeDescription {
                    binding: location,
                    location,
                    format,
                    offset: 0,
                })
            })
            .collect()
    }
}

fn float_format(size: u32) -> Option<vk::Format> {
    match size {
        4 => Some(vk::Format::R32_SFLOAT),
        8 => Some(vk::Format::R32G32_SFLOAT),
        12 => Some(vk::Format::R32G32B32_SFLOAT),
        16 => Some(vk::Format::R32G32B32A32_SFLOAT),
        _ => None,
    }
}
