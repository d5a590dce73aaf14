//! Command lists recorded into command sequences.
//!
//! A [`CommandList`] is the backend-independent form of one draw pass. The
//! renderer builds it on the CPU and hands it to
//! [`RenderBackend::record_command_sequence`](crate::RenderBackend::record_command_sequence),
//! which translates it into native command buffer recording.
//!
//! Command lists compare by value, so two recordings of the same scene
//! content produce equal lists.
//!
//! # Example
//!
//! ```
//! use ash::vk;
//! use inflight_rhi::command::{Command, CommandList};
//! use inflight_rhi::handle::{FramebufferHandle, MeshHandle, PipelineHandle};
//!
//! let mut list = CommandList::new();
//! list.begin_render_pass(
//!     FramebufferHandle::from_raw(1),
//!     vk::Extent2D { width: 1280, height: 720 },
//!     [0.0, 0.0, 0.0, 1.0],
//!     1.0,
//! );
//! list.bind_pipeline(PipelineHandle::from_raw(2));
//! list.draw_mesh(MeshHandle::from_raw(3), 36);
//! list.end_render_pass();
//!
//! assert_eq!(list.draw_count(), 1);
//! assert!(matches!(list.commands()[0], Command::BeginRenderPass { .. }));
//! ```

use ash::vk;
use bytemuck::Pod;

use crate::handle::{
    DescriptorSetHandle, FramebufferHandle, MeshHandle, PipelineHandle, PipelineLayoutHandle,
};

/// One recorded GPU command.
#[derive(Clone, Debug, PartialEq)]
pub enum Command {
    /// Begin the main render pass, clearing color and depth.
    BeginRenderPass {
        /// Target framebuffer.
        framebuffer: FramebufferHandle,
        /// Render area.
        extent: vk::Extent2D,
        /// Color clear value.
        clear_color: [f32; 4],
        /// Depth clear value.
        clear_depth: f32,
    },
    /// Bind a graphics pipeline.
    BindPipeline(PipelineHandle),
    /// Bind a descriptor set at set index 0.
    BindDescriptorSet {
        /// Layout the set is bound through.
        layout: PipelineLayoutHandle,
        /// Descriptor set.
        set: DescriptorSetHandle,
    },
    /// Update push constant memory.
    PushConstants {
        /// Layout containing the push constant range.
        layout: PipelineLayoutHandle,
        /// Stages the range is visible to.
        stages: vk::ShaderStageFlags,
        /// Byte offset in push constant memory.
        offset: u32,
        /// Raw bytes.
        data: Vec<u8>,
    },
    /// Draw one mesh with its index buffer.
    DrawMesh {
        /// Mesh to draw.
        mesh: MeshHandle,
        /// Number of indices.
        index_count: u32,
    },
    /// End the render pass.
    EndRenderPass,
}

/// An ordered list of commands for one command sequence.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct CommandList {
    commands: Vec<Command>,
}

impl CommandList {
    /// Creates an empty command list.
    pub fn new() -> Self {
        Self::default()
    }

    /// Begins a render pass on `framebuffer`.
    pub fn begin_render_pass(
        &mut self,
        framebuffer: FramebufferHandle,
        extent: vk::Extent2D,
        clear_color: [f32; 4],
        clear_depth: f32,
    ) {
        self.commands.push(Command::BeginRenderPass {
            framebuffer,
            extent,
            clear_color,
            clear_depth,
        });
    }

    /// Binds a graphics pipeline.
    pub fn bind_pipeline(&mut self, pipeline: PipelineHandle) {
        self.commands.push(Command::BindPipeline(pipeline));
    }

    /// Binds a descriptor set.
    pub fn bind_descriptor_set(&mut self, layout: PipelineLayoutHandle, set: DescriptorSetHandle) {
        self.commands
            .push(Command::BindDescriptorSet { layout, set });
    }

    /// Updates push constant data.
    ///
    /// # Arguments
    ///
    /// * `layout` - Pipeline layout containing push constant ranges
    /// * `stages` - Shader stages that will use the push constants
    /// * `offset` - Byte offset within push constant memory
    /// * `data` - Data to push
    pub fn push_constants<T: Pod>(
        &mut self,
        layout: PipelineLayoutHandle,
        stages: vk::ShaderStageFlags,
        offset: u32,
        data: &T,
    ) {
        self.commands.push(Command::PushConstants {
            layout,
            stages,
            offset,
            data: bytemuck::bytes_of(data).to_vec(),
        });
    }

    /// Draws a mesh.
    pub fn draw_mesh(&mut self, mesh: MeshHandle, index_count: u32) {
        self.commands
            .push(Command::DrawMesh { mesh, index_count });
    }

    /// Ends the render pass.
    pub fn end_render_pass(&mut self) {
        self.commands.push(Command::EndRenderPass);
    }

    /// Returns the recorded commands.
    #[inline]
    pub fn commands(&self) -> &[Command] {
        &self.commands
    }

    /// Returns the number of commands.
    #[inline]
    pub fn len(&self) -> usize {
        self.commands.len()
    }

    /// Returns true if nothing was recorded.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }

    /// Number of draw calls in the list.
    pub fn draw_count(&self) -> usize {
        self.commands
            .iter()
            .filter(|c| matches!(c, Command::DrawMesh { .. }))
            .count()
    }

    /// Descriptor sets bound by the list.
    pub fn descriptor_sets(&self) -> impl Iterator<Item = DescriptorSetHandle> + '_ {
        self.commands.iter().filter_map(|c| match c {
            Command::BindDescriptorSet { set, .. } => Some(*set),
            _ => None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_push_constants_stores_bytes() {
        let mut list = CommandList::new();
        list.push_constants(
            PipelineLayoutHandle::from_raw(1),
            vk::ShaderStageFlags::VERTEX,
            0,
            &7u32,
        );

        match &list.commands()[0] {
            Command::PushConstants { offset, data, .. } => {
                assert_eq!(*offset, 0);
                assert_eq!(data.as_slice(), 7u32.to_ne_bytes().as_slice());
            }
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn test_equal_recordings_compare_equal() {
        let build = || {
            let mut list = CommandList::new();
            list.bind_pipeline(PipelineHandle::from_raw(4));
            list.draw_mesh(MeshHandle::from_raw(5), 3);
            list
        };
        assert_eq!(build(), build());

        let mut other = build();
        other.draw_mesh(MeshHandle::from_raw(5), 3);
        assert_ne!(build(), other);
    }

    #[test]
    fn test_descriptor_sets_iterates_binds() {
        let mut list = CommandList::new();
        assert!(list.is_empty());
        list.bind_descriptor_set(
            PipelineLayoutHandle::from_raw(1),
            DescriptorSetHandle::from_raw(9),
        );
        list.draw_mesh(MeshHandle::from_raw(2), 6);

        let sets: Vec<_> = list.descriptor_sets().collect();
        assert_eq!(sets, vec![DescriptorSetHandle::from_raw(9)]);
        assert_eq!(list.len(), 2);
    }
}
