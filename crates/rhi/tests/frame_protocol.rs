//! Integration tests for the frame protocol against the headless backend.

use inflight_rhi::handle::{CommandSequenceHandle, FenceHandle, SemaphoreHandle};
use inflight_rhi::headless::BackendEvent;
use inflight_rhi::{
    CommandList, DescriptorBinding, FramebufferDesc, HeadlessBackend, ImageDesc,
    PipelineLayoutDesc, RenderBackend, RhiError, SwapchainStatus, vk,
};

const EXTENT: vk::Extent2D = vk::Extent2D {
    width: 800,
    height: 600,
};

struct Slot {
    sequence: CommandSequenceHandle,
    fence: FenceHandle,
    semaphore: SemaphoreHandle,
}

/// Builds two slots, each with a recorded render pass on its own framebuffer.
fn two_slots(backend: &mut HeadlessBackend) -> Vec<Slot> {
    let depth = backend
        .create_image(&ImageDesc::depth(EXTENT, backend.depth_format()))
        .unwrap();
    let set_layout = backend
        .create_descriptor_set_layout(&[DescriptorBinding::uniform_buffer(
            0,
            vk::ShaderStageFlags::VERTEX,
        )])
        .unwrap();
    let layout = backend
        .create_pipeline_layout(&PipelineLayoutDesc {
            set_layouts: vec![set_layout],
            push_constant_ranges: Vec::new(),
        })
        .unwrap();

    (0..2)
        .map(|image_index| {
            let framebuffer = backend
                .create_framebuffer(&FramebufferDesc {
                    image_index,
                    depth,
                    extent: EXTENT,
                })
                .unwrap();
            let region = backend
                .create_region(64, vk::BufferUsageFlags::UNIFORM_BUFFER)
                .unwrap();
            let set = backend.allocate_descriptor_set(set_layout).unwrap();
            backend.write_buffer_descriptor(set, 0, region).unwrap();

            let mut list = CommandList::new();
            list.begin_render_pass(framebuffer, EXTENT, [0.0; 4], 1.0);
            list.bind_descriptor_set(layout, set);
            list.end_render_pass();

            let sequence = backend.create_command_sequence().unwrap();
            backend.record_command_sequence(sequence, &list).unwrap();
            Slot {
                sequence,
                fence: backend.create_fence(true).unwrap(),
                semaphore: backend.create_semaphore().unwrap(),
            }
        })
        .collect()
}

fn run_frame(backend: &mut HeadlessBackend, index: usize, slot: &Slot) -> SwapchainStatus {
    backend.wait_for_fence(slot.fence, u64::MAX).unwrap();
    assert_eq!(backend.begin_frame(index).unwrap(), SwapchainStatus::Ready);
    backend.reset_fence(slot.fence).unwrap();
    backend
        .submit(slot.sequence, slot.semaphore, slot.fence)
        .unwrap();
    backend.present(index, slot.semaphore).unwrap()
}

#[test]
fn test_round_robin_frames_keep_one_submission_per_slot() {
    let mut backend = HeadlessBackend::new(EXTENT, 2);
    let slots = two_slots(&mut backend);

    for frame in 0..6 {
        let index = frame % 2;
        run_frame(&mut backend, index, &slots[index]);
        assert!(backend.pending_submissions() <= 2);
    }

    let stats = backend.stats();
    assert_eq!(stats.submits, 6);
    assert_eq!(stats.presents, 6);
    assert_eq!(stats.records, 2);
}

#[test]
fn test_recording_pending_sequence_is_rejected() {
    let mut backend = HeadlessBackend::new(EXTENT, 2);
    let slots = two_slots(&mut backend);
    run_frame(&mut backend, 0, &slots[0]);

    let err = backend
        .record_command_sequence(slots[0].sequence, &CommandList::new())
        .unwrap_err();
    assert!(matches!(err, RhiError::ResourceInUse(_)));
}

#[test]
fn test_present_out_of_date_then_recreate() {
    let mut backend = HeadlessBackend::new(EXTENT, 2);
    let slots = two_slots(&mut backend);
    let resized = vk::Extent2D {
        width: 1024,
        height: 768,
    };
    backend.invalidate_swapchain_at_present(resized);

    assert_eq!(
        run_frame(&mut backend, 0, &slots[0]),
        SwapchainStatus::OutOfDate
    );
    assert_eq!(backend.begin_frame(1).unwrap(), SwapchainStatus::OutOfDate);

    // Framebuffers and pending work keep the old swapchain alive.
    assert!(backend.recreate_swapchain().is_err());
    backend.wait_idle().unwrap();
    assert!(matches!(
        backend.recreate_swapchain().unwrap_err(),
        RhiError::SwapchainBusy(_)
    ));

    assert!(
        backend
            .events()
            .iter()
            .any(|e| matches!(e, BackendEvent::Presented { slot: 0 }))
    );
}

#[test]
fn test_submitting_after_framebuffer_destroyed_fails() {
    let mut backend = HeadlessBackend::new(EXTENT, 2);
    let slots = two_slots(&mut backend);
    let framebuffer = match backend.recorded_commands(slots[1].sequence).unwrap().commands()[0] {
        inflight_rhi::Command::BeginRenderPass { framebuffer, .. } => framebuffer,
        _ => unreachable!(),
    };
    backend.destroy_framebuffer(framebuffer).unwrap();

    backend.reset_fence(slots[1].fence).unwrap();
    let err = backend
        .submit(slots[1].sequence, slots[1].semaphore, slots[1].fence)
        .unwrap_err();
    assert!(matches!(err, RhiError::InvalidHandle(_)));
}
