use anyhow::Result;

use deimos::prelude::*;
use deimos::graph::physical_pass::AttachmentSlot;
use deimos::graph::submission::PassState;

mod framework;

use framework::deimos_error;

fn forward_graph<'cb>(overlay_clears: bool) -> Result<PassGraph<'cb>> {
    let color = VirtualResource::image("color");
    let depth = VirtualResource::image("depth");
    let depth_info = TextureInfo::absolute(1280, 720, vk::Format::D32_SFLOAT);
    let overlay = PassBuilder::render("overlay");
    let overlay = if overlay_clears {
        overlay.clear_color_attachment(&color, ClearColor::Float([0.0; 4]))?
    } else {
        overlay.load_color_attachment(&color)?
    };

    PassGraph::new()
        .declare_texture(&color, TextureInfo::absolute(1280, 720, vk::Format::R8G8B8A8_UNORM))?
        .declare_texture(&depth, depth_info)?
        .add_pass(
            PassBuilder::render("opaque")
                .clear_color_attachment(&color, ClearColor::Float([0.0, 0.0, 0.0, 1.0]))?
                .clear_depth_attachment(
                    &depth,
                    ClearDepthStencil {
                        depth: 1.0,
                        stencil: 0,
                    },
                )?
                .build(),
        )?
        .add_pass(overlay.load_depth_attachment(&depth)?.build())
}

#[test]
fn passes_sharing_attachments_are_merged() -> Result<()> {
    framework::init_logging();
    let baked = forward_graph(false)?.bake(&GraphSettings::default())?;
    assert_eq!(baked.physical_passes().len(), 1);
    let physical = &baked.physical_passes()[0];
    assert_eq!(physical.passes, vec![0, 1]);
    assert!(physical.is_renderpass);
    assert_eq!(physical.color_attachments().count(), 1);
    assert!(physical.depth_attachment().is_some());
    assert!(physical.clears.is_empty());
    // Only the first member's discards remain in front of the merged pass.
    assert_eq!(physical.barriers.discards.len(), 2);

    let settings = GraphSettingsBuilder::new().merge_passes(false).build();
    let baked = forward_graph(false)?.bake(&settings)?;
    assert_eq!(baked.physical_passes().len(), 2);
    Ok(())
}

#[test]
fn merged_clear_becomes_mid_pass_clear() -> Result<()> {
    let baked = forward_graph(true)?.bake(&GraphSettings::default())?;
    assert_eq!(baked.physical_passes().len(), 1);
    let physical = &baked.physical_passes()[0];
    let clears = physical.clears_for(1).collect::<Vec<_>>();
    assert_eq!(clears.len(), 1);
    assert_eq!(clears[0].resource, "color");
    assert_eq!(clears[0].slot, AttachmentSlot::Color(0));
    assert_eq!(physical.clears_for(0).count(), 0);
    Ok(())
}

#[test]
fn layout_transitions_split_physical_passes() -> Result<()> {
    let baked = framework::scenario_graph()?.bake(&GraphSettings::default())?;
    assert_eq!(baked.physical_passes().len(), 3);
    for (index, physical) in baked.physical_passes().iter().enumerate() {
        assert_eq!(physical.passes, vec![index]);
        assert_eq!(physical.level, index as u32);
    }
    Ok(())
}

fn async_compute_graph<'cb>() -> Result<PassGraph<'cb>> {
    let particles = VirtualResource::buffer("particles");
    let swapchain = VirtualResource::image("swapchain");
    PassGraph::new()
        .declare_buffer(&particles, BufferInfo::new(64 * 1024))?
        .set_backbuffer(&swapchain)?
        .add_pass(
            PassBuilder::compute("simulate")
                .write_storage_buffer(&particles, PipelineStage::COMPUTE_SHADER)
                .build(),
        )?
        .add_pass(
            PassBuilder::render("draw")
                .vertex_buffer(&particles)
                .clear_color_attachment(&swapchain, ClearColor::Float([0.0, 0.0, 0.0, 1.0]))?
                .build(),
        )
}

#[test]
fn cross_queue_ownership_transfer() -> Result<()> {
    let baked = async_compute_graph()?.bake(&GraphSettings::default())?;
    assert_eq!(baked.order(), vec!["simulate", "draw"]);

    let release = baked
        .barriers("simulate")
        .unwrap()
        .flush
        .iter()
        .find(|barrier| barrier.resource == "particles")
        .unwrap();
    assert!(release.is_ownership_transfer());
    assert_eq!(release.src_queue, QueueType::Compute);
    assert_eq!(release.dst_queue, QueueType::Graphics);

    let draw = baked.barriers("draw").unwrap();
    let acquire = draw
        .invalidate
        .iter()
        .find(|barrier| barrier.resource == "particles")
        .unwrap();
    assert!(acquire.is_ownership_transfer());
    assert_eq!(acquire.dst_access, vk::AccessFlags2::VERTEX_ATTRIBUTE_READ);
    assert_eq!(draw.waits.len(), 1);
    assert_eq!(draw.waits[0].producer, 0);
    assert_eq!(draw.waits[0].stages, PipelineStage::VERTEX_ATTRIBUTE_INPUT);
    Ok(())
}

#[test]
fn cross_queue_semaphores() -> Result<()> {
    let baked = async_compute_graph()?.bake(&GraphSettings::default())?;
    assert_eq!(baked.physical_passes().len(), 2);

    let plan = baked.submission_plan();
    assert_eq!(plan.submits.len(), 2);
    assert_eq!(plan.submits[0].queue, QueueType::Compute);
    assert_eq!(plan.submits[1].queue, QueueType::Graphics);
    assert_eq!(plan.submit_of(0), Some(0));
    assert_eq!(plan.submit_of(1), Some(1));

    assert_eq!(plan.semaphores.len(), 1);
    let edge = plan.semaphores[0];
    assert_eq!((edge.producer, edge.consumer), (0, 1));
    assert_eq!(edge.stages, PipelineStage::VERTEX_ATTRIBUTE_INPUT);
    assert_eq!(plan.submits[0].signals, vec![0]);
    assert_eq!(plan.submits[1].waits, vec![0]);

    // Only the submit using the swapchain image synchronizes with acquire and present.
    assert!(!plan.submits[0].waits_on_frame && !plan.submits[0].signals_frame);
    assert!(plan.submits[1].waits_on_frame && plan.submits[1].signals_frame);
    // The last submit of every queue signals a fence.
    assert!(plan.submits.iter().all(|submit| submit.signals_fence));
    Ok(())
}

#[test]
fn pass_state_transitions() -> Result<()> {
    let mut state = PassState::default();
    assert_eq!(state, PassState::Pending);
    state.transition(PassState::Recording)?;
    state.transition(PassState::Submitted)?;

    let err = state.transition(PassState::Recording).unwrap_err();
    assert!(matches!(
        deimos_error(&err),
        Error::InvalidStateTransition {
            from: PassState::Submitted,
            to: PassState::Recording,
        }
    ));
    assert_eq!(state, PassState::Submitted);

    state.transition(PassState::Complete)?;
    state.transition(PassState::Pending)?;
    assert!(state.transition(PassState::Complete).is_err());
    Ok(())
}

#[test]
fn persistent_resource_changes_queue_between_frames() -> Result<()> {
    let history = VirtualResource::buffer("history");
    let swapchain = VirtualResource::image("swapchain");
    let baked = PassGraph::new()
        .declare_buffer(&history, BufferInfo::new(4096).persistent())?
        .set_backbuffer(&swapchain)?
        .add_pass(
            PassBuilder::compute("simulate")
                .read_write_storage_buffer(&history, PipelineStage::COMPUTE_SHADER)
                .build(),
        )?
        .add_pass(
            PassBuilder::render("draw")
                .vertex_buffer(&history)
                .clear_color_attachment(&swapchain, ClearColor::Float([0.0; 4]))?
                .build(),
        )?
        .bake(&GraphSettings::default())?;

    // The last use of the previous frame releases the buffer back to the compute queue.
    let release = baked
        .barriers("draw")
        .unwrap()
        .flush
        .iter()
        .find(|barrier| barrier.resource == "history")
        .unwrap();
    assert!(release.is_ownership_transfer());
    assert_eq!(release.src_queue, QueueType::Graphics);
    assert_eq!(release.dst_queue, QueueType::Compute);
    assert_eq!(release.src_stages, PipelineStage::VERTEX_ATTRIBUTE_INPUT);

    // The first use of the next frame acquires it, except on the first frame where there is nothing to acquire.
    let simulate = baked.barriers("simulate").unwrap();
    assert_eq!(simulate.discards.len(), 1);
    let acquire = &simulate.discards[0];
    assert_eq!(acquire.src_queue, QueueType::Graphics);
    assert_eq!(acquire.dst_queue, QueueType::Compute);
    assert_eq!(acquire.src_stages, PipelineStage::NONE);
    assert_eq!(acquire.src_access, vk::AccessFlags2::NONE);
    assert_eq!(acquire.src_queue_for_frame(0), QueueType::Compute);
    assert_eq!(acquire.src_queue_for_frame(1), QueueType::Graphics);
    Ok(())
}

#[test]
fn transient_discard_on_other_queue_has_no_source_stages() -> Result<()> {
    let staging = VirtualResource::image("staging");
    let blurred = VirtualResource::image("blurred");
    let settings = GraphSettingsBuilder::new().cull_unused(false).build();
    let baked = PassGraph::new()
        .declare_texture(&staging, framework::small_texture())?
        .declare_texture(&blurred, framework::small_texture())?
        .add_pass(PassBuilder::transfer("upload").copy_dst(&staging).build())?
        .add_pass(
            PassBuilder::render("blur")
                .sample_image(&staging, PipelineStage::FRAGMENT_SHADER)
                .clear_color_attachment(&blurred, ClearColor::Float([0.0; 4]))?
                .build(),
        )?
        .bake(&settings)?;

    let upload = baked.barriers("upload").unwrap();
    let discard = upload
        .discards
        .iter()
        .find(|barrier| barrier.resource == "staging")
        .unwrap();
    assert_eq!(discard.src_stages, PipelineStage::NONE);
    assert_eq!(discard.src_queue, QueueType::Transfer);
    assert_eq!(discard.dst_queue, QueueType::Transfer);
    assert!(!discard.is_ownership_transfer());

    // Transient contents are not carried into the next frame.
    let blur = baked.barriers("blur").unwrap();
    assert!(blur.flush.iter().all(|barrier| barrier.resource != "staging"));
    Ok(())
}

#[test]
fn partially_submitted_frame_leaves_semaphores_signaled() -> Result<()> {
    let baked = async_compute_graph()?.bake(&GraphSettings::default())?;
    let plan = baked.submission_plan();
    assert_eq!(plan.unconsumed_semaphores(0), vec![false]);
    // The compute submit signaled, the graphics submit waiting on it never reached its queue.
    assert_eq!(plan.unconsumed_semaphores(1), vec![true]);
    assert_eq!(plan.unconsumed_semaphores(2), vec![false]);
    Ok(())
}
