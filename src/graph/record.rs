//! Recording and submission of a baked graph.
//!
//! A [`RenderGraph`] owns everything needed to execute a [`BakedGraph`] every frame: the graph-owned physical
//! resources, one command pool per recording thread and queue family, and pools of fences and semaphores.
//!
//! Executing a frame goes through these steps:
//! 1. The previous frame is retired. Its fences are waited on, after which its command buffers, semaphores and fences
//!    are recycled.
//! 2. Physical passes are recorded, one command buffer each. Physical passes on the same dependency level are recorded
//!    in parallel on the recording thread pool.
//! 3. Command buffers are submitted following the [`SubmissionPlan`](crate::graph::submission::SubmissionPlan), with
//!    one binary semaphore per dependency between submits, and a fence on the last submit of every queue.

use std::collections::HashMap;
use std::sync::Mutex;

use anyhow::{Context, Result};
use ash::vk;
use rayon::prelude::*;

use crate::{
    Allocator, BakedGraph, CommandBatch, CommandBuffer, CommandPool, DefaultAllocator, Device, Error, ExecutionManager,
    Fence, ImageView, IncompleteCommandBuffer, PhysicalResourceBindings, PipelineStage, QueueType, Semaphore,
};
use crate::command_buffer::state::{RenderingAttachmentInfo, RenderingInfo};
use crate::graph::barrier::Barrier;
use crate::graph::pass::Pass;
use crate::graph::physical_pass::{AttachmentSlot, PhysicalAttachment, PhysicalPass};
use crate::graph::physical_resource::{PhysicalResource, PhysicalResources};
use crate::graph::submission::PassState;
use crate::sync::pool::{Pool, Pooled};

/// Semaphores that connect a frame to work outside the graph, like swapchain image acquisition and presentation.
#[derive(Debug, Default, Clone)]
pub struct FrameSync {
    /// Waited on by the first submit that uses the backbuffer.
    pub waits: Vec<(vk::Semaphore, PipelineStage)>,
    /// Signaled by the last submit that uses the backbuffer.
    pub signals: Vec<vk::Semaphore>,
}

impl FrameSync {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait on `semaphore` before executing `stage`.
    pub fn wait_on(mut self, semaphore: vk::Semaphore, stage: PipelineStage) -> Self {
        self.waits.push((semaphore, stage));
        self
    }

    pub fn signal(mut self, semaphore: vk::Semaphore) -> Self {
        self.signals.push(semaphore);
        self
    }
}

/// Synchronization objects of a frame that may still be executing.
#[derive(Debug)]
struct InFlightFrame {
    fences: Vec<Pooled<Fence>>,
    semaphores: Vec<Pooled<Semaphore>>,
}

/// Command pools of one recording thread, by queue family.
type ThreadCommandPools = Mutex<HashMap<u32, CommandPool>>;

/// Everything a recording thread needs, shared between all of them.
struct RecordContext<'a> {
    exec: &'a ExecutionManager,
    device: &'a Device,
    bindings: &'a PhysicalResourceBindings,
    pools: &'a [ThreadCommandPools],
    frame: u64,
}

/// Executes a baked graph every frame.
/// # Example
/// ```ignore
/// use deimos::prelude::*;
///
/// let baked = graph.bake(&settings)?;
/// let mut render_graph = RenderGraph::new(device.clone(), exec.clone(), baked, &mut allocator)?;
/// loop {
///     let mut bindings = PhysicalResourceBindings::new();
///     bindings.bind_image("swapchain", swapchain_view.clone());
///     let sync = FrameSync::new()
///         .wait_on(image_available, PipelineStage::COLOR_ATTACHMENT_OUTPUT)
///         .signal(render_finished);
///     render_graph.execute(&bindings, &sync)?;
/// }
/// ```
#[derive(Derivative)]
#[derivative(Debug(bound = ""))]
pub struct RenderGraph<'cb, A: Allocator = DefaultAllocator> {
    #[derivative(Debug = "ignore")]
    device: Device,
    exec: ExecutionManager,
    graph: BakedGraph<'cb>,
    resources: PhysicalResources<A>,
    #[derivative(Debug = "ignore")]
    workers: rayon::ThreadPool,
    /// One entry per worker thread, plus one for the calling thread.
    command_pools: Vec<ThreadCommandPools>,
    fence_pool: Pool<Fence>,
    semaphore_pool: Pool<Semaphore>,
    /// State of every physical pass.
    states: Vec<PassState>,
    in_flight: Option<InFlightFrame>,
    frame: u64,
}

impl<'cb, A: Allocator> RenderGraph<'cb, A> {
    /// Create the physical resources and recording infrastructure for a baked graph.
    /// # Errors
    /// * Fails if creating any physical resource fails.
    /// * Fails if the recording thread pool could not be created.
    pub fn new(device: Device, exec: ExecutionManager, graph: BakedGraph<'cb>, allocator: &mut A) -> Result<Self> {
        let resources = PhysicalResources::new(device.clone(), allocator, &graph.allocation)?;
        let threads = graph.settings().recording_threads.max(1);
        let workers = rayon::ThreadPoolBuilder::new()
            .num_threads(threads)
            .thread_name(|index| format!("deimos-record-{index}"))
            .build()
            .context(Error::Uncategorized("Failed to create the recording thread pool"))?;
        let command_pools = (0..=threads)
            .map(|_| Mutex::new(HashMap::new()))
            .collect();
        let fence_pool = Fence::pool(device.clone(), QueueType::ALL.len())?;
        let semaphore_pool = Semaphore::pool(device.clone(), graph.submissions.semaphores.len())?;
        let states = vec![PassState::Pending; graph.physical_passes.len()];

        info!(
            "Created render graph with {} physical passes, recording on {threads} threads",
            graph.physical_passes.len()
        );

        Ok(Self {
            device,
            exec,
            graph,
            resources,
            workers,
            command_pools,
            fence_pool,
            semaphore_pool,
            states,
            in_flight: None,
            frame: 0,
        })
    }

    pub fn graph(&self) -> &BakedGraph<'cb> {
        &self.graph
    }

    /// Images and buffers owned by the graph.
    pub fn physical_resources(&self) -> &PhysicalResources<A> {
        &self.resources
    }

    /// State of every physical pass.
    pub fn states(&self) -> &[PassState] {
        &self.states
    }

    /// Index of the next frame to execute.
    pub fn frame_index(&self) -> u64 {
        self.frame
    }

    /// Wait for the frame in flight, if any, and recycle its resources.
    pub fn wait_idle(&mut self) -> Result<()> {
        let Some(frame) = &self.in_flight else {
            return Ok(());
        };
        // The frame stays in flight until every fence was observed.
        for fence in &frame.fences {
            fence.wait()?;
        }
        let frame = self.in_flight.take();
        for state in &mut self.states {
            state.transition(PassState::Complete)?;
            state.transition(PassState::Pending)?;
        }
        // Safety: the fences of every queue this frame submitted to were waited on.
        unsafe {
            self.reset_command_pools()?;
        }
        // Semaphores and fences go back to their pools here.
        drop(frame);
        Ok(())
    }

    /// # Safety
    /// No command buffer recorded by this graph may still be pending execution.
    unsafe fn reset_command_pools(&self) -> Result<()> {
        for pools in &self.command_pools {
            let mut pools = pools.lock().map_err(|_| Error::PoisonError)?;
            for pool in pools.values_mut() {
                pool.reset()?;
            }
        }
        Ok(())
    }

    /// Bring every physical pass back to pending after a frame that failed halfway.
    fn recover(&mut self) -> Result<()> {
        if self.states.iter().all(|state| *state == PassState::Pending) {
            return Ok(());
        }
        warn!("The previous frame failed, waiting for the device before recording");
        self.device.wait_idle()?;
        self.states.fill(PassState::Pending);
        // Safety: the device is idle.
        unsafe { self.reset_command_pools() }
    }

    fn resolve_bindings(&self, bindings: &PhysicalResourceBindings) -> Result<PhysicalResourceBindings> {
        let mut resolved = bindings.clone();
        resolved.extend(self.resources.bindings());
        for (name, declaration) in &self.graph.declarations {
            if declaration.is_imported() && self.graph.physical_index(name).is_some() && !resolved.contains(name) {
                return Err(Error::NoResourceBound(name.clone()).into());
            }
        }
        Ok(resolved)
    }

    /// Record and submit one frame.
    /// * `bindings` must contain every imported resource used by the graph.
    /// * `sync` holds the semaphores to wait on before touching the backbuffer, and to signal after.
    /// # Errors
    /// * Fails if an imported resource has no binding.
    /// * Fails if a pass executor returns an error.
    /// * Fails if a Vulkan call fails.
    pub fn execute(&mut self, bindings: &PhysicalResourceBindings, sync: &FrameSync) -> Result<()> {
        self.wait_idle()?;
        self.recover()?;
        let bindings = self.resolve_bindings(bindings)?;

        let context = RecordContext {
            exec: &self.exec,
            device: &self.device,
            bindings: &bindings,
            pools: &self.command_pools,
            frame: self.frame,
        };

        // Physical passes only ever span consecutive passes, so every physical pass gets its own slice.
        let mut work = Vec::with_capacity(self.graph.physical_passes.len());
        let mut remaining: &mut [Pass<'cb>] = &mut self.graph.passes;
        for ((index, physical), state) in self
            .graph
            .physical_passes
            .iter()
            .enumerate()
            .zip(self.states.iter_mut())
        {
            let (members, rest) = std::mem::take(&mut remaining).split_at_mut(physical.passes.len());
            remaining = rest;
            work.push((index, physical, members, state));
        }

        let mut levels = work
            .iter()
            .map(|(_, physical, _, _)| physical.level)
            .collect::<Vec<_>>();
        levels.sort_unstable();
        levels.dedup();

        let mut command_buffers: Vec<Option<CommandBuffer>> = (0..work.len()).map(|_| None).collect();
        for level in levels {
            let (batch, rest): (Vec<_>, Vec<_>) = work
                .into_iter()
                .partition(|(_, physical, _, _)| physical.level == level);
            work = rest;
            let recorded = self.workers.install(|| {
                batch
                    .into_par_iter()
                    .map(|(index, physical, members, state)| {
                        record_physical_pass(&context, physical, members, state).map(|cmd| (index, cmd))
                    })
                    .collect::<Result<Vec<_>>>()
            })?;
            for (index, cmd) in recorded {
                command_buffers[index] = Some(cmd);
            }
        }

        let semaphores = self
            .graph
            .submissions
            .semaphores
            .iter()
            .map(|_| Semaphore::from_pool(&self.semaphore_pool))
            .collect::<Result<Vec<_>>>()?;
        let mut frame = InFlightFrame {
            fences: Vec::new(),
            semaphores,
        };
        let mut submitted = 0;
        if let Err(err) = self.submit_frame(&command_buffers, sync, &mut frame, &mut submitted) {
            if submitted > 0 {
                let unconsumed = self.graph.submissions.unconsumed_semaphores(submitted);
                self.abandon_frame(frame, &unconsumed);
            }
            return Err(err);
        }

        self.in_flight = Some(frame);
        self.frame += 1;
        Ok(())
    }

    /// Submit every planned submit in order. `submitted` counts the submits that reached their queue, and the fences
    /// of those are added to `frame`.
    fn submit_frame(
        &mut self,
        command_buffers: &[Option<CommandBuffer>],
        sync: &FrameSync,
        frame: &mut InFlightFrame,
        submitted: &mut usize,
    ) -> Result<()> {
        let plan = &self.graph.submissions;
        for (index, submit) in plan.submits.iter().enumerate() {
            let mut batch = CommandBatch::new(submit.queue);
            for &physical in &submit.physical_passes {
                let cmd = command_buffers[physical]
                    .as_ref()
                    .ok_or(Error::Uncategorized("Physical pass was not recorded"))?;
                batch.push(cmd)?;
            }
            for &edge in &submit.waits {
                batch.wait_on(&frame.semaphores[edge], plan.semaphores[edge].stages)?;
            }
            if submit.waits_on_frame {
                for &(semaphore, stage) in &sync.waits {
                    batch.wait_on_raw(semaphore, stage);
                }
            }
            for &edge in &submit.signals {
                batch.signal(&frame.semaphores[edge])?;
            }
            if submit.signals_frame {
                for &semaphore in &sync.signals {
                    batch.signal_raw(semaphore);
                }
            }

            let fence = if submit.signals_fence {
                Some(Fence::from_pool(&self.fence_pool)?)
            } else {
                None
            };
            self.exec
                .submit(submit.queue, &[batch], fence.as_deref())?;
            *submitted += 1;
            frame.fences.extend(fence);
            for &physical in &submit.physical_passes {
                self.states[physical].transition(PassState::Submitted)?;
            }
            trace!(
                "Submitted {} physical passes to the {:?} queue (submit {index}, {} waits, {} signals)",
                submit.physical_passes.len(),
                submit.queue,
                submit.waits.len(),
                submit.signals.len()
            );
        }
        Ok(())
    }

    /// Give back the synchronization objects of a frame that did not retire through its fences, once the device is
    /// idle. Semaphores flagged in `unconsumed` stay signaled and are destroyed instead of recycled.
    fn abandon_frame(&self, frame: InFlightFrame, unconsumed: &[bool]) {
        if let Err(err) = self.device.wait_idle() {
            error!("Failed to wait for an abandoned frame, leaking its synchronization objects: {err}");
            for fence in frame.fences {
                std::mem::forget(Pooled::detach(fence));
            }
            for semaphore in frame.semaphores {
                std::mem::forget(Pooled::detach(semaphore));
            }
            return;
        }
        warn!("Abandoned a partially executed frame after waiting for the device");
        for (semaphore, &unconsumed) in frame.semaphores.into_iter().zip(unconsumed) {
            if unconsumed {
                drop(Pooled::detach(semaphore));
            }
        }
    }
}

impl<A: Allocator> Drop for RenderGraph<'_, A> {
    fn drop(&mut self) {
        if let Err(err) = self.wait_idle() {
            error!("Failed to wait for the last frame of a render graph: {err}");
            if let Some(frame) = self.in_flight.take() {
                self.abandon_frame(frame, &[]);
            }
        }
    }
}

fn allocate_command_buffer(context: &RecordContext, queue: QueueType) -> Result<IncompleteCommandBuffer> {
    // Threads outside the pool, like the caller of `install`, share the last entry.
    let thread = rayon::current_thread_index()
        .filter(|&index| index + 1 < context.pools.len())
        .unwrap_or(context.pools.len() - 1);
    let family = context.exec.family_index(queue)?;
    let mut pools = context.pools[thread]
        .lock()
        .map_err(|_| Error::PoisonError)?;
    let pool = match pools.entry(family) {
        std::collections::hash_map::Entry::Occupied(entry) => entry.into_mut(),
        std::collections::hash_map::Entry::Vacant(entry) => {
            entry.insert(CommandPool::new(context.device.clone(), family)?)
        }
    };
    pool.allocate(queue)
}

fn bound_image<'a>(context: &'a RecordContext, resource: &str) -> Result<&'a ImageView> {
    context
        .bindings
        .get(resource)
        .and_then(PhysicalResource::image)
        .ok_or_else(|| Error::NoResourceBound(resource.to_owned()).into())
}

/// Queue family indices for the barrier, or `QUEUE_FAMILY_IGNORED` for both if no ownership changes.
fn queue_families(context: &RecordContext, barrier: &Barrier) -> Result<(u32, u32)> {
    let src = context.exec.family_index(barrier.src_queue_for_frame(context.frame))?;
    let dst = context.exec.family_index(barrier.dst_queue)?;
    if src == dst {
        Ok((vk::QUEUE_FAMILY_IGNORED, vk::QUEUE_FAMILY_IGNORED))
    } else {
        Ok((src, dst))
    }
}

fn record_barriers(
    context: &RecordContext,
    cmd: IncompleteCommandBuffer,
    barriers: &[&Barrier],
) -> Result<IncompleteCommandBuffer> {
    let mut memory = Vec::new();
    let mut buffers = Vec::new();
    let mut images = Vec::new();
    for barrier in barriers {
        let (src_family, dst_family) = queue_families(context, barrier)?;
        #[cfg(feature = "log-barriers")]
        trace!(
            "Barrier on `{}`: {:?} {:?} -> {:?} {:?}, {:?} -> {:?}",
            barrier.resource,
            barrier.src_stages,
            barrier.src_access,
            barrier.dst_stages,
            barrier.dst_access,
            barrier.old_layout_for_frame(context.frame),
            barrier.new_layout
        );
        match context.bindings.get(&barrier.resource) {
            Some(PhysicalResource::Image(image)) => images.push(vk::ImageMemoryBarrier2 {
                s_type: vk::StructureType::IMAGE_MEMORY_BARRIER_2,
                p_next: std::ptr::null(),
                src_stage_mask: barrier.src_stages,
                src_access_mask: barrier.src_access,
                dst_stage_mask: barrier.dst_stages,
                dst_access_mask: barrier.dst_access,
                old_layout: barrier.old_layout_for_frame(context.frame),
                new_layout: barrier.new_layout,
                src_queue_family_index: src_family,
                dst_queue_family_index: dst_family,
                image: unsafe { image.image() },
                subresource_range: image.subresource_range(),
            }),
            // Ownership of a buffer can only be transferred with a buffer barrier.
            Some(PhysicalResource::Buffer(buffer)) if src_family != dst_family => {
                buffers.push(vk::BufferMemoryBarrier2 {
                    s_type: vk::StructureType::BUFFER_MEMORY_BARRIER_2,
                    p_next: std::ptr::null(),
                    src_stage_mask: barrier.src_stages,
                    src_access_mask: barrier.src_access,
                    dst_stage_mask: barrier.dst_stages,
                    dst_access_mask: barrier.dst_access,
                    src_queue_family_index: src_family,
                    dst_queue_family_index: dst_family,
                    buffer: unsafe { buffer.handle() },
                    offset: buffer.offset(),
                    size: buffer.size(),
                })
            }
            // Every driver implements buffer barriers as global memory barriers, so we use those.
            Some(PhysicalResource::Buffer(_)) => memory.push(vk::MemoryBarrier2 {
                s_type: vk::StructureType::MEMORY_BARRIER_2,
                p_next: std::ptr::null(),
                src_stage_mask: barrier.src_stages,
                src_access_mask: barrier.src_access,
                dst_stage_mask: barrier.dst_stages,
                dst_access_mask: barrier.dst_access,
            }),
            None => return Err(Error::NoResourceBound(barrier.resource.clone()).into()),
        }
    }
    Ok(cmd.barriers(&memory, &buffers, &images))
}

fn rendering_info(context: &RecordContext, physical: &PhysicalPass) -> Result<Option<RenderingInfo>> {
    if !physical.is_renderpass || physical.attachments.is_empty() {
        return Ok(None);
    }
    let attachment = |slot: &PhysicalAttachment| -> Result<RenderingAttachmentInfo> {
        Ok(RenderingAttachmentInfo {
            image_view: bound_image(context, &slot.resource)?.clone(),
            image_layout: slot.layout,
            load_op: slot.load_op,
            store_op: vk::AttachmentStoreOp::STORE,
            clear_value: slot.clear_value.unwrap_or_default(),
        })
    };
    let color_attachments = physical
        .color_attachments()
        .map(attachment)
        .collect::<Result<Vec<_>>>()?;
    let depth_attachment = physical
        .depth_attachment()
        .map(attachment)
        .transpose()?;
    let first = color_attachments
        .first()
        .or(depth_attachment.as_ref())
        .map(|attachment| &attachment.image_view)
        .ok_or(Error::Uncategorized("Render pass without attachments"))?;

    Ok(Some(RenderingInfo {
        render_area: vk::Rect2D {
            offset: vk::Offset2D {
                x: 0,
                y: 0,
            },
            extent: vk::Extent2D {
                width: first.width(),
                height: first.height(),
            },
        },
        layer_count: first.subresource_range().layer_count,
        color_attachments,
        depth_attachment,
        stencil_attachment: None,
    }))
}

fn record_clears(
    context: &RecordContext,
    cmd: IncompleteCommandBuffer,
    physical: &PhysicalPass,
    pass: usize,
) -> Result<IncompleteCommandBuffer> {
    let mut attachments = Vec::new();
    for clear in physical.clears_for(pass) {
        let (aspect_mask, color_attachment) = match clear.slot {
            AttachmentSlot::Color(index) => (vk::ImageAspectFlags::COLOR, index),
            AttachmentSlot::Depth => (
                bound_image(context, &clear.resource)?
                    .subresource_range()
                    .aspect_mask,
                vk::ATTACHMENT_UNUSED,
            ),
        };
        attachments.push(vk::ClearAttachment {
            aspect_mask,
            color_attachment,
            clear_value: clear.value,
        });
    }
    let rect = vk::ClearRect {
        rect: cmd.render_area(),
        base_array_layer: 0,
        layer_count: 1,
    };
    Ok(cmd.clear_attachments(&attachments, &[rect]))
}

fn record_physical_pass(
    context: &RecordContext,
    physical: &PhysicalPass,
    members: &mut [Pass<'_>],
    state: &mut PassState,
) -> Result<CommandBuffer> {
    state.transition(PassState::Recording)?;
    let barriers = &physical.barriers;
    let mut cmd = allocate_command_buffer(context, physical.queue)?;

    let before = barriers
        .discards
        .iter()
        .chain(barriers.alias_transfers.iter())
        .chain(barriers.invalidate.iter())
        .collect::<Vec<_>>();
    cmd = record_barriers(context, cmd, &before)?;

    let rendering = rendering_info(context, physical)?;
    if let Some(info) = &rendering {
        cmd = cmd.begin_rendering(info);
    }
    for (&position, pass) in physical.passes.iter().zip(members.iter_mut()) {
        if rendering.is_some() {
            cmd = record_clears(context, cmd, physical, position)?;
        }
        cmd = pass.execute.execute(cmd, context.bindings)?;
    }
    if rendering.is_some() {
        cmd = cmd.end_rendering();
    }

    for mip in &barriers.mips {
        let image = bound_image(context, &mip.resource)?;
        cmd = cmd.generate_mips(image, mip.from_layout, mip.src_stages, mip.src_access)?;
    }

    let after = barriers.flush.iter().collect::<Vec<_>>();
    cmd = record_barriers(context, cmd, &after)?;
    cmd.finish()
}
