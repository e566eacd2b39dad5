//! The barrier builder.
//!
//! The builder walks the sorted passes and tracks the synchronization state of every physical resource in a
//! [`PipelineEvent`]. Each access is compared against that state to decide whether a barrier is needed, and if so which
//! one. The results are stored per pass in a [`PassBarriers`]:
//!
//! * `discards`: the first use of a transient resource in the frame. Its previous contents are not needed, so the
//!   image is transitioned from `UNDEFINED`. The source stages are the last stages the resource is used in during the
//!   frame, which orders the access against the previous frame when both uses are on the same queue. Persistent
//!   resources that end the frame on another queue are released there and acquired here instead.
//! * `alias_transfers`: the first use of a resource that shares memory with a resource used earlier in the frame.
//! * `invalidate`: barriers recorded before the pass. Layout transitions, visibility of earlier writes and
//!   acquire operations of queue family ownership transfers.
//! * `flush`: barriers recorded after the pass. Release operations of ownership transfers and the final layout
//!   transitions of imported resources.
//! * `waits`: passes on other queues this pass has to wait for through a semaphore.
//! * `mips`: textures for which the mip chain is generated after the pass.

use std::collections::HashMap;

use anyhow::Result;
use ash::vk;

use crate::{Error, PipelineStage, QueueType};
use crate::graph::allocation::{PhysicalDesc, ResourceAllocation, ResourceDeclaration};
use crate::graph::pass::Pass;
use crate::graph::resource::{is_write, ResourceType, WRITE_ACCESS};

/// A single buffer or image barrier on a physical resource. Buffers always have `UNDEFINED` as both layouts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Barrier {
    /// Virtual resource the barrier is for.
    pub resource: String,
    /// Physical resource the barrier operates on.
    pub physical: usize,
    pub src_stages: PipelineStage,
    pub src_access: vk::AccessFlags2,
    pub dst_stages: PipelineStage,
    pub dst_access: vk::AccessFlags2,
    pub old_layout: vk::ImageLayout,
    pub new_layout: vk::ImageLayout,
    /// Queue owning the resource before the barrier.
    pub src_queue: QueueType,
    /// Queue owning the resource after the barrier.
    pub dst_queue: QueueType,
    /// On the first frame `old_layout` is replaced by `UNDEFINED`. Set for persistent resources, whose contents only exist
    /// after one frame was rendered.
    pub(crate) undefined_on_first_frame: bool,
}

impl Barrier {
    /// Whether this is one half of a queue family ownership transfer.
    pub fn is_ownership_transfer(&self) -> bool {
        self.src_queue != self.dst_queue
    }

    pub fn is_layout_transition(&self) -> bool {
        self.old_layout != self.new_layout
    }

    /// Queue owning the resource before the barrier in this frame. Persistent contents have no owner before the first
    /// frame, so there is nothing to acquire.
    pub fn src_queue_for_frame(&self, frame: u64) -> QueueType {
        if frame == 0 && self.undefined_on_first_frame {
            self.dst_queue
        } else {
            self.src_queue
        }
    }

    /// Layout to transition from in this frame.
    pub fn old_layout_for_frame(&self, frame: u64) -> vk::ImageLayout {
        if frame == 0 && self.undefined_on_first_frame {
            vk::ImageLayout::UNDEFINED
        } else {
            self.old_layout
        }
    }
}

/// A semaphore wait on work submitted to another queue.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub struct CrossQueueWait {
    /// Position of the pass producing the resource.
    pub producer: usize,
    /// Stages of the waiting pass that must wait.
    pub stages: PipelineStage,
}

/// Generation of the full mip chain of a texture, recorded after the pass that writes level zero.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MipGeneration {
    pub resource: String,
    pub physical: usize,
    /// Layout of the texture after the pass.
    pub from_layout: vk::ImageLayout,
    pub src_stages: PipelineStage,
    pub src_access: vk::AccessFlags2,
}

/// All synchronization recorded around one pass.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct PassBarriers {
    pub discards: Vec<Barrier>,
    pub alias_transfers: Vec<Barrier>,
    pub invalidate: Vec<Barrier>,
    pub flush: Vec<Barrier>,
    pub waits: Vec<CrossQueueWait>,
    pub mips: Vec<MipGeneration>,
}

impl PassBarriers {
    /// Whether nothing needs to be recorded before the pass.
    pub fn is_empty_before(&self) -> bool {
        self.discards.is_empty() && self.alias_transfers.is_empty() && self.invalidate.is_empty() && self.waits.is_empty()
    }

    /// Whether nothing needs to be recorded after the pass.
    pub fn is_empty_after(&self) -> bool {
        self.flush.is_empty() && self.mips.is_empty()
    }
}

const STAGE_BITS: usize = 64;

/// Synchronization state of one physical resource.
#[derive(Debug, Clone)]
pub struct PipelineEvent {
    /// Current image layout.
    pub layout: vk::ImageLayout,
    /// Writes that were not made available yet.
    pub to_flush: vk::AccessFlags2,
    /// Stages a following access has to wait for.
    pub src_stages: PipelineStage,
    /// Per pipeline stage bit, the accesses that are already visible in that stage.
    pub invalidated_in_stage: [vk::AccessFlags2; STAGE_BITS],
    /// Queue that owns the resource.
    pub queue: QueueType,
    /// Position of the last pass that accessed the resource.
    pub last_access_pass: Option<usize>,
    /// Virtual resource currently stored in the physical resource.
    pub occupant: Option<String>,
}

impl Default for PipelineEvent {
    fn default() -> Self {
        Self {
            layout: vk::ImageLayout::UNDEFINED,
            to_flush: vk::AccessFlags2::NONE,
            src_stages: PipelineStage::NONE,
            invalidated_in_stage: [vk::AccessFlags2::NONE; STAGE_BITS],
            queue: QueueType::Graphics,
            last_access_pass: None,
            occupant: None,
        }
    }
}

fn stage_bits(stages: PipelineStage) -> impl Iterator<Item = usize> {
    let raw = stages.as_raw();
    (0..STAGE_BITS).filter(move |bit| raw & (1u64 << bit) != 0)
}

impl PipelineEvent {
    /// Mark `access` as visible in `stages`.
    fn invalidate(&mut self, stages: PipelineStage, access: vk::AccessFlags2) {
        for bit in stage_bits(stages) {
            self.invalidated_in_stage[bit] |= access;
        }
    }

    fn clear_invalidated(&mut self) {
        self.invalidated_in_stage = [vk::AccessFlags2::NONE; STAGE_BITS];
    }

    /// State after a barrier to `layout` making `access` visible in `stages` was recorded.
    fn apply_barrier(&mut self, layout: vk::ImageLayout, stages: PipelineStage, access: vk::AccessFlags2) {
        if self.layout != layout {
            self.clear_invalidated();
        }
        self.to_flush = vk::AccessFlags2::NONE;
        self.layout = layout;
        self.invalidate(stages, access);
    }

    /// State after the access itself executed.
    fn apply_access(&mut self, position: usize, queue: QueueType, stages: PipelineStage, access: vk::AccessFlags2) {
        // Stages of the previous owner are ordered by the ownership transfer.
        if self.queue != queue {
            self.src_stages = PipelineStage::NONE;
        }
        if is_write(access) {
            self.to_flush = access & WRITE_ACCESS;
            self.clear_invalidated();
            self.src_stages = stages;
        } else {
            self.src_stages |= stages;
        }
        self.queue = queue;
        self.last_access_pass = Some(position);
    }
}

/// Whether `access` in `stages` needs a barrier to become visible, given the current state of the resource.
/// Layout transitions and ownership transfers are checked separately.
pub fn need_invalidate(event: &PipelineEvent, stages: PipelineStage, access: vk::AccessFlags2) -> bool {
    if !event.to_flush.is_empty() {
        return true;
    }
    stage_bits(stages).any(|bit| !event.invalidated_in_stage[bit].contains(access))
}

/// All accesses of one pass to one resource, merged.
struct MergedAccess<'a> {
    resource: &'a str,
    stages: PipelineStage,
    access: vk::AccessFlags2,
    layout: vk::ImageLayout,
}

fn merged_accesses<'a>(pass: &'a Pass<'_>) -> Vec<MergedAccess<'a>> {
    pass.resources()
        .into_iter()
        .map(|resource| {
            let name = resource.name();
            let mut merged = MergedAccess {
                resource: name,
                stages: PipelineStage::NONE,
                access: vk::AccessFlags2::NONE,
                layout: vk::ImageLayout::UNDEFINED,
            };
            for access in pass
                .reads
                .iter()
                .chain(pass.writes.iter())
                .filter(|access| access.resource.name() == name)
            {
                merged.stages |= access.stage;
                merged.access |= access.access;
                merged.layout = access.layout;
            }
            merged
        })
        .collect()
}

/// Output of the barrier builder.
#[derive(Debug, Default, Clone)]
pub struct BarrierPlan {
    /// Barriers per pass, indexed by sorted position.
    pub passes: Vec<PassBarriers>,
    /// State of every physical resource at the end of the frame.
    pub final_events: Vec<PipelineEvent>,
}

/// Build the barriers for these passes, which must be in sorted order.
/// # Errors
/// Fails if mip generation is requested for a texture written on a queue other than the graphics queue.
pub fn build_barriers(
    passes: &[Pass<'_>],
    declarations: &HashMap<String, ResourceDeclaration>,
    allocation: &ResourceAllocation,
) -> Result<BarrierPlan> {
    let mut plan = BarrierPlan {
        passes: vec![PassBarriers::default(); passes.len()],
        final_events: vec![PipelineEvent::default(); allocation.physical.len()],
    };
    // Discards are patched after the walk, once the final state of the frame is known.
    let mut discards: Vec<(usize, usize)> = Vec::new();

    for (position, pass) in passes.iter().enumerate() {
        let queue = pass.queue;
        for merged in merged_accesses(pass) {
            let Some(physical) = allocation.physical_index(merged.resource) else {
                continue;
            };
            let declaration = declarations.get(merged.resource);
            let is_image = allocation.physical[physical].desc.resource_type() == ResourceType::Image;
            let layout = if is_image {
                merged.layout
            } else {
                vk::ImageLayout::UNDEFINED
            };
            let event = &mut plan.final_events[physical];
            let write = is_write(merged.access);

            let barrier = |src_stages, src_access, old_layout, src_queue| Barrier {
                resource: merged.resource.to_owned(),
                physical,
                src_stages,
                src_access,
                dst_stages: merged.stages,
                dst_access: merged.access,
                old_layout,
                new_layout: layout,
                src_queue,
                dst_queue: queue,
                undefined_on_first_frame: false,
            };

            if event.occupant.as_deref() != Some(merged.resource) {
                let previous = event.occupant.replace(merged.resource.to_owned());
                match (previous, declaration.and_then(ResourceDeclaration::import_info)) {
                    (None, Some(import)) => {
                        // Imported resources start out in the state the application left them in.
                        event.layout = import.initial_layout;
                        event.src_stages = import.stages;
                        event.to_flush = import.access;
                        event.queue = queue;
                    }
                    (None, None) => {
                        let persistent = declaration.map_or(false, ResourceDeclaration::is_persistent);
                        let mut discard = barrier(PipelineStage::NONE, vk::AccessFlags2::NONE, vk::ImageLayout::UNDEFINED, queue);
                        discard.undefined_on_first_frame = persistent;
                        trace!("Discard of `{}` before pass `{}`", merged.resource, pass.name);
                        discards.push((position, plan.passes[position].discards.len()));
                        plan.passes[position].discards.push(discard);
                        event.apply_barrier(layout, merged.stages, merged.access);
                        event.apply_access(position, queue, merged.stages, merged.access);
                        continue;
                    }
                    (Some(previous), _) => {
                        let transfer = barrier(event.src_stages, event.to_flush, vk::ImageLayout::UNDEFINED, queue);
                        trace!("Alias transfer `{previous}` -> `{}` before pass `{}`", merged.resource, pass.name);
                        if event.queue != queue {
                            if let Some(producer) = event.last_access_pass {
                                plan.passes[position].waits.push(CrossQueueWait {
                                    producer,
                                    stages: merged.stages,
                                });
                            }
                        }
                        plan.passes[position].alias_transfers.push(transfer);
                        event.apply_barrier(layout, merged.stages, merged.access);
                        event.apply_access(position, queue, merged.stages, merged.access);
                        continue;
                    }
                }
            }

            let layout_change = is_image && event.layout != layout;
            if event.queue != queue {
                // Queue family ownership transfer: release after the producer, acquire before this pass.
                let release = Barrier {
                    dst_stages: PipelineStage::NONE,
                    dst_access: vk::AccessFlags2::NONE,
                    ..barrier(event.src_stages, event.to_flush, event.layout, event.queue)
                };
                let acquire = Barrier {
                    src_stages: PipelineStage::NONE,
                    src_access: vk::AccessFlags2::NONE,
                    ..barrier(event.src_stages, event.to_flush, event.layout, event.queue)
                };
                trace!(
                    "Ownership transfer of `{}` from {:?} to {:?} before pass `{}`",
                    merged.resource,
                    event.queue,
                    queue,
                    pass.name
                );
                if let Some(producer) = event.last_access_pass {
                    plan.passes[producer].flush.push(release);
                    plan.passes[position].waits.push(CrossQueueWait {
                        producer,
                        stages: merged.stages,
                    });
                }
                plan.passes[position].invalidate.push(acquire);
                event.apply_barrier(layout, merged.stages, merged.access);
            } else if layout_change
                || need_invalidate(event, merged.stages, merged.access)
                || (write && !event.src_stages.is_empty())
            {
                let invalidate = barrier(event.src_stages, event.to_flush, event.layout, queue);
                trace!(
                    "Barrier on `{}` before pass `{}`: {:?} -> {:?}",
                    merged.resource,
                    pass.name,
                    invalidate.old_layout,
                    invalidate.new_layout
                );
                plan.passes[position].invalidate.push(invalidate);
                event.apply_barrier(layout, merged.stages, merged.access);
            }
            event.apply_access(position, queue, merged.stages, merged.access);
        }

        // Mip chains are generated after every pass that writes a texture requesting them.
        for write in pass.writes.iter() {
            let name = write.resource.name();
            let Some(ResourceDeclaration::Texture(info)) = declarations.get(name) else {
                continue;
            };
            let Some(physical) = allocation.physical_index(name) else {
                continue;
            };
            let generates = match &allocation.physical[physical].desc {
                PhysicalDesc::Image(desc) => info.generate_mips && desc.mip_levels > 1,
                _ => false,
            };
            if !generates || plan.passes[position].mips.iter().any(|mip| mip.resource == name) {
                continue;
            }
            if pass.queue != QueueType::Graphics {
                return Err(Error::InvalidPass("Mip generation requires a pass on the graphics queue").into());
            }
            let event = &mut plan.final_events[physical];
            plan.passes[position].mips.push(MipGeneration {
                resource: name.to_owned(),
                physical,
                from_layout: event.layout,
                src_stages: event.src_stages,
                src_access: event.to_flush,
            });
            event.layout = vk::ImageLayout::TRANSFER_SRC_OPTIMAL;
            event.to_flush = vk::AccessFlags2::TRANSFER_WRITE;
            event.src_stages = PipelineStage::BLIT;
            event.clear_invalidated();
        }
    }

    // Final layouts of imported resources.
    for (physical, info) in allocation.physical.iter().enumerate() {
        if !info.imported {
            continue;
        }
        let event = &mut plan.final_events[physical];
        let Some(occupant) = event.occupant.clone() else {
            continue;
        };
        let Some(final_layout) = declarations
            .get(&occupant)
            .and_then(ResourceDeclaration::import_info)
            .and_then(|import| import.final_layout)
        else {
            continue;
        };
        let Some(last) = event.last_access_pass else {
            continue;
        };
        let transition = Barrier {
            resource: occupant,
            physical,
            src_stages: event.src_stages,
            src_access: event.to_flush,
            dst_stages: PipelineStage::NONE,
            dst_access: vk::AccessFlags2::NONE,
            old_layout: event.layout,
            new_layout: final_layout,
            src_queue: event.queue,
            dst_queue: event.queue,
            undefined_on_first_frame: false,
        };
        trace!("Final transition of `{}` to {:?} after pass `{}`", transition.resource, final_layout, passes[last].name);
        plan.passes[last].flush.push(transition);
        event.layout = final_layout;
        event.to_flush = vk::AccessFlags2::NONE;
    }

    // Order the first use in a frame after the last use in the previous frame.
    for (position, index) in discards {
        let event = &plan.final_events[plan.passes[position].discards[index].physical];
        let discard = &mut plan.passes[position].discards[index];
        if event.queue == discard.dst_queue {
            discard.src_stages = event.src_stages;
            if discard.undefined_on_first_frame {
                discard.old_layout = event.layout;
                discard.src_access = event.to_flush;
            }
            continue;
        }
        // The previous frame was retired through its fences before this one is submitted, so work on another queue is
        // already complete. Stages of that queue may not even exist on this one.
        discard.src_stages = PipelineStage::NONE;
        discard.src_access = vk::AccessFlags2::NONE;
        if !discard.undefined_on_first_frame {
            continue;
        }
        // Persistent contents change queue between frames: release after the last use, acquire on first use.
        discard.old_layout = event.layout;
        discard.src_queue = event.queue;
        let release = Barrier {
            src_stages: event.src_stages,
            src_access: event.to_flush,
            dst_stages: PipelineStage::NONE,
            dst_access: vk::AccessFlags2::NONE,
            undefined_on_first_frame: false,
            ..discard.clone()
        };
        let Some(last) = event.last_access_pass else {
            continue;
        };
        trace!(
            "Ownership of `{}` moves from {:?} to {:?} between frames",
            release.resource,
            release.src_queue,
            release.dst_queue
        );
        plan.passes[last].flush.push(release);
    }

    Ok(plan)
}
