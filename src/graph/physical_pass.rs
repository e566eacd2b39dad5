//! The physical pass batcher.
//!
//! Consecutive render passes on the same queue that render to the same attachments are merged into a single
//! physical pass, so they share one `vkCmdBeginRendering` scope. A pass can only join when nothing has to be
//! synchronized in between: it may not discard, alias, wait on another queue, or need barriers other than
//! attachment accesses in an unchanged layout, which are ordered by the render pass itself. The pass before it may
//! not flush anything or generate mips.
//!
//! Clears requested by later members of a merged pass are recorded as `vkCmdClearAttachments` before that member.

use ash::vk;

use crate::QueueType;
use crate::graph::allocation::ResourceAllocation;
use crate::graph::barrier::{BarrierPlan, PassBarriers};
use crate::graph::pass::Pass;
use crate::graph::resource::{AttachmentType, ResourceUsage};

/// Where an attachment is bound in the rendering scope.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum AttachmentSlot {
    /// Index into the color attachments.
    Color(u32),
    Depth,
}

/// An attachment of a physical pass.
#[derive(Derivative, Clone)]
#[derivative(Debug)]
pub struct PhysicalAttachment {
    pub resource: String,
    pub physical: usize,
    pub slot: AttachmentSlot,
    pub layout: vk::ImageLayout,
    pub load_op: vk::AttachmentLoadOp,
    #[derivative(Debug = "ignore")]
    pub clear_value: Option<vk::ClearValue>,
}

/// Clear of an attachment that is already bound when a merged member pass starts.
#[derive(Derivative, Clone)]
#[derivative(Debug)]
pub struct MidPassClear {
    /// Position of the member pass requesting the clear.
    pub pass: usize,
    pub resource: String,
    pub slot: AttachmentSlot,
    #[derivative(Debug = "ignore")]
    pub value: vk::ClearValue,
}

/// One or more passes recorded together.
#[derive(Debug, Clone)]
pub struct PhysicalPass {
    /// Sorted positions of the member passes, in order.
    pub passes: Vec<usize>,
    pub queue: QueueType,
    /// Lowest dependency level of the members.
    pub level: u32,
    pub is_renderpass: bool,
    pub attachments: Vec<PhysicalAttachment>,
    /// Barriers before the first and after the last member.
    pub barriers: PassBarriers,
    pub clears: Vec<MidPassClear>,
}

impl PhysicalPass {
    /// Color attachments in slot order.
    pub fn color_attachments(&self) -> impl Iterator<Item = &PhysicalAttachment> {
        self.attachments
            .iter()
            .filter(|attachment| matches!(attachment.slot, AttachmentSlot::Color(_)))
    }

    pub fn depth_attachment(&self) -> Option<&PhysicalAttachment> {
        self.attachments
            .iter()
            .find(|attachment| attachment.slot == AttachmentSlot::Depth)
    }

    /// Mid-pass clears requested by one member.
    pub fn clears_for(&self, pass: usize) -> impl Iterator<Item = &MidPassClear> {
        self.clears.iter().filter(move |clear| clear.pass == pass)
    }

    fn attachment_key(&self) -> Vec<(usize, AttachmentSlot)> {
        self.attachments
            .iter()
            .map(|attachment| (attachment.physical, attachment.slot))
            .collect()
    }
}

fn pass_attachments(pass: &Pass<'_>, allocation: &ResourceAllocation) -> Vec<PhysicalAttachment> {
    let mut color = 0;
    let mut attachments = Vec::new();
    for write in pass.attachments() {
        let Some(physical) = allocation.physical_index(write.resource.name()) else {
            continue;
        };
        let slot = match write.usage {
            ResourceUsage::Attachment(AttachmentType::Depth) => AttachmentSlot::Depth,
            _ => {
                color += 1;
                AttachmentSlot::Color(color - 1)
            }
        };
        attachments.push(PhysicalAttachment {
            resource: write.resource.name().to_owned(),
            physical,
            slot,
            layout: write.layout,
            load_op: write.load_op.unwrap_or(vk::AttachmentLoadOp::DONT_CARE),
            clear_value: write.clear_value,
        });
    }
    attachments
}

/// Whether `barriers` only hold accesses that the rendering scope of `physical` already orders.
fn is_absorbable(physical: &PhysicalPass, barriers: &PassBarriers) -> bool {
    barriers.discards.is_empty()
        && barriers.alias_transfers.is_empty()
        && barriers.waits.is_empty()
        && barriers.invalidate.iter().all(|barrier| {
            !barrier.is_layout_transition()
                && !barrier.is_ownership_transfer()
                && physical
                    .attachments
                    .iter()
                    .any(|attachment| attachment.physical == barrier.physical)
        })
}

/// Batch passes, in sorted order, into physical passes.
/// `levels` holds the dependency level of every pass by sorted position.
pub fn batch_passes(
    passes: &[Pass<'_>],
    levels: &[u32],
    barriers: &BarrierPlan,
    allocation: &ResourceAllocation,
    merge: bool,
) -> Vec<PhysicalPass> {
    let mut physical_passes: Vec<PhysicalPass> = Vec::new();
    for (position, pass) in passes.iter().enumerate() {
        let attachments = pass_attachments(pass, allocation);
        let pass_barriers = &barriers.passes[position];

        if let Some(current) = physical_passes.last_mut() {
            let key = attachments
                .iter()
                .map(|attachment| (attachment.physical, attachment.slot))
                .collect::<Vec<_>>();
            let mergeable = merge
                && current.queue == pass.queue
                && current.is_renderpass
                && pass.is_renderpass
                && !key.is_empty()
                && current.attachment_key() == key
                && current.barriers.is_empty_after()
                && is_absorbable(current, pass_barriers);

            if mergeable {
                debug!(
                    "Merging pass `{}` into physical pass starting with pass {}",
                    pass.name, current.passes[0]
                );
                current.passes.push(position);
                current.level = current.level.min(levels[position]);
                current.barriers.flush.extend(pass_barriers.flush.iter().cloned());
                current.barriers.mips.extend(pass_barriers.mips.iter().cloned());
                for attachment in attachments {
                    if attachment.load_op == vk::AttachmentLoadOp::CLEAR {
                        if let Some(value) = attachment.clear_value {
                            current.clears.push(MidPassClear {
                                pass: position,
                                resource: attachment.resource,
                                slot: attachment.slot,
                                value,
                            });
                        }
                    }
                }
                continue;
            }
        }

        physical_passes.push(PhysicalPass {
            passes: vec![position],
            queue: pass.queue,
            level: levels[position],
            is_renderpass: pass.is_renderpass,
            attachments,
            barriers: pass_barriers.clone(),
            clears: Vec::new(),
        });
    }
    physical_passes
}
