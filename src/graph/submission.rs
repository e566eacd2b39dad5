//! Planning of queue submissions.
//!
//! Physical passes on the same queue are grouped into as few submits as possible. A submit has to end after a pass
//! another queue waits on, and a new one has to start at a pass that waits on another queue, because semaphores are
//! signaled and waited on per submit. One binary semaphore is created for every pair of submits with a dependency
//! between them.

use std::collections::HashMap;

use anyhow::Result;

use crate::{Error, PipelineStage, QueueType};
use crate::graph::physical_pass::PhysicalPass;

/// Execution state of a physical pass.
#[derive(Debug, Default, Copy, Clone, PartialEq, Eq, Hash)]
pub enum PassState {
    /// Not recorded yet this frame.
    #[default]
    Pending,
    Recording,
    /// Recorded and submitted, the GPU may still be executing it.
    Submitted,
    /// The GPU finished executing the pass. Its resources may be recycled.
    Complete,
}

impl PassState {
    /// Move to the next state.
    /// # Errors
    /// Fails with [`Error::InvalidStateTransition`] if `to` does not directly follow the current state.
    /// A complete pass can start over as pending.
    pub fn transition(&mut self, to: PassState) -> Result<()> {
        let allowed = matches!(
            (*self, to),
            (PassState::Pending, PassState::Recording)
                | (PassState::Recording, PassState::Submitted)
                | (PassState::Submitted, PassState::Complete)
                | (PassState::Complete, PassState::Pending)
        );
        if !allowed {
            return Err(Error::InvalidStateTransition {
                from: *self,
                to,
            }
            .into());
        }
        *self = to;
        Ok(())
    }
}

/// A semaphore between two submits.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub struct SemaphoreEdge {
    /// Index of the signaling submit.
    pub producer: usize,
    /// Index of the waiting submit.
    pub consumer: usize,
    /// Stages of the waiting submit that wait on the semaphore.
    pub stages: PipelineStage,
}

/// One planned `vkQueueSubmit2` call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlannedSubmit {
    pub queue: QueueType,
    /// Indices of the physical passes recorded into this submit, in order.
    pub physical_passes: Vec<usize>,
    /// Indices into [`SubmissionPlan::semaphores`] this submit waits on.
    pub waits: Vec<usize>,
    /// Indices into [`SubmissionPlan::semaphores`] this submit signals.
    pub signals: Vec<usize>,
    /// Waits on the frame's wait semaphores (e.g. swapchain image acquisition).
    pub waits_on_frame: bool,
    /// Signals the frame's signal semaphores (e.g. ready to present).
    pub signals_frame: bool,
    /// Last submit on its queue this frame, signals the queue's fence.
    pub signals_fence: bool,
}

/// All submits of a frame, ordered so that every semaphore is signaled by an earlier submit than the one waiting on it.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct SubmissionPlan {
    pub submits: Vec<PlannedSubmit>,
    pub semaphores: Vec<SemaphoreEdge>,
}

impl SubmissionPlan {
    /// Index of the submit containing this physical pass.
    pub fn submit_of(&self, physical_pass: usize) -> Option<usize> {
        self.submits
            .iter()
            .position(|submit| submit.physical_passes.contains(&physical_pass))
    }

    /// For every semaphore, whether it is left signaled without a waiter when only the first `submitted` submits
    /// reached the queue. Such a binary semaphore cannot be signaled again.
    pub fn unconsumed_semaphores(&self, submitted: usize) -> Vec<bool> {
        self.semaphores
            .iter()
            .map(|edge| edge.producer < submitted && edge.consumer >= submitted)
            .collect()
    }
}

/// Plan the submits for these physical passes. `touches_frame[i]` tells whether physical pass `i` uses the backbuffer.
/// If no pass does, the frame semaphores apply to the first and last submit.
pub fn plan_submissions(physical_passes: &[PhysicalPass], touches_frame: &[bool]) -> SubmissionPlan {
    let mut physical_of: HashMap<usize, usize> = HashMap::new();
    for (index, physical) in physical_passes.iter().enumerate() {
        for &pass in &physical.passes {
            physical_of.insert(pass, index);
        }
    }

    let producers = physical_passes
        .iter()
        .flat_map(|physical| physical.barriers.waits.iter())
        .filter_map(|wait| physical_of.get(&wait.producer).copied())
        .collect::<Vec<_>>();

    let mut plan = SubmissionPlan::default();
    let mut submit_of = vec![0; physical_passes.len()];
    let mut open: [Option<usize>; 3] = [None; 3];
    for (index, physical) in physical_passes.iter().enumerate() {
        let slot = physical.queue.index();
        let submit = match open[slot] {
            Some(submit) if physical.barriers.waits.is_empty() => submit,
            _ => {
                plan.submits.push(PlannedSubmit {
                    queue: physical.queue,
                    physical_passes: Vec::new(),
                    waits: Vec::new(),
                    signals: Vec::new(),
                    waits_on_frame: false,
                    signals_frame: false,
                    signals_fence: false,
                });
                plan.submits.len() - 1
            }
        };
        plan.submits[submit].physical_passes.push(index);
        submit_of[index] = submit;
        open[slot] = if producers.contains(&index) {
            None
        } else {
            Some(submit)
        };
    }

    let mut edges: HashMap<(usize, usize), usize> = HashMap::new();
    for (index, physical) in physical_passes.iter().enumerate() {
        for wait in &physical.barriers.waits {
            let Some(&producer) = physical_of.get(&wait.producer) else {
                continue;
            };
            let (producer, consumer) = (submit_of[producer], submit_of[index]);
            if producer == consumer {
                continue;
            }
            let edge = *edges.entry((producer, consumer)).or_insert_with(|| {
                plan.semaphores.push(SemaphoreEdge {
                    producer,
                    consumer,
                    stages: PipelineStage::NONE,
                });
                plan.submits[producer].signals.push(plan.semaphores.len() - 1);
                plan.submits[consumer].waits.push(plan.semaphores.len() - 1);
                plan.semaphores.len() - 1
            });
            plan.semaphores[edge].stages |= wait.stages;
        }
    }

    if !plan.submits.is_empty() {
        let frame_submits = (0..physical_passes.len())
            .filter(|&index| touches_frame.get(index).copied().unwrap_or(false))
            .map(|index| submit_of[index])
            .collect::<Vec<_>>();
        let first = frame_submits.iter().copied().min().unwrap_or(0);
        let last = frame_submits
            .iter()
            .copied()
            .max()
            .unwrap_or(plan.submits.len() - 1);
        plan.submits[first].waits_on_frame = true;
        plan.submits[last].signals_frame = true;

        for queue in QueueType::ALL {
            if let Some(submit) = plan.submits.iter_mut().rev().find(|submit| submit.queue == queue) {
                submit.signals_fence = true;
            }
        }
    }

    trace!(
        "Planned {} submits with {} semaphores for {} physical passes",
        plan.submits.len(),
        plan.semaphores.len(),
        physical_passes.len()
    );

    plan
}
