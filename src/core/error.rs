//! Exposes the deimos error type

use std::sync::PoisonError;

use ash;
use gpu_allocator::AllocationError;
use thiserror::Error;

/// Error type that deimos can return.
#[derive(Error, Debug)]
pub enum Error {
    /// Generic Vulkan error type.
    #[error("Vulkan error: `{0}`")]
    VkError(ash::vk::Result),
    /// Vulkan allocation error.
    #[error("Vulkan allocation error: `{0}`")]
    AllocationError(AllocationError),
    /// No queue was found for requested queue type.
    #[error("No queue found that can execute `{0:?}` work.")]
    NoCapableQueue(crate::core::queue::QueueType),
    /// Pass graph contains a cycle and is impossible to resolve. Holds the names of the passes on the cycle.
    #[error("Pass graph contains a cycle through passes {0:?}")]
    GraphHasCycle(Vec<String>),
    /// A pass with this name was already added to the graph.
    #[error("Pass `{0}` was added twice.")]
    DuplicatePass(String),
    /// A pass reads a resource that nothing writes, and that was not imported either.
    #[error("Pass `{pass}` reads `{resource}`, but no pass writes it and it is not imported.")]
    DanglingRead {
        /// Name of the reading pass
        pass: String,
        /// Name of the resource
        resource: String,
    },
    /// A pass uses a resource that was never declared or imported.
    #[error("Resource `{0}` is used but was never declared or imported.")]
    UndeclaredResource(String),
    /// A resource was declared twice, or declared and imported.
    #[error("Resource `{0}` was declared twice.")]
    DuplicateResource(String),
    /// A pass uses a resource in two different image layouts.
    #[error("Pass `{pass}` uses `{resource}` in conflicting image layouts.")]
    ConflictingLayouts {
        /// Name of the pass
        pass: String,
        /// Name of the resource
        resource: String,
    },
    /// A pass declared a resource with the wrong resource type (image vs buffer).
    #[error("Resource `{0}` is used with a resource type that does not match its declaration.")]
    ResourceTypeMismatch(String),
    /// Two resources were explicitly aliased, but their lifetimes overlap.
    #[error("Cannot alias `{0}` onto `{1}`: their lifetimes overlap.")]
    AliasLifetimeOverlap(String, String),
    /// Two resources were explicitly aliased, but they do not have compatible descriptions.
    #[error("Cannot alias `{0}` onto `{1}`: their descriptions are not compatible.")]
    AliasIncompatible(String, String),
    /// Imported resources do not own memory and cannot take part in aliasing.
    #[error("Cannot alias imported resource `{0}`.")]
    AliasImported(String),
    /// The backbuffer was referenced but never set on the graph.
    #[error("Backbuffer `{0}` is not written by any pass.")]
    MissingBackbuffer(String),
    /// A human-readable token from a resource description could not be parsed.
    #[error("Unknown {kind} token `{token}`")]
    UnknownToken {
        /// What kind of token was expected
        kind: &'static str,
        /// The token that failed to parse
        token: String,
    },
    /// Pass builder was used in an invalid way.
    #[error("Invalid pass declaration: {0}")]
    InvalidPass(&'static str),
    /// No clear value was specified even though one was required.
    #[error("No clear value specified for an attachment with `VK_LOAD_OP_CLEAR`")]
    NoClearValue,
    /// No resource was bound to a virtual resource
    #[error("No resource bound to virtual resource `{0}`")]
    NoResourceBound(String),
    /// A physical pass was driven through an illegal state transition.
    #[error("Invalid pass state transition from {from:?} to {to:?}")]
    InvalidStateTransition {
        /// State the pass was in
        from: crate::graph::submission::PassState,
        /// State that was requested
        to: crate::graph::submission::PassState,
    },
    /// Failed to create an image.
    #[error("Failed to create image `{0}`")]
    ImageCreation(String),
    /// Failed to create an image view.
    #[error("Failed to create image view for `{0}`")]
    ViewCreation(String),
    /// Failed to create a buffer.
    #[error("Failed to create buffer `{0}`")]
    BufferCreation(String),
    /// Failed to bind memory to an image or buffer.
    #[error("Failed to bind memory to `{0}`")]
    MemoryBind(String),
    /// Failed to create a pipeline cache object.
    #[error("Failed to create pipeline cache `{0}`")]
    PipelineCacheCreation(String),
    /// Poisoned mutex
    #[error("Poisoned mutex")]
    PoisonError,
    /// Uncategorized error.
    #[error("Uncategorized error: `{0}`")]
    Uncategorized(&'static str),
}

impl From<ash::vk::Result> for Error {
    fn from(value: ash::vk::Result) -> Self {
        Error::VkError(value)
    }
}

impl From<AllocationError> for Error {
    fn from(value: AllocationError) -> Self {
        Error::AllocationError(value)
    }
}

impl<T> From<PoisonError<T>> for Error {
    fn from(_: PoisonError<T>) -> Self {
        Error::PoisonError
    }
}
