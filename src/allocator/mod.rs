//! The allocator module exposes the memory allocation interface used by the render graph
//! to back its physical resources.
//! <br>
//! <br>
//! # Allocator traits
//! These are defined in [`traits`], and can be implemented to supply a custom allocator type to the render graph.
//! # Default allocator
//! A default allocator based on the `gpu_allocator` crate is implemented in [`default_allocator`]. Most types that take a generic allocator
//! parameter default to this allocator.

pub mod default_allocator;
pub mod memory_type;
pub mod traits;
