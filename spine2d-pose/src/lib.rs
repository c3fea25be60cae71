//! Pure Rust runtime for posing 2D skeletal animations.
//!
//! Setup data is assembled in code through [`SkeletonDataBuilder`] and shared between
//! [`Skeleton`] instances. [`AnimationState`] plays, queues and crossfades animations on tracks
//! and poses a skeleton; [`Skeleton::update_world_transform`] then resolves bone world transforms
//! and constraints. The crate is renderer-agnostic.

#![forbid(unsafe_code)]

mod error;
mod model;
mod runtime;

pub use error::*;
pub use model::*;
pub use runtime::*;

#[cfg(test)]
mod test_support;

#[cfg(test)]
mod model_tests;
