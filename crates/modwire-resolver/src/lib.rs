//! Module dependency resolution.
//!
//! Given a [`modwire_core::world::World`] of resources and a
//! [`context::ResolveContext`] describing what must resolve and where
//! candidates come from, [`resolver::resolve`] produces a wire map pairing
//! every effective requirement with the capability chosen for it.
//! Resolution populates a candidate graph, merges fragments into their
//! hosts, and then searches candidate orderings until the uses-constraint
//! checker accepts one.

pub mod candidates;
mod consistency;
pub mod context;
pub mod error;
mod fragment;
pub mod graph;
pub mod packages;
pub mod resolver;

pub use candidates::Candidates;
pub use context::{ResolveContext, StandardContext};
pub use error::{ResolveError, ResolveResult};
pub use graph::WireGraph;
pub use resolver::{resolve, resolve_dynamic};
