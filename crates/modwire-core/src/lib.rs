//! Core data types for the modwire module resolver.
//!
//! This crate defines the records a resolution operates on: resources, the
//! capabilities they offer, the requirements they declare, and the wires a
//! successful resolution produces. Everything lives in a [`world::World`]
//! arena addressed by opaque ids, so the resolver's bookkeeping can be
//! cloned structurally without identity-preserving deep copies.
//!
//! This crate is intentionally free of resolver logic.

pub mod capability;
pub mod ns;
pub mod requirement;
pub mod resource;
pub mod value;
pub mod wire;
pub mod world;

pub use capability::{Capability, CapabilityOrigin};
pub use requirement::{Requirement, RequirementOrigin, Resolution};
pub use resource::{Resource, ResourceOrigin};
pub use value::{parse_version, Value};
pub use wire::{Wire, WireMap, Wiring};
pub use world::{CapabilityId, RequirementId, ResourceBuilder, ResourceId, World};
