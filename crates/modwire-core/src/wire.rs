//! Wires: resolved requirement-to-capability pairings.

use std::collections::HashMap;

use crate::world::{CapabilityId, RequirementId, ResourceId};

/// One resolved pairing. All four ids reference declared records; wrapped
/// fragment-host synthetics are unwrapped before wires are built.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Wire {
    pub requirer: ResourceId,
    pub requirement: RequirementId,
    pub provider: ResourceId,
    pub capability: CapabilityId,
}

/// The established wires of an already-resolved resource, as exposed to the
/// resolver through `ResolveContext::wirings`.
#[derive(Debug, Clone, Default)]
pub struct Wiring {
    pub wires: Vec<Wire>,
}

impl Wiring {
    pub fn new(wires: Vec<Wire>) -> Self {
        Self { wires }
    }

    /// The wire established for a requirement, if any.
    pub fn wire_for(&self, requirement: RequirementId) -> Option<&Wire> {
        self.wires.iter().find(|w| w.requirement == requirement)
    }
}

/// The output of a resolution: one ordered wire list per newly resolved
/// resource, package wires before bundle wires before generic wires.
pub type WireMap = HashMap<ResourceId, Vec<Wire>>;
