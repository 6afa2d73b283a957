//! The resolver's view of its embedder: candidate discovery, existing
//! wirings, and the initial resource sets.

use std::collections::HashMap;

use modwire_core::wire::Wiring;
use modwire_core::world::{CapabilityId, RequirementId, ResourceId, World};

/// Everything the solving engine needs from the surrounding runtime.
///
/// Candidate ranking (higher priority first) is owned entirely by the
/// implementation; the resolver never re-sorts a candidate list except to
/// insert capabilities synthesized by fragment merging, for which it asks
/// [`ResolveContext::insert_hosted_capability`] for the position.
pub trait ResolveContext {
    /// Resources that must resolve or the whole call fails.
    fn mandatory_resources(&self) -> Vec<ResourceId>;

    /// Resources dropped silently if they cannot be resolved.
    fn optional_resources(&self) -> Vec<ResourceId> {
        Vec::new()
    }

    /// Ranked capabilities satisfying a requirement, best first.
    fn find_providers(&self, world: &World, requirement: RequirementId) -> Vec<CapabilityId>;

    /// Where a capability re-exposed by a fragment-merged host should sit in
    /// an existing candidate list. Defaults to the end.
    fn insert_hosted_capability(
        &self,
        world: &World,
        list: &[CapabilityId],
        hosted: CapabilityId,
    ) -> usize {
        let _ = (world, hosted);
        list.len()
    }

    /// Established wires of already-resolved resources. Read-only: this is
    /// how the resolver tells resolved from unresolved.
    fn wirings(&self) -> &HashMap<ResourceId, Wiring>;

    /// Fragments to offer a host that just populated successfully; they are
    /// queued for optional population.
    fn on_demand_fragments(&self, world: &World, host: ResourceId) -> Vec<ResourceId> {
        let _ = (world, host);
        Vec::new()
    }
}

/// Default context: matches requirements against a fixed universe of
/// resources by namespace, name, and semver range, ranking already-resolved
/// providers first and then by descending capability version.
#[derive(Debug, Default)]
pub struct StandardContext {
    universe: Vec<ResourceId>,
    mandatory: Vec<ResourceId>,
    optional: Vec<ResourceId>,
    wirings: HashMap<ResourceId, Wiring>,
    on_demand: HashMap<ResourceId, Vec<ResourceId>>,
}

impl StandardContext {
    pub fn new(universe: Vec<ResourceId>) -> Self {
        Self {
            universe,
            ..Self::default()
        }
    }

    pub fn mandatory(mut self, resource: ResourceId) -> Self {
        self.mandatory.push(resource);
        self
    }

    pub fn optional(mut self, resource: ResourceId) -> Self {
        self.optional.push(resource);
        self
    }

    /// Record an already-established wiring for a resolved resource.
    pub fn wiring(mut self, resource: ResourceId, wiring: Wiring) -> Self {
        self.wirings.insert(resource, wiring);
        self
    }

    /// Offer a fragment for on-demand attachment once the host populates.
    pub fn on_demand_fragment(mut self, host: ResourceId, fragment: ResourceId) -> Self {
        self.on_demand.entry(host).or_default().push(fragment);
        self
    }
}

impl ResolveContext for StandardContext {
    fn mandatory_resources(&self) -> Vec<ResourceId> {
        self.mandatory.clone()
    }

    fn optional_resources(&self) -> Vec<ResourceId> {
        self.optional.clone()
    }

    fn find_providers(&self, world: &World, requirement: RequirementId) -> Vec<CapabilityId> {
        let req = world.requirement(requirement);
        let mut found: Vec<CapabilityId> = Vec::new();
        for &resource in &self.universe {
            for &cap in &world.resource(resource).capabilities {
                if req.matches(world.capability(cap)) {
                    found.push(cap);
                }
            }
        }
        found.sort_by(|&a, &b| {
            let ra = world.capability(a).resource;
            let rb = world.capability(b).resource;
            let resolved_a = self.wirings.contains_key(&ra);
            let resolved_b = self.wirings.contains_key(&rb);
            resolved_b
                .cmp(&resolved_a)
                .then_with(|| {
                    let va = world.capability(a).version().cloned();
                    let vb = world.capability(b).version().cloned();
                    vb.cmp(&va)
                })
                .then(ra.cmp(&rb))
        });
        found
    }

    fn insert_hosted_capability(
        &self,
        world: &World,
        list: &[CapabilityId],
        hosted: CapabilityId,
    ) -> usize {
        // Keep the descending-version order the finder produced.
        let version = world.capability(hosted).version().cloned();
        list.iter()
            .position(|&c| world.capability(c).version().cloned() < version)
            .unwrap_or(list.len())
    }

    fn wirings(&self) -> &HashMap<ResourceId, Wiring> {
        &self.wirings
    }

    fn on_demand_fragments(&self, _world: &World, host: ResourceId) -> Vec<ResourceId> {
        self.on_demand.get(&host).cloned().unwrap_or_default()
    }
}
