//! The candidate graph: per-requirement candidate lists, the reverse
//! dependency map, and the population engine that fills both.
//!
//! A `Candidates` value is the unit of backtracking state. `copy()` clones
//! the bookkeeping maps structurally while sharing every resource,
//! capability, and requirement id, which is what makes speculative
//! permutations affordable.

use std::collections::{HashMap, HashSet, VecDeque};

use modwire_core::ns;
use modwire_core::world::{CapabilityId, RequirementId, ResourceId, World};

use crate::context::ResolveContext;
use crate::error::{ResolveError, ResolveResult};

/// A requirement's ordered candidates.
///
/// `Shadow` appears once fragment merging re-inserts a hosted capability at
/// a context-chosen position: `original` preserves the pre-wrap ordering for
/// diagnostics while `live` is what resolution consumes and permutation
/// mutates.
#[derive(Debug, Clone)]
pub(crate) enum CandidateList {
    Plain(Vec<CapabilityId>),
    Shadow {
        original: Vec<CapabilityId>,
        live: Vec<CapabilityId>,
    },
}

impl CandidateList {
    pub(crate) fn live(&self) -> &[CapabilityId] {
        match self {
            CandidateList::Plain(v) => v,
            CandidateList::Shadow { live, .. } => live,
        }
    }

    pub(crate) fn live_mut(&mut self) -> &mut Vec<CapabilityId> {
        match self {
            CandidateList::Plain(v) => v,
            CandidateList::Shadow { live, .. } => live,
        }
    }

    pub(crate) fn original(&self) -> &[CapabilityId] {
        match self {
            CandidateList::Plain(v) => v,
            CandidateList::Shadow { original, .. } => original,
        }
    }

    /// Upgrade to a shadow list, freezing the current ordering as original.
    pub(crate) fn to_shadow(&mut self) {
        if let CandidateList::Plain(v) = self {
            let original = v.clone();
            let live = std::mem::take(v);
            *self = CandidateList::Shadow { original, live };
        }
    }

    fn first(&self) -> Option<CapabilityId> {
        self.live().first().copied()
    }

    fn len(&self) -> usize {
        self.live().len()
    }

    fn is_empty(&self) -> bool {
        self.live().is_empty()
    }

    fn remove(&mut self, cap: CapabilityId) -> bool {
        let live = self.live_mut();
        match live.iter().position(|&c| c == cap) {
            Some(idx) => {
                live.remove(idx);
                true
            }
            None => false,
        }
    }

    fn remove_first(&mut self) -> Option<CapabilityId> {
        let live = self.live_mut();
        if live.is_empty() {
            None
        } else {
            Some(live.remove(0))
        }
    }
}

/// Per-resource population memo. Exactly one of success, failure, or
/// still-processing holds at any time.
#[derive(Debug, Clone)]
pub enum PopulateResult {
    Success,
    Failure(ResolveError),
    InProgress,
}

/// The candidate graph for one resolution attempt.
#[derive(Debug, Clone, Default)]
pub struct Candidates {
    pub(crate) mandatory: HashSet<ResourceId>,
    /// Optional roots: resolved when populated, dropped silently when not.
    pub(crate) optional: HashSet<ResourceId>,
    /// Fragments offered by the context during population; droppable like
    /// optional roots.
    pub(crate) on_demand: HashSet<ResourceId>,
    pub(crate) candidate_map: HashMap<RequirementId, CandidateList>,
    pub(crate) dependent_map: HashMap<CapabilityId, HashSet<RequirementId>>,
    pub(crate) population: HashMap<ResourceId, PopulateResult>,
    /// Declared host to its wrapped fragment-merged synthetic.
    pub(crate) wrapped_hosts: HashMap<ResourceId, ResourceId>,
    /// Export capability to the import requirement that may substitute it.
    pub(crate) substitutable: HashMap<CapabilityId, RequirementId>,
    /// Candidates removed so far, per requirement, for diagnostics.
    pub(crate) delta: HashMap<RequirementId, Vec<CapabilityId>>,
}

impl Candidates {
    pub fn new() -> Self {
        Self::default()
    }

    /// Structural clone for speculative exploration: new maps, shared ids.
    pub fn copy(&self) -> Self {
        self.clone()
    }

    /// Breadth-first closure over a starting resource: find candidates for
    /// every effective requirement, queueing newly discovered providers for
    /// population of their own. New work goes to the front of the queue.
    pub fn populate(&mut self, world: &World, ctx: &dyn ResolveContext, root: ResourceId) {
        let mut queue: VecDeque<ResourceId> = VecDeque::new();
        queue.push_front(root);
        while let Some(resource) = queue.pop_front() {
            if ctx.wirings().contains_key(&resource) {
                continue;
            }
            if self.population.contains_key(&resource) {
                continue;
            }
            self.populate_resource(world, ctx, resource, &mut queue);
        }
    }

    /// Seed the graph for a dynamic import: one wildcard requirement of an
    /// already-resolved resource against a pre-supplied candidate list.
    pub fn populate_dynamic(
        &mut self,
        world: &World,
        ctx: &dyn ResolveContext,
        host: ResourceId,
        requirement: RequirementId,
        mut caps: Vec<CapabilityId>,
    ) -> ResolveResult<()> {
        for &cap in &caps {
            let provider = world.capability(cap).resource;
            if !ctx.wirings().contains_key(&provider) && !self.population.contains_key(&provider) {
                self.populate(world, ctx, provider);
            }
        }
        caps.retain(|&cap| {
            let provider = world.capability(cap).resource;
            ctx.wirings().contains_key(&provider) || self.is_populated(provider)
        });
        if caps.is_empty() {
            let record = world.requirement(requirement);
            return Err(ResolveError::DynamicImportFailed {
                package: record.name().unwrap_or("*").to_string(),
                importer: world.resource(host).to_string(),
                resource: host,
            });
        }
        self.add_candidates(requirement, caps);
        self.mandatory.insert(host);
        Ok(())
    }

    pub fn is_populated(&self, resource: ResourceId) -> bool {
        matches!(self.population.get(&resource), Some(PopulateResult::Success))
    }

    pub fn population_error(&self, resource: ResourceId) -> Option<&ResolveError> {
        match self.population.get(&resource) {
            Some(PopulateResult::Failure(err)) => Some(err),
            _ => None,
        }
    }

    pub fn candidates_for(&self, requirement: RequirementId) -> Option<&[CapabilityId]> {
        self.candidate_map.get(&requirement).map(CandidateList::live)
    }

    /// The pre-wrap candidate ordering, for diagnostics against the list
    /// the finder originally returned.
    pub fn original_candidates(&self, requirement: RequirementId) -> Option<&[CapabilityId]> {
        self.candidate_map
            .get(&requirement)
            .map(CandidateList::original)
    }

    pub fn first_candidate(&self, requirement: RequirementId) -> Option<CapabilityId> {
        self.candidate_map.get(&requirement).and_then(CandidateList::first)
    }

    pub fn candidate_count(&self, requirement: RequirementId) -> usize {
        self.candidate_map.get(&requirement).map_or(0, CandidateList::len)
    }

    /// Drop a requirement's current first candidate; the backbone of
    /// permutation.
    pub fn remove_first_candidate(&mut self, requirement: RequirementId) -> Option<CapabilityId> {
        let removed = self.candidate_map.get_mut(&requirement)?.remove_first()?;
        self.delta.entry(requirement).or_default().push(removed);
        if let Some(deps) = self.dependent_map.get_mut(&removed) {
            deps.remove(&requirement);
        }
        if self.candidate_map.get(&requirement).is_some_and(CandidateList::is_empty) {
            self.candidate_map.remove(&requirement);
        }
        Some(removed)
    }

    /// The resource resolution actually operates on: the wrapped synthetic
    /// if the host was fragment-merged, otherwise the resource itself.
    pub fn effective_resource(&self, resource: ResourceId) -> ResourceId {
        self.wrapped_hosts.get(&resource).copied().unwrap_or(resource)
    }

    /// Whether an export is substituted: its owner also imports the package
    /// and the import currently resolves to a different provider.
    pub(crate) fn is_substituted(&self, world: &World, cap: CapabilityId) -> bool {
        let declared = world.declared_capability(cap);
        let Some(&req) = self.substitutable.get(&declared) else {
            return false;
        };
        match self.first_candidate(req) {
            Some(first) => world.declared_capability(first) != declared,
            None => false,
        }
    }

    pub(crate) fn add_candidates(&mut self, requirement: RequirementId, caps: Vec<CapabilityId>) {
        for &cap in &caps {
            self.dependent_map.entry(cap).or_default().insert(requirement);
        }
        self.candidate_map.insert(requirement, CandidateList::Plain(caps));
    }

    /// Remove one candidate from one requirement, releasing the reverse
    /// dependency entry.
    pub(crate) fn remove_candidate(&mut self, requirement: RequirementId, cap: CapabilityId) {
        let mut emptied = false;
        if let Some(list) = self.candidate_map.get_mut(&requirement) {
            if list.remove(cap) {
                self.delta.entry(requirement).or_default().push(cap);
                emptied = list.is_empty();
            }
        }
        if emptied {
            self.candidate_map.remove(&requirement);
        }
        if let Some(deps) = self.dependent_map.get_mut(&cap) {
            deps.remove(&requirement);
        }
    }

    /// Cascading removal: dropping a resource drops its requirements'
    /// candidate lists and its capabilities; any mandatory requirement that
    /// loses its last candidate fails its own resource in turn, chaining
    /// the originating error as the cause.
    pub(crate) fn remove_resource(
        &mut self,
        world: &World,
        resource: ResourceId,
        error: ResolveError,
    ) {
        let mut work = vec![(resource, error)];
        while let Some((r, err)) = work.pop() {
            if matches!(self.population.get(&r), Some(PopulateResult::Failure(_))) {
                continue;
            }
            tracing::debug!(resource = %world.resource(r), "removing resource: {err}");
            self.population.insert(r, PopulateResult::Failure(err.clone()));
            for &req in &world.resource(r).requirements {
                if let Some(list) = self.candidate_map.remove(&req) {
                    for &cap in list.live() {
                        if let Some(deps) = self.dependent_map.get_mut(&cap) {
                            deps.remove(&req);
                        }
                    }
                }
            }
            for &cap in &world.resource(r).capabilities {
                let Some(dependents) = self.dependent_map.remove(&cap) else {
                    continue;
                };
                for req in dependents {
                    let mut emptied = false;
                    if let Some(list) = self.candidate_map.get_mut(&req) {
                        if list.remove(cap) {
                            self.delta.entry(req).or_default().push(cap);
                            emptied = list.is_empty();
                        }
                    }
                    if emptied {
                        self.candidate_map.remove(&req);
                        if !world.requirement(req).is_optional() {
                            let owner = world
                                .requirement(world.declared_requirement(req))
                                .resource;
                            let chained = ResolveError::MissingRequirement {
                                requirement: world.describe_requirement(req),
                                resource: owner,
                                cause: Some(Box::new(err.clone())),
                            };
                            work.push((owner, chained));
                        }
                    }
                }
            }
        }
    }

    fn populate_resource(
        &mut self,
        world: &World,
        ctx: &dyn ResolveContext,
        resource: ResourceId,
        queue: &mut VecDeque<ResourceId>,
    ) {
        self.population.insert(resource, PopulateResult::InProgress);
        self.record_substitutables(world, resource);
        let requirements = world.resource(resource).requirements.clone();
        for req in requirements {
            let record = world.requirement(req);
            if !record.is_effective() || record.is_dynamic() {
                continue;
            }
            let mut caps = ctx.find_providers(world, req);
            let cause = self.process_candidates(world, ctx, &mut caps, queue);
            if caps.is_empty() {
                if record.is_optional() {
                    continue;
                }
                // A fragment whose host is already resolved degrades
                // gracefully; attachment happens on demand, not here.
                if record.namespace == ns::HOST && self.host_resolved_elsewhere(world, ctx, req) {
                    continue;
                }
                let err = self.missing_requirement(world, req, cause);
                self.remove_resource(world, resource, err);
                return;
            }
            self.add_candidates(req, caps);
        }
        self.population.insert(resource, PopulateResult::Success);
        tracing::trace!(resource = %world.resource(resource), "populated");
        for fragment in ctx.on_demand_fragments(world, resource) {
            if !self.population.contains_key(&fragment) {
                self.on_demand.insert(fragment);
                queue.push_back(fragment);
            }
        }
    }

    /// Inspect freshly found candidates: drop those whose provider already
    /// failed population (remembering the failure for error chaining) and
    /// queue providers not yet looked at.
    fn process_candidates(
        &mut self,
        world: &World,
        ctx: &dyn ResolveContext,
        caps: &mut Vec<CapabilityId>,
        queue: &mut VecDeque<ResourceId>,
    ) -> Option<ResolveError> {
        let mut cause = None;
        caps.retain(|&cap| {
            let provider = world.capability(cap).resource;
            if ctx.wirings().contains_key(&provider) {
                return true;
            }
            match self.population.get(&provider) {
                Some(PopulateResult::Failure(err)) => {
                    if cause.is_none() {
                        cause = Some(err.clone());
                    }
                    false
                }
                Some(_) => true,
                None => {
                    queue.push_front(provider);
                    true
                }
            }
        });
        cause
    }

    /// Record exports the owning resource may substitute with an import of
    /// the same package.
    fn record_substitutables(&mut self, world: &World, resource: ResourceId) {
        let record = world.resource(resource);
        for &cap in &record.capabilities {
            let c = world.capability(cap);
            if c.namespace != ns::PACKAGE {
                continue;
            }
            let Some(pkg) = c.name() else {
                continue;
            };
            let matching = record.requirements.iter().copied().find(|&r| {
                let q = world.requirement(r);
                q.namespace == ns::PACKAGE
                    && q.is_effective()
                    && !q.is_dynamic()
                    && q.name() == Some(pkg)
            });
            if let Some(req) = matching {
                self.substitutable.insert(cap, req);
            }
        }
    }

    fn host_resolved_elsewhere(
        &self,
        world: &World,
        ctx: &dyn ResolveContext,
        requirement: RequirementId,
    ) -> bool {
        let record = world.requirement(requirement);
        ctx.wirings().keys().any(|&r| {
            world
                .resource(r)
                .capabilities
                .iter()
                .any(|&c| record.matches(world.capability(c)))
        })
    }

    fn missing_requirement(
        &self,
        world: &World,
        requirement: RequirementId,
        cause: Option<ResolveError>,
    ) -> ResolveError {
        let discarded = self.delta.get(&requirement).map_or(0, Vec::len);
        let mut text = world.describe_requirement(requirement);
        if discarded > 0 {
            text.push_str(&format!(" ({discarded} candidate(s) discarded)"));
        }
        ResolveError::MissingRequirement {
            requirement: text,
            resource: world
                .requirement(world.declared_requirement(requirement))
                .resource,
            cause: cause.map(Box::new),
        }
    }
}
