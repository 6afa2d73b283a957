//! The solve loop: populate, merge fragments, then attempt candidate
//! assignments until one passes consistency checking, permuting candidate
//! orderings queued by the checker between attempts. A failed attempt whose
//! faulty resource is optional (or an on-demand fragment) is removed and
//! the whole process retried without it.

use std::collections::HashSet;

use modwire_core::ns;
use modwire_core::resource::ResourceOrigin;
use modwire_core::wire::{Wire, WireMap};
use modwire_core::world::{CapabilityId, RequirementId, ResourceId, World};

use crate::candidates::Candidates;
use crate::consistency::check_consistency;
use crate::context::ResolveContext;
use crate::error::{ResolveError, ResolveResult};
use crate::fragment;
use crate::packages::{calculate_package_spaces, PackageMap};

/// Per-call scratch state: the permutation queues filled by consistency
/// checking. Uses-driven permutations are exhausted before import-driven
/// ones, newest first within each queue.
#[derive(Debug, Default)]
pub(crate) struct Session {
    pub(crate) uses_permutations: Vec<Candidates>,
    pub(crate) import_permutations: Vec<Candidates>,
}

impl Session {
    fn next_permutation(&mut self) -> Option<Candidates> {
        self.uses_permutations
            .pop()
            .or_else(|| self.import_permutations.pop())
    }
}

/// A dynamic import in flight: the resolved host and its dynamic
/// requirement.
#[derive(Debug, Clone, Copy)]
pub(crate) struct DynamicSeed {
    pub host: ResourceId,
    pub requirement: RequirementId,
}

/// Resolve the context's mandatory and optional resources into a wire map.
///
/// Mandatory resources must all resolve or the call fails with the error of
/// the first one that cannot; optional resources that fail are dropped and
/// resolution is retried without them.
pub fn resolve(world: &mut World, ctx: &dyn ResolveContext) -> ResolveResult<WireMap> {
    let mut candidates = Candidates::new();
    for resource in ctx.mandatory_resources() {
        candidates.mandatory.insert(resource);
        candidates.populate(world, ctx, resource);
    }
    for resource in ctx.optional_resources() {
        candidates.optional.insert(resource);
        candidates.populate(world, ctx, resource);
    }
    let mandatory: Vec<ResourceId> = ctx.mandatory_resources();
    for &resource in &mandatory {
        if let Some(err) = candidates.population_error(resource) {
            return Err(err.clone());
        }
    }

    fragment::prepare(world, ctx, &mut candidates)?;

    let mut dropped: HashSet<ResourceId> = HashSet::new();
    loop {
        match solve(world, ctx, &candidates, None) {
            Ok(wire_map) => return Ok(wire_map),
            Err(err) => {
                let faulty = world.declared_resource(err.resource());
                let droppable = !mandatory.contains(&faulty)
                    && (candidates.optional.contains(&faulty)
                        || candidates.on_demand.contains(&faulty));
                if !droppable || !dropped.insert(faulty) {
                    return Err(err);
                }
                tracing::debug!(
                    resource = %world.resource(faulty),
                    "dropping unresolvable resource and retrying: {err}"
                );
                candidates.remove_resource(world, err.resource(), err);
                for &resource in &mandatory {
                    if let Some(err) = candidates.population_error(resource) {
                        return Err(err.clone());
                    }
                }
            }
        }
    }
}

/// Resolve a single dynamic package import of an already-resolved host
/// against a pre-ranked candidate list.
///
/// Unlike [`resolve`], a failure is final: there is no optional set to
/// shrink, so the error of the last attempt is returned directly.
pub fn resolve_dynamic(
    world: &mut World,
    ctx: &dyn ResolveContext,
    host: ResourceId,
    requirement: RequirementId,
    providers: Vec<CapabilityId>,
) -> ResolveResult<WireMap> {
    let record = world.requirement(requirement);
    if !record.is_dynamic() || record.resource != host || !ctx.wirings().contains_key(&host) {
        return Err(ResolveError::DynamicImportFailed {
            package: record.name().unwrap_or("*").to_string(),
            importer: world.resource(host).to_string(),
            resource: host,
        });
    }
    let mut candidates = Candidates::new();
    candidates.populate_dynamic(world, ctx, host, requirement, providers)?;
    fragment::prepare(world, ctx, &mut candidates)?;

    let seed = DynamicSeed { host, requirement };
    solve(world, ctx, &candidates, Some(&seed))
}

/// Attempt loop over one candidate graph: try the current ordering, and on
/// failure take the next queued permutation until none remain.
fn solve(
    world: &World,
    ctx: &dyn ResolveContext,
    base: &Candidates,
    dynamic: Option<&DynamicSeed>,
) -> ResolveResult<WireMap> {
    let mut session = Session::default();
    let mut current = base.copy();
    let mut attempt = 0usize;
    loop {
        attempt += 1;
        match try_assignment(world, ctx, &current, &mut session, dynamic) {
            Ok(wire_map) => {
                tracing::debug!(attempts = attempt, "resolution succeeded");
                return Ok(wire_map);
            }
            Err(err) => match session.next_permutation() {
                Some(next) => {
                    tracing::trace!(attempts = attempt, "attempt failed, permuting: {err}");
                    current = next;
                }
                None => return Err(err),
            },
        }
    }
}

/// One attempt: compute package spaces from the mandatory roots and every
/// still-populated optional root, check uses-consistency, and build the
/// wires.
fn try_assignment(
    world: &World,
    ctx: &dyn ResolveContext,
    candidates: &Candidates,
    session: &mut Session,
    dynamic: Option<&DynamicSeed>,
) -> ResolveResult<WireMap> {
    let mut roots: Vec<ResourceId> = candidates
        .mandatory
        .iter()
        .copied()
        .chain(
            candidates
                .optional
                .iter()
                .copied()
                .filter(|&r| candidates.is_populated(r)),
        )
        .map(|r| candidates.effective_resource(r))
        .collect();
    roots.sort();
    roots.dedup();

    let mut pkg_map = PackageMap::new();
    let mut visited = HashSet::new();
    for &root in &roots {
        calculate_package_spaces(world, ctx, candidates, root, &mut pkg_map, &mut visited, dynamic);
    }

    let mut checked = HashSet::new();
    let mut mutated = HashSet::new();
    for &root in &roots {
        check_consistency(
            world, ctx, candidates, session, &pkg_map, root, &mut checked, &mut mutated, dynamic,
        )?;
    }

    Ok(build_wire_map(world, ctx, candidates, &roots, dynamic))
}

/// Turn a consistent assignment into per-resource wires, all expressed in
/// declared ids. Resources already wired by the context are skipped; the
/// dynamic host gets exactly the one new wire.
fn build_wire_map(
    world: &World,
    ctx: &dyn ResolveContext,
    candidates: &Candidates,
    roots: &[ResourceId],
    dynamic: Option<&DynamicSeed>,
) -> WireMap {
    let mut wire_map = WireMap::new();
    for &root in roots {
        populate_wires(world, ctx, candidates, root, &mut wire_map);
    }

    if let Some(seed) = dynamic {
        if let Some(cap) = candidates.first_candidate(seed.requirement) {
            let provider = candidates.effective_resource(world.capability(cap).resource);
            wire_map.entry(seed.host).or_default().push(Wire {
                requirer: seed.host,
                requirement: seed.requirement,
                provider: world.declared_resource(provider),
                capability: world.declared_capability(cap),
            });
            populate_wires(world, ctx, candidates, provider, &mut wire_map);
        }
    }

    // Attached fragments wire to their host through the host requirement,
    // but only when the host itself is part of the result.
    for (&host, &wrapped) in &candidates.wrapped_hosts {
        if !wire_map.contains_key(&host) && !ctx.wirings().contains_key(&host) {
            continue;
        }
        let ResourceOrigin::Wrapped { ref fragments, .. } = world.resource(wrapped).origin else {
            continue;
        };
        for &frag in fragments {
            let Some(host_req) = world.host_requirement(frag) else {
                continue;
            };
            let Some(host_cap) = candidates.first_candidate(host_req) else {
                continue;
            };
            wire_map.entry(frag).or_default().push(Wire {
                requirer: frag,
                requirement: host_req,
                provider: world.declared_resource(world.capability(host_cap).resource),
                capability: world.declared_capability(host_cap),
            });
        }
    }
    wire_map
}

/// Recursively emit wires for a resource and its providers. Package wires
/// come first, then bundle wires, then everything else. A wire whose
/// provider is the requirer itself is suppressed.
fn populate_wires(
    world: &World,
    ctx: &dyn ResolveContext,
    candidates: &Candidates,
    resource: ResourceId,
    wire_map: &mut WireMap,
) {
    let declared = world.declared_resource(resource);
    if ctx.wirings().contains_key(&declared) || wire_map.contains_key(&declared) {
        return;
    }
    if world.is_fragment(declared) {
        return;
    }
    // insert a marker first so requirement cycles terminate
    wire_map.insert(declared, Vec::new());

    let mut packages: Vec<Wire> = Vec::new();
    let mut bundles: Vec<Wire> = Vec::new();
    let mut generic: Vec<Wire> = Vec::new();
    for &req in &world.resource(resource).requirements {
        let Some(cap) = candidates.first_candidate(req) else {
            continue;
        };
        let provider = candidates.effective_resource(world.capability(cap).resource);
        let provider_declared = world.declared_resource(provider);
        if provider_declared != declared {
            let wire = Wire {
                requirer: declared,
                requirement: world.declared_requirement(req),
                provider: provider_declared,
                capability: world.declared_capability(cap),
            };
            match world.requirement(req).namespace.as_str() {
                ns::PACKAGE => packages.push(wire),
                ns::BUNDLE => bundles.push(wire),
                _ => generic.push(wire),
            }
        }
        populate_wires(world, ctx, candidates, provider, wire_map);
    }
    packages.extend(bundles);
    packages.extend(generic);
    wire_map.insert(declared, packages);
}
