//! Fragment-to-host merging.
//!
//! After population, every fragment is attached to at most one host:
//! grouped per host capability by symbolic name, the highest version wins
//! and the losers have that host removed from their candidates. Hosts with
//! at least one selected fragment are replaced by wrapped synthetics whose
//! capability and requirement sets are the union of host and fragments.

use std::collections::{BTreeMap, HashMap};

use modwire_core::ns;
use modwire_core::world::{CapabilityId, RequirementId, ResourceId, World};
use semver::Version;

use crate::candidates::{Candidates, PopulateResult};
use crate::context::ResolveContext;
use crate::error::{ResolveError, ResolveResult};

/// Merge fragments into hosts and re-point the candidate graph at the
/// wrapped synthetics. Fails only if a mandatory resource is no longer
/// populated afterwards.
pub(crate) fn prepare(
    world: &mut World,
    ctx: &dyn ResolveContext,
    candidates: &mut Candidates,
) -> ResolveResult<()> {
    let selections = select_fragments(world, candidates);

    // Unselect losers first: remove the contested host capability from
    // their host requirement's candidates.
    for (req, host_cap) in selections.unselect {
        candidates.remove_candidate(req, host_cap);
    }

    // A fragment with no host candidate left anywhere is pruned, cascading
    // exactly like a population failure.
    for fragment in selections.fragments {
        let Some(host_req) = world.host_requirement(fragment) else {
            continue;
        };
        if candidates.first_candidate(host_req).is_none() {
            let err = ResolveError::FragmentNotSelected {
                fragment: world.resource(fragment).to_string(),
                resource: fragment,
            };
            tracing::debug!("{err}");
            candidates.remove_resource(world, fragment, err);
        }
    }

    // Surviving attachments, restricted to each fragment's first remaining
    // host so a fragment attaches to exactly one host.
    let mut hosts: BTreeMap<ResourceId, Vec<ResourceId>> = BTreeMap::new();
    for (&req, list) in &candidates.candidate_map {
        let record = world.requirement(req);
        if record.namespace != ns::HOST {
            continue;
        }
        let fragment = record.resource;
        if !candidates.is_populated(fragment) {
            continue;
        }
        if let Some(&first) = list.live().first() {
            hosts
                .entry(world.capability(first).resource)
                .or_default()
                .push(fragment);
        }
    }

    // Wrap hosts in ascending id order so synthetic ids are deterministic.
    for (&host, fragments) in &mut hosts {
        fragments.sort();
        let wrapped = world.wrap_host(host, fragments);
        tracing::debug!(
            host = %world.resource(host),
            fragments = fragments.len(),
            "wrapped fragment host"
        );
        candidates.wrapped_hosts.insert(host, wrapped);
        candidates.population.insert(wrapped, PopulateResult::Success);
    }

    // Re-point dependents of every re-exposed capability at the hosted
    // copy, asking the finder where it should sit; the affected list keeps
    // its pre-wrap ordering in shadow form.
    for &wrapped in candidates.wrapped_hosts.clone().values() {
        for &hosted in &world.resource(wrapped).capabilities.clone() {
            let declared = world.declared_capability(hosted);
            let Some(dependents) = candidates.dependent_map.remove(&declared) else {
                continue;
            };
            for &req in &dependents {
                if let Some(list) = candidates.candidate_map.get_mut(&req) {
                    list.to_shadow();
                    let live = list.live_mut();
                    if let Some(pos) = live.iter().position(|&c| c == declared) {
                        live.remove(pos);
                    }
                    let idx = ctx.insert_hosted_capability(world, live, hosted).min(live.len());
                    live.insert(idx, hosted);
                }
            }
            candidates.dependent_map.insert(hosted, dependents);
        }
    }

    // Copy candidates from every declared requirement onto its wrapped
    // counterpart, registering the reverse dependencies.
    for &wrapped in candidates.wrapped_hosts.clone().values() {
        for &hosted_req in &world.resource(wrapped).requirements.clone() {
            let declared = world.declared_requirement(hosted_req);
            let Some(caps) = candidates.candidates_for(declared).map(|s| s.to_vec()) else {
                continue;
            };
            candidates.add_candidates(hosted_req, caps);
        }
    }

    // Wrapping and pruning may have unseated a mandatory resource.
    for &mandatory in &candidates.mandatory {
        if let Some(err) = candidates.population_error(mandatory) {
            return Err(err.clone());
        }
    }
    Ok(())
}

struct Selections {
    /// (host requirement of losing fragment, contested host capability)
    unselect: Vec<(RequirementId, CapabilityId)>,
    /// All fragments that entered selection.
    fragments: Vec<ResourceId>,
}

/// Per host capability and fragment symbolic name, keep only the highest
/// version (ties break on lowest resource id).
fn select_fragments(world: &World, candidates: &Candidates) -> Selections {
    let mut groups: HashMap<CapabilityId, BTreeMap<String, Vec<(Version, RequirementId, ResourceId)>>> =
        HashMap::new();
    let mut fragments: Vec<ResourceId> = Vec::new();

    for (&req, list) in &candidates.candidate_map {
        let record = world.requirement(req);
        if record.namespace != ns::HOST {
            continue;
        }
        let fragment = record.resource;
        if !candidates.is_populated(fragment) {
            continue;
        }
        fragments.push(fragment);
        let version = world.resource(fragment).version.clone();
        let name = world.resource(fragment).name.clone();
        for &host_cap in list.live() {
            groups
                .entry(host_cap)
                .or_default()
                .entry(name.clone())
                .or_default()
                .push((version.clone(), req, fragment));
        }
    }
    fragments.sort();
    fragments.dedup();

    let mut unselect = Vec::new();
    for (&host_cap, names) in &groups {
        for contenders in names.values() {
            let mut sorted = contenders.clone();
            sorted.sort_by(|a, b| b.0.cmp(&a.0).then(a.2.cmp(&b.2)));
            for &(_, req, _) in &sorted[1..] {
                unselect.push((req, host_cap));
            }
        }
    }

    Selections { unselect, fragments }
}
