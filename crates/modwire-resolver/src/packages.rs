//! Package-space computation.
//!
//! For each resource involved in an attempt, four named package maps are
//! derived by walking the candidate graph (or the existing wiring for
//! already-resolved resources): exported, imported, required-via-bundle,
//! and used-transitively. Every entry carries a `Blame` naming the source
//! capability and the requirement chain that made it visible, which is what
//! the consistency checker backtracks over and what conflict messages
//! print.

use std::collections::{BTreeSet, HashMap, HashSet};

use modwire_core::ns;
use modwire_core::world::{CapabilityId, RequirementId, ResourceId, World};

use crate::candidates::Candidates;
use crate::context::ResolveContext;
use crate::resolver::DynamicSeed;

/// A source capability plus the ordered requirement chain justifying why it
/// is visible to the blamed resource.
#[derive(Debug, Clone)]
pub struct Blame {
    pub capability: CapabilityId,
    pub chain: Vec<RequirementId>,
}

/// The four package spaces of one resource for one attempt.
#[derive(Debug, Clone, Default)]
pub struct Packages {
    pub exported: HashMap<String, Blame>,
    pub imported: HashMap<String, Vec<Blame>>,
    pub required: HashMap<String, Vec<Blame>>,
    pub used: HashMap<String, Vec<Blame>>,
}

pub type PackageMap = HashMap<ResourceId, Packages>;

/// The (requirement, chosen capability) pairs a resource resolves through:
/// its wiring if already resolved (plus at most the one dynamic candidate),
/// otherwise the first-ranked candidate of each effective requirement.
pub(crate) fn candidate_pairs(
    world: &World,
    ctx: &dyn ResolveContext,
    candidates: &Candidates,
    resource: ResourceId,
    dynamic: Option<&DynamicSeed>,
) -> Vec<(RequirementId, CapabilityId)> {
    let declared = world.declared_resource(resource);
    if let Some(wiring) = ctx.wirings().get(&declared) {
        let mut pairs: Vec<(RequirementId, CapabilityId)> = wiring
            .wires
            .iter()
            .map(|w| (w.requirement, w.capability))
            .collect();
        if let Some(seed) = dynamic {
            if seed.host == declared {
                if let Some(cap) = candidates.first_candidate(seed.requirement) {
                    pairs.push((seed.requirement, cap));
                }
            }
        }
        return pairs;
    }
    world
        .resource(resource)
        .requirements
        .iter()
        .filter_map(|&req| {
            let record = world.requirement(req);
            if !record.is_effective() || record.is_dynamic() {
                return None;
            }
            candidates.first_candidate(req).map(|cap| (req, cap))
        })
        .collect()
}

/// Compute the package spaces of a resource and, transitively, of every
/// candidate provider it can reach. Memoized and cycle-guarded by resource
/// identity through `visited`.
pub(crate) fn calculate_package_spaces(
    world: &World,
    ctx: &dyn ResolveContext,
    candidates: &Candidates,
    resource: ResourceId,
    pkg_map: &mut PackageMap,
    visited: &mut HashSet<ResourceId>,
    dynamic: Option<&DynamicSeed>,
) {
    if !visited.insert(resource) {
        return;
    }
    let declared = world.declared_resource(resource);
    let resolved = ctx.wirings().contains_key(&declared);
    let is_dynamic_host = dynamic.is_some_and(|d| d.host == declared);

    let pairs = candidate_pairs(world, ctx, candidates, resource, dynamic);

    ensure_exports(world, candidates, resource, pkg_map);

    // Merge each chosen candidate's packages into this resource's
    // imported/required spaces, blaming the direct requirement.
    for &(req, cap) in &pairs {
        let record = world.capability(cap);
        match record.namespace.as_str() {
            ns::PACKAGE => {
                let Some(pkg) = record.name().map(str::to_string) else {
                    continue;
                };
                let provider = candidates.effective_resource(record.resource);
                ensure_exports(world, candidates, provider, pkg_map);
                if let Some(space) = pkg_map.get_mut(&resource) {
                    space.imported.entry(pkg).or_default().push(Blame {
                        capability: cap,
                        chain: vec![req],
                    });
                }
            }
            ns::BUNDLE => {
                let provider = candidates.effective_resource(record.resource);
                ensure_exports(world, candidates, provider, pkg_map);
                let exports: Vec<(String, CapabilityId)> = pkg_map
                    .get(&provider)
                    .map(|p| {
                        p.exported
                            .iter()
                            .map(|(pkg, blame)| (pkg.clone(), blame.capability))
                            .collect()
                    })
                    .unwrap_or_default();
                if let Some(space) = pkg_map.get_mut(&resource) {
                    for (pkg, export_cap) in exports {
                        space.required.entry(pkg).or_default().push(Blame {
                            capability: export_cap,
                            chain: vec![req],
                        });
                    }
                }
            }
            _ => {}
        }
    }

    // Recurse into every candidate provider's own package space.
    for &(_, cap) in &pairs {
        let provider = candidates.effective_resource(world.capability(cap).resource);
        calculate_package_spaces(world, ctx, candidates, provider, pkg_map, visited, dynamic);
    }

    // Uses propagation happens only for resources whose wiring is still
    // open: unresolved ones, or a resolved host performing a dynamic
    // import.
    if !resolved || is_dynamic_host {
        // Every chosen capability is followed, whatever its namespace: a
        // generic capability carries uses constraints just like a package
        // export. Import/require blames come on top for the chains that
        // run deeper than the direct requirement.
        let mut blames: Vec<Blame> = pairs
            .iter()
            .map(|&(req, cap)| Blame {
                capability: cap,
                chain: vec![req],
            })
            .collect();
        if let Some(space) = pkg_map.get(&resource) {
            blames.extend(
                space
                    .imported
                    .values()
                    .chain(space.required.values())
                    .flatten()
                    .cloned(),
            );
        }
        let mut cycles: HashMap<CapabilityId, Vec<ResourceId>> = HashMap::new();
        for blame in blames {
            merge_uses(
                world,
                candidates,
                resource,
                blame.capability,
                &blame.chain,
                pkg_map,
                &mut cycles,
            );
        }
    }
}

/// Fill only the exported map of a resource if nothing is recorded yet.
/// Exports proven substituted by an import are excluded.
fn ensure_exports(
    world: &World,
    candidates: &Candidates,
    resource: ResourceId,
    pkg_map: &mut PackageMap,
) {
    if pkg_map.contains_key(&resource) {
        return;
    }
    let mut space = Packages::default();
    for &cap in &world.resource(resource).capabilities {
        let record = world.capability(cap);
        if record.namespace != ns::PACKAGE {
            continue;
        }
        let Some(pkg) = record.name() else {
            continue;
        };
        if candidates.is_substituted(world, cap) {
            continue;
        }
        space.exported.insert(
            pkg.to_string(),
            Blame {
                capability: cap,
                chain: Vec::new(),
            },
        );
    }
    pkg_map.insert(resource, space);
}

/// Follow a capability's `uses` directive, merging every transitively
/// visible package into the current resource's used space. A capability
/// revisited by the same resource is a cycle and stops silently.
fn merge_uses(
    world: &World,
    candidates: &Candidates,
    current: ResourceId,
    cap: CapabilityId,
    chain: &[RequirementId],
    pkg_map: &mut PackageMap,
    cycles: &mut HashMap<CapabilityId, Vec<ResourceId>>,
) {
    let seen = cycles.entry(cap).or_default();
    if seen.contains(&current) {
        return;
    }
    seen.push(current);

    let uses: Vec<String> = world.capability(cap).uses().map(str::to_string).collect();
    if uses.is_empty() {
        return;
    }
    let provider = candidates.effective_resource(world.capability(cap).resource);
    ensure_exports(world, candidates, provider, pkg_map);

    for pkg in uses {
        // Locate the provider's own source(s) for the used package: its
        // export, or whatever it imports/requires the package from.
        let mut sources: Vec<(CapabilityId, Vec<RequirementId>)> = Vec::new();
        if let Some(space) = pkg_map.get(&provider) {
            if let Some(blame) = space.exported.get(&pkg) {
                sources.push((blame.capability, chain.to_vec()));
            } else {
                for blame in space
                    .imported
                    .get(&pkg)
                    .into_iter()
                    .chain(space.required.get(&pkg))
                    .flatten()
                {
                    let mut extended = chain.to_vec();
                    extended.extend_from_slice(&blame.chain);
                    sources.push((blame.capability, extended));
                }
            }
        }
        for (source, source_chain) in sources {
            if let Some(space) = pkg_map.get_mut(&current) {
                space.used.entry(pkg.clone()).or_default().push(Blame {
                    capability: source,
                    chain: source_chain.clone(),
                });
            }
            merge_uses(world, candidates, current, source, &source_chain, pkg_map, cycles);
        }
    }
}

/// Every capability that can act as the source of the package provided by
/// `cap`, following the provider's own import/require edges. Normalized to
/// declared ids so hosted copies compare equal.
pub(crate) fn package_sources(
    world: &World,
    candidates: &Candidates,
    pkg_map: &PackageMap,
    cap: CapabilityId,
    acc: &mut BTreeSet<CapabilityId>,
) {
    if !acc.insert(world.declared_capability(cap)) {
        return;
    }
    let record = world.capability(cap);
    if record.namespace != ns::PACKAGE {
        return;
    }
    let Some(pkg) = record.name() else {
        return;
    };
    let provider = candidates.effective_resource(record.resource);
    let Some(space) = pkg_map.get(&provider) else {
        return;
    };
    for blame in space
        .imported
        .get(pkg)
        .into_iter()
        .chain(space.required.get(pkg))
        .flatten()
    {
        package_sources(world, candidates, pkg_map, blame.capability, acc);
    }
    if let Some(blame) = space.exported.get(pkg) {
        package_sources(world, candidates, pkg_map, blame.capability, acc);
    }
}

/// Render a blame chain for conflict messages:
/// `app@1.0.0 -> [module.package org.a of app@1.0.0] -> module.package org.a of lib@2.0.0`.
pub(crate) fn describe_blame(world: &World, blame: &Blame) -> String {
    let mut parts: Vec<String> = Vec::new();
    if let Some(&first) = blame.chain.first() {
        let owner = world
            .requirement(world.declared_requirement(first))
            .resource;
        parts.push(world.resource(owner).to_string());
    }
    for &req in &blame.chain {
        parts.push(format!("[{}]", world.describe_requirement(req)));
    }
    parts.push(world.describe_capability(blame.capability));
    parts.join(" -> ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::StandardContext;
    use modwire_core::world::ResourceBuilder;

    fn spaces_for(
        world: &World,
        ctx: &StandardContext,
        root: ResourceId,
    ) -> (Candidates, PackageMap) {
        let mut candidates = Candidates::new();
        candidates.populate(world, ctx, root);
        let mut pkg_map = PackageMap::new();
        let mut visited = HashSet::new();
        calculate_package_spaces(
            world,
            ctx,
            &candidates,
            root,
            &mut pkg_map,
            &mut visited,
            None,
        );
        (candidates, pkg_map)
    }

    #[test]
    fn imports_blame_the_direct_requirement() {
        let mut world = World::new();
        let lib = ResourceBuilder::new("lib", "1.0")
            .export_package("org.api", "1.0", &[])
            .build(&mut world);
        let app = ResourceBuilder::new("app", "1.0")
            .import_package("org.api", None)
            .build(&mut world);
        let ctx = StandardContext::new(world.resource_ids().collect()).mandatory(app);
        let (_, pkg_map) = spaces_for(&world, &ctx, app);

        let space = &pkg_map[&app];
        let blames = &space.imported["org.api"];
        assert_eq!(blames.len(), 1);
        assert_eq!(blames[0].chain, vec![world.resource(app).requirements[0]]);
        assert_eq!(
            world.capability(blames[0].capability).resource,
            lib
        );
        assert!(pkg_map[&lib].exported.contains_key("org.api"));
    }

    #[test]
    fn required_via_bundle_pulls_all_exports() {
        let mut world = World::new();
        let lib = ResourceBuilder::new("lib", "1.0")
            .offer_bundle()
            .export_package("org.a", "1.0", &[])
            .export_package("org.b", "1.0", &[])
            .build(&mut world);
        let app = ResourceBuilder::new("app", "1.0")
            .require_bundle("lib")
            .build(&mut world);
        let ctx = StandardContext::new(world.resource_ids().collect()).mandatory(app);
        let (_, pkg_map) = spaces_for(&world, &ctx, app);

        let space = &pkg_map[&app];
        assert!(space.required.contains_key("org.a"));
        assert!(space.required.contains_key("org.b"));
        let _ = lib;
    }

    #[test]
    fn uses_propagates_transitively() {
        let mut world = World::new();
        let base = ResourceBuilder::new("base", "1.0")
            .export_package("org.base", "1.0", &[])
            .build(&mut world);
        let mid = ResourceBuilder::new("mid", "1.0")
            .export_package("org.mid", "1.0", &["org.base"])
            .import_package("org.base", None)
            .build(&mut world);
        let app = ResourceBuilder::new("app", "1.0")
            .import_package("org.mid", None)
            .build(&mut world);
        let ctx = StandardContext::new(world.resource_ids().collect()).mandatory(app);
        let (_, pkg_map) = spaces_for(&world, &ctx, app);

        let space = &pkg_map[&app];
        let used = &space.used["org.base"];
        assert_eq!(used.len(), 1);
        assert_eq!(world.capability(used[0].capability).resource, base);
        // chain: app's import of org.mid, then mid's import of org.base
        assert_eq!(used[0].chain.len(), 2);
        let _ = mid;
    }

    #[test]
    fn generic_capability_uses_reach_the_used_space() {
        use modwire_core::value::Value;
        use std::collections::BTreeMap;

        let mut world = World::new();
        let api = ResourceBuilder::new("api", "1.0")
            .export_package("org.api", "1.0", &[])
            .build(&mut world);
        // a service capability in its own namespace, constrained to the
        // org.api the provider was built against
        let mut cap_attrs = BTreeMap::new();
        cap_attrs.insert("module.service".to_string(), Value::from("svc"));
        let mut cap_dirs = BTreeMap::new();
        cap_dirs.insert(ns::DIR_USES.to_string(), "org.api".to_string());
        let svc = ResourceBuilder::new("svc", "1.0")
            .capability("module.service", cap_attrs, cap_dirs)
            .import_package("org.api", None)
            .build(&mut world);
        let mut req_attrs = BTreeMap::new();
        req_attrs.insert("module.service".to_string(), Value::from("svc"));
        let app = ResourceBuilder::new("app", "1.0")
            .requirement("module.service", req_attrs, BTreeMap::new())
            .build(&mut world);

        let ctx = StandardContext::new(world.resource_ids().collect()).mandatory(app);
        let (_, pkg_map) = spaces_for(&world, &ctx, app);

        let used = &pkg_map[&app].used["org.api"];
        assert_eq!(used.len(), 1);
        assert_eq!(world.capability(used[0].capability).resource, api);
        // chain: app's service requirement, then svc's import of org.api
        assert_eq!(used[0].chain.len(), 2);
        let _ = svc;
    }

    #[test]
    fn uses_cycle_stops_silently() {
        let mut world = World::new();
        let a = ResourceBuilder::new("a", "1.0")
            .export_package("org.a", "1.0", &["org.b"])
            .import_package("org.b", None)
            .build(&mut world);
        let b = ResourceBuilder::new("b", "1.0")
            .export_package("org.b", "1.0", &["org.a"])
            .import_package("org.a", None)
            .build(&mut world);
        let app = ResourceBuilder::new("app", "1.0")
            .import_package("org.a", None)
            .import_package("org.b", None)
            .build(&mut world);
        let ctx = StandardContext::new(world.resource_ids().collect()).mandatory(app);
        // must terminate
        let (_, pkg_map) = spaces_for(&world, &ctx, app);
        assert!(pkg_map[&app].used.contains_key("org.a"));
        assert!(pkg_map[&app].used.contains_key("org.b"));
        let _ = (a, b);
    }

    #[test]
    fn substituted_export_is_excluded() {
        let mut world = World::new();
        // exports org.p at 1.0 but prefers importing the 2.0 export
        let sub = ResourceBuilder::new("sub", "1.0")
            .export_package("org.p", "1.0", &[])
            .import_package("org.p", None)
            .build(&mut world);
        let main = ResourceBuilder::new("main", "2.0")
            .export_package("org.p", "2.0", &[])
            .build(&mut world);
        let ctx = StandardContext::new(world.resource_ids().collect()).mandatory(sub);
        let (_, pkg_map) = spaces_for(&world, &ctx, sub);

        assert!(!pkg_map[&sub].exported.contains_key("org.p"));
        assert!(pkg_map[&sub].imported.contains_key("org.p"));
        let _ = main;
    }

    #[test]
    fn blame_rendering_names_both_ends() {
        let mut world = World::new();
        let lib = ResourceBuilder::new("lib", "1.0")
            .export_package("org.api", "1.0", &[])
            .build(&mut world);
        let app = ResourceBuilder::new("app", "1.0")
            .import_package("org.api", None)
            .build(&mut world);
        let blame = Blame {
            capability: world.resource(lib).capabilities[0],
            chain: vec![world.resource(app).requirements[0]],
        };
        let text = describe_blame(&world, &blame);
        assert!(text.starts_with("app@1.0.0"));
        assert!(text.contains("org.api"));
        assert!(text.ends_with("of lib@1.0.0"));
    }
}
