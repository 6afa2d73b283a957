//! Uses-constraint consistency checking.
//!
//! A candidate assignment is consistent when no resource can see the same
//! package through two incompatible sources. Three conflict shapes are
//! checked, in order: imports merged from multiple fragments, an export
//! clashing with a transitively used package, and an import or required
//! package clashing with a transitively used one. Each conflict both fails
//! the current attempt and queues alternative candidate orderings on the
//! session for the solve loop to try.

use std::collections::{BTreeSet, HashSet};

use modwire_core::resource::ResourceOrigin;
use modwire_core::world::{CapabilityId, RequirementId, ResourceId, World};

use crate::candidates::Candidates;
use crate::context::ResolveContext;
use crate::error::{ResolveError, ResolveResult};
use crate::packages::{candidate_pairs, describe_blame, package_sources, Blame, PackageMap};
use crate::resolver::{DynamicSeed, Session};

/// Check one resource's package space and recurse into every candidate
/// provider it reaches. `checked` memoizes across the whole attempt;
/// `mutated` keeps one permutation per requirement per attempt.
#[allow(clippy::too_many_arguments)]
pub(crate) fn check_consistency(
    world: &World,
    ctx: &dyn ResolveContext,
    candidates: &Candidates,
    session: &mut Session,
    pkg_map: &PackageMap,
    resource: ResourceId,
    checked: &mut HashSet<ResourceId>,
    mutated: &mut HashSet<RequirementId>,
    dynamic: Option<&DynamicSeed>,
) -> ResolveResult<()> {
    if !checked.insert(resource) {
        return Ok(());
    }
    let declared = world.declared_resource(resource);
    let resolved = ctx.wirings().contains_key(&declared);
    let open = !resolved || dynamic.is_some_and(|d| d.host == declared);

    if open {
        if let Some(space) = pkg_map.get(&resource) {
            check_fragment_imports(world, candidates, session, pkg_map, resource, space, mutated)?;
            check_export_conflicts(world, candidates, session, pkg_map, resource, space, mutated)?;
            check_import_conflicts(world, candidates, session, pkg_map, resource, space, mutated)?;
        }
    }

    for (req, cap) in candidate_pairs(world, ctx, candidates, resource, dynamic) {
        let provider = candidates.effective_resource(world.capability(cap).resource);
        if let Err(err) = check_consistency(
            world, ctx, candidates, session, pkg_map, provider, checked, mutated, dynamic,
        ) {
            // An alternative provider for this requirement may sidestep the
            // downstream conflict.
            permutate_if_needed(candidates, req, session);
            return Err(err);
        }
    }
    Ok(())
}

/// Imports merged from host and fragments must agree per package.
fn check_fragment_imports(
    world: &World,
    candidates: &Candidates,
    session: &mut Session,
    pkg_map: &PackageMap,
    resource: ResourceId,
    space: &crate::packages::Packages,
    mutated: &mut HashSet<RequirementId>,
) -> ResolveResult<()> {
    if !matches!(world.resource(resource).origin, ResourceOrigin::Wrapped { .. }) {
        return Ok(());
    }
    for blames in space.imported.values() {
        let Some((first, rest)) = blames.split_first() else {
            continue;
        };
        for blame in rest {
            if is_compatible(world, candidates, pkg_map, first.capability, blame.capability) {
                continue;
            }
            for b in blames {
                if let Some(&req) = b.chain.first() {
                    if mutated.insert(req) {
                        permutate(candidates, req, &mut session.import_permutations);
                    }
                }
            }
            return Err(conflict(world, resource, first, blame));
        }
    }
    Ok(())
}

/// An export must be compatible with every transitively used source of the
/// same package.
fn check_export_conflicts(
    world: &World,
    candidates: &Candidates,
    session: &mut Session,
    pkg_map: &PackageMap,
    resource: ResourceId,
    space: &crate::packages::Packages,
    mutated: &mut HashSet<RequirementId>,
) -> ResolveResult<()> {
    for (pkg, export) in &space.exported {
        let Some(used) = space.used.get(pkg) else {
            continue;
        };
        for used_blame in used {
            if is_compatible(world, candidates, pkg_map, export.capability, used_blame.capability)
            {
                continue;
            }
            permutate_chain(candidates, &used_blame.chain, &mut session.uses_permutations, mutated);
            return Err(conflict(world, resource, export, used_blame));
        }
    }
    Ok(())
}

/// Imported and bundle-required packages must be compatible with every
/// transitively used source of the same package.
fn check_import_conflicts(
    world: &World,
    candidates: &Candidates,
    session: &mut Session,
    pkg_map: &PackageMap,
    resource: ResourceId,
    space: &crate::packages::Packages,
    mutated: &mut HashSet<RequirementId>,
) -> ResolveResult<()> {
    for (pkg, blames) in space.imported.iter().chain(space.required.iter()) {
        let Some(used) = space.used.get(pkg) else {
            continue;
        };
        for blame in blames {
            for used_blame in used {
                if is_compatible(world, candidates, pkg_map, blame.capability, used_blame.capability)
                {
                    continue;
                }
                // Try a different provider for the direct import first, and
                // independently a different assignment along the uses chain.
                if let Some(&req) = blame.chain.first() {
                    if mutated.insert(req) {
                        permutate_if_needed(candidates, req, session);
                    }
                }
                permutate_chain(
                    candidates,
                    &used_blame.chain,
                    &mut session.uses_permutations,
                    mutated,
                );
                return Err(conflict(world, resource, blame, used_blame));
            }
        }
    }
    Ok(())
}

/// Two sources of the same package are compatible when they resolve to the
/// same declared capability, or when either one's transitive source set
/// contains the other's.
fn is_compatible(
    world: &World,
    candidates: &Candidates,
    pkg_map: &PackageMap,
    a: CapabilityId,
    b: CapabilityId,
) -> bool {
    if world.declared_capability(a) == world.declared_capability(b) {
        return true;
    }
    let mut sources_a = BTreeSet::new();
    package_sources(world, candidates, pkg_map, a, &mut sources_a);
    let mut sources_b = BTreeSet::new();
    package_sources(world, candidates, pkg_map, b, &mut sources_b);
    sources_a.is_superset(&sources_b) || sources_b.is_superset(&sources_a)
}

/// Queue a copy with the requirement's first candidate removed.
fn permutate(candidates: &Candidates, req: RequirementId, queue: &mut Vec<Candidates>) {
    if candidates.candidate_count(req) <= 1 {
        return;
    }
    let mut copy = candidates.copy();
    copy.remove_first_candidate(req);
    queue.push(copy);
}

/// Like [`permutate`], but skip when a permutation already queued on either
/// queue changes this requirement's first candidate.
fn permutate_if_needed(candidates: &Candidates, req: RequirementId, session: &mut Session) {
    if candidates.candidate_count(req) <= 1 {
        return;
    }
    let current = candidates.first_candidate(req);
    if session
        .uses_permutations
        .iter()
        .chain(session.import_permutations.iter())
        .any(|p| p.first_candidate(req) != current)
    {
        return;
    }
    permutate(candidates, req, &mut session.import_permutations);
}

/// Permute the requirement nearest the conflict along a uses chain that
/// still has an alternative candidate.
fn permutate_chain(
    candidates: &Candidates,
    chain: &[RequirementId],
    queue: &mut Vec<Candidates>,
    mutated: &mut HashSet<RequirementId>,
) {
    for &req in chain.iter().rev() {
        if !mutated.insert(req) {
            continue;
        }
        if candidates.candidate_count(req) > 1 {
            permutate(candidates, req, queue);
            return;
        }
    }
}

fn conflict(world: &World, resource: ResourceId, a: &Blame, b: &Blame) -> ResolveError {
    let owner = world.declared_resource(resource);
    let err = ResolveError::UsesConstraintViolation {
        importer: world.resource(owner).to_string(),
        explanation: format!(
            "{} is inconsistent with {}",
            describe_blame(world, a),
            describe_blame(world, b)
        ),
        resource: owner,
    };
    tracing::debug!("{err}");
    err
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::StandardContext;
    use crate::packages::calculate_package_spaces;
    use modwire_core::world::ResourceBuilder;

    fn check_root(
        world: &World,
        ctx: &StandardContext,
        root: ResourceId,
    ) -> (Session, ResolveResult<()>) {
        let mut candidates = Candidates::new();
        candidates.populate(world, ctx, root);
        let mut pkg_map = PackageMap::new();
        let mut visited = HashSet::new();
        calculate_package_spaces(world, ctx, &candidates, root, &mut pkg_map, &mut visited, None);
        let mut session = Session::default();
        let mut checked = HashSet::new();
        let mut mutated = HashSet::new();
        let result = check_consistency(
            world,
            ctx,
            &candidates,
            &mut session,
            &pkg_map,
            root,
            &mut checked,
            &mut mutated,
            None,
        );
        (session, result)
    }

    /// app imports org.api (served by lib v2) and org.impl; org.impl uses
    /// org.api but was compiled against lib v1. The import/used conflict
    /// must be reported and an alternative ordering queued.
    #[test]
    fn import_used_conflict_detected_and_permuted() {
        let mut world = World::new();
        let _api1 = ResourceBuilder::new("api", "1.0")
            .export_package("org.api", "1.0", &[])
            .build(&mut world);
        let _api2 = ResourceBuilder::new("api", "2.0")
            .export_package("org.api", "2.0", &[])
            .build(&mut world);
        let _impl_ = ResourceBuilder::new("impl", "1.0")
            .export_package("org.impl", "1.0", &["org.api"])
            .import_package("org.api", Some("<2"))
            .build(&mut world);
        let app = ResourceBuilder::new("app", "1.0")
            .import_package("org.api", None)
            .import_package("org.impl", None)
            .build(&mut world);

        let ctx = StandardContext::new(world.resource_ids().collect()).mandatory(app);
        let (session, result) = check_root(&world, &ctx, app);

        let err = result.unwrap_err();
        assert!(matches!(err, ResolveError::UsesConstraintViolation { .. }));
        assert!(err.to_string().contains("org.api"));
        // the direct import of org.api has two candidates, so at least one
        // alternative ordering must be queued
        assert!(
            !session.import_permutations.is_empty() || !session.uses_permutations.is_empty()
        );
    }

    /// Same shape but only one org.api export exists: both sides see the
    /// same declared capability, so there is nothing to report.
    #[test]
    fn consistent_space_passes() {
        let mut world = World::new();
        let _api = ResourceBuilder::new("api", "1.0")
            .export_package("org.api", "1.0", &[])
            .build(&mut world);
        let _impl_ = ResourceBuilder::new("impl", "1.0")
            .export_package("org.impl", "1.0", &["org.api"])
            .import_package("org.api", None)
            .build(&mut world);
        let app = ResourceBuilder::new("app", "1.0")
            .import_package("org.api", None)
            .import_package("org.impl", None)
            .build(&mut world);

        let ctx = StandardContext::new(world.resource_ids().collect()).mandatory(app);
        let (_, result) = check_root(&world, &ctx, app);
        assert!(result.is_ok());
    }

    /// An exporter that also sees the package through a uses chain from an
    /// incompatible provider conflicts with its own export.
    #[test]
    fn export_used_conflict_detected() {
        let mut world = World::new();
        let _other = ResourceBuilder::new("other", "1.0")
            .export_package("org.api", "1.0", &[])
            .build(&mut world);
        let _bridge = ResourceBuilder::new("bridge", "1.0")
            .export_package("org.bridge", "1.0", &["org.api"])
            .import_package("org.api", Some("<2"))
            .build(&mut world);
        let app = ResourceBuilder::new("app", "2.0")
            .export_package("org.api", "2.0", &[])
            .import_package("org.bridge", None)
            .build(&mut world);

        let ctx = StandardContext::new(world.resource_ids().collect()).mandatory(app);
        let (_, result) = check_root(&world, &ctx, app);
        let err = result.unwrap_err();
        assert!(matches!(err, ResolveError::UsesConstraintViolation { .. }));
    }

    fn two_provider_requirement() -> (World, Candidates, RequirementId) {
        let mut world = World::new();
        let _a = ResourceBuilder::new("lib", "1.0")
            .export_package("org.p", "1.0", &[])
            .build(&mut world);
        let _b = ResourceBuilder::new("lib", "2.0")
            .export_package("org.p", "2.0", &[])
            .build(&mut world);
        let app = ResourceBuilder::new("app", "1.0")
            .import_package("org.p", None)
            .build(&mut world);
        let ctx = StandardContext::new(world.resource_ids().collect()).mandatory(app);
        let mut candidates = Candidates::new();
        candidates.populate(&world, &ctx, app);
        let req = world.resource(app).requirements[0];
        (world, candidates, req)
    }

    #[test]
    fn permutate_if_needed_skips_covered_requirement() {
        let (_world, candidates, req) = two_provider_requirement();

        let mut session = Session::default();
        permutate_if_needed(&candidates, req, &mut session);
        assert_eq!(session.import_permutations.len(), 1);
        // already covered: the queued copy has a different first candidate
        permutate_if_needed(&candidates, req, &mut session);
        assert_eq!(session.import_permutations.len(), 1);
    }

    #[test]
    fn permutate_if_needed_sees_uses_queue_coverage() {
        let (_world, candidates, req) = two_provider_requirement();

        // a uses-driven permutation already changes this requirement
        let mut covered = candidates.copy();
        covered.remove_first_candidate(req);
        let mut session = Session::default();
        session.uses_permutations.push(covered);

        permutate_if_needed(&candidates, req, &mut session);
        assert!(session.import_permutations.is_empty());
    }

    /// A host importing org.api unconstrained merged with a fragment pinned
    /// to the 1.x export sees the package through two incompatible sources.
    #[test]
    fn fragment_merged_import_conflict_detected_and_permuted() {
        let mut world = World::new();
        let _api1 = ResourceBuilder::new("api", "1.0")
            .export_package("org.api", "1.0", &[])
            .build(&mut world);
        let _api2 = ResourceBuilder::new("api", "2.0")
            .export_package("org.api", "2.0", &[])
            .build(&mut world);
        let host = ResourceBuilder::new("host", "1.0")
            .offer_host()
            .import_package("org.api", None)
            .build(&mut world);
        let fragment = ResourceBuilder::new("patch", "1.0")
            .fragment_of("host")
            .import_package("org.api", Some("<2"))
            .build(&mut world);

        let ctx = StandardContext::new(world.resource_ids().collect()).mandatory(host);
        let mut candidates = Candidates::new();
        candidates.populate(&world, &ctx, host);
        candidates.populate(&world, &ctx, fragment);
        crate::fragment::prepare(&mut world, &ctx, &mut candidates).unwrap();

        let wrapped = candidates.effective_resource(host);
        assert_ne!(wrapped, host);
        let mut pkg_map = PackageMap::new();
        let mut visited = HashSet::new();
        calculate_package_spaces(
            &world,
            &ctx,
            &candidates,
            wrapped,
            &mut pkg_map,
            &mut visited,
            None,
        );
        let mut session = Session::default();
        let mut checked = HashSet::new();
        let mut mutated = HashSet::new();
        let result = check_consistency(
            &world,
            &ctx,
            &candidates,
            &mut session,
            &pkg_map,
            wrapped,
            &mut checked,
            &mut mutated,
            None,
        );

        let err = result.unwrap_err();
        assert!(matches!(err, ResolveError::UsesConstraintViolation { .. }));
        assert!(err.to_string().contains("org.api"));
        // the host side of the merged import has two candidates, so an
        // alternative ordering must be queued
        assert!(!session.import_permutations.is_empty());
    }
}
