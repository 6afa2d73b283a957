use modwire_core::wire::Wiring;
use modwire_core::world::{ResourceBuilder, World};
use modwire_resolver::{resolve_dynamic, ResolveContext, ResolveError, StandardContext};

#[test]
fn dynamic_import_wires_the_resolved_host() {
    let mut world = World::new();
    let provider = ResourceBuilder::new("provider", "1.0")
        .export_package("org.dyn", "1.0", &[])
        .build(&mut world);
    let host = ResourceBuilder::new("host", "1.0")
        .dynamic_import_package("org.dyn")
        .build(&mut world);
    let req = world.resource(host).requirements[0];

    let ctx = StandardContext::new(world.resource_ids().collect())
        .wiring(host, Wiring::default());
    let providers = ctx.find_providers(&world, req);
    let wire_map = resolve_dynamic(&mut world, &ctx, host, req, providers).unwrap();

    let host_wires = &wire_map[&host];
    assert_eq!(host_wires.len(), 1);
    assert_eq!(host_wires[0].requirement, req);
    assert_eq!(host_wires[0].provider, provider);
    // the provider itself is newly resolved
    assert!(wire_map.contains_key(&provider));
}

#[test]
fn dynamic_import_pulls_in_the_provider_closure() {
    let mut world = World::new();
    let base = ResourceBuilder::new("base", "1.0")
        .export_package("org.base", "1.0", &[])
        .build(&mut world);
    let provider = ResourceBuilder::new("provider", "1.0")
        .export_package("org.dyn", "1.0", &[])
        .import_package("org.base", None)
        .build(&mut world);
    let host = ResourceBuilder::new("host", "1.0")
        .dynamic_import_package("org.dyn")
        .build(&mut world);
    let req = world.resource(host).requirements[0];

    let ctx = StandardContext::new(world.resource_ids().collect())
        .wiring(host, Wiring::default());
    let providers = ctx.find_providers(&world, req);
    let wire_map = resolve_dynamic(&mut world, &ctx, host, req, providers).unwrap();

    assert_eq!(wire_map[&provider][0].provider, base);
    assert_eq!(wire_map[&base], Vec::new());
}

#[test]
fn dynamic_import_without_provider_fails() {
    let mut world = World::new();
    let host = ResourceBuilder::new("host", "1.0")
        .dynamic_import_package("org.absent")
        .build(&mut world);
    let req = world.resource(host).requirements[0];

    let ctx = StandardContext::new(world.resource_ids().collect())
        .wiring(host, Wiring::default());
    let providers = ctx.find_providers(&world, req);
    let err = resolve_dynamic(&mut world, &ctx, host, req, providers).unwrap_err();
    assert!(matches!(err, ResolveError::DynamicImportFailed { .. }));
    assert!(err.to_string().contains("org.absent"));
}

#[test]
fn dynamic_resolution_rejects_an_unresolved_host() {
    let mut world = World::new();
    let _provider = ResourceBuilder::new("provider", "1.0")
        .export_package("org.dyn", "1.0", &[])
        .build(&mut world);
    let host = ResourceBuilder::new("host", "1.0")
        .dynamic_import_package("org.dyn")
        .build(&mut world);
    let req = world.resource(host).requirements[0];

    // no wiring registered for the host
    let ctx = StandardContext::new(world.resource_ids().collect());
    let providers = ctx.find_providers(&world, req);
    let err = resolve_dynamic(&mut world, &ctx, host, req, providers).unwrap_err();
    assert!(matches!(err, ResolveError::DynamicImportFailed { .. }));
}

#[test]
fn dynamic_resolution_rejects_a_static_requirement() {
    let mut world = World::new();
    let _provider = ResourceBuilder::new("provider", "1.0")
        .export_package("org.api", "1.0", &[])
        .build(&mut world);
    let host = ResourceBuilder::new("host", "1.0")
        .import_package("org.api", None)
        .build(&mut world);
    let req = world.resource(host).requirements[0];

    let ctx = StandardContext::new(world.resource_ids().collect())
        .wiring(host, Wiring::default());
    let providers = ctx.find_providers(&world, req);
    let err = resolve_dynamic(&mut world, &ctx, host, req, providers).unwrap_err();
    assert!(matches!(err, ResolveError::DynamicImportFailed { .. }));
}

#[test]
fn dynamic_import_honors_uses_constraints_of_the_existing_wiring() {
    let mut world = World::new();
    // the host is already wired to api@1.0 for org.api
    let api1 = ResourceBuilder::new("api", "1.0")
        .export_package("org.api", "1.0", &[])
        .build(&mut world);
    let _api2 = ResourceBuilder::new("api", "2.0")
        .export_package("org.api", "2.0", &[])
        .build(&mut world);
    // two candidates for org.dyn; the preferred one uses org.api from
    // api@2.0 and so is incompatible with the host's existing wire
    let _bad = ResourceBuilder::new("dyn-provider", "2.0")
        .export_package("org.dyn", "2.0", &["org.api"])
        .import_package("org.api", Some(">=2"))
        .build(&mut world);
    let good = ResourceBuilder::new("dyn-provider", "1.0")
        .export_package("org.dyn", "1.0", &["org.api"])
        .import_package("org.api", Some("<2"))
        .build(&mut world);
    let host = ResourceBuilder::new("host", "1.0")
        .import_package("org.api", None)
        .dynamic_import_package("org.dyn")
        .build(&mut world);
    let static_req = world.resource(host).requirements[0];
    let dyn_req = world.resource(host).requirements[1];
    let api_cap = world.resource(api1).capabilities[0];

    let wiring = Wiring::new(vec![modwire_core::wire::Wire {
        requirer: host,
        requirement: static_req,
        provider: api1,
        capability: api_cap,
    }]);
    let ctx = StandardContext::new(world.resource_ids().collect()).wiring(host, wiring);
    let providers = ctx.find_providers(&world, dyn_req);
    let wire_map = resolve_dynamic(&mut world, &ctx, host, dyn_req, providers).unwrap();

    let wire = wire_map[&host]
        .iter()
        .find(|w| w.requirement == dyn_req)
        .unwrap();
    assert_eq!(wire.provider, good);
}
