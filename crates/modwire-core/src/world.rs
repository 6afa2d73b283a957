//! The `World` arena and the builder used to load resources into it.
//!
//! Every resource, capability, and requirement lives in one arena and is
//! addressed by a small opaque id. Cross-references between records are ids,
//! never pointers, which is what lets the resolver clone its candidate maps
//! structurally without deep-copying any record.

use std::collections::BTreeMap;
use std::fmt;

use semver::Version;

use crate::capability::{Capability, CapabilityOrigin};
use crate::ns;
use crate::requirement::{Requirement, RequirementOrigin};
use crate::resource::{Resource, ResourceOrigin};
use crate::value::{parse_version, Value};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ResourceId(pub u32);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CapabilityId(pub u32);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RequirementId(pub u32);

impl fmt::Display for ResourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "r{}", self.0)
    }
}

/// Arena of immutable resource records.
#[derive(Debug, Default)]
pub struct World {
    resources: Vec<Resource>,
    capabilities: Vec<Capability>,
    requirements: Vec<Requirement>,
}

impl World {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn resource(&self, id: ResourceId) -> &Resource {
        &self.resources[id.0 as usize]
    }

    pub fn capability(&self, id: CapabilityId) -> &Capability {
        &self.capabilities[id.0 as usize]
    }

    pub fn requirement(&self, id: RequirementId) -> &Requirement {
        &self.requirements[id.0 as usize]
    }

    pub fn resource_ids(&self) -> impl Iterator<Item = ResourceId> {
        (0..self.resources.len() as u32).map(ResourceId)
    }

    /// A fragment is a resource declaring a host-namespace requirement.
    pub fn is_fragment(&self, id: ResourceId) -> bool {
        self.resource(id)
            .requirements
            .iter()
            .any(|&r| self.requirement(r).namespace == ns::HOST)
    }

    /// The fragment's host-attachment requirement, if it has one.
    pub fn host_requirement(&self, id: ResourceId) -> Option<RequirementId> {
        self.resource(id)
            .requirements
            .iter()
            .copied()
            .find(|&r| self.requirement(r).namespace == ns::HOST)
    }

    /// Unwrap a hosted capability to the capability the module declared.
    pub fn declared_capability(&self, id: CapabilityId) -> CapabilityId {
        match self.capability(id).origin {
            CapabilityOrigin::Declared => id,
            CapabilityOrigin::Hosted { declared } => declared,
        }
    }

    /// Unwrap a hosted requirement to the requirement the module declared.
    pub fn declared_requirement(&self, id: RequirementId) -> RequirementId {
        match self.requirement(id).origin {
            RequirementOrigin::Declared => id,
            RequirementOrigin::Hosted { declared } => declared,
        }
    }

    /// Unwrap a wrapped fragment-host resource to the declared host.
    pub fn declared_resource(&self, id: ResourceId) -> ResourceId {
        match self.resource(id).origin {
            ResourceOrigin::Declared => id,
            ResourceOrigin::Wrapped { host, .. } => host,
        }
    }

    /// Synthesize a wrapped resource merging a host with its attached
    /// fragments. Capability and requirement sets are the union of host and
    /// fragments, minus the fragments' host-attachment requirements; every
    /// derived record points back at the declared one it re-exposes.
    pub fn wrap_host(&mut self, host: ResourceId, fragments: &[ResourceId]) -> ResourceId {
        let id = ResourceId(self.resources.len() as u32);
        let name = self.resource(host).name.clone();
        let version = self.resource(host).version.clone();

        let mut capabilities = Vec::new();
        let mut requirements = Vec::new();
        for &source in std::iter::once(&host).chain(fragments) {
            for &cap in &self.resource(source).capabilities.clone() {
                let declared = self.capability(cap);
                let hosted = Capability {
                    resource: id,
                    namespace: declared.namespace.clone(),
                    attributes: declared.attributes.clone(),
                    directives: declared.directives.clone(),
                    origin: CapabilityOrigin::Hosted { declared: cap },
                };
                capabilities.push(self.push_capability(hosted));
            }
            for &req in &self.resource(source).requirements.clone() {
                let declared = self.requirement(req);
                if source != host && declared.namespace == ns::HOST {
                    continue;
                }
                let hosted = Requirement {
                    resource: id,
                    namespace: declared.namespace.clone(),
                    attributes: declared.attributes.clone(),
                    directives: declared.directives.clone(),
                    origin: RequirementOrigin::Hosted { declared: req },
                };
                requirements.push(self.push_requirement(hosted));
            }
        }

        self.resources.push(Resource {
            name,
            version,
            capabilities,
            requirements,
            origin: ResourceOrigin::Wrapped {
                host,
                fragments: fragments.to_vec(),
            },
        });
        id
    }

    /// Human-readable requirement description for diagnostics.
    pub fn describe_requirement(&self, id: RequirementId) -> String {
        let req = self.requirement(self.declared_requirement(id));
        let owner = self.resource(req.resource);
        let name = req.name().unwrap_or("*");
        match req.directives.get(ns::DIR_FILTER) {
            Some(range) => format!("{} {name} ({range}) of {owner}", req.namespace),
            None => format!("{} {name} of {owner}", req.namespace),
        }
    }

    /// Human-readable capability description for diagnostics.
    pub fn describe_capability(&self, id: CapabilityId) -> String {
        let cap = self.capability(self.declared_capability(id));
        let owner = self.resource(self.declared_resource(cap.resource));
        format!("{} {} of {owner}", cap.namespace, cap.name().unwrap_or("*"))
    }

    fn push_capability(&mut self, cap: Capability) -> CapabilityId {
        let id = CapabilityId(self.capabilities.len() as u32);
        self.capabilities.push(cap);
        id
    }

    fn push_requirement(&mut self, req: Requirement) -> RequirementId {
        let id = RequirementId(self.requirements.len() as u32);
        self.requirements.push(req);
        id
    }
}

/// Builds one declared resource into a `World`.
pub struct ResourceBuilder {
    name: String,
    version: Version,
    capabilities: Vec<(String, BTreeMap<String, Value>, BTreeMap<String, String>)>,
    requirements: Vec<(String, BTreeMap<String, Value>, BTreeMap<String, String>)>,
}

impl ResourceBuilder {
    /// Start a resource. Versions parse leniently (`"1.0"` becomes `1.0.0`);
    /// unparseable versions fall back to `0.0.0`.
    pub fn new(name: &str, version: &str) -> Self {
        Self {
            name: name.to_string(),
            version: parse_version(version).unwrap_or_else(|| Version::new(0, 0, 0)),
            capabilities: Vec::new(),
            requirements: Vec::new(),
        }
    }

    /// Export a package, optionally constraining consumers' transitive view
    /// with `uses`.
    pub fn export_package(mut self, package: &str, version: &str, uses: &[&str]) -> Self {
        let mut attributes = BTreeMap::new();
        attributes.insert(ns::PACKAGE.to_string(), Value::from(package));
        if let Some(v) = parse_version(version) {
            attributes.insert(ns::ATTR_VERSION.to_string(), Value::from(v));
        }
        let mut directives = BTreeMap::new();
        if !uses.is_empty() {
            directives.insert(ns::DIR_USES.to_string(), uses.join(","));
        }
        self.capabilities.push((ns::PACKAGE.to_string(), attributes, directives));
        self
    }

    pub fn import_package(self, package: &str, range: Option<&str>) -> Self {
        self.package_requirement(package, range, None)
    }

    pub fn optional_import_package(self, package: &str, range: Option<&str>) -> Self {
        self.package_requirement(package, range, Some(ns::RESOLUTION_OPTIONAL))
    }

    /// A dynamic import: recorded on the resource but excluded from static
    /// population; resolved through the dynamic entry point.
    pub fn dynamic_import_package(self, package: &str) -> Self {
        self.package_requirement(package, None, Some(ns::RESOLUTION_DYNAMIC))
    }

    /// Offer this module as a whole (bundle namespace), named after itself.
    pub fn offer_bundle(mut self) -> Self {
        let mut attributes = BTreeMap::new();
        attributes.insert(ns::BUNDLE.to_string(), Value::from(self.name.as_str()));
        attributes.insert(ns::ATTR_VERSION.to_string(), Value::from(self.version.clone()));
        self.capabilities.push((ns::BUNDLE.to_string(), attributes, BTreeMap::new()));
        self
    }

    pub fn require_bundle(mut self, name: &str) -> Self {
        let mut attributes = BTreeMap::new();
        attributes.insert(ns::BUNDLE.to_string(), Value::from(name));
        self.requirements.push((ns::BUNDLE.to_string(), attributes, BTreeMap::new()));
        self
    }

    /// Accept fragments (host namespace), named after this module.
    pub fn offer_host(mut self) -> Self {
        let mut attributes = BTreeMap::new();
        attributes.insert(ns::HOST.to_string(), Value::from(self.name.as_str()));
        attributes.insert(ns::ATTR_VERSION.to_string(), Value::from(self.version.clone()));
        self.capabilities.push((ns::HOST.to_string(), attributes, BTreeMap::new()));
        self
    }

    /// Declare this resource a fragment of the named host.
    pub fn fragment_of(mut self, host: &str) -> Self {
        let mut attributes = BTreeMap::new();
        attributes.insert(ns::HOST.to_string(), Value::from(host));
        self.requirements.push((ns::HOST.to_string(), attributes, BTreeMap::new()));
        self
    }

    /// A raw capability for custom namespaces.
    pub fn capability(
        mut self,
        namespace: &str,
        attributes: BTreeMap<String, Value>,
        directives: BTreeMap<String, String>,
    ) -> Self {
        self.capabilities.push((namespace.to_string(), attributes, directives));
        self
    }

    /// A raw requirement for custom namespaces.
    pub fn requirement(
        mut self,
        namespace: &str,
        attributes: BTreeMap<String, Value>,
        directives: BTreeMap<String, String>,
    ) -> Self {
        self.requirements.push((namespace.to_string(), attributes, directives));
        self
    }

    pub fn build(self, world: &mut World) -> ResourceId {
        let id = ResourceId(world.resources.len() as u32);
        let mut capabilities = Vec::new();
        for (namespace, attributes, directives) in self.capabilities {
            capabilities.push(world.push_capability(Capability {
                resource: id,
                namespace,
                attributes,
                directives,
                origin: CapabilityOrigin::Declared,
            }));
        }
        let mut requirements = Vec::new();
        for (namespace, attributes, directives) in self.requirements {
            requirements.push(world.push_requirement(Requirement {
                resource: id,
                namespace,
                attributes,
                directives,
                origin: RequirementOrigin::Declared,
            }));
        }
        world.resources.push(Resource {
            name: self.name,
            version: self.version,
            capabilities,
            requirements,
            origin: ResourceOrigin::Declared,
        });
        id
    }

    fn package_requirement(
        mut self,
        package: &str,
        range: Option<&str>,
        resolution: Option<&str>,
    ) -> Self {
        let mut attributes = BTreeMap::new();
        attributes.insert(ns::PACKAGE.to_string(), Value::from(package));
        let mut directives = BTreeMap::new();
        if let Some(r) = range {
            directives.insert(ns::DIR_FILTER.to_string(), r.to_string());
        }
        if let Some(r) = resolution {
            directives.insert(ns::DIR_RESOLUTION.to_string(), r.to_string());
        }
        self.requirements.push((ns::PACKAGE.to_string(), attributes, directives));
        self
    }
}
