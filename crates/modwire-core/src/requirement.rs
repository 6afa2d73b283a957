//! Requirements: the contracts a resource needs satisfied.

use std::collections::BTreeMap;

use semver::VersionReq;

use crate::capability::Capability;
use crate::ns;
use crate::value::Value;
use crate::world::{RequirementId, ResourceId};

/// How strongly a requirement binds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resolution {
    /// Must be wired or resolution of the owning resource fails.
    Mandatory,
    /// May be left unwired.
    Optional,
    /// Resolved lazily at runtime; excluded from static population.
    Dynamic,
}

/// Where a requirement record came from (see `CapabilityOrigin`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequirementOrigin {
    Declared,
    Hosted { declared: RequirementId },
}

/// A needed contract: namespaced, with attributes and directives.
#[derive(Debug, Clone)]
pub struct Requirement {
    pub resource: ResourceId,
    pub namespace: String,
    pub attributes: BTreeMap<String, Value>,
    pub directives: BTreeMap<String, String>,
    pub origin: RequirementOrigin,
}

impl Requirement {
    /// The wanted name, stored under the namespace key.
    pub fn name(&self) -> Option<&str> {
        self.attributes.get(&self.namespace).and_then(Value::as_str)
    }

    pub fn resolution(&self) -> Resolution {
        match self.directives.get(ns::DIR_RESOLUTION).map(String::as_str) {
            Some(ns::RESOLUTION_OPTIONAL) => Resolution::Optional,
            Some(ns::RESOLUTION_DYNAMIC) => Resolution::Dynamic,
            _ => Resolution::Mandatory,
        }
    }

    pub fn is_optional(&self) -> bool {
        self.resolution() == Resolution::Optional
    }

    pub fn is_dynamic(&self) -> bool {
        self.resolution() == Resolution::Dynamic
    }

    /// Whether this requirement participates in static resolution.
    pub fn is_effective(&self) -> bool {
        match self.directives.get(ns::DIR_EFFECTIVE) {
            None => true,
            Some(e) => e == ns::EFFECTIVE_RESOLVE,
        }
    }

    /// The semver range from the `filter` directive, if present and valid.
    pub fn version_range(&self) -> Option<VersionReq> {
        self.directives
            .get(ns::DIR_FILTER)
            .and_then(|f| VersionReq::parse(f).ok())
    }

    /// Whether a capability satisfies this requirement: same namespace,
    /// matching name (when one is wanted), and version within range.
    ///
    /// This is the matching the default context uses; custom contexts may
    /// apply their own semantics entirely.
    pub fn matches(&self, capability: &Capability) -> bool {
        if self.namespace != capability.namespace {
            return false;
        }
        if let Some(wanted) = self.name() {
            if capability.name() != Some(wanted) {
                return false;
            }
        }
        if let Some(range) = self.version_range() {
            match capability.version() {
                Some(v) => range.matches(v),
                None => return false,
            }
        } else {
            true
        }
    }
}
