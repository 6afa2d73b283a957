//! Capabilities: the contracts a resource offers.

use std::collections::BTreeMap;

use semver::Version;

use crate::ns;
use crate::value::Value;
use crate::world::{CapabilityId, ResourceId};

/// Where a capability record came from.
///
/// `Hosted` capabilities are synthesized during fragment merging: they live
/// on a wrapped host resource and point back at the declared capability they
/// re-expose, which is what diagnostics and the final wires report.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CapabilityOrigin {
    Declared,
    Hosted { declared: CapabilityId },
}

/// A provided contract: namespaced, with attributes and directives.
#[derive(Debug, Clone)]
pub struct Capability {
    pub resource: ResourceId,
    pub namespace: String,
    pub attributes: BTreeMap<String, Value>,
    pub directives: BTreeMap<String, String>,
    pub origin: CapabilityOrigin,
}

impl Capability {
    /// The provided name, stored under the namespace key.
    pub fn name(&self) -> Option<&str> {
        self.attributes.get(&self.namespace).and_then(Value::as_str)
    }

    pub fn version(&self) -> Option<&Version> {
        self.attributes.get(ns::ATTR_VERSION).and_then(Value::as_version)
    }

    /// Package names listed in the `uses` directive.
    pub fn uses(&self) -> impl Iterator<Item = &str> {
        self.directives
            .get(ns::DIR_USES)
            .map(String::as_str)
            .unwrap_or("")
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cap(uses: &str) -> Capability {
        let mut attributes = BTreeMap::new();
        attributes.insert(ns::PACKAGE.to_string(), Value::from("org.example"));
        let mut directives = BTreeMap::new();
        if !uses.is_empty() {
            directives.insert(ns::DIR_USES.to_string(), uses.to_string());
        }
        Capability {
            resource: ResourceId(0),
            namespace: ns::PACKAGE.to_string(),
            attributes,
            directives,
            origin: CapabilityOrigin::Declared,
        }
    }

    #[test]
    fn name_from_namespace_key() {
        assert_eq!(cap("").name(), Some("org.example"));
    }

    #[test]
    fn uses_splits_and_trims() {
        let c = cap("org.a, org.b ,org.c");
        let uses: Vec<&str> = c.uses().collect();
        assert_eq!(uses, vec!["org.a", "org.b", "org.c"]);
    }

    #[test]
    fn empty_uses() {
        assert_eq!(cap("").uses().count(), 0);
    }
}
