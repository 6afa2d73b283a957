//! Resources: module units with capabilities and requirements.

use std::fmt;

use semver::Version;

use crate::world::{CapabilityId, RequirementId, ResourceId};

/// Where a resource record came from.
///
/// `Wrapped` resources are synthesized during fragment merging: a host plus
/// its attached fragments, with derived capability and requirement lists.
/// They are never mutated after construction and never appear in the final
/// wire map; wires always report the declared host and fragments.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResourceOrigin {
    Declared,
    Wrapped {
        host: ResourceId,
        fragments: Vec<ResourceId>,
    },
}

/// A module description: ordered capabilities and requirements, immutable
/// once added to the `World`.
#[derive(Debug, Clone)]
pub struct Resource {
    pub name: String,
    pub version: Version,
    pub capabilities: Vec<CapabilityId>,
    pub requirements: Vec<RequirementId>,
    pub origin: ResourceOrigin,
}

impl fmt::Display for Resource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.name, self.version)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::parse_version;

    #[test]
    fn display() {
        let r = Resource {
            name: "com.example.app".to_string(),
            version: parse_version("1.2").unwrap(),
            capabilities: Vec::new(),
            requirements: Vec::new(),
            origin: ResourceOrigin::Declared,
        };
        assert_eq!(r.to_string(), "com.example.app@1.2.0");
    }
}
