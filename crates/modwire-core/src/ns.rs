//! Namespace, attribute, and directive constants.
//!
//! A capability's provided name is stored in its attribute map under the
//! namespace string itself, e.g. a package export carries
//! `attributes["module.package"] = "org.example.util"`.

/// Namespace for package exports and imports.
pub const PACKAGE: &str = "module.package";

/// Namespace for whole-module ("bundle") requirements.
pub const BUNDLE: &str = "module.bundle";

/// Namespace for fragment-to-host attachment.
pub const HOST: &str = "module.host";

/// Attribute holding the provided version (`Value::Version`).
pub const ATTR_VERSION: &str = "version";

/// Directive listing packages a consumer of this capability transitively
/// sees, as a comma-separated list of package names.
pub const DIR_USES: &str = "uses";

/// Directive holding a semver range the provider's version must satisfy.
pub const DIR_FILTER: &str = "filter";

/// Directive controlling when a requirement must be satisfied.
pub const DIR_RESOLUTION: &str = "resolution";

/// Directive controlling when a requirement takes effect.
pub const DIR_EFFECTIVE: &str = "effective";

pub const RESOLUTION_MANDATORY: &str = "mandatory";
pub const RESOLUTION_OPTIONAL: &str = "optional";
pub const RESOLUTION_DYNAMIC: &str = "dynamic";

/// The only effectiveness considered during static resolution.
pub const EFFECTIVE_RESOLVE: &str = "resolve";
