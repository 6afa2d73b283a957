//! Resolution error taxonomy.
//!
//! Errors are plain values: population records them per resource, cascades
//! chain them through `source`, and only the solve loop decides whether one
//! is terminal. They are `Clone` because the population cache is copied
//! into every speculative permutation.

use miette::Diagnostic;
use modwire_core::world::ResourceId;
use thiserror::Error;

#[derive(Debug, Clone, Error, Diagnostic)]
pub enum ResolveError {
    /// No candidate capability satisfied a mandatory requirement. Carries
    /// the upstream failure when the last candidate was removed by a
    /// cascade.
    #[error("missing requirement: {requirement}")]
    #[diagnostic(help("no candidate capability satisfied this mandatory requirement"))]
    MissingRequirement {
        requirement: String,
        resource: ResourceId,
        #[source]
        cause: Option<Box<ResolveError>>,
    },

    /// The fragment exists but lost the host-attachment race to a higher
    /// version of the same symbolic name.
    #[error("fragment {fragment} was not selected by any host")]
    FragmentNotSelected {
        fragment: String,
        resource: ResourceId,
    },

    /// No viable candidate survived population for a dynamic import.
    #[error("dynamic import of package {package} failed for {importer}")]
    DynamicImportFailed {
        package: String,
        importer: String,
        resource: ResourceId,
    },

    /// A resource would see the same package from two incompatible sources.
    /// The explanation carries both dependency chains.
    #[error("uses constraint violation for {importer}: {explanation}")]
    #[diagnostic(help("an alternative candidate ordering may avoid the conflict"))]
    UsesConstraintViolation {
        importer: String,
        explanation: String,
        resource: ResourceId,
    },
}

impl ResolveError {
    /// The resource this error blames, used by the solve loop to drop
    /// optional resources and retry.
    pub fn resource(&self) -> ResourceId {
        match self {
            ResolveError::MissingRequirement { resource, .. }
            | ResolveError::FragmentNotSelected { resource, .. }
            | ResolveError::DynamicImportFailed { resource, .. }
            | ResolveError::UsesConstraintViolation { resource, .. } => *resource,
        }
    }

    /// Follow the cause chain to the original failure.
    pub fn root_cause(&self) -> &ResolveError {
        match self {
            ResolveError::MissingRequirement {
                cause: Some(inner), ..
            } => inner.root_cause(),
            other => other,
        }
    }
}

pub type ResolveResult<T> = Result<T, ResolveError>;
