//! Render graph error types.

use crate::backend::BackendError;
use thiserror::Error;

/// Errors surfaced while building or running a render graph
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum GraphError {
    /// Passes depend on each other in a loop.
    #[error("Cyclic dependency between passes: {}", .passes.join(" -> "))]
    CyclicDependency { passes: Vec<String> },
    /// An imported id was declared a second time.
    #[error("Resource '{0}' is already declared")]
    DuplicateResource(String),
    /// A resource was re-declared with a different shape or kind.
    #[error("Resource '{0}' re-declared with an incompatible description")]
    IncompatibleResource(String),
    /// A pass referenced an id nobody declared.
    #[error("Pass '{pass}' references unknown resource '{resource}'")]
    UnknownResource { pass: String, resource: String },
    /// The same view name was declared with two different descriptors.
    #[error("View '{0}' is already declared with a different description")]
    DuplicateView(String),
    /// A view kind that cannot be written was used for a write, or the other
    /// way around.
    #[error("View '{view}' cannot be used as {usage}")]
    InvalidViewUsage { view: String, usage: String },
    #[error("Render graph has not been compiled")]
    NotCompiled,
    #[error(transparent)]
    Backend(#[from] BackendError),
}

pub type GraphResult<T> = Result<T, GraphError>;
