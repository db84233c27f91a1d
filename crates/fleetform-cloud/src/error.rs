//! Engine error types

use fleetform_core::{DeclarationError, ResourceAddress};
use thiserror::Error;

/// Fatal errors detected before any remote call is made
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigurationError {
    #[error("Dependency cycle detected: {}", format_cycle(.resources))]
    Cycle { resources: Vec<ResourceAddress> },

    #[error("{resource} references undeclared resource {target}")]
    UnresolvedReference {
        resource: ResourceAddress,
        target: ResourceAddress,
    },

    #[error("Output '{output}' references undeclared resource {target}")]
    UnresolvedOutput {
        output: String,
        target: ResourceAddress,
    },

    #[error("Resource declared more than once: {0}")]
    DuplicateResource(ResourceAddress),

    #[error("{resource} is marked for deletion but still required by {required_by}")]
    PlanConflict {
        resource: ResourceAddress,
        required_by: ResourceAddress,
    },

    #[error("Destroy target is not in state: {0}")]
    UnknownTarget(ResourceAddress),

    #[error("No provider adapter registered for kind: {kind}")]
    MissingProvider { kind: String },
}

fn format_cycle(resources: &[ResourceAddress]) -> String {
    let mut names: Vec<String> = resources.iter().map(|r| r.to_string()).collect();
    if let Some(first) = names.first().cloned() {
        names.push(first);
    }
    names.join(" -> ")
}

/// Engine errors
#[derive(Error, Debug)]
pub enum CloudError {
    #[error("Configuration error: {0}")]
    Configuration(#[from] ConfigurationError),

    #[error("Plan rejected by operator")]
    PlanRejected,

    #[error("Invalid declaration: {0}")]
    Declaration(#[from] DeclarationError),

    #[error("State file error: {0}")]
    StateError(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl CloudError {
    /// Whether the error was raised before anything was mutated
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            CloudError::Configuration(_) | CloudError::Declaration(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, CloudError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cycle_message_closes_loop() {
        let err = ConfigurationError::Cycle {
            resources: vec![
                ResourceAddress::new("a", "one"),
                ResourceAddress::new("b", "two"),
            ],
        };
        assert_eq!(
            err.to_string(),
            "Dependency cycle detected: a.one -> b.two -> a.one"
        );
    }
}
