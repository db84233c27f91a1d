//! Run results

use crate::plan::Action;
use crate::provider::Attributes;
use fleetform_core::ResourceAddress;
use serde::{Deserialize, Serialize};

/// Status of one step during and after a run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepStatus {
    Pending,
    Running,
    Succeeded,
    Failed,
    Skipped,
}

impl StepStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            StepStatus::Succeeded | StepStatus::Failed | StepStatus::Skipped
        )
    }
}

impl std::fmt::Display for StepStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StepStatus::Pending => write!(f, "pending"),
            StepStatus::Running => write!(f, "running"),
            StepStatus::Succeeded => write!(f, "succeeded"),
            StepStatus::Failed => write!(f, "failed"),
            StepStatus::Skipped => write!(f, "skipped"),
        }
    }
}

/// Why a step never ran
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "reason", content = "resource", rename_all = "snake_case")]
pub enum SkipReason {
    /// A step it depends on failed or was skipped
    DependencyFailed(ResourceAddress),
    /// The run was cancelled before it started
    Cancelled,
}

impl std::fmt::Display for SkipReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SkipReason::DependencyFailed(address) => write!(f, "dependency {} did not complete", address),
            SkipReason::Cancelled => write!(f, "cancelled"),
        }
    }
}

/// Terminal report of one step
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepReport {
    pub address: ResourceAddress,
    pub action: Action,
    pub status: StepStatus,

    /// Error message if failed
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub skip_reason: Option<SkipReason>,

    /// Provider calls made (including retries)
    pub attempts: u32,

    /// Resolved outputs of a succeeded create/update/replace
    #[serde(default, skip_serializing_if = "Attributes::is_empty")]
    pub outputs: Attributes,
}

impl StepReport {
    pub(crate) fn new(address: ResourceAddress, action: Action) -> Self {
        Self {
            address,
            action,
            status: StepStatus::Pending,
            error: None,
            skip_reason: None,
            attempts: 0,
            outputs: Attributes::new(),
        }
    }
}

/// Result of executing a plan
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RunResult {
    /// Every step of the plan, in plan order
    pub steps: Vec<StepReport>,

    /// Resolved named outputs
    pub outputs: Attributes,

    /// Whether cancellation was requested during the run
    pub cancelled: bool,

    /// Total execution time in milliseconds
    pub duration_ms: u64,
}

impl RunResult {
    pub fn is_success(&self) -> bool {
        self.steps.iter().all(|s| s.status == StepStatus::Succeeded)
    }

    pub fn step(&self, address: &ResourceAddress) -> Option<&StepReport> {
        self.steps.iter().find(|s| &s.address == address)
    }

    pub fn succeeded(&self) -> Vec<&StepReport> {
        self.with_status(StepStatus::Succeeded)
    }

    pub fn failed(&self) -> Vec<&StepReport> {
        self.with_status(StepStatus::Failed)
    }

    pub fn skipped(&self) -> Vec<&StepReport> {
        self.with_status(StepStatus::Skipped)
    }

    fn with_status(&self, status: StepStatus) -> Vec<&StepReport> {
        self.steps.iter().filter(|s| s.status == status).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn report(name: &str, status: StepStatus) -> StepReport {
        let mut report = StepReport::new(ResourceAddress::new("server", name), Action::Create);
        report.status = status;
        report
    }

    #[test]
    fn test_partitions() {
        let result = RunResult {
            steps: vec![
                report("a", StepStatus::Succeeded),
                report("b", StepStatus::Failed),
                report("c", StepStatus::Skipped),
            ],
            ..Default::default()
        };

        assert!(!result.is_success());
        assert_eq!(result.succeeded().len(), 1);
        assert_eq!(result.failed()[0].address.name, "b");
        assert_eq!(result.skipped()[0].address.name, "c");
    }

    #[test]
    fn test_skip_reason_serialization() {
        let mut skipped = report("c", StepStatus::Skipped);
        skipped.skip_reason = Some(SkipReason::DependencyFailed(ResourceAddress::new("server", "b")));

        let value = serde_json::to_value(&skipped).unwrap();
        assert_eq!(
            value["skip_reason"],
            json!({"reason": "dependency_failed", "resource": "server.b"})
        );
        assert_eq!(value["status"], json!("skipped"));
        assert!(value.get("error").is_none());
    }
}
