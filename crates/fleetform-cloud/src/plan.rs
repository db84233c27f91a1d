//! Plan types
//!
//! A [`Plan`] is built once per run by the planner, reviewed through its
//! [`PlanReport`], and only then turned into an [`ApprovedPlan`] that the
//! executor accepts.

use crate::error::{CloudError, Result};
use crate::state::StateRecord;
use fleetform_core::{OutputDeclaration, ResourceAddress, ResourceDeclaration};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

/// Type of action to perform
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Action {
    /// Create a new resource
    Create,
    /// Update an existing resource in place
    Update,
    /// Delete and recreate within one step
    Replace,
    /// Delete a resource
    Delete,
    /// No changes needed
    NoOp,
}

impl Action {
    pub fn is_change(&self) -> bool {
        !matches!(self, Action::NoOp)
    }
}

impl std::fmt::Display for Action {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Action::Create => write!(f, "create"),
            Action::Update => write!(f, "update"),
            Action::Replace => write!(f, "replace"),
            Action::Delete => write!(f, "delete"),
            Action::NoOp => write!(f, "no-op"),
        }
    }
}

/// New value of an attribute as far as the planner can tell
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "state", content = "value", rename_all = "snake_case")]
pub enum PlannedValue {
    Known(serde_json::Value),
    /// Known after apply (depends on a reference)
    Pending,
    Removed,
}

impl std::fmt::Display for PlannedValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PlannedValue::Known(v) => write!(f, "{}", v),
            PlannedValue::Pending => write!(f, "(known after apply)"),
            PlannedValue::Removed => write!(f, "(removed)"),
        }
    }
}

/// Planned change of one attribute
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttributeChange {
    pub old: Option<serde_json::Value>,
    pub new: PlannedValue,
    /// The adapter cannot change this attribute in place
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub forces_replacement: bool,
}

impl AttributeChange {
    pub fn new(old: Option<serde_json::Value>, new: PlannedValue) -> Self {
        Self {
            old,
            new,
            forces_replacement: false,
        }
    }
}

/// One planned action against one resource
#[derive(Debug, Clone)]
pub struct PlanStep {
    pub address: ResourceAddress,
    pub action: Action,
    pub diff: BTreeMap<String, AttributeChange>,
    /// Steps that must succeed before this one starts
    pub depends_on: BTreeSet<ResourceAddress>,
    /// Current declaration (absent for deletions)
    pub declaration: Option<Arc<ResourceDeclaration>>,
    /// Recorded state at planning time
    pub prior: Option<StateRecord>,
}

impl PlanStep {
    pub(crate) fn is_noop(&self) -> bool {
        self.action == Action::NoOp
    }
}

/// Ordered sequence of plan steps
///
/// Forward steps (create/update/replace/no-op) come first in dependency
/// order, deletions follow in reverse dependency order.
#[derive(Debug, Clone, Default)]
pub struct Plan {
    steps: Vec<PlanStep>,
    outputs: Vec<OutputDeclaration>,
}

impl Plan {
    pub fn new(steps: Vec<PlanStep>, outputs: Vec<OutputDeclaration>) -> Self {
        Self { steps, outputs }
    }

    pub fn empty() -> Self {
        Self::default()
    }

    pub fn steps(&self) -> &[PlanStep] {
        &self.steps
    }

    pub fn step(&self, address: &ResourceAddress) -> Option<&PlanStep> {
        self.steps.iter().find(|s| &s.address == address)
    }

    pub fn outputs(&self) -> &[OutputDeclaration] {
        &self.outputs
    }

    /// Whether the plan has any changes
    pub fn has_changes(&self) -> bool {
        self.steps.iter().any(|s| s.action.is_change())
    }

    /// Get steps by action
    pub fn actions_by_type(&self, action: Action) -> Vec<&PlanStep> {
        self.steps.iter().filter(|s| s.action == action).collect()
    }

    /// Summary of the plan
    pub fn summary(&self) -> PlanSummary {
        let count = |action| self.steps.iter().filter(|s| s.action == action).count();
        PlanSummary {
            create: count(Action::Create),
            update: count(Action::Update),
            replace: count(Action::Replace),
            delete: count(Action::Delete),
            no_change: count(Action::NoOp),
        }
    }

    /// Serializable report for operator review
    pub fn report(&self) -> PlanReport {
        PlanReport {
            steps: self
                .steps
                .iter()
                .map(|s| ReportEntry {
                    address: s.address.clone(),
                    action: s.action,
                    diff: s.diff.clone(),
                    depends_on: s.depends_on.iter().cloned().collect(),
                })
                .collect(),
            summary: self.summary(),
            has_changes: self.has_changes(),
        }
    }

    /// Accept the plan without inspection
    pub fn approve(self) -> ApprovedPlan {
        ApprovedPlan { plan: self }
    }

    /// Show the report to `decide`; the plan is approved only if it returns true
    pub fn review<F>(self, decide: F) -> Result<ApprovedPlan>
    where
        F: FnOnce(&PlanReport) -> bool,
    {
        if decide(&self.report()) {
            Ok(self.approve())
        } else {
            tracing::info!("plan rejected by operator");
            Err(CloudError::PlanRejected)
        }
    }
}

/// Summary of planned actions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct PlanSummary {
    pub create: usize,
    pub update: usize,
    pub replace: usize,
    pub delete: usize,
    pub no_change: usize,
}

impl std::fmt::Display for PlanSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} to create, {} to update, {} to replace, {} to delete, {} unchanged",
            self.create, self.update, self.replace, self.delete, self.no_change
        )
    }
}

/// One line of the plan report
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReportEntry {
    pub address: ResourceAddress,
    pub action: Action,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub diff: BTreeMap<String, AttributeChange>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub depends_on: Vec<ResourceAddress>,
}

/// Serializable summary of a plan
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlanReport {
    pub steps: Vec<ReportEntry>,
    pub summary: PlanSummary,
    pub has_changes: bool,
}

/// A plan the operator has accepted
#[derive(Debug, Clone)]
pub struct ApprovedPlan {
    plan: Plan,
}

impl ApprovedPlan {
    pub fn plan(&self) -> &Plan {
        &self.plan
    }

    pub fn into_inner(self) -> Plan {
        self.plan
    }
}
