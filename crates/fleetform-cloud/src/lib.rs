//! FleetForm Cloud Engine
//!
//! This crate turns a set of resource declarations into a safe sequence of
//! remote create/update/delete calls.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────┐
//! │  ResourceDeclaration  │  (fleetform-core)
//! └──────────┬───────────┘
//!            │
//! ┌──────────▼───────────┐
//! │    ResourceGraph      │  references -> edges, cycle detection
//! └──────────┬───────────┘
//!            │            ┌──────────────┐
//! ┌──────────▼───────────┐│  StateStore   │
//! │       Planner        ◄┤  (last applied│
//! └──────────┬───────────┘│   state)      │
//!            │ Plan        └──────▲───────┘
//!            │ (reviewed, approved)│
//! ┌──────────▼───────────┐         │
//! │       Executor        ├─────────┘  one record per step
//! └──────────┬───────────┘
//!            │
//! ┌──────────▼───────────┐
//! │   ProviderAdapter     │  per resource kind
//! └──────────────────────┘
//! ```

pub mod error;
pub mod executor;
pub mod graph;
pub mod plan;
pub mod planner;
pub mod provider;
pub mod result;
pub mod state;

// Re-exports
pub use error::{CloudError, ConfigurationError, Result};
pub use executor::{Executor, ExecutorConfig};
pub use graph::{ResourceGraph, ResourceNode};
pub use plan::{
    Action, ApprovedPlan, AttributeChange, Plan, PlanReport, PlanStep, PlanSummary, PlannedValue,
    ReportEntry,
};
pub use planner::{PlanMode, Planner};
pub use provider::{
    Attributes, Created, ProviderAdapter, ProviderError, ProviderRegistry, ResolvedDiff,
    RetryConfig, ValueChange,
};
pub use result::{RunResult, SkipReason, StepReport, StepStatus};
pub use state::{
    FileStateStore, MemoryStateStore, StateDocument, StateRecord, StateSnapshot, StateStore,
};
