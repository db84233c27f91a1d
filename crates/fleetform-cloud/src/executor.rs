//! Plan executor
//!
//! A single coordinator walks the approved plan and spawns one worker task
//! per step once every step it depends on has succeeded. Workers hold a
//! semaphore permit while talking to the provider, commit the state record
//! themselves, and report a [`StepOutcome`] back to the coordinator. The
//! coordinator owns every [`StepStatus`]; workers never share flags.
//!
//! A failed step only blocks the steps that (transitively) depend on it.
//! Nothing is rolled back: state reflects exactly what completed.

use crate::error::{ConfigurationError, Result};
use crate::plan::{Action, ApprovedPlan, PlanStep};
use crate::provider::{
    Attributes, ProviderAdapter, ProviderError, ProviderRegistry, RetryConfig, call_with_retry,
    diff_attributes,
};
use crate::result::{RunResult, SkipReason, StepReport, StepStatus};
use crate::state::{StateRecord, StateStore};
use fleetform_core::{Reference, ResourceAddress, Resolution};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, instrument, warn};

/// Executor settings
#[derive(Debug, Clone)]
pub struct ExecutorConfig {
    /// Maximum number of concurrent provider calls
    pub parallelism: usize,

    /// Retry policy for transient provider errors
    pub retry: RetryConfig,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            parallelism: 10,
            retry: RetryConfig::default(),
        }
    }
}

pub struct Executor {
    providers: Arc<ProviderRegistry>,
    config: ExecutorConfig,
}

/// Message sent from a worker back to the coordinator
#[derive(Debug)]
enum StepOutcome {
    Succeeded {
        /// New record, `None` once the resource is gone
        record: Option<StateRecord>,
        outputs: Attributes,
        attempts: u32,
    },
    Failed {
        error: String,
        attempts: u32,
    },
    /// Cancelled while waiting for a permit
    NotStarted,
}

enum Readiness {
    Ready,
    Waiting,
    Blocked(ResourceAddress),
}

impl Executor {
    pub fn new(providers: Arc<ProviderRegistry>, config: ExecutorConfig) -> Self {
        Self { providers, config }
    }

    pub fn config(&self) -> &ExecutorConfig {
        &self.config
    }

    /// Execute an approved plan.
    ///
    /// Returns `Err` only for conditions detected before any provider call
    /// (a step whose kind has no adapter). Step failures are reported in the
    /// [`RunResult`].
    #[instrument(name = "apply", skip_all, fields(steps = approved.plan().steps().len()))]
    pub async fn apply(
        &self,
        approved: ApprovedPlan,
        store: Arc<dyn StateStore>,
        cancel: CancellationToken,
    ) -> Result<RunResult> {
        let started = Instant::now();
        let plan = approved.into_inner();

        let mut adapters: HashMap<ResourceAddress, Arc<dyn ProviderAdapter>> = HashMap::new();
        for step in plan.steps().iter().filter(|s| s.action.is_change()) {
            let adapter = self.providers.get(&step.address.kind).ok_or_else(|| {
                ConfigurationError::MissingProvider {
                    kind: step.address.kind.clone(),
                }
            })?;
            adapters.insert(step.address.clone(), adapter);
        }

        let summary = plan.summary();
        info!(
            create = summary.create,
            update = summary.update,
            replace = summary.replace,
            delete = summary.delete,
            parallelism = self.config.parallelism,
            "apply_started"
        );

        let steps = plan.steps();
        let index: HashMap<&ResourceAddress, usize> = steps
            .iter()
            .enumerate()
            .map(|(i, s)| (&s.address, i))
            .collect();
        let mut reports: Vec<StepReport> = steps
            .iter()
            .map(|s| StepReport::new(s.address.clone(), s.action))
            .collect();
        // Latest known record per resource, used to resolve references
        let mut records: BTreeMap<ResourceAddress, StateRecord> = steps
            .iter()
            .filter_map(|s| s.prior.clone().map(|r| (s.address.clone(), r)))
            .collect();

        for (step, report) in steps.iter().zip(reports.iter_mut()) {
            if !step.action.is_change() {
                report.status = StepStatus::Succeeded;
            }
        }

        let semaphore = Arc::new(Semaphore::new(self.config.parallelism.max(1)));
        let mut join_set = JoinSet::new();
        let mut running: HashMap<tokio::task::Id, usize> = HashMap::new();
        let mut cancel_logged = false;

        loop {
            if cancel.is_cancelled() && !cancel_logged {
                warn!(in_flight = join_set.len(), "cancellation requested, draining in-flight steps");
                cancel_logged = true;
            }

            // Scheduling pass; repeated so skips propagate regardless of order
            let mut changed = true;
            while changed {
                changed = false;
                for (i, step) in steps.iter().enumerate() {
                    if reports[i].status != StepStatus::Pending {
                        continue;
                    }
                    match readiness(step, &index, &reports) {
                        Readiness::Waiting => {}
                        Readiness::Blocked(dependency) => {
                            let reason = SkipReason::DependencyFailed(dependency);
                            warn!(resource = %step.address, action = %step.action, reason = %reason, "step_skipped");
                            reports[i].status = StepStatus::Skipped;
                            reports[i].skip_reason = Some(reason);
                            changed = true;
                        }
                        Readiness::Ready if cancel.is_cancelled() => {}
                        Readiness::Ready => {
                            let Some(adapter) = adapters.get(&step.address) else {
                                continue;
                            };
                            let task = StepTask {
                                index: i,
                                step: step.clone(),
                                adapter: Arc::clone(adapter),
                                store: Arc::clone(&store),
                                dependencies: step
                                    .depends_on
                                    .iter()
                                    .filter_map(|d| records.get(d).map(|r| (d.clone(), r.clone())))
                                    .collect(),
                                retry: self.config.retry.clone(),
                                semaphore: Arc::clone(&semaphore),
                                cancel: cancel.clone(),
                            };
                            let handle = join_set.spawn(task.run());
                            running.insert(handle.id(), i);
                            reports[i].status = StepStatus::Running;
                            changed = true;
                        }
                    }
                }
            }

            let Some(joined) = join_set.join_next_with_id().await else {
                break;
            };
            let (i, outcome) = match joined {
                Ok((id, (i, outcome))) => {
                    running.remove(&id);
                    (i, outcome)
                }
                Err(join_error) => {
                    let Some(i) = running.remove(&join_error.id()) else {
                        error!(error = %join_error, "unknown step task failed");
                        continue;
                    };
                    let outcome = StepOutcome::Failed {
                        error: format!("step task panicked: {}", join_error),
                        attempts: reports[i].attempts,
                    };
                    (i, outcome)
                }
            };

            let step = &steps[i];
            let report = &mut reports[i];
            match outcome {
                StepOutcome::Succeeded {
                    record,
                    outputs,
                    attempts,
                } => {
                    info!(resource = %step.address, action = %step.action, attempts, "step_succeeded");
                    match record {
                        Some(record) => {
                            records.insert(step.address.clone(), record);
                        }
                        None => {
                            records.remove(&step.address);
                        }
                    }
                    report.status = StepStatus::Succeeded;
                    report.attempts = attempts;
                    report.outputs = outputs;
                }
                StepOutcome::Failed { error, attempts } => {
                    error!(resource = %step.address, action = %step.action, attempts, error = %error, "step_failed");
                    report.status = StepStatus::Failed;
                    report.attempts = attempts;
                    report.error = Some(error);
                }
                StepOutcome::NotStarted => {
                    warn!(resource = %step.address, action = %step.action, reason = "cancelled", "step_skipped");
                    report.status = StepStatus::Skipped;
                    report.skip_reason = Some(SkipReason::Cancelled);
                }
            }
        }

        // Only reachable after cancellation: nothing left to wait for
        for (step, report) in steps.iter().zip(reports.iter_mut()) {
            if report.status == StepStatus::Pending {
                warn!(resource = %step.address, action = %step.action, reason = "cancelled", "step_skipped");
                report.status = StepStatus::Skipped;
                report.skip_reason = Some(SkipReason::Cancelled);
            }
        }

        let mut outputs = Attributes::new();
        for output in plan.outputs() {
            let value = records
                .get(&output.value.target())
                .and_then(|r| r.lookup(&output.value.attribute));
            match value {
                Some(value) => {
                    outputs.insert(output.name.clone(), value);
                }
                None => warn!(output = %output.name, reference = %output.value, "output not available"),
            }
        }

        let result = RunResult {
            steps: reports,
            outputs,
            cancelled: cancel.is_cancelled(),
            duration_ms: started.elapsed().as_millis() as u64,
        };
        info!(
            succeeded = result.succeeded().len(),
            failed = result.failed().len(),
            skipped = result.skipped().len(),
            cancelled = result.cancelled,
            duration_ms = result.duration_ms,
            "apply_finished"
        );
        Ok(result)
    }
}

fn readiness(
    step: &PlanStep,
    index: &HashMap<&ResourceAddress, usize>,
    reports: &[StepReport],
) -> Readiness {
    let mut waiting = false;
    for dependency in &step.depends_on {
        let Some(&j) = index.get(dependency) else {
            continue;
        };
        match reports[j].status {
            StepStatus::Succeeded => {}
            StepStatus::Failed | StepStatus::Skipped => {
                return Readiness::Blocked(dependency.clone());
            }
            StepStatus::Pending | StepStatus::Running => waiting = true,
        }
    }
    if waiting {
        Readiness::Waiting
    } else {
        Readiness::Ready
    }
}

/// Everything one worker needs; owned so the task is `'static`
struct StepTask {
    index: usize,
    step: PlanStep,
    adapter: Arc<dyn ProviderAdapter>,
    store: Arc<dyn StateStore>,
    /// Records of the step's dependencies as of scheduling
    dependencies: BTreeMap<ResourceAddress, StateRecord>,
    retry: RetryConfig,
    semaphore: Arc<Semaphore>,
    cancel: CancellationToken,
}

impl StepTask {
    async fn run(self) -> (usize, StepOutcome) {
        let _permit = tokio::select! {
            biased;
            _ = self.cancel.cancelled() => return (self.index, StepOutcome::NotStarted),
            permit = self.semaphore.acquire() => match permit {
                Ok(permit) => permit,
                Err(_) => return (self.index, StepOutcome::NotStarted),
            },
        };

        info!(resource = %self.step.address, action = %self.step.action, "step_started");
        let outcome = match self.execute().await {
            Ok(outcome) => outcome,
            Err((error, attempts)) => StepOutcome::Failed { error, attempts },
        };
        (self.index, outcome)
    }

    async fn execute(&self) -> std::result::Result<StepOutcome, (String, u32)> {
        let address = &self.step.address;
        match self.step.action {
            Action::Create => {
                let attributes = self.resolve_attributes()?;
                let (record, attempts) = self.create(attributes).await?;
                Ok(succeeded(record, attempts))
            }
            Action::Update => {
                let attributes = self.resolve_attributes()?;
                let prior = self.prior()?;
                let diff = diff_attributes(&prior.last_applied_attributes, &attributes);

                let mut record = prior.clone();
                let mut attempts = 0;
                if diff.is_empty() {
                    tracing::debug!(resource = %address, "resolved attributes unchanged, refreshing record only");
                } else {
                    let adapter = &self.adapter;
                    let provider_id = prior.provider_id.as_str();
                    let diff = &diff;
                    let (result, n) = call_with_retry(&self.retry, address, "update", move || {
                        adapter.update(address, provider_id, diff)
                    })
                    .await;
                    attempts = n;
                    record.outputs.extend(result.map_err(|e| (e.to_string(), n))?);
                }
                record.last_applied_attributes = attributes;
                record.dependencies = self.declared_dependencies();
                record.touch();
                self.commit(&record, attempts).await?;
                Ok(succeeded(record, attempts))
            }
            Action::Replace => {
                let attributes = self.resolve_attributes()?;
                let deleted = self.delete().await?;
                let (record, created) = self
                    .create(attributes)
                    .await
                    .map_err(|(e, n)| (e, n + deleted))?;
                Ok(succeeded(record, deleted + created))
            }
            Action::Delete => {
                let attempts = self.delete().await?;
                Ok(StepOutcome::Succeeded {
                    record: None,
                    outputs: Attributes::new(),
                    attempts,
                })
            }
            Action::NoOp => Ok(StepOutcome::Succeeded {
                record: self.step.prior.clone(),
                outputs: Attributes::new(),
                attempts: 0,
            }),
        }
    }

    /// Create the resource and commit its record
    async fn create(&self, attributes: Attributes) -> std::result::Result<(StateRecord, u32), (String, u32)> {
        let address = &self.step.address;
        let adapter = &self.adapter;
        let submitted = &attributes;
        let (result, attempts) = call_with_retry(&self.retry, address, "create", move || {
            adapter.create(address, submitted)
        })
        .await;
        let created = result.map_err(|e| (e.to_string(), attempts))?;

        let record = StateRecord::new(address, created.provider_id)
            .with_attributes(attributes)
            .with_outputs(created.outputs)
            .with_dependencies(self.declared_dependencies());
        self.commit(&record, attempts).await?;
        Ok((record, attempts))
    }

    /// Delete the resource and drop its record
    async fn delete(&self) -> std::result::Result<u32, (String, u32)> {
        let address = &self.step.address;
        let prior = self.prior()?;
        let adapter = &self.adapter;
        let provider_id = prior.provider_id.as_str();
        let (result, attempts) = call_with_retry(&self.retry, address, "delete", move || {
            adapter.delete(address, provider_id)
        })
        .await;
        result.map_err(|e| (e.to_string(), attempts))?;

        self.store
            .delete(address)
            .await
            .map_err(|e| (format!("resource deleted but state not updated: {}", e), attempts))?;
        Ok(attempts)
    }

    async fn commit(&self, record: &StateRecord, attempts: u32) -> std::result::Result<(), (String, u32)> {
        self.store.upsert(record.clone()).await.map_err(|e| {
            (
                format!("provider call succeeded but state not updated: {}", e),
                attempts,
            )
        })
    }

    fn prior(&self) -> std::result::Result<&StateRecord, (String, u32)> {
        self.step
            .prior
            .as_ref()
            .ok_or_else(|| (format!("no recorded state for {}", self.step.address), 0))
    }

    fn declared_dependencies(&self) -> std::collections::BTreeSet<ResourceAddress> {
        self.step
            .declaration
            .as_ref()
            .map(|d| d.dependencies())
            .unwrap_or_default()
    }

    /// Resolve every attribute against the dependencies' records
    fn resolve_attributes(&self) -> std::result::Result<Attributes, (String, u32)> {
        let Some(declaration) = self.step.declaration.as_ref() else {
            return Err((format!("no declaration for {}", self.step.address), 0));
        };
        let lookup = |reference: &Reference| {
            self.dependencies
                .get(&reference.target())
                .and_then(|record| record.lookup(&reference.attribute))
        };

        let mut attributes = Attributes::new();
        for (name, value) in &declaration.attributes {
            match value.resolve(&lookup) {
                Resolution::Resolved(value) => {
                    attributes.insert(name.clone(), value);
                }
                Resolution::Pending(reference) => {
                    let error = ProviderError::permanent(format!(
                        "attribute '{}' references {} which has no value",
                        name, reference
                    ));
                    return Err((error.to_string(), 0));
                }
            }
        }
        Ok(attributes)
    }
}

fn succeeded(record: StateRecord, attempts: u32) -> StepOutcome {
    let mut outputs = record.outputs.clone();
    outputs
        .entry("id".to_string())
        .or_insert_with(|| serde_json::json!(record.provider_id));
    StepOutcome::Succeeded {
        record: Some(record),
        outputs,
        attempts,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::ResourceGraph;
    use crate::planner::{PlanMode, Planner};
    use crate::provider::{Created, ResolvedDiff};
    use crate::state::{MemoryStateStore, StateSnapshot};
    use async_trait::async_trait;
    use fleetform_core::ResourceDeclaration;
    use serde_json::json;

    /// Assigns `<name>-id` and echoes a `dns` output
    struct Echo;

    #[async_trait]
    impl ProviderAdapter for Echo {
        fn name(&self) -> &str {
            "echo"
        }

        async fn create(
            &self,
            address: &ResourceAddress,
            _: &Attributes,
        ) -> std::result::Result<Created, ProviderError> {
            Ok(Created::new(format!("{}-id", address.name))
                .with_output("dns", json!(format!("{}.example.com", address.name))))
        }

        async fn update(
            &self,
            _: &ResourceAddress,
            _: &str,
            _: &ResolvedDiff,
        ) -> std::result::Result<Attributes, ProviderError> {
            Ok(Attributes::new())
        }

        async fn delete(&self, _: &ResourceAddress, _: &str) -> std::result::Result<(), ProviderError> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_references_resolve_from_dependency_outputs() {
        let declarations = vec![
            ResourceDeclaration::new("lb", "web").with_literal("scheme", "internet-facing"),
            ResourceDeclaration::new("dns", "alias")
                .with_reference("target", ResourceAddress::new("lb", "web").attribute("dns"))
                .with_reference("lb_id", ResourceAddress::new("lb", "web").attribute("id")),
        ];
        let graph = ResourceGraph::build(declarations).unwrap();
        let registry = Arc::new(ProviderRegistry::new().with_fallback(Arc::new(Echo)));
        let plan = Planner::new(Arc::clone(&registry))
            .plan_with_snapshot(&graph, &[], &StateSnapshot::default(), PlanMode::Apply)
            .unwrap();

        let store = Arc::new(MemoryStateStore::new());
        let result = Executor::new(registry, ExecutorConfig::default())
            .apply(plan.approve(), store.clone(), CancellationToken::new())
            .await
            .unwrap();

        assert!(result.is_success());
        let alias = store
            .get(&ResourceAddress::new("dns", "alias"))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(alias.last_applied_attributes["target"], json!("web.example.com"));
        assert_eq!(alias.last_applied_attributes["lb_id"], json!("web-id"));
        assert_eq!(
            result.step(&ResourceAddress::new("lb", "web")).unwrap().outputs["id"],
            json!("web-id")
        );
    }

    #[tokio::test]
    async fn test_missing_provider_fails_before_any_call() {
        let graph = ResourceGraph::build(vec![ResourceDeclaration::new("vpc", "main")]).unwrap();
        let registry = Arc::new(ProviderRegistry::new());
        let plan = Planner::new(Arc::clone(&registry))
            .plan_with_snapshot(&graph, &[], &StateSnapshot::default(), PlanMode::Apply)
            .unwrap();

        let err = Executor::new(registry, ExecutorConfig::default())
            .apply(plan.approve(), Arc::new(MemoryStateStore::new()), CancellationToken::new())
            .await
            .unwrap_err();
        assert!(err.is_configuration());
    }

    #[tokio::test]
    async fn test_update_with_unchanged_resolution_skips_provider() {
        // Recorded dependency set differs, resolved values do not
        let vpc = ResourceAddress::new("vpc", "main");
        let records = vec![
            StateRecord::new(&vpc, "vpc-1"),
            StateRecord::new(&ResourceAddress::new("subnet", "a"), "sub-1")
                .with_attribute("vpc_id", json!("vpc-1")),
        ];
        let declarations = vec![
            ResourceDeclaration::new("vpc", "main"),
            ResourceDeclaration::new("subnet", "a").with_reference("vpc_id", vpc.attribute("id")),
        ];
        let graph = ResourceGraph::build(declarations).unwrap();
        let registry = Arc::new(ProviderRegistry::new().with_fallback(Arc::new(Echo)));
        let plan = Planner::new(Arc::clone(&registry))
            .plan_with_snapshot(&graph, &[], &StateSnapshot::from_records(records.clone()), PlanMode::Apply)
            .unwrap();
        assert_eq!(plan.summary().update, 1);

        let store = Arc::new(MemoryStateStore::with_records(records));
        let result = Executor::new(registry, ExecutorConfig::default())
            .apply(plan.approve(), store.clone(), CancellationToken::new())
            .await
            .unwrap();

        let subnet = ResourceAddress::new("subnet", "a");
        assert_eq!(result.step(&subnet).unwrap().attempts, 0);
        let record = store.get(&subnet).await.unwrap().unwrap();
        assert!(record.dependencies.contains(&vpc));
    }
}
