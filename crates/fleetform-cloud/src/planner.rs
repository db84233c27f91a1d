//! Planner: diff declarations against recorded state
//!
//! Forward steps (create/update/replace/no-op) follow the graph's
//! topological order. Deletions are appended afterwards in reverse
//! dependency order, so a dependent is always removed before what it needs.

use crate::error::{CloudError, ConfigurationError};
use crate::graph::{ResourceGraph, ResourceNode, topological_sort};
use crate::plan::{Action, AttributeChange, Plan, PlanStep, PlannedValue};
use crate::provider::ProviderRegistry;
use crate::state::{StateRecord, StateSnapshot, StateStore};
use fleetform_core::{OutputDeclaration, Reference, ResourceAddress};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

/// What the plan should converge to
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum PlanMode {
    /// Converge recorded state to the declarations
    #[default]
    Apply,
    /// Delete recorded resources (all of them when `targets` is empty)
    Destroy { targets: Vec<ResourceAddress> },
}

pub struct Planner {
    providers: Arc<ProviderRegistry>,
}

impl Planner {
    pub fn new(providers: Arc<ProviderRegistry>) -> Self {
        Self { providers }
    }

    /// Build a plan against the current contents of `store`
    pub async fn plan(
        &self,
        graph: &ResourceGraph,
        outputs: &[OutputDeclaration],
        store: &dyn StateStore,
        mode: PlanMode,
    ) -> Result<Plan, CloudError> {
        let snapshot = StateSnapshot::load(store).await?;
        Ok(self.plan_with_snapshot(graph, outputs, &snapshot, mode)?)
    }

    pub fn plan_with_snapshot(
        &self,
        graph: &ResourceGraph,
        outputs: &[OutputDeclaration],
        snapshot: &StateSnapshot,
        mode: PlanMode,
    ) -> Result<Plan, ConfigurationError> {
        let (steps, outputs) = match mode {
            PlanMode::Apply => {
                graph.validate_outputs(outputs)?;
                (self.plan_apply(graph, snapshot)?, outputs.to_vec())
            }
            PlanMode::Destroy { targets } => (plan_destroy(graph, snapshot, &targets)?, Vec::new()),
        };
        check_conflicts(&steps)?;
        check_ordering(&steps)?;

        let plan = Plan::new(steps, outputs);
        tracing::info!(summary = %plan.summary(), "Plan computed");
        Ok(plan)
    }

    fn plan_apply(
        &self,
        graph: &ResourceGraph,
        snapshot: &StateSnapshot,
    ) -> Result<Vec<PlanStep>, ConfigurationError> {
        let mut steps: Vec<PlanStep> = Vec::with_capacity(graph.len());
        let mut planned: BTreeMap<ResourceAddress, Planned> = BTreeMap::new();

        for node in graph.nodes() {
            let step = match snapshot.get(&node.address()) {
                None => create_step(node),
                Some(record) => self.diff_step(node, record, &planned),
            };
            tracing::debug!(resource = %step.address, action = %step.action, "planned");
            planned.insert(
                step.address.clone(),
                Planned {
                    action: step.action,
                    changed: step.diff.keys().cloned().collect(),
                },
            );
            steps.push(step);
        }

        let removed: BTreeMap<ResourceAddress, BTreeSet<ResourceAddress>> = snapshot
            .iter()
            .filter(|(address, _)| !graph.contains(address))
            .map(|(address, record)| (address.clone(), record.dependencies.clone()))
            .collect();
        let deletions = deletion_steps(&removed, snapshot, &steps)?;
        order_replacements_after_deletions(&mut steps, &deletions);
        steps.extend(deletions);
        Ok(steps)
    }

    /// Step for a declared resource that already has a record
    fn diff_step(
        &self,
        node: &ResourceNode,
        record: &StateRecord,
        planned: &BTreeMap<ResourceAddress, Planned>,
    ) -> PlanStep {
        let declaration = node.declaration();
        let kind = declaration.kind.as_str();
        let applied = &record.last_applied_attributes;
        let mut diff = BTreeMap::new();

        // References are excluded: their values are unknown until apply
        for (name, value) in declaration.literal_attributes() {
            let old = applied.get(name);
            if old != Some(value) {
                diff.insert(
                    name.to_string(),
                    AttributeChange {
                        old: old.cloned(),
                        new: PlannedValue::Known(value.clone()),
                        forces_replacement: self.providers.requires_replacement(kind, name),
                    },
                );
            }
        }
        for (name, old) in applied {
            if !declaration.attributes.contains_key(name) {
                diff.insert(
                    name.clone(),
                    AttributeChange {
                        old: Some(old.clone()),
                        new: PlannedValue::Removed,
                        forces_replacement: self.providers.requires_replacement(kind, name),
                    },
                );
            }
        }

        let recreated = |address: &ResourceAddress| {
            planned
                .get(address)
                .is_some_and(|p| matches!(p.action, Action::Create | Action::Replace))
        };
        // An in-place update only invalidates references to the attributes it changes
        let stale = |reference: &Reference| {
            planned.get(&reference.target()).is_some_and(|p| match p.action {
                Action::Create | Action::Replace => true,
                Action::Update => p.changed.contains(&reference.attribute),
                _ => false,
            })
        };
        let reevaluate = node.dependencies() != &record.dependencies
            || node.dependencies().iter().any(|d| recreated(d))
            || declaration
                .attributes
                .values()
                .flat_map(|v| v.references())
                .any(|r| stale(r));
        if reevaluate {
            for (name, value) in &declaration.attributes {
                if value.is_literal() {
                    continue;
                }
                let target_recreated = value.references().iter().any(|r| recreated(&r.target()));
                diff.insert(
                    name.clone(),
                    AttributeChange {
                        old: applied.get(name).cloned(),
                        new: PlannedValue::Pending,
                        forces_replacement: target_recreated
                            && self.providers.requires_replacement(kind, name),
                    },
                );
            }
        }

        let action = if diff.values().any(|c| c.forces_replacement) {
            Action::Replace
        } else if !diff.is_empty() || reevaluate {
            Action::Update
        } else {
            Action::NoOp
        };

        PlanStep {
            address: node.address(),
            action,
            diff,
            depends_on: node.dependencies().clone(),
            declaration: Some(Arc::clone(declaration)),
            prior: Some(record.clone()),
        }
    }
}

/// What an earlier forward step does to its resource
struct Planned {
    action: Action,
    changed: BTreeSet<String>,
}

fn create_step(node: &ResourceNode) -> PlanStep {
    let declaration = node.declaration();
    let diff = declaration
        .attributes
        .iter()
        .map(|(name, value)| {
            let new = match value.as_literal() {
                Some(v) => PlannedValue::Known(v.clone()),
                None => PlannedValue::Pending,
            };
            (name.clone(), AttributeChange::new(None, new))
        })
        .collect();

    PlanStep {
        address: node.address(),
        action: Action::Create,
        diff,
        depends_on: node.dependencies().clone(),
        declaration: Some(Arc::clone(declaration)),
        prior: None,
    }
}

fn noop_step(node: Option<&ResourceNode>, record: &StateRecord) -> PlanStep {
    PlanStep {
        address: record.address(),
        action: Action::NoOp,
        diff: BTreeMap::new(),
        depends_on: node.map(|n| n.dependencies().clone()).unwrap_or_default(),
        declaration: node.map(|n| Arc::clone(n.declaration())),
        prior: Some(record.clone()),
    }
}

/// Delete steps for `removed` (address -> what it depends on), dependents first.
///
/// A delete waits for the deletes of everything recorded as depending on
/// it, and for every forward change of a resource that used to depend on it.
fn deletion_steps(
    removed: &BTreeMap<ResourceAddress, BTreeSet<ResourceAddress>>,
    snapshot: &StateSnapshot,
    forward: &[PlanStep],
) -> Result<Vec<PlanStep>, ConfigurationError> {
    let roots: Vec<ResourceAddress> = removed.keys().cloned().collect();
    let mut order = topological_sort(&roots, removed)?;
    order.reverse();

    let steps = order
        .into_iter()
        .map(|address| {
            let mut depends_on: BTreeSet<ResourceAddress> = removed
                .iter()
                .filter(|(_, deps)| deps.contains(&address))
                .map(|(dependent, _)| dependent.clone())
                .collect();
            depends_on.extend(
                forward
                    .iter()
                    .filter(|s| s.action.is_change())
                    .filter(|s| {
                        s.prior
                            .as_ref()
                            .is_some_and(|p| p.dependencies.contains(&address))
                    })
                    .map(|s| s.address.clone()),
            );
            PlanStep {
                action: Action::Delete,
                diff: BTreeMap::new(),
                depends_on,
                declaration: None,
                prior: snapshot.get(&address).cloned(),
                address,
            }
        })
        .collect();
    Ok(steps)
}

/// A replacement destroys the old resource before creating the new one, so
/// it waits for the deletes of removed resources recorded as depending on it.
///
/// An edge that would close a cycle is left out: that delete is already
/// waiting, through a former dependent, on the replacement's new instance.
fn order_replacements_after_deletions(steps: &mut [PlanStep], deletions: &[PlanStep]) {
    let mut edges: BTreeMap<ResourceAddress, BTreeSet<ResourceAddress>> = steps
        .iter()
        .chain(deletions)
        .map(|s| (s.address.clone(), s.depends_on.clone()))
        .collect();

    for step in steps.iter_mut().filter(|s| s.action == Action::Replace) {
        for deletion in deletions {
            let was_dependent = deletion
                .prior
                .as_ref()
                .is_some_and(|p| p.dependencies.contains(&step.address));
            if !was_dependent {
                continue;
            }
            if reaches(&edges, &deletion.address, &step.address) {
                tracing::warn!(
                    resource = %step.address,
                    dependent = %deletion.address,
                    "replacement cannot wait for the removed dependent"
                );
                continue;
            }
            step.depends_on.insert(deletion.address.clone());
            if let Some(deps) = edges.get_mut(&step.address) {
                deps.insert(deletion.address.clone());
            }
        }
    }
}

/// Whether `from` transitively waits on `to`
fn reaches(
    edges: &BTreeMap<ResourceAddress, BTreeSet<ResourceAddress>>,
    from: &ResourceAddress,
    to: &ResourceAddress,
) -> bool {
    let mut seen = BTreeSet::new();
    let mut stack = vec![from];
    while let Some(current) = stack.pop() {
        if current == to {
            return true;
        }
        if seen.insert(current) {
            stack.extend(edges.get(current).into_iter().flatten());
        }
    }
    false
}

/// Steps whose ordering edges form a cycle would never start
fn check_ordering(steps: &[PlanStep]) -> Result<(), ConfigurationError> {
    let edges: BTreeMap<ResourceAddress, BTreeSet<ResourceAddress>> = steps
        .iter()
        .map(|s| (s.address.clone(), s.depends_on.clone()))
        .collect();
    let roots: Vec<ResourceAddress> = edges.keys().cloned().collect();
    topological_sort(&roots, &edges).map(|_| ())
}

fn plan_destroy(
    graph: &ResourceGraph,
    snapshot: &StateSnapshot,
    targets: &[ResourceAddress],
) -> Result<Vec<PlanStep>, ConfigurationError> {
    for target in targets {
        if !snapshot.contains(target) {
            return Err(ConfigurationError::UnknownTarget(target.clone()));
        }
    }
    let selected = |address: &ResourceAddress| targets.is_empty() || targets.contains(address);

    let mut steps = Vec::new();
    for node in graph.nodes() {
        let address = node.address();
        if let Some(record) = snapshot.get(&address).filter(|_| !selected(&address)) {
            steps.push(noop_step(Some(node), record));
        }
    }
    for (address, record) in snapshot.iter() {
        if !graph.contains(address) && !selected(address) {
            steps.push(noop_step(None, record));
        }
    }

    // Declared edges are merged in so a manifest-only dependency still orders deletes
    let removed: BTreeMap<ResourceAddress, BTreeSet<ResourceAddress>> = snapshot
        .iter()
        .filter(|(address, _)| selected(address))
        .map(|(address, record)| {
            let mut deps = record.dependencies.clone();
            if let Some(node) = graph.node(address) {
                deps.extend(node.dependencies().iter().cloned());
            }
            (address.clone(), deps)
        })
        .collect();
    let deletions = deletion_steps(&removed, snapshot, &[])?;
    steps.extend(deletions);
    Ok(steps)
}

/// Reject plans that delete something a surviving resource still needs
fn check_conflicts(steps: &[PlanStep]) -> Result<(), ConfigurationError> {
    let deleted: BTreeSet<&ResourceAddress> = steps
        .iter()
        .filter(|s| s.action == Action::Delete)
        .map(|s| &s.address)
        .collect();
    if deleted.is_empty() {
        return Ok(());
    }

    for step in steps.iter().filter(|s| s.action != Action::Delete) {
        let declared = step
            .declaration
            .as_ref()
            .map(|d| d.dependencies())
            .unwrap_or_default();
        let recorded = step
            .prior
            .as_ref()
            .filter(|_| step.is_noop())
            .map(|p| p.dependencies.clone())
            .unwrap_or_default();

        if let Some(resource) = declared.union(&recorded).find(|d| deleted.contains(d)) {
            return Err(ConfigurationError::PlanConflict {
                resource: resource.clone(),
                required_by: step.address.clone(),
            });
        }
    }
    Ok(())
}
