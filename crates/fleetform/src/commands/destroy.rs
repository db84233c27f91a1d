use crate::commands::apply::review_and_execute;
use crate::utils::Workspace;
use fleetform_cloud::{PlanMode, Planner};
use fleetform_core::ResourceAddress;

pub async fn handle(
    workspace: &Workspace,
    targets: &[String],
    yes: bool,
    parallelism: Option<usize>,
) -> anyhow::Result<()> {
    let targets = targets
        .iter()
        .map(|t| t.parse::<ResourceAddress>())
        .collect::<Result<Vec<_>, _>>()?;

    let (manifest, graph) = workspace.load_declarations()?;
    let store = workspace.state_store();
    let plan = Planner::new(workspace.providers())
        .plan(
            &graph,
            &manifest.outputs,
            store.as_ref(),
            PlanMode::Destroy { targets },
        )
        .await?;

    review_and_execute(workspace, plan, yes, parallelism).await
}
