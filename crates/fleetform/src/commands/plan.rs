use crate::utils::{self, Workspace};
use fleetform_cloud::{PlanMode, Planner};

pub async fn handle(workspace: &Workspace, json: bool, destroy: bool) -> anyhow::Result<()> {
    let (manifest, graph) = workspace.load_declarations()?;
    let mode = if destroy {
        PlanMode::Destroy { targets: vec![] }
    } else {
        PlanMode::Apply
    };

    let store = workspace.state_store();
    let plan = Planner::new(workspace.providers())
        .plan(&graph, &manifest.outputs, store.as_ref(), mode)
        .await?;

    let report = plan.report();
    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        utils::print_plan(&report);
    }
    Ok(())
}
