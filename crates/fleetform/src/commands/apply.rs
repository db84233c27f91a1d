use crate::utils::{self, Workspace};
use colored::Colorize;
use fleetform_cloud::{CloudError, Executor, Plan, PlanMode, Planner};
use tokio_util::sync::CancellationToken;

pub async fn handle(
    workspace: &Workspace,
    yes: bool,
    parallelism: Option<usize>,
) -> anyhow::Result<()> {
    let (manifest, graph) = workspace.load_declarations()?;
    let store = workspace.state_store();
    let plan = Planner::new(workspace.providers())
        .plan(&graph, &manifest.outputs, store.as_ref(), PlanMode::Apply)
        .await?;

    review_and_execute(workspace, plan, yes, parallelism).await
}

/// 計画を表示し、承認されたら実行する
///
/// 失敗またはスキップしたステップがあれば終了コード 1 で終了します。
pub async fn review_and_execute(
    workspace: &Workspace,
    plan: Plan,
    yes: bool,
    parallelism: Option<usize>,
) -> anyhow::Result<()> {
    let config = workspace.executor_config(parallelism)?;

    utils::print_plan(&plan.report());
    if !plan.has_changes() {
        return Ok(());
    }

    let approved = match plan.review(|report| yes || utils::confirm(report)) {
        Ok(approved) => approved,
        Err(CloudError::PlanRejected) => {
            println!("{}", "適用をキャンセルしました。".yellow());
            return Ok(());
        }
        Err(e) => return Err(e.into()),
    };

    // Ctrl-C で新しいステップの開始を止め、実行中の呼び出しは完了を待つ
    let cancel = CancellationToken::new();
    let signal_token = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            eprintln!(
                "{}",
                "中断を受け付けました。実行中の操作の完了を待っています...".yellow()
            );
            signal_token.cancel();
        }
    });

    println!();
    println!("{}", "適用中...".blue());
    let result = Executor::new(workspace.providers(), config)
        .apply(approved, workspace.state_store(), cancel)
        .await?;

    utils::print_run_result(&result);
    if !result.is_success() {
        std::process::exit(1);
    }
    Ok(())
}
