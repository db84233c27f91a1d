use colored::Colorize;
use fleetform_cloud::{
    Action, CloudError, ConfigurationError, ExecutorConfig, FileStateStore, PlanReport,
    PlannedValue, ProviderRegistry, ResourceGraph, RetryConfig, RunResult, StateStore, StepStatus,
};
use fleetform_cloud_local::LocalProvider;
use fleetform_config::{ConfigError, Settings};
use fleetform_core::{DeclarationError, Manifest};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// ローカルプロバイダーのリージョン名
const LOCAL_REGION: &str = "local-1";

/// マニフェストの場所と設定
pub struct Workspace {
    pub root: PathBuf,
    pub manifest_path: PathBuf,
    pub settings: Settings,
}

impl Workspace {
    /// マニフェストを探し、プロジェクトルートと設定を決定する
    pub fn locate(manifest: Option<&Path>) -> anyhow::Result<Self> {
        let manifest_path = match manifest {
            Some(path) if path.exists() => path.to_path_buf(),
            Some(_) => return Err(ConfigError::ManifestNotFound.into()),
            None => fleetform_config::find_manifest_file()?,
        };
        let root = project_root_of(&manifest_path)?;
        let settings = Settings::load(&root)?;
        tracing::debug!(root = %root.display(), manifest = %manifest_path.display(), "workspace located");

        Ok(Self {
            root,
            manifest_path,
            settings,
        })
    }

    /// マニフェストを読み込み、依存グラフを構築する
    pub fn load_declarations(&self) -> anyhow::Result<(Manifest, ResourceGraph)> {
        let manifest = fleetform_core::parse_manifest_file(&self.manifest_path)?;
        let graph = ResourceGraph::from_manifest(&manifest)?;
        Ok((manifest, graph))
    }

    pub fn state_dir(&self) -> PathBuf {
        self.settings.state_dir(&self.root)
    }

    pub fn state_store(&self) -> Arc<dyn StateStore> {
        Arc::new(FileStateStore::in_dir(self.state_dir()))
    }

    /// 全リソース種別をローカルプロバイダーで扱う
    pub fn providers(&self) -> Arc<ProviderRegistry> {
        let local = LocalProvider::persistent(self.state_dir().join("local"), LOCAL_REGION);
        Arc::new(ProviderRegistry::new().with_fallback(Arc::new(local)))
    }

    pub fn executor_config(&self, parallelism: Option<usize>) -> anyhow::Result<ExecutorConfig> {
        let parallelism = parallelism.unwrap_or(self.settings.parallelism);
        if parallelism == 0 {
            return Err(ConfigError::InvalidSettings(
                "--parallelism は 1 以上を指定してください".to_string(),
            )
            .into());
        }
        let retry = &self.settings.retry;
        Ok(ExecutorConfig {
            parallelism,
            retry: RetryConfig {
                max_attempts: retry.max_attempts,
                initial_delay: retry.initial_delay(),
                max_delay: retry.max_delay(),
                backoff_multiplier: retry.backoff_multiplier,
            },
        })
    }
}

/// `.fleetform/` 内のマニフェストはその親をプロジェクトルートとする
fn project_root_of(manifest_path: &Path) -> anyhow::Result<PathBuf> {
    let parent = match manifest_path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => std::env::current_dir()?,
    };
    if parent.file_name().is_some_and(|name| name == ".fleetform") {
        if let Some(root) = parent.parent() {
            return Ok(root.to_path_buf());
        }
    }
    Ok(parent)
}

/// 設定エラーは 2、それ以外は 1
pub fn exit_code(error: &anyhow::Error) -> i32 {
    let configuration = error.chain().any(|cause| {
        cause.downcast_ref::<ConfigError>().is_some()
            || cause.downcast_ref::<DeclarationError>().is_some()
            || cause.downcast_ref::<ConfigurationError>().is_some()
            || cause
                .downcast_ref::<CloudError>()
                .is_some_and(CloudError::is_configuration)
    });
    if configuration { 2 } else { 1 }
}

/// 計画を表示
pub fn print_plan(report: &PlanReport) {
    if !report.has_changes {
        println!(
            "{}",
            "変更はありません。インフラは宣言と一致しています。".green()
        );
        return;
    }

    println!("{}", "実行計画:".bold());
    for entry in report.steps.iter().filter(|e| e.action.is_change()) {
        let (symbol, address) = match entry.action {
            Action::Create => ("+".green(), entry.address.to_string().green()),
            Action::Update => ("~".yellow(), entry.address.to_string().yellow()),
            Action::Replace => ("-/+".magenta(), entry.address.to_string().magenta()),
            Action::Delete => ("-".red(), entry.address.to_string().red()),
            Action::NoOp => continue,
        };
        println!("  {} {} ({})", symbol, address.bold(), entry.action);

        for (attribute, change) in &entry.diff {
            let new = match &change.new {
                PlannedValue::Pending => change.new.to_string().dimmed().to_string(),
                other => other.to_string(),
            };
            let line = match &change.old {
                Some(old) => format!("{}: {} → {}", attribute, old, new),
                None => format!("{}: {}", attribute, new),
            };
            if change.forces_replacement {
                println!("      {} {}", line, "(再作成が必要)".red());
            } else {
                println!("      {}", line);
            }
        }
    }
    println!();
    println!("計画: {}", report.summary.to_string().bold());
}

/// `yes` と入力された場合のみ true
pub fn confirm(report: &PlanReport) -> bool {
    println!();
    println!(
        "{}",
        format!("{} を実行します。", report.summary).yellow()
    );
    print!("続行するには yes と入力してください: ");
    if std::io::stdout().flush().is_err() {
        return false;
    }

    let mut input = String::new();
    match std::io::stdin().read_line(&mut input) {
        Ok(_) => input.trim() == "yes",
        Err(_) => false,
    }
}

/// 実行結果を表示
pub fn print_run_result(result: &RunResult) {
    println!();
    println!("{}", "実行結果:".bold());
    for step in result.steps.iter().filter(|s| s.action.is_change()) {
        match step.status {
            StepStatus::Succeeded => {
                println!("  {} {} ({})", "✓".green(), step.address.to_string().cyan(), step.action);
            }
            StepStatus::Failed => {
                println!(
                    "  {} {} ({}): {}",
                    "✗".red(),
                    step.address.to_string().cyan(),
                    step.action,
                    step.error.as_deref().unwrap_or("不明なエラー")
                );
            }
            _ => {
                let reason = step
                    .skip_reason
                    .as_ref()
                    .map(|r| r.to_string())
                    .unwrap_or_default();
                println!(
                    "  {} {} ({}): スキップ {}",
                    "-".dimmed(),
                    step.address.to_string().cyan(),
                    step.action,
                    reason.dimmed()
                );
            }
        }
    }

    if !result.outputs.is_empty() {
        println!();
        println!("{}", "出力:".bold());
        for (name, value) in &result.outputs {
            println!("  {} = {}", name.cyan(), value);
        }
    }

    println!();
    let line = format!(
        "完了: {}件成功, {}件失敗, {}件スキップ ({}ms)",
        result.succeeded().iter().filter(|s| s.action.is_change()).count(),
        result.failed().len(),
        result.skipped().len(),
        result.duration_ms
    );
    if result.is_success() {
        println!("{}", line.green().bold());
    } else {
        println!("{}", line.red().bold());
    }
    if result.cancelled {
        println!("{}", "中断されました。再実行すると残りの操作を続行します。".yellow());
    }
}
