mod commands;
mod utils;

use clap::{Parser, Subcommand};
use colored::Colorize;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "fleetform")]
#[command(about = "宣言したインフラを、依存関係の順に収束させる。", long_about = None)]
struct Cli {
    /// マニフェストファイル（省略時は fleetform.kdl を自動検出）
    #[arg(short = 'f', long, global = true)]
    manifest: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// マニフェストと依存グラフを検証
    Validate,
    /// 実行計画を表示（何も変更しない）
    Plan {
        /// 計画をJSONで出力
        #[arg(long)]
        json: bool,
        /// 全リソースを削除する計画を表示
        #[arg(long)]
        destroy: bool,
    },
    /// 実行計画を確認して適用
    Apply {
        /// 確認なしで適用
        #[arg(short, long)]
        yes: bool,
        /// 同時に実行するプロバイダー呼び出しの上限
        #[arg(short = 'j', long)]
        parallelism: Option<usize>,
    },
    /// 記録済みのリソースを削除
    Destroy {
        /// 削除対象 (kind.name)。省略時は全リソース
        #[arg(short, long = "target")]
        targets: Vec<String>,
        /// 確認なしで削除
        #[arg(short, long)]
        yes: bool,
        /// 同時に実行するプロバイダー呼び出しの上限
        #[arg(short = 'j', long)]
        parallelism: Option<usize>,
    },
    /// 状態ファイルの操作
    #[command(subcommand)]
    State(StateCommands),
    /// バージョン情報を表示
    Version,
}

#[derive(Subcommand)]
enum StateCommands {
    /// 記録済みのリソース一覧を表示
    List,
    /// リソースの記録を表示
    Show {
        /// リソースアドレス (kind.name)
        address: String,
    },
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    // ログはstderrに出力（stdoutは計画やJSONの出力に使う）
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    if let Err(e) = run(cli).await {
        eprintln!();
        eprintln!("{} {:#}", "✗".red().bold(), e);
        std::process::exit(utils::exit_code(&e));
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    // Versionコマンドはマニフェスト不要
    if matches!(cli.command, Commands::Version) {
        println!("fleetform {}", env!("CARGO_PKG_VERSION"));
        return Ok(());
    }

    let workspace = utils::Workspace::locate(cli.manifest.as_deref())?;

    match cli.command {
        Commands::Validate => commands::validate::handle(&workspace),
        Commands::Plan { json, destroy } => commands::plan::handle(&workspace, json, destroy).await,
        Commands::Apply { yes, parallelism } => {
            commands::apply::handle(&workspace, yes, parallelism).await
        }
        Commands::Destroy {
            targets,
            yes,
            parallelism,
        } => commands::destroy::handle(&workspace, &targets, yes, parallelism).await,
        Commands::State(StateCommands::List) => commands::state::handle_list(&workspace).await,
        Commands::State(StateCommands::Show { address }) => {
            commands::state::handle_show(&workspace, &address).await
        }
        Commands::Version => Ok(()),
    }
}
