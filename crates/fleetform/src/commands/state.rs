use crate::utils::Workspace;
use colored::Colorize;
use fleetform_cloud::StateStore;
use fleetform_core::ResourceAddress;

pub async fn handle_list(workspace: &Workspace) -> anyhow::Result<()> {
    let records = workspace.state_store().read_all().await?;
    if records.is_empty() {
        println!("{}", "記録済みのリソースはありません。".dimmed());
        return Ok(());
    }

    println!("{}", "記録済みのリソース:".bold());
    for record in &records {
        println!(
            "  • {} ({}) 更新: {}",
            record.address().to_string().cyan(),
            record.provider_id,
            record.updated_at.format("%Y-%m-%d %H:%M:%S")
        );
    }
    println!();
    println!("合計: {}個", records.len());
    Ok(())
}

pub async fn handle_show(workspace: &Workspace, address: &str) -> anyhow::Result<()> {
    let address: ResourceAddress = address.parse()?;
    match workspace.state_store().get(&address).await? {
        Some(record) => {
            println!("{}", serde_json::to_string_pretty(&record)?);
            Ok(())
        }
        None => Err(anyhow::anyhow!(
            "リソース '{}' は状態ファイルに記録されていません",
            address
        )),
    }
}
