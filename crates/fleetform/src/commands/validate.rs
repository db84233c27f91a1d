use crate::utils::Workspace;
use colored::Colorize;

pub fn handle(workspace: &Workspace) -> anyhow::Result<()> {
    println!("{}", "マニフェストを検証中...".blue());
    println!(
        "マニフェスト: {}",
        workspace.manifest_path.display().to_string().cyan()
    );

    let (manifest, graph) = workspace.load_declarations()?;
    graph.validate_outputs(&manifest.outputs)?;

    println!("{}", "✓ マニフェストは正常です！".green().bold());
    println!();
    println!("サマリー:");
    println!("  リソース: {}個", graph.len());
    for address in graph.topological_order() {
        let dependencies = graph
            .node(address)
            .map(|node| {
                node.dependencies()
                    .iter()
                    .map(|d| d.to_string())
                    .collect::<Vec<_>>()
            })
            .unwrap_or_default();
        if dependencies.is_empty() {
            println!("    - {}", address.to_string().cyan());
        } else {
            println!(
                "    - {} ← {}",
                address.to_string().cyan(),
                dependencies.join(", ")
            );
        }
    }
    if !manifest.outputs.is_empty() {
        println!("  出力: {}個", manifest.outputs.len());
        for output in &manifest.outputs {
            println!("    - {} = {}", output.name.cyan(), output.value);
        }
    }

    Ok(())
}
