use crate::utils::Project;
use colored::Colorize;
use infraflow_cloud::{FileStateStore, StateStore};

pub async fn list(project: &Project) -> anyhow::Result<i32> {
    let store = FileStateStore::open(&project.root).await?;
    let records = store.list().await?;
    if records.is_empty() {
        println!("{}", "No resources recorded.".dimmed());
        return Ok(0);
    }

    println!(
        "{:<24} {:<16} {:<22} {:>4}  {}",
        "NAME".bold(),
        "KIND".bold(),
        "PROVIDER ID".bold(),
        "REV".bold(),
        "UPDATED".bold()
    );
    for record in &records {
        println!(
            "{:<24} {:<16} {:<22} {:>4}  {}",
            record.name.cyan(),
            record.kind.to_string(),
            record.provider_id,
            record.revision,
            record.updated_at.format("%Y-%m-%d %H:%M:%S")
        );
    }
    Ok(0)
}

pub async fn show(project: &Project, name: &str) -> anyhow::Result<i32> {
    let store = FileStateStore::open(&project.root).await?;
    match store.get(name).await? {
        Some(record) => {
            println!("{}", serde_json::to_string_pretty(&record)?);
            Ok(0)
        }
        None => {
            eprintln!("{} no resource named '{}' in state", "Error:".red().bold(), name);
            Ok(1)
        }
    }
}
