use crate::render;
use crate::utils::{self, Project};
use colored::Colorize;

pub async fn handle(project: &Project, parallel: Option<usize>, json: bool) -> anyhow::Result<i32> {
    let engine = utils::engine(project, parallel).await?;
    let change_set = engine.reconciler.plan(&project.desired).await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&change_set)?);
        return Ok(0);
    }

    println!(
        "{} {}",
        "Planning".blue().bold(),
        project.desired.name.cyan()
    );
    utils::print_loaded_files(project);
    println!();
    render::print_change_set(&change_set, false);
    Ok(0)
}
