use crate::render;
use crate::utils::{self, Project};
use colored::Colorize;

pub async fn handle(project: &Project, parallel: Option<usize>) -> anyhow::Result<i32> {
    println!(
        "{} {}",
        "Refreshing".blue().bold(),
        project.desired.name.cyan()
    );

    let engine = utils::engine(project, parallel).await?;
    let lock = engine.lock("refresh").await?;
    let drift = engine.reconciler.refresh().await?;
    lock.release().await?;

    render::print_drift(&drift);
    Ok(0)
}
