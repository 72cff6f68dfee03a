use crate::render;
use crate::utils::{self, Project};
use colored::Colorize;

pub async fn handle(project: &Project, parallel: Option<usize>, yes: bool) -> anyhow::Result<i32> {
    println!(
        "{} {}",
        "Applying".blue().bold(),
        project.desired.name.cyan()
    );
    utils::print_loaded_files(project);
    println!();

    let engine = utils::engine(project, parallel).await?;
    let lock = engine.lock("apply").await?;

    let change_set = engine.reconciler.plan(&project.desired).await?;
    render::print_change_set(&change_set, false);
    if !change_set.has_changes {
        lock.release().await?;
        return Ok(0);
    }

    if !yes {
        println!();
        println!("Pass --yes to apply these changes");
        lock.release().await?;
        return Ok(0);
    }

    engine.cancel_on_ctrl_c();
    println!();
    let report = engine.reconciler.apply(&change_set).await;
    render::print_report(&report);

    lock.release().await?;
    Ok(report.exit_code())
}
