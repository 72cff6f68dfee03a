use crate::render;
use crate::utils::{self, Project};
use colored::Colorize;

pub async fn handle(project: &Project, parallel: Option<usize>, yes: bool) -> anyhow::Result<i32> {
    println!(
        "{} {}",
        "Destroying".red().bold(),
        project.desired.name.cyan()
    );

    let engine = utils::engine(project, parallel).await?;
    let lock = engine.lock("destroy").await?;

    let change_set = engine.reconciler.plan_destroy().await?;
    if change_set.is_empty() {
        println!("{}", "Nothing to destroy.".green());
        lock.release().await?;
        return Ok(0);
    }
    render::print_change_set(&change_set, false);

    if !yes {
        println!();
        println!(
            "{}",
            "Warning: every resource above will be deleted.".yellow()
        );
        println!("Pass --yes to destroy them");
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
