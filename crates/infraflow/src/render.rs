//! Human-readable output

use colored::Colorize;
use infraflow_cloud::{
    ActionType, AttrChange, ChangeSet, Drift, DriftReport, Operation, OperationStatus, RunReport,
    RunStatus,
};
use infraflow_core::AttrValue;

pub fn print_change_set(change_set: &ChangeSet, show_unchanged: bool) {
    for op in &change_set.operations {
        if op.action == ActionType::NoOp && !show_unchanged {
            continue;
        }
        print_operation(op);
    }
    println!();
    let summary = change_set.summary();
    if change_set.has_changes {
        println!("{} {}", "Plan:".bold(), summary);
    } else {
        println!(
            "{}",
            "No changes. Infrastructure matches the desired state.".green()
        );
    }
}

fn print_operation(op: &Operation) {
    let label = format!("{}.{}", op.kind, op.name);
    match op.action {
        ActionType::Create => println!("  {} {}", "+".green().bold(), label.green()),
        ActionType::Update => {
            println!("  {} {}", "~".yellow().bold(), label.yellow());
            for change in &op.changes {
                print_change(change);
            }
        }
        ActionType::Delete => println!("  {} {}", "-".red().bold(), label.red()),
        ActionType::NoOp => println!("  {} {}", "=".dimmed(), label.dimmed()),
    }
}

fn print_change(change: &AttrChange) {
    let show = |value: &Option<AttrValue>| match value {
        Some(v) => format!("{v}"),
        None => "(unset)".to_string(),
    };
    println!(
        "      {}: {} -> {}",
        change.attribute,
        show(&change.before).red(),
        show(&change.after).green()
    );
}

pub fn print_report(report: &RunReport) {
    for result in &report.operations {
        let label = format!("{}.{}", result.kind, result.name);
        match result.status {
            OperationStatus::Succeeded => {
                let attempts = if result.attempts > 1 {
                    format!(" after {} attempts", result.attempts)
                } else {
                    String::new()
                };
                println!(
                    "  {} {} {}{}",
                    "✓".green(),
                    label,
                    result.action.to_string().dimmed(),
                    attempts
                );
            }
            OperationStatus::NoOp => {}
            OperationStatus::Failed => println!(
                "  {} {} {}",
                "✗".red().bold(),
                label.red(),
                result.error.as_deref().unwrap_or("failed")
            ),
            OperationStatus::Skipped => println!(
                "  {} {} {}",
                "⊘".yellow(),
                label.yellow(),
                result.error.as_deref().unwrap_or("skipped").dimmed()
            ),
            OperationStatus::Pending | OperationStatus::InProgress => {
                println!("  {} {} {}", "?".dimmed(), label, result.status)
            }
        }
    }

    let count = |status| report.with_status(status).len();
    let totals = format!(
        "{} succeeded, {} failed, {} skipped ({} ms)",
        count(OperationStatus::Succeeded),
        count(OperationStatus::Failed),
        count(OperationStatus::Skipped),
        report.duration_ms
    );
    println!();
    match report.status {
        RunStatus::Succeeded => println!("{} {}", "Run succeeded:".green().bold(), totals),
        RunStatus::PartialFailure => {
            println!("{} {}", "Run partially failed:".red().bold(), totals)
        }
        RunStatus::Cancelled => println!("{} {}", "Run cancelled:".yellow().bold(), totals),
    }
}

pub fn print_drift(report: &DriftReport) {
    for entry in &report.entries {
        let label = format!("{}.{}", entry.kind, entry.name);
        match &entry.drift {
            Drift::InSync => println!("  {} {}", "=".dimmed(), label.dimmed()),
            Drift::Deleted => println!(
                "  {} {} {}",
                "-".red().bold(),
                label.red(),
                "deleted outside InfraFlow".dimmed()
            ),
            Drift::Changed(changes) => {
                println!("  {} {}", "~".yellow().bold(), label.yellow());
                for change in changes {
                    print_change(change);
                }
            }
        }
    }
    println!();
    if report.has_drift() {
        println!(
            "{}",
            "Drift recorded. Run 'infra plan' to see the corrective changes.".yellow()
        );
    } else {
        println!("{}", "No drift detected.".green());
    }
}
