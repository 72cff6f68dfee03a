use crate::utils::{self, Project};
use colored::Colorize;
use infraflow_cloud::DependencyGraph;
use infraflow_core::check_all;

pub fn handle(project: &Project) -> anyhow::Result<i32> {
    println!("{}", "Validating...".blue());
    println!("Project root: {}", project.root.display().to_string().cyan());
    utils::print_loaded_files(project);

    let desired = &project.desired;
    let errors = check_all(desired);
    if !errors.is_empty() {
        eprintln!();
        eprintln!("{}", "✗ Validation failed".red().bold());
        for error in &errors {
            eprintln!("  {}", error);
        }
        return Ok(2);
    }

    let graph = DependencyGraph::from_specs(&desired.resources)?;
    if let Err(cycle) = graph.check_acyclic() {
        eprintln!();
        eprintln!("{}", "✗ Validation failed".red().bold());
        eprintln!("  {}", cycle);
        return Ok(2);
    }

    println!("{}", "✓ Desired state is valid".green().bold());
    println!();
    println!("Resources: {}", desired.len());
    for spec in &desired.resources {
        let deps = spec.dependencies();
        if deps.is_empty() {
            println!("  - {} ({})", spec.name.cyan(), spec.kind);
        } else {
            let deps: Vec<&str> = deps.iter().map(String::as_str).collect();
            println!(
                "  - {} ({}) after {}",
                spec.name.cyan(),
                spec.kind,
                deps.join(", ")
            );
        }
    }
    Ok(0)
}
