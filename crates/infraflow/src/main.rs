mod commands;
mod render;
mod utils;

use clap::{Parser, Subcommand};
use colored::Colorize;
use infraflow_cloud::CloudError;
use infraflow_core::{FlowError, ValidationError};
use tracing_subscriber::EnvFilter;

/// Exit code for input that never reached a provider
const EXIT_INVALID_INPUT: i32 = 2;

#[derive(Parser)]
#[command(name = "infra")]
#[command(about = "Declare it in KDL. InfraFlow makes it so.", long_about = None)]
struct Cli {
    /// Upper bound on concurrently running operations
    #[arg(long, global = true, env = "INFRAFLOW_PARALLEL")]
    parallel: Option<usize>,

    /// More log output (-v info, -vv debug)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show what apply would change
    Plan {
        /// Print the change set as JSON
        #[arg(long)]
        json: bool,
    },
    /// Bring the infrastructure in line with the desired state
    Apply {
        /// Run without asking for confirmation
        #[arg(short, long)]
        yes: bool,
    },
    /// Delete every resource recorded in the state
    Destroy {
        /// Run without asking for confirmation
        #[arg(short, long)]
        yes: bool,
    },
    /// Check the desired state without contacting a provider
    Validate,
    /// Compare recorded state with the live infrastructure
    Refresh,
    /// Inspect recorded state
    #[command(subcommand)]
    State(StateCommands),
    /// Show version information
    Version,
}

#[derive(Subcommand)]
enum StateCommands {
    /// List recorded resources
    List,
    /// Show one recorded resource as JSON
    Show {
        /// Logical resource name
        name: String,
    },
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let code = match run(cli).await {
        Ok(code) => code,
        Err(e) => {
            eprintln!("{} {:#}", "Error:".red().bold(), e);
            exit_code_for(&e)
        }
    };
    std::process::exit(code);
}

async fn run(cli: Cli) -> anyhow::Result<i32> {
    let parallel = cli.parallel;
    match cli.command {
        Commands::Version => {
            println!("infraflow {}", env!("CARGO_PKG_VERSION"));
            Ok(0)
        }
        Commands::Plan { json } => {
            commands::plan::handle(&utils::load_project()?, parallel, json).await
        }
        Commands::Apply { yes } => {
            commands::apply::handle(&utils::load_project()?, parallel, yes).await
        }
        Commands::Destroy { yes } => {
            commands::destroy::handle(&utils::load_project()?, parallel, yes).await
        }
        Commands::Validate => commands::validate::handle(&utils::load_project()?),
        Commands::Refresh => commands::refresh::handle(&utils::load_project()?, parallel).await,
        Commands::State(StateCommands::List) => {
            commands::state::list(&utils::load_project()?).await
        }
        Commands::State(StateCommands::Show { name }) => {
            commands::state::show(&utils::load_project()?, &name).await
        }
    }
}

/// Logs go to stderr so that stdout stays machine readable
fn init_tracing(verbose: u8) {
    let default_level = match verbose {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(filter)
        .init();
}

fn exit_code_for(err: &anyhow::Error) -> i32 {
    if let Some(cloud) = err.downcast_ref::<CloudError>()
        && cloud.is_input_error()
    {
        return EXIT_INVALID_INPUT;
    }
    if err.downcast_ref::<FlowError>().is_some() || err.downcast_ref::<ValidationError>().is_some()
    {
        return EXIT_INVALID_INPUT;
    }
    1
}
