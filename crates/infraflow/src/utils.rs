use colored::Colorize;
use infraflow_cloud::{FileStateStore, Reconciler, StateLock};
use infraflow_cloud_aws::{AwsProvider, SANDBOX_FILE};
use infraflow_config::EngineSettings;
use infraflow_core::{
    DesiredState, LOCAL_OVERRIDE_FILE, ROOT_FILE, discover_files, load_project_from_root,
    parse_kdl_file,
};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// A loaded project: where it lives, what it declares, how to run it
pub struct Project {
    pub root: PathBuf,
    pub files: Vec<PathBuf>,
    pub desired: DesiredState,
    pub settings: EngineSettings,
}

/// Everything a mutating command needs
pub struct Engine {
    pub reconciler: Reconciler,
    pub store: Arc<FileStateStore>,
    /// Stops the run from starting new operations
    pub cancel: CancellationToken,
    /// Stops in-flight readiness waits
    pub abort: CancellationToken,
}

/// Locate and load the project
///
/// `INFRA_CONFIG_PATH` or an infra file in the current directory wins;
/// otherwise the project root is searched upwards.
pub fn load_project() -> anyhow::Result<Project> {
    let (root, files, desired) = match infraflow_config::find_infra_file() {
        Ok(file) if is_project_file(&file) => {
            let root = infraflow_config::project_root_of(&file);
            load_from_root(root)?
        }
        Ok(file) => {
            let root = infraflow_config::project_root_of(&file);
            let desired = parse_kdl_file(&file)?;
            (root, vec![file], desired)
        }
        Err(_) => load_from_root(infraflow_core::find_project_root()?)?,
    };

    let settings = EngineSettings::load(Some(&root))?;
    tracing::debug!(root = %root.display(), resources = desired.len(), "Project loaded");
    Ok(Project {
        root,
        files,
        desired,
        settings,
    })
}

fn load_from_root(root: PathBuf) -> anyhow::Result<(PathBuf, Vec<PathBuf>, DesiredState)> {
    let files = discover_files(&root)?
        .all()
        .into_iter()
        .cloned()
        .collect();
    let desired = load_project_from_root(&root)?;
    Ok((root, files, desired))
}

fn is_project_file(path: &Path) -> bool {
    path.file_name()
        .is_some_and(|name| name == ROOT_FILE || name == LOCAL_OVERRIDE_FILE)
}

/// Build the reconciler for a project
///
/// `parallel` overrides the configured worker count.
pub async fn engine(project: &Project, parallel: Option<usize>) -> anyhow::Result<Engine> {
    let settings = &project.settings;
    if settings.provider != "sandbox" {
        anyhow::bail!(
            "unsupported provider '{}'; the built-in provider is 'sandbox'",
            settings.provider
        );
    }

    let mut config = settings.reconciler_config();
    if let Some(parallel) = parallel {
        anyhow::ensure!(parallel > 0, "--parallel must be at least 1");
        config.max_parallel = parallel;
    }

    let cancel = CancellationToken::new();
    let abort = CancellationToken::new();
    let provider = AwsProvider::sandbox(Some(project.root.join(SANDBOX_FILE)), &settings.region)
        .await?
        .with_poll_config(settings.poll_config())
        .with_abort(abort.clone());
    let store = Arc::new(FileStateStore::open(&project.root).await?);

    let reconciler = Reconciler::new(Arc::new(provider), store.clone())
        .with_config(config)
        .with_cancellation(cancel.clone());

    Ok(Engine {
        reconciler,
        store,
        cancel,
        abort,
    })
}

impl Engine {
    pub async fn lock(&self, command: &str) -> anyhow::Result<StateLock> {
        Ok(self.store.acquire_lock(command).await?)
    }

    /// Cancel the run on Ctrl-C. In-flight operations finish, nothing new
    /// starts. A second Ctrl-C stops waiting for resources to become ready.
    pub fn cancel_on_ctrl_c(&self) {
        let cancel = self.cancel.clone();
        let abort = self.abort.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_err() {
                return;
            }
            eprintln!(
                "{}",
                "Interrupted: waiting for running operations to finish (Ctrl-C again to stop waiting)..."
                    .yellow()
            );
            cancel.cancel();

            if tokio::signal::ctrl_c().await.is_ok() {
                eprintln!(
                    "{}",
                    "Stopped waiting; unfinished resources are adopted on the next apply.".yellow()
                );
                abort.cancel();
            }
        });
    }
}

/// Print the desired-state files that were read
pub fn print_loaded_files(project: &Project) {
    println!("Loaded files:");
    for file in &project.files {
        let label = if file.file_name().is_some_and(|n| n == LOCAL_OVERRIDE_FILE) {
            " (local override)"
        } else {
            ""
        };
        println!("  • {}{}", file.display().to_string().cyan(), label);
    }
}
