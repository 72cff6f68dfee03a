//! Project file discovery
//!
//! Finds the project root and the desired-state documents below it.

use crate::error::{FlowError, Result};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

pub const ROOT_FILE: &str = "infra.kdl";
pub const LOCAL_OVERRIDE_FILE: &str = "infra.local.kdl";
pub const PROJECT_DIR: &str = ".infraflow";
pub const RESOURCES_DIR: &str = "resources";

/// Discovered desired-state documents
#[derive(Debug, Clone, Default)]
pub struct DiscoveredFiles {
    /// Root file (infra.kdl)
    pub root: Option<PathBuf>,
    /// Resource files (resources/**/*.kdl), sorted
    pub resources: Vec<PathBuf>,
    /// Local override file (infra.local.kdl)
    pub local_override: Option<PathBuf>,
}

impl DiscoveredFiles {
    /// All files in load order
    pub fn all(&self) -> Vec<&PathBuf> {
        self.root
            .iter()
            .chain(self.resources.iter())
            .chain(self.local_override.iter())
            .collect()
    }
}

/// Find the project root
///
/// Search order:
/// 1. `INFRAFLOW_PROJECT_ROOT`
/// 2. upwards from the current directory, looking for `infra.kdl` or
///    `.infraflow/infra.kdl`
#[tracing::instrument]
pub fn find_project_root() -> Result<PathBuf> {
    if let Ok(root) = std::env::var("INFRAFLOW_PROJECT_ROOT") {
        let path = PathBuf::from(&root);
        debug!(env_root = %root, "Checking INFRAFLOW_PROJECT_ROOT");
        if has_root_file(&path) {
            info!(project_root = %path.display(), "Found project root from environment variable");
            return Ok(path);
        }
    }

    let start_dir = std::env::current_dir()?;
    find_project_root_from(&start_dir)
}

/// Search upwards from `start_dir`
pub fn find_project_root_from(start_dir: &Path) -> Result<PathBuf> {
    let mut current = start_dir.to_path_buf();
    loop {
        debug!(checking = %current.display(), "Looking for infra.kdl");
        if has_root_file(&current) {
            info!(project_root = %current.display(), "Found project root");
            return Ok(current);
        }
        if !current.pop() {
            break;
        }
    }

    warn!(start_dir = %start_dir.display(), "Project root not found");
    Err(FlowError::ProjectRootNotFound(start_dir.to_path_buf()))
}

fn has_root_file(dir: &Path) -> bool {
    dir.join(ROOT_FILE).exists() || dir.join(PROJECT_DIR).join(ROOT_FILE).exists()
}

/// Discover desired-state documents under the project root
pub fn discover_files(project_root: &Path) -> Result<DiscoveredFiles> {
    let mut discovered = DiscoveredFiles::default();

    for candidate in [
        project_root.join(ROOT_FILE),
        project_root.join(PROJECT_DIR).join(ROOT_FILE),
    ] {
        if candidate.exists() {
            discovered.root = Some(candidate);
            break;
        }
    }

    let resources_dir = project_root.join(RESOURCES_DIR);
    if resources_dir.is_dir() {
        let pattern = format!("{}/**/*.kdl", resources_dir.display());
        let entries = glob::glob(&pattern).map_err(|e| FlowError::DiscoveryError {
            path: resources_dir.clone(),
            message: e.to_string(),
        })?;
        for entry in entries {
            let path = entry.map_err(|e| FlowError::DiscoveryError {
                path: resources_dir.clone(),
                message: e.to_string(),
            })?;
            discovered.resources.push(path);
        }
        discovered.resources.sort();
    }

    let local = project_root.join(LOCAL_OVERRIDE_FILE);
    if local.exists() {
        discovered.local_override = Some(local);
    }

    debug!(
        root = ?discovered.root,
        resources = discovered.resources.len(),
        local_override = discovered.local_override.is_some(),
        "Discovered files"
    );
    Ok(discovered)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use std::fs;

    #[test]
    fn test_find_project_root_walks_up() {
        let temp = tempfile::tempdir().unwrap();
        fs::write(temp.path().join(ROOT_FILE), "").unwrap();
        let nested = temp.path().join("a/b");
        fs::create_dir_all(&nested).unwrap();

        let root = find_project_root_from(&nested).unwrap();
        assert_eq!(root, temp.path());
    }

    #[test]
    fn test_find_project_root_in_project_dir() {
        let temp = tempfile::tempdir().unwrap();
        fs::create_dir_all(temp.path().join(PROJECT_DIR)).unwrap();
        fs::write(temp.path().join(PROJECT_DIR).join(ROOT_FILE), "").unwrap();

        let root = find_project_root_from(temp.path()).unwrap();
        assert_eq!(root, temp.path());
    }

    #[test]
    fn test_find_project_root_not_found() {
        let temp = tempfile::tempdir().unwrap();
        let result = find_project_root_from(temp.path());
        // A stray infra.kdl above the temp dir would make this succeed
        if let Err(e) = result {
            assert!(matches!(e, FlowError::ProjectRootNotFound(_)));
        }
    }

    #[test]
    #[serial]
    fn test_find_project_root_from_env() {
        let temp = tempfile::tempdir().unwrap();
        fs::write(temp.path().join(ROOT_FILE), "").unwrap();

        temp_env::with_var("INFRAFLOW_PROJECT_ROOT", Some(temp.path()), || {
            let root = find_project_root().unwrap();
            assert_eq!(root, temp.path());
        });
    }

    #[test]
    fn test_discover_files_sorted() {
        let temp = tempfile::tempdir().unwrap();
        fs::write(temp.path().join(ROOT_FILE), "").unwrap();
        fs::create_dir_all(temp.path().join("resources/network")).unwrap();
        fs::write(temp.path().join("resources/network/vpc.kdl"), "").unwrap();
        fs::write(temp.path().join("resources/app.kdl"), "").unwrap();
        fs::write(temp.path().join(LOCAL_OVERRIDE_FILE), "").unwrap();

        let discovered = discover_files(temp.path()).unwrap();
        assert!(discovered.root.is_some());
        assert_eq!(discovered.resources.len(), 2);
        assert!(discovered.resources[0].ends_with("resources/app.kdl"));
        assert!(discovered.local_override.is_some());
        assert_eq!(discovered.all().len(), 4);
    }
}
