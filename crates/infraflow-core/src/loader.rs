//! Project loader
//!
//! Combines file discovery and parsing. The desired state is read once per run.

use crate::discovery::{DiscoveredFiles, discover_files, find_project_root};
use crate::error::{FlowError, Result};
use crate::model::DesiredState;
use crate::parser::parse_kdl_string;
use std::path::Path;
use tracing::{debug, info, instrument};

/// Find the project root and load it
#[instrument]
pub fn load_project() -> Result<DesiredState> {
    info!("Starting project load");
    let project_root = find_project_root()?;
    load_project_from_root(&project_root)
}

/// Load every desired-state document under `project_root`
///
/// `infra.kdl` and `resources/**/*.kdl` are combined; duplicated names among
/// them are left for validation to report. Resources in `infra.local.kdl`
/// replace same-named resources.
#[instrument(skip(project_root), fields(project_root = %project_root.display()))]
pub fn load_project_from_root(project_root: &Path) -> Result<DesiredState> {
    let discovered = discover_files(project_root)?;
    if discovered.root.is_none() {
        return Err(FlowError::ProjectRootNotFound(project_root.to_path_buf()));
    }

    let default_name = project_root
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("unnamed")
        .to_string();

    let desired = load_discovered(&discovered, default_name)?;
    info!(resources = desired.len(), "Project loaded successfully");
    Ok(desired)
}

fn load_discovered(discovered: &DiscoveredFiles, default_name: String) -> Result<DesiredState> {
    let mut desired = DesiredState::new(default_name);

    let base_files = discovered.root.iter().chain(discovered.resources.iter());
    for path in base_files {
        debug!(file = %path.display(), "Parsing");
        let parsed = read_and_parse(path, &desired.name)?;
        if parsed.name != desired.name {
            desired.name = parsed.name;
        }
        desired.resources.extend(parsed.resources);
    }

    if let Some(path) = &discovered.local_override {
        debug!(file = %path.display(), "Applying local override");
        let parsed = read_and_parse(path, &desired.name)?;
        for spec in parsed.resources {
            match desired.resources.iter_mut().find(|r| r.name == spec.name) {
                Some(existing) => *existing = spec,
                None => desired.resources.push(spec),
            }
        }
    }

    Ok(desired)
}

fn read_and_parse(path: &Path, default_name: &str) -> Result<DesiredState> {
    let content = std::fs::read_to_string(path).map_err(|e| FlowError::IoError {
        path: path.to_path_buf(),
        message: e.to_string(),
    })?;
    parse_kdl_string(&content, default_name.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::AttrValue;
    use std::fs;

    #[test]
    fn test_load_combines_resource_files() {
        let temp = tempfile::tempdir().unwrap();
        fs::write(
            temp.path().join("infra.kdl"),
            r#"
            project "shop"
            resource "vpc" "main" { cidr_block "10.0.0.0/16"; }
            "#,
        )
        .unwrap();
        fs::create_dir_all(temp.path().join("resources")).unwrap();
        fs::write(
            temp.path().join("resources/storage.kdl"),
            r#"resource "s3_bucket" "assets" { bucket_name "shop-assets"; }"#,
        )
        .unwrap();

        let desired = load_project_from_root(temp.path()).unwrap();
        assert_eq!(desired.name, "shop");
        assert_eq!(desired.len(), 2);
        assert!(desired.get("assets").is_some());
    }

    #[test]
    fn test_local_override_replaces_resource() {
        let temp = tempfile::tempdir().unwrap();
        fs::write(
            temp.path().join("infra.kdl"),
            r#"resource "ecs_cluster" "cluster" { container_insights #false; }"#,
        )
        .unwrap();
        fs::write(
            temp.path().join("infra.local.kdl"),
            r#"resource "ecs_cluster" "cluster" { container_insights #true; }"#,
        )
        .unwrap();

        let desired = load_project_from_root(temp.path()).unwrap();
        assert_eq!(desired.len(), 1);
        assert_eq!(
            desired.get("cluster").unwrap().get("container_insights"),
            Some(&AttrValue::Bool(true))
        );
    }

    #[test]
    fn test_load_without_root_file_fails() {
        let temp = tempfile::tempdir().unwrap();
        let result = load_project_from_root(temp.path());
        assert!(matches!(result, Err(FlowError::ProjectRootNotFound(_))));
    }
}
