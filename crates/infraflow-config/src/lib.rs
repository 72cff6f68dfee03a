pub mod error;
pub mod settings;

pub use error::*;
pub use settings::{EngineSettings, PollSettings, RetrySettings, SETTINGS_FILE};

use std::path::{Path, PathBuf};

/// Directory holding engine state and project settings
pub const PROJECT_DIR: &str = ".infraflow";

const CANDIDATES: [&str; 2] = ["infra.local.kdl", "infra.kdl"];

/// Global configuration directory (`~/.config/infraflow`), created on demand
pub fn get_config_dir() -> Result<PathBuf> {
    let config_dir = dirs::config_dir()
        .ok_or(ConfigError::ConfigDirNotFound)?
        .join("infraflow");

    if !config_dir.exists() {
        std::fs::create_dir_all(&config_dir)?;
    }

    Ok(config_dir)
}

/// Find the project's infra file
///
/// Search order:
/// 1. `INFRA_CONFIG_PATH` (direct path)
/// 2. the current directory: infra.local.kdl, infra.kdl
/// 3. the same names inside `./.infraflow/`
pub fn find_infra_file() -> Result<PathBuf> {
    if let Ok(config_path) = std::env::var("INFRA_CONFIG_PATH") {
        let path = PathBuf::from(config_path);
        if path.exists() {
            return Ok(path);
        }
        tracing::warn!(path = %path.display(), "INFRA_CONFIG_PATH does not exist, searching");
    }

    let current_dir = std::env::current_dir()?;

    for filename in &CANDIDATES {
        let path = current_dir.join(filename);
        if path.exists() {
            return Ok(path);
        }
    }

    let project_dir = current_dir.join(PROJECT_DIR);
    if project_dir.is_dir() {
        for filename in &CANDIDATES {
            let path = project_dir.join(filename);
            if path.exists() {
                return Ok(path);
            }
        }
    }

    Err(ConfigError::InfraFileNotFound)
}

/// Project root an infra file belongs to: its directory, or the parent of
/// `.infraflow/` when the file lives there
pub fn project_root_of(infra_file: &Path) -> PathBuf {
    let dir = infra_file.parent().unwrap_or(Path::new("."));
    match dir.file_name() {
        Some(name) if name == PROJECT_DIR => dir.parent().unwrap_or(dir).to_path_buf(),
        _ => dir.to_path_buf(),
    }
}
