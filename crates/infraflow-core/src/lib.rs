//! InfraFlow core
//!
//! Resource model, validation and desired-state loading. Everything here is
//! pure: no provider is ever contacted.

pub mod discovery;
pub mod error;
pub mod loader;
pub mod model;
pub mod parser;
pub mod validate;

pub use discovery::{
    DiscoveredFiles, LOCAL_OVERRIDE_FILE, PROJECT_DIR, ROOT_FILE, discover_files, find_project_root,
    find_project_root_from,
};
pub use error::{FlowError, Result, ValidationError};
pub use loader::{load_project, load_project_from_root};
pub use model::*;
pub use parser::{parse_kdl_file, parse_kdl_string};
pub use validate::{check_all, validate, validate_all};
