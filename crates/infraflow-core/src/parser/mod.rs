//! KDL parser
//!
//! Parses desired-state documents. Every `resource` node becomes one
//! [`ResourceSpec`](crate::model::ResourceSpec).

mod resource;

pub use resource::parse_resource;

use crate::error::Result;
use crate::model::DesiredState;
use kdl::KdlDocument;
use std::fs;
use std::path::Path;

/// Parse a KDL file into a desired state
pub fn parse_kdl_file<P: AsRef<Path>>(path: P) -> Result<DesiredState> {
    let content = fs::read_to_string(path.as_ref())?;
    let name = path
        .as_ref()
        .parent()
        .and_then(|p| p.file_name())
        .and_then(|n| n.to_str())
        .unwrap_or("unnamed")
        .to_string();
    parse_kdl_string(&content, name)
}

/// Parse a KDL string
pub fn parse_kdl_string(content: &str, default_name: String) -> Result<DesiredState> {
    let doc: KdlDocument = content.parse()?;
    let mut desired = DesiredState::new(default_name);

    for node in doc.nodes() {
        match node.name().value() {
            "project" => {
                if let Some(project_name) =
                    node.entries().first().and_then(|e| e.value().as_string())
                {
                    desired.name = project_name.to_string();
                }
            }
            "resource" => {
                desired.add(parse_resource(node)?);
            }
            other => {
                tracing::debug!(node = %other, "Skipping unknown top-level node");
            }
        }
    }

    Ok(desired)
}
