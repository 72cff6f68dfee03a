use assert_cmd::Command;
use std::fs;
use std::path::PathBuf;
use tempfile::TempDir;

pub const WEB_STACK: &str = r#"
project "shop"

resource "vpc" "v1" {
    cidr_block "10.0.0.0/16"
}

resource "subnet" "s1" {
    vpc "v1"
    cidr_block "10.0.1.0/24"
    availability_zone "us-east-1a"
}

resource "security_group" "sg1" {
    vpc "v1"
    ingress "tcp:443:0.0.0.0/0"
}

resource "load_balancer" "alb1" {
    subnets "s1"
    security_groups "sg1"
}
"#;

pub struct TestProject {
    pub root: TempDir,
}

impl TestProject {
    pub fn new() -> Self {
        let root = tempfile::tempdir().unwrap();
        Self { root }
    }

    pub fn with_web_stack() -> Self {
        let project = Self::new();
        project.write_infra_kdl(WEB_STACK);
        project.write_settings("retry:\n  initial_delay_ms: 10\n  max_delay_ms: 50\npoll:\n  initial_delay_ms: 5\n  max_delay_ms: 20\n");
        project
    }

    pub fn write_infra_kdl(&self, content: &str) {
        fs::write(self.root.path().join("infra.kdl"), content).unwrap();
    }

    #[allow(dead_code)]
    pub fn write_local_override(&self, content: &str) {
        fs::write(self.root.path().join("infra.local.kdl"), content).unwrap();
    }

    pub fn write_settings(&self, content: &str) {
        let dir = self.root.path().join(".infraflow");
        fs::create_dir_all(&dir).unwrap();
        fs::write(dir.join("settings.yaml"), content).unwrap();
    }

    pub fn path(&self) -> PathBuf {
        self.root.path().to_path_buf()
    }

    /// `infra` running inside the project, isolated from the caller's
    /// environment and global settings
    pub fn infra(&self) -> Command {
        let mut cmd = Command::cargo_bin("infra").unwrap();
        cmd.current_dir(self.path())
            .env("XDG_CONFIG_HOME", self.path().join(".config"))
            .env("NO_COLOR", "1")
            .env_remove("INFRA_CONFIG_PATH")
            .env_remove("INFRAFLOW_PROJECT_ROOT")
            .env_remove("INFRAFLOW_MAX_PARALLEL")
            .env_remove("INFRAFLOW_MAX_ATTEMPTS")
            .env_remove("INFRAFLOW_PARALLEL")
            .env_remove("INFRAFLOW_SANDBOX_DENY")
            .env_remove("INFRAFLOW_SANDBOX_THROTTLE")
            .env_remove("INFRAFLOW_SANDBOX_READINESS_POLLS")
            .env_remove("RUST_LOG");
        cmd
    }

    #[allow(dead_code)]
    pub fn state_json(&self) -> serde_json::Value {
        let content = fs::read_to_string(self.root.path().join(".infraflow/state.json")).unwrap();
        serde_json::from_str(&content).unwrap()
    }
}
