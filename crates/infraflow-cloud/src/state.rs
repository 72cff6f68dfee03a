//! Applied state storage
//!
//! Every successfully applied resource has one [`AppliedState`] record. The
//! file-backed store keeps them in `.infraflow/state.json`.

use crate::error::{CloudError, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use infraflow_core::{AttrValue, ResourceKind, ResourceSpec};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::sync::RwLock;

const STATE_VERSION: u32 = 1;
const STATE_DIR: &str = ".infraflow";
const STATE_FILE: &str = "state.json";
const STATE_BACKUP: &str = "state.json.backup";
const STATE_TEMP: &str = "state.json.tmp";
const LOCK_FILE: &str = "lock.json";
const LOCK_STALE_AFTER_HOURS: i64 = 1;

/// Last confirmed state of one resource
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AppliedState {
    /// Logical name
    pub name: String,

    pub kind: ResourceKind,

    /// Normalized input attributes as last applied
    pub attributes: BTreeMap<String, AttrValue>,

    /// Values computed by the provider (ARN, DNS name, endpoint)
    #[serde(default)]
    pub outputs: BTreeMap<String, String>,

    /// Opaque provider identifier
    pub provider_id: String,

    /// Incremented on every successful write
    pub revision: u64,

    /// Effective dependencies at the time of the last apply
    #[serde(default)]
    pub depends_on: BTreeSet<String>,

    pub updated_at: DateTime<Utc>,
}

impl AppliedState {
    /// Record for `spec` as the provider reported it
    ///
    /// `revision` is the revision the caller expects to replace (0 when the
    /// record does not exist yet).
    pub fn from_spec(
        spec: &ResourceSpec,
        provider_id: impl Into<String>,
        outputs: BTreeMap<String, String>,
        revision: u64,
    ) -> Self {
        Self {
            name: spec.name.clone(),
            kind: spec.kind,
            attributes: spec.normalized(),
            outputs,
            provider_id: provider_id.into(),
            revision,
            depends_on: spec.dependencies(),
            updated_at: Utc::now(),
        }
    }

    pub fn output(&self, key: &str) -> Option<&str> {
        self.outputs.get(key).map(String::as_str)
    }
}

/// Persistent map from logical name to applied state
///
/// `put` is optimistic: the incoming record's `revision` must equal the
/// stored revision (0 when absent). The stored record carries `revision + 1`.
#[async_trait]
pub trait StateStore: Send + Sync {
    async fn get(&self, name: &str) -> Result<Option<AppliedState>>;

    async fn put(&self, state: AppliedState) -> Result<AppliedState>;

    async fn delete(&self, name: &str) -> Result<()>;

    /// All records, sorted by name
    async fn list(&self) -> Result<Vec<AppliedState>>;
}

fn check_revision(name: &str, incoming: u64, stored: Option<&AppliedState>) -> Result<()> {
    let found = stored.map(|s| s.revision).unwrap_or(0);
    if incoming != found {
        return Err(CloudError::StateConflict {
            name: name.to_string(),
            expected: incoming,
            found,
        });
    }
    Ok(())
}

fn committed(mut state: AppliedState) -> AppliedState {
    state.revision += 1;
    state.updated_at = Utc::now();
    state
}

/// Versioned document stored in `state.json`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StateDocument {
    /// State file version
    pub version: u32,

    /// Last modified timestamp
    pub updated_at: DateTime<Utc>,

    /// Records indexed by logical name
    pub resources: BTreeMap<String, AppliedState>,
}

impl Default for StateDocument {
    fn default() -> Self {
        Self {
            version: STATE_VERSION,
            updated_at: Utc::now(),
            resources: BTreeMap::new(),
        }
    }
}

/// State store backed by `.infraflow/state.json`
///
/// Every `put`/`delete` is written to disk before it returns. The previous
/// document is kept as `state.json.backup`.
///
/// Writers hold the document write guard across the disk write, so all
/// mutations are serialized and the file never sees interleaved updates.
pub struct FileStateStore {
    project_root: PathBuf,
    document: RwLock<StateDocument>,
}

impl FileStateStore {
    /// Open the store for a project, loading any existing state
    pub async fn open(project_root: impl AsRef<Path>) -> Result<Self> {
        let project_root = project_root.as_ref().to_path_buf();
        let document = load_document(&project_root.join(STATE_DIR).join(STATE_FILE)).await?;
        Ok(Self {
            project_root,
            document: RwLock::new(document),
        })
    }

    fn state_dir(&self) -> PathBuf {
        self.project_root.join(STATE_DIR)
    }

    pub fn state_path(&self) -> PathBuf {
        self.state_dir().join(STATE_FILE)
    }

    fn backup_path(&self) -> PathBuf {
        self.state_dir().join(STATE_BACKUP)
    }

    fn temp_path(&self) -> PathBuf {
        self.state_dir().join(STATE_TEMP)
    }

    fn lock_path(&self) -> PathBuf {
        self.state_dir().join(LOCK_FILE)
    }

    async fn ensure_state_dir(&self) -> Result<()> {
        let dir = self.state_dir();
        if !fs::try_exists(&dir).await? {
            fs::create_dir_all(&dir).await?;
            tracing::debug!("Created state directory: {}", dir.display());
        }
        Ok(())
    }

    async fn persist(&self, document: &StateDocument) -> Result<()> {
        self.ensure_state_dir().await?;

        let path = self.state_path();
        if fs::try_exists(&path).await? {
            fs::copy(&path, self.backup_path()).await?;
        }

        let content = serde_json::to_string_pretty(document)?;
        let temp = self.temp_path();
        fs::write(&temp, content).await?;
        fs::rename(&temp, &path).await?;

        tracing::debug!("Saved state with {} resources", document.resources.len());
        Ok(())
    }

    /// Acquire the run lock for exclusive access
    ///
    /// A lock older than one hour is considered stale and taken over.
    pub async fn acquire_lock(&self, command: &str) -> Result<StateLock> {
        self.ensure_state_dir().await?;

        let lock_path = self.lock_path();

        if fs::try_exists(&lock_path).await? {
            let content = fs::read_to_string(&lock_path).await?;
            match serde_json::from_str::<LockInfo>(&content) {
                Ok(lock_info) => {
                    let age = Utc::now().signed_duration_since(lock_info.acquired_at);
                    if age.num_hours() < LOCK_STALE_AFTER_HOURS {
                        return Err(CloudError::LockError(format!(
                            "State is locked by {} ({}) since {}",
                            lock_info.holder, lock_info.command, lock_info.acquired_at
                        )));
                    }
                    tracing::warn!("Removing stale lock from {}", lock_info.holder);
                }
                Err(e) => {
                    tracing::warn!("Replacing unreadable lock file: {}", e);
                }
            }
        }

        let lock_info = LockInfo {
            holder: std::env::var("HOSTNAME")
                .or_else(|_| std::env::var("HOST"))
                .unwrap_or_else(|_| "unknown".to_string()),
            command: command.to_string(),
            pid: std::process::id(),
            acquired_at: Utc::now(),
        };

        let content = serde_json::to_string_pretty(&lock_info)?;
        fs::write(&lock_path, content).await?;

        tracing::debug!("Acquired state lock");
        Ok(StateLock {
            lock_path,
            released: false,
        })
    }
}

async fn load_document(path: &Path) -> Result<StateDocument> {
    if !fs::try_exists(path).await? {
        tracing::debug!("State file not found, starting with empty state");
        return Ok(StateDocument::default());
    }

    let content = fs::read_to_string(path).await?;
    let document: StateDocument = serde_json::from_str(&content)?;

    if document.version > STATE_VERSION {
        return Err(CloudError::StateError(format!(
            "State file version {} is newer than supported version {}",
            document.version, STATE_VERSION
        )));
    }

    tracing::debug!("Loaded state with {} resources", document.resources.len());
    Ok(document)
}

#[async_trait]
impl StateStore for FileStateStore {
    async fn get(&self, name: &str) -> Result<Option<AppliedState>> {
        Ok(self.document.read().await.resources.get(name).cloned())
    }

    async fn put(&self, state: AppliedState) -> Result<AppliedState> {
        let mut document = self.document.write().await;
        check_revision(&state.name, state.revision, document.resources.get(&state.name))?;

        let stored = committed(state);
        let mut next = document.clone();
        next.resources.insert(stored.name.clone(), stored.clone());
        next.updated_at = Utc::now();
        self.persist(&next).await?;
        *document = next;

        tracing::debug!(name = %stored.name, revision = stored.revision, "State committed");
        Ok(stored)
    }

    async fn delete(&self, name: &str) -> Result<()> {
        let mut document = self.document.write().await;
        if !document.resources.contains_key(name) {
            return Ok(());
        }

        let mut next = document.clone();
        next.resources.remove(name);
        next.updated_at = Utc::now();
        self.persist(&next).await?;
        *document = next;

        tracing::debug!(name = %name, "State removed");
        Ok(())
    }

    async fn list(&self) -> Result<Vec<AppliedState>> {
        Ok(self.document.read().await.resources.values().cloned().collect())
    }
}

/// In-memory state store for tests and dry runs
///
/// Like the file store, one write guard serializes every mutation.
#[derive(Debug, Default)]
pub struct MemoryStateStore {
    resources: RwLock<BTreeMap<String, AppliedState>>,
}

impl MemoryStateStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed the store with records as they are (revisions untouched)
    pub fn with_records(records: impl IntoIterator<Item = AppliedState>) -> Self {
        Self {
            resources: RwLock::new(records.into_iter().map(|r| (r.name.clone(), r)).collect()),
        }
    }
}

#[async_trait]
impl StateStore for MemoryStateStore {
    async fn get(&self, name: &str) -> Result<Option<AppliedState>> {
        Ok(self.resources.read().await.get(name).cloned())
    }

    async fn put(&self, state: AppliedState) -> Result<AppliedState> {
        let mut resources = self.resources.write().await;
        check_revision(&state.name, state.revision, resources.get(&state.name))?;
        let stored = committed(state);
        resources.insert(stored.name.clone(), stored.clone());
        Ok(stored)
    }

    async fn delete(&self, name: &str) -> Result<()> {
        self.resources.write().await.remove(name);
        Ok(())
    }

    async fn list(&self) -> Result<Vec<AppliedState>> {
        Ok(self.resources.read().await.values().cloned().collect())
    }
}

/// Lock information
#[derive(Debug, Serialize, Deserialize)]
struct LockInfo {
    holder: String,
    #[serde(default)]
    command: String,
    #[serde(default)]
    pid: u32,
    acquired_at: DateTime<Utc>,
}

/// RAII guard for the run lock
pub struct StateLock {
    lock_path: PathBuf,
    released: bool,
}

impl StateLock {
    /// Release the lock
    pub async fn release(mut self) -> Result<()> {
        if !self.released {
            if fs::try_exists(&self.lock_path).await? {
                fs::remove_file(&self.lock_path).await?;
                tracing::debug!("Released state lock");
            }
            self.released = true;
        }
        Ok(())
    }
}

impl Drop for StateLock {
    fn drop(&mut self) {
        if !self.released && self.lock_path.exists() {
            let _ = std::fs::remove_file(&self.lock_path);
        }
    }
}
