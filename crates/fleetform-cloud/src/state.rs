//! State management for provisioned resources
//!
//! The state store is the only durable entity: it records, per logical
//! resource, the attributes last applied and the identity the provider
//! assigned. The file-backed store keeps `.fleetform/state.json`.

use crate::error::{CloudError, Result};
use crate::provider::Attributes;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use fleetform_core::ResourceAddress;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::sync::Mutex;

const STATE_VERSION: u32 = 1;
const STATE_DIR: &str = ".fleetform";
const STATE_FILE: &str = "state.json";
const STATE_BACKUP: &str = "state.json.backup";
const STATE_TEMP: &str = "state.json.tmp";

/// Last successfully applied state of a single resource
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StateRecord {
    /// Resource kind
    pub kind: String,

    /// Logical name
    pub name: String,

    /// Provider-assigned identity
    pub provider_id: String,

    /// Fully resolved attributes that were submitted to the provider
    pub last_applied_attributes: Attributes,

    /// Provider-assigned output attributes (IP, DNS name, etc.)
    #[serde(default)]
    pub outputs: Attributes,

    /// Dependencies at the time of apply
    #[serde(default)]
    pub dependencies: BTreeSet<ResourceAddress>,

    /// When the resource was created
    pub created_at: DateTime<Utc>,

    /// Last update timestamp
    pub updated_at: DateTime<Utc>,
}

impl StateRecord {
    pub fn new(address: &ResourceAddress, provider_id: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            kind: address.kind.clone(),
            name: address.name.clone(),
            provider_id: provider_id.into(),
            last_applied_attributes: Attributes::new(),
            outputs: Attributes::new(),
            dependencies: BTreeSet::new(),
            created_at: now,
            updated_at: now,
        }
    }

    pub fn with_attributes(mut self, attributes: Attributes) -> Self {
        self.last_applied_attributes = attributes;
        self
    }

    pub fn with_attribute(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.last_applied_attributes.insert(key.into(), value);
        self
    }

    pub fn with_outputs(mut self, outputs: Attributes) -> Self {
        self.outputs = outputs;
        self
    }

    pub fn with_dependencies(mut self, dependencies: BTreeSet<ResourceAddress>) -> Self {
        self.dependencies = dependencies;
        self
    }

    pub fn address(&self) -> ResourceAddress {
        ResourceAddress::new(&self.kind, &self.name)
    }

    /// Value of an attribute as seen by references to this resource.
    ///
    /// Outputs win over submitted attributes; `id` falls back to the
    /// provider id.
    pub fn lookup(&self, attribute: &str) -> Option<serde_json::Value> {
        self.outputs
            .get(attribute)
            .or_else(|| self.last_applied_attributes.get(attribute))
            .cloned()
            .or_else(|| (attribute == "id").then(|| serde_json::json!(self.provider_id)))
    }

    pub fn get_attribute<T: serde::de::DeserializeOwned>(&self, key: &str) -> Option<T> {
        self.lookup(key)
            .and_then(|v| serde_json::from_value(v).ok())
    }

    pub(crate) fn touch(&mut self) {
        self.updated_at = Utc::now();
    }
}

/// Persisted state document
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StateDocument {
    /// State file version
    pub version: u32,

    /// Last modified timestamp
    pub updated_at: DateTime<Utc>,

    /// Records indexed by `kind.name`
    pub resources: BTreeMap<ResourceAddress, StateRecord>,
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

impl StateDocument {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or replace a record
    pub fn set_record(&mut self, record: StateRecord) {
        self.resources.insert(record.address(), record);
        self.updated_at = Utc::now();
    }

    /// Remove a record
    pub fn remove_record(&mut self, address: &ResourceAddress) -> Option<StateRecord> {
        let result = self.resources.remove(address);
        if result.is_some() {
            self.updated_at = Utc::now();
        }
        result
    }
}

/// Persistence boundary for state records.
///
/// Every write targets a single `(kind, name)` and must be atomic for that key.
#[async_trait]
pub trait StateStore: Send + Sync {
    /// Read every record
    async fn read_all(&self) -> Result<Vec<StateRecord>>;

    /// Read one record
    async fn get(&self, address: &ResourceAddress) -> Result<Option<StateRecord>>;

    /// Insert or replace the record for its address
    async fn upsert(&self, record: StateRecord) -> Result<()>;

    /// Remove the record for an address (absent is not an error)
    async fn delete(&self, address: &ResourceAddress) -> Result<()>;
}

/// Point-in-time copy of the store used as the diff baseline
#[derive(Debug, Clone, Default)]
pub struct StateSnapshot {
    records: BTreeMap<ResourceAddress, StateRecord>,
}

impl StateSnapshot {
    pub async fn load(store: &dyn StateStore) -> Result<Self> {
        let records = store.read_all().await?;
        Ok(Self::from_records(records))
    }

    pub fn from_records(records: impl IntoIterator<Item = StateRecord>) -> Self {
        Self {
            records: records.into_iter().map(|r| (r.address(), r)).collect(),
        }
    }

    pub fn get(&self, address: &ResourceAddress) -> Option<&StateRecord> {
        self.records.get(address)
    }

    pub fn contains(&self, address: &ResourceAddress) -> bool {
        self.records.contains_key(address)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&ResourceAddress, &StateRecord)> {
        self.records.iter()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

/// In-memory store
#[derive(Debug, Default)]
pub struct MemoryStateStore {
    records: Mutex<BTreeMap<ResourceAddress, StateRecord>>,
}

impl MemoryStateStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_records(records: impl IntoIterator<Item = StateRecord>) -> Self {
        Self {
            records: Mutex::new(records.into_iter().map(|r| (r.address(), r)).collect()),
        }
    }
}

#[async_trait]
impl StateStore for MemoryStateStore {
    async fn read_all(&self) -> Result<Vec<StateRecord>> {
        Ok(self.records.lock().await.values().cloned().collect())
    }

    async fn get(&self, address: &ResourceAddress) -> Result<Option<StateRecord>> {
        Ok(self.records.lock().await.get(address).cloned())
    }

    async fn upsert(&self, record: StateRecord) -> Result<()> {
        self.records.lock().await.insert(record.address(), record);
        Ok(())
    }

    async fn delete(&self, address: &ResourceAddress) -> Result<()> {
        self.records.lock().await.remove(address);
        Ok(())
    }
}

/// JSON file store under `<project>/.fleetform/`
pub struct FileStateStore {
    state_dir: PathBuf,
    /// Serialises read-modify-write cycles
    write_lock: Mutex<()>,
}

impl FileStateStore {
    /// Store in `<project_root>/.fleetform`
    pub fn new(project_root: impl AsRef<Path>) -> Self {
        Self::in_dir(project_root.as_ref().join(STATE_DIR))
    }

    /// Store in an explicit directory
    pub fn in_dir(state_dir: impl Into<PathBuf>) -> Self {
        Self {
            state_dir: state_dir.into(),
            write_lock: Mutex::new(()),
        }
    }

    /// Get the state file path
    pub fn state_path(&self) -> PathBuf {
        self.state_dir.join(STATE_FILE)
    }

    fn backup_path(&self) -> PathBuf {
        self.state_dir.join(STATE_BACKUP)
    }

    fn temp_path(&self) -> PathBuf {
        self.state_dir.join(STATE_TEMP)
    }

    async fn ensure_state_dir(&self) -> Result<()> {
        if !self.state_dir.exists() {
            fs::create_dir_all(&self.state_dir).await?;
            tracing::debug!("Created state directory: {}", self.state_dir.display());
        }
        Ok(())
    }

    /// Load the current state
    pub async fn load(&self) -> Result<StateDocument> {
        let path = self.state_path();
        if !path.exists() {
            tracing::debug!("State file not found, returning empty state");
            return Ok(StateDocument::new());
        }

        let content = fs::read_to_string(&path).await?;
        let state: StateDocument = serde_json::from_str(&content)?;

        // Version check
        if state.version > STATE_VERSION {
            return Err(CloudError::StateError(format!(
                "State file version {} is newer than supported version {}",
                state.version, STATE_VERSION
            )));
        }

        tracing::debug!("Loaded state with {} resources", state.resources.len());
        Ok(state)
    }

    /// Save the state (backup, write temp file, rename into place)
    pub async fn save(&self, state: &StateDocument) -> Result<()> {
        self.ensure_state_dir().await?;

        let path = self.state_path();
        let temp = self.temp_path();

        let content = serde_json::to_string_pretty(state)?;
        fs::write(&temp, content).await?;

        if path.exists() {
            fs::copy(&path, self.backup_path()).await?;
        }
        fs::rename(&temp, &path).await?;

        tracing::debug!("Saved state with {} resources", state.resources.len());
        Ok(())
    }
}

#[async_trait]
impl StateStore for FileStateStore {
    async fn read_all(&self) -> Result<Vec<StateRecord>> {
        Ok(self.load().await?.resources.into_values().collect())
    }

    async fn get(&self, address: &ResourceAddress) -> Result<Option<StateRecord>> {
        Ok(self.load().await?.resources.remove(address))
    }

    async fn upsert(&self, record: StateRecord) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        let mut state = self.load().await?;
        state.set_record(record);
        self.save(&state).await
    }

    async fn delete(&self, address: &ResourceAddress) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        let mut state = self.load().await?;
        if state.remove_record(address).is_some() {
            self.save(&state).await?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::tempdir;

    fn addr(s: &str) -> ResourceAddress {
        s.parse().unwrap()
    }

    fn vpc_record() -> StateRecord {
        StateRecord::new(&addr("aws_vpc.main"), "vpc-0001")
            .with_attribute("cidr_block", json!("10.0.0.0/16"))
            .with_outputs([("arn".to_string(), json!("arn:vpc"))].into_iter().collect())
    }

    #[test]
    fn test_lookup_order() {
        let record = vpc_record().with_outputs(
            [("cidr_block".to_string(), json!("10.9.0.0/16"))]
                .into_iter()
                .collect(),
        );
        assert_eq!(record.lookup("cidr_block"), Some(json!("10.9.0.0/16")));
        assert_eq!(record.lookup("id"), Some(json!("vpc-0001")));
        assert_eq!(record.lookup("missing"), None);
        assert_eq!(record.get_attribute::<String>("id").as_deref(), Some("vpc-0001"));
    }

    #[tokio::test]
    async fn test_state_save_load() {
        let temp_dir = tempdir().unwrap();
        let store = FileStateStore::new(temp_dir.path());

        store.upsert(vpc_record()).await.unwrap();

        let loaded = store.load().await.unwrap();
        assert_eq!(loaded.resources.len(), 1);
        assert!(loaded.resources.contains_key(&addr("aws_vpc.main")));
        assert!(store.state_path().exists());
    }

    #[tokio::test]
    async fn test_empty_state() {
        let temp_dir = tempdir().unwrap();
        let store = FileStateStore::new(temp_dir.path());

        let records = store.read_all().await.unwrap();
        assert!(records.is_empty());
    }

    #[tokio::test]
    async fn test_upsert_replaces_by_key_and_delete_removes() {
        let temp_dir = tempdir().unwrap();
        let store = FileStateStore::new(temp_dir.path());

        store.upsert(vpc_record()).await.unwrap();
        store
            .upsert(StateRecord::new(&addr("aws_subnet.a"), "subnet-1"))
            .await
            .unwrap();
        store
            .upsert(vpc_record().with_attribute("cidr_block", json!("10.1.0.0/16")))
            .await
            .unwrap();

        let vpc = store.get(&addr("aws_vpc.main")).await.unwrap().unwrap();
        assert_eq!(vpc.last_applied_attributes["cidr_block"], json!("10.1.0.0/16"));
        assert_eq!(store.read_all().await.unwrap().len(), 2);

        store.delete(&addr("aws_vpc.main")).await.unwrap();
        store.delete(&addr("aws_vpc.main")).await.unwrap();
        assert!(store.get(&addr("aws_vpc.main")).await.unwrap().is_none());
        assert_eq!(store.read_all().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_backup_written_on_overwrite() {
        let temp_dir = tempdir().unwrap();
        let store = FileStateStore::new(temp_dir.path());

        store.upsert(vpc_record()).await.unwrap();
        store
            .upsert(StateRecord::new(&addr("aws_subnet.a"), "subnet-1"))
            .await
            .unwrap();

        let backup = temp_dir.path().join(".fleetform").join("state.json.backup");
        assert!(backup.exists());
        assert!(!temp_dir.path().join(".fleetform").join("state.json.tmp").exists());
    }

    #[tokio::test]
    async fn test_newer_version_rejected() {
        let temp_dir = tempdir().unwrap();
        let store = FileStateStore::new(temp_dir.path());

        let mut state = StateDocument::new();
        state.version = STATE_VERSION + 1;
        store.save(&state).await.unwrap();

        let err = store.load().await.unwrap_err();
        assert!(matches!(err, CloudError::StateError(_)));
    }

    #[tokio::test]
    async fn test_memory_store_snapshot() {
        let store = MemoryStateStore::with_records(vec![vpc_record()]);
        let snapshot = StateSnapshot::load(&store).await.unwrap();
        assert_eq!(snapshot.len(), 1);
        assert!(snapshot.contains(&addr("aws_vpc.main")));

        store.delete(&addr("aws_vpc.main")).await.unwrap();
        assert_eq!(snapshot.len(), 1, "snapshot is detached from the store");
        assert!(store.read_all().await.unwrap().is_empty());
    }
}
