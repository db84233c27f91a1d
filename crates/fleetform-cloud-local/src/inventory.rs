//! Simulated remote inventory

use crate::error::{LocalError, Result};
use chrono::{DateTime, Utc};
use fleetform_cloud::Attributes;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tokio::fs;

const INVENTORY_VERSION: u32 = 1;
const INVENTORY_FILE: &str = "inventory.json";
const INVENTORY_TEMP: &str = "inventory.json.tmp";

/// One simulated remote resource
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InventoryEntry {
    pub kind: String,
    pub name: String,
    pub attributes: Attributes,
    pub outputs: Attributes,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Everything the simulated cloud currently holds, keyed by provider id
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Inventory {
    pub version: u32,
    /// Serial used to derive the next provider id
    pub serial: u64,
    pub resources: BTreeMap<String, InventoryEntry>,
}

impl Default for Inventory {
    fn default() -> Self {
        Self {
            version: INVENTORY_VERSION,
            serial: 0,
            resources: BTreeMap::new(),
        }
    }
}

impl Inventory {
    pub fn next_serial(&mut self) -> u64 {
        self.serial += 1;
        self.serial
    }

    pub fn get(&self, id: &str) -> Result<&InventoryEntry> {
        self.resources
            .get(id)
            .ok_or_else(|| LocalError::NotFound(id.to_string()))
    }

    pub fn get_mut(&mut self, id: &str) -> Result<&mut InventoryEntry> {
        self.resources
            .get_mut(id)
            .ok_or_else(|| LocalError::NotFound(id.to_string()))
    }

    pub fn by_kind(&self, kind: &str) -> Vec<(&String, &InventoryEntry)> {
        self.resources.iter().filter(|(_, e)| e.kind == kind).collect()
    }

    pub fn len(&self) -> usize {
        self.resources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.resources.is_empty()
    }

    pub fn path_in(dir: &Path) -> PathBuf {
        dir.join(INVENTORY_FILE)
    }

    /// Load from `dir`, empty if the file does not exist yet
    pub async fn load(dir: &Path) -> Result<Self> {
        let path = Self::path_in(dir);
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = fs::read_to_string(&path).await?;
        let inventory: Inventory = serde_json::from_str(&content)?;
        if inventory.version > INVENTORY_VERSION {
            return Err(LocalError::UnsupportedVersion(inventory.version));
        }
        tracing::debug!("Loaded inventory with {} resources", inventory.len());
        Ok(inventory)
    }

    /// Write to `dir` via a temp file and rename
    pub async fn save(&self, dir: &Path) -> Result<()> {
        if !dir.exists() {
            fs::create_dir_all(dir).await?;
        }
        let temp = dir.join(INVENTORY_TEMP);
        fs::write(&temp, serde_json::to_string_pretty(self)?).await?;
        fs::rename(&temp, Self::path_in(dir)).await?;
        Ok(())
    }
}
