//! Local provider implementation

use crate::error::{LocalError, Result};
use crate::inventory::{Inventory, InventoryEntry};
use async_trait::async_trait;
use chrono::Utc;
use fleetform_cloud::{Attributes, Created, ProviderAdapter, ProviderError, ResolvedDiff};
use fleetform_core::ResourceAddress;
use serde_json::json;
use std::path::PathBuf;
use std::time::Duration;
use tokio::sync::Mutex;

/// Attributes the simulated cloud cannot change on a live resource
const IMMUTABLE_ATTRIBUTES: [&str; 4] = ["cidr_block", "availability_zone", "engine", "ami"];

const DEFAULT_DB_PORT: u64 = 5432;

/// Simulated provider for every resource kind
pub struct LocalProvider {
    region: String,
    /// Persist the inventory here; in-memory only when `None`
    dir: Option<PathBuf>,
    inventory: Mutex<Option<Inventory>>,
    latency: Duration,
}

impl LocalProvider {
    /// In-memory inventory
    pub fn new(region: impl Into<String>) -> Self {
        Self {
            region: region.into(),
            dir: None,
            inventory: Mutex::new(None),
            latency: Duration::ZERO,
        }
    }

    /// Inventory persisted as `<dir>/inventory.json`
    pub fn persistent(dir: impl Into<PathBuf>, region: impl Into<String>) -> Self {
        Self {
            dir: Some(dir.into()),
            ..Self::new(region)
        }
    }

    /// Simulated network latency per call
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    pub fn region(&self) -> &str {
        &self.region
    }

    /// Copy of the current inventory
    pub async fn inventory(&self) -> Result<Inventory> {
        self.with_inventory(|inventory| Ok(inventory.clone())).await
    }

    /// Run `f` against the inventory and persist it if `f` succeeded
    async fn with_inventory<T, F>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&mut Inventory) -> Result<T>,
    {
        let mut guard = self.inventory.lock().await;
        let inventory = match guard.take() {
            Some(inventory) => guard.insert(inventory),
            None => {
                let loaded = match &self.dir {
                    Some(dir) => Inventory::load(dir).await?,
                    None => Inventory::default(),
                };
                guard.insert(loaded)
            }
        };

        let result = f(inventory)?;
        if let Some(dir) = &self.dir {
            inventory.save(dir).await?;
        }
        Ok(result)
    }

    async fn simulate_latency(&self) {
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
    }

    fn outputs_for(
        &self,
        address: &ResourceAddress,
        id: &str,
        serial: u64,
        attributes: &Attributes,
    ) -> Attributes {
        let kind = address.kind.as_str();
        let mut outputs = Attributes::new();
        outputs.insert("id".to_string(), json!(id));
        outputs.insert(
            "arn".to_string(),
            json!(format!("arn:fleetform:{}:{}/{}", self.region, kind, id)),
        );

        if is_load_balancer(kind) {
            outputs.insert(
                "dns_name".to_string(),
                json!(format!(
                    "{}-{}.{}.elb.fleetform.local",
                    address.name, serial, self.region
                )),
            );
        } else if is_database(kind) {
            let port = attributes
                .get("port")
                .and_then(|p| p.as_u64())
                .unwrap_or(DEFAULT_DB_PORT);
            outputs.insert(
                "endpoint".to_string(),
                json!(format!(
                    "{}.{:06x}.{}.rds.fleetform.local:{}",
                    address.name, serial, self.region, port
                )),
            );
        } else if kind.ends_with("instance") {
            outputs.insert(
                "private_ip".to_string(),
                json!(format!("10.0.{}.{}", (serial / 250) % 256, serial % 250 + 4)),
            );
        }
        outputs
    }
}

fn is_load_balancer(kind: &str) -> bool {
    kind.ends_with("_lb") || kind.ends_with("_alb") || kind.contains("load_balancer")
}

fn is_database(kind: &str) -> bool {
    kind.contains("db_instance") || kind.contains("rds")
}

/// `aws_db_instance` -> `db-instance`
fn id_prefix(kind: &str) -> String {
    kind.split_once('_')
        .map(|(_, rest)| rest)
        .unwrap_or(kind)
        .replace('_', "-")
}

fn validate_attributes(attributes: &Attributes) -> Result<()> {
    if let Some(cidr) = attributes.get("cidr_block") {
        let valid = cidr
            .as_str()
            .and_then(|s| s.split_once('/'))
            .is_some_and(|(ip, prefix)| {
                ip.parse::<std::net::Ipv4Addr>().is_ok()
                    && prefix.parse::<u8>().is_ok_and(|p| p <= 32)
            });
        if !valid {
            return Err(LocalError::InvalidAttribute {
                attribute: "cidr_block".to_string(),
                message: format!("not an IPv4 CIDR block: {}", cidr),
            });
        }
    }
    if let Some(port) = attributes.get("port") {
        if !port.as_u64().is_some_and(|p| (1..=65535).contains(&p)) {
            return Err(LocalError::InvalidAttribute {
                attribute: "port".to_string(),
                message: format!("out of range: {}", port),
            });
        }
    }
    Ok(())
}

#[async_trait]
impl ProviderAdapter for LocalProvider {
    fn name(&self) -> &str {
        "local"
    }

    fn requires_replacement(&self, _kind: &str, attribute: &str) -> bool {
        IMMUTABLE_ATTRIBUTES.contains(&attribute)
    }

    async fn create(
        &self,
        address: &ResourceAddress,
        attributes: &Attributes,
    ) -> std::result::Result<Created, ProviderError> {
        validate_attributes(attributes)?;
        self.simulate_latency().await;

        let created = self
            .with_inventory(|inventory| {
                let serial = inventory.next_serial();
                let id = format!("{}-{:08x}", id_prefix(&address.kind), serial);
                let outputs = self.outputs_for(address, &id, serial, attributes);
                let now = Utc::now();
                inventory.resources.insert(
                    id.clone(),
                    InventoryEntry {
                        kind: address.kind.clone(),
                        name: address.name.clone(),
                        attributes: attributes.clone(),
                        outputs: outputs.clone(),
                        created_at: now,
                        updated_at: now,
                    },
                );
                Ok(Created {
                    provider_id: id,
                    outputs,
                })
            })
            .await?;

        tracing::info!("Created {} as {}", address, created.provider_id);
        Ok(created)
    }

    async fn update(
        &self,
        address: &ResourceAddress,
        provider_id: &str,
        diff: &ResolvedDiff,
    ) -> std::result::Result<Attributes, ProviderError> {
        if let Some(attribute) = diff
            .keys()
            .find(|k| self.requires_replacement(&address.kind, k))
        {
            return Err(LocalError::ImmutableAttribute(attribute.clone()).into());
        }
        let changed: Attributes = diff
            .iter()
            .filter_map(|(k, change)| change.new.clone().map(|v| (k.clone(), v)))
            .collect();
        validate_attributes(&changed)?;
        self.simulate_latency().await;

        let outputs = self
            .with_inventory(|inventory| {
                let entry = inventory.get_mut(provider_id)?;
                for (key, change) in diff {
                    match &change.new {
                        Some(value) => {
                            entry.attributes.insert(key.clone(), value.clone());
                        }
                        None => {
                            entry.attributes.remove(key);
                        }
                    }
                }
                entry.updated_at = Utc::now();
                Ok(entry.outputs.clone())
            })
            .await?;

        tracing::info!("Updated {} ({} attributes)", address, diff.len());
        Ok(outputs)
    }

    async fn delete(
        &self,
        address: &ResourceAddress,
        provider_id: &str,
    ) -> std::result::Result<(), ProviderError> {
        self.simulate_latency().await;

        let removed = self
            .with_inventory(|inventory| Ok(inventory.resources.remove(provider_id)))
            .await?;
        match removed {
            Some(_) => tracing::info!("Deleted {} ({})", address, provider_id),
            None => tracing::warn!("{} ({}) was already gone", address, provider_id),
        }
        Ok(())
    }
}
