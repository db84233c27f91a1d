//! Local provider for FleetForm
//!
//! This crate implements the `ProviderAdapter` trait against a simulated
//! cloud: resources are kept in an inventory (optionally persisted to
//! `inventory.json`) and receive generated identities and outputs.
//! It lets manifests be planned and applied end to end without credentials.
//!
//! # Example
//!
//! ```ignore
//! use fleetform_cloud::ProviderRegistry;
//! use fleetform_cloud_local::LocalProvider;
//! use std::sync::Arc;
//!
//! let provider = LocalProvider::persistent(".fleetform/local", "local-1");
//! let registry = ProviderRegistry::new().with_fallback(Arc::new(provider));
//! ```

pub mod error;
pub mod inventory;
pub mod provider;

pub use error::{LocalError, Result};
pub use inventory::{Inventory, InventoryEntry};
pub use provider::LocalProvider;
