//! Provider adapter interface
//!
//! A provider adapter performs create/update/delete against the remote API
//! for one or more resource kinds. Concrete adapters live outside this crate.

use async_trait::async_trait;
use fleetform_core::ResourceAddress;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

/// Fully resolved attribute values
pub type Attributes = BTreeMap<String, serde_json::Value>;

/// Change of one resolved attribute (`None` = absent)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValueChange {
    pub old: Option<serde_json::Value>,
    pub new: Option<serde_json::Value>,
}

/// Changed attributes handed to [`ProviderAdapter::update`]
pub type ResolvedDiff = BTreeMap<String, ValueChange>;

/// Compute the resolved diff between two attribute sets
pub fn diff_attributes(old: &Attributes, new: &Attributes) -> ResolvedDiff {
    let mut diff = ResolvedDiff::new();
    for key in old.keys().chain(new.keys()) {
        let before = old.get(key);
        let after = new.get(key);
        if before != after && !diff.contains_key(key) {
            diff.insert(
                key.clone(),
                ValueChange {
                    old: before.cloned(),
                    new: after.cloned(),
                },
            );
        }
    }
    diff
}

/// Errors returned by provider adapters
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProviderError {
    /// Retriable (throttling, timeouts, eventual consistency)
    #[error("Transient provider error: {0}")]
    Transient(String),

    /// Requires operator intervention (invalid attribute, quota, auth)
    #[error("Permanent provider error: {0}")]
    Permanent(String),
}

impl ProviderError {
    pub fn transient(message: impl Into<String>) -> Self {
        ProviderError::Transient(message.into())
    }

    pub fn permanent(message: impl Into<String>) -> Self {
        ProviderError::Permanent(message.into())
    }

    pub fn is_transient(&self) -> bool {
        matches!(self, ProviderError::Transient(_))
    }
}

/// Result of a successful create
#[derive(Debug, Clone, PartialEq)]
pub struct Created {
    /// Provider-assigned identity
    pub provider_id: String,
    /// Provider-assigned output attributes
    pub outputs: Attributes,
}

impl Created {
    pub fn new(provider_id: impl Into<String>) -> Self {
        Self {
            provider_id: provider_id.into(),
            outputs: Attributes::new(),
        }
    }

    pub fn with_output(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.outputs.insert(key.into(), value);
        self
    }
}

/// Per-kind CRUD against a remote API
#[async_trait]
pub trait ProviderAdapter: Send + Sync {
    /// Returns the adapter name (e.g., "aws", "local")
    fn name(&self) -> &str;

    /// Whether changing `attribute` on `kind` requires delete-then-create
    /// instead of an in-place update.
    fn requires_replacement(&self, _kind: &str, _attribute: &str) -> bool {
        false
    }

    /// Create a resource from fully resolved attributes
    async fn create(
        &self,
        address: &ResourceAddress,
        attributes: &Attributes,
    ) -> Result<Created, ProviderError>;

    /// Apply a diff in place, returning the (possibly changed) outputs
    async fn update(
        &self,
        address: &ResourceAddress,
        provider_id: &str,
        diff: &ResolvedDiff,
    ) -> Result<Attributes, ProviderError>;

    /// Delete a resource
    async fn delete(&self, address: &ResourceAddress, provider_id: &str)
    -> Result<(), ProviderError>;
}

/// Adapters indexed by resource kind
#[derive(Clone, Default)]
pub struct ProviderRegistry {
    adapters: HashMap<String, Arc<dyn ProviderAdapter>>,
    fallback: Option<Arc<dyn ProviderAdapter>>,
}

impl ProviderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an adapter for one kind
    pub fn register(&mut self, kind: impl Into<String>, adapter: Arc<dyn ProviderAdapter>) {
        let kind = kind.into();
        tracing::debug!("Registered provider '{}' for kind {}", adapter.name(), kind);
        self.adapters.insert(kind, adapter);
    }

    pub fn with_adapter(mut self, kind: impl Into<String>, adapter: Arc<dyn ProviderAdapter>) -> Self {
        self.register(kind, adapter);
        self
    }

    /// Adapter used for kinds without an explicit registration
    pub fn with_fallback(mut self, adapter: Arc<dyn ProviderAdapter>) -> Self {
        self.fallback = Some(adapter);
        self
    }

    pub fn get(&self, kind: &str) -> Option<Arc<dyn ProviderAdapter>> {
        self.adapters
            .get(kind)
            .cloned()
            .or_else(|| self.fallback.clone())
    }

    pub fn requires_replacement(&self, kind: &str, attribute: &str) -> bool {
        self.get(kind)
            .is_some_and(|adapter| adapter.requires_replacement(kind, attribute))
    }

    pub fn kinds(&self) -> Vec<&str> {
        let mut kinds: Vec<&str> = self.adapters.keys().map(|k| k.as_str()).collect();
        kinds.sort_unstable();
        kinds
    }
}

impl std::fmt::Debug for ProviderRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderRegistry")
            .field("kinds", &self.kinds())
            .field("fallback", &self.fallback.as_ref().map(|a| a.name().to_string()))
            .finish()
    }
}

/// Retry configuration for provider operations
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Maximum number of attempts (including the first)
    pub max_attempts: u32,

    /// Initial delay between retries
    pub initial_delay: Duration,

    /// Maximum delay between retries
    pub max_delay: Duration,

    /// Backoff multiplier
    pub backoff_multiplier: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
            backoff_multiplier: 2.0,
        }
    }
}

impl RetryConfig {
    /// Single attempt, no retries
    pub fn none() -> Self {
        Self {
            max_attempts: 1,
            ..Self::default()
        }
    }

    /// Delay after the given (1-based) failed attempt
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(i32::MAX as u32) as i32;
        let secs = self.initial_delay.as_secs_f64() * self.backoff_multiplier.powi(exponent);
        let capped = secs.min(self.max_delay.as_secs_f64());
        if capped.is_finite() && capped >= 0.0 {
            Duration::from_secs_f64(capped)
        } else {
            self.max_delay
        }
    }
}

/// Run `call` until it succeeds, fails permanently, or attempts run out.
///
/// Exhausted transient errors are escalated to `Permanent`. Returns the
/// number of attempts made alongside the result.
pub async fn call_with_retry<T, F, Fut>(
    retry: &RetryConfig,
    address: &ResourceAddress,
    operation: &str,
    mut call: F,
) -> (Result<T, ProviderError>, u32)
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, ProviderError>>,
{
    let max_attempts = retry.max_attempts.max(1);
    let mut attempt = 0;
    loop {
        attempt += 1;
        match call().await {
            Ok(value) => return (Ok(value), attempt),
            Err(ProviderError::Transient(message)) if attempt < max_attempts => {
                let delay = retry.delay_for_attempt(attempt);
                tracing::warn!(
                    resource = %address,
                    operation,
                    attempt,
                    delay_ms = delay.as_millis() as u64,
                    error = %message,
                    "transient provider error, retrying"
                );
                tokio::time::sleep(delay).await;
            }
            Err(ProviderError::Transient(message)) => {
                return (
                    Err(ProviderError::Permanent(format!(
                        "gave up after {} attempts: {}",
                        attempt, message
                    ))),
                    attempt,
                );
            }
            Err(e) => return (Err(e), attempt),
        }
    }
}
