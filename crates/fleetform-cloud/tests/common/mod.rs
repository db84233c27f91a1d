//! Shared fixtures for engine integration tests

#![allow(dead_code)]

use async_trait::async_trait;
use fleetform_cloud::{
    Attributes, Created, ExecutorConfig, ProviderAdapter, ProviderError, ResolvedDiff, RetryConfig,
};
use fleetform_core::{Reference, ResourceAddress, ResourceDeclaration};
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::{Barrier, Notify};

/// One provider call as observed by [`ScriptedProvider`]
#[derive(Debug, Clone, PartialEq)]
pub enum Call {
    Create(ResourceAddress, Attributes),
    Update(ResourceAddress, String, ResolvedDiff),
    Delete(ResourceAddress, String),
}

impl Call {
    pub fn address(&self) -> &ResourceAddress {
        match self {
            Call::Create(a, _) | Call::Update(a, _, _) | Call::Delete(a, _) => a,
        }
    }

    pub fn is_delete(&self) -> bool {
        matches!(self, Call::Delete(..))
    }
}

/// In-memory provider whose failures and timing are scripted per resource
#[derive(Default)]
pub struct ScriptedProvider {
    calls: Mutex<Vec<Call>>,
    failures: Mutex<HashMap<ResourceAddress, VecDeque<ProviderError>>>,
    barriers: Mutex<HashMap<ResourceAddress, Arc<Barrier>>>,
    gates: Mutex<HashMap<ResourceAddress, (Arc<Notify>, Arc<Notify>)>>,
    immutable: HashSet<String>,
    delay: Option<Duration>,
    counter: AtomicUsize,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl ScriptedProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// Attributes that force replacement for every kind
    pub fn with_immutable(mut self, attribute: &str) -> Self {
        self.immutable.insert(attribute.to_string());
        self
    }

    /// Sleep inside every call
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Queue errors returned by the next calls for `address`
    pub fn fail(&self, address: &ResourceAddress, errors: impl IntoIterator<Item = ProviderError>) {
        self.failures
            .lock()
            .unwrap()
            .entry(address.clone())
            .or_default()
            .extend(errors);
    }

    pub fn clear_failures(&self) {
        self.failures.lock().unwrap().clear();
    }

    /// Calls for these addresses wait on a shared barrier
    pub fn rendezvous(&self, addresses: &[ResourceAddress]) {
        let barrier = Arc::new(Barrier::new(addresses.len()));
        let mut barriers = self.barriers.lock().unwrap();
        for address in addresses {
            barriers.insert(address.clone(), Arc::clone(&barrier));
        }
    }

    /// Calls for `address` signal `started` and then wait for `release`
    pub fn gate(&self, address: &ResourceAddress) -> (Arc<Notify>, Arc<Notify>) {
        let started = Arc::new(Notify::new());
        let release = Arc::new(Notify::new());
        self.gates.lock().unwrap().insert(
            address.clone(),
            (Arc::clone(&started), Arc::clone(&release)),
        );
        (started, release)
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    pub fn clear_calls(&self) {
        self.calls.lock().unwrap().clear();
    }

    pub fn called_addresses(&self) -> Vec<ResourceAddress> {
        self.calls().iter().map(|c| c.address().clone()).collect()
    }

    pub fn position(&self, address: &ResourceAddress) -> Option<usize> {
        self.calls().iter().position(|c| c.address() == address)
    }

    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    async fn enter(&self, call: Call) -> Result<(), ProviderError> {
        let address = call.address().clone();
        self.calls.lock().unwrap().push(call);

        let current = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(current, Ordering::SeqCst);

        let barrier = self.barriers.lock().unwrap().get(&address).cloned();
        if let Some(barrier) = barrier {
            barrier.wait().await;
        }
        let gate = self.gates.lock().unwrap().get(&address).cloned();
        if let Some((started, release)) = gate {
            started.notify_one();
            release.notified().await;
        }
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        let failure = self
            .failures
            .lock()
            .unwrap()
            .get_mut(&address)
            .and_then(|queue| queue.pop_front());
        match failure {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl ProviderAdapter for ScriptedProvider {
    fn name(&self) -> &str {
        "scripted"
    }

    fn requires_replacement(&self, _kind: &str, attribute: &str) -> bool {
        self.immutable.contains(attribute)
    }

    async fn create(
        &self,
        address: &ResourceAddress,
        attributes: &Attributes,
    ) -> Result<Created, ProviderError> {
        self.enter(Call::Create(address.clone(), attributes.clone()))
            .await?;
        let n = self.counter.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(Created::new(format!("{}-{}", address.name, n))
            .with_output("arn", serde_json::json!(format!("arn:test:{}", address))))
    }

    async fn update(
        &self,
        address: &ResourceAddress,
        provider_id: &str,
        diff: &ResolvedDiff,
    ) -> Result<Attributes, ProviderError> {
        self.enter(Call::Update(address.clone(), provider_id.to_string(), diff.clone()))
            .await?;
        Ok(Attributes::new())
    }

    async fn delete(&self, address: &ResourceAddress, provider_id: &str) -> Result<(), ProviderError> {
        self.enter(Call::Delete(address.clone(), provider_id.to_string()))
            .await
    }
}

pub fn addr(kind: &str, name: &str) -> ResourceAddress {
    ResourceAddress::new(kind, name)
}

pub fn id_of(kind: &str, name: &str) -> Reference {
    addr(kind, name).attribute("id")
}

/// Network N, subnet S referencing N, servers X and Y referencing S
pub fn topology() -> Vec<ResourceDeclaration> {
    vec![
        ResourceDeclaration::new("network", "n").with_literal("cidr", "10.0.0.0/16"),
        ResourceDeclaration::new("subnet", "s")
            .with_literal("cidr", "10.0.1.0/24")
            .with_reference("network_id", id_of("network", "n")),
        ResourceDeclaration::new("server", "x")
            .with_literal("size", "small")
            .with_reference("subnet_id", id_of("subnet", "s")),
        ResourceDeclaration::new("server", "y")
            .with_literal("size", "small")
            .with_reference("subnet_id", id_of("subnet", "s")),
    ]
}

pub fn fast_config(parallelism: usize) -> ExecutorConfig {
    ExecutorConfig {
        parallelism,
        retry: RetryConfig {
            max_attempts: 3,
            initial_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(5),
            backoff_multiplier: 2.0,
        },
    }
}
