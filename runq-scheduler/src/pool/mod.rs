//! Worker pool
//!
//! Registered worker nodes and the runner handles derived from them, grouped
//! into buckets keyed by `(infra, workspace?, project?)`. Lookups fall back
//! from project-dedicated to workspace-dedicated to shared nodes.

pub mod handle;
pub mod process;
pub mod registration;

pub use handle::RunnerHandle;
pub use process::RemoteProcess;
pub use registration::{PoolKey, WorkerRegistration};

use dashmap::DashMap;
use runq_client::{WorkerApi, WorkerClient};
use runq_core::domain::project::DEFAULT_INFRA;
use runq_core::dto::worker::{RegisterWorker, WorkerNodeInfo};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use crate::error::{Result, SchedulerError};

/// Creates the wire client used to talk to a worker address
pub trait WorkerConnector: Send + Sync {
    fn connect(&self, address: &str) -> Arc<dyn WorkerApi>;
}

/// Connects to worker nodes over HTTP with one shared reqwest client
pub struct HttpConnector {
    client: reqwest::Client,
}

impl HttpConnector {
    pub fn new(client: reqwest::Client) -> Self {
        Self { client }
    }
}

impl WorkerConnector for HttpConnector {
    fn connect(&self, address: &str) -> Arc<dyn WorkerApi> {
        Arc::new(WorkerClient::with_client(address, self.client.clone()))
    }
}

pub struct WorkerPool {
    connector: Arc<dyn WorkerConnector>,
    registrations: DashMap<String, Arc<WorkerRegistration>>,
    buckets: DashMap<PoolKey, HashSet<RunnerHandle>>,
}

impl WorkerPool {
    pub fn new(connector: Arc<dyn WorkerConnector>) -> Self {
        Self {
            connector,
            registrations: DashMap::new(),
            buckets: DashMap::new(),
        }
    }

    /// Register a worker node
    ///
    /// Returns whether the pool changed. Re-registering a node under another
    /// dedication moves it to the new bucket.
    pub async fn register(&self, req: RegisterWorker) -> Result<bool> {
        let address = req.address.trim().trim_end_matches('/').to_string();
        let api = self.connector.connect(&address);

        api.ping()
            .await
            .map_err(|source| SchedulerError::WorkerUnreachable {
                address: address.clone(),
                source,
            })?;

        let key = PoolKey::new(
            req.infra.as_deref().unwrap_or(DEFAULT_INFRA),
            req.workspace.as_deref(),
            req.project.as_deref(),
        );
        let registration = Arc::new(WorkerRegistration::new(api, key.clone()));
        let handles: HashSet<RunnerHandle> =
            registration.runner_handles().await?.into_iter().collect();

        let previous = self.registrations.insert(address.clone(), registration);
        let mut changed = previous.as_ref().is_none_or(|old| old.key() != &key);
        if let Some(old) = previous {
            changed |= self.take_handles(old.key(), &address) != handles;
        }

        self.buckets.entry(key).or_default().extend(handles);

        tracing::info!("Worker {} registered (changed: {})", address, changed);
        Ok(changed)
    }

    /// Remove a worker node and every runner it offered
    pub fn unregister(&self, address: &str) -> bool {
        let address = address.trim().trim_end_matches('/');
        let mut changed = self.registrations.remove(address).is_some();

        for mut bucket in self.buckets.iter_mut() {
            let before = bucket.len();
            bucket.retain(|handle| handle.address() != address);
            changed |= bucket.len() != before;
        }
        self.buckets.retain(|_, bucket| !bucket.is_empty());

        if changed {
            tracing::info!("Worker {} unregistered", address);
        }
        changed
    }

    /// Runner handles able to serve `project` of `workspace` on `infra`
    ///
    /// Buckets are searched most specific first. Handles of nodes failing a
    /// liveness probe are dropped; probe results live only for this call.
    pub async fn candidates(&self, infra: &str, workspace: &str, project: &str) -> Vec<RunnerHandle> {
        let mut probes: HashMap<String, bool> = HashMap::new();

        for key in PoolKey::lookup_order(infra, workspace, project) {
            let handles: Vec<RunnerHandle> = match self.buckets.get(&key) {
                Some(bucket) => bucket.iter().cloned().collect(),
                None => continue,
            };

            let mut alive = Vec::with_capacity(handles.len());
            for handle in handles {
                let address = handle.address().to_string();
                let ok = match probes.get(&address) {
                    Some(ok) => *ok,
                    None => {
                        let ok = match self.registration(&address) {
                            Some(registration) => registration.is_alive().await,
                            None => false,
                        };
                        probes.insert(address, ok);
                        ok
                    }
                };
                if ok {
                    alive.push(handle);
                }
            }

            if !alive.is_empty() {
                return alive;
            }
        }

        Vec::new()
    }

    /// Re-fetch the runner list of every registered node
    pub async fn refresh(&self) {
        let registrations = self.registrations();

        for registration in registrations {
            let handles = match registration.runner_handles().await {
                Ok(handles) => handles,
                Err(e) => {
                    tracing::warn!("Failed to refresh runners of {}: {}", registration.address(), e);
                    continue;
                }
            };

            let address = registration.address();
            let mut bucket = self.buckets.entry(registration.key().clone()).or_default();
            bucket.retain(|handle| handle.address() != address);
            bucket.extend(handles);
        }
    }

    pub fn registration(&self, address: &str) -> Option<Arc<WorkerRegistration>> {
        self.registrations
            .get(address)
            .map(|entry| Arc::clone(entry.value()))
    }

    pub fn registrations(&self) -> Vec<Arc<WorkerRegistration>> {
        let mut registrations: Vec<_> = self
            .registrations
            .iter()
            .map(|entry| Arc::clone(entry.value()))
            .collect();
        registrations.sort_by(|a, b| a.address().cmp(b.address()));
        registrations
    }

    /// Live description of every registered node
    pub async fn describe(&self) -> Vec<WorkerNodeInfo> {
        let mut nodes = Vec::new();
        for registration in self.registrations() {
            nodes.push(registration.describe().await);
        }
        nodes
    }

    pub fn clear(&self) {
        self.registrations.clear();
        self.buckets.clear();
    }

    /// Remove and return the handles of `address` held in one bucket
    fn take_handles(&self, key: &PoolKey, address: &str) -> HashSet<RunnerHandle> {
        let Some(mut bucket) = self.buckets.get_mut(key) else {
            return HashSet::new();
        };
        let (taken, kept) = bucket
            .drain()
            .partition(|handle| handle.address() == address);
        *bucket = kept;
        taken
    }
}
