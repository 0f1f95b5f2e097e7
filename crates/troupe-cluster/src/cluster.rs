//! The cluster facade
//!
//! Bundles engine, agent, and provider lifecycle behind one cheap-clone
//! handle. Kinds register before `start`; afterwards the node's kind list is
//! frozen and advertised to the cluster.

use crate::activation::ActivationConfig;
use crate::agent::agent_producer;
use crate::constants::{REGION_DEFAULT, REQUEST_TIMEOUT_MS_DEFAULT};
use crate::error::{ClusterError, ClusterResult};
use crate::kind::{Kind, KindConfig};
use crate::member::Member;
use crate::messages::{register_wire_types, Activate, Activation, Deactivate, GetActive, GetKinds, GetMembers};
use crate::provider::{self_managed_provider, SelfManagedConfig};
use rand::Rng;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, OnceLock, PoisonError};
use std::time::Duration;
use tracing::{error, warn};
use troupe_actor::{Engine, EngineConfig, Opts, Pid, Producer};
use troupe_remote::{Remote, RemoteConfig};

/// Builds a provider producer once the cluster handle exists
///
/// Simple but powerful: receivers built this way can reach back into the
/// cluster they serve.
pub type Provider = Arc<dyn Fn(Cluster) -> Producer + Send + Sync>;

/// Cluster construction options
pub struct ClusterConfig {
    listen_addr: Option<String>,
    id: Option<String>,
    region: String,
    request_timeout: Duration,
    engine: Option<Engine>,
    provider: Provider,
}

impl Default for ClusterConfig {
    fn default() -> Self {
        Self {
            listen_addr: None,
            id: None,
            region: REGION_DEFAULT.to_string(),
            request_timeout: Duration::from_millis(REQUEST_TIMEOUT_MS_DEFAULT),
            engine: None,
            provider: self_managed_provider(SelfManagedConfig::new()),
        }
    }
}

impl ClusterConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Listen address for the underlying remote; random port when absent
    pub fn with_listen_addr(mut self, addr: impl Into<String>) -> Self {
        self.listen_addr = Some(addr.into());
        self
    }

    /// This node's member id; random when absent
    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    /// Region this member advertises
    pub fn with_region(mut self, region: impl Into<String>) -> Self {
        self.region = region.into();
        self
    }

    /// Budget for requests between cluster members
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// Drive the cluster with an existing engine instead of building one
    pub fn with_engine(mut self, engine: Engine) -> Self {
        self.engine = Some(engine);
        self
    }

    /// Replace the discovery provider
    pub fn with_provider(mut self, provider: Provider) -> Self {
        self.provider = provider;
        self
    }
}

struct ClusterInner {
    id: String,
    region: String,
    request_timeout: Duration,
    engine: Engine,
    provider: Provider,
    kinds: Mutex<Vec<Kind>>,
    agent_pid: OnceLock<Pid>,
    provider_pid: OnceLock<Pid>,
    started: AtomicBool,
}

/// Cheap-clone handle to one cluster member
#[derive(Clone)]
pub struct Cluster {
    inner: Arc<ClusterInner>,
}

impl Cluster {
    /// Build a cluster member; spins up engine and remote when none is given
    pub async fn new(config: ClusterConfig) -> ClusterResult<Cluster> {
        register_wire_types();
        let engine = match config.engine {
            Some(engine) => engine,
            None => {
                let addr = config
                    .listen_addr
                    .unwrap_or_else(random_listen_addr);
                let remote = Remote::new(addr, RemoteConfig::default());
                Engine::new(EngineConfig::new().with_remote(remote))
                    .await
                    .map_err(ClusterError::engine_build)?
            }
        };
        let id = config
            .id
            .unwrap_or_else(|| rand::random::<u64>().to_string());
        Ok(Cluster {
            inner: Arc::new(ClusterInner {
                id,
                region: config.region,
                request_timeout: config.request_timeout,
                engine,
                provider: config.provider,
                kinds: Mutex::new(Vec::new()),
                agent_pid: OnceLock::new(),
                provider_pid: OnceLock::new(),
                started: AtomicBool::new(false),
            }),
        })
    }

    /// Register a kind activatable from any member; pre-start only
    pub fn register_kind(&self, name: &str, producer: Producer, config: KindConfig) {
        if self.inner.started.load(Ordering::Acquire) {
            warn!(kind = name, "cannot register kinds after the cluster started");
            return;
        }
        self.inner
            .kinds
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(Kind::new(name, producer, config));
    }

    /// Spawn the agent and provider; the kind list freezes here
    pub fn start(&self) {
        if self.inner.started.swap(true, Ordering::AcqRel) {
            warn!(id = %self.inner.id, "cluster already started");
            return;
        }
        let agent = self.inner.engine.spawn_with(
            agent_producer(self.clone()),
            "cluster",
            Opts::default().with_id(self.inner.id.clone()),
        );
        let _ = self.inner.agent_pid.set(agent);

        let provider_producer = (self.inner.provider)(self.clone());
        let provider = self.inner.engine.spawn_with(
            provider_producer,
            "provider",
            Opts::default().with_id(self.inner.id.clone()),
        );
        let _ = self.inner.provider_pid.set(provider);
    }

    /// Poison the agent and provider and wait for both
    pub async fn stop(&self) {
        if let Some(agent) = self.inner.agent_pid.get() {
            self.inner.engine.poison(agent).done().await;
        }
        if let Some(provider) = self.inner.provider_pid.get() {
            self.inner.engine.poison(provider).done().await;
        }
    }

    /// Spawn a cluster-aware actor on this node
    ///
    /// The new pid is broadcast as an `Activation` so every agent learns of
    /// it, without going through the kind machinery.
    pub async fn spawn(&self, producer: Producer, kind: &str, opts: Opts) -> Pid {
        let pid = self.inner.engine.spawn_with(producer, kind, opts);
        for member in self.members().await {
            self.inner
                .engine
                .send(&member.agent_pid(), Activation { pid: pid.clone() });
        }
        pid
    }

    /// Activate a registered kind somewhere in the cluster
    ///
    /// Returns `None` when no member advertises the kind, the id is already
    /// activated, or the chosen activator fails; the reason is logged.
    pub async fn activate(&self, kind: &str, config: ActivationConfig) -> Option<Pid> {
        let agent = self.inner.agent_pid.get()?;
        let result = self
            .inner
            .engine
            .request(
                agent,
                Activate {
                    kind: kind.to_string(),
                    config,
                },
                self.inner.request_timeout,
            )
            .result()
            .await;
        match result {
            Ok(msg) => match msg.downcast_ref::<Option<Pid>>() {
                Some(pid) => pid.clone(),
                None => {
                    warn!("activation expected a pid response");
                    None
                }
            },
            Err(e) => {
                error!(err = %e, kind, "activation failed");
                None
            }
        }
    }

    /// Broadcast a deactivation for `pid` to every member
    pub fn deactivate(&self, pid: &Pid) {
        if let Some(agent) = self.inner.agent_pid.get() {
            self.inner.engine.send(agent, Deactivate { pid: pid.clone() });
        }
    }

    /// All members currently known to this node's agent
    pub async fn members(&self) -> Vec<Member> {
        let Some(agent) = self.inner.agent_pid.get() else {
            return Vec::new();
        };
        match self
            .inner
            .engine
            .request(agent, GetMembers, self.inner.request_timeout)
            .result()
            .await
        {
            Ok(msg) => msg.downcast_ref::<Vec<Member>>().cloned().unwrap_or_default(),
            Err(_) => Vec::new(),
        }
    }

    /// Whether `kind` is activatable anywhere in the cluster
    pub async fn has_kind(&self, name: &str) -> bool {
        let Some(agent) = self.inner.agent_pid.get() else {
            return false;
        };
        match self
            .inner
            .engine
            .request(agent, GetKinds, self.inner.request_timeout)
            .result()
            .await
        {
            Ok(msg) => msg
                .downcast_ref::<Vec<String>>()
                .is_some_and(|kinds| kinds.iter().any(|k| k == name)),
            Err(_) => false,
        }
    }

    /// Whether this node registered `kind` itself
    pub fn has_kind_local(&self, name: &str) -> bool {
        self.inner
            .kinds
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .any(|kind| kind.name == name)
    }

    /// Every activated pid whose kind prefix matches
    ///
    /// Never empty: with nothing activated this returns `vec![None]`, so
    /// callers can blindly iterate and send (a `None` send is simply
    /// skipped by the caller or becomes a dead letter downstream).
    pub async fn get_active_by_kind(&self, kind: &str) -> Vec<Option<Pid>> {
        let Some(agent) = self.inner.agent_pid.get() else {
            return vec![None];
        };
        match self
            .inner
            .engine
            .request(
                agent,
                GetActive::ByKind(kind.to_string()),
                self.inner.request_timeout,
            )
            .result()
            .await
        {
            Ok(msg) => match msg.downcast_ref::<Vec<Pid>>() {
                Some(pids) if !pids.is_empty() => pids.iter().cloned().map(Some).collect(),
                _ => vec![None],
            },
            Err(_) => vec![None],
        }
    }

    /// The full pid activated under `id`, when known
    pub async fn get_active_by_id(&self, id: &str) -> Option<Pid> {
        let agent = self.inner.agent_pid.get()?;
        match self
            .inner
            .engine
            .request(
                agent,
                GetActive::ById(id.to_string()),
                self.inner.request_timeout,
            )
            .result()
            .await
        {
            Ok(msg) => msg.downcast_ref::<Option<Pid>>().cloned().flatten(),
            Err(_) => None,
        }
    }

    /// This node's member card: identity, host, region, advertised kinds
    pub fn member(&self) -> Member {
        let kinds = self
            .inner
            .kinds
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(|kind| kind.name.clone())
            .collect();
        Member::new(
            self.inner.id.clone(),
            self.inner.engine.address(),
            self.inner.region.clone(),
            kinds,
        )
    }

    /// The engine driving this member
    pub fn engine(&self) -> &Engine {
        &self.inner.engine
    }

    /// This member's id
    pub fn id(&self) -> &str {
        &self.inner.id
    }

    /// This member's region
    pub fn region(&self) -> &str {
        &self.inner.region
    }

    /// This member's host address
    pub fn address(&self) -> &str {
        self.inner.engine.address()
    }

    /// Pid of this node's agent, once started
    pub fn pid(&self) -> Option<Pid> {
        self.inner.agent_pid.get().cloned()
    }

    pub(crate) fn request_timeout(&self) -> Duration {
        self.inner.request_timeout
    }

    pub(crate) fn kinds_snapshot(&self) -> Vec<Kind> {
        self.inner
            .kinds
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

fn random_listen_addr() -> String {
    format!("127.0.0.1:{}", rand::thread_rng().gen_range(10000..60000))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_random_listen_addr_in_range() {
        for _ in 0..16 {
            let addr = random_listen_addr();
            let port: u32 = addr.rsplit(':').next().unwrap().parse().unwrap();
            assert!((10000..60000).contains(&port));
        }
    }
}
