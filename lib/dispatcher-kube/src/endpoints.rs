//! Dispatcher sets backed by a Kubernetes `Endpoints` object

use async_trait::async_trait;
use dispatcher_core::{GroupDefinition, GroupId, MembershipSource, SourceError, SourceFactory};
use futures::stream::BoxStream;
use futures::StreamExt;
use k8s_openapi::api::core::v1::Endpoints;
use kube::{Api, Client};
use kube_runtime::watcher;
use std::sync::{Arc, RwLock};
use tokio::sync::Mutex;
use tracing::{debug, info};

type EndpointEvents = BoxStream<'static, Result<watcher::Event<Endpoints>, watcher::Error>>;

#[derive(Default)]
struct WatchState {
    events: Option<EndpointEvents>,
    // Hosts collected between Init and InitDone
    pending: Option<Vec<String>>,
}

/// EndpointsSet tracks the ready addresses of one named `Endpoints` object.
pub struct EndpointsSet {
    id: GroupId,
    namespace: String,
    name: String,
    port: u16,
    api: Api<Endpoints>,
    hosts: RwLock<Vec<String>>,
    watch: Mutex<WatchState>,
}

impl EndpointsSet {
    pub fn new(client: Client, definition: &GroupDefinition) -> Result<Self, SourceError> {
        if definition.name.is_empty() {
            return Err(SourceError::InvalidDefinition(format!(
                "set {} has no service name",
                definition.id
            )));
        }

        Ok(Self {
            id: definition.id,
            namespace: definition.namespace.clone(),
            name: definition.name.clone(),
            port: definition.port,
            api: Api::namespaced(client, &definition.namespace),
            hosts: RwLock::new(Vec::new()),
            watch: Mutex::new(WatchState::default()),
        })
    }

    fn open_events(&self) -> EndpointEvents {
        let config = watcher::Config::default().fields(&format!("metadata.name={}", self.name));
        watcher::watcher(self.api.clone(), config).boxed()
    }

    /// Swap in a new host list; returns whether it differed.
    fn replace_hosts(&self, hosts: Vec<String>) -> bool {
        let hosts = normalize(hosts);
        let mut current = self.hosts.write().unwrap_or_else(|e| e.into_inner());
        if *current == hosts {
            return false;
        }
        debug!(
            "Dispatcher set {} ({}/{}) now has {} hosts",
            self.id,
            self.namespace,
            self.name,
            hosts.len()
        );
        *current = hosts;
        true
    }
}

#[async_trait]
impl MembershipSource for EndpointsSet {
    fn id(&self) -> GroupId {
        self.id
    }

    async fn update(&self) -> Result<(), SourceError> {
        let endpoints = self.api.get_opt(&self.name).await.map_err(SourceError::backend)?;
        let hosts = endpoints.as_ref().map(ready_hosts).unwrap_or_default();
        self.replace_hosts(hosts);
        Ok(())
    }

    async fn watch(&self) -> Result<(), SourceError> {
        let mut state = self.watch.lock().await;
        let WatchState { events, pending } = &mut *state;
        let stream = events.get_or_insert_with(|| self.open_events());

        while let Some(event) = stream.next().await {
            let hosts = match event.map_err(SourceError::backend)? {
                watcher::Event::Apply(endpoints) => ready_hosts(&endpoints),
                watcher::Event::Delete(_) => Vec::new(),
                watcher::Event::Init => {
                    *pending = Some(Vec::new());
                    continue;
                }
                watcher::Event::InitApply(endpoints) => {
                    *pending = Some(ready_hosts(&endpoints));
                    continue;
                }
                watcher::Event::InitDone => pending.take().unwrap_or_default(),
            };

            if self.replace_hosts(hosts) {
                return Ok(());
            }
        }

        info!(
            "Endpoints watch for {}/{} closed",
            self.namespace, self.name
        );
        *events = None;
        Err(SourceError::StreamClosed)
    }

    fn export(&self) -> String {
        render(self.id, self.port, &self.hosts())
    }

    fn hosts(&self) -> Vec<String> {
        self.hosts.read().unwrap_or_else(|e| e.into_inner()).clone()
    }
}

/// Builds an `EndpointsSet` per definition from a shared client
pub struct EndpointsSetFactory {
    client: Client,
}

impl EndpointsSetFactory {
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl SourceFactory for EndpointsSetFactory {
    async fn create(
        &self,
        definition: &GroupDefinition,
    ) -> Result<Arc<dyn MembershipSource>, SourceError> {
        let set = EndpointsSet::new(self.client.clone(), definition)?;
        Ok(Arc::new(set))
    }
}

/// Ready addresses of every subset
fn ready_hosts(endpoints: &Endpoints) -> Vec<String> {
    endpoints
        .subsets
        .iter()
        .flatten()
        .flat_map(|subset| subset.addresses.iter().flatten())
        .map(|address| address.ip.clone())
        .collect()
}

fn normalize(mut hosts: Vec<String>) -> Vec<String> {
    hosts.sort();
    hosts.dedup();
    hosts
}

/// Dispatcher list lines for a set: `<id> sip:<host>:<port>`
fn render(id: GroupId, port: u16, hosts: &[String]) -> String {
    hosts
        .iter()
        .map(|host| format!("{} sip:{}:{}\n", id, host, port))
        .collect()
}
