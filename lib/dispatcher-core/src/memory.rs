//! In-memory membership source

use crate::{GroupId, MembershipSource, SourceError};
use async_trait::async_trait;
use std::sync::RwLock;
use tokio::sync::{mpsc, Mutex};

enum Change {
    Hosts(Vec<String>),
    Failed(SourceError),
}

/// MemorySource holds a host list that is replaced by pushing changes.
///
/// Pushed changes are applied by `watch`, one per call, in push order.
pub struct MemorySource {
    id: GroupId,
    hosts: RwLock<Vec<String>>,
    changes_tx: mpsc::UnboundedSender<Change>,
    changes_rx: Mutex<mpsc::UnboundedReceiver<Change>>,
}

impl MemorySource {
    pub fn new(id: GroupId, hosts: Vec<String>) -> Self {
        let (changes_tx, changes_rx) = mpsc::unbounded_channel();
        Self {
            id,
            hosts: RwLock::new(hosts),
            changes_tx,
            changes_rx: Mutex::new(changes_rx),
        }
    }

    /// Queue a new host list for the next `watch` call
    pub fn push_hosts(&self, hosts: Vec<String>) {
        let _ = self.changes_tx.send(Change::Hosts(hosts));
    }

    /// Queue an error for the next `watch` call
    pub fn push_error(&self, err: SourceError) {
        let _ = self.changes_tx.send(Change::Failed(err));
    }
}

#[async_trait]
impl MembershipSource for MemorySource {
    fn id(&self) -> GroupId {
        self.id
    }

    async fn update(&self) -> Result<(), SourceError> {
        Ok(())
    }

    async fn watch(&self) -> Result<(), SourceError> {
        let mut changes = self.changes_rx.lock().await;
        match changes.recv().await {
            Some(Change::Hosts(hosts)) => {
                *self.hosts.write().unwrap_or_else(|e| e.into_inner()) = hosts;
                Ok(())
            }
            Some(Change::Failed(err)) => Err(err),
            None => Err(SourceError::StreamClosed),
        }
    }

    fn export(&self) -> String {
        self.hosts()
            .iter()
            .map(|host| format!("{} sip:{}\n", self.id, host))
            .collect()
    }

    fn hosts(&self) -> Vec<String> {
        self.hosts.read().unwrap_or_else(|e| e.into_inner()).clone()
    }
}
