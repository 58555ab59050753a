use crate::GroupId;
use std::path::PathBuf;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, DispatcherError>;

/// Boxed error from a backing membership source or transport
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Errors reported by a membership source
#[derive(Error, Debug)]
pub enum SourceError {
    /// The watch connection ended; the watcher re-establishes it.
    #[error("watch stream closed")]
    StreamClosed,

    #[error("invalid source definition: {0}")]
    InvalidDefinition(String),

    #[error("membership backend error: {0}")]
    Backend(#[source] BoxError),
}

impl SourceError {
    pub fn backend<E>(err: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        SourceError::Backend(Box::new(err))
    }
}

/// Errors reported by the reload notifier
#[derive(Error, Debug)]
pub enum NotifyError {
    #[error("failed to resolve RPC address {0}")]
    Resolve(String),

    #[error("failed to send reload request: {0}")]
    Send(#[from] std::io::Error),

    #[error("failed to encode reload request: {0}")]
    Encode(String),
}

/// Errors parsing a set definition
#[derive(Error, Debug, PartialEq, Eq)]
pub enum DefinitionError {
    #[error("failed to parse {0} as the form [namespace:]name=index[:port]")]
    MissingIndex(String),

    #[error("empty set name in {0}")]
    EmptyName(String),

    #[error("failed to parse index {0:?} as an integer")]
    InvalidIndex(String),

    #[error("failed to parse port {0:?} as a port number")]
    InvalidPort(String),

    #[error("duplicate set index {0}")]
    DuplicateIndex(GroupId),
}

#[derive(Error, Debug)]
pub enum DispatcherError {
    #[error("failed to create dispatcher set {id}: {source}")]
    SourceConstruction {
        id: GroupId,
        #[source]
        source: SourceError,
    },

    #[error("invalid set definition: {0}")]
    InvalidDefinition(#[from] DefinitionError),

    #[error("failed to update dispatcher set {id}: {source}")]
    Update {
        id: GroupId,
        #[source]
        source: SourceError,
    },

    #[error("error maintaining sets: {0}")]
    Watch(#[source] SourceError),

    #[error("failed to write dispatcher file {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to notify proxy of update: {0}")]
    Notify(#[from] NotifyError),

    #[error("failed to listen on {addr}: {source}")]
    Listen {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    #[error("all dispatcher set watchers stopped")]
    WatchersStopped,
}

impl DispatcherError {
    /// Fatal errors stop the process without being counted as short failures.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            DispatcherError::SourceConstruction { .. } | DispatcherError::InvalidDefinition(_)
        )
    }
}
