//! Dispatcher set definitions

use crate::error::DefinitionError;
use std::collections::HashSet;
use std::fmt;

/// Dispatcher set index as used in the exported list
pub type GroupId = u32;

pub const DEFAULT_NAMESPACE: &str = "default";
pub const DEFAULT_PORT: u16 = 5060;

/// Values used for the optional parts of a set definition
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DefinitionDefaults {
    pub namespace: String,
    pub port: u16,
}

impl Default for DefinitionDefaults {
    fn default() -> Self {
        Self {
            namespace: DEFAULT_NAMESPACE.to_string(),
            port: DEFAULT_PORT,
        }
    }
}

impl DefinitionDefaults {
    /// Read defaults from `POD_NAMESPACE` and `DISPATCHER_DEFAULT_PORT`
    pub fn from_env() -> Result<Self, DefinitionError> {
        let mut defaults = Self::default();

        if let Ok(ns) = std::env::var("POD_NAMESPACE") {
            if !ns.is_empty() {
                defaults.namespace = ns;
            }
        }

        if let Ok(port) = std::env::var("DISPATCHER_DEFAULT_PORT") {
            if !port.is_empty() {
                defaults.port = port
                    .parse()
                    .map_err(|_| DefinitionError::InvalidPort(port.clone()))?;
            }
        }

        Ok(defaults)
    }
}

/// GroupDefinition describes how the membership source of one set is built.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct GroupDefinition {
    pub id: GroupId,
    pub namespace: String,
    pub name: String,
    pub port: u16,
}

impl GroupDefinition {
    /// Parse a single `[namespace:]name=index[:port]` definition
    pub fn parse(raw: &str, defaults: &DefinitionDefaults) -> Result<Self, DefinitionError> {
        let raw = raw.trim();

        let (naming, index) = raw
            .split_once('=')
            .ok_or_else(|| DefinitionError::MissingIndex(raw.to_string()))?;

        let (namespace, name) = match naming.split_once(':') {
            Some((ns, name)) => (ns.to_string(), name),
            None => (defaults.namespace.clone(), naming),
        };
        if name.is_empty() {
            return Err(DefinitionError::EmptyName(raw.to_string()));
        }

        let (id, port) = match index.split_once(':') {
            Some((id, port)) => {
                let port = port
                    .parse()
                    .map_err(|_| DefinitionError::InvalidPort(port.to_string()))?;
                (id, port)
            }
            None => (index, defaults.port),
        };
        let id = id
            .parse()
            .map_err(|_| DefinitionError::InvalidIndex(id.to_string()))?;

        Ok(Self {
            id,
            namespace,
            name: name.to_string(),
            port,
        })
    }

    /// Parse a comma-delimited list of definitions
    pub fn parse_list(
        raw: &str,
        defaults: &DefinitionDefaults,
    ) -> Result<Vec<Self>, DefinitionError> {
        raw.split(',')
            .filter(|piece| !piece.trim().is_empty())
            .map(|piece| Self::parse(piece, defaults))
            .collect()
    }
}

impl fmt::Display for GroupDefinition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}={}:{}", self.namespace, self.name, self.id, self.port)
    }
}

/// Reject definitions that reuse a set index
pub fn ensure_unique(definitions: &[GroupDefinition]) -> Result<(), DefinitionError> {
    let mut seen = HashSet::new();
    for def in definitions {
        if !seen.insert(def.id) {
            return Err(DefinitionError::DuplicateIndex(def.id));
        }
    }
    Ok(())
}
