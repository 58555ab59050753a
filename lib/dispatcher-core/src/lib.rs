//! Core dispatcher set synchronization
//!
//! This library provides:
//! - Set definitions and the membership source / notifier seams
//! - The set registry with bulk update and export
//! - The reconciliation loop that exports and notifies on every change
//! - The process supervisor with crash-loop protection

pub mod definition;
pub mod error;
pub mod memory;
pub mod notifier;
pub mod reconciler;
pub mod registry;
pub mod source;
pub mod supervisor;

pub use definition::{DefinitionDefaults, GroupDefinition, GroupId};
pub use error::{DefinitionError, DispatcherError, NotifyError, Result, SourceError};
pub use memory::MemorySource;
pub use notifier::{schedule_renotify, Notifier};
pub use reconciler::{LoopExit, Reconciler};
pub use registry::SetRegistry;
pub use source::{MembershipSource, SourceFactory};
pub use supervisor::{RunAttempt, Supervisor, SupervisorOutcome, SupervisorState};
