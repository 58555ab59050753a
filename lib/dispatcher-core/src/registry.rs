//! Set registry mapping dispatcher set indexes to their membership sources

use crate::error::DefinitionError;
use crate::{DispatcherError, GroupDefinition, GroupId, MembershipSource, Result, SourceFactory};
use std::collections::BTreeMap;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info};

/// SetRegistry owns the membership source of every configured set.
///
/// Sets are only added while the registry is exclusively owned; once it is
/// shared behind an `Arc` the key set is fixed.
pub struct SetRegistry {
    sets: BTreeMap<GroupId, Arc<dyn MembershipSource>>,
    output: PathBuf,
}

impl SetRegistry {
    /// Create an empty registry exporting to `output`
    pub fn new(output: impl Into<PathBuf>) -> Self {
        Self {
            sets: BTreeMap::new(),
            output: output.into(),
        }
    }

    /// Build the membership source for `definition` and register it
    pub async fn add(
        &mut self,
        definition: &GroupDefinition,
        factory: &dyn SourceFactory,
    ) -> Result<()> {
        if self.sets.contains_key(&definition.id) {
            return Err(DefinitionError::DuplicateIndex(definition.id).into());
        }

        let source = factory
            .create(definition)
            .await
            .map_err(|source| DispatcherError::SourceConstruction {
                id: definition.id,
                source,
            })?;

        info!("Added dispatcher set {}", definition);
        self.sets.insert(definition.id, source);
        Ok(())
    }

    /// Register an already constructed source
    pub fn insert(&mut self, source: Arc<dyn MembershipSource>) -> Result<()> {
        let id = source.id();
        if self.sets.contains_key(&id) {
            return Err(DefinitionError::DuplicateIndex(id).into());
        }
        self.sets.insert(id, source);
        Ok(())
    }

    /// Refresh every set once, stopping at the first failure.
    ///
    /// Sets refreshed before the failure keep their new snapshot.
    pub async fn update_all(&self) -> Result<()> {
        for (id, source) in &self.sets {
            source
                .update()
                .await
                .map_err(|source| DispatcherError::Update { id: *id, source })?;
            debug!("Updated dispatcher set {}", id);
        }
        Ok(())
    }

    /// Concatenated export of every set, in index order
    pub fn render(&self) -> String {
        self.sets.values().map(|source| source.export()).collect()
    }

    /// Write the rendered dispatcher list to the output file.
    ///
    /// The list is written to a sibling temporary file which then replaces
    /// the output, so readers see either the old or the new list.
    pub async fn export_all(&self) -> Result<()> {
        let contents = self.render();
        let tmp = temp_path(&self.output).map_err(|source| self.write_error(source))?;

        tokio::fs::write(&tmp, contents.as_bytes())
            .await
            .map_err(|source| self.write_error(source))?;
        tokio::fs::rename(&tmp, &self.output)
            .await
            .map_err(|source| self.write_error(source))?;

        debug!(
            "Exported {} dispatcher sets to {}",
            self.sets.len(),
            self.output.display()
        );
        Ok(())
    }

    /// Whether `addr` is a current member of set `id`; `None` for unknown sets
    pub fn is_member(&self, id: GroupId, addr: &str) -> Option<bool> {
        self.sets
            .get(&id)
            .map(|source| source.hosts().iter().any(|host| host == addr))
    }

    /// Iterate over all registered sources
    pub fn sources(&self) -> impl Iterator<Item = &Arc<dyn MembershipSource>> {
        self.sets.values()
    }

    pub fn output(&self) -> &Path {
        &self.output
    }

    pub fn len(&self) -> usize {
        self.sets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sets.is_empty()
    }

    fn write_error(&self, source: io::Error) -> DispatcherError {
        DispatcherError::Write {
            path: self.output.clone(),
            source,
        }
    }
}

fn temp_path(output: &Path) -> io::Result<PathBuf> {
    let name = output.file_name().ok_or_else(|| {
        io::Error::new(io::ErrorKind::InvalidInput, "output path has no file name")
    })?;
    let mut tmp_name = std::ffi::OsString::from(".");
    tmp_name.push(name);
    tmp_name.push(".tmp");
    Ok(output.with_file_name(tmp_name))
}
