//! store::file
//!
//! JSON-file-backed resource store.
//!
//! # Architecture
//!
//! The file store is an [`InMemoryStore`] loaded from a JSON
//! [`StoreSnapshot`] and written back with [`JsonFileStore::persist`].
//! Mutations are only durable once persisted; a caller that executes a
//! transaction and then persists gets all-or-nothing durability, because
//! a rolled back transaction leaves the in-memory state untouched.
//!
//! An exclusive [`StateLock`] is held from `open` until drop, so two
//! processes cannot interleave transactions on the same state file.
//!
//! # Storage
//!
//! - `<path>` - pretty-printed JSON snapshot
//! - `<path>.lock` - lock file
//! - `<path>.tmp` - temp file used for atomic replacement

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use tracing::debug;

use super::memory::InMemoryStore;
use super::traits::{RelatedLink, ResourceQuery, ResourceStore, StoreError, StoreSnapshot};
use crate::core::lock::StateLock;
use crate::core::resource::{Resource, ResourceTypeRegistry};
use crate::core::types::{LinkType, ResourceId, TagName};

/// A resource store persisted as a JSON file.
#[derive(Debug)]
pub struct JsonFileStore {
    path: PathBuf,
    inner: InMemoryStore,
    _lock: StateLock,
}

impl JsonFileStore {
    /// Lock and load a state file.
    ///
    /// A missing file yields an empty store; it is created on the first
    /// [`persist`](Self::persist).
    ///
    /// # Errors
    ///
    /// - [`StoreError::Lock`] if another process holds the state
    /// - [`StoreError::ReadError`] / [`StoreError::ParseError`] for an
    ///   unreadable or malformed file
    pub fn open(path: &Path, types: ResourceTypeRegistry) -> Result<Self, StoreError> {
        let lock = StateLock::acquire(path)?;

        let inner = if path.exists() {
            let contents = fs::read_to_string(path).map_err(|e| StoreError::ReadError {
                path: path.to_path_buf(),
                source: e,
            })?;
            let snapshot: StoreSnapshot =
                serde_json::from_str(&contents).map_err(|e| StoreError::ParseError {
                    path: path.to_path_buf(),
                    message: e.to_string(),
                })?;
            debug!(path = %path.display(), resources = snapshot.resources.len(), "loaded state");
            InMemoryStore::from_snapshot(types, snapshot)?
        } else {
            debug!(path = %path.display(), "no state file yet, starting empty");
            InMemoryStore::new(types)
        };

        Ok(Self {
            path: path.to_path_buf(),
            inner,
            _lock: lock,
        })
    }

    /// Path of the state file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// The in-memory view.
    pub fn inner(&self) -> &InMemoryStore {
        &self.inner
    }

    /// Write the current state atomically.
    pub fn persist(&self) -> Result<(), StoreError> {
        let snapshot = self.inner.snapshot()?;
        let contents = serde_json::to_string_pretty(&snapshot)
            .map_err(|e| StoreError::SerializeError(e.to_string()))?;

        let temp_path = self.path.with_extension("tmp");
        let write_err = |path: &Path, e: std::io::Error| StoreError::WriteError {
            path: path.to_path_buf(),
            source: e,
        };

        let mut out = fs::File::create(&temp_path).map_err(|e| write_err(&temp_path, e))?;
        out.write_all(contents.as_bytes())
            .map_err(|e| write_err(&temp_path, e))?;
        out.sync_all().map_err(|e| write_err(&temp_path, e))?;
        fs::rename(&temp_path, &self.path).map_err(|e| write_err(&self.path, e))?;

        debug!(path = %self.path.display(), resources = snapshot.resources.len(), "persisted state");
        Ok(())
    }
}

impl ResourceStore for JsonFileStore {
    fn types(&self) -> &ResourceTypeRegistry {
        self.inner.types()
    }

    fn resource_find(&self, id: ResourceId) -> Result<Option<Resource>, StoreError> {
        self.inner.resource_find(id)
    }

    fn resource_find_by_primary_key(
        &self,
        resource: &Resource,
    ) -> Result<Option<Resource>, StoreError> {
        self.inner.resource_find_by_primary_key(resource)
    }

    fn resource_add(&mut self, resource: Resource) -> Result<Resource, StoreError> {
        self.inner.resource_add(resource)
    }

    fn resource_update(
        &mut self,
        previous_id: ResourceId,
        resource: Resource,
    ) -> Result<Resource, StoreError> {
        self.inner.resource_update(previous_id, resource)
    }

    fn resource_delete(&mut self, id: ResourceId) -> Result<bool, StoreError> {
        self.inner.resource_delete(id)
    }

    fn link_add(
        &mut self,
        from: ResourceId,
        link_type: &LinkType,
        to: ResourceId,
    ) -> Result<bool, StoreError> {
        self.inner.link_add(from, link_type, to)
    }

    fn link_delete(
        &mut self,
        from: ResourceId,
        link_type: &LinkType,
        to: ResourceId,
    ) -> Result<bool, StoreError> {
        self.inner.link_delete(from, link_type, to)
    }

    fn link_exists(
        &self,
        from: ResourceId,
        link_type: &LinkType,
        to: ResourceId,
    ) -> Result<bool, StoreError> {
        self.inner.link_exists(from, link_type, to)
    }

    fn tag_add(&mut self, resource: ResourceId, tag: &TagName) -> Result<bool, StoreError> {
        self.inner.tag_add(resource, tag)
    }

    fn tag_delete(&mut self, resource: ResourceId, tag: &TagName) -> Result<bool, StoreError> {
        self.inner.tag_delete(resource, tag)
    }

    fn tag_exists(&self, resource: ResourceId, tag: &TagName) -> Result<bool, StoreError> {
        self.inner.tag_exists(resource, tag)
    }

    fn link_find_all_related_by_resource(
        &self,
        id: ResourceId,
    ) -> Result<Vec<RelatedLink>, StoreError> {
        self.inner.link_find_all_related_by_resource(id)
    }

    fn link_find_all_by_from_resource_and_link_type(
        &self,
        from: ResourceId,
        link_type: &LinkType,
    ) -> Result<Vec<Resource>, StoreError> {
        self.inner
            .link_find_all_by_from_resource_and_link_type(from, link_type)
    }

    fn link_find_all_by_link_type_and_to_resource(
        &self,
        link_type: &LinkType,
        to: ResourceId,
    ) -> Result<Vec<Resource>, StoreError> {
        self.inner
            .link_find_all_by_link_type_and_to_resource(link_type, to)
    }

    fn tags_of(&self, id: ResourceId) -> Result<Vec<TagName>, StoreError> {
        self.inner.tags_of(id)
    }

    fn query(&self, query: &ResourceQuery) -> Result<Vec<Resource>, StoreError> {
        self.inner.query(query)
    }

    fn snapshot(&self) -> Result<StoreSnapshot, StoreError> {
        self.inner.snapshot()
    }

    fn restore(&mut self, snapshot: StoreSnapshot) -> Result<(), StoreError> {
        self.inner.restore(snapshot)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::resource::ResourceDescriptor;
    use crate::core::types::ResourceType;
    use tempfile::TempDir;

    fn types() -> ResourceTypeRegistry {
        ResourceTypeRegistry::new().with(ResourceDescriptor::new(
            ResourceType::new("Machine").unwrap(),
            ["name"],
        ))
    }

    fn machine(name: &str) -> Resource {
        Resource::new(ResourceType::new("Machine").unwrap()).with_property("name", name)
    }

    #[test]
    fn missing_file_opens_empty() {
        let temp = TempDir::new().unwrap();
        let store = JsonFileStore::open(&temp.path().join("state.json"), types()).unwrap();
        assert!(store.inner().is_empty());
    }

    #[test]
    fn persist_then_reopen() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("state.json");

        {
            let mut store = JsonFileStore::open(&path, types()).unwrap();
            let a = store.resource_add(machine("h1")).unwrap().id.unwrap();
            store
                .tag_add(a, &TagName::new("prod").unwrap())
                .unwrap();
            store.persist().unwrap();
        }

        let store = JsonFileStore::open(&path, types()).unwrap();
        assert_eq!(store.inner().len(), 1);
        let found = store.resource_find_by_primary_key(&machine("h1")).unwrap();
        let id = found.unwrap().id.unwrap();
        assert_eq!(store.tags_of(id).unwrap().len(), 1);
        assert!(!path.with_extension("tmp").exists());
    }

    #[test]
    fn second_open_is_locked_out() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("state.json");

        let _first = JsonFileStore::open(&path, types()).unwrap();
        assert!(matches!(
            JsonFileStore::open(&path, types()),
            Err(StoreError::Lock(_))
        ));
    }

    #[test]
    fn malformed_file_is_parse_error() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("state.json");
        fs::write(&path, "{ not json").unwrap();

        assert!(matches!(
            JsonFileStore::open(&path, types()),
            Err(StoreError::ParseError { .. })
        ));
    }
}
