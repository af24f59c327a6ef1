//! In-memory registry of repository entities.
//!
//! Entities are shared as `Arc<tokio::sync::Mutex<_>>` so one entity never
//! has two mutating operations in flight. The indices are guarded by a
//! std `RwLock` that is never held across an await point.

use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use indexmap::IndexMap;
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::debug;

use crate::domain::{Category, RepositoryEntity};

/// Shared handle to a registered entity.
pub type SharedEntity = Arc<Mutex<RepositoryEntity>>;

/// Errors from registry operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistryError {
    /// A repository with the same full name (any casing) is registered.
    #[error("Repository already registered: {0}")]
    AlreadyRegistered(String),

    /// Another repository already uses this id.
    #[error("Repository id {id} is already used by {full_name}")]
    IdInUse { id: String, full_name: String },

    /// No repository with this full name.
    #[error("Repository not found: {0}")]
    NotFound(String),
}

#[derive(Debug)]
struct Entry {
    handle: SharedEntity,
    full_name: String,
    category: Category,
    id: Option<String>,
}

#[derive(Debug, Default)]
struct Indices {
    /// Keyed by lowercase full name, in registration order.
    entries: IndexMap<String, Entry>,
    /// id to lowercase full name.
    by_id: HashMap<String, String>,
}

/// Registry of all known repositories.
#[derive(Debug, Default)]
pub struct Registry {
    indices: RwLock<Indices>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> RwLockReadGuard<'_, Indices> {
        self.indices.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, Indices> {
        self.indices.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Add an entity. Full names are unique case-insensitively and ids are
    /// unique once assigned.
    pub fn register(&self, entity: RepositoryEntity) -> Result<SharedEntity, RegistryError> {
        let key = entity.full_name().to_lowercase();
        let id = entity.data.id.clone();
        let full_name = entity.full_name().to_string();
        let category = entity.category();

        let mut indices = self.write();
        if indices.entries.contains_key(&key) {
            return Err(RegistryError::AlreadyRegistered(full_name));
        }
        if let Some(id) = &id {
            if let Some(owner) = indices.by_id.get(id) {
                return Err(RegistryError::IdInUse {
                    id: id.clone(),
                    full_name: owner.clone(),
                });
            }
            indices.by_id.insert(id.clone(), key.clone());
        }

        let handle = Arc::new(Mutex::new(entity));
        indices.entries.insert(
            key,
            Entry {
                handle: Arc::clone(&handle),
                full_name,
                category,
                id,
            },
        );
        Ok(handle)
    }

    pub fn get_by_id(&self, id: &str) -> Option<SharedEntity> {
        let indices = self.read();
        let key = indices.by_id.get(id)?;
        indices.entries.get(key).map(|e| Arc::clone(&e.handle))
    }

    /// Case-insensitive lookup.
    pub fn get_by_full_name(&self, full_name: &str) -> Option<SharedEntity> {
        self.read()
            .entries
            .get(&full_name.to_lowercase())
            .map(|e| Arc::clone(&e.handle))
    }

    pub fn is_registered_id(&self, id: &str) -> bool {
        self.read().by_id.contains_key(id)
    }

    pub fn is_registered(&self, full_name: &str) -> bool {
        self.read().entries.contains_key(&full_name.to_lowercase())
    }

    /// Current id of a registered repository.
    pub fn id_of(&self, full_name: &str) -> Option<String> {
        self.read()
            .entries
            .get(&full_name.to_lowercase())
            .and_then(|e| e.id.clone())
    }

    /// Give a registered repository a new id. The previous id, if any, is
    /// released.
    pub async fn rekey(&self, full_name: &str, new_id: &str) -> Result<(), RegistryError> {
        let key = full_name.to_lowercase();
        let handle = self
            .get_by_full_name(full_name)
            .ok_or_else(|| RegistryError::NotFound(full_name.to_string()))?;

        let mut entity = handle.lock().await;
        {
            let mut indices = self.write();
            if let Some(owner) = indices.by_id.get(new_id) {
                if *owner != key {
                    let owner = indices
                        .entries
                        .get(owner)
                        .map_or_else(|| owner.clone(), |e| e.full_name.clone());
                    return Err(RegistryError::IdInUse {
                        id: new_id.to_string(),
                        full_name: owner,
                    });
                }
            }

            let entry = indices
                .entries
                .get_mut(&key)
                .ok_or_else(|| RegistryError::NotFound(full_name.to_string()))?;
            let previous = entry.id.replace(new_id.to_string());
            if let Some(previous) = previous {
                if previous != new_id {
                    indices.by_id.remove(&previous);
                    debug!(full_name, previous = %previous, new_id, "Repository re-keyed");
                }
            }
            indices.by_id.insert(new_id.to_string(), key);
        }
        entity.data.id = Some(new_id.to_string());
        Ok(())
    }

    /// Remove a repository. Entities are only ever removed explicitly.
    pub fn remove(&self, full_name: &str) -> Option<SharedEntity> {
        let mut indices = self.write();
        let entry = indices.entries.shift_remove(&full_name.to_lowercase())?;
        if let Some(id) = &entry.id {
            indices.by_id.remove(id);
        }
        Some(entry.handle)
    }

    /// Every entity, in registration order.
    pub fn list_all(&self) -> Vec<SharedEntity> {
        self.read()
            .entries
            .values()
            .map(|e| Arc::clone(&e.handle))
            .collect()
    }

    pub fn list_by_category(&self, category: Category) -> Vec<SharedEntity> {
        self.read()
            .entries
            .values()
            .filter(|e| e.category == category)
            .map(|e| Arc::clone(&e.handle))
            .collect()
    }

    /// Installed entities whose category is in `categories`.
    pub async fn list_installed(&self, categories: &[Category]) -> Vec<SharedEntity> {
        let candidates: Vec<SharedEntity> = {
            let indices = self.read();
            indices
                .entries
                .values()
                .filter(|e| categories.contains(&e.category))
                .map(|e| Arc::clone(&e.handle))
                .collect()
        };

        let mut installed = Vec::new();
        for handle in candidates {
            if handle.lock().await.data.installed {
                installed.push(handle);
            }
        }
        installed
    }

    /// Full names, in registration order.
    pub fn full_names(&self) -> Vec<String> {
        self.read()
            .entries
            .values()
            .map(|e| e.full_name.clone())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.read().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.read().entries.is_empty()
    }

    /// Drop every entity.
    pub fn clear(&self) {
        let mut indices = self.write();
        indices.entries.clear();
        indices.by_id.clear();
    }

    /// Clones of every entity, in registration order.
    pub async fn snapshot(&self) -> Vec<RepositoryEntity> {
        let mut entities = Vec::new();
        for handle in self.list_all() {
            entities.push(handle.lock().await.clone());
        }
        entities
    }
}
