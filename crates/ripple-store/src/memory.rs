use async_trait::async_trait;
use parking_lot::RwLock;
use ripple_core::{
    AssociationDeclaration, AssociationName, Entity, EntityId, EntityKey, EntityStore, EntityType,
    StoreError,
};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use tracing::debug;

use crate::Dataset;

/// Entity store held entirely in memory.
///
/// Every trait call counts as one round-trip, which lets tests assert how
/// many fetches a propagation run issued.
#[derive(Default)]
pub struct MemoryStore {
    entities: RwLock<HashMap<EntityKey, Entity>>,
    links: RwLock<HashMap<(EntityKey, AssociationName), Vec<EntityId>>>,
    round_trips: AtomicUsize,
    unavailable: AtomicBool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_dataset(dataset: &Dataset) -> Self {
        let store = Self::new();
        for entity in &dataset.entities {
            store.insert(entity.clone());
        }
        for link in &dataset.links {
            store.link(
                EntityKey::new(link.entity_type.clone(), link.id.clone()),
                link.association.clone(),
                link.targets.clone(),
            );
        }
        debug!(
            entities = dataset.entities.len(),
            links = dataset.links.len(),
            "loaded dataset into memory store"
        );
        store
    }

    /// Insert or replace a record. Cached associations are not stored.
    pub fn insert(&self, entity: Entity) {
        let entity = entity.detached();
        self.entities.write().insert(entity.key(), entity);
    }

    /// Set the target ids of `association` on `source`, replacing any previous link.
    pub fn link(&self, source: EntityKey, association: impl Into<AssociationName>, targets: Vec<EntityId>) {
        self.links.write().insert((source, association.into()), targets);
    }

    /// Remove a record and its outgoing links. Links pointing at it stay
    /// behind and surface as broken references.
    pub fn delete(&self, key: &EntityKey) -> Option<Entity> {
        self.links.write().retain(|(source, _), _| source != key);
        self.entities.write().remove(key)
    }

    pub fn get(&self, key: &EntityKey) -> Option<Entity> {
        self.entities.read().get(key).cloned()
    }

    pub fn len(&self) -> usize {
        self.entities.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entities.read().is_empty()
    }

    /// Number of store round-trips since creation or the last reset.
    pub fn fetch_count(&self) -> usize {
        self.round_trips.load(Ordering::SeqCst)
    }

    pub fn reset_counts(&self) {
        self.round_trips.store(0, Ordering::SeqCst);
    }

    /// Make every call fail with `StoreError::Unavailable` until switched back.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    fn round_trip(&self) -> Result<(), StoreError> {
        self.round_trips.fetch_add(1, Ordering::SeqCst);
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("memory store switched off".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl EntityStore for MemoryStore {
    async fn fetch(&self, entity_type: &EntityType, id: &EntityId) -> Result<Option<Entity>, StoreError> {
        self.round_trip()?;
        Ok(self.get(&EntityKey::new(entity_type.clone(), id.clone())))
    }

    async fn fetch_many(&self, entity_type: &EntityType, ids: &[EntityId]) -> Result<Vec<Entity>, StoreError> {
        self.round_trip()?;
        let entities = self.entities.read();
        Ok(ids
            .iter()
            .filter_map(|id| entities.get(&EntityKey::new(entity_type.clone(), id.clone())))
            .cloned()
            .collect())
    }

    async fn fetch_related(
        &self,
        source_type: &EntityType,
        source_ids: &[EntityId],
        association: &AssociationDeclaration,
    ) -> Result<HashMap<EntityId, Vec<Entity>>, StoreError> {
        self.round_trip()?;
        let entities = self.entities.read();
        let links = self.links.read();

        let mut related = HashMap::with_capacity(source_ids.len());
        for id in source_ids {
            let source = EntityKey::new(source_type.clone(), id.clone());
            let Some(target_ids) = links.get(&(source, association.name.clone())) else {
                continue;
            };

            let mut targets = Vec::with_capacity(target_ids.len());
            for target_id in target_ids {
                let target_key = EntityKey::new(association.target_type.clone(), target_id.clone());
                match entities.get(&target_key) {
                    Some(target) => targets.push(target.clone()),
                    None => {
                        return Err(StoreError::BrokenReference {
                            entity_type: source_type.clone(),
                            id: id.clone(),
                            detail: format!("{} does not exist", target_key),
                        })
                    }
                }
            }
            related.insert(id.clone(), targets);
        }
        Ok(related)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn decl() -> AssociationDeclaration {
        AssociationDeclaration::many("authorships", "Authorship")
    }

    #[tokio::test]
    async fn related_records_resolve_by_target_type() {
        let store = MemoryStore::new();
        store.insert(Entity::new("Author", 1u64));
        store.insert(Entity::new("Authorship", 10u64));
        store.link(EntityKey::new("Author", 1u64), "authorships", vec![10u64.into()]);

        let related = store
            .fetch_related(&"Author".into(), &[1u64.into(), 2u64.into()], &decl())
            .await
            .unwrap();
        assert_eq!(related.len(), 1);
        assert_eq!(related[&EntityId::from(1u64)], vec![Entity::new("Authorship", 10u64)]);
        assert_eq!(store.fetch_count(), 1);
    }

    #[tokio::test]
    async fn dangling_link_is_a_broken_reference() {
        let store = MemoryStore::new();
        store.insert(Entity::new("Author", 1u64));
        store.link(EntityKey::new("Author", 1u64), "authorships", vec![99u64.into()]);

        let err = store
            .fetch_related(&"Author".into(), &[1u64.into()], &decl())
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::BrokenReference { .. }));
    }

    #[tokio::test]
    async fn delete_drops_outgoing_links_only() {
        let store = MemoryStore::new();
        store.insert(Entity::new("Author", 1u64));
        store.insert(Entity::new("Authorship", 10u64));
        store.link(EntityKey::new("Author", 1u64), "authorships", vec![10u64.into()]);

        assert!(store.delete(&EntityKey::new("Author", 1u64)).is_some());
        let related = store
            .fetch_related(&"Author".into(), &[1u64.into()], &decl())
            .await
            .unwrap();
        assert!(related.is_empty());
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn unavailable_store_fails_every_call() {
        let store = MemoryStore::new();
        store.set_unavailable(true);
        let err = tokio_test::block_on(store.fetch(&"Author".into(), &1u64.into())).unwrap_err();
        assert!(matches!(err, StoreError::Unavailable(_)));

        store.set_unavailable(false);
        store.reset_counts();
        assert!(tokio_test::block_on(store.fetch(&"Author".into(), &1u64.into()))
            .unwrap()
            .is_none());
        assert_eq!(store.fetch_count(), 1);
    }
}
