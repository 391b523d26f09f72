use crate::error::StoreError;
use crate::{AssociationDeclaration, Entity, EntityId, EntityType, Notification};
use async_trait::async_trait;
use std::collections::HashMap;

/// Persistence collaborator consumed by the resolver and planner.
#[async_trait]
pub trait EntityStore: Send + Sync {
    async fn fetch(
        &self,
        entity_type: &EntityType,
        id: &EntityId,
    ) -> Result<Option<Entity>, StoreError>;

    /// Fetch several records of one type. Missing ids are omitted; the
    /// default issues one `fetch` per id.
    async fn fetch_many(
        &self,
        entity_type: &EntityType,
        ids: &[EntityId],
    ) -> Result<Vec<Entity>, StoreError> {
        let mut found = Vec::with_capacity(ids.len());
        for id in ids {
            if let Some(entity) = self.fetch(entity_type, id).await? {
                found.push(entity);
            }
        }
        Ok(found)
    }

    /// Related records for every source id via one association, in one round-trip.
    /// Sources without related records may be absent from the map.
    async fn fetch_related(
        &self,
        source_type: &EntityType,
        source_ids: &[EntityId],
        association: &AssociationDeclaration,
    ) -> Result<HashMap<EntityId, Vec<Entity>>, StoreError>;
}

/// Receiver of the records that need re-derivation after a change.
pub trait NotificationConsumer: Send + Sync {
    fn notify(&self, notification: &Notification);
}
