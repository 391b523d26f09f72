use crate::{
    AssociationDeclaration, AssociationName, AssociationRegistry, Cardinality, Entity, EntityId,
    EntityStore, EntityType, Result, RippleError,
};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tracing::{debug, warn};

/// Fetches related records through declared associations.
///
/// Every resolution yields a sequence: a `One` association gives zero or one
/// element. Associations already present in `Entity::loaded` never reach the store.
#[derive(Clone)]
pub struct AssociationResolver {
    registry: Arc<AssociationRegistry>,
    store: Arc<dyn EntityStore>,
}

impl AssociationResolver {
    pub fn new(registry: Arc<AssociationRegistry>, store: Arc<dyn EntityStore>) -> Self {
        Self { registry, store }
    }

    pub fn registry(&self) -> &Arc<AssociationRegistry> {
        &self.registry
    }

    pub fn store(&self) -> &Arc<dyn EntityStore> {
        &self.store
    }

    pub async fn resolve(&self, entity: &Entity, association: &AssociationName) -> Result<Vec<Entity>> {
        let decl = self.registry.declaration(&entity.entity_type, association)?;

        if let Some(loaded) = entity.loaded(association) {
            return Ok(loaded.to_vec());
        }

        let mut related = self
            .fetch_related(&entity.entity_type, std::slice::from_ref(&entity.id), decl)
            .await?;
        Ok(related.remove(&entity.id).unwrap_or_default())
    }

    /// Resolve one association for many sources of the same type in a single fetch.
    /// Every requested id is present in the returned map.
    pub async fn resolve_many(
        &self,
        entity_type: &EntityType,
        ids: &[EntityId],
        association: &AssociationName,
    ) -> Result<HashMap<EntityId, Vec<Entity>>> {
        let decl = self.registry.declaration(entity_type, association)?;
        if ids.is_empty() {
            return Ok(HashMap::new());
        }

        let mut related = self.fetch_related(entity_type, ids, decl).await?;
        for id in ids {
            related.entry(id.clone()).or_default();
        }
        Ok(related)
    }

    /// Populate `loaded` on every entity of `entity_type` for each association in
    /// `associations`, one batched fetch per association. Already loaded
    /// associations and entities of other types are left untouched.
    pub async fn preload(
        &self,
        entity_type: &EntityType,
        entities: &mut [Entity],
        associations: &[AssociationName],
    ) -> Result<()> {
        for association in associations {
            let mut seen = HashSet::new();
            let ids: Vec<EntityId> = entities
                .iter()
                .filter(|e| &e.entity_type == entity_type && !e.is_loaded(association))
                .filter(|e| seen.insert(e.id.clone()))
                .map(|e| e.id.clone())
                .collect();
            if ids.is_empty() {
                continue;
            }

            let related = self.resolve_many(entity_type, &ids, association).await?;
            for entity in entities
                .iter_mut()
                .filter(|e| &e.entity_type == entity_type && !e.is_loaded(association))
            {
                let targets = related.get(&entity.id).cloned().unwrap_or_default();
                entity.loaded.insert(association.clone(), targets);
            }
        }
        Ok(())
    }

    async fn fetch_related(
        &self,
        source_type: &EntityType,
        ids: &[EntityId],
        decl: &AssociationDeclaration,
    ) -> Result<HashMap<EntityId, Vec<Entity>>> {
        debug!(
            source = %source_type,
            association = %decl.name,
            sources = ids.len(),
            "fetching related records"
        );

        let related = self
            .store
            .fetch_related(source_type, ids, decl)
            .await
            .map_err(|err| err.into_ripple(source_type, Some(&decl.name)))?;

        if decl.cardinality == Cardinality::One {
            if let Some((id, targets)) = related.iter().find(|(_, targets)| targets.len() > 1) {
                warn!(
                    source = %source_type,
                    association = %decl.name,
                    "store returned several records for a singular association"
                );
                return Err(RippleError::ResolutionFailure(format!(
                    "{}#{} returned {} records for singular association {}",
                    source_type,
                    id,
                    targets.len(),
                    decl.name
                )));
            }
        }
        Ok(related)
    }
}
