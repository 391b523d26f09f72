use crate::{AssociationName, AssociationResolver, Entity, EntityId, EntityType, LoadEvent, Result};
use dashmap::DashMap;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::debug;

/// Ordered association names to eager-load for one entity type.
pub type LoadPlan = Vec<AssociationName>;

/// Computes and applies eager-load plans.
///
/// A plan depends only on static declarations, so the base plan for each
/// `(type, event)` is computed once and shared.
#[derive(Clone)]
pub struct EagerLoadPlanner {
    resolver: AssociationResolver,
    cache: Arc<DashMap<(EntityType, LoadEvent), Arc<[AssociationName]>>>,
}

impl EagerLoadPlanner {
    pub fn new(resolver: AssociationResolver) -> Self {
        Self {
            resolver,
            cache: Arc::new(DashMap::new()),
        }
    }

    /// Notify- and dependent-tagged association names for `entity_type`, in
    /// declaration order, minus anything in `skip`.
    pub fn plan(
        &self,
        entity_type: &EntityType,
        event: LoadEvent,
        skip: &[AssociationName],
    ) -> Result<LoadPlan> {
        let base = self.base_plan(entity_type, event)?;
        Ok(base
            .iter()
            .filter(|name| !skip.contains(name))
            .cloned()
            .collect())
    }

    /// Fetch `ids` with every association in `plan` populated, issuing one
    /// batched fetch per association. Unknown ids are omitted.
    pub async fn load_with_plan(
        &self,
        entity_type: &EntityType,
        ids: &[EntityId],
        plan: &[AssociationName],
    ) -> Result<Vec<Entity>> {
        let registry = self.resolver.registry();
        for name in plan {
            registry.declaration(entity_type, name)?;
        }

        let mut entities = self
            .resolver
            .store()
            .fetch_many(entity_type, ids)
            .await
            .map_err(|err| err.into_ripple(entity_type, None))?;
        if entities.len() < ids.len() {
            debug!(
                entity_type = %entity_type,
                requested = ids.len(),
                found = entities.len(),
                "some records were not found"
            );
        }

        self.resolver.preload(entity_type, &mut entities, plan).await?;
        Ok(entities)
    }

    fn base_plan(&self, entity_type: &EntityType, event: LoadEvent) -> Result<Arc<[AssociationName]>> {
        let key = (entity_type.clone(), event);
        if let Some(plan) = self.cache.get(&key) {
            return Ok(plan.value().clone());
        }

        let plan: Arc<[AssociationName]> = match event {
            LoadEvent::OnNotify => {
                let mut seen = HashSet::new();
                self.resolver
                    .registry()
                    .declarations_for(entity_type)?
                    .iter()
                    .filter(|d| d.is_notification_relevant())
                    .filter(|d| seen.insert(d.name.clone()))
                    .map(|d| d.name.clone())
                    .collect()
            }
        };
        self.cache.insert(key, plan.clone());
        Ok(plan)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{blog_registry, ScriptedStore};
    use crate::{RippleError, StoreError};

    fn planner(store: Arc<ScriptedStore>) -> EagerLoadPlanner {
        EagerLoadPlanner::new(AssociationResolver::new(Arc::new(blog_registry()), store))
    }

    #[test]
    fn plan_skips_the_association_we_arrived_through() {
        let planner = planner(Arc::new(ScriptedStore::default()));
        let plan = planner
            .plan(&"Authorship".into(), LoadEvent::OnNotify, &["post".into()])
            .unwrap();
        assert_eq!(plan, vec![AssociationName::from("author")]);

        let full = planner
            .plan(&"Authorship".into(), LoadEvent::OnNotify, &[])
            .unwrap();
        assert_eq!(full, vec![AssociationName::from("author"), AssociationName::from("post")]);
    }

    #[test]
    fn uninvolved_types_get_an_empty_plan() {
        let planner = planner(Arc::new(ScriptedStore::default()));
        assert!(planner
            .plan(&"Comment".into(), LoadEvent::OnNotify, &[])
            .unwrap()
            .is_empty());
        // affiliate carries no role, so it is never part of a plan
        assert_eq!(
            planner.plan(&"Author".into(), LoadEvent::OnNotify, &[]).unwrap(),
            vec![AssociationName::from("authorships")]
        );
    }

    #[test]
    fn plan_for_unregistered_type_fails() {
        let planner = planner(Arc::new(ScriptedStore::default()));
        assert!(matches!(
            planner.plan(&"Tag".into(), LoadEvent::OnNotify, &[]),
            Err(RippleError::UnknownEntityType(_))
        ));
    }

    #[test]
    fn base_plans_are_memoized() {
        let planner = planner(Arc::new(ScriptedStore::default()));
        planner.plan(&"Author".into(), LoadEvent::OnNotify, &[]).unwrap();
        planner
            .plan(&"Author".into(), LoadEvent::OnNotify, &["authorships".into()])
            .unwrap();
        assert_eq!(planner.cache.len(), 1);
    }

    #[tokio::test]
    async fn load_with_plan_batches_per_association() {
        let store = Arc::new(
            ScriptedStore::default()
                .entity(Entity::new("Authorship", 1u64))
                .entity(Entity::new("Authorship", 2u64))
                .link("Authorship", "1", "author", vec![Entity::new("Author", 5u64)])
                .link("Authorship", "2", "author", vec![Entity::new("Author", 6u64)]),
        );
        let planner = planner(store.clone());
        let plan = planner
            .plan(&"Authorship".into(), LoadEvent::OnNotify, &["post".into()])
            .unwrap();
        let ids: Vec<EntityId> = vec![1u64.into(), 2u64.into(), 3u64.into()];

        let loaded = planner
            .load_with_plan(&"Authorship".into(), &ids, &plan)
            .await
            .unwrap();

        assert_eq!(loaded.len(), 2);
        assert!(loaded.iter().all(|e| e.is_loaded(&"author".into())));
        assert!(loaded.iter().all(|e| !e.is_loaded(&"post".into())));
        assert_eq!(store.log(), vec!["Authorship.author[2]".to_string()]);
    }

    #[tokio::test]
    async fn load_with_undeclared_plan_entry_fails_before_fetching() {
        let store = Arc::new(ScriptedStore::default());
        let err = planner(store.clone())
            .load_with_plan(&"Authorship".into(), &[1u64.into()], &["editor".into()])
            .await
            .unwrap_err();
        assert!(matches!(err, RippleError::AssociationNotDeclared { .. }));
        assert_eq!(store.calls(), 0);
    }

    #[tokio::test]
    async fn record_load_failures_map_like_association_failures() {
        let store = Arc::new(ScriptedStore::default().failing(StoreError::BrokenReference {
            entity_type: "Authorship".into(),
            id: 1u64.into(),
            detail: "row points at a purged page".into(),
        }));
        let err = planner(store)
            .load_with_plan(&"Authorship".into(), &[1u64.into()], &[])
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            RippleError::TargetNotFound { association: None, ref id, .. } if id.as_str() == "1"
        ));

        let store = Arc::new(ScriptedStore::default().failing(StoreError::Unavailable(
            "connection reset".into(),
        )));
        let err = planner(store)
            .load_with_plan(&"Authorship".into(), &[1u64.into()], &[])
            .await
            .unwrap_err();
        assert!(matches!(err, RippleError::ResolutionFailure(msg) if msg.contains("connection reset")));
    }
}
