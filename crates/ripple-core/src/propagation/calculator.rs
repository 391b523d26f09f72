use crate::{
    AssociationRegistry, AssociationResolver, EagerLoadPlanner, Entity, EntityKey, EntityType,
    LoadEvent, PropagationConfig, Result, RippleError,
};
use std::collections::HashSet;
use std::sync::Arc;
use tracing::debug;

/// Decides who must be re-derived when an entity changes.
#[derive(Clone)]
pub struct NotificationCalculator {
    resolver: AssociationResolver,
    planner: EagerLoadPlanner,
    max_sources: Option<usize>,
}

impl NotificationCalculator {
    pub fn new(resolver: AssociationResolver) -> Self {
        let planner = EagerLoadPlanner::new(resolver.clone());
        Self {
            resolver,
            planner,
            max_sources: None,
        }
    }

    pub fn with_config(mut self, config: &PropagationConfig) -> Self {
        self.max_sources = config.max_sources;
        self
    }

    pub fn registry(&self) -> &Arc<AssociationRegistry> {
        self.resolver.registry()
    }

    pub fn resolver(&self) -> &AssociationResolver {
        &self.resolver
    }

    pub fn planner(&self) -> &EagerLoadPlanner {
        &self.planner
    }

    /// True iff the entity's type declares at least one notify association.
    /// Answered from declarations alone; nothing is fetched.
    pub fn needs_to_notify(&self, entity: &Entity) -> Result<bool> {
        Ok(!self
            .registry()
            .notify_associations(&entity.entity_type)?
            .is_empty())
    }

    /// Targets of every notify association, in declaration order.
    pub async fn direct_notify_targets(&self, entity: &Entity) -> Result<Vec<Entity>> {
        let mut targets = Vec::new();
        for decl in self.registry().notify_associations(&entity.entity_type)? {
            targets.extend(self.resolver.resolve(entity, &decl.name).await?);
        }
        Ok(targets)
    }

    /// Everyone to notify for a change to `entity`, in discovery order.
    ///
    /// Sources are expanded breadth-first; each `(type, id)` is expanded at
    /// most once, so cyclic graphs terminate. A target reached from several
    /// sources is reported once, at its first occurrence.
    ///
    /// Only the changed entity is left out of the result. Any other entity
    /// that was expanded as a source is still reported when some source lists
    /// it as a notify target. Any error aborts the whole run.
    pub async fn propagate(&self, entity: &Entity) -> Result<Vec<Entity>> {
        let origin = entity.key();
        let mut visited: HashSet<EntityKey> = HashSet::new();
        let mut reported: HashSet<EntityKey> = HashSet::new();
        let mut result = Vec::new();
        let mut frontier = vec![entity.clone()];
        let mut depth = 0usize;

        while !frontier.is_empty() {
            let mut level: Vec<Entity> = frontier
                .drain(..)
                .filter(|e| visited.insert(e.key()))
                .collect();

            if let Some(limit) = self.max_sources {
                if visited.len() > limit {
                    return Err(RippleError::TraversalLimitExceeded { limit });
                }
            }

            debug!(depth, sources = level.len(), "expanding propagation level");
            self.preload_level(&mut level).await?;

            let mut next = Vec::new();
            for source in &level {
                for target in self.direct_notify_targets(source).await? {
                    let key = target.key();
                    if key != origin && reported.insert(key) {
                        result.push(target);
                    }
                }
                for decl in self.registry().dependent_associations(&source.entity_type)? {
                    next.extend(self.resolver.resolve(source, &decl.name).await?);
                }
            }

            frontier = next;
            depth += 1;
        }

        debug!(
            origin = %origin,
            expanded = visited.len(),
            targets = result.len(),
            "propagation finished"
        );
        Ok(result)
    }

    // One batched fetch per (type, association) for the whole level.
    async fn preload_level(&self, level: &mut [Entity]) -> Result<()> {
        let mut types: Vec<EntityType> = Vec::new();
        for entity in level.iter() {
            if !types.contains(&entity.entity_type) {
                types.push(entity.entity_type.clone());
            }
        }

        for entity_type in &types {
            let plan = self.planner.plan(entity_type, LoadEvent::OnNotify, &[])?;
            if plan.is_empty() {
                continue;
            }
            self.resolver.preload(entity_type, level, &plan).await?;
        }
        Ok(())
    }
}
