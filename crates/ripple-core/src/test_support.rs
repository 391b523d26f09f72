use crate::error::StoreError;
use crate::{
    AssociationDeclaration, AssociationRegistry, Entity, EntityId, EntityStore, EntityType,
};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Author/Authorship/Post schema shared by the unit tests.
pub(crate) fn blog_registry() -> AssociationRegistry {
    let mut registry = AssociationRegistry::new();
    registry
        .register(
            "Post",
            vec![
                AssociationDeclaration::many("authorships", "Authorship"),
                AssociationDeclaration::many("comments", "Comment"),
            ],
        )
        .unwrap();
    registry
        .register(
            "Author",
            vec![
                AssociationDeclaration::many("authorships", "Authorship")
                    .notify()
                    .dependent(),
                AssociationDeclaration::one("affiliate", "Affiliate"),
            ],
        )
        .unwrap();
    registry
        .register(
            "Authorship",
            vec![
                AssociationDeclaration::one("author", "Author").notify(),
                AssociationDeclaration::one("post", "Post").notify(),
            ],
        )
        .unwrap();
    registry
        .register("Comment", vec![AssociationDeclaration::one("post", "Post")])
        .unwrap();
    registry
        .register("Affiliate", vec![AssociationDeclaration::many("authors", "Author")])
        .unwrap();
    registry.validate().unwrap();
    registry
}

/// Store answering from canned links and counting every call.
#[derive(Default)]
pub(crate) struct ScriptedStore {
    entities: HashMap<(String, String), Entity>,
    links: HashMap<(String, String, String), Vec<Entity>>,
    failure: Option<StoreError>,
    calls: AtomicUsize,
    log: Mutex<Vec<String>>,
}

impl ScriptedStore {
    pub(crate) fn entity(mut self, entity: Entity) -> Self {
        self.entities.insert(
            (entity.entity_type.to_string(), entity.id.to_string()),
            entity,
        );
        self
    }

    pub(crate) fn link(mut self, source_type: &str, id: &str, association: &str, targets: Vec<Entity>) -> Self {
        self.links.insert(
            (source_type.to_string(), id.to_string(), association.to_string()),
            targets,
        );
        self
    }

    pub(crate) fn failing(mut self, err: StoreError) -> Self {
        self.failure = Some(err);
        self
    }

    pub(crate) fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// `Type.association[n]` per fetch_related call, in call order.
    pub(crate) fn log(&self) -> Vec<String> {
        self.log.lock().clone()
    }
}

#[async_trait]
impl EntityStore for ScriptedStore {
    async fn fetch(&self, entity_type: &EntityType, id: &EntityId) -> Result<Option<Entity>, StoreError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(err) = &self.failure {
            return Err(err.clone());
        }
        Ok(self
            .entities
            .get(&(entity_type.to_string(), id.to_string()))
            .cloned())
    }

    async fn fetch_related(
        &self,
        source_type: &EntityType,
        source_ids: &[EntityId],
        association: &AssociationDeclaration,
    ) -> Result<HashMap<EntityId, Vec<Entity>>, StoreError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.log
            .lock()
            .push(format!("{}.{}[{}]", source_type, association.name, source_ids.len()));
        if let Some(err) = &self.failure {
            return Err(err.clone());
        }

        let mut related = HashMap::new();
        for id in source_ids {
            let key = (
                source_type.to_string(),
                id.to_string(),
                association.name.to_string(),
            );
            if let Some(targets) = self.links.get(&key) {
                related.insert(id.clone(), targets.clone());
            }
        }
        Ok(related)
    }
}
