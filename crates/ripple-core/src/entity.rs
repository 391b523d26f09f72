use crate::{AssociationName, EntityId, EntityKey, EntityType};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// One record of a declared entity type.
///
/// Associations are never owned: `loaded` only caches sequences that were
/// resolved for this instance, keyed by association name.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Entity {
    pub entity_type: EntityType,
    pub id: EntityId,
    #[serde(default)]
    pub fields: serde_json::Map<String, serde_json::Value>,
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub loaded: HashMap<AssociationName, Vec<Entity>>,
}

impl Entity {
    pub fn new(entity_type: impl Into<EntityType>, id: impl Into<EntityId>) -> Self {
        Self {
            entity_type: entity_type.into(),
            id: id.into(),
            fields: serde_json::Map::new(),
            loaded: HashMap::new(),
        }
    }

    pub fn with_field(mut self, name: impl Into<String>, value: impl Into<serde_json::Value>) -> Self {
        self.fields.insert(name.into(), value.into());
        self
    }

    pub fn with_loaded(mut self, association: impl Into<AssociationName>, targets: Vec<Entity>) -> Self {
        self.loaded.insert(association.into(), targets);
        self
    }

    pub fn key(&self) -> EntityKey {
        EntityKey {
            entity_type: self.entity_type.clone(),
            id: self.id.clone(),
        }
    }

    /// Whether `association` has been resolved for this instance, even if empty.
    pub fn is_loaded(&self, association: &AssociationName) -> bool {
        self.loaded.contains_key(association)
    }

    pub fn loaded(&self, association: &AssociationName) -> Option<&[Entity]> {
        self.loaded.get(association).map(Vec::as_slice)
    }

    /// Copy of this record without any cached associations.
    pub fn detached(&self) -> Self {
        Self {
            entity_type: self.entity_type.clone(),
            id: self.id.clone(),
            fields: self.fields.clone(),
            loaded: HashMap::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_loaded_association_counts_as_loaded() {
        let author = Entity::new("Author", 1u64).with_loaded("affiliate", vec![]);
        assert!(author.is_loaded(&"affiliate".into()));
        assert!(!author.is_loaded(&"authorships".into()));
        assert_eq!(author.loaded(&"affiliate".into()), Some(&[][..]));
    }

    #[test]
    fn detached_drops_cached_associations() {
        let author = Entity::new("Author", 1u64)
            .with_field("name", "Paul Sorensen")
            .with_loaded("authorships", vec![Entity::new("Authorship", 7u64)]);
        let plain = author.detached();
        assert!(plain.loaded.is_empty());
        assert_eq!(plain.fields["name"], "Paul Sorensen");
        assert_eq!(plain.key(), EntityKey::new("Author", 1u64));
    }
}
