use ripple_core::{AssociationName, Entity, EntityId, EntityType, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Association link between one source record and its target ids.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LinkRecord {
    pub entity_type: EntityType,
    pub id: EntityId,
    pub association: AssociationName,
    #[serde(default)]
    pub targets: Vec<EntityId>,
}

/// Fixture records loaded into a `MemoryStore`.
///
/// ```json
/// {
///   "entities": [{ "entity_type": "Author", "id": "1", "fields": { "name": "Paul" } }],
///   "links": [{ "entity_type": "Author", "id": "1", "association": "authorships", "targets": ["10"] }]
/// }
/// ```
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Dataset {
    #[serde(default)]
    pub entities: Vec<Entity>,
    #[serde(default)]
    pub links: Vec<LinkRecord>,
}

impl Dataset {
    pub fn from_json(content: &str) -> Result<Self> {
        Ok(serde_json::from_str(content)?)
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_json(&content)
    }
}
