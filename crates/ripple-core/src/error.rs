use thiserror::Error;

use crate::config::ConfigError;
use crate::types::{AssociationName, EntityId, EntityType};

#[derive(Error, Debug)]
pub enum RippleError {
    #[error("Unknown entity type: {0}")]
    UnknownEntityType(EntityType),

    #[error("Duplicate association name: {entity_type}.{association}")]
    DuplicateAssociationName {
        entity_type: EntityType,
        association: AssociationName,
    },

    #[error("Association not declared: {entity_type}.{association}")]
    AssociationNotDeclared {
        entity_type: EntityType,
        association: AssociationName,
    },

    /// `association` is the one being followed, or `None` for a direct record load.
    #[error("Target not found: {entity_type}#{id}{} ({detail})", via(.association))]
    TargetNotFound {
        entity_type: EntityType,
        id: EntityId,
        association: Option<AssociationName>,
        detail: String,
    },

    #[error("Resolution failure: {0}")]
    ResolutionFailure(String),

    #[error("Traversal limit exceeded: more than {limit} sources expanded")]
    TraversalLimitExceeded { limit: usize },

    #[error("Declaration error: {0}")]
    Declaration(#[from] toml::de::Error),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl RippleError {
    pub(crate) fn not_declared(
        entity_type: &EntityType,
        association: &AssociationName,
    ) -> Self {
        RippleError::AssociationNotDeclared {
            entity_type: entity_type.clone(),
            association: association.clone(),
        }
    }
}

/// Failure reported by the persistence collaborator.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// A stored reference points at a record that does not exist.
    #[error("broken reference from {entity_type}#{id}: {detail}")]
    BrokenReference {
        entity_type: EntityType,
        id: EntityId,
        detail: String,
    },

    /// Timeout, connectivity or any other transient failure.
    #[error("store unavailable: {0}")]
    Unavailable(String),
}

impl StoreError {
    /// Engine error for a failed load of `source_type` records, through
    /// `association` when one was being followed.
    pub(crate) fn into_ripple(
        self,
        source_type: &EntityType,
        association: Option<&AssociationName>,
    ) -> RippleError {
        match self {
            StoreError::BrokenReference {
                entity_type,
                id,
                detail,
            } => RippleError::TargetNotFound {
                entity_type,
                id,
                association: association.cloned(),
                detail,
            },
            StoreError::Unavailable(message) => RippleError::ResolutionFailure(match association {
                Some(name) => format!("{}.{}: {}", source_type, name, message),
                None => format!("loading {}: {}", source_type, message),
            }),
        }
    }
}

fn via(association: &Option<AssociationName>) -> String {
    association
        .as_ref()
        .map(|name| format!(" via {}", name))
        .unwrap_or_default()
}

pub type Result<T> = std::result::Result<T, RippleError>;
