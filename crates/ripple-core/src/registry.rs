//! Static association metadata, declared once per entity type.
//!
//! The registry is assembled through `&mut self` during start-up and then
//! shared as `Arc<AssociationRegistry>`; nothing mutates it afterwards.

use crate::{AssociationName, Cardinality, EntityType, Result, RippleError, Role};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap, HashSet};
use std::path::Path;
use tracing::debug;

/// One named association of an entity type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssociationDeclaration {
    pub name: AssociationName,
    #[serde(rename = "target")]
    pub target_type: EntityType,
    pub cardinality: Cardinality,
    #[serde(default)]
    pub roles: BTreeSet<Role>,
}

impl AssociationDeclaration {
    pub fn new(
        name: impl Into<AssociationName>,
        target_type: impl Into<EntityType>,
        cardinality: Cardinality,
    ) -> Self {
        Self {
            name: name.into(),
            target_type: target_type.into(),
            cardinality,
            roles: BTreeSet::new(),
        }
    }

    /// Singular association (`belongs to` / `has one`).
    pub fn one(name: impl Into<AssociationName>, target_type: impl Into<EntityType>) -> Self {
        Self::new(name, target_type, Cardinality::One)
    }

    /// Collection association (`has many`).
    pub fn many(name: impl Into<AssociationName>, target_type: impl Into<EntityType>) -> Self {
        Self::new(name, target_type, Cardinality::Many)
    }

    pub fn notify(mut self) -> Self {
        self.roles.insert(Role::Notify);
        self
    }

    pub fn dependent(mut self) -> Self {
        self.roles.insert(Role::Dependent);
        self
    }

    pub fn has_role(&self, role: Role) -> bool {
        self.roles.contains(&role)
    }

    /// Whether propagation ever needs to traverse this association.
    pub fn is_notification_relevant(&self) -> bool {
        !self.roles.is_empty()
    }
}

/// Declarations for one entity type as written in a declaration file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EntityDeclaration {
    pub name: EntityType,
    #[serde(default)]
    pub associations: Vec<AssociationDeclaration>,
}

/// Top-level declaration document.
///
/// ```toml
/// [[entity]]
/// name = "Author"
///
/// [[entity.associations]]
/// name = "authorships"
/// target = "Authorship"
/// cardinality = "many"
/// roles = ["notify", "dependent"]
/// ```
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DeclarationFile {
    #[serde(default, rename = "entity")]
    pub entities: Vec<EntityDeclaration>,
}

impl DeclarationFile {
    pub fn from_toml(content: &str) -> Result<Self> {
        Ok(toml::from_str(content)?)
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml(&content)
    }
}

#[derive(Debug, Default)]
pub struct AssociationRegistry {
    types: HashMap<EntityType, Vec<AssociationDeclaration>>,
}

impl AssociationRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build and validate a registry from a parsed declaration document.
    pub fn from_declarations(file: &DeclarationFile) -> Result<Self> {
        let mut registry = Self::new();
        for entity in &file.entities {
            registry.register(entity.name.clone(), entity.associations.clone())?;
        }
        registry.validate()?;
        Ok(registry)
    }

    /// Register `declarations` for `entity_type`.
    ///
    /// Repeating an identical declaration is a no-op; reusing a name with a
    /// different declaration fails. New names keep their declaration order.
    pub fn register(
        &mut self,
        entity_type: impl Into<EntityType>,
        declarations: Vec<AssociationDeclaration>,
    ) -> Result<()> {
        let entity_type = entity_type.into();

        let mut seen = HashSet::with_capacity(declarations.len());
        for decl in &declarations {
            if !seen.insert(&decl.name) {
                return Err(RippleError::DuplicateAssociationName {
                    entity_type,
                    association: decl.name.clone(),
                });
            }
        }

        let existing = self.types.entry(entity_type.clone()).or_default();
        for decl in &declarations {
            if let Some(current) = existing.iter().find(|d| d.name == decl.name) {
                if current != decl {
                    return Err(RippleError::DuplicateAssociationName {
                        entity_type,
                        association: decl.name.clone(),
                    });
                }
            }
        }

        for decl in declarations {
            if !existing.iter().any(|d| d.name == decl.name) {
                existing.push(decl);
            }
        }

        debug!(
            entity_type = %entity_type,
            associations = existing.len(),
            "registered entity type"
        );
        Ok(())
    }

    /// Check that every association target is itself a registered type.
    pub fn validate(&self) -> Result<()> {
        let mut names: Vec<&EntityType> = self.types.keys().collect();
        names.sort();
        for name in names {
            for decl in &self.types[name] {
                if !self.types.contains_key(&decl.target_type) {
                    return Err(RippleError::UnknownEntityType(decl.target_type.clone()));
                }
            }
        }
        Ok(())
    }

    pub fn is_registered(&self, entity_type: &EntityType) -> bool {
        self.types.contains_key(entity_type)
    }

    pub fn entity_types(&self) -> impl Iterator<Item = &EntityType> {
        self.types.keys()
    }

    pub fn declarations_for(&self, entity_type: &EntityType) -> Result<&[AssociationDeclaration]> {
        self.types
            .get(entity_type)
            .map(Vec::as_slice)
            .ok_or_else(|| RippleError::UnknownEntityType(entity_type.clone()))
    }

    pub fn declaration(
        &self,
        entity_type: &EntityType,
        association: &AssociationName,
    ) -> Result<&AssociationDeclaration> {
        self.declarations_for(entity_type)?
            .iter()
            .find(|d| &d.name == association)
            .ok_or_else(|| RippleError::not_declared(entity_type, association))
    }

    pub fn notify_associations(&self, entity_type: &EntityType) -> Result<Vec<&AssociationDeclaration>> {
        self.with_role(entity_type, Role::Notify)
    }

    pub fn dependent_associations(
        &self,
        entity_type: &EntityType,
    ) -> Result<Vec<&AssociationDeclaration>> {
        self.with_role(entity_type, Role::Dependent)
    }

    pub fn notify_association_names(&self, entity_type: &EntityType) -> Result<Vec<AssociationName>> {
        Ok(names(self.notify_associations(entity_type)?))
    }

    pub fn dependent_association_names(
        &self,
        entity_type: &EntityType,
    ) -> Result<Vec<AssociationName>> {
        Ok(names(self.dependent_associations(entity_type)?))
    }

    fn with_role(&self, entity_type: &EntityType, role: Role) -> Result<Vec<&AssociationDeclaration>> {
        Ok(self
            .declarations_for(entity_type)?
            .iter()
            .filter(|d| d.has_role(role))
            .collect())
    }
}

fn names(decls: Vec<&AssociationDeclaration>) -> Vec<AssociationName> {
    decls.into_iter().map(|d| d.name.clone()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn blog() -> AssociationRegistry {
        let mut registry = AssociationRegistry::new();
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
        registry.register("Post", vec![]).unwrap();
        registry.register("Affiliate", vec![]).unwrap();
        registry
    }

    #[test]
    fn role_filters_follow_declaration_order() {
        let registry = blog();
        let author: EntityType = "Author".into();

        assert_eq!(
            registry.dependent_association_names(&author).unwrap(),
            vec![AssociationName::from("authorships")]
        );
        let notify = registry
            .notify_association_names(&"Authorship".into())
            .unwrap();
        let expected: Vec<AssociationName> = vec!["author".into(), "post".into()];
        assert_eq!(notify, expected);
        assert!(registry
            .dependent_associations(&"Post".into())
            .unwrap()
            .is_empty());
    }

    #[test]
    fn unknown_type_is_an_error() {
        let registry = blog();
        assert!(registry.is_registered(&"Author".into()));
        assert!(!registry.is_registered(&"Comment".into()));
        let err = registry.notify_associations(&"Comment".into()).unwrap_err();
        assert!(matches!(err, RippleError::UnknownEntityType(t) if t.as_str() == "Comment"));
    }

    #[test]
    fn duplicate_name_in_one_registration_fails() {
        let mut registry = AssociationRegistry::new();
        let err = registry
            .register(
                "Post",
                vec![
                    AssociationDeclaration::many("comments", "Comment"),
                    AssociationDeclaration::many("comments", "Comment").notify(),
                ],
            )
            .unwrap_err();
        assert!(matches!(err, RippleError::DuplicateAssociationName { .. }));
    }

    #[test]
    fn re_registration_is_idempotent_but_rejects_conflicts() {
        let mut registry = blog();
        registry
            .register(
                "Authorship",
                vec![AssociationDeclaration::one("post", "Post").notify()],
            )
            .unwrap();
        assert_eq!(registry.declarations_for(&"Authorship".into()).unwrap().len(), 2);

        let err = registry
            .register(
                "Authorship",
                vec![AssociationDeclaration::many("post", "Post")],
            )
            .unwrap_err();
        match err {
            RippleError::DuplicateAssociationName {
                entity_type,
                association,
            } => {
                assert_eq!(entity_type.as_str(), "Authorship");
                assert_eq!(association.as_str(), "post");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn validate_rejects_dangling_targets() {
        let mut registry = AssociationRegistry::new();
        registry
            .register("Post", vec![AssociationDeclaration::many("comments", "Comment")])
            .unwrap();
        assert!(matches!(
            registry.validate(),
            Err(RippleError::UnknownEntityType(t)) if t.as_str() == "Comment"
        ));
        assert!(blog().validate().is_ok());
    }

    #[test]
    fn declaration_lookup_reports_undeclared_names() {
        let registry = blog();
        let err = registry
            .declaration(&"Author".into(), &"posts".into())
            .unwrap_err();
        assert!(matches!(err, RippleError::AssociationNotDeclared { .. }));
    }

    #[test]
    fn parses_toml_declarations() {
        let doc = r#"
            [[entity]]
            name = "Author"

            [[entity.associations]]
            name = "authorships"
            target = "Authorship"
            cardinality = "many"
            roles = ["notify", "dependent"]

            [[entity]]
            name = "Authorship"
        "#;
        let file = DeclarationFile::from_toml(doc).unwrap();
        let registry = AssociationRegistry::from_declarations(&file).unwrap();
        let decl = registry
            .declaration(&"Author".into(), &"authorships".into())
            .unwrap();
        assert_eq!(decl.cardinality, Cardinality::Many);
        assert!(decl.has_role(Role::Notify) && decl.has_role(Role::Dependent));
    }

    #[test]
    fn unknown_role_fails_to_parse() {
        let doc = r#"
            [[entity]]
            name = "Post"

            [[entity.associations]]
            name = "comments"
            target = "Post"
            cardinality = "many"
            roles = ["reindex"]
        "#;
        assert!(matches!(
            DeclarationFile::from_toml(doc),
            Err(RippleError::Declaration(_))
        ));
    }

    #[test]
    fn registry_is_shareable_across_threads() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<AssociationRegistry>();
    }
}
