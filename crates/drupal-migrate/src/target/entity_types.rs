//! Entity types known to the target store.

use crate::error::{MigrateError, Result};

/// Config entities have machine-name ids; content entities have serial ids.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntityKind {
    Config,
    Content,
}

/// Static metadata of one entity type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EntityTypeDef {
    /// Entity type id.
    pub id: &'static str,
    /// Config or content.
    pub kind: EntityKind,
    /// Property holding the entity id.
    pub id_key: &'static str,
    /// Property holding the bundle, for bundleable content entities.
    pub bundle_key: Option<&'static str>,
    /// Config entity type whose entities are this type's bundles.
    pub bundle_entity_type: Option<&'static str>,
}

impl EntityTypeDef {
    /// Whether ids are assigned by the store.
    pub fn auto_id(&self) -> bool {
        self.kind == EntityKind::Content
    }
}

const ENTITY_TYPES: &[EntityTypeDef] = &[
    EntityTypeDef {
        id: "node_type",
        kind: EntityKind::Config,
        id_key: "type",
        bundle_key: None,
        bundle_entity_type: None,
    },
    EntityTypeDef {
        id: "taxonomy_vocabulary",
        kind: EntityKind::Config,
        id_key: "vid",
        bundle_key: None,
        bundle_entity_type: None,
    },
    EntityTypeDef {
        id: "filter_format",
        kind: EntityKind::Config,
        id_key: "format",
        bundle_key: None,
        bundle_entity_type: None,
    },
    EntityTypeDef {
        id: "entity_view_display",
        kind: EntityKind::Config,
        id_key: "id",
        bundle_key: None,
        bundle_entity_type: None,
    },
    EntityTypeDef {
        id: "entity_form_display",
        kind: EntityKind::Config,
        id_key: "id",
        bundle_key: None,
        bundle_entity_type: None,
    },
    EntityTypeDef {
        id: "node",
        kind: EntityKind::Content,
        id_key: "nid",
        bundle_key: Some("type"),
        bundle_entity_type: Some("node_type"),
    },
    EntityTypeDef {
        id: "taxonomy_term",
        kind: EntityKind::Content,
        id_key: "tid",
        bundle_key: Some("vid"),
        bundle_entity_type: Some("taxonomy_vocabulary"),
    },
    EntityTypeDef {
        id: "path_alias",
        kind: EntityKind::Content,
        id_key: "id",
        bundle_key: None,
        bundle_entity_type: None,
    },
    EntityTypeDef {
        id: "user",
        kind: EntityKind::Content,
        id_key: "uid",
        bundle_key: None,
        bundle_entity_type: None,
    },
];

/// Look up an entity type definition.
pub fn entity_type(id: &str) -> Result<&'static EntityTypeDef> {
    ENTITY_TYPES
        .iter()
        .find(|def| def.id == id)
        .ok_or_else(|| MigrateError::Config(format!("Unknown entity type: {}", id)))
}

/// Every known entity type id.
pub fn entity_type_ids() -> Vec<&'static str> {
    ENTITY_TYPES.iter().map(|def| def.id).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lookup_by_id() {
        let term = entity_type("taxonomy_term").unwrap();
        assert_eq!(term.id_key, "tid");
        assert!(term.auto_id());
        assert!(!entity_type("node_type").unwrap().auto_id());
        assert!(entity_type("webform").is_err());
        assert!(entity_type_ids().contains(&"path_alias"));
    }
}
