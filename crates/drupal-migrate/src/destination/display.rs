//! Destinations that merge into entity view/form displays:
//! `component_entity_display`, `component_entity_form_display` and
//! `field_group`.
//!
//! A display is addressed by `(entity_type, bundle, mode)` and fetched or
//! created on demand, so its id is always `entity_type.bundle.mode`.
//!
//! Before a row first touches a component or group, the destination records
//! what was there (and whether the display existed at all) in the target's
//! [`PriorStateStorage`]. Rollback puts that back, and deletes the display
//! only when it was created by an import and nothing is left in it.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use tracing::debug;

use super::{id_string, required_string};
use crate::core::row::Row;
use crate::core::schema::{field_list, FieldInfo, IdSchema};
use crate::core::traits::{check_destination_ids, Destination, Imported, RollbackKind};
use crate::core::value::Value;
use crate::error::{MigrateError, Result};
use crate::target::{Entity, EntityStorage, PriorStateStorage};

/// View or form display.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DisplayKind {
    View,
    Form,
}

impl DisplayKind {
    /// Target entity type of the display.
    pub fn entity_type(self) -> &'static str {
        match self {
            DisplayKind::View => "entity_view_display",
            DisplayKind::Form => "entity_form_display",
        }
    }

    /// Destination property naming the mode.
    fn mode_property(self) -> &'static str {
        match self {
            DisplayKind::View => "view_mode",
            DisplayKind::Form => "form_mode",
        }
    }

    fn parse(value: &str) -> Option<Self> {
        match value {
            "view" | "entity_view_display" => Some(DisplayKind::View),
            "form" | "entity_form_display" => Some(DisplayKind::Form),
            _ => None,
        }
    }
}

/// Id of the display for a triple.
pub fn display_id(entity_type: &str, bundle: &str, mode: &str) -> String {
    format!("{}.{}.{}", entity_type, bundle, mode)
}

fn new_display(kind: DisplayKind, entity_type: &str, bundle: &str, mode: &str) -> Entity {
    let values = BTreeMap::from([
        ("id".to_string(), Value::from(display_id(entity_type, bundle, mode))),
        ("targetEntityType".to_string(), Value::from(entity_type)),
        ("bundle".to_string(), Value::from(bundle)),
        ("mode".to_string(), Value::from(mode)),
        ("status".to_string(), Value::Bool(true)),
    ]);
    Entity::new(kind.entity_type(), values)
}

fn is_empty_display(display: &Entity) -> bool {
    ["content", "hidden", "third_party_settings"]
        .iter()
        .all(|key| display.get(key).map_or(true, Value::is_empty))
}

/// A display's state before imports merged into it.
#[derive(Debug, Clone, PartialEq)]
struct Prior {
    /// The display existed before the first merge.
    existed: bool,
    /// Per field: the `content` and `hidden` entries it replaced.
    components: BTreeMap<String, Value>,
    /// Per group: the settings it replaced, `Null` when there were none.
    groups: BTreeMap<String, Value>,
}

impl Prior {
    fn new(existed: bool) -> Self {
        Self {
            existed,
            components: BTreeMap::new(),
            groups: BTreeMap::new(),
        }
    }

    fn from_value(value: &Value) -> Self {
        let section = |key: &str| {
            value
                .get_path(&[key])
                .and_then(Value::as_map)
                .cloned()
                .unwrap_or_default()
        };
        Self {
            existed: value.get_path(&["existed"]).is_some_and(Value::as_bool),
            components: section("components"),
            groups: section("groups"),
        }
    }

    fn to_value(&self) -> Value {
        Value::Map(BTreeMap::from([
            ("existed".to_string(), Value::Bool(self.existed)),
            ("components".to_string(), Value::Map(self.components.clone())),
            ("groups".to_string(), Value::Map(self.groups.clone())),
        ]))
    }

    fn is_empty(&self) -> bool {
        self.components.is_empty() && self.groups.is_empty()
    }
}

/// Display access shared by the display destinations.
struct Displays {
    entities: Arc<dyn EntityStorage>,
    prior: Arc<dyn PriorStateStorage>,
}

impl Displays {
    fn prior_key(kind: DisplayKind, id: &str) -> String {
        format!("{}:{}", kind.entity_type(), id)
    }

    /// Load a display and its recorded prior state. Without a record the
    /// display counts as pre-existing when it is present now.
    async fn load(&self, kind: DisplayKind, id: &str) -> Result<(Option<Entity>, Prior)> {
        let display = self
            .entities
            .load(kind.entity_type(), &Value::from(id))
            .await?;
        let prior = match self.prior.load_prior(&Self::prior_key(kind, id)).await? {
            Some(value) => Prior::from_value(&value),
            None => Prior::new(display.is_some()),
        };
        Ok((display, prior))
    }

    /// Fetch or create a display for an import.
    async fn open(
        &self,
        kind: DisplayKind,
        entity_type: &str,
        bundle: &str,
        mode: &str,
    ) -> Result<(Entity, Prior)> {
        let id = display_id(entity_type, bundle, mode);
        let (display, prior) = self.load(kind, &id).await?;
        let display = display.unwrap_or_else(|| {
            debug!("Creating {} {}", kind.entity_type(), id);
            new_display(kind, entity_type, bundle, mode)
        });
        Ok((display, prior))
    }

    /// Persist a display and its prior state. A display that an import
    /// created and that is now empty is deleted instead.
    async fn store(
        &self,
        kind: DisplayKind,
        id: &str,
        display: Option<&Entity>,
        prior: &Prior,
    ) -> Result<()> {
        if let Some(display) = display {
            if !prior.existed && is_empty_display(display) {
                self.entities
                    .delete(kind.entity_type(), &Value::from(id))
                    .await?;
            } else {
                self.entities.save(display).await?;
            }
        }
        let key = Self::prior_key(kind, id);
        if prior.is_empty() {
            self.prior.remove_prior(&key).await?;
        } else {
            self.prior.save_prior(&key, &prior.to_value()).await?;
        }
        Ok(())
    }
}

/// Edit one map-valued section of a display. Empty sections are dropped.
fn with_section<R>(
    display: &mut Entity,
    key: &str,
    edit: impl FnOnce(&mut BTreeMap<String, Value>) -> R,
) -> R {
    let mut section = match display.values.remove(key) {
        Some(Value::Map(section)) => section,
        _ => BTreeMap::new(),
    };
    let result = edit(&mut section);
    if !section.is_empty() {
        display.values.insert(key.to_string(), Value::Map(section));
    }
    result
}

/// `component_entity_display` / `component_entity_form_display`: set one
/// field's component on a display.
pub struct ComponentDisplayDestination {
    plugin_id: &'static str,
    kind: DisplayKind,
    displays: Displays,
}

impl ComponentDisplayDestination {
    pub fn new(
        kind: DisplayKind,
        entities: Arc<dyn EntityStorage>,
        prior: Arc<dyn PriorStateStorage>,
    ) -> Self {
        let plugin_id = match kind {
            DisplayKind::View => "component_entity_display",
            DisplayKind::Form => "component_entity_form_display",
        };
        Self {
            plugin_id,
            kind,
            displays: Displays { entities, prior },
        }
    }
}

#[async_trait]
impl Destination for ComponentDisplayDestination {
    fn plugin_id(&self) -> &str {
        self.plugin_id
    }

    fn fields(&self) -> Vec<FieldInfo> {
        field_list(&[
            ("entity_type", "The entity type of the display"),
            ("bundle", "The bundle of the display"),
            (self.kind.mode_property(), "The display mode"),
            ("field_name", "The field whose component is set"),
            ("options", "Component options (type, weight, label, settings)"),
        ])
    }

    fn ids(&self) -> IdSchema {
        IdSchema::new()
            .string("entity_type")
            .string("bundle")
            .string(self.kind.mode_property())
            .string("field_name")
    }

    async fn import(&self, row: &Row, old_destination_ids: &[Value]) -> Result<Imported> {
        let entity_type = required_string(row, self.plugin_id, "entity_type")?;
        let bundle = required_string(row, self.plugin_id, "bundle")?;
        let mode = required_string(row, self.plugin_id, self.kind.mode_property())?;
        let field_name = required_string(row, self.plugin_id, "field_name")?;
        let options = row
            .destination_property("options")
            .cloned()
            .unwrap_or_else(|| Value::Map(BTreeMap::new()));
        let ids: Vec<Value> = vec![
            entity_type.as_str().into(),
            bundle.as_str().into(),
            mode.as_str().into(),
            field_name.as_str().into(),
        ];

        // The row now lands elsewhere; give back what it held before.
        if !old_destination_ids.is_empty() && old_destination_ids != ids.as_slice() {
            debug!("{}: moving {:?} to {:?}", self.plugin_id, old_destination_ids, ids);
            self.rollback(old_destination_ids).await?;
        }

        let (mut display, mut prior) = self
            .displays
            .open(self.kind, &entity_type, &bundle, &mode)
            .await?;
        if !prior.components.contains_key(&field_name) {
            let section = |key: &str| {
                display
                    .get(key)
                    .and_then(|s| s.get_path(&[field_name.as_str()]))
                    .cloned()
                    .unwrap_or_default()
            };
            let snapshot = Value::Map(BTreeMap::from([
                ("content".to_string(), section("content")),
                ("hidden".to_string(), section("hidden")),
            ]));
            prior.components.insert(field_name.clone(), snapshot);
        }

        with_section(&mut display, "hidden", |hidden| hidden.remove(&field_name));
        with_section(&mut display, "content", |content| {
            content.insert(field_name.clone(), options)
        });
        let id = display_id(&entity_type, &bundle, &mode);
        self.displays
            .store(self.kind, &id, Some(&display), &prior)
            .await?;

        Ok(Imported::created(ids))
    }

    async fn rollback(&self, destination_ids: &[Value]) -> Result<()> {
        check_destination_ids(self.plugin_id, &self.ids(), destination_ids)?;
        let id = display_id(
            &id_string(destination_ids, 0),
            &id_string(destination_ids, 1),
            &id_string(destination_ids, 2),
        );
        let field_name = id_string(destination_ids, 3);
        let (display, mut prior) = self.displays.load(self.kind, &id).await?;
        let snapshot = prior.components.remove(&field_name);

        let Some(mut display) = display else {
            return self.displays.store(self.kind, &id, None, &prior).await;
        };
        let restore = |key: &str| {
            snapshot
                .as_ref()
                .and_then(|s| s.get_path(&[key]))
                .filter(|v| !v.is_null())
                .cloned()
        };
        let content = restore("content");
        let hidden = restore("hidden");
        with_section(&mut display, "content", |section| match content {
            Some(value) => section.insert(field_name.clone(), value),
            None => section.remove(&field_name),
        });
        if let Some(value) = hidden {
            with_section(&mut display, "hidden", |section| {
                section.insert(field_name.clone(), value)
            });
        }
        self.displays
            .store(self.kind, &id, Some(&display), &prior)
            .await
    }

    fn rollback_kind(&self) -> RollbackKind {
        RollbackKind::Unset
    }
}

/// Properties copied into a field group's third-party settings.
const GROUP_SETTINGS: &[&str] = &[
    "label",
    "weight",
    "children",
    "parent_name",
    "format_type",
    "format_settings",
    "region",
];

/// Edit `third_party_settings.field_group` of a display. The key is dropped
/// when no group is left.
fn with_groups<R>(display: &mut Entity, edit: impl FnOnce(&mut BTreeMap<String, Value>) -> R) -> R {
    with_section(display, "third_party_settings", |third_party| {
        let mut groups = match third_party.remove("field_group") {
            Some(Value::Map(groups)) => groups,
            _ => BTreeMap::new(),
        };
        let result = edit(&mut groups);
        if !groups.is_empty() {
            third_party.insert("field_group".to_string(), Value::Map(groups));
        }
        result
    })
}

/// `field_group`: merge one group into a display's
/// `third_party_settings.field_group`.
pub struct FieldGroupDestination {
    displays: Displays,
}

impl FieldGroupDestination {
    const PLUGIN_ID: &'static str = "field_group";

    pub fn new(entities: Arc<dyn EntityStorage>, prior: Arc<dyn PriorStateStorage>) -> Self {
        Self {
            displays: Displays { entities, prior },
        }
    }

    fn kind(value: &str) -> Result<DisplayKind> {
        DisplayKind::parse(value).ok_or_else(|| {
            MigrateError::destination(
                Self::PLUGIN_ID,
                format!("display type must be 'view' or 'form', got '{}'", value),
            )
        })
    }
}

#[async_trait]
impl Destination for FieldGroupDestination {
    fn plugin_id(&self) -> &str {
        Self::PLUGIN_ID
    }

    fn fields(&self) -> Vec<FieldInfo> {
        field_list(&[
            ("entity_type", "The entity type of the display"),
            ("bundle", "The bundle of the display"),
            ("mode", "The display mode"),
            ("type", "view or form"),
            ("group_name", "The group machine name"),
            ("label", "The group label"),
            ("weight", "The group weight"),
            ("children", "Fields in the group"),
            ("parent_name", "The parent group"),
            ("format_type", "The group formatter"),
            ("format_settings", "Formatter settings"),
            ("region", "The display region"),
        ])
    }

    fn ids(&self) -> IdSchema {
        IdSchema::new()
            .string("entity_type")
            .string("bundle")
            .string("mode")
            .string("type")
            .string("group_name")
    }

    async fn import(&self, row: &Row, old_destination_ids: &[Value]) -> Result<Imported> {
        let entity_type = required_string(row, Self::PLUGIN_ID, "entity_type")?;
        let bundle = required_string(row, Self::PLUGIN_ID, "bundle")?;
        let mode = required_string(row, Self::PLUGIN_ID, "mode")?;
        let display_type = required_string(row, Self::PLUGIN_ID, "type")?;
        let group_name = required_string(row, Self::PLUGIN_ID, "group_name")?;
        let kind = Self::kind(&display_type)?;
        let ids: Vec<Value> = vec![
            entity_type.as_str().into(),
            bundle.as_str().into(),
            mode.as_str().into(),
            display_type.as_str().into(),
            group_name.as_str().into(),
        ];

        if !old_destination_ids.is_empty() && old_destination_ids != ids.as_slice() {
            debug!("{}: moving {:?} to {:?}", Self::PLUGIN_ID, old_destination_ids, ids);
            self.rollback(old_destination_ids).await?;
        }

        let settings: BTreeMap<String, Value> = GROUP_SETTINGS
            .iter()
            .filter_map(|key| {
                row.destination_property(key)
                    .map(|value| (key.to_string(), value.clone()))
            })
            .collect();

        let (mut display, mut prior) = self
            .displays
            .open(kind, &entity_type, &bundle, &mode)
            .await?;
        with_groups(&mut display, |groups| {
            let previous = groups.insert(group_name.clone(), Value::Map(settings));
            prior
                .groups
                .entry(group_name.clone())
                .or_insert_with(|| previous.unwrap_or_default());
        });
        let id = display_id(&entity_type, &bundle, &mode);
        self.displays.store(kind, &id, Some(&display), &prior).await?;

        Ok(Imported::created(ids))
    }

    async fn rollback(&self, destination_ids: &[Value]) -> Result<()> {
        check_destination_ids(Self::PLUGIN_ID, &self.ids(), destination_ids)?;
        let kind = Self::kind(&id_string(destination_ids, 3))?;
        let id = display_id(
            &id_string(destination_ids, 0),
            &id_string(destination_ids, 1),
            &id_string(destination_ids, 2),
        );
        let group_name = id_string(destination_ids, 4);
        let (display, mut prior) = self.displays.load(kind, &id).await?;
        let previous = prior.groups.remove(&group_name).filter(|v| !v.is_null());

        let Some(mut display) = display else {
            return self.displays.store(kind, &id, None, &prior).await;
        };
        with_groups(&mut display, |groups| match previous {
            Some(settings) => groups.insert(group_name.clone(), settings),
            None => groups.remove(&group_name),
        });
        self.displays.store(kind, &id, Some(&display), &prior).await
    }

    fn rollback_kind(&self) -> RollbackKind {
        RollbackKind::Unset
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::value::map;
    use crate::db::testing::memory_pool;
    use crate::target::SqliteTarget;

    async fn storage() -> Arc<SqliteTarget> {
        Arc::new(SqliteTarget::from_pool(memory_pool().await).await.unwrap())
    }

    fn row(pairs: &[(&str, Value)]) -> Row {
        let mut row = Row::new(
            BTreeMap::from([("id".to_string(), Value::Int(1))]),
            &IdSchema::new().integer("id"),
        )
        .unwrap();
        for (key, value) in pairs {
            row.set_destination_property(key, value.clone());
        }
        row
    }

    fn component_row(field: &str, format: &str) -> Row {
        row(&[
            ("entity_type", "node".into()),
            ("bundle", "story".into()),
            ("view_mode", "teaser".into()),
            ("field_name", field.into()),
            ("options", map([("type", format)])),
        ])
    }

    fn group_row(group: &str) -> Row {
        row(&[
            ("entity_type", "node".into()),
            ("bundle", "story".into()),
            ("mode", "default".into()),
            ("type", "form".into()),
            ("group_name", group.into()),
            ("label", "Details".into()),
            ("children", Value::List(vec!["field_test".into()])),
        ])
    }

    #[tokio::test]
    async fn test_component_fetch_or_create_is_deterministic() {
        let storage = storage().await;
        let destination = ComponentDisplayDestination::new(DisplayKind::View, storage.clone(), storage.clone());

        destination.import(&component_row("field_test", "trimmed"), &[]).await.unwrap();
        destination.import(&component_row("field_other", "default"), &[]).await.unwrap();

        let displays = storage.list("entity_view_display").await.unwrap();
        assert_eq!(displays.len(), 1);
        let display = &displays[0];
        assert_eq!(display.get("id"), Some(&Value::from("node.story.teaser")));
        let content = display.get("content").unwrap();
        assert_eq!(content.get_path(&["field_test", "type"]), Some(&Value::from("trimmed")));
        assert_eq!(content.get_path(&["field_other", "type"]), Some(&Value::from("default")));
    }

    #[tokio::test]
    async fn test_component_rollback_round_trip() {
        let storage = storage().await;
        let destination = ComponentDisplayDestination::new(DisplayKind::View, storage.clone(), storage.clone());

        let first = destination.import(&component_row("field_test", "trimmed"), &[]).await.unwrap();
        let before = storage.list("entity_view_display").await.unwrap();
        let second = destination.import(&component_row("field_other", "default"), &[]).await.unwrap();

        destination.rollback(&second.ids).await.unwrap();
        assert_eq!(storage.list("entity_view_display").await.unwrap(), before);

        destination.rollback(&first.ids).await.unwrap();
        assert!(storage.list("entity_view_display").await.unwrap().is_empty());
        destination.rollback(&first.ids).await.unwrap();
    }

    #[tokio::test]
    async fn test_field_group_rollback_unsets_only_its_key() {
        let storage = storage().await;
        let components = ComponentDisplayDestination::new(DisplayKind::Form, storage.clone(), storage.clone());
        components
            .import(
                &row(&[
                    ("entity_type", "node".into()),
                    ("bundle", "story".into()),
                    ("form_mode", "default".into()),
                    ("field_name", "field_test".into()),
                    ("options", map([("type", "text_textfield")])),
                ]),
                &[],
            )
            .await
            .unwrap();
        let before = storage.list("entity_form_display").await.unwrap();

        let destination = FieldGroupDestination::new(storage.clone(), storage.clone());
        assert_eq!(destination.rollback_kind(), RollbackKind::Unset);
        let imported = destination.import(&group_row("group_details"), &[]).await.unwrap();

        let display = storage
            .load("entity_form_display", &"node.story.default".into())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(
            display
                .get("third_party_settings")
                .and_then(|t| t.get_path(&["field_group", "group_details", "label"])),
            Some(&Value::from("Details"))
        );

        destination.rollback(&imported.ids).await.unwrap();
        let after = storage.list("entity_form_display").await.unwrap();
        assert_eq!(after, before);
        assert!(after[0].get("content").unwrap().get_path(&["field_test"]).is_some());
    }

    #[tokio::test]
    async fn test_field_group_rejects_unknown_display_type() {
        let storage = storage().await;
        let destination = FieldGroupDestination::new(storage.clone(), storage);
        let mut bad = group_row("group_details");
        bad.set_destination_property("type", "print");
        assert!(destination.import(&bad, &[]).await.is_err());
    }

    #[tokio::test]
    async fn test_rollback_restores_a_pre_existing_display() {
        let storage = storage().await;
        let existing = Entity::new(
            "entity_view_display",
            BTreeMap::from([
                ("id".to_string(), Value::from("node.story.teaser")),
                ("targetEntityType".to_string(), Value::from("node")),
                ("bundle".to_string(), Value::from("story")),
                ("mode".to_string(), Value::from("teaser")),
                ("content".to_string(), map([("field_test", map([("type", "original")]))])),
                ("hidden".to_string(), map([("field_body", true)])),
            ]),
        );
        storage.save(&existing).await.unwrap();
        let before = storage.list("entity_view_display").await.unwrap();

        let destination =
            ComponentDisplayDestination::new(DisplayKind::View, storage.clone(), storage.clone());
        let test = destination.import(&component_row("field_test", "trimmed"), &[]).await.unwrap();
        let body = destination.import(&component_row("field_body", "default"), &[]).await.unwrap();

        let display = storage
            .load("entity_view_display", &"node.story.teaser".into())
            .await
            .unwrap()
            .unwrap();
        let content = display.get("content").unwrap();
        assert_eq!(content.get_path(&["field_test", "type"]), Some(&Value::from("trimmed")));
        assert_eq!(content.get_path(&["field_body", "type"]), Some(&Value::from("default")));
        assert!(display.get("hidden").is_none());

        destination.rollback(&test.ids).await.unwrap();
        destination.rollback(&body.ids).await.unwrap();
        assert_eq!(storage.list("entity_view_display").await.unwrap(), before);
        assert!(storage
            .load_prior("entity_view_display:node.story.teaser")
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn test_rollback_out_of_order_still_removes_created_display() {
        let storage = storage().await;
        let destination =
            ComponentDisplayDestination::new(DisplayKind::View, storage.clone(), storage.clone());
        let first = destination.import(&component_row("field_test", "trimmed"), &[]).await.unwrap();
        let second = destination.import(&component_row("field_other", "default"), &[]).await.unwrap();

        destination.rollback(&first.ids).await.unwrap();
        assert_eq!(storage.list("entity_view_display").await.unwrap().len(), 1);
        destination.rollback(&second.ids).await.unwrap();
        assert!(storage.list("entity_view_display").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_reimport_to_another_mode_moves_the_component() {
        let storage = storage().await;
        let destination =
            ComponentDisplayDestination::new(DisplayKind::View, storage.clone(), storage.clone());
        let teaser = destination.import(&component_row("field_test", "trimmed"), &[]).await.unwrap();

        let mut full = component_row("field_test", "default");
        full.set_destination_property("view_mode", "full");
        let moved = destination.import(&full, &teaser.ids).await.unwrap();
        assert_eq!(moved.ids[2], Value::from("full"));

        let displays = storage.list("entity_view_display").await.unwrap();
        assert_eq!(displays.len(), 1);
        assert_eq!(displays[0].get("id"), Some(&Value::from("node.story.full")));

        destination.rollback(&moved.ids).await.unwrap();
        assert!(storage.list("entity_view_display").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_renamed_group_replaces_the_old_one() {
        let storage = storage().await;
        let destination = FieldGroupDestination::new(storage.clone(), storage.clone());
        let first = destination.import(&group_row("group_details"), &[]).await.unwrap();
        let renamed = destination.import(&group_row("group_extra"), &first.ids).await.unwrap();

        let display = storage
            .load("entity_form_display", &"node.story.default".into())
            .await
            .unwrap()
            .unwrap();
        let groups = display
            .get("third_party_settings")
            .and_then(|t| t.get_path(&["field_group"]))
            .and_then(Value::as_map)
            .unwrap();
        assert_eq!(groups.keys().collect::<Vec<_>>(), vec!["group_extra"]);

        destination.rollback(&renamed.ids).await.unwrap();
        assert!(storage.list("entity_form_display").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_group_rollback_restores_replaced_settings() {
        let storage = storage().await;
        let existing = Entity::new(
            "entity_form_display",
            BTreeMap::from([
                ("id".to_string(), Value::from("node.story.default")),
                (
                    "third_party_settings".to_string(),
                    map([("field_group", map([("group_details", map([("label", "Old")]))]))]),
                ),
            ]),
        );
        storage.save(&existing).await.unwrap();
        let before = storage.list("entity_form_display").await.unwrap();

        let destination = FieldGroupDestination::new(storage.clone(), storage.clone());
        let imported = destination.import(&group_row("group_details"), &[]).await.unwrap();
        destination.rollback(&imported.ids).await.unwrap();
        assert_eq!(storage.list("entity_form_display").await.unwrap(), before);
    }
}
