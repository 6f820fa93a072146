//! Legacy Drupal 6 tables for source tests.

use sqlx::sqlite::SqlitePool;

use crate::core::value::Value;
use crate::db::testing::{exec, insert};

pub async fn node_type_tables(pool: &SqlitePool) {
    exec(
        pool,
        "CREATE TABLE node_type (
            type TEXT PRIMARY KEY, name TEXT, module TEXT, description TEXT,
            help TEXT DEFAULT '', has_title INTEGER DEFAULT 1, title_label TEXT DEFAULT 'Title',
            has_body INTEGER DEFAULT 1, body_label TEXT DEFAULT 'Body', min_word_count INTEGER DEFAULT 0,
            custom INTEGER DEFAULT 1, modified INTEGER DEFAULT 1, locked INTEGER DEFAULT 0,
            orig_type TEXT DEFAULT '')",
    )
    .await;
    insert(
        pool,
        "node_type",
        &["type", "name", "module", "description", "orig_type"],
        vec![
            vec![
                "page".into(),
                "Page".into(),
                "node".into(),
                "A page, similar in form to a story.".into(),
                "page".into(),
            ],
            vec![
                "story".into(),
                "Story".into(),
                "node".into(),
                "A story is ideal for creating and displaying content.".into(),
                "story".into(),
            ],
        ],
    )
    .await;
}

pub async fn taxonomy_tables(pool: &SqlitePool) {
    exec(
        pool,
        "CREATE TABLE vocabulary (
            vid INTEGER PRIMARY KEY, name TEXT, description TEXT, help TEXT, relations INTEGER,
            hierarchy INTEGER, multiple INTEGER, required INTEGER, tags INTEGER, module TEXT, weight INTEGER);
         CREATE TABLE vocabulary_node_types (vid INTEGER, type TEXT);
         CREATE TABLE term_data (tid INTEGER PRIMARY KEY, vid INTEGER, name TEXT, description TEXT, weight INTEGER);
         CREATE TABLE term_hierarchy (tid INTEGER, parent INTEGER);
         INSERT INTO vocabulary VALUES (1, 'Tags', 'Free tagging', '', 1, 0, 0, 0, 1, 'taxonomy', 0);
         INSERT INTO vocabulary VALUES (5, 'Categories', '', '', 0, 1, 1, 0, 0, 'taxonomy', 1);
         INSERT INTO vocabulary VALUES (6, 'Section', '', '', 0, 0, 0, 1, 0, 'taxonomy', 2);
         INSERT INTO vocabulary_node_types VALUES (1, 'story');
         INSERT INTO vocabulary_node_types VALUES (1, 'page');
         INSERT INTO vocabulary_node_types VALUES (5, 'story');
         INSERT INTO term_data VALUES (1, 5, 'Drupal', 'description of term 1', 0);
         INSERT INTO term_data VALUES (2, 6, 'Rust', 'description of term 2', 0);
         INSERT INTO term_data VALUES (3, 6, 'Cargo', 'description of term 3', 1);
         INSERT INTO term_data VALUES (4, 5, 'Migrate', 'description of term 4', 1);
         INSERT INTO term_data VALUES (5, 1, 'news', '', 0);
         INSERT INTO term_data VALUES (6, 1, 'release', '', 0);
         INSERT INTO term_hierarchy VALUES (1, 0);
         INSERT INTO term_hierarchy VALUES (2, 0);
         INSERT INTO term_hierarchy VALUES (3, 2);
         INSERT INTO term_hierarchy VALUES (4, 2);
         INSERT INTO term_hierarchy VALUES (4, 1);
         INSERT INTO term_hierarchy VALUES (5, 0);
         INSERT INTO term_hierarchy VALUES (6, 0)",
    )
    .await;
}

pub async fn filter_tables(pool: &SqlitePool) {
    exec(
        pool,
        "CREATE TABLE filter_formats (format INTEGER PRIMARY KEY, name TEXT, roles TEXT, cache INTEGER);
         CREATE TABLE filters (fid INTEGER PRIMARY KEY, format INTEGER, module TEXT, delta INTEGER, weight INTEGER);
         CREATE TABLE variable (name TEXT PRIMARY KEY, value BLOB);
         INSERT INTO filter_formats VALUES (1, 'Filtered HTML', ',1,2,', 1);
         INSERT INTO filter_formats VALUES (2, 'Full HTML', '', 1);
         INSERT INTO filter_formats VALUES (4, 'Example Custom Format', '4', 1);
         INSERT INTO filters VALUES (1, 1, 'filter', 0, 1);
         INSERT INTO filters VALUES (2, 1, 'filter', 1, 2);
         INSERT INTO filters VALUES (3, 1, 'filter', 2, 0);
         INSERT INTO filters VALUES (4, 2, 'filter', 3, 10);
         INSERT INTO filters VALUES (5, 2, 'filter', 1, 1);
         INSERT INTO filters VALUES (6, 2, 'filter', 2, 0);
         INSERT INTO filters VALUES (7, 4, 'markdown', 0, 10);
         INSERT INTO filters VALUES (8, 4, 'filter', 2, -1)",
    )
    .await;
    insert(
        pool,
        "variable",
        &["name", "value"],
        vec![vec!["filter_url_length_1".into(), "i:50;".into()]],
    )
    .await;
}

const FIELD_TEST_DISPLAY: &str = r#"a:4:{s:5:"label";a:1:{s:6:"format";s:5:"above";}s:6:"teaser";a:2:{s:6:"format";s:7:"trimmed";s:7:"exclude";i:0;}s:4:"full";a:2:{s:6:"format";s:7:"default";s:7:"exclude";i:0;}i:4;a:2:{s:6:"format";s:6:"hidden";s:7:"exclude";i:0;}}"#;

const FIELD_HIDDEN_DISPLAY: &str = r#"a:4:{s:5:"label";a:1:{s:6:"format";s:6:"hidden";}s:6:"teaser";a:2:{s:6:"format";s:6:"hidden";s:7:"exclude";i:0;}s:4:"full";a:2:{s:6:"format";s:7:"default";s:7:"exclude";i:1;}s:3:"rss";a:2:{s:6:"format";s:7:"default";s:7:"exclude";i:0;}}"#;

const WIDGET_SETTINGS: &str = r#"a:1:{s:4:"rows";i:5;}"#;

const GROUP_SETTINGS: &str = r#"a:2:{s:4:"form";a:2:{s:5:"style";s:20:"fieldset_collapsible";s:11:"description";s:0:"";}s:7:"display";a:1:{s:6:"weight";i:2;}}"#;

pub async fn cck_tables(pool: &SqlitePool) {
    exec(
        pool,
        "CREATE TABLE content_node_field (field_name TEXT PRIMARY KEY, type TEXT, module TEXT);
         CREATE TABLE content_node_field_instance (
            field_name TEXT, type_name TEXT, weight INTEGER, label TEXT, widget_type TEXT,
            widget_settings BLOB, display_settings BLOB, description TEXT, widget_module TEXT,
            widget_active INTEGER);
         CREATE TABLE content_group (
            group_type TEXT, type_name TEXT, group_name TEXT, label TEXT, settings BLOB, weight INTEGER);
         CREATE TABLE content_group_fields (type_name TEXT, group_name TEXT, field_name TEXT);
         INSERT INTO content_node_field VALUES ('field_test', 'text', 'text');
         INSERT INTO content_node_field VALUES ('field_hidden', 'number_integer', 'number');
         INSERT INTO content_group_fields VALUES ('story', 'group_details', 'field_test');
         INSERT INTO content_group_fields VALUES ('story', 'group_details', 'field_hidden')",
    )
    .await;
    insert(
        pool,
        "content_node_field_instance",
        &["field_name", "type_name", "weight", "label", "widget_type", "widget_settings", "display_settings"],
        vec![
            vec![
                "field_test".into(),
                "story".into(),
                Value::Int(1),
                "Text Field".into(),
                "text_textfield".into(),
                WIDGET_SETTINGS.into(),
                FIELD_TEST_DISPLAY.into(),
            ],
            vec![
                "field_hidden".into(),
                "story".into(),
                Value::Int(2),
                "Hidden Field".into(),
                "number".into(),
                WIDGET_SETTINGS.into(),
                FIELD_HIDDEN_DISPLAY.into(),
            ],
        ],
    )
    .await;
    insert(
        pool,
        "content_group",
        &["group_type", "type_name", "group_name", "label", "settings", "weight"],
        vec![vec![
            "standard".into(),
            "story".into(),
            "group_details".into(),
            "Details".into(),
            GROUP_SETTINGS.into(),
            Value::Int(-5),
        ]],
    )
    .await;
}

pub async fn nodewords_table(pool: &SqlitePool) {
    exec(
        pool,
        "CREATE TABLE nodewords (mtid INTEGER PRIMARY KEY, type INTEGER, id INTEGER, name TEXT, content TEXT);
         INSERT INTO nodewords VALUES (1, 5, 1, 'description', 'node one');
         INSERT INTO nodewords VALUES (2, 5, 2, 'keywords', 'node two');
         INSERT INTO nodewords VALUES (3, 6, 1, 'description', 'term one');
         INSERT INTO nodewords VALUES (4, 8, 2, 'description', 'user two');
         INSERT INTO nodewords VALUES (5, 1, 0, 'robots', 'index')",
    )
    .await;
}

pub async fn url_alias_table(pool: &SqlitePool) {
    exec(
        pool,
        "CREATE TABLE url_alias (pid INTEGER PRIMARY KEY, src TEXT, dst TEXT, language TEXT);
         INSERT INTO url_alias VALUES (1, 'node/1', 'alias-one', 'af');
         INSERT INTO url_alias VALUES (2, 'node/2', 'alias-two', 'en')",
    )
    .await;
}

pub async fn authmap_table(pool: &SqlitePool) {
    exec(
        pool,
        "CREATE TABLE authmap (aid INTEGER PRIMARY KEY, uid INTEGER, authname TEXT, module TEXT);
         INSERT INTO authmap VALUES (1, 2, 'alice@example.com', 'openid');
         INSERT INTO authmap VALUES (2, 3, 'bob@example.com', 'openid')",
    )
    .await;
}
