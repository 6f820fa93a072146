//! Core abstractions shared by every plugin and the executor.
//!
//! - [`value`]: typed value trees and the PHP-serialized blob codec ([`php`])
//! - [`schema`]: source and destination ID schemas
//! - [`row`]: one unit of work flowing through a migration
//! - [`traits`]: the `Source`, `Destination`, `IdMap` and `BundleInfo` capabilities
//! - [`catalog`]: plugin registry for explicit dependency injection
//!
//! # Architecture
//!
//! Plugins are independent types implementing a small set of capability
//! traits. The executor composes one source, one pipeline and one
//! destination per migration; there is no plugin base class hierarchy.

pub mod catalog;
pub mod identifier;
pub mod php;
pub mod row;
pub mod schema;
pub mod traits;
pub mod value;

pub use catalog::{PluginCatalog, PluginConfig, Services};
pub use row::Row;
pub use schema::{FieldInfo, IdField, IdKind, IdSchema};
pub use traits::{
    BundleInfo, Destination, HighWater, IdMap, Imported, PageRequest, RollbackKind, Source,
    StaticBundleInfo,
};
pub use value::Value;
