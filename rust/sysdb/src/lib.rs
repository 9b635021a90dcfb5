pub mod catalog;
pub mod config;
pub mod coordinator;
pub mod memory_catalog;
pub mod meta_table;
pub mod notification;
pub mod options;
pub mod relational_catalog;
pub mod segment_validation;

pub use catalog::Catalog;
pub use config::CatalogConfig;
pub use coordinator::Coordinator;
pub use memory_catalog::InMemoryCatalog;
pub use meta_table::MetaTable;
pub use notification::{NotificationProcessor, NotificationSink, TriggerMessage};
pub use options::*;
pub use relational_catalog::RelationalCatalog;
pub use segment_validation::{ExclusiveScopePerCollection, SegmentScopeValidator, UnrestrictedScope};
