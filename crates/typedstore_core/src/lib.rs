//! Typed object store over a single persistence context.
//!
//! `TypedStore<T>` scopes create/lookup/fetch/delete operations to one entity
//! kind and finishes every mutation with a save. `SqliteContext` provides the
//! unit of work, identity map and durable storage underneath.

pub mod config;
pub mod context;
pub mod db;
pub mod logging;
pub mod model;
pub mod query;
pub mod store;

pub use config::{ConfigError, CoreConfig, DatabaseConfig};
pub use context::{ContextError, ContextResult, PersistenceContext, SqliteContext};
pub use logging::{default_log_level, init_logging, logging_status, LogConfig};
pub use model::object::{ContextId, Entity, EntityId, EntityKind, FieldMap, ManagedObject};
pub use model::schema::{DataModel, ModelError};
pub use query::predicate::Predicate;
pub use query::sort::SortKey;
pub use query::spec::{BatchDeleteRequest, QuerySpec};
pub use store::typed_store::TypedStore;

/// Liveness answer printed by `typedstore_cli` to confirm the library links.
pub fn ping() -> &'static str {
    "pong"
}

/// Returns the core crate version.
pub fn core_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

#[cfg(test)]
mod tests {
    use super::{core_version, ping};

    #[test]
    fn ping_returns_pong() {
        assert_eq!(ping(), "pong");
    }

    #[test]
    fn version_is_not_empty() {
        assert!(!core_version().is_empty());
    }
}
