//! Persistence context contract and its SQLite implementation.
//!
//! # Responsibility
//! - Define the unit-of-work seam typed stores drive.
//! - Provide the SQLite-backed context used by default.
//!
//! # Invariants
//! - A context tracks at most one object per `EntityId`.
//! - An object tracked by one context is never saved through another.
//! - Pending changes survive a failed `commit` until `rollback`.
//!
//! Contexts are single-writer: callers confine one context to one thread.

use crate::db::DbError;
use crate::model::object::{EntityId, ManagedObject};
use crate::model::schema::ModelError;
use crate::query::spec::{BatchDeleteRequest, QuerySpec};
use std::error::Error;
use std::fmt::{Display, Formatter};

mod sqlite;

pub use sqlite::SqliteContext;

pub type ContextResult<T> = Result<T, ContextError>;

/// Errors raised by persistence context operations.
#[derive(Debug)]
pub enum ContextError {
    /// Underlying SQLite/bootstrap error.
    Db(DbError),
    /// Data model handed to the context is invalid.
    Model(ModelError),
    /// Entity kind is not part of the context's data model.
    UnknownEntity(String),
    /// Object is already tracked by another context.
    ForeignObject(EntityId),
    /// A different object with the same id is already tracked.
    DuplicateId(EntityId),
    /// A tracked object no longer has a stored row to update.
    StaleObject(EntityId),
    /// Connection schema is not at the expected migrated version.
    UninitializedConnection {
        expected_version: u32,
        actual_version: u32,
    },
    /// Required table is missing.
    MissingRequiredTable(&'static str),
    /// Persisted data cannot be turned back into an object.
    InvalidData(String),
}

impl Display for ContextError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Db(err) => write!(f, "{err}"),
            Self::Model(err) => write!(f, "{err}"),
            Self::UnknownEntity(name) => write!(f, "unknown entity kind: `{name}`"),
            Self::ForeignObject(id) => {
                write!(f, "object {id} is tracked by another context")
            }
            Self::DuplicateId(id) => {
                write!(f, "another object with id {id} is already tracked")
            }
            Self::StaleObject(id) => write!(f, "stored row for object {id} no longer exists"),
            Self::UninitializedConnection {
                expected_version,
                actual_version,
            } => write!(
                f,
                "persistence context requires schema version {expected_version}, got {actual_version}"
            ),
            Self::MissingRequiredTable(table) => {
                write!(f, "persistence context requires table `{table}`")
            }
            Self::InvalidData(message) => write!(f, "invalid stored object: {message}"),
        }
    }
}

impl Error for ContextError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Db(err) => Some(err),
            Self::Model(err) => Some(err),
            _ => None,
        }
    }
}

impl From<DbError> for ContextError {
    fn from(value: DbError) -> Self {
        Self::Db(value)
    }
}

impl From<ModelError> for ContextError {
    fn from(value: ModelError) -> Self {
        Self::Model(value)
    }
}

impl From<rusqlite::Error> for ContextError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Db(DbError::Sqlite(value))
    }
}

/// Unit-of-work boundary holding pending mutations until committed.
pub trait PersistenceContext {
    /// Resolves an identifier to a live object of any kind.
    fn resolve(&self, id: EntityId) -> Option<ManagedObject>;
    /// Allocates a new object of `entity_name`, tracked as a pending insert.
    ///
    /// Returns `None` when the kind is unknown to the context.
    fn allocate_entity(&self, entity_name: &str) -> Option<ManagedObject>;
    /// Registers an already-constructed object as a pending insert.
    fn track(&self, object: &ManagedObject) -> ContextResult<()>;
    /// Marks an object for removal on the next commit.
    ///
    /// A detached handle is matched to the tracked object with the same id.
    /// Objects owned by another context are refused.
    fn mark_for_deletion(&self, object: &ManagedObject) -> ContextResult<()>;
    /// Removes matching objects from storage immediately.
    ///
    /// Returns the number of removed objects.
    fn execute_batch_delete(&self, request: &BatchDeleteRequest) -> ContextResult<usize>;
    /// Returns objects matching `spec`, including pending changes.
    fn query(&self, spec: &QuerySpec) -> ContextResult<Vec<ManagedObject>>;
    /// Durably saves all pending changes.
    fn commit(&self) -> ContextResult<()>;
    /// Discards all pending changes.
    fn rollback(&self);
    /// Returns whether any change is waiting for `commit`.
    fn has_changes(&self) -> bool;
}
