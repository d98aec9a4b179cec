//! Managed objects and their typed `Entity<T>` views.
//!
//! # Responsibility
//! - Hold the identity, kind and field state of one stored record.
//! - Bind Rust types to logical entity names at compile time.
//!
//! # Invariants
//! - `id` never changes after construction.
//! - Cloning a `ManagedObject` clones the handle; all clones share state.
//! - Field writes mark the object dirty until its context commits.
//! - An `Entity<T>` always wraps an object whose entity name is
//!   `T::ENTITY_NAME`.

use serde_json::{Map, Value};
use std::cell::RefCell;
use std::fmt::{Debug, Formatter};
use std::hash::{Hash, Hasher};
use std::marker::PhantomData;
use std::rc::Rc;
use std::sync::atomic::{AtomicU64, Ordering};
use uuid::Uuid;

/// Stable identifier of a managed object.
pub type EntityId = Uuid;

/// JSON object holding the caller-defined fields of an entity.
pub type FieldMap = Map<String, Value>;

/// Process-unique identity of a persistence context.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ContextId(u64);

impl ContextId {
    /// Allocates a fresh context identity.
    pub fn next() -> Self {
        static NEXT_CONTEXT_ID: AtomicU64 = AtomicU64::new(1);
        Self(NEXT_CONTEXT_ID.fetch_add(1, Ordering::Relaxed))
    }
}

/// Compile-time witness mapping a Rust type to its stored entity name.
///
/// ```
/// use typedstore_core::EntityKind;
///
/// struct User;
///
/// impl EntityKind for User {
///     const ENTITY_NAME: &'static str = "User";
/// }
/// ```
pub trait EntityKind {
    /// Logical schema name used to address storage for this kind.
    const ENTITY_NAME: &'static str;
}

#[derive(Debug)]
struct ObjectState {
    id: EntityId,
    entity_name: String,
    fields: FieldMap,
    owner: Option<ContextId>,
    dirty: bool,
}

/// Type-erased handle to one identity-bearing record.
///
/// Handles use shared single-threaded ownership: a context keeps one handle in
/// its identity map and hands clones to callers, so caller field writes are
/// visible to the next commit.
#[derive(Clone)]
pub struct ManagedObject {
    state: Rc<RefCell<ObjectState>>,
}

impl ManagedObject {
    /// Creates a detached object of `entity_name` with a generated id.
    pub fn new(entity_name: impl Into<String>) -> Self {
        Self::with_id(Uuid::new_v4(), entity_name)
    }

    /// Creates a detached object with a caller-provided id.
    ///
    /// Used by import paths where identity already exists externally.
    pub fn with_id(id: EntityId, entity_name: impl Into<String>) -> Self {
        Self::from_parts(id, entity_name, FieldMap::new(), None)
    }

    /// Rebuilds an object from stored state on behalf of `owner`.
    ///
    /// Intended for context implementations materializing persisted rows.
    pub fn from_parts(
        id: EntityId,
        entity_name: impl Into<String>,
        fields: FieldMap,
        owner: Option<ContextId>,
    ) -> Self {
        Self {
            state: Rc::new(RefCell::new(ObjectState {
                id,
                entity_name: entity_name.into(),
                fields,
                owner,
                dirty: false,
            })),
        }
    }

    pub fn id(&self) -> EntityId {
        self.state.borrow().id
    }

    pub fn entity_name(&self) -> String {
        self.state.borrow().entity_name.clone()
    }

    /// Returns whether this object belongs to `entity_name`.
    pub fn is_entity(&self, entity_name: &str) -> bool {
        self.state.borrow().entity_name == entity_name
    }

    /// Returns a copy of one field value.
    pub fn get(&self, field: &str) -> Option<Value> {
        self.state.borrow().fields.get(field).cloned()
    }

    /// Writes one field and marks the object dirty.
    pub fn set(&self, field: impl Into<String>, value: impl Into<Value>) {
        let mut state = self.state.borrow_mut();
        state.fields.insert(field.into(), value.into());
        state.dirty = true;
    }

    /// Removes one field, marking the object dirty when something was removed.
    pub fn remove(&self, field: &str) -> Option<Value> {
        let mut state = self.state.borrow_mut();
        let removed = state.fields.remove(field);
        if removed.is_some() {
            state.dirty = true;
        }
        removed
    }

    /// Returns a snapshot of all fields.
    pub fn fields(&self) -> FieldMap {
        self.state.borrow().fields.clone()
    }

    /// Runs `read` against the current fields without copying them.
    pub fn with_fields<R>(&self, read: impl FnOnce(&FieldMap) -> R) -> R {
        read(&self.state.borrow().fields)
    }

    /// Returns whether fields changed since the last commit.
    pub fn is_dirty(&self) -> bool {
        self.state.borrow().dirty
    }

    /// Returns the context currently tracking this object, if any.
    pub fn owner(&self) -> Option<ContextId> {
        self.state.borrow().owner
    }

    /// Binds this object to `context`. Context implementations only.
    pub fn attach(&self, context: ContextId) {
        self.state.borrow_mut().owner = Some(context);
    }

    /// Releases this object from its context. Context implementations only.
    pub fn detach(&self) {
        self.state.borrow_mut().owner = None;
    }

    /// Replaces all fields with stored state and clears the dirty flag.
    ///
    /// Used by contexts reverting uncommitted edits.
    pub fn reset_fields(&self, fields: FieldMap) {
        let mut state = self.state.borrow_mut();
        state.fields = fields;
        state.dirty = false;
    }

    /// Clears the dirty flag after a successful commit.
    pub fn mark_clean(&self) {
        self.state.borrow_mut().dirty = false;
    }

    /// Returns whether both handles point at the same in-memory object.
    pub fn same_object(&self, other: &ManagedObject) -> bool {
        Rc::ptr_eq(&self.state, &other.state)
    }
}

impl Debug for ManagedObject {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let state = self.state.borrow();
        f.debug_struct("ManagedObject")
            .field("id", &state.id)
            .field("entity_name", &state.entity_name)
            .field("owner", &state.owner)
            .field("dirty", &state.dirty)
            .finish()
    }
}

impl PartialEq for ManagedObject {
    fn eq(&self, other: &Self) -> bool {
        self.id() == other.id()
    }
}

impl Eq for ManagedObject {}

impl Hash for ManagedObject {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id().hash(state);
    }
}

impl AsRef<ManagedObject> for ManagedObject {
    fn as_ref(&self) -> &ManagedObject {
        self
    }
}

/// Typed view over a managed object of kind `T`.
///
/// Equality is identity: two views are equal when their ids match.
pub struct Entity<T: EntityKind> {
    object: ManagedObject,
    _kind: PhantomData<fn() -> T>,
}

impl<T: EntityKind> Entity<T> {
    /// Creates a detached entity with a generated id, ready for `insert`.
    pub fn new() -> Self {
        Self::wrap(ManagedObject::new(T::ENTITY_NAME))
    }

    /// Creates a detached entity with a caller-provided id.
    pub fn with_id(id: EntityId) -> Self {
        Self::wrap(ManagedObject::with_id(id, T::ENTITY_NAME))
    }

    /// Wraps `object` when it belongs to kind `T`.
    ///
    /// Returns `None` for objects of any other kind.
    pub fn from_object(object: ManagedObject) -> Option<Self> {
        if object.is_entity(T::ENTITY_NAME) {
            Some(Self::wrap(object))
        } else {
            None
        }
    }

    fn wrap(object: ManagedObject) -> Self {
        Self {
            object,
            _kind: PhantomData,
        }
    }

    pub fn id(&self) -> EntityId {
        self.object.id()
    }

    pub fn get(&self, field: &str) -> Option<Value> {
        self.object.get(field)
    }

    pub fn set(&self, field: impl Into<String>, value: impl Into<Value>) {
        self.object.set(field, value);
    }

    pub fn remove(&self, field: &str) -> Option<Value> {
        self.object.remove(field)
    }

    pub fn fields(&self) -> FieldMap {
        self.object.fields()
    }

    pub fn object(&self) -> &ManagedObject {
        &self.object
    }

    pub fn into_object(self) -> ManagedObject {
        self.object
    }
}

impl<T: EntityKind> Default for Entity<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: EntityKind> Clone for Entity<T> {
    fn clone(&self) -> Self {
        Self::wrap(self.object.clone())
    }
}

impl<T: EntityKind> Debug for Entity<T> {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Entity")
            .field("kind", &T::ENTITY_NAME)
            .field("id", &self.id())
            .finish()
    }
}

impl<T: EntityKind> PartialEq for Entity<T> {
    fn eq(&self, other: &Self) -> bool {
        self.id() == other.id()
    }
}

impl<T: EntityKind> Eq for Entity<T> {}

impl<T: EntityKind> AsRef<ManagedObject> for Entity<T> {
    fn as_ref(&self) -> &ManagedObject {
        &self.object
    }
}
