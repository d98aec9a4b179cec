//! `TypedStore<T>`: the kind-scoped façade callers use.
//!
//! # Invariants
//! - A store never owns its context; it borrows one for its whole lifetime.
//! - `lookup(None)` returns `None` without touching the context.
//! - Every mutating operation ends with `save` and reports its outcome.
//! - Fetch results are filtered to kind `T`.

use crate::context::PersistenceContext;
use crate::model::object::{Entity, EntityId, EntityKind, ManagedObject};
use crate::query::predicate::Predicate;
use crate::query::sort::SortKey;
use crate::query::spec::{BatchDeleteRequest, QuerySpec};
use log::{debug, info, warn};
use std::marker::PhantomData;

/// CRUD and query façade for entity kind `T` over context `C`.
///
/// ```
/// use typedstore_core::db::open_db_in_memory;
/// use typedstore_core::{DataModel, EntityKind, Predicate, SqliteContext, TypedStore};
///
/// struct User;
///
/// impl EntityKind for User {
///     const ENTITY_NAME: &'static str = "User";
/// }
///
/// let conn = open_db_in_memory().unwrap();
/// let context = SqliteContext::try_new(&conn, &DataModel::new().with_kind::<User>()).unwrap();
/// let users: TypedStore<'_, User, _> = TypedStore::new(&context);
///
/// let alice = users.create_entity().unwrap();
/// alice.set("name", "Alice");
/// assert!(users.save());
///
/// let found = users.fetch(None, Some(Predicate::eq("name", "Alice"))).unwrap();
/// assert_eq!(found, vec![alice]);
/// ```
pub struct TypedStore<'ctx, T, C>
where
    T: EntityKind,
    C: PersistenceContext + ?Sized,
{
    context: &'ctx C,
    _kind: PhantomData<fn() -> T>,
}

impl<'ctx, T, C> TypedStore<'ctx, T, C>
where
    T: EntityKind,
    C: PersistenceContext + ?Sized,
{
    /// Binds a store to `context`. No validation happens here.
    pub fn new(context: &'ctx C) -> Self {
        Self {
            context,
            _kind: PhantomData,
        }
    }

    /// Returns the borrowed context.
    pub fn context(&self) -> &'ctx C {
        self.context
    }

    /// Logical schema name of `T`.
    pub fn entity_name(&self) -> &'static str {
        T::ENTITY_NAME
    }

    /// Resolves `id` to an entity of kind `T`.
    ///
    /// Returns `None` for `None`, unresolved ids and ids of another kind.
    pub fn lookup(&self, id: Option<EntityId>) -> Option<Entity<T>> {
        let id = id?;
        let object = self.context.resolve(id)?;
        let entity = Entity::from_object(object);
        if entity.is_none() {
            debug!(
                "event=store_lookup module=store status=kind_mismatch entity={}",
                T::ENTITY_NAME
            );
        }
        entity
    }

    /// Allocates a new, tracked entity of kind `T`.
    ///
    /// Fields are empty; callers populate them and then call [`Self::save`].
    /// Returns `None` when the context does not know kind `T`.
    pub fn create_entity(&self) -> Option<Entity<T>> {
        self.context
            .allocate_entity(T::ENTITY_NAME)
            .and_then(Entity::from_object)
    }

    /// Marks `entity` for removal and saves.
    ///
    /// Returns `false` when the context refuses the entity, for example one
    /// owned by another context or a handle whose id is not stored.
    pub fn delete(&self, entity: &Entity<T>) -> bool {
        if let Err(err) = self.context.mark_for_deletion(entity.object()) {
            warn!(
                "event=store_delete module=store status=error entity={} error={}",
                T::ENTITY_NAME,
                err
            );
            return false;
        }
        self.save()
    }

    /// Removes every stored entity of kind `T` and saves.
    pub fn delete_all(&self) -> bool {
        self.delete_batch(None)
    }

    /// Batch-deletes what `request` matches, then saves.
    ///
    /// Without a request every entity of kind `T` is targeted. A supplied
    /// request is used verbatim, including its entity kind: a store for `T`
    /// can clear another kind this way on purpose.
    pub fn delete_batch(&self, request: Option<QuerySpec>) -> bool {
        let spec = request.unwrap_or_else(|| self.fetch_request());
        if spec.entity_name != T::ENTITY_NAME {
            info!(
                "event=store_batch_delete module=store status=start store_entity={} target_entity={} cross_kind=true",
                T::ENTITY_NAME,
                spec.entity_name
            );
        }
        self.execute_then_save(&BatchDeleteRequest::Query(spec))
    }

    /// Batch-deletes `entities` by identifier, then saves.
    ///
    /// An empty slice deletes nothing but still saves.
    pub fn delete_objects<E: AsRef<ManagedObject>>(&self, entities: &[E]) -> bool {
        let ids = entities
            .iter()
            .map(|entity| entity.as_ref().id())
            .collect::<Vec<_>>();
        self.execute_then_save(&BatchDeleteRequest::Ids(ids))
    }

    /// Registers an already constructed entity as a pending insert and saves.
    pub fn insert<E: AsRef<ManagedObject>>(&self, entity: &E) -> bool {
        if let Err(err) = self.context.track(entity.as_ref()) {
            warn!(
                "event=store_insert module=store status=error entity={} error={}",
                T::ENTITY_NAME,
                err
            );
            return false;
        }
        self.save()
    }

    /// Commits whatever edits were made to tracked entities.
    pub fn update(&self) -> bool {
        self.save()
    }

    /// Commits all pending context changes.
    ///
    /// On failure the context keeps its pending changes; nothing is retried.
    pub fn save(&self) -> bool {
        match self.context.commit() {
            Ok(()) => true,
            Err(err) => {
                warn!(
                    "event=store_save module=store status=error entity={} error={}",
                    T::ENTITY_NAME,
                    err
                );
                false
            }
        }
    }

    /// Fetches entities of kind `T`, optionally sorted and filtered.
    ///
    /// Returns `None` when the query fails.
    pub fn fetch(
        &self,
        sort: Option<&[SortKey]>,
        predicate: Option<Predicate>,
    ) -> Option<Vec<Entity<T>>> {
        let mut spec = self.fetch_request();
        spec.sort = sort.map(<[SortKey]>::to_vec).unwrap_or_default();
        spec.predicate = predicate;
        self.fetch_with(&spec)
    }

    /// Default request matching every entity of kind `T`.
    pub fn fetch_request(&self) -> QuerySpec {
        QuerySpec::for_kind::<T>()
    }

    /// Runs `spec` and keeps only results of kind `T`.
    pub fn fetch_with(&self, spec: &QuerySpec) -> Option<Vec<Entity<T>>> {
        match self.context.query(spec) {
            Ok(objects) => Some(objects.into_iter().filter_map(Entity::from_object).collect()),
            Err(err) => {
                warn!(
                    "event=store_fetch module=store status=error entity={} error={}",
                    T::ENTITY_NAME,
                    err
                );
                None
            }
        }
    }

    /// Counts entities of kind `T` matching `predicate`.
    pub fn count(&self, predicate: Option<Predicate>) -> Option<usize> {
        let mut spec = self.fetch_request();
        spec.predicate = predicate;
        self.fetch_with(&spec).map(|entities| entities.len())
    }

    fn execute_then_save(&self, request: &BatchDeleteRequest) -> bool {
        match self.context.execute_batch_delete(request) {
            Ok(removed) => {
                debug!(
                    "event=store_batch_delete module=store status=ok entity={} removed={}",
                    T::ENTITY_NAME,
                    removed
                );
                self.save()
            }
            Err(err) => {
                warn!(
                    "event=store_batch_delete module=store status=error entity={} error={}",
                    T::ENTITY_NAME,
                    err
                );
                false
            }
        }
    }
}

impl<T, C> Clone for TypedStore<'_, T, C>
where
    T: EntityKind,
    C: PersistenceContext + ?Sized,
{
    fn clone(&self) -> Self {
        *self
    }
}

impl<T, C> Copy for TypedStore<'_, T, C>
where
    T: EntityKind,
    C: PersistenceContext + ?Sized,
{
}
