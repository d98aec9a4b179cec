//! SQLite-backed persistence context.
//!
//! # Responsibility
//! - Keep an identity map of objects handed out to callers.
//! - Collect inserts, field edits and deletions until `commit`.
//! - Execute batch deletes directly against storage.
//!
//! # Invariants
//! - `commit` writes all pending changes in one immediate transaction, or none.
//! - Queries see pending changes: deletions hidden, inserts and edits visible.
//! - Batch deletes bypass the pending set and evict what they remove.

use super::{ContextError, ContextResult, PersistenceContext};
use crate::db::migrations::latest_version;
use crate::model::object::{ContextId, EntityId, FieldMap, ManagedObject};
use crate::model::schema::DataModel;
use crate::query::spec::{BatchDeleteRequest, QuerySpec};
use log::{debug, error, info, warn};
use rusqlite::{params, Connection, OptionalExtension, Transaction, TransactionBehavior};
use std::cell::RefCell;
use std::collections::{BTreeSet, HashMap, HashSet};
use std::time::Instant;
use uuid::Uuid;

/// Unit of work over one migrated SQLite connection.
///
/// Not `Sync`: one context is confined to the thread that created it.
pub struct SqliteContext<'conn> {
    conn: &'conn Connection,
    id: ContextId,
    schemas: BTreeSet<String>,
    state: RefCell<PendingState>,
}

#[derive(Default)]
struct PendingState {
    registered: HashMap<EntityId, ManagedObject>,
    inserted: Vec<EntityId>,
    deleted: HashSet<EntityId>,
}

struct CommitPlan {
    inserted: Vec<ManagedObject>,
    updated: Vec<ManagedObject>,
    deleted: Vec<EntityId>,
}

impl CommitPlan {
    fn is_empty(&self) -> bool {
        self.inserted.is_empty() && self.updated.is_empty() && self.deleted.is_empty()
    }
}

struct StoredRow {
    id: EntityId,
    entity: String,
    fields: String,
}

impl<'conn> SqliteContext<'conn> {
    /// Creates a context over a migrated connection and registers `model`.
    ///
    /// Entity kinds registered earlier on the same database stay known.
    ///
    /// # Errors
    /// - Returns `UninitializedConnection` for unmigrated connections.
    /// - Returns `Model` when `model` contains invalid entity names.
    pub fn try_new(conn: &'conn Connection, model: &DataModel) -> ContextResult<Self> {
        ensure_context_connection_ready(conn)?;
        model.validate()?;
        register_schemas(conn, model)?;
        let schemas = load_schemas(conn)?;
        let id = ContextId::next();

        info!(
            "event=context_open module=context status=ok context={:?} entities={}",
            id,
            schemas.len()
        );

        Ok(Self {
            conn,
            id,
            schemas,
            state: RefCell::new(PendingState::default()),
        })
    }

    pub fn context_id(&self) -> ContextId {
        self.id
    }

    /// Returns sorted entity names known to this context.
    pub fn entity_names(&self) -> impl Iterator<Item = &str> {
        self.schemas.iter().map(String::as_str)
    }

    pub fn knows_entity(&self, entity_name: &str) -> bool {
        self.schemas.contains(entity_name)
    }

    fn ensure_known(&self, entity_name: &str) -> ContextResult<()> {
        if self.knows_entity(entity_name) {
            Ok(())
        } else {
            Err(ContextError::UnknownEntity(entity_name.to_string()))
        }
    }

    fn register_loaded(&self, object: ManagedObject) -> ManagedObject {
        self.state
            .borrow_mut()
            .registered
            .entry(object.id())
            .or_insert(object)
            .clone()
    }

    fn plan_commit(&self) -> CommitPlan {
        let state = self.state.borrow();
        let inserted: Vec<ManagedObject> = state
            .inserted
            .iter()
            .filter_map(|id| state.registered.get(id).cloned())
            .collect();
        let pending_inserts: HashSet<&EntityId> = state.inserted.iter().collect();
        let updated = state
            .registered
            .values()
            .filter(|object| object.is_dirty())
            .filter(|object| {
                let id = object.id();
                !pending_inserts.contains(&id) && !state.deleted.contains(&id)
            })
            .cloned()
            .collect();
        let mut deleted: Vec<EntityId> = state.deleted.iter().copied().collect();
        deleted.sort();

        CommitPlan {
            inserted,
            updated,
            deleted,
        }
    }

    fn finish_commit(&self, plan: &CommitPlan) {
        let mut state = self.state.borrow_mut();
        state.inserted.clear();
        for id in &plan.deleted {
            state.deleted.remove(id);
            if let Some(object) = state.registered.remove(id) {
                object.detach();
            }
        }
        for object in plan.inserted.iter().chain(plan.updated.iter()) {
            object.mark_clean();
        }
    }

    fn evict(&self, ids: &[EntityId]) -> usize {
        let mut state = self.state.borrow_mut();
        let mut dropped_inserts = 0;
        for id in ids {
            if let Some(position) = state.inserted.iter().position(|pending| pending == id) {
                state.inserted.remove(position);
                dropped_inserts += 1;
            }
            state.deleted.remove(id);
            if let Some(object) = state.registered.remove(id) {
                object.detach();
            }
        }
        dropped_inserts
    }
}

impl PersistenceContext for SqliteContext<'_> {
    fn resolve(&self, id: EntityId) -> Option<ManagedObject> {
        {
            let state = self.state.borrow();
            if state.deleted.contains(&id) {
                return None;
            }
            if let Some(object) = state.registered.get(&id) {
                return Some(object.clone());
            }
        }

        let loaded = load_row(self.conn, id)
            .and_then(|row| row.map(|row| row.into_object(self.id)).transpose());
        match loaded {
            Ok(Some(object)) => Some(self.register_loaded(object)),
            Ok(None) => None,
            Err(err) => {
                warn!(
                    "event=context_resolve module=context status=error error_code=resolve_failed error={}",
                    err
                );
                None
            }
        }
    }

    fn allocate_entity(&self, entity_name: &str) -> Option<ManagedObject> {
        if !self.knows_entity(entity_name) {
            warn!(
                "event=context_allocate module=context status=error error_code=unknown_entity entity={}",
                entity_name
            );
            return None;
        }

        let object = ManagedObject::new(entity_name);
        object.attach(self.id);
        let mut state = self.state.borrow_mut();
        state.registered.insert(object.id(), object.clone());
        state.inserted.push(object.id());
        debug!(
            "event=context_allocate module=context status=ok entity={}",
            entity_name
        );
        Some(object)
    }

    fn track(&self, object: &ManagedObject) -> ContextResult<()> {
        let id = object.id();
        self.ensure_known(&object.entity_name())?;

        let mut state = self.state.borrow_mut();
        match object.owner() {
            Some(owner) if owner != self.id => return Err(ContextError::ForeignObject(id)),
            Some(_) => {
                // Re-inserting a tracked object cancels a pending deletion.
                state.deleted.remove(&id);
                return Ok(());
            }
            None => {}
        }

        if state.registered.contains_key(&id) || load_row(self.conn, id)?.is_some() {
            return Err(ContextError::DuplicateId(id));
        }

        object.attach(self.id);
        state.registered.insert(id, object.clone());
        state.inserted.push(id);
        Ok(())
    }

    fn mark_for_deletion(&self, object: &ManagedObject) -> ContextResult<()> {
        let id = object.id();
        match object.owner() {
            Some(owner) if owner != self.id => return Err(ContextError::ForeignObject(id)),
            Some(_) => {}
            None => {
                let tracked = self.resolve(id).ok_or(ContextError::StaleObject(id))?;
                if tracked.entity_name() != object.entity_name() {
                    return Err(ContextError::StaleObject(id));
                }
                debug!("event=context_delete module=context status=ok source=detached");
                return self.mark_for_deletion(&tracked);
            }
        }

        let mut state = self.state.borrow_mut();
        if let Some(position) = state.inserted.iter().position(|pending| *pending == id) {
            state.inserted.remove(position);
            state.registered.remove(&id);
            object.detach();
            return Ok(());
        }
        state.deleted.insert(id);
        Ok(())
    }

    fn execute_batch_delete(&self, request: &BatchDeleteRequest) -> ContextResult<usize> {
        let started_at = Instant::now();
        let (mode, ids) = match request {
            BatchDeleteRequest::Query(spec) => (
                "query",
                self.query(spec)?
                    .iter()
                    .map(ManagedObject::id)
                    .collect::<Vec<_>>(),
            ),
            BatchDeleteRequest::Ids(ids) => ("ids", ids.clone()),
        };

        let stored_ids: Vec<EntityId> = {
            let state = self.state.borrow();
            ids.iter()
                .filter(|id| !state.inserted.contains(*id))
                .copied()
                .collect()
        };

        let removed_rows = match delete_rows(self.conn, &stored_ids) {
            Ok(count) => count,
            Err(err) => {
                error!(
                    "event=context_batch_delete module=context status=error mode={} duration_ms={} error={}",
                    mode,
                    started_at.elapsed().as_millis(),
                    err
                );
                return Err(err);
            }
        };
        let dropped_inserts = self.evict(&ids);

        info!(
            "event=context_batch_delete module=context status=ok mode={} rows={} pending_dropped={} duration_ms={}",
            mode,
            removed_rows,
            dropped_inserts,
            started_at.elapsed().as_millis()
        );
        Ok(removed_rows + dropped_inserts)
    }

    fn query(&self, spec: &QuerySpec) -> ContextResult<Vec<ManagedObject>> {
        self.ensure_known(&spec.entity_name)?;
        let rows = load_entity_rows(self.conn, &spec.entity_name)?;

        let candidates = {
            let mut state = self.state.borrow_mut();
            let mut candidates = Vec::with_capacity(rows.len() + state.inserted.len());
            for row in rows {
                if state.deleted.contains(&row.id) {
                    continue;
                }
                let object = match state.registered.get(&row.id) {
                    Some(existing) => existing.clone(),
                    None => {
                        let object = row.into_object(self.id)?;
                        state.registered.insert(object.id(), object.clone());
                        object
                    }
                };
                candidates.push(object);
            }
            for id in &state.inserted {
                if let Some(object) = state.registered.get(id) {
                    candidates.push(object.clone());
                }
            }
            candidates
        };

        let result = spec.apply(candidates);
        debug!(
            "event=context_query module=context status=ok entity={} rows={}",
            spec.entity_name,
            result.len()
        );
        Ok(result)
    }

    fn commit(&self) -> ContextResult<()> {
        let started_at = Instant::now();
        let plan = self.plan_commit();
        if plan.is_empty() {
            debug!("event=context_commit module=context status=ok changes=0");
            return Ok(());
        }

        match write_changes(self.conn, &plan) {
            Ok(()) => {
                self.finish_commit(&plan);
                info!(
                    "event=context_commit module=context status=ok inserted={} updated={} deleted={} duration_ms={}",
                    plan.inserted.len(),
                    plan.updated.len(),
                    plan.deleted.len(),
                    started_at.elapsed().as_millis()
                );
                Ok(())
            }
            Err(err) => {
                error!(
                    "event=context_commit module=context status=error duration_ms={} error={}",
                    started_at.elapsed().as_millis(),
                    err
                );
                Err(err)
            }
        }
    }

    fn rollback(&self) {
        let dirty: Vec<ManagedObject> = {
            let mut guard = self.state.borrow_mut();
            let PendingState {
                registered,
                inserted,
                deleted,
            } = &mut *guard;
            for id in inserted.drain(..) {
                if let Some(object) = registered.remove(&id) {
                    object.detach();
                }
            }
            deleted.clear();
            registered
                .values()
                .filter(|object| object.is_dirty())
                .cloned()
                .collect()
        };

        for object in dirty {
            match load_row(self.conn, object.id()) {
                Ok(Some(row)) => match parse_fields(&row.fields) {
                    Ok(fields) => object.reset_fields(fields),
                    Err(err) => self.drop_unrecoverable(&object, &err),
                },
                Ok(None) => self.drop_unrecoverable(
                    &object,
                    &ContextError::StaleObject(object.id()),
                ),
                Err(err) => self.drop_unrecoverable(&object, &err),
            }
        }
        debug!("event=context_rollback module=context status=ok");
    }

    fn has_changes(&self) -> bool {
        let state = self.state.borrow();
        !state.inserted.is_empty()
            || !state.deleted.is_empty()
            || state.registered.values().any(ManagedObject::is_dirty)
    }
}

impl SqliteContext<'_> {
    fn drop_unrecoverable(&self, object: &ManagedObject, err: &ContextError) {
        warn!(
            "event=context_rollback module=context status=error error_code=reload_failed error={}",
            err
        );
        self.state.borrow_mut().registered.remove(&object.id());
        object.detach();
    }
}

impl StoredRow {
    fn into_object(self, owner: ContextId) -> ContextResult<ManagedObject> {
        let fields = parse_fields(&self.fields)?;
        Ok(ManagedObject::from_parts(
            self.id,
            self.entity,
            fields,
            Some(owner),
        ))
    }
}

fn write_changes(conn: &Connection, plan: &CommitPlan) -> ContextResult<()> {
    let tx = Transaction::new_unchecked(conn, TransactionBehavior::Immediate)?;

    for object in &plan.inserted {
        tx.execute(
            "INSERT INTO objects (uuid, entity, fields) VALUES (?1, ?2, ?3);",
            params![
                object.id().to_string(),
                object.entity_name(),
                serialize_fields(object)?
            ],
        )?;
    }

    for object in &plan.updated {
        let changed = tx.execute(
            "UPDATE objects
             SET
                fields = ?2,
                updated_at = (strftime('%s', 'now') * 1000)
             WHERE uuid = ?1;",
            params![object.id().to_string(), serialize_fields(object)?],
        )?;
        if changed == 0 {
            return Err(ContextError::StaleObject(object.id()));
        }
    }

    for id in &plan.deleted {
        tx.execute("DELETE FROM objects WHERE uuid = ?1;", [id.to_string()])?;
    }

    tx.commit()?;
    Ok(())
}

fn delete_rows(conn: &Connection, ids: &[EntityId]) -> ContextResult<usize> {
    if ids.is_empty() {
        return Ok(0);
    }

    let tx = Transaction::new_unchecked(conn, TransactionBehavior::Immediate)?;
    let mut removed = 0;
    {
        let mut stmt = tx.prepare("DELETE FROM objects WHERE uuid = ?1;")?;
        for id in ids {
            removed += stmt.execute([id.to_string()])?;
        }
    }
    tx.commit()?;
    Ok(removed)
}

fn load_row(conn: &Connection, id: EntityId) -> ContextResult<Option<StoredRow>> {
    let row = conn
        .query_row(
            "SELECT uuid, entity, fields FROM objects WHERE uuid = ?1;",
            [id.to_string()],
            |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                ))
            },
        )
        .optional()?;

    row.map(|(uuid, entity, fields)| {
        Ok(StoredRow {
            id: parse_uuid(&uuid)?,
            entity,
            fields,
        })
    })
    .transpose()
}

fn load_entity_rows(conn: &Connection, entity_name: &str) -> ContextResult<Vec<StoredRow>> {
    let mut stmt = conn.prepare(
        "SELECT uuid, entity, fields
         FROM objects
         WHERE entity = ?1
         ORDER BY seq ASC;",
    )?;
    let mut rows = stmt.query([entity_name])?;
    let mut loaded = Vec::new();
    while let Some(row) = rows.next()? {
        let uuid: String = row.get(0)?;
        loaded.push(StoredRow {
            id: parse_uuid(&uuid)?,
            entity: row.get(1)?,
            fields: row.get(2)?,
        });
    }
    Ok(loaded)
}

fn parse_uuid(value: &str) -> ContextResult<EntityId> {
    Uuid::parse_str(value)
        .map_err(|_| ContextError::InvalidData(format!("invalid uuid `{value}` in objects.uuid")))
}

fn parse_fields(value: &str) -> ContextResult<FieldMap> {
    serde_json::from_str(value)
        .map_err(|err| ContextError::InvalidData(format!("invalid objects.fields: {err}")))
}

fn serialize_fields(object: &ManagedObject) -> ContextResult<String> {
    object
        .with_fields(serde_json::to_string)
        .map_err(|err| ContextError::InvalidData(format!("unserializable fields: {err}")))
}

fn register_schemas(conn: &Connection, model: &DataModel) -> ContextResult<()> {
    if model.is_empty() {
        return Ok(());
    }

    let tx = Transaction::new_unchecked(conn, TransactionBehavior::Immediate)?;
    for name in model.entity_names() {
        tx.execute(
            "INSERT OR IGNORE INTO entity_schemas (name) VALUES (?1);",
            [name],
        )?;
    }
    tx.commit()?;
    Ok(())
}

fn load_schemas(conn: &Connection) -> ContextResult<BTreeSet<String>> {
    let mut stmt = conn.prepare("SELECT name FROM entity_schemas ORDER BY name ASC;")?;
    let names = stmt
        .query_map([], |row| row.get::<_, String>(0))?
        .collect::<Result<BTreeSet<_>, _>>()?;
    Ok(names)
}

fn ensure_context_connection_ready(conn: &Connection) -> ContextResult<()> {
    let expected_version = latest_version();
    let actual_version: u32 = conn.query_row("PRAGMA user_version;", [], |row| row.get(0))?;
    if actual_version != expected_version {
        return Err(ContextError::UninitializedConnection {
            expected_version,
            actual_version,
        });
    }

    for table in ["entity_schemas", "objects"] {
        if !table_exists(conn, table)? {
            return Err(ContextError::MissingRequiredTable(table));
        }
    }

    Ok(())
}

fn table_exists(conn: &Connection, table: &str) -> ContextResult<bool> {
    let exists: i64 = conn.query_row(
        "SELECT EXISTS(
            SELECT 1
            FROM sqlite_master
            WHERE type = 'table' AND name = ?1
        );",
        [table],
        |row| row.get(0),
    )?;
    Ok(exists == 1)
}
