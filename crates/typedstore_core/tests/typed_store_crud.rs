mod common;

use common::{model, Ghost, Order, User};
use serde_json::json;
use typedstore_core::db::open_db_in_memory;
use typedstore_core::{Entity, PersistenceContext, Predicate, SqliteContext, TypedStore};
use uuid::Uuid;

#[test]
fn lookup_returns_none_for_missing_or_absent_ids() {
    let conn = open_db_in_memory().unwrap();
    let context = SqliteContext::try_new(&conn, &model()).unwrap();
    let users: TypedStore<'_, User, _> = TypedStore::new(&context);

    assert!(users.lookup(None).is_none());
    assert!(users.lookup(Some(Uuid::new_v4())).is_none());
}

#[test]
fn lookup_returns_none_for_other_kind() {
    let conn = open_db_in_memory().unwrap();
    let context = SqliteContext::try_new(&conn, &model()).unwrap();
    let users: TypedStore<'_, User, _> = TypedStore::new(&context);
    let orders: TypedStore<'_, Order, _> = TypedStore::new(&context);

    let order = orders.create_entity().unwrap();
    assert!(orders.save());

    assert!(users.lookup(Some(order.id())).is_none());
    assert_eq!(orders.lookup(Some(order.id())), Some(order));
}

#[test]
fn entity_name_comes_from_kind_witness() {
    let conn = open_db_in_memory().unwrap();
    let context = SqliteContext::try_new(&conn, &model()).unwrap();
    let users: TypedStore<'_, User, _> = TypedStore::new(&context);

    assert_eq!(users.entity_name(), "User");
    assert_eq!(users.fetch_request().entity_name, "User");
}

#[test]
fn created_entity_is_saved_and_reloaded() {
    let conn = open_db_in_memory().unwrap();
    let id = {
        let context = SqliteContext::try_new(&conn, &model()).unwrap();
        let users: TypedStore<'_, User, _> = TypedStore::new(&context);

        let user = users.create_entity().unwrap();
        user.set("name", "Alice");
        user.set("age", 30);
        assert!(context.has_changes());
        assert!(users.save());
        assert!(!context.has_changes());

        let same = users.lookup(Some(user.id())).unwrap();
        assert!(same.object().same_object(user.object()));
        user.id()
    };

    let context = SqliteContext::try_new(&conn, &model()).unwrap();
    let users: TypedStore<'_, User, _> = TypedStore::new(&context);
    let reloaded = users.lookup(Some(id)).unwrap();
    assert_eq!(reloaded.get("name"), Some(json!("Alice")));
    assert_eq!(reloaded.get("age"), Some(json!(30)));
}

#[test]
fn create_entity_for_unregistered_kind_returns_none_without_pending_changes() {
    let conn = open_db_in_memory().unwrap();
    let context = SqliteContext::try_new(&conn, &model()).unwrap();
    let ghosts: TypedStore<'_, Ghost, _> = TypedStore::new(&context);

    assert!(ghosts.create_entity().is_none());
    assert!(!context.has_changes());
}

#[test]
fn insert_then_lookup_returns_equal_entity() {
    let conn = open_db_in_memory().unwrap();
    let context = SqliteContext::try_new(&conn, &model()).unwrap();
    let users: TypedStore<'_, User, _> = TypedStore::new(&context);

    let user = Entity::<User>::new();
    user.set("name", "Bob");
    assert!(users.insert(&user));

    let found = users.lookup(Some(user.id())).unwrap();
    assert_eq!(found, user);
    assert_eq!(found.get("name"), Some(json!("Bob")));
}

#[test]
fn insert_of_unregistered_kind_fails() {
    let conn = open_db_in_memory().unwrap();
    let context = SqliteContext::try_new(&conn, &model()).unwrap();
    let ghosts: TypedStore<'_, Ghost, _> = TypedStore::new(&context);

    assert!(!ghosts.insert(&Entity::<Ghost>::new()));
    assert!(!context.has_changes());
}

#[test]
fn object_tracked_by_one_context_cannot_be_inserted_into_another() {
    let conn = open_db_in_memory().unwrap();
    let first = SqliteContext::try_new(&conn, &model()).unwrap();
    let second = SqliteContext::try_new(&conn, &model()).unwrap();
    let first_users: TypedStore<'_, User, _> = TypedStore::new(&first);
    let second_users: TypedStore<'_, User, _> = TypedStore::new(&second);

    let user = first_users.create_entity().unwrap();

    assert!(!second_users.insert(&user));
    assert!(!second.has_changes());
    assert_eq!(user.object().owner(), Some(first.context_id()));
}

#[test]
fn inserting_a_second_object_with_a_tracked_id_fails() {
    let conn = open_db_in_memory().unwrap();
    let context = SqliteContext::try_new(&conn, &model()).unwrap();
    let users: TypedStore<'_, User, _> = TypedStore::new(&context);

    let user = users.create_entity().unwrap();
    assert!(users.save());

    assert!(!users.insert(&Entity::<User>::with_id(user.id())));
}

#[test]
fn inserting_a_handle_for_a_stored_row_is_refused_without_pending_changes() {
    let conn = open_db_in_memory().unwrap();
    let stored_id = {
        let first = SqliteContext::try_new(&conn, &model()).unwrap();
        let users: TypedStore<'_, User, _> = TypedStore::new(&first);
        let user = users.create_entity().unwrap();
        assert!(users.save());
        user.id()
    };

    let context = SqliteContext::try_new(&conn, &model()).unwrap();
    let users: TypedStore<'_, User, _> = TypedStore::new(&context);
    let orders: TypedStore<'_, Order, _> = TypedStore::new(&context);

    let duplicate = Entity::<User>::with_id(stored_id);
    assert!(!users.insert(&duplicate));
    assert!(duplicate.object().owner().is_none());
    assert!(!context.has_changes());

    orders.create_entity().unwrap();
    assert!(orders.save());
    assert!(orders.delete_all());
    assert_eq!(users.count(None), Some(1));
}

#[test]
fn commit_failure_returns_false_and_keeps_pending_changes() {
    let conn = open_db_in_memory().unwrap();
    let first = SqliteContext::try_new(&conn, &model()).unwrap();
    let second = SqliteContext::try_new(&conn, &model()).unwrap();
    let first_users: TypedStore<'_, User, _> = TypedStore::new(&first);
    let second_users: TypedStore<'_, User, _> = TypedStore::new(&second);

    let user = first_users.create_entity().unwrap();
    let other = first_users.create_entity().unwrap();
    assert!(first_users.save());
    assert!(second_users.delete_objects(&[user.clone()]));

    user.set("name", "stale");
    other.set("name", "kept");
    assert!(!first_users.save());
    assert!(first.has_changes());
    assert!(!first_users.save());

    first.rollback();
    assert!(!first.has_changes());
    assert!(first_users.save());
    assert!(first_users.lookup(Some(user.id())).is_none());
    assert_eq!(other.get("name"), None);
}

#[test]
fn delete_removes_entity_after_save() {
    let conn = open_db_in_memory().unwrap();
    let context = SqliteContext::try_new(&conn, &model()).unwrap();
    let users: TypedStore<'_, User, _> = TypedStore::new(&context);

    let user = users.create_entity().unwrap();
    assert!(users.save());

    assert!(users.delete(&user));
    assert!(users.lookup(Some(user.id())).is_none());

    let fresh = SqliteContext::try_new(&conn, &model()).unwrap();
    let fresh_users: TypedStore<'_, User, _> = TypedStore::new(&fresh);
    assert!(fresh_users.lookup(Some(user.id())).is_none());
}

#[test]
fn deleting_a_pending_insert_never_stores_it() {
    let conn = open_db_in_memory().unwrap();
    let context = SqliteContext::try_new(&conn, &model()).unwrap();
    let users: TypedStore<'_, User, _> = TypedStore::new(&context);

    let user = users.create_entity().unwrap();
    assert!(users.delete(&user));

    assert_eq!(users.count(None), Some(0));
    assert!(user.object().owner().is_none());
}

#[test]
fn update_persists_field_edits_and_is_repeatable() {
    let conn = open_db_in_memory().unwrap();
    let context = SqliteContext::try_new(&conn, &model()).unwrap();
    let users: TypedStore<'_, User, _> = TypedStore::new(&context);

    let user = users.create_entity().unwrap();
    user.set("age", 30);
    assert!(users.save());

    user.set("age", 31);
    assert!(users.update());
    assert!(users.update());

    let fresh = SqliteContext::try_new(&conn, &model()).unwrap();
    let fresh_users: TypedStore<'_, User, _> = TypedStore::new(&fresh);
    let reloaded = fresh_users.lookup(Some(user.id())).unwrap();
    assert_eq!(reloaded.get("age"), Some(json!(31)));
}

#[test]
fn update_of_row_removed_elsewhere_reports_failure() {
    let conn = open_db_in_memory().unwrap();
    let first = SqliteContext::try_new(&conn, &model()).unwrap();
    let second = SqliteContext::try_new(&conn, &model()).unwrap();
    let first_users: TypedStore<'_, User, _> = TypedStore::new(&first);
    let second_users: TypedStore<'_, User, _> = TypedStore::new(&second);

    let user = first_users.create_entity().unwrap();
    assert!(first_users.save());
    assert!(second_users.delete_all());

    user.set("name", "stale");
    assert!(!first_users.update());
}

#[test]
fn rollback_restores_stored_fields() {
    let conn = open_db_in_memory().unwrap();
    let context = SqliteContext::try_new(&conn, &model()).unwrap();
    let users: TypedStore<'_, User, _> = TypedStore::new(&context);

    let user = users.create_entity().unwrap();
    user.set("name", "Alice");
    assert!(users.save());

    user.set("name", "Mallory");
    let unsaved = users.create_entity().unwrap();
    context.rollback();

    assert_eq!(user.get("name"), Some(json!("Alice")));
    assert!(!context.has_changes());
    assert!(users.lookup(Some(unsaved.id())).is_none());
}

#[test]
fn create_set_save_then_fetch_by_name() {
    let conn = open_db_in_memory().unwrap();
    let context = SqliteContext::try_new(&conn, &model()).unwrap();
    let users: TypedStore<'_, User, _> = TypedStore::new(&context);

    let other = users.create_entity().unwrap();
    other.set("name", "Bob");
    let alice = users.create_entity().unwrap();
    alice.set("name", "Alice");
    assert!(users.save());

    let found = users
        .fetch(None, Some(Predicate::eq("name", "Alice")))
        .unwrap();
    assert_eq!(found, vec![alice]);
}

#[test]
fn deleting_an_entity_owned_by_another_context_fails_and_keeps_it() {
    let conn = open_db_in_memory().unwrap();
    let first = SqliteContext::try_new(&conn, &model()).unwrap();
    let second = SqliteContext::try_new(&conn, &model()).unwrap();
    let first_users: TypedStore<'_, User, _> = TypedStore::new(&first);
    let second_users: TypedStore<'_, User, _> = TypedStore::new(&second);

    let user = first_users.create_entity().unwrap();
    assert!(first_users.save());

    assert!(!second_users.delete(&user));
    assert!(!second.has_changes());
    assert_eq!(second_users.lookup(Some(user.id())), Some(user.clone()));
    assert_eq!(first_users.lookup(Some(user.id())), Some(user));
}

#[test]
fn deleting_a_detached_handle_removes_the_stored_row() {
    let conn = open_db_in_memory().unwrap();
    let context = SqliteContext::try_new(&conn, &model()).unwrap();
    let users: TypedStore<'_, User, _> = TypedStore::new(&context);

    let user = users.create_entity().unwrap();
    assert!(users.save());

    assert!(users.delete(&Entity::<User>::with_id(user.id())));
    assert!(users.lookup(Some(user.id())).is_none());
    assert!(user.object().owner().is_none());

    let fresh = SqliteContext::try_new(&conn, &model()).unwrap();
    let fresh_users: TypedStore<'_, User, _> = TypedStore::new(&fresh);
    assert!(fresh_users.lookup(Some(user.id())).is_none());
}

#[test]
fn deleting_a_detached_handle_without_stored_row_fails() {
    let conn = open_db_in_memory().unwrap();
    let context = SqliteContext::try_new(&conn, &model()).unwrap();
    let users: TypedStore<'_, User, _> = TypedStore::new(&context);
    let orders: TypedStore<'_, Order, _> = TypedStore::new(&context);

    assert!(!users.delete(&Entity::<User>::new()));

    let order = orders.create_entity().unwrap();
    assert!(orders.save());
    assert!(!users.delete(&Entity::<User>::with_id(order.id())));
    assert_eq!(orders.lookup(Some(order.id())), Some(order));
}
