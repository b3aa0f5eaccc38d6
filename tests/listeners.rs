//! Listener dispatch and the commit-time validation queue.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use permadb::{
    Database, DatabaseOptions, Event, Field, ListenerKind, MemKv, ObjectType, Schema, SchemaBuilder,
    SimpleType, ValidationMode, Value,
};

fn counter_schema() -> Schema {
    let mut fields = BTreeMap::new();
    fields.insert(
        10,
        Field::Simple {
            storage_id: 10,
            name: "label".into(),
            simple_type: SimpleType::String,
            indexed: false,
            unique: false,
            conversion_policy: None,
        },
    );
    SchemaBuilder::new()
        .object_type(ObjectType {
            storage_id: 1,
            name: "Widget".into(),
            fields,
        })
        .build()
        .unwrap()
}

#[test]
fn create_and_delete_events_fire_in_order() {
    let kv = MemKv::new();
    let schema = counter_schema();
    let db = Database::open(kv, &schema, DatabaseOptions::new().allow_new_schema(true)).unwrap();

    let created = Arc::new(AtomicUsize::new(0));
    let deleted = Arc::new(AtomicUsize::new(0));
    {
        let c = created.clone();
        db.register_listener(ListenerKind::Create, |_| true, move |_| {
            c.fetch_add(1, Ordering::SeqCst);
        });
    }
    {
        let d = deleted.clone();
        db.register_listener(ListenerKind::Delete, |_| true, move |_| {
            d.fetch_add(1, Ordering::SeqCst);
        });
    }

    let mut txn = db.begin().unwrap();
    let id = txn.create(1).unwrap();
    txn.delete(id).unwrap();
    txn.commit().unwrap();

    assert_eq!(created.load(Ordering::SeqCst), 1);
    assert_eq!(deleted.load(Ordering::SeqCst), 1);
}

#[test]
fn field_change_listener_observes_simple_write() {
    let kv = MemKv::new();
    let schema = counter_schema();
    let db = Database::open(kv, &schema, DatabaseOptions::new().allow_new_schema(true)).unwrap();

    let last_value = Arc::new(std::sync::Mutex::new(None));
    {
        let last_value = last_value.clone();
        db.register_listener(ListenerKind::FieldChange, |_| true, move |event| {
            if let Event::SimpleChange { new, .. } = event {
                *last_value.lock().unwrap() = Some(new.clone());
            }
        });
    }

    let mut txn = db.begin().unwrap();
    let id = txn.create(1).unwrap();
    txn.write_simple(id, 10, Value::String("hello".into())).unwrap();
    txn.commit().unwrap();

    assert_eq!(
        last_value.lock().unwrap().clone(),
        Some(Value::String("hello".into()))
    );
}

#[test]
fn registered_validator_can_reject_commit() {
    let kv = MemKv::new();
    let schema = counter_schema();
    let mut db = Database::open(kv, &schema, DatabaseOptions::new().allow_new_schema(true)).unwrap();
    db.register_validator(|id| {
        Err(permadb::DatabaseError::ValidationError {
            object: id,
            message: "widgets must have a label".into(),
        })
    });

    let mut txn = db.begin().unwrap();
    txn.create(1).unwrap();
    let err = txn.commit();
    assert!(matches!(
        err,
        Err(permadb::DatabaseError::ValidationError { .. })
    ));
}

#[test]
fn manual_validation_mode_skips_queue_unless_revalidated() {
    let kv = MemKv::new();
    let schema = counter_schema();
    let mut db = Database::open(
        kv,
        &schema,
        DatabaseOptions::new()
            .allow_new_schema(true)
            .validation_mode(ValidationMode::Manual),
    )
    .unwrap();
    let calls = Arc::new(AtomicUsize::new(0));
    {
        let calls = calls.clone();
        db.register_validator(move |_id| {
            calls.fetch_add(1, Ordering::SeqCst);
            Ok(())
        });
    }

    let mut txn = db.begin().unwrap();
    let id = txn.create(1).unwrap();
    txn.commit().unwrap();
    assert_eq!(calls.load(Ordering::SeqCst), 0);

    let mut txn2 = db.begin().unwrap();
    txn2.revalidate(id);
    txn2.commit().unwrap();
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}
