//! Schema migration scenarios: registering a new version alongside an old
//! one and converting an object's field encoding between them.

use std::collections::BTreeMap;

use permadb::{
    ConversionPolicy, Database, DatabaseOptions, Field, MemKv, ObjectType, Schema, SchemaBuilder,
    SimpleType, Value,
};

fn widget_schema(score_type: SimpleType, conversion_policy: Option<ConversionPolicy>) -> Schema {
    let mut fields = BTreeMap::new();
    fields.insert(
        10,
        Field::Simple {
            storage_id: 10,
            name: "score".into(),
            simple_type: score_type,
            indexed: false,
            unique: false,
            conversion_policy,
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
fn attempt_policy_converts_i64_field_to_f64_across_versions() {
    let kv = MemKv::new();
    let v1 = widget_schema(SimpleType::I64, None);
    let db1 = Database::open(kv.clone(), &v1, DatabaseOptions::new().allow_new_schema(true)).unwrap();
    assert_eq!(db1.schema_version(), 1);

    let mut txn = db1.begin().unwrap();
    let widget = txn.create(1).unwrap();
    txn.write_simple(widget, 10, Value::I64(5)).unwrap();
    txn.commit().unwrap();

    let v2 = widget_schema(SimpleType::F64, None);
    let db2 = Database::open(
        kv,
        &v2,
        DatabaseOptions::new()
            .allow_new_schema(true)
            .upgrade_conversion_default(ConversionPolicy::Attempt),
    )
    .unwrap();
    assert_eq!(db2.schema_version(), 2);

    let mut txn = db2.begin().unwrap();
    txn.migrate_schema(widget, 2).unwrap();
    txn.commit().unwrap();

    let txn2 = db2.begin().unwrap();
    assert_eq!(txn2.read_simple(widget, 10).unwrap(), Value::F64(5.0));
}

#[test]
fn require_policy_fails_migration_when_conversion_is_lossy() {
    let kv = MemKv::new();
    let v1 = widget_schema(SimpleType::String, None);
    let db1 = Database::open(kv.clone(), &v1, DatabaseOptions::new().allow_new_schema(true)).unwrap();

    let mut txn = db1.begin().unwrap();
    let widget = txn.create(1).unwrap();
    txn.write_simple(widget, 10, Value::String("not a number".into())).unwrap();
    txn.commit().unwrap();

    let v2 = widget_schema(SimpleType::I64, Some(ConversionPolicy::Require));
    let db2 = Database::open(kv, &v2, DatabaseOptions::new().allow_new_schema(true)).unwrap();

    let mut txn = db2.begin().unwrap();
    let err = txn.migrate_schema(widget, 2);
    assert!(matches!(
        err,
        Err(permadb::DatabaseError::SchemaMismatch { field: 10, .. })
    ));
}

#[test]
fn reset_policy_discards_incompatible_value() {
    let kv = MemKv::new();
    let v1 = widget_schema(SimpleType::String, None);
    let db1 = Database::open(kv.clone(), &v1, DatabaseOptions::new().allow_new_schema(true)).unwrap();

    let mut txn = db1.begin().unwrap();
    let widget = txn.create(1).unwrap();
    txn.write_simple(widget, 10, Value::String("not a number".into())).unwrap();
    txn.commit().unwrap();

    let v2 = widget_schema(SimpleType::I64, Some(ConversionPolicy::Reset));
    let db2 = Database::open(kv, &v2, DatabaseOptions::new().allow_new_schema(true)).unwrap();

    let mut txn = db2.begin().unwrap();
    txn.migrate_schema(widget, 2).unwrap();
    txn.commit().unwrap();

    let txn2 = db2.begin().unwrap();
    assert_eq!(txn2.read_simple(widget, 10).unwrap(), Value::Null);
}

#[test]
fn reopening_with_identical_schema_reuses_version_number() {
    let kv = MemKv::new();
    let schema = widget_schema(SimpleType::I64, None);
    let db1 = Database::open(kv.clone(), &schema, DatabaseOptions::new().allow_new_schema(true)).unwrap();
    assert_eq!(db1.schema_version(), 1);
    let db2 = Database::open(kv, &schema, DatabaseOptions::new().allow_new_schema(true)).unwrap();
    assert_eq!(db2.schema_version(), 1);
}
