//! Index engine scenarios: simple-field range queries and composite index
//! point/prefix queries.

use std::collections::BTreeMap;
use std::ops::Bound;

use permadb::{Database, DatabaseOptions, Field, MemKv, ObjectType, Schema, SchemaBuilder, SimpleType, Value};
use permadb::CompositeIndex;

fn employee_schema() -> Schema {
    let mut fields = BTreeMap::new();
    fields.insert(
        10,
        Field::Simple {
            storage_id: 10,
            name: "department".into(),
            simple_type: SimpleType::String,
            indexed: true,
            unique: false,
            conversion_policy: None,
        },
    );
    fields.insert(
        11,
        Field::Simple {
            storage_id: 11,
            name: "level".into(),
            simple_type: SimpleType::I64,
            indexed: true,
            unique: false,
            conversion_policy: None,
        },
    );
    fields.insert(
        12,
        Field::Simple {
            storage_id: 12,
            name: "salary".into(),
            simple_type: SimpleType::I64,
            indexed: true,
            unique: false,
            conversion_policy: None,
        },
    );

    SchemaBuilder::new()
        .object_type(ObjectType {
            storage_id: 1,
            name: "Employee".into(),
            fields,
        })
        .composite_index(CompositeIndex {
            storage_id: 100,
            name: "by_department_level".into(),
            object_type: 1,
            field_ids: vec![10, 11],
            unique: false,
        })
        .build()
        .unwrap()
}

#[test]
fn simple_field_range_query_returns_ascending_order() {
    let kv = MemKv::new();
    let schema = employee_schema();
    let db = Database::open(kv, &schema, DatabaseOptions::new().allow_new_schema(true)).unwrap();

    let mut txn = db.begin().unwrap();
    let salaries = [90_000i64, 50_000, 120_000, 70_000];
    let mut ids = Vec::new();
    for s in salaries {
        let id = txn.create(1).unwrap();
        txn.write_simple(id, 12, Value::I64(s)).unwrap();
        ids.push(id);
    }
    txn.commit().unwrap();

    let txn2 = db.begin().unwrap();
    let results = txn2
        .query_index_range(1, 12, Bound::Included(&Value::I64(60_000)), Bound::Unbounded)
        .unwrap();
    let values: Vec<i64> = results
        .iter()
        .map(|(v, _)| match v {
            Value::I64(n) => *n,
            _ => unreachable!(),
        })
        .collect();
    assert_eq!(values, vec![70_000, 90_000, 120_000]);
}

#[test]
fn composite_index_exact_and_prefix_queries() {
    let kv = MemKv::new();
    let schema = employee_schema();
    let db = Database::open(kv, &schema, DatabaseOptions::new().allow_new_schema(true)).unwrap();

    let mut txn = db.begin().unwrap();
    let a = txn.create(1).unwrap();
    txn.write_simple(a, 10, Value::String("eng".into())).unwrap();
    txn.write_simple(a, 11, Value::I64(3)).unwrap();
    let b = txn.create(1).unwrap();
    txn.write_simple(b, 10, Value::String("eng".into())).unwrap();
    txn.write_simple(b, 11, Value::I64(5)).unwrap();
    let c = txn.create(1).unwrap();
    txn.write_simple(c, 10, Value::String("sales".into())).unwrap();
    txn.write_simple(c, 11, Value::I64(3)).unwrap();
    txn.commit().unwrap();

    let txn2 = db.begin().unwrap();
    let exact = txn2
        .query_composite(100, &[Value::String("eng".into()), Value::I64(3)])
        .unwrap();
    assert_eq!(exact, vec![a]);

    let mut prefix = txn2
        .query_composite_prefix(100, &[Value::String("eng".into())])
        .unwrap();
    prefix.sort();
    let mut expected = vec![a, b];
    expected.sort();
    assert_eq!(prefix, expected);
}

#[test]
fn unique_composite_index_rejects_duplicate_tuple() {
    let mut fields = BTreeMap::new();
    fields.insert(
        10,
        Field::Simple {
            storage_id: 10,
            name: "first".into(),
            simple_type: SimpleType::String,
            indexed: true,
            unique: false,
            conversion_policy: None,
        },
    );
    fields.insert(
        11,
        Field::Simple {
            storage_id: 11,
            name: "last".into(),
            simple_type: SimpleType::String,
            indexed: true,
            unique: false,
            conversion_policy: None,
        },
    );
    let schema = SchemaBuilder::new()
        .object_type(ObjectType {
            storage_id: 1,
            name: "Person".into(),
            fields,
        })
        .composite_index(CompositeIndex {
            storage_id: 200,
            name: "full_name".into(),
            object_type: 1,
            field_ids: vec![10, 11],
            unique: true,
        })
        .build()
        .unwrap();

    let kv = MemKv::new();
    let db = Database::open(kv, &schema, DatabaseOptions::new().allow_new_schema(true)).unwrap();

    let mut txn = db.begin().unwrap();
    let a = txn.create(1).unwrap();
    txn.write_simple(a, 10, Value::String("Ada".into())).unwrap();
    txn.write_simple(a, 11, Value::String("Lovelace".into())).unwrap();
    txn.commit().unwrap();

    let mut txn2 = db.begin().unwrap();
    let b = txn2.create(1).unwrap();
    txn2.write_simple(b, 10, Value::String("Ada".into())).unwrap();
    txn2.write_simple(b, 11, Value::String("Lovelace".into())).unwrap();
    let err = txn2.commit();
    assert!(matches!(
        err,
        Err(permadb::DatabaseError::UniqueViolation(200, _, _))
    ));
}
