//! End-to-end transaction scenarios: create/read/write, delete cascades,
//! and rollback on a failed commit.

use std::collections::BTreeMap;

use permadb::{
    Database, DatabaseOptions, Field, MemKv, ObjectType, OnDelete, Schema, SchemaBuilder,
    SimpleType, SubField, SubFieldKind, Value,
};

fn schema_with_books_and_authors() -> Schema {
    let mut author_fields = BTreeMap::new();
    author_fields.insert(
        10,
        Field::Simple {
            storage_id: 10,
            name: "name".into(),
            simple_type: SimpleType::String,
            indexed: true,
            unique: false,
            conversion_policy: None,
        },
    );

    let mut book_fields = BTreeMap::new();
    book_fields.insert(
        10,
        Field::Simple {
            storage_id: 10,
            name: "title".into(),
            simple_type: SimpleType::String,
            indexed: true,
            unique: false,
            conversion_policy: None,
        },
    );
    book_fields.insert(
        20,
        Field::Reference {
            storage_id: 20,
            name: "author".into(),
            target_type: Some(1),
            on_delete: OnDelete::Delete,
            allow_dangling: false,
            forward_delete: false,
        },
    );
    book_fields.insert(
        30,
        Field::Set {
            storage_id: 30,
            name: "tags".into(),
            element: SubField {
                storage_id: 1,
                kind: SubFieldKind::Simple {
                    simple_type: SimpleType::String,
                    indexed: false,
                },
            },
        },
    );

    SchemaBuilder::new()
        .object_type(ObjectType {
            storage_id: 1,
            name: "Author".into(),
            fields: author_fields,
        })
        .object_type(ObjectType {
            storage_id: 2,
            name: "Book".into(),
            fields: book_fields,
        })
        .build()
        .unwrap()
}

#[test]
fn create_write_commit_and_read_back() {
    let kv = MemKv::new();
    let schema = schema_with_books_and_authors();
    let db = Database::open(kv, &schema, DatabaseOptions::new().allow_new_schema(true)).unwrap();

    let mut txn = db.begin().unwrap();
    let author = txn.create(1).unwrap();
    txn.write_simple(author, 10, Value::String("Ursula K. Le Guin".into()))
        .unwrap();
    let book = txn.create(2).unwrap();
    txn.write_simple(book, 10, Value::String("The Dispossessed".into()))
        .unwrap();
    txn.write_simple(book, 20, Value::U64(author.raw())).unwrap();
    txn.add_set(book, 30, &Value::String("scifi".into())).unwrap();
    txn.commit().unwrap();

    let txn2 = db.begin().unwrap();
    assert!(txn2.exists(book).unwrap());
    assert_eq!(
        txn2.read_simple(book, 10).unwrap(),
        Value::String("The Dispossessed".into())
    );
    assert_eq!(txn2.iter_set(book, 30).unwrap(), vec![b"scifi".to_vec()]);
}

#[test]
fn deleting_author_cascades_to_book_via_on_delete() {
    let kv = MemKv::new();
    let schema = schema_with_books_and_authors();
    let db = Database::open(kv, &schema, DatabaseOptions::new().allow_new_schema(true)).unwrap();

    let mut txn = db.begin().unwrap();
    let author = txn.create(1).unwrap();
    let book = txn.create(2).unwrap();
    txn.write_simple(book, 20, Value::U64(author.raw())).unwrap();
    txn.commit().unwrap();

    let mut txn2 = db.begin().unwrap();
    txn2.delete(author).unwrap();
    txn2.commit().unwrap();

    let txn3 = db.begin().unwrap();
    assert!(!txn3.exists(author).unwrap());
    assert!(!txn3.exists(book).unwrap());
}

#[test]
fn failed_commit_leaves_store_untouched() {
    let kv = MemKv::new();
    let schema = schema_with_books_and_authors();
    let db = Database::open(kv, &schema, DatabaseOptions::new().allow_new_schema(true)).unwrap();

    let mut txn = db.begin().unwrap();
    let book = txn.create(2).unwrap();
    // References a nonexistent author; allow_dangling is false, so commit-time
    // structural validation should reject this.
    txn.write_simple(book, 20, Value::U64(0xDEAD_BEEF)).unwrap();
    let err = txn.commit();
    assert!(matches!(
        err,
        Err(permadb::DatabaseError::DanglingReference { .. })
    ));

    let txn2 = db.begin().unwrap();
    assert!(!txn2.exists(book).unwrap());
}

#[test]
fn iter_objects_and_iter_all_objects_enumerate_created_objects() {
    let kv = MemKv::new();
    let schema = schema_with_books_and_authors();
    let db = Database::open(kv, &schema, DatabaseOptions::new().allow_new_schema(true)).unwrap();

    let mut txn = db.begin().unwrap();
    let author = txn.create(1).unwrap();
    let book1 = txn.create(2).unwrap();
    let book2 = txn.create(2).unwrap();
    txn.commit().unwrap();

    let txn2 = db.begin().unwrap();
    let mut authors = txn2.iter_objects(1).unwrap();
    authors.sort();
    assert_eq!(authors, vec![author]);

    let mut books = txn2.iter_objects(2).unwrap();
    books.sort();
    let mut expected_books = vec![book1, book2];
    expected_books.sort();
    assert_eq!(books, expected_books);

    let mut all = txn2.iter_all_objects().unwrap();
    all.sort();
    let mut expected_all = vec![author, book1, book2];
    expected_all.sort();
    assert_eq!(all, expected_all);
}

#[test]
fn schema_of_resolves_the_object_s_recorded_version() {
    let kv = MemKv::new();
    let schema = schema_with_books_and_authors();
    let db = Database::open(kv, &schema, DatabaseOptions::new().allow_new_schema(true)).unwrap();

    let mut txn = db.begin().unwrap();
    let author = txn.create(1).unwrap();
    txn.commit().unwrap();

    let txn2 = db.begin().unwrap();
    let resolved = txn2.schema_of(author).unwrap();
    assert!(resolved.object_type(1).is_ok());
}

#[test]
fn commit_callback_runs_only_after_successful_commit() {
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;

    let kv = MemKv::new();
    let schema = schema_with_books_and_authors();
    let db = Database::open(kv, &schema, DatabaseOptions::new().allow_new_schema(true)).unwrap();

    let ran = Arc::new(AtomicBool::new(false));
    let ran_clone = ran.clone();
    let mut txn = db.begin().unwrap();
    txn.create(1).unwrap();
    txn.add_commit_callback(move || ran_clone.store(true, Ordering::SeqCst));
    assert!(!ran.load(Ordering::SeqCst));
    txn.commit().unwrap();
    assert!(ran.load(Ordering::SeqCst));
}

#[test]
fn read_only_database_rejects_mutations() {
    let kv = MemKv::new();
    let schema = schema_with_books_and_authors();
    let db = Database::open(kv.clone(), &schema, DatabaseOptions::new().allow_new_schema(true)).unwrap();
    {
        let mut txn = db.begin().unwrap();
        txn.create(1).unwrap();
        txn.commit().unwrap();
    }

    let ro = Database::open(kv, &schema, DatabaseOptions::new().read_only(true)).unwrap();
    let mut txn = ro.begin().unwrap();
    let err = txn.create(1);
    assert!(matches!(err, Err(permadb::DatabaseError::ReadOnly)));
}
