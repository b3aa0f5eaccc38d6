// SPDX-License-Identifier: MIT OR Apache-2.0

#![forbid(unsafe_code)]

//! A typed object persistence layer over a sorted key-value store, in the
//! style of Permazen/JSimpleDB: a schema model of object types and typed
//! fields, an order-preserving byte codec, a flat key layout over an
//! abstract KV boundary, and an index/listener/validation subsystem built
//! on top.
//!
//! The crate ships exactly one concrete KV backend, [`mem::MemKv`], an
//! in-memory store used for tests and small embedded uses. Production
//! backends (RocksDB, LevelDB, FoundationDB, ...) are expected to be
//! implemented downstream against the [`kv::KvStore`]/[`kv::KvTransaction`]
//! traits.
//!
//! # Example
//!
//! ```
//! use std::collections::BTreeMap;
//! use permadb::{
//!     Database, DatabaseOptions, Field, MemKv, ObjectType, SchemaBuilder, SimpleType, Value,
//! };
//!
//! let mut fields = BTreeMap::new();
//! fields.insert(
//!     10,
//!     Field::Simple {
//!         storage_id: 10,
//!         name: "name".into(),
//!         simple_type: SimpleType::String,
//!         indexed: true,
//!         unique: false,
//!         conversion_policy: None,
//!     },
//! );
//! let schema = SchemaBuilder::new()
//!     .object_type(ObjectType { storage_id: 1, name: "Person".into(), fields })
//!     .build()
//!     .unwrap();
//!
//! let db = Database::open(MemKv::new(), &schema, DatabaseOptions::new().allow_new_schema(true)).unwrap();
//! let mut txn = db.begin().unwrap();
//! let id = txn.create(1).unwrap();
//! txn.write_simple(id, 10, Value::String("Ada".into())).unwrap();
//! txn.commit().unwrap();
//! ```

pub mod codec;
pub mod config;
pub mod database;
pub mod error;
pub mod index;
pub mod keys;
pub mod kv;
pub mod listener;
pub mod mem;
#[cfg(feature = "metrics")]
pub mod metrics;
pub mod objid;
pub mod schema;
pub mod txn;
pub mod value;

pub use config::{ConversionPolicy, DatabaseOptions, ValidationMode};
pub use database::Database;
pub use error::{CodecError, DatabaseError, Result};
pub use kv::{KeyRange, KvPair, KvStore, KvTransaction};
pub use listener::{Event, ListenerHandle, ListenerKind, ListenerRegistry, Validator};
pub use mem::{MemKv, MemTxn};
pub use objid::ObjId;
pub use schema::{
    CompositeIndex, Field, ObjectType, OnDelete, Schema, SchemaBuilder, SchemaId, SchemaRegistry,
    SchemaVersion, SimpleType, SubField, SubFieldKind,
};
pub use txn::Transaction;
pub use value::{RefValue, UntypedObject, Value};
