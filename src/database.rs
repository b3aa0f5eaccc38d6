//! The top-level [`Database`] handle: owns the schema registry and the
//! persistent listener/validator registrations shared by every transaction
//! it opens (spec §4.2 "Opening", §4.6).

use std::sync::Arc;

use tracing::info;

use crate::config::DatabaseOptions;
use crate::error::Result;
use crate::kv::{KvStore, KvTransaction};
use crate::listener::{Event, ListenerHandle, ListenerKind, ListenerRegistry, Validator};
use crate::objid::ObjId;
use crate::schema::{Schema, SchemaRegistry};
use crate::txn::Transaction;

/// A handle to a typed object store over one [`KvStore`] backend, bound to
/// one logical schema (possibly spanning several registered versions).
///
/// Grounded on `sov_schema_db`'s `DB` (a cheap, `Clone`-able handle that
/// hands out fresh transactions on demand), generalized from RocksDB
/// column families to this crate's flat KV namespace.
pub struct Database<S: KvStore> {
    kv: S,
    registry: Arc<SchemaRegistry>,
    options: DatabaseOptions,
    listeners: Arc<ListenerRegistry>,
    validators: Vec<Validator>,
}

impl<S: KvStore> Database<S> {
    /// Opens a database over `kv`, resolving `schema` against the
    /// persisted registry. If `schema` is not yet registered, registers it
    /// as a new version when `options.allow_new_schema` is set, otherwise
    /// fails with [`crate::error::DatabaseError::SchemaNotRegistered`].
    pub fn open(kv: S, schema: &Schema, options: DatabaseOptions) -> Result<Self> {
        let mut txn = kv.begin()?;
        let mut registry = SchemaRegistry::load(&txn)?;
        let version = registry.open(schema, options.allow_new_schema, &mut txn)?;
        txn.commit()?;
        info!(version, "opened database");
        let options = DatabaseOptions {
            schema_version: if options.schema_version == 0 {
                version
            } else {
                options.schema_version
            },
            ..options
        };
        Ok(Database {
            kv,
            registry: Arc::new(registry),
            options,
            listeners: Arc::new(ListenerRegistry::new()),
            validators: Vec::new(),
        })
    }

    /// The schema version new transactions are bound to.
    pub fn schema_version(&self) -> u32 {
        self.options.schema_version
    }

    /// Begins a new transaction bound to this database's configured
    /// schema version.
    pub fn begin(&self) -> Result<Transaction<S::Txn>> {
        let txn = self.kv.begin()?;
        let schema = self
            .registry
            .get(self.options.schema_version)
            .cloned()
            .ok_or_else(|| {
                crate::error::DatabaseError::InvalidSchema(format!(
                    "no schema version {}",
                    self.options.schema_version
                ))
            })?;
        Ok(Transaction::new(
            txn,
            schema,
            self.options.schema_version,
            self.registry.clone(),
            self.options.clone(),
            self.listeners.clone(),
            self.validators.clone(),
        ))
    }

    /// Begins a transaction explicitly bound to `version` rather than this
    /// database's default, e.g. to read an object still at an older
    /// version before calling [`Transaction::migrate_schema`].
    pub fn begin_at(&self, version: u32) -> Result<Transaction<S::Txn>> {
        let txn = self.kv.begin()?;
        let schema = self
            .registry
            .get(version)
            .cloned()
            .ok_or_else(|| crate::error::DatabaseError::InvalidSchema(format!("no schema version {version}")))?;
        Ok(Transaction::new(
            txn,
            schema,
            version,
            self.registry.clone(),
            self.options.clone(),
            self.listeners.clone(),
            self.validators.clone(),
        ))
    }

    /// Registers a listener shared by every transaction opened from this
    /// database from now on (spec §4.6 "per-database" registration).
    pub fn register_listener(
        &self,
        kind: ListenerKind,
        filter: impl Fn(&Event) -> bool + Send + Sync + 'static,
        handler: impl FnMut(&Event) + Send + 'static,
    ) -> ListenerHandle {
        self.listeners.register(kind, filter, handler)
    }

    /// Removes a previously registered database-wide listener.
    pub fn unregister_listener(&self, handle: ListenerHandle) -> bool {
        self.listeners.unregister(handle)
    }

    /// Registers a user-defined validator, invoked by commit-time
    /// validation with only the changed object's identity (spec §4.6 step
    /// 3). Only takes effect for transactions begun after this call.
    pub fn register_validator(&mut self, validator: impl Fn(ObjId) -> Result<()> + Send + Sync + 'static) {
        self.validators.push(Arc::new(validator));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mem::MemKv;
    use crate::schema::{Field, ObjectType, SchemaBuilder, SimpleType};
    use std::collections::BTreeMap;

    fn person_schema() -> Schema {
        let mut fields = BTreeMap::new();
        fields.insert(
            10,
            Field::Simple {
                storage_id: 10,
                name: "name".into(),
                simple_type: SimpleType::String,
                indexed: true,
                unique: true,
                conversion_policy: None,
            },
        );
        SchemaBuilder::new()
            .object_type(ObjectType {
                storage_id: 1,
                name: "Person".into(),
                fields,
            })
            .build()
            .unwrap()
    }

    #[test]
    fn open_create_commit_and_reopen_sees_object() {
        let kv = MemKv::new();
        let schema = person_schema();
        let db = Database::open(kv.clone(), &schema, DatabaseOptions::new().allow_new_schema(true)).unwrap();
        let mut txn = db.begin().unwrap();
        let id = txn.create(1).unwrap();
        txn.write_simple(id, 10, crate::value::Value::String("Ada".into()))
            .unwrap();
        txn.commit().unwrap();

        let txn2 = db.begin().unwrap();
        assert!(txn2.exists(id).unwrap());
        assert_eq!(
            txn2.read_simple(id, 10).unwrap(),
            crate::value::Value::String("Ada".into())
        );
    }

    #[test]
    fn unique_violation_rolled_back() {
        let kv = MemKv::new();
        let schema = person_schema();
        let db = Database::open(kv, &schema, DatabaseOptions::new().allow_new_schema(true)).unwrap();
        let mut txn = db.begin().unwrap();
        let a = txn.create(1).unwrap();
        txn.write_simple(a, 10, crate::value::Value::String("Ada".into())).unwrap();
        txn.commit().unwrap();

        let mut txn2 = db.begin().unwrap();
        let b = txn2.create(1).unwrap();
        txn2.write_simple(b, 10, crate::value::Value::String("Ada".into())).unwrap();
        let err = txn2.commit();
        assert!(matches!(
            err,
            Err(crate::error::DatabaseError::UniqueViolation(10, _, _))
        ));
    }
}
