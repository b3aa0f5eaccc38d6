//! The transaction core (spec §4.4): the single entry point mutating and
//! querying object state, wiring together the key layout, index engine,
//! and listener/validation subsystem over one [`KvTransaction`].

pub mod delete;
pub mod fields;
pub mod migrate;
pub mod query;

use std::collections::HashSet;
use std::ops::Bound;
use std::sync::Arc;

use rand::Rng;
use tracing::debug;

use crate::config::DatabaseOptions;
use crate::error::{DatabaseError, Result};
use crate::index;
use crate::keys;
use crate::kv::KvTransaction;
use crate::listener::{Event, ListenerRegistry, Validator};
use crate::objid::ObjId;
use crate::schema::{Field, Schema, SchemaRegistry, SchemaVersion, SubFieldKind};
use crate::value::Value;

/// A live transaction bound to one schema version, wrapping a
/// [`KvTransaction`] and buffering listener dispatch / validation state
/// until [`Transaction::commit`].
pub struct Transaction<T: KvTransaction> {
    txn: T,
    schema: Schema,
    schema_version: SchemaVersion,
    registry: Arc<SchemaRegistry>,
    options: DatabaseOptions,
    listeners: Arc<ListenerRegistry>,
    validators: Vec<Validator>,
    validation_queue: crate::listener::ValidationQueue,
    commit_callbacks: Vec<Box<dyn FnOnce() + Send>>,
}

impl<T: KvTransaction> Transaction<T> {
    pub(crate) fn new(
        txn: T,
        schema: Schema,
        schema_version: SchemaVersion,
        registry: Arc<SchemaRegistry>,
        options: DatabaseOptions,
        listeners: Arc<ListenerRegistry>,
        validators: Vec<Validator>,
    ) -> Self {
        Transaction {
            txn,
            schema,
            schema_version,
            registry,
            options,
            listeners,
            validators,
            validation_queue: crate::listener::ValidationQueue::new(),
            commit_callbacks: Vec::new(),
        }
    }

    fn check_writable(&self) -> Result<()> {
        if self.options.read_only {
            return Err(DatabaseError::ReadOnly);
        }
        Ok(())
    }

    fn should_enqueue(&self) -> bool {
        matches!(
            self.options.validation_mode,
            crate::config::ValidationMode::Automatic
        )
    }

    /// The schema version this transaction is bound to.
    pub fn schema_version(&self) -> SchemaVersion {
        self.schema_version
    }

    /// The schema this transaction is bound to.
    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    /// Whether `id` currently exists.
    pub fn exists(&self, id: ObjId) -> Result<bool> {
        Ok(self.txn.get(&keys::obj_key(id))?.is_some())
    }

    /// Creates a new object of `type_id`, bound to this transaction's
    /// schema version. Retries a handful of times on the astronomically
    /// unlikely event of a random-suffix collision.
    pub fn create(&mut self, type_id: u64) -> Result<ObjId> {
        self.check_writable()?;
        self.schema.object_type(type_id)?;
        let mut rng = rand::thread_rng();
        let id = (0..8)
            .map(|_| ObjId::new(type_id, rng.gen()))
            .find(|id| self.txn.get(&keys::obj_key(*id)).ok().flatten().is_none())
            .ok_or_else(|| DatabaseError::Other(anyhow::anyhow!("object id space exhausted")))?;
        let mut header = Vec::new();
        crate::codec::encode_uint(self.schema_version as u64, &mut header)?;
        self.txn.put(&keys::obj_key(id), &header)?;
        debug!(%id, type_id, "created object");
        #[cfg(feature = "metrics")]
        crate::metrics::OBJECTS_CREATED
            .with_label_values(&[&type_id.to_string()])
            .inc();
        self.listeners.dispatch(&Event::Create { id, type_id });
        if self.should_enqueue() {
            self.validation_queue.enqueue(id);
        }
        Ok(id)
    }

    /// Deletes `id`, cascading through reference fields per their
    /// `on_delete` policy.
    pub fn delete(&mut self, id: ObjId) -> Result<()> {
        self.check_writable()?;
        let mut visited = HashSet::new();
        delete::delete(&mut self.txn, &self.schema, id, &self.listeners, &mut visited)
    }

    /// Reads a simple field's current value.
    pub fn read_simple(&self, id: ObjId, field_id: u64) -> Result<Value> {
        fields::read_simple(&self.txn, &self.schema, id, field_id)
    }

    /// Writes a simple field.
    pub fn write_simple(&mut self, id: ObjId, field_id: u64, value: Value) -> Result<()> {
        self.check_writable()?;
        let enqueue = self.should_enqueue();
        fields::write_simple(
            &mut self.txn,
            &self.schema,
            id,
            field_id,
            value,
            &self.listeners,
            &mut self.validation_queue,
            enqueue,
        )
    }

    /// Reads a counter field's current value.
    pub fn read_counter(&self, id: ObjId, field_id: u64) -> Result<i64> {
        fields::read_counter(&self.txn, id, field_id)
    }

    /// Atomically adjusts a counter field.
    pub fn adjust_counter(&mut self, id: ObjId, field_id: u64, delta: i64) -> Result<i64> {
        self.check_writable()?;
        fields::adjust_counter(&mut self.txn, id, field_id, delta, &self.listeners)
    }

    /// Adds an element to a set field.
    pub fn add_set(&mut self, id: ObjId, field_id: u64, value: &Value) -> Result<()> {
        self.check_writable()?;
        fields::add_set(&mut self.txn, &self.schema, id, field_id, value, &self.listeners)
    }

    /// Removes an element from a set field.
    pub fn remove_set(&mut self, id: ObjId, field_id: u64, value: &Value) -> Result<()> {
        self.check_writable()?;
        fields::remove_set(&mut self.txn, &self.schema, id, field_id, value, &self.listeners)
    }

    /// Every element in a set field.
    pub fn iter_set(&self, id: ObjId, field_id: u64) -> Result<Vec<Vec<u8>>> {
        fields::iter_set(&self.txn, id, field_id)
    }

    /// Every `(position, element)` pair in a list field.
    pub fn get_list(&self, id: ObjId, field_id: u64) -> Result<Vec<(u32, Vec<u8>)>> {
        fields::get_list(&self.txn, id, field_id)
    }

    /// Overwrites the list element at `index`.
    pub fn set_list_at(&mut self, id: ObjId, field_id: u64, index: u32, value: &Value) -> Result<()> {
        self.check_writable()?;
        fields::set_list_at(&mut self.txn, &self.schema, id, field_id, index, value, &self.listeners)
    }

    /// Inserts a list element at `index`, shifting the tail.
    pub fn insert_list(&mut self, id: ObjId, field_id: u64, index: u32, value: &Value) -> Result<()> {
        self.check_writable()?;
        fields::insert_list(&mut self.txn, &self.schema, id, field_id, index, value, &self.listeners)
    }

    /// Removes the list element at `index`, shifting the tail.
    pub fn remove_list_at(&mut self, id: ObjId, field_id: u64, index: u32) -> Result<()> {
        self.check_writable()?;
        fields::remove_list_at(&mut self.txn, &self.schema, id, field_id, index, &self.listeners)
    }

    /// Inserts or overwrites a map entry.
    pub fn put_map(&mut self, id: ObjId, field_id: u64, key: &Value, value: &Value) -> Result<()> {
        self.check_writable()?;
        fields::put_map(&mut self.txn, &self.schema, id, field_id, key, value, &self.listeners)
    }

    /// Removes a map entry.
    pub fn remove_map_key(&mut self, id: ObjId, field_id: u64, key: &Value) -> Result<()> {
        self.check_writable()?;
        fields::remove_map_key(&mut self.txn, &self.schema, id, field_id, key, &self.listeners)
    }

    /// Every `(key, value)` pair in a map field.
    pub fn iter_map(&self, id: ObjId, field_id: u64) -> Result<Vec<(Vec<u8>, Vec<u8>)>> {
        fields::iter_map(&self.txn, id, field_id)
    }

    /// Point query over a simple field's index.
    pub fn query_index(&self, type_id: u64, field_id: u64, value: &Value) -> Result<Vec<ObjId>> {
        query::query_index(&self.txn, &self.schema, type_id, field_id, value)
    }

    /// Range query over a simple field's index.
    pub fn query_index_range(
        &self,
        type_id: u64,
        field_id: u64,
        lower: Bound<&Value>,
        upper: Bound<&Value>,
    ) -> Result<Vec<(Value, ObjId)>> {
        query::query_index_range(&self.txn, &self.schema, type_id, field_id, lower, upper)
    }

    /// Exact-match composite index query.
    pub fn query_composite(&self, index_id: u64, tuple: &[Value]) -> Result<Vec<ObjId>> {
        query::query_composite(&self.txn, &self.schema, index_id, tuple)
    }

    /// Partial-prefix composite index query.
    pub fn query_composite_prefix(&self, index_id: u64, prefix: &[Value]) -> Result<Vec<ObjId>> {
        query::query_composite_prefix(&self.txn, &self.schema, index_id, prefix)
    }

    /// Every object of `type_id`, in `ObjId` order.
    pub fn iter_objects(&self, type_id: u64) -> Result<Vec<ObjId>> {
        query::iter_objects(&self.txn, type_id)
    }

    /// Every object in the database, regardless of type, in `ObjId` order.
    pub fn iter_all_objects(&self) -> Result<Vec<ObjId>> {
        query::iter_all_objects(&self.txn)
    }

    /// The schema `id` was created or last migrated to.
    pub fn schema_of(&self, id: ObjId) -> Result<Schema> {
        let header = self
            .txn
            .get(&keys::obj_key(id))?
            .ok_or(DatabaseError::DeletedObject(id))?;
        let version = crate::codec::decode_uint(&header)?.0 as u32;
        self.registry
            .get(version)
            .cloned()
            .ok_or_else(|| DatabaseError::InvalidSchema(format!("no schema version {version}")))
    }

    /// Every object referencing `target` through `field_id`.
    pub fn query_reverse_reference(
        &self,
        referrer_type: u64,
        field_id: u64,
        target: ObjId,
    ) -> Result<Vec<ObjId>> {
        query::query_reverse_reference(&self.txn, &self.schema, referrer_type, field_id, target)
    }

    /// Migrates `id` from its currently-recorded schema version to
    /// `target_version`, converting any simple field whose encoding
    /// changed, per each field's conversion policy.
    pub fn migrate_schema(&mut self, id: ObjId, target_version: SchemaVersion) -> Result<()> {
        self.check_writable()?;
        let header = self
            .txn
            .get(&keys::obj_key(id))?
            .ok_or(DatabaseError::DeletedObject(id))?;
        let old_version = crate::codec::decode_uint(&header)?.0 as u32;
        if old_version == target_version {
            return Ok(());
        }
        let old_schema = self
            .registry
            .get(old_version)
            .ok_or_else(|| DatabaseError::InvalidSchema(format!("no schema version {old_version}")))?;
        let new_schema = self
            .registry
            .get(target_version)
            .ok_or_else(|| DatabaseError::InvalidSchema(format!("no schema version {target_version}")))?;
        migrate::migrate_schema(
            &mut self.txn,
            old_schema,
            new_schema,
            id,
            old_version,
            target_version,
            self.options.upgrade_conversion_default,
            &self.listeners,
        )?;
        let mut new_header = Vec::new();
        crate::codec::encode_uint(target_version as u64, &mut new_header)?;
        self.txn.put(&keys::obj_key(id), &new_header)?;
        Ok(())
    }

    /// Registers a listener. See [`ListenerRegistry::register`].
    pub fn register_listener(
        &self,
        kind: crate::listener::ListenerKind,
        filter: impl Fn(&Event) -> bool + Send + Sync + 'static,
        handler: impl FnMut(&Event) + Send + 'static,
    ) -> crate::listener::ListenerHandle {
        self.listeners.register(kind, filter, handler)
    }

    /// Registers a callback run once, after this transaction commits
    /// successfully. Callbacks never run if validation fails or the
    /// transaction is rolled back, and run in registration order.
    pub fn add_commit_callback(&mut self, f: impl FnOnce() + Send + 'static) {
        self.commit_callbacks.push(Box::new(f));
    }

    /// Explicitly enqueues `id` for validation at commit, regardless of
    /// [`crate::config::ValidationMode`].
    pub fn revalidate(&mut self, id: ObjId) {
        self.validation_queue.enqueue(id);
    }

    /// Runs every queued object through structural reference-integrity
    /// checks, uniqueness checks, and user-defined validators, draining the
    /// queue until empty (validators may themselves enqueue further
    /// objects).
    fn run_validation(&mut self) -> Result<()> {
        if matches!(self.options.validation_mode, crate::config::ValidationMode::Disabled) {
            return Ok(());
        }
        while let Some(id) = self.validation_queue.take_next() {
            self.validate_one(id)?;
        }
        Ok(())
    }

    fn validate_one(&self, id: ObjId) -> Result<()> {
        if self.txn.get(&keys::obj_key(id))?.is_none() {
            return Ok(());
        }
        self.validate_structural(id)?;
        self.validate_uniqueness(id)?;
        for validator in &self.validators {
            validator(id)?;
        }
        Ok(())
    }

    fn validate_structural(&self, id: ObjId) -> Result<()> {
        let type_id = id.type_storage_id()?;
        let ty = self.schema.object_type(type_id)?;
        for field in ty.fields.values() {
            match field {
                Field::Reference {
                    storage_id,
                    allow_dangling: false,
                    ..
                } => {
                    if let Some(bytes) = self.txn.get(&keys::field_key(id, *storage_id)?)? {
                        let target = ObjId::from_bytes(&bytes)?;
                        if self.txn.get(&keys::obj_key(target))?.is_none() {
                            return Err(DatabaseError::DanglingReference {
                                object: id,
                                field: *storage_id,
                                target,
                            });
                        }
                    }
                }
                Field::Set { storage_id, element, .. } => {
                    let elements = fields::iter_set(&self.txn, id, *storage_id)?;
                    self.validate_refs(id, *storage_id, &element.kind, elements)?;
                }
                Field::List { storage_id, element, .. } => {
                    let elements: Vec<Vec<u8>> = fields::get_list(&self.txn, id, *storage_id)?
                        .into_iter()
                        .map(|(_, v)| v)
                        .collect();
                    self.validate_refs(id, *storage_id, &element.kind, elements)?;
                }
                Field::Map { storage_id, key, value, .. } => {
                    let entries = fields::iter_map(&self.txn, id, *storage_id)?;
                    let keys: Vec<Vec<u8>> = entries.iter().map(|(k, _)| k.clone()).collect();
                    let values: Vec<Vec<u8>> = entries.into_iter().map(|(_, v)| v).collect();
                    self.validate_refs(id, *storage_id, &key.kind, keys)?;
                    self.validate_refs(id, *storage_id, &value.kind, values)?;
                }
                _ => {}
            }
        }
        Ok(())
    }

    fn validate_refs(
        &self,
        id: ObjId,
        field_id: u64,
        kind: &SubFieldKind,
        elements: Vec<Vec<u8>>,
    ) -> Result<()> {
        let SubFieldKind::Reference {
            allow_dangling: false,
            ..
        } = kind
        else {
            return Ok(());
        };
        for bytes in elements {
            let target = ObjId::from_bytes(&bytes)?;
            if self.txn.get(&keys::obj_key(target))?.is_none() {
                return Err(DatabaseError::DanglingReference {
                    object: id,
                    field: field_id,
                    target,
                });
            }
        }
        Ok(())
    }

    fn validate_uniqueness(&self, id: ObjId) -> Result<()> {
        let type_id = id.type_storage_id()?;
        let ty = self.schema.object_type(type_id)?;
        for field in ty.fields.values() {
            if let Field::Simple {
                storage_id,
                unique: true,
                ..
            } = field
            {
                let value = self.read_simple(id, *storage_id)?;
                if value.is_null() {
                    continue;
                }
                for other in self.query_index(type_id, *storage_id, &value)? {
                    if other != id {
                        return Err(DatabaseError::UniqueViolation(*storage_id, id, other));
                    }
                }
            }
        }
        for idx in self.schema.composite_indexes_for(type_id) {
            if !idx.unique {
                continue;
            }
            let mut tuple = Vec::with_capacity(idx.field_ids.len());
            for field_id in &idx.field_ids {
                tuple.push(self.txn.get(&keys::field_key(id, *field_id)?)?);
            }
            if tuple.iter().any(Option::is_none) {
                continue;
            }
            for other in index::query_composite(&self.txn, idx.storage_id, &tuple)? {
                if other != id {
                    return Err(DatabaseError::UniqueViolation(idx.storage_id, id, other));
                }
            }
        }
        Ok(())
    }

    /// Drains and runs validation, then commits the underlying
    /// [`KvTransaction`].
    pub fn commit(mut self) -> Result<()> {
        #[cfg(feature = "metrics")]
        let _timer = crate::metrics::COMMIT_LATENCY_SECONDS
            .with_label_values(&["ok"])
            .start_timer();
        if let Err(err) = self.run_validation() {
            #[cfg(feature = "metrics")]
            {
                let kind = match &err {
                    DatabaseError::DanglingReference { .. } => "dangling_reference",
                    DatabaseError::UniqueViolation(..) => "unique_violation",
                    DatabaseError::ValidationError { .. } => "user_validator",
                    _ => "other",
                };
                crate::metrics::VALIDATION_FAILURES.with_label_values(&[kind]).inc();
            }
            return Err(err);
        }
        self.txn.commit()?;
        for callback in self.commit_callbacks {
            callback();
        }
        Ok(())
    }

    /// Discards all mutations, without running validation.
    pub fn rollback(self) -> Result<()> {
        self.txn.rollback()
    }
}
