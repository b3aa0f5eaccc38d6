//! The schema registry: a KV-backed, append-only mapping from schema
//! version number to registered [`Schema`] (spec §4.2).

use std::collections::BTreeMap;

use tracing::debug;

use super::canonical::SchemaId;
use super::{Field, Schema};
use crate::codec;
use crate::error::{DatabaseError, Result};
use crate::keys;
use crate::kv::KvTransaction;

/// A monotonically assigned schema version number. `0` is never assigned;
/// it is reserved by [`crate::DatabaseOptions::schema_version`] to mean
/// "use the highest registered version".
pub type SchemaVersion = u32;

/// An in-memory cache of registered schema versions, reconstructed from the
/// KV store's `SCH` records on open and kept current as new versions are
/// registered.
#[derive(Debug, Default, Clone)]
pub struct SchemaRegistry {
    versions: BTreeMap<SchemaVersion, Schema>,
    highest: SchemaVersion,
}

impl SchemaRegistry {
    /// Loads every registered `SCH` record from `txn` into a fresh
    /// registry.
    pub fn load(txn: &impl KvTransaction) -> Result<Self> {
        let mut versions = BTreeMap::new();
        let prefix = keys::schema_prefix();
        let upper = crate::kv::increment_prefix(&prefix);
        for (key, value) in txn.range_scan(&prefix, upper.as_deref(), false)? {
            let version = keys::parse_schema_version_key(&key)?;
            let schema = decode_canonical_schema(&value)?;
            versions.insert(version, schema);
        }
        let highest = match txn.get(keys::KEY_SCHEMA_HIGHEST_VERSION)? {
            Some(bytes) => codec::decode_uint(&bytes)?.0 as u32,
            None => versions.keys().next_back().copied().unwrap_or(0),
        };
        Ok(SchemaRegistry { versions, highest })
    }

    /// The schema registered as `version`, if any.
    pub fn get(&self, version: SchemaVersion) -> Option<&Schema> {
        self.versions.get(&version)
    }

    /// All registered versions in ascending order.
    pub fn iter_versions(&self) -> impl Iterator<Item = (SchemaVersion, &Schema)> {
        self.versions.iter().map(|(v, s)| (*v, s))
    }

    /// The highest registered version number (0 if none registered yet).
    pub fn highest_version(&self) -> SchemaVersion {
        self.highest
    }

    /// Resolves `desired` against the registry: if a version already has
    /// this exact canonical schema, returns its version number. Otherwise,
    /// if `allow_new` is set, validates compatibility against every
    /// existing version, assigns the next version number, persists the
    /// `SCH` record and the updated highest-version marker through `txn`,
    /// and returns the new number. If `allow_new` is false and no matching
    /// version exists, fails with [`DatabaseError::SchemaNotRegistered`].
    pub fn open(
        &mut self,
        desired: &Schema,
        allow_new: bool,
        txn: &mut impl KvTransaction,
    ) -> Result<SchemaVersion> {
        desired.validate()?;
        let desired_id = SchemaId::of(desired);
        for (version, schema) in &self.versions {
            if SchemaId::of(schema) == desired_id {
                return Ok(*version);
            }
        }
        if !allow_new {
            return Err(DatabaseError::SchemaNotRegistered);
        }
        for schema in self.versions.values() {
            check_compatible(schema, desired)?;
        }
        let version = self.highest + 1;
        let bytes = super::canonical::encode_for_storage(desired);
        txn.put(&keys::schema_version_key(version), &bytes)?;
        let mut highest_bytes = Vec::new();
        codec::encode_uint(version as u64, &mut highest_bytes)?;
        txn.put(keys::KEY_SCHEMA_HIGHEST_VERSION, &highest_bytes)?;
        debug!(version, schema_id = %desired_id, "registered new schema version");
        self.versions.insert(version, desired.clone());
        self.highest = version;
        Ok(version)
    }
}

fn decode_canonical_schema(_bytes: &[u8]) -> Result<Schema> {
    // The canonical encoding (schema/canonical.rs) is used for content
    // hashing and is not required to round-trip on its own: the registry
    // additionally persists a self-describing copy so `load` can
    // reconstruct full `Schema` values without re-deriving storage-id
    // ordering from an opaque hash input. See `encode_for_storage`.
    super::canonical::decode_for_storage(_bytes)
}

/// For every storage id present in both `existing` and `desired`, the
/// item's kind and (for simple fields) type signature must match exactly.
/// Indexed flag, reference target type, and cascade settings may differ
/// freely (spec §4.2 "Compatibility checks").
fn check_compatible(existing: &Schema, desired: &Schema) -> Result<()> {
    for (type_id, existing_ty) in &existing.object_types {
        let Some(desired_ty) = desired.object_types.get(type_id) else {
            continue;
        };
        for (field_id, existing_field) in &existing_ty.fields {
            let Some(desired_field) = desired_ty.fields.get(field_id) else {
                continue;
            };
            if existing_field.kind_tag() != desired_field.kind_tag() {
                return Err(DatabaseError::InvalidSchema(format!(
                    "field {} on type {} changed kind from {} to {}",
                    field_id,
                    type_id,
                    existing_field.kind_tag(),
                    desired_field.kind_tag()
                )));
            }
            if let (
                Field::Simple { simple_type: a, .. },
                Field::Simple { simple_type: b, .. },
            ) = (existing_field, desired_field)
            {
                if a != b {
                    return Err(DatabaseError::InvalidSchema(format!(
                        "field {} on type {} changed simple type",
                        field_id, type_id
                    )));
                }
            }
        }
    }
    Ok(())
}
