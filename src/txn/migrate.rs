//! Explicit per-object schema migration (spec §4.4 `migrate_schema`, §4.2
//! "Compatibility checks").

use tracing::debug;

use crate::config::ConversionPolicy;
use crate::error::{DatabaseError, Result};
use crate::index;
use crate::keys;
use crate::kv::KvTransaction;
use crate::listener::{Event, ListenerRegistry};
use crate::objid::ObjId;
use crate::schema::{Field, Schema, SimpleType};
use crate::value::Value;

/// Best-effort conversion between simple types for [`ConversionPolicy::Attempt`].
/// Returns `None` when no lossless-enough conversion is defined.
fn convert_value(value: Value, target: &SimpleType) -> Option<Value> {
    use SimpleType as T;
    use Value as V;
    match (value, target) {
        (v, T::Bool) if matches!(v, V::Bool(_)) => Some(v),
        (v, T::I64) if matches!(v, V::I64(_)) => Some(v),
        (v, T::U64) if matches!(v, V::U64(_)) => Some(v),
        (v, T::F64) if matches!(v, V::F64(_)) => Some(v),
        (v, T::String) if matches!(v, V::String(_)) => Some(v),
        (v, T::Bytes) if matches!(v, V::Bytes(_)) => Some(v),
        (V::I64(n), T::F64) => Some(V::F64(n as f64)),
        (V::U64(n), T::F64) => Some(V::F64(n as f64)),
        (V::U64(n), T::I64) => i64::try_from(n).ok().map(V::I64),
        (V::I64(n), T::U64) => u64::try_from(n).ok().map(V::U64),
        (V::String(s), T::Bytes) => Some(V::Bytes(s.into_bytes())),
        (V::Bytes(b), T::String) => String::from_utf8(b).ok().map(V::String),
        (V::Enum(ord), T::Enum { variants }) if (ord as usize) < variants.len() => {
            Some(V::Enum(ord))
        }
        (V::Null, _) => Some(V::Null),
        _ => None,
    }
}

/// Migrates `id` from its current schema version's field encodings to
/// `new_schema`'s, applying each changed simple field's conversion policy
/// (its own [`Field::Simple::conversion_policy`] override, falling back to
/// `default_policy`), and keeping each field's simple-field index entry
/// consistent with whichever value ends up stored (spec §4.4
/// `migrate_schema`: a field that becomes indexed gains an entry, one that
/// stops being indexed loses its old entry, one that stays indexed but
/// changes encoding has its entry replaced). Dispatches
/// [`Event::SchemaChange`] with the pre-migration value of every
/// simple/counter field that changed type.
pub fn migrate_schema(
    txn: &mut impl KvTransaction,
    old_schema: &Schema,
    new_schema: &Schema,
    id: ObjId,
    old_version: u32,
    new_version: u32,
    default_policy: ConversionPolicy,
    listeners: &ListenerRegistry,
) -> Result<()> {
    if txn.get(&keys::obj_key(id))?.is_none() {
        return Err(DatabaseError::DeletedObject(id));
    }
    let type_id = id.type_storage_id()?;
    let old_ty = old_schema.object_type(type_id)?;
    let Ok(new_ty) = new_schema.object_type(type_id) else {
        // The type itself was removed; nothing left to convert, but the
        // object's records remain addressable as untyped storage.
        return Ok(());
    };

    let mut old_values = Vec::new();
    for (field_id, old_field) in &old_ty.fields {
        let Field::Simple {
            simple_type: old_type,
            indexed: old_indexed,
            conversion_policy,
            ..
        } = old_field
        else {
            continue;
        };
        let Some(Field::Simple {
            simple_type: new_type,
            indexed: new_indexed,
            ..
        }) = new_ty.fields.get(field_id)
        else {
            continue;
        };
        if old_type == new_type && old_indexed == new_indexed {
            continue;
        }
        let key = keys::field_key(id, *field_id)?;
        let old_bytes = txn.get(&key)?;

        let new_bytes = if old_type == new_type {
            old_bytes.clone()
        } else {
            let old_value = Value::decode(old_bytes.as_deref(), old_type)?;
            old_values.push((*field_id, old_value.clone()));

            let policy = conversion_policy.unwrap_or(default_policy);
            let converted = match policy {
                ConversionPolicy::Reset => Some(Value::Null),
                ConversionPolicy::Attempt => {
                    convert_value(old_value.clone(), new_type).or(Some(Value::Null))
                }
                ConversionPolicy::Require => convert_value(old_value.clone(), new_type),
                ConversionPolicy::Retain => {
                    return Err(DatabaseError::SchemaMismatch {
                        object: id,
                        field: *field_id,
                    })
                }
            };
            let Some(converted) = converted else {
                return Err(DatabaseError::SchemaMismatch {
                    object: id,
                    field: *field_id,
                });
            };
            converted.encode(*field_id, new_type)?
        };
        match &new_bytes {
            Some(bytes) => txn.put(&key, bytes)?,
            None => txn.remove(&key)?,
        }
        match (*old_indexed, *new_indexed) {
            (true, true) => {
                index::update_simple_index(txn, *field_id, old_bytes.as_deref(), new_bytes.as_deref(), id)?
            }
            (true, false) => index::remove_simple_index(txn, *field_id, old_bytes.as_deref(), id)?,
            (false, true) => index::update_simple_index(txn, *field_id, None, new_bytes.as_deref(), id)?,
            (false, false) => {}
        }
    }

    debug!(%id, old_version, new_version, "migrated object schema");
    listeners.dispatch(&Event::SchemaChange {
        id,
        old_version,
        new_version,
        old_values,
    });
    Ok(())
}
