//! Typed query wrappers over the raw index engine (spec §4.5 "Queries"):
//! encode [`Value`]s through the field's declared type before delegating
//! to [`crate::index`].

use std::ops::Bound;

use crate::error::{DatabaseError, Result};
use crate::index;
use crate::keys;
use crate::kv::{increment_prefix, KvTransaction};
use crate::objid::ObjId;
use crate::schema::{Field, Schema, SimpleType};
use crate::value::Value;

/// Every object of `type_id`, in `ObjId` order.
pub fn iter_objects(txn: &impl KvTransaction, type_id: u64) -> Result<Vec<ObjId>> {
    let prefix = keys::object_type_prefix(type_id)?;
    let upper = increment_prefix(&prefix);
    txn.range_scan(&prefix, upper.as_deref(), false)?
        .into_iter()
        .map(|(key, _)| keys::trailing_obj_id(&key))
        .collect()
}

/// Every object in the database, regardless of type, in `ObjId` order.
pub fn iter_all_objects(txn: &impl KvTransaction) -> Result<Vec<ObjId>> {
    let prefix = vec![keys::PREFIX_OBJ];
    let upper = increment_prefix(&prefix);
    txn.range_scan(&prefix, upper.as_deref(), false)?
        .into_iter()
        .map(|(key, _)| keys::trailing_obj_id(&key))
        .collect()
}

fn indexed_simple_type<'a>(schema: &'a Schema, type_id: u64, field_id: u64) -> Result<&'a SimpleType> {
    match schema.field(type_id, field_id)? {
        Field::Simple { simple_type, indexed: true, .. } => Ok(simple_type),
        Field::Simple { indexed: false, .. } => Err(DatabaseError::InvalidValue(
            field_id,
            "field is not indexed".into(),
        )),
        _ => Err(DatabaseError::FieldNotInSchema(field_id, type_id)),
    }
}

/// Point query: every object of `type_id` whose `field_id` equals `value`.
pub fn query_index(
    txn: &impl KvTransaction,
    schema: &Schema,
    type_id: u64,
    field_id: u64,
    value: &Value,
) -> Result<Vec<ObjId>> {
    let simple_type = indexed_simple_type(schema, type_id, field_id)?;
    let encoded = value.encode(field_id, simple_type)?;
    index::query_index(txn, field_id, encoded.as_deref())
}

/// Range query: every `(ObjId)` whose `field_id` value falls within
/// `[lower, upper)` under the field's natural order, paired with the
/// decoded value.
pub fn query_index_range(
    txn: &impl KvTransaction,
    schema: &Schema,
    type_id: u64,
    field_id: u64,
    lower: Bound<&Value>,
    upper: Bound<&Value>,
) -> Result<Vec<(Value, ObjId)>> {
    let simple_type = indexed_simple_type(schema, type_id, field_id)?;
    let encode = |v: &Value| -> Result<Vec<u8>> {
        v.encode(field_id, simple_type)?
            .ok_or_else(|| DatabaseError::InvalidValue(field_id, "range bound cannot be null".into()))
    };
    let lower_bytes = match lower {
        Bound::Included(v) => Bound::Included(encode(v)?),
        Bound::Excluded(v) => Bound::Excluded(encode(v)?),
        Bound::Unbounded => Bound::Unbounded,
    };
    let upper_bytes = match upper {
        Bound::Included(v) => Bound::Included(encode(v)?),
        Bound::Excluded(v) => Bound::Excluded(encode(v)?),
        Bound::Unbounded => Bound::Unbounded,
    };
    let lower_ref = match &lower_bytes {
        Bound::Included(b) => Bound::Included(b.as_slice()),
        Bound::Excluded(b) => Bound::Excluded(b.as_slice()),
        Bound::Unbounded => Bound::Unbounded,
    };
    let upper_ref = match &upper_bytes {
        Bound::Included(b) => Bound::Included(b.as_slice()),
        Bound::Excluded(b) => Bound::Excluded(b.as_slice()),
        Bound::Unbounded => Bound::Unbounded,
    };
    let raw = index::query_index_range(txn, field_id, lower_ref, upper_ref)?;
    raw.into_iter()
        .map(|(bytes, id)| {
            // Strip the present/null sentinel the index engine wraps every
            // stored value in before decoding.
            let decoded = if bytes.first() == Some(&0) {
                Value::Null
            } else {
                Value::decode(Some(&bytes[1..]), simple_type)?
            };
            Ok((decoded, id))
        })
        .collect()
}

/// Exact-match composite index query.
pub fn query_composite(
    txn: &impl KvTransaction,
    schema: &Schema,
    index_id: u64,
    tuple: &[Value],
) -> Result<Vec<ObjId>> {
    let idx = schema
        .composite_indexes
        .get(&index_id)
        .ok_or_else(|| DatabaseError::InvalidSchema(format!("no composite index {index_id}")))?;
    let encoded = encode_composite_tuple(schema, idx.object_type, &idx.field_ids, tuple)?;
    index::query_composite(txn, index_id, &encoded)
}

/// Partial-prefix composite index query, over a proper prefix of the full
/// tuple.
pub fn query_composite_prefix(
    txn: &impl KvTransaction,
    schema: &Schema,
    index_id: u64,
    prefix_tuple: &[Value],
) -> Result<Vec<ObjId>> {
    let idx = schema
        .composite_indexes
        .get(&index_id)
        .ok_or_else(|| DatabaseError::InvalidSchema(format!("no composite index {index_id}")))?;
    let field_ids = &idx.field_ids[..prefix_tuple.len().min(idx.field_ids.len())];
    let encoded = encode_composite_tuple(schema, idx.object_type, field_ids, prefix_tuple)?;
    index::query_composite_prefix(txn, index_id, &encoded)
}

fn encode_composite_tuple(
    schema: &Schema,
    type_id: u64,
    field_ids: &[u64],
    tuple: &[Value],
) -> Result<Vec<Option<Vec<u8>>>> {
    if field_ids.len() != tuple.len() {
        return Err(DatabaseError::InvalidValue(
            0,
            "composite tuple arity mismatch".into(),
        ));
    }
    field_ids
        .iter()
        .zip(tuple)
        .map(|(field_id, value)| match schema.field(type_id, *field_id)? {
            Field::Simple { simple_type, .. } => value.encode(*field_id, simple_type),
            Field::Reference { .. } => match value {
                Value::U64(raw) => Ok(Some(ObjId::from_raw(*raw).to_bytes().to_vec())),
                Value::Null => Ok(None),
                _ => Err(DatabaseError::InvalidValue(
                    *field_id,
                    "reference component requires an ObjId-derived value".into(),
                )),
            },
            _ => Err(DatabaseError::FieldNotInSchema(*field_id, type_id)),
        })
        .collect()
}

/// Every object referencing `target` through the reference field
/// `field_id` on `referrer_type`.
pub fn query_reverse_reference(
    txn: &impl KvTransaction,
    schema: &Schema,
    referrer_type: u64,
    field_id: u64,
    target: ObjId,
) -> Result<Vec<ObjId>> {
    match schema.field(referrer_type, field_id)? {
        Field::Reference { .. } => index::query_reverse_reference(txn, field_id, target),
        _ => Err(DatabaseError::FieldNotInSchema(field_id, referrer_type)),
    }
}
