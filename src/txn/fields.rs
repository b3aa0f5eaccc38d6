//! Field-level read/write operations (spec §4.4): simple, counter, set,
//! list, and map fields, each maintaining its own index entries in step
//! with the value it stores.

use tracing::trace;

use crate::error::{DatabaseError, Result};
use crate::index;
use crate::keys;
use crate::kv::KvTransaction;
use crate::listener::{Event, ListenerRegistry, ValidationQueue};
use crate::objid::ObjId;
use crate::schema::{Field, Schema, SubField, SubFieldKind, SUBFIELD_VALUE};
use crate::value::Value;

/// Combines a collection field's storage id with one of its sub-fields'
/// storage id (`1` for element/key, `2` for value, see
/// [`crate::schema::SUBFIELD_ELEMENT_OR_KEY`]/[`SUBFIELD_VALUE`]) into the
/// single `u64` field id the index engine keys on. Sub-field storage ids
/// are always `1` or `2`, so two bits are enough to keep this injective
/// for any field id below `2^62`.
fn subfield_index_id(field_id: u64, sub_storage_id: u64) -> u64 {
    (field_id << 2) | sub_storage_id
}

fn encode_subfield(field_id: u64, sub: &SubField, value: &Value) -> Result<Vec<u8>> {
    match &sub.kind {
        SubFieldKind::Simple { simple_type, .. } => Ok(value
            .encode(field_id, simple_type)?
            .unwrap_or_default()),
        SubFieldKind::Reference { .. } => match value {
            Value::U64(raw) => Ok(ObjId::from_raw(*raw).to_bytes().to_vec()),
            _ => Err(DatabaseError::InvalidValue(
                field_id,
                "reference sub-field requires an ObjId-derived value".into(),
            )),
        },
    }
}

fn ensure_exists(txn: &impl KvTransaction, id: ObjId) -> Result<()> {
    if txn.get(&keys::obj_key(id))?.is_none() {
        return Err(DatabaseError::DeletedObject(id));
    }
    Ok(())
}

fn simple_field<'a>(schema: &'a Schema, id: ObjId, field_id: u64) -> Result<&'a Field> {
    let type_id = id.type_storage_id()?;
    schema.field(type_id, field_id)
}

/// Reads a simple or reference field's current value (`Value::Null` if
/// absent). A reference field decodes to `Value::U64` carrying the target
/// `ObjId`'s raw bits.
pub fn read_simple(
    txn: &impl KvTransaction,
    schema: &Schema,
    id: ObjId,
    field_id: u64,
) -> Result<Value> {
    ensure_exists(txn, id)?;
    match simple_field(schema, id, field_id)? {
        Field::Simple { simple_type, .. } => {
            let bytes = txn.get(&keys::field_key(id, field_id)?)?;
            Value::decode(bytes.as_deref(), simple_type)
        }
        Field::Reference { .. } => {
            let bytes = txn.get(&keys::field_key(id, field_id)?)?;
            match bytes {
                Some(b) => Ok(Value::U64(ObjId::from_bytes(&b)?.raw())),
                None => Ok(Value::Null),
            }
        }
        _ => Err(DatabaseError::FieldNotInSchema(field_id, id.type_storage_id()?)),
    }
}

/// Recomputes every composite index declared on `type_id` that names
/// `changed_field` among its constituents, using `old_bytes`/`new_bytes` for
/// the changed field and each index's other constituents' current (already
/// written) values — spec §4.5 "Composite index": recomputed on any change
/// to any constituent field, on every write path that can change one.
fn update_composite_indexes(
    txn: &mut impl KvTransaction,
    schema: &Schema,
    type_id: u64,
    id: ObjId,
    changed_field: u64,
    old_bytes: Option<&[u8]>,
    new_bytes: Option<&[u8]>,
) -> Result<()> {
    for idx in schema.composite_indexes_for(type_id) {
        if !idx.field_ids.contains(&changed_field) {
            continue;
        }
        let mut old_tuple = Vec::with_capacity(idx.field_ids.len());
        let mut new_tuple = Vec::with_capacity(idx.field_ids.len());
        for &fid in &idx.field_ids {
            if fid == changed_field {
                old_tuple.push(old_bytes.map(<[u8]>::to_vec));
                new_tuple.push(new_bytes.map(<[u8]>::to_vec));
            } else {
                let current = txn.get(&keys::field_key(id, fid)?)?;
                old_tuple.push(current.clone());
                new_tuple.push(current);
            }
        }
        index::update_composite_index(txn, idx.storage_id, &old_tuple, &new_tuple, id)?;
    }
    Ok(())
}

/// Writes a simple or reference field, maintaining its simple-field index
/// entry and every composite index naming it if indexed, and dispatching a
/// [`Event::SimpleChange`]. A no-op write (new value equals the current
/// one) performs no I/O or dispatch. Reference fields are always indexed
/// (spec §3 field kinds table) and store an [`ObjId`]'s raw bits as
/// `Value::U64`.
#[allow(clippy::too_many_arguments)]
pub fn write_simple(
    txn: &mut impl KvTransaction,
    schema: &Schema,
    id: ObjId,
    field_id: u64,
    new: Value,
    listeners: &ListenerRegistry,
    validation_queue: &mut ValidationQueue,
    enqueue_validation: bool,
) -> Result<()> {
    ensure_exists(txn, id)?;
    let type_id = id.type_storage_id()?;
    let field = simple_field(schema, id, field_id)?.clone();
    let key = keys::field_key(id, field_id)?;
    let old_bytes = txn.get(&key)?;
    let (old, indexed, unique) = match &field {
        Field::Simple {
            simple_type,
            indexed,
            unique,
            ..
        } => (Value::decode(old_bytes.as_deref(), simple_type)?, *indexed, *unique),
        Field::Reference { .. } => {
            let old = match &old_bytes {
                Some(b) => Value::U64(ObjId::from_bytes(b)?.raw()),
                None => Value::Null,
            };
            (old, true, false)
        }
        _ => return Err(DatabaseError::FieldNotInSchema(field_id, type_id)),
    };
    if old == new {
        return Ok(());
    }
    let new_bytes = match &field {
        Field::Simple { simple_type, .. } => new.encode(field_id, simple_type)?,
        Field::Reference { .. } => match &new {
            Value::Null => None,
            Value::U64(raw) => Some(ObjId::from_raw(*raw).to_bytes().to_vec()),
            _ => {
                return Err(DatabaseError::InvalidValue(
                    field_id,
                    "reference field requires an ObjId-derived value".into(),
                ))
            }
        },
        _ => unreachable!("field kind already checked above"),
    };
    match &new_bytes {
        Some(b) => txn.put(&key, b)?,
        None => txn.remove(&key)?,
    }
    if indexed {
        index::update_simple_index(txn, field_id, old_bytes.as_deref(), new_bytes.as_deref(), id)?;
    }
    update_composite_indexes(
        txn,
        schema,
        type_id,
        id,
        field_id,
        old_bytes.as_deref(),
        new_bytes.as_deref(),
    )?;
    trace!(field_id, %id, "wrote simple field");
    listeners.dispatch(&Event::SimpleChange {
        id,
        field_id,
        old,
        new: new.clone(),
    });
    if enqueue_validation && (unique || indexed) {
        validation_queue.enqueue(id);
    }
    Ok(())
}

/// Reads a counter field's current value (`0` if never written).
pub fn read_counter(txn: &impl KvTransaction, id: ObjId, field_id: u64) -> Result<i64> {
    ensure_exists(txn, id)?;
    let bytes = txn.get(&keys::field_key(id, field_id)?)?;
    Ok(match bytes {
        Some(b) => crate::codec::decode_i64(&b)?.0,
        None => 0,
    })
}

/// Atomically adjusts a counter field by `delta`, preferring the KV
/// backend's native `atomic_add` and falling back to read-modify-write
/// (spec §4.4 `adjust_counter`, §9).
pub fn adjust_counter(
    txn: &mut impl KvTransaction,
    id: ObjId,
    field_id: u64,
    delta: i64,
    listeners: &ListenerRegistry,
) -> Result<i64> {
    ensure_exists(txn, id)?;
    let key = keys::field_key(id, field_id)?;
    let new_value = match txn.atomic_add(&key, delta)? {
        Some(v) => v,
        None => {
            let current = read_counter(txn, id, field_id)?;
            let updated = current.wrapping_add(delta);
            let mut bytes = Vec::with_capacity(8);
            crate::codec::encode_i64(updated, &mut bytes);
            txn.put(&key, &bytes)?;
            updated
        }
    };
    listeners.dispatch(&Event::CounterAdjust {
        id,
        field_id,
        delta,
        new_value,
    });
    Ok(new_value)
}

fn set_subfield<'a>(schema: &'a Schema, id: ObjId, field_id: u64) -> Result<&'a SubField> {
    match simple_field(schema, id, field_id)? {
        Field::Set { element, .. } => Ok(element),
        _ => Err(DatabaseError::FieldNotInSchema(field_id, id.type_storage_id()?)),
    }
}

/// Adds `value` to a set field. A no-op if already present.
pub fn add_set(
    txn: &mut impl KvTransaction,
    schema: &Schema,
    id: ObjId,
    field_id: u64,
    value: &Value,
    listeners: &ListenerRegistry,
) -> Result<()> {
    ensure_exists(txn, id)?;
    let sub = set_subfield(schema, id, field_id)?.clone();
    let elem_bytes = encode_subfield(field_id, &sub, value)?;
    let key = keys::set_key(id, field_id, &elem_bytes)?;
    if txn.get(&key)?.is_some() {
        return Ok(());
    }
    txn.put(&key, &[])?;
    if sub.kind.is_indexed() {
        index::add_collection_index_entry(
            txn,
            subfield_index_id(field_id, sub.storage_id),
            Some(&elem_bytes),
            id,
            &[],
        )?;
    }
    listeners.dispatch(&Event::SetAdd {
        id,
        field_id,
        element: elem_bytes,
    });
    Ok(())
}

/// Removes `value` from a set field. A no-op if absent.
pub fn remove_set(
    txn: &mut impl KvTransaction,
    schema: &Schema,
    id: ObjId,
    field_id: u64,
    value: &Value,
    listeners: &ListenerRegistry,
) -> Result<()> {
    ensure_exists(txn, id)?;
    let sub = set_subfield(schema, id, field_id)?.clone();
    let elem_bytes = encode_subfield(field_id, &sub, value)?;
    let key = keys::set_key(id, field_id, &elem_bytes)?;
    if txn.get(&key)?.is_none() {
        return Ok(());
    }
    txn.remove(&key)?;
    if sub.kind.is_indexed() {
        index::remove_collection_index_entry(
            txn,
            subfield_index_id(field_id, sub.storage_id),
            Some(&elem_bytes),
            id,
            &[],
        )?;
    }
    listeners.dispatch(&Event::SetRemove {
        id,
        field_id,
        element: elem_bytes,
    });
    Ok(())
}

/// Every element currently in a set field, in ascending encoded order.
pub fn iter_set(txn: &impl KvTransaction, id: ObjId, field_id: u64) -> Result<Vec<Vec<u8>>> {
    let prefix = keys::field_prefix(keys::PREFIX_SET, id, field_id)?;
    let upper = crate::kv::increment_prefix(&prefix);
    let mut out = Vec::new();
    for (key, _) in txn.range_scan(&prefix, upper.as_deref(), false)? {
        out.push(key[prefix.len()..].to_vec());
    }
    Ok(out)
}

fn list_subfield<'a>(schema: &'a Schema, id: ObjId, field_id: u64) -> Result<&'a SubField> {
    match simple_field(schema, id, field_id)? {
        Field::List { element, .. } => Ok(element),
        _ => Err(DatabaseError::FieldNotInSchema(field_id, id.type_storage_id()?)),
    }
}

/// Every `(position, encoded element)` pair in a list field, in order.
pub fn get_list(
    txn: &impl KvTransaction,
    id: ObjId,
    field_id: u64,
) -> Result<Vec<(u32, Vec<u8>)>> {
    let prefix = keys::field_prefix(keys::PREFIX_LST, id, field_id)?;
    let upper = crate::kv::increment_prefix(&prefix);
    let mut out = Vec::new();
    for (key, value) in txn.range_scan(&prefix, upper.as_deref(), false)? {
        let (index, _) = crate::codec::decode_u32_fixed(&key[prefix.len()..])?;
        out.push((index, value));
    }
    Ok(out)
}

fn reindex_list_position(
    txn: &mut impl KvTransaction,
    sub: &SubField,
    field_id: u64,
    id: ObjId,
    old_index: u32,
    new_index: u32,
    elem_bytes: &[u8],
) -> Result<()> {
    if !sub.kind.is_indexed() {
        return Ok(());
    }
    index::remove_collection_index_entry(
        txn,
        subfield_index_id(field_id, sub.storage_id),
        Some(elem_bytes),
        id,
        &old_index.to_be_bytes(),
    )?;
    index::add_collection_index_entry(
        txn,
        subfield_index_id(field_id, sub.storage_id),
        Some(elem_bytes),
        id,
        &new_index.to_be_bytes(),
    )
}

/// Overwrites the element at `index`, which must already exist. Dispatches
/// [`Event::ListReplace`].
pub fn set_list_at(
    txn: &mut impl KvTransaction,
    schema: &Schema,
    id: ObjId,
    field_id: u64,
    index: u32,
    value: &Value,
    listeners: &ListenerRegistry,
) -> Result<()> {
    ensure_exists(txn, id)?;
    let sub = list_subfield(schema, id, field_id)?.clone();
    let key = keys::list_key(id, field_id, index)?;
    let old = txn
        .get(&key)?
        .ok_or_else(|| DatabaseError::InvalidValue(field_id, format!("no list element at {index}")))?;
    let new_bytes = encode_subfield(field_id, &sub, value)?;
    txn.put(&key, &new_bytes)?;
    if sub.kind.is_indexed() {
        index::remove_collection_index_entry(
            txn,
            subfield_index_id(field_id, sub.storage_id),
            Some(&old),
            id,
            &index.to_be_bytes(),
        )?;
        index::add_collection_index_entry(
            txn,
            subfield_index_id(field_id, sub.storage_id),
            Some(&new_bytes),
            id,
            &index.to_be_bytes(),
        )?;
    }
    listeners.dispatch(&Event::ListReplace {
        id,
        field_id,
        index,
        old,
        new: new_bytes,
    });
    Ok(())
}

/// Inserts `value` at `index`, shifting every existing element at or past
/// `index` one position later. Dispatches [`Event::ListAdd`].
pub fn insert_list(
    txn: &mut impl KvTransaction,
    schema: &Schema,
    id: ObjId,
    field_id: u64,
    index: u32,
    value: &Value,
    listeners: &ListenerRegistry,
) -> Result<()> {
    ensure_exists(txn, id)?;
    let sub = list_subfield(schema, id, field_id)?.clone();
    let mut existing = get_list(txn, id, field_id)?;
    existing.retain(|(i, _)| *i >= index);
    existing.sort_by(|a, b| b.0.cmp(&a.0));
    for (i, bytes) in existing {
        let old_key = keys::list_key(id, field_id, i)?;
        txn.remove(&old_key)?;
        let new_key = keys::list_key(id, field_id, i + 1)?;
        txn.put(&new_key, &bytes)?;
        reindex_list_position(txn, &sub, field_id, id, i, i + 1, &bytes)?;
    }
    let elem_bytes = encode_subfield(field_id, &sub, value)?;
    txn.put(&keys::list_key(id, field_id, index)?, &elem_bytes)?;
    if sub.kind.is_indexed() {
        index::add_collection_index_entry(
            txn,
            subfield_index_id(field_id, sub.storage_id),
            Some(&elem_bytes),
            id,
            &index.to_be_bytes(),
        )?;
    }
    listeners.dispatch(&Event::ListAdd {
        id,
        field_id,
        index,
        element: elem_bytes,
    });
    Ok(())
}

/// Removes the element at `index`, shifting every later element one
/// position earlier. Dispatches [`Event::ListRemove`]. A no-op if `index`
/// is out of bounds.
pub fn remove_list_at(
    txn: &mut impl KvTransaction,
    schema: &Schema,
    id: ObjId,
    field_id: u64,
    index: u32,
    listeners: &ListenerRegistry,
) -> Result<()> {
    ensure_exists(txn, id)?;
    let sub = list_subfield(schema, id, field_id)?.clone();
    let key = keys::list_key(id, field_id, index)?;
    let Some(removed) = txn.get(&key)? else {
        return Ok(());
    };
    txn.remove(&key)?;
    if sub.kind.is_indexed() {
        index::remove_collection_index_entry(
            txn,
            subfield_index_id(field_id, sub.storage_id),
            Some(&removed),
            id,
            &index.to_be_bytes(),
        )?;
    }
    let mut following = get_list(txn, id, field_id)?;
    following.retain(|(i, _)| *i > index);
    following.sort_by(|a, b| a.0.cmp(&b.0));
    for (i, bytes) in following {
        let old_key = keys::list_key(id, field_id, i)?;
        txn.remove(&old_key)?;
        let new_key = keys::list_key(id, field_id, i - 1)?;
        txn.put(&new_key, &bytes)?;
        reindex_list_position(txn, &sub, field_id, id, i, i - 1, &bytes)?;
    }
    listeners.dispatch(&Event::ListRemove {
        id,
        field_id,
        index,
        element: removed,
    });
    Ok(())
}

fn map_subfields<'a>(
    schema: &'a Schema,
    id: ObjId,
    field_id: u64,
) -> Result<(&'a SubField, &'a SubField)> {
    match simple_field(schema, id, field_id)? {
        Field::Map { key, value, .. } => Ok((key, value)),
        _ => Err(DatabaseError::FieldNotInSchema(field_id, id.type_storage_id()?)),
    }
}

/// Inserts or overwrites a map entry. Dispatches [`Event::MapPut`].
pub fn put_map(
    txn: &mut impl KvTransaction,
    schema: &Schema,
    id: ObjId,
    field_id: u64,
    key_value: &Value,
    value_value: &Value,
    listeners: &ListenerRegistry,
) -> Result<()> {
    ensure_exists(txn, id)?;
    let (key_sub, value_sub) = map_subfields(schema, id, field_id)?;
    let (key_sub, value_sub) = (key_sub.clone(), value_sub.clone());
    let key_bytes = encode_subfield(field_id, &key_sub, key_value)?;
    let value_bytes = encode_subfield(field_id, &value_sub, value_value)?;
    let kv_key = keys::map_key(id, field_id, &key_bytes)?;
    let old_value = txn.get(&kv_key)?;
    txn.put(&kv_key, &value_bytes)?;
    if value_sub.kind.is_indexed() {
        if let Some(old) = &old_value {
            index::remove_collection_index_entry(
                txn,
                subfield_index_id(field_id, SUBFIELD_VALUE),
                Some(old),
                id,
                &key_bytes,
            )?;
        }
        index::add_collection_index_entry(
            txn,
            subfield_index_id(field_id, SUBFIELD_VALUE),
            Some(&value_bytes),
            id,
            &key_bytes,
        )?;
    }
    listeners.dispatch(&Event::MapPut {
        id,
        field_id,
        key: key_bytes,
        old_value,
        new_value: value_bytes,
    });
    Ok(())
}

/// Removes a map entry, if present. Dispatches [`Event::MapRemove`].
pub fn remove_map_key(
    txn: &mut impl KvTransaction,
    schema: &Schema,
    id: ObjId,
    field_id: u64,
    key_value: &Value,
    listeners: &ListenerRegistry,
) -> Result<()> {
    ensure_exists(txn, id)?;
    let (key_sub, value_sub) = map_subfields(schema, id, field_id)?;
    let (key_sub, value_sub) = (key_sub.clone(), value_sub.clone());
    let key_bytes = encode_subfield(field_id, &key_sub, key_value)?;
    let kv_key = keys::map_key(id, field_id, &key_bytes)?;
    let Some(old_value) = txn.get(&kv_key)? else {
        return Ok(());
    };
    txn.remove(&kv_key)?;
    if value_sub.kind.is_indexed() {
        index::remove_collection_index_entry(
            txn,
            subfield_index_id(field_id, SUBFIELD_VALUE),
            Some(&old_value),
            id,
            &key_bytes,
        )?;
    }
    listeners.dispatch(&Event::MapRemove {
        id,
        field_id,
        key: key_bytes,
        old_value,
    });
    Ok(())
}

/// Every `(encoded key, encoded value)` pair in a map field, ordered by
/// key.
pub fn iter_map(txn: &impl KvTransaction, id: ObjId, field_id: u64) -> Result<Vec<(Vec<u8>, Vec<u8>)>> {
    let prefix = keys::field_prefix(keys::PREFIX_MAP, id, field_id)?;
    let upper = crate::kv::increment_prefix(&prefix);
    let mut out = Vec::new();
    for (key, value) in txn.range_scan(&prefix, upper.as_deref(), false)? {
        out.push((key[prefix.len()..].to_vec(), value));
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kv::KvStore;
    use crate::mem::MemKv;
    use crate::schema::{ObjectType, SchemaBuilder, SimpleType};
    use std::collections::BTreeMap;

    fn schema_with_set() -> Schema {
        let mut fields = BTreeMap::new();
        fields.insert(
            1,
            Field::Set {
                storage_id: 1,
                name: "tags".into(),
                element: SubField {
                    storage_id: crate::schema::SUBFIELD_ELEMENT_OR_KEY,
                    kind: SubFieldKind::Simple {
                        simple_type: SimpleType::String,
                        indexed: true,
                    },
                },
            },
        );
        SchemaBuilder::new()
            .object_type(ObjectType {
                storage_id: 1,
                name: "Thing".into(),
                fields,
            })
            .build()
            .unwrap()
    }

    #[test]
    fn set_add_remove_roundtrip() {
        let schema = schema_with_set();
        let kv = MemKv::new();
        let mut txn = kv.begin().unwrap();
        let id = ObjId::new(1, 0);
        txn.put(&keys::obj_key(id), &[]).unwrap();
        let listeners = ListenerRegistry::new();
        add_set(&mut txn, &schema, id, 1, &Value::String("a".into()), &listeners).unwrap();
        add_set(&mut txn, &schema, id, 1, &Value::String("b".into()), &listeners).unwrap();
        assert_eq!(iter_set(&txn, id, 1).unwrap().len(), 2);
        remove_set(&mut txn, &schema, id, 1, &Value::String("a".into()), &listeners).unwrap();
        assert_eq!(iter_set(&txn, id, 1).unwrap().len(), 1);
    }

    fn schema_with_list() -> Schema {
        let mut fields = BTreeMap::new();
        fields.insert(
            1,
            Field::List {
                storage_id: 1,
                name: "items".into(),
                element: SubField {
                    storage_id: crate::schema::SUBFIELD_ELEMENT_OR_KEY,
                    kind: SubFieldKind::Simple {
                        simple_type: SimpleType::I64,
                        indexed: false,
                    },
                },
            },
        );
        SchemaBuilder::new()
            .object_type(ObjectType {
                storage_id: 1,
                name: "Thing".into(),
                fields,
            })
            .build()
            .unwrap()
    }

    #[test]
    fn list_insert_shifts_tail() {
        let schema = schema_with_list();
        let kv = MemKv::new();
        let mut txn = kv.begin().unwrap();
        let id = ObjId::new(1, 0);
        txn.put(&keys::obj_key(id), &[]).unwrap();
        let listeners = ListenerRegistry::new();
        set_list_at_for_test(&mut txn, &schema, id, &listeners, 0, 10);
        set_list_at_for_test(&mut txn, &schema, id, &listeners, 1, 20);
        insert_list(&mut txn, &schema, id, 1, 0, &Value::I64(5), &listeners).unwrap();
        let list = get_list(&txn, id, 1).unwrap();
        assert_eq!(list.len(), 3);
        assert_eq!(list[0].0, 0);
        assert_eq!(list[1].0, 1);
        assert_eq!(list[2].0, 2);
    }

    fn set_list_at_for_test(
        txn: &mut crate::mem::MemTxn,
        schema: &Schema,
        id: ObjId,
        listeners: &ListenerRegistry,
        index: u32,
        value: i64,
    ) {
        let key = keys::list_key(id, 1, index).unwrap();
        let mut bytes = Vec::new();
        crate::codec::encode_i64(value, &mut bytes);
        txn.put(&key, &bytes).unwrap();
        let _ = (schema, listeners);
    }

    #[test]
    fn map_put_remove_roundtrip() {
        let mut fields = BTreeMap::new();
        fields.insert(
            1,
            Field::Map {
                storage_id: 1,
                name: "attrs".into(),
                key: SubField {
                    storage_id: crate::schema::SUBFIELD_ELEMENT_OR_KEY,
                    kind: SubFieldKind::Simple {
                        simple_type: SimpleType::String,
                        indexed: false,
                    },
                },
                value: SubField {
                    storage_id: SUBFIELD_VALUE,
                    kind: SubFieldKind::Simple {
                        simple_type: SimpleType::I64,
                        indexed: true,
                    },
                },
            },
        );
        let schema = SchemaBuilder::new()
            .object_type(ObjectType {
                storage_id: 1,
                name: "Thing".into(),
                fields,
            })
            .build()
            .unwrap();
        let kv = MemKv::new();
        let mut txn = kv.begin().unwrap();
        let id = ObjId::new(1, 0);
        txn.put(&keys::obj_key(id), &[]).unwrap();
        let listeners = ListenerRegistry::new();
        put_map(
            &mut txn,
            &schema,
            id,
            1,
            &Value::String("x".into()),
            &Value::I64(42),
            &listeners,
        )
        .unwrap();
        assert_eq!(iter_map(&txn, id, 1).unwrap().len(), 1);
        remove_map_key(&mut txn, &schema, id, 1, &Value::String("x".into()), &listeners).unwrap();
        assert_eq!(iter_map(&txn, id, 1).unwrap().len(), 0);
    }
}
