//! Object deletion and reference-integrity cascades (spec §4.4 "Reference
//! integrity on delete").

use std::collections::HashSet;

use tracing::trace;

use crate::error::{DatabaseError, Result};
use crate::index;
use crate::keys;
use crate::kv::KvTransaction;
use crate::listener::{Event, ListenerRegistry};
use crate::objid::ObjId;
use crate::schema::{Field, OnDelete, Schema, SubFieldKind};
use crate::value::Value;

/// Deletes `id` and applies every reference field's `on_delete` policy to
/// objects that referred to it. Detects cycles via `visited` so a `Delete`
/// cascade (or a pair of `forward_delete` fields pointing at each other)
/// terminates instead of looping forever.
pub fn delete(
    txn: &mut impl KvTransaction,
    schema: &Schema,
    id: ObjId,
    listeners: &ListenerRegistry,
    visited: &mut HashSet<ObjId>,
) -> Result<()> {
    if !visited.insert(id) {
        return Ok(());
    }
    if txn.get(&keys::obj_key(id))?.is_none() {
        return Ok(());
    }
    let type_id = id.type_storage_id()?;
    let ty = schema.object_type(type_id)?;

    // Resolve referrers before mutating anything, so partial application of
    // an EXCEPTION-blocked delete never happens.
    for (referrer_type, field) in schema.reference_fields_targeting(type_id) {
        resolve_referrers(txn, schema, referrer_type, field, id, listeners, visited)?;
    }

    let forward_targets = forward_delete_targets(txn, ty, id)?;

    remove_object_storage(txn, schema, ty, id)?;
    trace!(%id, type_id, "deleted object");
    #[cfg(feature = "metrics")]
    crate::metrics::OBJECTS_DELETED
        .with_label_values(&[&type_id.to_string()])
        .inc();
    listeners.dispatch(&Event::Delete { id, type_id });

    for target in forward_targets {
        delete(txn, schema, target, listeners, visited)?;
    }
    Ok(())
}

fn forward_delete_targets(
    txn: &impl KvTransaction,
    ty: &crate::schema::ObjectType,
    id: ObjId,
) -> Result<Vec<ObjId>> {
    let mut out = Vec::new();
    for field in ty.fields.values() {
        if let Field::Reference {
            storage_id,
            forward_delete: true,
            ..
        } = field
        {
            if let Some(bytes) = txn.get(&keys::field_key(id, *storage_id)?)? {
                out.push(ObjId::from_bytes(&bytes)?);
            }
        }
    }
    Ok(out)
}

#[allow(clippy::too_many_arguments)]
fn resolve_referrers(
    txn: &mut impl KvTransaction,
    schema: &Schema,
    referrer_type: u64,
    field: &Field,
    target: ObjId,
    listeners: &ListenerRegistry,
    visited: &mut HashSet<ObjId>,
) -> Result<()> {
    let _ = referrer_type;
    match field {
        Field::Reference {
            storage_id,
            on_delete,
            ..
        } => {
            for referrer in index::query_reverse_reference(txn, *storage_id, target)? {
                if visited.contains(&referrer) {
                    continue;
                }
                apply_on_delete_simple(
                    txn, schema, referrer, *storage_id, *on_delete, target, listeners, visited,
                )?;
            }
        }
        Field::Set { storage_id, element, .. } | Field::List { storage_id, element, .. } => {
            if let SubFieldKind::Reference {
                allow_dangling: _,
                ..
            } = &element.kind
            {
                let idx_id = (*storage_id << 2) | element.storage_id;
                for referrer in index::query_reverse_reference(txn, idx_id, target)? {
                    if visited.contains(&referrer) {
                        continue;
                    }
                    apply_on_delete_collection(
                        txn, schema, referrer, *storage_id, target, listeners, visited,
                    )?;
                }
            }
        }
        Field::Map { storage_id, key, value, .. } => {
            for sub in [key, value] {
                if matches!(sub.kind, SubFieldKind::Reference { .. }) {
                    let idx_id = (*storage_id << 2) | sub.storage_id;
                    for referrer in index::query_reverse_reference(txn, idx_id, target)? {
                        if visited.contains(&referrer) {
                            continue;
                        }
                        apply_on_delete_collection(
                            txn, schema, referrer, *storage_id, target, listeners, visited,
                        )?;
                    }
                }
            }
        }
        _ => {}
    }
    Ok(())
}

#[allow(clippy::too_many_arguments)]
fn apply_on_delete_simple(
    txn: &mut impl KvTransaction,
    schema: &Schema,
    referrer: ObjId,
    field_id: u64,
    on_delete: OnDelete,
    target: ObjId,
    listeners: &ListenerRegistry,
    visited: &mut HashSet<ObjId>,
) -> Result<()> {
    match on_delete {
        OnDelete::Exception => Err(DatabaseError::ReferencedObject {
            referrer,
            target,
            field: field_id,
        }),
        OnDelete::Ignore => Ok(()),
        OnDelete::Unreference => {
            let key = keys::field_key(referrer, field_id)?;
            if let Some(old) = txn.get(&key)? {
                txn.remove(&key)?;
                index::remove_simple_index(txn, field_id, Some(&old), referrer)?;
            }
            listeners.dispatch(&Event::SimpleChange {
                id: referrer,
                field_id,
                old: Value::U64(target.raw()),
                new: Value::Null,
            });
            Ok(())
        }
        OnDelete::Delete => delete(txn, schema, referrer, listeners, visited),
    }
}

/// Collection-field referrers are always unreferenced by removing the
/// individual element (there is no per-element `on_delete`: the owning
/// field's declared policy on the containing [`Field::Reference`] variant
/// does not apply to `Set`/`List`/`Map`; the core clears the dangling
/// element the way a reference field with `UNREFERENCE` would).
fn apply_on_delete_collection(
    txn: &mut impl KvTransaction,
    _schema: &Schema,
    referrer: ObjId,
    field_id: u64,
    target: ObjId,
    listeners: &ListenerRegistry,
    _visited: &mut HashSet<ObjId>,
) -> Result<()> {
    let target_bytes = target.to_bytes();
    let set_key = keys::set_key(referrer, field_id, &target_bytes)?;
    if txn.get(&set_key)?.is_some() {
        txn.remove(&set_key)?;
        index::remove_collection_index_entry(
            txn,
            (field_id << 2) | crate::schema::SUBFIELD_ELEMENT_OR_KEY,
            Some(&target_bytes),
            referrer,
            &[],
        )?;
        listeners.dispatch(&Event::SetRemove {
            id: referrer,
            field_id,
            element: target_bytes.to_vec(),
        });
        return Ok(());
    }
    for (index_pos, elem) in crate::txn::fields::get_list(txn, referrer, field_id)? {
        if elem == target_bytes {
            crate::txn::fields::remove_list_at(
                txn,
                _schema,
                referrer,
                field_id,
                index_pos,
                listeners,
            )?;
            return Ok(());
        }
    }
    for (k, v) in crate::txn::fields::iter_map(txn, referrer, field_id)? {
        if v == target_bytes {
            let map_key = keys::map_key(referrer, field_id, &k)?;
            txn.remove(&map_key)?;
            index::remove_collection_index_entry(
                txn,
                (field_id << 2) | crate::schema::SUBFIELD_VALUE,
                Some(&v),
                referrer,
                &k,
            )?;
            listeners.dispatch(&Event::MapRemove {
                id: referrer,
                field_id,
                key: k,
                old_value: v,
            });
            return Ok(());
        }
    }
    Ok(())
}

fn remove_object_storage(
    txn: &mut impl KvTransaction,
    schema: &Schema,
    ty: &crate::schema::ObjectType,
    id: ObjId,
) -> Result<()> {
    // Composite index entries are read and removed before any constituent
    // field's own FLD record is cleared below.
    for idx in schema.composite_indexes_for(ty.storage_id) {
        let mut tuple = Vec::with_capacity(idx.field_ids.len());
        for field_id in &idx.field_ids {
            tuple.push(txn.get(&keys::field_key(id, *field_id)?)?);
        }
        index::remove_composite_index(txn, idx.storage_id, &tuple, id)?;
    }
    for field in ty.fields.values() {
        match field {
            Field::Simple {
                storage_id,
                simple_type,
                indexed,
                ..
            } => {
                let key = keys::field_key(id, *storage_id)?;
                if let Some(bytes) = txn.get(&key)? {
                    txn.remove(&key)?;
                    if *indexed {
                        index::remove_simple_index(txn, *storage_id, Some(&bytes), id)?;
                    }
                }
                let _ = simple_type;
            }
            Field::Counter { storage_id, .. } => {
                txn.remove(&keys::field_key(id, *storage_id)?)?;
            }
            Field::Reference { storage_id, .. } => {
                let key = keys::field_key(id, *storage_id)?;
                if let Some(bytes) = txn.get(&key)? {
                    txn.remove(&key)?;
                    index::remove_simple_index(txn, *storage_id, Some(&bytes), id)?;
                }
            }
            Field::Set { storage_id, element, .. } => {
                let prefix = keys::object_namespace_prefix(keys::PREFIX_SET, id);
                let mut prefix_with_field = prefix.clone();
                crate::codec::encode_uint(*storage_id, &mut prefix_with_field)?;
                let upper = crate::kv::increment_prefix(&prefix_with_field);
                if element.kind.is_indexed() {
                    let idx_id = (*storage_id << 2) | element.storage_id;
                    for (key, _) in txn.range_scan(&prefix_with_field, upper.as_deref(), false)? {
                        let elem = key[prefix_with_field.len()..].to_vec();
                        index::remove_collection_index_entry(txn, idx_id, Some(&elem), id, &[])?;
                    }
                }
                txn.remove_range(&prefix_with_field, upper.as_deref())?;
            }
            Field::List { storage_id, element, .. } => {
                let mut prefix = vec![keys::PREFIX_LST];
                prefix.extend_from_slice(&id.to_bytes());
                crate::codec::encode_uint(*storage_id, &mut prefix)?;
                let upper = crate::kv::increment_prefix(&prefix);
                if element.kind.is_indexed() {
                    let idx_id = (*storage_id << 2) | element.storage_id;
                    for (key, value) in txn.range_scan(&prefix, upper.as_deref(), false)? {
                        let (pos, _) = crate::codec::decode_u32_fixed(&key[prefix.len()..])?;
                        index::remove_collection_index_entry(
                            txn,
                            idx_id,
                            Some(&value),
                            id,
                            &pos.to_be_bytes(),
                        )?;
                    }
                }
                txn.remove_range(&prefix, upper.as_deref())?;
            }
            Field::Map { storage_id, key, value, .. } => {
                let mut prefix = vec![keys::PREFIX_MAP];
                prefix.extend_from_slice(&id.to_bytes());
                crate::codec::encode_uint(*storage_id, &mut prefix)?;
                let upper = crate::kv::increment_prefix(&prefix);
                if value.kind.is_indexed() {
                    let idx_id = (*storage_id << 2) | crate::schema::SUBFIELD_VALUE;
                    for (full_key, v) in txn.range_scan(&prefix, upper.as_deref(), false)? {
                        let k = full_key[prefix.len()..].to_vec();
                        index::remove_collection_index_entry(txn, idx_id, Some(&v), id, &k)?;
                    }
                }
                let _ = key;
                txn.remove_range(&prefix, upper.as_deref())?;
            }
        }
    }
    txn.remove(&keys::obj_key(id))
}
