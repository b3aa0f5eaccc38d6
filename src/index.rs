//! The index engine: incremental maintenance of simple, composite, and
//! collection-element indexes, plus the sorted range queries over them
//! (spec §4.5).

use std::ops::Bound;

use tracing::trace;

use crate::error::Result;
use crate::keys;
use crate::kv::{increment_prefix, KvTransaction};
use crate::objid::ObjId;

/// Wraps an already-encoded value with the null/present sentinel used in
/// every index key, so absent (`None`) values sort first and are still
/// indexed (spec §4.5 "Null handling").
fn indexable(value: Option<&[u8]>) -> Vec<u8> {
    let mut out = Vec::new();
    keys::encode_indexable(value, &mut out);
    out
}

/// Updates a simple field's index entry from `old` to `new`. A no-op old →
/// new where both sides are equal should not be called (the caller, i.e.
/// `write_simple`, skips index maintenance entirely when the value is
/// unchanged — see spec §4.4 `write_simple`).
pub fn update_simple_index(
    txn: &mut impl KvTransaction,
    field_id: u64,
    old: Option<&[u8]>,
    new: Option<&[u8]>,
    id: ObjId,
) -> Result<()> {
    let old_key = keys::index_key(field_id, &indexable(old), id)?;
    txn.remove(&old_key)?;
    let new_key = keys::index_key(field_id, &indexable(new), id)?;
    txn.put(&new_key, &[])?;
    trace!(field_id, %id, "updated simple index entry");
    Ok(())
}

/// Removes a simple field's index entry without inserting a replacement
/// (used when the owning object is deleted).
pub fn remove_simple_index(
    txn: &mut impl KvTransaction,
    field_id: u64,
    value: Option<&[u8]>,
    id: ObjId,
) -> Result<()> {
    let key = keys::index_key(field_id, &indexable(value), id)?;
    txn.remove(&key)
}

/// Adds a collection-element index entry (set/list/map sub-field). `suffix`
/// disambiguates repeated values within one object's collection (empty for
/// sets and map keys, which cannot repeat within an object; a fixed-width
/// position for list elements; the map key's bytes for map values).
pub fn add_collection_index_entry(
    txn: &mut impl KvTransaction,
    field_id: u64,
    value: Option<&[u8]>,
    id: ObjId,
    suffix: &[u8],
) -> Result<()> {
    let key = keys::index_key_with_suffix(field_id, &indexable(value), id, suffix)?;
    txn.put(&key, &[])
}

/// Removes a collection-element index entry added by
/// [`add_collection_index_entry`].
pub fn remove_collection_index_entry(
    txn: &mut impl KvTransaction,
    field_id: u64,
    value: Option<&[u8]>,
    id: ObjId,
    suffix: &[u8],
) -> Result<()> {
    let key = keys::index_key_with_suffix(field_id, &indexable(value), id, suffix)?;
    txn.remove(&key)
}

/// Updates a composite index's entry for `id` from `old_tuple` to
/// `new_tuple`. Each tuple element is already encoded (order-preserving)
/// but not yet sentinel-wrapped; this function wraps each element so the
/// composite key's per-column null handling matches simple indexes.
pub fn update_composite_index(
    txn: &mut impl KvTransaction,
    index_id: u64,
    old_tuple: &[Option<Vec<u8>>],
    new_tuple: &[Option<Vec<u8>>],
    id: ObjId,
) -> Result<()> {
    let old_wrapped: Vec<Vec<u8>> = old_tuple.iter().map(|v| indexable(v.as_deref())).collect();
    let old_key = keys::composite_index_key(index_id, &old_wrapped, id)?;
    txn.remove(&old_key)?;
    let new_wrapped: Vec<Vec<u8>> = new_tuple.iter().map(|v| indexable(v.as_deref())).collect();
    let new_key = keys::composite_index_key(index_id, &new_wrapped, id)?;
    txn.put(&new_key, &[])?;
    Ok(())
}

/// Removes a composite index entry (used on object deletion).
pub fn remove_composite_index(
    txn: &mut impl KvTransaction,
    index_id: u64,
    tuple: &[Option<Vec<u8>>],
    id: ObjId,
) -> Result<()> {
    let wrapped: Vec<Vec<u8>> = tuple.iter().map(|v| indexable(v.as_deref())).collect();
    let key = keys::composite_index_key(index_id, &wrapped, id)?;
    txn.remove(&key)
}

/// Point query: every `ObjId` whose current encoded value for `field_id`
/// equals `value` (`None` queries for the default/null value).
pub fn query_index(
    txn: &impl KvTransaction,
    field_id: u64,
    value: Option<&[u8]>,
) -> Result<Vec<ObjId>> {
    let prefix = keys::index_value_prefix(field_id, &indexable(value))?;
    let upper = increment_prefix(&prefix);
    let mut out = Vec::new();
    for (key, _) in txn.range_scan(&prefix, upper.as_deref(), false)? {
        out.push(keys::trailing_obj_id(&key)?);
    }
    Ok(out)
}

/// Range query over a simple field's index: returns `(encoded_value,
/// ObjId)` pairs for every entry whose encoded value falls in `range`,
/// in ascending lexicographic order of the encoded value (matching the
/// type's natural order, per spec §4.5 "Queries").
pub fn query_index_range(
    txn: &impl KvTransaction,
    field_id: u64,
    lower: Bound<&[u8]>,
    upper: Bound<&[u8]>,
) -> Result<Vec<(Vec<u8>, ObjId)>> {
    let field_prefix = keys::index_field_prefix(field_id)?;
    let min = match lower {
        Bound::Included(b) => {
            let mut v = field_prefix.clone();
            v.extend_from_slice(&indexable(Some(b)));
            v
        }
        Bound::Excluded(b) => {
            let mut v = field_prefix.clone();
            v.extend_from_slice(&indexable(Some(b)));
            // Exclude every key with this exact value, regardless of the
            // trailing ObjId's bytes: the true successor of the whole
            // value-prefix, not of a single appended byte (which a real
            // entry's ObjId suffix could start with, silently re-admitting
            // it). No successor exists only when the prefix is all 0xFF,
            // which cannot match a real encoded value here.
            match increment_prefix(&v) {
                Some(succ) => succ,
                None => return Ok(Vec::new()),
            }
        }
        Bound::Unbounded => field_prefix.clone(),
    };
    let max = match upper {
        Bound::Included(b) => {
            let mut v = field_prefix.clone();
            v.extend_from_slice(&indexable(Some(b)));
            v.push(0xFF);
            Some(v)
        }
        Bound::Excluded(b) => {
            let mut v = field_prefix.clone();
            v.extend_from_slice(&indexable(Some(b)));
            Some(v)
        }
        Bound::Unbounded => increment_prefix(&field_prefix),
    };
    let mut out = Vec::new();
    for (key, _) in txn.range_scan(&min, max.as_deref(), false)? {
        let rest = &key[field_prefix.len()..];
        let id = keys::trailing_obj_id(&key)?;
        let value_bytes = rest[..rest.len() - 8].to_vec();
        out.push((value_bytes, id));
    }
    Ok(out)
}

/// Exact-match composite index query: every `ObjId` whose current
/// constituent-field values equal `tuple` (each element already encoded
/// and sentinel-wrapped via [`indexable`] by the caller... for convenience
/// callers pass raw encoded-or-absent values and this function wraps them).
pub fn query_composite(
    txn: &impl KvTransaction,
    index_id: u64,
    tuple: &[Option<Vec<u8>>],
) -> Result<Vec<ObjId>> {
    let wrapped: Vec<Vec<u8>> = tuple.iter().map(|v| indexable(v.as_deref())).collect();
    let prefix = keys::composite_index_prefix(index_id, &wrapped)?;
    let upper = increment_prefix(&prefix);
    let mut out = Vec::new();
    for (key, _) in txn.range_scan(&prefix, upper.as_deref(), false)? {
        out.push(keys::trailing_obj_id(&key)?);
    }
    Ok(out)
}

/// Partial-prefix composite index query: every `(ObjId)` whose leading
/// constituent fields equal `prefix_tuple` (a proper prefix of the full
/// tuple), regardless of the remaining fields' values (spec §8 scenario 4,
/// `query_composite_range`).
pub fn query_composite_prefix(
    txn: &impl KvTransaction,
    index_id: u64,
    prefix_tuple: &[Option<Vec<u8>>],
) -> Result<Vec<ObjId>> {
    query_composite(txn, index_id, prefix_tuple)
}

/// Every object referencing `target` through `field_id` (a reference
/// field), using that field's own index — spec §4.4
/// `query_reverse_reference`.
pub fn query_reverse_reference(
    txn: &impl KvTransaction,
    field_id: u64,
    target: ObjId,
) -> Result<Vec<ObjId>> {
    query_index(txn, field_id, Some(&target.to_bytes()))
}
