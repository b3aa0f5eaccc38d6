//! The KV key layout (spec §4.3): a pure, symmetric mapping between
//! (namespace, object id, field id, sub-key) tuples and KV keys.

use crate::codec;
use crate::error::{CodecError, Result};
use crate::objid::ObjId;

/// Per-object header record: key = `OBJ ∥ ObjId`.
pub const PREFIX_OBJ: u8 = b'O';
/// Simple/counter field value: key = `FLD ∥ ObjId ∥ field_id`.
pub const PREFIX_FLD: u8 = b'F';
/// Set element: key = `SET ∥ ObjId ∥ field_id ∥ element`.
pub const PREFIX_SET: u8 = b'S';
/// List element: key = `LST ∥ ObjId ∥ field_id ∥ fixed_u32(index)`.
pub const PREFIX_LST: u8 = b'L';
/// Map entry: key = `MAP ∥ ObjId ∥ field_id ∥ key`.
pub const PREFIX_MAP: u8 = b'M';
/// Simple-field index entry: key = `IDX ∥ field_id ∥ value ∥ ObjId`.
pub const PREFIX_IDX: u8 = b'I';
/// Composite index entry: key = `CIX ∥ index_id ∥ v1 ∥ … ∥ vn ∥ ObjId`.
pub const PREFIX_CIX: u8 = b'C';
/// Schema registry record: key = `SCH ∥ version_number`.
pub const PREFIX_SCH: u8 = b'V';
/// The single key holding the highest registered schema version number.
pub const KEY_SCHEMA_HIGHEST_VERSION: &[u8] = b"\x00highest_schema_version";

fn with_prefix(prefix: u8, rest: impl FnOnce(&mut Vec<u8>)) -> Vec<u8> {
    let mut out = vec![prefix];
    rest(&mut out);
    out
}

/// Sentinel byte prepended to a null simple-field value's index entry so
/// it sorts before every non-null encoding (spec §4.5 "Null handling").
pub const NULL_SENTINEL: u8 = 0x00;
/// Prefix byte for a present (non-null) value in an index entry.
pub const PRESENT_SENTINEL: u8 = 0x01;

/// Wraps an already-encoded simple value with the present/null sentinel
/// used in index keys, so nulls sort first.
pub fn encode_indexable(value: Option<&[u8]>, out: &mut Vec<u8>) {
    match value {
        None => out.push(NULL_SENTINEL),
        Some(bytes) => {
            out.push(PRESENT_SENTINEL);
            out.extend_from_slice(bytes);
        }
    }
}

/// `OBJ ∥ ObjId`.
pub fn obj_key(id: ObjId) -> Vec<u8> {
    with_prefix(PREFIX_OBJ, |out| out.extend_from_slice(&id.to_bytes()))
}

/// Prefix covering every record of a given namespace belonging to `id`,
/// regardless of field id — used to bulk-remove all of an object's
/// `FLD`/`SET`/`LST`/`MAP` records on delete.
pub fn object_namespace_prefix(namespace: u8, id: ObjId) -> Vec<u8> {
    with_prefix(namespace, |out| out.extend_from_slice(&id.to_bytes()))
}

/// `FLD ∥ ObjId ∥ field_id`.
pub fn field_key(id: ObjId, field_id: u64) -> Result<Vec<u8>> {
    let mut out = vec![PREFIX_FLD];
    out.extend_from_slice(&id.to_bytes());
    codec::encode_uint(field_id, &mut out)?;
    Ok(out)
}

/// Prefix covering every `FLD`/`SET`/`LST`/`MAP` record naming the given
/// field on the given object — used to clear a collection field.
pub fn field_prefix(namespace: u8, id: ObjId, field_id: u64) -> Result<Vec<u8>> {
    let mut out = vec![namespace];
    out.extend_from_slice(&id.to_bytes());
    codec::encode_uint(field_id, &mut out)?;
    Ok(out)
}

/// `SET ∥ ObjId ∥ field_id ∥ element`. `element` is the element's own
/// (already order-preserving) encoded bytes.
pub fn set_key(id: ObjId, field_id: u64, element: &[u8]) -> Result<Vec<u8>> {
    let mut out = field_prefix(PREFIX_SET, id, field_id)?;
    out.extend_from_slice(element);
    Ok(out)
}

/// `LST ∥ ObjId ∥ field_id ∥ fixed_u32(index)`.
pub fn list_key(id: ObjId, field_id: u64, index: u32) -> Result<Vec<u8>> {
    let mut out = field_prefix(PREFIX_LST, id, field_id)?;
    codec::encode_u32_fixed(index, &mut out);
    Ok(out)
}

/// `MAP ∥ ObjId ∥ field_id ∥ key`. `key` is the map key's own encoded
/// bytes.
pub fn map_key(id: ObjId, field_id: u64, key: &[u8]) -> Result<Vec<u8>> {
    let mut out = field_prefix(PREFIX_MAP, id, field_id)?;
    out.extend_from_slice(key);
    Ok(out)
}

/// `IDX ∥ field_id ∥ value ∥ ObjId`. `value` must already carry the
/// present/null sentinel from [`encode_indexable`].
pub fn index_key(field_id: u64, indexable_value: &[u8], id: ObjId) -> Result<Vec<u8>> {
    let mut out = vec![PREFIX_IDX];
    codec::encode_uint(field_id, &mut out)?;
    out.extend_from_slice(indexable_value);
    out.extend_from_slice(&id.to_bytes());
    Ok(out)
}

/// `IDX ∥ field_id ∥ value ∥ ObjId ∥ suffix`. Used for collection-element
/// indexes where `suffix` disambiguates multiple occurrences of the same
/// value within one object's collection (e.g. a list position, or a map's
/// key bytes when indexing the value sub-field) — see spec §4.5
/// "Collection element index".
pub fn index_key_with_suffix(
    field_id: u64,
    indexable_value: &[u8],
    id: ObjId,
    suffix: &[u8],
) -> Result<Vec<u8>> {
    let mut out = index_key(field_id, indexable_value, id)?;
    out.extend_from_slice(suffix);
    Ok(out)
}

/// Prefix covering every `IDX` entry for a given field and encoded value,
/// regardless of owning object (used to range-scan matching objects).
pub fn index_value_prefix(field_id: u64, indexable_value: &[u8]) -> Result<Vec<u8>> {
    let mut out = vec![PREFIX_IDX];
    codec::encode_uint(field_id, &mut out)?;
    out.extend_from_slice(indexable_value);
    Ok(out)
}

/// Prefix covering every `IDX` entry for a given field, across all values.
pub fn index_field_prefix(field_id: u64) -> Result<Vec<u8>> {
    let mut out = vec![PREFIX_IDX];
    codec::encode_uint(field_id, &mut out)?;
    Ok(out)
}

/// `CIX ∥ index_id ∥ v1 ∥ … ∥ vn ∥ ObjId`. Each `vi` must already carry the
/// present/null sentinel.
pub fn composite_index_key(index_id: u64, values: &[Vec<u8>], id: ObjId) -> Result<Vec<u8>> {
    let mut out = vec![PREFIX_CIX];
    codec::encode_uint(index_id, &mut out)?;
    for v in values {
        out.extend_from_slice(v);
    }
    out.extend_from_slice(&id.to_bytes());
    Ok(out)
}

/// Prefix covering every `CIX` entry for a given composite index and tuple
/// prefix (a proper prefix of the full tuple supports partial-key range
/// queries per spec §8 scenario 4).
pub fn composite_index_prefix(index_id: u64, value_prefix: &[Vec<u8>]) -> Result<Vec<u8>> {
    let mut out = vec![PREFIX_CIX];
    codec::encode_uint(index_id, &mut out)?;
    for v in value_prefix {
        out.extend_from_slice(v);
    }
    Ok(out)
}

/// `SCH ∥ version_number`.
pub fn schema_version_key(version: u32) -> Vec<u8> {
    with_prefix(PREFIX_SCH, |out| {
        out.extend_from_slice(&version.to_be_bytes())
    })
}

/// Parses a `version_number` back out of a [`schema_version_key`].
pub fn parse_schema_version_key(key: &[u8]) -> Result<u32> {
    if key.len() != 5 || key[0] != PREFIX_SCH {
        return Err(CodecError::Truncated {
            expected: 5,
            got: key.len(),
        }
        .into());
    }
    let mut buf = [0u8; 4];
    buf.copy_from_slice(&key[1..5]);
    Ok(u32::from_be_bytes(buf))
}

/// Prefix covering every `SCH` record, for enumerating registered versions.
pub fn schema_prefix() -> Vec<u8> {
    vec![PREFIX_SCH]
}

/// Prefix covering every `OBJ` record whose id encodes `type_id` in its
/// high bits (mirrors the bit-packing [`ObjId::new`] uses, so this is just
/// the type id's own encoded bytes after the namespace byte) — used to
/// range-scan every object of one type.
pub fn object_type_prefix(type_id: u64) -> Result<Vec<u8>> {
    let mut out = vec![PREFIX_OBJ];
    codec::encode_uint(type_id, &mut out)?;
    Ok(out)
}

/// Extracts the trailing `ObjId` from a key of fixed 8-byte id width
/// (`IDX`/`CIX` entries, where the id is always the last 8 bytes).
pub fn trailing_obj_id(key: &[u8]) -> Result<ObjId> {
    if key.len() < 8 {
        return Err(CodecError::Truncated {
            expected: 8,
            got: key.len(),
        }
        .into());
    }
    ObjId::from_bytes(&key[key.len() - 8..])
}
