//! Canonical byte encoding of a [`super::Schema`], and the content-hash
//! "schema ID" derived from it (spec §3, §4.2).

use sha2::{Digest, Sha256};

use super::{CompositeIndex, Field, ObjectType, Schema, SimpleType, SubField, SubFieldKind};
use crate::codec;
use crate::error::Result;

/// A content-hash identifier of a canonical schema encoding. Two schemas
/// with equal canonical bytes have equal `SchemaId`s, and vice versa.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SchemaId([u8; 32]);

impl SchemaId {
    /// Computes the `SchemaId` of `schema` from its canonical encoding.
    pub fn of(schema: &Schema) -> Self {
        let bytes = encode_for_storage(schema);
        let digest = Sha256::digest(&bytes);
        let mut out = [0u8; 32];
        out.copy_from_slice(&digest);
        SchemaId(out)
    }

    /// The raw 32-byte hash.
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }
}

impl std::fmt::Display for SchemaId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        for b in &self.0 {
            write!(f, "{:02x}", b)?;
        }
        Ok(())
    }
}

/// Encodes `schema` deterministically and self-describingly: object types
/// and fields are already stored sorted by storage id (`BTreeMap`), and
/// each field/sub-field kind writes its components in a fixed order, so
/// two equal schemas always produce byte-identical output regardless of
/// construction order. This same encoding is both the input to the content
/// hash ([`SchemaId::of`]) and the bytes persisted in `SCH` records (it is
/// fully decodable via [`decode_for_storage`]).
pub(crate) fn encode_for_storage(schema: &Schema) -> Vec<u8> {
    let mut out = Vec::new();
    encode_len(schema.object_types.len(), &mut out);
    for ty in schema.object_types.values() {
        encode_object_type(ty, &mut out);
    }
    encode_len(schema.composite_indexes.len(), &mut out);
    for idx in schema.composite_indexes.values() {
        encode_composite_index(idx, &mut out);
    }
    out
}

fn encode_len(len: usize, out: &mut Vec<u8>) {
    // encode_uint only fails above ~4B entries; never reachable here.
    codec::encode_uint(len as u64, out).expect("schema item count exceeds encodable range");
}

fn encode_str(s: &str, out: &mut Vec<u8>) {
    codec::encode_string(s, out);
}

fn encode_object_type(ty: &ObjectType, out: &mut Vec<u8>) {
    codec::encode_uint(ty.storage_id, out).unwrap();
    encode_str(&ty.name, out);
    encode_len(ty.fields.len(), out);
    for field in ty.fields.values() {
        encode_field(field, out);
    }
}

fn encode_simple_type(t: &SimpleType, out: &mut Vec<u8>) {
    match t {
        SimpleType::Bool => out.push(0),
        SimpleType::I64 => out.push(1),
        SimpleType::U64 => out.push(2),
        SimpleType::F64 => out.push(3),
        SimpleType::String => out.push(4),
        SimpleType::Bytes => out.push(5),
        SimpleType::Enum { variants } => {
            out.push(6);
            encode_len(variants.len(), out);
            for v in variants {
                encode_str(v, out);
            }
        }
    }
}

fn encode_subfield(sf: &SubField, out: &mut Vec<u8>) {
    codec::encode_uint(sf.storage_id, out).unwrap();
    match &sf.kind {
        SubFieldKind::Simple {
            simple_type,
            indexed,
        } => {
            out.push(0);
            encode_simple_type(simple_type, out);
            codec::encode_bool(*indexed, out);
        }
        SubFieldKind::Reference {
            target_type,
            allow_dangling,
        } => {
            out.push(1);
            codec::encode_bool(target_type.is_some(), out);
            if let Some(t) = target_type {
                codec::encode_uint(*t, out).unwrap();
            }
            codec::encode_bool(*allow_dangling, out);
        }
    }
}

fn encode_field(field: &Field, out: &mut Vec<u8>) {
    codec::encode_uint(field.storage_id(), out).unwrap();
    encode_str(field.name(), out);
    match field {
        Field::Simple {
            simple_type,
            indexed,
            unique,
            conversion_policy,
            ..
        } => {
            out.push(0);
            encode_simple_type(simple_type, out);
            codec::encode_bool(*indexed, out);
            codec::encode_bool(*unique, out);
            codec::encode_bool(conversion_policy.is_some(), out);
            if let Some(policy) = conversion_policy {
                out.push(match policy {
                    crate::ConversionPolicy::Attempt => 0,
                    crate::ConversionPolicy::Require => 1,
                    crate::ConversionPolicy::Reset => 2,
                    crate::ConversionPolicy::Retain => 3,
                });
            }
        }
        Field::Counter { .. } => {
            out.push(1);
        }
        Field::Reference {
            target_type,
            on_delete,
            allow_dangling,
            forward_delete,
            ..
        } => {
            out.push(2);
            codec::encode_bool(target_type.is_some(), out);
            if let Some(t) = target_type {
                codec::encode_uint(*t, out).unwrap();
            }
            out.push(match on_delete {
                super::OnDelete::Exception => 0,
                super::OnDelete::Unreference => 1,
                super::OnDelete::Delete => 2,
                super::OnDelete::Ignore => 3,
            });
            codec::encode_bool(*allow_dangling, out);
            codec::encode_bool(*forward_delete, out);
        }
        Field::Set { element, .. } => {
            out.push(3);
            encode_subfield(element, out);
        }
        Field::List { element, .. } => {
            out.push(4);
            encode_subfield(element, out);
        }
        Field::Map { key, value, .. } => {
            out.push(5);
            encode_subfield(key, out);
            encode_subfield(value, out);
        }
    }
}

fn encode_composite_index(idx: &CompositeIndex, out: &mut Vec<u8>) {
    codec::encode_uint(idx.storage_id, out).unwrap();
    encode_str(&idx.name, out);
    codec::encode_uint(idx.object_type, out).unwrap();
    encode_len(idx.field_ids.len(), out);
    for id in &idx.field_ids {
        codec::encode_uint(*id, out).unwrap();
    }
    codec::encode_bool(idx.unique, out);
}

/// Inverse of [`encode_for_storage`]: reconstructs a full [`Schema`] value
/// from a persisted `SCH` record.
pub(crate) fn decode_for_storage(buf: &[u8]) -> Result<Schema> {
    let mut pos = 0;
    let type_count = read_len(buf, &mut pos)?;
    let mut object_types = std::collections::BTreeMap::new();
    for _ in 0..type_count {
        let ty = decode_object_type(buf, &mut pos)?;
        object_types.insert(ty.storage_id, ty);
    }
    let index_count = read_len(buf, &mut pos)?;
    let mut composite_indexes = std::collections::BTreeMap::new();
    for _ in 0..index_count {
        let idx = decode_composite_index(buf, &mut pos)?;
        composite_indexes.insert(idx.storage_id, idx);
    }
    Ok(Schema {
        object_types,
        composite_indexes,
    })
}

fn read_uint(buf: &[u8], pos: &mut usize) -> Result<u64> {
    let (value, len) = codec::decode_uint(&buf[*pos..])?;
    *pos += len;
    Ok(value)
}

fn read_len(buf: &[u8], pos: &mut usize) -> Result<usize> {
    Ok(read_uint(buf, pos)? as usize)
}

fn read_str(buf: &[u8], pos: &mut usize) -> Result<String> {
    let (s, len) = codec::decode_string(&buf[*pos..])?;
    *pos += len;
    Ok(s)
}

fn read_byte(buf: &[u8], pos: &mut usize) -> Result<u8> {
    let b = *buf
        .get(*pos)
        .ok_or(crate::error::CodecError::Truncated { expected: *pos + 1, got: buf.len() })?;
    *pos += 1;
    Ok(b)
}

fn read_bool(buf: &[u8], pos: &mut usize) -> Result<bool> {
    let (b, len) = codec::decode_bool(&buf[*pos..])?;
    *pos += len;
    Ok(b)
}

fn decode_object_type(buf: &[u8], pos: &mut usize) -> Result<ObjectType> {
    let storage_id = read_uint(buf, pos)?;
    let name = read_str(buf, pos)?;
    let field_count = read_len(buf, pos)?;
    let mut fields = std::collections::BTreeMap::new();
    for _ in 0..field_count {
        let field = decode_field(buf, pos)?;
        fields.insert(field.storage_id(), field);
    }
    Ok(ObjectType {
        storage_id,
        name,
        fields,
    })
}

fn decode_simple_type(buf: &[u8], pos: &mut usize) -> Result<SimpleType> {
    Ok(match read_byte(buf, pos)? {
        0 => SimpleType::Bool,
        1 => SimpleType::I64,
        2 => SimpleType::U64,
        3 => SimpleType::F64,
        4 => SimpleType::String,
        5 => SimpleType::Bytes,
        6 => {
            let count = read_len(buf, pos)?;
            let mut variants = Vec::with_capacity(count);
            for _ in 0..count {
                variants.push(read_str(buf, pos)?);
            }
            SimpleType::Enum { variants }
        }
        other => {
            return Err(crate::error::DatabaseError::InvalidSchema(format!(
                "unknown simple type tag {other}"
            )))
        }
    })
}

fn decode_subfield(buf: &[u8], pos: &mut usize) -> Result<SubField> {
    let storage_id = read_uint(buf, pos)?;
    let kind = match read_byte(buf, pos)? {
        0 => {
            let simple_type = decode_simple_type(buf, pos)?;
            let indexed = read_bool(buf, pos)?;
            SubFieldKind::Simple {
                simple_type,
                indexed,
            }
        }
        1 => {
            let has_target = read_bool(buf, pos)?;
            let target_type = if has_target {
                Some(read_uint(buf, pos)?)
            } else {
                None
            };
            let allow_dangling = read_bool(buf, pos)?;
            SubFieldKind::Reference {
                target_type,
                allow_dangling,
            }
        }
        other => {
            return Err(crate::error::DatabaseError::InvalidSchema(format!(
                "unknown sub-field tag {other}"
            )))
        }
    };
    Ok(SubField { storage_id, kind })
}

fn decode_field(buf: &[u8], pos: &mut usize) -> Result<Field> {
    let storage_id = read_uint(buf, pos)?;
    let name = read_str(buf, pos)?;
    let tag = read_byte(buf, pos)?;
    Ok(match tag {
        0 => {
            let simple_type = decode_simple_type(buf, pos)?;
            let indexed = read_bool(buf, pos)?;
            let unique = read_bool(buf, pos)?;
            let has_policy = read_bool(buf, pos)?;
            let conversion_policy = if has_policy {
                Some(match read_byte(buf, pos)? {
                    0 => crate::ConversionPolicy::Attempt,
                    1 => crate::ConversionPolicy::Require,
                    2 => crate::ConversionPolicy::Reset,
                    3 => crate::ConversionPolicy::Retain,
                    other => {
                        return Err(crate::error::DatabaseError::InvalidSchema(format!(
                            "unknown conversion policy tag {other}"
                        )))
                    }
                })
            } else {
                None
            };
            Field::Simple {
                storage_id,
                name,
                simple_type,
                indexed,
                unique,
                conversion_policy,
            }
        }
        1 => Field::Counter { storage_id, name },
        2 => {
            let has_target = read_bool(buf, pos)?;
            let target_type = if has_target {
                Some(read_uint(buf, pos)?)
            } else {
                None
            };
            let on_delete = match read_byte(buf, pos)? {
                0 => super::OnDelete::Exception,
                1 => super::OnDelete::Unreference,
                2 => super::OnDelete::Delete,
                3 => super::OnDelete::Ignore,
                other => {
                    return Err(crate::error::DatabaseError::InvalidSchema(format!(
                        "unknown on_delete tag {other}"
                    )))
                }
            };
            let allow_dangling = read_bool(buf, pos)?;
            let forward_delete = read_bool(buf, pos)?;
            Field::Reference {
                storage_id,
                name,
                target_type,
                on_delete,
                allow_dangling,
                forward_delete,
            }
        }
        3 => Field::Set {
            storage_id,
            name,
            element: decode_subfield(buf, pos)?,
        },
        4 => Field::List {
            storage_id,
            name,
            element: decode_subfield(buf, pos)?,
        },
        5 => Field::Map {
            storage_id,
            name,
            key: decode_subfield(buf, pos)?,
            value: decode_subfield(buf, pos)?,
        },
        other => {
            return Err(crate::error::DatabaseError::InvalidSchema(format!(
                "unknown field kind tag {other}"
            )))
        }
    })
}

fn decode_composite_index(buf: &[u8], pos: &mut usize) -> Result<CompositeIndex> {
    let storage_id = read_uint(buf, pos)?;
    let name = read_str(buf, pos)?;
    let object_type = read_uint(buf, pos)?;
    let count = read_len(buf, pos)?;
    let mut field_ids = Vec::with_capacity(count);
    for _ in 0..count {
        field_ids.push(read_uint(buf, pos)?);
    }
    let unique = read_bool(buf, pos)?;
    Ok(CompositeIndex {
        storage_id,
        name,
        object_type,
        field_ids,
        unique,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{Field, ObjectType, SchemaBuilder, SimpleType};
    use std::collections::BTreeMap;

    fn person_type() -> ObjectType {
        let mut fields = BTreeMap::new();
        fields.insert(
            10,
            Field::Simple {
                storage_id: 10,
                name: "name".into(),
                simple_type: SimpleType::String,
                indexed: true,
                unique: false,
                conversion_policy: None,
            },
        );
        ObjectType {
            storage_id: 1,
            name: "Person".into(),
            fields,
        }
    }

    #[test]
    fn equal_schemas_hash_equal() {
        let a = SchemaBuilder::new().object_type(person_type()).build().unwrap();
        let b = SchemaBuilder::new().object_type(person_type()).build().unwrap();
        assert_eq!(SchemaId::of(&a), SchemaId::of(&b));
    }

    #[test]
    fn storage_encoding_roundtrips() {
        let schema = SchemaBuilder::new()
            .object_type(person_type())
            .composite_index(crate::schema::CompositeIndex {
                storage_id: 100,
                name: "by_name".into(),
                object_type: 1,
                field_ids: vec![10],
                unique: true,
            })
            .build()
            .unwrap();
        let bytes = encode_for_storage(&schema);
        let decoded = decode_for_storage(&bytes).unwrap();
        assert_eq!(schema, decoded);
    }

    #[test]
    fn different_schemas_hash_different() {
        let a = SchemaBuilder::new().object_type(person_type()).build().unwrap();
        let mut other = person_type();
        other.name = "Persons".into();
        let b = SchemaBuilder::new().object_type(other).build().unwrap();
        assert_ne!(SchemaId::of(&a), SchemaId::of(&b));
    }
}
