//! [`Value`]: the unified run-time payload of a simple field.

use crate::codec;
use crate::error::{DatabaseError, Result};
use crate::objid::ObjId;
use crate::schema::SimpleType;

/// The value of a simple field. `Null` represents the field's default/
/// absent state: writing `Null` removes the field's `FLD` record and any
/// index entry for it (spec §3 invariant: inline records exist only for
/// non-default values).
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    /// Absent / default.
    Null,
    /// `bool`.
    Bool(bool),
    /// Signed 64-bit integer.
    I64(i64),
    /// Unsigned 64-bit integer.
    U64(u64),
    /// IEEE-754 double. Compared bitwise; `NaN` is permitted but has no
    /// well-defined order relative to itself (codec still totally orders
    /// the bit pattern, matching spec §4.1's float encoding).
    F64(f64),
    /// UTF-8 string.
    String(String),
    /// Arbitrary bytes.
    Bytes(Vec<u8>),
    /// An enum's ordinal index into its declared variant list.
    Enum(u32),
}

impl Value {
    /// Encodes this value per `simple_type`'s order-preserving encoding.
    /// `Null` encodes to `None` (no payload is stored for the default).
    pub fn encode(&self, field_id: u64, simple_type: &SimpleType) -> Result<Option<Vec<u8>>> {
        let mut out = Vec::new();
        match (self, simple_type) {
            (Value::Null, _) => return Ok(None),
            (Value::Bool(b), SimpleType::Bool) => codec::encode_bool(*b, &mut out),
            (Value::I64(v), SimpleType::I64) => codec::encode_i64(*v, &mut out),
            (Value::U64(v), SimpleType::U64) => codec::encode_uint(*v, &mut out)?,
            (Value::F64(v), SimpleType::F64) => codec::encode_f64(*v, &mut out),
            (Value::String(s), SimpleType::String) => codec::encode_string(s, &mut out),
            (Value::Bytes(b), SimpleType::Bytes) => codec::encode_bytes(b, &mut out)?,
            (Value::Enum(ord), SimpleType::Enum { variants }) => {
                if *ord as usize >= variants.len() {
                    return Err(DatabaseError::InvalidValue(
                        field_id,
                        format!("enum ordinal {ord} out of range"),
                    ));
                }
                codec::encode_uint(*ord as u64, &mut out)?;
            }
            _ => {
                return Err(DatabaseError::InvalidValue(
                    field_id,
                    "value does not match field's declared type".into(),
                ))
            }
        }
        Ok(Some(out))
    }

    /// Decodes a value previously produced by [`Value::encode`]. `bytes =
    /// None` decodes to `Null`.
    pub fn decode(bytes: Option<&[u8]>, simple_type: &SimpleType) -> Result<Value> {
        let Some(bytes) = bytes else {
            return Ok(Value::Null);
        };
        Ok(match simple_type {
            SimpleType::Bool => Value::Bool(codec::decode_bool(bytes)?.0),
            SimpleType::I64 => Value::I64(codec::decode_i64(bytes)?.0),
            SimpleType::U64 => Value::U64(codec::decode_uint(bytes)?.0),
            SimpleType::F64 => Value::F64(codec::decode_f64(bytes)?.0),
            SimpleType::String => Value::String(codec::decode_string(bytes)?.0),
            SimpleType::Bytes => Value::Bytes(codec::decode_bytes(bytes)?.0),
            SimpleType::Enum { .. } => Value::Enum(codec::decode_uint(bytes)?.0 as u32),
        })
    }

    /// Whether this is the default/absent value.
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }
}

/// The value read back from a reference field: either a normally-typed
/// target, or an [`UntypedObject`] placeholder when the target's type has
/// since been removed from the schema (spec §9 open question).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefValue {
    /// A reference to an object whose type is present in the current
    /// schema.
    Typed(ObjId),
    /// A reference to an object whose type storage id is no longer
    /// declared in the current schema. The id itself is still valid and
    /// the object's data is untouched; only its type is unknown to this
    /// schema version.
    Untyped(UntypedObject),
}

/// A placeholder for a referenced object whose type is not declared in the
/// schema version a transaction is bound to. Per spec §9, assigning this
/// back through a narrow-typed reference field is always
/// [`DatabaseError::InvalidValue`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UntypedObject(pub ObjId);

impl RefValue {
    /// The underlying object id, regardless of typed/untyped status.
    pub fn id(&self) -> ObjId {
        match self {
            RefValue::Typed(id) => *id,
            RefValue::Untyped(UntypedObject(id)) => *id,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn null_encodes_to_none() {
        assert_eq!(Value::Null.encode(1, &SimpleType::I64).unwrap(), None);
        assert_eq!(Value::decode(None, &SimpleType::I64).unwrap(), Value::Null);
    }

    #[test]
    fn type_mismatch_is_invalid_value() {
        let err = Value::Bool(true).encode(1, &SimpleType::I64);
        assert!(matches!(err, Err(DatabaseError::InvalidValue(1, _))));
    }

    #[test]
    fn string_roundtrip() {
        let v = Value::String("hello".into());
        let encoded = v.encode(1, &SimpleType::String).unwrap().unwrap();
        let decoded = Value::decode(Some(&encoded), &SimpleType::String).unwrap();
        assert_eq!(v, decoded);
    }

    #[test]
    fn enum_ordinal_out_of_range_rejected() {
        let variants = vec!["A".to_string(), "B".to_string()];
        let err = Value::Enum(5).encode(1, &SimpleType::Enum { variants });
        assert!(matches!(err, Err(DatabaseError::InvalidValue(1, _))));
    }
}
