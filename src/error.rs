//! The crate's error taxonomy.
//!
//! Adapted from `sov_schema_db::CodecError`: a thiserror-derived enum with a
//! catch-all variant wrapping [`anyhow::Error`] for adapter-supplied causes.

use thiserror::Error;

use crate::ObjId;

/// Errors raised while encoding or decoding a typed value to/from its byte
/// representation.
#[derive(Debug, Error)]
pub enum CodecError {
    /// The first byte of a length-prefixed unsigned integer was `0xFF`.
    #[error("reserved first byte 0xFF in unsigned-int encoding")]
    ReservedLengthByte,
    /// Not enough bytes remained to decode a value of the expected shape.
    #[error("truncated encoding: expected at least {expected} bytes, got {got}")]
    Truncated {
        /// Minimum number of bytes required.
        expected: usize,
        /// Number of bytes actually available.
        got: usize,
    },
    /// A string's bytes were not valid UTF-8 once unescaped.
    #[error("invalid UTF-8 in encoded string")]
    InvalidUtf8,
    /// A terminator byte was missing from a self-delimiting encoding.
    #[error("missing terminator byte")]
    MissingTerminator,
    /// A decoded enum ordinal did not name a known variant.
    #[error("unknown enum ordinal {0}")]
    UnknownEnumOrdinal(u32),
    /// Trailing bytes remained after decoding a self-delimiting value.
    #[error("{0} trailing byte(s) after decoding")]
    TrailingBytes(usize),
}

/// The crate-wide error type returned by every fallible database operation.
///
/// The variants mirror the error taxonomy of the core specification
/// (deleted-object, type-not-in-schema, schema-mismatch, ...).
#[derive(Debug, Error)]
pub enum DatabaseError {
    /// Access to an [`ObjId`] that does not currently exist.
    #[error("object {0:?} does not exist")]
    DeletedObject(ObjId),
    /// Operation named an object type not present in the bound schema.
    #[error("type with storage id {0} is not present in the bound schema")]
    TypeNotInSchema(u64),
    /// Operation named a field storage id not present on the object's type.
    #[error("field with storage id {0} is not present on object type {1}")]
    FieldNotInSchema(u64, u64),
    /// A field's encoding changed across schema versions and no applicable
    /// conversion policy could reconcile old bytes with the requested type.
    #[error("schema mismatch reading field {field} on object {object:?}")]
    SchemaMismatch {
        /// Object whose field could not be read.
        object: ObjId,
        /// Storage id of the field.
        field: u64,
    },
    /// A value failed the field's codec-level validation.
    #[error("invalid value for field {0}: {1}")]
    InvalidValue(u64, String),
    /// A reference field's `on_delete = EXCEPTION` policy blocked a delete.
    #[error("object {referrer:?} still references {target:?} via field {field}")]
    ReferencedObject {
        /// The object holding the reference.
        referrer: ObjId,
        /// The object being deleted.
        target: ObjId,
        /// Storage id of the referencing field.
        field: u64,
    },
    /// A reference field pointed at a nonexistent object and dangling
    /// references are disallowed for that field.
    #[error("field {field} on object {object:?} holds a dangling reference to {target:?}")]
    DanglingReference {
        /// Object holding the reference.
        object: ObjId,
        /// Storage id of the referencing field.
        field: u64,
        /// The nonexistent target.
        target: ObjId,
    },
    /// Commit-time validation found two objects sharing a value that a
    /// unique constraint disallows.
    #[error("unique constraint violated on field/index {0}: object {1:?} conflicts with {2:?}")]
    UniqueViolation(u64, ObjId, ObjId),
    /// A schema failed canonicalization or compatibility checks at open time.
    #[error("invalid schema: {0}")]
    InvalidSchema(String),
    /// The desired schema was not registered and `allow_new_schema` was false.
    #[error("schema is not registered in this database")]
    SchemaNotRegistered,
    /// The underlying KV backend reported a write-write conflict.
    #[error("kv transaction conflict")]
    KvConflict,
    /// The underlying KV backend reported an I/O failure.
    #[error("kv i/o error: {0}")]
    KvIo(String),
    /// A codec-level failure while encoding or decoding stored bytes.
    #[error(transparent)]
    Codec(#[from] CodecError),
    /// A transaction was opened or mutated in `read_only` mode.
    #[error("database is read-only")]
    ReadOnly,
    /// Validation found one or more constraint failures at commit.
    #[error("validation failed for object {object:?}: {message}")]
    ValidationError {
        /// The object that failed validation.
        object: ObjId,
        /// Human-readable description of the violated constraint.
        message: String,
    },
    /// Catch-all for adapter-supplied or otherwise unclassified failures.
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// The crate's standard result alias.
pub type Result<T, E = DatabaseError> = std::result::Result<T, E>;
