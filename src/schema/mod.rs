//! The schema model: immutable descriptions of object types, fields, and
//! composite indexes (spec §3 "Schema", §4.2).

mod canonical;
mod registry;

pub use canonical::SchemaId;
pub use registry::{SchemaRegistry, SchemaVersion};

use std::collections::BTreeMap;

use crate::error::{DatabaseError, Result};

/// The well-known sub-field storage id for a set/list element, or a map key.
pub const SUBFIELD_ELEMENT_OR_KEY: u64 = 1;
/// The well-known sub-field storage id for a map value.
pub const SUBFIELD_VALUE: u64 = 2;

/// A simple field's primitive type. Each variant corresponds to one of the
/// order-preserving encodings in [`crate::codec`].
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub enum SimpleType {
    /// `bool`.
    Bool,
    /// Signed 64-bit integer. Narrower Rust integer types are represented
    /// by this same encoding with range validation at the API boundary.
    I64,
    /// Unsigned 64-bit integer, encoded with [`crate::codec::encode_uint`].
    U64,
    /// IEEE-754 double.
    F64,
    /// UTF-8 string.
    String,
    /// Arbitrary byte string.
    Bytes,
    /// An enum, represented on the wire by its ordinal among `variants`
    /// (in declaration order). `variants` is part of the type signature:
    /// adding/removing/reordering variants is a schema-incompatible change.
    Enum {
        /// Variant names in ordinal order.
        variants: Vec<String>,
    },
}

/// What happens to a referring object when the object its reference field
/// points to is deleted. See spec §4.4 "Reference integrity on delete".
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OnDelete {
    /// Abort the delete with [`DatabaseError::ReferencedObject`].
    Exception,
    /// Clear the field (set to null, or remove the referring element).
    Unreference,
    /// Recursively delete the referring object.
    Delete,
    /// Leave a dangling reference. Only legal if the field allows dangling.
    Ignore,
}

/// A sub-field of a collection field (set/list element, map key or value).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubField {
    /// Storage id, one of [`SUBFIELD_ELEMENT_OR_KEY`] / [`SUBFIELD_VALUE`].
    pub storage_id: u64,
    /// The sub-field's value kind.
    pub kind: SubFieldKind,
}

/// The value kind of a collection sub-field: either a simple type or a
/// reference to another object type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubFieldKind {
    /// A simple, order-preserving value.
    Simple {
        /// The primitive type.
        simple_type: SimpleType,
        /// Whether this sub-field participates in a per-element index.
        indexed: bool,
    },
    /// A reference to another object.
    Reference {
        /// The allowed target type storage id, if constrained.
        target_type: Option<u64>,
        /// Whether a dangling reference is legal for this sub-field.
        allow_dangling: bool,
    },
}

impl SubFieldKind {
    /// Whether this sub-field is indexed (references are always indexed).
    pub fn is_indexed(&self) -> bool {
        match self {
            SubFieldKind::Simple { indexed, .. } => *indexed,
            SubFieldKind::Reference { .. } => true,
        }
    }
}

/// One field of an object type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Field {
    /// A single order-preserving value.
    Simple {
        /// Storage id, stable across schema versions.
        storage_id: u64,
        /// Field name (informational; not part of the wire format).
        name: String,
        /// The primitive type.
        simple_type: SimpleType,
        /// Whether a simple-field index exists for this field.
        indexed: bool,
        /// Whether this field participates in a uniqueness constraint.
        unique: bool,
        /// Per-field override of the migration conversion policy; `None`
        /// means "use the transaction's configured default".
        conversion_policy: Option<crate::ConversionPolicy>,
    },
    /// A 64-bit signed counter supporting atomic add. Never indexed.
    Counter {
        /// Storage id.
        storage_id: u64,
        /// Field name.
        name: String,
    },
    /// A reference to another object. Always indexed.
    Reference {
        /// Storage id.
        storage_id: u64,
        /// Field name.
        name: String,
        /// The allowed target type storage id, if constrained.
        target_type: Option<u64>,
        /// Policy applied to this field when its target is deleted.
        on_delete: OnDelete,
        /// Whether a dangling reference is legal for this field.
        allow_dangling: bool,
        /// Whether deleting the object holding this field also deletes
        /// (recursively) the object this field points to.
        forward_delete: bool,
    },
    /// An unordered collection, stored sorted by encoded element.
    Set {
        /// Storage id.
        storage_id: u64,
        /// Field name.
        name: String,
        /// The element sub-field.
        element: SubField,
    },
    /// An indexed sequence.
    List {
        /// Storage id.
        storage_id: u64,
        /// Field name.
        name: String,
        /// The element sub-field.
        element: SubField,
    },
    /// A sorted map from key sub-field to value sub-field.
    Map {
        /// Storage id.
        storage_id: u64,
        /// Field name.
        name: String,
        /// The key sub-field.
        key: SubField,
        /// The value sub-field.
        value: SubField,
    },
}

impl Field {
    /// This field's storage id.
    pub fn storage_id(&self) -> u64 {
        match self {
            Field::Simple { storage_id, .. }
            | Field::Counter { storage_id, .. }
            | Field::Reference { storage_id, .. }
            | Field::Set { storage_id, .. }
            | Field::List { storage_id, .. }
            | Field::Map { storage_id, .. } => *storage_id,
        }
    }

    /// This field's name.
    pub fn name(&self) -> &str {
        match self {
            Field::Simple { name, .. }
            | Field::Counter { name, .. }
            | Field::Reference { name, .. }
            | Field::Set { name, .. }
            | Field::List { name, .. }
            | Field::Map { name, .. } => name,
        }
    }

    /// A short tag naming this field's kind, used for schema compatibility
    /// checks (two fields with the same storage id across schema versions
    /// must have the same kind tag).
    pub fn kind_tag(&self) -> &'static str {
        match self {
            Field::Simple { .. } => "simple",
            Field::Counter { .. } => "counter",
            Field::Reference { .. } => "reference",
            Field::Set { .. } => "set",
            Field::List { .. } => "list",
            Field::Map { .. } => "map",
        }
    }
}

/// An object type: a named, storage-id'd collection of fields.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectType {
    /// Storage id, stable across schema versions.
    pub storage_id: u64,
    /// Type name (informational).
    pub name: String,
    /// Fields keyed by storage id.
    pub fields: BTreeMap<u64, Field>,
}

/// A composite index over a tuple of simple fields of one object type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompositeIndex {
    /// Storage id.
    pub storage_id: u64,
    /// Index name (informational).
    pub name: String,
    /// The object type this index applies to.
    pub object_type: u64,
    /// The constituent fields, in index order.
    pub field_ids: Vec<u64>,
    /// Whether the tuple of constituent field values must be unique across
    /// every instance of `object_type`.
    pub unique: bool,
}

/// An immutable schema snapshot: a set of object types and composite
/// indexes. See spec §3 "Schema" and §4.2.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Schema {
    /// Object types keyed by storage id.
    pub object_types: BTreeMap<u64, ObjectType>,
    /// Composite indexes keyed by storage id.
    pub composite_indexes: BTreeMap<u64, CompositeIndex>,
}

impl Schema {
    /// Looks up an object type by storage id.
    pub fn object_type(&self, type_id: u64) -> Result<&ObjectType> {
        self.object_types
            .get(&type_id)
            .ok_or(DatabaseError::TypeNotInSchema(type_id))
    }

    /// Looks up a field by (type id, field storage id).
    pub fn field(&self, type_id: u64, field_id: u64) -> Result<&Field> {
        let ty = self.object_type(type_id)?;
        ty.fields
            .get(&field_id)
            .ok_or(DatabaseError::FieldNotInSchema(field_id, type_id))
    }

    /// Composite indexes declared against `type_id`.
    pub fn composite_indexes_for(&self, type_id: u64) -> impl Iterator<Item = &CompositeIndex> {
        self.composite_indexes
            .values()
            .filter(move |idx| idx.object_type == type_id)
    }

    /// All reference fields across all types whose `target_type` is either
    /// unconstrained or equal to `type_id` — the set of fields that must be
    /// scanned (via their index) when `type_id`'s instances are deleted.
    pub fn reference_fields_targeting(
        &self,
        type_id: u64,
    ) -> impl Iterator<Item = (u64, &Field)> + '_ {
        self.object_types.values().flat_map(move |ty| {
            ty.fields.values().filter_map(move |f| {
                let targets = match f {
                    Field::Reference { target_type, .. } => {
                        target_type.is_none() || *target_type == Some(type_id)
                    }
                    Field::Set { element, .. } | Field::List { element, .. } => matches!(
                        &element.kind,
                        SubFieldKind::Reference { target_type, .. }
                            if target_type.is_none() || *target_type == Some(type_id)
                    ),
                    Field::Map { key, value, .. } => {
                        matches!(&key.kind, SubFieldKind::Reference { target_type, .. }
                            if target_type.is_none() || *target_type == Some(type_id))
                            || matches!(&value.kind, SubFieldKind::Reference { target_type, .. }
                                if target_type.is_none() || *target_type == Some(type_id))
                    }
                    _ => false,
                };
                targets.then_some((ty.storage_id, f))
            })
        })
    }

    /// Validates internal consistency: no duplicate storage ids within a
    /// type, composite indexes reference existing simple/reference fields
    /// of their own type. Run before a schema is registered.
    pub fn validate(&self) -> Result<()> {
        for ty in self.object_types.values() {
            for idx in self.composite_indexes_for(ty.storage_id) {
                if idx.field_ids.is_empty() {
                    return Err(DatabaseError::InvalidSchema(format!(
                        "composite index {} has no constituent fields",
                        idx.storage_id
                    )));
                }
                for field_id in &idx.field_ids {
                    match ty.fields.get(field_id) {
                        Some(Field::Simple { .. }) | Some(Field::Reference { .. }) => {}
                        Some(other) => {
                            return Err(DatabaseError::InvalidSchema(format!(
                                "composite index {} references non-simple field {} ({})",
                                idx.storage_id,
                                field_id,
                                other.kind_tag()
                            )))
                        }
                        None => {
                            return Err(DatabaseError::InvalidSchema(format!(
                                "composite index {} references unknown field {}",
                                idx.storage_id, field_id
                            )))
                        }
                    }
                }
            }
        }
        Ok(())
    }
}

/// An incremental builder for [`Schema`] values.
///
/// Grounded on `sov_schema_db`'s `define_schema!` macro, which exists to
/// spare callers from hand-writing `Schema` impls; here the equivalent
/// convenience is a builder, since our schema nodes are runtime values
/// rather than marker types.
#[derive(Debug, Default)]
pub struct SchemaBuilder {
    schema: Schema,
}

impl SchemaBuilder {
    /// Starts building from an empty schema.
    pub fn new() -> Self {
        Self::default()
    }

    /// Starts building from an existing schema (e.g. to add a type to a
    /// previously-registered version when preparing the next one).
    pub fn from_schema(schema: Schema) -> Self {
        Self { schema }
    }

    /// Adds (or replaces) an object type.
    pub fn object_type(mut self, ty: ObjectType) -> Self {
        self.schema.object_types.insert(ty.storage_id, ty);
        self
    }

    /// Adds (or replaces) a composite index.
    pub fn composite_index(mut self, index: CompositeIndex) -> Self {
        self.schema.composite_indexes.insert(index.storage_id, index);
        self
    }

    /// Finishes building, validating internal consistency.
    pub fn build(self) -> Result<Schema> {
        self.schema.validate()?;
        Ok(self.schema)
    }
}
