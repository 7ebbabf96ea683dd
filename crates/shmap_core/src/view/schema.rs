//! Fixed record layouts for zero-copy value views.

use crate::error::{StoreError, StoreResult};
use std::collections::HashSet;
use std::fmt;

/// Type of a record field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FieldType {
    /// 32-bit signed integer.
    Int32,
    /// 64-bit signed integer.
    Int64,
    /// 32-bit float.
    Float32,
    /// 64-bit float.
    Float64,
}

impl FieldType {
    /// Width of the field in bytes. Fields are aligned to their width.
    #[must_use]
    pub const fn size(self) -> usize {
        match self {
            Self::Int32 | Self::Float32 => 4,
            Self::Int64 | Self::Float64 => 8,
        }
    }

    /// Returns `true` for integer fields, which support atomic arithmetic.
    #[must_use]
    pub const fn is_integer(self) -> bool {
        matches!(self, Self::Int32 | Self::Int64)
    }
}

/// A value read from or written to a record field.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum FieldValue {
    /// 32-bit signed integer.
    Int32(i32),
    /// 64-bit signed integer.
    Int64(i64),
    /// 32-bit float.
    Float32(f32),
    /// 64-bit float.
    Float64(f64),
}

impl FieldValue {
    /// Returns the type of this value.
    #[must_use]
    pub const fn field_type(&self) -> FieldType {
        match self {
            Self::Int32(_) => FieldType::Int32,
            Self::Int64(_) => FieldType::Int64,
            Self::Float32(_) => FieldType::Float32,
            Self::Float64(_) => FieldType::Float64,
        }
    }
}

impl fmt::Display for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Int32(v) => write!(f, "{v}"),
            Self::Int64(v) => write!(f, "{v}"),
            Self::Float32(v) => write!(f, "{v}"),
            Self::Float64(v) => write!(f, "{v}"),
        }
    }
}

/// Position of a field inside its schema.
///
/// Resolving a name once and reusing the id avoids a lookup per access.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FieldId(pub(crate) usize);

/// One named field of a record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Field {
    name: String,
    ty: FieldType,
    offset: usize,
}

impl Field {
    /// Field name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Field type.
    #[must_use]
    pub fn field_type(&self) -> FieldType {
        self.ty
    }

    /// Byte offset from the start of the record.
    #[must_use]
    pub fn offset(&self) -> usize {
        self.offset
    }
}

/// A named, fixed-size record layout.
///
/// Fields are laid out in declaration order, each aligned to its own width.
/// The record size is rounded up to the widest field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Schema {
    name: String,
    fields: Vec<Field>,
    size: usize,
}

impl Schema {
    /// Starts building a schema called `name`.
    #[must_use]
    pub fn builder(name: impl Into<String>) -> SchemaBuilder {
        SchemaBuilder {
            name: name.into(),
            fields: Vec::new(),
        }
    }

    /// Lays out `fields` without validating names.
    pub(crate) fn packed(name: &str, fields: &[(&str, FieldType)]) -> Self {
        let mut offset = 0;
        let mut align = 1;
        let fields = fields
            .iter()
            .map(|&(field, ty)| {
                let width = ty.size();
                offset = (offset + width - 1) & !(width - 1);
                align = align.max(width);
                let placed = Field {
                    name: field.to_string(),
                    ty,
                    offset,
                };
                offset += width;
                placed
            })
            .collect();
        Self {
            name: name.to_string(),
            fields,
            size: (offset + align - 1) & !(align - 1),
        }
    }

    /// Schema name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Record size in bytes.
    #[must_use]
    pub fn size(&self) -> usize {
        self.size
    }

    /// Fields in layout order.
    #[must_use]
    pub fn fields(&self) -> &[Field] {
        &self.fields
    }

    /// Looks up a field by name.
    #[must_use]
    pub fn field(&self, name: &str) -> Option<&Field> {
        self.fields.iter().find(|f| f.name == name)
    }

    /// Resolves a field name to its id.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::UnknownField`] if there is no such field.
    pub fn field_id(&self, name: &str) -> StoreResult<FieldId> {
        self.fields
            .iter()
            .position(|f| f.name == name)
            .map(FieldId)
            .ok_or_else(|| StoreError::unknown_field(name))
    }

    /// Returns the field with id `id`.
    #[must_use]
    pub fn field_at(&self, id: FieldId) -> Option<&Field> {
        self.fields.get(id.0)
    }
}

/// Builder for [`Schema`].
#[derive(Debug)]
pub struct SchemaBuilder {
    name: String,
    fields: Vec<(String, FieldType)>,
}

impl SchemaBuilder {
    /// Appends a field.
    #[must_use]
    pub fn field(mut self, name: impl Into<String>, ty: FieldType) -> Self {
        self.fields.push((name.into(), ty));
        self
    }

    /// Computes the layout.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::InvalidConfig`] if the schema has no fields or a
    /// field name repeats.
    pub fn build(self) -> StoreResult<Schema> {
        if self.fields.is_empty() {
            return Err(StoreError::invalid_config(format!(
                "schema {} has no fields",
                self.name
            )));
        }
        let mut seen = HashSet::new();
        for (name, _) in &self.fields {
            if !seen.insert(name.as_str()) {
                return Err(StoreError::invalid_config(format!(
                    "schema {} declares field {name} twice",
                    self.name
                )));
            }
        }
        let fields: Vec<(&str, FieldType)> = self
            .fields
            .iter()
            .map(|(name, ty)| (name.as_str(), *ty))
            .collect();
        Ok(Schema::packed(&self.name, &fields))
    }
}
