//! Statically declared entity schemas used to resolve filter keys.
//!
//! Each entity gets one table, built once, that maps both the logical
//! (API-facing, camelCase) name and the storage column name of every
//! searchable field to the canonical column name and its declared type.

use std::collections::HashMap;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FieldType {
    Uuid,
    Boolean,
    Integer,
    Long,
    Double,
    Float,
    Decimal,
    Date,
    Timestamp,
    String,
}

impl fmt::Display for FieldType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            FieldType::Uuid => "uuid",
            FieldType::Boolean => "boolean",
            FieldType::Integer => "integer",
            FieldType::Long => "long",
            FieldType::Double => "double",
            FieldType::Float => "float",
            FieldType::Decimal => "decimal",
            FieldType::Date => "date",
            FieldType::Timestamp => "timestamp",
            FieldType::String => "string",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldDescriptor {
    /// Name exposed to API callers.
    pub logical_name: &'static str,
    /// Canonical name used by stores.
    pub column: &'static str,
    pub field_type: FieldType,
}

impl FieldDescriptor {
    pub const fn new(logical_name: &'static str, column: &'static str, field_type: FieldType) -> Self {
        Self {
            logical_name,
            column,
            field_type,
        }
    }
}

#[derive(Debug, Clone)]
pub struct EntitySchema {
    name: &'static str,
    fields: Vec<FieldDescriptor>,
    index: HashMap<String, usize>,
}

impl EntitySchema {
    pub fn new(name: &'static str, fields: Vec<FieldDescriptor>) -> Self {
        let mut index = HashMap::with_capacity(fields.len() * 2);
        for (position, field) in fields.iter().enumerate() {
            index.insert(field.logical_name.to_lowercase(), position);
            index.insert(field.column.to_lowercase(), position);
        }
        Self { name, fields, index }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn fields(&self) -> &[FieldDescriptor] {
        &self.fields
    }

    /// Case-insensitive lookup by logical or column name.
    pub fn resolve(&self, name: &str) -> Option<&FieldDescriptor> {
        self.index
            .get(&name.to_lowercase())
            .map(|&position| &self.fields[position])
    }
}
