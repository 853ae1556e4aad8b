//! Warehouse-agnostic table schema descriptors.
//!
//! A [`SchemaDescriptor`] is the single source for both the warehouse table
//! definition (field name, type, mode, description) and the Arrow types used
//! when parsing a source file locally.

use std::sync::Arc;

use arrow::datatypes::{DataType, Field, Schema, SchemaRef, TimeUnit};
use serde::{Deserialize, Serialize};

/// Arrow type used for every warehouse `TIMESTAMP` column.
pub fn timestamp_type() -> DataType {
    DataType::Timestamp(TimeUnit::Microsecond, Some("UTC".into()))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum FieldType {
    String,
    Integer,
    Timestamp,
}

impl FieldType {
    /// Local-parse type for this field.
    pub fn arrow_type(&self) -> DataType {
        match self {
            FieldType::String => DataType::Utf8,
            FieldType::Integer => DataType::Int64,
            FieldType::Timestamp => timestamp_type(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum FieldMode {
    Required,
    Nullable,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldSpec {
    pub name: String,
    #[serde(rename = "type")]
    pub field_type: FieldType,
    pub mode: FieldMode,
    pub description: String,
}

impl FieldSpec {
    pub fn required(name: &str, field_type: FieldType, description: &str) -> Self {
        Self {
            name: name.to_string(),
            field_type,
            mode: FieldMode::Required,
            description: description.to_string(),
        }
    }

    pub fn nullable(name: &str, field_type: FieldType, description: &str) -> Self {
        Self {
            name: name.to_string(),
            field_type,
            mode: FieldMode::Nullable,
            description: description.to_string(),
        }
    }

    pub fn is_required(&self) -> bool {
        self.mode == FieldMode::Required
    }
}

/// Named, ordered field list for one table shape.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchemaDescriptor {
    pub name: String,
    pub fields: Vec<FieldSpec>,
}

impl SchemaDescriptor {
    pub fn new(name: impl Into<String>, fields: Vec<FieldSpec>) -> Self {
        Self {
            name: name.into(),
            fields,
        }
    }

    pub fn field(&self, name: &str) -> Option<&FieldSpec> {
        self.fields.iter().find(|f| f.name == name)
    }

    pub fn field_names(&self) -> Vec<&str> {
        self.fields.iter().map(|f| f.name.as_str()).collect()
    }

    pub fn parse_type(&self, name: &str) -> Option<DataType> {
        self.field(name).map(|f| f.field_type.arrow_type())
    }

    /// Arrow schema with nullability taken from each field's mode.
    pub fn arrow_schema(&self) -> SchemaRef {
        let fields: Vec<Field> = self
            .fields
            .iter()
            .map(|f| Field::new(&f.name, f.field_type.arrow_type(), !f.is_required()))
            .collect();
        Arc::new(Schema::new(fields))
    }
}
