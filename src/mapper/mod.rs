//! Entity Mapper (spec §4.D).
//!
//! Pure, per-record, CPU-only: `map(entity_kind, decoded_record)` turns one
//! decoded JSON record into a parent row plus its owned child row sets. No
//! suspension points live here (spec §5 "The Mapper is pure CPU and never
//! suspends").

pub mod batches;
pub mod picklists;
pub mod products;
pub mod receipts;
pub mod suppliers;
pub mod users;
pub mod warehouses;

use chrono::{DateTime, Utc};
use serde_json::Value;

use crate::entity::EntityKind;

#[derive(Debug, Clone, PartialEq)]
pub enum SqlValue {
    Null,
    Int(i64),
    Float(f64),
    Text(String),
    Bool(bool),
    DateTime(DateTime<Utc>),
}

impl SqlValue {
    pub fn text(value: impl Into<String>) -> Self {
        SqlValue::Text(value.into())
    }
}

/// One row's worth of `(column, value)` pairs; order is insertion order and
/// carries no semantic weight.
pub type Row = Vec<(&'static str, SqlValue)>;

#[derive(Debug, Clone)]
pub struct ParentRow {
    pub table: &'static str,
    pub primary_key_column: &'static str,
    pub primary_key_value: i64,
    pub columns: Row,
}

#[derive(Debug, Clone)]
pub struct ChildRow {
    pub columns: Row,
}

/// Parent row plus its owned child tables, keyed by table name (spec §3
/// "Child collections are owned by the parent").
#[derive(Debug, Clone)]
pub struct MappedRecord {
    pub parent: ParentRow,
    pub children: Vec<(&'static str, Vec<ChildRow>)>,
}

#[derive(Debug, Clone, thiserror::Error)]
pub enum MappingError {
    #[error("record missing primary key field '{0}'")]
    MissingKey(&'static str),
}

pub fn map(entity_kind: EntityKind, record: &Value) -> Result<MappedRecord, MappingError> {
    match entity_kind {
        EntityKind::Products => products::map_product(record),
        EntityKind::Picklists => picklists::map_picklist(record),
        EntityKind::Batches => batches::map_batch(record),
        EntityKind::Users => users::map_user(record),
        EntityKind::Suppliers => suppliers::map_supplier(record),
        EntityKind::Warehouses => warehouses::map_warehouse(record),
        EntityKind::Receipts => receipts::map_receipt(record),
    }
}

/// Rule 1: numeric fields absent from the record map to NULL, except an
/// entity-documented default-0 set.
pub(crate) fn num_or_null(record: &Value, field: &str) -> SqlValue {
    match record.get(field).and_then(Value::as_i64) {
        Some(n) => SqlValue::Int(n),
        None => SqlValue::Null,
    }
}

pub(crate) fn num_or_zero(record: &Value, field: &str) -> SqlValue {
    SqlValue::Int(record.get(field).and_then(Value::as_i64).unwrap_or(0))
}

pub(crate) fn float_or_zero(record: &Value, field: &str) -> SqlValue {
    SqlValue::Float(record.get(field).and_then(Value::as_f64).unwrap_or(0.0))
}

/// Rule 2: string fields absent or blank map to NULL.
pub(crate) fn str_or_null(record: &Value, field: &str) -> SqlValue {
    match record.get(field).and_then(Value::as_str) {
        Some(s) if !s.trim().is_empty() => SqlValue::text(s),
        _ => SqlValue::Null,
    }
}

/// Rule 4: booleans map to 0/1.
pub(crate) fn bool_to_int(record: &Value, field: &str) -> SqlValue {
    match record.get(field).and_then(Value::as_bool) {
        Some(b) => SqlValue::Bool(b),
        None => SqlValue::Null,
    }
}

/// Rule 5: ISO-8601 datetime strings map to a SQL datetime; invalid or
/// absent strings map to NULL.
pub(crate) fn datetime_or_null(record: &Value, field: &str) -> SqlValue {
    match record.get(field).and_then(Value::as_str) {
        Some(s) => match DateTime::parse_from_rfc3339(s) {
            Ok(dt) => SqlValue::DateTime(dt.with_timezone(&Utc)),
            Err(_) => SqlValue::Null,
        },
        None => SqlValue::Null,
    }
}

/// Rule 3: nested/array fields without their own child table are carried as
/// JSON text. Absent fields serialize as NULL rather than the literal
/// string "null".
pub(crate) fn json_text_or_null(record: &Value, field: &str) -> SqlValue {
    match record.get(field) {
        Some(Value::Null) | None => SqlValue::Null,
        Some(value) => SqlValue::text(value.to_string()),
    }
}

pub(crate) fn require_i64(record: &Value, field: &'static str) -> Result<i64, MappingError> {
    record
        .get(field)
        .and_then(Value::as_i64)
        .ok_or(MappingError::MissingKey(field))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn missing_numeric_maps_to_null() {
        let record = json!({});
        assert_eq!(num_or_null(&record, "weight"), SqlValue::Null);
    }

    #[test]
    fn missing_default_zero_field_maps_to_zero() {
        let record = json!({});
        assert_eq!(num_or_zero(&record, "total_products"), SqlValue::Int(0));
    }

    #[test]
    fn blank_string_maps_to_null() {
        let record = json!({"name": "   "});
        assert_eq!(str_or_null(&record, "name"), SqlValue::Null);
    }

    #[test]
    fn absent_nested_field_maps_to_null_not_literal_null_string() {
        let record = json!({});
        assert_eq!(json_text_or_null(&record, "barcodes"), SqlValue::Null);
    }

    #[test]
    fn invalid_datetime_maps_to_null() {
        let record = json!({"created_at": "not-a-date"});
        assert_eq!(datetime_or_null(&record, "created_at"), SqlValue::Null);
    }

    #[test]
    fn valid_datetime_parses() {
        let record = json!({"created_at": "2025-03-04T17:08:09Z"});
        assert!(matches!(
            datetime_or_null(&record, "created_at"),
            SqlValue::DateTime(_)
        ));
    }
}
