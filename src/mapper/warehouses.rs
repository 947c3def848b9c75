//! Warehouse mapping (spec §4.D). Flat parent only — no owned child tables.

use serde_json::Value;

use super::{
    bool_to_int, datetime_or_null, require_i64, str_or_null, MappedRecord, MappingError,
    ParentRow, SqlValue,
};

pub const DEFAULT_ZERO_FIELDS: &[&str] = &[];

pub fn map_warehouse(record: &Value) -> Result<MappedRecord, MappingError> {
    let idwarehouse = require_i64(record, "idwarehouse")?;

    let parent = ParentRow {
        table: "Warehouses",
        primary_key_column: "idwarehouse",
        primary_key_value: idwarehouse,
        columns: vec![
            ("idwarehouse", SqlValue::Int(idwarehouse)),
            ("name", str_or_null(record, "name")),
            ("city", str_or_null(record, "city")),
            ("active", bool_to_int(record, "active")),
            ("created_at", datetime_or_null(record, "created")),
            ("updated_at", datetime_or_null(record, "updated")),
        ],
    };

    Ok(MappedRecord {
        parent,
        children: Vec::new(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn missing_idwarehouse_is_mapping_error() {
        let record = json!({"name": "Main"});
        assert!(matches!(
            map_warehouse(&record),
            Err(MappingError::MissingKey("idwarehouse"))
        ));
    }
}
