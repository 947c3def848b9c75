//! Supplier mapping (spec §4.D). Flat parent only — no owned child tables.

use serde_json::Value;

use super::{
    bool_to_int, datetime_or_null, require_i64, str_or_null, MappedRecord, MappingError,
    ParentRow, SqlValue,
};

pub const DEFAULT_ZERO_FIELDS: &[&str] = &[];

pub fn map_supplier(record: &Value) -> Result<MappedRecord, MappingError> {
    let idsupplier = require_i64(record, "idsupplier")?;

    let parent = ParentRow {
        table: "Suppliers",
        primary_key_column: "idsupplier",
        primary_key_value: idsupplier,
        columns: vec![
            ("idsupplier", SqlValue::Int(idsupplier)),
            ("name", str_or_null(record, "name")),
            ("contact_name", str_or_null(record, "contact_name")),
            ("emailaddress", str_or_null(record, "emailaddress")),
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
    fn missing_idsupplier_is_mapping_error() {
        let record = json!({"name": "Acme"});
        assert!(matches!(
            map_supplier(&record),
            Err(MappingError::MissingKey("idsupplier"))
        ));
    }
}
