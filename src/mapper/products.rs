//! Product mapping (spec §4.D rules applied to `GET /products` records).

use serde_json::Value;

use super::{
    bool_to_int, datetime_or_null, float_or_zero, json_text_or_null, require_i64, str_or_null,
    ChildRow, MappedRecord, MappingError, ParentRow,
};

/// Product counters that default to 0 rather than NULL when absent, per the
/// mapper's documented default-0 set (spec §4.D rule 1).
pub const DEFAULT_ZERO_FIELDS: &[&str] = &["weight", "amount", "amount_picked"];

pub fn map_product(record: &Value) -> Result<MappedRecord, MappingError> {
    let idproduct = require_i64(record, "idproduct")?;

    let parent = ParentRow {
        table: "Products",
        primary_key_column: "idproduct",
        primary_key_value: idproduct,
        columns: vec![
            ("idproduct", super::SqlValue::Int(idproduct)),
            ("productcode", str_or_null(record, "productcode")),
            ("name", str_or_null(record, "name")),
            ("price", float_or_zero(record, "price")),
            ("weight", float_or_zero(record, "weight")),
            ("amount", float_or_zero(record, "amount")),
            ("amount_picked", float_or_zero(record, "amount_picked")),
            ("active", bool_to_int(record, "active")),
            ("barcodes", json_text_or_null(record, "barcodes")),
            ("pricelists", json_text_or_null(record, "pricelists")),
            ("tags", json_text_or_null(record, "tags")),
            ("productfields", json_text_or_null(record, "productfields")),
            ("images", json_text_or_null(record, "images")),
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
    fn missing_idproduct_is_mapping_error() {
        let record = json!({"name": "Widget"});
        assert!(matches!(
            map_product(&record),
            Err(MappingError::MissingKey("idproduct"))
        ));
    }

    #[test]
    fn default_zero_fields_absent_still_zero() {
        let record = json!({"idproduct": 42});
        let mapped = map_product(&record).unwrap();
        let weight = mapped
            .parent
            .columns
            .iter()
            .find(|(name, _)| *name == "weight")
            .unwrap();
        assert_eq!(weight.1, super::super::SqlValue::Float(0.0));
    }

    #[test]
    fn nested_collections_serialize_as_json_text() {
        let record = json!({"idproduct": 42, "barcodes": ["123", "456"]});
        let mapped = map_product(&record).unwrap();
        let barcodes = mapped
            .parent
            .columns
            .iter()
            .find(|(name, _)| *name == "barcodes")
            .unwrap();
        assert_eq!(barcodes.1, super::super::SqlValue::text(r#"["123","456"]"#));
    }
}
