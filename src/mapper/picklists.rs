//! Picklist mapping (spec §4.D, §4.F picklist specialization).
//!
//! A picklist owns an ordered list of picklist-products, each of which owns
//! a list of pick-locations. The summary page payload sometimes omits
//! `products`; [`needs_detail`] lets the Sync Engine decide whether a
//! per-parent detail fetch is required.

use serde_json::Value;

use super::{
    bool_to_int, datetime_or_null, json_text_or_null, num_or_null, num_or_zero, require_i64,
    str_or_null, ChildRow, MappedRecord, MappingError, ParentRow, SqlValue,
};

pub const DEFAULT_ZERO_FIELDS: &[&str] = &["total_products", "amount", "amount_picked"];

/// True when the summary payload already carries `products`, so no detail
/// fetch is needed for this parent.
pub fn needs_detail(record: &Value) -> bool {
    !matches!(record.get("products"), Some(Value::Array(_)))
}

pub fn map_picklist(record: &Value) -> Result<MappedRecord, MappingError> {
    let idpicklist = require_i64(record, "idpicklist")?;

    let parent = ParentRow {
        table: "Picklists",
        primary_key_column: "idpicklist",
        primary_key_value: idpicklist,
        columns: vec![
            ("idpicklist", SqlValue::Int(idpicklist)),
            ("picklistid", str_or_null(record, "picklistid")),
            ("status", str_or_null(record, "status")),
            ("total_products", num_or_zero(record, "total_products")),
            ("amount", num_or_zero(record, "amount")),
            ("amount_picked", num_or_zero(record, "amount_picked")),
            ("idwarehouse", num_or_null(record, "idwarehouse")),
            ("idpicklist_batch", num_or_null(record, "idpicklist_batch")),
            ("comment", str_or_null(record, "comment")),
            ("created_at", datetime_or_null(record, "created")),
            ("updated_at", datetime_or_null(record, "updated")),
        ],
    };

    let mut picklist_products = Vec::new();
    let mut picklist_product_locations = Vec::new();

    if let Some(Value::Array(products)) = record.get("products") {
        for product in products {
            let idpicklist_product = product.get("idpicklist_product").and_then(Value::as_i64);
            picklist_products.push(ChildRow {
                columns: vec![
                    ("idpicklist", SqlValue::Int(idpicklist)),
                    (
                        "idpicklist_product",
                        idpicklist_product.map(SqlValue::Int).unwrap_or(SqlValue::Null),
                    ),
                    ("idproduct", num_or_null(product, "idproduct")),
                    ("amount", num_or_zero(product, "amount")),
                    ("amount_picked", num_or_zero(product, "amount_picked")),
                    ("name", str_or_null(product, "name")),
                    ("barcode", str_or_null(product, "barcode")),
                    ("picked", bool_to_int(product, "picked")),
                ],
            });

            if let Some(Value::Array(locations)) = product.get("locations") {
                for location in locations {
                    picklist_product_locations.push(ChildRow {
                        columns: vec![
                            // Carried alongside idpicklist_product so the
                            // Upsert Writer can replace-all this
                            // grandchild table by the same parent fk column
                            // it uses for every other child table.
                            ("idpicklist", SqlValue::Int(idpicklist)),
                            (
                                "idpicklist_product",
                                idpicklist_product.map(SqlValue::Int).unwrap_or(SqlValue::Null),
                            ),
                            ("idlocation", num_or_null(location, "idlocation")),
                            ("name", str_or_null(location, "name")),
                            ("amount", num_or_zero(location, "amount")),
                        ],
                    });
                }
            }
        }
    }

    Ok(MappedRecord {
        parent,
        children: vec![
            ("PicklistProducts", picklist_products),
            ("PicklistProductLocations", picklist_product_locations),
        ],
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn needs_detail_when_products_absent() {
        let record = json!({"idpicklist": 1});
        assert!(needs_detail(&record));
    }

    #[test]
    fn no_detail_needed_when_products_present() {
        let record = json!({"idpicklist": 1, "products": []});
        assert!(!needs_detail(&record));
    }

    #[test]
    fn maps_nested_products_and_locations() {
        let record = json!({
            "idpicklist": 1,
            "products": [
                {
                    "idpicklist_product": 10,
                    "idproduct": 99,
                    "amount": 2,
                    "locations": [{"idlocation": 5, "name": "A1", "amount": 2}]
                }
            ]
        });
        let mapped = map_picklist(&record).unwrap();
        let (_, products) = &mapped.children[0];
        let (_, locations) = &mapped.children[1];
        assert_eq!(products.len(), 1);
        assert_eq!(locations.len(), 1);
    }
}
