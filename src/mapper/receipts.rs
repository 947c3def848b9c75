//! Receipt mapping (spec §4.D, §4.F "parent + receipt_products child list").

use serde_json::Value;

use super::{
    datetime_or_null, num_or_null, num_or_zero, require_i64, str_or_null, ChildRow, MappedRecord,
    MappingError, ParentRow, SqlValue,
};

pub const DEFAULT_ZERO_FIELDS: &[&str] = &["total_products"];

pub fn map_receipt(record: &Value) -> Result<MappedRecord, MappingError> {
    let idreceipt = require_i64(record, "idreceipt")?;

    let parent = ParentRow {
        table: "Receipts",
        primary_key_column: "idreceipt",
        primary_key_value: idreceipt,
        columns: vec![
            ("idreceipt", SqlValue::Int(idreceipt)),
            ("receiptid", str_or_null(record, "receiptid")),
            ("status", str_or_null(record, "status")),
            ("total_products", num_or_zero(record, "total_products")),
            ("idsupplier", num_or_null(record, "idsupplier")),
            ("idwarehouse", num_or_null(record, "idwarehouse")),
            ("remarks", str_or_null(record, "remarks")),
            ("created_at", datetime_or_null(record, "created")),
            ("updated_at", datetime_or_null(record, "updated")),
        ],
    };

    let mut receipt_products = Vec::new();
    if let Some(Value::Array(products)) = record.get("products") {
        for product in products {
            receipt_products.push(ChildRow {
                columns: vec![
                    ("idreceipt", SqlValue::Int(idreceipt)),
                    ("idproduct", num_or_null(product, "idproduct")),
                    ("amount", num_or_zero(product, "amount")),
                    ("amount_received", num_or_zero(product, "amount_received")),
                    ("name", str_or_null(product, "name")),
                ],
            });
        }
    }

    Ok(MappedRecord {
        parent,
        children: vec![("ReceiptProducts", receipt_products)],
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn maps_receipt_products() {
        let record = json!({
            "idreceipt": 5,
            "products": [{"idproduct": 1, "amount": 10, "amount_received": 9}]
        });
        let mapped = map_receipt(&record).unwrap();
        let (table, rows) = &mapped.children[0];
        assert_eq!(*table, "ReceiptProducts");
        assert_eq!(rows.len(), 1);
    }

    #[test]
    fn missing_idreceipt_is_mapping_error() {
        let record = json!({"status": "pending"});
        assert!(matches!(
            map_receipt(&record),
            Err(MappingError::MissingKey("idreceipt"))
        ));
    }
}
