//! Picklist batch mapping (spec §4.D, §4.F batch specialization).
//!
//! Batches always require a per-parent detail fetch — products and
//! picklists are only present in the detail response, never the summary
//! page (spec §4.F "a per-parent detail fetch is always performed").

use serde_json::Value;

use super::{
    bool_to_int, datetime_or_null, json_text_or_null, num_or_null, num_or_zero, require_i64,
    str_or_null, ChildRow, MappedRecord, MappingError, ParentRow, SqlValue,
};

pub const DEFAULT_ZERO_FIELDS: &[&str] = &["total_products", "total_picklists", "comment_count"];

pub fn map_batch(record: &Value) -> Result<MappedRecord, MappingError> {
    let idpicklist_batch = require_i64(record, "idpicklist_batch")?;

    // Rule 2: picklist_batchid is synthesized when absent, to preserve
    // parent uniqueness.
    let picklist_batchid = match record.get("picklist_batchid").and_then(Value::as_str) {
        Some(s) if !s.trim().is_empty() => s.to_string(),
        _ => format!("BATCH-{idpicklist_batch}"),
    };

    // Rule 3: assigned_to/completed_by keep both the authoritative JSON blob
    // and a flattened scalar projection.
    let assigned_to_name = record
        .get("assigned_to")
        .and_then(|v| v.get("full_name"))
        .and_then(Value::as_str);
    let assigned_to_id = record
        .get("assigned_to")
        .and_then(|v| v.get("iduser"))
        .and_then(Value::as_i64);
    let completed_by_name = record
        .get("completed_by")
        .and_then(|v| v.get("full_name"))
        .and_then(Value::as_str);
    let completed_by_id = record
        .get("completed_by")
        .and_then(|v| v.get("iduser"))
        .and_then(Value::as_i64);

    let parent = ParentRow {
        table: "Batches",
        primary_key_column: "idpicklist_batch",
        primary_key_value: idpicklist_batch,
        columns: vec![
            ("idpicklist_batch", SqlValue::Int(idpicklist_batch)),
            ("picklist_batchid", SqlValue::text(picklist_batchid)),
            ("type", str_or_null(record, "type")),
            ("status", str_or_null(record, "status")),
            ("total_products", num_or_zero(record, "total_products")),
            ("total_picklists", num_or_zero(record, "total_picklists")),
            ("comment_count", num_or_zero(record, "comment_count")),
            ("idwarehouse", num_or_null(record, "idwarehouse")),
            ("assigned_to", json_text_or_null(record, "assigned_to")),
            (
                "assigned_to_iduser",
                assigned_to_id.map(SqlValue::Int).unwrap_or(SqlValue::Null),
            ),
            (
                "assigned_to_full_name",
                assigned_to_name.map(SqlValue::text).unwrap_or(SqlValue::Null),
            ),
            ("completed_by", json_text_or_null(record, "completed_by")),
            (
                "completed_by_iduser",
                completed_by_id.map(SqlValue::Int).unwrap_or(SqlValue::Null),
            ),
            (
                "completed_by_full_name",
                completed_by_name.map(SqlValue::text).unwrap_or(SqlValue::Null),
            ),
            ("created_at", datetime_or_null(record, "created")),
            ("updated_at", datetime_or_null(record, "updated")),
            ("completed_at", datetime_or_null(record, "completed_at")),
        ],
    };

    let mut batch_products = Vec::new();
    if let Some(Value::Array(products)) = record.get("products") {
        for product in products {
            batch_products.push(ChildRow {
                columns: vec![
                    ("idpicklist_batch", SqlValue::Int(idpicklist_batch)),
                    ("idproduct", num_or_null(product, "idproduct")),
                    ("amount", num_or_zero(product, "amount")),
                    ("amount_picked", num_or_zero(product, "amount_picked")),
                    ("name", str_or_null(product, "name")),
                    ("barcodes", json_text_or_null(product, "barcodes")),
                    ("picked", bool_to_int(product, "picked")),
                ],
            });
        }
    }

    let mut batch_picklists = Vec::new();
    if let Some(Value::Array(picklists)) = record.get("picklists") {
        for picklist in picklists {
            batch_picklists.push(ChildRow {
                columns: vec![
                    ("idpicklist_batch", SqlValue::Int(idpicklist_batch)),
                    ("idpicklist", num_or_null(picklist, "idpicklist")),
                    ("status", str_or_null(picklist, "status")),
                ],
            });
        }
    }

    Ok(MappedRecord {
        parent,
        children: vec![
            ("BatchProducts", batch_products),
            ("BatchPicklists", batch_picklists),
        ],
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn synthesizes_picklist_batchid_when_absent() {
        let record = json!({"idpicklist_batch": 7});
        let mapped = map_batch(&record).unwrap();
        let batchid = mapped
            .parent
            .columns
            .iter()
            .find(|(name, _)| *name == "picklist_batchid")
            .unwrap();
        assert_eq!(batchid.1, SqlValue::text("BATCH-7"));
    }

    #[test]
    fn keeps_supplied_picklist_batchid() {
        let record = json!({"idpicklist_batch": 7, "picklist_batchid": "CUSTOM-ID"});
        let mapped = map_batch(&record).unwrap();
        let batchid = mapped
            .parent
            .columns
            .iter()
            .find(|(name, _)| *name == "picklist_batchid")
            .unwrap();
        assert_eq!(batchid.1, SqlValue::text("CUSTOM-ID"));
    }

    #[test]
    fn flattens_assigned_to_alongside_json_blob() {
        let record = json!({
            "idpicklist_batch": 7,
            "assigned_to": {"iduser": 3, "full_name": "Jane Doe"}
        });
        let mapped = map_batch(&record).unwrap();
        let name = mapped
            .parent
            .columns
            .iter()
            .find(|(name, _)| *name == "assigned_to_full_name")
            .unwrap();
        assert_eq!(name.1, SqlValue::text("Jane Doe"));
    }
}
