//! User mapping (spec §4.D, §6 "user rights nested").

use serde_json::Value;

use super::{
    bool_to_int, datetime_or_null, num_or_null, require_i64, str_or_null, ChildRow, MappedRecord,
    MappingError, ParentRow, SqlValue,
};

pub const DEFAULT_ZERO_FIELDS: &[&str] = &[];

pub fn map_user(record: &Value) -> Result<MappedRecord, MappingError> {
    let iduser = require_i64(record, "iduser")?;

    let parent = ParentRow {
        table: "Users",
        primary_key_column: "iduser",
        primary_key_value: iduser,
        columns: vec![
            ("iduser", SqlValue::Int(iduser)),
            ("username", str_or_null(record, "username")),
            ("full_name", str_or_null(record, "full_name")),
            ("emailaddress", str_or_null(record, "emailaddress")),
            ("active", bool_to_int(record, "active")),
            ("idwarehouse", num_or_null(record, "idwarehouse")),
            ("created_at", datetime_or_null(record, "created")),
            ("updated_at", datetime_or_null(record, "updated")),
        ],
    };

    let mut user_rights = Vec::new();
    if let Some(Value::Array(rights)) = record.get("rights") {
        for right in rights {
            if let Some(name) = right.as_str() {
                user_rights.push(ChildRow {
                    columns: vec![
                        ("iduser", SqlValue::Int(iduser)),
                        ("right_name", SqlValue::text(name)),
                    ],
                });
            }
        }
    }

    Ok(MappedRecord {
        parent,
        children: vec![("UserRights", user_rights)],
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn maps_nested_rights() {
        let record = json!({"iduser": 1, "rights": ["view_products", "edit_picklists"]});
        let mapped = map_user(&record).unwrap();
        let (_, rights) = &mapped.children[0];
        assert_eq!(rights.len(), 2);
    }

    #[test]
    fn missing_iduser_is_mapping_error() {
        let record = json!({"username": "jane"});
        assert!(matches!(
            map_user(&record),
            Err(MappingError::MissingKey("iduser"))
        ));
    }
}
