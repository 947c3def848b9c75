//! The closed set of replicated entity kinds (spec §3).

use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum EntityKind {
    Products,
    Picklists,
    Batches,
    Users,
    Suppliers,
    Warehouses,
    Receipts,
}

impl EntityKind {
    pub const ALL: [EntityKind; 7] = [
        EntityKind::Products,
        EntityKind::Picklists,
        EntityKind::Batches,
        EntityKind::Users,
        EntityKind::Suppliers,
        EntityKind::Warehouses,
        EntityKind::Receipts,
    ];

    /// The name stored in `SyncStatus.entity_type` / `SyncProgress.entity_type`
    /// and used as the `sync_id` prefix.
    pub fn as_str(&self) -> &'static str {
        match self {
            EntityKind::Products => "products",
            EntityKind::Picklists => "picklists",
            EntityKind::Batches => "batches",
            EntityKind::Users => "users",
            EntityKind::Suppliers => "suppliers",
            EntityKind::Warehouses => "warehouses",
            EntityKind::Receipts => "receipts",
        }
    }

    /// The parent table name (spec §6 — fixed because downstream analytics
    /// depend on it).
    pub fn parent_table(&self) -> &'static str {
        match self {
            EntityKind::Products => "Products",
            EntityKind::Picklists => "Picklists",
            EntityKind::Batches => "Batches",
            EntityKind::Users => "Users",
            EntityKind::Suppliers => "Suppliers",
            EntityKind::Warehouses => "Warehouses",
            EntityKind::Receipts => "Receipts",
        }
    }

    /// The vendor's stable numeric primary-key attribute name.
    pub fn primary_key_field(&self) -> &'static str {
        match self {
            EntityKind::Products => "idproduct",
            EntityKind::Picklists => "idpicklist",
            EntityKind::Batches => "idpicklist_batch",
            EntityKind::Users => "iduser",
            EntityKind::Suppliers => "idsupplier",
            EntityKind::Warehouses => "idwarehouse",
            EntityKind::Receipts => "idreceipt",
        }
    }

    /// The upstream list endpoint for a full/incremental page fetch.
    pub fn list_endpoint(&self) -> &'static str {
        match self {
            EntityKind::Products => "/products",
            EntityKind::Picklists => "/picklists",
            EntityKind::Batches => "/picklists/batches",
            EntityKind::Users => "/users",
            EntityKind::Suppliers => "/suppliers",
            EntityKind::Warehouses => "/warehouses",
            EntityKind::Receipts => "/receipts",
        }
    }

    pub fn detail_endpoint(&self, id: i64) -> String {
        match self {
            EntityKind::Batches => format!("/picklists/batches/{id}"),
            EntityKind::Picklists => format!("/picklists/{id}"),
            EntityKind::Users => format!("/users/{id}"),
            EntityKind::Receipts => format!("/receipts/{id}"),
            _ => format!("{}/{}", self.list_endpoint(), id),
        }
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for EntityKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "products" => Ok(EntityKind::Products),
            "picklists" => Ok(EntityKind::Picklists),
            "batches" => Ok(EntityKind::Batches),
            "users" => Ok(EntityKind::Users),
            "suppliers" => Ok(EntityKind::Suppliers),
            "warehouses" => Ok(EntityKind::Warehouses),
            "receipts" => Ok(EntityKind::Receipts),
            other => Err(format!("unknown entity kind '{other}'")),
        }
    }
}

/// Parses the entity kind from a `sync_id`'s `<entity>-<uuid>` prefix
/// (spec §4.G "Retry-of-failed").
pub fn entity_kind_from_sync_id(sync_id: &str) -> Result<EntityKind, String> {
    let prefix = sync_id
        .split('-')
        .next()
        .ok_or_else(|| format!("malformed sync_id '{sync_id}'"))?;
    EntityKind::from_str(prefix)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_through_as_str() {
        for kind in EntityKind::ALL {
            assert_eq!(EntityKind::from_str(kind.as_str()).unwrap(), kind);
        }
    }

    #[test]
    fn parses_entity_kind_from_sync_id_prefix() {
        let id = format!("{}-{}", EntityKind::Batches.as_str(), uuid::Uuid::new_v4());
        assert_eq!(entity_kind_from_sync_id(&id).unwrap(), EntityKind::Batches);
    }

    #[test]
    fn rejects_unknown_prefix() {
        assert!(entity_kind_from_sync_id("bogus-1234").is_err());
    }
}
