pub mod audit;
pub mod lifecycle;
pub mod naming;
pub mod store;

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, Row};
use serde::Serialize;

use crate::database::repo::{self, Result};
use crate::database::schema::{ASSETS, ASSET_COLUMNS};

pub use audit::Actor;
pub use lifecycle::{AssetPatch, LifecycleManager};
pub use store::{AssetStore, StoredAsset, Upload};

/// Directory under the upload root holding every thumbnail, whatever the category.
pub const THUMBNAIL_DIR: &str = "thumbnails";
/// Directory under the media root that holds both trees.
pub const UPLOADS_DIR: &str = "uploads";

/// Category given to uploads when the caller names none.
pub const CATEGORY_PRODUCT: &str = "product";

/// One row of the `assets` table.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Asset {
    pub id: i64,
    pub product_id: Option<i64>,
    pub original_name: String,
    pub stored_name: String,
    pub path: String,
    pub thumbnail_path: String,
    pub mime_type: String,
    pub byte_size: i64,
    pub category: String,
    pub owner_id: Option<i64>,
    pub is_primary: bool,
    pub sort_order: i64,
    pub created_at: DateTime<Utc>,
}

impl Asset {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            product_id: row.get(1)?,
            original_name: row.get(2)?,
            stored_name: row.get(3)?,
            path: row.get(4)?,
            thumbnail_path: row.get(5)?,
            mime_type: row.get(6)?,
            byte_size: row.get(7)?,
            category: row.get(8)?,
            owner_id: row.get(9)?,
            is_primary: row.get(10)?,
            sort_order: row.get(11)?,
            created_at: row.get(12)?,
        })
    }
}

/// Relative location of an original: `uploads/<category>/<stored_name>`.
pub fn original_path(category: &str, stored_name: &str) -> String {
    format!("{UPLOADS_DIR}/{category}/{stored_name}")
}

/// Relative location of a thumbnail: `uploads/thumbnails/<stored_name>`.
pub fn thumbnail_path(stored_name: &str) -> String {
    format!("{UPLOADS_DIR}/{THUMBNAIL_DIR}/{stored_name}")
}

pub fn get(conn: &Connection, id: i64) -> Result<Option<Asset>> {
    repo::fetch_one(
        conn,
        &format!("SELECT {ASSET_COLUMNS} FROM {ASSETS} WHERE id = ?1"),
        params![id],
        Asset::from_row,
    )
}

/// Like [`get`], but a missing row is a storage error. For rows the caller
/// just wrote inside its own transaction.
pub fn fetch_existing(conn: &Connection, id: i64) -> Result<Asset> {
    repo::fetch_row(
        conn,
        &format!("SELECT {ASSET_COLUMNS} FROM {ASSETS} WHERE id = ?1"),
        params![id],
        Asset::from_row,
    )
}

/// Images of a product in display order.
pub fn list_for_product(conn: &Connection, product_id: i64) -> Result<Vec<Asset>> {
    repo::fetch_all(
        conn,
        &format!(
            "SELECT {ASSET_COLUMNS} FROM {ASSETS} WHERE product_id = ?1 ORDER BY sort_order ASC, id ASC"
        ),
        params![product_id],
        Asset::from_row,
    )
}

/// `None` is a legal answer: a product may have no primary image.
pub fn primary_for_product(conn: &Connection, product_id: i64) -> Result<Option<Asset>> {
    repo::fetch_one(
        conn,
        &format!("SELECT {ASSET_COLUMNS} FROM {ASSETS} WHERE product_id = ?1 AND is_primary = 1"),
        params![product_id],
        Asset::from_row,
    )
}

pub(crate) fn count_primaries(conn: &Connection, product_id: i64) -> Result<i64> {
    repo::fetch_one(
        conn,
        &format!("SELECT COUNT(*) FROM {ASSETS} WHERE product_id = ?1 AND is_primary = 1"),
        params![product_id],
        |row| row.get(0),
    )
    .map(|count| count.unwrap_or(0))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::{Database, StorageError};
    use crate::test_support::Fixture;

    #[test]
    fn test_fetch_existing_reports_real_statement() {
        let db = Database::open_in_memory().unwrap();
        match fetch_existing(db.conn(), 77).unwrap_err() {
            StorageError::Statement { sql, source } => {
                assert!(sql.starts_with("SELECT id, product_id"));
                assert!(matches!(source, rusqlite::Error::QueryReturnedNoRows));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_fetch_existing_matches_get() {
        let mut fx = Fixture::new();
        let asset = fx.upload_for(5);
        assert_eq!(fetch_existing(fx.db.conn(), asset.id).unwrap(), asset);
        assert_eq!(get(fx.db.conn(), asset.id).unwrap(), Some(asset));
    }
}
