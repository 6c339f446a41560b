//! Mutations on existing assets: deletion with primary-flag handover,
//! explicit primary selection and metadata edits.
//!
//! Each mutation runs in one transaction together with its audit entry, so
//! other connections never see a deleted primary without its replacement, or
//! a change without its log row.

use std::path::PathBuf;

use rusqlite::types::ToSql;
use rusqlite::{params, Connection};
use serde::Serialize;
use tracing::{error, info, warn};

use crate::assets::store::{clear_primary, remove_if_exists};
use crate::assets::{self, audit, Actor, Asset};
use crate::database::repo::{self, Database};
use crate::database::schema::ASSETS;
use crate::error::{AssetError, Result};
use crate::media::validator;

/// Fields an editor may change after upload. `None` leaves a field as is.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct AssetPatch {
    pub category: Option<String>,
    pub sort_order: Option<i64>,
    pub original_name: Option<String>,
}

impl AssetPatch {
    pub fn is_empty(&self) -> bool {
        self.category.is_none() && self.sort_order.is_none() && self.original_name.is_none()
    }
}

pub struct LifecycleManager<'a> {
    db: &'a mut Database,
    media_root: PathBuf,
}

impl<'a> LifecycleManager<'a> {
    pub fn new(db: &'a mut Database, media_root: impl Into<PathBuf>) -> Self {
        Self {
            db,
            media_root: media_root.into(),
        }
    }

    /// Deletes an asset row and its two files. When the asset was its
    /// product's primary image, the sibling with the lowest
    /// `(sort_order, id)` takes over; with no sibling left the product simply
    /// has no primary image.
    ///
    /// File removal is best effort and is never rolled back: the row is the
    /// source of truth for whether the asset exists.
    pub fn delete_asset(
        &mut self,
        asset_id: i64,
        expected_product_id: Option<i64>,
        actor: Option<&Actor>,
    ) -> Result<()> {
        let asset = assets::get(self.db.conn(), asset_id)?.ok_or(AssetError::NotFound(asset_id))?;

        if let Some(expected) = expected_product_id {
            if asset.product_id != Some(expected) {
                warn!(
                    asset_id,
                    expected,
                    actual = ?asset.product_id,
                    "refusing cross-product delete"
                );
                return Err(AssetError::ProductMismatch {
                    asset_id,
                    expected,
                    actual: asset.product_id,
                });
            }
        }

        match self.delete_in_transaction(&asset, actor) {
            Ok(new_primary) => {
                info!(asset_id, product_id = ?asset.product_id, new_primary = ?new_primary, "deleted asset");
                Ok(())
            }
            Err(e) => {
                error!(asset_id, error = %e, "asset deletion rolled back");
                Err(e)
            }
        }
    }

    fn delete_in_transaction(
        &mut self,
        asset: &Asset,
        actor: Option<&Actor>,
    ) -> Result<Option<i64>> {
        let tx = self.db.transaction()?;

        // Re-read under the write lock; a concurrent change may have moved the flag.
        let current = match assets::get(&tx, asset.id)? {
            Some(current) => current,
            None => {
                repo::rollback(tx)?;
                return Err(AssetError::DeleteFailed(asset.id));
            }
        };

        let deleted = repo::delete(&tx, ASSETS, "id = ?1", &[&current.id])?;
        if deleted == 0 {
            repo::rollback(tx)?;
            return Err(AssetError::DeleteFailed(current.id));
        }

        for relative in [&current.path, &current.thumbnail_path] {
            let file = self.media_root.join(relative);
            if let Err(e) = remove_if_exists(&file) {
                warn!(asset_id = current.id, path = %file.display(), error = %e, "failed to unlink asset file");
            }
        }

        let new_primary = match (current.is_primary, current.product_id) {
            (true, Some(product_id)) => promote_next_sibling(&tx, product_id)?,
            _ => None,
        };

        audit::record::<Asset, Asset>(
            &tx,
            actor,
            audit::ACTION_DELETE,
            ASSETS,
            current.id,
            Some(&current),
            None,
        )?;

        repo::commit(tx)?;
        Ok(new_primary)
    }

    /// Makes `asset_id` the primary image of its product.
    pub fn set_primary(&mut self, asset_id: i64, actor: Option<&Actor>) -> Result<Asset> {
        let tx = self.db.transaction()?;
        let before = assets::get(&tx, asset_id)?.ok_or(AssetError::NotFound(asset_id))?;
        let product_id = before.product_id.ok_or(AssetError::NotProductImage(asset_id))?;
        if before.is_primary {
            return Ok(before);
        }

        clear_primary(&tx, product_id)?;
        repo::update(&tx, ASSETS, &[("is_primary", &true)], "id = ?2", &[&asset_id])?;
        let after = assets::fetch_existing(&tx, asset_id)?;

        audit::record(
            &tx,
            actor,
            audit::ACTION_SET_PRIMARY,
            ASSETS,
            asset_id,
            Some(&before),
            Some(&after),
        )?;
        repo::commit(tx)?;

        info!(asset_id, product_id, "primary image changed");
        Ok(after)
    }

    /// Applies a metadata patch. Changing the category does not move files;
    /// `path` keeps pointing where the original was written.
    pub fn update_metadata(
        &mut self,
        asset_id: i64,
        patch: &AssetPatch,
        actor: Option<&Actor>,
    ) -> Result<Asset> {
        if let Some(category) = &patch.category {
            validator::validate_category(category)?;
        }

        let tx = self.db.transaction()?;
        let before = assets::get(&tx, asset_id)?.ok_or(AssetError::NotFound(asset_id))?;
        if patch.is_empty() {
            return Ok(before);
        }

        let mut columns: Vec<(&str, &dyn ToSql)> = Vec::new();
        if let Some(category) = &patch.category {
            columns.push(("category", category));
        }
        if let Some(sort_order) = &patch.sort_order {
            columns.push(("sort_order", sort_order));
        }
        if let Some(original_name) = &patch.original_name {
            columns.push(("original_name", original_name));
        }
        let filter = format!("id = ?{}", columns.len() + 1);
        repo::update(&tx, ASSETS, &columns, &filter, &[&asset_id])?;

        let after = assets::fetch_existing(&tx, asset_id)?;
        audit::record(
            &tx,
            actor,
            audit::ACTION_UPDATE,
            ASSETS,
            asset_id,
            Some(&before),
            Some(&after),
        )?;
        repo::commit(tx)?;
        Ok(after)
    }
}

fn promote_next_sibling(conn: &Connection, product_id: i64) -> repo::Result<Option<i64>> {
    let next: Option<i64> = repo::fetch_one(
        conn,
        &format!(
            "SELECT id FROM {ASSETS} WHERE product_id = ?1 ORDER BY sort_order ASC, id ASC LIMIT 1"
        ),
        params![product_id],
        |row| row.get(0),
    )?;
    if let Some(id) = next {
        repo::update(conn, ASSETS, &[("is_primary", &true)], "id = ?2", &[&id])?;
    }
    Ok(next)
}
