use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use chrono::Utc;
use rusqlite::{params, Connection};
use serde::Serialize;
use tracing::{error, info, warn};

use crate::assets::{self, audit, naming, Actor, Asset};
use crate::database::repo::{self, Database};
use crate::database::schema::ASSETS;
use crate::error::{AssetError, Result};
use crate::media::thumbnail;
use crate::media::validator::{self, Rejection, UploadPolicy};
use crate::utils::config::Config;

/// An incoming file as handed over by the request layer.
#[derive(Debug, Clone)]
pub struct Upload<'a> {
    pub bytes: &'a [u8],
    pub original_name: &'a str,
    pub mime_type: &'a str,
    pub byte_size: u64,
    pub category: &'a str,
    pub product_id: Option<i64>,
    pub owner_id: Option<i64>,
    /// Take over the primary flag even if the product already has one.
    pub make_primary: bool,
    /// Position among the product's images; defaults to after the last one.
    pub sort_order: Option<i64>,
}

impl<'a> Upload<'a> {
    pub fn new(
        bytes: &'a [u8],
        original_name: &'a str,
        mime_type: &'a str,
        category: &'a str,
    ) -> Self {
        Self {
            bytes,
            original_name,
            mime_type,
            byte_size: bytes.len() as u64,
            category,
            product_id: None,
            owner_id: None,
            make_primary: false,
            sort_order: None,
        }
    }

    pub fn for_product(mut self, product_id: i64) -> Self {
        self.product_id = Some(product_id);
        self
    }

    pub fn owned_by(mut self, owner_id: i64) -> Self {
        self.owner_id = Some(owner_id);
        self
    }
}

/// What the upload endpoint reports back to its caller.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StoredAsset {
    pub id: i64,
    pub stored_name: String,
    pub path: String,
    pub thumbnail_path: String,
}

impl From<&Asset> for StoredAsset {
    fn from(asset: &Asset) -> Self {
        Self {
            id: asset.id,
            stored_name: asset.stored_name.clone(),
            path: asset.path.clone(),
            thumbnail_path: asset.thumbnail_path.clone(),
        }
    }
}

/// Persists uploads: original file first, then thumbnail, then the row that
/// makes the asset exist.
pub struct AssetStore<'a> {
    db: &'a mut Database,
    media_root: PathBuf,
    policy: UploadPolicy,
    thumbnail_size: (u32, u32),
}

impl<'a> AssetStore<'a> {
    pub fn new(db: &'a mut Database, config: &Config) -> Self {
        Self {
            db,
            media_root: config.media_root.clone(),
            policy: config.upload_policy(),
            thumbnail_size: (config.thumbnail_width, config.thumbnail_height),
        }
    }

    pub fn store(&mut self, upload: &Upload<'_>, actor: Option<&Actor>) -> Result<Asset> {
        // Callers should have validated already; this is the last gate before disk.
        self.policy.validate(upload.mime_type, upload.byte_size)?;
        let actual = upload.bytes.len() as u64;
        if actual != upload.byte_size {
            return Err(Rejection::SizeMismatch {
                declared: upload.byte_size,
                actual,
            }
            .into());
        }
        validator::validate_category(upload.category)?;

        let stored_name = naming::stored_name(upload.original_name, upload.mime_type);
        let path = assets::original_path(upload.category, &stored_name);
        let thumbnail_path = assets::thumbnail_path(&stored_name);
        let original_file = self.media_root.join(&path);
        let thumbnail_file = self.media_root.join(&thumbnail_path);

        for file in [&original_file, &thumbnail_file] {
            if let Some(dir) = file.parent() {
                create_upload_dir(dir).map_err(|source| AssetError::WriteFailed {
                    path: dir.to_path_buf(),
                    source,
                })?;
            }
        }

        fs::write(&original_file, upload.bytes).map_err(|source| {
            error!(path = %original_file.display(), error = %source, "failed to write original");
            AssetError::WriteFailed {
                path: original_file.clone(),
                source,
            }
        })?;

        // A missing thumbnail is tolerated: the row still points at where it would be.
        let (width, height) = self.thumbnail_size;
        match thumbnail::generate_thumbnail(upload.bytes, upload.mime_type, width, height) {
            Ok(bytes) => {
                if let Err(e) = fs::write(&thumbnail_file, bytes) {
                    warn!(path = %thumbnail_file.display(), error = %e, "failed to write thumbnail");
                }
            }
            Err(e) => {
                warn!(stored_name = %stored_name, error = %e, "thumbnail generation failed");
            }
        }

        let inserted = self.insert_row(upload, &stored_name, &path, &thumbnail_path, actor);
        match inserted {
            Ok(asset) => {
                info!(
                    asset_id = asset.id,
                    product_id = ?asset.product_id,
                    path = %asset.path,
                    "stored asset"
                );
                Ok(asset)
            }
            Err(e) => {
                for file in [&original_file, &thumbnail_file] {
                    if let Err(unlink) = remove_if_exists(file) {
                        warn!(path = %file.display(), error = %unlink, "failed to clean up after insert error");
                    }
                }
                Err(e.into())
            }
        }
    }

    fn insert_row(
        &mut self,
        upload: &Upload<'_>,
        stored_name: &str,
        path: &str,
        thumbnail_path: &str,
        actor: Option<&Actor>,
    ) -> repo::Result<Asset> {
        let tx = self.db.transaction()?;

        let (is_primary, sort_order) = match upload.product_id {
            Some(product_id) => {
                let has_primary = assets::count_primaries(&tx, product_id)? > 0;
                if upload.make_primary && has_primary {
                    clear_primary(&tx, product_id)?;
                }
                let sort_order = match upload.sort_order {
                    Some(order) => order,
                    None => next_sort_order(&tx, product_id)?,
                };
                (upload.make_primary || !has_primary, sort_order)
            }
            None => (false, upload.sort_order.unwrap_or(0)),
        };

        let byte_size = upload.byte_size as i64;
        let mime_type = crate::media::mimetype::normalize(upload.mime_type);
        let id = repo::insert(
            &tx,
            ASSETS,
            &[
                ("product_id", &upload.product_id),
                ("original_name", &upload.original_name),
                ("stored_name", &stored_name),
                ("path", &path),
                ("thumbnail_path", &thumbnail_path),
                ("mime_type", &mime_type),
                ("byte_size", &byte_size),
                ("category", &upload.category),
                ("owner_id", &upload.owner_id),
                ("is_primary", &is_primary),
                ("sort_order", &sort_order),
                ("created_at", &Utc::now()),
            ],
        )?;

        let asset = assets::fetch_existing(&tx, id)?;
        audit::record::<Asset, Asset>(
            &tx,
            actor,
            audit::ACTION_UPLOAD,
            ASSETS,
            id,
            None,
            Some(&asset),
        )?;

        repo::commit(tx)?;
        Ok(asset)
    }
}

pub(crate) fn clear_primary(conn: &Connection, product_id: i64) -> repo::Result<usize> {
    repo::update(
        conn,
        ASSETS,
        &[("is_primary", &false)],
        "product_id = ?2 AND is_primary = 1",
        &[&product_id],
    )
}

fn next_sort_order(conn: &Connection, product_id: i64) -> repo::Result<i64> {
    let max: Option<Option<i64>> = repo::fetch_one(
        conn,
        &format!("SELECT MAX(sort_order) FROM {ASSETS} WHERE product_id = ?1"),
        params![product_id],
        |row| row.get(0),
    )?;
    Ok(max.flatten().map_or(0, |m| m + 1))
}

fn create_upload_dir(dir: &Path) -> io::Result<()> {
    let mut builder = fs::DirBuilder::new();
    builder.recursive(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::DirBuilderExt;
        builder.mode(0o755);
    }
    builder.create(dir)
}

/// Removes a file, treating "already gone" as success.
pub(crate) fn remove_if_exists(path: &Path) -> io::Result<bool> {
    match fs::remove_file(path) {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
        Err(e) => Err(e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{encoded_image, Fixture};
    use image::ImageFormat;

    #[test]
    fn test_store_writes_files_and_row() {
        let mut fx = Fixture::new();
        let bytes = encoded_image(400, 200, ImageFormat::Png);
        let actor = Actor::new(1, "admin");

        let upload = Upload::new(&bytes, "Front View.PNG", "image/png", "product")
            .for_product(10)
            .owned_by(1);
        let asset = fx.store().store(&upload, Some(&actor)).unwrap();

        assert!(asset.id > 0);
        assert!(asset.stored_name.ends_with(".png"));
        assert_eq!(asset.path, format!("uploads/product/{}", asset.stored_name));
        assert_eq!(asset.thumbnail_path, format!("uploads/thumbnails/{}", asset.stored_name));
        assert_eq!(asset.original_name, "Front View.PNG");
        assert_eq!(asset.byte_size, bytes.len() as i64);
        assert_eq!(asset.owner_id, Some(1));
        assert_eq!(fs::read(fx.root().join(&asset.path)).unwrap(), bytes);

        let thumb = image::open(fx.root().join(&asset.thumbnail_path)).unwrap();
        assert_eq!((thumb.width(), thumb.height()), (150, 75));

        let log = audit::for_record(fx.db.conn(), ASSETS, asset.id).unwrap();
        assert_eq!(log.len(), 1);
        assert_eq!(log[0].action, audit::ACTION_UPLOAD);
        assert_eq!(log[0].actor_id, Some(1));
    }

    #[test]
    fn test_first_product_image_becomes_primary() {
        let mut fx = Fixture::new();
        let first = fx.upload_for(10);
        let second = fx.upload_for(10);
        let other = fx.upload_for(11);

        assert!(first.is_primary);
        assert!(!second.is_primary);
        assert!(other.is_primary);
        assert_eq!((first.sort_order, second.sort_order), (0, 1));
        assert_eq!(assets::count_primaries(fx.db.conn(), 10).unwrap(), 1);
    }

    #[test]
    fn test_make_primary_moves_the_flag() {
        let mut fx = Fixture::new();
        let first = fx.upload_for(10);
        let bytes = encoded_image(20, 20, ImageFormat::Png);
        let mut upload = Upload::new(&bytes, "b.png", "image/png", "product").for_product(10);
        upload.make_primary = true;
        let second = fx.store().store(&upload, None).unwrap();

        assert!(second.is_primary);
        assert!(!assets::get(fx.db.conn(), first.id).unwrap().unwrap().is_primary);
        assert_eq!(assets::count_primaries(fx.db.conn(), 10).unwrap(), 1);
    }

    #[test]
    fn test_non_product_assets_are_never_primary() {
        let mut fx = Fixture::new();
        let bytes = encoded_image(20, 20, ImageFormat::Png);
        let logo = fx
            .store()
            .store(&Upload::new(&bytes, "logo.png", "image/png", "logo"), None)
            .unwrap();
        assert_eq!(logo.product_id, None);
        assert!(!logo.is_primary);
        assert!(logo.path.starts_with("uploads/logo/"));
    }

    #[test]
    fn test_invalid_upload_touches_nothing() {
        let mut fx = Fixture::new();
        let bytes = b"%PDF-1.4".to_vec();
        let err = fx
            .store()
            .store(&Upload::new(&bytes, "doc.pdf", "application/pdf", "general"), None)
            .unwrap_err();
        assert!(matches!(err, AssetError::InvalidUpload(Rejection::UnsupportedType(_))));
        assert!(!fx.root().join("uploads").exists());

        let mut upload = Upload::new(&bytes, "x.png", "image/png", "general");
        upload.byte_size = 3;
        let err = fx.store().store(&upload, None).unwrap_err();
        assert!(matches!(err, AssetError::InvalidUpload(Rejection::SizeMismatch { .. })));

        let err = fx
            .store()
            .store(&Upload::new(&bytes, "x.png", "image/png", "../escape"), None)
            .unwrap_err();
        assert!(matches!(err, AssetError::InvalidUpload(Rejection::InvalidCategory(_))));
    }

    #[test]
    fn test_extension_mismatch_is_accepted() {
        let mut fx = Fixture::new();
        let bytes = encoded_image(40, 40, ImageFormat::Png);
        let asset = fx
            .store()
            .store(&Upload::new(&bytes, "picture.jpg", "image/png", "general"), None)
            .unwrap();
        assert!(asset.stored_name.ends_with(".jpg"));
        assert!(fx.root().join(&asset.thumbnail_path).exists());
    }

    #[test]
    fn test_write_failure_creates_no_row() {
        let mut fx = Fixture::new();
        fs::create_dir_all(fx.root().join("uploads")).unwrap();
        // A plain file where the category directory should go.
        fs::write(fx.root().join("uploads/product"), b"blocker").unwrap();

        let bytes = encoded_image(20, 20, ImageFormat::Png);
        let err = fx
            .store()
            .store(&Upload::new(&bytes, "a.png", "image/png", "product").for_product(3), None)
            .unwrap_err();
        assert!(matches!(err, AssetError::WriteFailed { .. }));
        assert!(assets::list_for_product(fx.db.conn(), 3).unwrap().is_empty());
        assert_eq!(audit::count(fx.db.conn()).unwrap(), 0);
    }

    #[test]
    fn test_thumbnail_failure_is_not_fatal() {
        let mut fx = Fixture::new();
        let bytes = b"RIFF\0\0\0\0WEBPVP8 not really".to_vec();
        let asset = fx
            .store()
            .store(&Upload::new(&bytes, "photo.webp", "image/webp", "product").for_product(4), None)
            .unwrap();

        assert!(fx.root().join(&asset.path).exists());
        assert!(!fx.root().join(&asset.thumbnail_path).exists());
        assert_eq!(assets::get(fx.db.conn(), asset.id).unwrap(), Some(asset));
    }

    #[test]
    fn test_stored_asset_payload() {
        let mut fx = Fixture::new();
        let asset = fx.upload_for(1);
        let json = serde_json::to_value(StoredAsset::from(&asset)).unwrap();
        assert_eq!(json["id"], asset.id);
        assert_eq!(json["storedName"], asset.stored_name.as_str());
        assert_eq!(json["thumbnailPath"], asset.thumbnail_path.as_str());
    }
}
