use std::io::Cursor;
use std::path::Path;

use image::{DynamicImage, ImageFormat, Rgb, RgbImage};
use tempfile::TempDir;

use crate::assets::{Asset, AssetStore, LifecycleManager, Upload};
use crate::database::Database;
use crate::utils::config::Config;

/// Encodes a `width` x `height` gradient in `format`.
pub fn encoded_image(width: u32, height: u32, format: ImageFormat) -> Vec<u8> {
    let img = RgbImage::from_fn(width, height, |x, y| {
        Rgb([(x % 256) as u8, (y % 256) as u8, ((x + y) % 256) as u8])
    });
    let img = match format {
        ImageFormat::Gif => DynamicImage::ImageRgba8(DynamicImage::ImageRgb8(img).to_rgba8()),
        _ => DynamicImage::ImageRgb8(img),
    };
    let mut out = Cursor::new(Vec::new());
    img.write_to(&mut out, format).unwrap();
    out.into_inner()
}

/// In-memory database plus a scratch media root.
pub struct Fixture {
    dir: TempDir,
    pub db: Database,
    pub config: Config,
}

impl Fixture {
    pub fn new() -> Self {
        let dir = tempfile::tempdir().unwrap();
        let config = Config {
            media_root: dir.path().to_path_buf(),
            ..Config::default()
        };
        Self {
            dir,
            db: Database::open_in_memory().unwrap(),
            config,
        }
    }

    pub fn root(&self) -> &Path {
        self.dir.path()
    }

    pub fn store(&mut self) -> AssetStore<'_> {
        AssetStore::new(&mut self.db, &self.config)
    }

    pub fn lifecycle(&mut self) -> LifecycleManager<'_> {
        LifecycleManager::new(&mut self.db, self.config.media_root.clone())
    }

    pub fn upload_for(&mut self, product_id: i64) -> Asset {
        self.upload(Some(product_id), None)
    }

    pub fn upload_sorted(&mut self, product_id: i64, sort_order: i64) -> Asset {
        self.upload(Some(product_id), Some(sort_order))
    }

    pub fn upload_unattached(&mut self) -> Asset {
        self.upload(None, None)
    }

    fn upload(&mut self, product_id: Option<i64>, sort_order: Option<i64>) -> Asset {
        let bytes = encoded_image(32, 24, ImageFormat::Png);
        let mut upload = Upload::new(&bytes, "item.png", "image/png", "product");
        upload.product_id = product_id;
        upload.sort_order = sort_order;
        self.store().store(&upload, None).unwrap()
    }
}
