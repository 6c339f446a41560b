use std::fs::File;
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tracing::info;

use crate::media::mimetype;
use crate::media::thumbnail;
use crate::media::validator::{self, UploadPolicy};

const KEY_DB_PATH: &str = "MEDIA_DB_PATH";
const KEY_ROOT: &str = "MEDIA_ROOT";
const KEY_MAX_BYTES: &str = "MEDIA_MAX_UPLOAD_BYTES";
const KEY_MIME_TYPES: &str = "MEDIA_ALLOWED_MIME_TYPES";
const KEY_THUMB_WIDTH: &str = "MEDIA_THUMBNAIL_WIDTH";
const KEY_THUMB_HEIGHT: &str = "MEDIA_THUMBNAIL_HEIGHT";

const KEYS: [&str; 6] = [
    KEY_DB_PATH,
    KEY_ROOT,
    KEY_MAX_BYTES,
    KEY_MIME_TYPES,
    KEY_THUMB_WIDTH,
    KEY_THUMB_HEIGHT,
];

#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    pub database_path: PathBuf,
    /// Directory that contains `uploads/`.
    pub media_root: PathBuf,
    pub max_upload_bytes: u64,
    pub allowed_mime_types: Vec<String>,
    pub thumbnail_width: u32,
    pub thumbnail_height: u32,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            database_path: PathBuf::from("media-vault.db"),
            media_root: PathBuf::from("."),
            max_upload_bytes: validator::DEFAULT_MAX_BYTES,
            allowed_mime_types: mimetype::DEFAULT_ALLOWED.iter().map(|m| m.to_string()).collect(),
            thumbnail_width: thumbnail::DEFAULT_WIDTH,
            thumbnail_height: thumbnail::DEFAULT_HEIGHT,
        }
    }
}

impl Config {
    /// Reads `KEY=VALUE` lines from `path` (a missing file means defaults),
    /// then lets process environment variables with the same keys win.
    pub fn load(path: &Path) -> Result<Self> {
        let mut config = Self::default();

        if path.exists() {
            let file = File::open(path)
                .with_context(|| format!("Failed to open config file {:?}", path))?;
            for line in BufReader::new(file).lines() {
                let line = line?;
                let line = line.trim();
                if line.is_empty() || line.starts_with('#') {
                    continue;
                }
                if let Some((key, value)) = line.split_once('=') {
                    config.apply(key.trim(), value.trim())?;
                }
            }
            info!("Loaded configuration from {:?}", path);
        }

        for key in KEYS {
            if let Ok(value) = std::env::var(key) {
                config.apply(key, value.trim())?;
            }
        }

        Ok(config)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let mut file = File::create(path)
            .with_context(|| format!("Failed to create config file {:?}", path))?;
        writeln!(file, "{}={}", KEY_DB_PATH, self.database_path.display())?;
        writeln!(file, "{}={}", KEY_ROOT, self.media_root.display())?;
        writeln!(file, "{}={}", KEY_MAX_BYTES, self.max_upload_bytes)?;
        writeln!(file, "{}={}", KEY_MIME_TYPES, self.allowed_mime_types.join(","))?;
        writeln!(file, "{}={}", KEY_THUMB_WIDTH, self.thumbnail_width)?;
        writeln!(file, "{}={}", KEY_THUMB_HEIGHT, self.thumbnail_height)?;
        Ok(())
    }

    pub fn upload_policy(&self) -> UploadPolicy {
        UploadPolicy::new(&self.allowed_mime_types, self.max_upload_bytes)
    }

    fn apply(&mut self, key: &str, value: &str) -> Result<()> {
        match key {
            KEY_DB_PATH => self.database_path = PathBuf::from(value),
            KEY_ROOT => self.media_root = PathBuf::from(value),
            KEY_MAX_BYTES => {
                self.max_upload_bytes = value
                    .parse()
                    .with_context(|| format!("{key} must be a byte count, got {value:?}"))?
            }
            KEY_MIME_TYPES => {
                self.allowed_mime_types = value
                    .split(',')
                    .map(mimetype::normalize)
                    .filter(|m| !m.is_empty())
                    .collect()
            }
            KEY_THUMB_WIDTH => {
                self.thumbnail_width = parse_dimension(key, value)?;
            }
            KEY_THUMB_HEIGHT => {
                self.thumbnail_height = parse_dimension(key, value)?;
            }
            _ => {}
        }
        Ok(())
    }
}

fn parse_dimension(key: &str, value: &str) -> Result<u32> {
    let parsed: u32 = value
        .parse()
        .with_context(|| format!("{key} must be a positive integer, got {value:?}"))?;
    anyhow::ensure!(parsed > 0, "{key} must be greater than zero");
    Ok(parsed)
}
