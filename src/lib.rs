//! Media asset lifecycle for the product catalogue: validated uploads with
//! thumbnails, primary-image bookkeeping per product, and audited deletion.

pub mod assets;
pub mod database;
pub mod error;
pub mod media;
pub mod response;
pub mod utils;

#[cfg(test)]
mod test_support;

pub use assets::{Actor, Asset, AssetPatch, AssetStore, LifecycleManager, StoredAsset, Upload};
pub use database::Database;
pub use error::AssetError;
pub use utils::config::Config;
