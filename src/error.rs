use std::path::PathBuf;

use thiserror::Error;

use crate::database::StorageError;
use crate::media::validator::Rejection;

#[derive(Debug, Error)]
pub enum AssetError {
    #[error("invalid upload: {0}")]
    InvalidUpload(#[from] Rejection),

    #[error("could not write {}: {source}", .path.display())]
    WriteFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("asset {0} not found")]
    NotFound(i64),

    #[error("asset {asset_id} does not belong to product {expected}")]
    ProductMismatch {
        asset_id: i64,
        expected: i64,
        actual: Option<i64>,
    },

    #[error("asset {0} is not attached to a product")]
    NotProductImage(i64),

    #[error("asset {0} could not be deleted")]
    DeleteFailed(i64),

    #[error("internal error: {0}")]
    Internal(#[from] StorageError),
}

impl AssetError {
    /// HTTP status a request handler should answer with.
    pub fn status(&self) -> u16 {
        match self {
            Self::InvalidUpload(_) | Self::ProductMismatch { .. } | Self::NotProductImage(_) => 400,
            Self::NotFound(_) => 404,
            Self::WriteFailed { .. } | Self::DeleteFailed(_) | Self::Internal(_) => 500,
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            Self::InvalidUpload(_) => "invalid_upload",
            Self::WriteFailed { .. } => "write_failed",
            Self::NotFound(_) => "not_found",
            Self::ProductMismatch { .. } => "product_mismatch",
            Self::NotProductImage(_) => "not_product_image",
            Self::DeleteFailed(_) => "delete_failed",
            Self::Internal(_) => "internal_error",
        }
    }
}

pub type Result<T> = std::result::Result<T, AssetError>;
