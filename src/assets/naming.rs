use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};

use chrono::Utc;
use sha2::{Digest, Sha256};

use crate::media::mimetype;

static COUNTER: AtomicU64 = AtomicU64::new(0);

/// Builds `<timestamp>_<token>.<ext>`. The token hashes the process id, a
/// per-process counter and the nanosecond clock, so two calls in the same
/// process never share a token.
pub fn stored_name(original_name: &str, mime_type: &str) -> String {
    let now = Utc::now();
    let sequence = COUNTER.fetch_add(1, Ordering::Relaxed);

    let mut hasher = Sha256::new();
    hasher.update(std::process::id().to_le_bytes());
    hasher.update(sequence.to_le_bytes());
    hasher.update(now.timestamp_nanos_opt().unwrap_or_default().to_le_bytes());
    let token = hex::encode(hasher.finalize());

    format!(
        "{}_{}.{}",
        now.format("%Y%m%d%H%M%S"),
        &token[..16],
        extension(original_name, mime_type)
    )
}

fn extension(original_name: &str, mime_type: &str) -> String {
    Path::new(original_name)
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
        .filter(|e| !e.is_empty() && e.len() <= 8 && e.chars().all(|c| c.is_ascii_alphanumeric()))
        .unwrap_or_else(|| mimetype::default_extension(mime_type).to_string())
}
