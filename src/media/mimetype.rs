pub const JPEG: &str = "image/jpeg";
pub const PNG: &str = "image/png";
pub const GIF: &str = "image/gif";
pub const WEBP: &str = "image/webp";

pub const DEFAULT_ALLOWED: [&str; 4] = [JPEG, PNG, GIF, WEBP];

/// Sniffs the content type from magic bytes. Only used when the caller has
/// no declared type; validation always runs on the declared one.
pub fn detect_mimetype(bytes: &[u8]) -> String {
    match infer::get(bytes) {
        Some(kind) => kind.mime_type().to_string(),
        None => "application/octet-stream".to_string(),
    }
}

/// Lower-cases and strips parameters, so `Image/JPEG; charset=x` becomes `image/jpeg`.
pub fn normalize(mime: &str) -> String {
    mime.split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase()
}

/// Extension used when the uploaded file name carries none.
pub fn default_extension(mime: &str) -> &'static str {
    match normalize(mime).as_str() {
        JPEG | "image/jpg" | "image/pjpeg" => "jpg",
        PNG => "png",
        GIF => "gif",
        WEBP => "webp",
        _ => "bin",
    }
}
