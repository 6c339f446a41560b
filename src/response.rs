//! Turns asset results into what a request handler sends back: a JSON
//! envelope for programmatic callers, a redirect for form posts.

use serde::Serialize;
use serde_json::{json, Value};

use crate::assets::{Asset, StoredAsset};
use crate::error::{AssetError, Result};

pub const REQUESTED_WITH_HEADER: &str = "X-Requested-With";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestKind {
    /// AJAX-style request, answered with JSON.
    Programmatic,
    /// Plain browser form submission, answered with a redirect.
    Browser,
}

impl RequestKind {
    /// Classifies by the value of the `X-Requested-With` header.
    pub fn from_header(value: Option<&str>) -> Self {
        match value {
            Some(v) if v.trim().eq_ignore_ascii_case("XMLHttpRequest") => Self::Programmatic,
            _ => Self::Browser,
        }
    }

    /// Classifies a full header list. Header names compare case-insensitively.
    pub fn from_headers<'a, I>(headers: I) -> Self
    where
        I: IntoIterator<Item = (&'a str, &'a str)>,
    {
        let value = headers
            .into_iter()
            .find(|(name, _)| name.eq_ignore_ascii_case(REQUESTED_WITH_HEADER))
            .map(|(_, value)| value);
        Self::from_header(value)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Reply {
    Json { status: u16, body: Value },
    Redirect { location: String },
}

#[derive(Debug, Serialize)]
struct Envelope<'a> {
    success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    message: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    code: Option<&'a str>,
}

pub fn error_body(err: &AssetError) -> Value {
    json!(Envelope {
        success: false,
        message: None,
        error: Some(err.to_string()),
        code: Some(err.code()),
    })
}

pub fn delete_reply(result: &Result<()>, kind: RequestKind, listing_url: &str) -> Reply {
    match kind {
        RequestKind::Programmatic => match result {
            Ok(()) => Reply::Json {
                status: 200,
                body: json!(Envelope {
                    success: true,
                    message: Some("Image deleted"),
                    error: None,
                    code: None,
                }),
            },
            Err(e) => Reply::Json {
                status: e.status(),
                body: error_body(e),
            },
        },
        RequestKind::Browser => {
            let flag = match result {
                Ok(()) => "success=image_deleted",
                Err(_) => "error=delete_failed",
            };
            let separator = if listing_url.contains('?') { '&' } else { '?' };
            Reply::Redirect {
                location: format!("{listing_url}{separator}{flag}"),
            }
        }
    }
}

pub fn upload_reply(result: &Result<Asset>) -> Reply {
    match result {
        Ok(asset) => {
            let mut body = json!(StoredAsset::from(asset));
            body["success"] = Value::Bool(true);
            Reply::Json { status: 200, body }
        }
        Err(e) => Reply::Json {
            status: e.status(),
            body: error_body(e),
        },
    }
}
