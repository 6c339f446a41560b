use std::io::Cursor;

use image::codecs::gif::GifEncoder;
use image::codecs::jpeg::JpegEncoder;
use image::codecs::png::{CompressionType, FilterType as PngFilter, PngEncoder};
use image::imageops::{self, FilterType};
use image::{DynamicImage, Frame, GenericImageView, ImageFormat, Rgba, RgbaImage};
use thiserror::Error;

use crate::media::mimetype;

pub const DEFAULT_WIDTH: u32 = 150;
pub const DEFAULT_HEIGHT: u32 = 150;

const JPEG_QUALITY: u8 = 80;

#[derive(Debug, Error)]
pub enum ThumbnailError {
    #[error("no thumbnail decoder for {0}")]
    UnsupportedFormat(String),

    #[error("failed to decode source image: {0}")]
    Decode(#[source] image::ImageError),

    #[error("failed to encode thumbnail: {0}")]
    Encode(#[source] image::ImageError),

    #[error("invalid target size {width}x{height}")]
    InvalidTarget { width: u32, height: u32 },
}

/// The three source formats thumbnails can be produced for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceFormat {
    Jpeg,
    Png,
    Gif,
}

impl SourceFormat {
    pub fn from_mime(mime: &str) -> Result<Self, ThumbnailError> {
        match mimetype::normalize(mime).as_str() {
            mimetype::JPEG | "image/jpg" | "image/pjpeg" => Ok(Self::Jpeg),
            mimetype::PNG => Ok(Self::Png),
            mimetype::GIF => Ok(Self::Gif),
            _ => Err(ThumbnailError::UnsupportedFormat(mime.to_string())),
        }
    }

    fn image_format(self) -> ImageFormat {
        match self {
            Self::Jpeg => ImageFormat::Jpeg,
            Self::Png => ImageFormat::Png,
            Self::Gif => ImageFormat::Gif,
        }
    }

    fn has_alpha(self) -> bool {
        !matches!(self, Self::Jpeg)
    }
}

/// Largest size with the source's aspect ratio that fits in the target box.
/// A source wider than the box (relative to its aspect) binds on width,
/// otherwise on height.
pub fn fit_within(src_width: u32, src_height: u32, max_width: u32, max_height: u32) -> (u32, u32) {
    let src_aspect = src_width as f64 / src_height as f64;
    let target_aspect = max_width as f64 / max_height as f64;
    let (w, h) = if src_aspect > target_aspect {
        (max_width as f64, max_width as f64 / src_aspect)
    } else {
        (max_height as f64 * src_aspect, max_height as f64)
    };
    ((w.round() as u32).max(1), (h.round() as u32).max(1))
}

/// Decodes `source`, resizes it into a `target_width` x `target_height` box
/// and re-encodes it in the source format.
pub fn generate_thumbnail(
    source: &[u8],
    source_mime: &str,
    target_width: u32,
    target_height: u32,
) -> Result<Vec<u8>, ThumbnailError> {
    if target_width == 0 || target_height == 0 {
        return Err(ThumbnailError::InvalidTarget {
            width: target_width,
            height: target_height,
        });
    }
    let format = SourceFormat::from_mime(source_mime)?;
    let decoded = image::load_from_memory_with_format(source, format.image_format())
        .map_err(ThumbnailError::Decode)?;

    let (src_width, src_height) = decoded.dimensions();
    if src_width == 0 || src_height == 0 {
        return Err(ThumbnailError::InvalidTarget {
            width: src_width,
            height: src_height,
        });
    }
    let (width, height) = fit_within(src_width, src_height, target_width, target_height);
    let resized = decoded.resize_exact(width, height, FilterType::Lanczos3);

    let canvas = if format.has_alpha() {
        let mut canvas = RgbaImage::from_pixel(width, height, Rgba([0, 0, 0, 0]));
        imageops::overlay(&mut canvas, &resized.to_rgba8(), 0, 0);
        DynamicImage::ImageRgba8(canvas)
    } else {
        DynamicImage::ImageRgb8(resized.to_rgb8())
    };

    encode(&canvas, format)
}

fn encode(image: &DynamicImage, format: SourceFormat) -> Result<Vec<u8>, ThumbnailError> {
    let mut out = Cursor::new(Vec::new());
    let written = match format {
        SourceFormat::Jpeg => {
            let encoder = JpegEncoder::new_with_quality(&mut out, JPEG_QUALITY);
            image.write_with_encoder(encoder)
        }
        SourceFormat::Png => {
            let encoder =
                PngEncoder::new_with_quality(&mut out, CompressionType::Best, PngFilter::Adaptive);
            image.write_with_encoder(encoder)
        }
        SourceFormat::Gif => {
            let mut encoder = GifEncoder::new(&mut out);
            encoder.encode_frame(Frame::new(image.to_rgba8()))
        }
    };
    written.map_err(ThumbnailError::Encode)?;
    Ok(out.into_inner())
}
