use image::codecs::jpeg::JpegEncoder;
use image::imageops::FilterType;
use image::{DynamicImage, Rgb, RgbImage};
use thiserror::Error;
use vidprompt_contracts::prompts::EncodedImage;

pub const MAX_EDGE_PX: u32 = 1600;
pub const BYTE_BUDGET: usize = 800 * 1024;
pub const QUALITY_LADDER: [u8; 5] = [85, 75, 65, 55, 45];
pub const FALLBACK_QUALITY: u8 = 40;
pub const OUTPUT_MIME: &str = "image/jpeg";

#[derive(Debug, Error)]
pub enum NormalizeError {
    #[error("Please choose an image file (received {mime}).")]
    NotAnImage { mime: String },
    #[error("Unable to process this image. Please try another file.")]
    Unprocessable {
        #[source]
        source: Option<image::ImageError>,
    },
}

impl NormalizeError {
    pub fn status_code(&self) -> u16 {
        match self {
            Self::NotAnImage { .. } => 415,
            Self::Unprocessable { .. } => 422,
        }
    }
}

/// Re-encoded upload, ready to be placed in a prompt slot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NormalizedImage {
    pub image: EncodedImage,
    pub width: u32,
    pub height: u32,
    pub quality: u8,
    pub byte_len: usize,
}

/// Scales `bytes` so the long edge fits `MAX_EDGE_PX` and re-encodes as JPEG under
/// `BYTE_BUDGET`, stepping down `QUALITY_LADDER` before settling on `FALLBACK_QUALITY`.
pub fn normalize_image(
    bytes: &[u8],
    declared_mime: Option<&str>,
) -> Result<NormalizedImage, NormalizeError> {
    if let Some(mime) = declared_mime {
        if !mime.trim().to_ascii_lowercase().starts_with("image/") {
            return Err(NormalizeError::NotAnImage {
                mime: mime.to_string(),
            });
        }
    }

    let decoded = image::load_from_memory(bytes)
        .map_err(|err| NormalizeError::Unprocessable { source: Some(err) })?;
    if decoded.width() == 0 || decoded.height() == 0 {
        return Err(NormalizeError::Unprocessable { source: None });
    }

    let (width, height) = target_dimensions(decoded.width(), decoded.height());
    let flattened = flatten_onto_white(&decoded);
    let resized = if (width, height) == (flattened.width(), flattened.height()) {
        flattened
    } else {
        DynamicImage::ImageRgb8(flattened)
            .resize_exact(width, height, FilterType::Triangle)
            .to_rgb8()
    };

    for quality in QUALITY_LADDER {
        let encoded = encode_jpeg(&resized, quality)?;
        if encoded.len() <= BYTE_BUDGET {
            return Ok(finish(encoded, width, height, quality));
        }
    }
    let encoded = encode_jpeg(&resized, FALLBACK_QUALITY)?;
    Ok(finish(encoded, width, height, FALLBACK_QUALITY))
}

/// Scale-down-only fit of the long edge, rounding and never collapsing to zero.
pub fn target_dimensions(width: u32, height: u32) -> (u32, u32) {
    let long_edge = width.max(height);
    if long_edge <= MAX_EDGE_PX {
        return (width, height);
    }
    let scale = f64::from(MAX_EDGE_PX) / f64::from(long_edge);
    let scaled = |value: u32| ((f64::from(value) * scale).round() as u32).max(1);
    (scaled(width), scaled(height))
}

fn flatten_onto_white(image: &DynamicImage) -> RgbImage {
    let rgba = image.to_rgba8();
    let mut flattened = RgbImage::new(rgba.width(), rgba.height());
    for (x, y, pixel) in rgba.enumerate_pixels() {
        let alpha = u16::from(pixel[3]);
        let blend =
            |channel: u8| -> u8 { (((u16::from(channel) * alpha) + (255 * (255 - alpha))) / 255) as u8 };
        flattened.put_pixel(x, y, Rgb([blend(pixel[0]), blend(pixel[1]), blend(pixel[2])]));
    }
    flattened
}

fn encode_jpeg(image: &RgbImage, quality: u8) -> Result<Vec<u8>, NormalizeError> {
    let mut bytes = Vec::new();
    JpegEncoder::new_with_quality(&mut bytes, quality)
        .encode_image(image)
        .map_err(|err| NormalizeError::Unprocessable { source: Some(err) })?;
    Ok(bytes)
}

fn finish(bytes: Vec<u8>, width: u32, height: u32, quality: u8) -> NormalizedImage {
    NormalizedImage {
        byte_len: bytes.len(),
        image: EncodedImage::from_bytes(OUTPUT_MIME, &bytes),
        width,
        height,
        quality,
    }
}


#[cfg(test)]
mod tests {
    use base64::engine::general_purpose::STANDARD as BASE64;
    use base64::Engine as _;

    use super::fixtures::{noisy_png, solid_png};
    use super::{
        normalize_image, target_dimensions, NormalizeError, BYTE_BUDGET, FALLBACK_QUALITY,
        MAX_EDGE_PX, QUALITY_LADDER,
    };

    #[test]
    fn dimensions_scale_down_only() {
        assert_eq!(target_dimensions(800, 600), (800, 600));
        assert_eq!(target_dimensions(1600, 900), (1600, 900));
        assert_eq!(target_dimensions(3200, 1800), (1600, 900));
        assert_eq!(target_dimensions(1000, 4000), (400, 1600));
        assert_eq!(target_dimensions(5000, 1), (1600, 1));
    }

    #[test]
    fn small_image_keeps_size_and_becomes_jpeg() {
        let normalized = normalize_image(&solid_png(40, 30, [10, 200, 30, 255]), Some("image/png"))
            .expect("normalizes");
        assert_eq!((normalized.width, normalized.height), (40, 30));
        assert_eq!(normalized.quality, QUALITY_LADDER[0]);
        assert_eq!(normalized.image.mime_type, "image/jpeg");
        let decoded = BASE64.decode(&normalized.image.data).expect("base64");
        assert_eq!(decoded.len(), normalized.byte_len);
        assert_eq!(&decoded[..2], &[0xFF, 0xD8]);
    }

    #[test]
    fn transparent_pixels_become_white() {
        let normalized =
            normalize_image(&solid_png(16, 16, [0, 0, 0, 0]), None).expect("normalizes");
        let decoded = BASE64.decode(&normalized.image.data).expect("base64");
        let image = image::load_from_memory(&decoded).expect("jpeg decodes").to_rgb8();
        let pixel = image.get_pixel(8, 8);
        assert!(pixel.0.iter().all(|channel| *channel > 240), "{pixel:?}");
    }

    #[test]
    fn large_noisy_image_fits_budget_or_falls_back() {
        let normalized =
            normalize_image(&noisy_png(2400, 1200), Some("image/png")).expect("normalizes");
        assert_eq!(normalized.width, MAX_EDGE_PX);
        assert_eq!(normalized.height, 800);
        assert!(
            normalized.byte_len <= BYTE_BUDGET || normalized.quality == FALLBACK_QUALITY,
            "quality {} produced {} bytes",
            normalized.quality,
            normalized.byte_len
        );
    }

    #[test]
    fn non_image_mime_is_rejected() {
        let err = normalize_image(b"%PDF-1.7", Some("application/pdf")).unwrap_err();
        assert!(matches!(err, NormalizeError::NotAnImage { .. }));
    }

    #[test]
    fn undecodable_bytes_are_unprocessable() {
        let err = normalize_image(b"definitely not pixels", Some("image/png")).unwrap_err();
        assert!(matches!(err, NormalizeError::Unprocessable { .. }));
        assert_eq!(
            err.to_string(),
            "Unable to process this image. Please try another file."
        );
    }
}
