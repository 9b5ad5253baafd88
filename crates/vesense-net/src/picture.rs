//! ---
//! vs_section: "07-networking-external-interfaces"
//! vs_subsection: "module"
//! vs_type: "source"
//! vs_scope: "code"
//! vs_description: "Camera picture thumbnails for the REST API."
//! vs_version: "v0.0.0-prealpha"
//! vs_owner: "tbd"
//! ---
//! JPEG thumbnails of camera uploads.
use image::codecs::jpeg::JpegEncoder;
use image::{ImageFormat, ImageResult};

/// Maximum thumbnail width; the aspect ratio is kept.
pub const THUMB_WIDTH: u32 = 320;
/// Maximum thumbnail height.
pub const THUMB_HEIGHT: u32 = 240;
const THUMB_QUALITY: u8 = 80;

/// Scale a JPEG upload down to fit [`THUMB_WIDTH`] x [`THUMB_HEIGHT`] and
/// re-encode it as JPEG.
pub fn thumbnail(jpeg: &[u8]) -> ImageResult<Vec<u8>> {
    let picture = image::load_from_memory_with_format(jpeg, ImageFormat::Jpeg)?;
    let scaled = picture.thumbnail(THUMB_WIDTH, THUMB_HEIGHT).to_rgb8();
    let mut out = Vec::new();
    JpegEncoder::new_with_quality(&mut out, THUMB_QUALITY).encode_image(&scaled)?;
    Ok(out)
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use image::{GenericImageView, ImageBuffer, Rgb};

    /// Encode a gradient of the given size as JPEG.
    pub(crate) fn sample_jpeg(width: u32, height: u32) -> Vec<u8> {
        let img: ImageBuffer<Rgb<u8>, Vec<u8>> =
            ImageBuffer::from_fn(width, height, |x, y| Rgb([x as u8, y as u8, 128]));
        let mut buf = Vec::new();
        JpegEncoder::new(&mut buf).encode_image(&img).unwrap();
        buf
    }

    #[test]
    fn thumbnail_fits_bounding_box() {
        let thumb = thumbnail(&sample_jpeg(640, 480)).unwrap();
        let decoded = image::load_from_memory(&thumb).unwrap();
        assert_eq!(decoded.dimensions(), (THUMB_WIDTH, THUMB_HEIGHT));
    }

    #[test]
    fn thumbnail_keeps_aspect_ratio() {
        let thumb = thumbnail(&sample_jpeg(400, 100)).unwrap();
        let (width, height) = image::load_from_memory(&thumb).unwrap().dimensions();
        assert_eq!(width, THUMB_WIDTH);
        assert_eq!(height, 80);
    }

    #[test]
    fn non_jpeg_payload_is_rejected() {
        assert!(thumbnail(b"\xFF\xD8not really").is_err());
    }
}
