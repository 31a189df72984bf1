//! Image encoding: `DynamicImage` → PNG → base64 data URL.
//!
//! Chat-completions APIs take images as `data:` URLs inside the JSON body.
//! PNG keeps line art and text in figures crisp. Images are normalised to
//! RGBA8 first because PDF image objects come out in whatever colour type
//! the document stored (16-bit, float, gray+alpha), and the PNG encoder
//! rejects some of those.

use base64::{engine::general_purpose::STANDARD, Engine as _};
use image::{DynamicImage, ImageFormat};
use std::io::Cursor;
use tracing::debug;

/// Encode a picture as a `data:image/png;base64,…` URL.
pub fn encode_data_url(img: &DynamicImage) -> Result<String, image::ImageError> {
    let rgba = DynamicImage::ImageRgba8(img.to_rgba8());

    let mut buf = Vec::new();
    rgba.write_to(&mut Cursor::new(&mut buf), ImageFormat::Png)?;

    let b64 = STANDARD.encode(&buf);
    debug!(
        "Encoded {}x{} picture → {} bytes base64",
        img.width(),
        img.height(),
        b64.len()
    );

    Ok(format!("data:image/png;base64,{b64}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{GrayImage, Luma, Rgba, RgbaImage};

    #[test]
    fn encode_small_image() {
        let img = DynamicImage::ImageRgba8(RgbaImage::from_pixel(10, 10, Rgba([255, 0, 0, 255])));
        let url = encode_data_url(&img).expect("encode should succeed");
        let payload = url
            .strip_prefix("data:image/png;base64,")
            .expect("png data url prefix");
        let decoded = STANDARD.decode(payload).expect("valid base64");
        assert_eq!(&decoded[1..4], b"PNG");
    }

    #[test]
    fn grayscale_is_normalised() {
        let img = DynamicImage::ImageLuma8(GrayImage::from_pixel(4, 4, Luma([128])));
        assert!(encode_data_url(&img).is_ok());
    }
}
