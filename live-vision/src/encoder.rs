use crate::types::{Frame, Result, ViewerError};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use image::{DynamicImage, GrayImage, ImageFormat, RgbImage, RgbaImage};
use std::io::Cursor;

/// Encode a frame losslessly as PNG
pub fn encode_png(frame: &Frame) -> Result<Vec<u8>> {
    let (width, height) = (frame.width(), frame.height());
    let data = frame.data().to_vec();

    let image = match frame.channels() {
        1 => GrayImage::from_raw(width, height, data).map(DynamicImage::ImageLuma8),
        3 => RgbImage::from_raw(width, height, data).map(DynamicImage::ImageRgb8),
        4 => RgbaImage::from_raw(width, height, data).map(DynamicImage::ImageRgba8),
        other => {
            return Err(ViewerError::MalformedFrame(format!("unsupported channel count {}", other)));
        }
    };
    let image = image.ok_or_else(|| {
        ViewerError::MalformedFrame(format!("buffer does not fit {}x{}", width, height))
    })?;

    let mut png = Vec::new();
    image.write_to(&mut Cursor::new(&mut png), ImageFormat::Png)?;
    Ok(png)
}

/// Encode a frame into the payload the model endpoint expects: base64 over PNG
pub fn encode_frame(frame: &Frame) -> Result<String> {
    let png = encode_png(frame)?;
    Ok(BASE64.encode(png))
}

/// Decode an encoded image (JPEG, PNG) received from the stream engine into an RGB frame
pub fn decode_image(bytes: &[u8]) -> Result<Frame> {
    let rgb = image::load_from_memory(bytes)?.to_rgb8();
    let (width, height) = rgb.dimensions();
    Frame::from_raw(width, height, 3, rgb.into_raw())
        .ok_or_else(|| ViewerError::MalformedFrame("decoded buffer size mismatch".to_string()))
}
