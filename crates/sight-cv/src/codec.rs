//! JPEG and base64 encoding of output frames

use crate::{CvError, CvResult};
use base64::Engine;
use image::RgbImage;
use std::io::Cursor;

/// Compress a frame to JPEG at the given quality (1-100)
pub fn encode_jpeg(frame: &RgbImage, quality: u8) -> CvResult<Vec<u8>> {
    if frame.width() == 0 || frame.height() == 0 {
        return Err(CvError::encoding("cannot encode an empty frame"));
    }

    let mut buf = Cursor::new(Vec::new());
    let encoder = image::codecs::jpeg::JpegEncoder::new_with_quality(&mut buf, quality.clamp(1, 100));
    frame.write_with_encoder(encoder)?;
    Ok(buf.into_inner())
}

pub fn encode_base64(bytes: &[u8]) -> String {
    base64::engine::general_purpose::STANDARD.encode(bytes)
}
