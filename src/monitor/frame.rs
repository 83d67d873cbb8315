use crate::error::Error;
use crate::utils::data_url;
use chrono::{DateTime, Utc};
use image::codecs::jpeg::JpegEncoder;
use image::RgbImage;

/// One rendered frame of the live source
#[derive(Debug, Clone)]
pub struct Frame {
    image: RgbImage,
    /// Monotonic counter assigned by the sampler
    pub sequence: u64,
    pub captured_at: DateTime<Utc>,
}

impl Frame {
    pub fn new(image: RgbImage, sequence: u64) -> Self {
        Self {
            image,
            sequence,
            captured_at: Utc::now(),
        }
    }

    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }

    pub fn image(&self) -> &RgbImage {
        &self.image
    }

    /// Lossy JPEG encoding; `quality` is in `0.0..=1.0`
    pub fn encode_jpeg(&self, quality: f32) -> Result<Vec<u8>, Error> {
        let quality = (quality.clamp(0.0, 1.0) * 100.0).round().max(1.0) as u8;

        let mut buffer = Vec::new();
        let mut encoder = JpegEncoder::new_with_quality(&mut buffer, quality);
        encoder
            .encode_image(&self.image)
            .map_err(|e| Error::Encoding(format!("Failed to encode JPEG: {}", e)))?;

        Ok(buffer)
    }

    /// JPEG wrapped as `data:image/jpeg;base64,...`
    pub fn to_data_url(&self, quality: f32) -> Result<String, Error> {
        Ok(data_url::encode_jpeg(&self.encode_jpeg(quality)?))
    }
}
