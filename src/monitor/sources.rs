//! Live video sources the sampler can read from.

use crate::config::{SourceConfig, SourceKind};
use crate::error::Error;
use anyhow::{Context, Result};
use async_trait::async_trait;
use image::{Rgb, RgbImage};
use std::path::PathBuf;
use std::time::Duration;
use url::Url;

/// A live source of RGB frames.
///
/// `Ok(None)` means the source is up but has nothing to show yet.
#[async_trait]
pub trait FrameSource: Send {
    async fn grab(&mut self) -> Result<Option<RgbImage>>;

    fn describe(&self) -> String;
}

/// Moving synthetic pattern for development and tests
pub struct TestPatternSource {
    width: u32,
    height: u32,
    tick: u32,
}

impl TestPatternSource {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width: width.max(1),
            height: height.max(1),
            tick: 0,
        }
    }
}

#[async_trait]
impl FrameSource for TestPatternSource {
    async fn grab(&mut self) -> Result<Option<RgbImage>> {
        self.tick = self.tick.wrapping_add(1);
        let tick = self.tick;
        let image = RgbImage::from_fn(self.width, self.height, |x, y| {
            Rgb([
                (x.wrapping_add(tick) % 256) as u8,
                (y.wrapping_add(tick.wrapping_mul(2)) % 256) as u8,
                ((x ^ y) % 256) as u8,
            ])
        });
        Ok(Some(image))
    }

    fn describe(&self) -> String {
        format!("test pattern {}x{}", self.width, self.height)
    }
}

/// A still image, decoded once and replayed on every sample
pub struct ImageFileSource {
    path: PathBuf,
    image: RgbImage,
}

impl ImageFileSource {
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let image = image::open(&path)
            .with_context(|| format!("Failed to open image source {}", path.display()))?
            .to_rgb8();
        Ok(Self { path, image })
    }
}

#[async_trait]
impl FrameSource for ImageFileSource {
    async fn grab(&mut self) -> Result<Option<RgbImage>> {
        Ok(Some(self.image.clone()))
    }

    fn describe(&self) -> String {
        format!("image file {}", self.path.display())
    }
}

/// Camera snapshot endpoint returning one JPEG per GET
pub struct SnapshotSource {
    client: reqwest::Client,
    url: Url,
}

impl SnapshotSource {
    pub fn new(url: &str, timeout: Duration) -> Result<Self> {
        let url = Url::parse(url).map_err(|e| Error::Config(format!("Invalid snapshot URL {}: {}", url, e)))?;
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| Error::Transport(format!("Failed to build HTTP client: {}", e)))?;
        Ok(Self { client, url })
    }
}

#[async_trait]
impl FrameSource for SnapshotSource {
    async fn grab(&mut self) -> Result<Option<RgbImage>> {
        let response = self
            .client
            .get(self.url.clone())
            .send()
            .await
            .map_err(Error::from)?
            .error_for_status()
            .map_err(Error::from)?;
        let bytes = response.bytes().await.map_err(Error::from)?;

        let image = image::load_from_memory(&bytes)
            .map_err(|e| Error::Capture(format!("Undecodable snapshot: {}", e)))?
            .to_rgb8();
        Ok(Some(image))
    }

    fn describe(&self) -> String {
        format!("snapshot {}", self.url)
    }
}

/// Build the source named by the configuration
pub fn build_source(config: &SourceConfig) -> Result<Box<dyn FrameSource>> {
    match config.kind {
        SourceKind::TestPattern => Ok(Box::new(TestPatternSource::new(config.width, config.height))),
        SourceKind::ImageFile => Ok(Box::new(ImageFileSource::open(&config.uri)?)),
        SourceKind::Snapshot => {
            // Snapshots get at least two seconds even at short sampling intervals
            let timeout = config.sample_interval().max(Duration::from_secs(2));
            Ok(Box::new(SnapshotSource::new(&config.uri, timeout)?))
        }
        #[cfg(feature = "gstreamer-source")]
        SourceKind::Gstreamer => Ok(Box::new(super::gst_source::GstreamerSource::new(
            &config.uri,
            config.width,
            config.height,
        )?)),
        #[cfg(not(feature = "gstreamer-source"))]
        SourceKind::Gstreamer => Err(Error::Config(
            "gstreamer source requested but the `gstreamer-source` feature is disabled".to_string(),
        )
        .into()),
    }
}
