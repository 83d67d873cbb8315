//! Live decoding through a gstreamer `playbin`, pulled from an RGB appsink.

use super::sources::FrameSource;
use crate::error::Error;
use anyhow::{anyhow, Result};
use async_trait::async_trait;
use gstreamer as gst;
use gstreamer::prelude::*;
use gstreamer_app as gst_app;
use gstreamer_video as gst_video;
use image::RgbImage;
use log::{info, warn};

const PULL_TIMEOUT_MS: u64 = 500;

pub struct GstreamerSource {
    uri: String,
    playbin: gst::Element,
    sink: gst_app::AppSink,
}

impl GstreamerSource {
    pub fn new(uri: &str, width: u32, height: u32) -> Result<Self> {
        gst::init().map_err(|e| Error::Capture(format!("Failed to initialize GStreamer: {}", e)))?;

        let playbin = gst::ElementFactory::make("playbin")
            .name("guardcam-playbin")
            .property("uri", uri)
            .build()?;

        let sink_bin = gst::parse::bin_from_description("videoconvert ! videoscale ! appsink name=frames", true)
            .map_err(|e| Error::Capture(format!("Failed to build sink bin: {}", e)))?;
        let sink = sink_bin
            .by_name("frames")
            .and_then(|element| element.downcast::<gst_app::AppSink>().ok())
            .ok_or_else(|| anyhow!("appsink missing from sink bin"))?;

        let caps = gst_video::VideoCapsBuilder::new()
            .format(gst_video::VideoFormat::Rgb)
            .width(width as i32)
            .height(height as i32)
            .build();
        sink.set_caps(Some(&caps));
        // Only the newest frame matters
        sink.set_max_buffers(1);
        sink.set_drop(true);

        let audio_sink = gst::ElementFactory::make("fakesink").build()?;
        playbin.set_property("video-sink", &sink_bin);
        playbin.set_property("audio-sink", &audio_sink);

        playbin.set_state(gst::State::Playing)?;
        info!("GStreamer source playing {}", uri);

        Ok(Self {
            uri: uri.to_string(),
            playbin,
            sink,
        })
    }
}

#[async_trait]
impl FrameSource for GstreamerSource {
    async fn grab(&mut self) -> Result<Option<RgbImage>> {
        let sink = self.sink.clone();
        let sample = tokio::task::spawn_blocking(move || {
            sink.try_pull_sample(gst::ClockTime::from_mseconds(PULL_TIMEOUT_MS))
        })
        .await
        .map_err(|e| Error::Internal(format!("Sample pull task failed: {}", e)))?;

        let Some(sample) = sample else {
            if self.sink.is_eos() {
                return Err(Error::Capture(format!("End of stream on {}", self.uri)).into());
            }
            return Ok(None);
        };

        let caps = sample.caps().ok_or_else(|| anyhow!("Sample without caps"))?;
        let info = gst_video::VideoInfo::from_caps(caps)?;
        let buffer = sample.buffer().ok_or_else(|| anyhow!("Sample without buffer"))?;
        let map = buffer.map_readable()?;

        let (width, height) = (info.width(), info.height());
        let stride = info.stride()[0] as usize;
        let row = width as usize * 3;

        // Rows may be padded past `width * 3`
        let mut pixels = Vec::with_capacity(row * height as usize);
        for y in 0..height as usize {
            let start = y * stride;
            let line = map
                .get(start..start + row)
                .ok_or_else(|| Error::Capture("Truncated video buffer".to_string()))?;
            pixels.extend_from_slice(line);
        }

        RgbImage::from_raw(width, height, pixels)
            .map(Some)
            .ok_or_else(|| Error::Capture("Frame size mismatch".to_string()).into())
    }

    fn describe(&self) -> String {
        format!("gstreamer {}", self.uri)
    }
}

impl Drop for GstreamerSource {
    fn drop(&mut self) {
        if let Err(e) = self.playbin.set_state(gst::State::Null) {
            warn!("Failed to stop GStreamer pipeline: {}", e);
        }
    }
}
