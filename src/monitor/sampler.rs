use super::frame::Frame;
use super::sources::FrameSource;
use image::RgbImage;
use log::{debug, info, warn};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

/// Keeps the most recent frame of the live source in a single slot.
///
/// Readers never block on the sampler and only ever see a complete
/// frame; older frames are discarded as soon as a newer one lands.
pub struct FrameSampler {
    latest: watch::Sender<Option<Arc<Frame>>>,
    interval: Duration,
    sequence: AtomicU64,
}

/// Cheap, cloneable handle onto the sampler's latched frame
#[derive(Clone)]
pub struct FrameReader {
    latest: watch::Receiver<Option<Arc<Frame>>>,
}

impl FrameReader {
    /// The latest complete frame, or `None` while the source is not ready
    pub fn latest(&self) -> Option<Arc<Frame>> {
        self.latest.borrow().clone()
    }
}

impl FrameSampler {
    pub fn new(interval: Duration) -> Self {
        let (latest, _) = watch::channel(None);
        Self {
            latest,
            interval,
            sequence: AtomicU64::new(0),
        }
    }

    pub fn reader(&self) -> FrameReader {
        FrameReader {
            latest: self.latest.subscribe(),
        }
    }

    /// Replace the latched frame
    pub fn latch(&self, image: RgbImage) -> Arc<Frame> {
        let sequence = self.sequence.fetch_add(1, Ordering::Relaxed) + 1;
        let frame = Arc::new(Frame::new(image, sequence));
        self.latest.send_replace(Some(Arc::clone(&frame)));
        frame
    }

    /// Drop the latched frame so readers see "not ready"
    pub fn clear(&self) {
        self.latest.send_replace(None);
    }

    pub fn frames_sampled(&self) -> u64 {
        self.sequence.load(Ordering::Relaxed)
    }

    /// Sample `source` every interval until cancelled
    pub async fn run(self: Arc<Self>, mut source: Box<dyn FrameSource>, cancel: CancellationToken) {
        info!("Sampling {} every {:?}", source.describe(), self.interval);

        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let mut healthy = true;

        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => {}
            }

            match source.grab().await {
                Ok(Some(image)) => {
                    if !healthy {
                        info!("Source {} recovered", source.describe());
                        healthy = true;
                    }
                    self.latch(image);
                }
                Ok(None) => {
                    debug!("Source {} has no frame yet", source.describe());
                }
                Err(e) => {
                    if healthy {
                        warn!("Source {} failed: {:#}", source.describe(), e);
                        healthy = false;
                    } else {
                        debug!("Source {} still failing: {:#}", source.describe(), e);
                    }
                    // A stale frame must not pass as live
                    self.clear();
                }
            }
        }

        debug!("Frame sampler stopped after {} frames", self.frames_sampled());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Result;
    use async_trait::async_trait;
    use image::Rgb;

    /// Yields one frame, then fails forever
    struct FlakySource {
        calls: u32,
    }

    #[async_trait]
    impl FrameSource for FlakySource {
        async fn grab(&mut self) -> Result<Option<RgbImage>> {
            self.calls += 1;
            if self.calls == 1 {
                Ok(Some(RgbImage::from_pixel(4, 4, Rgb([1, 2, 3]))))
            } else {
                Err(anyhow::anyhow!("camera unplugged"))
            }
        }

        fn describe(&self) -> String {
            "flaky".to_string()
        }
    }

    #[test]
    fn latch_replaces_previous_frame() {
        let sampler = FrameSampler::new(Duration::from_millis(100));
        let reader = sampler.reader();
        assert!(reader.latest().is_none());

        sampler.latch(RgbImage::new(2, 2));
        let second = sampler.latch(RgbImage::new(3, 3));

        let latest = reader.latest().unwrap();
        assert_eq!(latest.sequence, second.sequence);
        assert_eq!(latest.width(), 3);
        assert_eq!(sampler.frames_sampled(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn source_failure_clears_the_slot() {
        let sampler = Arc::new(FrameSampler::new(Duration::from_millis(100)));
        let reader = sampler.reader();
        let cancel = CancellationToken::new();

        let task = tokio::spawn(Arc::clone(&sampler).run(Box::new(FlakySource { calls: 0 }), cancel.clone()));

        // First tick fires immediately
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert!(reader.latest().is_some());

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(reader.latest().is_none());

        cancel.cancel();
        task.await.unwrap();
    }
}
