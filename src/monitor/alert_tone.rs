use log::debug;
use std::time::Duration;
use tokio::io::AsyncWriteExt;

/// One beep within an alert pattern
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ToneBurst {
    /// Start, relative to the beginning of the pattern
    pub offset: Duration,
    pub duration: Duration,
    pub frequency_hz: u32,
}

const fn burst(offset_ms: u64) -> ToneBurst {
    ToneBurst {
        offset: Duration::from_millis(offset_ms),
        duration: Duration::from_millis(100),
        frequency_hz: 880,
    }
}

/// Two triplets of short 880 Hz beeps
pub const ALERT_PATTERN: [ToneBurst; 6] = [burst(0), burst(200), burst(400), burst(1000), burst(1200), burst(1400)];

/// Audible cue played when an alert session starts.
///
/// Playing must not block the caller.
pub trait AlertTone: Send + Sync {
    fn play(&self, pattern: &'static [ToneBurst]);
}

/// Rings the terminal bell once per burst
pub struct TerminalBell;

impl AlertTone for TerminalBell {
    fn play(&self, pattern: &'static [ToneBurst]) {
        tokio::spawn(async move {
            let started = tokio::time::Instant::now();
            let mut stderr = tokio::io::stderr();
            for burst in pattern {
                tokio::time::sleep_until(started + burst.offset).await;
                if let Err(e) = stderr.write_all(b"\x07").await {
                    debug!("Alert tone unavailable: {}", e);
                    return;
                }
                let _ = stderr.flush().await;
            }
        });
    }
}

pub struct Silent;

impl AlertTone for Silent {
    fn play(&self, _pattern: &'static [ToneBurst]) {}
}
