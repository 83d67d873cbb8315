//! Turns triggers into at most one alert session at a time.

use super::detection::TriggerType;
use super::MonitorContext;
use async_trait::async_trait;
use log::{debug, info, warn};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::{mpsc, OwnedSemaphorePermit, Semaphore};
use tokio_util::sync::CancellationToken;

/// Work performed for one accepted trigger
#[async_trait]
pub trait CaptureRunner: Send + Sync {
    async fn run(&self, trigger: TriggerType, context: &MonitorContext);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CoordinatorState {
    Idle,
    Capturing,
}

/// A one-slot lock that is only ever taken without waiting.
///
/// The slot is tied to a [`FlightGuard`]; dropping the guard (normal
/// return, panic unwind or task abort) frees the slot exactly once.
#[derive(Debug, Clone)]
pub struct SingleFlight {
    slot: Arc<Semaphore>,
    releases: Arc<AtomicU64>,
}

#[derive(Debug)]
pub struct FlightGuard {
    _permit: OwnedSemaphorePermit,
    releases: Arc<AtomicU64>,
}

impl Drop for FlightGuard {
    fn drop(&mut self) {
        self.releases.fetch_add(1, Ordering::SeqCst);
    }
}

impl Default for SingleFlight {
    fn default() -> Self {
        Self::new()
    }
}

impl SingleFlight {
    pub fn new() -> Self {
        Self {
            slot: Arc::new(Semaphore::new(1)),
            releases: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Take the slot if it is free; never waits
    pub fn try_acquire(&self) -> Option<FlightGuard> {
        Arc::clone(&self.slot).try_acquire_owned().ok().map(|permit| FlightGuard {
            _permit: permit,
            releases: Arc::clone(&self.releases),
        })
    }

    pub fn is_held(&self) -> bool {
        self.slot.available_permits() == 0
    }

    /// Resolve once the slot is free
    pub async fn wait_released(&self) {
        // The semaphore is never closed
        if let Ok(permit) = self.slot.acquire().await {
            drop(permit);
        }
    }

    pub fn releases(&self) -> u64 {
        self.releases.load(Ordering::SeqCst)
    }
}

/// Consumes triggers and runs capture sessions one at a time.
///
/// A trigger that arrives while a session is running is dropped, not
/// queued.
pub struct AlertSessionCoordinator {
    runner: Arc<dyn CaptureRunner>,
    context: MonitorContext,
    flight: SingleFlight,
    sessions_started: AtomicU64,
    triggers_ignored: AtomicU64,
}

impl AlertSessionCoordinator {
    pub fn new(runner: Arc<dyn CaptureRunner>, context: MonitorContext) -> Self {
        Self {
            runner,
            context,
            flight: SingleFlight::new(),
            sessions_started: AtomicU64::new(0),
            triggers_ignored: AtomicU64::new(0),
        }
    }

    pub fn state(&self) -> CoordinatorState {
        if self.flight.is_held() {
            CoordinatorState::Capturing
        } else {
            CoordinatorState::Idle
        }
    }

    /// Start a session for `trigger` unless one is already running.
    /// Returns whether a session was started.
    pub fn on_trigger_received(&self, trigger: TriggerType) -> bool {
        let Some(guard) = self.flight.try_acquire() else {
            self.triggers_ignored.fetch_add(1, Ordering::Relaxed);
            debug!("Ignoring {} trigger, capture already in progress", trigger);
            return false;
        };

        self.sessions_started.fetch_add(1, Ordering::Relaxed);
        info!("{} trigger accepted for user {}", trigger, self.context.user_id);

        let runner = Arc::clone(&self.runner);
        let context = self.context.clone();
        tokio::spawn(async move {
            let _guard = guard;
            runner.run(trigger, &context).await;
        });

        true
    }

    /// Resolve once no session is running
    pub async fn wait_idle(&self) {
        self.flight.wait_released().await;
    }

    pub fn sessions_started(&self) -> u64 {
        self.sessions_started.load(Ordering::Relaxed)
    }

    pub fn triggers_ignored(&self) -> u64 {
        self.triggers_ignored.load(Ordering::Relaxed)
    }

    /// Number of times the capture slot has been released
    pub fn sessions_finished(&self) -> u64 {
        self.flight.releases()
    }

    /// Drain `triggers` until cancelled or all senders are gone
    pub async fn run(self: Arc<Self>, mut triggers: mpsc::Receiver<TriggerType>, cancel: CancellationToken) {
        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                trigger = triggers.recv() => match trigger {
                    Some(trigger) => {
                        self.on_trigger_received(trigger);
                    }
                    None => {
                        warn!("Trigger channel closed");
                        break;
                    }
                },
            }
        }
        debug!(
            "Coordinator stopped: {} sessions, {} triggers ignored",
            self.sessions_started(),
            self.triggers_ignored()
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    /// Tracks how many runs overlap
    #[derive(Default)]
    struct CountingRunner {
        active: AtomicU64,
        max_active: AtomicU64,
        runs: AtomicU64,
    }

    #[async_trait]
    impl CaptureRunner for CountingRunner {
        async fn run(&self, _trigger: TriggerType, _context: &MonitorContext) {
            let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_active.fetch_max(now, Ordering::SeqCst);
            self.runs.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_secs(10)).await;
            self.active.fetch_sub(1, Ordering::SeqCst);
        }
    }

    struct PanickingRunner;

    #[async_trait]
    impl CaptureRunner for PanickingRunner {
        async fn run(&self, _trigger: TriggerType, _context: &MonitorContext) {
            tokio::time::sleep(Duration::from_millis(50)).await;
            panic!("camera exploded");
        }
    }

    fn coordinator(runner: Arc<dyn CaptureRunner>) -> AlertSessionCoordinator {
        AlertSessionCoordinator::new(runner, MonitorContext { user_id: 1 })
    }

    #[test]
    fn single_flight_guard_frees_on_drop() {
        let flight = SingleFlight::new();
        let guard = flight.try_acquire().unwrap();
        assert!(flight.is_held());
        assert!(flight.try_acquire().is_none());

        drop(guard);
        assert!(!flight.is_held());
        assert_eq!(flight.releases(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn triggers_during_capture_are_dropped() {
        let runner = Arc::new(CountingRunner::default());
        let coordinator = coordinator(runner.clone());

        assert!(coordinator.on_trigger_received(TriggerType::Fire));
        assert_eq!(coordinator.state(), CoordinatorState::Capturing);

        for _ in 0..5 {
            tokio::time::sleep(Duration::from_millis(200)).await;
            assert!(!coordinator.on_trigger_received(TriggerType::Fall));
        }

        coordinator.wait_idle().await;
        assert_eq!(coordinator.state(), CoordinatorState::Idle);
        assert_eq!(runner.runs.load(Ordering::SeqCst), 1);
        assert_eq!(runner.max_active.load(Ordering::SeqCst), 1);
        assert_eq!(coordinator.triggers_ignored(), 5);
    }

    #[tokio::test(start_paused = true)]
    async fn panicking_session_still_frees_the_slot() {
        let coordinator = coordinator(Arc::new(PanickingRunner));

        assert!(coordinator.on_trigger_received(TriggerType::Fire));
        coordinator.wait_idle().await;

        assert_eq!(coordinator.state(), CoordinatorState::Idle);
        assert_eq!(coordinator.sessions_finished(), 1);

        // Later triggers are still honoured
        assert!(coordinator.on_trigger_received(TriggerType::Fire));
        coordinator.wait_idle().await;
        assert_eq!(coordinator.sessions_started(), 2);
        assert_eq!(coordinator.sessions_finished(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn run_loop_consumes_channel() {
        let runner = Arc::new(CountingRunner::default());
        let coordinator = Arc::new(coordinator(runner.clone()));
        let (tx, rx) = mpsc::channel(8);
        let cancel = CancellationToken::new();
        let task = tokio::spawn(Arc::clone(&coordinator).run(rx, cancel.clone()));

        tx.send(TriggerType::Fire).await.unwrap();
        tx.send(TriggerType::Fire).await.unwrap();
        tokio::time::sleep(Duration::from_millis(10)).await;

        assert_eq!(coordinator.sessions_started(), 1);
        assert_eq!(coordinator.triggers_ignored(), 1);

        coordinator.wait_idle().await;
        tx.send(TriggerType::Fall).await.unwrap();
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(coordinator.sessions_started(), 2);

        cancel.cancel();
        task.await.unwrap();
        coordinator.wait_idle().await;
        assert_eq!(runner.runs.load(Ordering::SeqCst), 2);
    }
}
