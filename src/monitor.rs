//! Inactivity monitoring.
//!
//! The interactive loop and the monitor thread share exactly one value: the
//! instant of the user's last activity, held in an [`ActivityClock`]. The
//! monitor polls it on a fixed interval and emits a nudge once the silence
//! reaches the threshold, then waits another full threshold before nudging
//! again.
//!
//! All timing uses [`Instant`], so wall-clock adjustments cannot shrink the
//! measured silence.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::mpsc::{self, RecvTimeoutError, Sender};
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use rand::SeedableRng;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;

use crate::config::MonitorConfig;
use crate::message::{ChatMessage, MessageSink};

/// Messages the monitor picks from, uniformly.
pub const NUDGES: &[&str] = &[
    "Ei, ainda está aí?",
    "Estou por aqui se quiser conversar!",
    "Tudo bem por aí?",
    "Quer me contar alguma coisa?",
];

// ---------------------------------------------------------------------------
// Shared clock
// ---------------------------------------------------------------------------

/// Last-activity timestamp shared between the session and the monitor.
///
/// Cloning yields another handle to the same timestamp.
#[derive(Debug, Clone)]
pub struct ActivityClock {
    last: Arc<Mutex<Instant>>,
}

impl ActivityClock {
    /// A clock whose last activity is now.
    pub fn new() -> Self {
        Self::starting_at(Instant::now())
    }

    pub fn starting_at(instant: Instant) -> Self {
        Self {
            last: Arc::new(Mutex::new(instant)),
        }
    }

    /// Record user activity now. Never moves the clock backwards.
    pub fn touch(&self) {
        let now = Instant::now();
        let mut last = self.lock();
        if now > *last {
            *last = now;
        }
    }

    /// Backdate the last activity by `silence`, as if the user went quiet.
    pub fn rewind(&self, silence: Duration) {
        let mut last = self.lock();
        if let Some(earlier) = last.checked_sub(silence) {
            *last = earlier;
        }
    }

    pub fn last_activity(&self) -> Instant {
        *self.lock()
    }

    /// Silence so far; zero if `last_activity` is somehow in the future.
    pub fn elapsed(&self) -> Duration {
        Instant::now().saturating_duration_since(self.last_activity())
    }

    fn lock(&self) -> MutexGuard<'_, Instant> {
        // An Instant cannot be left half-written, so a poisoned lock is still usable.
        self.last.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl Default for ActivityClock {
    fn default() -> Self {
        Self::new()
    }
}

// ---------------------------------------------------------------------------
// Nudge policy
// ---------------------------------------------------------------------------

/// Pure nudge decision, separated from the thread so it can be driven with
/// synthetic instants.
#[derive(Debug, Clone)]
pub struct NudgeTracker {
    threshold: Duration,
    last_nudge: Option<Instant>,
}

impl NudgeTracker {
    pub fn new(threshold: Duration) -> Self {
        Self {
            threshold,
            last_nudge: None,
        }
    }

    /// Decide whether to nudge at `now`.
    ///
    /// Silence is measured from the later of the last activity and the last
    /// nudge, so at most one nudge fires per threshold window.
    pub fn poll(&mut self, now: Instant, last_activity: Instant) -> bool {
        let since = match self.last_nudge {
            Some(nudge) if nudge > last_activity => nudge,
            _ => last_activity,
        };
        if now.saturating_duration_since(since) >= self.threshold {
            self.last_nudge = Some(now);
            true
        } else {
            false
        }
    }
}

// ---------------------------------------------------------------------------
// Background monitor
// ---------------------------------------------------------------------------

/// Background thread that nudges an idle user.
///
/// Each poll tick is a timed wait on a shutdown channel, so
/// [`InactivityMonitor::stop`] wakes the thread at once and joins it. Dropping
/// the monitor stops it too.
pub struct InactivityMonitor {
    handle: Option<JoinHandle<()>>,
    shutdown: Option<Sender<()>>,
    nudges: Arc<AtomicUsize>,
}

impl InactivityMonitor {
    /// Start polling `clock`, emitting nudges through `sink`.
    pub fn spawn(
        clock: ActivityClock,
        sink: Arc<dyn MessageSink>,
        config: &MonitorConfig,
        seed: Option<u64>,
    ) -> Self {
        Self::spawn_with(clock, sink, config.poll_interval(), config.threshold(), seed)
    }

    /// Like [`InactivityMonitor::spawn`] with explicit durations.
    pub fn spawn_with(
        clock: ActivityClock,
        sink: Arc<dyn MessageSink>,
        poll_interval: Duration,
        threshold: Duration,
        seed: Option<u64>,
    ) -> Self {
        let (shutdown, stop_rx) = mpsc::channel::<()>();
        let nudges = Arc::new(AtomicUsize::new(0));

        let counter = Arc::clone(&nudges);
        let handle = std::thread::Builder::new()
            .name("inactivity-monitor".into())
            .spawn(move || {
                let mut rng = match seed {
                    Some(seed) => StdRng::seed_from_u64(seed),
                    None => StdRng::from_entropy(),
                };
                let mut tracker = NudgeTracker::new(threshold);
                tracing::debug!(?poll_interval, ?threshold, "inactivity monitor started");
                // A message or a dropped sender both mean stop.
                while let Err(RecvTimeoutError::Timeout) = stop_rx.recv_timeout(poll_interval) {
                    if tracker.poll(Instant::now(), clock.last_activity()) {
                        let text = NUDGES.choose(&mut rng).copied().unwrap_or(NUDGES[0]);
                        sink.emit(&ChatMessage::nudge(text));
                        counter.fetch_add(1, Ordering::SeqCst);
                    }
                }
                tracing::debug!("inactivity monitor stopped");
            });

        let handle = match handle {
            Ok(handle) => Some(handle),
            Err(e) => {
                tracing::warn!("could not start inactivity monitor: {e}");
                None
            }
        };

        Self {
            handle,
            shutdown: Some(shutdown),
            nudges,
        }
    }

    /// Number of nudges emitted so far.
    pub fn nudge_count(&self) -> usize {
        self.nudges.load(Ordering::SeqCst)
    }

    pub fn is_running(&self) -> bool {
        self.handle.as_ref().is_some_and(|h| !h.is_finished())
    }

    /// Signal shutdown and wait for the thread to exit.
    pub fn stop(&mut self) {
        if let Some(shutdown) = self.shutdown.take() {
            // The thread may already be gone; a closed channel is fine.
            let _ = shutdown.send(());
        }
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                tracing::warn!("inactivity monitor thread panicked");
            }
        }
    }
}

impl std::fmt::Debug for InactivityMonitor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InactivityMonitor")
            .field("running", &self.is_running())
            .field("nudges", &self.nudge_count())
            .finish()
    }
}

impl Drop for InactivityMonitor {
    fn drop(&mut self) {
        self.stop();
    }
}
