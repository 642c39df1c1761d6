//! Shared time base for capture, playback and audio.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

/// Monotonic time source.
pub trait Clock: Send + Sync {
    /// Time elapsed since the clock's origin.
    fn now(&self) -> Duration;
}

pub type SharedClock = Arc<dyn Clock>;

/// Real monotonic clock, relative to its creation.
#[derive(Debug, Clone, Copy)]
pub struct MonotonicClock {
    origin: Instant,
}

impl MonotonicClock {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
        }
    }

    pub fn shared() -> SharedClock {
        Arc::new(Self::new())
    }
}

impl Default for MonotonicClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for MonotonicClock {
    fn now(&self) -> Duration {
        self.origin.elapsed()
    }
}

/// Clock that only moves when told to.
#[derive(Debug, Default)]
pub struct ManualClock {
    nanos: AtomicU64,
}

impl ManualClock {
    pub fn new() -> Self {
        Self::default()
    }

    /// Jump to `now`, pinned at `u64::MAX` nanoseconds.
    pub fn set(&self, now: Duration) {
        self.nanos.store(saturating_nanos(now), Ordering::SeqCst);
    }

    /// Move forward by `by`, saturating instead of wrapping.
    pub fn advance(&self, by: Duration) {
        let by = saturating_nanos(by);
        let _ = self
            .nanos
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |nanos| {
                Some(nanos.saturating_add(by))
            });
    }
}

fn saturating_nanos(duration: Duration) -> u64 {
    u64::try_from(duration.as_nanos()).unwrap_or(u64::MAX)
}

impl Clock for ManualClock {
    fn now(&self) -> Duration {
        Duration::from_nanos(self.nanos.load(Ordering::SeqCst))
    }
}

/// View of another clock running at `rate` times its speed.
pub struct ScaledClock {
    inner: SharedClock,
    rate: f64,
}

impl ScaledClock {
    pub fn new(inner: SharedClock, rate: f64) -> Self {
        Self { inner, rate }
    }
}

impl Clock for ScaledClock {
    fn now(&self) -> Duration {
        self.inner.now().mul_f64(self.rate)
    }
}

/// Start-of-session reference shared by the lights and the audio process.
#[derive(Debug, Clone, Copy)]
pub struct Anchor {
    /// Reading of the session clock at the anchor.
    pub at: Duration,
    /// Wall-clock time at the anchor.
    pub wall: SystemTime,
}

impl Anchor {
    pub fn capture(clock: &dyn Clock) -> Self {
        Self {
            at: clock.now(),
            wall: SystemTime::now(),
        }
    }

    /// Time since the anchor; zero if the clock reads earlier.
    pub fn elapsed(&self, clock: &dyn Clock) -> Duration {
        clock.now().saturating_sub(self.at)
    }

    /// Wall-clock anchor as fractional Unix seconds.
    pub fn unix_seconds(&self) -> f64 {
        self.wall
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs_f64())
            .unwrap_or(0.0)
    }
}
