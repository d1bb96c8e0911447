//! Per-message log sampling.

use std::time::{Duration, Instant};

use dashmap::DashMap;

const DEFAULT_INTERVAL: Duration = Duration::from_secs(1);
const DEFAULT_FIRST: u64 = 100;
const DEFAULT_THEREAFTER: u64 = 100;

/// Tracked messages before expired windows are swept.
const SWEEP_THRESHOLD: usize = 1024;

struct Window {
    started: Instant,
    seen: u64,
}

/// Within each interval, lets the first `first` occurrences of a message
/// through, then every `thereafter`-th one.
pub struct Sampler {
    interval: Duration,
    first: u64,
    thereafter: u64,
    windows: DashMap<String, Window>,
}

impl Sampler {
    /// Zero values fall back to 1s / 100 / 100.
    pub fn new(interval: Duration, first: u64, thereafter: u64) -> Self {
        Self {
            interval: if interval.is_zero() { DEFAULT_INTERVAL } else { interval },
            first: if first == 0 { DEFAULT_FIRST } else { first },
            thereafter: if thereafter == 0 { DEFAULT_THEREAFTER } else { thereafter },
            windows: DashMap::new(),
        }
    }

    pub fn allow(&self, message: &str) -> bool {
        self.allow_at(message, Instant::now())
    }

    fn allow_at(&self, message: &str, now: Instant) -> bool {
        if self.windows.len() >= SWEEP_THRESHOLD && !self.windows.contains_key(message) {
            self.sweep(now);
        }

        let mut window = self
            .windows
            .entry(message.to_string())
            .or_insert(Window { started: now, seen: 0 });

        if now.duration_since(window.started) >= self.interval {
            window.started = now;
            window.seen = 0;
        }
        window.seen += 1;

        let n = window.seen;
        n <= self.first || (n - self.first) % self.thereafter == 0
    }

    /// Drop expired windows; if every window is still live, start over.
    fn sweep(&self, now: Instant) {
        self.windows
            .retain(|_, window| now.duration_since(window.started) < self.interval);
        if self.windows.len() >= SWEEP_THRESHOLD {
            self.windows.clear();
        }
    }

    /// Messages with a live or not-yet-swept window.
    pub fn tracked(&self) -> usize {
        self.windows.len()
    }
}
