//! Fixed-window brute-force counters, one per source address.
//!
//! The caller checks admission *before* validating a code: a source at its
//! limit is turned away without the code ever being derived, so a correct
//! guess cannot be used to probe or escape an exhausted window.

use std::collections::HashMap;
use std::net::IpAddr;

/// Attempt count and window anchor for one source.
#[derive(Debug, Clone, Copy)]
struct RateWindow {
    attempts: u32,
    window_start: u64,
}

/// Counts verification attempts per source inside a fixed window.
///
/// Entries are retained for the process lifetime; there is no eviction.
#[derive(Debug)]
pub struct AttemptTracker {
    windows: HashMap<IpAddr, RateWindow>,
    max_attempts: u32,
    window_secs: u64,
}

impl AttemptTracker {
    /// Create a tracker admitting `max_attempts` per `window_secs` window.
    pub fn new(max_attempts: u32, window_secs: u64) -> Self {
        Self {
            windows: HashMap::new(),
            max_attempts,
            window_secs,
        }
    }

    /// Admit or reject one attempt from `source` at `now_secs`.
    ///
    /// A window that has fully elapsed is reset and re-anchored at
    /// `now_secs`. Admission increments the counter; rejection leaves the
    /// window untouched.
    pub fn try_attempt(&mut self, source: IpAddr, now_secs: u64) -> bool {
        let window = self.windows.entry(source).or_insert(RateWindow {
            attempts: 0,
            window_start: now_secs,
        });

        if now_secs.saturating_sub(window.window_start) > self.window_secs {
            window.attempts = 0;
            window.window_start = now_secs;
        }

        if window.attempts >= self.max_attempts {
            return false;
        }
        window.attempts += 1;
        true
    }

    /// Forget every window. Called on secret rotation.
    pub fn clear(&mut self) {
        self.windows.clear();
    }

    /// Number of sources currently tracked.
    pub fn tracked_sources(&self) -> usize {
        self.windows.len()
    }
}
