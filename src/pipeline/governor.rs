use tracing::{debug, warn};

pub const DEFAULT_THREADS: usize = 10;
pub const SAFE_THREAD_CAP: usize = 25;

/// Bound a requested worker count by the hard cap and, when the amount of
/// work is known (`work_size > 0`), by the amount of work.
///
/// The result is always at least 1 and never larger than `requested`.
pub fn clamp(requested: usize, hard_cap: usize, work_size: usize) -> usize {
    let requested = requested.max(1);
    let cap = hard_cap.max(1);
    let mut threads = requested;
    if threads > cap {
        warn!(requested, cap, "Number of threads is too high, using the safe maximum");
        threads = cap;
    }
    if work_size > 0 && threads > work_size {
        debug!(threads, work_size, "Reducing threads to the amount of work");
        threads = work_size;
    }
    threads
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ThreadGovernor {
    pub default_threads: usize,
    pub hard_cap: usize,
}

impl Default for ThreadGovernor {
    fn default() -> Self {
        Self {
            default_threads: DEFAULT_THREADS,
            hard_cap: SAFE_THREAD_CAP,
        }
    }
}

impl ThreadGovernor {
    /// Resolve a raw `--threads` value. Missing or unparsable input falls back
    /// to the default; zero and negative values become 1.
    pub fn resolve(&self, requested: Option<&str>) -> usize {
        let parsed = requested.and_then(|r| r.trim().parse::<i64>().ok());
        let threads = match parsed {
            Some(n) if n < 1 => 1,
            Some(n) => usize::try_from(n).unwrap_or(usize::MAX),
            None => {
                if let Some(raw) = requested {
                    warn!(value = raw, default = self.default_threads, "Invalid thread count, using default");
                }
                self.default_threads
            }
        };
        clamp(threads, self.hard_cap, 0)
    }

    pub fn clamp(&self, requested: usize, work_size: usize) -> usize {
        clamp(requested, self.hard_cap, work_size)
    }
}
