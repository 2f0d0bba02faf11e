//! Scoped timers for profiling compiler phases.

use std::time::Instant;

/// Times a phase from construction to drop and logs the result.
///
/// ```
/// use opal_common::timing::ScopeTimer;
///
/// let _timer = ScopeTimer::new("register allocation");
/// // ... work ...
/// ```
pub struct ScopeTimer {
    task: &'static str,
    start: Instant,
}

impl ScopeTimer {
    pub fn new(task: &'static str) -> Self {
        Self {
            task,
            start: Instant::now(),
        }
    }
}

impl Drop for ScopeTimer {
    fn drop(&mut self) {
        log::debug!("{} took {:?}", self.task, self.start.elapsed());
    }
}
