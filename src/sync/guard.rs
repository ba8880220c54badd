use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Process-wide "a sync is running" cell.
///
/// The only way in is [`SingleFlight::try_begin`], which flips the flag with a
/// compare-and-swap; the only way out is dropping the returned [`RunGuard`].
#[derive(Debug, Clone, Default)]
pub struct SingleFlight {
    running: Arc<AtomicBool>,
}

impl SingleFlight {
    pub fn new() -> Self {
        Self::default()
    }

    /// Claim the flag. `None` means another run holds it.
    pub fn try_begin(&self) -> Option<RunGuard> {
        self.running
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| RunGuard {
                running: Arc::clone(&self.running),
            })
    }
}

/// Held for the duration of one run. Releases the flag on drop, including
/// on early returns, errors, panics and cancelled futures.
#[derive(Debug)]
#[must_use = "the run ends as soon as the guard is dropped"]
pub struct RunGuard {
    running: Arc<AtomicBool>,
}

impl RunGuard {
    /// Release explicitly.
    pub fn end(self) {}
}

impl Drop for RunGuard {
    fn drop(&mut self) {
        self.running.store(false, Ordering::Release);
    }
}
