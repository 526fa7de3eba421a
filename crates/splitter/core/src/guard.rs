use std::sync::atomic::{AtomicBool, Ordering};

use crate::error::{SplitterError, SplitterResult};

/// Non-reentrant guard wrapping every mutating entry point.
///
/// A call that arrives while another mutating call is still in flight,
/// including a callback from inside an outbound transfer, is rejected with
/// [`SplitterError::Reentrant`] rather than queued.
#[derive(Debug, Default)]
pub struct ReentrancyGuard {
    entered: AtomicBool,
}

impl ReentrancyGuard {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn enter(&self) -> SplitterResult<GuardScope<'_>> {
        self.entered
            .compare_exchange(false, true, Ordering::Acquire, Ordering::Relaxed)
            .map_err(|_| SplitterError::Reentrant)?;
        Ok(GuardScope { guard: self })
    }

    pub fn is_entered(&self) -> bool {
        self.entered.load(Ordering::Acquire)
    }
}

/// Held for the duration of one mutating call; releases the guard on drop,
/// including on early error returns.
#[derive(Debug)]
pub struct GuardScope<'a> {
    guard: &'a ReentrancyGuard,
}

impl Drop for GuardScope<'_> {
    fn drop(&mut self) {
        self.guard.entered.store(false, Ordering::Release);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn second_entry_is_rejected_until_scope_drops() {
        let guard = ReentrancyGuard::new();
        {
            let _scope = guard.enter().unwrap();
            assert!(guard.is_entered());
            assert_eq!(guard.enter().unwrap_err(), SplitterError::Reentrant);
        }
        assert!(!guard.is_entered());
        assert!(guard.enter().is_ok());
    }

    #[test]
    fn scope_released_on_early_return() {
        fn failing(guard: &ReentrancyGuard) -> SplitterResult<()> {
            let _scope = guard.enter()?;
            Err(SplitterError::Paused)
        }

        let guard = ReentrancyGuard::new();
        assert_eq!(failing(&guard), Err(SplitterError::Paused));
        assert!(!guard.is_entered());
    }
}
