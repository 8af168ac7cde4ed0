use std::sync::atomic::{AtomicBool, Ordering};

/// Logs a component's degradation exactly once per outage window, instead of
/// once per failed call (spec §4.4, §9 "Multi-provider fallback chain").
///
/// A persistent failure flips the flag and emits one `warn!`; `reset()`
/// clears it once the component is observed healthy again so the next
/// outage is logged too.
#[derive(Debug, Default)]
pub struct OnceFlag(AtomicBool);

impl OnceFlag {
    pub const fn new() -> Self {
        Self(AtomicBool::new(false))
    }

    /// Returns `true` the first time this is called after construction or
    /// the last `reset()`; `false` on every subsequent call.
    pub fn fire(&self) -> bool {
        self.0
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
    }

    pub fn reset(&self) {
        self.0.store(false, Ordering::SeqCst);
    }

    pub fn is_set(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fires_once_then_suppresses() {
        let flag = OnceFlag::new();
        assert!(flag.fire());
        assert!(!flag.fire());
        assert!(!flag.fire());
        flag.reset();
        assert!(flag.fire());
    }
}
