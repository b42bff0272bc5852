//! Cooperative interruption
//!
//! The binary's signal handler triggers an [`Interrupt`]; the converge engine
//! checks it before dispatching each release. Releases already running are
//! left to finish.

use std::sync::Arc;
use std::sync::atomic::{AtomicU8, Ordering};

/// The termination signal that was received
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Signal {
    /// SIGINT
    Interrupt,
    /// SIGTERM
    Terminate,
}

impl Signal {
    fn encode(self) -> u8 {
        match self {
            Signal::Interrupt => 1,
            Signal::Terminate => 2,
        }
    }

    fn decode(raw: u8) -> Option<Self> {
        match raw {
            1 => Some(Signal::Interrupt),
            2 => Some(Signal::Terminate),
            _ => None,
        }
    }
}

/// Shared interruption flag; clones observe the same state
#[derive(Debug, Clone, Default)]
pub struct Interrupt {
    signal: Arc<AtomicU8>,
}

impl Interrupt {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a signal; the first one wins
    pub fn trigger(&self, signal: Signal) {
        let _ = self
            .signal
            .compare_exchange(0, signal.encode(), Ordering::SeqCst, Ordering::SeqCst);
    }

    pub fn is_triggered(&self) -> bool {
        self.signal().is_some()
    }

    /// The signal received, if any
    pub fn signal(&self) -> Option<Signal> {
        Signal::decode(self.signal.load(Ordering::SeqCst))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_signal_wins() {
        let interrupt = Interrupt::new();
        assert!(!interrupt.is_triggered());

        let handle = interrupt.clone();
        handle.trigger(Signal::Terminate);
        handle.trigger(Signal::Interrupt);

        assert!(interrupt.is_triggered());
        assert_eq!(interrupt.signal(), Some(Signal::Terminate));
    }
}
