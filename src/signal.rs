//! Binary signals for the loader's threads.
//!
//! Every signal created by one [`SignalHub`] shares a single mutex and
//! condition variable, which is what makes [`Signal::wait_either`] possible.

use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

/// What a successful wait does to the signal.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Reset {
    /// Stays set until [`Signal::reset`] is called. Used for gates.
    Manual,
    /// A successful wait clears the signal again. Used for wake-ups.
    Auto,
}

/// Which of two signals ended a [`Signal::wait_either`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Woken {
    First,
    Second,
}

struct Hub {
    /// One bit per signal.
    flags: Mutex<u32>,
    cond: Condvar,
}

impl Hub {
    fn flags(&self) -> MutexGuard<'_, u32> {
        self.flags.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Creates signals that can be waited on together.
pub struct SignalHub {
    hub: Arc<Hub>,
    next_bit: u32,
}

impl SignalHub {
    pub fn new() -> Self {
        SignalHub {
            hub: Arc::new(Hub {
                flags: Mutex::new(0),
                cond: Condvar::new(),
            }),
            next_bit: 0,
        }
    }

    /// Create a signal on this hub. A hub holds at most 32 signals.
    pub fn signal(&mut self, reset: Reset, initially_set: bool) -> Signal {
        assert!(self.next_bit < u32::BITS, "signal hub is full");
        let mask = 1u32 << self.next_bit;
        self.next_bit += 1;
        if initially_set {
            *self.hub.flags() |= mask;
        }
        Signal {
            hub: self.hub.clone(),
            mask,
            reset,
        }
    }
}

impl Default for SignalHub {
    fn default() -> Self {
        Self::new()
    }
}

pub struct Signal {
    hub: Arc<Hub>,
    mask: u32,
    reset: Reset,
}

impl Signal {
    pub fn set(&self) {
        let mut flags = self.hub.flags();
        *flags |= self.mask;
        self.hub.cond.notify_all();
    }

    pub fn reset(&self) {
        *self.hub.flags() &= !self.mask;
    }

    /// Peek at the state without consuming an auto-reset signal.
    pub fn is_set(&self) -> bool {
        *self.hub.flags() & self.mask != 0
    }

    /// Block until the signal is set.
    pub fn wait(&self) {
        let mut flags = self.hub.flags();
        while *flags & self.mask == 0 {
            flags = self
                .hub
                .cond
                .wait(flags)
                .unwrap_or_else(PoisonError::into_inner);
        }
        self.consume(&mut flags);
    }

    /// Block until the signal is set or `timeout` elapses. Returns whether it was set.
    pub fn wait_timeout(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut flags = self.hub.flags();
        while *flags & self.mask == 0 {
            let now = Instant::now();
            if now >= deadline {
                return false;
            }
            flags = self
                .hub
                .cond
                .wait_timeout(flags, deadline - now)
                .unwrap_or_else(PoisonError::into_inner)
                .0;
        }
        self.consume(&mut flags);
        true
    }

    /// Zero-timeout wait. Consumes an auto-reset signal if it was set.
    pub fn poll(&self) -> bool {
        self.wait_timeout(Duration::ZERO)
    }

    /// Block until either `self` or `other` is set. Both must come from the same hub.
    ///
    /// Only the signal that ended the wait is consumed; `self` wins a tie.
    pub fn wait_either(&self, other: &Signal) -> Woken {
        assert!(
            Arc::ptr_eq(&self.hub, &other.hub),
            "wait_either needs signals from one hub"
        );
        let mut flags = self.hub.flags();
        loop {
            if *flags & self.mask != 0 {
                self.consume(&mut flags);
                return Woken::First;
            }
            if *flags & other.mask != 0 {
                other.consume(&mut flags);
                return Woken::Second;
            }
            flags = self
                .hub
                .cond
                .wait(flags)
                .unwrap_or_else(PoisonError::into_inner);
        }
    }

    fn consume(&self, flags: &mut u32) {
        if self.reset == Reset::Auto {
            *flags &= !self.mask;
        }
    }
}
