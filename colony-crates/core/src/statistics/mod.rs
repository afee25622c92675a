//! Accounting of constraint checks.
//!
//! DCOP algorithms are compared by the number of utility-table lookups they
//! perform rather than by wall-clock time. Every operation that reads a raw
//! utility cell reports here, through a [`CheckCounter`] handle attached to
//! the table being read.

use std::cell::Cell;
use std::rc::Rc;

/// A shared accumulator for constraint checks.
///
/// The counter is an explicit handle rather than ambient state: algorithms
/// create one, attach clones of it to the spaces whose lookups should be
/// accounted for, and read the total when they are done. Cloning is cheap
/// and all clones share the same count.
///
/// The algebra is single-threaded (each agent owns its spaces), so the
/// counter is deliberately not thread-safe.
#[derive(Clone, Debug, Default)]
pub struct CheckCounter {
    count: Rc<Cell<u64>>,
}

impl CheckCounter {
    /// Creates a counter starting at zero.
    pub fn new() -> CheckCounter {
        CheckCounter::default()
    }

    /// Records `increment` additional constraint checks.
    pub fn increment(&self, increment: u64) {
        self.count.set(self.count.get() + increment);
    }

    /// The number of constraint checks recorded so far.
    pub fn count(&self) -> u64 {
        self.count.get()
    }

    /// Resets the count to zero.
    pub fn reset(&self) {
        self.count.set(0);
    }
}
