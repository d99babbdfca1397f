use parking_lot::{Condvar, Mutex};
use std::time::{Duration, Instant};

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum CollectorError {
    #[error("A reply collection is already in progress")]
    Busy,

    #[error("Timed out after {received} of {expected} reply lines")]
    Timeout { received: usize, expected: usize },

    #[error("Reply collection was cancelled")]
    Cancelled,
}

#[derive(Debug)]
enum State {
    Idle,
    Armed { expected: usize, lines: Vec<String> },
    Complete(Vec<String>),
    Cancelled,
}

/// One-shot mailbox turning the incoming line stream into a synchronous
/// "send a query, get exactly K lines back" call.
///
/// The query issuer arms it and waits; the reader thread offers every line it
/// receives. Only one collection can be armed at a time.
#[derive(Debug)]
pub struct ResponseCollector {
    state: Mutex<State>,
    changed: Condvar,
}

impl ResponseCollector {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(State::Idle),
            changed: Condvar::new(),
        }
    }

    /// Capture the next `expected` lines. Arming for zero lines leaves the
    /// collector idle.
    ///
    /// Refused until the previous collection has been taken by its waiter,
    /// including a completed or cancelled one.
    pub fn arm(&self, expected: usize) -> Result<(), CollectorError> {
        let mut state = self.state.lock();
        if !matches!(*state, State::Idle) {
            return Err(CollectorError::Busy);
        }
        *state = if expected == 0 {
            State::Idle
        } else {
            State::Armed {
                expected,
                lines: Vec::with_capacity(expected),
            }
        };
        Ok(())
    }

    /// Offer a received line. Returns `true` when it completed the collection.
    pub fn offer(&self, line: &str) -> bool {
        let mut state = self.state.lock();
        let State::Armed { expected, lines } = &mut *state else {
            return false;
        };
        lines.push(line.to_string());
        if lines.len() < *expected {
            return false;
        }

        let lines = std::mem::take(lines);
        *state = State::Complete(lines);
        self.changed.notify_all();
        true
    }

    /// Block until the armed collection completes, then hand back its lines in
    /// arrival order. The collector is idle again afterwards, whatever the
    /// outcome.
    pub fn wait_complete(&self, timeout: Duration) -> Result<Vec<String>, CollectorError> {
        let deadline = Instant::now() + timeout;
        let mut state = self.state.lock();
        loop {
            match std::mem::replace(&mut *state, State::Idle) {
                State::Complete(lines) => return Ok(lines),
                State::Cancelled | State::Idle => return Err(CollectorError::Cancelled),
                armed @ State::Armed { .. } => *state = armed,
            }

            if self.changed.wait_until(&mut state, deadline).timed_out() {
                if let State::Armed { expected, lines } = &*state {
                    let err = CollectorError::Timeout {
                        received: lines.len(),
                        expected: *expected,
                    };
                    *state = State::Idle;
                    return Err(err);
                }
                // Completed right at the deadline; the next pass takes the result.
            }
        }
    }

    /// Abort an armed collection and wake its waiter.
    pub fn cancel(&self) {
        let mut state = self.state.lock();
        if matches!(*state, State::Armed { .. }) {
            *state = State::Cancelled;
            self.changed.notify_all();
        }
    }

    /// Drop an armed collection nobody is waiting on.
    pub fn disarm(&self) {
        *self.state.lock() = State::Idle;
    }

    pub fn is_armed(&self) -> bool {
        matches!(*self.state.lock(), State::Armed { .. })
    }
}

impl Default for ResponseCollector {
    fn default() -> Self {
        Self::new()
    }
}
