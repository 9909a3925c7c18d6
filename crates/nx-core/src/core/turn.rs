use std::sync::{Condvar, Mutex};
use std::time::Duration;

use crate::core::cancel::CancellationToken;
use crate::core::lock_unpoisoned;
use crate::{NxError, Result};

const CANCEL_POLL_INTERVAL: Duration = Duration::from_millis(20);

/// Ticket counter that serializes side effects across worker threads.
///
/// Each block holds a ticket equal to its index. Work that must happen in
/// index order waits until [`current`](Self::current) reaches the ticket,
/// runs, then calls [`advance`](Self::advance) to hand the turn on.
#[derive(Debug)]
pub struct TurnGate {
    current: Mutex<u32>,
    advanced: Condvar,
    cancellation: CancellationToken,
}

impl TurnGate {
    /// Creates a gate whose first turn is ticket 0.
    ///
    /// # Arguments
    /// * `cancellation` - Token that releases every waiter when cancelled
    pub fn new(cancellation: CancellationToken) -> Self {
        Self {
            current: Mutex::new(0),
            advanced: Condvar::new(),
            cancellation,
        }
    }

    /// Ticket whose turn it is now.
    pub fn current(&self) -> u32 {
        *lock_unpoisoned(&self.current)
    }

    pub fn cancellation(&self) -> &CancellationToken {
        &self.cancellation
    }

    /// Blocks until it is `ticket`'s turn.
    ///
    /// # Errors
    /// [`NxError::Cancelled`] once the gate's token is cancelled, and
    /// [`NxError::InvalidBlockId`] if the turn has already moved past `ticket`.
    pub fn wait_for_turn(&self, ticket: u32) -> Result<()> {
        let mut current = lock_unpoisoned(&self.current);
        loop {
            if *current == ticket {
                return Ok(());
            }
            if *current > ticket {
                return Err(NxError::InvalidBlockId {
                    expected: *current as u64,
                    actual: ticket as u64,
                });
            }
            self.cancellation.check()?;

            current = match self.advanced.wait_timeout(current, CANCEL_POLL_INTERVAL) {
                Ok((guard, _)) => guard,
                Err(poisoned) => poisoned.into_inner().0,
            };
        }
    }

    /// Ends the current turn and returns the ticket that just finished.
    pub fn advance(&self) -> u32 {
        let mut current = lock_unpoisoned(&self.current);
        let finished = *current;
        *current += 1;
        drop(current);
        self.advanced.notify_all();
        finished
    }

    /// Cancels the gate's token and wakes every waiter.
    pub fn cancel(&self) {
        self.cancellation.cancel();
        self.advanced.notify_all();
    }
}
