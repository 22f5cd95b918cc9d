// SPDX-License-Identifier: MIT
// Copyright (c) 2026 ADNT Sarl <info@adnt.io>

//! Bounded polling.
//!
//! Every wait on external hardware goes through a [`Poller`]: a fixed number
//! of attempts spaced by a delay, optionally cut short by a [`CancelToken`].
//! Nothing in this crate spins without a bound.

use core::fmt;
use core::sync::atomic::{AtomicBool, Ordering};

use embedded_hal::delay::DelayNs;

/// How long a wait may last: `attempts` re-checks, `interval_us` apart.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct PollBudget {
    pub attempts: u32,
    pub interval_us: u32,
}

impl PollBudget {
    pub const fn new(attempts: u32, interval_us: u32) -> Self {
        Self {
            attempts,
            interval_us,
        }
    }

    /// Upper bound of the wait in microseconds.
    pub const fn max_wait_us(&self) -> u64 {
        self.attempts as u64 * self.interval_us as u64
    }
}

/// Cancellation flag shared with an interrupt handler or another context.
#[derive(Debug, Default)]
pub struct CancelToken(AtomicBool);

impl CancelToken {
    pub const fn new() -> Self {
        Self(AtomicBool::new(false))
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Release);
    }

    pub fn clear(&self) {
        self.0.store(false, Ordering::Release);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum PollError {
    /// The budget ran out before the condition held.
    TimedOut,
    /// The cancel token was raised while waiting.
    Cancelled,
}

impl fmt::Display for PollError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PollError::TimedOut => write!(f, "timed out"),
            PollError::Cancelled => write!(f, "cancelled"),
        }
    }
}

#[cfg(feature = "std")]
impl std::error::Error for PollError {}

/// Attempt counter for one bounded wait.
///
/// ```ignore
/// let mut poller = Poller::new(budget, cancel);
/// while !ready() {
///     poller.tick(&mut delay)?;
/// }
/// ```
#[derive(Debug)]
pub struct Poller<'a> {
    budget: PollBudget,
    cancel: Option<&'a CancelToken>,
    used: u32,
}

impl<'a> Poller<'a> {
    pub fn new(budget: PollBudget, cancel: Option<&'a CancelToken>) -> Self {
        Self {
            budget,
            cancel,
            used: 0,
        }
    }

    /// Consume one attempt and wait one interval.
    ///
    /// Returns an error instead of waiting once the budget is spent or the
    /// token has been raised.
    pub fn tick<D: DelayNs>(&mut self, delay: &mut D) -> Result<(), PollError> {
        if self.cancel.is_some_and(CancelToken::is_cancelled) {
            return Err(PollError::Cancelled);
        }
        if self.used >= self.budget.attempts {
            return Err(PollError::TimedOut);
        }
        self.used += 1;
        if self.budget.interval_us > 0 {
            delay.delay_us(self.budget.interval_us);
        }
        Ok(())
    }

    /// Attempts consumed so far.
    pub fn used(&self) -> u32 {
        self.used
    }
}

/// Wait until `ready` returns true, within `budget`.
///
/// Returns the number of attempts it took.
pub fn poll_until<D: DelayNs>(
    delay: &mut D,
    budget: PollBudget,
    cancel: Option<&CancelToken>,
    mut ready: impl FnMut() -> bool,
) -> Result<u32, PollError> {
    let mut poller = Poller::new(budget, cancel);
    while !ready() {
        poller.tick(delay)?;
    }
    Ok(poller.used())
}
