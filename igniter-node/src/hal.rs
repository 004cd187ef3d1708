//! Traits for the hardware the runtime depends on
//!
//! A board support crate implements these for its timers, GPIO and reset controller. Host
//! implementations for simulation live in `igniter-sim`.

use core::time::Duration;

use crate::error::InitError;

/// A monotonic clock driving the cooperative dispatch loop
///
/// Both methods take `&self`, as the clock is read from within dispatched tasks while the loop
/// itself is idling on it.
pub trait Monotonic {
    /// Current time in microseconds since an arbitrary epoch
    fn now_us(&self) -> u64;

    /// Idle until `deadline_us`, or until an interrupt may have posted new work
    ///
    /// Returning early is always allowed; the dispatch loop re-checks its queue after every
    /// return. `None` means nothing is scheduled.
    fn wait_until(&self, deadline_us: Option<u64>);
}

/// A resettable elapsed-time source
pub trait ElapsedTimer: Send {
    /// Time since the last reset
    fn elapsed(&self) -> Duration;

    /// Restart the timer from zero
    fn reset(&mut self);
}

/// A periodic hardware interrupt source
///
/// The interrupt handler registered by the board must call
/// [`FastCadence::on_interrupt`](crate::FastCadence::on_interrupt).
pub trait Ticker {
    /// Start firing the interrupt every `period`
    fn attach(&mut self, period: Duration);

    /// Stop firing the interrupt
    ///
    /// After this returns, no further interrupt will be raised until the next attach.
    fn detach(&mut self);
}

/// A digital output driving the actuator
pub trait DigitalOutput {
    /// Drive the output active (true) or inactive (false)
    fn set(&mut self, active: bool);
}

/// System level control
pub trait SystemControl {
    /// Perform a full hardware reset. Does not return.
    fn system_reset(&mut self) -> !;

    /// Stop with a fatal initialization error. Does not return.
    fn halt(&mut self, error: &InitError) -> !;
}

/// The hardware types of a board
///
/// Usually implemented on a zero sized marker type by the board support code.
pub trait Board {
    /// Clock for the dispatch loop
    type Clock: Monotonic;
    /// Interrupt source for the fast cadence
    type Ticker: Ticker;
    /// Elapsed-time timers, one for each cadence
    type Timer: ElapsedTimer + 'static;
    /// The actuator output
    type Output: DigitalOutput;
    /// Reset and halt control
    type System: SystemControl;
}

/// The hardware handles owned by a [`Runtime`](crate::Runtime)
///
/// The timer driving the fast cadence is not part of this set, it is owned by the
/// [`FastCadence`](crate::FastCadence) so that it is accessible in the interrupt.
#[allow(missing_debug_implementations)]
pub struct Peripherals<B: Board> {
    /// Clock for the dispatch loop
    pub clock: B::Clock,
    /// Interrupt source for the fast cadence
    pub ticker: B::Ticker,
    /// Elapsed-time timer for the full stack cadence
    pub full_timer: B::Timer,
    /// The actuator output
    pub output: B::Output,
    /// Reset and halt control
    pub system: B::System,
}
