//! Simulated time sources
//!
//! [`VirtualClock`] runs the node in virtual time: idling jumps straight to the next deadline, and
//! the periodic interrupt is raised in between at exact period boundaries. This makes runs
//! deterministic, and seconds of node time take milliseconds to simulate.
//!
//! [`StdClock`] and [`ThreadTicker`] run the node in real time on a host.

use std::{
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc, Mutex,
    },
    thread::JoinHandle,
    time::{Duration, Instant},
};

use igniter_node::hal::{ElapsedTimer, Monotonic, Ticker};

use crate::stack::{Event, Journal};

/// An interrupt handler
pub type Isr = &'static (dyn Fn() + Send + Sync);

/// A clock usable by the simulated stack and peripherals
pub trait SimClock: Monotonic + Clone + Send + Sync + 'static {
    /// Consume `duration` of processing time
    fn spend(&self, duration: Duration);
}

#[derive(Clone, Copy)]
struct TickerState {
    period_us: u64,
    next_us: u64,
    isr: Isr,
}

#[derive(Default)]
struct ClockState {
    now_us: u64,
    ticker: Option<TickerState>,
}

/// A deterministic virtual clock
#[derive(Clone, Default)]
pub struct VirtualClock {
    state: Arc<Mutex<ClockState>>,
}

impl core::fmt::Debug for VirtualClock {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("VirtualClock")
            .field("now_us", &self.now_us())
            .finish()
    }
}

impl VirtualClock {
    /// Create a new clock at time zero
    pub fn new() -> Self {
        Self::default()
    }

    fn start_ticker(&self, period: Duration, isr: Isr) {
        let mut state = self.state.lock().unwrap();
        let period_us = (period.as_micros() as u64).max(1);
        let next_us = state.now_us + period_us;
        state.ticker = Some(TickerState {
            period_us,
            next_us,
            isr,
        });
    }

    fn stop_ticker(&self) {
        self.state.lock().unwrap().ticker = None;
    }

    /// Returns true while a ticker is running
    pub fn ticker_running(&self) -> bool {
        self.state.lock().unwrap().ticker.is_some()
    }

    /// Take the next step towards `target_us`
    ///
    /// Returns true if the step stopped at an interrupt, false once the target is reached.
    fn step(&self, target_us: u64) -> bool {
        let isr = {
            let mut guard = self.state.lock().unwrap();
            let state = &mut *guard;
            match &mut state.ticker {
                Some(ticker) if ticker.next_us <= target_us => {
                    state.now_us = state.now_us.max(ticker.next_us);
                    ticker.next_us += ticker.period_us;
                    ticker.isr
                }
                _ => {
                    state.now_us = state.now_us.max(target_us);
                    return false;
                }
            }
        };
        // The handler runs without the clock lock, so it may read the time
        isr();
        true
    }

    /// Advance to `target_us`, raising every interrupt due on the way
    pub fn advance_to(&self, target_us: u64) {
        while self.step(target_us) {}
    }

    /// Advance by `duration`
    pub fn advance(&self, duration: Duration) {
        self.advance_to(self.now_us() + duration.as_micros() as u64);
    }
}

impl Monotonic for VirtualClock {
    fn now_us(&self) -> u64 {
        self.state.lock().unwrap().now_us
    }

    /// Jump to the deadline, or return right after the next interrupt
    fn wait_until(&self, deadline_us: Option<u64>) {
        let target_us = match deadline_us {
            Some(deadline) => deadline,
            None => {
                let next = self.state.lock().unwrap().ticker.map(|t| t.next_us);
                next.expect("Simulated node idled with nothing scheduled and no ticker running")
            }
        };
        self.step(target_us);
    }
}

impl SimClock for VirtualClock {
    fn spend(&self, duration: Duration) {
        self.advance(duration);
    }
}

/// A wall clock for running in real time
#[derive(Clone, Copy, Debug)]
pub struct StdClock {
    epoch: Instant,
}

impl Default for StdClock {
    fn default() -> Self {
        Self::new()
    }
}

impl StdClock {
    /// Longest single idle. Work may be posted from other threads at any time.
    const MAX_IDLE: Duration = Duration::from_millis(1);

    /// Create a new clock, with its epoch now
    pub fn new() -> Self {
        Self {
            epoch: Instant::now(),
        }
    }
}

impl Monotonic for StdClock {
    fn now_us(&self) -> u64 {
        self.epoch.elapsed().as_micros() as u64
    }

    fn wait_until(&self, deadline_us: Option<u64>) {
        let idle = match deadline_us {
            Some(deadline) => Duration::from_micros(deadline.saturating_sub(self.now_us())),
            None => Self::MAX_IDLE,
        };
        std::thread::sleep(idle.min(Self::MAX_IDLE));
    }
}

impl SimClock for StdClock {
    fn spend(&self, duration: Duration) {
        std::thread::sleep(duration);
    }
}

/// An elapsed-time timer reading a [`SimClock`]
#[derive(Clone, Debug)]
pub struct SimTimer<C> {
    clock: C,
    start_us: u64,
}

impl<C: SimClock> SimTimer<C> {
    /// Create a timer, started now
    pub fn new(clock: C) -> Self {
        let start_us = clock.now_us();
        Self { clock, start_us }
    }
}

impl<C: SimClock> ElapsedTimer for SimTimer<C> {
    fn elapsed(&self) -> Duration {
        Duration::from_micros(self.clock.now_us().saturating_sub(self.start_us))
    }

    fn reset(&mut self) {
        self.start_us = self.clock.now_us();
    }
}

/// A periodic interrupt raised by a [`VirtualClock`]
#[allow(missing_debug_implementations)]
pub struct SimTicker {
    clock: VirtualClock,
    isr: Isr,
    journal: Journal,
}

impl SimTicker {
    /// Create a ticker which runs `isr` on each period
    pub fn new(clock: VirtualClock, isr: Isr, journal: Journal) -> Self {
        Self {
            clock,
            isr,
            journal,
        }
    }
}

impl Ticker for SimTicker {
    fn attach(&mut self, period: Duration) {
        self.journal
            .push(self.clock.now_us(), Event::TickerAttached(period));
        self.clock.start_ticker(period, self.isr);
    }

    fn detach(&mut self) {
        self.clock.stop_ticker();
        self.journal.push(self.clock.now_us(), Event::TickerDetached);
    }
}

/// A periodic interrupt emulated by a host thread
#[allow(missing_debug_implementations)]
pub struct ThreadTicker {
    isr: Isr,
    running: Option<(Arc<AtomicBool>, JoinHandle<()>)>,
}

impl ThreadTicker {
    /// Create a ticker which runs `isr` on each period
    pub fn new(isr: Isr) -> Self {
        Self { isr, running: None }
    }
}

impl Ticker for ThreadTicker {
    fn attach(&mut self, period: Duration) {
        self.detach();
        let stop = Arc::new(AtomicBool::new(false));
        let isr = self.isr;
        let handle = std::thread::spawn({
            let stop = stop.clone();
            move || {
                let mut next = Instant::now() + period;
                while !stop.load(Ordering::Relaxed) {
                    std::thread::sleep(next.saturating_duration_since(Instant::now()));
                    if stop.load(Ordering::Relaxed) {
                        break;
                    }
                    isr();
                    next += period;
                }
            }
        });
        self.running = Some((stop, handle));
    }

    fn detach(&mut self) {
        if let Some((stop, handle)) = self.running.take() {
            stop.store(true, Ordering::Relaxed);
            if handle.join().is_err() {
                log::error!("Ticker thread panicked");
            }
        }
    }
}

impl Drop for ThreadTicker {
    fn drop(&mut self) {
        self.detach();
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use std::sync::atomic::AtomicU32;

    fn counting_isr() -> (&'static AtomicU32, Isr) {
        let count: &'static AtomicU32 = Box::leak(Box::new(AtomicU32::new(0)));
        let isr: Isr = Box::leak(Box::new(move || {
            count.fetch_add(1, Ordering::Relaxed);
        }));
        (count, isr)
    }

    #[test]
    fn test_advance_raises_interrupts() {
        let clock = VirtualClock::new();
        let (count, isr) = counting_isr();
        let mut ticker = SimTicker::new(clock.clone(), isr, Journal::default());

        clock.advance(Duration::from_micros(500));
        ticker.attach(Duration::from_micros(1000));
        // Fires at 1500, 2500, .., 9500
        clock.advance_to(10_499);
        assert_eq!(9, count.load(Ordering::Relaxed));
        assert_eq!(10_499, clock.now_us());
        // The target itself is included
        clock.advance_to(10_500);
        assert_eq!(10, count.load(Ordering::Relaxed));

        ticker.detach();
        clock.advance_to(20_000);
        assert_eq!(10, count.load(Ordering::Relaxed));
    }

    #[test]
    fn test_wait_returns_after_interrupt() {
        let clock = VirtualClock::new();
        let (count, isr) = counting_isr();
        let mut ticker = SimTicker::new(clock.clone(), isr, Journal::default());
        ticker.attach(Duration::from_micros(1000));

        clock.wait_until(Some(5000));
        assert_eq!(1000, clock.now_us());
        assert_eq!(1, count.load(Ordering::Relaxed));

        ticker.detach();
        clock.wait_until(Some(5000));
        assert_eq!(5000, clock.now_us());
    }

    #[test]
    fn test_timer() {
        let clock = VirtualClock::new();
        let mut timer = SimTimer::new(clock.clone());
        clock.advance(Duration::from_micros(1500));
        assert_eq!(Duration::from_micros(1500), timer.elapsed());
        timer.reset();
        assert_eq!(Duration::ZERO, timer.elapsed());
    }
}
