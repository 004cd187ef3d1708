//! Simulated board peripherals
use std::sync::{Arc, Mutex};

use igniter_node::{
    hal::{Board, DigitalOutput, SystemControl},
    InitError,
};

use crate::clock::{SimClock, SimTicker, SimTimer, StdClock, ThreadTicker, VirtualClock};

/// A digital output which records every write with its time
#[derive(Clone, Debug)]
pub struct SimOutput<C> {
    clock: C,
    history: Arc<Mutex<Vec<(u64, bool)>>>,
}

impl<C: SimClock> SimOutput<C> {
    /// Create an output, initially inactive
    pub fn new(clock: C) -> Self {
        Self {
            clock,
            history: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Current output state
    pub fn is_active(&self) -> bool {
        self.history
            .lock()
            .unwrap()
            .last()
            .is_some_and(|(_, active)| *active)
    }

    /// Output state at `at_us`
    pub fn active_at(&self, at_us: u64) -> bool {
        self.history
            .lock()
            .unwrap()
            .iter()
            .take_while(|(t, _)| *t <= at_us)
            .last()
            .is_some_and(|(_, active)| *active)
    }

    /// Every write, with its time
    pub fn history(&self) -> Vec<(u64, bool)> {
        self.history.lock().unwrap().clone()
    }

    /// Writes which changed the output state
    pub fn transitions(&self) -> Vec<(u64, bool)> {
        let mut state = false;
        let mut transitions = Vec::new();
        for (t, active) in self.history.lock().unwrap().iter() {
            if *active != state {
                state = *active;
                transitions.push((*t, state));
            }
        }
        transitions
    }
}

impl<C: SimClock> DigitalOutput for SimOutput<C> {
    fn set(&mut self, active: bool) {
        let now_us = self.clock.now_us();
        self.history.lock().unwrap().push((now_us, active));
        log::debug!("Output {} at {} us", if active { "on" } else { "off" }, now_us);
    }
}

/// Reset and halt by ending the host process
#[derive(Clone, Copy, Debug, Default)]
pub struct SimSystem;

impl SystemControl for SimSystem {
    fn system_reset(&mut self) -> ! {
        log::info!("System reset");
        std::process::exit(0)
    }

    fn halt(&mut self, error: &InitError) -> ! {
        log::error!("Halted: {}", error);
        std::process::exit(1)
    }
}

/// Board running in virtual time
#[derive(Clone, Copy, Debug)]
pub struct SimBoard;

impl Board for SimBoard {
    type Clock = VirtualClock;
    type Ticker = SimTicker;
    type Timer = SimTimer<VirtualClock>;
    type Output = SimOutput<VirtualClock>;
    type System = SimSystem;
}

/// Board running in real time on the host
#[derive(Clone, Copy, Debug)]
pub struct RealtimeBoard;

impl Board for RealtimeBoard {
    type Clock = StdClock;
    type Ticker = ThreadTicker;
    type Timer = SimTimer<StdClock>;
    type Output = SimOutput<StdClock>;
    type System = SimSystem;
}

#[cfg(test)]
mod test {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_output_history() {
        let clock = VirtualClock::new();
        let mut out = SimOutput::new(clock.clone());
        assert!(!out.is_active());

        out.set(false);
        clock.advance(Duration::from_micros(100));
        out.set(true);
        clock.advance(Duration::from_micros(100));
        out.set(true);
        clock.advance(Duration::from_micros(100));
        out.set(false);

        assert!(!out.active_at(99));
        assert!(out.active_at(100));
        assert!(out.active_at(299));
        assert!(!out.is_active());
        assert_eq!(vec![(100, true), (300, false)], out.transitions());
        assert_eq!(4, out.history().len());
    }
}
