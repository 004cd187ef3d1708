//! Host bindings for running an igniter node without hardware
//!
//! Provides a scripted stand-in for the CANopen stack, an in-memory object dictionary, and
//! simulated board peripherals. Nodes can run either in deterministic virtual time, for tests, or
//! in real time, for interactive use.
#![warn(missing_docs)]

pub mod board;
pub mod clock;
pub mod dictionary;
pub mod stack;

pub use board::{RealtimeBoard, SimBoard, SimOutput, SimSystem};
pub use clock::{Isr, SimClock, SimTicker, SimTimer, StdClock, ThreadTicker, VirtualClock};
pub use dictionary::MemoryDictionary;
pub use stack::{Counters, Event, Journal, Record, SimInstance, SimProcessData, SimStack, StackControl};
