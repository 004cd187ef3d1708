//! A runtime for a CANopen node with a delayed actuation trigger
//!
//! Igniter-node binds a CANopen protocol stack to MCU hardware. It is intended to run on
//! microcontrollers, and so it is no_std compatible and performs no heap allocation. The protocol
//! engine itself is provided by the application through the [`CanOpenStack`] trait; this crate
//! provides:
//!
//! * The node lifecycle: stack instance creation, CAN and protocol initialization, and a clean
//!   teardown and restart on every NMT communication reset.
//! * Two processing cadences: process data exchange in a periodic hardware interrupt, and the
//!   full stack processing in a cooperative dispatch loop.
//! * A delayed actuation: writing 1 to object 0x2111 activates an output after a dwell, and
//!   reverts it after a second dwell. Writing 0 cancels.
//! * Latency diagnostics for the full stack processing.
//!
//! # Getting Started
//!
//! ## Statics
//!
//! The dispatch queue, the actuation hook and the fast cadence are shared with interrupts, and so
//! are declared as statics:
//!
//! ```ignore
//! static QUEUE: TaskQueue = TaskQueue::new();
//! static HOOK: ActuationHook = ActuationHook::new(&QUEUE);
//! static FAST: FastCadence<MyProcessData, MyTimer> = FastCadence::new(MyTimer::TIM2);
//! ```
//!
//! The board's periodic interrupt handler runs the fast cadence:
//!
//! ```ignore
//! #[interrupt]
//! fn TIM3() {
//!     FAST.on_interrupt();
//! }
//! ```
//!
//! ## Running the node
//!
//! Implement the [`hal`] traits for the board, and the [`CanOpenStack`] trait for the protocol
//! stack, then create a [`Runtime`] and run it. [`Runtime::run`] never returns.
//!
//! ```ignore
//! let peripherals = Peripherals {
//!     clock,
//!     ticker,
//!     full_timer,
//!     output: led,
//!     system,
//! };
//! let runtime: Runtime<MyStack, MyBoard> = Runtime::new(
//!     NodeConfig::DEFAULT,
//!     stack,
//!     &OD,
//!     &HOOK,
//!     &FAST,
//!     peripherals,
//! )
//! .unwrap();
//! runtime.run();
//! ```
//!
#![cfg_attr(all(not(test), not(feature = "std")), no_std)]
#![warn(missing_docs, missing_debug_implementations)]
#![cfg_attr(docsrs, feature(doc_cfg))]

pub mod actuation;
mod diagnostics;
pub mod error;
pub mod event_queue;
pub mod hal;
pub mod object_dict;
mod runtime;
pub mod scheduler;
pub mod stack;

pub use critical_section;
pub use igniter_common as common;

pub use actuation::{ActuationController, ActuationEvent, ActuationHook, ActuationState};
pub use diagnostics::Diagnostics;
pub use error::{InitError, InitStage, QueueFullError, StackError, TransportError};
pub use event_queue::{EventId, EventQueue};
pub use hal::{Board, Peripherals};
pub use object_dict::{ObjectDictionary, ObjectExtension};
pub use runtime::{Exit, Runtime};
pub use scheduler::{FastCadence, Task, TaskQueue, TASK_QUEUE_CAPACITY};
pub use stack::{CanOpenStack, ProcessDataPath};
