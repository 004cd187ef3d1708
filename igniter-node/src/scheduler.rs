//! The two processing cadences of a node
//!
//! The fast cadence runs in a periodic hardware interrupt and only exchanges process data. The
//! full stack cadence, the latency report and the actuation callbacks are [`Task`]s, run one at a
//! time from the cooperative [`TaskQueue`].
use core::cell::RefCell;

use critical_section::Mutex;
use portable_atomic::{AtomicU32, Ordering};

use crate::{
    actuation::ActuationEvent,
    event_queue::EventQueue,
    hal::ElapsedTimer,
    stack::ProcessDataPath,
};

/// Capacity of the [`TaskQueue`]
///
/// Two slots are taken permanently by the periodic cadence tasks, at most one by a pending
/// actuation, and the rest buffer trigger writes and deferred log lines.
pub const TASK_QUEUE_CAPACITY: usize = 16;

/// Work items run by the cooperative dispatch loop
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Task {
    /// Run the full protocol stack tick
    FullTick,
    /// Log the latest tick latency
    ReportLatency,
    /// Drive the actuation state machine
    Actuation(ActuationEvent),
    /// Emit a log line on behalf of an interrupt
    Log(&'static str),
}

/// The cooperative dispatch queue of a node
pub type TaskQueue = EventQueue<Task, TASK_QUEUE_CAPACITY>;

struct FastState<P, T> {
    path: Option<P>,
    timer: T,
}

/// The interrupt driven process data cadence
///
/// The board's periodic interrupt handler calls [`on_interrupt`](Self::on_interrupt). Between
/// [`attach`](Self::attach) and [`detach`](Self::detach) this runs the receive then transmit PDO
/// processing of the attached instance, otherwise it does nothing. Typically declared as a static:
///
/// ```ignore
/// static FAST: FastCadence<MyProcessData, MyTimer> = FastCadence::new(MyTimer::TIM2);
///
/// #[interrupt]
/// fn TIM2() {
///     FAST.on_interrupt();
/// }
/// ```
#[allow(missing_debug_implementations)]
pub struct FastCadence<P, T> {
    state: Mutex<RefCell<FastState<P, T>>>,
    ticks: AtomicU32,
}

impl<P, T> FastCadence<P, T>
where
    P: ProcessDataPath,
    T: ElapsedTimer,
{
    /// Create a detached FastCadence which owns `timer`
    pub const fn new(timer: T) -> Self {
        Self {
            state: Mutex::new(RefCell::new(FastState { path: None, timer })),
            ticks: AtomicU32::new(0),
        }
    }

    /// Start processing `path` on each interrupt
    ///
    /// Resets the elapsed timer, so the first tick measures from the attach.
    pub fn attach(&self, path: P) {
        critical_section::with(|cs| {
            let mut state = self.state.borrow_ref_mut(cs);
            state.timer.reset();
            state.path = Some(path);
        });
    }

    /// Stop processing, and drop the process data handle
    ///
    /// Returns true if a handle was attached. Once this returns, no interrupt can access the
    /// handle.
    pub fn detach(&self) -> bool {
        critical_section::with(|cs| self.state.borrow_ref_mut(cs).path.take().is_some())
    }

    /// Returns true while a process data handle is attached
    pub fn is_attached(&self) -> bool {
        critical_section::with(|cs| self.state.borrow_ref(cs).path.is_some())
    }

    /// Run one fast tick
    ///
    /// To be called from the periodic interrupt.
    pub fn on_interrupt(&self) {
        critical_section::with(|cs| {
            let mut state = self.state.borrow_ref_mut(cs);
            let state = &mut *state;
            if let Some(path) = &state.path {
                let elapsed = state.timer.elapsed();
                state.timer.reset();
                path.process_rpdo(elapsed);
                path.process_tpdo(elapsed);
                self.ticks.fetch_add(1, Ordering::Relaxed);
            }
        });
    }

    /// Number of fast ticks run since creation
    pub fn tick_count(&self) -> u32 {
        self.ticks.load(Ordering::Relaxed)
    }
}
