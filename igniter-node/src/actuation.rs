//! Delayed actuation triggered through the object dictionary
//!
//! Writing 1 to the [`IGNITE`](object_ids::IGNITE) object activates the output after a dwell, and
//! reverts it after a second dwell. Writing 0 at any point before the revert forces the output
//! off and cancels whatever is pending. The output state is mirrored into the same object, so
//! reading it back over SDO returns the actuator state.
//!
//! The [`ActuationHook`] sits on the object and only posts to the task queue, as it may be called
//! from interrupt context. The [`ActuationController`] runs the state machine from the cooperative
//! loop, which is the only place the output and the mirror are written.

use core::time::Duration;

use defmt_or_log::{debug, info, warn};
use igniter_common::{
    constants::{object_ids, values},
    AbortCode,
};
use portable_atomic::{AtomicU32, Ordering};

use crate::{
    event_queue::EventId,
    hal::DigitalOutput,
    object_dict::{ObjectDictionary, ObjectExtension},
    scheduler::{Task, TaskQueue},
};

/// Inputs to the actuation state machine
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ActuationEvent {
    /// A value was written to the trigger object
    Trigger(u8),
    /// The first dwell has elapsed
    Energize,
    /// The second dwell has elapsed
    Revert,
}

/// State of the actuator
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ActuationState {
    /// Output inactive, nothing pending
    #[default]
    Idle,
    /// Output inactive, activation pending
    ScheduledOn(EventId),
    /// Output active, revert pending
    ///
    /// The revert is scheduled in the same step that activates the output, so the output is
    /// never active without a pending revert.
    ScheduledOff(EventId),
}

impl ActuationState {
    /// The pending timer, if any
    pub fn pending(&self) -> Option<EventId> {
        match self {
            ActuationState::Idle => None,
            ActuationState::ScheduledOn(id) | ActuationState::ScheduledOff(id) => Some(*id),
        }
    }

    /// Returns true if the output is active
    pub fn is_active(&self) -> bool {
        matches!(self, ActuationState::ScheduledOff(_))
    }
}

/// Object extension on the trigger object
///
/// Every write is accepted. Writes of 0 and 1 to sub index 0 are forwarded to the cooperative loop,
/// followed by a log line; any other value or sub index is ignored.
#[derive(Debug)]
pub struct ActuationHook {
    queue: &'static TaskQueue,
    dropped: AtomicU32,
}

impl ActuationHook {
    /// Create a hook posting to `queue`
    pub const fn new(queue: &'static TaskQueue) -> Self {
        Self {
            queue,
            dropped: AtomicU32::new(0),
        }
    }

    /// The queue this hook posts to
    pub fn queue(&self) -> &'static TaskQueue {
        self.queue
    }

    /// Number of posts lost because the queue was full
    pub fn dropped_posts(&self) -> u32 {
        self.dropped.load(Ordering::Relaxed)
    }

    fn post(&self, task: Task) {
        if self.queue.call(task).is_err() {
            self.dropped.fetch_add(1, Ordering::Relaxed);
        }
    }
}

impl ObjectExtension for ActuationHook {
    fn write(&self, sub: u8, data: &[u8]) -> Result<(), AbortCode> {
        if sub != object_ids::IGNITE_SUB {
            return Ok(());
        }
        // Trigger before log line: with one slot left, only the log line is lost
        match data.first().copied() {
            Some(values::IGNITE_CMD) => {
                self.post(Task::Actuation(ActuationEvent::Trigger(values::IGNITE_CMD)));
                self.post(Task::Log("received ignite"));
            }
            Some(values::CANCEL_CMD) => {
                self.post(Task::Actuation(ActuationEvent::Trigger(values::CANCEL_CMD)));
                self.post(Task::Log("received cancel"));
            }
            _ => (),
        }
        Ok(())
    }
}

/// Runs the actuation state machine
#[allow(missing_debug_implementations)]
pub struct ActuationController<O, D: ?Sized + 'static> {
    output: O,
    od: &'static D,
    queue: &'static TaskQueue,
    dwell: Duration,
    state: ActuationState,
}

impl<O, D> ActuationController<O, D>
where
    O: DigitalOutput,
    D: ObjectDictionary + ?Sized,
{
    /// Create a new controller
    ///
    /// The output is driven inactive and the mirror cleared.
    pub fn new(output: O, od: &'static D, queue: &'static TaskQueue, dwell: Duration) -> Self {
        let mut controller = Self {
            output,
            od,
            queue,
            dwell,
            state: ActuationState::Idle,
        };
        controller.drive(false);
        controller
    }

    /// Current state
    pub fn state(&self) -> ActuationState {
        self.state
    }

    /// Access the output
    pub fn output(&self) -> &O {
        &self.output
    }

    /// Process one event
    pub fn handle(&mut self, event: ActuationEvent) {
        match event {
            ActuationEvent::Trigger(values::IGNITE_CMD) => self.ignite(),
            ActuationEvent::Trigger(values::CANCEL_CMD) => self.cancel(),
            ActuationEvent::Trigger(_) => (),
            ActuationEvent::Energize => self.energize(),
            ActuationEvent::Revert => self.revert(),
        }
    }

    fn ignite(&mut self) {
        if self.state != ActuationState::Idle {
            debug!("Ignite ignored, actuation already in progress");
            return;
        }
        match self
            .queue
            .call_in(self.dwell, Task::Actuation(ActuationEvent::Energize))
        {
            Ok(id) => self.state = ActuationState::ScheduledOn(id),
            Err(_) => warn!("Task queue full, ignite dropped"),
        }
    }

    fn cancel(&mut self) {
        let Some(id) = self.state.pending() else {
            return;
        };
        self.drive(false);
        self.queue.cancel(id);
        self.state = ActuationState::Idle;
        info!("Actuation cancelled");
    }

    fn energize(&mut self) {
        // A firing which no longer matches the state was cancelled after it was taken
        if !matches!(self.state, ActuationState::ScheduledOn(_)) {
            return;
        }
        self.drive(true);
        match self
            .queue
            .call_in(self.dwell, Task::Actuation(ActuationEvent::Revert))
        {
            Ok(id) => self.state = ActuationState::ScheduledOff(id),
            Err(_) => {
                warn!("Task queue full, reverting actuator immediately");
                self.drive(false);
                self.state = ActuationState::Idle;
            }
        }
    }

    fn revert(&mut self) {
        if !self.state.is_active() {
            return;
        }
        self.drive(false);
        self.state = ActuationState::Idle;
    }

    fn drive(&mut self, active: bool) {
        self.output.set(active);
        if let Err(e) = self
            .od
            .store_u8(object_ids::IGNITE, object_ids::IGNITE_SUB, active as u8)
        {
            warn!("Failed to mirror actuator state: {:?}", e);
        }
        debug!("Actuator output {}", if active { "on" } else { "off" });
    }
}
