//! A timed event queue for cooperative dispatch
//!
//! Tasks are plain values, posted to run immediately, after a delay, or periodically, and handed
//! back in due order to a single dispatching loop. Posting and cancelling are protected by a
//! critical section, so tasks may be posted from interrupts.
use core::{cell::RefCell, time::Duration};

use critical_section::Mutex;
use heapless::Vec;

use crate::hal::Monotonic;

/// Handle to a posted task, used to cancel it
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct EventId(u32);

impl EventId {
    /// The raw handle value
    pub fn raw(&self) -> u32 {
        self.0
    }
}

#[derive(Clone, Copy, Debug)]
struct Entry<T> {
    id: EventId,
    /// Posting order, for tasks with equal due times
    seq: u64,
    due_us: u64,
    /// Zero for one-shot tasks
    period_us: u64,
    task: T,
}

#[derive(Debug)]
struct Inner<T, const N: usize> {
    entries: Vec<Entry<T>, N>,
    next_id: u32,
    next_seq: u64,
    /// Time of the most recent poll. Delays are measured from here.
    now_us: u64,
    break_requested: bool,
}

impl<T, const N: usize> Inner<T, N> {
    /// Allocate an id which no queued task holds
    ///
    /// Terminates as long as the queue is not full, since there are fewer entries than ids.
    fn alloc_id(&mut self) -> EventId {
        loop {
            let id = EventId(self.next_id);
            // Zero is never handed out
            self.next_id = self.next_id.wrapping_add(1).max(1);
            if !self.entries.iter().any(|e| e.id == id) {
                return id;
            }
        }
    }
}

fn duration_us(d: Duration) -> u64 {
    d.as_micros().min(u64::MAX as u128) as u64
}

/// A fixed capacity queue of timed tasks
#[derive(Debug)]
pub struct EventQueue<T, const N: usize> {
    inner: Mutex<RefCell<Inner<T, N>>>,
}

impl<T: Clone + Send, const N: usize> Default for EventQueue<T, N> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T, const N: usize> EventQueue<T, N>
where
    T: Clone + Send,
{
    /// Create a new, empty EventQueue
    pub const fn new() -> Self {
        Self {
            inner: Mutex::new(RefCell::new(Inner {
                entries: Vec::new(),
                next_id: 1,
                next_seq: 0,
                now_us: 0,
                break_requested: false,
            })),
        }
    }

    fn schedule(&self, delay_us: u64, period_us: u64, task: T) -> Result<EventId, T> {
        critical_section::with(|cs| {
            let mut inner = self.inner.borrow_ref_mut(cs);
            if inner.entries.is_full() {
                return Err(task);
            }
            let id = inner.alloc_id();
            let seq = inner.next_seq;
            inner.next_seq = seq.wrapping_add(1);
            let due_us = inner.now_us.saturating_add(delay_us);
            inner
                .entries
                .push(Entry {
                    id,
                    seq,
                    due_us,
                    period_us,
                    task,
                })
                .map_err(|e| e.task)?;
            Ok(id)
        })
    }

    /// Post a task to run as soon as possible
    ///
    /// Returns the task back if the queue is full.
    pub fn call(&self, task: T) -> Result<EventId, T> {
        self.schedule(0, 0, task)
    }

    /// Post a task to run once, `delay` from now
    pub fn call_in(&self, delay: Duration, task: T) -> Result<EventId, T> {
        self.schedule(duration_us(delay), 0, task)
    }

    /// Post a task to run every `period`, starting one period from now
    ///
    /// The task keeps the same [`EventId`] for all repetitions, and runs until cancelled.
    pub fn call_every(&self, period: Duration, task: T) -> Result<EventId, T> {
        let period_us = duration_us(period).max(1);
        self.schedule(period_us, period_us, task)
    }

    /// Cancel a posted task
    ///
    /// Returns true if the task was still pending. Cancelling a task which already ran, or was
    /// never posted, does nothing.
    pub fn cancel(&self, id: EventId) -> bool {
        critical_section::with(|cs| {
            let mut inner = self.inner.borrow_ref_mut(cs);
            match inner.entries.iter().position(|e| e.id == id) {
                Some(i) => {
                    inner.entries.swap_remove(i);
                    true
                }
                None => false,
            }
        })
    }

    /// Remove all tasks, and restart the time base from zero
    pub fn clear(&self) {
        critical_section::with(|cs| {
            let mut inner = self.inner.borrow_ref_mut(cs);
            inner.entries.clear();
            inner.now_us = 0;
            inner.break_requested = false;
        });
    }

    /// Returns true if the task is still waiting to run
    pub fn is_pending(&self, id: EventId) -> bool {
        critical_section::with(|cs| self.inner.borrow_ref(cs).entries.iter().any(|e| e.id == id))
    }

    /// Number of tasks in the queue
    pub fn len(&self) -> usize {
        critical_section::with(|cs| self.inner.borrow_ref(cs).entries.len())
    }

    /// Returns true if no tasks are queued
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The time at which the next task becomes due
    pub fn next_deadline(&self) -> Option<u64> {
        critical_section::with(|cs| {
            self.inner
                .borrow_ref(cs)
                .entries
                .iter()
                .map(|e| e.due_us)
                .min()
        })
    }

    /// Remove and return the next task which is due at `now_us`
    ///
    /// Tasks are returned in order of due time, and in posting order for equal due times. A
    /// periodic task is re-armed one period after its due time; if that is already in the past,
    /// the missed periods are skipped rather than run back to back.
    pub fn poll(&self, now_us: u64) -> Option<T> {
        critical_section::with(|cs| {
            let mut inner = self.inner.borrow_ref_mut(cs);
            inner.now_us = inner.now_us.max(now_us);
            let now_us = inner.now_us;

            let mut selected: Option<usize> = None;
            for (i, e) in inner.entries.iter().enumerate() {
                if e.due_us > now_us {
                    continue;
                }
                match selected {
                    Some(s) => {
                        let cur = &inner.entries[s];
                        if (e.due_us, e.seq) < (cur.due_us, cur.seq) {
                            selected = Some(i);
                        }
                    }
                    None => selected = Some(i),
                }
            }

            let i = selected?;
            let entry = &mut inner.entries[i];
            if entry.period_us == 0 {
                Some(inner.entries.swap_remove(i).task)
            } else {
                let next = entry.due_us.saturating_add(entry.period_us);
                entry.due_us = if next > now_us {
                    next
                } else {
                    now_us.saturating_add(entry.period_us)
                };
                Some(entry.task.clone())
            }
        })
    }

    /// Request [`dispatch_forever`](Self::dispatch_forever) to return
    ///
    /// Takes effect once the currently running task returns.
    pub fn break_dispatch(&self) {
        critical_section::with(|cs| self.inner.borrow_ref_mut(cs).break_requested = true);
    }

    fn take_break(&self) -> bool {
        critical_section::with(|cs| {
            let mut inner = self.inner.borrow_ref_mut(cs);
            core::mem::replace(&mut inner.break_requested, false)
        })
    }

    /// Run tasks as they become due until [`break_dispatch`](Self::break_dispatch) is called
    ///
    /// Each task runs to completion before the next one is taken. The handler runs outside of
    /// the critical section, and may post or cancel tasks.
    pub fn dispatch_forever<C: Monotonic>(&self, clock: &C, mut handler: impl FnMut(T)) {
        loop {
            if self.take_break() {
                return;
            }
            match self.poll(clock.now_us()) {
                Some(task) => handler(task),
                None => clock.wait_until(self.next_deadline()),
            }
        }
    }
}
