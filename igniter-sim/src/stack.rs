//! A scripted CANopen stack
//!
//! [`SimStack`] implements the stack adapter without a bus. Instead of receiving frames, it plays
//! a script of remote accesses and NMT commands, set up through a [`StackControl`] handle: SDO
//! accesses and reset commands are processed in the full tick, RPDO writes in the fast cadence.
//! Everything the runtime asks of the stack is recorded in a [`Journal`], so tests can check the
//! order of lifecycle steps.

use std::{
    sync::{Arc, Mutex},
    time::Duration,
};

use igniter_node::{
    common::{
        constants::object_ids, AbortCode, NmtControl, NmtState, NodeId, ProtocolParams,
        ResetOutcome,
    },
    CanOpenStack, ProcessDataPath, StackError, TransportError,
};

use crate::{clock::SimClock, dictionary::MemoryDictionary};

/// Bytes reported as allocated for each instance
pub const INSTANCE_SIZE: usize = 2944;

/// Something that happened in the simulation
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Event {
    /// A stack instance was created
    Created(u32),
    /// The CAN transport was configured
    TransportConfigured {
        /// Instance number
        instance: u32,
        /// Configured bit rate
        bitrate_kbps: u16,
    },
    /// Protocol objects were initialized
    ProtocolInit {
        /// Instance number
        instance: u32,
        /// Node ID passed by the runtime
        node_id: NodeId,
    },
    /// Process data objects were initialized
    ProcessDataInit(u32),
    /// The CAN module entered normal mode
    NormalMode(u32),
    /// The CAN module entered configuration mode
    ConfigMode(u32),
    /// The CAN module was disabled
    Disabled(u32),
    /// The instance was released
    Destroyed(u32),
    /// The NMT state changed
    Nmt(NmtState),
    /// The fast cadence ticker was attached
    TickerAttached(Duration),
    /// The fast cadence ticker was detached
    TickerDetached,
    /// A scripted SDO download was processed
    SdoDownload {
        /// Object index
        index: u16,
        /// Sub index
        sub: u8,
        /// Result of the access
        result: Result<(), AbortCode>,
    },
    /// A scripted SDO upload was processed
    SdoUpload {
        /// Object index
        index: u16,
        /// Sub index
        sub: u8,
        /// Result of the access
        result: Result<Vec<u8>, AbortCode>,
    },
    /// A scripted RPDO write was processed
    RpdoWrite {
        /// Object index
        index: u16,
        /// Sub index
        sub: u8,
        /// Result of the access
        result: Result<(), AbortCode>,
    },
    /// An instance was accessed when it was not the live instance
    StaleAccess(u32),
}

/// A journal entry
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Record {
    /// Time of the event
    pub at_us: u64,
    /// What happened
    pub event: Event,
}

/// A shared, append only log of [`Event`]s
#[derive(Clone, Debug, Default)]
pub struct Journal(Arc<Mutex<Vec<Record>>>);

impl Journal {
    /// Append an event
    pub fn push(&self, at_us: u64, event: Event) {
        self.0.lock().unwrap().push(Record { at_us, event });
    }

    /// All records so far
    pub fn records(&self) -> Vec<Record> {
        self.0.lock().unwrap().clone()
    }

    /// All events so far, without times
    pub fn events(&self) -> Vec<Event> {
        self.0
            .lock()
            .unwrap()
            .iter()
            .map(|r| r.event.clone())
            .collect()
    }

    /// Index of the first event matching `pred`
    pub fn position(&self, pred: impl Fn(&Event) -> bool) -> Option<usize> {
        self.0.lock().unwrap().iter().position(|r| pred(&r.event))
    }
}

#[derive(Clone, Debug)]
enum Action {
    Write { index: u16, sub: u8, data: Vec<u8> },
    Read { index: u16, sub: u8 },
    Start,
    CommReset,
    AppReset,
}

#[derive(Debug)]
struct Scheduled {
    at_us: u64,
    seq: u64,
    action: Action,
}

#[derive(Debug, Default)]
struct Failures {
    transport: Option<i16>,
    protocol: Option<StackError>,
    process_data: Option<StackError>,
}

/// Tick counters
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Counters {
    /// Full stack ticks run
    pub full_ticks: u32,
    /// Receive PDO steps run
    pub rpdo_steps: u32,
    /// Transmit PDO steps run
    pub tpdo_steps: u32,
    /// Longest elapsed time passed to a receive PDO step
    pub max_fast_elapsed: Duration,
}

#[derive(Debug)]
struct Shared {
    sdo_script: Vec<Scheduled>,
    rpdo_script: Vec<Scheduled>,
    next_seq: u64,
    failures: Failures,
    tick_latency: Duration,
    next_instance: u32,
    live: Option<u32>,
    nmt: NmtState,
    counters: Counters,
}

impl Default for Shared {
    fn default() -> Self {
        Self {
            sdo_script: Vec::new(),
            rpdo_script: Vec::new(),
            next_seq: 0,
            failures: Failures::default(),
            tick_latency: Duration::ZERO,
            next_instance: 0,
            live: None,
            nmt: NmtState::Bootup,
            counters: Counters::default(),
        }
    }
}

fn insert_sorted(script: &mut Vec<Scheduled>, entry: Scheduled) {
    let pos = script.partition_point(|s| (s.at_us, s.seq) <= (entry.at_us, entry.seq));
    script.insert(pos, entry);
}

/// Take the actions due at `now_us`, stopping after the first reset command
fn take_due(script: &mut Vec<Scheduled>, now_us: u64) -> Vec<Action> {
    let mut actions = Vec::new();
    while script.first().is_some_and(|s| s.at_us <= now_us) {
        let action = script.remove(0).action;
        let reset = matches!(action, Action::CommReset | Action::AppReset);
        actions.push(action);
        if reset {
            break;
        }
    }
    actions
}

/// Script and fault injection handle for a [`SimStack`]
///
/// Times are absolute, on the clock the stack was created with. A scripted access is processed
/// on the first tick at or after its time.
#[derive(Clone, Debug)]
pub struct StackControl {
    shared: Arc<Mutex<Shared>>,
}

impl StackControl {
    fn schedule(&self, at: Duration, action: Action, rpdo: bool) {
        let mut shared = self.shared.lock().unwrap();
        let seq = shared.next_seq;
        shared.next_seq += 1;
        let entry = Scheduled {
            at_us: at.as_micros() as u64,
            seq,
            action,
        };
        if rpdo {
            insert_sorted(&mut shared.rpdo_script, entry);
        } else {
            insert_sorted(&mut shared.sdo_script, entry);
        }
    }

    /// Schedule an SDO download
    pub fn sdo_write(&self, at: Duration, index: u16, sub: u8, data: &[u8]) {
        let data = data.to_vec();
        self.schedule(at, Action::Write { index, sub, data }, false);
    }

    /// Schedule an SDO upload. The result is recorded in the journal.
    pub fn sdo_read(&self, at: Duration, index: u16, sub: u8) {
        self.schedule(at, Action::Read { index, sub }, false);
    }

    /// Schedule a write by a received PDO
    ///
    /// RPDOs are only processed in the operational state.
    pub fn rpdo_write(&self, at: Duration, index: u16, sub: u8, data: &[u8]) {
        let data = data.to_vec();
        self.schedule(at, Action::Write { index, sub, data }, true);
    }

    /// Schedule an NMT start command
    pub fn nmt_start(&self, at: Duration) {
        self.schedule(at, Action::Start, false);
    }

    /// Schedule an NMT reset communication command
    pub fn reset_communication(&self, at: Duration) {
        self.schedule(at, Action::CommReset, false);
    }

    /// Schedule an NMT reset application command
    pub fn reset_application(&self, at: Duration) {
        self.schedule(at, Action::AppReset, false);
    }

    /// Fail the next transport configuration with `code`
    pub fn fail_transport(&self, code: i16) {
        self.shared.lock().unwrap().failures.transport = Some(code);
    }

    /// Fail the next protocol initialization with `error`
    pub fn fail_protocol(&self, error: StackError) {
        self.shared.lock().unwrap().failures.protocol = Some(error);
    }

    /// Fail the next process data initialization with `error`
    pub fn fail_process_data(&self, error: StackError) {
        self.shared.lock().unwrap().failures.process_data = Some(error);
    }

    /// Processing time consumed by every full tick
    pub fn set_tick_latency(&self, latency: Duration) {
        self.shared.lock().unwrap().tick_latency = latency;
    }

    /// Current NMT state
    pub fn nmt_state(&self) -> NmtState {
        self.shared.lock().unwrap().nmt
    }

    /// The live instance, if any
    pub fn live_instance(&self) -> Option<u32> {
        self.shared.lock().unwrap().live
    }

    /// Tick counters
    pub fn counters(&self) -> Counters {
        self.shared.lock().unwrap().counters
    }

    /// Number of scripted accesses not yet processed
    pub fn pending_actions(&self) -> usize {
        let shared = self.shared.lock().unwrap();
        shared.sdo_script.len() + shared.rpdo_script.len()
    }
}

/// A stack instance
#[derive(Debug)]
pub struct SimInstance {
    id: u32,
    node_id: NodeId,
    nmt_control: NmtControl,
    /// Operational was left because of a masked error register bit
    error_forced: bool,
}

impl SimInstance {
    /// Instance number, counting from 1
    pub fn id(&self) -> u32 {
        self.id
    }
}

/// The process data path of a [`SimInstance`]
#[allow(missing_debug_implementations)]
pub struct SimProcessData<C> {
    id: u32,
    clock: C,
    od: &'static MemoryDictionary,
    shared: Arc<Mutex<Shared>>,
    journal: Journal,
}

impl<C: SimClock> SimProcessData<C> {
    /// Returns false, and records the access, if the instance is no longer live
    fn check_live(&self, shared: &Shared) -> bool {
        if shared.live != Some(self.id) {
            self.journal
                .push(self.clock.now_us(), Event::StaleAccess(self.id));
            return false;
        }
        true
    }
}

impl<C: SimClock> ProcessDataPath for SimProcessData<C> {
    fn process_rpdo(&self, elapsed: Duration) {
        let now_us = self.clock.now_us();
        let writes = {
            let mut shared = self.shared.lock().unwrap();
            if !self.check_live(&shared) {
                return;
            }
            shared.counters.rpdo_steps += 1;
            shared.counters.max_fast_elapsed = shared.counters.max_fast_elapsed.max(elapsed);
            if shared.nmt != NmtState::Operational {
                return;
            }
            take_due(&mut shared.rpdo_script, now_us)
        };

        for action in writes {
            if let Action::Write { index, sub, data } = action {
                let result = self.od.write(index, sub, &data);
                self.journal
                    .push(now_us, Event::RpdoWrite { index, sub, result });
            }
        }
    }

    fn process_tpdo(&self, _elapsed: Duration) {
        let mut shared = self.shared.lock().unwrap();
        if self.check_live(&shared) {
            shared.counters.tpdo_steps += 1;
        }
    }
}

/// A scripted stack, see the [module docs](self)
#[allow(missing_debug_implementations)]
pub struct SimStack<C> {
    clock: C,
    od: &'static MemoryDictionary,
    shared: Arc<Mutex<Shared>>,
    journal: Journal,
}

impl<C: SimClock> SimStack<C> {
    /// Create a stack serving `od`
    pub fn new(clock: C, od: &'static MemoryDictionary, journal: Journal) -> Self {
        Self {
            clock,
            od,
            shared: Arc::new(Mutex::new(Shared::default())),
            journal,
        }
    }

    /// Get a handle to script the stack
    pub fn control(&self) -> StackControl {
        StackControl {
            shared: self.shared.clone(),
        }
    }

    fn record(&self, event: Event) {
        self.journal.push(self.clock.now_us(), event);
    }

    fn set_nmt(&self, shared: &mut Shared, state: NmtState) {
        if shared.nmt != state {
            shared.nmt = state;
            self.record(Event::Nmt(state));
        }
    }

    /// Apply the error behavior selected by the NMT control flags
    fn check_error_register(&self, instance: &mut SimInstance, shared: &mut Shared) {
        let control = instance.nmt_control;
        let register = self
            .od
            .stored_u8(object_ids::ERROR_REGISTER, 0)
            .unwrap_or(0);
        let error = control.contains(NmtControl::ERR_ON_ERR_REG)
            && register & control.error_register_mask() != 0;

        if error && shared.nmt == NmtState::Operational {
            let state = if control.contains(NmtControl::ERR_TO_STOPPED) {
                NmtState::Stopped
            } else {
                NmtState::PreOperational
            };
            instance.error_forced = true;
            self.set_nmt(shared, state);
        } else if !error && instance.error_forced {
            instance.error_forced = false;
            if control.contains(NmtControl::ERR_FREE_TO_OPERATIONAL) {
                self.set_nmt(shared, NmtState::Operational);
            }
        }
    }
}

impl<C: SimClock> CanOpenStack for SimStack<C> {
    type Instance = SimInstance;
    type ProcessData = SimProcessData<C>;
    type Od = MemoryDictionary;

    fn create(&mut self) -> (SimInstance, usize) {
        let mut shared = self.shared.lock().unwrap();
        shared.next_instance += 1;
        let id = shared.next_instance;
        shared.live = Some(id);
        shared.nmt = NmtState::Bootup;
        self.record(Event::Created(id));
        let instance = SimInstance {
            id,
            node_id: NodeId::Unconfigured,
            nmt_control: NmtControl::default(),
            error_forced: false,
        };
        (instance, INSTANCE_SIZE)
    }

    fn configure_transport(
        &mut self,
        instance: &mut SimInstance,
        bitrate_kbps: u16,
    ) -> Result<(), TransportError> {
        if let Some(code) = self.shared.lock().unwrap().failures.transport.take() {
            return Err(TransportError { code });
        }
        self.record(Event::TransportConfigured {
            instance: instance.id,
            bitrate_kbps,
        });
        Ok(())
    }

    fn init_protocol(
        &mut self,
        instance: &mut SimInstance,
        od: &MemoryDictionary,
        params: &ProtocolParams,
        node_id: NodeId,
    ) -> Result<(), StackError> {
        if let Some(error) = self.shared.lock().unwrap().failures.protocol.take() {
            return Err(error);
        }
        if !od.contains(object_ids::HEARTBEAT_PRODUCER_TIME) {
            return Err(StackError::OdParameters {
                index: object_ids::HEARTBEAT_PRODUCER_TIME as u32,
            });
        }
        if let Some(index) = params.status_bits {
            if !od.contains(index) {
                return Err(StackError::OdParameters {
                    index: index as u32,
                });
            }
        }

        instance.node_id = node_id;
        instance.nmt_control = params.nmt_control;
        self.record(Event::ProtocolInit {
            instance: instance.id,
            node_id,
        });

        if !node_id.is_configured() {
            return Err(StackError::NodeIdUnconfigured);
        }
        Ok(())
    }

    fn init_process_data(
        &mut self,
        instance: &mut SimInstance,
        _od: &MemoryDictionary,
        _node_id: NodeId,
    ) -> Result<(), StackError> {
        if let Some(error) = self.shared.lock().unwrap().failures.process_data.take() {
            return Err(error);
        }
        self.record(Event::ProcessDataInit(instance.id));
        Ok(())
    }

    fn set_normal_mode(&mut self, instance: &mut SimInstance) {
        self.record(Event::NormalMode(instance.id));
        // Without a node ID the node waits for LSS, and never boots up
        if instance.node_id.is_configured() {
            let state = if instance
                .nmt_control
                .contains(NmtControl::STARTUP_TO_OPERATIONAL)
            {
                NmtState::Operational
            } else {
                NmtState::PreOperational
            };
            let mut shared = self.shared.lock().unwrap();
            self.set_nmt(&mut shared, state);
        }
    }

    fn set_config_mode(&mut self, instance: &mut SimInstance) {
        self.record(Event::ConfigMode(instance.id));
    }

    fn disable(&mut self, instance: &mut SimInstance) {
        self.record(Event::Disabled(instance.id));
    }

    fn destroy(&mut self, instance: SimInstance) {
        let mut shared = self.shared.lock().unwrap();
        if shared.live == Some(instance.id) {
            shared.live = None;
        }
        self.record(Event::Destroyed(instance.id));
    }

    fn process_data(&self, instance: &SimInstance) -> SimProcessData<C> {
        SimProcessData {
            id: instance.id,
            clock: self.clock.clone(),
            od: self.od,
            shared: self.shared.clone(),
            journal: self.journal.clone(),
        }
    }

    fn tick_full(&mut self, instance: &mut SimInstance, _elapsed: Duration) -> ResetOutcome {
        let now_us = self.clock.now_us();
        let (actions, latency) = {
            let mut shared = self.shared.lock().unwrap();
            if shared.live != Some(instance.id) {
                self.record(Event::StaleAccess(instance.id));
            }
            shared.counters.full_ticks += 1;
            self.check_error_register(instance, &mut shared);
            (take_due(&mut shared.sdo_script, now_us), shared.tick_latency)
        };

        // The dictionary is accessed without the script lock, as extensions may post work which
        // an interrupt also touches
        let mut outcome = ResetOutcome::Continue;
        for action in actions {
            match action {
                Action::Write { index, sub, data } => {
                    let result = self.od.write(index, sub, &data);
                    self.record(Event::SdoDownload { index, sub, result });
                }
                Action::Read { index, sub } => {
                    let result = self.od.read(index, sub);
                    self.record(Event::SdoUpload { index, sub, result });
                }
                Action::Start => {
                    if instance.node_id.is_configured() {
                        let mut shared = self.shared.lock().unwrap();
                        self.set_nmt(&mut shared, NmtState::Operational);
                    }
                }
                Action::CommReset => outcome = ResetOutcome::CommunicationReset,
                Action::AppReset => outcome = ResetOutcome::ApplicationReset,
            }
        }

        if !latency.is_zero() {
            self.clock.spend(latency);
        }
        outcome
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::clock::VirtualClock;
    use igniter_node::hal::Monotonic;

    fn setup() -> (VirtualClock, SimStack<VirtualClock>, StackControl, Journal) {
        let clock = VirtualClock::new();
        let journal = Journal::default();
        let od = MemoryDictionary::with_defaults().leak();
        let stack = SimStack::new(clock.clone(), od, journal.clone());
        let control = stack.control();
        (clock, stack, control, journal)
    }

    #[test]
    fn test_script_order_and_reset_boundary() {
        let (clock, mut stack, control, journal) = setup();
        let (mut inst, _) = stack.create();

        control.sdo_read(Duration::from_millis(2), 0x1017, 0);
        control.reset_communication(Duration::from_millis(1));
        control.sdo_write(Duration::from_millis(1), 0x1017, 0, &[0, 0]);

        clock.advance(Duration::from_millis(5));
        assert_eq!(
            ResetOutcome::CommunicationReset,
            stack.tick_full(&mut inst, Duration::ZERO)
        );
        // The write scheduled after the reset is still pending
        assert_eq!(2, control.pending_actions());
        assert_eq!(
            ResetOutcome::Continue,
            stack.tick_full(&mut inst, Duration::ZERO)
        );
        assert_eq!(0, control.pending_actions());
        assert_eq!(
            Some(Event::SdoUpload {
                index: 0x1017,
                sub: 0,
                result: Ok(vec![0, 0])
            }),
            journal.events().last().cloned()
        );
    }

    #[test]
    fn test_stale_process_data_recorded() {
        let (_clock, mut stack, _control, journal) = setup();
        let (inst, _) = stack.create();
        let pd = stack.process_data(&inst);
        pd.process_rpdo(Duration::ZERO);
        stack.destroy(inst);
        pd.process_rpdo(Duration::ZERO);
        assert_eq!(
            Some(Event::StaleAccess(1)),
            journal.events().last().cloned()
        );
    }

    #[test]
    fn test_error_register_leaves_operational() {
        let (clock, mut stack, control, _journal) = setup();
        let (mut inst, _) = stack.create();
        let params = ProtocolParams {
            nmt_control: NmtControl::DEFAULT
                | NmtControl::STARTUP_TO_OPERATIONAL
                | NmtControl::ERR_FREE_TO_OPERATIONAL,
            ..ProtocolParams::DEFAULT
        };
        let od = stack.od;
        stack
            .init_protocol(&mut inst, od, &params, NodeId::Configured(5))
            .unwrap();
        stack.set_normal_mode(&mut inst);
        assert_eq!(NmtState::Operational, control.nmt_state());

        od.insert(object_ids::ERROR_REGISTER, 0, &[0x10]);
        stack.tick_full(&mut inst, Duration::ZERO);
        assert_eq!(NmtState::PreOperational, control.nmt_state());

        // Unmasked bits do not count
        od.insert(object_ids::ERROR_REGISTER, 0, &[0x02]);
        clock.advance(Duration::from_millis(1));
        stack.tick_full(&mut inst, Duration::ZERO);
        assert_eq!(NmtState::Operational, control.nmt_state());
        assert_eq!(1000, clock.now_us());
    }
}
