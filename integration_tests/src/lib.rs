use std::time::Duration;

use igniter_node::{
    common::{constants::object_ids, AbortCode, NodeConfig},
    hal::{Monotonic, Peripherals},
    ActuationHook, Exit, FastCadence, Runtime, TaskQueue,
};
use igniter_sim::{
    Event, Isr, Journal, MemoryDictionary, SimBoard, SimOutput, SimProcessData, SimStack,
    SimSystem, SimTicker, SimTimer, StackControl, VirtualClock,
};

/// The dispatch queue shared by all simulated nodes. Tests using it must be serialized.
pub static QUEUE: TaskQueue = TaskQueue::new();
pub static HOOK: ActuationHook = ActuationHook::new(&QUEUE);

pub type SimFast = FastCadence<SimProcessData<VirtualClock>, SimTimer<VirtualClock>>;
pub type SimRuntime = Runtime<SimStack<VirtualClock>, SimBoard>;

pub const fn ms(v: u64) -> Duration {
    Duration::from_millis(v)
}

pub const fn us(d: Duration) -> u64 {
    d.as_micros() as u64
}

/// A node running on the simulated stack in virtual time
pub struct SimNode {
    pub runtime: SimRuntime,
    pub clock: VirtualClock,
    pub control: StackControl,
    pub journal: Journal,
    pub od: &'static MemoryDictionary,
    pub output: SimOutput<VirtualClock>,
    pub fast: &'static SimFast,
}

impl SimNode {
    pub fn new(config: NodeConfig) -> Self {
        Self::with_dictionary(config, MemoryDictionary::with_defaults())
    }

    pub fn with_dictionary(config: NodeConfig, od: MemoryDictionary) -> Self {
        let _ = env_logger::builder().is_test(true).try_init();
        QUEUE.clear();

        let clock = VirtualClock::new();
        let journal = Journal::default();
        let od = od.leak();
        let stack = SimStack::new(clock.clone(), od, journal.clone());
        let control = stack.control();

        // The fast cadence and its interrupt handler must be static, so leak them
        let fast: &'static SimFast =
            Box::leak(Box::new(FastCadence::new(SimTimer::new(clock.clone()))));
        let isr: Isr = Box::leak(Box::new(move || fast.on_interrupt()));

        let output = SimOutput::new(clock.clone());
        let peripherals = Peripherals {
            clock: clock.clone(),
            ticker: SimTicker::new(clock.clone(), isr, journal.clone()),
            full_timer: SimTimer::new(clock.clone()),
            output: output.clone(),
            system: SimSystem,
        };
        let runtime = Runtime::new(config, stack, od, &HOOK, fast, peripherals)
            .expect("Task queue has room for the cadence tasks");

        Self {
            runtime,
            clock,
            control,
            journal,
            od,
            output,
            fast,
        }
    }

    /// Run until the node exits. The script must end in an exit, or this never returns.
    pub fn run(&mut self) -> Exit {
        self.runtime.run_until_exit()
    }

    /// Current virtual time
    pub fn clock_us(&self) -> u64 {
        self.clock.now_us()
    }

    /// Value stored in the trigger object
    pub fn mirror(&self) -> u8 {
        self.od
            .stored_u8(object_ids::IGNITE, object_ids::IGNITE_SUB)
            .unwrap()
    }

    /// The results of all scripted SDO uploads of `index`, with their time
    pub fn uploads(&self, index: u16) -> Vec<(u64, Result<Vec<u8>, AbortCode>)> {
        self.journal
            .records()
            .into_iter()
            .filter_map(|r| match r.event {
                Event::SdoUpload {
                    index: i, result, ..
                } if i == index => Some((r.at_us, result)),
                _ => None,
            })
            .collect()
    }

    /// Script a write of the trigger object
    pub fn trigger_at(&self, at: Duration, value: u8) {
        self.control
            .sdo_write(at, object_ids::IGNITE, object_ids::IGNITE_SUB, &[value]);
    }

    /// Script a read of the trigger object
    pub fn read_trigger_at(&self, at: Duration) {
        self.control
            .sdo_read(at, object_ids::IGNITE, object_ids::IGNITE_SUB);
    }
}

pub mod prelude {
    pub use super::{ms, us, SimNode, HOOK, QUEUE};
    pub use igniter_node::common::{
        constants::object_ids, NmtControl, NmtState, NodeConfig, NodeId,
    };
    pub use igniter_node::{ActuationState, Exit, InitError, InitStage, StackError};
    pub use igniter_sim::{Event, MemoryDictionary};
}
