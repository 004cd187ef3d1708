//! Implements the node lifecycle
//!
//! The [`Runtime`] owns the stack adapter and the board peripherals, and runs the start / pump /
//! teardown cycle of the stack instance. A communication reset tears the instance down and starts
//! over with a fresh one; an application reset or a failed start ends the cycle.

use core::time::Duration;

use defmt_or_log::{error, info, warn};
use igniter_common::{constants::object_ids, NodeConfig, ResetOutcome};

use crate::{
    actuation::{ActuationController, ActuationHook},
    diagnostics::Diagnostics,
    error::{InitError, InitStage, QueueFullError},
    hal::{Board, ElapsedTimer, Monotonic, Peripherals, SystemControl, Ticker},
    object_dict::ObjectDictionary,
    scheduler::{FastCadence, Task, TaskQueue},
    stack::CanOpenStack,
};

/// Why [`Runtime::run_until_exit`] returned
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Exit {
    /// A start failed. The platform should halt.
    Fatal(InitError),
    /// The stack requested an application reset. The platform should reset.
    ApplicationReset,
}

/// The node runtime
///
/// # Operation
///
/// Each start creates a stack instance, configures the CAN transport, initializes the protocol
/// and process data objects, and switches the CAN module to normal mode. The fast cadence is then
/// attached to the instance's process data path, and the cooperative loop dispatches tasks from
/// the [`TaskQueue`] until the full stack tick reports a reset.
///
/// The full stack tick and the latency report are periodic tasks registered once in
/// [`Runtime::new`]. They only run while the loop is dispatching, which is never the case while an
/// instance is being torn down or brought up.
///
/// The actuation state lives in the runtime rather than in the instance, so it survives
/// communication resets.
#[allow(missing_debug_implementations)]
pub struct Runtime<S: CanOpenStack, B: Board> {
    config: NodeConfig,
    stack: S,
    od: &'static S::Od,
    hook: &'static ActuationHook,
    fast: &'static FastCadence<S::ProcessData, B::Timer>,
    clock: B::Clock,
    ticker: B::Ticker,
    full_timer: B::Timer,
    system: B::System,
    actuator: ActuationController<B::Output, S::Od>,
    diagnostics: Diagnostics,
    starts: u32,
}

impl<S, B> Runtime<S, B>
where
    S: CanOpenStack,
    B: Board,
{
    /// Create a new Runtime
    ///
    /// # Arguments
    ///
    /// * `config` - Node configuration
    /// * `stack` - The stack adapter
    /// * `od` - The object dictionary served by the stack
    /// * `hook` - The extension installed on the trigger object. Its queue is the dispatch queue
    ///   of the runtime.
    /// * `fast` - The fast cadence, which the board's periodic interrupt runs
    /// * `peripherals` - The remaining hardware
    ///
    /// The actuator output is driven inactive. Fails if the queue has no room for the two periodic
    /// cadence tasks.
    pub fn new(
        config: NodeConfig,
        stack: S,
        od: &'static S::Od,
        hook: &'static ActuationHook,
        fast: &'static FastCadence<S::ProcessData, B::Timer>,
        peripherals: Peripherals<B>,
    ) -> Result<Self, QueueFullError> {
        let queue = hook.queue();
        let full = queue
            .call_every(config.full_period(), Task::FullTick)
            .map_err(|_| QueueFullError)?;
        if queue
            .call_every(config.report_period(), Task::ReportLatency)
            .is_err()
        {
            queue.cancel(full);
            return Err(QueueFullError);
        }

        let Peripherals {
            clock,
            ticker,
            full_timer,
            output,
            system,
        } = peripherals;
        let actuator = ActuationController::new(output, od, queue, config.dwell());

        Ok(Self {
            config,
            stack,
            od,
            hook,
            fast,
            clock,
            ticker,
            full_timer,
            system,
            actuator,
            diagnostics: Diagnostics::new(),
            starts: 0,
        })
    }

    /// Run the node forever
    ///
    /// Halts the platform on a failed start, and resets it on an application reset request.
    pub fn run(mut self) -> ! {
        match self.run_until_exit() {
            Exit::Fatal(e) => self.system.halt(&e),
            Exit::ApplicationReset => self.system.system_reset(),
        }
    }

    /// Run the node until a start fails or the stack requests an application reset
    ///
    /// Communication resets are handled internally, and do not return.
    pub fn run_until_exit(&mut self) -> Exit {
        if let Err(e) = self.od.set_extension(object_ids::IGNITE, self.hook) {
            error!("Cannot install hook on 0x{:X}: {:?}", object_ids::IGNITE, e);
            return Exit::Fatal(InitError::OdParameter {
                index: object_ids::IGNITE as u32,
            });
        }

        loop {
            if let Some(exit) = self.run_once() {
                return exit;
            }
        }
    }

    /// Run one instance from creation to reset
    fn run_once(&mut self) -> Option<Exit> {
        let (mut instance, bytes) = self.stack.create();
        self.starts = self.starts.wrapping_add(1);
        info!("Allocated {} bytes for CANopen objects", bytes);

        if let Err(e) = self.bring_up(&mut instance) {
            error!("Node start failed: {:?}", e);
            self.stack.destroy(instance);
            return Some(Exit::Fatal(e));
        }

        self.attach(&instance);
        match self.pump(&mut instance) {
            ResetOutcome::ApplicationReset => {
                info!("CANopen reset application request");
                // Nothing else runs before the platform reset, but the interrupt must not outlive
                // the instance
                self.stop_fast_cadence();
                Some(Exit::ApplicationReset)
            }
            _ => {
                self.teardown(instance);
                None
            }
        }
    }

    fn bring_up(&mut self, instance: &mut S::Instance) -> Result<(), InitError> {
        self.stack
            .configure_transport(instance, self.config.bitrate_kbps)?;

        if let Err(e) = self.stack.init_protocol(
            instance,
            self.od,
            &self.config.protocol,
            self.config.node_id,
        ) {
            match InitError::from_stack(InitStage::Protocol, e) {
                Some(e) => return Err(e),
                None => warn!("Node ID unconfigured, waiting for LSS assignment"),
            }
        }

        if let Err(e) = self
            .stack
            .init_process_data(instance, self.od, self.config.node_id)
        {
            if let Some(e) = InitError::from_stack(InitStage::ProcessData, e) {
                return Err(e);
            }
        }

        self.stack.set_normal_mode(instance);
        Ok(())
    }

    fn attach(&mut self, instance: &S::Instance) {
        self.fast.attach(self.stack.process_data(instance));
        self.full_timer.reset();
        self.ticker.attach(self.config.fast_period());
    }

    fn stop_fast_cadence(&mut self) {
        self.ticker.detach();
        self.fast.detach();
    }

    /// Dispatch the cooperative loop until the full tick reports a reset
    fn pump(&mut self, instance: &mut S::Instance) -> ResetOutcome {
        let queue = self.hook.queue();
        let hook = self.hook;
        let fast = self.fast;
        let clock = &self.clock;
        let stack = &mut self.stack;
        let full_timer = &mut self.full_timer;
        let actuator = &mut self.actuator;
        let diagnostics = &mut self.diagnostics;

        let mut outcome = ResetOutcome::Continue;
        queue.dispatch_forever(clock, |task| match task {
            Task::FullTick => {
                let elapsed = full_timer.elapsed();
                full_timer.reset();
                let start_us = clock.now_us();
                let result = stack.tick_full(instance, elapsed);
                diagnostics.record_tick(Duration::from_micros(
                    clock.now_us().saturating_sub(start_us),
                ));
                if result != ResetOutcome::Continue {
                    outcome = result;
                    queue.break_dispatch();
                }
            }
            Task::ReportLatency => diagnostics.report(fast.tick_count(), hook.dropped_posts()),
            Task::Actuation(event) => actuator.handle(event),
            Task::Log(msg) => info!("{}", msg),
        });
        outcome
    }

    fn teardown(&mut self, mut instance: S::Instance) {
        info!("CANopen reset communication request");
        self.stop_fast_cadence();
        self.stack.set_config_mode(&mut instance);
        self.stack.disable(&mut instance);
        self.stack.destroy(instance);
    }

    /// Number of stack instances created so far
    pub fn starts(&self) -> u32 {
        self.starts
    }

    /// The actuation controller
    pub fn actuator(&self) -> &ActuationController<B::Output, S::Od> {
        &self.actuator
    }

    /// Latency statistics of the full stack tick
    pub fn diagnostics(&self) -> &Diagnostics {
        &self.diagnostics
    }

    /// The node configuration
    pub fn config(&self) -> &NodeConfig {
        &self.config
    }

    /// The dispatch queue
    pub fn queue(&self) -> &'static TaskQueue {
        self.hook.queue()
    }

    /// Access the stack adapter
    pub fn stack(&self) -> &S {
        &self.stack
    }
}
