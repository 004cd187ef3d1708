//! The interface to the CANopen protocol stack
//!
//! The protocol engine itself (NMT, heartbeat, SDO and PDO state machines, frame encoding) is not
//! part of this crate. An adapter implements [`CanOpenStack`] on top of it, and the
//! [`Runtime`](crate::Runtime) sequences the calls.

use core::time::Duration;

use igniter_common::{NodeId, ProtocolParams, ResetOutcome};

use crate::{
    error::{StackError, TransportError},
    object_dict::ObjectDictionary,
};

/// The process data half of a stack instance
///
/// This is the only part of an instance reachable from the fast cadence interrupt, so it must
/// synchronize its own state with the rest of the instance.
pub trait ProcessDataPath: Send {
    /// Process received PDOs
    fn process_rpdo(&self, elapsed: Duration);

    /// Process transmit PDOs
    fn process_tpdo(&self, elapsed: Duration);
}

/// Adapter for a CANopen protocol stack
///
/// Instances are created with [`create`](CanOpenStack::create), and always released with
/// [`destroy`](CanOpenStack::destroy) before the next one is created. The adapter owns its binding
/// to the CAN peripheral.
pub trait CanOpenStack {
    /// A live stack instance
    type Instance;
    /// Handle to the process data path of an instance
    type ProcessData: ProcessDataPath + 'static;
    /// The object dictionary the stack serves
    type Od: ObjectDictionary + 'static;

    /// Allocate a new stack instance
    ///
    /// Returns the instance and the number of bytes allocated for it.
    fn create(&mut self) -> (Self::Instance, usize);

    /// Bind the instance to the CAN peripheral at the given bit rate
    fn configure_transport(
        &mut self,
        instance: &mut Self::Instance,
        bitrate_kbps: u16,
    ) -> Result<(), TransportError>;

    /// Initialize NMT, heartbeat, emergency and SDO objects
    fn init_protocol(
        &mut self,
        instance: &mut Self::Instance,
        od: &Self::Od,
        params: &ProtocolParams,
        node_id: NodeId,
    ) -> Result<(), StackError>;

    /// Initialize the RPDO and TPDO objects
    fn init_process_data(
        &mut self,
        instance: &mut Self::Instance,
        od: &Self::Od,
        node_id: NodeId,
    ) -> Result<(), StackError>;

    /// Switch the CAN module to normal operation
    fn set_normal_mode(&mut self, instance: &mut Self::Instance);

    /// Switch the CAN module back to configuration mode
    fn set_config_mode(&mut self, instance: &mut Self::Instance);

    /// Disable the CAN module
    fn disable(&mut self, instance: &mut Self::Instance);

    /// Release an instance
    fn destroy(&mut self, instance: Self::Instance);

    /// Get a handle to the process data path of an instance
    ///
    /// The handle is handed to the fast cadence, and dropped before the instance is destroyed.
    fn process_data(&self, instance: &Self::Instance) -> Self::ProcessData;

    /// Run the full stack processing
    ///
    /// `elapsed` is the time since the previous call.
    fn tick_full(&mut self, instance: &mut Self::Instance, elapsed: Duration) -> ResetOutcome;
}
