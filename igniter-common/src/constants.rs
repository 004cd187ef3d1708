//! Constants defining object indices and default runtime values
//!

/// Object indices used by the node runtime
pub mod object_ids {
    /// The error register object index
    pub const ERROR_REGISTER: u16 = 0x1001;
    /// The heartbeat producer time object index
    pub const HEARTBEAT_PRODUCER_TIME: u16 = 0x1017;
    /// The identity object index
    pub const IDENTITY: u16 = 0x1018;

    /// The actuator trigger object
    ///
    /// Writing 1 arms the delayed actuation, writing 0 cancels it. Reads return the actuator
    /// output state.
    pub const IGNITE: u16 = 0x2111;
    /// Sub index of the actuator trigger value
    pub const IGNITE_SUB: u8 = 0;
}

/// Trigger values accepted by the [`IGNITE`](object_ids::IGNITE) object
pub mod values {
    /// Arm the delayed actuation
    pub const IGNITE_CMD: u8 = 1;
    /// Cancel a pending actuation
    pub const CANCEL_CMD: u8 = 0;
}

/// Default timing and protocol values
pub mod defaults {
    use core::time::Duration;

    /// CAN bit rate in kbit/s
    pub const BITRATE_KBPS: u16 = 500;
    /// Delay before the first heartbeat is produced
    pub const FIRST_HEARTBEAT_MS: u16 = 500;
    /// SDO server timeout
    pub const SDO_SERVER_TIMEOUT_MS: u16 = 1000;
    /// SDO client timeout
    pub const SDO_CLIENT_TIMEOUT_MS: u16 = 500;
    /// The node ID used when none is configured
    pub const NODE_ID: u8 = 0x05;

    /// Period of the interrupt driven process data cadence
    pub const FAST_PERIOD: Duration = Duration::from_micros(1000);
    /// Period of the cooperative full stack cadence
    pub const FULL_PERIOD: Duration = Duration::from_millis(1);
    /// Period of the latency report
    pub const REPORT_PERIOD: Duration = Duration::from_secs(1);
    /// Dwell of each actuation phase
    pub const DWELL: Duration = Duration::from_secs(3);
}
