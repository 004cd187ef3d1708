//! Definitions for the NMT protocol, as far as the node runtime needs them

/// Possible NMT states for a node
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
pub enum NmtState {
    /// Bootup
    ///
    /// A node never remains in this state, it transitions automatically into PreOperational
    Bootup = 0,
    /// Node has been stopped
    Stopped = 4,
    /// Normal operational state
    Operational = 5,
    /// Node is awaiting command to enter operation
    PreOperational = 127,
}

impl core::fmt::Display for NmtState {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            NmtState::Bootup => write!(f, "Bootup"),
            NmtState::Stopped => write!(f, "Stopped"),
            NmtState::Operational => write!(f, "Operational"),
            NmtState::PreOperational => write!(f, "PreOperational"),
        }
    }
}

/// The result of a full stack tick
///
/// The stack reports reset requests received over NMT (or raised internally) through this value.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ResetOutcome {
    /// Keep running
    #[default]
    Continue,
    /// Reset communication: the node must be torn down and recreated
    CommunicationReset,
    /// Reset application: the device must restart
    ApplicationReset,
}

/// NMT control flags passed to the stack on protocol initialization
///
/// The low byte is a mask over the CANopen error register (object 0x1001). Together with
/// [`NmtControl::ERR_ON_ERR_REG`], any masked error register bit forces the node out of
/// operational.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "std", derive(serde::Deserialize), serde(transparent))]
pub struct NmtControl(pub u16);

impl NmtControl {
    /// Error register: generic error
    pub const ERR_REG_GENERIC_ERR: Self = Self(0x0001);
    /// Error register: current
    pub const ERR_REG_CURRENT: Self = Self(0x0002);
    /// Error register: voltage
    pub const ERR_REG_VOLTAGE: Self = Self(0x0004);
    /// Error register: temperature
    pub const ERR_REG_TEMPERATURE: Self = Self(0x0008);
    /// Error register: communication error (overrun, error state)
    pub const ERR_REG_COMMUNICATION: Self = Self(0x0010);
    /// Error register: device profile specific
    pub const ERR_REG_DEV_PROFILE: Self = Self(0x0020);
    /// Error register: manufacturer specific
    pub const ERR_REG_MANUFACTURER: Self = Self(0x0080);
    /// Enter operational automatically after bootup
    pub const STARTUP_TO_OPERATIONAL: Self = Self(0x0100);
    /// Leave operational on CAN bus-off or heartbeat consumer timeout
    pub const ERR_ON_BUSOFF_HB: Self = Self(0x1000);
    /// Leave operational when a masked error register bit is set
    pub const ERR_ON_ERR_REG: Self = Self(0x2000);
    /// Enter stopped instead of pre-operational on error
    pub const ERR_TO_STOPPED: Self = Self(0x4000);
    /// Return to operational once errors clear
    pub const ERR_FREE_TO_OPERATIONAL: Self = Self(0x8000);

    /// The default control flags for an igniter node
    pub const DEFAULT: Self = Self::ERR_ON_ERR_REG
        .union(Self::ERR_REG_GENERIC_ERR)
        .union(Self::ERR_REG_COMMUNICATION);

    /// Combine two sets of flags
    pub const fn union(self, other: Self) -> Self {
        Self(self.0 | other.0)
    }

    /// Returns true if all flags in `other` are set
    pub const fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    /// The error register mask portion of the flags
    pub const fn error_register_mask(self) -> u8 {
        (self.0 & 0xFF) as u8
    }
}

impl core::ops::BitOr for NmtControl {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self::Output {
        self.union(rhs)
    }
}
