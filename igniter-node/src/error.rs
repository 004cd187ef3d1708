//! Error types reported during node start up

use snafu::Snafu;

/// Error returned by the stack when configuring the CAN transport
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct TransportError {
    /// Stack specific error code
    pub code: i16,
}

impl core::fmt::Display for TransportError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "transport error {}", self.code)
    }
}

impl core::error::Error for TransportError {}

/// The task queue had no room for the cadence tasks
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct QueueFullError;

impl core::fmt::Display for QueueFullError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "task queue full")
    }
}

impl core::error::Error for QueueFullError {}

/// Error returned by the stack from protocol or process data initialization
#[derive(Debug, Clone, Copy, PartialEq, Eq, Snafu)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum StackError {
    /// An object dictionary entry required by the stack is missing or malformed
    #[snafu(display("bad object dictionary parameter 0x{index:X}"))]
    OdParameters {
        /// The offending entry, as reported by the stack
        index: u32,
    },
    /// The node ID is unconfigured, and the stack is waiting for LSS to assign one
    #[snafu(display("node ID unconfigured, waiting for LSS"))]
    NodeIdUnconfigured,
    /// Any other stack error
    #[snafu(display("stack error {code}"))]
    Other {
        /// Stack specific error code
        code: i16,
    },
}

/// The initialization step which failed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum InitStage {
    /// Protocol (NMT, heartbeat, SDO, emergency) initialization
    Protocol,
    /// Process data object initialization
    ProcessData,
}

impl core::fmt::Display for InitStage {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            InitStage::Protocol => write!(f, "CANopen"),
            InitStage::ProcessData => write!(f, "PDO"),
        }
    }
}

/// A fatal error during node start up
///
/// None of these are retried: the runtime halts the platform with the error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Snafu)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum InitError {
    /// The CAN transport could not be configured
    #[snafu(display("CAN initialization failed: {code}"))]
    Transport {
        /// Stack specific error code
        code: i16,
    },
    /// An object dictionary entry is missing or malformed
    #[snafu(display("Object Dictionary entry 0x{index:X}"))]
    OdParameter {
        /// The offending entry
        index: u32,
    },
    /// The stack failed to initialize for another reason
    #[snafu(display("{stage} initialization failed: {code}"))]
    StackInit {
        /// Which step failed
        stage: InitStage,
        /// Stack specific error code
        code: i16,
    },
}

impl From<TransportError> for InitError {
    fn from(value: TransportError) -> Self {
        InitError::Transport { code: value.code }
    }
}

impl InitError {
    /// Convert a stack error raised during `stage`
    ///
    /// Returns `None` for errors which are not fatal: an unconfigured node ID during protocol
    /// initialization only means the node must wait for an LSS assignment.
    pub fn from_stack(stage: InitStage, error: StackError) -> Option<Self> {
        match (stage, error) {
            (_, StackError::OdParameters { index }) => Some(InitError::OdParameter { index }),
            (InitStage::Protocol, StackError::NodeIdUnconfigured) => None,
            // The stack has no distinct code for this outside of protocol init
            (stage, StackError::NodeIdUnconfigured) => Some(InitError::StackInit { stage, code: -1 }),
            (stage, StackError::Other { code }) => Some(InitError::StackInit { stage, code }),
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_stack_error_classification() {
        assert_eq!(
            Some(InitError::OdParameter { index: 0x1017 }),
            InitError::from_stack(InitStage::ProcessData, StackError::OdParameters { index: 0x1017 })
        );
        assert_eq!(
            None,
            InitError::from_stack(InitStage::Protocol, StackError::NodeIdUnconfigured)
        );
        assert!(
            InitError::from_stack(InitStage::ProcessData, StackError::NodeIdUnconfigured).is_some()
        );
        assert_eq!(
            Some(InitError::StackInit {
                stage: InitStage::Protocol,
                code: -3
            }),
            InitError::from_stack(InitStage::Protocol, StackError::Other { code: -3 })
        );
    }

    #[test]
    fn test_messages() {
        assert_eq!(
            "Object Dictionary entry 0x2111",
            InitError::OdParameter { index: 0x2111 }.to_string()
        );
        assert_eq!(
            "PDO initialization failed: -12",
            InitError::StackInit {
                stage: InitStage::ProcessData,
                code: -12
            }
            .to_string()
        );
        assert_eq!(
            "CAN initialization failed: -1",
            InitError::from(TransportError { code: -1 }).to_string()
        );
    }
}
