//! Node ID type
//!

use snafu::Snafu;

/// The node ID of a CANopen node
///
/// Configured nodes use IDs 1 through 127. The raw value 255 marks a node which has not yet been
/// assigned an ID, and must wait for one to be assigned over LSS.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "std", derive(serde::Deserialize), serde(try_from = "u8"))]
pub enum NodeId {
    /// No ID assigned (255)
    Unconfigured,
    /// A valid ID in the range 1..=127
    Configured(u8),
}

/// Error returned when a raw value is not a valid node ID
#[derive(Debug, Clone, Copy, PartialEq, Eq, Snafu)]
#[snafu(display("Invalid node ID {value}"))]
pub struct InvalidNodeIdError {
    /// The rejected raw value
    pub value: u8,
}

impl NodeId {
    const UNCONFIGURED_RAW: u8 = 255;

    /// Create a NodeId from a raw value
    ///
    /// Usable in const context, so firmware can declare its ID as a constant.
    pub const fn new(value: u8) -> Result<Self, InvalidNodeIdError> {
        match value {
            1..=127 => Ok(NodeId::Configured(value)),
            Self::UNCONFIGURED_RAW => Ok(NodeId::Unconfigured),
            _ => Err(InvalidNodeIdError { value }),
        }
    }

    /// The raw ID, 255 when unconfigured
    pub const fn raw(&self) -> u8 {
        match self {
            NodeId::Unconfigured => Self::UNCONFIGURED_RAW,
            NodeId::Configured(id) => *id,
        }
    }

    /// Returns true if a valid ID is assigned
    pub const fn is_configured(&self) -> bool {
        matches!(self, NodeId::Configured(_))
    }
}

impl TryFrom<u8> for NodeId {
    type Error = InvalidNodeIdError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        NodeId::new(value)
    }
}

impl From<NodeId> for u8 {
    fn from(value: NodeId) -> Self {
        value.raw()
    }
}

impl core::fmt::Display for NodeId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            NodeId::Unconfigured => write!(f, "unconfigured"),
            NodeId::Configured(id) => write!(f, "{id}"),
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_node_id_range() {
        assert_eq!(Err(InvalidNodeIdError { value: 0 }), NodeId::new(0));
        assert_eq!(Ok(NodeId::Configured(1)), NodeId::new(1));
        assert_eq!(Ok(NodeId::Configured(127)), NodeId::new(127));
        assert!(NodeId::new(128).is_err());
        assert_eq!(Ok(NodeId::Unconfigured), NodeId::try_from(255));
        assert_eq!(255u8, NodeId::Unconfigured.into());
        assert!(!NodeId::Unconfigured.is_configured());
    }
}
