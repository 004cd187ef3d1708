//! Object dictionary access results

use snafu::Snafu;

/// SDO abort codes returned by object dictionary accesses
///
/// Only the subset produced by the runtime and the host bindings is defined.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Snafu)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u32)]
pub enum AbortCode {
    /// Attempt to write a read-only object
    #[snafu(display("Object is read only"))]
    ReadOnly = 0x0601_0002,
    /// Object does not exist in the dictionary
    #[snafu(display("Object does not exist"))]
    NoSuchObject = 0x0602_0000,
    /// Length of the service parameter does not match
    #[snafu(display("Data type mismatch"))]
    DataTypeMismatch = 0x0607_0010,
    /// Sub index does not exist
    #[snafu(display("Sub index does not exist"))]
    NoSuchSubIndex = 0x0609_0011,
    /// General error
    #[snafu(display("General error"))]
    GeneralError = 0x0800_0000,
}

impl AbortCode {
    /// The raw 32-bit code as sent in an SDO abort message
    pub const fn raw(self) -> u32 {
        self as u32
    }
}
