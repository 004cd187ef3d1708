//! Access to the application object dictionary
//!
//! The dictionary storage belongs to the stack adapter. The runtime only needs to hook writes on
//! one entry, and to store the actuator state back into it.

use igniter_common::AbortCode;

/// Intercepts accesses to one object
///
/// Extensions are called from whichever context the stack accesses the object in: the SDO server
/// runs in the full stack tick, but RPDOs are written from the fast cadence interrupt.
pub trait ObjectExtension: Sync {
    /// Read the object
    ///
    /// `stored` holds the current value in the dictionary storage. The default passes it through
    /// unmodified.
    fn read(&self, sub: u8, stored: &[u8], buf: &mut [u8]) -> Result<usize, AbortCode> {
        let _ = sub;
        let len = stored.len().min(buf.len());
        buf[..len].copy_from_slice(&stored[..len]);
        Ok(len)
    }

    /// Write the object
    ///
    /// The dictionary storage is not updated; an extension which wants the value stored must
    /// store it itself.
    fn write(&self, sub: u8, data: &[u8]) -> Result<(), AbortCode>;
}

/// Operations the runtime performs on the object dictionary
pub trait ObjectDictionary: Sync {
    /// Install an extension on the object at `index`
    ///
    /// Replaces any previous extension. Fails with [`AbortCode::NoSuchObject`] if the object does
    /// not exist.
    fn set_extension(
        &self,
        index: u16,
        extension: &'static dyn ObjectExtension,
    ) -> Result<(), AbortCode>;

    /// Store a u8 value directly to the object storage, bypassing any extension
    fn store_u8(&self, index: u16, sub: u8, value: u8) -> Result<(), AbortCode>;
}
