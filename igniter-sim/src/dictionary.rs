//! An in-memory object dictionary
use std::{collections::BTreeMap, sync::Mutex};

use igniter_node::{
    common::{constants::object_ids, AbortCode},
    ObjectDictionary, ObjectExtension,
};

/// An object dictionary held in memory
///
/// Values are stored as raw little endian bytes, keyed by index and sub index. Accesses through
/// [`read`](Self::read) and [`write`](Self::write) model SDO or PDO accesses, and are routed
/// through the extension installed on the object, if any.
#[derive(Default)]
pub struct MemoryDictionary {
    entries: Mutex<BTreeMap<(u16, u8), Vec<u8>>>,
    extensions: Mutex<BTreeMap<u16, &'static dyn ObjectExtension>>,
}

impl core::fmt::Debug for MemoryDictionary {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("MemoryDictionary")
            .field("entries", &*self.entries.lock().unwrap())
            .finish()
    }
}

impl MemoryDictionary {
    /// Create an empty dictionary
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a dictionary with the objects used by a node
    ///
    /// Contains the error register, the heartbeat producer time, the identity object and the
    /// actuator trigger.
    pub fn with_defaults() -> Self {
        let od = Self::new();
        od.insert(object_ids::ERROR_REGISTER, 0, &[0]);
        od.insert(object_ids::HEARTBEAT_PRODUCER_TIME, 0, &1000u16.to_le_bytes());
        od.insert(object_ids::IDENTITY, 0, &[4]);
        od.insert(object_ids::IDENTITY, 1, &0x0000_0321u32.to_le_bytes());
        od.insert(object_ids::IDENTITY, 2, &0x0000_2111u32.to_le_bytes());
        od.insert(object_ids::IDENTITY, 3, &1u32.to_le_bytes());
        od.insert(object_ids::IDENTITY, 4, &0u32.to_le_bytes());
        od.insert(object_ids::IGNITE, object_ids::IGNITE_SUB, &[0]);
        od
    }

    /// Move the dictionary to the heap and leak it
    pub fn leak(self) -> &'static Self {
        Box::leak(Box::new(self))
    }

    /// Insert or replace a sub object
    pub fn insert(&self, index: u16, sub: u8, value: &[u8]) {
        self.entries
            .lock()
            .unwrap()
            .insert((index, sub), value.to_vec());
    }

    /// Remove all sub objects of an object
    pub fn remove(&self, index: u16) {
        self.entries
            .lock()
            .unwrap()
            .retain(|(i, _), _| *i != index);
    }

    /// Returns true if the object exists
    pub fn contains(&self, index: u16) -> bool {
        self.entries
            .lock()
            .unwrap()
            .range((index, 0)..=(index, u8::MAX))
            .next()
            .is_some()
    }

    fn lookup(&self, index: u16, sub: u8) -> Result<Vec<u8>, AbortCode> {
        let entries = self.entries.lock().unwrap();
        match entries.get(&(index, sub)) {
            Some(value) => Ok(value.clone()),
            None if self.contains_locked(&entries, index) => Err(AbortCode::NoSuchSubIndex),
            None => Err(AbortCode::NoSuchObject),
        }
    }

    fn contains_locked(&self, entries: &BTreeMap<(u16, u8), Vec<u8>>, index: u16) -> bool {
        entries.range((index, 0)..=(index, u8::MAX)).next().is_some()
    }

    fn extension(&self, index: u16) -> Option<&'static dyn ObjectExtension> {
        self.extensions.lock().unwrap().get(&index).copied()
    }

    /// The stored value, bypassing any extension
    pub fn stored(&self, index: u16, sub: u8) -> Result<Vec<u8>, AbortCode> {
        self.lookup(index, sub)
    }

    /// The stored value of a u8 sub object, bypassing any extension
    pub fn stored_u8(&self, index: u16, sub: u8) -> Result<u8, AbortCode> {
        match self.lookup(index, sub)?.as_slice() {
            [value] => Ok(*value),
            _ => Err(AbortCode::DataTypeMismatch),
        }
    }

    /// Read a sub object as a remote client would
    pub fn read(&self, index: u16, sub: u8) -> Result<Vec<u8>, AbortCode> {
        let stored = self.lookup(index, sub)?;
        match self.extension(index) {
            Some(ext) => {
                let mut buf = vec![0u8; stored.len()];
                let len = ext.read(sub, &stored, &mut buf)?;
                buf.truncate(len);
                Ok(buf)
            }
            None => Ok(stored),
        }
    }

    /// Write a sub object as a remote client would
    ///
    /// Without an extension the value is stored, and must match the stored size.
    pub fn write(&self, index: u16, sub: u8, data: &[u8]) -> Result<(), AbortCode> {
        // The extension is called without holding any dictionary lock, as it may store values
        if let Some(ext) = self.extension(index) {
            return ext.write(sub, data);
        }
        let mut entries = self.entries.lock().unwrap();
        let known = self.contains_locked(&entries, index);
        match entries.get_mut(&(index, sub)) {
            Some(value) if value.len() == data.len() => {
                value.copy_from_slice(data);
                Ok(())
            }
            Some(_) => Err(AbortCode::DataTypeMismatch),
            None if known => Err(AbortCode::NoSuchSubIndex),
            None => Err(AbortCode::NoSuchObject),
        }
    }
}

impl ObjectDictionary for MemoryDictionary {
    fn set_extension(
        &self,
        index: u16,
        extension: &'static dyn ObjectExtension,
    ) -> Result<(), AbortCode> {
        if !self.contains(index) {
            return Err(AbortCode::NoSuchObject);
        }
        self.extensions.lock().unwrap().insert(index, extension);
        Ok(())
    }

    fn store_u8(&self, index: u16, sub: u8, value: u8) -> Result<(), AbortCode> {
        let mut entries = self.entries.lock().unwrap();
        let known = self.contains_locked(&entries, index);
        match entries.get_mut(&(index, sub)) {
            Some(stored) if stored.len() == 1 => {
                stored[0] = value;
                Ok(())
            }
            Some(_) => Err(AbortCode::DataTypeMismatch),
            None if known => Err(AbortCode::NoSuchSubIndex),
            None => Err(AbortCode::NoSuchObject),
        }
    }
}
