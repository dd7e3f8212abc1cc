//! The versioned key-value store.
//!
//! `Store` is a plain `BTreeMap` behind a `Mutex`. Every successful
//! overwrite bumps the entry's version by one; deleting a key erases all
//! memory of it, so recreating it starts back at version 1.
//!
//! The `_nolock` family assumes the caller already holds the guard
//! returned by [`Store::lock`] — they exist so the command processor can
//! run its touched-key version check and the op replay of a `COMMIT`
//! under a single critical section.

use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard};

use serde_derive::Serialize;

use crate::error::{CResult, Error};

/// A value held in the store, together with its version.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Entry {
    pub value: Vec<u8>,
    pub version: u64,
}

/// Point-in-time summary of the store, for logging and diagnostics only.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Status {
    pub name: &'static str,
    pub keys: u64,
    /// Total size in bytes of all live values.
    pub size: u64,
}

pub type Table = BTreeMap<String, Entry>;

pub struct Store {
    data: Mutex<Table>,
}

impl Store {
    pub fn new() -> Self {
        Self { data: Mutex::new(BTreeMap::new()) }
    }

    /// Acquires the store lock for the caller. Used by the command
    /// processor's `COMMIT` path, which needs one critical section
    /// spanning the version check and the op replay.
    pub fn lock(&self) -> MutexGuard<'_, Table> {
        self.data.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn set(&self, key: &str, value: Vec<u8>) -> Entry {
        let mut table = self.lock();
        Self::set_nolock(&mut table, key, value)
    }

    pub fn get(&self, key: &str) -> CResult<Entry> {
        let table = self.lock();
        Self::get_nolock(&table, key).cloned().ok_or(Error::NotFound)
    }

    pub fn delete(&self, key: &str) -> CResult<()> {
        let mut table = self.lock();
        Self::delete_nolock(&mut table, key)
    }

    pub fn status(&self) -> Status {
        let table = self.lock();
        let size = table.values().map(|entry| entry.value.len() as u64).sum();
        Status { name: "memory", keys: table.len() as u64, size }
    }

    /// Sets `key`, replacing any existing value and incrementing its
    /// version, or creating it at version 1. Never fails.
    pub fn set_nolock(table: &mut Table, key: &str, value: Vec<u8>) -> Entry {
        let version = table.get(key).map(|e| e.version + 1).unwrap_or(1);
        let entry = Entry { value, version };
        table.insert(key.to_owned(), entry.clone());
        entry
    }

    pub fn get_nolock<'a>(table: &'a Table, key: &str) -> Option<&'a Entry> {
        table.get(key)
    }

    pub fn delete_nolock(table: &mut Table, key: &str) -> CResult<()> {
        table.remove(key).map(|_| ()).ok_or(Error::NotFound)
    }
}

impl Default for Store {
    fn default() -> Self {
        Self::new()
    }
}
