//! Per-session transaction state.
//!
//! A `TransactionBuffer` exists from `START` until `COMMIT` or `ROLLBACK`.
//! It stages writes in arrival order and remembers, for every key it has
//! touched, the version that key had the first time it was touched — that
//! snapshot is what `COMMIT` validates against.

use std::collections::HashMap;

/// A staged write or delete, in the order it was issued.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Op {
    Put(String, Vec<u8>),
    Del(String),
}

impl Op {
    fn key(&self) -> &str {
        match self {
            Op::Put(key, _) => key,
            Op::Del(key) => key,
        }
    }
}

#[derive(Debug, Default)]
pub struct TransactionBuffer {
    pub ops: Vec<Op>,
    pub touched: HashMap<String, u64>,
}

impl TransactionBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records `version` as the first-touch snapshot for `key`, unless one
    /// was already captured for it this transaction.
    pub fn touch(&mut self, key: &str, version: u64) {
        self.touched.entry(key.to_owned()).or_insert(version);
    }

    pub fn push(&mut self, op: Op) {
        self.ops.push(op);
    }

    /// Scans `ops` newest-to-oldest for the most recent op mentioning
    /// `key`, implementing read-your-writes for in-transaction `GET`.
    pub fn last_op_for(&self, key: &str) -> Option<&Op> {
        self.ops.iter().rev().find(|op| op.key() == key)
    }
}
