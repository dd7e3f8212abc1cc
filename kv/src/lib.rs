//! `kv` is a networked in-memory key-value store with per-key monotonic
//! versions and optimistic, write-tracked transactions.
//!
//! A [`store::Store`] holds the live data behind a single lock. A
//! [`processor::CommandProcessor`] sits in front of it, multiplexing many
//! concurrent sessions: each session may stage `PUT`/`DEL` ops in a
//! [`transaction::TransactionBuffer`] via `START`, and `COMMIT` validates
//! that every key the transaction touched still has the version it had
//! when first touched before applying the buffer atomically.
//!
//! ## Getting started
//!
//! ```rust
//! use kv::store::Store;
//! use kv::processor::CommandProcessor;
//!
//! let processor = CommandProcessor::new(Store::new());
//! processor.process("session_1", "PUT color blue");
//! let response = processor.process("session_1", "GET color");
//! assert_eq!(response.status, "Ok");
//! ```

pub mod error;
pub mod processor;
pub mod store;
pub mod transaction;
