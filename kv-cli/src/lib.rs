//! `kvcli` launches a networked key-value store server: a line-oriented
//! TCP protocol in front of [`kv::processor::CommandProcessor`].
//!
//! ## Getting started
//!
//! ```doc
//! ❯ ./kvcli --port 8888
//!
//! ██  ██  █        █
//! ██ ██   ██      ██
//! ███      ██    ██
//! ██ ██     ██  ██
//! ██  ██     ████  KV Storage CLI
//!
//! kvcli listening on 0.0.0.0:8888
//! ```
//!
//! Talking to it with `nc`:
//!
//! ```doc
//! ❯ nc localhost 8888
//! PUT color blue
//! {"status":"Ok","message":"Command succeeded."}
//! GET color
//! {"status":"Ok","result":{"value":"blue","version":1},"message":"Command succeeded."}
//! ```

pub mod server;
pub mod trace;
