//! The per-session command processor.
//!
//! `CommandProcessor` owns the `Store` and a table of per-session
//! transaction buffers. It has no knowledge of sockets or line framing —
//! the transport hands it a `(session_id, line)` pair and gets back a
//! [`Response`] to serialize onto the wire. See `kv-cli::server` for the
//! transport that drives this.

use std::collections::HashMap;
use std::sync::Mutex;

use serde_derive::Serialize;
use serde_json::Value;

use crate::error::Error;
use crate::store::{Status, Store};
use crate::transaction::{Op, TransactionBuffer};


/// One JSON reply per command, matching the wire contract exactly:
/// `status` is always present, `result` only when the command produced
/// user data, `message` a short human string (possibly null).
#[derive(Debug, Serialize, PartialEq)]
pub struct Response {
    pub status: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    pub message: Option<String>,
}

impl Response {
    fn ok(result: Option<Value>, message: impl Into<String>) -> Self {
        Response { status: "Ok", result, message: Some(message.into()) }
    }

    fn error(message: impl Into<String>) -> Self {
        Response { status: "Error", result: None, message: Some(message.into()) }
    }

    /// Renders the response as a single JSON line, without the trailing
    /// newline — the transport owns line termination.
    pub fn to_json(&self) -> String {
        serde_json::to_string(self).expect("Response always serializes")
    }
}

/// Running counters for logging/diagnostics. Not part of the wire
/// protocol; read periodically by the transport's status log line (see
/// `kv-cli::server::listener`).
#[derive(Debug, Default, Clone, Copy)]
pub struct Stats {
    pub commands_processed: u64,
    pub errors: u64,
}

pub struct CommandProcessor {
    store: Store,
    sessions: Mutex<HashMap<String, TransactionBuffer>>,
    stats: Mutex<Stats>,
}

impl CommandProcessor {
    pub fn new(store: Store) -> Self {
        Self { store, sessions: Mutex::new(HashMap::new()), stats: Mutex::new(Stats::default()) }
    }

    pub fn stats(&self) -> Stats {
        *self.stats.lock().unwrap()
    }

    /// The store's point-in-time status, for the transport's periodic
    /// log line. `CommandProcessor` keeps `store` private, so this is
    /// the only way `kv-cli` can see it.
    pub fn store_status(&self) -> Status {
        self.store.status()
    }

    /// Drops any open transaction for `session_id`. Equivalent to an
    /// implicit `ROLLBACK`; the transport calls this when a connection
    /// closes.
    pub fn disconnect(&self, session_id: &str) {
        self.sessions.lock().unwrap().remove(session_id);
    }

    /// Parses and executes one command line for `session_id`.
    pub fn process(&self, session_id: &str, line: &str) -> Response {
        let response = self.dispatch(session_id, line);

        let mut stats = self.stats.lock().unwrap();
        stats.commands_processed += 1;
        if response.status == "Error" {
            stats.errors += 1;
        }

        response
    }

    fn dispatch(&self, session_id: &str, line: &str) -> Response {
        let tokens: Vec<&str> = line.split_whitespace().collect();
        let Some(verb) = tokens.first() else {
            return Response::error(Error::InvalidCommand("Invalid command.".to_string()));
        };

        match verb.to_ascii_uppercase().as_str() {
            "START" => self.start(session_id),
            "COMMIT" => self.commit(session_id),
            "ROLLBACK" => self.rollback(session_id),
            "PUT" => self.put(session_id, &tokens),
            "GET" => self.get(session_id, &tokens),
            "DEL" => self.del(session_id, &tokens),
            _ => Response::error(Error::InvalidCommand("Invalid command.".to_string())),
        }
    }

    fn start(&self, session_id: &str) -> Response {
        let mut sessions = self.sessions.lock().unwrap();
        if sessions.contains_key(session_id) {
            return Response::error(Error::AlreadyInTransaction.to_string());
        }
        sessions.insert(session_id.to_owned(), TransactionBuffer::new());
        Response::ok(None, "Transaction Started.")
    }

    fn rollback(&self, session_id: &str) -> Response {
        let mut sessions = self.sessions.lock().unwrap();
        match sessions.remove(session_id) {
            Some(_) => Response::ok(None, "Transaction rolled back."),
            None => Response::error(Error::NoTransaction.to_string()),
        }
    }

    fn commit(&self, session_id: &str) -> Response {
        let buffer = match self.sessions.lock().unwrap().remove(session_id) {
            Some(buffer) => buffer,
            None => return Response::error(Error::NoTransaction.to_string()),
        };

        let mut table = self.store.lock();

        for (key, &expected_version) in &buffer.touched {
            let current_version =
                Store::get_nolock(&table, key).map(|entry| entry.version).unwrap_or(1);
            if current_version != expected_version {
                return Response::error(Error::VersionConflict.to_string());
            }
        }

        for op in buffer.ops {
            match op {
                Op::Put(key, value) => {
                    Store::set_nolock(&mut table, &key, value);
                }
                Op::Del(key) => {
                    // Idempotent: the version check above already proved
                    // consistency, so a key absent by the time we replay
                    // is simply a no-op rather than an error.
                    let _ = Store::delete_nolock(&mut table, &key);
                }
            }
        }

        Response::ok(None, "Transaction committed.")
    }

    fn put(&self, session_id: &str, tokens: &[&str]) -> Response {
        if tokens.len() < 3 {
            return Response::error(Error::InvalidCommand(
                "PUT expects at least 3 arguments.".to_string(),
            ));
        }
        let key = tokens[1];
        let value = tokens[2..].join(" ").into_bytes();

        let mut sessions = self.sessions.lock().unwrap();
        if let Some(buffer) = sessions.get_mut(session_id) {
            buffer.push(Op::Put(key.to_owned(), value));
            if !buffer.touched.contains_key(key) {
                drop(sessions);
                let version = self.current_version(key);
                sessions = self.sessions.lock().unwrap();
                if let Some(buffer) = sessions.get_mut(session_id) {
                    buffer.touch(key, version);
                }
            }
            return Response::ok(None, format!("PUT buffered for key '{}'.", key));
        }
        drop(sessions);

        self.store.set(key, value);
        Response::ok(None, "Command succeeded.")
    }

    fn get(&self, session_id: &str, tokens: &[&str]) -> Response {
        if tokens.len() != 2 {
            return Response::error(Error::InvalidCommand(
                "GET expects 2 arguments".to_string(),
            ));
        }
        let key = tokens[1];

        let buffered = {
            let sessions = self.sessions.lock().unwrap();
            sessions.get(session_id).and_then(|buffer| buffer.last_op_for(key).cloned())
        };

        match buffered {
            Some(Op::Put(_, value)) => {
                let text = String::from_utf8_lossy(&value).into_owned();
                Response::ok(Some(Value::String(text)), "GET from transaction buffer")
            }
            Some(Op::Del(_)) => Response::error(format!(
                "Key {} was deleted in this transaction",
                key
            )),
            None => match self.store.get(key) {
                Ok(entry) => {
                    let result = serde_json::json!({
                        "value": String::from_utf8_lossy(&entry.value),
                        "version": entry.version,
                    });
                    Response::ok(Some(result), "Command succeeded.")
                }
                Err(err) => Response::error(err.to_string()),
            },
        }
    }

    fn del(&self, session_id: &str, tokens: &[&str]) -> Response {
        if tokens.len() != 2 {
            return Response::error(Error::InvalidCommand(
                "DELETE expects 2 arguments".to_string(),
            ));
        }
        let key = tokens[1];

        let mut sessions = self.sessions.lock().unwrap();
        if let Some(buffer) = sessions.get_mut(session_id) {
            buffer.push(Op::Del(key.to_owned()));
            if !buffer.touched.contains_key(key) {
                drop(sessions);
                let version = self.current_version(key);
                sessions = self.sessions.lock().unwrap();
                if let Some(buffer) = sessions.get_mut(session_id) {
                    buffer.touch(key, version);
                }
            }
            return Response::ok(None, format!("DELETE buffered for key '{}'.", key));
        }
        drop(sessions);

        match self.store.delete(key) {
            Ok(()) => Response::ok(None, "Command succeeded."),
            Err(err) => Response::error(err.to_string()),
        }
    }

    /// The version a fresh touch of `key` should capture: its current
    /// version, or the sentinel `1` if it doesn't exist yet.
    fn current_version(&self, key: &str) -> u64 {
        let table = self.store.lock();
        Store::get_nolock(&table, key).map(|entry| entry.version).unwrap_or(1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn processor() -> CommandProcessor {
        CommandProcessor::new(Store::new())
    }

    fn result_str(response: &Response) -> &str {
        response.result.as_ref().unwrap().as_str().unwrap()
    }

    #[test]
    fn non_transactional_put_get() {
        let p = processor();
        assert_eq!(p.process("s", "PUT foo 123").status, "Ok");
        let resp = p.process("s", "GET foo");
        assert_eq!(resp.status, "Ok");
        assert_eq!(resp.result.unwrap()["value"], "123");
    }

    #[test]
    fn missing_get_reports_not_found() {
        let p = processor();
        let resp = p.process("s", "GET missing");
        assert_eq!(resp.status, "Error");
        assert_eq!(resp.message.unwrap(), "Key does not exist.");
    }

    #[test]
    fn overwrite_updates_value() {
        let p = processor();
        p.process("s", "PUT foo original");
        p.process("s", "PUT foo updated");
        let resp = p.process("s", "GET foo");
        assert_eq!(resp.result.unwrap()["value"], "updated");
    }

    #[test]
    fn transaction_commit_is_visible() {
        let p = processor();
        p.process("s", "START");
        p.process("s", "PUT alpha 1");
        p.process("s", "PUT beta 2");
        let commit = p.process("s", "COMMIT");
        assert_eq!(commit.status, "Ok");
        let resp = p.process("s", "GET alpha");
        assert_eq!(resp.result.unwrap()["value"], "1");
    }

    #[test]
    fn transactions_are_isolated_per_session() {
        let p = processor();
        p.process("a", "START");
        p.process("a", "PUT x value-a");
        p.process("b", "START");
        p.process("b", "PUT x value-b");

        assert_eq!(result_str(&p.process("a", "GET x")), "value-a");
        assert_eq!(result_str(&p.process("b", "GET x")), "value-b");
    }

    #[test]
    fn nested_start_errors() {
        let p = processor();
        p.process("s", "START");
        let resp = p.process("s", "START");
        assert_eq!(resp.status, "Error");
        assert_eq!(resp.message.unwrap(), "Already in transaction.");
    }

    #[test]
    fn read_your_writes_inside_transaction() {
        let p = processor();
        p.process("s", "PUT foo original");
        p.process("s", "START");
        p.process("s", "PUT foo modified");
        assert_eq!(result_str(&p.process("s", "GET foo")), "modified");
    }

    #[test]
    fn rollback_discards_buffered_writes() {
        let p = processor();
        p.process("s", "START");
        p.process("s", "PUT x 999");
        let resp = p.process("s", "ROLLBACK");
        assert_eq!(resp.message.unwrap(), "Transaction rolled back.");
        assert_eq!(p.process("s", "GET x").status, "Error");
    }

    #[test]
    fn get_of_deleted_key_inside_transaction_errors() {
        let p = processor();
        p.process("s", "PUT foo 1");
        p.process("s", "START");
        p.process("s", "DEL foo");
        let resp = p.process("s", "GET foo");
        assert_eq!(resp.status, "Error");
        assert_eq!(resp.message.unwrap(), "Key foo was deleted in this transaction");
    }

    #[test]
    fn commit_rejects_a_stale_touch() {
        let p = processor();
        p.process("s", "PUT x 1");
        p.process("s", "START");
        p.process("s", "PUT x 2");
        // A concurrent, non-transactional write changes x's version
        // before s commits.
        p.process("other", "PUT x 3");
        let resp = p.process("s", "COMMIT");
        assert_eq!(resp.status, "Error");
        assert_eq!(
            resp.message.unwrap(),
            "Key version has changed since we last touched the key"
        );
        // The buffer is discarded; the session returns to no-transaction.
        assert_eq!(p.process("s", "ROLLBACK").status, "Error");
    }

    #[test]
    fn repeated_put_in_one_transaction_applies_cumulatively() {
        let p = processor();
        p.process("s", "START");
        p.process("s", "PUT x 1");
        p.process("s", "PUT x 2");
        p.process("s", "COMMIT");
        let resp = p.process("s", "GET x");
        assert_eq!(resp.result.unwrap()["version"], 2);
    }

    #[test]
    fn commit_with_no_ops_is_a_noop() {
        let p = processor();
        p.process("s", "START");
        assert_eq!(p.process("s", "COMMIT").status, "Ok");
    }

    #[test]
    fn argument_count_is_validated() {
        let p = processor();
        assert_eq!(
            p.process("s", "PUT onlykey").message.unwrap(),
            "PUT expects at least 3 arguments."
        );
        assert_eq!(p.process("s", "GET").message.unwrap(), "GET expects 2 arguments");
        assert_eq!(p.process("s", "DEL").message.unwrap(), "DELETE expects 2 arguments");
    }

    #[test]
    fn unknown_command_is_invalid() {
        let p = processor();
        assert_eq!(p.process("s", "FROB x").message.unwrap(), "Invalid command.");
    }

    #[test]
    fn commit_without_transaction_errors() {
        let p = processor();
        assert_eq!(p.process("s", "COMMIT").message.unwrap(), "No transaction in progress");
    }

    #[test]
    fn disconnect_discards_open_transaction() {
        let p = processor();
        p.process("s", "START");
        p.process("s", "PUT x 1");
        p.disconnect("s");
        assert_eq!(p.process("s", "ROLLBACK").status, "Error");
        assert_eq!(p.process("s", "GET x").status, "Error");
    }

    #[test]
    fn concurrent_commits_do_not_interleave() {
        use std::sync::Arc;
        use std::thread;

        let p = Arc::new(processor());
        p.process("c1", "START");
        p.process("c2", "START");
        for i in 0..200 {
            p.process("c1", &format!("PUT key{} 1", i));
            p.process("c2", &format!("PUT key{} 2", i));
        }

        let p1 = Arc::clone(&p);
        let p2 = Arc::clone(&p);
        let t1 = thread::spawn(move || p1.process("c1", "COMMIT"));
        let t2 = thread::spawn(move || p2.process("c2", "COMMIT"));
        let (r1, r2) = (t1.join().unwrap(), t2.join().unwrap());

        // Exactly one of the two transactions wins.
        assert!((r1.status == "Ok") ^ (r2.status == "Ok"));

        let winner = if r1.status == "Ok" { "1" } else { "2" };
        for i in 0..200 {
            let resp = p.process("c1", &format!("GET key{}", i));
            assert_eq!(resp.result.unwrap()["value"], winner);
        }
    }
}
