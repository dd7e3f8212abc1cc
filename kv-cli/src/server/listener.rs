//! The TCP transport: accepts connections, frames them into lines, and
//! drives each one against a shared [`CommandProcessor`].
//!
//! Grounded on the teacher's `handle_reader` line loop, reworked from a
//! single local `BufRead` onto one `tokio` task per socket.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use anyhow::Result;
use kv::processor::CommandProcessor;
use log::{debug, info, warn};
use tokio::io::AsyncWriteExt;
use tokio::net::TcpListener;
use tokio_stream::StreamExt;
use tokio_util::codec::{FramedRead, LinesCodec};

const INVALID_UTF8_MESSAGE: &str = "ERROR: Invalid UTF-8 sequence\n";

static NEXT_SESSION_ID: AtomicU64 = AtomicU64::new(1);

fn next_session_id() -> String {
    format!("session_{}", NEXT_SESSION_ID.fetch_add(1, Ordering::Relaxed))
}

/// How often the background task in [`log_status`] logs a status line.
const STATUS_LOG_INTERVAL: std::time::Duration = std::time::Duration::from_secs(30);

/// Binds `addr` and serves connections until `running` is cleared (set by
/// the Ctrl-C handler in `main`).
pub async fn serve(addr: &str, processor: Arc<CommandProcessor>, running: Arc<AtomicBool>) -> Result<()> {
    let listener = TcpListener::bind(addr).await?;
    info!("kvcli listening on {}", listener.local_addr()?);
    run(listener, processor, running).await
}

/// Drives the accept loop for an already-bound listener. Split out from
/// [`serve`] so tests can bind an ephemeral port and learn its address
/// before the loop starts.
pub async fn run(
    listener: TcpListener,
    processor: Arc<CommandProcessor>,
    running: Arc<AtomicBool>,
) -> Result<()> {
    let status_task = tokio::spawn(log_status(Arc::clone(&processor), Arc::clone(&running)));

    loop {
        let (socket, peer) = tokio::select! {
            accepted = listener.accept() => accepted?,
            _ = tokio::time::sleep(std::time::Duration::from_millis(200)) => {
                if running.load(Ordering::SeqCst) {
                    continue;
                }
                break;
            }
        };

        let processor = Arc::clone(&processor);
        let session_id = next_session_id();
        info!("{} connected from {}", session_id, peer);

        tokio::spawn(async move {
            handle_connection(socket, &session_id, &processor).await;
            processor.disconnect(&session_id);
            info!("{} disconnected", session_id);
        });
    }

    status_task.abort();
    Ok(())
}

/// Logs a store/processor status line every [`STATUS_LOG_INTERVAL`] until
/// `running` is cleared. Grounded on SPEC_FULL.md's `Store::status`
/// ambient-logging promise; the transport is the only reader of
/// `store_status`/`stats` since neither is part of the wire protocol.
async fn log_status(processor: Arc<CommandProcessor>, running: Arc<AtomicBool>) {
    while running.load(Ordering::SeqCst) {
        tokio::time::sleep(STATUS_LOG_INTERVAL).await;
        let status = processor.store_status();
        let stats = processor.stats();
        info!(
            "status: store={} keys={} size={}B processed={} errors={}",
            status.name, status.keys, status.size, stats.commands_processed, stats.errors
        );
    }
}

async fn handle_connection(
    socket: tokio::net::TcpStream,
    session_id: &str,
    processor: &CommandProcessor,
) {
    let (reader, mut writer) = socket.into_split();
    let mut lines = FramedRead::new(reader, LinesCodec::new());

    while let Some(line) = lines.next().await {
        let line = match line {
            Ok(line) => line,
            Err(_) => {
                warn!("{} sent an invalid line, closing", session_id);
                let _ = writer.write_all(INVALID_UTF8_MESSAGE.as_bytes()).await;
                return;
            }
        };

        if line.trim().is_empty() {
            continue;
        }

        let response = processor.process(session_id, &line);
        debug!("{} -> {}", session_id, response.to_json());

        let mut out = response.to_json();
        out.push('\n');
        if writer.write_all(out.as_bytes()).await.is_err() {
            return;
        }
    }
}
