//! Background shell output pump.
//!
//! The pump owns a dedicated task that reads the shell stream, decodes each
//! chunk as single-byte ASCII, and pushes it into an unbounded mpsc channel.
//! Consumer logic never runs on the read task: a host either drains the
//! [`OutputReceiver`] itself or uses [`callback_sink`] to have a separate
//! delivery task invoke a callback. Chunks arrive in read order.
//!
//! The pump stops on EOF, on a read error, when the stream reports closed,
//! or when the consumer drops its receiver. It is not restartable.

use std::sync::Arc;
use std::time::Duration;

use adbsh_core::{AdbError, AdbResult, ShellStream};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time;
use tracing::Instrument;

/// Producer side handed to the pump.
pub type OutputSink = mpsc::UnboundedSender<String>;

/// Consumer side: decoded output chunks in read order.
pub type OutputReceiver = mpsc::UnboundedReceiver<String>;

/// Create a connected sink/receiver pair.
pub fn output_channel() -> (OutputSink, OutputReceiver) {
    mpsc::unbounded_channel()
}

/// Create a sink whose chunks are handed, in order, to `callback` on a
/// separate delivery task. The task ends once every sender is dropped.
pub fn callback_sink<F>(mut callback: F) -> (OutputSink, JoinHandle<()>)
where
    F: FnMut(String) + Send + 'static,
{
    let (tx, mut rx) = output_channel();
    let handle = tokio::spawn(async move {
        while let Some(chunk) = rx.recv().await {
            callback(chunk);
        }
    });
    (tx, handle)
}

/// Why the pump stopped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PumpExit {
    /// The stream reported closed before a read.
    ChannelClosed,
    /// The stream returned EOF.
    Eof,
    /// A read failed; output delivery simply ends.
    ReadFailed(String),
    /// The receiver was dropped.
    ConsumerGone,
}

/// Handle on a running output pump.
pub struct OutputPump {
    session_id: u64,
    handle: JoinHandle<PumpExit>,
}

impl OutputPump {
    /// Spawn the read loop for `stream`, delivering into `sink`.
    pub fn spawn(session_id: u64, stream: Arc<dyn ShellStream>, sink: OutputSink) -> Self {
        let span = tracing::debug_span!("output_pump", session = session_id);
        let handle = tokio::spawn(run(stream, sink).instrument(span));
        tracing::debug!(session = session_id, "output pump started");
        Self { session_id, handle }
    }

    pub fn session_id(&self) -> u64 {
        self.session_id
    }

    /// Whether the read loop has ended.
    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }

    /// Wait for the loop to end. If it has not ended within `timeout` (a
    /// stream whose close does not wake a pending read), the task is aborted.
    pub async fn join(mut self, timeout: Duration) -> AdbResult<PumpExit> {
        match time::timeout(timeout, &mut self.handle).await {
            Ok(Ok(exit)) => Ok(exit),
            Ok(Err(e)) => Err(AdbError::Other(format!("output pump task failed: {e}"))),
            Err(_) => {
                self.handle.abort();
                Err(AdbError::Other(format!(
                    "output pump for session {} did not stop within {} ms, aborted",
                    self.session_id,
                    timeout.as_millis()
                )))
            }
        }
    }
}

async fn run(stream: Arc<dyn ShellStream>, sink: OutputSink) -> PumpExit {
    let exit = loop {
        if stream.is_closed() {
            break PumpExit::ChannelClosed;
        }

        let chunk = match stream.read().await {
            Ok(bytes) if bytes.is_empty() => break PumpExit::Eof,
            Ok(bytes) => bytes,
            Err(e) => break PumpExit::ReadFailed(e.to_string()),
        };

        if sink.send(decode_ascii(&chunk)).is_err() {
            break PumpExit::ConsumerGone;
        }
    };

    tracing::debug!(?exit, "output pump stopped");
    exit
}

/// Decode bytes as US-ASCII; bytes above 0x7f become U+FFFD.
pub fn decode_ascii(bytes: &[u8]) -> String {
    bytes
        .iter()
        .map(|&b| {
            if b.is_ascii() {
                b as char
            } else {
                char::REPLACEMENT_CHARACTER
            }
        })
        .collect()
}
