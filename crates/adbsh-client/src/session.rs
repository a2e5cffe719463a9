//! One live device shell session.
//!
//! A `DeviceSession` owns the socket, the authenticated protocol connection,
//! and the shell stream opened on it. The three handles live in a single
//! optional bundle so the session is either fully connected or fully torn
//! down; there is no observable in-between state.

use std::future::Future;
use std::io;
use std::net::{Shutdown, SocketAddr};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use adbsh_core::{
    AdbError, AdbResult, DeviceConnection, DeviceProtocol, KeyPair, ShellStream, SHELL_SERVICE,
};
use tokio::net::TcpStream;
use tokio::sync::Mutex;
use tokio::time;

use crate::pump::{OutputPump, OutputSink};

/// Default device port (`adb tcpip` default).
pub const DEFAULT_PORT: u16 = 5555;

/// Default socket connect timeout.
pub const DEFAULT_CONNECT_TIMEOUT_MS: u64 = 5000;

static NEXT_SESSION_ID: AtomicU64 = AtomicU64::new(1);

/// Where and how to connect.
#[derive(Debug, Clone)]
pub struct ConnectOptions {
    /// Device host name or address.
    pub host: String,
    /// Device port.
    pub port: u16,
    /// Bound on the TCP connect step only.
    pub connect_timeout_ms: u64,
    /// Service opened after the handshake.
    pub service: String,
}

impl Default for ConnectOptions {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: DEFAULT_PORT,
            connect_timeout_ms: DEFAULT_CONNECT_TIMEOUT_MS,
            service: SHELL_SERVICE.to_string(),
        }
    }
}

impl ConnectOptions {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            ..Default::default()
        }
    }

    /// `host:port`, bracketing bare IPv6 literals.
    pub fn addr(&self) -> String {
        if self.host.contains(':') && !self.host.starts_with('[') {
            format!("[{}]:{}", self.host, self.port)
        } else {
            format!("{}:{}", self.host, self.port)
        }
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }
}

/// Which resource a teardown step was releasing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TeardownStage {
    Channel,
    Connection,
    Socket,
    Pump,
}

/// A close failure that was logged and skipped during teardown.
#[derive(Debug)]
pub struct TeardownFailure {
    pub stage: TeardownStage,
    pub error: AdbError,
}

/// Outcome of a teardown. Disconnect never fails; it reports what went
/// wrong along the way instead.
#[derive(Debug, Default)]
pub struct TeardownReport {
    failures: Vec<TeardownFailure>,
}

impl TeardownReport {
    pub(crate) fn record(&mut self, stage: TeardownStage, error: AdbError) {
        tracing::warn!("teardown: {:?} close failed: {}", stage, error);
        self.failures.push(TeardownFailure { stage, error });
    }

    /// True when every resource closed without error.
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }

    pub fn failures(&self) -> &[TeardownFailure] {
        &self.failures
    }

    /// Stages that failed, in teardown order.
    pub fn failed_stages(&self) -> Vec<TeardownStage> {
        self.failures.iter().map(|f| f.stage).collect()
    }
}

/// Our handle on the raw socket, kept alongside the protocol's copy so the
/// socket can be shut down regardless of what the protocol layer does.
struct SocketHandle {
    stream: std::net::TcpStream,
}

impl SocketHandle {
    fn close(&self) -> io::Result<()> {
        match self.stream.shutdown(Shutdown::Both) {
            Err(e) if e.kind() == io::ErrorKind::NotConnected => Ok(()),
            other => other,
        }
    }
}

struct Handles {
    socket: SocketHandle,
    connection: Box<dyn DeviceConnection>,
    shell: Arc<dyn ShellStream>,
}

/// A connected, authenticated shell session on a device.
pub struct DeviceSession {
    id: u64,
    peer: SocketAddr,
    service: String,
    handles: Mutex<Option<Handles>>,
    /// Serializes writes so lines reach the channel in call order.
    write_lock: Mutex<()>,
}

impl DeviceSession {
    /// Connect the socket, run the handshake, and open the shell service.
    ///
    /// On failure every resource acquired by this attempt is released before
    /// the error is returned.
    pub async fn connect(
        protocol: &dyn DeviceProtocol,
        options: &ConnectOptions,
        key_pair: &KeyPair,
    ) -> AdbResult<Self> {
        let addr = options.addr();
        let stream =
            bounded_connect(&addr, options.connect_timeout(), protocol.dial(&addr)).await?;
        let peer = stream.peer_addr()?;

        let std_stream = stream.into_std()?;
        let socket = SocketHandle {
            stream: std_stream.try_clone()?,
        };
        let stream = TcpStream::from_std(std_stream)?;
        tracing::debug!(%peer, "socket connected");

        let connection = match protocol.handshake(stream, key_pair).await {
            Ok(connection) => connection,
            Err(e) => {
                close_socket_quietly(&socket);
                return Err(match e {
                    AdbError::Handshake(_) => e,
                    other => AdbError::Handshake(other.to_string()),
                });
            }
        };
        tracing::debug!(%peer, fingerprint = %key_pair.fingerprint(), "handshake complete");

        let shell = match connection.open(&options.service).await {
            Ok(shell) => shell,
            Err(e) => {
                if let Err(close_err) = connection.close().await {
                    tracing::warn!("closing connection after failed open: {}", close_err);
                }
                close_socket_quietly(&socket);
                return Err(match e {
                    AdbError::ChannelOpen { .. } => e,
                    other => AdbError::ChannelOpen {
                        service: options.service.clone(),
                        reason: other.to_string(),
                    },
                });
            }
        };

        let id = NEXT_SESSION_ID.fetch_add(1, Ordering::Relaxed);
        tracing::info!(session = id, %peer, service = %options.service, "session connected");

        Ok(Self {
            id,
            peer,
            service: options.service.clone(),
            handles: Mutex::new(Some(Handles {
                socket,
                connection,
                shell,
            })),
            write_lock: Mutex::new(()),
        })
    }

    /// Process-unique session number.
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Resolved address of the device.
    pub fn peer(&self) -> SocketAddr {
        self.peer
    }

    pub fn service(&self) -> &str {
        &self.service
    }

    /// Whether the handles are still held (not yet disconnected).
    pub async fn is_connected(&self) -> bool {
        self.handles.lock().await.is_some()
    }

    /// Send one command line: `command` followed by `\n`.
    pub async fn write(&self, command: &str) -> AdbResult<()> {
        let _order = self.write_lock.lock().await;

        let shell = self
            .shell()
            .await
            .ok_or_else(|| AdbError::Write(format!("session {} is disconnected", self.id)))?;
        if shell.is_closed() {
            return Err(AdbError::Write(format!(
                "session {} shell channel is closed",
                self.id
            )));
        }

        let mut line = String::with_capacity(command.len() + 1);
        line.push_str(command);
        line.push('\n');

        shell.write(line.as_bytes()).await.map_err(|e| match e {
            AdbError::Write(_) => e,
            other => AdbError::Write(other.to_string()),
        })
    }

    /// Start streaming this session's shell output into `sink`.
    pub async fn start_output(&self, sink: OutputSink) -> AdbResult<OutputPump> {
        let shell = self.shell().await.ok_or(AdbError::NotConnected)?;
        Ok(OutputPump::spawn(self.id, shell, sink))
    }

    /// Close the shell channel, then the connection, then the socket.
    ///
    /// A failing step is recorded and the remaining steps still run. Calling
    /// this on a disconnected session returns an empty report.
    pub async fn disconnect(&self) -> TeardownReport {
        let mut report = TeardownReport::default();
        let Some(handles) = self.handles.lock().await.take() else {
            tracing::debug!(session = self.id, "already disconnected");
            return report;
        };

        if let Err(e) = handles.shell.close().await {
            report.record(TeardownStage::Channel, e);
        }
        if let Err(e) = handles.connection.close().await {
            report.record(TeardownStage::Connection, e);
        }
        if let Err(e) = handles.socket.close() {
            report.record(TeardownStage::Socket, e.into());
        }

        tracing::info!(
            session = self.id,
            peer = %self.peer,
            clean = report.is_clean(),
            "session disconnected"
        );
        report
    }

    pub(crate) async fn shell(&self) -> Option<Arc<dyn ShellStream>> {
        self.handles.lock().await.as_ref().map(|h| h.shell.clone())
    }
}

impl Drop for DeviceSession {
    fn drop(&mut self) {
        // Never leak the socket, even if disconnect was skipped.
        if let Some(handles) = self.handles.get_mut().take() {
            tracing::debug!(session = self.id, "dropped while connected, shutting socket");
            let _ = handles.socket.close();
        }
    }
}

/// Check that the device port accepts TCP connections, without running a
/// handshake. Returns the resolved peer address.
pub async fn check_reachable(options: &ConnectOptions) -> AdbResult<SocketAddr> {
    let addr = options.addr();
    let stream = bounded_connect(
        &addr,
        options.connect_timeout(),
        TcpStream::connect(addr.as_str()),
    )
    .await?;
    let peer = stream.peer_addr()?;
    tracing::debug!(%peer, "device port reachable");
    Ok(peer)
}

/// Run a socket connect future under the connect timeout.
async fn bounded_connect<F>(addr: &str, timeout: Duration, connect: F) -> AdbResult<TcpStream>
where
    F: Future<Output = io::Result<TcpStream>>,
{
    match time::timeout(timeout, connect).await {
        Ok(Ok(stream)) => Ok(stream),
        Ok(Err(e)) => Err(AdbError::Connect {
            addr: addr.to_string(),
            reason: e.to_string(),
        }),
        Err(_) => Err(AdbError::ConnectTimeout {
            addr: addr.to_string(),
            timeout_ms: timeout.as_millis() as u64,
        }),
    }
}

fn close_socket_quietly(socket: &SocketHandle) {
    if let Err(e) = socket.close() {
        tracing::warn!("closing socket after failed connect: {}", e);
    }
}
