//! Device doubles for session tests.
//!
//! `FakeDevice` is a loopback TCP listener speaking a toy line protocol;
//! `MockProtocol` is the matching client side plugged in as the
//! `DeviceProtocol`. Line protocol:
//!
//! ```text
//! -> CNXN <fingerprint>     <- OKAY | FAIL
//! -> OPEN <service>         <- OKAY | FAIL
//! -> <command line>         <- output (`echo X` answers `X`)
//! ```

use std::collections::VecDeque;
use std::io;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;

use adbsh_core::{
    AdbError, AdbResult, BoxFuture, DeviceConnection, DeviceProtocol, KeyPair, ShellStream,
};
use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{mpsc, Mutex, Notify};

use crate::session::ConnectOptions;

/// What the fake device observed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeviceEvent {
    /// Handshake attempt with this key fingerprint.
    Connected(String),
    Opened(String),
    Line(String),
    /// The client side of the socket went away.
    Closed,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct DeviceScript {
    pub reject_auth: bool,
    pub reject_open: bool,
    /// Accept the handshake line but never answer it.
    pub silent: bool,
}

pub struct FakeDevice {
    addr: SocketAddr,
    events: mpsc::UnboundedReceiver<DeviceEvent>,
}

impl FakeDevice {
    pub async fn start(script: DeviceScript) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let (tx, events) = mpsc::unbounded_channel();

        tokio::spawn(async move {
            while let Ok((stream, _)) = listener.accept().await {
                tokio::spawn(serve(stream, script, tx.clone()));
            }
        });

        Self { addr, events }
    }

    pub fn port(&self) -> u16 {
        self.addr.port()
    }

    pub fn options(&self) -> ConnectOptions {
        ConnectOptions::new("127.0.0.1", self.port())
    }

    pub async fn next_event(&mut self) -> DeviceEvent {
        tokio::time::timeout(Duration::from_secs(5), self.events.recv())
            .await
            .expect("timed out waiting for device event")
            .expect("device event channel closed")
    }

    /// Consume the `Connected` and `Opened` events of a successful connect.
    pub async fn skip_handshake(&mut self) {
        assert!(matches!(self.next_event().await, DeviceEvent::Connected(_)));
        assert!(matches!(self.next_event().await, DeviceEvent::Opened(_)));
    }
}

#[derive(Clone, Copy)]
enum Stage {
    Auth,
    Open,
    Shell,
    Rejected,
}

async fn serve(stream: TcpStream, script: DeviceScript, events: mpsc::UnboundedSender<DeviceEvent>) {
    let (read, mut write) = stream.into_split();
    let mut lines = BufReader::new(read).lines();
    let mut stage = Stage::Auth;

    while let Ok(Some(line)) = lines.next_line().await {
        let reply = match stage {
            Stage::Auth => {
                let fp = line.strip_prefix("CNXN ").unwrap_or_default().to_string();
                let _ = events.send(DeviceEvent::Connected(fp));
                if script.silent {
                    String::new()
                } else if script.reject_auth {
                    stage = Stage::Rejected;
                    "FAIL\n".to_string()
                } else {
                    stage = Stage::Open;
                    "OKAY\n".to_string()
                }
            }
            Stage::Open => {
                let service = line.strip_prefix("OPEN ").unwrap_or_default().to_string();
                let _ = events.send(DeviceEvent::Opened(service));
                if script.reject_open {
                    stage = Stage::Rejected;
                    "FAIL\n".to_string()
                } else {
                    stage = Stage::Shell;
                    "OKAY\n".to_string()
                }
            }
            Stage::Shell => {
                let reply = match line.strip_prefix("echo ") {
                    Some(text) => format!("{text}\n"),
                    None => String::new(),
                };
                let _ = events.send(DeviceEvent::Line(line));
                reply
            }
            Stage::Rejected => String::new(),
        };

        if !reply.is_empty() && write.write_all(reply.as_bytes()).await.is_err() {
            break;
        }
    }

    let _ = events.send(DeviceEvent::Closed);
}

/// Order in which the client closed protocol handles.
pub type CloseLog = Arc<StdMutex<Vec<&'static str>>>;

/// Client side of the toy protocol.
#[derive(Clone, Default)]
pub struct MockProtocol {
    pub closes: CloseLog,
    pub fail_shell_close: bool,
    /// Shell close sleeps this long after logging itself.
    pub shell_close_delay: Duration,
    /// Socket connects never complete.
    pub stall_dial: bool,
}

impl MockProtocol {
    pub fn closed(&self) -> Vec<&'static str> {
        self.closes.lock().unwrap().clone()
    }
}

impl DeviceProtocol for MockProtocol {
    fn dial<'a>(&'a self, addr: &'a str) -> BoxFuture<'a, io::Result<TcpStream>> {
        Box::pin(async move {
            if self.stall_dial {
                std::future::pending::<()>().await;
            }
            TcpStream::connect(addr).await
        })
    }

    fn handshake<'a>(
        &'a self,
        socket: TcpStream,
        key_pair: &'a KeyPair,
    ) -> BoxFuture<'a, AdbResult<Box<dyn DeviceConnection>>> {
        Box::pin(async move {
            let (mut read, mut write) = socket.into_split();
            write
                .write_all(format!("CNXN {}\n", key_pair.fingerprint()).as_bytes())
                .await?;
            let reply = read_line(&mut read).await?;
            if reply != "OKAY" {
                return Err(AdbError::Handshake(format!("device answered {reply}")));
            }

            Ok(Box::new(MockConnection {
                read: Arc::new(Mutex::new(read)),
                write: Arc::new(Mutex::new(write)),
                closes: self.closes.clone(),
                fail_shell_close: self.fail_shell_close,
                shell_close_delay: self.shell_close_delay,
            }) as Box<dyn DeviceConnection>)
        })
    }
}

async fn read_line(read: &mut OwnedReadHalf) -> AdbResult<String> {
    let mut line = Vec::new();
    loop {
        let byte = read.read_u8().await?;
        if byte == b'\n' {
            break;
        }
        line.push(byte);
    }
    Ok(String::from_utf8_lossy(&line).into_owned())
}

struct MockConnection {
    read: Arc<Mutex<OwnedReadHalf>>,
    write: Arc<Mutex<OwnedWriteHalf>>,
    closes: CloseLog,
    fail_shell_close: bool,
    shell_close_delay: Duration,
}

impl DeviceConnection for MockConnection {
    fn open<'a>(&'a self, service: &'a str) -> BoxFuture<'a, AdbResult<Arc<dyn ShellStream>>> {
        Box::pin(async move {
            self.write
                .lock()
                .await
                .write_all(format!("OPEN {service}\n").as_bytes())
                .await?;
            let reply = read_line(&mut *self.read.lock().await).await?;
            if reply != "OKAY" {
                return Err(AdbError::ChannelOpen {
                    service: service.to_string(),
                    reason: format!("device answered {reply}"),
                });
            }

            Ok(Arc::new(MockShell {
                read: self.read.clone(),
                write: self.write.clone(),
                closed: AtomicBool::new(false),
                wake: Notify::new(),
                closes: self.closes.clone(),
                fail_close: self.fail_shell_close,
                close_delay: self.shell_close_delay,
            }) as Arc<dyn ShellStream>)
        })
    }

    fn close(&self) -> BoxFuture<'_, AdbResult<()>> {
        Box::pin(async move {
            self.closes.lock().unwrap().push("connection");
            Ok(())
        })
    }
}

struct MockShell {
    read: Arc<Mutex<OwnedReadHalf>>,
    write: Arc<Mutex<OwnedWriteHalf>>,
    closed: AtomicBool,
    wake: Notify,
    closes: CloseLog,
    fail_close: bool,
    close_delay: Duration,
}

impl ShellStream for MockShell {
    fn read(&self) -> BoxFuture<'_, AdbResult<Vec<u8>>> {
        Box::pin(async move {
            let woken = self.wake.notified();
            tokio::pin!(woken);
            woken.as_mut().enable();
            if self.closed.load(Ordering::SeqCst) {
                return Err(AdbError::ReadTerminated("stream closed".into()));
            }

            let mut read = self.read.lock().await;
            let mut buf = vec![0u8; 1024];
            let n = tokio::select! {
                _ = &mut woken => None,
                n = read.read(&mut buf) => Some(n),
            };
            match n {
                None => Err(AdbError::ReadTerminated("stream closed".into())),
                Some(n) => {
                    let n = n?;
                    buf.truncate(n);
                    Ok(buf)
                }
            }
        })
    }

    fn write<'a>(&'a self, data: &'a [u8]) -> BoxFuture<'a, AdbResult<()>> {
        Box::pin(async move {
            if self.closed.load(Ordering::SeqCst) {
                return Err(AdbError::Write("stream closed".into()));
            }
            self.write.lock().await.write_all(data).await?;
            Ok(())
        })
    }

    fn close(&self) -> BoxFuture<'_, AdbResult<()>> {
        Box::pin(async move {
            self.closes.lock().unwrap().push("channel");
            self.closed.store(true, Ordering::SeqCst);
            self.wake.notify_waiters();
            if !self.close_delay.is_zero() {
                tokio::time::sleep(self.close_delay).await;
            }
            if self.fail_close {
                return Err(AdbError::Protocol("injected close failure".into()));
            }
            Ok(())
        })
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

/// In-memory stream replaying a fixed list of read results, then EOF.
pub struct ScriptedStream {
    reads: StdMutex<VecDeque<AdbResult<Vec<u8>>>>,
    closed: AtomicBool,
    stall: bool,
}

impl ScriptedStream {
    pub fn new(reads: Vec<AdbResult<Vec<u8>>>) -> Arc<Self> {
        Arc::new(Self {
            reads: StdMutex::new(reads.into()),
            closed: AtomicBool::new(false),
            stall: false,
        })
    }

    /// A stream whose reads never complete, even after close.
    pub fn stalled() -> Arc<Self> {
        Arc::new(Self {
            reads: StdMutex::new(VecDeque::new()),
            closed: AtomicBool::new(false),
            stall: true,
        })
    }
}

impl ShellStream for ScriptedStream {
    fn read(&self) -> BoxFuture<'_, AdbResult<Vec<u8>>> {
        Box::pin(async move {
            if self.stall {
                std::future::pending::<()>().await;
            }
            let next = self.reads.lock().unwrap().pop_front();
            next.unwrap_or_else(|| Ok(Vec::new()))
        })
    }

    fn write<'a>(&'a self, _data: &'a [u8]) -> BoxFuture<'a, AdbResult<()>> {
        Box::pin(async move { Ok(()) })
    }

    fn close(&self) -> BoxFuture<'_, AdbResult<()>> {
        Box::pin(async move {
            self.closed.store(true, Ordering::SeqCst);
            Ok(())
        })
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}
