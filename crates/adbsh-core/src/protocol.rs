//! The device-debugging protocol seam.
//!
//! adbsh does not implement the wire protocol itself. An implementation
//! plugs in behind these traits: it takes over an already-connected socket,
//! performs the authenticated handshake, and opens service streams on the
//! resulting connection.
//!
//! All methods take `&self` so a stream can be read by the output pump while
//! another task writes to it or closes it. Implementations must make
//! [`ShellStream::close`] wake a pending [`ShellStream::read`] with an error or
//! EOF rather than leave it hanging.

use std::future::Future;
use std::io;
use std::pin::Pin;
use std::sync::Arc;

use tokio::net::TcpStream;

use crate::error::AdbResult;
use crate::keys::KeyPair;

/// Service name of the interactive shell.
pub const SHELL_SERVICE: &str = "shell:";

/// Boxed future used by the protocol traits so they stay object-safe.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// A bidirectional byte stream opened on a device connection.
pub trait ShellStream: Send + Sync {
    /// Wait for the next chunk of output. An empty chunk means EOF.
    fn read(&self) -> BoxFuture<'_, AdbResult<Vec<u8>>>;

    /// Write all bytes.
    fn write<'a>(&'a self, data: &'a [u8]) -> BoxFuture<'a, AdbResult<()>>;

    /// Close this stream.
    fn close(&self) -> BoxFuture<'_, AdbResult<()>>;

    /// Whether the stream has been closed by either side.
    fn is_closed(&self) -> bool;
}

/// An authenticated connection to a device.
pub trait DeviceConnection: Send + Sync {
    /// Open a service stream, e.g. [`SHELL_SERVICE`].
    fn open<'a>(&'a self, service: &'a str) -> BoxFuture<'a, AdbResult<Arc<dyn ShellStream>>>;

    /// Close the connection. Streams opened on it stop working.
    fn close(&self) -> BoxFuture<'_, AdbResult<()>>;
}

/// Handshake driver for the device protocol.
pub trait DeviceProtocol: Send + Sync {
    /// Open the raw socket to `addr` (`host:port`). The session bounds this
    /// with its connect timeout.
    fn dial<'a>(&'a self, addr: &'a str) -> BoxFuture<'a, io::Result<TcpStream>> {
        Box::pin(TcpStream::connect(addr))
    }

    /// Authenticate over `socket` using `key_pair` and return the live
    /// connection.
    fn handshake<'a>(
        &'a self,
        socket: TcpStream,
        key_pair: &'a KeyPair,
    ) -> BoxFuture<'a, AdbResult<Box<dyn DeviceConnection>>>;
}
