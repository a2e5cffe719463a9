//! adbsh-core: shared types for the adbsh device shell client.
//!
//! Provides the error taxonomy, the Ed25519 device keypair with its text
//! encoding, fingerprints, and the trait seam behind which the
//! device-debugging protocol (handshake, stream multiplexing) lives.

pub mod error;
pub mod keys;
pub mod protocol;

// Re-export commonly used items at crate root.
pub use error::{AdbError, AdbResult};
pub use keys::{fingerprint, short_fingerprint, KeyPair};
pub use protocol::{BoxFuture, DeviceConnection, DeviceProtocol, ShellStream, SHELL_SERVICE};
