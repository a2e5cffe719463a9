//! adbsh-client: session manager for a remote device shell.
//!
//! Loads (or creates) the device keypair, connects and authenticates over a
//! pluggable [`DeviceProtocol`], opens the shell service, and streams shell
//! output to the caller while commands are written to the channel.
//!
//! # Quick Start
//!
//! ```no_run
//! use std::sync::Arc;
//! use adbsh_client::{output_channel, RegistryConfig, SessionRegistry};
//!
//! # async fn example(protocol: Arc<dyn adbsh_client::DeviceProtocol>) -> adbsh_client::AdbResult<()> {
//! let registry = SessionRegistry::new(protocol, RegistryConfig::default());
//!
//! let (sink, mut output) = output_channel();
//! registry.init("/data/adbsh", "localhost", 5555, Some(sink)).await?;
//! registry.execute("echo hello").await?;
//!
//! if let Some(chunk) = output.recv().await {
//!     print!("{chunk}");
//! }
//!
//! registry.disconnect().await;
//! # Ok(())
//! # }
//! ```

pub mod keystore;
pub mod pump;
pub mod registry;
pub mod session;

#[cfg(test)]
pub(crate) mod testing;

// Re-export primary public types.
pub use keystore::KeyStore;
pub use pump::{callback_sink, output_channel, OutputPump, OutputReceiver, OutputSink, PumpExit};
pub use registry::{RegistryConfig, RegistryState, SessionRegistry};
pub use session::{ConnectOptions, DeviceSession, TeardownFailure, TeardownReport, TeardownStage};

// Re-export adbsh-core types for convenience.
pub use adbsh_core::{AdbError, AdbResult, DeviceProtocol, KeyPair};
