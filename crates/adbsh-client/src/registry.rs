//! The single-session registry.
//!
//! Holds at most one active [`DeviceSession`] plus its output pump. The host
//! application owns the registry and hands references to whoever needs to
//! run commands. `init` and `disconnect` are serialized by the slot lock, so
//! two callers can never be creating or tearing down sessions at once.
//! Readers (`current`, `execute`, `state`) go through watch snapshots and
//! never wait on that lock.
//!
//! State machine: `Empty -> Connecting -> Connected -> Empty`. A failure while
//! connecting returns to `Empty`, as does dropping an `init` future before it
//! completes. A `disconnect` issued while an `init` is connecting aborts it.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use adbsh_core::{AdbError, AdbResult, DeviceProtocol, SHELL_SERVICE};
use tokio::sync::{watch, Mutex, Notify};

use crate::keystore::{KeyStore, PRIVATE_KEY_FILE, PUBLIC_KEY_FILE};
use crate::pump::{OutputPump, OutputSink};
use crate::session::{
    ConnectOptions, DeviceSession, TeardownReport, TeardownStage, DEFAULT_CONNECT_TIMEOUT_MS,
};

/// Lifecycle of the registry slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegistryState {
    Empty,
    Connecting,
    Connected,
}

/// Registry-wide settings applied to every `init`.
#[derive(Debug, Clone)]
pub struct RegistryConfig {
    /// Bound on the TCP connect step.
    pub connect_timeout_ms: u64,
    /// Service opened after the handshake.
    pub service: String,
    /// How long teardown waits for the pump to notice the closed channel.
    pub pump_join_timeout_ms: u64,
    /// Key file names inside the key directory.
    pub public_key_file: String,
    pub private_key_file: String,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            connect_timeout_ms: DEFAULT_CONNECT_TIMEOUT_MS,
            service: SHELL_SERVICE.to_string(),
            pump_join_timeout_ms: 2000,
            public_key_file: PUBLIC_KEY_FILE.to_string(),
            private_key_file: PRIVATE_KEY_FILE.to_string(),
        }
    }
}

struct ActiveSession {
    session: Arc<DeviceSession>,
    pump: Option<OutputPump>,
}

/// Publishes `Connecting`, then `Empty` on drop unless `connected` was called.
struct ConnectingGuard<'a> {
    state: &'a watch::Sender<RegistryState>,
    armed: bool,
}

impl<'a> ConnectingGuard<'a> {
    fn enter(state: &'a watch::Sender<RegistryState>) -> Self {
        state.send_replace(RegistryState::Connecting);
        Self { state, armed: true }
    }

    fn connected(mut self) {
        self.armed = false;
        self.state.send_replace(RegistryState::Connected);
    }
}

impl Drop for ConnectingGuard<'_> {
    fn drop(&mut self) {
        if self.armed {
            self.state.send_replace(RegistryState::Empty);
        }
    }
}

/// Owner of the one active device session.
pub struct SessionRegistry {
    protocol: Arc<dyn DeviceProtocol>,
    config: RegistryConfig,
    slot: Mutex<Option<ActiveSession>>,
    current: watch::Sender<Option<Arc<DeviceSession>>>,
    state: watch::Sender<RegistryState>,
    abort_init: Notify,
}

impl SessionRegistry {
    pub fn new(protocol: Arc<dyn DeviceProtocol>, config: RegistryConfig) -> Self {
        let (state, _) = watch::channel(RegistryState::Empty);
        let (current, _) = watch::channel(None);
        Self {
            protocol,
            config,
            slot: Mutex::new(None),
            current,
            state,
            abort_init: Notify::new(),
        }
    }

    pub fn config(&self) -> &RegistryConfig {
        &self.config
    }

    /// Current lifecycle state.
    pub fn state(&self) -> RegistryState {
        *self.state.borrow()
    }

    /// Watch lifecycle transitions.
    pub fn subscribe(&self) -> watch::Receiver<RegistryState> {
        self.state.subscribe()
    }

    /// Replace any active session with a new one.
    ///
    /// The previous session is fully torn down first. The new one is built
    /// from the keypair in `key_dir` (created if needed); when `output` is
    /// given, shell output is streamed into it. On failure, cancellation, or
    /// an interrupting `disconnect`, the registry is left empty.
    pub async fn init(
        &self,
        key_dir: impl Into<PathBuf>,
        host: &str,
        port: u16,
        output: Option<OutputSink>,
    ) -> AdbResult<Arc<DeviceSession>> {
        let mut slot = self.slot.lock().await;
        let aborted = self.abort_init.notified();
        tokio::pin!(aborted);
        let connecting = ConnectingGuard::enter(&self.state);

        if let Some(active) = slot.take() {
            self.current.send_replace(None);
            tracing::info!(session = active.session.id(), "replacing active session");
            self.teardown(active).await;
        }

        let established = tokio::select! {
            biased;
            _ = &mut aborted => Err(AdbError::Cancelled("init interrupted by disconnect".into())),
            result = self.establish(key_dir.into(), host, port, output) => result,
        };

        match established {
            Ok(active) => {
                let session = active.session.clone();
                *slot = Some(active);
                self.current.send_replace(Some(session.clone()));
                connecting.connected();
                Ok(session)
            }
            Err(e) => {
                tracing::warn!(host, port, "session init failed: {}", e);
                Err(e)
            }
        }
    }

    /// The active session, if any. Does not wait for an in-flight `init`.
    pub fn current(&self) -> Option<Arc<DeviceSession>> {
        self.current.borrow().clone()
    }

    /// Write one command line to the active session.
    pub async fn execute(&self, command: &str) -> AdbResult<()> {
        let session = self.current().ok_or(AdbError::NotConnected)?;
        session.write(command).await
    }

    /// Tear down the active session, if any, and clear the slot. An `init`
    /// still connecting is aborted first.
    pub async fn disconnect(&self) -> TeardownReport {
        self.abort_init.notify_waiters();
        let mut slot = self.slot.lock().await;
        self.current.send_replace(None);
        let report = match slot.take() {
            Some(active) => self.teardown(active).await,
            None => {
                tracing::debug!("disconnect with no active session");
                TeardownReport::default()
            }
        };
        self.state.send_replace(RegistryState::Empty);
        report
    }

    async fn establish(
        &self,
        key_dir: PathBuf,
        host: &str,
        port: u16,
        output: Option<OutputSink>,
    ) -> AdbResult<ActiveSession> {
        let store = KeyStore::new(key_dir).with_file_names(
            self.config.public_key_file.clone(),
            self.config.private_key_file.clone(),
        );
        let key_pair = tokio::task::spawn_blocking(move || store.load_or_create())
            .await
            .map_err(|e| AdbError::Other(format!("keystore task failed: {e}")))??;

        let options = ConnectOptions {
            host: host.to_string(),
            port,
            connect_timeout_ms: self.config.connect_timeout_ms,
            service: self.config.service.clone(),
        };
        let session = Arc::new(
            DeviceSession::connect(self.protocol.as_ref(), &options, &key_pair).await?,
        );

        let pump = match output {
            Some(sink) => match session.start_output(sink).await {
                Ok(pump) => Some(pump),
                Err(e) => {
                    session.disconnect().await;
                    return Err(e);
                }
            },
            None => None,
        };

        Ok(ActiveSession { session, pump })
    }

    async fn teardown(&self, active: ActiveSession) -> TeardownReport {
        let mut report = active.session.disconnect().await;
        if let Some(pump) = active.pump {
            let timeout = Duration::from_millis(self.config.pump_join_timeout_ms);
            match pump.join(timeout).await {
                Ok(exit) => tracing::debug!(?exit, "output pump joined"),
                Err(e) => report.record(TeardownStage::Pump, e),
            }
        }
        report
    }
}
