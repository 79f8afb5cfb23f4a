//! Session manager: owns the one live session and reconciles its state.
//!
//! All transport events are consumed by a single event-loop task, so
//! [`SessionState`] has exactly one writer. HTTP handlers only read the state
//! and borrow the live transport for sends.

mod send;
mod state;
#[cfg(feature = "full")]
pub mod web;

pub use send::{generate_message_id, SendReceipt};
pub use state::{ConnectionState, FollowUp, SessionState};

use crate::error::Error;
use crate::events::{ConnectionUpdate, DisconnectReason, SessionEvent};
use crate::forwarder::{Forwarder, Notifier};
use crate::store::{Credentials, Store};
use crate::transport::{Connector, EventSink, Tagged, Transport};
use chrono::Utc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, Mutex, RwLock};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// Delay before reopening a session after a transient close.
pub const DEFAULT_RECONNECT_DELAY: Duration = Duration::from_secs(3);

enum Command {
    Reconnect,
    Shutdown,
}

struct Running {
    commands: mpsc::UnboundedSender<Command>,
    task: JoinHandle<()>,
}

/// Owns the session handle, its state and the reconnect loop.
pub struct SessionManager {
    store: Store,
    connector: Arc<dyn Connector>,
    forwarder: Forwarder,
    reconnect_delay: Duration,
    state: RwLock<SessionState>,
    transport: RwLock<Option<Arc<dyn Transport>>>,
    generation: AtomicU64,
    reconnects: AtomicU64,
    running: Mutex<Option<Running>>,
}

impl SessionManager {
    pub fn new(store: Store, connector: Arc<dyn Connector>, notifier: Arc<dyn Notifier>) -> Self {
        Self {
            store,
            connector,
            forwarder: Forwarder::new(notifier),
            reconnect_delay: DEFAULT_RECONNECT_DELAY,
            state: RwLock::new(SessionState::default()),
            transport: RwLock::new(None),
            generation: AtomicU64::new(0),
            reconnects: AtomicU64::new(0),
            running: Mutex::new(None),
        }
    }

    pub fn with_reconnect_delay(mut self, delay: Duration) -> Self {
        self.reconnect_delay = delay;
        self
    }

    /// Restore credentials, open the session and start the event loop.
    /// Calling it again while running is a no-op.
    pub async fn connect(self: &Arc<Self>) -> crate::Result<()> {
        let mut running = self.running.lock().await;
        if running.is_some() {
            debug!("session already running");
            return Ok(());
        }

        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let (command_tx, command_rx) = mpsc::unbounded_channel();
        self.open(&event_tx).await?;

        let task = tokio::spawn(Arc::clone(self).run(
            event_rx,
            command_rx,
            event_tx,
            command_tx.clone(),
        ));
        *running = Some(Running {
            commands: command_tx,
            task,
        });
        Ok(())
    }

    /// Stop the event loop and close the live session.
    pub async fn shutdown(&self) {
        let Some(running) = self.running.lock().await.take() else {
            return;
        };
        let _ = running.commands.send(Command::Shutdown);
        if let Err(e) = running.task.await {
            error!(error = %e, "session event loop panicked");
        }
        self.drop_transport().await;
        info!("session shut down");
    }

    /// Copy of the current state.
    pub async fn snapshot(&self) -> SessionState {
        self.state.read().await.clone()
    }

    pub async fn is_connected(&self) -> bool {
        self.state.read().await.is_connected()
    }

    /// Number of reconnects scheduled since start.
    pub fn reconnects_scheduled(&self) -> u64 {
        self.reconnects.load(Ordering::SeqCst)
    }

    /// Send a text message over the live session. `to` is used verbatim.
    pub async fn send_text(&self, to: &str, text: &str) -> crate::Result<SendReceipt> {
        if !self.is_connected().await {
            return Err(Error::NotConnected);
        }
        let transport = self
            .transport
            .read()
            .await
            .clone()
            .ok_or(Error::NotConnected)?;
        let id = transport.send_text(to, text).await?;
        debug!(to = %to, id = %id, "message sent");
        Ok(SendReceipt {
            id,
            to: to.to_string(),
            timestamp: Utc::now(),
        })
    }

    async fn restore_credentials(&self) -> crate::Result<Credentials> {
        if let Some(creds) = self.store.load().await? {
            if creds.has_valid_account() {
                return Ok(creds);
            }
            warn!("stored account signature does not verify; pairing again");
        }
        let creds = Credentials::generate();
        self.store.save(&creds).await?;
        info!("generated new device credentials");
        Ok(creds)
    }

    /// Open a new session generation, replacing the previous transport.
    /// A connector failure is reported as a close so it goes through the
    /// normal reconnect path.
    async fn open(&self, events: &mpsc::UnboundedSender<Tagged>) -> crate::Result<()> {
        let creds = self.restore_credentials().await?;
        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        let sink = EventSink::new(generation, events.clone());
        info!(
            generation,
            registered = creds.is_registered(),
            "opening session"
        );

        match self.connector.open(creds, sink.clone()).await {
            Ok(transport) => {
                let previous = self.transport.write().await.replace(transport);
                if let Some(old) = previous {
                    if let Err(e) = old.close().await {
                        debug!(error = %e, "closing replaced session");
                    }
                }
            }
            Err(e) => {
                warn!(generation, error = %e, "failed to open session");
                sink.emit(SessionEvent::Connection(ConnectionUpdate::Close(
                    DisconnectReason::ConnectionLost,
                )));
            }
        }
        Ok(())
    }

    async fn run(
        self: Arc<Self>,
        mut events: mpsc::UnboundedReceiver<Tagged>,
        mut commands: mpsc::UnboundedReceiver<Command>,
        event_tx: mpsc::UnboundedSender<Tagged>,
        command_tx: mpsc::UnboundedSender<Command>,
    ) {
        loop {
            tokio::select! {
                Some(tagged) = events.recv() => self.handle(tagged, &command_tx).await,
                command = commands.recv() => match command {
                    Some(Command::Reconnect) => {
                        if let Err(e) = self.open(&event_tx).await {
                            error!(error = %e, "cannot restore credentials for reconnect");
                            self.schedule_reconnect(&command_tx);
                        }
                    }
                    Some(Command::Shutdown) | None => break,
                },
            }
        }
    }

    async fn handle(&self, tagged: Tagged, commands: &mpsc::UnboundedSender<Command>) {
        let current = self.generation.load(Ordering::SeqCst);
        if tagged.generation != current {
            debug!(
                generation = tagged.generation,
                current, "dropping event from replaced session"
            );
            return;
        }

        match tagged.event {
            SessionEvent::CredentialsUpdated(creds) => {
                if let Err(e) = self.store.save(&creds).await {
                    error!(error = %e, "failed to persist credentials");
                }
            }
            SessionEvent::Connection(update) => self.apply(update, commands).await,
            SessionEvent::Messages(batch) => {
                let stats = self.forwarder.forward_batch(&batch).await;
                debug!(
                    delivered = stats.delivered,
                    failed = stats.failed,
                    skipped = stats.skipped,
                    "message batch handled"
                );
            }
        }
    }

    async fn apply(&self, update: ConnectionUpdate, commands: &mpsc::UnboundedSender<Command>) {
        let follow_up = self.state.write().await.apply(&update);

        match &update {
            ConnectionUpdate::PairingToken(_) => info!("pairing code available at /qr"),
            ConnectionUpdate::Open => info!("session connected"),
            ConnectionUpdate::Close(reason) => warn!(
                reason = %reason,
                reconnect = follow_up == FollowUp::Reconnect,
                "session closed"
            ),
        }

        match follow_up {
            FollowUp::None => {}
            FollowUp::Reconnect => {
                self.drop_transport().await;
                self.schedule_reconnect(commands);
            }
            FollowUp::LoggedOut => {
                self.drop_transport().await;
                if let Err(e) = self.store.clear().await {
                    error!(error = %e, "failed to clear credentials after logout");
                }
                warn!("device logged out; restart to pair again");
            }
        }
    }

    fn schedule_reconnect(&self, commands: &mpsc::UnboundedSender<Command>) {
        self.reconnects.fetch_add(1, Ordering::SeqCst);
        let delay = self.reconnect_delay;
        let commands = commands.clone();
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let _ = commands.send(Command::Reconnect);
        });
    }

    async fn drop_transport(&self) {
        let transport = self.transport.write().await.take();
        if let Some(t) = transport {
            if let Err(e) = t.close().await {
                debug!(error = %e, "closing session transport");
            }
        }
    }
}
