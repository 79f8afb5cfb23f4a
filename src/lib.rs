//! # whatsapp-relay
//!
//! Keeps one WhatsApp web multidevice session alive and exposes it over HTTP.
//!
//! ## Features
//!
//! - QR pairing: the current pairing token is served at `GET /qr`
//! - Outbound text messages via `POST /send` and `POST /webhook`
//! - Inbound messages forwarded as JSON to a configured webhook
//! - Automatic reconnect after any close other than an explicit logout
//! - Credentials persisted to disk and restored on start
//!
//! ## Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use whatsapp_relay::{http, session::web::WebConnector, store::FileStore};
//! use whatsapp_relay::{SessionManager, WebhookNotifier};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let notifier = WebhookNotifier::new("http://localhost:5678/hook".parse()?, None)?;
//!     let session = Arc::new(SessionManager::new(
//!         Arc::new(FileStore::new("auth_info")),
//!         Arc::new(WebConnector::default()),
//!         Arc::new(notifier),
//!     ));
//!     session.connect().await?;
//!     let listener = tokio::net::TcpListener::bind("0.0.0.0:3000").await?;
//!     http::serve(listener, http::AppState::new(session, "relay"), std::future::pending()).await?;
//!     Ok(())
//! }
//! ```

pub mod binary;
pub mod config;
pub mod error;
pub mod events;
pub mod forwarder;
pub mod http;
pub mod pairing;
pub mod proto;
pub mod session;
pub mod socket;
pub mod store;
pub mod transport;
pub mod types;

pub use config::RelayConfig;
pub use error::{Error, Result};
pub use events::{ConnectionUpdate, DisconnectReason, SessionEvent};
pub use forwarder::{ForwardPayload, Notifier, WebhookNotifier};
pub use session::{ConnectionState, SendReceipt, SessionManager, SessionState};
pub use store::{CredentialStore, Credentials, Store};
pub use transport::{Connector, EventSink, Transport};
pub use types::{Jid, MessageId};
