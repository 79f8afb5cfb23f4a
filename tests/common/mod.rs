#![allow(dead_code)]

use async_trait::async_trait;
use std::future::Future;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use whatsapp_relay::error::{SendError, WebhookError};
use whatsapp_relay::events::{MessageBatch, MessageKey, WireMessage};
use whatsapp_relay::http::{self, AppState};
use whatsapp_relay::session::generate_message_id;
use whatsapp_relay::store::MemoryStore;
use whatsapp_relay::{
    proto, Connector, ConnectionUpdate, Credentials, EventSink, ForwardPayload, Notifier,
    SessionEvent, SessionManager, Transport,
};

#[derive(Default)]
pub struct FakeTransport {
    pub sent: Mutex<Vec<(String, String)>>,
    pub fail_with: Mutex<Option<String>>,
}

#[async_trait]
impl Transport for FakeTransport {
    async fn send_text(&self, to: &str, text: &str) -> whatsapp_relay::Result<String> {
        if let Some(reason) = self.fail_with.lock().unwrap().clone() {
            return Err(SendError::Server(reason).into());
        }
        self.sent
            .lock()
            .unwrap()
            .push((to.to_string(), text.to_string()));
        Ok(generate_message_id())
    }

    async fn close(&self) -> whatsapp_relay::Result<()> {
        Ok(())
    }
}

#[derive(Default)]
pub struct FakeConnector {
    pub sinks: Mutex<Vec<EventSink>>,
    pub transport: Arc<FakeTransport>,
}

impl FakeConnector {
    pub fn emit(&self, event: SessionEvent) {
        let sink = self.sinks.lock().unwrap().last().cloned().unwrap();
        assert!(sink.emit(event));
    }

    pub fn update(&self, update: ConnectionUpdate) {
        self.emit(SessionEvent::Connection(update));
    }

    pub fn sent(&self) -> Vec<(String, String)> {
        self.transport.sent.lock().unwrap().clone()
    }
}

#[async_trait]
impl Connector for FakeConnector {
    async fn open(
        &self,
        _creds: Credentials,
        events: EventSink,
    ) -> whatsapp_relay::Result<Arc<dyn Transport>> {
        self.sinks.lock().unwrap().push(events);
        Ok(self.transport.clone())
    }
}

/// Accepts every payload without doing anything.
pub struct NullNotifier;

#[async_trait]
impl Notifier for NullNotifier {
    async fn notify(&self, _payload: &ForwardPayload) -> Result<(), WebhookError> {
        Ok(())
    }
}

pub struct Relay {
    pub base: String,
    pub session: Arc<SessionManager>,
    pub connector: Arc<FakeConnector>,
    pub client: reqwest::Client,
}

impl Relay {
    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.base, path)
    }

    pub async fn get_json(&self, path: &str) -> serde_json::Value {
        self.client
            .get(self.url(path))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap()
    }

    pub async fn post(&self, path: &str, body: &str) -> (u16, serde_json::Value) {
        let resp = self
            .client
            .post(self.url(path))
            .header("content-type", "application/json")
            .body(body.to_string())
            .send()
            .await
            .unwrap();
        let status = resp.status().as_u16();
        (status, resp.json().await.unwrap())
    }

    /// Mark the session connected and wait for the event loop to apply it.
    pub async fn connect(&self) {
        self.connector.update(ConnectionUpdate::Open);
        let session = Arc::clone(&self.session);
        wait_until(move || {
            let session = Arc::clone(&session);
            async move { session.is_connected().await }
        })
        .await;
    }
}

/// Start a relay on an ephemeral port with a fake connection behind it.
pub async fn spawn_relay(notifier: Arc<dyn Notifier>) -> Relay {
    let connector = Arc::new(FakeConnector::default());
    let session = Arc::new(SessionManager::new(
        Arc::new(MemoryStore::new()),
        connector.clone(),
        notifier,
    ));
    session.connect().await.unwrap();

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let state = AppState::new(Arc::clone(&session), "WhatsApp Relay");
    tokio::spawn(http::serve(listener, state, std::future::pending()));

    Relay {
        base: format!("http://{addr}"),
        session,
        connector,
        client: reqwest::Client::new(),
    }
}

/// Poll `check` until it holds, failing after two seconds.
pub async fn wait_until<F, Fut>(mut check: F)
where
    F: FnMut() -> Fut,
    Fut: Future<Output = bool>,
{
    for _ in 0..200 {
        if check().await {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("condition not reached in time");
}

pub fn text_message(from: &str, id: &str, text: &str, from_me: bool) -> WireMessage {
    WireMessage {
        key: MessageKey {
            remote_jid: from.parse().unwrap(),
            from_me,
            id: id.to_string(),
        },
        message: Some(proto::Message::text(text)),
    }
}

pub fn batch(messages: Vec<WireMessage>) -> SessionEvent {
    SessionEvent::Messages(MessageBatch::notify(messages))
}
