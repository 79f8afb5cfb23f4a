//! Live session over the WhatsApp Web socket (requires `full` feature).
//!
//! Node handling covers what the relay needs: pairing, connection state and
//! unencrypted `plaintext` message payloads. Signal-encrypted `enc` payloads
//! are not decrypted and reach the forwarder as body-less stubs.

use super::send::generate_message_id;
use crate::binary::Node;
use crate::error::{ConnectionError, Error};
use crate::events::{
    ConnectionUpdate, DisconnectReason, MessageBatch, MessageKey, SessionEvent, WireMessage,
};
use crate::pairing::{pairing_token, sign_device_identity, verify_device_identity};
use crate::socket::{self, NoiseRecv, NoiseSend};
use crate::store::Credentials;
use crate::transport::{Connector, EventSink, Transport};
use crate::types::{Jid, MessageId, DEFAULT_USER_SERVER};
use crate::{proto, Result};
use async_trait::async_trait;
use prost::Message as _;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, trace, warn};

/// Bound on opening the socket and completing the Noise handshake.
const CONNECT_TIMEOUT: Duration = Duration::from_secs(20);
/// How long the first pairing token stays valid.
const FIRST_TOKEN_TTL: Duration = Duration::from_secs(60);
/// How long each following token stays valid.
const NEXT_TOKEN_TTL: Duration = Duration::from_secs(20);

/// Opens sessions against the WhatsApp Web socket.
pub struct WebConnector {
    url: String,
}

impl WebConnector {
    pub fn new(url: impl Into<String>) -> Self {
        Self { url: url.into() }
    }
}

impl Default for WebConnector {
    fn default() -> Self {
        Self::new(socket::DEFAULT_WS_URL)
    }
}

#[async_trait]
impl Connector for WebConnector {
    async fn open(&self, creds: Credentials, events: EventSink) -> Result<Arc<dyn Transport>> {
        debug!(url = %self.url, generation = events.generation(), "connecting socket");
        let (send, recv) = tokio::time::timeout(
            CONNECT_TIMEOUT,
            socket::connect_noise(&self.url, &creds.noise_key_priv),
        )
        .await
        .map_err(|_| ConnectionError::Timeout)??;
        let transport = Arc::new(WebTransport {
            send,
            closed: AtomicBool::new(false),
        });
        let task = SessionTask {
            creds,
            transport: Arc::clone(&transport),
            events,
            paired: Arc::new(AtomicBool::new(false)),
        };
        tokio::spawn(task.run(recv));
        Ok(transport)
    }
}

/// Send side of one live socket.
pub struct WebTransport {
    send: NoiseSend,
    closed: AtomicBool,
}

impl WebTransport {
    /// Returns `true` if this call closed the transport.
    fn mark_closed(&self) -> bool {
        !self.closed.swap(true, Ordering::SeqCst)
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    async fn send_node(&self, node: &Node) -> Result<()> {
        if self.is_closed() {
            return Err(Error::Connection(ConnectionError::Disconnected));
        }
        self.send.send_encrypted(&node.pack()?).await
    }
}

#[async_trait]
impl Transport for WebTransport {
    async fn send_text(&self, to: &str, text: &str) -> Result<MessageId> {
        let id = generate_message_id();
        self.send_node(&text_message_node(to, &id, text)).await?;
        Ok(id)
    }

    async fn close(&self) -> Result<()> {
        if self.mark_closed() {
            self.send.close().await?;
        }
        Ok(())
    }
}

fn text_message_node(to: &str, id: &str, text: &str) -> Node {
    Node::new("message")
        .with_attr("to", to)
        .with_attr("id", id)
        .with_attr("type", "text")
        .with_children(vec![
            Node::new("plaintext").with_content(proto::Message::text(text).encode_to_vec())
        ])
}

fn iq_result(id: &str) -> Node {
    Node::new("iq")
        .with_attr("to", DEFAULT_USER_SERVER)
        .with_attr("type", "result")
        .with_attr("id", id)
}

/// What an incoming node means for the session.
#[derive(Debug)]
enum Inbound {
    Update(ConnectionUpdate),
    PairingRefs {
        iq_id: String,
        refs: Vec<String>,
    },
    PairSuccess {
        iq_id: String,
        device: Jid,
        platform: Option<String>,
        identity: Vec<u8>,
    },
    Ping {
        iq_id: String,
    },
    Message(WireMessage),
    Ignored,
}

fn interpret(node: &Node, own: Option<&Jid>) -> Inbound {
    match node.tag.as_str() {
        "success" => Inbound::Update(ConnectionUpdate::Open),
        "failure" => {
            let reason = node
                .attr("reason")
                .and_then(|r| r.parse().ok())
                .map(DisconnectReason::from_code)
                .unwrap_or(DisconnectReason::Unknown);
            Inbound::Update(ConnectionUpdate::Close(reason))
        }
        "stream:error" => {
            let reason = if let Some(code) = node.attr("code").and_then(|c| c.parse().ok()) {
                DisconnectReason::from_code(code)
            } else if node.get_child_by_tag("conflict").is_some() {
                DisconnectReason::ConnectionReplaced
            } else {
                DisconnectReason::Unknown
            };
            Inbound::Update(ConnectionUpdate::Close(reason))
        }
        "iq" => interpret_iq(node),
        "message" => interpret_message(node, own),
        _ => Inbound::Ignored,
    }
}

fn interpret_iq(node: &Node) -> Inbound {
    let iq_id = node.attr("id").unwrap_or_default().to_string();
    if let Some(pair) = node.get_child_by_tag("pair-device") {
        let refs = pair
            .get_children()
            .iter()
            .filter(|c| c.tag == "ref")
            .filter_map(|c| c.bytes())
            .filter_map(|b| String::from_utf8(b.to_vec()).ok())
            .collect();
        return Inbound::PairingRefs { iq_id, refs };
    }
    if let Some(success) = node.get_child_by_tag("pair-success") {
        let device = success
            .get_child_by_tag("device")
            .and_then(|d| d.attr("jid"))
            .and_then(|j| j.parse().ok());
        let identity = success
            .get_child_by_tag("device-identity")
            .and_then(Node::bytes);
        let (Some(device), Some(identity)) = (device, identity) else {
            return Inbound::Ignored;
        };
        return Inbound::PairSuccess {
            iq_id,
            device,
            platform: success
                .get_child_by_tag("platform")
                .and_then(|p| p.attr("name"))
                .map(str::to_string),
            identity: identity.to_vec(),
        };
    }
    if node.attr("xmlns") == Some("urn:xmpp:ping") && node.attr("type") == Some("get") {
        return Inbound::Ping { iq_id };
    }
    Inbound::Ignored
}

fn interpret_message(node: &Node, own: Option<&Jid>) -> Inbound {
    let Some(chat) = node.attr("from").and_then(|f| f.parse::<Jid>().ok()) else {
        return Inbound::Ignored;
    };
    let id = node.attr("id").unwrap_or_default().to_string();
    let sender = if chat.is_group() {
        node.attr("participant")
            .and_then(|p| p.parse::<Jid>().ok())
            .unwrap_or_else(|| chat.clone())
    } else {
        chat.clone()
    };
    let from_me = own.is_some_and(|me| me.to_non_ad() == sender.to_non_ad());

    let message = node
        .get_child_by_tag("plaintext")
        .and_then(Node::bytes)
        .and_then(|raw| match proto::Message::decode(raw) {
            Ok(m) => Some(m),
            Err(e) => {
                debug!(id = %id, error = %e, "undecodable message payload");
                None
            }
        });
    if message.is_none() && node.get_child_by_tag("enc").is_some() {
        debug!(id = %id, "encrypted message payload skipped");
    }

    Inbound::Message(WireMessage {
        key: MessageKey {
            remote_jid: chat,
            from_me,
            id,
        },
        message,
    })
}

/// Verify a pair-success identity and record the device in `creds`.
/// Returns the signed identity to send back to the server.
fn register_device(
    creds: &mut Credentials,
    device: Jid,
    platform: Option<String>,
    identity_with_tag: &[u8],
) -> Result<Vec<u8>> {
    let verified = verify_device_identity(identity_with_tag, &creds.adv_secret_key)?;
    let account = sign_device_identity(&verified.payload, &creds.identity_key_priv);
    creds.me = Some(device);
    creds.platform = platform;
    creds.account = Some(account.clone());
    Ok(account)
}

/// Receive side of one live socket.
struct SessionTask {
    creds: Credentials,
    transport: Arc<WebTransport>,
    events: EventSink,
    paired: Arc<AtomicBool>,
}

impl SessionTask {
    async fn run(mut self, recv: NoiseRecv) {
        let reason = loop {
            let frame = match recv.next_decrypted_frame().await {
                Ok(frame) => frame,
                Err(e) => {
                    debug!(error = %e, "socket read ended");
                    break DisconnectReason::ConnectionLost;
                }
            };
            let node = match Node::unpack(&frame) {
                Ok(Some(node)) => node,
                Ok(None) => {
                    debug!("compressed frame skipped");
                    continue;
                }
                Err(e) => {
                    debug!(error = %e, "undecodable frame");
                    continue;
                }
            };
            if let Some(reason) = self.handle(&node).await {
                break reason;
            }
            if self.events.is_closed() {
                break DisconnectReason::ConnectionClosed;
            }
        };

        if self.transport.mark_closed() {
            if let Err(e) = self.transport.send.close().await {
                trace!(error = %e, "closing socket");
            }
            self.events
                .emit(SessionEvent::Connection(ConnectionUpdate::Close(reason)));
        }
    }

    /// Handle one node; returns a reason when the session is over.
    async fn handle(&mut self, node: &Node) -> Option<DisconnectReason> {
        match interpret(node, self.creds.me.as_ref()) {
            Inbound::Update(ConnectionUpdate::Close(reason)) => return Some(reason),
            Inbound::Update(update) => {
                self.events.emit(SessionEvent::Connection(update));
            }
            Inbound::PairingRefs { iq_id, refs } => {
                self.reply(iq_result(&iq_id)).await;
                self.start_token_rotation(refs);
            }
            Inbound::PairSuccess {
                iq_id,
                device,
                platform,
                identity,
            } => self.pair_success(&iq_id, device, platform, &identity).await,
            Inbound::Ping { iq_id } => self.reply(iq_result(&iq_id)).await,
            Inbound::Message(msg) => {
                let mut receipt = Node::new("receipt")
                    .with_attr("id", msg.key.id.clone())
                    .with_attr("to", msg.key.remote_jid.to_string());
                if let Some(participant) = node.attr("participant") {
                    receipt = receipt.with_attr("participant", participant);
                }
                self.reply(receipt).await;
                self.events
                    .emit(SessionEvent::Messages(MessageBatch::notify(vec![msg])));
            }
            Inbound::Ignored => trace!(tag = %node.tag, "unhandled node"),
        }
        None
    }

    async fn reply(&self, node: Node) {
        if let Err(e) = self.transport.send_node(&node).await {
            debug!(tag = %node.tag, error = %e, "reply not sent");
        }
    }

    async fn pair_success(
        &mut self,
        iq_id: &str,
        device: Jid,
        platform: Option<String>,
        identity: &[u8],
    ) {
        match register_device(&mut self.creds, device.clone(), platform, identity) {
            Ok(account) => {
                self.paired.store(true, Ordering::SeqCst);
                info!(device = %device, "pairing succeeded");
                self.events
                    .emit(SessionEvent::CredentialsUpdated(self.creds.clone()));
                let sign = Node::new("pair-device-sign").with_children(vec![
                    Node::new("device-identity").with_content(account)
                ]);
                self.reply(iq_result(iq_id).with_children(vec![sign])).await;
            }
            Err(e) => {
                warn!(device = %device, error = %e, "rejecting pair-success");
                let error = Node::new("error")
                    .with_attr("code", "401")
                    .with_attr("text", "not-authorized");
                self.reply(
                    iq_result(iq_id)
                        .with_attr("type", "error")
                        .with_children(vec![error]),
                )
                .await;
            }
        }
    }

    /// Publish one token per server ref: the first for 60s, the rest for 20s
    /// each. Running out of refs unpaired closes the session as timed out.
    fn start_token_rotation(&self, refs: Vec<String>) {
        let tokens: Vec<String> = refs
            .iter()
            .map(|r| {
                pairing_token(
                    r,
                    &self.creds.noise_key_pub,
                    &self.creds.identity_key_pub,
                    &self.creds.adv_secret_key,
                )
            })
            .collect();
        let events = self.events.clone();
        let transport = Arc::clone(&self.transport);
        let paired = Arc::clone(&self.paired);

        tokio::spawn(async move {
            for (i, token) in tokens.into_iter().enumerate() {
                if paired.load(Ordering::SeqCst) || transport.is_closed() {
                    return;
                }
                if !events.emit(SessionEvent::Connection(ConnectionUpdate::PairingToken(token))) {
                    return;
                }
                let ttl = if i == 0 { FIRST_TOKEN_TTL } else { NEXT_TOKEN_TTL };
                tokio::time::sleep(ttl).await;
            }
            if paired.load(Ordering::SeqCst) || !transport.mark_closed() {
                return;
            }
            if let Err(e) = transport.send.close().await {
                trace!(error = %e, "closing socket");
            }
            events.emit(SessionEvent::Connection(ConnectionUpdate::Close(
                DisconnectReason::TimedOut,
            )));
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hmac::{Hmac, Mac};
    use sha2::Sha256;

    fn own() -> Jid {
        Jid::new_ad("5511900000000", 0, 7, DEFAULT_USER_SERVER)
    }

    fn close_reason(node: &Node) -> DisconnectReason {
        match interpret(node, None) {
            Inbound::Update(ConnectionUpdate::Close(r)) => r,
            other => panic!("expected close, got {other:?}"),
        }
    }

    #[test]
    fn success_opens() {
        assert!(matches!(
            interpret(&Node::new("success"), None),
            Inbound::Update(ConnectionUpdate::Open)
        ));
    }

    #[test]
    fn failure_and_stream_errors_map_to_reasons() {
        assert_eq!(
            close_reason(&Node::new("failure").with_attr("reason", "401")),
            DisconnectReason::LoggedOut
        );
        assert_eq!(
            close_reason(&Node::new("stream:error").with_attr("code", "515")),
            DisconnectReason::RestartRequired
        );
        assert_eq!(
            close_reason(
                &Node::new("stream:error")
                    .with_children(vec![Node::new("conflict").with_attr("type", "replaced")])
            ),
            DisconnectReason::ConnectionReplaced
        );
        assert_eq!(
            close_reason(&Node::new("failure")),
            DisconnectReason::Unknown
        );
    }

    #[test]
    fn pair_device_refs() {
        let node = Node::new("iq").with_attr("id", "q1").with_children(vec![
            Node::new("pair-device").with_children(vec![
                Node::new("ref").with_content(b"2@first".to_vec()),
                Node::new("ref").with_content(b"2@second".to_vec()),
            ]),
        ]);
        match interpret(&node, None) {
            Inbound::PairingRefs { iq_id, refs } => {
                assert_eq!(iq_id, "q1");
                assert_eq!(refs, vec!["2@first", "2@second"]);
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn ping_is_answered() {
        let node = Node::new("iq")
            .with_attr("id", "p1")
            .with_attr("type", "get")
            .with_attr("xmlns", "urn:xmpp:ping");
        assert!(matches!(interpret(&node, None), Inbound::Ping { iq_id } if iq_id == "p1"));
    }

    #[test]
    fn plaintext_message_is_decoded() {
        let node = Node::new("message")
            .with_attr("from", "5511988887777@s.whatsapp.net")
            .with_attr("id", "M1")
            .with_children(vec![Node::new("plaintext")
                .with_content(proto::Message::text("bom dia").encode_to_vec())]);
        let Inbound::Message(msg) = interpret(&node, Some(&own())) else {
            panic!("expected message");
        };
        assert_eq!(msg.key.remote_jid.to_string(), "5511988887777@s.whatsapp.net");
        assert_eq!(msg.key.id, "M1");
        assert!(!msg.key.from_me);
        assert_eq!(msg.message.unwrap().body_text(), "bom dia");
    }

    #[test]
    fn own_messages_are_flagged() {
        let node = Node::new("message")
            .with_attr("from", "5511900000000@s.whatsapp.net")
            .with_attr("id", "M2");
        let Inbound::Message(msg) = interpret(&node, Some(&own())) else {
            panic!("expected message");
        };
        assert!(msg.key.from_me);

        let group = Node::new("message")
            .with_attr("from", "120363025246125486@g.us")
            .with_attr("participant", "5511900000000:3@s.whatsapp.net")
            .with_attr("id", "M3");
        let Inbound::Message(msg) = interpret(&group, Some(&own())) else {
            panic!("expected message");
        };
        assert!(msg.key.from_me);
        assert!(msg.key.remote_jid.is_group());
    }

    #[test]
    fn participant_only_counts_in_groups() {
        let node = Node::new("message")
            .with_attr("from", "5511988887777@s.whatsapp.net")
            .with_attr("participant", "5511900000000@s.whatsapp.net")
            .with_attr("id", "M5");
        let Inbound::Message(msg) = interpret(&node, Some(&own())) else {
            panic!("expected message");
        };
        assert!(!msg.key.from_me);
    }

    #[test]
    fn encrypted_message_has_no_body() {
        let node = Node::new("message")
            .with_attr("from", "5511988887777@s.whatsapp.net")
            .with_attr("id", "M4")
            .with_children(vec![Node::new("enc")
                .with_attr("type", "msg")
                .with_content(vec![1, 2, 3])]);
        let Inbound::Message(msg) = interpret(&node, None) else {
            panic!("expected message");
        };
        assert!(msg.message.is_none());
    }

    #[test]
    fn text_node_layout() {
        let node = text_message_node("5511999999999:0@s.whatsapp.net", "3EB0AA", "hi");
        assert_eq!(node.attr("to"), Some("5511999999999:0@s.whatsapp.net"));
        assert_eq!(node.attr("id"), Some("3EB0AA"));
        let raw = node.get_child_by_tag("plaintext").and_then(Node::bytes).unwrap();
        assert_eq!(proto::Message::decode(raw).unwrap().body_text(), "hi");
    }

    #[test]
    fn pair_success_registers_device() {
        let mut creds = Credentials::generate();
        let mut mac = Hmac::<Sha256>::new_from_slice(&creds.adv_secret_key).unwrap();
        mac.update(b"details");
        let mut identity = b"details".to_vec();
        identity.extend_from_slice(&mac.finalize().into_bytes());

        let node = Node::new("iq").with_attr("id", "ps1").with_children(vec![
            Node::new("pair-success").with_children(vec![
                Node::new("device-identity").with_content(identity),
                Node::new("device").with_attr("jid", "5511900000000:7@s.whatsapp.net"),
                Node::new("platform").with_attr("name", "android"),
            ]),
        ]);
        let Inbound::PairSuccess {
            device,
            platform,
            identity,
            ..
        } = interpret(&node, None)
        else {
            panic!("expected pair-success");
        };

        let account = register_device(&mut creds, device, platform, &identity).unwrap();
        assert_eq!(creds.me, Some(own()));
        assert_eq!(creds.platform.as_deref(), Some("android"));
        assert_eq!(&account[..32], &creds.identity_key_pub[..]);
        assert_eq!(&account[96..], b"details");
        assert!(creds.has_valid_account());
    }

    #[test]
    fn pair_success_with_bad_hmac_is_rejected() {
        let mut creds = Credentials::generate();
        let mut identity = b"details".to_vec();
        identity.extend_from_slice(&[0u8; 32]);
        assert!(register_device(&mut creds, own(), None, &identity).is_err());
        assert!(!creds.is_registered());
    }
}
