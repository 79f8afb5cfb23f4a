//! Noise protocol handshake and transport (WhatsApp: XX_25519_AESGCM_SHA256).
//! Requires `full` feature.

use crate::binary::{NOISE_START_PATTERN, WA_CONN_HEADER};
use crate::error::{ConnectionError, Error};
use crate::Result;
use std::sync::Arc;
use tokio::sync::Mutex;

use super::framed::{FramedRecv, FramedSend};

/// Noise pattern used by WhatsApp Web.
const NOISE_PATTERN: &str = "Noise_XX_25519_AESGCM_SHA256";

/// Largest Noise message.
const NOISE_MAX_LEN: usize = 65535;

/// AES-GCM tag appended to every encrypted payload.
const TAG_LEN: usize = 16;

fn handshake_err(stage: &str, e: impl std::fmt::Display) -> Error {
    Error::Connection(ConnectionError::HandshakeFailed(format!("{stage}: {e}")))
}

/// Prologue hashed into the handshake: WA header + pattern string (must match server).
fn prologue() -> Vec<u8> {
    let mut p = Vec::with_capacity(WA_CONN_HEADER.len() + NOISE_START_PATTERN.len());
    p.extend_from_slice(&WA_CONN_HEADER);
    p.extend_from_slice(NOISE_START_PATTERN);
    p
}

/// Run the Noise XX handshake as initiator over the framed WebSocket, using
/// `static_key` (the device Noise key) as the local static key.
pub async fn run_client_handshake(
    send: FramedSend,
    recv: FramedRecv,
    static_key: &[u8; 32],
) -> Result<(NoiseSend, NoiseRecv)> {
    let prologue = prologue();
    let params = NOISE_PATTERN
        .parse()
        .map_err(|e: snow::Error| handshake_err("params", e))?;
    let mut handshake = snow::Builder::new(params)
        .prologue(&prologue[..])
        .map_err(|e| handshake_err("prologue", e))?
        .local_private_key(&static_key[..])
        .map_err(|e| handshake_err("static key", e))?
        .build_initiator()
        .map_err(|e| handshake_err("build", e))?;

    // XX: initiator sends e
    let mut msg_buf = vec![0u8; NOISE_MAX_LEN];
    let len = handshake
        .write_message(&[], &mut msg_buf)
        .map_err(|e| handshake_err("write e", e))?;
    let mut first_frame = prologue;
    first_frame.extend_from_slice(&msg_buf[..len]);
    send.send_frame(&first_frame).await?;

    // XX: read e, ee, s, es from server
    let server_hello = recv.next_frame().await?;
    let mut payload_buf = vec![0u8; NOISE_MAX_LEN];
    handshake
        .read_message(&server_hello, &mut payload_buf)
        .map_err(|e| handshake_err("read server hello", e))?;

    // XX: initiator sends s, se
    let len = handshake
        .write_message(&[], &mut msg_buf)
        .map_err(|e| handshake_err("write s", e))?;
    send.send_frame(&msg_buf[..len]).await?;

    if !handshake.is_handshake_finished() {
        return Err(handshake_err("finish", "handshake incomplete"));
    }

    let transport_state = handshake
        .into_transport_mode()
        .map_err(|e| handshake_err("transport mode", e))?;
    let state = Arc::new(Mutex::new(transport_state));

    Ok((
        NoiseSend {
            framed: send,
            state: Arc::clone(&state),
        },
        NoiseRecv {
            framed: recv,
            state,
        },
    ))
}

/// Connect to the given WebSocket URL and complete the Noise handshake.
pub async fn connect_noise(url: &str, static_key: &[u8; 32]) -> Result<(NoiseSend, NoiseRecv)> {
    let (send, recv) = super::ws::connect(url).await?;
    run_client_handshake(send, recv, static_key).await
}

/// Send half: encrypts payloads with Noise before framing.
pub struct NoiseSend {
    framed: FramedSend,
    state: Arc<Mutex<snow::TransportState>>,
}

impl NoiseSend {
    pub async fn send_encrypted(&self, plaintext: &[u8]) -> Result<()> {
        if plaintext.len() + TAG_LEN > NOISE_MAX_LEN {
            return Err(Error::Binary("noise payload too large".into()));
        }
        let mut ciphertext = vec![0u8; plaintext.len() + TAG_LEN];
        let len = self
            .state
            .lock()
            .await
            .write_message(plaintext, &mut ciphertext)
            .map_err(|e| {
                Error::Connection(ConnectionError::WebSocket(format!("noise encrypt: {e}")))
            })?;
        ciphertext.truncate(len);
        self.framed.send_frame(&ciphertext).await
    }

    pub async fn close(&self) -> Result<()> {
        self.framed.close().await
    }
}

/// Receive half: read framed message then decrypt with Noise.
pub struct NoiseRecv {
    framed: FramedRecv,
    state: Arc<Mutex<snow::TransportState>>,
}

impl NoiseRecv {
    /// Read next frame and decrypt. Returns the plaintext.
    pub async fn next_decrypted_frame(&self) -> Result<Vec<u8>> {
        let ciphertext = self.framed.next_frame().await?;
        let mut plaintext = vec![0u8; ciphertext.len()];
        let len = self
            .state
            .lock()
            .await
            .read_message(&ciphertext, &mut plaintext)
            .map_err(|e| {
                Error::Connection(ConnectionError::WebSocket(format!("noise decrypt: {e}")))
            })?;
        plaintext.truncate(len);
        Ok(plaintext)
    }
}
