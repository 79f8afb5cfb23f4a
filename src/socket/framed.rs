//! Length-prefixed framing over WebSocket.
//! Each WebSocket binary message = one frame: 3-byte BE length + payload.

use crate::error::{ConnectionError, Error};
use crate::Result;
use futures::sink::SinkExt;
use futures::stream::{SplitSink, SplitStream, StreamExt};
use tokio::sync::Mutex;
use tokio_tungstenite::tungstenite::Message;

use super::{read_frame_len, write_frame_len, MAX_FRAME_SIZE};

type WsStream =
    tokio_tungstenite::WebSocketStream<tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>>;

fn ws_err(e: impl std::fmt::Display) -> Error {
    Error::Connection(ConnectionError::WebSocket(e.to_string()))
}

/// Send half of a framed WebSocket.
pub struct FramedSend {
    writer: Mutex<SplitSink<WsStream, Message>>,
}

impl FramedSend {
    pub(crate) fn new(writer: SplitSink<WsStream, Message>) -> Self {
        Self {
            writer: Mutex::new(writer),
        }
    }

    /// Write one frame as a single WebSocket binary message: 3-byte length + body.
    pub async fn send_frame(&self, data: &[u8]) -> Result<()> {
        if data.len() > MAX_FRAME_SIZE {
            return Err(Error::Binary("frame too large".into()));
        }
        let mut msg = vec![0u8; 3];
        write_frame_len(&mut msg, data.len());
        msg.extend_from_slice(data);
        self.writer
            .lock()
            .await
            .send(Message::Binary(msg))
            .await
            .map_err(ws_err)
    }

    pub async fn close(&self) -> Result<()> {
        self.writer.lock().await.close().await.map_err(ws_err)
    }
}

/// Receive half: each WebSocket binary message is one frame; returns the body only.
pub struct FramedRecv {
    reader: Mutex<SplitStream<WsStream>>,
}

impl FramedRecv {
    pub(crate) fn new(reader: SplitStream<WsStream>) -> Self {
        Self {
            reader: Mutex::new(reader),
        }
    }

    /// Read the next frame, skipping ping/pong control messages.
    pub async fn next_frame(&self) -> Result<Vec<u8>> {
        let mut r = self.reader.lock().await;
        let data = loop {
            let msg = r
                .next()
                .await
                .ok_or(Error::Connection(ConnectionError::Disconnected))?
                .map_err(ws_err)?;
            match msg {
                Message::Binary(d) => break d,
                Message::Ping(_) | Message::Pong(_) => continue,
                Message::Close(_) => return Err(Error::Connection(ConnectionError::Disconnected)),
                _ => return Err(ws_err("expected binary frame")),
            }
        };
        if data.len() < 3 {
            return Err(Error::Binary("frame too short".into()));
        }
        let len = read_frame_len(&data[..3]);
        if data.len() != 3 + len {
            return Err(Error::Binary("frame length mismatch".into()));
        }
        Ok(data[3..].to_vec())
    }
}
