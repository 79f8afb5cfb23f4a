//! WebSocket client connection (requires `full` feature).

use crate::error::{ConnectionError, Error};
use crate::Result;
use futures::stream::StreamExt;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::HeaderValue;

use super::framed::{FramedRecv, FramedSend};
use super::WS_ORIGIN;

/// Connect to the given WebSocket URL and return framed send/recv halves.
pub async fn connect(url: &str) -> Result<(FramedSend, FramedRecv)> {
    let mut request = url
        .into_client_request()
        .map_err(|e| Error::Connection(ConnectionError::WebSocket(e.to_string())))?;
    request
        .headers_mut()
        .insert("Origin", HeaderValue::from_static(WS_ORIGIN));

    let (ws_stream, _response) = connect_async(request)
        .await
        .map_err(|e| Error::Connection(ConnectionError::WebSocket(e.to_string())))?;
    let (write_half, read_half) = ws_stream.split();
    Ok((FramedSend::new(write_half), FramedRecv::new(read_half)))
}
