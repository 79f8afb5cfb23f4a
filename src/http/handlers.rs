use super::{ApiError, AppState};
use crate::session::{ConnectionState, SendReceipt};
use crate::types::qualify;
use axum::extract::State;
use axum::response::Json;
use bytes::Bytes;
use chrono::{SecondsFormat, Utc};
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{info, warn};

/// Request body of `POST /send` and `POST /webhook`.
#[derive(Debug, Deserialize)]
struct OutboundRequest {
    number: Option<String>,
    to: Option<String>,
    message: Option<String>,
}

/// Which recipient field an endpoint reads first.
#[derive(Clone, Copy)]
enum Prefer {
    Number,
    To,
}

impl OutboundRequest {
    /// Returns the recipient address and the message text.
    fn parse(body: &[u8], prefer: Prefer) -> Result<(String, String), ApiError> {
        let req: OutboundRequest = serde_json::from_slice(body)
            .map_err(|e| ApiError::BadRequest(format!("invalid JSON body: {e}")))?;
        let non_empty = |s: Option<String>| s.filter(|s| !s.trim().is_empty());
        let (first, second, required) = match prefer {
            Prefer::Number => (req.number, req.to, "required fields: number, message"),
            Prefer::To => (req.to, req.number, "required fields: to, message"),
        };
        let (Some(recipient), Some(message)) =
            (non_empty(first).or(non_empty(second)), non_empty(req.message))
        else {
            return Err(ApiError::BadRequest(required.into()));
        };
        Ok((qualify(&recipient), message))
    }
}

fn now_rfc3339() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
}

pub(super) async fn index(State(state): State<AppState>) -> Json<Value> {
    let snapshot = state.session.snapshot().await;
    Json(json!({
        "service": &*state.service_name,
        "status": snapshot.state(),
        "version": state.version,
    }))
}

pub(super) async fn qr(State(state): State<AppState>) -> Json<Value> {
    let snapshot = state.session.snapshot().await;
    if let Some(token) = snapshot.pairing_token() {
        return Json(json!({ "qr": token, "status": ConnectionState::AwaitingScan }));
    }
    if snapshot.is_connected() {
        Json(json!({
            "status": ConnectionState::Connected,
            "message": "WhatsApp already connected",
        }))
    } else {
        Json(json!({
            "status": ConnectionState::Disconnected,
            "message": "waiting for connection",
        }))
    }
}

pub(super) async fn status(State(state): State<AppState>) -> Json<Value> {
    let snapshot = state.session.snapshot().await;
    Json(json!({
        "connected": snapshot.is_connected(),
        "hasQR": snapshot.pairing_token().is_some(),
        "timestamp": now_rfc3339(),
    }))
}

/// Availability is checked before the body so a disconnected relay answers
/// 503 whatever it was sent.
async fn deliver(state: &AppState, body: &[u8], prefer: Prefer) -> Result<SendReceipt, ApiError> {
    if !state.session.is_connected().await {
        return Err(ApiError::Unavailable(
            "WhatsApp not connected; scan the QR code at /qr".into(),
        ));
    }
    let (to, message) = OutboundRequest::parse(body, prefer)?;
    match state.session.send_text(&to, &message).await {
        Ok(receipt) => {
            info!(to = %receipt.to, id = %receipt.id, "message relayed");
            Ok(receipt)
        }
        Err(e) => {
            warn!(to = %to, error = %e, "send failed");
            Err(e.into())
        }
    }
}

pub(super) async fn send(
    State(state): State<AppState>,
    body: Bytes,
) -> Result<Json<Value>, ApiError> {
    let receipt = deliver(&state, &body, Prefer::Number).await?;
    Ok(Json(json!({
        "success": true,
        "to": receipt.to,
        "message": "message sent",
        "messageId": receipt.id,
    })))
}

pub(super) async fn webhook(
    State(state): State<AppState>,
    body: Bytes,
) -> Result<Json<Value>, ApiError> {
    let receipt = deliver(&state, &body, Prefer::To).await?;
    Ok(Json(json!({
        "success": true,
        "to": receipt.to,
        "messageId": receipt.id,
    })))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(body: &str, prefer: Prefer) -> Result<(String, String), ApiError> {
        OutboundRequest::parse(body.as_bytes(), prefer)
    }

    #[test]
    fn bare_number_is_qualified() {
        let (to, msg) = parse(r#"{"number":"5511999999999","message":"hi"}"#, Prefer::Number).unwrap();
        assert_eq!(to, "5511999999999@s.whatsapp.net");
        assert_eq!(msg, "hi");
    }

    #[test]
    fn qualified_recipient_passes_through() {
        let (to, _) = parse(r#"{"to":"120363025246125486@g.us","message":"hi"}"#, Prefer::To).unwrap();
        assert_eq!(to, "120363025246125486@g.us");
    }

    #[test]
    fn either_recipient_field_is_accepted() {
        let (to, _) = parse(r#"{"to":"551100","message":"x"}"#, Prefer::Number).unwrap();
        assert_eq!(to, "551100@s.whatsapp.net");
        let (to, _) = parse(r#"{"number":"551101","to":"","message":"x"}"#, Prefer::To).unwrap();
        assert_eq!(to, "551101@s.whatsapp.net");
    }

    #[test]
    fn missing_or_empty_fields_are_rejected() {
        for body in [
            r#"{"message":"hi"}"#,
            r#"{"number":"5511"}"#,
            r#"{"number":"","message":"hi"}"#,
            r#"{"number":"5511","message":""}"#,
            r#"{}"#,
        ] {
            assert!(
                matches!(parse(body, Prefer::Number), Err(ApiError::BadRequest(_))),
                "{body}"
            );
        }
    }

    #[test]
    fn malformed_json_is_rejected() {
        assert!(matches!(
            parse("{not json", Prefer::Number),
            Err(ApiError::BadRequest(_))
        ));
        assert!(matches!(
            parse(r#"{"number":5511,"message":"hi"}"#, Prefer::Number),
            Err(ApiError::BadRequest(_))
        ));
    }

    #[test]
    fn addresses_are_not_rewritten() {
        for addr in ["a@b@c", "5511.0@s.whatsapp.net", " 5511:0@s.whatsapp.net"] {
            let body = json!({ "to": addr, "message": "hi" }).to_string();
            let (to, _) = parse(&body, Prefer::To).unwrap();
            assert_eq!(to, addr);
        }
    }
}
