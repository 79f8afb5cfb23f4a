mod common;

use common::{batch, spawn_relay, text_message};
use mockito::{Matcher, Mock};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tokio_test::assert_ok;
use whatsapp_relay::{ForwardPayload, Notifier, WebhookNotifier};

async fn wait_for(mock: &Mock) {
    for _ in 0..200 {
        if mock.matched_async().await {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("webhook not called in time");
}

fn notifier(server: &mockito::Server) -> WebhookNotifier {
    let url = format!("{}/webhook/whatsapp", server.url()).parse().unwrap();
    WebhookNotifier::new(url, Some(Duration::from_secs(2))).unwrap()
}

#[tokio::test]
async fn inbound_message_is_posted_as_json() {
    let mut server = mockito::Server::new_async().await;
    let mock = server
        .mock("POST", "/webhook/whatsapp")
        .match_header("content-type", "application/json")
        .match_body(Matcher::PartialJson(json!({
            "from": "5511988887777@s.whatsapp.net",
            "message": "bom dia",
            "messageId": "ABCD1234",
        })))
        .with_status(200)
        .expect(1)
        .create_async()
        .await;
    let own = server
        .mock("POST", "/webhook/whatsapp")
        .match_body(Matcher::PartialJson(json!({ "messageId": "OWN1" })))
        .expect(0)
        .create_async()
        .await;

    let relay = spawn_relay(Arc::new(notifier(&server))).await;
    relay.connect().await;
    relay.connector.emit(batch(vec![
        text_message("5511988887777@s.whatsapp.net", "ABCD1234", "bom dia", false),
        text_message("5511900000000@s.whatsapp.net", "OWN1", "sent by me", true),
    ]));

    wait_for(&mock).await;
    tokio::time::sleep(Duration::from_millis(100)).await;
    mock.assert_async().await;
    own.assert_async().await;
}

#[tokio::test]
async fn failing_webhook_does_not_disturb_the_session() {
    let mut server = mockito::Server::new_async().await;
    let mock = server
        .mock("POST", "/webhook/whatsapp")
        .with_status(500)
        .expect(2)
        .create_async()
        .await;

    let relay = spawn_relay(Arc::new(notifier(&server))).await;
    relay.connect().await;
    relay.connector.emit(batch(vec![
        text_message("5511988887777@s.whatsapp.net", "M1", "one", false),
        text_message("5511988887777@s.whatsapp.net", "M2", "two", false),
    ]));

    wait_for(&mock).await;
    mock.assert_async().await;

    assert!(relay.session.is_connected().await);
    let (status, _) = relay
        .post("/send", r#"{"number":"5511988887777","message":"still here"}"#)
        .await;
    assert_eq!(status, 200);
}

#[tokio::test]
async fn notifier_reports_error_status() {
    let payload = ForwardPayload {
        from: "5511988887777@s.whatsapp.net".parse().unwrap(),
        message: String::new(),
        timestamp: "2026-01-01T00:00:00.000Z".into(),
        message_id: None,
    };

    let mut accepting = mockito::Server::new_async().await;
    let _accepted = accepting
        .mock("POST", "/webhook/whatsapp")
        .with_status(204)
        .create_async()
        .await;
    assert_ok!(notifier(&accepting).notify(&payload).await);

    let mut failing = mockito::Server::new_async().await;
    let _rejected = failing
        .mock("POST", "/webhook/whatsapp")
        .with_status(502)
        .create_async()
        .await;
    let err = notifier(&failing).notify(&payload).await.unwrap_err();
    assert_eq!(err.to_string(), "webhook responded with status 502");
}
