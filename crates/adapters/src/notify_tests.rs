// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

fn notice() -> Notice {
    Notice {
        job_id: JobId::from("3fa9c01b7e"),
        subject: "Your track is ready".to_string(),
        body: "Go to https://example.org/view?uploadid=3fa9c01b7e".to_string(),
    }
}

#[test]
fn webhook_payload_flattens_notice() {
    let n = notice();
    let payload = WebhookPayload { channel: Channel::Email, recipient: "a@example.com", notice: &n };
    let json = serde_json::to_value(&payload).unwrap();
    assert_eq!(json["channel"], "email");
    assert_eq!(json["recipient"], "a@example.com");
    assert_eq!(json["job_id"], "3fa9c01b7e");
    assert_eq!(json["subject"], "Your track is ready");
}

#[tokio::test]
async fn log_transport_always_succeeds() {
    let transport = LogTransport::new(Channel::Push);
    assert_eq!(transport.channel(), Channel::Push);
    transport.send("token", &notice()).await.unwrap();
}

#[tokio::test]
async fn webhook_reports_unreachable_relay() {
    let transport =
        WebhookTransport::new(reqwest::Client::new(), "http://127.0.0.1:9/relay", Channel::Email);
    let err = transport.send("a@example.com", &notice()).await.unwrap_err();
    assert!(matches!(err, NotifyError::Http { channel: Channel::Email, .. }));
}

#[tokio::test]
async fn fake_transport_records_and_fails_on_demand() {
    let transport = FakeTransport::new(Channel::Email);
    transport.send("a@example.com", &notice()).await.unwrap();
    transport.set_failing(true);
    assert!(transport.send("b@example.com", &notice()).await.is_err());

    let sent = transport.sent();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].recipient, "a@example.com");
}

#[test]
fn channels_display_lowercase() {
    assert_eq!(Channel::Email.to_string(), "email");
    assert_eq!(Channel::Chat.to_string(), "chat");
}
