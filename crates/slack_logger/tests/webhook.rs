#![cfg(feature = "http-client")]
#![allow(clippy::unwrap_used)]

use std::{sync::Arc, time::Duration};

use mockito::{Matcher, Server};
use parking_lot::Mutex;
use slack_logger::{
    ErrorKind, HttpWebhookClient, LogConfig, LogRecord, Severity, SlackFormatter, SlackHandler,
    SlackLoggerError, WebhookClient, WebhookPayload,
};

const WEBHOOK_PATH: &str = "/services/T000/B000/XXXX";

#[tokio::test]
async fn client_posts_json_payload() {
    let mut server = Server::new_async().await;
    let mock = server
        .mock("POST", WEBHOOK_PATH)
        .match_header("Content-Type", "application/json")
        .match_body(Matcher::JsonString(r#"{"text":"hello"}"#.to_owned()))
        .with_status(200)
        .with_body("ok")
        .create_async()
        .await;

    let client = HttpWebhookClient::new(
        &format!("{}{WEBHOOK_PATH}", server.url()),
        Duration::from_secs(5),
    )
    .unwrap();
    let response = client.send(&WebhookPayload::text("hello")).await.unwrap();

    assert!(response.is_success());
    mock.assert_async().await;
}

#[tokio::test]
async fn client_returns_rejections_as_responses() {
    let mut server = Server::new_async().await;
    let mock = server
        .mock("POST", WEBHOOK_PATH)
        .with_status(400)
        .with_body("invalid_blocks")
        .create_async()
        .await;

    let client = HttpWebhookClient::new(
        &format!("{}{WEBHOOK_PATH}", server.url()),
        Duration::from_secs(5),
    )
    .unwrap();
    let response = client.send(&WebhookPayload::text("hello")).await.unwrap();

    assert_eq!(response.status, 400);
    assert_eq!(response.body, "invalid_blocks");
    assert!(!response.is_success());
    mock.assert_async().await;
}

#[test]
fn handler_sends_formatted_record() {
    let mut server = Server::new();
    let mock = server
        .mock("POST", WEBHOOK_PATH)
        .match_body(Matcher::Regex(
            r#"\{"blocks":\[\{"type":"header","text":\{"type":"plain_text","text":":fire: CRITICAL \| testrunner"\}\}"#.to_owned(),
        ))
        .with_status(200)
        .with_body("ok")
        .create();

    let handler = SlackHandler::from_webhook(&format!("{}{WEBHOOK_PATH}", server.url()))
        .unwrap()
        .with_formatter(SlackFormatter::minimal(
            LogConfig::default().with_service("testrunner").into(),
        ));

    let response = handler
        .try_emit(&LogRecord::new(Severity::CRITICAL, "tests", "Database is gone"))
        .unwrap();
    assert!(response.is_success());
    mock.assert();
}

#[test]
fn handler_reports_rejected_dispatch() {
    let mut server = Server::new();
    let mock = server
        .mock("POST", WEBHOOK_PATH)
        .with_status(403)
        .with_body("invalid_token")
        .expect(2)
        .create();

    let reported = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&reported);
    let handler = SlackHandler::from_webhook(&format!("{}{WEBHOOK_PATH}", server.url()))
        .unwrap()
        .with_error_hook(move |error: &SlackLoggerError, _: &LogRecord| {
            sink.lock().push(error.to_string());
        });

    let record = LogRecord::new(Severity::ERROR, "tests", "Rejected");
    let error = handler.try_emit(&record).unwrap_err();
    assert_eq!(error.kind(), ErrorKind::Dispatch);
    assert!(matches!(error, SlackLoggerError::Dispatch { status: 403, .. }));

    assert!(handler.handle(&record));
    assert_eq!(
        *reported.lock(),
        ["Webhook rejected the message with status 403: invalid_token"]
    );
    mock.assert();
}

#[test]
fn unreachable_webhook_is_a_dispatch_error() {
    // Nothing listens on the discard port
    let handler = SlackHandler::new(
        HttpWebhookClient::new("http://127.0.0.1:9/hook", Duration::from_secs(2)).unwrap(),
    )
    .unwrap();

    let error = handler
        .try_emit(&LogRecord::new(Severity::ERROR, "tests", "Lost"))
        .unwrap_err();
    assert_eq!(error.kind(), ErrorKind::Dispatch);
}
