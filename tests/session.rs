//! Session correlation against a fake DevTools endpoint.

mod common;

use std::sync::Arc;
use std::time::Duration;

use headless_pdf::browser::{DevToolsEndpoint, TargetInfo};
use headless_pdf::protocol::Inbound;
use headless_pdf::transport::{Session, SessionOptions, SessionState};
use headless_pdf::{Error, PrintParams};
use proptest::prelude::*;
use serde_json::{Value, json};
use tokio_test::{assert_err, assert_ok};

use common::{FAKE_PDF, FakeBrowser, Reply, chrome_like, echo, eventually, free_port};

// ============================================================================
// Helpers
// ============================================================================

const SHORT: Duration = Duration::from_secs(5);

fn options() -> SessionOptions {
    SessionOptions {
        call_timeout: SHORT,
        connect_timeout: SHORT,
        verbose: true,
    }
}

async fn open(fake: &FakeBrowser, options: SessionOptions) -> Session {
    let endpoint = DevToolsEndpoint::new(&fake.http_url(), SHORT).expect("endpoint");
    let target = endpoint.new_target().await.expect("new target");
    Session::connect(target, options).await.expect("connect")
}

// ============================================================================
// Lifecycle
// ============================================================================

#[tokio::test]
async fn test_connect_enables_page_events_with_first_id() {
    common::init_tracing();
    let fake = FakeBrowser::start(chrome_like()).await;

    let session = open(&fake, options()).await;

    assert_eq!(session.state(), SessionState::Active);
    assert_eq!(session.next_call_id().as_u64(), 2);
    assert_eq!(fake.call_methods(0), vec!["Page.enable"]);
    assert_eq!(fake.call_ids(0), vec![1]);
    assert_eq!(session.target().id.as_str(), "T1");
}

#[tokio::test]
async fn test_connect_refused() {
    let port = free_port().await;
    let target = TargetInfo::new("T1", format!("ws://127.0.0.1:{port}/devtools/page/T1"));

    let err = Session::connect(target, options()).await.unwrap_err();
    assert!(err.is_refused(), "unexpected error: {err:?}");
}

#[tokio::test]
async fn test_connect_fails_when_page_enable_fails() {
    let fake = FakeBrowser::start(Arc::new(|call: &Value| {
        Reply::Send(vec![json!({
            "id": call["id"].clone(),
            "error": { "code": -32000, "message": "Page domain unavailable" }
        })])
    }))
    .await;

    let endpoint = DevToolsEndpoint::new(&fake.http_url(), SHORT).expect("endpoint");
    let target = endpoint.new_target().await.expect("new target");

    let err = Session::connect(target, options()).await.unwrap_err();
    assert!(matches!(err, Error::Remote { ref method, .. } if method == "Page.enable"));
}

#[tokio::test]
async fn test_close_sends_close_frame() {
    let fake = FakeBrowser::start(chrome_like()).await;
    let session = open(&fake, options()).await;

    session.close().await;

    assert!(eventually(SHORT, || fake.ws_closed() == 1).await);
}

// ============================================================================
// Correlation
// ============================================================================

#[tokio::test]
async fn test_call_ids_strictly_increase() {
    let fake = FakeBrowser::start(echo()).await;
    let mut session = open(&fake, options()).await;

    for _ in 0..5 {
        let result = assert_ok!(session.call("Runtime.runIfWaitingForDebugger", json!({})).await);
        assert_eq!(result["method"], "Runtime.runIfWaitingForDebugger");
    }

    assert_eq!(fake.call_ids(0), vec![1, 2, 3, 4, 5, 6]);
    assert_eq!(session.next_call_id().as_u64(), 7);
}

#[tokio::test]
async fn test_events_and_foreign_responses_are_skipped() {
    let fake = FakeBrowser::start(Arc::new(|call: &Value| {
        let id = call["id"].as_u64().unwrap_or_default();
        if call["method"] == "Page.enable" {
            return Reply::Send(vec![json!({ "id": id, "result": {} })]);
        }

        let mut messages: Vec<Value> = (0..5)
            .map(|n| json!({ "method": "Network.dataReceived", "params": { "n": n } }))
            .collect();
        messages.push(json!({ "id": id + 100, "result": { "stale": true } }));
        messages.push(json!({ "id": id, "result": { "value": 42 } }));
        Reply::Send(messages)
    }))
    .await;
    let mut session = open(&fake, options()).await;

    let result = session
        .call("Runtime.evaluate", json!({ "expression": "6 * 7" }))
        .await
        .expect("call");

    assert_eq!(result["value"], 42);
    let last = session.last_message().expect("last message");
    assert_eq!(last.id().map(|id| id.as_u64()), Some(2));
}

#[tokio::test]
async fn test_error_response_surfaces_remote_error() {
    let fake = FakeBrowser::start(Arc::new(|call: &Value| {
        let id = call["id"].as_u64().unwrap_or_default();
        if id == 7 {
            Reply::Send(vec![json!({ "id": 7, "error": { "code": -32000, "message": "boom" } })])
        } else {
            Reply::Send(vec![json!({ "id": id, "result": {} })])
        }
    }))
    .await;
    let mut session = open(&fake, options()).await;

    for _ in 2..7 {
        assert_ok!(session.call("DOM.enable", json!({})).await);
    }

    let err = assert_err!(session.call("DOM.getDocument", json!({})).await);
    match err {
        Error::Remote { method, code, message, .. } => {
            assert_eq!(method, "DOM.getDocument");
            assert_eq!(code, -32000);
            assert!(message.contains("boom"));
        }
        other => panic!("unexpected error: {other:?}"),
    }

    assert!(!session.is_closed());
    assert!(session.needs_reset());
}

/// Runs `plan` on one session: `true` is a plain call, `false` a call that
/// waits for an event. Returns the ids the endpoint received.
async fn ids_for_plan(plan: &[bool]) -> Vec<u64> {
    let fake = FakeBrowser::start(chrome_like()).await;
    let mut session = open(&fake, options()).await;

    for &plain in plan {
        if plain {
            session
                .call("Browser.getVersion", json!({}))
                .await
                .expect("call");
        } else {
            session
                .call_and_wait_for_event(
                    "Page.navigate",
                    json!({ "url": "about:blank" }),
                    "Page.frameStoppedLoading",
                )
                .await
                .expect("event");
        }
    }

    assert!(!session.needs_reset());
    fake.call_ids(0)
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(16))]

    #[test]
    fn prop_call_ids_increase_across_mixed_calls(plan in prop::collection::vec(any::<bool>(), 1..12)) {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .expect("runtime");
        let ids = runtime.block_on(ids_for_plan(&plan));

        let expected: Vec<u64> = (1..=plan.len() as u64 + 1).collect();
        prop_assert_eq!(ids, expected);
    }
}

#[tokio::test]
async fn test_wait_for_event_ignores_other_events() {
    let fake = FakeBrowser::start(chrome_like()).await;
    let mut session = open(&fake, options()).await;

    let event = session
        .call_and_wait_for_event(
            "Page.navigate",
            json!({ "url": "about:blank" }),
            "Page.frameStoppedLoading",
        )
        .await
        .expect("event");

    assert_eq!(event.method, "Page.frameStoppedLoading");
    assert_eq!(event.params["frameId"], "F1");
    assert!(matches!(
        session.last_message(),
        Some(Inbound::Event(event)) if event.method == "Page.frameStoppedLoading"
    ));
}

#[tokio::test]
async fn test_wait_for_event_fails_on_error_response() {
    let fake = FakeBrowser::start(Arc::new(|call: &Value| {
        let id = call["id"].clone();
        if call["method"] == "Page.navigate" {
            Reply::Send(vec![json!({
                "id": id,
                "error": { "code": -32000, "message": "Cannot navigate to invalid URL" }
            })])
        } else {
            Reply::Send(vec![json!({ "id": id, "result": {} })])
        }
    }))
    .await;
    let mut session = open(&fake, options()).await;

    let err = session
        .call_and_wait_for_event("Page.navigate", json!({ "url": "::" }), "Page.frameStoppedLoading")
        .await
        .unwrap_err();

    assert!(matches!(err, Error::Remote { code: -32000, .. }), "unexpected error: {err:?}");
}

// ============================================================================
// Failure Modes
// ============================================================================

#[tokio::test]
async fn test_peer_close_closes_session() {
    let fake = FakeBrowser::start(Arc::new(|call: &Value| {
        if call["method"] == "Page.enable" {
            Reply::Send(vec![json!({ "id": call["id"].clone(), "result": {} })])
        } else {
            Reply::Close
        }
    }))
    .await;
    let mut session = open(&fake, options()).await;

    let err = session.call("Page.reload", json!({})).await.unwrap_err();
    assert!(matches!(err, Error::ConnectionClosed), "unexpected error: {err:?}");
    assert!(session.is_closed());

    let err = session.call("Page.reload", json!({})).await.unwrap_err();
    assert!(matches!(err, Error::ConnectionClosed));
    assert_eq!(fake.calls(0).len(), 2);
}

#[tokio::test]
async fn test_call_timeout_closes_session() {
    let fake = FakeBrowser::start(Arc::new(|call: &Value| {
        if call["method"] == "Page.enable" {
            Reply::Send(vec![json!({ "id": call["id"].clone(), "result": {} })])
        } else {
            Reply::Silent
        }
    }))
    .await;
    let mut session = open(
        &fake,
        SessionOptions {
            call_timeout: Duration::from_millis(200),
            ..options()
        },
    )
    .await;

    let err = session.call("Page.printToPDF", json!({})).await.unwrap_err();
    match &err {
        Error::RequestTimeout { id, method, timeout_ms } => {
            assert_eq!(id.as_u64(), 2);
            assert_eq!(method, "Page.printToPDF");
            assert_eq!(*timeout_ms, 200);
        }
        other => panic!("unexpected error: {other:?}"),
    }
    assert!(err.is_timeout());
    assert!(session.is_closed());
}

// ============================================================================
// Rendering
// ============================================================================

#[tokio::test]
async fn test_render_pdf() {
    let fake = FakeBrowser::start(chrome_like()).await;
    let mut session = open(&fake, options()).await;

    let params = PrintParams::default().with_landscape(true);
    let pdf = session
        .render_pdf("<h1>Hello</h1>", &params)
        .await
        .expect("render");

    assert_eq!(pdf, FAKE_PDF);
    assert!(pdf.starts_with(b"%PDF-1."));

    let calls = fake.calls(0);
    assert_eq!(
        fake.call_methods(0),
        vec!["Page.enable", "Page.navigate", "Page.printToPDF"]
    );
    assert_eq!(
        calls[1]["params"]["url"],
        "data:text/html;base64,PGgxPkhlbGxvPC9oMT4="
    );
    assert_eq!(calls[2]["params"]["printBackground"], true);
    assert_eq!(calls[2]["params"]["landscape"], true);
    assert_eq!(fake.call_ids(0), vec![1, 2, 3]);
}

#[tokio::test]
async fn test_render_pdf_without_data_field() {
    let fake = FakeBrowser::start(Arc::new(|call: &Value| {
        if call["method"] == "Page.printToPDF" {
            Reply::Send(vec![json!({ "id": call["id"].clone(), "result": {} })])
        } else {
            common::respond_like_chrome(call)
        }
    }))
    .await;
    let mut session = open(&fake, options()).await;

    let err = session
        .render_pdf("<p>empty</p>", &PrintParams::default())
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Protocol { .. }), "unexpected error: {err:?}");
}
