//! Queue client tests against a wiremock server.
//!
//! These tests verify:
//! - Submission path vs. status/result URL anchoring
//! - The polling state machine (completion, failure, timeout, unknown status)
//! - Immediate-return mode
//! - Upstream error normalization

use std::{sync::Arc, time::Duration};

use fal_node::{
    testing::test_client_with_clock, Client, Config, Error, JobStatus, JobStatusMetrics,
    ManualClock, MetricsCallbacks, ModelId, PollOptions, SchemaCache,
};
use serde_json::json;
use wiremock::matchers::{body_json, header, method, path};
use wiremock::{Mock, MockServer, Request, Respond, ResponseTemplate};

#[derive(Clone)]
struct SequenceResponder {
    templates: Arc<std::sync::Mutex<std::collections::VecDeque<ResponseTemplate>>>,
}

impl SequenceResponder {
    fn new(templates: Vec<ResponseTemplate>) -> Self {
        Self {
            templates: Arc::new(std::sync::Mutex::new(templates.into_iter().collect())),
        }
    }
}

impl Respond for SequenceResponder {
    fn respond(&self, _req: &Request) -> ResponseTemplate {
        let mut templates = self.templates.lock().expect("mutex should not be poisoned");
        templates.pop_front().unwrap_or_else(|| {
            ResponseTemplate::new(500).set_body_json(json!({
                "detail": "No more mock responses configured"
            }))
        })
    }
}

fn status(value: &str) -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_json(json!({ "status": value }))
}

async fn mount_submit(server: &MockServer, submit_path: &str, request_id: &str) {
    Mock::given(method("POST"))
        .and(path(submit_path))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "request_id": request_id })))
        .expect(1)
        .mount(server)
        .await;
}

#[tokio::test]
async fn polls_until_completed_and_merges_result() {
    let server = MockServer::start().await;
    let (client, clock) = test_client_with_clock(&server.uri(), &server.uri());

    Mock::given(method("POST"))
        .and(path("/fal-ai/flux/dev"))
        .and(header("authorization", "Key fal_test_key"))
        .and(body_json(json!({ "prompt": "a red fox" })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "request_id": "req-1" })))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/fal-ai/flux/requests/req-1/status"))
        .respond_with(SequenceResponder::new(vec![
            status("IN_QUEUE"),
            status("IN_PROGRESS"),
            status("COMPLETED"),
        ]))
        .expect(3)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/fal-ai/flux/requests/req-1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "images": [{ "url": "https://cdn.example/fox.png" }],
            "seed": 42
        })))
        .expect(1)
        .mount(&server)
        .await;

    let opts = PollOptions::default().with_poll_interval(Duration::from_secs(2));
    let result = client
        .queue()
        .run(&ModelId::new("fal-ai/flux/dev"), json!({ "prompt": "a red fox" }), opts)
        .await
        .expect("job should complete");

    assert_eq!(result["seed"], 42);
    assert_eq!(result["request_id"], "req-1");
    assert_eq!(result["model"], "fal-ai/flux/dev");
    assert_eq!(clock.sleeps(), vec![Duration::from_secs(2), Duration::from_secs(2)]);
}

#[tokio::test]
async fn failed_status_stops_polling_immediately() {
    let server = MockServer::start().await;
    let (client, clock) = test_client_with_clock(&server.uri(), &server.uri());

    mount_submit(&server, "/fal-ai/fast-sdxl", "req-2").await;
    Mock::given(method("GET"))
        .and(path("/fal-ai/fast-sdxl/requests/req-2/status"))
        .respond_with(status("FAILED"))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/fal-ai/fast-sdxl/requests/req-2"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
        .expect(0)
        .mount(&server)
        .await;

    let err = client
        .queue()
        .run(&ModelId::new("fal-ai/fast-sdxl"), json!({}), PollOptions::default())
        .await
        .unwrap_err();

    match &err {
        Error::JobFailed { request_id, status } => {
            assert_eq!(request_id.as_str(), "req-2");
            assert_eq!(*status, JobStatus::Failed);
        }
        other => panic!("expected JobFailed, got {other:?}"),
    }
    assert_eq!(err.request_id(), Some("req-2"));
    assert!(clock.sleeps().is_empty());
}

#[tokio::test]
async fn unknown_status_is_terminal() {
    let server = MockServer::start().await;
    let (client, _clock) = test_client_with_clock(&server.uri(), &server.uri());

    mount_submit(&server, "/fal-ai/fast-sdxl", "req-3").await;
    Mock::given(method("GET"))
        .and(path("/fal-ai/fast-sdxl/requests/req-3/status"))
        .respond_with(status("PAUSED"))
        .expect(1)
        .mount(&server)
        .await;

    let err = client
        .queue()
        .run(&ModelId::new("fal-ai/fast-sdxl"), json!({}), PollOptions::default())
        .await
        .unwrap_err();
    assert!(matches!(err, Error::UnexpectedStatus { ref status, .. } if status == "PAUSED"));
}

#[tokio::test]
async fn gives_up_after_max_wait() {
    let server = MockServer::start().await;
    let (client, clock) = test_client_with_clock(&server.uri(), &server.uri());

    mount_submit(&server, "/fal-ai/flux/dev", "req-4").await;
    Mock::given(method("GET"))
        .and(path("/fal-ai/flux/requests/req-4/status"))
        .respond_with(status("IN_PROGRESS"))
        .expect(2)
        .mount(&server)
        .await;

    let opts = PollOptions::default()
        .with_poll_interval(Duration::from_secs(5))
        .with_max_wait(Duration::from_secs(10));
    let err = client
        .queue()
        .run(&ModelId::new("fal-ai/flux/dev"), json!({}), opts)
        .await
        .unwrap_err();

    assert!(matches!(err, Error::Timeout { .. }));
    assert_eq!(err.request_id(), Some("req-4"));
    let message = err.to_string();
    assert!(message.contains("req-4"), "{message}");
    assert!(message.contains("increase the max wait time"), "{message}");
    assert_eq!(clock.elapsed(), Duration::from_secs(10));
}

#[tokio::test]
async fn deadline_shorter_than_interval_polls_once() {
    let server = MockServer::start().await;
    let (client, clock) = test_client_with_clock(&server.uri(), &server.uri());

    mount_submit(&server, "/fal-ai/flux/dev", "req-4b").await;
    Mock::given(method("GET"))
        .and(path("/fal-ai/flux/requests/req-4b/status"))
        .respond_with(status("IN_QUEUE"))
        .expect(1)
        .mount(&server)
        .await;

    let opts = PollOptions::default()
        .with_poll_interval(Duration::from_secs(5))
        .with_max_wait(Duration::from_secs(1));
    let err = client
        .queue()
        .run(&ModelId::new("fal-ai/flux/dev"), json!({}), opts)
        .await
        .unwrap_err();

    assert!(matches!(err, Error::Timeout { .. }));
    assert_eq!(err.request_id(), Some("req-4b"));
    assert_eq!(clock.sleeps(), vec![Duration::from_secs(5)]);
}

#[tokio::test]
async fn immediate_return_skips_polling() {
    let server = MockServer::start().await;
    let (client, _clock) = test_client_with_clock(&server.uri(), &server.uri());

    mount_submit(&server, "/fal-ai/flux/dev", "req-5").await;
    Mock::given(method("GET"))
        .respond_with(status("IN_QUEUE"))
        .expect(0)
        .mount(&server)
        .await;

    let result = client
        .queue()
        .run(
            &ModelId::new("fal-ai/flux/dev"),
            json!({ "prompt": "x" }),
            PollOptions::no_wait(),
        )
        .await
        .expect("submission should succeed");

    let base = server.uri();
    assert_eq!(result["status"], "QUEUED");
    assert_eq!(result["request_id"], "req-5");
    assert_eq!(result["model"], "fal-ai/flux/dev");
    assert_eq!(result["input"], json!({ "prompt": "x" }));
    assert_eq!(
        result["status_url"],
        format!("{base}/fal-ai/flux/requests/req-5/status")
    );
    assert_eq!(
        result["response_url"],
        format!("{base}/fal-ai/flux/requests/req-5")
    );
    assert_eq!(
        result["cancel_url"],
        format!("{base}/fal-ai/flux/requests/req-5/cancel")
    );
}

#[tokio::test]
async fn follows_urls_returned_by_the_queue() {
    let server = MockServer::start().await;
    let (client, _clock) = test_client_with_clock(&server.uri(), &server.uri());
    let base = server.uri();

    Mock::given(method("POST"))
        .and(path("/fal-ai/flux/dev"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "request_id": "req-6",
            "status_url": format!("{base}/custom/status/req-6"),
            "response_url": format!("{base}/custom/result/req-6"),
        })))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/custom/status/req-6"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "status": "COMPLETED",
            "response_url": format!("{base}/custom/final/req-6"),
        })))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/custom/final/req-6"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!("done")))
        .expect(1)
        .mount(&server)
        .await;

    let result = client
        .queue()
        .run(&ModelId::new("fal-ai/flux/dev"), json!({}), PollOptions::default())
        .await
        .expect("job should complete");
    assert_eq!(
        result,
        json!({ "result": "done", "request_id": "req-6", "model": "fal-ai/flux/dev" })
    );
}

#[tokio::test]
async fn cancel_puts_to_cancel_url() {
    let server = MockServer::start().await;
    let (client, _clock) = test_client_with_clock(&server.uri(), &server.uri());

    mount_submit(&server, "/fal-ai/flux/dev", "req-7").await;
    Mock::given(method("PUT"))
        .and(path("/fal-ai/flux/requests/req-7/cancel"))
        .respond_with(
            ResponseTemplate::new(202).set_body_json(json!({ "status": "CANCELLATION_REQUESTED" })),
        )
        .expect(1)
        .mount(&server)
        .await;

    let queue = client.queue();
    let job = queue
        .submit(&ModelId::new("fal-ai/flux/dev"), &json!({}))
        .await
        .expect("submit");
    let resp = queue.cancel(&job).await.expect("cancel");
    assert_eq!(resp["status"], "CANCELLATION_REQUESTED");
}

#[tokio::test]
async fn upstream_errors_are_normalized() {
    let server = MockServer::start().await;
    let (client, _clock) = test_client_with_clock(&server.uri(), &server.uri());

    Mock::given(method("POST"))
        .and(path("/fal-ai/flux/dev"))
        .respond_with(
            ResponseTemplate::new(422)
                .insert_header("x-fal-request-id", "req-err")
                .set_body_json(json!({ "detail": "prompt is required" })),
        )
        .mount(&server)
        .await;

    let err = client
        .queue()
        .run(&ModelId::new("fal-ai/flux/dev"), json!({}), PollOptions::default())
        .await
        .unwrap_err();

    assert_eq!(err.status_code(), Some(422));
    assert_eq!(err.request_id(), Some("req-err"));
    let normalized = err.normalized().expect("api errors normalize");
    assert!(normalized.message.contains("prompt is required"));
    assert_eq!(normalized.status_code, Some(422));
    assert_eq!(normalized.payload["statusCode"], 422);
    assert_eq!(normalized.payload["body"], json!({ "detail": "prompt is required" }));
}

#[tokio::test]
async fn blank_model_id_fails_before_any_request() {
    let server = MockServer::start().await;
    let (client, _clock) = test_client_with_clock(&server.uri(), &server.uri());

    let err = client
        .queue()
        .run(&ModelId::new("  "), json!({}), PollOptions::default())
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Validation(_)));
    assert!(server.received_requests().await.unwrap().is_empty());
}

#[tokio::test]
async fn job_status_callback_sees_every_poll() {
    let server = MockServer::start().await;
    let seen = Arc::new(std::sync::Mutex::new(Vec::new()));
    let sink = seen.clone();
    let clock: Arc<dyn fal_node::Clock> = Arc::new(ManualClock::new());
    let client = Client::new(Config {
        api_key: Some("fal_test_key".into()),
        api_base_url: Some(server.uri()),
        queue_base_url: Some(server.uri()),
        clock: Some(clock.clone()),
        schema_cache: Some(Arc::new(SchemaCache::new(clock))),
        metrics: Some(MetricsCallbacks {
            job_status: Some(Arc::new(move |m: JobStatusMetrics| {
                sink.lock().unwrap().push((m.poll, m.status.to_string()));
            })),
            ..Default::default()
        }),
        ..Default::default()
    })
    .expect("client");

    mount_submit(&server, "/fal-ai/flux/dev", "req-8").await;
    Mock::given(method("GET"))
        .and(path("/fal-ai/flux/requests/req-8/status"))
        .respond_with(SequenceResponder::new(vec![
            status("IN_QUEUE"),
            status("COMPLETED"),
        ]))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/fal-ai/flux/requests/req-8"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "ok": true })))
        .mount(&server)
        .await;

    client
        .queue()
        .run(&ModelId::new("fal-ai/flux/dev"), json!({}), PollOptions::default())
        .await
        .expect("job should complete");

    assert_eq!(
        *seen.lock().unwrap(),
        vec![(1, "IN_QUEUE".to_string()), (2, "COMPLETED".to_string())]
    );
}
