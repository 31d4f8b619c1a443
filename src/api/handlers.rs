//! Request routing for the monitor API.

use bytes::Bytes;
use http_body_util::Full;
use hyper::header::{CONTENT_TYPE, HeaderValue};
use hyper::{Method, Request, Response, StatusCode};
use serde::Serialize;
use serde_json::json;

use crate::monitor::Monitor;

pub type ApiResponse = Response<Full<Bytes>>;

/// Largest window `/metrics` will return, and its default.
pub const MAX_RECENT_WINDOW: usize = 100;

const LIVENESS_MESSAGE: &str = "API Performance Monitor Running";
const TRIGGER_MESSAGE: &str = "Manual check executed";

/// Route an incoming request to the appropriate handler.
///
/// The request body is never read, so any body type is accepted.
pub async fn route<B>(req: Request<B>, monitor: &Monitor) -> ApiResponse {
    let path = req.uri().path();
    if !matches!(path, "/" | "/run-check" | "/metrics") {
        return error(StatusCode::NOT_FOUND, "not found");
    }
    if req.method() != Method::GET {
        return error(StatusCode::METHOD_NOT_ALLOWED, "method not allowed");
    }

    match path {
        "/run-check" => handle_run_check(monitor).await,
        "/metrics" => handle_metrics(monitor, req.uri().query()).await,
        _ => json_response(StatusCode::OK, &json!({ "message": LIVENESS_MESSAGE })),
    }
}

/// The check runs on its own task: a caller hanging up drops only the
/// response, and the probe is still recorded.
async fn handle_run_check(monitor: &Monitor) -> ApiResponse {
    let monitor = monitor.clone();
    match tokio::spawn(async move { monitor.check().await }).await {
        Ok(Ok(result)) => json_response(
            StatusCode::OK,
            &json!({
                "status": "ok",
                "message": TRIGGER_MESSAGE,
                "result": result,
            }),
        ),
        Ok(Err(e)) => {
            tracing::error!("Manual check could not be recorded: {e}");
            error(StatusCode::INTERNAL_SERVER_ERROR, &e.to_string())
        }
        Err(e) => {
            tracing::error!("Manual check task failed: {e}");
            error(StatusCode::INTERNAL_SERVER_ERROR, "manual check failed")
        }
    }
}

async fn handle_metrics(monitor: &Monitor, query: Option<&str>) -> ApiResponse {
    let limit = match parse_limit(query) {
        Ok(limit) => limit,
        Err(message) => return error(StatusCode::BAD_REQUEST, &message),
    };

    match monitor.store().recent(limit).await {
        Ok(rows) => json_response(StatusCode::OK, &rows),
        Err(e) => {
            tracing::error!("Failed to list probe results: {e}");
            error(StatusCode::INTERNAL_SERVER_ERROR, &e.to_string())
        }
    }
}

/// Reads `limit` from the query string. Absent means the full window.
fn parse_limit(query: Option<&str>) -> Result<usize, String> {
    let raw = query.and_then(|q| {
        url::form_urlencoded::parse(q.as_bytes())
            .find(|(key, _)| key == "limit")
            .map(|(_, value)| value.into_owned())
    });

    let Some(raw) = raw else {
        return Ok(MAX_RECENT_WINDOW);
    };
    match raw.trim().parse::<usize>() {
        Ok(n) if (1..=MAX_RECENT_WINDOW).contains(&n) => Ok(n),
        _ => Err(format!(
            "limit must be an integer between 1 and {MAX_RECENT_WINDOW}, got {raw:?}"
        )),
    }
}

fn json_response<T: Serialize + ?Sized>(status: StatusCode, body: &T) -> ApiResponse {
    match serde_json::to_vec(body) {
        Ok(bytes) => with_status(status, Bytes::from(bytes)),
        Err(e) => {
            tracing::error!("Failed to serialise response: {e}");
            with_status(
                StatusCode::INTERNAL_SERVER_ERROR,
                Bytes::from_static(br#"{"status":"error","message":"serialization failed"}"#),
            )
        }
    }
}

fn error(status: StatusCode, message: &str) -> ApiResponse {
    json_response(status, &json!({ "status": "error", "message": message }))
}

fn with_status(status: StatusCode, body: Bytes) -> ApiResponse {
    let mut resp = Response::new(Full::new(body));
    *resp.status_mut() = status;
    resp.headers_mut()
        .insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
    resp
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;
    use std::time::Duration;

    use chrono::{TimeZone, Utc};
    use http_body_util::BodyExt;
    use serde_json::Value;

    use super::*;
    use crate::http_probe::prelude::*;
    use crate::scheduler::Scheduler;
    use crate::store::MetricsStore;
    use crate::test_support::{refused_url, spawn_target, test_client};

    fn get(uri: &str) -> Request<()> {
        Request::builder()
            .method(Method::GET)
            .uri(uri)
            .body(())
            .expect("request")
    }

    async fn body_json(resp: ApiResponse) -> Value {
        let bytes = resp.into_body().collect().await.expect("body").to_bytes();
        serde_json::from_slice(&bytes).expect("json body")
    }

    fn monitor_for(url: &str) -> (Monitor, MetricsStore) {
        let store = MetricsStore::open_memory().expect("open memory db");
        (Monitor::new(test_client(), url, store.clone()), store)
    }

    fn stamped(secs: i64) -> NewProbeResult {
        NewProbeResult {
            timestamp: Some(Utc.timestamp_opt(1_700_000_000 + secs, 0).unwrap()),
            endpoint: "https://example.com/api".to_string(),
            outcome: ProbeOutcome::Response {
                status_code: 200,
                elapsed: Duration::from_millis(10),
            },
        }
    }

    #[tokio::test]
    async fn test_liveness_touches_nothing() {
        let (monitor, store) = monitor_for("http://127.0.0.1:1/");
        let resp = route(get("/"), &monitor).await;

        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(
            resp.headers().get(CONTENT_TYPE).unwrap(),
            "application/json"
        );
        assert_eq!(
            body_json(resp).await,
            json!({ "message": "API Performance Monitor Running" })
        );
        assert!(store.recent(10).await.expect("recent").is_empty());
    }

    #[tokio::test]
    async fn test_run_check_records_and_acknowledges() {
        let url = spawn_target(200, Duration::from_millis(50)).await;
        let (monitor, store) = monitor_for(&url);

        let resp = route(get("/run-check"), &monitor).await;
        assert_eq!(resp.status(), StatusCode::OK);

        let body = body_json(resp).await;
        assert_eq!(body["status"], "ok");
        assert_eq!(body["message"], "Manual check executed");
        assert_eq!(body["result"]["status_code"], 200);
        assert!(body["result"]["error_message"].is_null());
        let elapsed = body["result"]["response_time"].as_f64().expect("response time");
        assert!(elapsed >= 50.0);

        let rows = store.recent(10).await.expect("recent");
        assert_eq!(rows.len(), 1);
        assert_eq!(body["result"]["id"], rows[0].id);
    }

    #[tokio::test]
    async fn test_run_check_against_dead_target_is_still_ok() {
        let url = refused_url().await;
        let (monitor, _store) = monitor_for(&url);

        let resp = route(get("/run-check"), &monitor).await;
        assert_eq!(resp.status(), StatusCode::OK);

        let body = body_json(resp).await;
        assert_eq!(body["status"], "ok");
        assert_eq!(body["result"]["status_code"], 0);
        assert!(body["result"]["response_time"].is_null());
        assert!(!body["result"]["error_message"].as_str().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_run_check_storage_failure_is_a_server_error() {
        let url = spawn_target(200, Duration::ZERO).await;
        let (monitor, store) = monitor_for(&url);
        store.execute_raw("DROP TABLE api_metrics").await;

        let resp = route(get("/run-check"), &monitor).await;
        assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let body = body_json(resp).await;
        assert_eq!(body["status"], "error");

        let resp = route(get("/metrics"), &monitor).await;
        assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[tokio::test]
    async fn test_metrics_returns_newest_hundred() {
        let (monitor, store) = monitor_for("http://127.0.0.1:1/");
        for i in 0..150 {
            store.append(stamped(i)).await.expect("append");
        }

        let resp = route(get("/metrics"), &monitor).await;
        assert_eq!(resp.status(), StatusCode::OK);

        let body = body_json(resp).await;
        let rows = body.as_array().expect("array");
        assert_eq!(rows.len(), 100);
        assert_eq!(rows[0]["id"], 150);
        assert_eq!(rows[99]["id"], 51);

        let stamps: Vec<&str> = rows
            .iter()
            .map(|r| r["timestamp"].as_str().expect("timestamp"))
            .collect();
        let mut sorted = stamps.clone();
        sorted.sort_unstable_by(|a, b| b.cmp(a));
        assert_eq!(stamps, sorted);

        for key in ["id", "timestamp", "endpoint", "response_time", "status_code", "error_message"] {
            assert!(rows[0].get(key).is_some(), "missing {key}");
        }
    }

    #[tokio::test]
    async fn test_metrics_on_empty_store_is_empty_array() {
        let (monitor, _store) = monitor_for("http://127.0.0.1:1/");
        let resp = route(get("/metrics"), &monitor).await;
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(body_json(resp).await, json!([]));
    }

    #[tokio::test]
    async fn test_metrics_limit_query() {
        let (monitor, store) = monitor_for("http://127.0.0.1:1/");
        for i in 0..20 {
            store.append(stamped(i)).await.expect("append");
        }

        let resp = route(get("/metrics?limit=5"), &monitor).await;
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(body_json(resp).await.as_array().unwrap().len(), 5);

        for bad in ["0", "-1", "101", "ten", ""] {
            let resp = route(get(&format!("/metrics?limit={bad}")), &monitor).await;
            assert_eq!(resp.status(), StatusCode::BAD_REQUEST, "limit={bad}");
            assert_eq!(body_json(resp).await["status"], "error");
        }
    }

    #[tokio::test]
    async fn test_unknown_path_and_wrong_method() {
        let (monitor, _store) = monitor_for("http://127.0.0.1:1/");

        let resp = route(get("/nope"), &monitor).await;
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);

        let post = Request::builder()
            .method(Method::POST)
            .uri("/run-check")
            .body(())
            .expect("request");
        let resp = route(post, &monitor).await;
        assert_eq!(resp.status(), StatusCode::METHOD_NOT_ALLOWED);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_trigger_during_scheduled_probe_keeps_both_rows() {
        let url = spawn_target(200, Duration::from_millis(300)).await;
        let (monitor, store) = monitor_for(&url);

        let handle = Scheduler::new(monitor.clone(), Duration::from_secs(3600)).start();
        // Let the scheduled probe get in flight.
        tokio::time::sleep(Duration::from_millis(50)).await;

        let triggers: Vec<_> = (0..3)
            .map(|_| {
                let monitor = monitor.clone();
                tokio::spawn(async move { route(get("/run-check"), &monitor).await.status() })
            })
            .collect();
        for trigger in triggers {
            assert_eq!(trigger.await.expect("trigger task"), StatusCode::OK);
        }
        handle.stop().await;

        let rows = store.recent(100).await.expect("recent");
        assert_eq!(rows.len(), 4);
        let ids: HashSet<i64> = rows.iter().map(|r| r.id).collect();
        assert_eq!(ids.len(), 4);
        assert!(rows.iter().all(|r| r.status_code == 200));
    }

    #[test]
    fn test_parse_limit_defaults_to_window() {
        assert_eq!(parse_limit(None), Ok(MAX_RECENT_WINDOW));
        assert_eq!(parse_limit(Some("other=1")), Ok(MAX_RECENT_WINDOW));
        assert_eq!(parse_limit(Some("limit=100")), Ok(100));
        assert_eq!(parse_limit(Some("limit=1&limit=7")), Ok(1));
    }
}
