use std::time::Instant;

use chrono::Utc;

use super::failure_reason;
use super::prelude::*;

/// Issues exactly one GET against `url` and captures what happened.
///
/// Transport errors (refused connections, timeouts, DNS or TLS failures,
/// malformed URLs) are folded into [`ProbeOutcome::Failure`]; this never
/// returns an error. Elapsed time is measured until the response head
/// arrives. Timeouts and TLS policy come from `client`.
pub async fn probe_url(client: &reqwest::Client, url: &str) -> NewProbeResult {
    let timestamp = Utc::now();
    let start = Instant::now();
    let status_result = client.get(url).send().await;
    let elapsed = start.elapsed();

    let outcome = match status_result {
        Ok(resp) => ProbeOutcome::Response {
            status_code: resp.status().as_u16(),
            elapsed,
        },
        Err(e) => ProbeOutcome::Failure {
            reason: failure_reason(&e),
        },
    };

    NewProbeResult {
        timestamp: Some(timestamp),
        endpoint: url.to_string(),
        outcome,
    }
}
