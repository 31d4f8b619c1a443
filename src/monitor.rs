use std::sync::Arc;

use reqwest::Client;

use crate::http_probe::prelude::*;
use crate::store::{MetricsStore, StoreResult};

/// One monitored target wired to its client and history.
///
/// Cheap to clone; the scheduler and every API request hold their own copy.
#[derive(Debug, Clone)]
pub struct Monitor {
    client: Client,
    target: Arc<str>,
    store: MetricsStore,
}

impl Monitor {
    pub fn new(client: Client, target: impl Into<Arc<str>>, store: MetricsStore) -> Self {
        Monitor {
            client,
            target: target.into(),
            store,
        }
    }

    pub fn target(&self) -> &str {
        &self.target
    }

    pub fn store(&self) -> &MetricsStore {
        &self.store
    }

    /// Probes the target once and records the outcome.
    ///
    /// A failed probe is a successful check: only storage errors are returned.
    pub async fn check(&self) -> StoreResult<ProbeResult> {
        let probe = probe_url(&self.client, &self.target).await;
        log_outcome(&probe);
        self.store.append(probe).await
    }
}

fn log_outcome(probe: &NewProbeResult) {
    let url = &probe.endpoint;
    match &probe.outcome {
        ProbeOutcome::Response { status_code, .. } if *status_code < 400 => {
            tracing::info!(
                "✅ URL: {}, Status: {}, Elapsed: {:.2}ms",
                url,
                status_code,
                probe.outcome.response_time_ms().unwrap_or_default()
            );
        }
        ProbeOutcome::Response { status_code, .. } => {
            tracing::warn!(
                "❌ Unexpected status for {url}: {status_code}, Elapsed: {:.2}ms",
                probe.outcome.response_time_ms().unwrap_or_default()
            );
        }
        ProbeOutcome::Failure { reason } => {
            tracing::warn!("❌ Probe error for {url}: {reason}");
        }
    }
}
