//! Snapshot delivery
//!
//! Periodic snapshots go out as ordinary async POSTs. Terminal snapshots go
//! through the host's beacon primitive and fall back to a detached POST that
//! nobody waits on. Failures are logged and swallowed; nothing is retried.

use reqwest::{Client, RequestBuilder};
use tokio::runtime::Handle;

use crate::config::LizzConfig;
use crate::error::LizzError;
use crate::host::Beacon;
use crate::logging::DebugLog;
use crate::types::SnapshotPayload;
use crate::{lizz_error, lizz_info, lizz_warn};

/// Header identifying the site on every request
pub const SITE_ID_HEADER: &str = "X-Lizz-Site-ID";

/// HTTP delivery to the configured collector
pub struct Transport {
    client: Client,
    endpoint: String,
    site_id: String,
    demo: bool,
    log: DebugLog,
    runtime: Handle,
}

impl Transport {
    pub fn new(config: &LizzConfig, runtime: Handle) -> Result<Self, LizzError> {
        let client = Client::builder()
            .build()
            .map_err(|e| LizzError::TransportError(e.to_string()))?;

        Ok(Self {
            client,
            endpoint: config.endpoint().to_string(),
            site_id: config.site_id.clone(),
            demo: config.is_demo_mode(),
            log: DebugLog::new(config.debug),
            runtime,
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    pub fn is_demo_mode(&self) -> bool {
        self.demo
    }

    /// Ordinary delivery; true only on a 2xx response
    pub async fn send_snapshot(&self, payload: &SnapshotPayload) -> bool {
        if self.demo {
            lizz_info!(
                self.log,
                "Demo mode: skipping network request ({} sections)",
                payload.sections.len()
            );
            return true;
        }

        let Some(body) = self.encode(payload) else {
            return false;
        };

        match self.post(body).send().await {
            Ok(response) if response.status().is_success() => {
                lizz_info!(self.log, "Snapshot sent successfully");
                true
            }
            Ok(response) => {
                lizz_error!(self.log, "Failed to send snapshot: {}", response.status());
                false
            }
            Err(err) => {
                lizz_error!(self.log, "Network error sending snapshot: {err}");
                false
            }
        }
    }

    /// Unload-safe delivery.
    ///
    /// Uses `beacon` when present and falls back to a detached POST when it is
    /// missing, refuses the request, or fails.
    pub fn send_beacon(&self, payload: &SnapshotPayload, beacon: Option<&dyn Beacon>) -> bool {
        if self.demo {
            lizz_info!(self.log, "Demo mode: skipping beacon request");
            return true;
        }

        let Some(data) = self.encode(payload) else {
            return false;
        };

        let Some(beacon) = beacon else {
            return self.send_beacon_fallback(data);
        };

        match beacon.send_beacon(&self.endpoint, &data) {
            Ok(true) => {
                lizz_info!(self.log, "Beacon sent successfully");
                true
            }
            Ok(false) => {
                lizz_warn!(self.log, "Beacon failed, trying fetch fallback");
                self.send_beacon_fallback(data)
            }
            Err(err) => {
                lizz_error!(self.log, "sendBeacon error: {err}");
                self.send_beacon_fallback(data)
            }
        }
    }

    fn send_beacon_fallback(&self, data: String) -> bool {
        let request = self.post(data);
        let log = self.log;

        self.runtime.spawn(async move {
            match request.send().await {
                Ok(response) if !response.status().is_success() => {
                    lizz_error!(log, "Beacon fallback error: {}", response.status());
                }
                Ok(_) => {}
                Err(err) => {
                    lizz_error!(log, "Beacon fallback error: {err}");
                }
            }
        });

        lizz_info!(self.log, "Beacon fallback sent");
        true
    }

    /// GET the collector's health route
    pub async fn test_connection(&self) -> bool {
        if self.demo {
            lizz_info!(self.log, "Demo mode: connection test skipped");
            return true;
        }

        let result = self
            .client
            .get(self.health_url())
            .header(SITE_ID_HEADER, &self.site_id)
            .send()
            .await;

        match result {
            Ok(response) => {
                let ok = response.status().is_success();
                lizz_info!(self.log, "Connection test: {}", if ok { "OK" } else { "Failed" });
                ok
            }
            Err(err) => {
                lizz_error!(self.log, "Connection test failed: {err}");
                false
            }
        }
    }

    pub fn health_url(&self) -> String {
        self.endpoint.replacen("/attention", "/health", 1)
    }

    fn post(&self, body: String) -> RequestBuilder {
        self.client
            .post(&self.endpoint)
            .header(reqwest::header::CONTENT_TYPE, "application/json")
            .header(SITE_ID_HEADER, &self.site_id)
            .body(body)
    }

    fn encode(&self, payload: &SnapshotPayload) -> Option<String> {
        match serde_json::to_string(payload) {
            Ok(body) => Some(body),
            Err(err) => {
                lizz_error!(self.log, "Failed to encode snapshot: {err}");
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{
        spawn_collector, BeaconOutcome, CapturedRequest, FakeBeacon, CLOSED_ENDPOINT,
        DEMO_ENDPOINT,
    };
    use crate::types::SectionSnapshot;
    use pretty_assertions::assert_eq;
    use std::time::Duration;
    use tokio::sync::mpsc::UnboundedReceiver;

    fn payload() -> SnapshotPayload {
        SnapshotPayload {
            sdk_version: crate::SDK_VERSION.to_string(),
            site_id: "site".to_string(),
            page_id: "/".to_string(),
            timestamp: 0,
            session_id: "sess".to_string(),
            sections: vec![SectionSnapshot {
                section_id: "hero".to_string(),
                sat_seconds: 2.0,
                completion_rate: 0.5,
                attention_score: 26,
                visibility_avg: 0.5,
            }],
        }
    }

    fn transport(endpoint: &str) -> Transport {
        let config = LizzConfig::new("site").with_endpoint(endpoint);
        Transport::new(&config, Handle::current()).unwrap()
    }

    async fn next_request(requests: &mut UnboundedReceiver<CapturedRequest>) -> CapturedRequest {
        tokio::time::timeout(Duration::from_secs(5), requests.recv())
            .await
            .expect("collector received nothing")
            .expect("collector channel closed")
    }

    fn assert_snapshot_request(request: &CapturedRequest) {
        assert_eq!(request.method, "POST");
        assert_eq!(request.path, "/v1/attention");
        assert_eq!(request.header("x-lizz-site-id"), Some("site"));
        assert_eq!(request.header("content-type"), Some("application/json"));
        let sent: SnapshotPayload = serde_json::from_str(&request.body).unwrap();
        assert_eq!(sent, payload());
    }

    #[tokio::test]
    async fn test_demo_mode_short_circuits_every_path() {
        let transport = transport(DEMO_ENDPOINT);
        let beacon = FakeBeacon::new(BeaconOutcome::Throw);

        assert!(transport.is_demo_mode());
        assert!(transport.send_snapshot(&payload()).await);
        assert!(transport.send_beacon(&payload(), Some(&beacon)));
        assert!(transport.test_connection().await);
        assert_eq!(beacon.call_count(), 0);
    }

    #[tokio::test]
    async fn test_beacon_success_skips_fallback() {
        let transport = transport(CLOSED_ENDPOINT);
        let beacon = FakeBeacon::new(BeaconOutcome::Accept);

        assert!(transport.send_beacon(&payload(), Some(&beacon)));

        let calls = beacon.calls.lock().unwrap();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].0, CLOSED_ENDPOINT);
        let sent: SnapshotPayload = serde_json::from_str(&calls[0].1).unwrap();
        assert_eq!(sent, payload());
    }

    #[tokio::test]
    async fn test_rejected_beacon_falls_back() {
        let transport = transport(CLOSED_ENDPOINT);
        let beacon = FakeBeacon::new(BeaconOutcome::Reject);

        assert!(transport.send_beacon(&payload(), Some(&beacon)));
        assert_eq!(beacon.call_count(), 1);
    }

    #[tokio::test]
    async fn test_throwing_beacon_falls_back() {
        let transport = transport(CLOSED_ENDPOINT);
        let beacon = FakeBeacon::new(BeaconOutcome::Throw);

        assert!(transport.send_beacon(&payload(), Some(&beacon)));
        assert_eq!(beacon.call_count(), 1);
    }

    #[tokio::test]
    async fn test_missing_beacon_uses_fallback() {
        let transport = transport(CLOSED_ENDPOINT);
        assert!(transport.send_beacon(&payload(), None));
    }

    #[tokio::test]
    async fn test_network_failure_reports_false() {
        let transport = transport(CLOSED_ENDPOINT);
        assert!(!transport.send_snapshot(&payload()).await);
        assert!(!transport.test_connection().await);
    }

    #[tokio::test]
    async fn test_health_url() {
        let transport = transport("https://api.lizz.io/v1/attention");
        assert_eq!(transport.health_url(), "https://api.lizz.io/v1/health");
    }

    #[tokio::test]
    async fn test_default_endpoint() {
        let transport = Transport::new(&LizzConfig::new("site"), Handle::current()).unwrap();
        assert_eq!(transport.endpoint(), crate::config::DEFAULT_ENDPOINT);
        assert!(!transport.is_demo_mode());
    }

    #[tokio::test]
    async fn test_snapshot_post_delivered_with_site_header() {
        let (endpoint, mut requests) = spawn_collector(200).await;
        let transport = transport(&endpoint);

        assert!(transport.send_snapshot(&payload()).await);
        assert_snapshot_request(&next_request(&mut requests).await);
    }

    #[tokio::test]
    async fn test_non_success_status_reports_false() {
        let (endpoint, mut requests) = spawn_collector(500).await;
        let transport = transport(&endpoint);

        assert!(!transport.send_snapshot(&payload()).await);
        assert_snapshot_request(&next_request(&mut requests).await);
    }

    #[tokio::test]
    async fn test_fallback_without_beacon_posts_payload() {
        let (endpoint, mut requests) = spawn_collector(200).await;
        let transport = transport(&endpoint);

        assert!(transport.send_beacon(&payload(), None));
        assert_snapshot_request(&next_request(&mut requests).await);
    }

    #[tokio::test]
    async fn test_rejected_and_throwing_beacons_post_payload() {
        let (endpoint, mut requests) = spawn_collector(200).await;
        let transport = transport(&endpoint);

        for outcome in [BeaconOutcome::Reject, BeaconOutcome::Throw] {
            let beacon = FakeBeacon::new(outcome);
            assert!(transport.send_beacon(&payload(), Some(&beacon)));
            assert_eq!(beacon.call_count(), 1);
            assert_snapshot_request(&next_request(&mut requests).await);
        }
    }

    #[tokio::test]
    async fn test_accepted_beacon_sends_no_post() {
        let (endpoint, mut requests) = spawn_collector(200).await;
        let transport = transport(&endpoint);
        let beacon = FakeBeacon::new(BeaconOutcome::Accept);

        assert!(transport.send_beacon(&payload(), Some(&beacon)));
        let waited = tokio::time::timeout(Duration::from_millis(200), requests.recv()).await;
        assert!(waited.is_err());
    }

    #[tokio::test]
    async fn test_connection_check_hits_health_route() {
        let (endpoint, mut requests) = spawn_collector(200).await;
        let transport = transport(&endpoint);

        assert!(transport.test_connection().await);
        let request = next_request(&mut requests).await;
        assert_eq!(request.method, "GET");
        assert_eq!(request.path, "/v1/health");
        assert_eq!(request.header("x-lizz-site-id"), Some("site"));
    }
}
