//! Scriptable host doubles for unit tests

use std::collections::{BTreeSet, HashMap};
use std::sync::{Arc, Mutex};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;

use crate::config::{DEFAULT_SECTIONS_SELECTOR, SECTION_ATTRIBUTE};
use crate::error::BeaconError;
use crate::host::{
    Beacon, Element, ElementHandle, IntersectionEntry, IntersectionObserver, Platform, Rect,
    VisibilityState,
};
use crate::state::lock;

pub(crate) const DEMO_ENDPOINT: &str = "demo://test";

/// Endpoint on a port nothing listens on
pub(crate) const CLOSED_ENDPOINT: &str = "http://127.0.0.1:1/v1/attention";

#[derive(Debug, Default)]
pub(crate) struct ObserverLog {
    pub created: usize,
    pub thresholds: Vec<f64>,
    pub observed: BTreeSet<ElementHandle>,
    pub disconnected: bool,
}

pub(crate) struct FakeObserver {
    log: Arc<Mutex<ObserverLog>>,
}

impl IntersectionObserver for FakeObserver {
    fn observe(&mut self, target: ElementHandle) {
        lock(&self.log).observed.insert(target);
    }

    fn unobserve(&mut self, target: ElementHandle) {
        lock(&self.log).observed.remove(&target);
    }

    fn disconnect(&mut self) {
        let mut log = lock(&self.log);
        log.observed.clear();
        log.disconnected = true;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum BeaconOutcome {
    Accept,
    Reject,
    Throw,
}

pub(crate) struct FakeBeacon {
    outcome: BeaconOutcome,
    pub calls: Mutex<Vec<(String, String)>>,
}

impl FakeBeacon {
    pub fn new(outcome: BeaconOutcome) -> Self {
        Self {
            outcome,
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn call_count(&self) -> usize {
        lock(&self.calls).len()
    }
}

impl Beacon for FakeBeacon {
    fn send_beacon(&self, url: &str, data: &str) -> Result<bool, BeaconError> {
        lock(&self.calls).push((url.to_string(), data.to_string()));
        match self.outcome {
            BeaconOutcome::Accept => Ok(true),
            BeaconOutcome::Reject => Ok(false),
            BeaconOutcome::Throw => Err(BeaconError("quota exceeded".to_string())),
        }
    }
}

pub(crate) struct FakePlatform {
    elements: Mutex<HashMap<String, Vec<Element>>>,
    pathname: String,
    visibility: Mutex<Option<VisibilityState>>,
    intersection_supported: bool,
    pub observer_log: Arc<Mutex<ObserverLog>>,
    pub beacon: Option<FakeBeacon>,
}

impl FakePlatform {
    pub fn new() -> Self {
        Self {
            elements: Mutex::new(HashMap::new()),
            pathname: "/home".to_string(),
            visibility: Mutex::new(Some(VisibilityState::Visible)),
            intersection_supported: true,
            observer_log: Arc::new(Mutex::new(ObserverLog::default())),
            beacon: None,
        }
    }

    /// Platform exposing `count` sections under the default selector
    pub fn with_sections(count: u64) -> Self {
        let platform = Self::new();
        let elements = (0..count)
            .map(|i| section_element(i + 1, &format!("section-{}", i + 1)))
            .collect();
        platform.set_elements(DEFAULT_SECTIONS_SELECTOR, elements);
        platform
    }

    pub fn without_intersection_observer(mut self) -> Self {
        self.intersection_supported = false;
        self
    }

    pub fn without_visibility_state(self) -> Self {
        *lock(&self.visibility) = None;
        self
    }

    pub fn with_beacon(mut self, outcome: BeaconOutcome) -> Self {
        self.beacon = Some(FakeBeacon::new(outcome));
        self
    }

    pub fn set_elements(&self, selector: &str, elements: Vec<Element>) {
        lock(&self.elements).insert(selector.to_string(), elements);
    }

    pub fn set_visibility(&self, state: VisibilityState) {
        *lock(&self.visibility) = Some(state);
    }

    pub fn observed(&self) -> BTreeSet<ElementHandle> {
        lock(&self.observer_log).observed.clone()
    }

    pub fn beacon_calls(&self) -> usize {
        self.beacon.as_ref().map_or(0, FakeBeacon::call_count)
    }
}

impl Platform for FakePlatform {
    fn query_selector_all(&self, selector: &str) -> Vec<Element> {
        lock(&self.elements)
            .get(selector)
            .cloned()
            .unwrap_or_default()
    }

    fn location_pathname(&self) -> String {
        self.pathname.clone()
    }

    fn visibility_state(&self) -> Option<VisibilityState> {
        *lock(&self.visibility)
    }

    fn create_intersection_observer(
        &self,
        thresholds: &[f64],
    ) -> Option<Box<dyn IntersectionObserver>> {
        if !self.intersection_supported {
            return None;
        }
        {
            let mut log = lock(&self.observer_log);
            log.created += 1;
            log.thresholds = thresholds.to_vec();
            log.disconnected = false;
        }
        Some(Box::new(FakeObserver {
            log: Arc::clone(&self.observer_log),
        }))
    }

    fn beacon(&self) -> Option<&dyn Beacon> {
        self.beacon.as_ref().map(|b| b as &dyn Beacon)
    }
}

pub(crate) fn section_element(handle: u64, section_id: &str) -> Element {
    Element::new(handle, "section").with_attribute(SECTION_ATTRIBUTE, section_id)
}

/// Entry for an element 200px tall whose top `visible_px` pixels are on screen
pub(crate) fn entry(handle: u64, ratio: f64, visible_px: f64) -> IntersectionEntry {
    let viewport = Rect::new(0.0, 800.0);
    let top = 800.0 - visible_px;
    IntersectionEntry {
        target: ElementHandle(handle),
        intersection_ratio: ratio,
        bounding_client_rect: Rect::new(top, top + 200.0),
        root_bounds: Some(viewport),
    }
}

/// One HTTP request as seen by [`spawn_collector`]
#[derive(Debug, Clone)]
pub(crate) struct CapturedRequest {
    pub method: String,
    pub path: String,
    /// Header names lowercased
    pub headers: HashMap<String, String>,
    pub body: String,
}

impl CapturedRequest {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).map(String::as_str)
    }
}

/// Loopback collector answering every request with `status`.
///
/// Returns the `/v1/attention` endpoint URL and a channel of received requests.
pub(crate) async fn spawn_collector(
    status: u16,
) -> (String, mpsc::UnboundedReceiver<CapturedRequest>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let (tx, rx) = mpsc::unbounded_channel();

    tokio::spawn(async move {
        while let Ok((mut socket, _)) = listener.accept().await {
            let tx = tx.clone();
            tokio::spawn(async move {
                if let Some(request) = read_request(&mut socket).await {
                    let _ = tx.send(request);
                }
                let response = format!(
                    "HTTP/1.1 {status} Collector\r\ncontent-length: 0\r\nconnection: close\r\n\r\n"
                );
                let _ = socket.write_all(response.as_bytes()).await;
                let _ = socket.shutdown().await;
            });
        }
    });

    (format!("http://{addr}/v1/attention"), rx)
}

async fn read_request(socket: &mut TcpStream) -> Option<CapturedRequest> {
    let mut buffer = Vec::new();
    let mut chunk = [0u8; 4096];

    let header_end = loop {
        if let Some(pos) = buffer.windows(4).position(|w| w == b"\r\n\r\n") {
            break pos;
        }
        let read = socket.read(&mut chunk).await.ok()?;
        if read == 0 {
            return None;
        }
        buffer.extend_from_slice(&chunk[..read]);
    };

    let head = String::from_utf8_lossy(&buffer[..header_end]).to_string();
    let mut lines = head.split("\r\n");
    let mut request_line = lines.next()?.split_whitespace();
    let method = request_line.next()?.to_string();
    let path = request_line.next()?.to_string();
    let headers: HashMap<String, String> = lines
        .filter_map(|line| line.split_once(':'))
        .map(|(name, value)| (name.trim().to_ascii_lowercase(), value.trim().to_string()))
        .collect();

    let length = headers
        .get("content-length")
        .and_then(|v| v.parse::<usize>().ok())
        .unwrap_or(0);
    let mut body = buffer[header_end + 4..].to_vec();
    while body.len() < length {
        let read = socket.read(&mut chunk).await.ok()?;
        if read == 0 {
            break;
        }
        body.extend_from_slice(&chunk[..read]);
    }

    Some(CapturedRequest {
        method,
        path,
        headers,
        body: String::from_utf8_lossy(&body).to_string(),
    })
}
