//! Shared fixtures: in-memory fakes of the agent's seams and a tiny HTTP
//! server that records what it receives.
#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use nodewatch::error::ReportError;
use nodewatch::location::{Geolocator, Location};
use nodewatch::probe::{Prober, Reachability};
use nodewatch::reporting::{Coordinator, Heartbeat, TestReport};
use nodewatch::timeout::bounded;
use nodewatch::{Node, ProbeOutcome, UptimeSnapshot};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

/// Coordinator double with scripted answers
#[derive(Default)]
pub struct FakeCoordinator {
    pub node_list: Mutex<Option<Result<Vec<Node>, ReportError>>>,
    pub reports: Mutex<Vec<TestReport>>,
    pub heartbeats: Mutex<Vec<Heartbeat>>,
    pub reject_reports_for: Mutex<HashSet<String>>,
    /// Heartbeat calls to fail before one succeeds
    pub heartbeat_failures: AtomicUsize,
    pub heartbeat_calls: AtomicUsize,
    pub report_calls: AtomicUsize,
    pub points: Mutex<Option<Result<f64, ReportError>>>,
    pub without_credential: bool,
    /// Node list calls to fail before the scripted answer is returned
    pub node_list_failures: AtomicUsize,
    pub node_list_calls: AtomicUsize,
    pub points_failures: AtomicUsize,
    pub points_calls: AtomicUsize,
}

impl FakeCoordinator {
    pub fn with_nodes(nodes: Vec<Node>) -> Arc<Self> {
        let fake = Self::default();
        *fake.node_list.lock().unwrap() = Some(Ok(nodes));
        Arc::new(fake)
    }

    pub fn failing_node_list(error: ReportError) -> Arc<Self> {
        let fake = Self::default();
        *fake.node_list.lock().unwrap() = Some(Err(error));
        Arc::new(fake)
    }

    pub fn reports(&self) -> Vec<TestReport> {
        self.reports.lock().unwrap().clone()
    }

    pub fn report_for(&self, node_id: &str) -> Option<TestReport> {
        self.reports().into_iter().find(|report| report.node_id == node_id)
    }
}

#[async_trait]
impl Coordinator for FakeCoordinator {
    async fn fetch_nodes(&self) -> Result<Vec<Node>, ReportError> {
        self.node_list_calls.fetch_add(1, Ordering::SeqCst);
        if take_failure(&self.node_list_failures) {
            return Err(ReportError::Status(503));
        }
        self.node_list.lock().unwrap().clone().unwrap_or_else(|| Ok(Vec::new()))
    }

    async fn submit_test_result(
        &self,
        outcome: &ProbeOutcome,
        uptime: UptimeSnapshot,
    ) -> Result<(), ReportError> {
        if self.without_credential {
            return Err(ReportError::NoCredential);
        }
        self.report_calls.fetch_add(1, Ordering::SeqCst);
        if self.reject_reports_for.lock().unwrap().contains(&outcome.node_id) {
            return Err(ReportError::Status(500));
        }
        self.reports.lock().unwrap().push(TestReport::new(outcome, uptime));
        Ok(())
    }

    async fn submit_heartbeat(&self, heartbeat: &Heartbeat) -> Result<(), ReportError> {
        if self.without_credential {
            return Err(ReportError::NoCredential);
        }
        self.heartbeat_calls.fetch_add(1, Ordering::SeqCst);
        let remaining = self.heartbeat_failures.load(Ordering::SeqCst);
        if remaining > 0 {
            self.heartbeat_failures.store(remaining - 1, Ordering::SeqCst);
            return Err(ReportError::Transport("connection reset".into()));
        }
        self.heartbeats.lock().unwrap().push(heartbeat.clone());
        Ok(())
    }

    async fn fetch_points(&self) -> Result<f64, ReportError> {
        self.points_calls.fetch_add(1, Ordering::SeqCst);
        if take_failure(&self.points_failures) {
            return Err(ReportError::Transport("connection reset".into()));
        }
        self.points.lock().unwrap().clone().unwrap_or(Ok(0.0))
    }
}

fn take_failure(remaining: &AtomicUsize) -> bool {
    remaining.fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1)).is_ok()
}

/// Prober double: nodes answer after their scripted latency, unknown
/// addresses never answer and run into the timeout.
#[derive(Default)]
pub struct FakeProber {
    latencies: HashMap<String, Duration>,
    pub calls: AtomicUsize,
}

impl FakeProber {
    pub fn new(latencies: &[(&str, u64)]) -> Arc<Self> {
        Arc::new(Self {
            latencies: latencies
                .iter()
                .map(|(ip, ms)| (ip.to_string(), Duration::from_millis(*ms)))
                .collect(),
            calls: AtomicUsize::new(0),
        })
    }
}

#[async_trait]
impl Prober for FakeProber {
    async fn probe(&self, node: &Node, timeout: Duration) -> Reachability {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let latency = self.latencies.get(&node.ip).copied();
        let answer = async move {
            match latency {
                Some(latency) => {
                    tokio::time::sleep(latency).await;
                    Ok::<_, ()>(latency.as_millis() as u64)
                }
                None => std::future::pending().await,
            }
        };
        match bounded(timeout, answer).await {
            Ok(ms) => Reachability::Reachable(ms.max(1)),
            Err(_) => Reachability::Unreachable,
        }
    }
}

pub struct FixedLocator(pub Location);

#[async_trait]
impl Geolocator for FixedLocator {
    async fn locate(&self) -> Location {
        self.0.clone()
    }
}

/// One request as seen by [`MockServer`]
#[derive(Debug, Clone)]
pub struct Recorded {
    pub method: String,
    pub path: String,
    pub authorization: Option<String>,
    pub body: String,
}

/// Minimal HTTP/1.1 responder keyed by "METHOD /path"
pub struct MockServer {
    pub addr: SocketAddr,
    requests: Arc<Mutex<Vec<Recorded>>>,
    connections: Arc<AtomicUsize>,
}

impl MockServer {
    pub async fn start(routes: &[(&str, u16, &str)]) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let routes: Arc<HashMap<String, (u16, String)>> = Arc::new(
            routes
                .iter()
                .map(|(route, status, body)| (route.to_string(), (*status, body.to_string())))
                .collect(),
        );
        let requests = Arc::new(Mutex::new(Vec::new()));
        let connections = Arc::new(AtomicUsize::new(0));

        let (recorded, accepted) = (requests.clone(), connections.clone());
        tokio::spawn(async move {
            while let Ok((socket, _)) = listener.accept().await {
                accepted.fetch_add(1, Ordering::SeqCst);
                tokio::spawn(serve(socket, routes.clone(), recorded.clone()));
            }
        });

        Self { addr, requests, connections }
    }

    pub fn base_url(&self) -> String {
        format!("http://{}", self.addr)
    }

    pub fn requests(&self) -> Vec<Recorded> {
        self.requests.lock().unwrap().clone()
    }

    pub fn connections(&self) -> usize {
        self.connections.load(Ordering::SeqCst)
    }
}

async fn serve(
    mut socket: TcpStream,
    routes: Arc<HashMap<String, (u16, String)>>,
    recorded: Arc<Mutex<Vec<Recorded>>>,
) {
    let mut buffer = Vec::new();
    let mut chunk = [0u8; 4096];
    let header_end = loop {
        let Ok(read) = socket.read(&mut chunk).await else { return };
        if read == 0 {
            return;
        }
        buffer.extend_from_slice(&chunk[..read]);
        if let Some(pos) = buffer.windows(4).position(|window| window == b"\r\n\r\n") {
            break pos + 4;
        }
    };

    let head = String::from_utf8_lossy(&buffer[..header_end]).to_string();
    let mut lines = head.lines();
    let request_line = lines.next().unwrap_or_default();
    let mut parts = request_line.split_whitespace();
    let method = parts.next().unwrap_or_default().to_string();
    let path = parts.next().unwrap_or_default().to_string();

    let mut content_length = 0;
    let mut authorization = None;
    for line in lines {
        if let Some((name, value)) = line.split_once(':') {
            match name.trim().to_ascii_lowercase().as_str() {
                "content-length" => content_length = value.trim().parse().unwrap_or(0),
                "authorization" => authorization = Some(value.trim().to_string()),
                _ => {}
            }
        }
    }

    while buffer.len() < header_end + content_length {
        let Ok(read) = socket.read(&mut chunk).await else { return };
        if read == 0 {
            break;
        }
        buffer.extend_from_slice(&chunk[..read]);
    }
    let body_end = buffer.len().min(header_end + content_length);
    let body = String::from_utf8_lossy(&buffer[header_end..body_end]).to_string();

    let (status, response_body) = routes
        .get(&format!("{method} {path}"))
        .cloned()
        .unwrap_or((404, String::new()));

    recorded.lock().unwrap().push(Recorded { method, path, authorization, body });

    let response = format!(
        "HTTP/1.1 {status} MOCK\r\ncontent-type: application/json\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{response_body}",
        response_body.len()
    );
    let _ = socket.write_all(response.as_bytes()).await;
    let _ = socket.shutdown().await;
}
