use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{RequestBuilder, Response, StatusCode};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use tracing::debug;

use super::{Coordinator, Heartbeat, TestReport};
use crate::credentials::CredentialSource;
use crate::error::ReportError;
use crate::timeout::bounded;
use crate::types::{Node, ProbeOutcome, UptimeSnapshot};

/// `GET /nodes` may answer with a bare array or wrap it
#[derive(Deserialize)]
#[serde(untagged)]
enum NodeList {
    Bare(Vec<Node>),
    Wrapped { nodes: Vec<Node> },
}

#[derive(Deserialize)]
struct PointsResponse {
    points: f64,
}

/// REST client for the coordinator
pub struct HttpCoordinator {
    client: reqwest::Client,
    base_url: String,
    timeout: Duration,
    credentials: Arc<dyn CredentialSource>,
}

impl HttpCoordinator {
    pub fn new(
        base_url: impl Into<String>,
        timeout: Duration,
        credentials: Arc<dyn CredentialSource>,
    ) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(concat!("nodewatch/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            timeout,
            credentials,
        })
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }

    fn require_token(&self) -> Result<String, ReportError> {
        self.credentials.token().ok_or(ReportError::NoCredential)
    }

    /// Send under the client timeout and map non-2xx answers
    async fn send(&self, request: RequestBuilder) -> Result<Response, ReportError> {
        let response = bounded(self.timeout, request.send()).await?;

        match response.status() {
            status if status.is_success() => Ok(response),
            status @ (StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN) => {
                Err(ReportError::Auth(status.as_u16()))
            }
            status => Err(ReportError::Status(status.as_u16())),
        }
    }

    async fn read_json<T: DeserializeOwned>(&self, response: Response) -> Result<T, ReportError> {
        let body = bounded(self.timeout, response.bytes()).await?;
        serde_json::from_slice(&body).map_err(|e| ReportError::MalformedResponse(e.to_string()))
    }
}

#[async_trait]
impl Coordinator for HttpCoordinator {
    async fn fetch_nodes(&self) -> Result<Vec<Node>, ReportError> {
        let mut request = self.client.get(self.endpoint("nodes"));
        if let Some(token) = self.credentials.token() {
            request = request.bearer_auth(token);
        }

        let response = self.send(request).await?;
        let nodes = match self.read_json::<NodeList>(response).await? {
            NodeList::Bare(nodes) | NodeList::Wrapped { nodes } => nodes,
        };
        debug!("Coordinator returned {} nodes", nodes.len());
        Ok(nodes)
    }

    async fn submit_test_result(
        &self,
        outcome: &ProbeOutcome,
        uptime: UptimeSnapshot,
    ) -> Result<(), ReportError> {
        let token = self.require_token()?;
        let report = TestReport::new(outcome, uptime);
        let request = self.client.post(self.endpoint("test")).bearer_auth(token).json(&report);

        self.send(request).await?;
        Ok(())
    }

    async fn submit_heartbeat(&self, heartbeat: &Heartbeat) -> Result<(), ReportError> {
        let token = self.require_token()?;
        let request = self.client.post(self.endpoint("heartbeat")).bearer_auth(token).json(heartbeat);

        self.send(request).await?;
        Ok(())
    }

    async fn fetch_points(&self) -> Result<f64, ReportError> {
        let token = self.require_token()?;
        let request = self.client.get(self.endpoint("points")).bearer_auth(token);

        let response = self.send(request).await?;
        let PointsResponse { points } = self.read_json::<PointsResponse>(response).await?;
        Ok(points)
    }
}
