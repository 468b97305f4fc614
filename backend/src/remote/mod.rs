// Remote Data Client - Talks to the CRM GraphQL endpoint
//
// Every request is a POST of `{query, variables?}` answered by `{data, errors?}`.
// Callers hand over an ordered list of request shapes; the first one the
// endpoint answers cleanly wins.

pub mod contract;
pub mod queries;

use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use crate::config::RemoteConfig;
pub use contract::SchemaContract;

#[derive(Error, Debug)]
pub enum RemoteError {
    #[error("Failed to connect to GraphQL server: {0}")]
    Connectivity(String),
    #[error("GraphQL endpoint returned HTTP {0}")]
    Status(u16),
    #[error("GraphQL errors: {}", .0.join("; "))]
    Application(Vec<String>),
    #[error("Unexpected response shape: {0}")]
    Shape(String),
    #[error("No query variation succeeded ({})", describe_failures(.0))]
    AllCandidatesFailed(Vec<CandidateFailure>),
    #[error("HTTP client error: {0}")]
    Client(String),
}

impl RemoteError {
    /// Only connectivity failures are worth retrying; the endpoint answered otherwise.
    pub fn is_connectivity(&self) -> bool {
        matches!(self, Self::Connectivity(_))
    }
}

/// A reset, abort or early EOF anywhere in the source chain.
fn is_dropped_connection(err: &(dyn std::error::Error + 'static)) -> bool {
    let mut source = Some(err);
    while let Some(current) = source {
        if let Some(io) = current.downcast_ref::<std::io::Error>() {
            if matches!(
                io.kind(),
                std::io::ErrorKind::ConnectionReset
                    | std::io::ErrorKind::ConnectionAborted
                    | std::io::ErrorKind::UnexpectedEof
                    | std::io::ErrorKind::BrokenPipe
            ) {
                return true;
            }
        }
        source = current.source();
    }
    false
}

impl From<reqwest::Error> for RemoteError {
    fn from(err: reqwest::Error) -> Self {
        // A request that never got a status line back lost its transport.
        let transport_lost = err.status().is_none() && (err.is_request() || err.is_body());
        if err.is_connect() || err.is_timeout() || transport_lost || is_dropped_connection(&err) {
            Self::Connectivity(err.to_string())
        } else if err.is_decode() {
            Self::Shape(err.to_string())
        } else if let Some(status) = err.status() {
            Self::Status(status.as_u16())
        } else {
            Self::Client(err.to_string())
        }
    }
}

fn describe_failures(failures: &[CandidateFailure]) -> String {
    failures.iter().map(|f| f.to_string()).collect::<Vec<_>>().join(", ")
}

/// Why a single request shape was rejected.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FailureReason {
    Status { code: u16 },
    Application { messages: Vec<String> },
    MissingFields { fields: Vec<String> },
    Unsupported,
    Malformed { detail: String },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CandidateFailure {
    pub candidate: &'static str,
    pub reason: FailureReason,
}

impl fmt::Display for CandidateFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.reason {
            FailureReason::Status { code } => write!(f, "{}: HTTP {}", self.candidate, code),
            FailureReason::Application { messages } => write!(f, "{}: {}", self.candidate, messages.join("; ")),
            FailureReason::MissingFields { fields } => write!(f, "{}: missing {}", self.candidate, fields.join(", ")),
            FailureReason::Unsupported => write!(f, "{}: not exposed by endpoint", self.candidate),
            FailureReason::Malformed { detail } => write!(f, "{}: {}", self.candidate, detail),
        }
    }
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct GraphQlRequest {
    pub query: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub variables: Option<Value>,
}

impl GraphQlRequest {
    pub fn new(query: impl Into<String>) -> Self {
        Self { query: query.into(), variables: None }
    }

    pub fn with_variables(mut self, variables: Value) -> Self {
        self.variables = Some(variables);
        self
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct GraphQlResponse {
    #[serde(default)]
    pub data: Option<Value>,
    #[serde(default)]
    pub errors: Option<Vec<GraphQlErrorEntry>>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct GraphQlErrorEntry {
    pub message: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum OperationKind {
    Query,
    Mutation,
}

/// One request shape for a logical operation.
#[derive(Debug, Clone)]
pub struct QueryCandidate {
    pub label: &'static str,
    pub kind: OperationKind,
    /// Top-level fields the response `data` must contain.
    pub root_fields: &'static [&'static str],
    pub request: GraphQlRequest,
}

/// The data payload of the first candidate that succeeded.
#[derive(Debug, Clone)]
pub struct RemoteResponse {
    pub data: Value,
    pub candidate: usize,
    pub label: &'static str,
}

#[derive(Debug)]
struct ClientInner {
    http: reqwest::Client,
    url: String,
    request_timeout: Duration,
    probe_timeout: Duration,
    contract: RwLock<Option<SchemaContract>>,
}

#[derive(Debug, Clone)]
pub struct RemoteClient {
    inner: Arc<ClientInner>,
}

impl RemoteClient {
    pub fn new(config: &RemoteConfig) -> Result<Self, RemoteError> {
        let http = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()
            .map_err(|e| RemoteError::Client(e.to_string()))?;

        Ok(Self {
            inner: Arc::new(ClientInner {
                http,
                url: config.graphql_url.clone(),
                request_timeout: config.request_timeout,
                probe_timeout: config.probe_timeout,
                contract: RwLock::new(None),
            }),
        })
    }

    pub fn url(&self) -> &str {
        &self.inner.url
    }

    pub async fn contract(&self) -> Option<SchemaContract> {
        self.inner.contract.read().await.clone()
    }

    /// Introspects the endpoint's root fields once and remembers them, so
    /// later calls skip request shapes the endpoint cannot serve.
    pub async fn negotiate(&self) -> Result<SchemaContract, RemoteError> {
        let response = self.post(&queries::introspect_roots(), self.inner.request_timeout).await?;
        let contract = SchemaContract::from_response(response)?;

        info!(
            query_fields = contract.query_fields.len(),
            mutation_fields = contract.mutation_fields.len(),
            "Negotiated GraphQL contract with {}",
            self.inner.url
        );

        *self.inner.contract.write().await = Some(contract.clone());
        Ok(contract)
    }

    /// Sends one request and decodes the GraphQL envelope.
    pub async fn post(&self, request: &GraphQlRequest, timeout: Duration) -> Result<GraphQlResponse, RemoteError> {
        let response = self
            .inner
            .http
            .post(&self.inner.url)
            .timeout(timeout)
            .json(request)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(RemoteError::Status(status.as_u16()));
        }

        let envelope = response.json::<GraphQlResponse>().await?;
        Ok(envelope)
    }

    /// Tries each candidate in order until one answers without errors and
    /// with all of its root fields present.
    pub async fn send_candidates(&self, candidates: &[QueryCandidate]) -> Result<RemoteResponse, RemoteError> {
        let contract = self.contract().await;
        let mut failures = Vec::with_capacity(candidates.len());

        for (index, candidate) in candidates.iter().enumerate() {
            if let Some(contract) = &contract {
                if !contract.supports(candidate) {
                    debug!("Skipping {}: not in negotiated contract", candidate.label);
                    failures.push(CandidateFailure { candidate: candidate.label, reason: FailureReason::Unsupported });
                    continue;
                }
            }

            let envelope = match self.post(&candidate.request, self.inner.request_timeout).await {
                Ok(envelope) => envelope,
                Err(RemoteError::Connectivity(e)) => return Err(RemoteError::Connectivity(e)),
                Err(RemoteError::Status(code)) => {
                    warn!("Query variation {} failed with HTTP {}", candidate.label, code);
                    failures.push(CandidateFailure { candidate: candidate.label, reason: FailureReason::Status { code } });
                    continue;
                }
                Err(e) => {
                    warn!("Query variation {} failed: {}", candidate.label, e);
                    failures.push(CandidateFailure {
                        candidate: candidate.label,
                        reason: FailureReason::Malformed { detail: e.to_string() },
                    });
                    continue;
                }
            };

            if let Some(errors) = envelope.errors.filter(|errors| !errors.is_empty()) {
                let messages: Vec<String> = errors.into_iter().map(|e| e.message).collect();
                warn!("Query variation {} failed with errors: {:?}", candidate.label, messages);
                failures.push(CandidateFailure { candidate: candidate.label, reason: FailureReason::Application { messages } });
                continue;
            }

            let data = envelope.data.unwrap_or(Value::Null);
            let missing: Vec<String> = candidate
                .root_fields
                .iter()
                .filter(|field| data.get(**field).map_or(true, Value::is_null))
                .map(|field| field.to_string())
                .collect();
            if !missing.is_empty() {
                failures.push(CandidateFailure { candidate: candidate.label, reason: FailureReason::MissingFields { fields: missing } });
                continue;
            }

            debug!("Query variation {} succeeded", candidate.label);
            return Ok(RemoteResponse { data, candidate: index, label: candidate.label });
        }

        Err(RemoteError::AllCandidatesFailed(failures))
    }

    /// Best-effort reachability check: true on the first probe answered with HTTP 200.
    pub async fn probe(&self) -> bool {
        for request in queries::reachability_probes() {
            let sent = self
                .inner
                .http
                .post(&self.inner.url)
                .timeout(self.inner.probe_timeout)
                .json(&request)
                .send()
                .await;

            match sent {
                Ok(response) if response.status() == StatusCode::OK => return true,
                Ok(response) => debug!("Probe answered HTTP {}", response.status()),
                Err(e) => debug!("Probe failed: {}", e),
            }
        }
        false
    }

    /// Lists schema type names containing `keyword`, to diagnose shapes the
    /// endpoint does not recognise.
    pub async fn describe_types(&self, keyword: &str) -> Result<Vec<String>, RemoteError> {
        let envelope = self.post(&queries::introspect_types(), self.inner.request_timeout).await?;
        if let Some(errors) = envelope.errors.filter(|e| !e.is_empty()) {
            return Err(RemoteError::Application(errors.into_iter().map(|e| e.message).collect()));
        }

        let needle = keyword.to_lowercase();
        let names = envelope
            .data
            .as_ref()
            .and_then(|d| d.pointer("/__schema/types"))
            .and_then(Value::as_array)
            .ok_or_else(|| RemoteError::Shape("__schema.types missing".to_string()))?
            .iter()
            .filter_map(|t| t.get("name").and_then(Value::as_str))
            .filter(|name| name.to_lowercase().contains(&needle))
            .map(str::to_string)
            .collect();

        Ok(names)
    }
}
