use std::sync::Arc;
use std::time::Duration;

use reqwest::Url;
use reqwest::blocking::Client;
use reqwest::header::{ACCEPT, CONTENT_TYPE, HeaderMap, HeaderValue};
use thiserror::Error;
use uuid::Uuid;

use crate::error::{AgentError, Result};
use crate::models::CrashReport;
use crate::wire::encode_report;

pub const AGENT_HEADER: &str = "x-crash-agent";
pub const REPORT_ID_HEADER: &str = "x-crash-report-id";

/// Everything one send needs. Cheap to clone onto a worker.
#[derive(Debug, Clone)]
pub struct DeliveryRequest {
    pub report_id: Uuid,
    pub report: Arc<CrashReport>,
    pub destination: Url,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Ack {
    pub status: u16,
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TransportError {
    #[error("collector responded with status {status}")]
    Status { status: u16 },

    #[error("request timed out: {0}")]
    Timeout(String),

    #[error("connection failed: {0}")]
    Connect(String),

    #[error("request failed: {0}")]
    Request(String),

    #[error("failed to encode report: {0}")]
    Encode(String),

    #[error("send worker exited without a result")]
    Disconnected,
}

impl TransportError {
    pub fn code(&self) -> &'static str {
        match self {
            Self::Status { .. } => "HTTP_STATUS",
            Self::Timeout(_) => "TIMEOUT",
            Self::Connect(_) => "CONNECT_FAILED",
            Self::Request(_) => "REQUEST_FAILED",
            Self::Encode(_) => "ENCODE_FAILED",
            Self::Disconnected => "WORKER_DISCONNECTED",
        }
    }

    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Status { status } => Some(*status),
            _ => None,
        }
    }
}

impl From<reqwest::Error> for TransportError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            Self::Timeout(err.to_string())
        } else if err.is_connect() {
            Self::Connect(err.to_string())
        } else if let Some(status) = err.status() {
            Self::Status {
                status: status.as_u16(),
            }
        } else {
            Self::Request(err.to_string())
        }
    }
}

/// One delivery attempt. Implementations never retry.
pub trait Transport: Send + Sync {
    fn send(&self, request: &DeliveryRequest) -> std::result::Result<Ack, TransportError>;
}

#[derive(Clone)]
pub struct HttpTransport {
    http: Client,
    timeout: Duration,
}

impl std::fmt::Debug for HttpTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpTransport")
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}

impl HttpTransport {
    pub fn new(timeout: Duration) -> Result<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));
        let agent = HeaderValue::from_str(&agent_header_value()).map_err(|e| {
            AgentError::Internal(format!("invalid {AGENT_HEADER} header value: {e}"))
        })?;
        headers.insert(AGENT_HEADER, agent);

        let http = Client::builder()
            .default_headers(headers)
            .timeout(timeout)
            .build()?;
        Ok(Self { http, timeout })
    }
}

impl Transport for HttpTransport {
    fn send(&self, request: &DeliveryRequest) -> std::result::Result<Ack, TransportError> {
        let body =
            encode_report(&request.report).map_err(|e| TransportError::Encode(e.to_string()))?;
        let response = self
            .http
            .post(request.destination.clone())
            .header(REPORT_ID_HEADER, request.report_id.to_string())
            .body(body)
            .send()?;
        let status = response.status();
        if status.is_success() {
            Ok(Ack {
                status: status.as_u16(),
            })
        } else {
            Err(TransportError::Status {
                status: status.as_u16(),
            })
        }
    }
}

pub fn agent_header_value() -> String {
    format!("crash-agent/{}", crate::report::AGENT_VERSION)
}
