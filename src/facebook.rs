use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::{Map, Value};
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

/// Request parameters for a Graph API call, sent as the JSON body.
pub type Params = Map<String, Value>;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum FacebookApiError {
    #[error("API request failed: {0}")]
    RequestFailed(String),
    #[error("Invalid response (HTTP {status}): {detail}")]
    InvalidResponse { status: u16, detail: String },
    #[error("{message}")]
    Api {
        status: u16,
        code: Option<i64>,
        subcode: Option<i64>,
        kind: Option<String>,
        trace_id: Option<String>,
        message: String,
    },
}

impl FacebookApiError {
    /// HTTP status of the failed exchange; `None` when no response arrived.
    pub fn status(&self) -> Option<u16> {
        match self {
            FacebookApiError::RequestFailed(_) => None,
            FacebookApiError::InvalidResponse { status, .. } => Some(*status),
            FacebookApiError::Api { status, .. } => Some(*status),
        }
    }
}

/// Result of a successful `create` call.
#[derive(Debug, Clone, PartialEq)]
pub struct Created {
    pub id: String,
}

/// Result of a successful member upload.
#[derive(Debug, Clone, PartialEq)]
pub struct UploadReceipt {
    pub audience_id: String,
    pub num_received: u64,
    pub num_invalid_entries: u64,
}

/// The two Graph API operations the audience and campaign flows need.
///
/// Each call performs exactly one request: no retries, no caching.
#[async_trait]
pub trait GraphApi: Send + Sync {
    async fn create(&self, path: &str, params: Params) -> Result<Created, FacebookApiError>;
    async fn upload(&self, path: &str, params: Params) -> Result<UploadReceipt, FacebookApiError>;
}

#[derive(Debug, Deserialize)]
struct GraphEnvelope {
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    error: Option<GraphErrorBody>,
    #[serde(default)]
    audience_id: Option<String>,
    #[serde(default)]
    num_received: Option<u64>,
    #[serde(default)]
    num_invalid_entries: Option<u64>,
}

#[derive(Debug, Deserialize)]
struct GraphErrorBody {
    #[serde(default)]
    message: Option<String>,
    #[serde(rename = "type", default)]
    kind: Option<String>,
    #[serde(default)]
    code: Option<i64>,
    #[serde(default)]
    error_subcode: Option<i64>,
    #[serde(default)]
    fbtrace_id: Option<String>,
}

impl GraphErrorBody {
    fn into_error(self, status: u16) -> FacebookApiError {
        FacebookApiError::Api {
            status,
            code: self.code,
            subcode: self.error_subcode,
            kind: self.kind,
            trace_id: self.fbtrace_id,
            message: self
                .message
                .unwrap_or_else(|| "Unknown error".to_string()),
        }
    }
}

/// Turns a raw HTTP exchange into a typed envelope or a uniform error.
fn parse_envelope(status: u16, body: &str) -> Result<GraphEnvelope, FacebookApiError> {
    let success = (200..300).contains(&status);

    let envelope: GraphEnvelope = match serde_json::from_str(body) {
        Ok(envelope) => envelope,
        Err(e) if success => {
            return Err(FacebookApiError::InvalidResponse {
                status,
                detail: e.to_string(),
            })
        }
        Err(_) => {
            return Err(FacebookApiError::Api {
                status,
                code: None,
                subcode: None,
                kind: None,
                trace_id: None,
                message: non_empty_or(body, "HTTP error without body"),
            })
        }
    };

    if let Some(error) = envelope.error {
        return Err(error.into_error(status));
    }
    if !success {
        return Err(FacebookApiError::Api {
            status,
            code: None,
            subcode: None,
            kind: None,
            trace_id: None,
            message: non_empty_or(body, "HTTP error without body"),
        });
    }

    Ok(envelope)
}

fn non_empty_or(body: &str, fallback: &str) -> String {
    let body = body.trim();
    if body.is_empty() {
        fallback.to_string()
    } else {
        body.to_string()
    }
}

fn parse_created(status: u16, body: &str) -> Result<Created, FacebookApiError> {
    let envelope = parse_envelope(status, body)?;
    match envelope.id {
        Some(id) if !id.is_empty() => Ok(Created { id }),
        _ => Err(FacebookApiError::InvalidResponse {
            status,
            detail: "response has no id".to_string(),
        }),
    }
}

fn parse_upload(status: u16, body: &str) -> Result<UploadReceipt, FacebookApiError> {
    let envelope = parse_envelope(status, body)?;
    let audience_id = envelope
        .audience_id
        .ok_or_else(|| FacebookApiError::InvalidResponse {
            status,
            detail: "response has no audience_id".to_string(),
        })?;
    let num_received = envelope
        .num_received
        .ok_or_else(|| FacebookApiError::InvalidResponse {
            status,
            detail: "response has no num_received".to_string(),
        })?;

    Ok(UploadReceipt {
        audience_id,
        num_received,
        num_invalid_entries: envelope.num_invalid_entries.unwrap_or(0),
    })
}

pub struct FacebookAPI {
    client: Client,
    access_token: String,
    base_url: String,
}

impl FacebookAPI {
    /// `base_url` already includes the API version, e.g.
    /// `https://graph.facebook.com/v22.0`.
    pub fn new(
        access_token: String,
        base_url: String,
        timeout: Duration,
    ) -> Result<Self, FacebookApiError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| FacebookApiError::RequestFailed(e.to_string()))?;

        Ok(Self {
            client,
            access_token,
            base_url,
        })
    }

    async fn post(&self, path: &str, params: &Params) -> Result<(u16, String), FacebookApiError> {
        let url = format!("{}/{}", self.base_url, path.trim_start_matches('/'));
        debug!(%url, "POST graph api");

        let response = self
            .client
            .post(&url)
            .query(&[("access_token", &self.access_token)])
            .json(params)
            .send()
            .await
            .map_err(|e| FacebookApiError::RequestFailed(e.to_string()))?;

        let status = response.status().as_u16();
        let body = response
            .text()
            .await
            .map_err(|e| FacebookApiError::RequestFailed(e.to_string()))?;

        Ok((status, body))
    }
}

#[async_trait]
impl GraphApi for FacebookAPI {
    async fn create(&self, path: &str, params: Params) -> Result<Created, FacebookApiError> {
        let (status, body) = self.post(path, &params).await?;
        parse_created(status, &body)
    }

    async fn upload(&self, path: &str, params: Params) -> Result<UploadReceipt, FacebookApiError> {
        let (status, body) = self.post(path, &params).await?;
        parse_upload(status, &body)
    }
}
