use super::ConversionClient;
use crate::models::{ConversionKind, RemoteFileRef};
use crate::services::error::{RelayError, RelayResult};
use async_trait::async_trait;
use futures::StreamExt;
use reqwest::multipart::{Form, Part};
use reqwest::{Client, Response, StatusCode};
use serde::Deserialize;
use serde_json::json;
use std::path::Path;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio_util::io::ReaderStream;

const API_KEY_HEADER: &str = "x-api-key";

/// Envelope PDF.co wraps around every JSON answer.
#[derive(Debug, Deserialize)]
struct PdfCoResponse {
    #[serde(default)]
    url: Option<String>,
    #[serde(default)]
    error: bool,
    #[serde(default)]
    status: Option<serde_json::Value>,
    #[serde(default)]
    message: Option<String>,
}

impl PdfCoResponse {
    fn status_code(&self) -> Option<u16> {
        match self.status.as_ref()? {
            serde_json::Value::Number(n) => n.as_u64().and_then(|n| u16::try_from(n).ok()),
            serde_json::Value::String(s) => s.parse().ok(),
            _ => None,
        }
    }

    fn into_reference(self, what: &str) -> RelayResult<RemoteFileRef> {
        self.url
            .filter(|u| !u.trim().is_empty())
            .map(RemoteFileRef::new)
            .ok_or_else(|| {
                RelayError::Upstream(format!("{} response did not include a file URL", what))
            })
    }
}

/// Client for the PDF.co REST API.
pub struct PdfCoClient {
    http: Client,
    base_url: String,
    api_key: String,
}

impl PdfCoClient {
    pub fn new(
        base_url: impl Into<String>,
        api_key: impl Into<String>,
        timeout: Option<Duration>,
    ) -> RelayResult<Self> {
        let mut builder = Client::builder();
        if let Some(timeout) = timeout {
            builder = builder.timeout(timeout);
        }
        let http = builder
            .build()
            .map_err(|e| RelayError::Network(format!("HTTP client setup failed: {}", e)))?;

        Ok(Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
        })
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/v1/{}", self.base_url, path)
    }

    async fn read_payload(
        resp: Response,
        on_failure: fn(String) -> RelayError,
    ) -> RelayResult<PdfCoResponse> {
        let status = resp.status();
        if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            let body = resp.text().await.unwrap_or_default();
            return Err(RelayError::Auth(describe_status(status, &body)));
        }

        let body = resp
            .bytes()
            .await
            .map_err(|e| RelayError::Network(format!("reading upstream response: {}", e)))?;

        let payload: PdfCoResponse = match serde_json::from_slice(&body) {
            Ok(payload) => payload,
            Err(_) if !status.is_success() => {
                return Err(on_failure(describe_status(
                    status,
                    &String::from_utf8_lossy(&body),
                )));
            }
            Err(e) => {
                return Err(RelayError::Upstream(format!("malformed response: {}", e)));
            }
        };

        if payload.error || !status.is_success() {
            let message = payload
                .message
                .clone()
                .unwrap_or_else(|| format!("HTTP {}", status));
            if matches!(payload.status_code(), Some(401) | Some(403)) {
                return Err(RelayError::Auth(message));
            }
            return Err(on_failure(message));
        }

        Ok(payload)
    }
}

fn describe_status(status: StatusCode, body: &str) -> String {
    let body = body.trim();
    if body.is_empty() {
        format!("HTTP {}", status)
    } else {
        format!("HTTP {}: {}", status, body.chars().take(200).collect::<String>())
    }
}

fn network_error(e: reqwest::Error) -> RelayError {
    RelayError::Network(e.to_string())
}

#[async_trait]
impl ConversionClient for PdfCoClient {
    fn provider_id(&self) -> &'static str {
        "pdfco"
    }

    async fn upload_file(&self, local_path: &Path) -> RelayResult<RemoteFileRef> {
        let file = tokio::fs::File::open(local_path).await?;
        let length = file.metadata().await?.len();
        let file_name = local_path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("upload")
            .to_string();

        let body = reqwest::Body::wrap_stream(ReaderStream::new(file));
        let form = Form::new().part(
            "file",
            Part::stream_with_length(body, length).file_name(file_name),
        );

        let resp = self
            .http
            .post(self.endpoint("file/upload"))
            .header(API_KEY_HEADER, &self.api_key)
            .multipart(form)
            .send()
            .await
            .map_err(network_error)?;

        let payload = Self::read_payload(resp, RelayError::Upstream).await?;
        payload.into_reference("upload")
    }

    async fn request_conversion(
        &self,
        source: &RemoteFileRef,
        kind: ConversionKind,
    ) -> RelayResult<RemoteFileRef> {
        let resp = self
            .http
            .post(self.endpoint(kind.upstream_endpoint()))
            .header(API_KEY_HEADER, &self.api_key)
            .json(&json!({
                "url": source.as_str(),
                "async": false,
                "name": kind.output_filename(),
            }))
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    RelayError::Conversion(format!("{} timed out: {}", kind, e))
                } else {
                    network_error(e)
                }
            })?;

        let payload = Self::read_payload(resp, RelayError::Conversion).await?;
        payload.into_reference("conversion")
    }

    async fn fetch_result(&self, result: &RemoteFileRef, destination: &Path) -> RelayResult<u64> {
        let resp = self
            .http
            .get(result.as_str())
            .send()
            .await
            .map_err(network_error)?;

        let status = resp.status();
        if !status.is_success() {
            return Err(RelayError::Network(format!(
                "result download returned HTTP {}",
                status
            )));
        }

        let mut file = tokio::fs::File::create(destination).await?;
        let mut stream = resp.bytes_stream();
        let mut written: u64 = 0;
        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(|e| {
                RelayError::Network(format!("result transfer interrupted: {}", e))
            })?;
            file.write_all(&chunk).await?;
            written += chunk.len() as u64;
        }
        file.flush().await?;

        Ok(written)
    }
}
