//! AWS Textract `AnalyzeExpense` backend over plain HTTPS.

use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use chrono::Utc;
use receipt_core::{OcrDocument, ReceiptError};
use reqwest::header::CONTENT_TYPE;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::backend::OcrBackend;
use crate::response::parse_analyze_expense;
use crate::sigv4::{self, Credentials, RequestToSign};

const SERVICE: &str = "textract";
const TARGET: &str = "Textract.AnalyzeExpense";
const JSON_1_1: &str = "application/x-amz-json-1.1";
pub const DEFAULT_REGION: &str = "us-east-1";

pub struct TextractBackend {
    client: reqwest::Client,
    credentials: Credentials,
    region: String,
    endpoint: String,
    host: String,
}

#[derive(Serialize)]
struct AnalyzeExpenseRequest<'a> {
    #[serde(rename = "Document")]
    document: DocumentBytes<'a>,
}

#[derive(Serialize)]
struct DocumentBytes<'a> {
    #[serde(rename = "Bytes")]
    bytes: &'a str,
}

#[derive(Deserialize)]
struct ServiceError {
    #[serde(rename = "__type")]
    kind: Option<String>,
    #[serde(alias = "Message")]
    message: Option<String>,
}

impl TextractBackend {
    /// `endpoint` overrides `https://textract.{region}.amazonaws.com/`.
    pub fn new(
        credentials: Credentials,
        region: impl Into<String>,
        endpoint: Option<String>,
        timeout: Duration,
    ) -> Result<Self> {
        let region = region.into();
        let endpoint =
            endpoint.unwrap_or_else(|| format!("https://textract.{region}.amazonaws.com/"));

        let url = reqwest::Url::parse(&endpoint)
            .with_context(|| format!("invalid Textract endpoint: {endpoint}"))?;
        let host = match (url.host_str(), url.port()) {
            (Some(h), Some(p)) => format!("{h}:{p}"),
            (Some(h), None) => h.to_string(),
            (None, _) => anyhow::bail!("Textract endpoint has no host: {endpoint}"),
        };

        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .context("create HTTP client")?;

        Ok(Self {
            client,
            credentials,
            region,
            endpoint,
            host,
        })
    }

    pub fn region(&self) -> &str {
        &self.region
    }
}

#[async_trait]
impl OcrBackend for TextractBackend {
    fn name(&self) -> &str {
        "textract"
    }

    async fn analyze(&self, image: &[u8]) -> Result<OcrDocument, ReceiptError> {
        let encoded = STANDARD.encode(image);
        let body = serde_json::to_vec(&AnalyzeExpenseRequest {
            document: DocumentBytes { bytes: &encoded },
        })
        .map_err(|e| ReceiptError::ocr(format!("encode request: {e}")))?;

        let signed = sigv4::sign(
            &self.credentials,
            &RequestToSign {
                method: "POST",
                host: &self.host,
                path: "/",
                query: "",
                headers: &[("content-type", JSON_1_1), ("x-amz-target", TARGET)],
                payload: &body,
            },
            &self.region,
            SERVICE,
            Utc::now(),
        );

        let mut req = self
            .client
            .post(&self.endpoint)
            .header(CONTENT_TYPE, JSON_1_1)
            .header("x-amz-target", TARGET);
        for (k, v) in signed {
            req = req.header(k, v);
        }

        debug!(bytes = image.len(), region = %self.region, "calling Textract AnalyzeExpense");
        let started = Instant::now();

        let resp = req.body(body).send().await.map_err(|e| {
            if e.is_timeout() {
                ReceiptError::ocr(format!("Textract request timed out: {e}"))
            } else {
                ReceiptError::ocr(format!("Textract request failed: {e}"))
            }
        })?;

        let status = resp.status();
        let text = resp
            .text()
            .await
            .map_err(|e| ReceiptError::ocr(format!("read Textract response: {e}")))?;

        if !status.is_success() {
            return Err(ReceiptError::ocr(describe_error(status, &text)));
        }

        let doc = parse_analyze_expense(&text)?;
        info!(
            lines = doc.lines.len(),
            fields = doc.fields.len(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Textract AnalyzeExpense finished"
        );
        Ok(doc)
    }
}

fn describe_error(status: reqwest::StatusCode, body: &str) -> String {
    match serde_json::from_str::<ServiceError>(body) {
        Ok(ServiceError { kind, message }) if kind.is_some() || message.is_some() => {
            // "__type" may carry a namespace prefix
            let kind = kind
                .as_deref()
                .map(|k| k.rsplit('#').next().unwrap_or(k))
                .unwrap_or("UnknownError");
            format!(
                "Textract API error {status}: {kind}: {}",
                message.unwrap_or_default()
            )
        }
        _ => format!("Textract API error {status}: {}", body.trim()),
    }
}
