use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde::Deserialize;
use serde_json::Value;
use tracing::debug;
use uuid::Uuid;

use super::service::{ComputeService, ExportFormat};
use crate::error::StageError;
use crate::models::{ComputeOutcome, Parameters, StageKind};
use crate::sync::RawInput;

/// Matrix of the project's own classification, as opposed to a validation fold
const MATRIX_TYPE: &str = "classification";

pub const DEFAULT_SERVER: &str = "http://localhost:8080";
pub const DEFAULT_TIMEOUT_SECS: u64 = 60;

/// Configuration for the compute service client
#[derive(Debug, Clone, PartialEq)]
pub struct ServiceConfig {
    /// Server root, without trailing slash (from RULESTAGE_SERVER)
    pub base_url: String,
    /// Per-request timeout (from RULESTAGE_TIMEOUT_SECS)
    pub timeout: Duration,
}

impl ServiceConfig {
    /// Create config from environment variables, falling back to defaults
    pub fn from_env() -> Result<Self> {
        let base_url =
            std::env::var("RULESTAGE_SERVER").unwrap_or_else(|_| DEFAULT_SERVER.to_string());

        let timeout = match std::env::var("RULESTAGE_TIMEOUT_SECS") {
            Ok(raw) => raw
                .trim()
                .parse::<u64>()
                .with_context(|| format!("RULESTAGE_TIMEOUT_SECS is not a number: {}", raw))?,
            Err(_) => DEFAULT_TIMEOUT_SECS,
        };

        Ok(Self::new(base_url).with_timeout(Duration::from_secs(timeout)))
    }

    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    fn matrix_url(&self, project_id: Uuid) -> String {
        format!(
            "{}/projects/{}/misclassificationMatrix/download",
            self.base_url, project_id
        )
    }

    fn stage_url(&self, project_id: Uuid, stage: StageKind) -> String {
        format!(
            "{}/projects/{}/{}",
            self.base_url,
            project_id,
            stage.path_segment()
        )
    }
}

/// `ComputeService` over HTTP
pub struct HttpComputeService {
    client: Client,
    config: ServiceConfig,
}

impl HttpComputeService {
    pub fn new(config: ServiceConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .context("Failed to build HTTP client")?;
        Ok(Self { client, config })
    }

    pub fn config(&self) -> &ServiceConfig {
        &self.config
    }

    async fn send(&self, request: RequestBuilder) -> Result<Response, StageError> {
        request
            .send()
            .await
            .map_err(|e| StageError::NetworkFailure(e.to_string()))
    }

    async fn download(&self, request: RequestBuilder) -> Result<Vec<u8>, StageError> {
        let response = check_status(self.send(request).await?).await?;
        let bytes = response
            .bytes()
            .await
            .map_err(|e| StageError::NetworkFailure(e.to_string()))?;
        Ok(bytes.to_vec())
    }

    async fn outcome(&self, response: Response) -> Result<ComputeOutcome, StageError> {
        let response = check_status(response).await?;
        let envelope: Value = response
            .json()
            .await
            .map_err(|e| StageError::NetworkFailure(format!("unreadable response: {}", e)))?;
        Ok(ComputeOutcome::from_envelope(envelope))
    }
}

#[async_trait]
impl ComputeService for HttpComputeService {
    async fn fetch(
        &self,
        project_id: Uuid,
        stage: StageKind,
    ) -> Result<Option<ComputeOutcome>, StageError> {
        let url = self.config.stage_url(project_id, stage);
        debug!("GET {}", url);

        let response = self.send(self.client.get(&url)).await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        self.outcome(response).await.map(Some)
    }

    async fn recompute(
        &self,
        project_id: Uuid,
        stage: StageKind,
        parameters: &Parameters,
    ) -> Result<ComputeOutcome, StageError> {
        let url = self.config.stage_url(project_id, stage);
        debug!("PUT {}", url);

        let request = self.client.put(&url).multipart(parameter_form(parameters));
        let response = self.send(request).await?;
        self.outcome(response).await
    }

    async fn upload(
        &self,
        project_id: Uuid,
        stage: StageKind,
        parameters: &Parameters,
        input: &RawInput,
    ) -> Result<ComputeOutcome, StageError> {
        let url = self.config.stage_url(project_id, stage);
        debug!("POST {} ({} bytes as {})", url, input.content.len(), input.part);

        let part = Part::bytes(input.content.clone()).file_name(input.file_name.clone());
        let form = parameter_form(parameters).part(input.part.clone(), part);
        let response = self.send(self.client.post(&url).multipart(form)).await?;
        self.outcome(response).await
    }

    async fn export(
        &self,
        project_id: Uuid,
        stage: StageKind,
        format: ExportFormat,
    ) -> Result<Vec<u8>, StageError> {
        let url = format!("{}/export", self.config.stage_url(project_id, stage));
        debug!("GET {}?format={}", url, format);

        let request = self.client.get(&url).query(&[("format", format.extension())]);
        self.download(request).await
    }

    async fn download_matrix(&self, project_id: Uuid) -> Result<Vec<u8>, StageError> {
        let url = self.config.matrix_url(project_id);
        debug!("GET {}?typeOfMatrix={}", url, MATRIX_TYPE);

        let request = self.client.get(&url).query(&[("typeOfMatrix", MATRIX_TYPE)]);
        self.download(request).await
    }
}

fn parameter_form(parameters: &Parameters) -> Form {
    parameters
        .iter()
        .fold(Form::new(), |form, (name, value)| {
            form.text(name.clone(), value.to_string())
        })
}

async fn check_status(response: Response) -> Result<Response, StageError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(rejection_from_body(status, &body))
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    message: Option<String>,
    error: Option<String>,
}

/// Build a `ServerRejected` from a non-2xx body, falling back to the reason phrase
pub fn rejection_from_body(status: StatusCode, body: &str) -> StageError {
    let message = serde_json::from_str::<ErrorBody>(body)
        .ok()
        .and_then(|b| b.message.or(b.error))
        .filter(|m| !m.trim().is_empty())
        .unwrap_or_else(|| {
            status
                .canonical_reason()
                .unwrap_or("Unknown error")
                .to_string()
        });

    StageError::ServerRejected {
        status: status.as_u16(),
        message,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_structured_rejection() {
        let err = rejection_from_body(
            StatusCode::UNPROCESSABLE_ENTITY,
            r#"{"status": 422, "error": "Unprocessable Entity", "message": "threshold out of range"}"#,
        );
        assert_eq!(
            err,
            StageError::ServerRejected {
                status: 422,
                message: "threshold out of range".to_string()
            }
        );
    }

    #[test]
    fn test_rejection_falls_back_to_reason_phrase() {
        let err = rejection_from_body(StatusCode::INTERNAL_SERVER_ERROR, "<html>oops</html>");
        assert_eq!(
            err,
            StageError::ServerRejected {
                status: 500,
                message: "Internal Server Error".to_string()
            }
        );

        let err = rejection_from_body(StatusCode::BAD_REQUEST, r#"{"error": "Bad data"}"#);
        assert!(matches!(err, StageError::ServerRejected { message, .. } if message == "Bad data"));
    }

    #[test]
    fn test_stage_url() {
        let config = ServiceConfig::new("http://host:9000/");
        let id = Uuid::nil();
        assert_eq!(
            config.stage_url(id, StageKind::Rules),
            format!("http://host:9000/projects/{}/rules", id)
        );
        assert_eq!(
            config.matrix_url(id),
            format!("http://host:9000/projects/{}/misclassificationMatrix/download", id)
        );
    }

    #[test]
    fn test_new_config_uses_default_timeout() {
        let config = ServiceConfig::new(DEFAULT_SERVER);
        assert_eq!(config.timeout, Duration::from_secs(DEFAULT_TIMEOUT_SECS));
        assert_eq!(
            config.with_timeout(Duration::from_secs(5)).timeout,
            Duration::from_secs(5)
        );
    }
}
