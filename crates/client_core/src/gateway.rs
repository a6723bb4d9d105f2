use async_trait::async_trait;
use reqwest::{Client, RequestBuilder};
use serde::de::DeserializeOwned;
use shared::{
    domain::{EvaluationResult, GenerationResult},
    error::ErrorDetail,
    protocol::{
        DepartmentsResponse, DoctorsResponse, DocumentTypesResponse, EvaluationRequest,
        EvaluationResponse, ModelsResponse, SummaryRequest, SummaryResponse,
    },
};
use tracing::{info, warn};
use url::Url;

use crate::error::{GatewayError, EVALUATION_FAILED, GENERATION_FAILED};

pub const API_KEY_HEADER: &str = "X-API-Key";

#[async_trait]
pub trait DocumentGateway: Send + Sync {
    async fn generate(&self, request: SummaryRequest) -> Result<GenerationResult, GatewayError>;
    async fn evaluate(&self, request: EvaluationRequest)
        -> Result<EvaluationResult, GatewayError>;
    async fn doctors(&self, department: &str) -> Result<Vec<String>, GatewayError>;
    async fn departments(&self) -> Result<Vec<String>, GatewayError>;
    async fn document_types(&self) -> Result<Vec<String>, GatewayError>;
    async fn available_models(&self) -> Result<ModelsResponse, GatewayError>;
}

pub struct MissingDocumentGateway;

#[async_trait]
impl DocumentGateway for MissingDocumentGateway {
    async fn generate(&self, _request: SummaryRequest) -> Result<GenerationResult, GatewayError> {
        Err(GatewayError::transport("document backend is unavailable"))
    }

    async fn evaluate(
        &self,
        _request: EvaluationRequest,
    ) -> Result<EvaluationResult, GatewayError> {
        Err(GatewayError::transport("document backend is unavailable"))
    }

    async fn doctors(&self, _department: &str) -> Result<Vec<String>, GatewayError> {
        Err(GatewayError::transport("document backend is unavailable"))
    }

    async fn departments(&self) -> Result<Vec<String>, GatewayError> {
        Err(GatewayError::transport("document backend is unavailable"))
    }

    async fn document_types(&self) -> Result<Vec<String>, GatewayError> {
        Err(GatewayError::transport("document backend is unavailable"))
    }

    async fn available_models(&self) -> Result<ModelsResponse, GatewayError> {
        Err(GatewayError::transport("document backend is unavailable"))
    }
}

#[derive(Debug, Clone)]
pub struct GatewayConfig {
    pub base_url: Url,
    pub api_key: Option<String>,
}

/// Normalizes a generation response. Missing optional fields fall back to
/// empty values so a partially populated success never fails the caller.
pub fn summary_result(response: SummaryResponse) -> Result<GenerationResult, GatewayError> {
    if !response.success {
        return Err(GatewayError::rejected(
            response.error_message,
            GENERATION_FAILED,
        ));
    }

    Ok(GenerationResult {
        output_summary: response.output_summary.unwrap_or_default(),
        parsed_summary: response.parsed_summary.unwrap_or_default(),
        processing_time: response.processing_time,
        model_used: response.model_used.unwrap_or_default(),
        model_switched: response.model_switched.unwrap_or(false),
    })
}

pub fn evaluation_result(
    response: EvaluationResponse,
) -> Result<EvaluationResult, GatewayError> {
    if !response.success {
        return Err(GatewayError::rejected(
            response.error_message,
            EVALUATION_FAILED,
        ));
    }

    Ok(EvaluationResult {
        result_text: response.evaluation_result.unwrap_or_default(),
        processing_time: response.processing_time,
    })
}

pub struct HttpGateway {
    http: Client,
    base_url: Url,
    api_key: Option<String>,
}

impl HttpGateway {
    pub fn new(config: GatewayConfig) -> Self {
        Self {
            http: Client::new(),
            base_url: config.base_url,
            api_key: config.api_key.filter(|key| !key.is_empty()),
        }
    }

    fn endpoint(&self, segments: &[&str]) -> Result<Url, GatewayError> {
        let mut url = self.base_url.clone();
        {
            let mut path = url.path_segments_mut().map_err(|_| {
                GatewayError::transport(format!(
                    "base url '{}' cannot carry a path",
                    self.base_url
                ))
            })?;
            path.pop_if_empty().extend(segments);
        }
        Ok(url)
    }

    fn authorize(&self, builder: RequestBuilder) -> RequestBuilder {
        match &self.api_key {
            Some(key) => builder.header(API_KEY_HEADER, key.as_str()),
            None => builder,
        }
    }

    async fn send_json<T: DeserializeOwned>(
        &self,
        builder: RequestBuilder,
    ) -> Result<T, GatewayError> {
        let response = self.authorize(builder).send().await.map_err(|err| {
            warn!(error = %err, "gateway: request failed");
            GatewayError::transport(err)
        })?;

        let status = response.status();
        if !status.is_success() {
            let detail = response
                .json::<ErrorDetail>()
                .await
                .ok()
                .map(|body| body.message());
            warn!(
                status = status.as_u16(),
                detail = detail.as_deref().unwrap_or(""),
                "gateway: backend returned error status"
            );
            return Err(GatewayError::Status {
                status: status.as_u16(),
                detail,
            });
        }

        response.json::<T>().await.map_err(|err| {
            warn!(error = %err, "gateway: malformed response body");
            GatewayError::transport(format!("malformed response: {err}"))
        })
    }
}

#[async_trait]
impl DocumentGateway for HttpGateway {
    async fn generate(&self, request: SummaryRequest) -> Result<GenerationResult, GatewayError> {
        // medical text stays out of the logs
        info!(
            department = %request.department,
            document_type = %request.document_type,
            model = %request.model,
            "generation: posting summary request"
        );
        let url = self.endpoint(&["api", "summary", "generate"])?;
        let response: SummaryResponse = self.send_json(self.http.post(url).json(&request)).await?;
        summary_result(response)
    }

    async fn evaluate(
        &self,
        request: EvaluationRequest,
    ) -> Result<EvaluationResult, GatewayError> {
        info!(
            document_type = %request.document_type,
            "evaluation: posting evaluation request"
        );
        let url = self.endpoint(&["api", "evaluation", "evaluate"])?;
        let response: EvaluationResponse =
            self.send_json(self.http.post(url).json(&request)).await?;
        evaluation_result(response)
    }

    async fn doctors(&self, department: &str) -> Result<Vec<String>, GatewayError> {
        let url = self.endpoint(&["api", "settings", "doctors", department])?;
        let response: DoctorsResponse = self.send_json(self.http.get(url)).await?;
        Ok(response.doctors)
    }

    async fn departments(&self) -> Result<Vec<String>, GatewayError> {
        let url = self.endpoint(&["api", "settings", "departments"])?;
        let response: DepartmentsResponse = self.send_json(self.http.get(url)).await?;
        Ok(response.departments)
    }

    async fn document_types(&self) -> Result<Vec<String>, GatewayError> {
        let url = self.endpoint(&["api", "settings", "document-types"])?;
        let response: DocumentTypesResponse = self.send_json(self.http.get(url)).await?;
        Ok(response.document_types)
    }

    async fn available_models(&self) -> Result<ModelsResponse, GatewayError> {
        let url = self.endpoint(&["api", "summary", "models"])?;
        self.send_json(self.http.get(url)).await
    }
}

#[cfg(test)]
#[path = "tests/gateway_tests.rs"]
mod tests;
