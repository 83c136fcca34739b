//! Enrichment and opportunity collaborators.
//!
//! The pipeline only sees the two traits. The HTTP implementations talk to
//! JSON services behind a circuit breaker; tests plug in in-memory fakes.

use crate::circuit_breaker::{
    breaker_error, counts_as_failure, create_provider_circuit_breaker, ProviderCircuitBreaker,
};
use crate::classifier::OpportunityClassifier;
use crate::errors::PipelineError;
use crate::models::{CompanyMetadata, OpportunityReport};
use async_trait::async_trait;
use failsafe::futures::CircuitBreaker;
use reqwest::StatusCode;
use std::time::Duration;

/// Looks up firmographic metadata for a company.
#[async_trait]
pub trait EnrichmentProvider: Send + Sync {
    /// # Errors
    ///
    /// * `NoData` - empty company name or no record for the company.
    /// * `Provider` / `Timeout` - the source could not be reached.
    async fn fetch(&self, company_name: &str) -> Result<CompanyMetadata, PipelineError>;
}

/// Looks up recent news and social signals for a company.
///
/// Infallible from the pipeline's point of view: an unreachable source yields
/// an empty report.
#[async_trait]
pub trait OpportunityProvider: Send + Sync {
    async fn fetch(&self, company_name: &str) -> OpportunityReport;
}

fn build_client(collaborator: &str) -> Result<reqwest::Client, PipelineError> {
    reqwest::Client::builder()
        .timeout(Duration::from_secs(30))
        .build()
        .map_err(|e| {
            PipelineError::Provider(format!("Failed to create {} client: {}", collaborator, e))
        })
}

fn authorize(request: reqwest::RequestBuilder, api_key: Option<&str>) -> reqwest::RequestBuilder {
    match api_key {
        Some(key) => request.header("Authorization", format!("Bearer {}", key)),
        None => request,
    }
}

async fn error_body(response: reqwest::Response) -> String {
    response
        .text()
        .await
        .unwrap_or_else(|_| "Unknown error".to_string())
}

// ============ Enrichment ============

/// Fetches company metadata from `GET {base_url}/companies?name=...`.
pub struct HttpEnrichmentProvider {
    client: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
    breaker: ProviderCircuitBreaker,
}

impl HttpEnrichmentProvider {
    /// Creates a new `HttpEnrichmentProvider`.
    ///
    /// # Arguments
    ///
    /// * `base_url` - Root URL of the enrichment service.
    /// * `api_key` - Optional bearer token.
    pub fn new(base_url: &str, api_key: Option<String>) -> Result<Self, PipelineError> {
        Ok(Self {
            client: build_client("enrichment")?,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key,
            breaker: create_provider_circuit_breaker(),
        })
    }

    async fn request(&self, company_name: &str) -> Result<CompanyMetadata, PipelineError> {
        let url = reqwest::Url::parse_with_params(
            &format!("{}/companies", self.base_url),
            &[("name", company_name)],
        )
        .map_err(|e| PipelineError::Provider(format!("Invalid enrichment URL: {}", e)))?;

        tracing::info!("Fetching company metadata for '{}'", company_name);

        let response = authorize(self.client.get(url), self.api_key.as_deref())
            .send()
            .await?;

        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            return Err(PipelineError::NoData(format!(
                "no enrichment record for '{}'",
                company_name
            )));
        }
        if !status.is_success() {
            let error_text = error_body(response).await;
            return Err(PipelineError::Provider(format!(
                "Enrichment service returned {}: {}",
                status, error_text
            )));
        }

        let metadata: CompanyMetadata = response.json().await.map_err(|e| {
            PipelineError::Provider(format!("Failed to parse enrichment response: {}", e))
        })?;

        tracing::info!("✓ Metadata received for '{}' ({})", company_name, metadata.industry);
        Ok(metadata)
    }
}

#[async_trait]
impl EnrichmentProvider for HttpEnrichmentProvider {
    async fn fetch(&self, company_name: &str) -> Result<CompanyMetadata, PipelineError> {
        let company_name = company_name.trim();
        if company_name.is_empty() {
            return Err(PipelineError::NoData("no company name provided".to_string()));
        }

        self.breaker
            .call_with(counts_as_failure, self.request(company_name))
            .await
            .map_err(|e| breaker_error(e, "enrichment"))
    }
}

// ============ Opportunities ============

/// Fetches opportunity reports from `GET {base_url}/opportunities?company=...`.
///
/// News items that arrive without a category are labelled with the
/// [`OpportunityClassifier`].
pub struct HttpOpportunityProvider {
    client: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
    breaker: ProviderCircuitBreaker,
    classifier: OpportunityClassifier,
}

impl HttpOpportunityProvider {
    pub fn new(base_url: &str, api_key: Option<String>) -> Result<Self, PipelineError> {
        Ok(Self {
            client: build_client("opportunity")?,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key,
            breaker: create_provider_circuit_breaker(),
            classifier: OpportunityClassifier::default(),
        })
    }

    pub fn with_classifier(mut self, classifier: OpportunityClassifier) -> Self {
        self.classifier = classifier;
        self
    }

    async fn request(&self, company_name: &str) -> Result<OpportunityReport, PipelineError> {
        let url = reqwest::Url::parse_with_params(
            &format!("{}/opportunities", self.base_url),
            &[("company", company_name)],
        )
        .map_err(|e| PipelineError::Provider(format!("Invalid opportunity URL: {}", e)))?;

        let response = authorize(self.client.get(url), self.api_key.as_deref())
            .send()
            .await?;

        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            return Ok(OpportunityReport::default());
        }
        if !status.is_success() {
            let error_text = error_body(response).await;
            return Err(PipelineError::Provider(format!(
                "Opportunity service returned {}: {}",
                status, error_text
            )));
        }

        response.json().await.map_err(|e| {
            PipelineError::Provider(format!("Failed to parse opportunity response: {}", e))
        })
    }

    fn classify_unlabelled(&self, report: &mut OpportunityReport) {
        for item in report
            .news_items
            .iter_mut()
            .filter(|item| item.opportunity_type.trim().is_empty())
        {
            let text = [
                item.title.as_str(),
                item.snippet.as_str(),
                item.opportunity_summary.as_str(),
                item.opportunity_details.as_str(),
            ]
            .join(" ");
            if let Some(label) = self.classifier.classify(&text) {
                item.opportunity_type = label.to_string();
            }
        }
    }
}

#[async_trait]
impl OpportunityProvider for HttpOpportunityProvider {
    async fn fetch(&self, company_name: &str) -> OpportunityReport {
        let company_name = company_name.trim();
        if company_name.is_empty() {
            return OpportunityReport::default();
        }

        let result = self
            .breaker
            .call_with(counts_as_failure, self.request(company_name))
            .await
            .map_err(|e| breaker_error(e, "opportunity"));

        match result {
            Ok(mut report) => {
                self.classify_unlabelled(&mut report);
                tracing::info!(
                    "✓ {} news item(s) and {} post(s) for '{}'",
                    report.news_items.len(),
                    report.linkedin_posts.len(),
                    company_name
                );
                report
            }
            Err(e) => {
                tracing::warn!("Opportunity lookup for '{}' failed: {}", company_name, e);
                OpportunityReport::default()
            }
        }
    }
}
