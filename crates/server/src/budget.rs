use std::time::Duration;

use async_trait::async_trait;
use clarifier_core::flows::{BudgetError, BudgetEstimate, BudgetEstimator, BudgetRequest};
use reqwest::Client;

/// Calls `POST {base_url}/budget` on the budget estimation service.
#[derive(Clone, Debug)]
pub struct HttpBudgetClient {
    client: Client,
    endpoint: String,
}

impl HttpBudgetClient {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, reqwest::Error> {
        let client = Client::builder().timeout(timeout).build()?;
        let endpoint = format!("{}/budget", base_url.trim_end_matches('/'));
        Ok(Self { client, endpoint })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

#[async_trait]
impl BudgetEstimator for HttpBudgetClient {
    async fn estimate(&self, request: &BudgetRequest) -> Result<BudgetEstimate, BudgetError> {
        let response = self
            .client
            .post(&self.endpoint)
            .json(request)
            .send()
            .await
            .map_err(|error| BudgetError::Transport(error.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(BudgetError::Status { status: status.as_u16(), body });
        }

        response
            .json::<BudgetEstimate>()
            .await
            .map_err(|error| BudgetError::InvalidResponse(error.to_string()))
    }
}
