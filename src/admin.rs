use crate::config::Settings;
use crate::error::AppError;
use crate::mapper;
use crate::models::{LookbackWindow, ReportEntry};
use reqwest::Client;
use serde_json::Value;
use tracing::{debug, info, warn};

/// Read-only client for the admin usage and cost report endpoints.
pub struct AdminClient {
    client: Client,
    base_url: String,
    admin_key: String,
    api_version: String,
    usage_endpoint: String,
    cost_endpoint: String,
}

impl AdminClient {
    pub fn new(client: Client, settings: &Settings) -> Self {
        Self {
            client,
            base_url: settings.api_base_url.clone(),
            admin_key: settings.admin_key.clone(),
            api_version: settings.api_version.clone(),
            usage_endpoint: settings.usage_endpoint.clone(),
            cost_endpoint: settings.cost_endpoint.clone(),
        }
    }

    fn endpoint_url(&self, path: &str) -> String {
        format!("{}{}", self.base_url.trim_end_matches('/'), path)
    }

    pub async fn fetch_usage(&self, window: &LookbackWindow) -> Result<Vec<ReportEntry>, AppError> {
        let body = self.get_report(&self.usage_endpoint, window).await?;
        let entries = mapper::usage_entries(&body);
        info!(endpoint = %self.usage_endpoint, entries = entries.len(), "fetched usage report");
        Ok(entries)
    }

    pub async fn fetch_cost(&self, window: &LookbackWindow) -> Result<Vec<ReportEntry>, AppError> {
        let body = self.get_report(&self.cost_endpoint, window).await?;
        let entries = mapper::cost_entries(&body);
        info!(endpoint = %self.cost_endpoint, entries = entries.len(), "fetched cost report");
        Ok(entries)
    }

    async fn get_report(&self, endpoint: &str, window: &LookbackWindow) -> Result<Value, AppError> {
        let url = self.endpoint_url(endpoint);
        debug!(%url, start = %window.start, end = %window.end, "requesting report");

        let response = self
            .client
            .get(&url)
            .header("x-api-key", &self.admin_key)
            .header("anthropic-version", &self.api_version)
            .query(&window.query())
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(status_error(endpoint, status.as_u16()));
        }

        let body: Value = response.json().await.map_err(|source| AppError::Decode {
            context: format!("admin API request to {endpoint}"),
            source,
        })?;
        // Only the first page is consumed; cursors are not followed.
        if body.get("has_more").and_then(Value::as_bool) == Some(true) {
            warn!(
                endpoint,
                "report is paginated; rows beyond the first page are not synced"
            );
        }
        Ok(body)
    }
}

fn status_error(endpoint: &str, status: u16) -> AppError {
    match status {
        401 | 403 => AppError::Unauthorized(format!(
            "admin API rejected the key for {endpoint} (HTTP {status}); check that ANTHROPIC_ADMIN_KEY is an admin key with report access"
        )),
        404 => AppError::NotFound(format!(
            "admin API endpoint {endpoint} does not exist (HTTP 404); check ANTHROPIC_USAGE_ENDPOINT and ANTHROPIC_COST_ENDPOINT"
        )),
        _ => AppError::Status {
            context: format!("admin API request to {endpoint}"),
            status,
        },
    }
}
