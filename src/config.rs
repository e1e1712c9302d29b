use crate::error::AppError;
use crate::models::LookbackWindow;
use chrono::Utc;
use jsonwebtoken::EncodingKey;
use serde::Deserialize;
use std::collections::HashMap;
use std::fmt;

pub const SHEET_ID_VAR: &str = "GOOGLE_SHEET_ID";
pub const ADMIN_KEY_VAR: &str = "ANTHROPIC_ADMIN_KEY";
pub const SERVICE_ACCOUNT_VAR: &str = "GOOGLE_SERVICE_ACCOUNT_JSON";
pub const LOOKBACK_HOURS_VAR: &str = "LOOKBACK_HOURS";

pub const DEFAULT_LOOKBACK_HOURS: i64 = 24;
pub const DEFAULT_API_BASE_URL: &str = "https://api.anthropic.com";
pub const DEFAULT_USAGE_ENDPOINT: &str = "/v1/organizations/usage_report/messages";
pub const DEFAULT_COST_ENDPOINT: &str = "/v1/organizations/cost_report";
pub const DEFAULT_API_VERSION: &str = "2023-06-01";
pub const DEFAULT_SHEETS_BASE_URL: &str = "https://sheets.googleapis.com";
pub const DEFAULT_TOKEN_URI: &str = "https://oauth2.googleapis.com/token";

/// Environment as read by the `config` crate. Keys arrive lowercased.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RawEnv {
    google_sheet_id: Option<String>,
    anthropic_admin_key: Option<String>,
    google_service_account_json: Option<String>,
    dry_run: Option<bool>,
    lookback_hours: Option<i64>,
    anthropic_base_url: Option<String>,
    anthropic_usage_endpoint: Option<String>,
    anthropic_cost_endpoint: Option<String>,
    anthropic_version: Option<String>,
    google_sheets_base_url: Option<String>,
}

#[derive(Clone)]
pub struct Settings {
    pub sheet_id: String,
    pub admin_key: String,
    pub service_account: ServiceAccountKey,
    pub dry_run: bool,
    pub lookback_hours: i64,
    pub api_base_url: String,
    pub usage_endpoint: String,
    pub cost_endpoint: String,
    pub api_version: String,
    pub sheets_base_url: String,
}

impl fmt::Debug for Settings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Settings")
            .field("sheet_id", &self.sheet_id)
            .field("admin_key", &"<redacted>")
            .field("service_account", &self.service_account)
            .field("dry_run", &self.dry_run)
            .field("lookback_hours", &self.lookback_hours)
            .field("api_base_url", &self.api_base_url)
            .field("usage_endpoint", &self.usage_endpoint)
            .field("cost_endpoint", &self.cost_endpoint)
            .field("api_version", &self.api_version)
            .field("sheets_base_url", &self.sheets_base_url)
            .finish()
    }
}

impl Settings {
    pub fn from_env() -> Result<Self, AppError> {
        Self::load(None)
    }

    /// Loads from an explicit variable map instead of the process environment.
    pub fn from_vars(vars: HashMap<String, String>) -> Result<Self, AppError> {
        Self::load(Some(vars))
    }

    fn load(vars: Option<HashMap<String, String>>) -> Result<Self, AppError> {
        let source = config::Environment::default()
            .ignore_empty(true)
            .source(vars.map(|v| v.into_iter().collect()));

        let raw: RawEnv = config::Config::builder()
            .add_source(source)
            .build()
            .and_then(|c| c.try_deserialize::<RawEnv>())
            .map_err(|e| AppError::Config(format!("invalid environment: {e}")))?;

        Self::from_raw(raw)
    }

    fn from_raw(raw: RawEnv) -> Result<Self, AppError> {
        let sheet_id = required(raw.google_sheet_id, SHEET_ID_VAR)?;
        let admin_key = required(raw.anthropic_admin_key, ADMIN_KEY_VAR)?;
        let service_account_raw = required(raw.google_service_account_json, SERVICE_ACCOUNT_VAR)?;
        let service_account = ServiceAccountKey::parse(&service_account_raw)?;

        let lookback_hours = raw.lookback_hours.unwrap_or(DEFAULT_LOOKBACK_HOURS);
        validate_lookback(lookback_hours)?;

        Ok(Self {
            sheet_id,
            admin_key,
            service_account,
            dry_run: raw.dry_run.unwrap_or(false),
            lookback_hours,
            api_base_url: raw
                .anthropic_base_url
                .unwrap_or_else(|| DEFAULT_API_BASE_URL.into()),
            usage_endpoint: raw
                .anthropic_usage_endpoint
                .unwrap_or_else(|| DEFAULT_USAGE_ENDPOINT.into()),
            cost_endpoint: raw
                .anthropic_cost_endpoint
                .unwrap_or_else(|| DEFAULT_COST_ENDPOINT.into()),
            api_version: raw
                .anthropic_version
                .unwrap_or_else(|| DEFAULT_API_VERSION.into()),
            sheets_base_url: raw
                .google_sheets_base_url
                .unwrap_or_else(|| DEFAULT_SHEETS_BASE_URL.into()),
        })
    }
}

fn required(value: Option<String>, name: &str) -> Result<String, AppError> {
    match value {
        Some(v) if !v.trim().is_empty() => Ok(v.trim().to_string()),
        _ => Err(AppError::Config(format!(
            "missing required environment variable {name}"
        ))),
    }
}

fn validate_lookback(hours: i64) -> Result<(), AppError> {
    if hours <= 0 {
        return Err(AppError::Config(format!(
            "{LOOKBACK_HOURS_VAR} must be greater than zero (got {hours})"
        )));
    }
    LookbackWindow::ending_at(Utc::now(), hours)?;
    Ok(())
}

fn default_token_uri() -> String {
    DEFAULT_TOKEN_URI.to_string()
}

/// The subset of a Google service-account key file needed for the JWT bearer grant.
#[derive(Clone, Deserialize)]
pub struct ServiceAccountKey {
    pub client_email: String,
    pub private_key: String,
    #[serde(default)]
    pub private_key_id: Option<String>,
    #[serde(default = "default_token_uri")]
    pub token_uri: String,
}

impl fmt::Debug for ServiceAccountKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServiceAccountKey")
            .field("client_email", &self.client_email)
            .field("private_key", &"<redacted>")
            .field("private_key_id", &self.private_key_id)
            .field("token_uri", &self.token_uri)
            .finish()
    }
}

impl ServiceAccountKey {
    pub fn parse(raw: &str) -> Result<Self, AppError> {
        let key: ServiceAccountKey = serde_json::from_str(raw).map_err(|e| {
            AppError::Config(format!(
                "{SERVICE_ACCOUNT_VAR} is not a valid service-account credential document: {e}"
            ))
        })?;
        if key.client_email.trim().is_empty() {
            return Err(AppError::Config(format!(
                "{SERVICE_ACCOUNT_VAR} has an empty client_email"
            )));
        }
        key.encoding_key()?;
        Ok(key)
    }

    pub fn encoding_key(&self) -> Result<EncodingKey, AppError> {
        EncodingKey::from_rsa_pem(self.private_key.as_bytes()).map_err(|_| {
            AppError::Config(format!(
                "{SERVICE_ACCOUNT_VAR} private_key is not a PEM encoded RSA key"
            ))
        })
    }
}
