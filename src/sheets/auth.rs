use crate::config::ServiceAccountKey;
use crate::error::AppError;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use jsonwebtoken::{encode, Algorithm, EncodingKey, Header};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tokio::sync::OnceCell;
use tracing::debug;

pub const SHEETS_SCOPE: &str = "https://www.googleapis.com/auth/spreadsheets";
const JWT_BEARER_GRANT: &str = "urn:ietf:params:oauth:grant-type:jwt-bearer";
const ASSERTION_LIFETIME_SECS: i64 = 3600;

/// Supplies OAuth access tokens for spreadsheet calls.
#[async_trait]
pub trait TokenSource: Send + Sync {
    async fn access_token(&self) -> Result<String, AppError>;
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssertionClaims {
    pub iss: String,
    pub scope: String,
    pub aud: String,
    pub iat: i64,
    pub exp: i64,
}

impl AssertionClaims {
    pub fn new(key: &ServiceAccountKey, now: DateTime<Utc>) -> Self {
        let iat = now.timestamp();
        Self {
            iss: key.client_email.clone(),
            scope: SHEETS_SCOPE.to_string(),
            aud: key.token_uri.clone(),
            iat,
            exp: iat + ASSERTION_LIFETIME_SECS,
        }
    }
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    expires_in: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct TokenErrorBody {
    #[serde(default)]
    error: String,
    #[serde(default)]
    error_description: Option<String>,
}

/// Exchanges a signed service-account assertion for an access token.
/// The token is fetched once and reused for the rest of the run.
pub struct ServiceAccountTokenSource {
    client: Client,
    key: ServiceAccountKey,
    encoding_key: EncodingKey,
    token: OnceCell<String>,
}

impl ServiceAccountTokenSource {
    pub fn new(client: Client, key: ServiceAccountKey) -> Result<Self, AppError> {
        let encoding_key = key.encoding_key()?;
        Ok(Self {
            client,
            key,
            encoding_key,
            token: OnceCell::new(),
        })
    }

    pub fn client_email(&self) -> &str {
        &self.key.client_email
    }

    fn assertion(&self, now: DateTime<Utc>) -> Result<String, AppError> {
        let mut header = Header::new(Algorithm::RS256);
        header.kid = self.key.private_key_id.clone();
        let claims = AssertionClaims::new(&self.key, now);
        Ok(encode(&header, &claims, &self.encoding_key)?)
    }

    async fn exchange(&self) -> Result<String, AppError> {
        let assertion = self.assertion(Utc::now())?;
        let response = self
            .client
            .post(&self.key.token_uri)
            .form(&[
                ("grant_type", JWT_BEARER_GRANT),
                ("assertion", assertion.as_str()),
            ])
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body: TokenErrorBody = response.json().await.unwrap_or_default();
            return Err(match status.as_u16() {
                400 | 401 | 403 => AppError::Unauthorized(format!(
                    "token endpoint rejected service account {} ({} {}); check GOOGLE_SERVICE_ACCOUNT_JSON",
                    self.key.client_email,
                    body.error,
                    body.error_description.unwrap_or_default()
                )),
                code => AppError::Status {
                    context: "service-account token exchange".into(),
                    status: code,
                },
            });
        }

        let token: TokenResponse = response.json().await.map_err(|source| AppError::Decode {
            context: "service-account token exchange".into(),
            source,
        })?;
        debug!(expires_in = ?token.expires_in, "obtained spreadsheet access token");
        Ok(token.access_token)
    }
}

#[async_trait]
impl TokenSource for ServiceAccountTokenSource {
    async fn access_token(&self) -> Result<String, AppError> {
        self.token
            .get_or_try_init(|| self.exchange())
            .await
            .cloned()
    }
}
