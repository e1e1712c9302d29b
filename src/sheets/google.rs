use crate::error::AppError;
use crate::models::Row;
use crate::sheets::auth::TokenSource;
use crate::sheets::SheetService;
use async_trait::async_trait;
use reqwest::{Client, Response};
use serde::Deserialize;
use serde_json::json;
use tracing::debug;
use url::Url;

#[derive(Debug, Deserialize)]
struct SpreadsheetMeta {
    #[serde(default)]
    sheets: Vec<SheetMeta>,
}

#[derive(Debug, Deserialize)]
struct SheetMeta {
    properties: SheetProperties,
}

#[derive(Debug, Deserialize)]
struct SheetProperties {
    title: String,
}

/// Sheets v4 REST client bound to a single spreadsheet.
pub struct GoogleSheetsClient {
    client: Client,
    base_url: Url,
    spreadsheet_id: String,
    identity: String,
    tokens: Box<dyn TokenSource>,
}

impl GoogleSheetsClient {
    /// `identity` is the account the spreadsheet has to be shared with; it only
    /// appears in error messages.
    pub fn new(
        client: Client,
        base_url: &str,
        spreadsheet_id: &str,
        identity: &str,
        tokens: Box<dyn TokenSource>,
    ) -> Result<Self, AppError> {
        let base_url = Url::parse(base_url)?;
        if base_url.cannot_be_a_base() {
            return Err(AppError::Config(format!(
                "spreadsheet base URL {base_url} cannot carry a path"
            )));
        }
        Ok(Self {
            client,
            base_url,
            spreadsheet_id: spreadsheet_id.to_string(),
            identity: identity.to_string(),
            tokens,
        })
    }

    fn url(&self, tail: &[&str]) -> Result<Url, AppError> {
        let mut url = self.base_url.clone();
        {
            let mut segments = url.path_segments_mut().map_err(|_| {
                AppError::Config(format!("spreadsheet base URL {} cannot carry a path", self.base_url))
            })?;
            segments.pop_if_empty().extend(["v4", "spreadsheets"]).extend(tail);
        }
        Ok(url)
    }

    async fn check(&self, response: Response, action: &str) -> Result<Response, AppError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        Err(self.access_error(status.as_u16(), &body, action))
    }

    fn access_error(&self, status: u16, body: &str, action: &str) -> AppError {
        let id = &self.spreadsheet_id;
        match status {
            404 => AppError::NotFound(format!(
                "spreadsheet {id} does not exist; check GOOGLE_SHEET_ID"
            )),
            401 | 403 => AppError::Unauthorized(format!(
                "spreadsheet {id} is not accessible to {}; share it with that address as an editor",
                self.identity
            )),
            400 if body.contains("not supported for this document") => AppError::NotFound(format!(
                "{id} is an uploaded Excel file, not a native spreadsheet; save it as a Google Sheet and use the new ID"
            )),
            _ => AppError::Status {
                context: format!("spreadsheet {action}"),
                status,
            },
        }
    }
}

/// Quoted A1 tab reference.
fn a1_tab(title: &str) -> String {
    format!("'{}'", title.replace('\'', "''"))
}

#[async_trait]
impl SheetService for GoogleSheetsClient {
    async fn tab_titles(&self) -> Result<Vec<String>, AppError> {
        let token = self.tokens.access_token().await?;
        let url = self.url(&[self.spreadsheet_id.as_str()])?;
        debug!(%url, "reading spreadsheet metadata");

        let response = self
            .client
            .get(url)
            .bearer_auth(token)
            .query(&[("fields", "sheets.properties.title")])
            .send()
            .await?;
        let meta: SpreadsheetMeta = self
            .check(response, "lookup")
            .await?
            .json()
            .await
            .map_err(|source| AppError::Decode {
                context: format!("spreadsheet {} lookup", self.spreadsheet_id),
                source,
            })?;
        Ok(meta
            .sheets
            .into_iter()
            .map(|sheet| sheet.properties.title)
            .collect())
    }

    async fn add_tab(&self, title: &str) -> Result<(), AppError> {
        let token = self.tokens.access_token().await?;
        let url = self.url(&[format!("{}:batchUpdate", self.spreadsheet_id).as_str()])?;

        let response = self
            .client
            .post(url)
            .bearer_auth(token)
            .json(&json!({
                "requests": [{ "addSheet": { "properties": { "title": title } } }]
            }))
            .send()
            .await?;
        self.check(response, "tab creation").await?;
        Ok(())
    }

    async fn write_header(&self, title: &str, header: &[&str]) -> Result<(), AppError> {
        let token = self.tokens.access_token().await?;
        let range = format!("{}!A1", a1_tab(title));
        let url = self.url(&[self.spreadsheet_id.as_str(), "values", range.as_str()])?;

        let response = self
            .client
            .put(url)
            .bearer_auth(token)
            .query(&[("valueInputOption", "RAW")])
            .json(&json!({
                "range": range,
                "majorDimension": "ROWS",
                "values": [header],
            }))
            .send()
            .await?;
        self.check(response, "header write").await?;
        Ok(())
    }

    async fn append_rows(&self, title: &str, rows: &[Row]) -> Result<(), AppError> {
        let token = self.tokens.access_token().await?;
        let url = self.url(&[
            self.spreadsheet_id.as_str(),
            "values",
            format!("{}:append", a1_tab(title)).as_str(),
        ])?;

        let response = self
            .client
            .post(url)
            .bearer_auth(token)
            .query(&[
                ("valueInputOption", "RAW"),
                ("insertDataOption", "INSERT_ROWS"),
            ])
            .json(&json!({
                "majorDimension": "ROWS",
                "values": rows,
            }))
            .send()
            .await?;
        self.check(response, "append").await?;
        Ok(())
    }
}
