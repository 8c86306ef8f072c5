pub mod auth;

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::{Method, Url};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::Config;
use crate::sheets::auth::TokenProvider;

/// Rows of a tab read as records: the first row names the columns.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Records {
    pub headers: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

impl Records {
    /// Build records from raw cell values. Short rows are padded and long rows
    /// cut to the header width.
    pub fn from_values(mut values: Vec<Vec<String>>) -> Self {
        if values.is_empty() {
            return Self::default();
        }
        let headers = values.remove(0);
        let width = headers.len();
        let rows = values
            .into_iter()
            .map(|mut row| {
                row.resize(width, String::new());
                row
            })
            .collect();
        Self { headers, rows }
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

/// The operations the handler needs from a spreadsheet
#[async_trait]
pub trait TableStore: Send + Sync {
    async fn clear(&self, tab: &str) -> Result<()>;
    async fn append_row(&self, tab: &str, row: &[String]) -> Result<()>;
    async fn read_records(&self, tab: &str) -> Result<Records>;
}

#[derive(Debug, Serialize)]
struct ValueRangeBody<'a> {
    values: [&'a [String]; 1],
}

#[derive(Debug, Deserialize)]
struct ValueRange {
    #[serde(default)]
    values: Vec<Vec<String>>,
}

/// Google Sheets v4 REST client authenticated as a service account
pub struct SheetsClient {
    http: reqwest::Client,
    tokens: TokenProvider,
    base_url: String,
    spreadsheet_id: String,
}

impl SheetsClient {
    pub fn new(config: &Config) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(config.http_timeout())
            .build()
            .context("Failed to build Sheets HTTP client")?;

        Ok(Self {
            tokens: TokenProvider::new(http.clone(), config.sheets.credentials_json.clone()),
            http,
            base_url: config.sheets.api_base_url.clone(),
            spreadsheet_id: config.sheets.spreadsheet_id.clone(),
        })
    }

    /// `{base}/spreadsheets/{id}/values/{'tab'}{suffix}`
    fn values_url(&self, tab: &str, suffix: &str) -> Result<Url> {
        if self.spreadsheet_id.is_empty() {
            anyhow::bail!("Spreadsheet id is not configured");
        }
        let mut url = Url::parse(&self.base_url)
            .with_context(|| format!("Invalid Sheets API URL: {}", self.base_url))?;
        let range = format!("{}{}", a1_sheet_name(tab), suffix);
        url.path_segments_mut()
            .map_err(|_| anyhow::anyhow!("Sheets API URL cannot be a base: {}", self.base_url))?
            .pop_if_empty()
            .extend(&["spreadsheets", self.spreadsheet_id.as_str(), "values", range.as_str()]);
        Ok(url)
    }

    async fn send(&self, method: Method, url: Url, body: Option<serde_json::Value>) -> Result<reqwest::Response> {
        let token = self.tokens.access_token().await?;

        debug!("Sheets {} {}", method, url.path());

        let mut request = self.http.request(method, url).bearer_auth(token);
        if let Some(body) = body {
            request = request.json(&body);
        }
        let response = request
            .send()
            .await
            .context("Failed to send request to Sheets API")?;

        let status = response.status();
        if !status.is_success() {
            let error_body = response.text().await.unwrap_or_default();
            anyhow::bail!("Sheets API error ({}): {}", status, error_body);
        }
        Ok(response)
    }
}

/// Quote a tab name for A1 notation so names with spaces resolve.
fn a1_sheet_name(tab: &str) -> String {
    format!("'{}'", tab.replace('\'', "''"))
}

#[async_trait]
impl TableStore for SheetsClient {
    async fn clear(&self, tab: &str) -> Result<()> {
        let url = self.values_url(tab, ":clear")?;
        self.send(Method::POST, url, Some(serde_json::json!({})))
            .await
            .with_context(|| format!("Failed to clear tab '{}'", tab))?;
        Ok(())
    }

    async fn append_row(&self, tab: &str, row: &[String]) -> Result<()> {
        let mut url = self.values_url(tab, ":append")?;
        // RAW stores cells as written: no formulas, no number or date coercion
        url.query_pairs_mut()
            .append_pair("valueInputOption", "RAW")
            .append_pair("insertDataOption", "INSERT_ROWS");
        let body = serde_json::to_value(ValueRangeBody { values: [row] })?;
        self.send(Method::POST, url, Some(body))
            .await
            .with_context(|| format!("Failed to append row to tab '{}'", tab))?;
        Ok(())
    }

    async fn read_records(&self, tab: &str) -> Result<Records> {
        let url = self.values_url(tab, "")?;
        let range: ValueRange = self
            .send(Method::GET, url, None)
            .await
            .with_context(|| format!("Failed to read tab '{}'", tab))?
            .json()
            .await
            .context("Failed to parse Sheets values response")?;
        Ok(Records::from_values(range.values))
    }
}
