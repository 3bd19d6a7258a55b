/// Storage engine contract and the ClickHouse HTTP implementation
///
/// The user store talks to its columnar backend through the [`StorageClient`]
/// trait: parameterized reads returning one JSON object per row, and batched
/// appends of open-ended JSON rows. [`ClickHouseClient`] implements it over the
/// ClickHouse HTTP interface using `JSONEachRow` in both directions.
///
/// The handle is cheap to clone (the underlying `reqwest::Client` is pooled
/// and reference counted) and is meant to be built once and shared.
///
/// # Example
///
/// ```no_run
/// use userstore_shared::config::ClickHouseConfig;
/// use userstore_shared::db::client::{ClickHouseClient, StorageClient};
/// use userstore_shared::db::params::QueryParams;
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let client = ClickHouseClient::new(ClickHouseConfig::from_env()?)?;
///
/// if client.ping().await? {
///     let rows = client
///         .query("SELECT {n:String} AS greeting", &QueryParams::new().string("n", "hi"))
///         .await?;
///     println!("{:?}", rows);
/// }
/// # Ok(())
/// # }
/// ```

use async_trait::async_trait;
use reqwest::{Client, StatusCode, Url};
use serde_json::{Map, Value};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

use crate::config::ClickHouseConfig;
use crate::db::params::QueryParams;
use crate::error::{StoreError, StoreResult};

/// One row as exchanged with the store: column name to JSON value
pub type Row = Map<String, Value>;

/// Minimal contract the user store needs from its backend
#[async_trait]
pub trait StorageClient: Send + Sync {
    /// Runs a read query with server-side bound parameters
    async fn query(&self, query: &str, params: &QueryParams) -> StoreResult<Vec<Row>>;

    /// Appends a batch of rows to `table`
    ///
    /// The batch succeeds or fails as a whole.
    async fn insert(&self, table: &str, rows: Vec<Row>) -> StoreResult<()>;

    /// Runs a statement that returns no rows (DDL)
    async fn execute(&self, statement: &str) -> StoreResult<()>;

    /// Returns `true` if the server answers its health endpoint
    async fn ping(&self) -> StoreResult<bool>;
}

/// ClickHouse HTTP interface client
#[derive(Clone)]
pub struct ClickHouseClient {
    http: Client,
    base_url: Url,
    config: Arc<ClickHouseConfig>,
}

impl ClickHouseClient {
    /// Builds a client for the configured server
    ///
    /// No request is made; use [`StorageClient::ping`] to check connectivity.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Config`] if the URL is invalid or the HTTP client
    /// cannot be constructed.
    pub fn new(config: ClickHouseConfig) -> StoreResult<Self> {
        let base_url = parse_base_url(&config.url)?;

        let http = Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()
            .map_err(|e| StoreError::Config(format!("Failed to build HTTP client: {}", e)))?;

        info!(
            url = %sanitize_url(&config.url),
            database = %config.database,
            "ClickHouse client initialized"
        );

        Ok(Self {
            http,
            base_url,
            config: Arc::new(config),
        })
    }

    fn post(&self, settings: &[(String, String)]) -> reqwest::RequestBuilder {
        self.http
            .post(self.base_url.clone())
            .header("X-ClickHouse-User", &self.config.user)
            .header("X-ClickHouse-Key", &self.config.password)
            .query(&[("database", self.config.database.as_str())])
            .query(settings)
    }

    async fn send(&self, request: reqwest::RequestBuilder) -> StoreResult<String> {
        let response = request.send().await.map_err(|e| {
            error!(error = %e, "ClickHouse request failed");
            StoreError::from(e)
        })?;

        let status = response.status();
        let body = response.text().await?;

        if status.is_success() {
            Ok(body)
        } else {
            warn!(status = status.as_u16(), "ClickHouse rejected request");
            Err(StoreError::Query {
                status: status.as_u16(),
                message: body.trim().to_string(),
            })
        }
    }
}

#[async_trait]
impl StorageClient for ClickHouseClient {
    async fn query(&self, query: &str, params: &QueryParams) -> StoreResult<Vec<Row>> {
        debug!(params = params.len(), "Executing ClickHouse query");

        let mut settings = vec![
            ("default_format".to_string(), "JSONEachRow".to_string()),
            (
                "output_format_json_quote_64bit_integers".to_string(),
                "0".to_string(),
            ),
        ];
        settings.extend(params.to_http_pairs());

        let body = self
            .send(self.post(&settings).body(query.to_string()))
            .await?;

        let rows = parse_json_each_row(&body)?;
        debug!(rows = rows.len(), "ClickHouse query returned");
        Ok(rows)
    }

    async fn insert(&self, table: &str, rows: Vec<Row>) -> StoreResult<()> {
        if rows.is_empty() {
            debug!(table, "Skipping empty insert");
            return Ok(());
        }

        let count = rows.len();
        let statement = format!("INSERT INTO {} FORMAT JSONEachRow", quote_identifier(table));
        let payload = encode_json_each_row(rows)?;

        debug!(table, rows = count, "Inserting rows into ClickHouse");
        self.send(self.post(&[("query".to_string(), statement)]).body(payload))
            .await?;
        Ok(())
    }

    async fn execute(&self, statement: &str) -> StoreResult<()> {
        debug!("Executing ClickHouse statement");
        self.send(self.post(&[]).body(statement.to_string())).await?;
        Ok(())
    }

    async fn ping(&self) -> StoreResult<bool> {
        let url = self
            .base_url
            .join("ping")
            .map_err(|e| StoreError::Config(format!("Invalid ClickHouse URL: {}", e)))?;
        debug!(url = %url, "Pinging ClickHouse");

        let response = self.http.get(url).send().await?;
        let status = response.status();
        let body = response.text().await?;

        if status == StatusCode::OK && body.trim() == "Ok." {
            debug!("ClickHouse health check: Ok. received");
            Ok(true)
        } else {
            warn!(
                status = status.as_u16(),
                response = body.trim(),
                "ClickHouse health check: unexpected response"
            );
            Ok(false)
        }
    }
}

/// Parses the configured URL so that relative joins stay under its path
///
/// `http://proxy/clickhouse` becomes `http://proxy/clickhouse/`; without the
/// trailing slash `join("ping")` would replace the last segment.
fn parse_base_url(raw: &str) -> StoreResult<Url> {
    let mut url = Url::parse(raw)
        .map_err(|e| StoreError::Config(format!("Invalid ClickHouse URL: {}", e)))?;
    if url.cannot_be_a_base() {
        return Err(StoreError::Config(format!("Invalid ClickHouse URL: {}", raw)));
    }
    if !url.path().ends_with('/') {
        let path = format!("{}/", url.path());
        url.set_path(&path);
    }
    Ok(url)
}

/// Quotes a table or column name with backticks
pub(crate) fn quote_identifier(name: &str) -> String {
    format!("`{}`", name.replace('\\', "\\\\").replace('`', "\\`"))
}

fn parse_json_each_row(body: &str) -> StoreResult<Vec<Row>> {
    body.lines()
        .filter(|line| !line.trim().is_empty())
        .map(|line| serde_json::from_str::<Row>(line).map_err(StoreError::from))
        .collect()
}

fn encode_json_each_row(rows: Vec<Row>) -> StoreResult<String> {
    let mut payload = String::new();
    for row in rows {
        payload.push_str(&serde_json::to_string(&Value::Object(row))?);
        payload.push('\n');
    }
    Ok(payload)
}

/// Replaces `user:password@` in a URL with `***:***@` for logging.
fn sanitize_url(url: &str) -> String {
    if let Some(at_pos) = url.find('@') {
        if let Some(scheme_end) = url.find("://") {
            let scheme = &url[..scheme_end + 3];
            let host = &url[at_pos + 1..];
            return format!("{}***:***@{}", scheme, host);
        }
    }
    url.to_string()
}
