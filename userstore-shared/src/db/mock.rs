/// Recording in-memory storage client for tests
///
/// `MockClient` implements [`StorageClient`] without a server. It:
/// - records every query (text and bound parameters), insert and statement
/// - answers queries from a FIFO of canned row sets (empty when none queued)
/// - fails the next call of any kind when primed with [`MockClient::fail_next`]
///
/// It does not interpret SQL. Tests queue the rows the real engine would
/// return and assert on what the store sent.
///
/// # Example
///
/// ```
/// use serde_json::json;
/// use userstore_shared::db::client::StorageClient;
/// use userstore_shared::db::mock::MockClient;
/// use userstore_shared::db::params::QueryParams;
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let client = MockClient::new();
/// client.push_rows(vec![json!({"name": "id"})]).await;
///
/// let rows = client.query("DESCRIBE TABLE `user`", &QueryParams::new()).await?;
/// assert_eq!(rows.len(), 1);
/// assert_eq!(client.queries().await[0].query, "DESCRIBE TABLE `user`");
/// # Ok(())
/// # }
/// ```

use async_trait::async_trait;
use serde_json::Value;
use std::collections::VecDeque;
use tokio::sync::Mutex;

use crate::db::client::{Row, StorageClient};
use crate::db::params::QueryParams;
use crate::error::{StoreError, StoreResult};

/// A query the mock received
#[derive(Debug, Clone)]
pub struct RecordedQuery {
    pub query: String,
    pub params: QueryParams,
}

/// An insert the mock received
#[derive(Debug, Clone)]
pub struct RecordedInsert {
    pub table: String,
    pub rows: Vec<Row>,
}

#[derive(Default)]
struct MockState {
    responses: VecDeque<Vec<Row>>,
    failures: VecDeque<StoreError>,
    queries: Vec<RecordedQuery>,
    inserts: Vec<RecordedInsert>,
    executed: Vec<String>,
    healthy: bool,
}

/// In-memory [`StorageClient`] that records calls
pub struct MockClient {
    state: Mutex<MockState>,
}

impl Default for MockClient {
    fn default() -> Self {
        Self::new()
    }
}

impl MockClient {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(MockState {
                healthy: true,
                ..Default::default()
            }),
        }
    }

    /// Queues the rows returned by the next query
    ///
    /// Non-object values are ignored.
    pub async fn push_rows(&self, rows: Vec<Value>) {
        let rows = rows
            .into_iter()
            .filter_map(|v| match v {
                Value::Object(map) => Some(map),
                _ => None,
            })
            .collect();
        self.state.lock().await.responses.push_back(rows);
    }

    /// Makes the next call (of any kind) return `err`
    pub async fn fail_next(&self, err: StoreError) {
        self.state.lock().await.failures.push_back(err);
    }

    /// Sets what `ping` reports
    pub async fn set_healthy(&self, healthy: bool) {
        self.state.lock().await.healthy = healthy;
    }

    pub async fn queries(&self) -> Vec<RecordedQuery> {
        self.state.lock().await.queries.clone()
    }

    pub async fn inserts(&self) -> Vec<RecordedInsert> {
        self.state.lock().await.inserts.clone()
    }

    pub async fn executed(&self) -> Vec<String> {
        self.state.lock().await.executed.clone()
    }
}

#[async_trait]
impl StorageClient for MockClient {
    async fn query(&self, query: &str, params: &QueryParams) -> StoreResult<Vec<Row>> {
        let mut state = self.state.lock().await;
        state.queries.push(RecordedQuery {
            query: query.to_string(),
            params: params.clone(),
        });
        if let Some(err) = state.failures.pop_front() {
            return Err(err);
        }
        Ok(state.responses.pop_front().unwrap_or_default())
    }

    async fn insert(&self, table: &str, rows: Vec<Row>) -> StoreResult<()> {
        let mut state = self.state.lock().await;
        state.inserts.push(RecordedInsert {
            table: table.to_string(),
            rows,
        });
        match state.failures.pop_front() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    async fn execute(&self, statement: &str) -> StoreResult<()> {
        let mut state = self.state.lock().await;
        state.executed.push(statement.to_string());
        match state.failures.pop_front() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    async fn ping(&self) -> StoreResult<bool> {
        let mut state = self.state.lock().await;
        if let Some(err) = state.failures.pop_front() {
            return Err(err);
        }
        Ok(state.healthy)
    }
}
