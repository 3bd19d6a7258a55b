/// Storage layer for the user store
///
/// This module provides the ClickHouse client, typed query parameters and the
/// schema bootstrap.
///
/// # Modules
///
/// - `client`: `StorageClient` contract and the ClickHouse HTTP implementation
/// - `params`: Named, typed query parameters
/// - `migrations`: `CREATE TABLE IF NOT EXISTS` for the user tables
/// - `mock`: Recording in-memory client for tests
///
/// # Example
///
/// ```no_run
/// use userstore_shared::config::ClickHouseConfig;
/// use userstore_shared::db::client::{ClickHouseClient, StorageClient};
/// use userstore_shared::db::migrations::run_migrations;
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let client = ClickHouseClient::new(ClickHouseConfig::from_env()?)?;
///     assert!(client.ping().await?);
///     run_migrations(&client).await?;
///     Ok(())
/// }
/// ```

pub mod client;
pub mod migrations;
pub mod mock;
pub mod params;

pub use client::{ClickHouseClient, Row, StorageClient};
pub use params::{QueryParam, QueryParams};
