/// Schema bootstrap for the user tables
///
/// Creates the three tables the user store reads and writes. Every statement is
/// `CREATE TABLE IF NOT EXISTS`, so running the migrations against an existing
/// database is a no-op.
///
/// # Tables
///
/// ```sql
/// CREATE TABLE user (
///     id UUID,
///     created_at UInt32,
///     updated_at UInt32,
///     is_deleted UInt8,
///     sign Int8,
///     version Int64,
///     ...dynamic property columns
/// ) ENGINE = ReplacingMergeTree(version) ORDER BY id;
///
/// CREATE TABLE user_alias (id UUID, user_id UUID, alias String)
///     ENGINE = ReplacingMergeTree ORDER BY (user_id, alias);
///
/// CREATE TABLE user_property_time (user_id UUID, property String, timestamp DateTime64(3))
///     ENGINE = MergeTree ORDER BY (user_id, property, timestamp);
/// ```
///
/// Property columns on `user` are owned by the host application and added
/// with `ALTER TABLE`; the store discovers them through `get_columns`.
///
/// # Example
///
/// ```no_run
/// use userstore_shared::config::ClickHouseConfig;
/// use userstore_shared::db::client::ClickHouseClient;
/// use userstore_shared::db::migrations::run_migrations;
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let client = ClickHouseClient::new(ClickHouseConfig::from_env()?)?;
/// run_migrations(&client).await?;
/// # Ok(())
/// # }
/// ```

use tracing::{info, warn};

use crate::db::client::StorageClient;
use crate::error::StoreResult;

/// Table holding versioned user rows
pub const USER_TABLE: &str = "user";

/// Table mapping alias strings to user ids
pub const USER_ALIAS_TABLE: &str = "user_alias";

/// Table recording when a property was last written per user
pub const USER_PROPERTY_TIME_TABLE: &str = "user_property_time";

const CREATE_USER: &str = r#"
CREATE TABLE IF NOT EXISTS `user`
(
    id UUID,
    created_at UInt32 DEFAULT toUnixTimestamp(now()),
    updated_at UInt32 DEFAULT toUnixTimestamp(now()),
    is_deleted UInt8 DEFAULT 0,
    sign Int8 DEFAULT 1,
    version Int64 DEFAULT 0
)
ENGINE = ReplacingMergeTree(version)
ORDER BY id
"#;

const CREATE_USER_ALIAS: &str = r#"
CREATE TABLE IF NOT EXISTS `user_alias`
(
    id UUID,
    user_id UUID,
    alias String
)
ENGINE = ReplacingMergeTree
ORDER BY (user_id, alias)
"#;

const CREATE_USER_PROPERTY_TIME: &str = r#"
CREATE TABLE IF NOT EXISTS `user_property_time`
(
    user_id UUID,
    property String,
    timestamp DateTime64(3) DEFAULT now64(3)
)
ENGINE = MergeTree
ORDER BY (user_id, property, timestamp)
"#;

/// Migrations in the order they must be applied
pub const MIGRATIONS: &[(&str, &str)] = &[
    (USER_TABLE, CREATE_USER),
    (USER_ALIAS_TABLE, CREATE_USER_ALIAS),
    (USER_PROPERTY_TIME_TABLE, CREATE_USER_PROPERTY_TIME),
];

/// Creates any missing user tables
///
/// # Errors
///
/// Returns the first storage error encountered; statements after it are not run.
pub async fn run_migrations(client: &dyn StorageClient) -> StoreResult<()> {
    info!("Starting user store migrations");

    for (table, statement) in MIGRATIONS {
        if let Err(e) = client.execute(statement).await {
            warn!(table, error = %e, "Migration failed");
            return Err(e);
        }
        info!(table, "Table ensured");
    }

    info!("All user store migrations completed successfully");
    Ok(())
}
