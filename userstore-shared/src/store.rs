/// User store: lookups, writes and property-time bookkeeping
///
/// `UserStore` resolves users by id or alias, appends new user versions,
/// lists the `user` table's columns and records per-property write times.
/// It holds no state besides the injected storage handle; every call is one
/// independent request against the store, with errors propagated unchanged.
///
/// Writes never read first. `update` appends a new version of each row and
/// the latest version per `id` is what lookups return. Versions are ordered by
/// the `version` column, which the store stamps on every write and keeps
/// strictly increasing, so two writes within the same second still resolve to
/// the later one.
///
/// # Example
///
/// ```no_run
/// use std::sync::Arc;
/// use serde_json::json;
/// use userstore_shared::config::ClickHouseConfig;
/// use userstore_shared::db::client::ClickHouseClient;
/// use userstore_shared::models::user::UserPatch;
/// use userstore_shared::store::UserStore;
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let client = ClickHouseClient::new(ClickHouseConfig::from_env()?)?;
/// let store = UserStore::new(Arc::new(client));
///
/// let id = store.create().await?;
/// store
///     .update(vec![UserPatch::new(id).set("email", json!("ada@example.com"))])
///     .await?;
/// store.set_property_times(id, &["email"]).await?;
///
/// if let Some(user) = store.get_one(&id.to_string()).await? {
///     println!("{} updated at {}", user.id, user.updated_at);
/// }
/// # Ok(())
/// # }
/// ```

use chrono::Utc;
use serde_json::Value;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use tracing::{debug, info};
use uuid::Uuid;

use crate::db::client::{Row, StorageClient};
use crate::db::migrations::{USER_ALIAS_TABLE, USER_PROPERTY_TIME_TABLE, USER_TABLE};
use crate::db::params::QueryParams;
use crate::error::StoreResult;
use crate::models::property_time::{property_time_row, PropertyTimeRow, PropertyWinner};
use crate::models::reduce::latest_by_key;
use crate::models::user::{UserPatch, UserRecord};

/// Latest non-deleted version of each user matched by id or alias.
///
/// Versions are collapsed before the deletion filter so a tombstone always
/// hides older live versions.
const GET_USERS: &str = r#"
SELECT u.*, a.id AS alias_id
FROM
(
    SELECT *
    FROM `user`
    WHERE id IN {user_ids:Array(UUID)}
       OR id IN (SELECT user_id FROM `user_alias` WHERE alias IN {aliases:Array(String)})
    ORDER BY version DESC
    LIMIT 1 BY id
) AS u
LEFT JOIN `user_alias` AS a ON a.user_id = u.id
WHERE u.is_deleted = 0
ORDER BY a.alias IN {aliases:Array(String)} DESC, u.version DESC
LIMIT 1 BY u.id
"#;

const DESCRIBE_USER: &str = "DESCRIBE TABLE `user`";

/// Latest write per property across two users.
const MOST_RECENT_PROPERTIES: &str = r#"
SELECT
    user_id,
    property,
    toUnixTimestamp64Milli(timestamp) AS timestamp_ms
FROM `user_property_time`
WHERE user_id IN {user_ids:Array(UUID)}
ORDER BY timestamp DESC
LIMIT 1 BY property
"#;

/// CRUD access to users and their lookup tables
#[derive(Clone)]
pub struct UserStore {
    client: Arc<dyn StorageClient>,
}

impl UserStore {
    /// Creates a store over a shared storage handle
    pub fn new(client: Arc<dyn StorageClient>) -> Self {
        Self { client }
    }

    /// Checks that the storage backend is reachable
    pub async fn health_check(&self) -> StoreResult<bool> {
        self.client.ping().await
    }

    /// Resolves users by primary id or alias
    ///
    /// Each identifier may be a user id or an alias. Returns at most one record
    /// per distinct user (its latest version), never a deleted one, most
    /// recently updated first. Identifiers that are not UUIDs can only match
    /// as aliases. An empty input returns an empty result without a query.
    ///
    /// # Errors
    ///
    /// Returns the storage error if the query fails or a row cannot be decoded.
    pub async fn get<S: AsRef<str>>(&self, ids: &[S]) -> StoreResult<Vec<UserRecord>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        let aliases: Vec<String> = ids.iter().map(|s| s.as_ref().to_string()).collect();
        let user_ids: Vec<Uuid> = aliases
            .iter()
            .filter_map(|s| Uuid::parse_str(s).ok())
            .collect();

        debug!(
            identifiers = aliases.len(),
            uuids = user_ids.len(),
            "Looking up users"
        );

        let params = QueryParams::new()
            .uuid_array("user_ids", user_ids)
            .string_array("aliases", aliases);

        let rows = self.client.query(GET_USERS, &params).await?;
        let records = rows
            .into_iter()
            .map(UserRecord::from_row)
            .collect::<StoreResult<Vec<_>>>()?;

        let mut latest = latest_by_key(records, |r| r.id, |r| r.version);
        latest.retain(|r| !r.is_deleted());
        latest.sort_by(|a, b| {
            b.updated_at
                .cmp(&a.updated_at)
                .then_with(|| b.version.cmp(&a.version))
        });

        Ok(latest)
    }

    /// Resolves a single user by id or alias
    ///
    /// `None` when nothing matches.
    pub async fn get_one(&self, id: &str) -> StoreResult<Option<UserRecord>> {
        Ok(self.get(&[id]).await?.into_iter().next())
    }

    /// Creates a new user and returns its id
    ///
    /// Appends `{id, sign: 1, created_at, updated_at, version}` with both
    /// timestamps set to the current unix second.
    pub async fn create(&self) -> StoreResult<Uuid> {
        let id = Uuid::new_v4();
        let now = unix_now();

        let mut row = Row::new();
        row.insert("id".to_string(), Value::String(id.to_string()));
        row.insert("sign".to_string(), Value::from(1i8));
        row.insert("created_at".to_string(), Value::from(now));
        row.insert("updated_at".to_string(), Value::from(now));
        row.insert("version".to_string(), Value::from(next_version()));

        self.client.insert(USER_TABLE, vec![row]).await?;

        info!(user_id = %id, "User created");
        Ok(id)
    }

    /// Appends a new version for each patch in one batch
    ///
    /// Every row is stamped with the same `updated_at` (current unix second)
    /// and its own `version`, increasing in batch order, so a later patch for
    /// the same id wins. This is not a read-modify-write: columns absent from a patch are not
    /// carried over from the previous version. An empty batch is a no-op.
    pub async fn update(&self, patches: Vec<UserPatch>) -> StoreResult<()> {
        if patches.is_empty() {
            debug!("Empty user update, nothing to insert");
            return Ok(());
        }

        let now = unix_now();
        let count = patches.len();
        let rows: Vec<Row> = patches
            .into_iter()
            .map(|p| p.into_row(now, next_version()))
            .collect();

        self.client.insert(USER_TABLE, rows).await?;

        debug!(rows = count, updated_at = now, "Users updated");
        Ok(())
    }

    /// Lists the column names of the `user` table
    ///
    /// Reflects the schema at call time; nothing is cached.
    pub async fn get_columns(&self) -> StoreResult<Vec<String>> {
        let rows = self.client.query(DESCRIBE_USER, &QueryParams::new()).await?;

        Ok(rows
            .into_iter()
            .filter_map(|mut row| match row.remove("name") {
                Some(Value::String(name)) => Some(name),
                _ => None,
            })
            .collect())
    }

    /// Records that `properties` were just written for `user_id`
    ///
    /// One row per property; timestamps come from the column default.
    /// No request is made when `properties` is empty.
    pub async fn set_property_times<S: AsRef<str>>(
        &self,
        user_id: Uuid,
        properties: &[S],
    ) -> StoreResult<()> {
        if properties.is_empty() {
            return Ok(());
        }

        let rows: Vec<Row> = properties
            .iter()
            .map(|p| property_time_row(user_id, p.as_ref()))
            .collect();

        self.client.insert(USER_PROPERTY_TIME_TABLE, rows).await?;

        debug!(user_id = %user_id, properties = properties.len(), "Property times recorded");
        Ok(())
    }

    /// For each property recorded for either user, which one wrote it last
    ///
    /// Returns one entry per property name, sorted by name. Properties never
    /// recorded for either user are absent. On identical timestamps the first
    /// row returned by the store wins.
    pub async fn most_recent_user_properties(
        &self,
        user_a: Uuid,
        user_b: Uuid,
    ) -> StoreResult<Vec<PropertyWinner>> {
        let params = QueryParams::new().uuid_array("user_ids", vec![user_a, user_b]);

        let rows = self.client.query(MOST_RECENT_PROPERTIES, &params).await?;
        let times = rows
            .into_iter()
            .map(PropertyTimeRow::from_row)
            .collect::<StoreResult<Vec<_>>>()?;

        // Only the two candidates may win.
        let times: Vec<PropertyTimeRow> = times
            .into_iter()
            .filter(|t| t.user_id == user_a || t.user_id == user_b)
            .collect();

        let mut winners: Vec<PropertyWinner> =
            latest_by_key(times, |t| t.property.clone(), |t| t.timestamp_ms)
                .into_iter()
                .map(PropertyWinner::from)
                .collect();
        winners.sort_by(|a, b| a.property.cmp(&b.property));

        Ok(winners)
    }

    /// Links `alias` to `user_id` and returns the alias row id
    pub async fn add_alias(&self, user_id: Uuid, alias: &str) -> StoreResult<Uuid> {
        let id = Uuid::new_v4();

        let mut row = Row::new();
        row.insert("id".to_string(), Value::String(id.to_string()));
        row.insert("user_id".to_string(), Value::String(user_id.to_string()));
        row.insert("alias".to_string(), Value::String(alias.to_string()));

        self.client.insert(USER_ALIAS_TABLE, vec![row]).await?;

        debug!(user_id = %user_id, alias, "Alias added");
        Ok(id)
    }
}

fn unix_now() -> i64 {
    Utc::now().timestamp()
}

static LAST_VERSION: AtomicI64 = AtomicI64::new(0);

/// Wall-clock microseconds, bumped past the last value handed out
fn next_version() -> i64 {
    let now = Utc::now().timestamp_micros();
    let mut last = LAST_VERSION.load(Ordering::Relaxed);
    loop {
        let next = now.max(last + 1);
        match LAST_VERSION.compare_exchange_weak(last, next, Ordering::AcqRel, Ordering::Relaxed) {
            Ok(_) => return next,
            Err(actual) => last = actual,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::mock::MockClient;
    use crate::db::params::QueryParam;
    use crate::error::StoreError;
    use serde_json::json;

    fn store_with_mock() -> (UserStore, Arc<MockClient>) {
        let mock = Arc::new(MockClient::new());
        let store = UserStore::new(mock.clone());
        (store, mock)
    }

    fn user_row(id: Uuid, updated_at: i64, is_deleted: u8, extra: Value) -> Value {
        let mut row = json!({
            "id": id.to_string(),
            "alias_id": Uuid::nil().to_string(),
            "created_at": 1700000000,
            "updated_at": updated_at,
            "is_deleted": is_deleted,
            "sign": 1,
            "version": updated_at * 1_000_000
        });
        if let (Some(obj), Value::Object(extra)) = (row.as_object_mut(), extra) {
            obj.extend(extra);
        }
        row
    }

    #[tokio::test]
    async fn test_get_empty_input_issues_no_query() {
        let (store, mock) = store_with_mock();
        let empty: [&str; 0] = [];
        let users = store.get(&empty).await.unwrap();
        assert!(users.is_empty());
        assert!(mock.queries().await.is_empty());
    }

    #[tokio::test]
    async fn test_get_binds_uuids_and_aliases_separately() {
        let (store, mock) = store_with_mock();
        let id = Uuid::new_v4();

        store.get(&[id.to_string(), "crm-17".to_string()]).await.unwrap();

        let queries = mock.queries().await;
        assert_eq!(queries.len(), 1);
        let q = &queries[0];
        assert!(q.query.contains("{user_ids:Array(UUID)}"));
        assert!(q.query.contains("{aliases:Array(String)}"));
        assert!(q.query.contains("is_deleted = 0"));
        assert_eq!(q.params.get("user_ids"), Some(&QueryParam::UuidArray(vec![id])));
        assert_eq!(
            q.params.get("aliases"),
            Some(&QueryParam::StringArray(vec![
                id.to_string(),
                "crm-17".to_string()
            ]))
        );
    }

    #[tokio::test]
    async fn test_get_collapses_versions_and_drops_deleted() {
        let (store, mock) = store_with_mock();
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        let c = Uuid::new_v4();

        mock.push_rows(vec![
            user_row(a, 100, 0, json!({"name": "old"})),
            user_row(b, 300, 0, json!({})),
            user_row(a, 200, 0, json!({"name": "new"})),
            user_row(c, 150, 0, json!({})),
            user_row(c, 250, 1, json!({})),
        ])
        .await;

        let users = store
            .get(&[a.to_string(), b.to_string(), c.to_string()])
            .await
            .unwrap();

        let ids: Vec<Uuid> = users.iter().map(|u| u.id).collect();
        assert_eq!(ids, vec![b, a]);
        assert_eq!(users[1].property("name"), Some(&json!("new")));
    }

    #[tokio::test]
    async fn test_get_populates_alias_id() {
        let (store, mock) = store_with_mock();
        let id = Uuid::new_v4();
        let alias_id = Uuid::new_v4();
        let mut row = user_row(id, 10, 0, json!({}));
        row["alias_id"] = json!(alias_id.to_string());
        mock.push_rows(vec![row]).await;

        let user = store.get_one("crm-17").await.unwrap().unwrap();
        assert_eq!(user.id, id);
        assert_eq!(user.alias_id, Some(alias_id));
        assert!(mock.queries().await[0].query.contains("a.id AS alias_id"));
    }

    #[tokio::test]
    async fn test_get_user_without_alias_has_none() {
        let (store, mock) = store_with_mock();
        let id = Uuid::new_v4();
        mock.push_rows(vec![user_row(id, 10, 0, json!({}))]).await;

        let user = store.get_one(&id.to_string()).await.unwrap().unwrap();
        assert!(user.alias_id.is_none());
    }

    fn same_second_versions(id: Uuid, first: Value, second: Value) -> (Value, Value) {
        let mut older = user_row(id, 1700000500, 0, first);
        let mut newer = user_row(id, 1700000500, 0, second);
        older["version"] = json!(1700000500000001i64);
        newer["version"] = json!(1700000500000002i64);
        (older, newer)
    }

    #[tokio::test]
    async fn test_get_same_second_delete_wins_in_any_row_order() {
        let id = Uuid::new_v4();
        let (live, tombstone) = same_second_versions(id, json!({}), json!({"is_deleted": 1}));

        for rows in [
            vec![live.clone(), tombstone.clone()],
            vec![tombstone.clone(), live.clone()],
        ] {
            let (store, mock) = store_with_mock();
            mock.push_rows(rows).await;
            assert!(store.get_one(&id.to_string()).await.unwrap().is_none());
        }
    }

    #[tokio::test]
    async fn test_get_same_second_restore_wins_in_any_row_order() {
        let id = Uuid::new_v4();
        let (tombstone, live) = same_second_versions(id, json!({"is_deleted": 1}), json!({}));

        for rows in [
            vec![live.clone(), tombstone.clone()],
            vec![tombstone.clone(), live.clone()],
        ] {
            let (store, mock) = store_with_mock();
            mock.push_rows(rows).await;
            let user = store.get_one(&id.to_string()).await.unwrap();
            assert_eq!(user.map(|u| u.id), Some(id));
        }
    }

    #[tokio::test]
    async fn test_get_same_second_update_returns_later_write() {
        let id = Uuid::new_v4();
        let (a, b) = same_second_versions(id, json!({"name": "a"}), json!({"name": "b"}));

        for rows in [vec![a.clone(), b.clone()], vec![b.clone(), a.clone()]] {
            let (store, mock) = store_with_mock();
            mock.push_rows(rows).await;
            let user = store.get_one(&id.to_string()).await.unwrap().unwrap();
            assert_eq!(user.property("name"), Some(&json!("b")));
        }
    }

    #[tokio::test]
    async fn test_get_query_orders_versions_by_version_column() {
        let (store, mock) = store_with_mock();
        store.get(&["crm-17"]).await.unwrap();
        let query = &mock.queries().await[0].query;
        assert!(query.contains("ORDER BY version DESC"));
        assert!(query.contains("u.version DESC"));
    }

    #[tokio::test]
    async fn test_get_one_missing_is_none() {
        let (store, _mock) = store_with_mock();
        assert!(store.get_one(&Uuid::new_v4().to_string()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_get_propagates_storage_error() {
        let (store, mock) = store_with_mock();
        mock.fail_next(StoreError::Connection("connection refused".to_string()))
            .await;
        let err = store.get(&["x"]).await.unwrap_err();
        assert!(matches!(err, StoreError::Connection(_)));
    }

    #[tokio::test]
    async fn test_create_inserts_minimal_row() {
        let (store, mock) = store_with_mock();
        let before = Utc::now().timestamp();
        let id = store.create().await.unwrap();

        let inserts = mock.inserts().await;
        assert_eq!(inserts.len(), 1);
        assert_eq!(inserts[0].table, "user");
        let row = &inserts[0].rows[0];
        assert_eq!(row["id"], json!(id.to_string()));
        assert_eq!(row["sign"], json!(1));
        assert!(row["created_at"].as_i64().unwrap() >= before);
        assert_eq!(row["created_at"], row["updated_at"]);
        assert!(row["version"].as_i64().unwrap() > 0);
        assert_eq!(row.len(), 5);
    }

    #[tokio::test]
    async fn test_create_returns_unique_ids() {
        let (store, _mock) = store_with_mock();
        let a = store.create().await.unwrap();
        let b = store.create().await.unwrap();
        assert_ne!(a, b);
    }

    #[tokio::test]
    async fn test_create_propagates_insert_failure() {
        let (store, mock) = store_with_mock();
        mock.fail_next(StoreError::Query {
            status: 500,
            message: "Code: 252. DB::Exception: Too many parts".to_string(),
        })
        .await;
        assert!(store.create().await.is_err());
    }

    #[tokio::test]
    async fn test_update_stamps_every_row_in_one_batch() {
        let (store, mock) = store_with_mock();
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();

        store
            .update(vec![
                UserPatch::new(a).set("name", json!("a")).set("updated_at", json!(1)),
                UserPatch::new(b).set("created_at", json!(42)),
            ])
            .await
            .unwrap();

        let inserts = mock.inserts().await;
        assert_eq!(inserts.len(), 1);
        let rows = &inserts[0].rows;
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0]["id"], json!(a.to_string()));
        assert_eq!(rows[0]["name"], json!("a"));
        assert_ne!(rows[0]["updated_at"], json!(1));
        assert_eq!(rows[0]["updated_at"], rows[1]["updated_at"]);
        assert_eq!(rows[1]["created_at"], json!(42));
    }

    #[tokio::test]
    async fn test_writes_stamp_strictly_increasing_versions() {
        let (store, mock) = store_with_mock();
        let id = store.create().await.unwrap();

        store
            .update(vec![
                UserPatch::new(id).set("name", json!("a")),
                UserPatch::new(id).set("name", json!("b")),
            ])
            .await
            .unwrap();
        store
            .update(vec![UserPatch::new(id).deleted()])
            .await
            .unwrap();

        let versions: Vec<i64> = mock
            .inserts()
            .await
            .iter()
            .flat_map(|insert| insert.rows.iter())
            .map(|row| row["version"].as_i64().unwrap())
            .collect();
        assert_eq!(versions.len(), 4);
        assert!(versions.windows(2).all(|w| w[0] < w[1]), "{:?}", versions);
    }

    #[test]
    fn test_next_version_never_repeats() {
        let mut last = next_version();
        for _ in 0..1000 {
            let next = next_version();
            assert!(next > last);
            last = next;
        }
    }

    #[tokio::test]
    async fn test_update_empty_is_noop() {
        let (store, mock) = store_with_mock();
        store.update(Vec::new()).await.unwrap();
        assert!(mock.inserts().await.is_empty());
    }

    #[tokio::test]
    async fn test_get_columns_returns_names_in_order() {
        let (store, mock) = store_with_mock();
        mock.push_rows(vec![
            json!({"name": "id", "type": "UUID"}),
            json!({"name": "created_at", "type": "UInt32"}),
            json!({"name": "updated_at", "type": "UInt32"}),
            json!({"name": "is_deleted", "type": "UInt8"}),
            json!({"name": "sign", "type": "Int8"}),
            json!({"name": "email", "type": "String"}),
        ])
        .await;

        let columns = store.get_columns().await.unwrap();
        assert_eq!(
            columns,
            vec!["id", "created_at", "updated_at", "is_deleted", "sign", "email"]
        );
        assert_eq!(mock.queries().await[0].query, "DESCRIBE TABLE `user`");
    }

    #[tokio::test]
    async fn test_set_property_times_one_row_per_property() {
        let (store, mock) = store_with_mock();
        let id = Uuid::new_v4();

        store.set_property_times(id, &["email", "phone"]).await.unwrap();

        let inserts = mock.inserts().await;
        assert_eq!(inserts.len(), 1);
        assert_eq!(inserts[0].table, "user_property_time");
        assert_eq!(inserts[0].rows.len(), 2);
        assert_eq!(inserts[0].rows[1]["property"], json!("phone"));
        assert!(!inserts[0].rows[0].contains_key("timestamp"));
    }

    #[tokio::test]
    async fn test_set_property_times_empty_is_noop() {
        let (store, mock) = store_with_mock();
        let none: [&str; 0] = [];
        store.set_property_times(Uuid::new_v4(), &none).await.unwrap();
        assert!(mock.inserts().await.is_empty());
    }

    #[tokio::test]
    async fn test_most_recent_user_properties_picks_latest_writer() {
        let (store, mock) = store_with_mock();
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();

        mock.push_rows(vec![
            json!({"user_id": b.to_string(), "property": "phone", "timestamp_ms": 2000}),
            json!({"user_id": a.to_string(), "property": "email", "timestamp_ms": 1000}),
            json!({"user_id": b.to_string(), "property": "email", "timestamp_ms": 1500}),
        ])
        .await;

        let winners = store.most_recent_user_properties(a, b).await.unwrap();
        assert_eq!(
            winners,
            vec![
                PropertyWinner { user_id: b, property: "email".to_string() },
                PropertyWinner { user_id: b, property: "phone".to_string() },
            ]
        );

        let queries = mock.queries().await;
        assert_eq!(
            queries[0].params.get("user_ids"),
            Some(&QueryParam::UuidArray(vec![a, b]))
        );
        assert!(queries[0].query.contains("LIMIT 1 BY property"));
    }

    #[tokio::test]
    async fn test_most_recent_user_properties_empty() {
        let (store, _mock) = store_with_mock();
        let winners = store
            .most_recent_user_properties(Uuid::new_v4(), Uuid::new_v4())
            .await
            .unwrap();
        assert!(winners.is_empty());
    }

    #[tokio::test]
    async fn test_add_alias_inserts_mapping() {
        let (store, mock) = store_with_mock();
        let user_id = Uuid::new_v4();

        let alias_id = store.add_alias(user_id, "crm-17").await.unwrap();

        let inserts = mock.inserts().await;
        assert_eq!(inserts[0].table, "user_alias");
        let row = &inserts[0].rows[0];
        assert_eq!(row["id"], json!(alias_id.to_string()));
        assert_eq!(row["user_id"], json!(user_id.to_string()));
        assert_eq!(row["alias"], json!("crm-17"));
    }

    #[tokio::test]
    async fn test_health_check_uses_ping() {
        let (store, mock) = store_with_mock();
        assert!(store.health_check().await.unwrap());
        mock.set_healthy(false).await;
        assert!(!store.health_check().await.unwrap());
    }
}
