/// User record and patch types
///
/// A user is a fixed set of reserved columns plus an open set of property
/// columns whose names are only known at runtime (see
/// [`UserStore::get_columns`](crate::store::UserStore::get_columns)). The
/// reserved columns are typed fields; everything else lives in a JSON map.
///
/// # Schema
///
/// ```sql
/// CREATE TABLE user (
///     id UUID,
///     created_at UInt32,
///     updated_at UInt32,
///     is_deleted UInt8,
///     sign Int8,
///     version Int64,
///     ...property columns
/// ) ENGINE = ReplacingMergeTree(version) ORDER BY id;
/// ```
///
/// # Example
///
/// ```
/// use serde_json::json;
/// use userstore_shared::models::user::UserPatch;
/// use uuid::Uuid;
///
/// let patch = UserPatch::new(Uuid::new_v4())
///     .set("email", json!("ada@example.com"))
///     .set("name", json!("Ada"));
///
/// assert_eq!(patch.properties.len(), 2);
/// ```

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

use crate::db::client::Row;
use crate::error::StoreResult;

/// Columns a patch may never write directly
///
/// `id` comes from the patch itself, `updated_at` and `version` are stamped by
/// the store, `alias_id` only exists in lookup results and `sign` is managed
/// by the store.
const STORE_MANAGED: &[&str] = &["id", "updated_at", "version", "alias_id", "sign"];

/// One logical user as returned by a lookup
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserRecord {
    /// Primary key, immutable once created
    pub id: Uuid,

    /// Id of the `user_alias` row that matched, if the user has one
    #[serde(
        default,
        deserialize_with = "unmatched_alias_as_none",
        skip_serializing_if = "Option::is_none"
    )]
    pub alias_id: Option<Uuid>,

    /// Unix seconds
    #[serde(default)]
    pub created_at: i64,

    /// Unix seconds, stamped by every update
    #[serde(default)]
    pub updated_at: i64,

    /// 0 = active
    #[serde(default)]
    pub is_deleted: u8,

    /// Write order, strictly increasing across writes from one store
    #[serde(default)]
    pub version: i64,

    /// Every other column of the `user` table
    #[serde(flatten)]
    pub properties: Map<String, Value>,
}

impl UserRecord {
    /// Decodes a row returned by the store
    ///
    /// The internal `sign` column is dropped.
    pub fn from_row(row: Row) -> StoreResult<Self> {
        let mut record: UserRecord = serde_json::from_value(Value::Object(row))?;
        record.properties.remove("sign");
        Ok(record)
    }

    /// Looks up a property column by name
    pub fn property(&self, name: &str) -> Option<&Value> {
        self.properties.get(name)
    }

    pub fn is_deleted(&self) -> bool {
        self.is_deleted != 0
    }
}

/// A partial user row to append through `update`
///
/// Only `id` is required. The store stamps `updated_at` and `version`; a
/// value supplied in `properties` for either (or for `id`, `alias_id`,
/// `sign`) is discarded.
/// `created_at` and `is_deleted` may be supplied as ordinary properties.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserPatch {
    pub id: Uuid,

    #[serde(flatten)]
    pub properties: Map<String, Value>,
}

impl UserPatch {
    pub fn new(id: Uuid) -> Self {
        Self {
            id,
            properties: Map::new(),
        }
    }

    /// Sets a column value
    pub fn set(mut self, name: &str, value: Value) -> Self {
        self.properties.insert(name.to_string(), value);
        self
    }

    /// Marks the user as deleted
    pub fn deleted(self) -> Self {
        self.set("is_deleted", Value::from(1u8))
    }

    /// Builds the row to insert, stamped with `updated_at` and `version`
    pub fn into_row(self, updated_at: i64, version: i64) -> Row {
        let mut row = self.properties;
        for column in STORE_MANAGED {
            row.remove(*column);
        }
        row.insert("id".to_string(), Value::String(self.id.to_string()));
        row.insert("updated_at".to_string(), Value::from(updated_at));
        row.insert("version".to_string(), Value::from(version));
        row
    }
}

impl From<UserRecord> for UserPatch {
    /// Carries every column of a looked-up record into a new version
    fn from(record: UserRecord) -> Self {
        let mut properties = record.properties;
        properties.insert("created_at".to_string(), Value::from(record.created_at));
        properties.insert("is_deleted".to_string(), Value::from(record.is_deleted));
        Self {
            id: record.id,
            properties,
        }
    }
}

/// An unmatched LEFT JOIN yields the column default: the nil UUID (or an
/// empty string / null depending on join settings).
fn unmatched_alias_as_none<'de, D>(deserializer: D) -> Result<Option<Uuid>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<String>::deserialize(deserializer)?;
    match value.as_deref() {
        None | Some("") => Ok(None),
        Some(raw) => {
            let id = Uuid::parse_str(raw).map_err(serde::de::Error::custom)?;
            Ok(if id.is_nil() { None } else { Some(id) })
        }
    }
}
