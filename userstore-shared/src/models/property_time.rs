/// Property-time bookkeeping types
///
/// `user_property_time` records when a named property was last written for a
/// user. It never stores the value itself; during a merge of two users it
/// tells the caller which of the two holds the fresher value per property.
///
/// # Schema
///
/// ```sql
/// CREATE TABLE user_property_time (
///     user_id UUID,
///     property String,
///     timestamp DateTime64(3) DEFAULT now64(3)
/// ) ENGINE = MergeTree ORDER BY (user_id, property, timestamp);
/// ```

use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::db::client::Row;
use crate::error::StoreResult;

/// Raw property-time row as read back for comparison
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct PropertyTimeRow {
    pub user_id: Uuid,
    pub property: String,

    /// Write time in unix milliseconds
    pub timestamp_ms: i64,
}

impl PropertyTimeRow {
    pub fn from_row(row: Row) -> StoreResult<Self> {
        Ok(serde_json::from_value(Value::Object(row))?)
    }
}

/// For one property, the user whose value is the most recent
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PropertyWinner {
    pub user_id: Uuid,
    pub property: String,
}

impl From<PropertyTimeRow> for PropertyWinner {
    fn from(row: PropertyTimeRow) -> Self {
        Self {
            user_id: row.user_id,
            property: row.property,
        }
    }
}

/// Builds the insert row recording a write of `property` for `user_id`
///
/// The timestamp is left to the column default.
pub fn property_time_row(user_id: Uuid, property: &str) -> Row {
    let mut row = Row::new();
    row.insert("user_id".to_string(), Value::String(user_id.to_string()));
    row.insert("property".to_string(), Value::String(property.to_string()));
    row
}
