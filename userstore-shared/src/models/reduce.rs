/// Read-time collapsing of versioned rows
///
/// The `user` table is append-only: every write adds a new version of a row.
/// ClickHouse collapses versions in the query itself (`LIMIT 1 BY`), but the
/// store applies the same reduction to whatever rows it gets back so the
/// "one row per key, latest wins" guarantee does not depend on the engine.

use std::collections::HashMap;
use std::hash::Hash;

/// Keeps the item with the highest version for each key
///
/// Keys are returned in order of first appearance. On equal versions the
/// earlier item wins.
///
/// # Example
///
/// ```
/// use userstore_shared::models::reduce::latest_by_key;
///
/// let rows = vec![("a", 1), ("b", 5), ("a", 3)];
/// let latest = latest_by_key(rows, |r| r.0, |r| r.1);
/// assert_eq!(latest, vec![("a", 3), ("b", 5)]);
/// ```
pub fn latest_by_key<T, K, F, V>(items: Vec<T>, key: F, version: V) -> Vec<T>
where
    K: Eq + Hash,
    F: Fn(&T) -> K,
    V: Fn(&T) -> i64,
{
    let mut slots: HashMap<K, usize> = HashMap::with_capacity(items.len());
    let mut kept: Vec<T> = Vec::with_capacity(items.len());

    for item in items {
        match slots.get(&key(&item)) {
            Some(&idx) => {
                if version(&item) > version(&kept[idx]) {
                    kept[idx] = item;
                }
            }
            None => {
                slots.insert(key(&item), kept.len());
                kept.push(item);
            }
        }
    }

    kept
}
