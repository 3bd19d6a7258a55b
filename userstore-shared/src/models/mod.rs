/// Data types exchanged with the user store
///
/// # Models
///
/// - `user`: User records (reserved columns plus open property map) and patches
/// - `property_time`: Per-property write timestamps and merge winners
/// - `reduce`: Latest-version-per-key reduction applied to read results

pub mod property_time;
pub mod reduce;
pub mod user;

pub use property_time::{PropertyTimeRow, PropertyWinner};
pub use user::{UserPatch, UserRecord};
