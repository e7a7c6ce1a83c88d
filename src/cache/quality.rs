//! Quote age classification

use chrono::Duration;
use crate::types::DataQuality;

pub const DELAYED_AFTER_SECS: i64 = 60;
pub const DERIVED_AFTER_SECS: i64 = 300;

/// Labels a quote by how old it is. Age alone never yields `Simulated`;
/// that label is reserved for data we invented rather than fetched.
pub fn classify_age(age: Duration) -> DataQuality {
    if age > Duration::seconds(DERIVED_AFTER_SECS) {
        DataQuality::Derived
    } else if age > Duration::seconds(DELAYED_AFTER_SECS) {
        DataQuality::Delayed
    } else {
        DataQuality::Realtime
    }
}
