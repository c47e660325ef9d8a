//! Human-facing order numbers: `ORD-YYYYMMDD-XXXXXXXXXXXX`.

use core::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Number of uppercase hex characters in the random suffix.
const SUFFIX_LEN: usize = 12;

/// An order number.
///
/// The date part is the UTC creation date; the suffix comes from a random
/// UUID. The `orders.order_number` unique constraint is the final guard, and
/// inserts regenerate on the rare collision.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OrderNumber(String);

impl OrderNumber {
    /// Generate a fresh order number for an order created at `now`.
    #[must_use]
    pub fn generate(now: DateTime<Utc>) -> Self {
        let random = Uuid::new_v4().simple().to_string().to_uppercase();
        let suffix = random.get(..SUFFIX_LEN).unwrap_or(&random);
        Self(format!("ORD-{}-{suffix}", now.format("%Y%m%d")))
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    #[must_use]
    pub fn into_inner(self) -> String {
        self.0
    }
}

impl fmt::Display for OrderNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::collections::HashSet;

    use chrono::TimeZone;

    use super::*;

    #[test]
    fn test_format() {
        let now = Utc.with_ymd_and_hms(2024, 3, 9, 12, 0, 0).unwrap();
        let number = OrderNumber::generate(now);

        let suffix = number.as_str().strip_prefix("ORD-20240309-").unwrap();
        assert_eq!(suffix.len(), SUFFIX_LEN);
        assert!(
            suffix
                .chars()
                .all(|c| c.is_ascii_digit() || ('A'..='F').contains(&c))
        );
    }

    #[test]
    fn test_ten_thousand_are_unique() {
        let now = Utc::now();
        let numbers: HashSet<String> = (0..10_000)
            .map(|_| OrderNumber::generate(now).into_inner())
            .collect();
        assert_eq!(numbers.len(), 10_000);
    }
}
