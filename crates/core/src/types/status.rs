//! Status and choice enums shared by the server and the CLI.
//!
//! Each enum maps to a PostgreSQL enum type of the same snake_case name when
//! the `postgres` feature is enabled, and round-trips through `Display` /
//! `FromStr` using the same wire names (form fields, query strings).

use serde::{Deserialize, Serialize};

/// Error returned when parsing one of the status enums from a string.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
#[error("invalid {kind}: {value}")]
pub struct ParseStatusError {
    kind: &'static str,
    value: String,
}

impl ParseStatusError {
    fn new(kind: &'static str, value: &str) -> Self {
        Self {
            kind,
            value: value.to_owned(),
        }
    }
}

macro_rules! wire_names {
    ($ty:ident, $kind:literal, { $($variant:ident => $name:literal),+ $(,)? }) => {
        impl $ty {
            /// Every variant, in declaration order.
            pub const ALL: &'static [Self] = &[$(Self::$variant),+];

            /// Wire / database name of this value.
            #[must_use]
            pub const fn as_str(self) -> &'static str {
                match self {
                    $(Self::$variant => $name),+
                }
            }
        }

        impl std::fmt::Display for $ty {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl std::str::FromStr for $ty {
            type Err = ParseStatusError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $($name => Ok(Self::$variant),)+
                    _ => Err(ParseStatusError::new($kind, s)),
                }
            }
        }
    };
}

/// Lifecycle status of an order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[cfg_attr(feature = "postgres", derive(sqlx::Type))]
#[cfg_attr(
    feature = "postgres",
    sqlx(type_name = "order_status", rename_all = "snake_case")
)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    #[default]
    Pending,
    Paid,
    Shipped,
    Delivered,
    Cancelled,
}

wire_names!(OrderStatus, "order status", {
    Pending => "pending",
    Paid => "paid",
    Shipped => "shipped",
    Delivered => "delivered",
    Cancelled => "cancelled",
});

impl OrderStatus {
    /// Statuses whose order total counts as revenue.
    pub const REVENUE: &'static [Self] = &[Self::Paid, Self::Shipped, Self::Delivered];

    /// Whether the order has been paid for (now or at some earlier stage).
    #[must_use]
    pub fn is_revenue(self) -> bool {
        Self::REVENUE.contains(&self)
    }
}

/// Status of a payment attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[cfg_attr(feature = "postgres", derive(sqlx::Type))]
#[cfg_attr(
    feature = "postgres",
    sqlx(type_name = "payment_status", rename_all = "snake_case")
)]
#[serde(rename_all = "snake_case")]
pub enum PaymentStatus {
    #[default]
    Pending,
    Completed,
    Failed,
    Cancelled,
}

wire_names!(PaymentStatus, "payment status", {
    Pending => "pending",
    Completed => "completed",
    Failed => "failed",
    Cancelled => "cancelled",
});

/// How a customer pays for an order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[cfg_attr(feature = "postgres", derive(sqlx::Type))]
#[cfg_attr(
    feature = "postgres",
    sqlx(type_name = "payment_method", rename_all = "snake_case")
)]
#[serde(rename_all = "snake_case")]
pub enum PaymentMethod {
    Stripe,
    Paypal,
    EvcPlus,
    GolisSaad,
    Edahab,
    #[cfg_attr(feature = "postgres", sqlx(rename = "cod"))]
    #[serde(rename = "cod")]
    CashOnDelivery,
}

wire_names!(PaymentMethod, "payment method", {
    Stripe => "stripe",
    Paypal => "paypal",
    EvcPlus => "evc_plus",
    GolisSaad => "golis_saad",
    Edahab => "edahab",
    CashOnDelivery => "cod",
});

impl PaymentMethod {
    /// Human-readable label.
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::Stripe => "Credit Card (Stripe)",
            Self::Paypal => "PayPal",
            Self::EvcPlus => "EVC Plus",
            Self::GolisSaad => "Golis Saad",
            Self::Edahab => "eDahab",
            Self::CashOnDelivery => "Cash on Delivery",
        }
    }

    /// Whether this method is collected through a mobile-money provider.
    #[must_use]
    pub const fn is_mobile_money(self) -> bool {
        matches!(self, Self::EvcPlus | Self::GolisSaad | Self::Edahab)
    }
}

/// Merchant subscription tier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[cfg_attr(feature = "postgres", derive(sqlx::Type))]
#[cfg_attr(
    feature = "postgres",
    sqlx(type_name = "subscription_tier", rename_all = "snake_case")
)]
#[serde(rename_all = "snake_case")]
pub enum SubscriptionTier {
    #[default]
    Free,
    Pro,
    Business,
}

wire_names!(SubscriptionTier, "subscription tier", {
    Free => "free",
    Pro => "pro",
    Business => "business",
});

/// Visual theme of a store front.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[cfg_attr(feature = "postgres", derive(sqlx::Type))]
#[cfg_attr(
    feature = "postgres",
    sqlx(type_name = "store_theme", rename_all = "snake_case")
)]
#[serde(rename_all = "snake_case")]
pub enum StoreTheme {
    #[default]
    Default,
    Modern,
    Classic,
    Minimal,
}

wire_names!(StoreTheme, "store theme", {
    Default => "default",
    Modern => "modern",
    Classic => "classic",
    Minimal => "minimal",
});

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_wire_names_match_serde() {
        for method in PaymentMethod::ALL {
            let json = serde_json::to_string(method).unwrap();
            assert_eq!(json, format!("\"{}\"", method.as_str()));
            assert_eq!(method.as_str().parse::<PaymentMethod>().unwrap(), *method);
        }
        for status in OrderStatus::ALL {
            let json = serde_json::to_string(status).unwrap();
            assert_eq!(json, format!("\"{status}\""));
        }
    }

    #[test]
    fn test_cash_on_delivery_uses_short_name() {
        assert_eq!(PaymentMethod::CashOnDelivery.as_str(), "cod");
        assert_eq!(
            "cod".parse::<PaymentMethod>().unwrap(),
            PaymentMethod::CashOnDelivery
        );
    }

    #[test]
    fn test_parse_unknown_is_error() {
        let err = "refunded".parse::<OrderStatus>().unwrap_err();
        assert_eq!(err.to_string(), "invalid order status: refunded");
    }

    #[test]
    fn test_revenue_statuses() {
        assert!(!OrderStatus::Pending.is_revenue());
        assert!(OrderStatus::Paid.is_revenue());
        assert!(OrderStatus::Delivered.is_revenue());
        assert!(!OrderStatus::Cancelled.is_revenue());
    }

    #[test]
    fn test_mobile_money_methods() {
        let mobile: Vec<_> = PaymentMethod::ALL
            .iter()
            .filter(|m| m.is_mobile_money())
            .collect();
        assert_eq!(mobile.len(), 3);
    }

    #[test]
    fn test_defaults() {
        assert_eq!(OrderStatus::default(), OrderStatus::Pending);
        assert_eq!(SubscriptionTier::default(), SubscriptionTier::Free);
        assert_eq!(StoreTheme::default(), StoreTheme::Default);
    }
}
