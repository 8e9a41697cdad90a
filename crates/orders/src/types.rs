//! Order domain types
//!
//! [`Order`] is the canonical order shape: one `id`, one normalized address,
//! decimal money. Every layer above the repository works with this shape only.

use bigdecimal::{BigDecimal, ToPrimitive};
use chrono::{DateTime, Utc};
use serde::de::{self, Visitor};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::ops::{Add, Mul, Sub};
use std::str::FromStr;

use crate::address::ShippingAddress;
use crate::error::OrderError;

/// Order status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderStatus {
    /// Placed by the customer, not yet picked up
    #[default]
    Pending,
    /// Being prepared
    Processing,
    /// Handed to the carrier
    Shipped,
    /// Received by the customer
    Delivered,
    /// Cancelled by the customer or an administrator
    #[serde(alias = "canceled")]
    Cancelled,
}

impl OrderStatus {
    pub const ALL: [OrderStatus; 5] = [
        OrderStatus::Pending,
        OrderStatus::Processing,
        OrderStatus::Shipped,
        OrderStatus::Delivered,
        OrderStatus::Cancelled,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::Pending => "pending",
            OrderStatus::Processing => "processing",
            OrderStatus::Shipped => "shipped",
            OrderStatus::Delivered => "delivered",
            OrderStatus::Cancelled => "cancelled",
        }
    }

    /// Delivered and cancelled orders accept no further transitions
    pub fn is_terminal(&self) -> bool {
        matches!(self, OrderStatus::Delivered | OrderStatus::Cancelled)
    }

    /// Whether the owning customer may still cancel
    pub fn is_cancellable(&self) -> bool {
        matches!(self, OrderStatus::Pending | OrderStatus::Processing)
    }

    /// Position on the fulfilment path; `None` for cancelled
    pub fn rank(&self) -> Option<u8> {
        match self {
            OrderStatus::Pending => Some(0),
            OrderStatus::Processing => Some(1),
            OrderStatus::Shipped => Some(2),
            OrderStatus::Delivered => Some(3),
            OrderStatus::Cancelled => None,
        }
    }
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OrderStatus {
    type Err = OrderError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "pending" => Ok(OrderStatus::Pending),
            "processing" => Ok(OrderStatus::Processing),
            "shipped" => Ok(OrderStatus::Shipped),
            "delivered" => Ok(OrderStatus::Delivered),
            "cancelled" | "canceled" => Ok(OrderStatus::Cancelled),
            other => Err(OrderError::validation(format!(
                "Invalid status '{}'. Must be one of: pending, processing, shipped, delivered, cancelled",
                other
            ))),
        }
    }
}

/// Decimal money amount
///
/// Arithmetic is exact. On the wire it is a plain JSON number, and it accepts
/// numbers or numeric strings on input.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Amount(BigDecimal);

impl Amount {
    pub fn zero() -> Self {
        Self(BigDecimal::from(0))
    }

    pub fn as_decimal(&self) -> &BigDecimal {
        &self.0
    }

    pub fn is_negative(&self) -> bool {
        self.0 < BigDecimal::from(0)
    }

    /// Absolute difference between two amounts
    pub fn abs_diff(&self, other: &Amount) -> Amount {
        Amount((&self.0 - &other.0).abs())
    }

    pub fn to_f64(&self) -> Option<f64> {
        self.0.to_f64()
    }

    fn is_whole(&self) -> bool {
        self.0 == self.0.with_scale(0)
    }
}

impl From<BigDecimal> for Amount {
    fn from(value: BigDecimal) -> Self {
        Self(value)
    }
}

impl From<u32> for Amount {
    fn from(value: u32) -> Self {
        Self(BigDecimal::from(value))
    }
}

impl FromStr for Amount {
    type Err = OrderError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        BigDecimal::from_str(s.trim())
            .map(Self)
            .map_err(|_| OrderError::validation(format!("Invalid amount '{}'", s)))
    }
}

impl fmt::Display for Amount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.normalized())
    }
}

impl Add for &Amount {
    type Output = Amount;

    fn add(self, rhs: &Amount) -> Amount {
        Amount(&self.0 + &rhs.0)
    }
}

impl Sub for &Amount {
    type Output = Amount;

    fn sub(self, rhs: &Amount) -> Amount {
        Amount(&self.0 - &rhs.0)
    }
}

impl Mul<u32> for &Amount {
    type Output = Amount;

    fn mul(self, rhs: u32) -> Amount {
        Amount(&self.0 * BigDecimal::from(rhs))
    }
}

/// Whole amounts are JSON integers; anything with a fraction is a decimal
/// string, so no value ever passes through `f64`.
impl Serialize for Amount {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        if self.is_whole() {
            if let Some(v) = self.0.to_i64() {
                return serializer.serialize_i64(v);
            }
        }
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for Amount {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct AmountVisitor;

        impl Visitor<'_> for AmountVisitor {
            type Value = Amount;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a decimal number or numeric string")
            }

            fn visit_i64<E: de::Error>(self, v: i64) -> Result<Amount, E> {
                Ok(Amount(BigDecimal::from(v)))
            }

            fn visit_u64<E: de::Error>(self, v: u64) -> Result<Amount, E> {
                Ok(Amount(BigDecimal::from(v)))
            }

            fn visit_f64<E: de::Error>(self, v: f64) -> Result<Amount, E> {
                if !v.is_finite() {
                    return Err(E::custom("amount must be finite"));
                }
                // Display gives the shortest round-trip form, so 19.99 stays 19.99
                BigDecimal::from_str(&v.to_string())
                    .map(Amount)
                    .map_err(E::custom)
            }

            fn visit_str<E: de::Error>(self, v: &str) -> Result<Amount, E> {
                BigDecimal::from_str(v.trim()).map(Amount).map_err(E::custom)
            }
        }

        deserializer.deserialize_any(AmountVisitor)
    }
}

/// A purchased line
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderItem {
    pub product_id: String,
    #[serde(default)]
    pub name: String,
    pub price: Amount,
    pub quantity: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
}

impl OrderItem {
    pub fn subtotal(&self) -> Amount {
        &self.price * self.quantity
    }
}

/// Who requested a status change
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Actor {
    /// The owning customer; carries the session user id
    Customer(String),
    /// An administrator; bypasses ownership checks but not the state machine
    Admin(Option<String>),
}

impl Actor {
    pub fn role(&self) -> ActorRole {
        match self {
            Actor::Customer(_) => ActorRole::Customer,
            Actor::Admin(_) => ActorRole::Admin,
        }
    }

    pub fn user_id(&self) -> Option<&str> {
        match self {
            Actor::Customer(id) => Some(id),
            Actor::Admin(id) => id.as_deref(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ActorRole {
    Customer,
    Admin,
}

/// One entry of an order's status history
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusChange {
    pub status: OrderStatus,
    pub at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub by: Option<String>,
    pub role: ActorRole,
}

impl StatusChange {
    pub fn new(status: OrderStatus, actor: &Actor) -> Self {
        Self {
            status,
            at: Utc::now(),
            by: actor.user_id().map(str::to_string),
            role: actor.role(),
        }
    }
}

/// Order in canonical shape
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Order {
    /// Store-assigned document id
    pub id: String,
    /// Owner, immutable after creation
    pub user_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_name: Option<String>,
    pub items: Vec<OrderItem>,
    pub shipping_address: ShippingAddress,
    #[serde(default)]
    pub payment_method: String,
    #[serde(default)]
    pub shipping_cost: Amount,
    #[serde(default)]
    pub discount: Amount,
    pub total_amount: Amount,
    #[serde(default)]
    pub status: OrderStatus,
    #[serde(default)]
    pub status_history: Vec<StatusChange>,
    /// Synthetic/test orders are hidden from every listing
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub is_test: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Order {
    /// Sum of line subtotals
    pub fn items_total(&self) -> Amount {
        sum_items(&self.items)
    }

    pub fn is_owned_by(&self, user_id: &str) -> bool {
        self.user_id == user_id
    }
}

/// Sum of line subtotals
pub fn sum_items(items: &[OrderItem]) -> Amount {
    items
        .iter()
        .fold(Amount::zero(), |acc, item| &acc + &item.subtotal())
}

/// Input for creating an order; the store assigns id and timestamps
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NewOrder {
    pub user_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_email: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_name: Option<String>,
    pub items: Vec<OrderItem>,
    pub shipping_address: ShippingAddress,
    pub payment_method: String,
    pub shipping_cost: Amount,
    pub discount: Amount,
    pub total_amount: Amount,
    pub status: Option<OrderStatus>,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub is_test: bool,
}
