use core::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use kade_core::{DomainError, MovementId, ProductId};

/// Kind of stock-affecting event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MovementType {
    Restock,
    Sale,
    Adjustment,
}

impl MovementType {
    pub fn as_str(&self) -> &'static str {
        match self {
            MovementType::Restock => "restock",
            MovementType::Sale => "sale",
            MovementType::Adjustment => "adjustment",
        }
    }
}

impl core::fmt::Display for MovementType {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MovementType {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "restock" => Ok(MovementType::Restock),
            "sale" => Ok(MovementType::Sale),
            "adjustment" => Ok(MovementType::Adjustment),
            other => Err(DomainError::validation(format!(
                "unknown movement type '{other}' (expected restock, sale or adjustment)"
            ))),
        }
    }
}

/// Direction of a manual adjustment under [`AdjustmentPolicy::SignedDelta`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    #[default]
    Increase,
    Decrease,
}

impl Direction {
    pub fn sign(&self) -> i64 {
        match self {
            Direction::Increase => 1,
            Direction::Decrease => -1,
        }
    }
}

/// How an `adjustment` movement's quantity is interpreted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AdjustmentPolicy {
    /// `quantity` is a magnitude; `direction` gives the sign.
    #[default]
    SignedDelta,
    /// `quantity` is the new absolute on-hand count.
    Absolute,
}

impl FromStr for AdjustmentPolicy {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "delta" | "signed_delta" => Ok(AdjustmentPolicy::SignedDelta),
            "absolute" | "set" => Ok(AdjustmentPolicy::Absolute),
            other => Err(DomainError::validation(format!(
                "unknown adjustment policy '{other}' (expected delta or absolute)"
            ))),
        }
    }
}

/// Command: record one stock movement against a product.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordMovement {
    pub movement_id: MovementId,
    pub product_id: ProductId,
    pub movement_type: MovementType,
    pub quantity: i64,
    pub direction: Direction,
    pub adjustment_policy: AdjustmentPolicy,
    pub occurred_at: DateTime<Utc>,
}

/// Ledger entry: an accepted, immutable stock movement.
///
/// `product_name` is a snapshot taken when the movement was accepted, so the
/// entry stays readable after the product is renamed or deleted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StockMovement {
    pub movement_id: MovementId,
    pub product_id: ProductId,
    pub product_name: String,
    #[serde(rename = "type")]
    pub movement_type: MovementType,
    /// Magnitude of the change (always positive).
    pub quantity: i64,
    /// Signed effect on `stock`.
    pub delta: i64,
    /// Sale value in the smallest currency unit; `None` for non-sales.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total_price: Option<u64>,
    pub date: DateTime<Utc>,
}

/// Signed sum of the given movements' effect on stock.
pub fn net_change<'a>(movements: impl IntoIterator<Item = &'a StockMovement>) -> i64 {
    movements.into_iter().map(|m| m.delta).sum()
}
