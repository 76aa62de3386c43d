use serde::{Deserialize, Serialize};

use kade_core::{Aggregate, AggregateRoot, DomainError, ProductId, ValueObject};

use crate::movement::{AdjustmentPolicy, MovementType, RecordMovement, StockMovement};

/// Reorder threshold applied when a product is created without one.
pub const DEFAULT_REORDER_LEVEL: i64 = 10;

/// Minimum product name length (in characters, after trimming).
pub const MIN_NAME_LEN: usize = 3;

/// Unit price in the smallest currency unit (e.g. cents).
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Price(u64);

impl Price {
    pub fn new(cents: u64) -> Result<Self, DomainError> {
        if cents == 0 {
            return Err(DomainError::validation("price must be positive"));
        }
        Ok(Self(cents))
    }

    pub fn cents(&self) -> u64 {
        self.0
    }

    /// Total for `quantity` units.
    pub fn times(&self, quantity: i64) -> Result<u64, DomainError> {
        u64::try_from(quantity)
            .ok()
            .and_then(|q| self.0.checked_mul(q))
            .ok_or_else(|| DomainError::validation("sale total out of range"))
    }
}

impl ValueObject for Price {}

/// Input for adding a product to the catalog.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewProduct {
    pub product_id: ProductId,
    pub name: String,
    pub price: Price,
    pub stock: i64,
    pub reorder_level: Option<i64>,
    pub category: String,
}

/// Partial catalog update. `stock` is deliberately absent: on-hand quantity
/// only changes through recorded movements.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductPatch {
    pub name: Option<String>,
    pub price: Option<Price>,
    pub reorder_level: Option<i64>,
    pub category: Option<String>,
}

impl ProductPatch {
    pub fn is_empty(&self) -> bool {
        self.name.is_none()
            && self.price.is_none()
            && self.reorder_level.is_none()
            && self.category.is_none()
    }

    pub fn reorder_level(level: i64) -> Self {
        Self {
            reorder_level: Some(level),
            ..Self::default()
        }
    }

    fn validate(&self) -> Result<(), DomainError> {
        if let Some(name) = &self.name {
            validate_name(name)?;
        }
        if let Some(price) = self.price {
            validate_price(price)?;
        }
        if let Some(level) = self.reorder_level {
            validate_reorder_level(level)?;
        }
        if let Some(category) = &self.category {
            validate_category(category)?;
        }
        Ok(())
    }
}

/// Aggregate root: Product (catalog row).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Product {
    id: ProductId,
    name: String,
    price: Price,
    stock: i64,
    reorder_level: i64,
    category: String,
    version: u64,
}

impl Product {
    /// Validate input and build a new catalog record at version 0.
    pub fn create(input: NewProduct) -> Result<Self, DomainError> {
        validate_name(&input.name)?;
        validate_price(input.price)?;
        if input.stock < 0 {
            return Err(DomainError::validation("stock cannot be negative"));
        }
        let reorder_level = input.reorder_level.unwrap_or(DEFAULT_REORDER_LEVEL);
        validate_reorder_level(reorder_level)?;
        validate_category(&input.category)?;

        Ok(Self {
            id: input.product_id,
            name: input.name.trim().to_string(),
            price: input.price,
            stock: input.stock,
            reorder_level,
            category: input.category.trim().to_string(),
            version: 0,
        })
    }

    /// Rebuild a record loaded from storage. Performs no validation.
    pub fn restore(
        id: ProductId,
        name: String,
        price: Price,
        stock: i64,
        reorder_level: i64,
        category: String,
        version: u64,
    ) -> Self {
        Self {
            id,
            name,
            price,
            stock,
            reorder_level,
            category,
            version,
        }
    }

    pub fn id_typed(&self) -> ProductId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn price(&self) -> Price {
        self.price
    }

    pub fn stock(&self) -> i64 {
        self.stock
    }

    pub fn reorder_level(&self) -> i64 {
        self.reorder_level
    }

    pub fn category(&self) -> &str {
        &self.category
    }

    /// True while on-hand stock is below the reorder threshold.
    pub fn is_low_stock(&self) -> bool {
        self.stock < self.reorder_level
    }

    /// Units needed to bring stock back up to the reorder level.
    pub fn reorder_quantity(&self) -> i64 {
        (self.reorder_level - self.stock).max(0)
    }

    /// Apply a validated partial update. Nothing changes if any field is invalid.
    pub fn apply_patch(&mut self, patch: ProductPatch) -> Result<(), DomainError> {
        if patch.is_empty() {
            return Err(DomainError::validation("update contains no fields"));
        }
        patch.validate()?;

        if let Some(name) = patch.name {
            self.name = name.trim().to_string();
        }
        if let Some(price) = patch.price {
            self.price = price;
        }
        if let Some(level) = patch.reorder_level {
            self.reorder_level = level;
        }
        if let Some(category) = patch.category {
            self.category = category.trim().to_string();
        }
        self.version += 1;
        Ok(())
    }
}

impl AggregateRoot for Product {
    type Id = ProductId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn version(&self) -> u64 {
        self.version
    }
}

impl Aggregate for Product {
    type Command = RecordMovement;
    type Event = StockMovement;
    type Error = DomainError;

    fn apply(&mut self, event: &Self::Event) {
        self.stock += event.delta;
        self.version += 1;
    }

    fn handle(&self, cmd: &Self::Command) -> Result<Vec<Self::Event>, Self::Error> {
        if cmd.product_id != self.id {
            return Err(DomainError::invariant("product_id mismatch"));
        }

        let (quantity, delta) = match cmd.movement_type {
            MovementType::Restock => {
                ensure_positive(cmd.quantity)?;
                (cmd.quantity, cmd.quantity)
            }
            MovementType::Sale => {
                ensure_positive(cmd.quantity)?;
                if cmd.quantity > self.stock {
                    return Err(DomainError::insufficient_stock(self.stock, cmd.quantity));
                }
                (cmd.quantity, -cmd.quantity)
            }
            MovementType::Adjustment => self.decide_adjustment(cmd)?,
        };

        let new_stock = self
            .stock
            .checked_add(delta)
            .ok_or_else(|| DomainError::validation("stock out of range"))?;
        if new_stock < 0 {
            return Err(DomainError::insufficient_stock(self.stock, quantity));
        }

        let total_price = match cmd.movement_type {
            MovementType::Sale => Some(self.price.times(quantity)?),
            _ => None,
        };

        Ok(vec![StockMovement {
            movement_id: cmd.movement_id,
            product_id: self.id,
            product_name: self.name.clone(),
            movement_type: cmd.movement_type,
            quantity,
            delta,
            total_price,
            date: cmd.occurred_at,
        }])
    }
}

impl Product {
    /// Returns `(magnitude, signed delta)` for an adjustment.
    fn decide_adjustment(&self, cmd: &RecordMovement) -> Result<(i64, i64), DomainError> {
        match cmd.adjustment_policy {
            AdjustmentPolicy::SignedDelta => {
                ensure_positive(cmd.quantity)?;
                Ok((cmd.quantity, cmd.direction.sign() * cmd.quantity))
            }
            AdjustmentPolicy::Absolute => {
                if cmd.quantity < 0 {
                    return Err(DomainError::validation("target stock cannot be negative"));
                }
                let delta = cmd.quantity - self.stock;
                if delta == 0 {
                    return Err(DomainError::validation("adjustment does not change stock"));
                }
                Ok((delta.abs(), delta))
            }
        }
    }
}

fn ensure_positive(quantity: i64) -> Result<(), DomainError> {
    if quantity <= 0 {
        return Err(DomainError::validation("quantity must be a positive integer"));
    }
    Ok(())
}

fn validate_name(name: &str) -> Result<(), DomainError> {
    if name.trim().chars().count() < MIN_NAME_LEN {
        return Err(DomainError::validation(format!(
            "name must be at least {MIN_NAME_LEN} characters"
        )));
    }
    Ok(())
}

fn validate_price(price: Price) -> Result<(), DomainError> {
    if price.cents() == 0 {
        return Err(DomainError::validation("price must be positive"));
    }
    Ok(())
}

fn validate_reorder_level(level: i64) -> Result<(), DomainError> {
    if level <= 0 {
        return Err(DomainError::validation("reorder level must be positive"));
    }
    Ok(())
}

fn validate_category(category: &str) -> Result<(), DomainError> {
    if category.trim().is_empty() {
        return Err(DomainError::validation("category cannot be empty"));
    }
    Ok(())
}
