//! Postgres-backed catalog and ledger.
//!
//! ## Error Mapping
//!
//! | SQLx Error | PostgreSQL Error Code | StoreError | Scenario |
//! |------------|----------------------|------------|----------|
//! | Database (unique violation) | `23505` | `DuplicateKey` / `Concurrency` | product id taken, movement id replayed |
//! | Database (check constraint) | `23514` | `InsufficientStock` on the stock commit, `Rejected` elsewhere | a row would break a column invariant (e.g. negative stock) |
//! | Database (other) | Any other | `Unavailable` | |
//! | PoolClosed / Io / Tls / timeouts | N/A | `Unavailable` | backend unreachable |
//!
//! Row decoding failures surface as `Corrupt`.
//!
//! ## Atomic stock commit
//!
//! `commit_movement` runs one transaction: a version-conditional
//! `UPDATE products ... WHERE version = $expected`, then the ledger `INSERT`.
//! Zero updated rows means the product is gone (`NotFound`) or another writer
//! got there first (`Concurrency`); either way nothing is written.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{FromRow, PgPool, Postgres, Row, Transaction};
use tracing::{instrument, Span};

use kade_core::{AggregateRoot, DomainError, ExpectedVersion, MovementId, ProductId};
use kade_inventory::{MovementType, Price, Product, ProductPatch, StockMovement};

use super::r#trait::{CatalogStore, InventoryStore, MovementOrder, StockLedger, StoreError};

const SCHEMA: &str = include_str!("../../migrations/0001_inventory.sql");

const PRODUCT_COLUMNS: &str =
    "product_id, name, price_cents, stock, reorder_level, category, version";

const MOVEMENT_COLUMNS: &str = "movement_id, product_id, product_name, movement_type, quantity, delta, total_price_cents, occurred_at";

/// Postgres-backed inventory store.
///
/// `Send + Sync`; cloning shares the underlying pool.
#[derive(Debug, Clone)]
pub struct PostgresInventoryStore {
    pool: Arc<PgPool>,
}

impl PostgresInventoryStore {
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool: Arc::new(pool),
        }
    }

    /// Connect using a `postgres://` URL.
    pub async fn connect(database_url: &str) -> Result<Self, StoreError> {
        let pool = PgPool::connect(database_url)
            .await
            .map_err(|e| map_sqlx_error("connect", e))?;
        Ok(Self::new(pool))
    }

    /// Create tables, indexes and the append-only trigger if missing.
    #[instrument(skip(self), err)]
    pub async fn migrate(&self) -> Result<(), StoreError> {
        sqlx::raw_sql(SCHEMA)
            .execute(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("migrate", e))?;
        Ok(())
    }

    async fn fetch_for_update(
        tx: &mut Transaction<'_, Postgres>,
        product_id: ProductId,
    ) -> Result<Product, StoreError> {
        let row = sqlx::query(&format!(
            "SELECT {PRODUCT_COLUMNS} FROM products WHERE product_id = $1 FOR UPDATE"
        ))
        .bind(product_id.value())
        .fetch_optional(&mut **tx)
        .await
        .map_err(|e| map_sqlx_error("fetch_for_update", e))?
        .ok_or(StoreError::NotFound(product_id))?;

        decode_product(&row)
    }
}

#[async_trait]
impl CatalogStore for PostgresInventoryStore {
    #[instrument(skip(self, product), fields(product_id = %product.id_typed()), err)]
    async fn create(&self, product: Product) -> Result<Product, StoreError> {
        let id = product.id_typed();
        let result = sqlx::query(
            r#"
            INSERT INTO products (product_id, name, price_cents, stock, reorder_level, category, version)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(id.value())
        .bind(product.name())
        .bind(cents_to_db(product.price().cents())?)
        .bind(product.stock())
        .bind(product.reorder_level())
        .bind(product.category())
        .bind(version_to_db(product.version())?)
        .execute(&*self.pool)
        .await;

        match result {
            Ok(_) => Ok(product),
            Err(e) if is_unique_violation(&e) => Err(StoreError::DuplicateKey(id)),
            Err(e) => Err(map_sqlx_error("create", e)),
        }
    }

    #[instrument(skip(self), fields(product_id = %product_id), err)]
    async fn find(&self, product_id: ProductId) -> Result<Product, StoreError> {
        let row = sqlx::query(&format!(
            "SELECT {PRODUCT_COLUMNS} FROM products WHERE product_id = $1"
        ))
        .bind(product_id.value())
        .fetch_optional(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("find", e))?
        .ok_or(StoreError::NotFound(product_id))?;

        decode_product(&row)
    }

    #[instrument(skip(self, patch), fields(product_id = %product_id), err)]
    async fn update(&self, product_id: ProductId, patch: ProductPatch) -> Result<Product, StoreError> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| map_sqlx_error("update.begin", e))?;

        let mut product = Self::fetch_for_update(&mut tx, product_id).await?;
        product.apply_patch(patch)?;

        sqlx::query(
            r#"
            UPDATE products
            SET name = $2, price_cents = $3, reorder_level = $4, category = $5, version = $6
            WHERE product_id = $1
            "#,
        )
        .bind(product_id.value())
        .bind(product.name())
        .bind(cents_to_db(product.price().cents())?)
        .bind(product.reorder_level())
        .bind(product.category())
        .bind(version_to_db(product.version())?)
        .execute(&mut *tx)
        .await
        .map_err(|e| map_sqlx_error("update", e))?;

        tx.commit()
            .await
            .map_err(|e| map_sqlx_error("update.commit", e))?;
        Ok(product)
    }

    #[instrument(skip(self), fields(product_id = %product_id), err)]
    async fn delete(&self, product_id: ProductId) -> Result<Product, StoreError> {
        let row = sqlx::query(&format!(
            "DELETE FROM products WHERE product_id = $1 RETURNING {PRODUCT_COLUMNS}"
        ))
        .bind(product_id.value())
        .fetch_optional(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("delete", e))?
        .ok_or(StoreError::NotFound(product_id))?;

        decode_product(&row)
    }

    #[instrument(skip(self), fields(row_count = tracing::field::Empty), err)]
    async fn list_all(&self) -> Result<Vec<Product>, StoreError> {
        let rows = sqlx::query(&format!(
            "SELECT {PRODUCT_COLUMNS} FROM products ORDER BY created_seq ASC"
        ))
        .fetch_all(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("list_all", e))?;

        Span::current().record("row_count", rows.len());
        rows.iter().map(decode_product).collect()
    }

    #[instrument(skip(self), err)]
    async fn list_low_stock(&self) -> Result<Vec<Product>, StoreError> {
        let rows = sqlx::query(&format!(
            "SELECT {PRODUCT_COLUMNS} FROM products WHERE stock < reorder_level ORDER BY created_seq ASC"
        ))
        .fetch_all(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("list_low_stock", e))?;

        rows.iter().map(decode_product).collect()
    }
}

#[async_trait]
impl StockLedger for PostgresInventoryStore {
    #[instrument(skip(self, movement), fields(movement_id = %movement.movement_id), err)]
    async fn append(&self, movement: StockMovement) -> Result<StockMovement, StoreError> {
        insert_movement(&*self.pool, &movement).await?;
        Ok(movement)
    }

    #[instrument(skip(self), err)]
    async fn list_movements(&self, order: MovementOrder) -> Result<Vec<StockMovement>, StoreError> {
        let order_by = match order {
            MovementOrder::NewestFirst => "occurred_at DESC, recorded_seq DESC",
            MovementOrder::OldestFirst => "occurred_at ASC, recorded_seq ASC",
        };
        let rows = sqlx::query(&format!(
            "SELECT {MOVEMENT_COLUMNS} FROM stock_movements ORDER BY {order_by}"
        ))
        .fetch_all(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("list_movements", e))?;

        rows.iter().map(decode_movement).collect()
    }

    #[instrument(skip(self), fields(product_id = %product_id), err)]
    async fn list_for_product(&self, product_id: ProductId) -> Result<Vec<StockMovement>, StoreError> {
        let rows = sqlx::query(&format!(
            "SELECT {MOVEMENT_COLUMNS} FROM stock_movements WHERE product_id = $1 ORDER BY occurred_at ASC, recorded_seq ASC"
        ))
        .bind(product_id.value())
        .fetch_all(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("list_for_product", e))?;

        rows.iter().map(decode_movement).collect()
    }
}

#[async_trait]
impl InventoryStore for PostgresInventoryStore {
    #[instrument(
        skip(self, product, movement),
        fields(
            product_id = %product.id_typed(),
            movement_id = %movement.movement_id,
            expected_version = ?expected_version
        ),
        err
    )]
    async fn commit_movement(
        &self,
        product: &Product,
        expected_version: ExpectedVersion,
        movement: &StockMovement,
    ) -> Result<(), StoreError> {
        let id = product.id_typed();
        let expected = match expected_version {
            ExpectedVersion::Any => None,
            ExpectedVersion::Exact(v) => Some(version_to_db(v)?),
        };

        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| map_sqlx_error("commit_movement.begin", e))?;

        let updated = sqlx::query(
            r#"
            UPDATE products
            SET stock = $2, version = $3
            WHERE product_id = $1 AND ($4::BIGINT IS NULL OR version = $4)
            "#,
        )
        .bind(id.value())
        .bind(product.stock())
        .bind(version_to_db(product.version())?)
        .bind(expected)
        .execute(&mut *tx)
        .await
        .map_err(|e| {
            if is_check_violation(&e) {
                StoreError::insufficient_stock(product, movement)
            } else {
                map_sqlx_error("commit_movement.update", e)
            }
        })?
        .rows_affected();

        if updated == 0 {
            let exists = sqlx::query("SELECT 1 FROM products WHERE product_id = $1")
                .bind(id.value())
                .fetch_optional(&mut *tx)
                .await
                .map_err(|e| map_sqlx_error("commit_movement.exists", e))?
                .is_some();
            // Dropping `tx` rolls back.
            return Err(if exists {
                StoreError::Concurrency(format!(
                    "product {id}: expected {expected_version:?}, row has moved on"
                ))
            } else {
                StoreError::NotFound(id)
            });
        }

        insert_movement(&mut *tx, movement).await?;

        tx.commit()
            .await
            .map_err(|e| map_sqlx_error("commit_movement.commit", e))?;
        Ok(())
    }
}

async fn insert_movement<'e, E>(executor: E, movement: &StockMovement) -> Result<(), StoreError>
where
    E: sqlx::Executor<'e, Database = Postgres>,
{
    let total = movement.total_price.map(cents_to_db).transpose()?;
    sqlx::query(
        r#"
        INSERT INTO stock_movements
            (movement_id, product_id, product_name, movement_type, quantity, delta, total_price_cents, occurred_at)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
        "#,
    )
    .bind(movement.movement_id.as_uuid())
    .bind(movement.product_id.value())
    .bind(&movement.product_name)
    .bind(movement.movement_type.as_str())
    .bind(movement.quantity)
    .bind(movement.delta)
    .bind(total)
    .bind(movement.date)
    .execute(executor)
    .await
    .map_err(|e| {
        if is_unique_violation(&e) {
            StoreError::Concurrency(format!("movement {} already recorded", movement.movement_id))
        } else {
            map_sqlx_error("insert_movement", e)
        }
    })?;
    Ok(())
}

fn cents_to_db(cents: u64) -> Result<i64, StoreError> {
    i64::try_from(cents).map_err(|_| StoreError::Rejected(DomainError::validation("amount out of range")))
}

fn version_to_db(version: u64) -> Result<i64, StoreError> {
    i64::try_from(version).map_err(|_| StoreError::Corrupt(format!("version {version} out of range")))
}

/// Map SQLx errors to StoreError.
fn map_sqlx_error(operation: &str, err: sqlx::Error) -> StoreError {
    match err {
        sqlx::Error::Database(db_err) => {
            let msg = format!("database error in {}: {}", operation, db_err.message());
            match db_err.code().as_deref() {
                Some("23505") => StoreError::Concurrency(msg),
                Some("23514") => StoreError::Rejected(DomainError::invariant(msg)),
                _ => StoreError::Unavailable(msg),
            }
        }
        sqlx::Error::PoolClosed => {
            StoreError::Unavailable(format!("connection pool closed in {}", operation))
        }
        sqlx::Error::ColumnDecode { .. } | sqlx::Error::Decode(_) => {
            StoreError::Corrupt(format!("decode error in {}: {}", operation, err))
        }
        _ => StoreError::Unavailable(format!("sqlx error in {}: {}", operation, err)),
    }
}

fn is_unique_violation(err: &sqlx::Error) -> bool {
    has_sqlstate(err, "23505")
}

fn is_check_violation(err: &sqlx::Error) -> bool {
    has_sqlstate(err, "23514")
}

fn has_sqlstate(err: &sqlx::Error, sqlstate: &str) -> bool {
    match err {
        sqlx::Error::Database(db_err) => db_err.code().is_some_and(|code| code.as_ref() == sqlstate),
        _ => false,
    }
}

// SQLx row types

#[derive(Debug)]
struct ProductRow {
    product_id: i64,
    name: String,
    price_cents: i64,
    stock: i64,
    reorder_level: i64,
    category: String,
    version: i64,
}

impl<'r> FromRow<'r, sqlx::postgres::PgRow> for ProductRow {
    fn from_row(row: &'r sqlx::postgres::PgRow) -> Result<Self, sqlx::Error> {
        Ok(ProductRow {
            product_id: row.try_get("product_id")?,
            name: row.try_get("name")?,
            price_cents: row.try_get("price_cents")?,
            stock: row.try_get("stock")?,
            reorder_level: row.try_get("reorder_level")?,
            category: row.try_get("category")?,
            version: row.try_get("version")?,
        })
    }
}

impl TryFrom<ProductRow> for Product {
    type Error = StoreError;

    fn try_from(row: ProductRow) -> Result<Self, Self::Error> {
        let price = u64::try_from(row.price_cents)
            .ok()
            .and_then(|c| Price::new(c).ok())
            .ok_or_else(|| {
                StoreError::Corrupt(format!(
                    "product {} has invalid price {}",
                    row.product_id, row.price_cents
                ))
            })?;
        let version = u64::try_from(row.version).map_err(|_| {
            StoreError::Corrupt(format!("product {} has negative version", row.product_id))
        })?;
        Ok(Product::restore(
            ProductId::new(row.product_id),
            row.name,
            price,
            row.stock,
            row.reorder_level,
            row.category,
            version,
        ))
    }
}

#[derive(Debug)]
struct MovementRow {
    movement_id: uuid::Uuid,
    product_id: i64,
    product_name: String,
    movement_type: String,
    quantity: i64,
    delta: i64,
    total_price_cents: Option<i64>,
    occurred_at: DateTime<Utc>,
}

impl<'r> FromRow<'r, sqlx::postgres::PgRow> for MovementRow {
    fn from_row(row: &'r sqlx::postgres::PgRow) -> Result<Self, sqlx::Error> {
        Ok(MovementRow {
            movement_id: row.try_get("movement_id")?,
            product_id: row.try_get("product_id")?,
            product_name: row.try_get("product_name")?,
            movement_type: row.try_get("movement_type")?,
            quantity: row.try_get("quantity")?,
            delta: row.try_get("delta")?,
            total_price_cents: row.try_get("total_price_cents")?,
            occurred_at: row.try_get("occurred_at")?,
        })
    }
}

impl TryFrom<MovementRow> for StockMovement {
    type Error = StoreError;

    fn try_from(row: MovementRow) -> Result<Self, Self::Error> {
        let movement_type: MovementType = row.movement_type.parse().map_err(|e: DomainError| {
            StoreError::Corrupt(format!("movement {}: {e}", row.movement_id))
        })?;
        let total_price = row
            .total_price_cents
            .map(|c| {
                u64::try_from(c).map_err(|_| {
                    StoreError::Corrupt(format!("movement {} has negative total", row.movement_id))
                })
            })
            .transpose()?;
        Ok(StockMovement {
            movement_id: MovementId::from_uuid(row.movement_id),
            product_id: ProductId::new(row.product_id),
            product_name: row.product_name,
            movement_type,
            quantity: row.quantity,
            delta: row.delta,
            total_price,
            date: row.occurred_at,
        })
    }
}

fn decode_product(row: &sqlx::postgres::PgRow) -> Result<Product, StoreError> {
    ProductRow::from_row(row)
        .map_err(|e| StoreError::Corrupt(format!("failed to decode product row: {e}")))?
        .try_into()
}

fn decode_movement(row: &sqlx::postgres::PgRow) -> Result<StockMovement, StoreError> {
    MovementRow::from_row(row)
        .map_err(|e| StoreError::Corrupt(format!("failed to decode movement row: {e}")))?
        .try_into()
}
