//! # Catalog Repository
//!
//! The product catalog and branch directory are maintained by other
//! services; the engine only reads them. Inserts exist for seeding and tests.

use sqlx::{SqliteConnection, SqlitePool};
use tracing::debug;

use duka_core::{Branch, CoreError, Product};

use crate::error::{DbError, DbResult};

/// Repository for branches and products.
#[derive(Debug, Clone)]
pub struct CatalogRepository {
    pool: SqlitePool,
}

impl CatalogRepository {
    pub fn new(pool: SqlitePool) -> Self {
        CatalogRepository { pool }
    }

    /// Inserts a branch.
    pub async fn insert_branch(&self, branch: &Branch) -> DbResult<()> {
        debug!(branch_id = %branch.id, name = %branch.name, "Inserting branch");

        sqlx::query("INSERT INTO branches (id, name, is_active, created_at) VALUES (?1, ?2, ?3, ?4)")
            .bind(&branch.id)
            .bind(&branch.name)
            .bind(branch.is_active)
            .bind(branch.created_at)
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    /// Inserts a product.
    pub async fn insert_product(&self, product: &Product) -> DbResult<()> {
        debug!(product_id = %product.id, sku = %product.sku, "Inserting product");

        sqlx::query(
            r#"
            INSERT INTO products (
                id, sku, name, selling_price_cents, min_price_cents,
                low_stock_threshold, is_active, created_at, updated_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
            "#,
        )
        .bind(&product.id)
        .bind(&product.sku)
        .bind(&product.name)
        .bind(product.selling_price_cents)
        .bind(product.min_price_cents)
        .bind(product.low_stock_threshold)
        .bind(product.is_active)
        .bind(product.created_at)
        .bind(product.updated_at)
        .execute(&self.pool)
        .await
        .map_err(|e| match DbError::from(e) {
            DbError::UniqueViolation { field, .. } if field.contains("sku") => {
                DbError::duplicate("sku", product.sku.clone())
            }
            other => other,
        })?;

        Ok(())
    }

    /// Gets a branch by ID.
    pub async fn get_branch(&self, id: &str) -> DbResult<Option<Branch>> {
        let branch = sqlx::query_as::<_, Branch>(
            "SELECT id, name, is_active, created_at FROM branches WHERE id = ?1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(branch)
    }

    /// Lists all branches by name.
    pub async fn list_branches(&self) -> DbResult<Vec<Branch>> {
        let branches = sqlx::query_as::<_, Branch>(
            "SELECT id, name, is_active, created_at FROM branches ORDER BY name",
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(branches)
    }

    /// Gets a product by ID.
    pub async fn get_product(&self, id: &str) -> DbResult<Option<Product>> {
        let mut conn = self.pool.acquire().await?;
        fetch_product(&mut conn, id).await
    }

    /// Number of products in the catalog.
    pub async fn count_products(&self) -> DbResult<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM products")
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }

    /// Activates or deactivates a product.
    pub async fn set_product_active(&self, id: &str, active: bool) -> DbResult<()> {
        let result = sqlx::query("UPDATE products SET is_active = ?2, updated_at = ?3 WHERE id = ?1")
            .bind(id)
            .bind(active)
            .bind(chrono::Utc::now())
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::not_found("Product", id));
        }
        Ok(())
    }

    /// Activates or deactivates a branch.
    pub async fn set_branch_active(&self, id: &str, active: bool) -> DbResult<()> {
        let result = sqlx::query("UPDATE branches SET is_active = ?2 WHERE id = ?1")
            .bind(id)
            .bind(active)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::not_found("Branch", id));
        }
        Ok(())
    }
}

// =============================================================================
// In-Transaction Lookups
// =============================================================================

async fn fetch_product(conn: &mut SqliteConnection, id: &str) -> DbResult<Option<Product>> {
    let product = sqlx::query_as::<_, Product>(
        r#"
        SELECT id, sku, name, selling_price_cents, min_price_cents,
               low_stock_threshold, is_active, created_at, updated_at
        FROM products
        WHERE id = ?1
        "#,
    )
    .bind(id)
    .fetch_optional(&mut *conn)
    .await?;
    Ok(product)
}

/// Loads a product that may be sold or moved.
pub async fn require_active_product(conn: &mut SqliteConnection, id: &str) -> DbResult<Product> {
    let product = fetch_product(conn, id)
        .await?
        .ok_or_else(|| CoreError::ProductNotFound(id.to_string()))?;

    if !product.is_active {
        return Err(CoreError::ProductInactive {
            product_id: product.id,
            name: product.name,
        }
        .into());
    }
    Ok(product)
}

/// Loads a branch that may trade.
pub async fn require_active_branch(conn: &mut SqliteConnection, id: &str) -> DbResult<Branch> {
    let branch = sqlx::query_as::<_, Branch>(
        "SELECT id, name, is_active, created_at FROM branches WHERE id = ?1",
    )
    .bind(id)
    .fetch_optional(&mut *conn)
    .await?
    .ok_or_else(|| CoreError::BranchNotFound(id.to_string()))?;

    if !branch.is_active {
        return Err(CoreError::BranchInactive {
            branch_id: branch.id,
            name: branch.name,
        }
        .into());
    }
    Ok(branch)
}

// =============================================================================
// Unit Tests
// =============================================================================
