//! PostgreSQL store
//!
//! Production persistence over a `PgPool`. Structural writes take a
//! transaction-scoped advisory lock so the cycle check and the row write
//! are serialized against concurrent supplier reassignments; debt
//! operations lock the affected rows within their own transaction. Schema
//! lives under `migrations/`.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::postgres::{PgPoolOptions, PgRow};
use sqlx::{PgPool, Row};
use tracing::{info, warn};
use uuid::Uuid;

use crate::debt::{BulkDebtCleared, DebtCleared};
use crate::error::{EntityKind, NetworkError};
use crate::hierarchy::{self, ParentMap};
use crate::models::{
    Employee, NetworkNode, NetworkNodeUpdate, NewEmployee, NewNetworkNode, NewProduct, NodeType,
    Product, ProductUpdate,
};
use crate::store::{
    merge_node_update, CountrySummary, EmployeeStore, NetworkSummary, NodeStore, ProductStore,
};

/// Advisory lock key serializing hierarchy-shaped writes.
const HIERARCHY_LOCK_KEY: i64 = 0x7375_706e_6574;

/// Database configuration, env-driven by default
#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    pub database_url: String,
    pub max_connections: u32,
    pub connection_timeout: Duration,
    pub idle_timeout: Option<Duration>,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            database_url: std::env::var("DATABASE_URL")
                .unwrap_or_else(|_| "postgresql://localhost:5432/supplynet".to_string()),
            max_connections: std::env::var("DATABASE_POOL_SIZE")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(10),
            connection_timeout: Duration::from_secs(30),
            idle_timeout: Some(Duration::from_secs(600)),
        }
    }
}

/// PostgreSQL-backed implementation of the store traits
#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Connect a new pool with the given configuration.
    pub async fn connect(config: DatabaseConfig) -> Result<Self, sqlx::Error> {
        info!(
            "connecting to database: {}",
            mask_database_url(&config.database_url)
        );

        let mut options = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .acquire_timeout(config.connection_timeout);
        if let Some(idle_timeout) = config.idle_timeout {
            options = options.idle_timeout(idle_timeout);
        }

        let pool = options.connect(&config.database_url).await.map_err(|e| {
            warn!("failed to connect to database: {e}");
            e
        })?;
        info!("database connection pool created");
        Ok(Self { pool })
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Apply the embedded migrations.
    pub async fn run_migrations(&self) -> Result<(), sqlx::migrate::MigrateError> {
        info!("running database migrations");
        sqlx::migrate!("./migrations").run(&self.pool).await
    }

    /// Connectivity probe.
    pub async fn test_connection(&self) -> Result<(), sqlx::Error> {
        sqlx::query("SELECT 1").fetch_one(&self.pool).await.map(|_| ())
    }
}

/// Hide credentials when logging connection targets.
fn mask_database_url(url: &str) -> String {
    match url.find('@') {
        Some(at) => match url.find("://") {
            Some(scheme) => format!("{}://***{}", &url[..scheme], &url[at..]),
            None => format!("***{}", &url[at..]),
        },
        None => url.to_string(),
    }
}

fn node_from_row(row: &PgRow, product_ids: Vec<Uuid>) -> Result<NetworkNode, sqlx::Error> {
    let node_type: String = row.get("node_type");
    let node_type = node_type
        .parse::<NodeType>()
        .map_err(|e| sqlx::Error::ColumnDecode {
            index: "node_type".into(),
            source: e.into(),
        })?;
    Ok(NetworkNode {
        id: row.get("id"),
        name: row.get("name"),
        node_type,
        supplier_id: row.get("supplier_id"),
        email: row.get("email"),
        phone: row.get("phone"),
        country: row.get("country"),
        city: row.get("city"),
        street: row.get("street"),
        house_number: row.get("house_number"),
        postal_code: row.get("postal_code"),
        product_ids,
        debt: row.get("debt"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    })
}

fn product_from_row(row: &PgRow) -> Product {
    Product {
        id: row.get("id"),
        name: row.get("name"),
        model: row.get("model"),
        release_date: row.get("release_date"),
        description: row.get("description"),
        price: row.get("price"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    }
}

fn employee_from_row(row: &PgRow) -> Employee {
    Employee {
        id: row.get("id"),
        username: row.get("username"),
        full_name: row.get("full_name"),
        email: row.get("email"),
        department: row.get("department"),
        position: row.get("position"),
        is_active: row.get("is_active"),
        hire_date: row.get("hire_date"),
        last_login: row.get("last_login"),
    }
}

const NODE_COLUMNS: &str = "id, name, node_type, supplier_id, email, phone, country, city, \
                            street, house_number, postal_code, debt, created_at, updated_at";

impl PgStore {
    async fn parent_map_tx(
        tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
    ) -> Result<ParentMap, sqlx::Error> {
        let rows = sqlx::query("SELECT id, supplier_id FROM network_nodes")
            .fetch_all(&mut **tx)
            .await?;
        Ok(rows
            .iter()
            .map(|row| (row.get("id"), row.get("supplier_id")))
            .collect())
    }

    async fn email_taken_tx(
        tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
        email: &str,
        except: Option<Uuid>,
    ) -> Result<bool, sqlx::Error> {
        sqlx::query_scalar::<_, bool>(
            "SELECT EXISTS(SELECT 1 FROM network_nodes WHERE email = $1 AND id IS DISTINCT FROM $2)",
        )
        .bind(email)
        .bind(except)
        .fetch_one(&mut **tx)
        .await
    }

    async fn check_products_exist_tx(
        tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
        ids: &[Uuid],
    ) -> Result<(), NetworkError> {
        for id in ids {
            let exists: bool =
                sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM products WHERE id = $1)")
                    .bind(id)
                    .fetch_one(&mut **tx)
                    .await?;
            if !exists {
                return Err(NetworkError::not_found(EntityKind::Product, *id));
            }
        }
        Ok(())
    }

    async fn node_product_ids(&self, id: Uuid) -> Result<Vec<Uuid>, sqlx::Error> {
        sqlx::query_scalar::<_, Uuid>(
            "SELECT product_id FROM node_products WHERE node_id = $1 ORDER BY product_id",
        )
        .bind(id)
        .fetch_all(&self.pool)
        .await
    }
}

#[async_trait]
impl NodeStore for PgStore {
    async fn create_node(
        &self,
        new: NewNetworkNode,
        now: DateTime<Utc>,
    ) -> Result<NetworkNode, NetworkError> {
        let mut tx = self.pool.begin().await?;
        sqlx::query("SELECT pg_advisory_xact_lock($1)")
            .bind(HIERARCHY_LOCK_KEY)
            .execute(&mut *tx)
            .await?;

        let parents = Self::parent_map_tx(&mut tx).await?;
        hierarchy::validate(None, new.node_type, new.supplier_id, &parents)?;
        if let Some(supplier_id) = new.supplier_id {
            if !parents.contains_key(&supplier_id) {
                return Err(NetworkError::not_found(EntityKind::Node, supplier_id));
            }
        }
        if Self::email_taken_tx(&mut tx, &new.email, None).await? {
            return Err(NetworkError::DuplicateEmail { email: new.email });
        }
        Self::check_products_exist_tx(&mut tx, &new.product_ids).await?;

        let id = Uuid::new_v4();
        sqlx::query(
            r#"INSERT INTO network_nodes (
                   id, name, node_type, supplier_id, email, phone,
                   country, city, street, house_number, postal_code,
                   debt, created_at, updated_at
               ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, 0, $12, $12)"#,
        )
        .bind(id)
        .bind(&new.name)
        .bind(new.node_type.as_str())
        .bind(new.supplier_id)
        .bind(&new.email)
        .bind(&new.phone)
        .bind(&new.country)
        .bind(&new.city)
        .bind(&new.street)
        .bind(&new.house_number)
        .bind(&new.postal_code)
        .bind(now)
        .execute(&mut *tx)
        .await?;

        for product_id in &new.product_ids {
            sqlx::query("INSERT INTO node_products (node_id, product_id) VALUES ($1, $2)")
                .bind(id)
                .bind(product_id)
                .execute(&mut *tx)
                .await?;
        }
        tx.commit().await?;

        Ok(NetworkNode {
            id,
            name: new.name,
            node_type: new.node_type,
            supplier_id: new.supplier_id,
            email: new.email,
            phone: new.phone,
            country: new.country,
            city: new.city,
            street: new.street,
            house_number: new.house_number,
            postal_code: new.postal_code,
            product_ids: new.product_ids,
            debt: Decimal::ZERO,
            created_at: now,
            updated_at: now,
        })
    }

    async fn update_node(
        &self,
        id: Uuid,
        update: NetworkNodeUpdate,
        now: DateTime<Utc>,
    ) -> Result<NetworkNode, NetworkError> {
        let mut tx = self.pool.begin().await?;
        sqlx::query("SELECT pg_advisory_xact_lock($1)")
            .bind(HIERARCHY_LOCK_KEY)
            .execute(&mut *tx)
            .await?;

        let row = sqlx::query(&format!(
            "SELECT {NODE_COLUMNS} FROM network_nodes WHERE id = $1 FOR UPDATE"
        ))
        .bind(id)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or_else(|| NetworkError::not_found(EntityKind::Node, id))?;

        let product_ids = sqlx::query_scalar::<_, Uuid>(
            "SELECT product_id FROM node_products WHERE node_id = $1 ORDER BY product_id",
        )
        .bind(id)
        .fetch_all(&mut *tx)
        .await?;
        let current = node_from_row(&row, product_ids)?;

        let merged = merge_node_update(&current, update, now);

        let shape_changed = merged.node_type != current.node_type
            || merged.supplier_id != current.supplier_id;
        if shape_changed {
            let parents = Self::parent_map_tx(&mut tx).await?;
            hierarchy::validate(Some(id), merged.node_type, merged.supplier_id, &parents)?;
            if merged.supplier_id != current.supplier_id {
                if let Some(supplier_id) = merged.supplier_id {
                    if !parents.contains_key(&supplier_id) {
                        return Err(NetworkError::not_found(EntityKind::Node, supplier_id));
                    }
                }
            }
        }
        if merged.email != current.email
            && Self::email_taken_tx(&mut tx, &merged.email, Some(id)).await?
        {
            return Err(NetworkError::DuplicateEmail {
                email: merged.email,
            });
        }
        if merged.product_ids != current.product_ids {
            Self::check_products_exist_tx(&mut tx, &merged.product_ids).await?;
        }

        sqlx::query(
            r#"UPDATE network_nodes SET
                   name = $2, node_type = $3, supplier_id = $4, email = $5,
                   phone = $6, country = $7, city = $8, street = $9,
                   house_number = $10, postal_code = $11, updated_at = $12
               WHERE id = $1"#,
        )
        .bind(id)
        .bind(&merged.name)
        .bind(merged.node_type.as_str())
        .bind(merged.supplier_id)
        .bind(&merged.email)
        .bind(&merged.phone)
        .bind(&merged.country)
        .bind(&merged.city)
        .bind(&merged.street)
        .bind(&merged.house_number)
        .bind(&merged.postal_code)
        .bind(now)
        .execute(&mut *tx)
        .await?;

        if merged.product_ids != current.product_ids {
            sqlx::query("DELETE FROM node_products WHERE node_id = $1")
                .bind(id)
                .execute(&mut *tx)
                .await?;
            for product_id in &merged.product_ids {
                sqlx::query("INSERT INTO node_products (node_id, product_id) VALUES ($1, $2)")
                    .bind(id)
                    .bind(product_id)
                    .execute(&mut *tx)
                    .await?;
            }
        }
        tx.commit().await?;
        Ok(merged)
    }

    async fn delete_node(&self, id: Uuid) -> Result<(), NetworkError> {
        let mut tx = self.pool.begin().await?;
        sqlx::query("SELECT pg_advisory_xact_lock($1)")
            .bind(HIERARCHY_LOCK_KEY)
            .execute(&mut *tx)
            .await?;

        // The FK is ON DELETE SET NULL; the explicit update keeps the
        // detach visible in one place.
        sqlx::query("UPDATE network_nodes SET supplier_id = NULL WHERE supplier_id = $1")
            .bind(id)
            .execute(&mut *tx)
            .await?;
        let deleted = sqlx::query("DELETE FROM network_nodes WHERE id = $1")
            .bind(id)
            .execute(&mut *tx)
            .await?;
        if deleted.rows_affected() == 0 {
            return Err(NetworkError::not_found(EntityKind::Node, id));
        }
        tx.commit().await?;
        Ok(())
    }

    async fn node(&self, id: Uuid) -> Result<Option<NetworkNode>, NetworkError> {
        let row = sqlx::query(&format!(
            "SELECT {NODE_COLUMNS} FROM network_nodes WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        match row {
            Some(row) => {
                let product_ids = self.node_product_ids(id).await?;
                Ok(Some(node_from_row(&row, product_ids)?))
            }
            None => Ok(None),
        }
    }

    async fn nodes(&self) -> Result<Vec<NetworkNode>, NetworkError> {
        let rows = sqlx::query(&format!(
            "SELECT {NODE_COLUMNS} FROM network_nodes ORDER BY name, id"
        ))
        .fetch_all(&self.pool)
        .await?;

        let links = sqlx::query("SELECT node_id, product_id FROM node_products")
            .fetch_all(&self.pool)
            .await?;
        let mut products_by_node: HashMap<Uuid, Vec<Uuid>> = HashMap::new();
        for link in &links {
            products_by_node
                .entry(link.get("node_id"))
                .or_default()
                .push(link.get("product_id"));
        }

        rows.iter()
            .map(|row| {
                let id: Uuid = row.get("id");
                let product_ids = products_by_node.remove(&id).unwrap_or_default();
                node_from_row(row, product_ids).map_err(NetworkError::from)
            })
            .collect()
    }

    async fn parent_map(&self) -> Result<ParentMap, NetworkError> {
        let rows = sqlx::query("SELECT id, supplier_id FROM network_nodes")
            .fetch_all(&self.pool)
            .await?;
        Ok(rows
            .iter()
            .map(|row| (row.get("id"), row.get("supplier_id")))
            .collect())
    }

    async fn assign_product(
        &self,
        node_id: Uuid,
        product_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<NetworkNode, NetworkError> {
        let mut tx = self.pool.begin().await?;
        let row = sqlx::query(&format!(
            "SELECT {NODE_COLUMNS} FROM network_nodes WHERE id = $1 FOR UPDATE"
        ))
        .bind(node_id)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or_else(|| NetworkError::not_found(EntityKind::Node, node_id))?;

        let exists: bool =
            sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM products WHERE id = $1)")
                .bind(product_id)
                .fetch_one(&mut *tx)
                .await?;
        if !exists {
            return Err(NetworkError::not_found(EntityKind::Product, product_id));
        }

        let inserted = sqlx::query(
            "INSERT INTO node_products (node_id, product_id) VALUES ($1, $2) ON CONFLICT DO NOTHING",
        )
        .bind(node_id)
        .bind(product_id)
        .execute(&mut *tx)
        .await?;
        if inserted.rows_affected() > 0 {
            sqlx::query("UPDATE network_nodes SET updated_at = $2 WHERE id = $1")
                .bind(node_id)
                .bind(now)
                .execute(&mut *tx)
                .await?;
        }

        let product_ids = sqlx::query_scalar::<_, Uuid>(
            "SELECT product_id FROM node_products WHERE node_id = $1 ORDER BY product_id",
        )
        .bind(node_id)
        .fetch_all(&mut *tx)
        .await?;
        tx.commit().await?;

        let mut node = node_from_row(&row, product_ids)?;
        if inserted.rows_affected() > 0 {
            node.updated_at = now;
        }
        Ok(node)
    }

    async fn remove_product(
        &self,
        node_id: Uuid,
        product_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<NetworkNode, NetworkError> {
        let mut tx = self.pool.begin().await?;
        let row = sqlx::query(&format!(
            "SELECT {NODE_COLUMNS} FROM network_nodes WHERE id = $1 FOR UPDATE"
        ))
        .bind(node_id)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or_else(|| NetworkError::not_found(EntityKind::Node, node_id))?;

        let deleted = sqlx::query(
            "DELETE FROM node_products WHERE node_id = $1 AND product_id = $2",
        )
        .bind(node_id)
        .bind(product_id)
        .execute(&mut *tx)
        .await?;
        if deleted.rows_affected() > 0 {
            sqlx::query("UPDATE network_nodes SET updated_at = $2 WHERE id = $1")
                .bind(node_id)
                .bind(now)
                .execute(&mut *tx)
                .await?;
        }

        let product_ids = sqlx::query_scalar::<_, Uuid>(
            "SELECT product_id FROM node_products WHERE node_id = $1 ORDER BY product_id",
        )
        .bind(node_id)
        .fetch_all(&mut *tx)
        .await?;
        tx.commit().await?;

        let mut node = node_from_row(&row, product_ids)?;
        if deleted.rows_affected() > 0 {
            node.updated_at = now;
        }
        Ok(node)
    }

    async fn set_debt(
        &self,
        id: Uuid,
        amount: Decimal,
        now: DateTime<Utc>,
    ) -> Result<NetworkNode, NetworkError> {
        let updated = sqlx::query(
            "UPDATE network_nodes SET debt = $2, updated_at = $3 WHERE id = $1",
        )
        .bind(id)
        .bind(amount)
        .bind(now)
        .execute(&self.pool)
        .await?;
        if updated.rows_affected() == 0 {
            return Err(NetworkError::not_found(EntityKind::Node, id));
        }
        self.node(id)
            .await?
            .ok_or_else(|| NetworkError::not_found(EntityKind::Node, id))
    }

    async fn clear_debt(&self, id: Uuid, now: DateTime<Utc>) -> Result<DebtCleared, NetworkError> {
        let mut tx = self.pool.begin().await?;
        let old_debt: Decimal =
            sqlx::query_scalar("SELECT debt FROM network_nodes WHERE id = $1 FOR UPDATE")
                .bind(id)
                .fetch_optional(&mut *tx)
                .await?
                .ok_or_else(|| NetworkError::not_found(EntityKind::Node, id))?;
        sqlx::query("UPDATE network_nodes SET debt = 0, updated_at = $2 WHERE id = $1")
            .bind(id)
            .bind(now)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;
        Ok(DebtCleared {
            old_debt,
            new_debt: Decimal::ZERO,
        })
    }

    async fn bulk_clear_debt(
        &self,
        ids: &[Uuid],
        now: DateTime<Utc>,
    ) -> Result<BulkDebtCleared, NetworkError> {
        let ids: Vec<Uuid> = ids.to_vec();
        let mut tx = self.pool.begin().await?;
        let rows = sqlx::query(
            "SELECT id, debt FROM network_nodes WHERE id = ANY($1) FOR UPDATE",
        )
        .bind(&ids)
        .fetch_all(&mut *tx)
        .await?;

        let cleared_count = rows.len() as u64;
        let total_debt_cleared = rows
            .iter()
            .fold(Decimal::ZERO, |acc, row| acc + row.get::<Decimal, _>("debt"));

        sqlx::query("UPDATE network_nodes SET debt = 0, updated_at = $2 WHERE id = ANY($1)")
            .bind(&ids)
            .bind(now)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;

        Ok(BulkDebtCleared {
            cleared_count,
            total_debt_cleared,
        })
    }

    async fn summary(&self) -> Result<NetworkSummary, NetworkError> {
        let row = sqlx::query(
            r#"SELECT
                   count(*) AS total,
                   count(*) FILTER (WHERE node_type = 'factory') AS factories,
                   count(*) FILTER (WHERE node_type = 'retail_network') AS retail_networks,
                   count(*) FILTER (WHERE node_type = 'individual_entrepreneur') AS entrepreneurs,
                   COALESCE(sum(debt), 0) AS total_debt,
                   COALESCE(round(avg(debt), 2), 0) AS average_debt,
                   count(*) FILTER (WHERE supplier_id IS NOT NULL) AS with_supplier,
                   count(*) FILTER (WHERE supplier_id IS NULL) AS without_supplier
               FROM network_nodes"#,
        )
        .fetch_one(&self.pool)
        .await?;

        let country_rows = sqlx::query(
            r#"SELECT country, count(*) AS count, COALESCE(sum(debt), 0) AS total_debt
               FROM network_nodes
               GROUP BY country
               ORDER BY count DESC, country"#,
        )
        .fetch_all(&self.pool)
        .await?;

        let by_country = country_rows
            .iter()
            .map(|row| CountrySummary {
                country: row.get("country"),
                count: row.get::<i64, _>("count") as u64,
                total_debt: row.get("total_debt"),
            })
            .collect();

        Ok(NetworkSummary {
            total: row.get::<i64, _>("total") as u64,
            factories: row.get::<i64, _>("factories") as u64,
            retail_networks: row.get::<i64, _>("retail_networks") as u64,
            entrepreneurs: row.get::<i64, _>("entrepreneurs") as u64,
            total_debt: row.get("total_debt"),
            average_debt: row.get("average_debt"),
            with_supplier: row.get::<i64, _>("with_supplier") as u64,
            without_supplier: row.get::<i64, _>("without_supplier") as u64,
            by_country,
        })
    }
}

#[async_trait]
impl ProductStore for PgStore {
    async fn create_product(
        &self,
        new: NewProduct,
        now: DateTime<Utc>,
    ) -> Result<Product, NetworkError> {
        let mut tx = self.pool.begin().await?;
        let taken: bool = sqlx::query_scalar(
            "SELECT EXISTS(SELECT 1 FROM products WHERE name = $1 AND model = $2)",
        )
        .bind(&new.name)
        .bind(&new.model)
        .fetch_one(&mut *tx)
        .await?;
        if taken {
            return Err(NetworkError::DuplicateProduct {
                name: new.name,
                model: new.model,
            });
        }

        let id = Uuid::new_v4();
        sqlx::query(
            r#"INSERT INTO products (id, name, model, release_date, description, price, created_at, updated_at)
               VALUES ($1, $2, $3, $4, $5, $6, $7, $7)"#,
        )
        .bind(id)
        .bind(&new.name)
        .bind(&new.model)
        .bind(new.release_date)
        .bind(&new.description)
        .bind(new.price)
        .bind(now)
        .execute(&mut *tx)
        .await?;
        tx.commit().await?;

        Ok(Product {
            id,
            name: new.name,
            model: new.model,
            release_date: new.release_date,
            description: new.description,
            price: new.price,
            created_at: now,
            updated_at: now,
        })
    }

    async fn update_product(
        &self,
        id: Uuid,
        update: ProductUpdate,
        now: DateTime<Utc>,
    ) -> Result<Product, NetworkError> {
        let mut tx = self.pool.begin().await?;
        let row = sqlx::query("SELECT * FROM products WHERE id = $1 FOR UPDATE")
            .bind(id)
            .fetch_optional(&mut *tx)
            .await?
            .ok_or_else(|| NetworkError::not_found(EntityKind::Product, id))?;
        let mut product = product_from_row(&row);

        if let Some(name) = update.name {
            product.name = name;
        }
        if let Some(model) = update.model {
            product.model = model;
        }
        if let Some(release_date) = update.release_date {
            product.release_date = release_date;
        }
        if let Some(description) = update.description {
            product.description = description;
        }
        if let Some(price) = update.price {
            product.price = price;
        }
        product.updated_at = now;

        let taken: bool = sqlx::query_scalar(
            "SELECT EXISTS(SELECT 1 FROM products WHERE name = $1 AND model = $2 AND id <> $3)",
        )
        .bind(&product.name)
        .bind(&product.model)
        .bind(id)
        .fetch_one(&mut *tx)
        .await?;
        if taken {
            return Err(NetworkError::DuplicateProduct {
                name: product.name,
                model: product.model,
            });
        }

        sqlx::query(
            r#"UPDATE products SET
                   name = $2, model = $3, release_date = $4,
                   description = $5, price = $6, updated_at = $7
               WHERE id = $1"#,
        )
        .bind(id)
        .bind(&product.name)
        .bind(&product.model)
        .bind(product.release_date)
        .bind(&product.description)
        .bind(product.price)
        .bind(now)
        .execute(&mut *tx)
        .await?;
        tx.commit().await?;
        Ok(product)
    }

    async fn delete_product(&self, id: Uuid) -> Result<(), NetworkError> {
        // node_products rows go with it via ON DELETE CASCADE.
        let deleted = sqlx::query("DELETE FROM products WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        if deleted.rows_affected() == 0 {
            return Err(NetworkError::not_found(EntityKind::Product, id));
        }
        Ok(())
    }

    async fn product(&self, id: Uuid) -> Result<Option<Product>, NetworkError> {
        let row = sqlx::query("SELECT * FROM products WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.as_ref().map(product_from_row))
    }

    async fn products(&self) -> Result<Vec<Product>, NetworkError> {
        let rows = sqlx::query("SELECT * FROM products ORDER BY name, model")
            .fetch_all(&self.pool)
            .await?;
        Ok(rows.iter().map(product_from_row).collect())
    }

    async fn products_by_ids(&self, ids: &[Uuid]) -> Result<Vec<Product>, NetworkError> {
        let id_list: Vec<Uuid> = ids.to_vec();
        let rows = sqlx::query("SELECT * FROM products WHERE id = ANY($1)")
            .bind(&id_list)
            .fetch_all(&self.pool)
            .await?;
        let by_id: HashMap<Uuid, Product> = rows
            .iter()
            .map(|row| {
                let product = product_from_row(row);
                (product.id, product)
            })
            .collect();
        ids.iter()
            .map(|id| {
                by_id
                    .get(id)
                    .cloned()
                    .ok_or_else(|| NetworkError::not_found(EntityKind::Product, *id))
            })
            .collect()
    }
}

#[async_trait]
impl EmployeeStore for PgStore {
    async fn insert_employee(
        &self,
        new: NewEmployee,
        now: DateTime<Utc>,
    ) -> Result<Employee, NetworkError> {
        let mut tx = self.pool.begin().await?;
        let username_taken: bool =
            sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM employees WHERE username = $1)")
                .bind(&new.username)
                .fetch_one(&mut *tx)
                .await?;
        if username_taken {
            return Err(NetworkError::DuplicateUsername {
                username: new.username,
            });
        }
        let email_taken: bool =
            sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM employees WHERE email = $1)")
                .bind(&new.email)
                .fetch_one(&mut *tx)
                .await?;
        if email_taken {
            return Err(NetworkError::DuplicateEmail { email: new.email });
        }

        let id = Uuid::new_v4();
        let hire_date = now.date_naive();
        sqlx::query(
            r#"INSERT INTO employees (id, username, full_name, email, department, position, is_active, hire_date, last_login)
               VALUES ($1, $2, $3, $4, $5, $6, TRUE, $7, NULL)"#,
        )
        .bind(id)
        .bind(&new.username)
        .bind(&new.full_name)
        .bind(&new.email)
        .bind(&new.department)
        .bind(&new.position)
        .bind(hire_date)
        .execute(&mut *tx)
        .await?;
        tx.commit().await?;

        Ok(Employee {
            id,
            username: new.username,
            full_name: new.full_name,
            email: new.email,
            department: new.department,
            position: new.position,
            is_active: true,
            hire_date,
            last_login: None,
        })
    }

    async fn employee(&self, id: Uuid) -> Result<Option<Employee>, NetworkError> {
        let row = sqlx::query("SELECT * FROM employees WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.as_ref().map(employee_from_row))
    }

    async fn employee_by_username(
        &self,
        username: &str,
    ) -> Result<Option<Employee>, NetworkError> {
        let row = sqlx::query("SELECT * FROM employees WHERE username = $1")
            .bind(username)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.as_ref().map(employee_from_row))
    }

    async fn employees(&self) -> Result<Vec<Employee>, NetworkError> {
        let rows = sqlx::query("SELECT * FROM employees ORDER BY full_name")
            .fetch_all(&self.pool)
            .await?;
        Ok(rows.iter().map(employee_from_row).collect())
    }

    async fn set_employee_active(
        &self,
        id: Uuid,
        active: bool,
    ) -> Result<Employee, NetworkError> {
        let updated = sqlx::query("UPDATE employees SET is_active = $2 WHERE id = $1")
            .bind(id)
            .bind(active)
            .execute(&self.pool)
            .await?;
        if updated.rows_affected() == 0 {
            return Err(NetworkError::not_found(EntityKind::Employee, id));
        }
        self.employee(id)
            .await?
            .ok_or_else(|| NetworkError::not_found(EntityKind::Employee, id))
    }

    async fn touch_last_login(
        &self,
        id: Uuid,
        at: DateTime<Utc>,
    ) -> Result<(), NetworkError> {
        let updated = sqlx::query("UPDATE employees SET last_login = $2 WHERE id = $1")
            .bind(id)
            .bind(at)
            .execute(&self.pool)
            .await?;
        if updated.rows_affected() == 0 {
            return Err(NetworkError::not_found(EntityKind::Employee, id));
        }
        Ok(())
    }
}
