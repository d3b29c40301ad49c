//! Persistence abstraction for the supply network
//!
//! Stores hold the network node, product and employee records and own the
//! write-time critical sections: structural validation (hierarchy rules,
//! email uniqueness) runs inside the same lock or transaction that applies
//! the write, so a concurrent reassignment cannot slip a cycle past the
//! check. Two implementations exist: the in-memory store used by tests and
//! embedders, and the PostgreSQL store behind the `database` feature.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use uuid::Uuid;

use crate::debt::{BulkDebtCleared, DebtCleared};
use crate::error::NetworkError;
use crate::hierarchy::ParentMap;
use crate::models::{
    Employee, NetworkNode, NetworkNodeUpdate, NewEmployee, NewNetworkNode, NewProduct, Product,
    ProductUpdate,
};

pub mod memory;
#[cfg(feature = "database")]
pub mod postgres;

pub use memory::MemoryStore;
#[cfg(feature = "database")]
pub use postgres::{DatabaseConfig, PgStore};

/// Aggregate report over the whole network
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NetworkSummary {
    pub total: u64,
    pub factories: u64,
    pub retail_networks: u64,
    pub entrepreneurs: u64,
    pub total_debt: Decimal,
    pub average_debt: Decimal,
    pub with_supplier: u64,
    pub without_supplier: u64,
    pub by_country: Vec<CountrySummary>,
}

/// Per-country rollup, ordered by node count descending
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CountrySummary {
    pub country: String,
    pub count: u64,
    pub total_debt: Decimal,
}

/// Apply a partial update to a node record, leaving `debt`, `id` and
/// `created_at` untouched. Shared by the store backends so both merge
/// fields the same way.
pub(crate) fn merge_node_update(
    current: &NetworkNode,
    update: NetworkNodeUpdate,
    now: DateTime<Utc>,
) -> NetworkNode {
    let mut node = current.clone();
    if let Some(name) = update.name {
        node.name = name;
    }
    if let Some(node_type) = update.node_type {
        node.node_type = node_type;
    }
    if let Some(supplier_id) = update.supplier_id {
        node.supplier_id = supplier_id;
    }
    if let Some(email) = update.email {
        node.email = email;
    }
    if let Some(phone) = update.phone {
        node.phone = phone;
    }
    if let Some(country) = update.country {
        node.country = country;
    }
    if let Some(city) = update.city {
        node.city = city;
    }
    if let Some(street) = update.street {
        node.street = street;
    }
    if let Some(house_number) = update.house_number {
        node.house_number = house_number;
    }
    if let Some(postal_code) = update.postal_code {
        node.postal_code = postal_code;
    }
    if let Some(product_ids) = update.product_ids {
        node.product_ids = product_ids;
    }
    node.updated_at = now;
    node
}

/// Network node persistence.
///
/// `create_node` and `update_node` enforce the structural invariants
/// (factory has no supplier, no cycles, unique email, supplier and product
/// references exist) atomically with the write. Debt-field protection is
/// the service layer's concern; these methods never touch `debt` except
/// through the dedicated debt operations.
#[async_trait]
pub trait NodeStore: Send + Sync {
    async fn create_node(
        &self,
        new: NewNetworkNode,
        now: DateTime<Utc>,
    ) -> Result<NetworkNode, NetworkError>;

    async fn update_node(
        &self,
        id: Uuid,
        update: NetworkNodeUpdate,
        now: DateTime<Utc>,
    ) -> Result<NetworkNode, NetworkError>;

    /// Delete a node; dependents keep existing but their supplier becomes
    /// null (no cascade).
    async fn delete_node(&self, id: Uuid) -> Result<(), NetworkError>;

    async fn node(&self, id: Uuid) -> Result<Option<NetworkNode>, NetworkError>;

    /// All nodes, ordered by name.
    async fn nodes(&self) -> Result<Vec<NetworkNode>, NetworkError>;

    /// Snapshot of the hierarchy shape for level resolution.
    async fn parent_map(&self) -> Result<ParentMap, NetworkError>;

    /// Add a product to a node's assortment, atomically with the existence
    /// checks. No-op when already assigned.
    async fn assign_product(
        &self,
        node_id: Uuid,
        product_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<NetworkNode, NetworkError>;

    /// Remove a product from a node's assortment. No-op when not assigned.
    async fn remove_product(
        &self,
        node_id: Uuid,
        product_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<NetworkNode, NetworkError>;

    /// Backend debt adjustment; the caller validates the amount.
    async fn set_debt(
        &self,
        id: Uuid,
        amount: Decimal,
        now: DateTime<Utc>,
    ) -> Result<NetworkNode, NetworkError>;

    async fn clear_debt(&self, id: Uuid, now: DateTime<Utc>) -> Result<DebtCleared, NetworkError>;

    /// Clear debt for every existing id in the list atomically. Unknown ids
    /// are skipped; the returned count reflects the rows actually cleared.
    async fn bulk_clear_debt(
        &self,
        ids: &[Uuid],
        now: DateTime<Utc>,
    ) -> Result<BulkDebtCleared, NetworkError>;

    async fn summary(&self) -> Result<NetworkSummary, NetworkError>;
}

/// Product persistence with (name, model) uniqueness
#[async_trait]
pub trait ProductStore: Send + Sync {
    async fn create_product(
        &self,
        new: NewProduct,
        now: DateTime<Utc>,
    ) -> Result<Product, NetworkError>;

    async fn update_product(
        &self,
        id: Uuid,
        update: ProductUpdate,
        now: DateTime<Utc>,
    ) -> Result<Product, NetworkError>;

    /// Delete a product and unlink it from every node that carries it.
    async fn delete_product(&self, id: Uuid) -> Result<(), NetworkError>;

    async fn product(&self, id: Uuid) -> Result<Option<Product>, NetworkError>;

    /// All products, ordered by (name, model).
    async fn products(&self) -> Result<Vec<Product>, NetworkError>;

    /// Resolve a set of product ids to records, preserving the input order.
    async fn products_by_ids(&self, ids: &[Uuid]) -> Result<Vec<Product>, NetworkError>;
}

/// Employee persistence
#[async_trait]
pub trait EmployeeStore: Send + Sync {
    async fn insert_employee(
        &self,
        new: NewEmployee,
        now: DateTime<Utc>,
    ) -> Result<Employee, NetworkError>;

    async fn employee(&self, id: Uuid) -> Result<Option<Employee>, NetworkError>;

    async fn employee_by_username(
        &self,
        username: &str,
    ) -> Result<Option<Employee>, NetworkError>;

    /// All employees, ordered by full name.
    async fn employees(&self) -> Result<Vec<Employee>, NetworkError>;

    async fn set_employee_active(
        &self,
        id: Uuid,
        active: bool,
    ) -> Result<Employee, NetworkError>;

    /// Record a successful authentication. Called only on the login path.
    async fn touch_last_login(
        &self,
        id: Uuid,
        at: DateTime<Utc>,
    ) -> Result<(), NetworkError>;
}
