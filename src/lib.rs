//! # Supplynet
//!
//! Core library for managing a supplier/retail hierarchy: network nodes
//! (factories, retail networks, individual entrepreneurs), the products
//! they distribute, and employee-based authorization.
//!
//! The interesting parts are the supplier-hierarchy engine and the debt
//! guard. The supplier relation is a self-referential tree: factories must
//! be roots, cycles are rejected at write time, and a node's `level` is
//! derived from its supplier chain on demand, never stored. The `debt`
//! field is system-managed — it cannot be set on create or update, only
//! reset through the explicit clear-debt operations.
//!
//! ## Quick start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use supplynet::{MemoryStore, NetworkService, Principal};
//!
//! let service = NetworkService::new(Arc::new(MemoryStore::new()));
//! let admin = Principal::superuser("admin");
//! # let _ = (service, admin);
//! ```
//!
//! The HTTP/admin layer lives outside this crate and talks to
//! [`NetworkService`]; swap [`MemoryStore`] for the PostgreSQL store
//! (`database` feature) in production.

pub mod debt;
pub mod error;
pub mod hierarchy;
pub mod level;
pub mod models;
pub mod policy;
pub mod service;
pub mod store;

// Re-exports for the common entry points
pub use debt::{BulkDebtCleared, DebtCleared};
pub use error::{AccessDenied, EntityKind, HierarchyError, NetworkError};
pub use level::LevelResolver;
pub use models::{
    Employee, NetworkNode, NetworkNodeUpdate, NewEmployee, NewNetworkNode, NewProduct, NodeType,
    NodeView, Product, ProductUpdate,
};
pub use policy::{Department, Operation, Principal};
pub use service::NetworkService;
pub use store::{EmployeeStore, MemoryStore, NetworkSummary, NodeStore, ProductStore};

#[cfg(feature = "database")]
pub use store::{DatabaseConfig, PgStore};
