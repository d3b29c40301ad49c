//! Error taxonomy for the supply network core
//!
//! All validation errors are detected before any write: a failed operation
//! leaves no partial state behind. Structural errors (`HierarchyError`) and
//! authorization denials (`AccessDenied`) are focused sub-enums folded into
//! the top-level `NetworkError` via `#[from]`.

use rust_decimal::Decimal;
use thiserror::Error;
use uuid::Uuid;

use crate::policy::Operation;

/// Structural invariant violations in the supplier hierarchy
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum HierarchyError {
    #[error("a factory cannot have a supplier")]
    InvalidSupplierForFactory,

    #[error("cyclic supplier chain detected for node {node_id}")]
    CyclicSupplierChain { node_id: Uuid },

    #[error("supplier chain for node {node_id} did not terminate within {max_hops} hops")]
    UnresolvableLevel { node_id: Uuid, max_hops: usize },
}

/// Authorization denials, with the reason preserved for display
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AccessDenied {
    #[error("no employee profile is linked to user '{username}'")]
    NoProfile { username: String },

    #[error("employee account '{username}' is deactivated")]
    AccountDeactivated { username: String },

    #[error("department '{department}' is not permitted to perform {operation}")]
    InsufficientDepartment {
        department: String,
        operation: Operation,
    },
}

/// Kind of entity referenced by a lookup that failed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntityKind {
    Node,
    Product,
    Employee,
}

impl std::fmt::Display for EntityKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EntityKind::Node => write!(f, "network node"),
            EntityKind::Product => write!(f, "product"),
            EntityKind::Employee => write!(f, "employee"),
        }
    }
}

/// Top-level error type for all core operations
#[derive(Debug, Error)]
pub enum NetworkError {
    #[error(transparent)]
    Hierarchy(#[from] HierarchyError),

    #[error("access denied: {0}")]
    Access(#[from] AccessDenied),

    #[error("the debt field cannot be modified through a general update")]
    DebtFieldImmutable,

    #[error("debt cannot be negative (got {amount})")]
    NegativeDebt { amount: Decimal },

    #[error("a network node with email '{email}' already exists")]
    DuplicateEmail { email: String },

    #[error("a product named '{name}' with model '{model}' already exists")]
    DuplicateProduct { name: String, model: String },

    #[error("an employee with username '{username}' already exists")]
    DuplicateUsername { username: String },

    #[error("phone number '{phone}' is not valid (expected up to 15 digits with an optional leading '+')")]
    InvalidPhone { phone: String },

    #[error("{kind} {id} not found")]
    NotFound { kind: EntityKind, id: Uuid },

    #[cfg(feature = "database")]
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

impl NetworkError {
    /// Convenience constructor for lookup failures
    pub fn not_found(kind: EntityKind, id: Uuid) -> Self {
        NetworkError::NotFound { kind, id }
    }
}
