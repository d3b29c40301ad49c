//! Domain models for the supply network
//!
//! This module contains the record types persisted by the stores and the
//! create/update DTOs accepted from callers. Update DTOs use a double-Option
//! representation for nullable fields so "set to null" and "leave unchanged"
//! stay distinguishable after deserialization.

pub mod employee;
pub mod node;
pub mod product;
pub(crate) mod serde_helpers;

// Re-export commonly used types for convenience
pub use employee::{Employee, NewEmployee};
pub use node::{NetworkNode, NetworkNodeUpdate, NewNetworkNode, NodeType, NodeView};
pub use product::{NewProduct, Product, ProductUpdate, NEW_PRODUCT_WINDOW_DAYS};
