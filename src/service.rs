//! Network service: the facade consumed by the HTTP/admin layer
//!
//! Every operation follows the same shape: resolve the acting principal,
//! authorize, run input validation that needs no storage state, then hand
//! the write to the store (which owns the structural checks) and derive the
//! response fields through the level resolver.

use std::sync::Arc;

use chrono::Utc;
use tracing::info;
use uuid::Uuid;

use crate::debt::{self, BulkDebtCleared, DebtCleared};
use crate::error::{AccessDenied, EntityKind, NetworkError};
use crate::level::LevelResolver;
use crate::models::node::validate_phone;
use crate::models::{
    Employee, NetworkNode, NetworkNodeUpdate, NewEmployee, NewNetworkNode, NewProduct, NodeView,
    Product, ProductUpdate,
};
use crate::policy::{self, Operation, Principal};
use crate::store::{EmployeeStore, NetworkSummary, NodeStore, ProductStore};
use rust_decimal::Decimal;

/// Orchestrates access policy, hierarchy validation, persistence and level
/// resolution over a single store backend.
pub struct NetworkService<S> {
    store: Arc<S>,
}

impl<S> Clone for NetworkService<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
        }
    }
}

impl<S> NetworkService<S>
where
    S: NodeStore + ProductStore + EmployeeStore,
{
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Check whether `principal` may perform `operation`. Never writes.
    pub async fn authorize(
        &self,
        principal: &Principal,
        operation: Operation,
    ) -> Result<(), NetworkError> {
        let employee = if principal.superuser {
            None
        } else {
            self.store.employee_by_username(&principal.username).await?
        };
        policy::authorize(principal, employee.as_ref(), operation)?;
        Ok(())
    }

    /// Authentication path: requires an active employee profile and records
    /// the login time. This is the only place `last_login` is written.
    pub async fn authenticate(&self, principal: &Principal) -> Result<Employee, NetworkError> {
        let mut employee = self
            .store
            .employee_by_username(&principal.username)
            .await?
            .ok_or_else(|| AccessDenied::NoProfile {
                username: principal.username.clone(),
            })?;
        if !employee.is_active {
            return Err(AccessDenied::AccountDeactivated {
                username: principal.username.clone(),
            }
            .into());
        }
        let now = Utc::now();
        self.store.touch_last_login(employee.id, now).await?;
        employee.last_login = Some(now);
        info!(username = %employee.username, "employee authenticated");
        Ok(employee)
    }

    // === Network nodes ===

    pub async fn create_node(
        &self,
        principal: &Principal,
        new: NewNetworkNode,
    ) -> Result<NodeView, NetworkError> {
        self.authorize(principal, Operation::Create).await?;
        if let Some(phone) = &new.phone {
            validate_phone(phone)?;
        }
        let node = self.store.create_node(new, Utc::now()).await?;
        info!(node_id = %node.id, node_type = %node.node_type, "network node created");
        self.view(node).await
    }

    pub async fn update_node(
        &self,
        principal: &Principal,
        id: Uuid,
        update: NetworkNodeUpdate,
    ) -> Result<NodeView, NetworkError> {
        self.authorize(principal, Operation::Update).await?;
        debt::guard_update(&update)?;
        if let Some(Some(phone)) = &update.phone {
            validate_phone(phone)?;
        }
        let node = self.store.update_node(id, update, Utc::now()).await?;
        self.view(node).await
    }

    pub async fn delete_node(
        &self,
        principal: &Principal,
        id: Uuid,
    ) -> Result<(), NetworkError> {
        self.authorize(principal, Operation::Delete).await?;
        self.store.delete_node(id).await?;
        info!(node_id = %id, "network node deleted");
        Ok(())
    }

    pub async fn get_node(
        &self,
        principal: &Principal,
        id: Uuid,
    ) -> Result<NodeView, NetworkError> {
        self.authorize(principal, Operation::Read).await?;
        let node = self
            .store
            .node(id)
            .await?
            .ok_or_else(|| NetworkError::not_found(EntityKind::Node, id))?;
        self.view(node).await
    }

    pub async fn list_nodes(
        &self,
        principal: &Principal,
    ) -> Result<Vec<NodeView>, NetworkError> {
        self.authorize(principal, Operation::Read).await?;
        let nodes = self.store.nodes().await?;
        let parents = self.store.parent_map().await?;
        let mut resolver = LevelResolver::new(&parents);

        let names: std::collections::HashMap<Uuid, String> = nodes
            .iter()
            .map(|node| (node.id, node.name.clone()))
            .collect();

        let mut views = Vec::with_capacity(nodes.len());
        for node in nodes {
            let level = resolver.level(node.id)?;
            let supplier_name = node
                .supplier_id
                .and_then(|supplier| names.get(&supplier).cloned());
            let products = self.store.products_by_ids(&node.product_ids).await?;
            views.push(NodeView {
                node,
                level,
                supplier_name,
                products,
            });
        }
        Ok(views)
    }

    /// Depth of the node in its supplier chain, computed on demand.
    pub async fn get_level(&self, principal: &Principal, id: Uuid) -> Result<u32, NetworkError> {
        self.authorize(principal, Operation::Read).await?;
        let parents = self.store.parent_map().await?;
        if !parents.contains_key(&id) {
            return Err(NetworkError::not_found(EntityKind::Node, id));
        }
        let mut resolver = LevelResolver::new(&parents);
        Ok(resolver.level(id)?)
    }

    // === Debt ===

    pub async fn clear_debt(
        &self,
        principal: &Principal,
        id: Uuid,
    ) -> Result<DebtCleared, NetworkError> {
        self.authorize(principal, Operation::ClearDebt).await?;
        let cleared = self.store.clear_debt(id, Utc::now()).await?;
        info!(node_id = %id, old_debt = %cleared.old_debt, "debt cleared");
        Ok(cleared)
    }

    pub async fn bulk_clear_debt(
        &self,
        principal: &Principal,
        ids: &[Uuid],
    ) -> Result<BulkDebtCleared, NetworkError> {
        self.authorize(principal, Operation::ClearDebt).await?;
        let cleared = self.store.bulk_clear_debt(ids, Utc::now()).await?;
        info!(
            cleared_count = cleared.cleared_count,
            total_debt_cleared = %cleared.total_debt_cleared,
            "bulk debt clear"
        );
        Ok(cleared)
    }

    /// Backend-only debt adjustment; never exposed through general update.
    pub async fn set_debt(
        &self,
        principal: &Principal,
        id: Uuid,
        amount: Decimal,
    ) -> Result<NetworkNode, NetworkError> {
        self.authorize(principal, Operation::ClearDebt).await?;
        let amount = debt::check_amount(amount)?;
        self.store.set_debt(id, amount, Utc::now()).await
    }

    // === Products ===

    pub async fn create_product(
        &self,
        principal: &Principal,
        new: NewProduct,
    ) -> Result<Product, NetworkError> {
        self.authorize(principal, Operation::Create).await?;
        self.store.create_product(new, Utc::now()).await
    }

    pub async fn update_product(
        &self,
        principal: &Principal,
        id: Uuid,
        update: ProductUpdate,
    ) -> Result<Product, NetworkError> {
        self.authorize(principal, Operation::Update).await?;
        self.store.update_product(id, update, Utc::now()).await
    }

    pub async fn delete_product(
        &self,
        principal: &Principal,
        id: Uuid,
    ) -> Result<(), NetworkError> {
        self.authorize(principal, Operation::Delete).await?;
        self.store.delete_product(id).await
    }

    pub async fn get_product(
        &self,
        principal: &Principal,
        id: Uuid,
    ) -> Result<Product, NetworkError> {
        self.authorize(principal, Operation::Read).await?;
        self.store
            .product(id)
            .await?
            .ok_or_else(|| NetworkError::not_found(EntityKind::Product, id))
    }

    pub async fn list_products(
        &self,
        principal: &Principal,
    ) -> Result<Vec<Product>, NetworkError> {
        self.authorize(principal, Operation::Read).await?;
        self.store.products().await
    }

    /// Add a product to a node's assortment. No-op if already assigned.
    pub async fn assign_product(
        &self,
        principal: &Principal,
        node_id: Uuid,
        product_id: Uuid,
    ) -> Result<NodeView, NetworkError> {
        self.authorize(principal, Operation::Update).await?;
        let node = self
            .store
            .assign_product(node_id, product_id, Utc::now())
            .await?;
        self.view(node).await
    }

    /// Remove a product from a node's assortment. No-op if not assigned.
    pub async fn remove_product(
        &self,
        principal: &Principal,
        node_id: Uuid,
        product_id: Uuid,
    ) -> Result<NodeView, NetworkError> {
        self.authorize(principal, Operation::Update).await?;
        let node = self
            .store
            .remove_product(node_id, product_id, Utc::now())
            .await?;
        self.view(node).await
    }

    // === Employees ===

    pub async fn register_employee(
        &self,
        principal: &Principal,
        new: NewEmployee,
    ) -> Result<Employee, NetworkError> {
        self.authorize(principal, Operation::ManageEmployees).await?;
        let employee = self.store.insert_employee(new, Utc::now()).await?;
        info!(username = %employee.username, department = %employee.department, "employee registered");
        Ok(employee)
    }

    pub async fn activate_employee(
        &self,
        principal: &Principal,
        id: Uuid,
    ) -> Result<Employee, NetworkError> {
        self.authorize(principal, Operation::ManageEmployees).await?;
        self.store.set_employee_active(id, true).await
    }

    pub async fn deactivate_employee(
        &self,
        principal: &Principal,
        id: Uuid,
    ) -> Result<Employee, NetworkError> {
        self.authorize(principal, Operation::ManageEmployees).await?;
        self.store.set_employee_active(id, false).await
    }

    /// Profile of the acting principal itself; no department gate, but the
    /// profile must exist.
    pub async fn current_employee(
        &self,
        principal: &Principal,
    ) -> Result<Employee, NetworkError> {
        self.store
            .employee_by_username(&principal.username)
            .await?
            .ok_or_else(|| {
                AccessDenied::NoProfile {
                    username: principal.username.clone(),
                }
                .into()
            })
    }

    pub async fn list_employees(
        &self,
        principal: &Principal,
    ) -> Result<Vec<Employee>, NetworkError> {
        self.authorize(principal, Operation::ManageEmployees).await?;
        self.store.employees().await
    }

    // === Reporting ===

    pub async fn network_summary(
        &self,
        principal: &Principal,
    ) -> Result<NetworkSummary, NetworkError> {
        self.authorize(principal, Operation::Read).await?;
        self.store.summary().await
    }

    /// Assemble the read model for one node: computed level, supplier name
    /// and resolved products.
    async fn view(&self, node: NetworkNode) -> Result<NodeView, NetworkError> {
        let parents = self.store.parent_map().await?;
        let mut resolver = LevelResolver::new(&parents);
        let level = resolver.level(node.id)?;
        let supplier_name = match node.supplier_id {
            Some(supplier_id) => self
                .store
                .node(supplier_id)
                .await?
                .map(|supplier| supplier.name),
            None => None,
        };
        let products = self.store.products_by_ids(&node.product_ids).await?;
        Ok(NodeView {
            node,
            level,
            supplier_name,
            products,
        })
    }
}
