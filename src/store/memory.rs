//! In-memory store
//!
//! Backs tests and embedded use. All writes take the single `RwLock` write
//! guard for their full duration, which makes every check-then-act sequence
//! (cycle validation, uniqueness checks, bulk debt clears) atomic with the
//! write that follows it.

use std::collections::{HashMap, HashSet};
use std::sync::RwLock;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::{Decimal, RoundingStrategy};
use tracing::debug;
use uuid::Uuid;

use crate::debt::{BulkDebtCleared, DebtCleared};
use crate::error::{EntityKind, NetworkError};
use crate::hierarchy::{self, ParentMap};
use crate::models::{
    Employee, NetworkNode, NetworkNodeUpdate, NewEmployee, NewNetworkNode, NewProduct, NodeType,
    Product, ProductUpdate,
};
use crate::store::{
    CountrySummary, EmployeeStore, NetworkSummary, NodeStore, ProductStore,
};

#[derive(Default)]
struct Inner {
    nodes: HashMap<Uuid, NetworkNode>,
    products: HashMap<Uuid, Product>,
    employees: HashMap<Uuid, Employee>,
}

impl Inner {
    fn parent_map(&self) -> ParentMap {
        self.nodes
            .values()
            .map(|node| (node.id, node.supplier_id))
            .collect()
    }

    fn check_email_free(&self, email: &str, except: Option<Uuid>) -> Result<(), NetworkError> {
        let taken = self
            .nodes
            .values()
            .any(|node| node.email == email && Some(node.id) != except);
        if taken {
            return Err(NetworkError::DuplicateEmail {
                email: email.to_string(),
            });
        }
        Ok(())
    }

    fn check_supplier_exists(&self, supplier_id: Option<Uuid>) -> Result<(), NetworkError> {
        if let Some(id) = supplier_id {
            if !self.nodes.contains_key(&id) {
                return Err(NetworkError::not_found(EntityKind::Node, id));
            }
        }
        Ok(())
    }

    fn check_products_exist(&self, ids: &[Uuid]) -> Result<(), NetworkError> {
        for id in ids {
            if !self.products.contains_key(id) {
                return Err(NetworkError::not_found(EntityKind::Product, *id));
            }
        }
        Ok(())
    }

    fn check_product_slot_free(
        &self,
        name: &str,
        model: &str,
        except: Option<Uuid>,
    ) -> Result<(), NetworkError> {
        let taken = self
            .products
            .values()
            .any(|p| p.name == name && p.model == model && Some(p.id) != except);
        if taken {
            return Err(NetworkError::DuplicateProduct {
                name: name.to_string(),
                model: model.to_string(),
            });
        }
        Ok(())
    }
}

/// Thread-safe in-memory implementation of all three store traits
#[derive(Default)]
pub struct MemoryStore {
    inner: RwLock<Inner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, Inner> {
        self.inner.read().expect("store lock poisoned")
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, Inner> {
        self.inner.write().expect("store lock poisoned")
    }
}

#[async_trait]
impl NodeStore for MemoryStore {
    async fn create_node(
        &self,
        new: NewNetworkNode,
        now: DateTime<Utc>,
    ) -> Result<NetworkNode, NetworkError> {
        let mut inner = self.write();

        hierarchy::validate(None, new.node_type, new.supplier_id, &inner.parent_map())?;
        inner.check_supplier_exists(new.supplier_id)?;
        inner.check_email_free(&new.email, None)?;
        inner.check_products_exist(&new.product_ids)?;

        let node = NetworkNode {
            id: Uuid::new_v4(),
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
        };
        debug!(node_id = %node.id, node_type = %node.node_type, "node created");
        inner.nodes.insert(node.id, node.clone());
        Ok(node)
    }

    async fn update_node(
        &self,
        id: Uuid,
        update: NetworkNodeUpdate,
        now: DateTime<Utc>,
    ) -> Result<NetworkNode, NetworkError> {
        let mut inner = self.write();

        let current = inner
            .nodes
            .get(&id)
            .cloned()
            .ok_or_else(|| NetworkError::not_found(EntityKind::Node, id))?;

        let merged = crate::store::merge_node_update(&current, update, now);

        let shape_changed = merged.node_type != current.node_type
            || merged.supplier_id != current.supplier_id;
        if shape_changed {
            hierarchy::validate(
                Some(id),
                merged.node_type,
                merged.supplier_id,
                &inner.parent_map(),
            )?;
            if merged.supplier_id != current.supplier_id {
                inner.check_supplier_exists(merged.supplier_id)?;
            }
        }

        if merged.email != current.email {
            inner.check_email_free(&merged.email, Some(id))?;
        }
        if merged.product_ids != current.product_ids {
            inner.check_products_exist(&merged.product_ids)?;
        }

        inner.nodes.insert(id, merged.clone());
        Ok(merged)
    }

    async fn delete_node(&self, id: Uuid) -> Result<(), NetworkError> {
        let mut inner = self.write();
        if inner.nodes.remove(&id).is_none() {
            return Err(NetworkError::not_found(EntityKind::Node, id));
        }
        // Dependents survive with their supplier reference cleared.
        for node in inner.nodes.values_mut() {
            if node.supplier_id == Some(id) {
                node.supplier_id = None;
            }
        }
        debug!(node_id = %id, "node deleted, dependents detached");
        Ok(())
    }

    async fn node(&self, id: Uuid) -> Result<Option<NetworkNode>, NetworkError> {
        Ok(self.read().nodes.get(&id).cloned())
    }

    async fn nodes(&self) -> Result<Vec<NetworkNode>, NetworkError> {
        let mut nodes: Vec<NetworkNode> = self.read().nodes.values().cloned().collect();
        nodes.sort_by(|a, b| a.name.cmp(&b.name).then(a.id.cmp(&b.id)));
        Ok(nodes)
    }

    async fn parent_map(&self) -> Result<ParentMap, NetworkError> {
        Ok(self.read().parent_map())
    }

    async fn assign_product(
        &self,
        node_id: Uuid,
        product_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<NetworkNode, NetworkError> {
        let mut inner = self.write();
        if !inner.products.contains_key(&product_id) {
            return Err(NetworkError::not_found(EntityKind::Product, product_id));
        }
        let node = inner
            .nodes
            .get_mut(&node_id)
            .ok_or_else(|| NetworkError::not_found(EntityKind::Node, node_id))?;
        if !node.product_ids.contains(&product_id) {
            node.product_ids.push(product_id);
            node.updated_at = now;
        }
        Ok(node.clone())
    }

    async fn remove_product(
        &self,
        node_id: Uuid,
        product_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<NetworkNode, NetworkError> {
        let mut inner = self.write();
        let node = inner
            .nodes
            .get_mut(&node_id)
            .ok_or_else(|| NetworkError::not_found(EntityKind::Node, node_id))?;
        let before = node.product_ids.len();
        node.product_ids.retain(|id| *id != product_id);
        if node.product_ids.len() != before {
            node.updated_at = now;
        }
        Ok(node.clone())
    }

    async fn set_debt(
        &self,
        id: Uuid,
        amount: Decimal,
        now: DateTime<Utc>,
    ) -> Result<NetworkNode, NetworkError> {
        let mut inner = self.write();
        let node = inner
            .nodes
            .get_mut(&id)
            .ok_or_else(|| NetworkError::not_found(EntityKind::Node, id))?;
        node.debt = amount;
        node.updated_at = now;
        Ok(node.clone())
    }

    async fn clear_debt(&self, id: Uuid, now: DateTime<Utc>) -> Result<DebtCleared, NetworkError> {
        let mut inner = self.write();
        let node = inner
            .nodes
            .get_mut(&id)
            .ok_or_else(|| NetworkError::not_found(EntityKind::Node, id))?;
        let old_debt = node.debt;
        node.debt = Decimal::ZERO;
        node.updated_at = now;
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
        let mut inner = self.write();
        let mut seen: HashSet<Uuid> = HashSet::new();
        let mut cleared_count = 0u64;
        let mut total_debt_cleared = Decimal::ZERO;
        for id in ids {
            if !seen.insert(*id) {
                continue;
            }
            if let Some(node) = inner.nodes.get_mut(id) {
                cleared_count += 1;
                total_debt_cleared += node.debt;
                node.debt = Decimal::ZERO;
                node.updated_at = now;
            }
        }
        Ok(BulkDebtCleared {
            cleared_count,
            total_debt_cleared,
        })
    }

    async fn summary(&self) -> Result<NetworkSummary, NetworkError> {
        let inner = self.read();
        let total = inner.nodes.len() as u64;
        let mut factories = 0;
        let mut retail_networks = 0;
        let mut entrepreneurs = 0;
        let mut with_supplier = 0;
        let mut total_debt = Decimal::ZERO;
        let mut countries: HashMap<String, (u64, Decimal)> = HashMap::new();

        for node in inner.nodes.values() {
            match node.node_type {
                NodeType::Factory => factories += 1,
                NodeType::RetailNetwork => retail_networks += 1,
                NodeType::IndividualEntrepreneur => entrepreneurs += 1,
            }
            if node.supplier_id.is_some() {
                with_supplier += 1;
            }
            total_debt += node.debt;
            let entry = countries
                .entry(node.country.clone())
                .or_insert((0, Decimal::ZERO));
            entry.0 += 1;
            entry.1 += node.debt;
        }

        // Postgres round() is half-away-from-zero; match it so both
        // backends report the same average.
        let average_debt = if total == 0 {
            Decimal::ZERO
        } else {
            (total_debt / Decimal::from(total)).round_dp_with_strategy(
                crate::debt::DEBT_SCALE,
                RoundingStrategy::MidpointAwayFromZero,
            )
        };

        let mut by_country: Vec<CountrySummary> = countries
            .into_iter()
            .map(|(country, (count, debt))| CountrySummary {
                country,
                count,
                total_debt: debt,
            })
            .collect();
        by_country.sort_by(|a, b| b.count.cmp(&a.count).then(a.country.cmp(&b.country)));

        Ok(NetworkSummary {
            total,
            factories,
            retail_networks,
            entrepreneurs,
            total_debt,
            average_debt,
            with_supplier,
            without_supplier: total - with_supplier,
            by_country,
        })
    }
}

#[async_trait]
impl ProductStore for MemoryStore {
    async fn create_product(
        &self,
        new: NewProduct,
        now: DateTime<Utc>,
    ) -> Result<Product, NetworkError> {
        let mut inner = self.write();
        inner.check_product_slot_free(&new.name, &new.model, None)?;

        let product = Product {
            id: Uuid::new_v4(),
            name: new.name,
            model: new.model,
            release_date: new.release_date,
            description: new.description,
            price: new.price,
            created_at: now,
            updated_at: now,
        };
        inner.products.insert(product.id, product.clone());
        Ok(product)
    }

    async fn update_product(
        &self,
        id: Uuid,
        update: ProductUpdate,
        now: DateTime<Utc>,
    ) -> Result<Product, NetworkError> {
        let mut inner = self.write();
        let current = inner
            .products
            .get(&id)
            .cloned()
            .ok_or_else(|| NetworkError::not_found(EntityKind::Product, id))?;

        let name = update.name.clone().unwrap_or(current.name);
        let model = update.model.clone().unwrap_or(current.model);
        inner.check_product_slot_free(&name, &model, Some(id))?;

        let product = inner.products.get_mut(&id).expect("product checked above");
        product.name = name;
        product.model = model;
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
        Ok(product.clone())
    }

    async fn delete_product(&self, id: Uuid) -> Result<(), NetworkError> {
        let mut inner = self.write();
        if inner.products.remove(&id).is_none() {
            return Err(NetworkError::not_found(EntityKind::Product, id));
        }
        for node in inner.nodes.values_mut() {
            node.product_ids.retain(|pid| *pid != id);
        }
        Ok(())
    }

    async fn product(&self, id: Uuid) -> Result<Option<Product>, NetworkError> {
        Ok(self.read().products.get(&id).cloned())
    }

    async fn products(&self) -> Result<Vec<Product>, NetworkError> {
        let mut products: Vec<Product> = self.read().products.values().cloned().collect();
        products.sort_by(|a, b| a.name.cmp(&b.name).then(a.model.cmp(&b.model)));
        Ok(products)
    }

    async fn products_by_ids(&self, ids: &[Uuid]) -> Result<Vec<Product>, NetworkError> {
        let inner = self.read();
        ids.iter()
            .map(|id| {
                inner
                    .products
                    .get(id)
                    .cloned()
                    .ok_or_else(|| NetworkError::not_found(EntityKind::Product, *id))
            })
            .collect()
    }
}

#[async_trait]
impl EmployeeStore for MemoryStore {
    async fn insert_employee(
        &self,
        new: NewEmployee,
        now: DateTime<Utc>,
    ) -> Result<Employee, NetworkError> {
        let mut inner = self.write();
        if inner
            .employees
            .values()
            .any(|e| e.username == new.username)
        {
            return Err(NetworkError::DuplicateUsername {
                username: new.username,
            });
        }
        if inner.employees.values().any(|e| e.email == new.email) {
            return Err(NetworkError::DuplicateEmail { email: new.email });
        }

        let employee = Employee {
            id: Uuid::new_v4(),
            username: new.username,
            full_name: new.full_name,
            email: new.email,
            department: new.department,
            position: new.position,
            is_active: true,
            hire_date: now.date_naive(),
            last_login: None,
        };
        inner.employees.insert(employee.id, employee.clone());
        Ok(employee)
    }

    async fn employee(&self, id: Uuid) -> Result<Option<Employee>, NetworkError> {
        Ok(self.read().employees.get(&id).cloned())
    }

    async fn employee_by_username(
        &self,
        username: &str,
    ) -> Result<Option<Employee>, NetworkError> {
        Ok(self
            .read()
            .employees
            .values()
            .find(|e| e.username == username)
            .cloned())
    }

    async fn employees(&self) -> Result<Vec<Employee>, NetworkError> {
        let mut employees: Vec<Employee> = self.read().employees.values().cloned().collect();
        employees.sort_by(|a, b| a.full_name.cmp(&b.full_name));
        Ok(employees)
    }

    async fn set_employee_active(
        &self,
        id: Uuid,
        active: bool,
    ) -> Result<Employee, NetworkError> {
        let mut inner = self.write();
        let employee = inner
            .employees
            .get_mut(&id)
            .ok_or_else(|| NetworkError::not_found(EntityKind::Employee, id))?;
        employee.is_active = active;
        Ok(employee.clone())
    }

    async fn touch_last_login(
        &self,
        id: Uuid,
        at: DateTime<Utc>,
    ) -> Result<(), NetworkError> {
        let mut inner = self.write();
        let employee = inner
            .employees
            .get_mut(&id)
            .ok_or_else(|| NetworkError::not_found(EntityKind::Employee, id))?;
        employee.last_login = Some(at);
        Ok(())
    }
}
