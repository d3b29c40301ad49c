//! Network node records and DTOs
//!
//! A network node is one link in the supply chain: a factory, a retail
//! network or an individual entrepreneur. Nodes reference their supplier
//! (the upstream link) by id; the depth of that chain is never stored, it
//! is computed on demand by the level resolver.

use std::sync::OnceLock;

use chrono::{DateTime, Utc};
use regex::Regex;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::NetworkError;
use crate::models::product::Product;
use crate::models::serde_helpers::double_option;

/// Position of a node in the supply chain
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeType {
    Factory,
    RetailNetwork,
    IndividualEntrepreneur,
}

impl NodeType {
    pub fn as_str(&self) -> &'static str {
        match self {
            NodeType::Factory => "factory",
            NodeType::RetailNetwork => "retail_network",
            NodeType::IndividualEntrepreneur => "individual_entrepreneur",
        }
    }
}

impl std::fmt::Display for NodeType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for NodeType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "factory" => Ok(NodeType::Factory),
            "retail_network" => Ok(NodeType::RetailNetwork),
            "individual_entrepreneur" => Ok(NodeType::IndividualEntrepreneur),
            other => Err(format!("unknown node type '{other}'")),
        }
    }
}

/// Persisted network node record
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NetworkNode {
    pub id: Uuid,
    pub name: String,
    pub node_type: NodeType,
    pub supplier_id: Option<Uuid>,
    pub email: String,
    pub phone: Option<String>,
    pub country: String,
    pub city: String,
    pub street: String,
    pub house_number: String,
    pub postal_code: Option<String>,
    pub product_ids: Vec<Uuid>,
    pub debt: Decimal,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Input for creating a network node.
///
/// Deliberately carries no `debt` field: a raw payload that smuggles one in
/// has it dropped during deserialization, and every node starts at zero.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewNetworkNode {
    pub name: String,
    pub node_type: NodeType,
    #[serde(default)]
    pub supplier_id: Option<Uuid>,
    pub email: String,
    #[serde(default)]
    pub phone: Option<String>,
    pub country: String,
    pub city: String,
    pub street: String,
    pub house_number: String,
    #[serde(default)]
    pub postal_code: Option<String>,
    #[serde(default)]
    pub product_ids: Vec<Uuid>,
}

/// Partial update for a network node.
///
/// The outer `Option` distinguishes "key absent" from "key present"; the
/// inner one carries explicit nulls for the nullable fields. The `debt`
/// field exists only so the debt guard can reject any payload that mentions
/// it — even `"debt": null` fails with `DebtFieldImmutable`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct NetworkNodeUpdate {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub node_type: Option<NodeType>,
    #[serde(default, deserialize_with = "double_option")]
    pub supplier_id: Option<Option<Uuid>>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default, deserialize_with = "double_option")]
    pub phone: Option<Option<String>>,
    #[serde(default)]
    pub country: Option<String>,
    #[serde(default)]
    pub city: Option<String>,
    #[serde(default)]
    pub street: Option<String>,
    #[serde(default)]
    pub house_number: Option<String>,
    #[serde(default, deserialize_with = "double_option")]
    pub postal_code: Option<Option<String>>,
    #[serde(default)]
    pub product_ids: Option<Vec<Uuid>>,
    #[serde(default, deserialize_with = "double_option")]
    pub debt: Option<Option<Decimal>>,
}

/// Read model returned to callers: the node plus its derived fields
#[derive(Debug, Clone, Serialize)]
pub struct NodeView {
    #[serde(flatten)]
    pub node: NetworkNode,
    pub level: u32,
    pub supplier_name: Option<String>,
    pub products: Vec<Product>,
}

static PHONE_PATTERN: OnceLock<Regex> = OnceLock::new();

/// Validate a contact phone number: optional leading `+`, 9 to 15 digits.
pub fn validate_phone(phone: &str) -> Result<(), NetworkError> {
    let pattern = PHONE_PATTERN
        .get_or_init(|| Regex::new(r"^\+?1?\d{9,15}$").expect("phone pattern compiles"));
    if pattern.is_match(phone) {
        Ok(())
    } else {
        Err(NetworkError::InvalidPhone {
            phone: phone.to_string(),
        })
    }
}
