//! Supplier-hierarchy validation
//!
//! The supplier relation must stay a forest: factories are roots and no
//! node may reach itself through its supplier chain. Validation runs on
//! every create and on every update that changes `supplier_id` or
//! `node_type`, and stores invoke it inside their write critical section so
//! the check and the write are atomic.
//!
//! The walk is iterative over a parent-map snapshot and tracks visited ids,
//! so it terminates even on corrupt data. A pre-existing cycle that does
//! not involve the node being written is not this operation's concern: the
//! walk stops silently instead of failing.

use std::collections::{HashMap, HashSet};

use uuid::Uuid;

use crate::error::HierarchyError;
use crate::models::NodeType;

/// Snapshot of the hierarchy shape: node id -> supplier id.
pub type ParentMap = HashMap<Uuid, Option<Uuid>>;

/// Validate a proposed (node, supplier) assignment against the snapshot.
///
/// `node_id` is `None` on create: a node that does not exist yet cannot
/// appear in any existing chain, so only the factory rule applies.
pub fn validate(
    node_id: Option<Uuid>,
    node_type: NodeType,
    proposed_supplier: Option<Uuid>,
    parents: &ParentMap,
) -> Result<(), HierarchyError> {
    if node_type == NodeType::Factory && proposed_supplier.is_some() {
        return Err(HierarchyError::InvalidSupplierForFactory);
    }

    let (Some(node_id), Some(start)) = (node_id, proposed_supplier) else {
        return Ok(());
    };

    let mut visited: HashSet<Uuid> = HashSet::new();
    let mut current = Some(start);
    while let Some(id) = current {
        if id == node_id {
            return Err(HierarchyError::CyclicSupplierChain { node_id });
        }
        if !visited.insert(id) {
            // Unrelated pre-existing cycle; stop walking rather than loop.
            break;
        }
        current = parents.get(&id).copied().flatten();
    }

    Ok(())
}
