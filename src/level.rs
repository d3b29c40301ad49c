//! On-demand level resolution
//!
//! `level(node)` is the depth of a node in its supplier chain: 0 at the
//! root, `level(supplier) + 1` otherwise. Levels are never stored; a
//! resolver is built from a fresh parent-map snapshot for the duration of
//! one operation and discarded afterwards, so a supplier reassignment can
//! never be observed through a stale cache.

use std::collections::HashMap;

use uuid::Uuid;

use crate::error::HierarchyError;
use crate::hierarchy::ParentMap;

/// Per-operation level resolver with memoization across lookups.
pub struct LevelResolver<'a> {
    parents: &'a ParentMap,
    cache: HashMap<Uuid, u32>,
    max_hops: usize,
}

impl<'a> LevelResolver<'a> {
    /// Build a resolver over a snapshot. The hop bound is the snapshot's
    /// node count: any terminating chain fits within it, so exceeding it
    /// means the data is corrupt.
    pub fn new(parents: &'a ParentMap) -> Self {
        Self {
            parents,
            cache: HashMap::new(),
            max_hops: parents.len() + 1,
        }
    }

    /// Resolve the level of `id`, walking iteratively to avoid stack depth
    /// issues on long chains. Ids missing from the snapshot terminate the
    /// walk as roots.
    pub fn level(&mut self, id: Uuid) -> Result<u32, HierarchyError> {
        let mut path: Vec<Uuid> = Vec::new();
        let mut current = id;

        let base = loop {
            if let Some(&cached) = self.cache.get(&current) {
                break cached;
            }
            match self.parents.get(&current) {
                None | Some(None) => {
                    self.cache.insert(current, 0);
                    break 0;
                }
                Some(Some(parent)) => {
                    path.push(current);
                    if path.len() > self.max_hops {
                        return Err(HierarchyError::UnresolvableLevel {
                            node_id: id,
                            max_hops: self.max_hops,
                        });
                    }
                    current = *parent;
                }
            }
        };

        let mut level = base;
        for &walked in path.iter().rev() {
            level += 1;
            self.cache.insert(walked, level);
        }
        Ok(level)
    }
}
