//! Activity Tree Resolver
//!
//! Expands an activity into the ids of its descendants, level by level:
//!
//! ```text
//! level 0      root                (never part of the result)
//! level 1      ├── child           one store round trip
//! level 2      │   └── grandchild  one store round trip
//! ...          (stops after `max_depth` levels)
//! ```
//!
//! Termination does not depend on the forest being acyclic. The depth counter
//! bounds the number of levels and the visited set keeps any id (the root
//! included) from being emitted or expanded twice.

use ahash::AHashSet;
use tracing::debug;

use crate::error::Result;
use crate::store::EntityStore;

/// Depth used by the by-activity organization query.
pub const DEFAULT_MAX_DEPTH: u32 = 3;

pub struct ActivityTreeResolver<'a, S: ?Sized> {
    store: &'a S,
}

impl<'a, S: EntityStore + ?Sized> ActivityTreeResolver<'a, S> {
    pub fn new(store: &'a S) -> Self {
        Self { store }
    }

    pub(crate) fn store(&self) -> &'a S {
        self.store
    }

    /// Ids of all activities at most `max_depth` edges below `root_id`.
    ///
    /// The root itself is excluded. Each id appears once, shallower levels
    /// first. An unknown root or a depth of 0 yields an empty list.
    pub fn resolve_descendants(&self, root_id: &str, max_depth: u32) -> Result<Vec<String>> {
        let mut out = Vec::new();
        if max_depth == 0 {
            return Ok(out);
        }

        let mut visited: AHashSet<String> = AHashSet::new();
        visited.insert(root_id.to_string());
        let mut frontier = vec![root_id.to_string()];

        for level in 1..=max_depth {
            let children = self.store.find_activities_by_parents(&frontier)?;

            let mut next = Vec::with_capacity(children.len());
            for child in children {
                if visited.insert(child.id.clone()) {
                    next.push(child.id);
                }
            }
            debug!(root = root_id, level, found = next.len(), "expanded activity level");

            if next.is_empty() {
                break;
            }
            out.extend(next.iter().cloned());
            frontier = next;
        }

        Ok(out)
    }
}
