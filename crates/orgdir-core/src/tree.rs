//! Nested views of the activity forest.

use ahash::{AHashMap, AHashSet};
use orgdir_store::Activity;
use serde::{Deserialize, Serialize};

use crate::error::{DirectoryError, EntityKind, Result};
use crate::resolver::ActivityTreeResolver;
use crate::store::EntityStore;

/// An activity with its children, `level` edges below the tree's root.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActivityNode {
    pub id: String,
    pub name: String,
    pub parent_id: Option<String>,
    pub level: u32,
    pub children: Vec<ActivityNode>,
}

impl<'a, S: EntityStore + ?Sized> ActivityTreeResolver<'a, S> {
    /// The subtree rooted at `root_id`, cut off `max_depth` levels down.
    pub fn activity_tree(&self, root_id: &str, max_depth: u32) -> Result<ActivityNode> {
        let root = self
            .store()
            .find_activity_by_id(root_id)?
            .ok_or_else(|| DirectoryError::not_found(EntityKind::Activity, root_id))?;
        let mut nodes = self.build_subtrees(vec![root], max_depth)?;
        nodes
            .pop()
            .ok_or_else(|| DirectoryError::not_found(EntityKind::Activity, root_id))
    }

    /// One tree per root activity, each cut off `max_depth` levels down.
    pub fn activity_forest(&self, max_depth: u32) -> Result<Vec<ActivityNode>> {
        let roots = self.store().root_activities()?;
        self.build_subtrees(roots, max_depth)
    }

    fn build_subtrees(&self, roots: Vec<Activity>, max_depth: u32) -> Result<Vec<ActivityNode>> {
        let mut visited: AHashSet<String> = roots.iter().map(|a| a.id.clone()).collect();
        let mut children_of: AHashMap<String, Vec<Activity>> = AHashMap::new();
        let mut frontier: Vec<String> = roots.iter().map(|a| a.id.clone()).collect();

        for _ in 0..max_depth {
            if frontier.is_empty() {
                break;
            }
            let children = self.store().find_activities_by_parents(&frontier)?;
            let mut next = Vec::new();
            for child in children {
                let Some(parent) = child.parent_id.clone() else {
                    continue;
                };
                if !visited.insert(child.id.clone()) {
                    continue;
                }
                next.push(child.id.clone());
                children_of.entry(parent).or_default().push(child);
            }
            frontier = next;
        }

        Ok(roots
            .into_iter()
            .map(|root| attach(root, 0, &mut children_of))
            .collect())
    }
}

fn attach(
    activity: Activity,
    level: u32,
    children_of: &mut AHashMap<String, Vec<Activity>>,
) -> ActivityNode {
    let children = children_of
        .remove(&activity.id)
        .unwrap_or_default()
        .into_iter()
        .map(|child| attach(child, level + 1, children_of))
        .collect();
    ActivityNode {
        id: activity.id,
        name: activity.name,
        parent_id: activity.parent_id,
        level,
        children,
    }
}
