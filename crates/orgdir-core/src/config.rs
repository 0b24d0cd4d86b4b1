use serde::{Deserialize, Serialize};

use crate::resolver::DEFAULT_MAX_DEPTH;

/// Traversal depths used by the activity queries.
///
/// The by-id query expands `activity_depth` levels while the by-name query
/// only looks at the matched root's direct children. The defaults keep that
/// difference as observed in the deployed service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueryConfig {
    pub activity_depth: u32,
    pub name_activity_depth: u32,
}

impl QueryConfig {
    pub const DEFAULT_NAME_ACTIVITY_DEPTH: u32 = 1;
}

impl Default for QueryConfig {
    fn default() -> Self {
        Self {
            activity_depth: DEFAULT_MAX_DEPTH,
            name_activity_depth: Self::DEFAULT_NAME_ACTIVITY_DEPTH,
        }
    }
}
