//! Result Assembler: organization records to response views.

use ahash::AHashSet;
use orgdir_store::OrganizationRecord;
use serde::{Deserialize, Serialize};

/// The flat shape returned for every organization query.
///
/// `phone_numbers` and `activity_ids` follow the store's load order, which
/// callers should not rely on.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrganizationView {
    pub id: String,
    pub name: String,
    pub building_id: String,
    pub phone_numbers: Vec<String>,
    pub activity_ids: Vec<String>,
}

impl From<OrganizationRecord> for OrganizationView {
    fn from(record: OrganizationRecord) -> Self {
        let OrganizationRecord {
            organization,
            phone_numbers,
            activities,
        } = record;
        Self {
            id: organization.id,
            name: organization.name,
            building_id: organization.building_id,
            phone_numbers,
            activity_ids: activities.into_iter().map(|a| a.id).collect(),
        }
    }
}

pub fn assemble(records: Vec<OrganizationRecord>) -> Vec<OrganizationView> {
    records.into_iter().map(OrganizationView::from).collect()
}

/// Like [`assemble`], keeping only the first record per organization id.
pub fn assemble_distinct(records: Vec<OrganizationRecord>) -> Vec<OrganizationView> {
    let mut seen: AHashSet<String> = AHashSet::with_capacity(records.len());
    records
        .into_iter()
        .filter(|r| seen.insert(r.organization.id.clone()))
        .map(OrganizationView::from)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use orgdir_store::{Activity, Organization};

    fn record(id: &str) -> OrganizationRecord {
        OrganizationRecord {
            organization: Organization {
                id: id.to_string(),
                name: format!("Org {id}"),
                building_id: "b1".to_string(),
            },
            phone_numbers: vec!["8-800".to_string()],
            activities: vec![Activity {
                id: "a1".to_string(),
                name: "Food".to_string(),
                parent_id: None,
            }],
        }
    }

    #[test]
    fn test_view_shape() {
        let view = OrganizationView::from(record("o1"));
        let json = serde_json::to_value(&view).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "id": "o1",
                "name": "Org o1",
                "building_id": "b1",
                "phone_numbers": ["8-800"],
                "activity_ids": ["a1"],
            })
        );
    }

    #[test]
    fn test_distinct_keeps_first() {
        let views = assemble_distinct(vec![record("o1"), record("o2"), record("o1")]);
        let ids: Vec<&str> = views.iter().map(|v| v.id.as_str()).collect();
        assert_eq!(ids, vec!["o1", "o2"]);
    }
}
