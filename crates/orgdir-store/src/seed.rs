//! JSON seed documents.
//!
//! A seed document is the human-editable form of a directory: one array per
//! table, join tables included. It is what `orgdir db import` reads and what
//! the bundled `data/seed.json` fixture contains.

use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};

use crate::{Activity, Building, DirectoryDb, Organization};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TagRow {
    pub organization_id: String,
    pub activity_id: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PhoneRow {
    pub organization_id: String,
    pub phone_number: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SeedDocument {
    #[serde(default)]
    pub buildings: Vec<Building>,
    #[serde(default)]
    pub activities: Vec<Activity>,
    #[serde(default)]
    pub organizations: Vec<Organization>,
    #[serde(default)]
    pub organization_activities: Vec<TagRow>,
    #[serde(default)]
    pub organization_phones: Vec<PhoneRow>,
}

impl SeedDocument {
    pub fn from_json(text: &str) -> Result<Self> {
        serde_json::from_str(text).context("failed to parse seed document")
    }

    pub fn to_json_pretty(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

impl DirectoryDb {
    /// Build a store from a seed document.
    ///
    /// Activities may be listed in any order: parents are inserted before
    /// their children. An activity whose parent never appears (or that sits
    /// on a parent cycle) is rejected.
    pub fn from_seed(doc: &SeedDocument) -> Result<Self> {
        let mut db = DirectoryDb::new();

        for building in &doc.buildings {
            db.insert_building(building.clone())?;
        }

        let mut pending: Vec<&Activity> = doc.activities.iter().collect();
        while !pending.is_empty() {
            let before = pending.len();
            let mut deferred = Vec::new();
            for activity in pending {
                let ready = match activity.parent_id.as_deref() {
                    None => true,
                    Some(parent) => db.find_activity_by_id(parent).is_some(),
                };
                if ready {
                    db.insert_activity(activity.clone())?;
                } else {
                    deferred.push(activity);
                }
            }
            if deferred.len() == before {
                let ids: Vec<&str> = deferred.iter().map(|a| a.id.as_str()).collect();
                return Err(anyhow!(
                    "activities with unresolved parents: {}",
                    ids.join(", ")
                ));
            }
            pending = deferred;
        }

        for organization in &doc.organizations {
            db.insert_organization(organization.clone())?;
        }
        for tag in &doc.organization_activities {
            db.tag_organization(&tag.organization_id, &tag.activity_id)?;
        }
        for phone in &doc.organization_phones {
            db.add_phone(&phone.organization_id, &phone.phone_number)?;
        }

        Ok(db)
    }

    /// Export every table back into a seed document, in insertion order.
    pub fn to_seed(&self) -> SeedDocument {
        let tables = &self.tables;
        SeedDocument {
            buildings: tables.buildings.clone(),
            activities: tables.activities.clone(),
            organizations: tables.organizations.clone(),
            organization_activities: tables
                .organization_activities
                .iter()
                .map(|&(org, act)| TagRow {
                    organization_id: tables.organizations[org as usize].id.clone(),
                    activity_id: tables.activities[act as usize].id.clone(),
                })
                .collect(),
            organization_phones: tables
                .organization_phones
                .iter()
                .map(|(org, phone)| PhoneRow {
                    organization_id: tables.organizations[*org as usize].id.clone(),
                    phone_number: phone.clone(),
                })
                .collect(),
        }
    }
}
