//! Orgdir entity store: buildings, activities and organizations
//!
//! The store keeps every table as a plain row vector and derives a set of
//! in-memory indexes from it:
//!
//! 1. **Key indexes**: string primary key -> row number (u32)
//! 2. **Bitmap indexes**: building -> organizations, roots of the activity forest
//! 3. **Adjacency lists**: parent activity -> children, organization -> tags/phones
//! 4. **Latitude index**: buildings sorted by latitude for bounding-box scans
//!
//! Only the row vectors are persisted (see [`DirectoryDb::to_bytes`]); the
//! indexes are rebuilt whenever a snapshot is loaded.
//!
//! The store never enforces cascades. Rows are inserted once and never
//! deleted, so a reference that was valid at insert time stays valid.

pub mod seed;

use ahash::AHashMap;
use anyhow::{anyhow, Result};
use roaring::RoaringBitmap;
use serde::{Deserialize, Serialize};
use std::ops::RangeInclusive;

pub use seed::{PhoneRow, SeedDocument, TagRow};

/// Snapshot file magic.
pub const SNAPSHOT_MAGIC: &[u8; 4] = b"ORGD";
/// Current snapshot format version.
pub const SNAPSHOT_VERSION: u32 = 1;

// ============================================================================
// Entities
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Building {
    pub id: String,
    pub address: String,
    pub latitude: f64,
    pub longitude: f64,
}

/// A node of the activity forest. Roots have no `parent_id`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Activity {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub parent_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Organization {
    pub id: String,
    pub name: String,
    pub building_id: String,
}

/// An organization together with its eagerly loaded associations.
///
/// Phone numbers and activities are listed in join-row insertion order.
/// Duplicate phone rows are kept as they were stored.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrganizationRecord {
    pub organization: Organization,
    pub phone_numbers: Vec<String>,
    pub activities: Vec<Activity>,
}

// ============================================================================
// Query inputs
// ============================================================================

/// Offset/limit window for list queries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Page {
    pub skip: usize,
    pub limit: usize,
}

impl Page {
    pub const DEFAULT_LIMIT: usize = 100;

    pub fn new(skip: usize, limit: usize) -> Self {
        Self { skip, limit }
    }
}

impl Default for Page {
    fn default() -> Self {
        Self::new(0, Self::DEFAULT_LIMIT)
    }
}

/// Inclusive latitude/longitude rectangle.
#[derive(Debug, Clone, PartialEq)]
pub struct GeoBox {
    pub lat: RangeInclusive<f64>,
    pub lon: RangeInclusive<f64>,
}

impl GeoBox {
    pub fn new(lat: RangeInclusive<f64>, lon: RangeInclusive<f64>) -> Self {
        Self { lat, lon }
    }

    /// The square `[lat - radius, lat + radius] x [lon - radius, lon + radius]`.
    ///
    /// `radius` is in degrees. A negative radius yields an empty box.
    pub fn around(lat: f64, lon: f64, radius: f64) -> Self {
        Self::new(lat - radius..=lat + radius, lon - radius..=lon + radius)
    }

    pub fn is_empty(&self) -> bool {
        self.lat.is_empty() || self.lon.is_empty()
    }

    pub fn contains(&self, latitude: f64, longitude: f64) -> bool {
        self.lat.contains(&latitude) && self.lon.contains(&longitude)
    }
}

/// Row counts per table.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct DirectoryStats {
    pub buildings: usize,
    pub activities: usize,
    pub organizations: usize,
    pub organization_activities: usize,
    pub organization_phones: usize,
}

// ============================================================================
// Tables (persisted) and indexes (derived)
// ============================================================================

#[derive(Debug, Default, Serialize, Deserialize)]
struct Tables {
    buildings: Vec<Building>,
    activities: Vec<Activity>,
    organizations: Vec<Organization>,
    /// Join rows: (organization row, activity row).
    organization_activities: Vec<(u32, u32)>,
    /// Join rows: (organization row, phone number).
    organization_phones: Vec<(u32, String)>,
}

#[derive(Debug, Default)]
struct Indexes {
    building_keys: AHashMap<String, u32>,
    activity_keys: AHashMap<String, u32>,
    organization_keys: AHashMap<String, u32>,
    /// (latitude, building row), sorted by latitude.
    buildings_by_lat: Vec<(f64, u32)>,
    root_activities: RoaringBitmap,
    /// parent activity row -> child activity rows
    children: AHashMap<u32, Vec<u32>>,
    /// Lowercased activity names, by row.
    activity_names_lower: Vec<String>,
    /// Lowercased organization names, by row.
    organization_names_lower: Vec<String>,
    /// building row -> organization rows
    orgs_by_building: AHashMap<u32, RoaringBitmap>,
    /// activity row -> join row ids (organization_activities)
    tags_by_activity: AHashMap<u32, Vec<u32>>,
    /// organization row -> activity rows
    activities_by_org: AHashMap<u32, Vec<u32>>,
    /// organization row -> phone join row ids (organization_phones)
    phones_by_org: AHashMap<u32, Vec<u32>>,
}

// ============================================================================
// DirectoryDb
// ============================================================================

/// The directory's entity store.
#[derive(Debug, Default)]
pub struct DirectoryDb {
    tables: Tables,
    indexes: Indexes,
}

impl DirectoryDb {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stats(&self) -> DirectoryStats {
        DirectoryStats {
            buildings: self.tables.buildings.len(),
            activities: self.tables.activities.len(),
            organizations: self.tables.organizations.len(),
            organization_activities: self.tables.organization_activities.len(),
            organization_phones: self.tables.organization_phones.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.tables.buildings.is_empty()
            && self.tables.activities.is_empty()
            && self.tables.organizations.is_empty()
    }

    // ========================================================================
    // Loading
    // ========================================================================

    /// Insert a building. Coordinates must be finite.
    pub fn insert_building(&mut self, building: Building) -> Result<u32> {
        if self.indexes.building_keys.contains_key(&building.id) {
            return Err(anyhow!("duplicate building id `{}`", building.id));
        }
        if !building.latitude.is_finite() || !building.longitude.is_finite() {
            return Err(anyhow!(
                "building `{}` has non-finite coordinates ({}, {})",
                building.id,
                building.latitude,
                building.longitude
            ));
        }
        let row = self.tables.buildings.len() as u32;
        self.tables.buildings.push(building);
        self.index_building(row);
        Ok(row)
    }

    /// Insert an activity. Its parent, if any, must already be present.
    pub fn insert_activity(&mut self, activity: Activity) -> Result<u32> {
        if self.indexes.activity_keys.contains_key(&activity.id) {
            return Err(anyhow!("duplicate activity id `{}`", activity.id));
        }
        if let Some(parent) = activity.parent_id.as_deref() {
            if !self.indexes.activity_keys.contains_key(parent) {
                return Err(anyhow!(
                    "activity `{}` references unknown parent `{}`",
                    activity.id,
                    parent
                ));
            }
        }
        let row = self.tables.activities.len() as u32;
        self.tables.activities.push(activity);
        self.index_activity(row);
        Ok(row)
    }

    /// Insert an organization. Its building must already be present.
    pub fn insert_organization(&mut self, organization: Organization) -> Result<u32> {
        if self.indexes.organization_keys.contains_key(&organization.id) {
            return Err(anyhow!("duplicate organization id `{}`", organization.id));
        }
        if !self
            .indexes
            .building_keys
            .contains_key(&organization.building_id)
        {
            return Err(anyhow!(
                "organization `{}` references unknown building `{}`",
                organization.id,
                organization.building_id
            ));
        }
        let row = self.tables.organizations.len() as u32;
        self.tables.organizations.push(organization);
        self.index_organization(row);
        Ok(row)
    }

    /// Tag an organization with an activity (one join row per call).
    pub fn tag_organization(&mut self, organization_id: &str, activity_id: &str) -> Result<()> {
        let org = self.organization_row(organization_id)?;
        let act = self
            .indexes
            .activity_keys
            .get(activity_id)
            .copied()
            .ok_or_else(|| anyhow!("unknown activity id `{activity_id}`"))?;
        let join = self.tables.organization_activities.len() as u32;
        self.tables.organization_activities.push((org, act));
        self.index_tag(join);
        Ok(())
    }

    /// Attach a phone number to an organization (one join row per call).
    pub fn add_phone(&mut self, organization_id: &str, phone_number: &str) -> Result<()> {
        let org = self.organization_row(organization_id)?;
        let join = self.tables.organization_phones.len() as u32;
        self.tables
            .organization_phones
            .push((org, phone_number.to_string()));
        self.index_phone(join);
        Ok(())
    }

    fn organization_row(&self, organization_id: &str) -> Result<u32> {
        self.indexes
            .organization_keys
            .get(organization_id)
            .copied()
            .ok_or_else(|| anyhow!("unknown organization id `{organization_id}`"))
    }

    // ========================================================================
    // Index maintenance
    // ========================================================================

    fn index_building(&mut self, row: u32) {
        let building = &self.tables.buildings[row as usize];
        self.indexes.building_keys.insert(building.id.clone(), row);
        let lat = building.latitude;
        let pos = self
            .indexes
            .buildings_by_lat
            .partition_point(|&(l, _)| l <= lat);
        self.indexes.buildings_by_lat.insert(pos, (lat, row));
    }

    fn index_activity(&mut self, row: u32) {
        let activity = &self.tables.activities[row as usize];
        self.indexes.activity_keys.insert(activity.id.clone(), row);
        self.indexes
            .activity_names_lower
            .push(activity.name.to_lowercase());
        match activity.parent_id.as_deref() {
            None => {
                self.indexes.root_activities.insert(row);
            }
            Some(parent) => {
                if let Some(&parent_row) = self.indexes.activity_keys.get(parent) {
                    self.indexes
                        .children
                        .entry(parent_row)
                        .or_default()
                        .push(row);
                }
            }
        }
    }

    fn index_organization(&mut self, row: u32) {
        let org = &self.tables.organizations[row as usize];
        self.indexes.organization_keys.insert(org.id.clone(), row);
        self.indexes
            .organization_names_lower
            .push(org.name.to_lowercase());
        if let Some(&building_row) = self.indexes.building_keys.get(&org.building_id) {
            self.indexes
                .orgs_by_building
                .entry(building_row)
                .or_default()
                .insert(row);
        }
    }

    fn index_tag(&mut self, join: u32) {
        let (org, act) = self.tables.organization_activities[join as usize];
        self.indexes
            .tags_by_activity
            .entry(act)
            .or_default()
            .push(join);
        self.indexes
            .activities_by_org
            .entry(org)
            .or_default()
            .push(act);
    }

    fn index_phone(&mut self, join: u32) {
        let (org, _) = &self.tables.organization_phones[join as usize];
        self.indexes
            .phones_by_org
            .entry(*org)
            .or_default()
            .push(join);
    }

    /// Rebuild every derived index from the row tables.
    fn rebuild_indexes(&mut self) {
        self.indexes = Indexes::default();
        for row in 0..self.tables.buildings.len() as u32 {
            self.index_building(row);
        }
        // A child row may precede its parent row in a snapshot.
        for (row, activity) in self.tables.activities.iter().enumerate() {
            self.indexes
                .activity_keys
                .insert(activity.id.clone(), row as u32);
        }
        for row in 0..self.tables.activities.len() as u32 {
            self.index_activity(row);
        }
        for row in 0..self.tables.organizations.len() as u32 {
            self.index_organization(row);
        }
        for join in 0..self.tables.organization_activities.len() as u32 {
            self.index_tag(join);
        }
        for join in 0..self.tables.organization_phones.len() as u32 {
            self.index_phone(join);
        }
    }

    /// Check that every stored reference points at an existing row, that
    /// coordinates are finite and that the activity forest has no cycles.
    fn validate_references(&self) -> Result<()> {
        let buildings = self.tables.buildings.len() as u32;
        let activities = self.tables.activities.len() as u32;
        let organizations = self.tables.organizations.len() as u32;

        for building in &self.tables.buildings {
            if !building.latitude.is_finite() || !building.longitude.is_finite() {
                return Err(anyhow!(
                    "building `{}` has non-finite coordinates ({}, {})",
                    building.id,
                    building.latitude,
                    building.longitude
                ));
            }
        }
        for org in &self.tables.organizations {
            if !self.indexes.building_keys.contains_key(&org.building_id) {
                return Err(anyhow!(
                    "organization `{}` references unknown building `{}`",
                    org.id,
                    org.building_id
                ));
            }
        }
        for act in &self.tables.activities {
            if let Some(parent) = act.parent_id.as_deref() {
                if !self.indexes.activity_keys.contains_key(parent) {
                    return Err(anyhow!(
                        "activity `{}` references unknown parent `{}`",
                        act.id,
                        parent
                    ));
                }
            }
        }
        self.validate_activity_forest()?;
        if self.indexes.building_keys.len() as u32 != buildings
            || self.indexes.activity_keys.len() as u32 != activities
            || self.indexes.organization_keys.len() as u32 != organizations
        {
            return Err(anyhow!("duplicate primary key in snapshot"));
        }
        for &(org, act) in &self.tables.organization_activities {
            if org >= organizations || act >= activities {
                return Err(anyhow!("dangling organization/activity join row ({org}, {act})"));
            }
        }
        for (org, _) in &self.tables.organization_phones {
            if *org >= organizations {
                return Err(anyhow!("dangling organization/phone join row ({org})"));
            }
        }
        Ok(())
    }

    /// Walk every parent chain up to a root. Rows already known to reach a
    /// root are not walked again. Parents must have been checked to exist.
    fn validate_activity_forest(&self) -> Result<()> {
        let activities = self.tables.activities.len();
        let mut settled = vec![false; activities];

        for start in 0..activities {
            let mut chain = Vec::new();
            let mut row = start;
            while !settled[row] {
                if chain.len() >= activities {
                    return Err(anyhow!(
                        "activity `{}` is part of a parent cycle",
                        self.tables.activities[start].id
                    ));
                }
                chain.push(row);
                let parent = self.tables.activities[row]
                    .parent_id
                    .as_deref()
                    .and_then(|p| self.indexes.activity_keys.get(p));
                match parent {
                    Some(&parent) => row = parent as usize,
                    None => break,
                }
            }
            for row in chain {
                settled[row] = true;
            }
        }
        Ok(())
    }

    // ========================================================================
    // Buildings
    // ========================================================================

    pub fn find_building_by_id(&self, id: &str) -> Option<&Building> {
        let row = *self.indexes.building_keys.get(id)?;
        self.tables.buildings.get(row as usize)
    }

    pub fn list_buildings(&self, page: Page) -> Vec<Building> {
        self.tables
            .buildings
            .iter()
            .skip(page.skip)
            .take(page.limit)
            .cloned()
            .collect()
    }

    /// Buildings inside `bbox` (bounds inclusive), in insertion order.
    pub fn find_buildings_in_box(&self, bbox: &GeoBox) -> Vec<Building> {
        if bbox.is_empty() {
            return Vec::new();
        }
        let by_lat = &self.indexes.buildings_by_lat;
        let lo = by_lat.partition_point(|&(lat, _)| lat < *bbox.lat.start());
        let hi = by_lat.partition_point(|&(lat, _)| lat <= *bbox.lat.end());

        let mut rows = RoaringBitmap::new();
        for &(_, row) in by_lat.get(lo..hi).unwrap_or(&[]) {
            let building = &self.tables.buildings[row as usize];
            if bbox.lon.contains(&building.longitude) {
                rows.insert(row);
            }
        }
        rows.iter()
            .map(|row| self.tables.buildings[row as usize].clone())
            .collect()
    }

    // ========================================================================
    // Activities
    // ========================================================================

    pub fn find_activity_by_id(&self, id: &str) -> Option<&Activity> {
        let row = *self.indexes.activity_keys.get(id)?;
        self.tables.activities.get(row as usize)
    }

    /// Direct children of `parent_id`, in insertion order.
    pub fn find_activities_by_parent(&self, parent_id: &str) -> Vec<Activity> {
        let Some(&parent) = self.indexes.activity_keys.get(parent_id) else {
            return Vec::new();
        };
        self.child_rows(parent)
            .iter()
            .map(|&row| self.tables.activities[row as usize].clone())
            .collect()
    }

    /// Direct children of every id in `parent_ids`, in one pass.
    ///
    /// Unknown parents are skipped; a parent listed twice contributes once.
    pub fn find_activities_by_parents(&self, parent_ids: &[String]) -> Vec<Activity> {
        let mut parents = RoaringBitmap::new();
        for id in parent_ids {
            if let Some(&row) = self.indexes.activity_keys.get(id) {
                parents.insert(row);
            }
        }
        let mut out = Vec::new();
        for parent in parents.iter() {
            for &row in self.child_rows(parent) {
                out.push(self.tables.activities[row as usize].clone());
            }
        }
        out
    }

    /// Every activity without a parent, in insertion order.
    pub fn root_activities(&self) -> Vec<Activity> {
        self.indexes
            .root_activities
            .iter()
            .map(|row| self.tables.activities[row as usize].clone())
            .collect()
    }

    /// First root activity (insertion order) whose name contains `needle`,
    /// ignoring case.
    pub fn find_root_activity_by_name_substring(&self, needle: &str) -> Option<&Activity> {
        let needle = needle.to_lowercase();
        self.indexes
            .root_activities
            .iter()
            .find(|&row| self.indexes.activity_names_lower[row as usize].contains(&needle))
            .and_then(|row| self.tables.activities.get(row as usize))
    }

    fn child_rows(&self, parent: u32) -> &[u32] {
        self.indexes
            .children
            .get(&parent)
            .map(|rows| rows.as_slice())
            .unwrap_or(&[])
    }

    // ========================================================================
    // Organizations
    // ========================================================================

    pub fn find_organization_by_id(&self, id: &str) -> Option<OrganizationRecord> {
        let row = *self.indexes.organization_keys.get(id)?;
        self.record(row)
    }

    pub fn list_organizations(&self, page: Page) -> Vec<OrganizationRecord> {
        (0..self.tables.organizations.len() as u32)
            .skip(page.skip)
            .take(page.limit)
            .filter_map(|row| self.record(row))
            .collect()
    }

    pub fn find_organizations_by_building_id(&self, building_id: &str) -> Vec<OrganizationRecord> {
        self.find_organizations_by_building_ids(&[building_id.to_string()])
    }

    /// Organizations located in any of `building_ids`, in insertion order.
    pub fn find_organizations_by_building_ids(
        &self,
        building_ids: &[String],
    ) -> Vec<OrganizationRecord> {
        let mut rows = RoaringBitmap::new();
        for id in building_ids {
            let Some(building) = self.indexes.building_keys.get(id) else {
                continue;
            };
            if let Some(orgs) = self.indexes.orgs_by_building.get(building) {
                rows |= orgs;
            }
        }
        self.records(rows.iter())
    }

    /// Organizations tagged with any of `activity_ids`.
    ///
    /// This is a join: one record per matching join row, in join-row order.
    /// An organization tagged with two of the requested activities appears
    /// twice; callers deduplicate.
    pub fn find_organizations_by_activity_ids(
        &self,
        activity_ids: &[String],
    ) -> Vec<OrganizationRecord> {
        let mut joins = RoaringBitmap::new();
        for id in activity_ids {
            let Some(act) = self.indexes.activity_keys.get(id) else {
                continue;
            };
            if let Some(tags) = self.indexes.tags_by_activity.get(act) {
                joins.extend(tags.iter().copied());
            }
        }
        self.records(
            joins
                .iter()
                .map(|join| self.tables.organization_activities[join as usize].0),
        )
    }

    /// Organizations whose name contains `needle`, ignoring case.
    pub fn find_organizations_by_name_substring(&self, needle: &str) -> Vec<OrganizationRecord> {
        let needle = needle.to_lowercase();
        let rows = self
            .indexes
            .organization_names_lower
            .iter()
            .enumerate()
            .filter(|(_, name)| name.contains(&needle))
            .map(|(row, _)| row as u32);
        self.records(rows)
    }

    fn records(&self, rows: impl Iterator<Item = u32>) -> Vec<OrganizationRecord> {
        rows.filter_map(|row| self.record(row)).collect()
    }

    fn record(&self, row: u32) -> Option<OrganizationRecord> {
        let organization = self.tables.organizations.get(row as usize)?.clone();
        let phone_numbers = self
            .indexes
            .phones_by_org
            .get(&row)
            .map(|joins| {
                joins
                    .iter()
                    .filter_map(|&j| self.tables.organization_phones.get(j as usize))
                    .map(|(_, phone)| phone.clone())
                    .collect()
            })
            .unwrap_or_default();
        let activities = self
            .indexes
            .activities_by_org
            .get(&row)
            .map(|acts| {
                acts.iter()
                    .filter_map(|&a| self.tables.activities.get(a as usize))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default();
        Some(OrganizationRecord {
            organization,
            phone_numbers,
            activities,
        })
    }

    // ========================================================================
    // Serialization
    // ========================================================================

    /// Serialize to the binary snapshot format.
    ///
    /// Layout: magic `ORGD`, version (u32 LE), body length (u64 LE), bincode body.
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        let body = bincode::serialize(&self.tables)?;

        let mut out = Vec::with_capacity(16 + body.len());
        out.extend_from_slice(SNAPSHOT_MAGIC);
        out.extend_from_slice(&SNAPSHOT_VERSION.to_le_bytes());
        out.extend_from_slice(&(body.len() as u64).to_le_bytes());
        out.extend_from_slice(&body);
        Ok(out)
    }

    /// Deserialize from the binary snapshot format and rebuild indexes.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        if bytes.len() < 16 || &bytes[0..4] != SNAPSHOT_MAGIC {
            return Err(anyhow!("invalid orgdir snapshot"));
        }

        let version = u32::from_le_bytes(bytes[4..8].try_into()?);
        if version != SNAPSHOT_VERSION {
            return Err(anyhow!("unsupported snapshot version: {version}"));
        }

        let body_len = usize::try_from(u64::from_le_bytes(bytes[8..16].try_into()?))?;
        let body = 16usize
            .checked_add(body_len)
            .and_then(|end| bytes.get(16..end))
            .ok_or_else(|| anyhow!("truncated snapshot: expected {body_len} body bytes"))?;
        let tables: Tables = bincode::deserialize(body)?;

        let mut db = Self {
            tables,
            indexes: Indexes::default(),
        };
        db.rebuild_indexes();
        db.validate_references()?;
        Ok(db)
    }
}
