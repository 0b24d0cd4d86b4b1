//! Organization Query Engine
//!
//! Every query borrows one store handle and returns flattened
//! [`OrganizationView`]s:
//!
//! | Query                          | Store lookups                                  |
//! |--------------------------------|------------------------------------------------|
//! | by building                    | organizations by building id                   |
//! | in radius                      | buildings in box, then organizations by ids    |
//! | by activity id                 | descendant levels, then organizations by tags  |
//! | by activity name (root only)   | root by name, direct children, then by tags    |
//! | by name substring              | organizations by name                          |
//! | by id                          | organization by id (absent -> `NotFound`)      |

use orgdir_store::{Building, GeoBox, Page};
use tracing::debug;

use crate::assembler::{assemble, assemble_distinct, OrganizationView};
use crate::config::QueryConfig;
use crate::error::{DirectoryError, EntityKind, Result};
use crate::resolver::ActivityTreeResolver;
use crate::store::EntityStore;
use crate::tree::ActivityNode;

pub struct OrganizationQueryEngine<'a, S: ?Sized> {
    store: &'a S,
    config: QueryConfig,
}

impl<'a, S: EntityStore + ?Sized> OrganizationQueryEngine<'a, S> {
    pub fn new(store: &'a S) -> Self {
        Self::with_config(store, QueryConfig::default())
    }

    pub fn with_config(store: &'a S, config: QueryConfig) -> Self {
        Self { store, config }
    }

    pub fn config(&self) -> QueryConfig {
        self.config
    }

    fn resolver(&self) -> ActivityTreeResolver<'a, S> {
        ActivityTreeResolver::new(self.store)
    }

    // ========================================================================
    // Organizations
    // ========================================================================

    pub fn organizations_by_building(&self, building_id: &str) -> Result<Vec<OrganizationView>> {
        let records = self.store.find_organizations_by_building_id(building_id)?;
        debug!(building_id, count = records.len(), "organizations by building");
        Ok(assemble(records))
    }

    /// Organizations whose building lies in the box of half-width `radius`
    /// degrees around (`lat`, `lon`).
    pub fn organizations_in_radius(
        &self,
        lat: f64,
        lon: f64,
        radius: f64,
    ) -> Result<Vec<OrganizationView>> {
        let buildings = self.buildings_in_radius(lat, lon, radius)?;
        if buildings.is_empty() {
            return Ok(Vec::new());
        }

        let building_ids: Vec<String> = buildings.into_iter().map(|b| b.id).collect();
        let records = self.store.find_organizations_by_building_ids(&building_ids)?;
        debug!(
            buildings = building_ids.len(),
            count = records.len(),
            "organizations in radius"
        );
        Ok(assemble(records))
    }

    /// Organizations tagged with `activity_id` or any activity up to
    /// `activity_depth` levels below it.
    pub fn organizations_by_activity(&self, activity_id: &str) -> Result<Vec<OrganizationView>> {
        let mut activity_ids = self
            .resolver()
            .resolve_descendants(activity_id, self.config.activity_depth)?;
        activity_ids.push(activity_id.to_string());

        let records = self.store.find_organizations_by_activity_ids(&activity_ids)?;
        debug!(
            activity_id,
            activities = activity_ids.len(),
            rows = records.len(),
            "organizations by activity"
        );
        Ok(assemble_distinct(records))
    }

    /// Organizations tagged with the first root activity whose name contains
    /// `activity_name`, or with one of its direct children.
    ///
    /// No matching root is not an error: the result is simply empty.
    pub fn organizations_by_activity_name(
        &self,
        activity_name: &str,
    ) -> Result<Vec<OrganizationView>> {
        let Some(root) = self
            .store
            .find_root_activity_by_name_substring(activity_name)?
        else {
            debug!(activity_name, "no root activity matches");
            return Ok(Vec::new());
        };

        let mut activity_ids = self
            .resolver()
            .resolve_descendants(&root.id, self.config.name_activity_depth)?;
        activity_ids.push(root.id);

        let records = self.store.find_organizations_by_activity_ids(&activity_ids)?;
        debug!(
            activity_name,
            activities = activity_ids.len(),
            rows = records.len(),
            "organizations by activity name"
        );
        Ok(assemble_distinct(records))
    }

    pub fn search_organizations_by_name(&self, name_part: &str) -> Result<Vec<OrganizationView>> {
        let records = self.store.find_organizations_by_name_substring(name_part)?;
        debug!(name_part, count = records.len(), "organizations by name");
        Ok(assemble(records))
    }

    pub fn organization_by_id(&self, organization_id: &str) -> Result<OrganizationView> {
        self.store
            .find_organization_by_id(organization_id)?
            .map(OrganizationView::from)
            .ok_or_else(|| DirectoryError::not_found(EntityKind::Organization, organization_id))
    }

    pub fn list_organizations(&self, page: Page) -> Result<Vec<OrganizationView>> {
        Ok(assemble(self.store.list_organizations(page)?))
    }

    // ========================================================================
    // Buildings and activities
    // ========================================================================

    pub fn building_by_id(&self, building_id: &str) -> Result<Building> {
        self.store
            .find_building_by_id(building_id)?
            .ok_or_else(|| DirectoryError::not_found(EntityKind::Building, building_id))
    }

    pub fn list_buildings(&self, page: Page) -> Result<Vec<Building>> {
        Ok(self.store.list_buildings(page)?)
    }

    pub fn buildings_in_radius(&self, lat: f64, lon: f64, radius: f64) -> Result<Vec<Building>> {
        check_finite("lat", lat)?;
        check_finite("lon", lon)?;
        check_finite("radius", radius)?;
        Ok(self
            .store
            .find_buildings_in_box(&GeoBox::around(lat, lon, radius))?)
    }

    /// Nested view of the activity tree under `activity_id`, `depth` levels
    /// deep (`activity_depth` when `None`).
    pub fn activity_tree(&self, activity_id: &str, depth: Option<u32>) -> Result<ActivityNode> {
        self.resolver()
            .activity_tree(activity_id, depth.unwrap_or(self.config.activity_depth))
    }

    pub fn activity_forest(&self, depth: Option<u32>) -> Result<Vec<ActivityNode>> {
        self.resolver()
            .activity_forest(depth.unwrap_or(self.config.activity_depth))
    }
}

fn check_finite(name: &str, value: f64) -> Result<()> {
    if value.is_finite() {
        Ok(())
    } else {
        Err(DirectoryError::InvalidArgument(format!(
            "`{name}` must be a finite number, got {value}"
        )))
    }
}
