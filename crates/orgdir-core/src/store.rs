//! The seam between the query layer and whatever holds the tables.

use orgdir_store::{Activity, Building, DirectoryDb, GeoBox, OrganizationRecord, Page};

use crate::error::StoreError;

pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// Read access to buildings, activities and organizations.
///
/// Organization lookups return [`OrganizationRecord`]s with phones and
/// activities already attached, so assembling a response never needs a
/// follow-up query per organization.
pub trait EntityStore {
    fn find_building_by_id(&self, id: &str) -> StoreResult<Option<Building>>;

    fn list_buildings(&self, page: Page) -> StoreResult<Vec<Building>>;

    /// Buildings inside the (inclusive) box.
    fn find_buildings_in_box(&self, bbox: &GeoBox) -> StoreResult<Vec<Building>>;

    fn find_activity_by_id(&self, id: &str) -> StoreResult<Option<Activity>>;

    /// Direct children of `parent_id`. Unknown parents have no children.
    fn find_activities_by_parent(&self, parent_id: &str) -> StoreResult<Vec<Activity>>;

    /// Direct children of every parent in `parent_ids`.
    ///
    /// The default issues one lookup per parent; stores that can answer a
    /// whole tree level in one round trip should override it.
    fn find_activities_by_parents(&self, parent_ids: &[String]) -> StoreResult<Vec<Activity>> {
        let mut out = Vec::new();
        for parent in parent_ids {
            out.extend(self.find_activities_by_parent(parent)?);
        }
        Ok(out)
    }

    fn root_activities(&self) -> StoreResult<Vec<Activity>>;

    /// First root activity whose name contains `needle`, ignoring case.
    fn find_root_activity_by_name_substring(&self, needle: &str) -> StoreResult<Option<Activity>>;

    fn find_organization_by_id(&self, id: &str) -> StoreResult<Option<OrganizationRecord>>;

    fn list_organizations(&self, page: Page) -> StoreResult<Vec<OrganizationRecord>>;

    fn find_organizations_by_building_id(
        &self,
        building_id: &str,
    ) -> StoreResult<Vec<OrganizationRecord>>;

    fn find_organizations_by_building_ids(
        &self,
        building_ids: &[String],
    ) -> StoreResult<Vec<OrganizationRecord>>;

    /// Organizations tagged with any of `activity_ids`. May repeat an
    /// organization once per matching tag.
    fn find_organizations_by_activity_ids(
        &self,
        activity_ids: &[String],
    ) -> StoreResult<Vec<OrganizationRecord>>;

    fn find_organizations_by_name_substring(
        &self,
        needle: &str,
    ) -> StoreResult<Vec<OrganizationRecord>>;
}

impl EntityStore for DirectoryDb {
    fn find_building_by_id(&self, id: &str) -> StoreResult<Option<Building>> {
        Ok(DirectoryDb::find_building_by_id(self, id).cloned())
    }

    fn list_buildings(&self, page: Page) -> StoreResult<Vec<Building>> {
        Ok(DirectoryDb::list_buildings(self, page))
    }

    fn find_buildings_in_box(&self, bbox: &GeoBox) -> StoreResult<Vec<Building>> {
        Ok(DirectoryDb::find_buildings_in_box(self, bbox))
    }

    fn find_activity_by_id(&self, id: &str) -> StoreResult<Option<Activity>> {
        Ok(DirectoryDb::find_activity_by_id(self, id).cloned())
    }

    fn find_activities_by_parent(&self, parent_id: &str) -> StoreResult<Vec<Activity>> {
        Ok(DirectoryDb::find_activities_by_parent(self, parent_id))
    }

    fn find_activities_by_parents(&self, parent_ids: &[String]) -> StoreResult<Vec<Activity>> {
        Ok(DirectoryDb::find_activities_by_parents(self, parent_ids))
    }

    fn root_activities(&self) -> StoreResult<Vec<Activity>> {
        Ok(DirectoryDb::root_activities(self))
    }

    fn find_root_activity_by_name_substring(&self, needle: &str) -> StoreResult<Option<Activity>> {
        Ok(DirectoryDb::find_root_activity_by_name_substring(self, needle).cloned())
    }

    fn find_organization_by_id(&self, id: &str) -> StoreResult<Option<OrganizationRecord>> {
        Ok(DirectoryDb::find_organization_by_id(self, id))
    }

    fn list_organizations(&self, page: Page) -> StoreResult<Vec<OrganizationRecord>> {
        Ok(DirectoryDb::list_organizations(self, page))
    }

    fn find_organizations_by_building_id(
        &self,
        building_id: &str,
    ) -> StoreResult<Vec<OrganizationRecord>> {
        Ok(DirectoryDb::find_organizations_by_building_id(self, building_id))
    }

    fn find_organizations_by_building_ids(
        &self,
        building_ids: &[String],
    ) -> StoreResult<Vec<OrganizationRecord>> {
        Ok(DirectoryDb::find_organizations_by_building_ids(self, building_ids))
    }

    fn find_organizations_by_activity_ids(
        &self,
        activity_ids: &[String],
    ) -> StoreResult<Vec<OrganizationRecord>> {
        Ok(DirectoryDb::find_organizations_by_activity_ids(self, activity_ids))
    }

    fn find_organizations_by_name_substring(
        &self,
        needle: &str,
    ) -> StoreResult<Vec<OrganizationRecord>> {
        Ok(DirectoryDb::find_organizations_by_name_substring(self, needle))
    }
}
