//! `orgdir query`: one-shot lookups printed as JSON.

use anyhow::Result;
use clap::Subcommand;
use serde::Serialize;
use std::path::PathBuf;

use orgdir_core::{OrganizationQueryEngine, Page, QueryConfig};
use orgdir_storage::{DirectoryStorage, StorageConfig};

#[derive(Subcommand, Debug, Clone)]
pub(crate) enum QueryCommands {
    /// Organizations located in a building.
    ByBuilding { building_id: String },

    /// Organizations whose building lies within `radius` degrees of a point.
    #[command(allow_negative_numbers = true)]
    Nearby {
        #[arg(long)]
        lat: f64,
        #[arg(long)]
        lon: f64,
        #[arg(long)]
        radius: f64,
    },

    /// Organizations tagged with an activity or one of its descendants.
    ByActivity { activity_id: String },

    /// Organizations under the first root activity whose name contains NAME.
    ByActivityName { name: String },

    /// Organizations whose name contains NAME (case-insensitive).
    Search { name: String },

    /// One organization by id.
    Get { organization_id: String },

    /// A page of organizations.
    List {
        #[arg(long, default_value_t = 0)]
        skip: usize,
        #[arg(long, default_value_t = Page::DEFAULT_LIMIT)]
        limit: usize,
    },

    /// One building by id.
    Building { building_id: String },

    /// A page of buildings.
    Buildings {
        #[arg(long, default_value_t = 0)]
        skip: usize,
        #[arg(long, default_value_t = Page::DEFAULT_LIMIT)]
        limit: usize,
    },

    /// Buildings within `radius` degrees of a point.
    #[command(allow_negative_numbers = true)]
    BuildingsNearby {
        #[arg(long)]
        lat: f64,
        #[arg(long)]
        lon: f64,
        #[arg(long)]
        radius: f64,
    },

    /// The activity tree under ACTIVITY_ID, or the whole forest when omitted.
    Tree {
        activity_id: Option<String>,
        /// Levels to expand (defaults to `--activity-depth`).
        #[arg(long)]
        depth: Option<u32>,
    },
}

pub(crate) fn cmd_query(db: PathBuf, config: QueryConfig, command: QueryCommands) -> Result<()> {
    let storage = DirectoryStorage::open(StorageConfig { db_path: db })?;
    let session = storage.session()?;
    let engine = OrganizationQueryEngine::with_config(&*session, config);

    match command {
        QueryCommands::ByBuilding { building_id } => {
            print_json(&engine.organizations_by_building(&building_id)?)
        }
        QueryCommands::Nearby { lat, lon, radius } => {
            print_json(&engine.organizations_in_radius(lat, lon, radius)?)
        }
        QueryCommands::ByActivity { activity_id } => {
            print_json(&engine.organizations_by_activity(&activity_id)?)
        }
        QueryCommands::ByActivityName { name } => {
            print_json(&engine.organizations_by_activity_name(&name)?)
        }
        QueryCommands::Search { name } => print_json(&engine.search_organizations_by_name(&name)?),
        QueryCommands::Get { organization_id } => {
            print_json(&engine.organization_by_id(&organization_id)?)
        }
        QueryCommands::List { skip, limit } => {
            print_json(&engine.list_organizations(Page::new(skip, limit))?)
        }
        QueryCommands::Building { building_id } => print_json(&engine.building_by_id(&building_id)?),
        QueryCommands::Buildings { skip, limit } => {
            print_json(&engine.list_buildings(Page::new(skip, limit))?)
        }
        QueryCommands::BuildingsNearby { lat, lon, radius } => {
            print_json(&engine.buildings_in_radius(lat, lon, radius)?)
        }
        QueryCommands::Tree { activity_id, depth } => match activity_id {
            Some(id) => print_json(&engine.activity_tree(&id, depth)?),
            None => print_json(&engine.activity_forest(depth)?),
        },
    }
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
