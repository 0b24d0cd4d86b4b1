//! Orgdir query core
//!
//! Read-only query layer over an [`EntityStore`]:
//!
//! - [`resolver`]: bounded-depth expansion of the activity forest
//! - [`engine`]: organization lookups (building, geo box, activity, name, id)
//! - [`assembler`]: flattening of organization records into [`OrganizationView`]s
//!
//! Nothing here holds global state. Every query borrows a store handle for its
//! duration, so a caller that hands out per-request sessions gets per-request
//! isolation for free.

pub mod assembler;
pub mod config;
pub mod engine;
pub mod error;
pub mod resolver;
pub mod store;
pub mod tree;

pub use assembler::OrganizationView;
pub use config::QueryConfig;
pub use engine::OrganizationQueryEngine;
pub use error::{DirectoryError, EntityKind, Result, StoreError};
pub use resolver::{ActivityTreeResolver, DEFAULT_MAX_DEPTH};
pub use store::{EntityStore, StoreResult};
pub use tree::ActivityNode;

pub use orgdir_store::{Activity, Building, GeoBox, Organization, OrganizationRecord, Page};
