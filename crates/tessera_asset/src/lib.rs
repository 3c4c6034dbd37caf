//! Tessera World Assets
//!
//! Static world data an instance is built from:
//! - World-file descriptors (markers, regions, spawn data)
//! - Path-variable expansion for world, init and load script references

pub mod error;
pub mod paths;
pub mod world;

pub use error::WorldFileError;
pub use paths::PathVariables;
pub use world::{
    FieldMask, Marker, MarkerInfo, Region, RegionInfo, SpawnData, WorldFile,
};
