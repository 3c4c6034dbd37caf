//! World-file descriptors
//!
//! A world file is a JSON document listing the static content of one
//! instance: named markers (spawn points, portals), named regions (XZ
//! polygons) and spawn data consumed by spawn generators.

use crate::WorldFileError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use tessera_core::glam::{Quat, Vec3};
use tessera_core::math::{horizontal_distance_sq, polygon_contains_xz};

pub type Properties = BTreeMap<String, serde_json::Value>;

/// Selects which fields a marker/region/info query returns.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct FieldMask(pub u32);

impl FieldMask {
    pub const NONE: FieldMask = FieldMask(0);
    pub const NAME: FieldMask = FieldMask(1 << 0);
    pub const LOC: FieldMask = FieldMask(1 << 1);
    pub const ORIENT: FieldMask = FieldMask(1 << 2);
    pub const PROPERTIES: FieldMask = FieldMask(1 << 3);
    pub const POINTS: FieldMask = FieldMask(1 << 4);
    pub const PRIORITY: FieldMask = FieldMask(1 << 5);
    pub const ALL: FieldMask = FieldMask(u32::MAX);

    pub fn contains(self, other: FieldMask) -> bool {
        self.0 & other.0 == other.0
    }
}

impl std::ops::BitOr for FieldMask {
    type Output = FieldMask;

    fn bitor(self, rhs: FieldMask) -> FieldMask {
        FieldMask(self.0 | rhs.0)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Marker {
    pub name: String,
    pub loc: Vec3,
    #[serde(default = "identity")]
    pub orient: Quat,
    #[serde(default)]
    pub properties: Properties,
}

fn identity() -> Quat {
    Quat::IDENTITY
}

/// Marker fields selected by a [`FieldMask`].
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct MarkerInfo {
    pub name: Option<String>,
    pub loc: Option<Vec3>,
    pub orient: Option<Quat>,
    pub properties: Option<Properties>,
}

impl Marker {
    pub fn project(&self, mask: FieldMask) -> MarkerInfo {
        MarkerInfo {
            name: mask.contains(FieldMask::NAME).then(|| self.name.clone()),
            loc: mask.contains(FieldMask::LOC).then_some(self.loc),
            orient: mask.contains(FieldMask::ORIENT).then_some(self.orient),
            properties: mask
                .contains(FieldMask::PROPERTIES)
                .then(|| self.properties.clone()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Region {
    pub name: String,
    pub points: Vec<Vec3>,
    #[serde(default)]
    pub priority: i32,
    #[serde(default)]
    pub properties: Properties,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RegionInfo {
    pub name: Option<String>,
    pub points: Option<Vec<Vec3>>,
    pub priority: Option<i32>,
    pub properties: Option<Properties>,
}

impl Region {
    pub fn contains(&self, point: Vec3) -> bool {
        polygon_contains_xz(&self.points, point)
    }

    pub fn project(&self, mask: FieldMask) -> RegionInfo {
        RegionInfo {
            name: mask.contains(FieldMask::NAME).then(|| self.name.clone()),
            points: mask.contains(FieldMask::POINTS).then(|| self.points.clone()),
            priority: mask.contains(FieldMask::PRIORITY).then_some(self.priority),
            properties: mask
                .contains(FieldMask::PROPERTIES)
                .then(|| self.properties.clone()),
        }
    }
}

/// Parameters for one spawn generator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpawnData {
    pub name: String,
    /// Template the generator instantiates.
    pub template: String,
    /// Registered generator class; empty selects the default generator.
    #[serde(default)]
    pub generator: String,
    pub loc: Vec3,
    #[serde(default = "identity")]
    pub orient: Quat,
    #[serde(default = "one")]
    pub count: u32,
    #[serde(default)]
    pub respawn_ms: u64,
    #[serde(default)]
    pub properties: Properties,
}

fn one() -> u32 {
    1
}

#[derive(Deserialize)]
struct RawWorldFile {
    #[serde(default)]
    name: String,
    #[serde(default)]
    markers: Vec<Marker>,
    #[serde(default)]
    regions: Vec<Region>,
    #[serde(default)]
    spawns: Vec<SpawnData>,
    #[serde(default)]
    properties: Properties,
}

/// Parsed world file, indexed by name.
#[derive(Debug, Clone, Default)]
pub struct WorldFile {
    pub name: String,
    markers: BTreeMap<String, Marker>,
    regions: BTreeMap<String, Region>,
    spawns: Vec<SpawnData>,
    pub properties: Properties,
}

impl WorldFile {
    pub fn load(path: &Path) -> Result<Self, WorldFileError> {
        let text = std::fs::read_to_string(path).map_err(|source| WorldFileError::Unreadable {
            path: path.to_path_buf(),
            source,
        })?;
        let world = Self::from_json(path, &text)?;
        tracing::debug!(
            path = %path.display(),
            markers = world.markers.len(),
            regions = world.regions.len(),
            spawns = world.spawns.len(),
            "world file loaded"
        );
        Ok(world)
    }

    /// Parse `text`; `path` is only used for error reporting.
    pub fn from_json(path: &Path, text: &str) -> Result<Self, WorldFileError> {
        let raw: RawWorldFile =
            serde_json::from_str(text).map_err(|source| WorldFileError::Malformed {
                path: path.to_path_buf(),
                source,
            })?;

        let mut markers = BTreeMap::new();
        for marker in raw.markers {
            if markers.contains_key(&marker.name) {
                return Err(duplicate(path, "marker", marker.name));
            }
            markers.insert(marker.name.clone(), marker);
        }

        let mut regions = BTreeMap::new();
        for region in raw.regions {
            if regions.contains_key(&region.name) {
                return Err(duplicate(path, "region", region.name));
            }
            regions.insert(region.name.clone(), region);
        }

        Ok(Self {
            name: raw.name,
            markers,
            regions,
            spawns: raw.spawns,
            properties: raw.properties,
        })
    }

    pub fn marker(&self, name: &str) -> Option<&Marker> {
        self.markers.get(name)
    }

    pub fn region(&self, name: &str) -> Option<&Region> {
        self.regions.get(name)
    }

    pub fn marker_info(&self, name: &str, mask: FieldMask) -> Option<MarkerInfo> {
        self.marker(name).map(|m| m.project(mask))
    }

    pub fn region_info(&self, name: &str, mask: FieldMask) -> Option<RegionInfo> {
        self.region(name).map(|r| r.project(mask))
    }

    pub fn markers(&self) -> impl Iterator<Item = &Marker> {
        self.markers.values()
    }

    pub fn regions(&self) -> impl Iterator<Item = &Region> {
        self.regions.values()
    }

    pub fn spawns(&self) -> &[SpawnData] {
        &self.spawns
    }

    /// Regions containing `point`, highest priority first.
    pub fn regions_at(&self, point: Vec3) -> Vec<&Region> {
        let mut hits: Vec<&Region> = self.regions.values().filter(|r| r.contains(point)).collect();
        hits.sort_by(|a, b| b.priority.cmp(&a.priority).then_with(|| a.name.cmp(&b.name)));
        hits
    }

    /// Markers within `radius` of `point` on the XZ plane, nearest first.
    pub fn markers_near(&self, point: Vec3, radius: f32) -> Vec<&Marker> {
        let limit = radius * radius;
        let mut hits: Vec<(f32, &Marker)> = self
            .markers
            .values()
            .map(|m| (horizontal_distance_sq(m.loc, point), m))
            .filter(|(d, _)| *d <= limit)
            .collect();
        hits.sort_by(|a, b| a.0.total_cmp(&b.0));
        hits.into_iter().map(|(_, m)| m).collect()
    }
}

fn duplicate(path: &Path, what: &'static str, name: String) -> WorldFileError {
    WorldFileError::Duplicate {
        path: path.to_path_buf(),
        what,
        name,
    }
}
