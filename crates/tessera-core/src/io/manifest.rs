//! TOML descriptions of montage inputs and results.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::Result;
use crate::pipeline::TilePlacement;
use crate::raster::Raster;
use crate::transform::Transform;

use super::image_io::load_raster;

/// One input tile: its image and initial world offset.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ManifestTile {
    pub path: PathBuf,
    #[serde(default)]
    pub x: f64,
    #[serde(default)]
    pub y: f64,
    #[serde(default)]
    pub fixed: bool,
}

/// List of tiles making up a montage.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Manifest {
    #[serde(default)]
    pub tiles: Vec<ManifestTile>,
}

impl Manifest {
    /// Read a manifest. Relative tile paths are resolved against the
    /// manifest's directory.
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        let mut manifest: Manifest = toml::from_str(&text)?;
        if let Some(dir) = path.parent() {
            for tile in &mut manifest.tiles {
                if tile.path.is_relative() {
                    tile.path = dir.join(&tile.path);
                }
            }
        }
        Ok(manifest)
    }

    pub fn placements(&self) -> Vec<TilePlacement> {
        self.tiles
            .iter()
            .map(|t| TilePlacement {
                offset: [t.x, t.y],
                fixed: t.fixed,
            })
            .collect()
    }

    pub fn load_rasters(&self) -> Result<Vec<Raster>> {
        self.tiles
            .iter()
            .map(|t| {
                let raster = load_raster(&t.path)?;
                info!(
                    path = %t.path.display(),
                    width = raster.width(),
                    height = raster.height(),
                    "loaded tile"
                );
                Ok(raster)
            })
            .collect()
    }
}

/// Persisted transform of one tile.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TileTransform {
    pub path: PathBuf,
    pub class: String,
    pub data: String,
}

impl TileTransform {
    pub fn transform(&self) -> Result<Transform> {
        Transform::from_class_and_data(&self.class, &self.data)
    }
}

/// Final transforms of a montage run.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct MontageResult {
    #[serde(default)]
    pub tiles: Vec<TileTransform>,
}

impl MontageResult {
    pub fn new(manifest: &Manifest, transforms: &[Transform]) -> Self {
        let tiles = manifest
            .tiles
            .iter()
            .zip(transforms)
            .map(|(tile, transform)| TileTransform {
                path: tile.path.clone(),
                class: transform.class_name().to_string(),
                data: transform.to_data_string(),
            })
            .collect();
        Self { tiles }
    }

    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Ok(toml::from_str(&text)?)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        std::fs::write(path, toml::to_string_pretty(self)?)?;
        Ok(())
    }

    pub fn transforms(&self) -> Result<Vec<Transform>> {
        self.tiles.iter().map(TileTransform::transform).collect()
    }
}
