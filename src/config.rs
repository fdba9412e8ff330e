//! Configuration surface and on-disk layout.

use crate::datasets::Dataset;
use crate::Error;
use std::collections::HashMap;
use std::path::{Path, PathBuf};

pub const DEFAULT_TARGET_TOTAL_PIXELS: u64 = 4_194_304; // 2048^2
pub const DEFAULT_MAX_CONCURRENT_TILES: usize = 4;
pub const DEFAULT_REQUEST_TIMEOUT_SECONDS: u64 = 60;
pub const DEFAULT_MAX_RETRIES: u32 = 3;
pub const DEFAULT_MIN_COVERAGE_RATIO: f64 = 0.2;

/// Natural Earth boundary grade. 10m is mandatory for USA state clipping;
/// coarser grades lose coastline islands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BoundaryResolution {
    TenMeter,
    FiftyMeter,
    HundredTenMeter,
}

impl BoundaryResolution {
    pub const fn as_str(self) -> &'static str {
        match self {
            BoundaryResolution::TenMeter => "10m",
            BoundaryResolution::FiftyMeter => "50m",
            BoundaryResolution::HundredTenMeter => "110m",
        }
    }
}

#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Pixel budget for the exported artifact.
    pub target_total_pixels: u64,
    /// Provider ids in preference order; anything not listed keeps the
    /// registry's default order after the listed ones.
    pub provider_priority: Vec<String>,
    /// provider id -> credential (API key/token).
    pub credentials: HashMap<String, String>,
    /// Restrict the planner to these datasets. `None` means all known.
    pub allowed_datasets: Option<Vec<Dataset>>,
    /// Root for raw/merged/clipped/processed rasters.
    pub data_root: PathBuf,
    /// Root for viewer-facing artifacts and the manifest.
    pub generated_root: PathBuf,
    /// Overrides `{data_root}/raw` as the shared tile pool location.
    pub tile_pool_root: Option<PathBuf>,
    pub max_concurrent_tiles: usize,
    pub request_timeout_seconds: u64,
    pub max_retries: u32,
    pub enable_gmted: bool,
    pub min_coverage_ratio: f64,
    pub boundary_resolution: BoundaryResolution,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        PipelineConfig {
            target_total_pixels: DEFAULT_TARGET_TOTAL_PIXELS,
            provider_priority: Vec::new(),
            credentials: HashMap::new(),
            allowed_datasets: None,
            data_root: PathBuf::from("data"),
            generated_root: PathBuf::from("generated"),
            tile_pool_root: None,
            max_concurrent_tiles: DEFAULT_MAX_CONCURRENT_TILES,
            request_timeout_seconds: DEFAULT_REQUEST_TIMEOUT_SECONDS,
            max_retries: DEFAULT_MAX_RETRIES,
            enable_gmted: false,
            min_coverage_ratio: DEFAULT_MIN_COVERAGE_RATIO,
            boundary_resolution: BoundaryResolution::TenMeter,
        }
    }
}

impl PipelineConfig {
    pub fn validate(&self) -> Result<(), Error> {
        if self.target_total_pixels == 0 {
            return Err(Error::Configuration(
                "target_total_pixels must be positive".to_string(),
            ));
        }
        if self.max_concurrent_tiles == 0 {
            return Err(Error::Configuration(
                "max_concurrent_tiles must be positive".to_string(),
            ));
        }
        if !(0.0..=1.0).contains(&self.min_coverage_ratio) {
            return Err(Error::Configuration(format!(
                "min_coverage_ratio must be in [0, 1], got {}",
                self.min_coverage_ratio
            )));
        }
        Ok(())
    }

    /// `{tile_pool_root|data/raw}/{dataset_dir}/tiles/`, shared across all
    /// regions.
    pub fn tile_pool_dir(&self, dataset: Dataset) -> PathBuf {
        let raw = match &self.tile_pool_root {
            Some(root) => root.clone(),
            None => self.data_root.join("raw"),
        };
        raw.join(dataset.dir_key()).join("tiles")
    }

    pub fn merged_dir(&self, dataset: Dataset) -> PathBuf {
        self.data_root.join("merged").join(dataset.dir_key())
    }

    pub fn clipped_dir(&self, dataset: Dataset) -> PathBuf {
        self.data_root.join("clipped").join(dataset.dir_key())
    }

    pub fn processed_dir(&self, dataset: Dataset) -> PathBuf {
        self.data_root.join("processed").join(dataset.dir_key())
    }

    pub fn boundaries_cache_dir(&self) -> PathBuf {
        self.data_root.join(".cache").join("boundaries")
    }

    pub fn regions_dir(&self) -> PathBuf {
        self.generated_root.join("regions")
    }

    pub fn manifest_path(&self) -> PathBuf {
        self.regions_dir().join("regions_manifest.json")
    }
}

pub(crate) fn ensure_dir(dir: &Path) -> Result<(), Error> {
    std::fs::create_dir_all(dir)
        .map_err(|e| Error::Storage(format!("cannot create {}: {}", dir.display(), e)))
}
