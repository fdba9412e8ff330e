//! Per-region orchestration: plan, download, clip, reproject, downsample,
//! export, manifest. Stages persist under deterministic paths so a rerun
//! picks up where the previous one finished.

pub mod clip;
pub mod downsample;
pub mod export;
pub mod manifest;
pub mod reproject;

use sha2::{Digest, Sha256};
use std::path::PathBuf;

use crate::boundaries::BoundarySource;
use crate::config::{ensure_dir, BoundaryResolution, PipelineConfig};
use crate::datasets::Dataset;
use crate::downloader::TileDownloader;
use crate::hex::bytes_to_hex_string;
use crate::planner::{plan_resolution, Plan, Quality};
use crate::providers::ProviderRegistry;
use crate::raster;
use crate::regions::{Region, RegionType, Registry};
use crate::Error;

pub use export::{ArtifactBounds, ExportArtifact, FORMAT_VERSION};
pub use manifest::{Manifest, ManifestEntry, ManifestStore};

#[derive(Debug)]
pub struct ProcessedRegion {
    pub region_id: String,
    pub dataset: Dataset,
    pub quality: Quality,
    pub metric_epsg: u32,
    pub width: usize,
    pub height: usize,
    pub artifact_path: PathBuf,
}

pub struct Pipeline {
    config: PipelineConfig,
    downloader: TileDownloader,
    boundaries: BoundarySource,
    manifest: ManifestStore,
}

impl Pipeline {
    pub fn new(config: PipelineConfig) -> Result<Pipeline, Error> {
        config.validate()?;
        let providers = ProviderRegistry::from_config(&config)?;
        Pipeline::with_providers(config, providers)
    }

    /// Bring-your-own transports; tests use this with in-memory providers.
    pub fn with_providers(
        config: PipelineConfig,
        providers: ProviderRegistry,
    ) -> Result<Pipeline, Error> {
        config.validate()?;
        let boundaries =
            BoundarySource::new(config.boundaries_cache_dir(), config.boundary_resolution)?;
        let manifest = ManifestStore::new(config.manifest_path());
        let downloader = TileDownloader::new(config.clone(), providers);
        Ok(Pipeline {
            config,
            downloader,
            boundaries,
            manifest,
        })
    }

    pub fn manifest(&self) -> &ManifestStore {
        &self.manifest
    }

    pub async fn process_region(&self, region_id: &str) -> Result<ProcessedRegion, Error> {
        let region = Registry::global().get(region_id)?.clone();
        self.process(&region).await
    }

    pub async fn process(&self, region: &Region) -> Result<ProcessedRegion, Error> {
        // Coarse boundaries silently drop coastline islands; for state
        // clipping that data loss is not acceptable.
        match region.region_type {
            RegionType::UsaState => {
                if self.config.boundary_resolution != BoundaryResolution::TenMeter {
                    return Err(Error::Configuration(format!(
                        "{}: state clipping requires 10m boundaries, configured {}",
                        region.id,
                        self.config.boundary_resolution.as_str()
                    )));
                }
            }
            RegionType::Country | RegionType::Area => {}
        }

        let plan = plan_resolution(region, self.config.target_total_pixels, &self.config)?;
        let merged = self
            .downloader
            .fetch_region_raster(region, plan.dataset)
            .await?;

        let working = if region.clip_boundary {
            let clipped = self.clip_stage(region, &plan, &merged).await?;
            let ratio = raster::finite_coverage_ratio(&clipped)?;
            if ratio < self.config.min_coverage_ratio {
                return Err(Error::InsufficientCoverage {
                    region: region.id.clone(),
                    ratio,
                    minimum: self.config.min_coverage_ratio,
                });
            }
            clipped
        } else {
            // No polygon: the merged raster is the stage output as-is.
            merged
        };

        let processed_dir = self.config.processed_dir(plan.dataset);
        ensure_dir(&processed_dir)?;

        let metric_path = processed_dir.join(format!(
            "{}_metric_{}m.tif",
            region.id, plan.resolution_m
        ));
        let metric_epsg = if metric_path.exists() {
            reproject::metric_crs_for(region.bounds.center_lat())
        } else {
            let tmp = metric_path.with_extension("tif.part");
            let epsg = reproject::reproject_to_metric(&working, &tmp, 1.0)?;
            std::fs::rename(&tmp, &metric_path)
                .map_err(|e| Error::Storage(format!("cannot finalize reprojection: {}", e)))?;
            epsg
        };

        let metric_info = raster::open_info(&metric_path)?;
        let (width, height) = downsample::target_dimensions(
            metric_info.width,
            metric_info.height,
            self.config.target_total_pixels,
        );
        let processed_path = processed_dir.join(format!(
            "{}_processed_{}x{}_v{}.tif",
            region.id, width, height, FORMAT_VERSION
        ));
        if !processed_path.exists() {
            let tmp = processed_path.with_extension("tif.part");
            downsample::downsample_to(&metric_path, &tmp, width, height)?;
            std::fs::rename(&tmp, &processed_path)
                .map_err(|e| Error::Storage(format!("cannot finalize downsample: {}", e)))?;
        }

        let artifact = export::build_artifact(&processed_path, region, plan.dataset)?;
        let regions_dir = self.config.regions_dir();
        ensure_dir(&regions_dir)?;
        let artifact_name = format!(
            "{}_{}_{}px_v{}.json",
            region.id, plan.dataset, self.config.target_total_pixels, FORMAT_VERSION
        );
        let artifact_path = regions_dir.join(&artifact_name);
        export::write_artifact(&artifact, &artifact_path)?;

        let entry = ManifestEntry {
            filename: artifact_name,
            display_name: region.display_name.clone(),
            region_type: region.region_type,
            bounds: artifact.bounds,
            source: artifact.source.clone(),
            width: artifact.width,
            height: artifact.height,
            generated: artifact.exported.clone(),
            format_version: artifact.version,
        };
        self.manifest.update(&region.id, entry).await?;

        log::info!(
            "{}: {}x{} artifact from {} ({})",
            region.id,
            width,
            height,
            plan.dataset,
            plan.quality.as_str()
        );
        Ok(ProcessedRegion {
            region_id: region.id.clone(),
            dataset: plan.dataset,
            quality: plan.quality,
            metric_epsg,
            width: artifact.width,
            height: artifact.height,
            artifact_path,
        })
    }

    /// Clip to the admin polygon, short-circuiting on the cached output. The
    /// path carries a hash of (bounds, dataset, boundary grade) so a changed
    /// region definition never reuses a stale clip.
    async fn clip_stage(
        &self,
        region: &Region,
        plan: &Plan,
        merged: &std::path::Path,
    ) -> Result<PathBuf, Error> {
        let country = region.country.as_deref().ok_or_else(|| {
            Error::BoundaryNotFound(format!("{}: no country to resolve a boundary for", region.id))
        })?;
        let subdivision = match region.region_type {
            RegionType::UsaState => Some(region.display_name.as_str()),
            RegionType::Country => None,
            // Areas are never clipped today, but if one asks, its country's
            // admin-0 outline is the only sensible polygon.
            RegionType::Area => None,
        };

        let clip_dir = self.config.clipped_dir(plan.dataset);
        ensure_dir(&clip_dir)?;
        let clipped_path = clip_dir.join(format!(
            "{}_clipped_{}.tif",
            region.id,
            clip_hash(region, plan.dataset, self.config.boundary_resolution)
        ));
        if clipped_path.exists() {
            return Ok(clipped_path);
        }

        let polygon = self.boundaries.admin_polygon(country, subdivision).await?;
        let tmp = clipped_path.with_extension("tif.part");
        clip::clip_to_boundary(&region.id, merged, &polygon, &tmp)?;
        std::fs::rename(&tmp, &clipped_path)
            .map_err(|e| Error::Storage(format!("cannot finalize clip: {}", e)))?;
        Ok(clipped_path)
    }
}

fn clip_hash(region: &Region, dataset: Dataset, grade: BoundaryResolution) -> String {
    let mut hasher = Sha256::new();
    hasher.update(format!(
        "{:.6}|{:.6}|{:.6}|{:.6}|{}|{}",
        region.bounds.west,
        region.bounds.south,
        region.bounds.east,
        region.bounds.north,
        dataset.id(),
        grade.as_str()
    ));
    bytes_to_hex_string(&hasher.finalize())[..8].to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clip_hash_is_stable_and_sensitive() {
        let ohio = Registry::global().get("ohio").unwrap();
        let a = clip_hash(ohio, Dataset::Srtm90m, BoundaryResolution::TenMeter);
        let b = clip_hash(ohio, Dataset::Srtm90m, BoundaryResolution::TenMeter);
        assert_eq!(a, b);
        assert_eq!(a.len(), 8);
        assert_ne!(
            a,
            clip_hash(ohio, Dataset::Srtm30m, BoundaryResolution::TenMeter)
        );
        let indiana = Registry::global().get("indiana").unwrap();
        assert_ne!(
            a,
            clip_hash(indiana, Dataset::Srtm90m, BoundaryResolution::TenMeter)
        );
    }
}
