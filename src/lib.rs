mod boundaries;
mod bounds;
mod config;
mod datasets;
mod downloader;
mod errors;
mod hex;
pub mod pipeline;
mod planner;
pub mod providers;
mod raster;
mod regions;
pub mod tile_grid;

pub use boundaries::BoundarySource;
pub use bounds::GeoBounds;
pub use config::{BoundaryResolution, PipelineConfig};
pub use datasets::Dataset;
pub use downloader::TileDownloader;
pub use errors::Error;
pub use pipeline::{Pipeline, ProcessedRegion};
pub use planner::{plan_resolution, plan_with_override, Plan, Quality};
pub use raster::{MAX_VALID_ELEVATION, MIN_VALID_ELEVATION, NODATA};
pub use regions::{Region, RegionType, Registry};

/// Run the full pipeline for one region id with the given configuration.
pub async fn prepare_region(
    region_id: &str,
    config: PipelineConfig,
) -> Result<ProcessedRegion, Error> {
    Pipeline::new(config)?.process_region(region_id).await
}
