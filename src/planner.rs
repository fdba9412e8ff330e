//! Resolution planner.
//!
//! Given a region and a pixel budget, picks the coarsest dataset that still
//! satisfies the Nyquist rule (source ground sample distance at most half the
//! visible pixel size). Downloading finer data than that only burns bandwidth
//! and disk: the downsample step throws the extra pixels away.

use crate::bounds::GeoBounds;
use crate::config::PipelineConfig;
use crate::datasets::Dataset;
use crate::regions::{Region, RegionType};
use crate::tile_grid::{visible_pixel_size_meters, VisiblePixelSize};
use crate::Error;

/// Oversampling factor the source must reach before aggregation is clean.
pub const NYQUIST_FACTOR: f64 = 2.0;

/// How well the chosen source resolves the visible pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Quality {
    /// Oversampling >= 2: aliasing-free aggregation.
    Clean,
    /// Oversampling in [1.3, 2): usable, slightly soft.
    Marginal,
    /// Oversampling in (0.8, 1.3): roughly one source sample per pixel.
    Native,
    /// Oversampling <= 0.8: the source is coarser than the output.
    BelowNyquist,
}

impl Quality {
    fn from_oversampling(oversampling: f64) -> Quality {
        if oversampling >= NYQUIST_FACTOR {
            Quality::Clean
        } else if oversampling >= 1.3 {
            Quality::Marginal
        } else if oversampling > 0.8 {
            Quality::Native
        } else {
            Quality::BelowNyquist
        }
    }

    pub const fn as_str(self) -> &'static str {
        match self {
            Quality::Clean => "clean",
            Quality::Marginal => "marginal",
            Quality::Native => "native",
            Quality::BelowNyquist => "below-nyquist",
        }
    }
}

#[derive(Debug, Clone)]
pub struct Plan {
    pub dataset: Dataset,
    pub resolution_m: u32,
    pub visible: VisiblePixelSize,
    /// `visible.avg_mpp / NYQUIST_FACTOR`: the coarsest acceptable source.
    pub required_mpp: f64,
    pub oversampling: f64,
    pub quality: Quality,
}

/// Candidate datasets by region classification, finest first. USA states get
/// 3DEP; everything else runs on the global/SRTM catalogue, with SRTM ahead
/// of Copernicus at equal resolution and Copernicus covering the latitudes
/// SRTM never flew. GMTED joins the list only when enabled.
fn candidates(region_type: RegionType, enable_gmted: bool) -> Vec<Dataset> {
    let mut list = match region_type {
        RegionType::UsaState => vec![Dataset::Usa3dep10m, Dataset::Srtm30m, Dataset::Srtm90m],
        RegionType::Country | RegionType::Area => vec![
            Dataset::Srtm30m,
            Dataset::Copernicus30m,
            Dataset::Srtm90m,
            Dataset::Copernicus90m,
        ],
    };
    if enable_gmted {
        list.extend([Dataset::Gmted250m, Dataset::Gmted500m, Dataset::Gmted1000m]);
    }
    list
}

fn covered_candidates(region: &Region, config: &PipelineConfig) -> Vec<Dataset> {
    candidates(region.region_type, config.enable_gmted)
        .into_iter()
        .filter(|d| {
            config
                .allowed_datasets
                .as_ref()
                .map_or(true, |allowed| allowed.contains(d))
        })
        .filter(|d| dataset_admissible(*d, &region.bounds, region.region_type))
        .collect()
}

fn dataset_admissible(dataset: Dataset, bounds: &GeoBounds, region_type: RegionType) -> bool {
    if dataset.usa_only() {
        // Exhaustive on purpose: a new region classification must decide
        // whether 3DEP applies to it.
        match region_type {
            RegionType::UsaState => {}
            RegionType::Country | RegionType::Area => return false,
        }
    }
    dataset.covers(bounds)
}

fn build_plan(dataset: Dataset, visible: VisiblePixelSize) -> Plan {
    let resolution_m = dataset.resolution_m();
    let oversampling = visible.avg_mpp / f64::from(resolution_m);
    Plan {
        dataset,
        resolution_m,
        visible,
        required_mpp: visible.avg_mpp / NYQUIST_FACTOR,
        oversampling,
        quality: Quality::from_oversampling(oversampling),
    }
}

/// Pick a dataset for `region` under the Nyquist rule.
///
/// Among admissible datasets, the one with the largest native resolution
/// still at or below `avg_mpp / 2` wins. When even the finest admissible
/// dataset misses that bar (tiny or very dense regions) the finest one is
/// used and the plan's quality label says how far off it is.
pub fn plan_resolution(
    region: &Region,
    target_total_pixels: u64,
    config: &PipelineConfig,
) -> Result<Plan, Error> {
    let visible = visible_pixel_size_meters(&region.bounds, target_total_pixels);
    let required = visible.avg_mpp / NYQUIST_FACTOR;

    let admissible = covered_candidates(region, config);
    if admissible.is_empty() {
        return Err(Error::NoDatasetCovers(format!(
            "{} {}",
            region.id, region.bounds
        )));
    }

    // Coarsest resolution still within Nyquist; candidate order breaks ties
    // (SRTM ahead of Copernicus at equal resolution).
    let mut chosen: Option<Dataset> = None;
    for d in admissible
        .iter()
        .copied()
        .filter(|d| f64::from(d.resolution_m()) <= required)
    {
        match chosen {
            Some(c) if d.resolution_m() <= c.resolution_m() => {}
            _ => chosen = Some(d),
        }
    }
    let chosen = chosen.unwrap_or_else(|| {
        // Nothing satisfies Nyquist; fall back to the finest admissible.
        let mut finest = admissible[0];
        for d in admissible.iter().copied().skip(1) {
            if d.resolution_m() < finest.resolution_m() {
                finest = d;
            }
        }
        finest
    });

    let plan = build_plan(chosen, visible);
    log::info!(
        "planned {}: {} ({} m native, {:.0} m/px visible, oversampling {:.2}, {})",
        region.id,
        plan.dataset,
        plan.resolution_m,
        plan.visible.avg_mpp,
        plan.oversampling,
        plan.quality.as_str()
    );
    Ok(plan)
}

/// Honour a caller-forced dataset, still refusing one that cannot cover the
/// region's latitudes (or 3DEP outside the USA).
pub fn plan_with_override(
    region: &Region,
    target_total_pixels: u64,
    dataset: Dataset,
) -> Result<Plan, Error> {
    if !dataset_admissible(dataset, &region.bounds, region.region_type) {
        return Err(Error::IncompatibleDataset(format!(
            "{} does not cover {} {}",
            dataset, region.id, region.bounds
        )));
    }
    let visible = visible_pixel_size_meters(&region.bounds, target_total_pixels);
    Ok(build_plan(dataset, visible))
}
