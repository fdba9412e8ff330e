use demprep::tile_grid::{estimate_tile_bytes, snap_to_degree_grid, tiles_covering};
use demprep::{plan_resolution, Error, PipelineConfig, Registry};
use std::env;

/// Print the plan for a region (dataset choice, tile grid, download
/// estimate) without any network or raster I/O.
fn main() -> Result<(), Error> {
    env_logger::init();
    let args: Vec<String> = env::args().collect();
    if args.len() <= 1 {
        println!("Usage: <region_id> [target_total_pixels]");
        return Err(Error::Configuration(
            "Missing commandline argument".to_string(),
        ));
    }

    let region = Registry::global().get(&args[1])?;
    let mut config = PipelineConfig::default();
    if let Some(pixels) = args.get(2) {
        config.target_total_pixels = pixels
            .parse()
            .map_err(|e| Error::Configuration(format!("bad pixel budget {:?}: {}", pixels, e)))?;
    }

    let plan = plan_resolution(region, config.target_total_pixels, &config)?;
    let aligned = snap_to_degree_grid(&region.bounds);
    let tiles = tiles_covering(&aligned);
    let estimated_bytes: u64 = tiles
        .iter()
        .map(|t| estimate_tile_bytes(t.lat, plan.resolution_m))
        .sum();

    println!("{} ({})", region.display_name, region.id);
    println!("  bounds: {}", region.bounds);
    println!("  dataset: {} ({} m native)", plan.dataset, plan.resolution_m);
    println!(
        "  visible pixel: {:.0} m avg, oversampling {:.2} ({})",
        plan.visible.avg_mpp,
        plan.oversampling,
        plan.quality.as_str()
    );
    println!(
        "  tiles: {} x 1 degree cells, ~{} MB to download when cold",
        tiles.len(),
        estimated_bytes / (1024 * 1024)
    );
    Ok(())
}
