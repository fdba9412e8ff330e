//! End-to-end pipeline run against in-memory providers: download with
//! fallback, merge, reproject, downsample, export and manifest — offline.

use bytes::Bytes;
use gdal::raster::Buffer;
use gdal::spatial_ref::SpatialRef;
use gdal::DriverManager;
use std::path::Path;

use demprep::pipeline::{export, Pipeline, FORMAT_VERSION};
use demprep::providers::{MemoryProvider, Provider, ProviderRegistry, Scripted};
use demprep::tile_grid::{snap_to_degree_grid, tiles_covering, TileId};
use demprep::{Dataset, PipelineConfig, Quality, Region, RegionType};

const DATASET: Dataset = Dataset::Gmted1000m;

fn tile_bytes(tile: TileId, value: f32) -> Bytes {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("tile.tif");
    let ppd = DATASET.pixels_per_degree();
    {
        let driver = DriverManager::get_driver_by_name("GTiff").unwrap();
        let mut ds = driver
            .create_with_band_type::<f32, _>(&path, ppd, ppd, 1)
            .unwrap();
        let bounds = tile.bounds();
        ds.set_geo_transform(&[
            bounds.west,
            1.0 / ppd as f64,
            0.0,
            bounds.north,
            0.0,
            -1.0 / ppd as f64,
        ])
        .unwrap();
        ds.set_spatial_ref(&SpatialRef::from_epsg(4326).unwrap())
            .unwrap();
        let mut band = ds.rasterband(1).unwrap();
        band.set_no_data_value(Some(-32768.0)).unwrap();
        let mut buf = Buffer::new((ppd, ppd), vec![value; ppd * ppd]);
        band.write((0, 0), (ppd, ppd), &mut buf).unwrap();
    }
    Bytes::from(std::fs::read(&path).unwrap())
}

/// 2x2 tiles around 46N; snapped bounds (6, 45)..(8, 47).
fn test_region() -> Region {
    Region::new(
        "test-area",
        "Test Area",
        (6.2, 45.2, 7.8, 46.8),
        RegionType::Area,
        None,
        false,
    )
    .unwrap()
}

fn test_config(root: &Path) -> PipelineConfig {
    let mut config = PipelineConfig::default();
    config.data_root = root.join("data");
    config.generated_root = root.join("generated");
    config.target_total_pixels = 4096;
    config.enable_gmted = true;
    config
}

#[tokio::test]
async fn test_process_region_end_to_end() {
    let dir = tempfile::tempdir().unwrap();
    let region = test_region();
    let config = test_config(dir.path());

    // Northern tiles high, southern tiles low, one tile only on the
    // fallback provider.
    let hole = TileId { lat: 45, lon: 7 };
    let mut primary = MemoryProvider::new("primary").with_response(hole, Scripted::NotAvailable);
    for tile in tiles_covering(&snap_to_degree_grid(&region.bounds)) {
        if tile == hole {
            continue;
        }
        let value = if tile.lat >= 46 { 1000.0 } else { 200.0 };
        primary = primary.with_response(tile, Scripted::Tile(tile_bytes(tile, value)));
    }
    let secondary =
        MemoryProvider::new("secondary").with_response(hole, Scripted::Tile(tile_bytes(hole, 200.0)));

    let pipeline = Pipeline::with_providers(
        config.clone(),
        ProviderRegistry::with_providers(vec![
            Provider::Memory(primary),
            Provider::Memory(secondary),
        ]),
    )
    .unwrap();

    let result = pipeline.process(&region).await.unwrap();
    assert_eq!(result.dataset, DATASET);
    assert_eq!(result.quality, Quality::Clean);
    assert_eq!(result.metric_epsg, 3857);
    assert!((result.width * result.height) as u64 <= config.target_total_pixels);

    // Aspect preservation: exported dimensions match the metric raster's
    // aspect within 0.1%.
    let metric_path = config
        .processed_dir(DATASET)
        .join("test-area_metric_1000m.tif");
    let metric = gdal::Dataset::open(&metric_path).unwrap();
    let (mw, mh) = metric.raster_size();
    let metric_aspect = mw as f64 / mh as f64;
    let export_aspect = result.width as f64 / result.height as f64;
    assert!(
        ((export_aspect - metric_aspect) / metric_aspect).abs() < 1e-3,
        "aspect {} vs {}",
        export_aspect,
        metric_aspect
    );

    // The artifact exists (with its gzip mirror), parses, and carries the
    // current format version.
    let artifact = export::read_artifact(&result.artifact_path).unwrap();
    artifact.ensure_version(FORMAT_VERSION).unwrap();
    assert!(export::gz_sibling(&result.artifact_path).exists());
    assert_eq!(artifact.width, result.width);
    assert_eq!(artifact.region_id, "test-area");
    assert_eq!(artifact.source, "GMTED_1000m");

    // Row 0 is north: high plateau on top, low plateau at the bottom, and
    // the fallback-provided southeast tile is present in the grid.
    let mid = artifact.width / 2;
    let top = artifact.elevation[2][mid].unwrap();
    let bottom = artifact.elevation[artifact.height - 3][mid].unwrap();
    assert!((top - 1000.0).abs() < 2.0, "top={}", top);
    assert!((bottom - 200.0).abs() < 2.0, "bottom={}", bottom);

    // Exported bounds are the metric extent back in WGS84, so they cover
    // the snapped region (up to a metric pixel of slack at the edges).
    assert!(artifact.bounds.west <= 6.05);
    assert!(artifact.bounds.east >= 7.95);
    assert!(artifact.bounds.north >= 46.95);
    assert!(artifact.bounds.south <= 45.05);

    // Manifest integrity: the entry points at a readable artifact with the
    // declared version.
    let manifest = pipeline.manifest().load().unwrap();
    assert_eq!(manifest.format_version, FORMAT_VERSION);
    let entry = &manifest.regions["test-area"];
    assert_eq!(entry.source, "GMTED_1000m");
    assert_eq!(entry.width, result.width);
    pipeline
        .manifest()
        .verify_against(&config.regions_dir())
        .unwrap();
}

#[tokio::test]
async fn test_rerun_short_circuits_every_stage() {
    let dir = tempfile::tempdir().unwrap();
    let region = test_region();
    let config = test_config(dir.path());

    let mut provider = MemoryProvider::new("only");
    for tile in tiles_covering(&snap_to_degree_grid(&region.bounds)) {
        provider = provider.with_response(tile, Scripted::Tile(tile_bytes(tile, 640.0)));
    }
    let log = provider.call_log();

    let pipeline = Pipeline::with_providers(
        config,
        ProviderRegistry::with_providers(vec![Provider::Memory(provider)]),
    )
    .unwrap();

    let first = pipeline.process(&region).await.unwrap();
    let calls_after_first = log.lock().unwrap().len();
    let artifact_bytes = std::fs::read(&first.artifact_path).unwrap();

    let second = pipeline.process(&region).await.unwrap();
    assert_eq!(log.lock().unwrap().len(), calls_after_first);
    assert_eq!(first.width, second.width);
    assert_eq!(first.height, second.height);
    // The artifact is rewritten (fresh timestamp) but describes the same
    // grid.
    let reread = export::read_artifact(&second.artifact_path).unwrap();
    let original: demprep::pipeline::ExportArtifact =
        serde_json::from_slice(&artifact_bytes).unwrap();
    assert_eq!(reread.elevation, original.elevation);
}
