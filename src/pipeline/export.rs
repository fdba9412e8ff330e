//! The viewer-facing JSON artifact.

use chrono::Utc;
use flate2::write::GzEncoder;
use flate2::Compression;
use gdal::spatial_ref::{CoordTransform, SpatialRef};
use gdal::Dataset as GdalDataset;
use serde::{Deserialize, Serialize};
use std::io::Write;
use std::path::Path;

use crate::datasets::Dataset;
use crate::raster;
use crate::regions::Region;
use crate::Error;

/// On-wire schema version. Any change to the artifact shape (new field,
/// changed semantics, different no-data convention) must bump this, bump the
/// manifest's expected version, and regenerate every artifact.
pub const FORMAT_VERSION: u32 = 2;

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ArtifactBounds {
    pub north: f64,
    pub south: f64,
    pub east: f64,
    pub west: f64,
}

/// The exported object. `elevation[row][col]`, row 0 is the northernmost
/// row; no-data is `null` (the arrays never contain NaN or infinities).
#[derive(Debug, Serialize, Deserialize)]
pub struct ExportArtifact {
    pub version: u32,
    pub exported: String,
    pub region: String,
    pub region_id: String,
    pub bounds: ArtifactBounds,
    pub elevation: Vec<Vec<Option<f32>>>,
    pub width: usize,
    pub height: usize,
    pub nodata: Option<f64>,
    pub source: String,
    pub resolution_m: u32,
    pub min: f64,
    pub max: f64,
    pub mean: f64,
}

impl ExportArtifact {
    /// Readers reject versions they do not understand.
    pub fn ensure_version(&self, expected: u32) -> Result<(), Error> {
        if self.version != expected {
            return Err(Error::FormatVersionMismatch {
                expected,
                found: self.version,
            });
        }
        Ok(())
    }
}

/// Build the artifact from a processed (metric, budget-sized) raster. The
/// embedded bounds are the metric extent re-expressed in WGS84 so the viewer
/// can place the grid.
pub fn build_artifact(
    processed_path: &Path,
    region: &Region,
    dataset: Dataset,
) -> Result<ExportArtifact, Error> {
    let (info, data) = raster::read_full_f32(processed_path)?;

    let ds = GdalDataset::open(processed_path)?;
    let src_srs = ds.spatial_ref()?;
    // CRS84 is WGS84 with guaranteed lon/lat axis order.
    let wgs84 = SpatialRef::from_definition("OGC:CRS84")?;
    let transform = CoordTransform::new(&src_srs, &wgs84)?;
    let extent = info.extent();
    let geo = transform.transform_bounds(&[extent.xmin, extent.ymin, extent.xmax, extent.ymax], 21)?;
    let bounds = ArtifactBounds {
        west: geo[0],
        south: geo[1],
        east: geo[2],
        north: geo[3],
    };

    let sentinel = info.nodata.map(|n| n as f32);
    let mut elevation = Vec::with_capacity(info.height);
    let mut min = f64::INFINITY;
    let mut max = f64::NEG_INFINITY;
    let mut sum = 0.0;
    let mut finite_cells = 0u64;
    for row in 0..info.height {
        let mut cells = Vec::with_capacity(info.width);
        for col in 0..info.width {
            let v = data[row * info.width + col];
            if v.is_finite() && Some(v) != sentinel {
                let v64 = f64::from(v);
                min = min.min(v64);
                max = max.max(v64);
                sum += v64;
                finite_cells += 1;
                cells.push(Some(v));
            } else {
                cells.push(None);
            }
        }
        elevation.push(cells);
    }
    if finite_cells == 0 {
        return Err(Error::InsufficientCoverage {
            region: region.id.clone(),
            ratio: 0.0,
            minimum: 0.0,
        });
    }
    if min < raster::MIN_VALID_ELEVATION || max > raster::MAX_VALID_ELEVATION {
        return Err(Error::ElevationOutOfRange(format!(
            "{}: [{:.0}, {:.0}]",
            region.id, min, max
        )));
    }

    Ok(ExportArtifact {
        version: FORMAT_VERSION,
        exported: Utc::now().to_rfc3339(),
        region: region.display_name.clone(),
        region_id: region.id.clone(),
        bounds,
        elevation,
        width: info.width,
        height: info.height,
        nodata: None,
        source: dataset.id().to_string(),
        resolution_m: dataset.resolution_m(),
        min,
        max,
        mean: sum / finite_cells as f64,
    })
}

/// Write `{path}` and `{path}.gz`; the gzip member decompresses to the exact
/// same bytes. Both writes go through a staging name and a rename.
pub fn write_artifact(artifact: &ExportArtifact, path: &Path) -> Result<(), Error> {
    let json = serde_json::to_vec(artifact)?;

    let staging = path.with_extension("json.part");
    std::fs::write(&staging, &json)
        .and_then(|_| std::fs::rename(&staging, path))
        .map_err(|e| Error::Storage(format!("cannot write {}: {}", path.display(), e)))?;

    let gz_path = gz_sibling(path);
    let gz_staging = gz_path.with_extension("gz.part");
    let write_gz = || -> std::io::Result<()> {
        let file = std::fs::File::create(&gz_staging)?;
        let mut encoder = GzEncoder::new(file, Compression::default());
        encoder.write_all(&json)?;
        encoder.finish()?;
        std::fs::rename(&gz_staging, &gz_path)
    };
    write_gz().map_err(|e| Error::Storage(format!("cannot write {}: {}", gz_path.display(), e)))?;
    Ok(())
}

pub fn gz_sibling(path: &Path) -> std::path::PathBuf {
    let mut name = path.file_name().unwrap_or_default().to_os_string();
    name.push(".gz");
    path.with_file_name(name)
}

/// Read an artifact (plain or gzipped by extension). Version checking is the
/// caller's call via [`ExportArtifact::ensure_version`].
pub fn read_artifact(path: &Path) -> Result<ExportArtifact, Error> {
    let bytes = std::fs::read(path)?;
    let artifact = if path.extension().map_or(false, |e| e == "gz") {
        let mut decoder = flate2::read::GzDecoder::new(&bytes[..]);
        let mut out = Vec::new();
        std::io::Read::read_to_end(&mut decoder, &mut out)?;
        serde_json::from_slice(&out)?
    } else {
        serde_json::from_slice(&bytes)?
    };
    Ok(artifact)
}
