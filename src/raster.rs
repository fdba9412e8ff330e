//! GDAL-backed raster helpers shared by the downloader and the pipeline.
//!
//! GDAL is the delegated geospatial library here: dataset I/O, warping and
//! rasterization are used as black boxes and this module is the only place
//! that talks to them for plain raster access.

use gdal::raster::{Buffer, RasterCreationOptions, ResampleAlg};
use gdal::spatial_ref::SpatialRef;
use gdal::{Dataset as GdalDataset, DriverManager};
use std::path::Path;

use crate::bounds::GeoBounds;
use crate::datasets::Dataset;
use crate::tile_grid::TileId;
use crate::Error;

/// Internal no-data sentinel for every raster this crate writes. (The JSON
/// export translates it to `null`; it never leaves the GeoTIFF stages.)
pub const NODATA: f64 = -32768.0;

/// Plausible elevation range in meters; anything outside is corrupt data.
pub const MIN_VALID_ELEVATION: f64 = -500.0;
pub const MAX_VALID_ELEVATION: f64 = 9000.0;

/// Creation options for every GeoTIFF this crate writes.
pub fn compressed_gtiff_options() -> RasterCreationOptions {
    RasterCreationOptions::from_iter(["COMPRESS=DEFLATE", "TILED=YES", "BIGTIFF=IF_SAFER"])
}

/// Raster extent in the raster's own CRS units (degrees or meters).
#[derive(Debug, Clone, Copy)]
pub struct RasterExtent {
    pub xmin: f64,
    pub ymin: f64,
    pub xmax: f64,
    pub ymax: f64,
}

#[derive(Debug, Clone)]
pub struct RasterInfo {
    pub width: usize,
    pub height: usize,
    pub geo_transform: [f64; 6],
    pub nodata: Option<f64>,
}

impl RasterInfo {
    pub fn extent(&self) -> RasterExtent {
        let gt = &self.geo_transform;
        RasterExtent {
            xmin: gt[0],
            ymin: gt[3] + gt[5] * self.height as f64,
            xmax: gt[0] + gt[1] * self.width as f64,
            ymax: gt[3],
        }
    }

    /// Pixel size as (x, y), both positive.
    pub fn pixel_size(&self) -> (f64, f64) {
        (self.geo_transform[1].abs(), self.geo_transform[5].abs())
    }
}

pub fn open_info(path: &Path) -> Result<RasterInfo, Error> {
    let ds = GdalDataset::open(path)?;
    let (width, height) = ds.raster_size();
    let band = ds.rasterband(1)?;
    Ok(RasterInfo {
        width,
        height,
        geo_transform: ds.geo_transform()?,
        nodata: band.no_data_value(),
    })
}

/// Read an entire single-band raster as f32, in row-major order with row 0
/// at the top (north for our rasters).
pub fn read_full_f32(path: &Path) -> Result<(RasterInfo, Vec<f32>), Error> {
    let info = open_info(path)?;
    let ds = GdalDataset::open(path)?;
    let band = ds.rasterband(1)?;
    let buf = band.read_as::<f32>(
        (0, 0),
        (info.width, info.height),
        (info.width, info.height),
        None,
    )?;
    let (_shape, data) = buf.into_shape_and_vec();
    Ok((info, data))
}

/// Fraction of cells holding a finite, non-sentinel value. Large rasters are
/// probed on a decimated grid (plain subsampling keeps real cell values,
/// which is all a counting estimate needs).
pub fn finite_coverage_ratio(path: &Path) -> Result<f64, Error> {
    let info = open_info(path)?;
    let ds = GdalDataset::open(path)?;
    let band = ds.rasterband(1)?;

    let long_axis = info.width.max(info.height);
    let scale = (long_axis as f64 / 2048.0).max(1.0);
    let probe_w = ((info.width as f64 / scale) as usize).max(1);
    let probe_h = ((info.height as f64 / scale) as usize).max(1);
    let buf = band.read_as::<f32>(
        (0, 0),
        (info.width, info.height),
        (probe_w, probe_h),
        Some(ResampleAlg::NearestNeighbour),
    )?;
    let (_shape, data) = buf.into_shape_and_vec();

    let nodata = info.nodata.unwrap_or(NODATA) as f32;
    let finite = data
        .iter()
        .filter(|v| v.is_finite() && **v != nodata)
        .count();
    Ok(finite as f64 / data.len() as f64)
}

/// Validate a candidate tile file against the cell it claims to be.
pub fn validate_tile(
    path: &Path,
    tile: TileId,
    dataset: Dataset,
    allow_empty: bool,
) -> Result<(), Error> {
    let info = open_info(path)
        .map_err(|e| Error::ValidationFailed(format!("{}: unreadable: {}", tile, e)))?;
    if info.width == 0 || info.height == 0 {
        return Err(Error::ValidationFailed(format!(
            "{}: empty raster ({}x{})",
            tile, info.width, info.height
        )));
    }

    // Providers deliver the cell with up to a pixel of edge overhang
    // (SRTM-style grids share their border row/column with the neighbor).
    let eps = 2.0 / dataset.pixels_per_degree() as f64;
    let cell = tile.bounds();
    let extent = info.extent();
    let misaligned = (extent.xmin - cell.west).abs() > eps
        || (extent.ymin - cell.south).abs() > eps
        || (extent.xmax - cell.east).abs() > eps
        || (extent.ymax - cell.north).abs() > eps;
    if misaligned {
        return Err(Error::ValidationFailed(format!(
            "{}: extent [{:.4}, {:.4}, {:.4}, {:.4}] does not match the 1 degree cell",
            tile, extent.xmin, extent.ymin, extent.xmax, extent.ymax
        )));
    }

    // Probe on a decimated grid rather than GDAL statistics: plain
    // subsampling keeps real cell values and leaves no .aux.xml sidecars in
    // the shared pool.
    let ds = GdalDataset::open(path)?;
    let band = ds.rasterband(1)?;
    let probe_w = info.width.min(1024);
    let probe_h = info.height.min(1024);
    let buf = band.read_as::<f32>(
        (0, 0),
        (info.width, info.height),
        (probe_w, probe_h),
        Some(ResampleAlg::NearestNeighbour),
    )?;
    let (_shape, data) = buf.into_shape_and_vec();

    let nodata = info.nodata.unwrap_or(NODATA) as f32;
    let mut min = f64::INFINITY;
    let mut max = f64::NEG_INFINITY;
    let mut finite = 0u64;
    for v in &data {
        if v.is_finite() && *v != nodata {
            min = min.min(f64::from(*v));
            max = max.max(f64::from(*v));
            finite += 1;
        }
    }

    if finite == 0 {
        if allow_empty {
            return Ok(());
        }
        return Err(Error::ValidationFailed(format!(
            "{}: tile contains no valid pixels",
            tile
        )));
    }
    if min < MIN_VALID_ELEVATION || max > MAX_VALID_ELEVATION {
        return Err(Error::ValidationFailed(format!(
            "{}: elevations [{:.0}, {:.0}] outside plausible range",
            tile, min, max
        )));
    }
    Ok(())
}

/// Merge validated tiles into one raster covering `aligned`. Tiles must come
/// in the deterministic enumeration order (north-to-south, west-to-east);
/// each is resampled onto the dataset's nominal per-degree grid, so the
/// one-pixel edge overhang between neighbors resolves by later tiles
/// overwriting earlier ones.
pub fn merge_tiles(
    tiles: &[(TileId, std::path::PathBuf)],
    dataset: Dataset,
    aligned: &GeoBounds,
    out_path: &Path,
) -> Result<(), Error> {
    let ppd = dataset.pixels_per_degree();
    let cols = aligned.width_degrees().round() as usize * ppd;
    let rows = aligned.height_degrees().round() as usize * ppd;
    let degree_per_px = 1.0 / ppd as f64;

    let driver = DriverManager::get_driver_by_name("GTiff")?;
    let options = compressed_gtiff_options();
    let mut dst =
        driver.create_with_band_type_with_options::<f32, _>(out_path, cols, rows, 1, &options)?;
    dst.set_geo_transform(&[
        aligned.west,
        degree_per_px,
        0.0,
        aligned.north,
        0.0,
        -degree_per_px,
    ])?;
    dst.set_spatial_ref(&SpatialRef::from_epsg(4326)?)?;
    let mut band = dst.rasterband(1)?;
    band.set_no_data_value(Some(NODATA))?;
    band.fill(NODATA, None)?;

    for (tile, path) in tiles {
        let src = GdalDataset::open(path)?;
        let sband = src.rasterband(1)?;
        let (sw, sh) = sband.size();
        let buf = sband.read_as::<f32>((0, 0), (sw, sh), (ppd, ppd), Some(ResampleAlg::Bilinear))?;
        let (_shape, mut data) = buf.into_shape_and_vec();

        // Normalize whatever sentinel the source uses onto ours.
        if let Some(nd) = sband.no_data_value() {
            let nd = nd as f32;
            for v in data.iter_mut() {
                if *v == nd || !v.is_finite() {
                    *v = NODATA as f32;
                }
            }
        } else {
            for v in data.iter_mut() {
                if !v.is_finite() {
                    *v = NODATA as f32;
                }
            }
        }

        let col_off = (f64::from(tile.lon) - aligned.west).round() as isize * ppd as isize;
        let row_off = (aligned.north - f64::from(tile.lat + 1)).round() as isize * ppd as isize;
        let mut out = Buffer::new((ppd, ppd), data);
        band.write((col_off, row_off), (ppd, ppd), &mut out)?;
    }
    Ok(())
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use std::path::PathBuf;

    /// Write a small single-band f32 GeoTIFF covering `bounds` with a value
    /// function of (col, row). Returns the path.
    pub fn write_test_raster<F>(
        dir: &Path,
        name: &str,
        bounds: &GeoBounds,
        width: usize,
        height: usize,
        value: F,
    ) -> PathBuf
    where
        F: Fn(usize, usize) -> f32,
    {
        let path = dir.join(name);
        let driver = DriverManager::get_driver_by_name("GTiff").unwrap();
        let mut ds = driver
            .create_with_band_type::<f32, _>(&path, width, height, 1)
            .unwrap();
        ds.set_geo_transform(&[
            bounds.west,
            bounds.width_degrees() / width as f64,
            0.0,
            bounds.north,
            0.0,
            -bounds.height_degrees() / height as f64,
        ])
        .unwrap();
        ds.set_spatial_ref(&SpatialRef::from_epsg(4326).unwrap())
            .unwrap();
        let mut band = ds.rasterband(1).unwrap();
        band.set_no_data_value(Some(NODATA)).unwrap();
        let mut data = vec![0f32; width * height];
        for row in 0..height {
            for col in 0..width {
                data[row * width + col] = value(col, row);
            }
        }
        let mut buf = Buffer::new((width, height), data);
        band.write((0, 0), (width, height), &mut buf).unwrap();
        drop(band);
        path
    }
}
