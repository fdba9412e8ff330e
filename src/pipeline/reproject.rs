//! Reprojection to a metric CRS.
//!
//! Geographic pixels are not square: a degree of longitude shrinks with
//! latitude while a degree of latitude does not. Warping into a meter-based
//! CRS before downsampling is what makes the exported aspect ratio
//! physically correct.

use gdal::raster::processing::warp::resample::WarpResampleAlg;
use gdal::raster::processing::warp::{ReprojectOptions, WarpProcessing};
use gdal::spatial_ref::SpatialRef;
use gdal::Dataset as GdalDataset;
use std::path::Path;

use crate::raster::{self, NODATA};
use crate::Error;

/// Latitude beyond which Web Mercator distortion is no longer acceptable.
pub const POLAR_LATITUDE_CUTOFF: f64 = 66.0;

pub const EPSG_WEB_MERCATOR: u32 = 3857;
/// NSIDC polar stereographic north / Antarctic polar stereographic.
pub const EPSG_POLAR_NORTH: u32 = 3413;
pub const EPSG_POLAR_SOUTH: u32 = 3031;

/// Metric CRS for a raster centered at this latitude.
pub fn metric_crs_for(center_lat: f64) -> u32 {
    if center_lat > POLAR_LATITUDE_CUTOFF {
        EPSG_POLAR_NORTH
    } else if center_lat < -POLAR_LATITUDE_CUTOFF {
        EPSG_POLAR_SOUTH
    } else {
        EPSG_WEB_MERCATOR
    }
}

/// Bilinear keeps detail on light downscales; past 4x only an averaging
/// kernel samples every source cell. Nearest-neighbour is never an option
/// for continuous elevation data.
pub fn resampling_for_downscale(ratio: f64) -> WarpResampleAlg {
    if ratio <= 4.0 {
        WarpResampleAlg::Bilinear
    } else {
        WarpResampleAlg::Average
    }
}

/// Warp a geographic raster into the metric CRS chosen for its latitude.
/// Returns the EPSG code used. The warp writes NaN for no-data so that the
/// downstream box filter propagates gaps instead of averaging the sentinel
/// into real elevations.
pub fn reproject_to_metric(
    src_path: &Path,
    dst_path: &Path,
    downscale_ratio: f64,
) -> Result<u32, Error> {
    let info = raster::open_info(src_path)?;
    let extent = info.extent();
    let center_lat = (extent.ymin + extent.ymax) / 2.0;
    let epsg = metric_crs_for(center_lat);

    let src = GdalDataset::open(src_path)?;
    let dst_srs =
        SpatialRef::from_epsg(epsg).map_err(|e| Error::ReprojectionFailed(e.to_string()))?;

    let mut options = ReprojectOptions::new();
    options
        .with_output_format("GTiff")
        .with_src_nodata(info.nodata.unwrap_or(NODATA))
        .with_dst_nodata(f64::NAN);
    options
        .warp_options_mut()
        .with_resampling_alg(resampling_for_downscale(downscale_ratio));

    src.reproject(dst_path, &dst_srs, &options)
        .map_err(|e| Error::ReprojectionFailed(format!("warp to EPSG:{}: {}", epsg, e)))?;

    // The contract downstream is square metric pixels.
    let out = raster::open_info(dst_path)?;
    let (px, py) = out.pixel_size();
    if ((px - py) / px).abs() > 1e-3 {
        return Err(Error::ReprojectionFailed(format!(
            "non-square output pixels: {} x {}",
            px, py
        )));
    }
    log::info!(
        "reprojected {} -> EPSG:{} ({}x{})",
        src_path.display(),
        epsg,
        out.width,
        out.height
    );
    Ok(epsg)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bounds::GeoBounds;
    use crate::raster::test_support::write_test_raster;

    #[test]
    fn test_metric_crs_choice() {
        assert_eq!(metric_crs_for(0.0), EPSG_WEB_MERCATOR);
        assert_eq!(metric_crs_for(40.2), EPSG_WEB_MERCATOR);
        assert_eq!(metric_crs_for(-55.0), EPSG_WEB_MERCATOR);
        assert_eq!(metric_crs_for(66.0), EPSG_WEB_MERCATOR);
        assert_eq!(metric_crs_for(67.5), EPSG_POLAR_NORTH);
        assert_eq!(metric_crs_for(-72.0), EPSG_POLAR_SOUTH);
    }

    #[test]
    fn test_resampling_choice() {
        assert!(matches!(
            resampling_for_downscale(1.0),
            WarpResampleAlg::Bilinear
        ));
        assert!(matches!(
            resampling_for_downscale(4.0),
            WarpResampleAlg::Bilinear
        ));
        assert!(matches!(
            resampling_for_downscale(4.1),
            WarpResampleAlg::Average
        ));
    }

    #[test]
    fn test_warp_produces_square_metric_pixels() {
        let dir = tempfile::tempdir().unwrap();
        // A mid-latitude cell: geographic pixels are distinctly non-square
        // on the ground, the metric output must not be.
        let bounds = GeoBounds::new(6.0, 45.0, 7.0, 46.0).unwrap();
        let src = write_test_raster(dir.path(), "src.tif", &bounds, 120, 120, |c, r| {
            (c * r) as f32 * 0.01
        });
        let dst = dir.path().join("metric.tif");
        let epsg = reproject_to_metric(&src, &dst, 1.0).unwrap();
        assert_eq!(epsg, EPSG_WEB_MERCATOR);

        let info = raster::open_info(&dst).unwrap();
        let (px, py) = info.pixel_size();
        assert!(((px - py) / px).abs() < 1e-3);
        assert!(info.width > 0 && info.height > 0);
        // At 45.5N a Mercator raster is stretched: the height/width ratio
        // grows relative to the 1:1 degree box.
        assert!(info.height > info.width);
    }
}
