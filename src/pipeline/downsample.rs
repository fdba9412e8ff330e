//! Downsample a metric raster into the pixel budget.

use gdal::raster::{Buffer, ResampleAlg};
use gdal::{Dataset as GdalDataset, DriverManager};
use std::path::Path;

use crate::raster;
use crate::Error;

/// Output dimensions: as close to the budget as possible without exceeding
/// it, preserving the source aspect ratio to within 0.1%. Never upscales.
pub fn target_dimensions(
    src_width: usize,
    src_height: usize,
    target_total_pixels: u64,
) -> (usize, usize) {
    if (src_width * src_height) as u64 <= target_total_pixels {
        return (src_width, src_height);
    }
    let aspect = src_width as f64 / src_height as f64;
    let mut width = ((target_total_pixels as f64 * aspect).sqrt().floor() as usize).max(1);
    let mut height = ((width as f64 / aspect).round() as usize).max(1);
    while (width * height) as u64 > target_total_pixels && width > 1 {
        width -= 1;
        height = ((width as f64 / aspect).round() as usize).max(1);
    }
    (width, height)
}

/// Box-filter the raster down to `(width, height)` (GDAL's area-average
/// resampler). No-data must already be NaN so gaps propagate instead of
/// being averaged in.
pub fn downsample_to(
    src_path: &Path,
    dst_path: &Path,
    width: usize,
    height: usize,
) -> Result<(), Error> {
    let info = raster::open_info(src_path)?;
    let src = GdalDataset::open(src_path)?;
    let band = src.rasterband(1)?;
    let buf = band.read_as::<f32>(
        (0, 0),
        (info.width, info.height),
        (width, height),
        Some(ResampleAlg::Average),
    )?;
    let (_shape, data) = buf.into_shape_and_vec();

    let gt = info.geo_transform;
    let scaled_transform = [
        gt[0],
        gt[1] * info.width as f64 / width as f64,
        0.0,
        gt[3],
        0.0,
        gt[5] * info.height as f64 / height as f64,
    ];

    let driver = DriverManager::get_driver_by_name("GTiff")?;
    let mut dst = driver.create_with_band_type_with_options::<f32, _>(
        dst_path,
        width,
        height,
        1,
        &raster::compressed_gtiff_options(),
    )?;
    dst.set_geo_transform(&scaled_transform)?;
    dst.set_spatial_ref(&src.spatial_ref()?)?;
    let mut dst_band = dst.rasterband(1)?;
    dst_band.set_no_data_value(Some(f64::NAN))?;
    let mut out = Buffer::new((width, height), data);
    dst_band.write((0, 0), (width, height), &mut out)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bounds::GeoBounds;
    use crate::raster::test_support::write_test_raster;

    #[test]
    fn test_target_dimensions_fit_budget_and_aspect() {
        for (sw, sh) in [(8192, 4096), (5000, 9000), (2048, 2048), (7000, 1300)] {
            let (w, h) = target_dimensions(sw, sh, 4_194_304);
            assert!((w as u64) * (h as u64) <= 4_194_304, "{}x{}", w, h);
            let aspect = sw as f64 / sh as f64;
            let got = w as f64 / h as f64;
            assert!(
                ((got - aspect) / aspect).abs() < 1e-3,
                "aspect {} vs {} for {}x{}",
                got,
                aspect,
                w,
                h
            );
        }
    }

    #[test]
    fn test_target_dimensions_never_upscale() {
        assert_eq!(target_dimensions(1000, 500, 4_194_304), (1000, 500));
    }

    #[test]
    fn test_downsample_averages_blocks() {
        let dir = tempfile::tempdir().unwrap();
        let bounds = GeoBounds::new(0.0, 0.0, 1.0, 1.0).unwrap();
        // Checkerboard of 0/100 in 2x2 blocks: a 2x downsample averages
        // every block to 50.
        let src = write_test_raster(dir.path(), "src.tif", &bounds, 64, 64, |c, r| {
            if (c / 2 + r / 2) % 2 == 0 {
                0.0
            } else {
                100.0
            }
        });
        let dst = dir.path().join("small.tif");
        downsample_to(&src, &dst, 16, 16).unwrap();
        let (info, data) = raster::read_full_f32(&dst).unwrap();
        assert_eq!((info.width, info.height), (16, 16));
        for v in &data {
            assert!((v - 50.0).abs() < 1e-3, "{}", v);
        }
    }

    #[test]
    fn test_downsample_keeps_origin_and_extent() {
        let dir = tempfile::tempdir().unwrap();
        let bounds = GeoBounds::new(10.0, 40.0, 12.0, 41.0).unwrap();
        let src = write_test_raster(dir.path(), "src.tif", &bounds, 200, 100, |_, _| 7.0);
        let dst = dir.path().join("small.tif");
        downsample_to(&src, &dst, 50, 25).unwrap();
        let info = raster::open_info(&dst).unwrap();
        let extent = info.extent();
        assert!((extent.xmin - 10.0).abs() < 1e-9);
        assert!((extent.xmax - 12.0).abs() < 1e-9);
        assert!((extent.ymin - 40.0).abs() < 1e-9);
        assert!((extent.ymax - 41.0).abs() < 1e-9);
    }
}
