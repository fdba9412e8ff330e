//! Boundary clipping.
//!
//! Cells outside the admin polygon become no-data and the output extent is
//! cropped to the intersection of the input extent and the polygon's
//! envelope. The polygon is burned into an in-memory mask raster (GDAL
//! rasterize is the delegated black box); everything else is plain window
//! arithmetic.

use gdal::raster::{rasterize, Buffer};
use gdal::spatial_ref::SpatialRef;
use gdal::vector::Geometry;
use gdal::{Dataset as GdalDataset, DriverManager};
use std::path::Path;

use crate::raster;
use crate::Error;

pub fn clip_to_boundary(
    region_id: &str,
    src_path: &Path,
    polygon: &Geometry,
    out_path: &Path,
) -> Result<(), Error> {
    let info = raster::open_info(src_path)?;
    let extent = info.extent();
    let envelope = polygon.envelope();

    let xmin = extent.xmin.max(envelope.MinX);
    let xmax = extent.xmax.min(envelope.MaxX);
    let ymin = extent.ymin.max(envelope.MinY);
    let ymax = extent.ymax.min(envelope.MaxY);
    if xmin >= xmax || ymin >= ymax {
        return Err(Error::InsufficientCoverage {
            region: region_id.to_string(),
            ratio: 0.0,
            minimum: 0.0,
        });
    }

    // Crop window on the source pixel grid, expanded outwards to whole
    // pixels.
    let (px, py) = info.pixel_size();
    let col0 = ((xmin - extent.xmin) / px).floor().max(0.0) as usize;
    let row0 = ((extent.ymax - ymax) / py).floor().max(0.0) as usize;
    let cols = (((xmax - xmin) / px).ceil() as usize).min(info.width - col0);
    let rows = (((ymax - ymin) / py).ceil() as usize).min(info.height - row0);

    let src = GdalDataset::open(src_path)?;
    let band = src.rasterband(1)?;
    let buf = band.read_as::<f32>(
        (col0 as isize, row0 as isize),
        (cols, rows),
        (cols, rows),
        None,
    )?;
    let (_shape, mut data) = buf.into_shape_and_vec();

    // Burn the polygon into a mask raster aligned with the crop window.
    let ul_x = extent.xmin + col0 as f64 * px;
    let ul_y = extent.ymax - row0 as f64 * py;
    let cropped_transform = [ul_x, px, 0.0, ul_y, 0.0, -py];

    let mem = DriverManager::get_driver_by_name("MEM")?;
    let mut mask_ds = mem.create_with_band_type::<u8, _>("", cols, rows, 1)?;
    mask_ds.set_geo_transform(&cropped_transform)?;
    mask_ds.set_spatial_ref(&SpatialRef::from_epsg(4326)?)?;
    rasterize(&mut mask_ds, &[1], &[polygon.clone()], &[1.0], None)?;
    let mask = mask_ds
        .rasterband(1)?
        .read_as::<u8>((0, 0), (cols, rows), (cols, rows), None)?;
    let (_shape, mask_data) = mask.into_shape_and_vec();

    let nodata = info.nodata.unwrap_or(raster::NODATA) as f32;
    for (v, inside) in data.iter_mut().zip(mask_data.iter()) {
        if *inside == 0 {
            *v = nodata;
        }
    }

    let driver = DriverManager::get_driver_by_name("GTiff")?;
    let mut dst = driver.create_with_band_type_with_options::<f32, _>(
        out_path,
        cols,
        rows,
        1,
        &raster::compressed_gtiff_options(),
    )?;
    dst.set_geo_transform(&cropped_transform)?;
    dst.set_spatial_ref(&src.spatial_ref()?)?;
    let mut dst_band = dst.rasterband(1)?;
    dst_band.set_no_data_value(Some(f64::from(nodata)))?;
    let mut out = Buffer::new((cols, rows), data);
    dst_band.write((0, 0), (cols, rows), &mut out)?;
    Ok(())
}
