//! Pure 1°×1° tile grid math. No I/O, no global state.

use crate::bounds::GeoBounds;
use crate::Error;

/// Meters spanned by one degree of latitude (and one degree of longitude at
/// the equator), derived from the WGS84 equatorial circumference.
pub const METERS_PER_DEGREE: f64 = 111_319.49;

/// A 1°×1° cell identified by the integer coordinates of its southwest
/// corner.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TileId {
    pub lat: i32,
    pub lon: i32,
}

impl TileId {
    pub fn new(lat: i32, lon: i32) -> Result<TileId, Error> {
        if !(-90..=89).contains(&lat) || !(-180..=179).contains(&lon) {
            return Err(Error::InvalidRegion(format!(
                "tile southwest corner out of range: lat={} lon={}",
                lat, lon
            )));
        }
        Ok(TileId { lat, lon })
    }

    /// The canonical on-disk name of this tile at the given resolution, e.g.
    /// `N39_W084_30m.tif`.
    pub fn filename(&self, resolution_m: u32) -> String {
        let ns = if self.lat >= 0 { 'N' } else { 'S' };
        let ew = if self.lon >= 0 { 'E' } else { 'W' };
        format!(
            "{}{:02}_{}{:03}_{}m.tif",
            ns,
            self.lat.abs(),
            ew,
            self.lon.abs(),
            resolution_m
        )
    }

    /// The geographic cell this tile covers.
    pub fn bounds(&self) -> GeoBounds {
        GeoBounds {
            west: f64::from(self.lon),
            south: f64::from(self.lat),
            east: f64::from(self.lon) + 1.0,
            north: f64::from(self.lat) + 1.0,
        }
    }
}

impl std::fmt::Display for TileId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let ns = if self.lat >= 0 { 'N' } else { 'S' };
        let ew = if self.lon >= 0 { 'E' } else { 'W' };
        write!(f, "{}{:02}{}{:03}", ns, self.lat.abs(), ew, self.lon.abs())
    }
}

/// Parse a canonical tile filename back to its cell and resolution. Exact
/// inverse of [`TileId::filename`].
pub fn parse_tile_filename(name: &str) -> Option<(TileId, u32)> {
    let stem = name.strip_suffix(".tif")?;
    let mut parts = stem.split('_');
    let lat_part = parts.next()?;
    let lon_part = parts.next()?;
    let res_part = parts.next()?;
    if parts.next().is_some() {
        return None;
    }

    let lat_sign = match lat_part.chars().next()? {
        'N' => 1,
        'S' => -1,
        _ => return None,
    };
    let lat: i32 = lat_part[1..].parse().ok()?;
    let lon_sign = match lon_part.chars().next()? {
        'E' => 1,
        'W' => -1,
        _ => return None,
    };
    let lon: i32 = lon_part[1..].parse().ok()?;
    let resolution_m: u32 = res_part.strip_suffix('m')?.parse().ok()?;

    TileId::new(lat_sign * lat, lon_sign * lon)
        .ok()
        .map(|t| (t, resolution_m))
}

/// Expand bounds outwards to the enclosing integer-degree grid. The result is
/// a strict superset of the input; bounds already exactly on an integer degree
/// stay put (floor/ceil semantics, so a boundary coordinate belongs to the
/// southern/western tile).
pub fn snap_to_degree_grid(bounds: &GeoBounds) -> GeoBounds {
    GeoBounds {
        west: bounds.west.floor(),
        south: bounds.south.floor(),
        east: bounds.east.ceil(),
        north: bounds.north.ceil(),
    }
}

/// Enumerate the 1° cells covering grid-aligned bounds, row-major: north to
/// south, then west to east. The order is deterministic; the merge step
/// depends on it.
pub fn tiles_covering(aligned: &GeoBounds) -> Vec<TileId> {
    let south = aligned.south as i32;
    let north = aligned.north as i32;
    let west = aligned.west as i32;
    let east = aligned.east as i32;

    let mut tiles = Vec::with_capacity(((north - south) * (east - west)).max(0) as usize);
    for lat in (south..north).rev() {
        for lon in west..east {
            tiles.push(TileId { lat, lon });
        }
    }
    tiles
}

/// Ground size of one output pixel if `bounds` were rendered into a square
/// pixel budget of `target_total_pixels`.
#[derive(Debug, Clone, Copy)]
pub struct VisiblePixelSize {
    pub width_mpp: f64,
    pub height_mpp: f64,
    /// Geometric mean of the two axes.
    pub avg_mpp: f64,
}

/// Equirectangular approximation: the horizontal span is measured at the
/// region's mid-latitude (one degree of longitude shrinks with cos(lat), so
/// widths poleward of the center come out slightly large and widths toward
/// the equator slightly small). Good to a few percent for region-scale boxes,
/// which is all the planner needs.
pub fn visible_pixel_size_meters(bounds: &GeoBounds, target_total_pixels: u64) -> VisiblePixelSize {
    let mid_lat = bounds.center_lat().to_radians();
    let horizontal_m = bounds.width_degrees() * METERS_PER_DEGREE * mid_lat.cos();
    let vertical_m = bounds.height_degrees() * METERS_PER_DEGREE;
    let base_dim = (target_total_pixels as f64).sqrt();

    let width_mpp = horizontal_m / base_dim;
    let height_mpp = vertical_m / base_dim;
    VisiblePixelSize {
        width_mpp,
        height_mpp,
        avg_mpp: (width_mpp * height_mpp).sqrt(),
    }
}

/// Rough single-band f32 GeoTIFF size of a 1° tile at the given resolution.
/// Scales with cos(lat) (tiles narrow toward the poles) and quadratically with
/// 1/resolution. Only used for user-facing download estimates.
pub fn estimate_tile_bytes(lat: i32, resolution_m: u32) -> u64 {
    let px_per_degree = METERS_PER_DEGREE / f64::from(resolution_m);
    let cells = px_per_degree * px_per_degree * f64::from(lat).to_radians().cos().max(0.01);
    // 4 bytes per f32 sample plus a nominal header allowance.
    (cells * 4.0) as u64 + 4096
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_snap_is_superset() {
        let bounds = GeoBounds::new(-84.82, 38.40, -80.52, 41.98).unwrap();
        let aligned = snap_to_degree_grid(&bounds);
        assert_eq!(aligned.west, -85.0);
        assert_eq!(aligned.south, 38.0);
        assert_eq!(aligned.east, -80.0);
        assert_eq!(aligned.north, 42.0);
        assert!(aligned.contains(&bounds));
    }

    #[test]
    fn test_snap_integer_bounds_stay_put() {
        let bounds = GeoBounds::new(6.0, 45.0, 8.0, 47.0).unwrap();
        let aligned = snap_to_degree_grid(&bounds);
        assert_eq!(aligned, bounds);
    }

    #[test]
    fn test_tiles_covering_ohio_is_5x4_grid() {
        // Ohio snaps to [-85, 38, -80, 42]: 5 columns by 4 rows.
        let bounds = GeoBounds::new(-84.82, 38.40, -80.52, 41.98).unwrap();
        let tiles = tiles_covering(&snap_to_degree_grid(&bounds));
        assert_eq!(tiles.len(), 20);
        // Row-major, north to south, west to east.
        assert_eq!(tiles[0], TileId { lat: 41, lon: -85 });
        assert_eq!(tiles[1], TileId { lat: 41, lon: -84 });
        assert_eq!(tiles[5], TileId { lat: 40, lon: -85 });
        assert_eq!(tiles[19], TileId { lat: 38, lon: -81 });
    }

    #[test]
    fn test_tiles_covering_matches_floor_ceil_rule() {
        let bounds = GeoBounds::new(-74.0, -34.0, -34.0, 5.0).unwrap();
        let tiles = tiles_covering(&snap_to_degree_grid(&bounds));
        // Brazil: 40 columns x 39 rows.
        assert_eq!(tiles.len(), 40 * 39);
        for t in &tiles {
            assert!((-34..5).contains(&t.lat));
            assert!((-74..-34).contains(&t.lon));
        }
    }

    #[test]
    fn test_tile_filename_format() {
        assert_eq!(TileId { lat: 39, lon: -84 }.filename(30), "N39_W084_30m.tif");
        assert_eq!(TileId { lat: -34, lon: -58 }.filename(90), "S34_W058_90m.tif");
        assert_eq!(TileId { lat: 0, lon: 0 }.filename(10), "N00_E000_10m.tif");
        assert_eq!(
            TileId { lat: -1, lon: 179 }.filename(1000),
            "S01_E179_1000m.tif"
        );
    }

    #[test]
    fn test_tile_filename_round_trip_exhaustive() {
        for lat in -90..=89 {
            for lon in (-180..=179).step_by(7) {
                for res in [10u32, 30, 90] {
                    let tile = TileId { lat, lon };
                    let parsed = parse_tile_filename(&tile.filename(res));
                    assert_eq!(parsed, Some((tile, res)));
                }
            }
        }
    }

    #[test]
    fn test_parse_rejects_noise() {
        assert_eq!(parse_tile_filename("N39_W084_30m.png"), None);
        assert_eq!(parse_tile_filename("X39_W084_30m.tif"), None);
        assert_eq!(parse_tile_filename("N39_W084.tif"), None);
        assert_eq!(parse_tile_filename("N91_W084_30m.tif"), None);
        assert_eq!(parse_tile_filename("N39_W084_30m_extra.tif"), None);
    }

    #[test]
    fn test_visible_pixel_size_ohio() {
        let bounds = GeoBounds::new(-84.82, 38.40, -80.52, 41.98).unwrap();
        let vps = visible_pixel_size_meters(&bounds, 4_194_304);
        assert!(vps.width_mpp > 0.0 && vps.width_mpp.is_finite());
        assert!(vps.height_mpp > 0.0 && vps.height_mpp.is_finite());
        // ~4.3 deg of longitude at ~40N over 2048 px.
        assert!((170.0..190.0).contains(&vps.width_mpp), "{:?}", vps);
        assert!((185.0..200.0).contains(&vps.height_mpp), "{:?}", vps);
        let geom_mean = (vps.width_mpp * vps.height_mpp).sqrt();
        assert_relative_eq!(vps.avg_mpp, geom_mean, epsilon = 1e-9);
    }

    #[test]
    fn test_estimate_tile_bytes_shrinks_toward_poles() {
        assert!(estimate_tile_bytes(0, 30) > estimate_tile_bytes(60, 30));
        assert!(estimate_tile_bytes(60, 30) > estimate_tile_bytes(85, 30));
        // Quadratic in 1/resolution: 30m tile is ~9x a 90m tile.
        let fine = estimate_tile_bytes(45, 30) as f64;
        let coarse = estimate_tile_bytes(45, 90) as f64;
        assert!((fine / coarse) > 7.0 && (fine / coarse) < 11.0);
    }
}
