//! Source dataset descriptors.

use crate::bounds::GeoBounds;

/// An elevation source dataset: a fixed native resolution plus a coverage
/// band. Closed set; anything else is a configuration error upstream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Dataset {
    Usa3dep10m,
    Srtm30m,
    Srtm90m,
    Copernicus30m,
    Copernicus90m,
    Aw3d30m,
    Gmted250m,
    Gmted500m,
    Gmted1000m,
}

/// SRTM was flown on the Shuttle and only covers (-56, +60) latitude.
const SRTM_LAT_BAND: (f64, f64) = (-56.0, 60.0);
const GLOBAL_LAT_BAND: (f64, f64) = (-90.0, 90.0);

impl Dataset {
    pub const ALL: [Dataset; 9] = [
        Dataset::Usa3dep10m,
        Dataset::Srtm30m,
        Dataset::Srtm90m,
        Dataset::Copernicus30m,
        Dataset::Copernicus90m,
        Dataset::Aw3d30m,
        Dataset::Gmted250m,
        Dataset::Gmted500m,
        Dataset::Gmted1000m,
    ];

    /// Native ground resolution in meters per pixel at the equator.
    pub const fn resolution_m(self) -> u32 {
        match self {
            Dataset::Usa3dep10m => 10,
            Dataset::Srtm30m | Dataset::Copernicus30m | Dataset::Aw3d30m => 30,
            Dataset::Srtm90m | Dataset::Copernicus90m => 90,
            Dataset::Gmted250m => 250,
            Dataset::Gmted500m => 500,
            Dataset::Gmted1000m => 1000,
        }
    }

    /// Samples per degree on the native grid (1/3", 1", 3", 7.5", 15", 30").
    pub const fn pixels_per_degree(self) -> usize {
        match self {
            Dataset::Usa3dep10m => 10_800,
            Dataset::Srtm30m | Dataset::Copernicus30m | Dataset::Aw3d30m => 3_600,
            Dataset::Srtm90m | Dataset::Copernicus90m => 1_200,
            Dataset::Gmted250m => 480,
            Dataset::Gmted500m => 240,
            Dataset::Gmted1000m => 120,
        }
    }

    pub fn latitude_band(self) -> (f64, f64) {
        match self {
            Dataset::Srtm30m | Dataset::Srtm90m => SRTM_LAT_BAND,
            Dataset::Usa3dep10m
            | Dataset::Copernicus30m
            | Dataset::Copernicus90m
            | Dataset::Aw3d30m
            | Dataset::Gmted250m
            | Dataset::Gmted500m
            | Dataset::Gmted1000m => GLOBAL_LAT_BAND,
        }
    }

    /// 3DEP only exists for the United States.
    pub const fn usa_only(self) -> bool {
        matches!(self, Dataset::Usa3dep10m)
    }

    pub const fn is_gmted(self) -> bool {
        matches!(
            self,
            Dataset::Gmted250m | Dataset::Gmted500m | Dataset::Gmted1000m
        )
    }

    /// True if the dataset's latitude band fully contains the bounds. Partial
    /// coverage is not good enough: the downloader would come back with holes.
    pub fn covers(self, bounds: &GeoBounds) -> bool {
        let (lo, hi) = self.latitude_band();
        bounds.south >= lo && bounds.north <= hi
    }

    /// Stable identifier as embedded in artifacts and the manifest.
    pub const fn id(self) -> &'static str {
        match self {
            Dataset::Usa3dep10m => "USA_3DEP_10m",
            Dataset::Srtm30m => "SRTM_30m",
            Dataset::Srtm90m => "SRTM_90m",
            Dataset::Copernicus30m => "Copernicus_30m",
            Dataset::Copernicus90m => "Copernicus_90m",
            Dataset::Aw3d30m => "AW3D30_30m",
            Dataset::Gmted250m => "GMTED_250m",
            Dataset::Gmted500m => "GMTED_500m",
            Dataset::Gmted1000m => "GMTED_1000m",
        }
    }

    pub fn from_id(id: &str) -> Option<Dataset> {
        Dataset::ALL.iter().copied().find(|d| d.id() == id)
    }

    /// Directory key under which tiles/merges of this dataset are stored.
    pub const fn dir_key(self) -> &'static str {
        match self {
            Dataset::Usa3dep10m => "usa_3dep_10m",
            Dataset::Srtm30m => "srtm_30m",
            Dataset::Srtm90m => "srtm_90m",
            Dataset::Copernicus30m => "copernicus_30m",
            Dataset::Copernicus90m => "copernicus_90m",
            Dataset::Aw3d30m => "aw3d30_30m",
            Dataset::Gmted250m => "gmted_250m",
            Dataset::Gmted500m => "gmted_500m",
            Dataset::Gmted1000m => "gmted_1000m",
        }
    }
}

impl std::fmt::Display for Dataset {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.id())
    }
}
