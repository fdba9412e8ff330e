//! Administrative boundary polygons.
//!
//! Backed by the Natural Earth cultural vectors (admin-0 countries, admin-1
//! states/provinces). The full layer is fetched once per resolution grade and
//! cached; individual polygons are then extracted and cached again under a
//! content-addressed key of (country, subdivision, resolution), so repeat
//! runs never touch the network.

use gdal::spatial_ref::SpatialRef;
use gdal::vector::{Feature, Geometry, LayerAccess};
use gdal::Dataset as GdalDataset;
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};

use crate::config::{ensure_dir, BoundaryResolution};
use crate::hex::bytes_to_hex_string;
use crate::Error;

const NATURAL_EARTH_BASE: &str =
    "https://raw.githubusercontent.com/nvkelso/natural-earth-vector/master/geojson";

pub struct BoundarySource {
    cache_dir: PathBuf,
    resolution: BoundaryResolution,
    client: reqwest::Client,
}

impl BoundarySource {
    pub fn new(cache_dir: PathBuf, resolution: BoundaryResolution) -> Result<BoundarySource, Error> {
        ensure_dir(&cache_dir)?;
        let client = reqwest::Client::builder().build()?;
        Ok(BoundarySource {
            cache_dir,
            resolution,
            client,
        })
    }

    /// Admin-0 (country) or admin-1 (state/province) polygon in WGS84.
    pub async fn admin_polygon(
        &self,
        country: &str,
        subdivision: Option<&str>,
    ) -> Result<Geometry, Error> {
        let key = cache_key(country, subdivision, self.resolution);
        let cached = self.cache_dir.join(format!("{}.wkt", key));
        if cached.exists() {
            return load_cached_polygon(&cached);
        }

        let layer_path = self.ensure_layer(subdivision.is_some()).await?;
        let geometry = extract_feature(&layer_path, country, subdivision)?;

        let wkt = geometry.wkt()?;
        let staging = cached.with_extension("wkt.part");
        std::fs::write(&staging, wkt.as_bytes())
            .and_then(|_| std::fs::rename(&staging, &cached))
            .map_err(|e| Error::Storage(format!("cannot cache polygon {}: {}", key, e)))?;
        Ok(geometry)
    }

    /// Download the full Natural Earth layer once and keep it next to the
    /// polygon cache.
    async fn ensure_layer(&self, admin1: bool) -> Result<PathBuf, Error> {
        let layer_name = if admin1 {
            format!("ne_{}_admin_1_states_provinces", self.resolution.as_str())
        } else {
            format!("ne_{}_admin_0_countries", self.resolution.as_str())
        };
        let path = self.cache_dir.join(format!("{}.geojson", layer_name));
        if path.exists() {
            return Ok(path);
        }

        let url = format!("{}/{}.geojson", NATURAL_EARTH_BASE, layer_name);
        log::info!("fetching boundary layer {}", url);
        let resp = self.client.get(&url).send().await?;
        if resp.status().as_u16() != 200 {
            return Err(Error::BoundaryNotFound(format!(
                "layer download failed with status {}: {}",
                resp.status().as_u16(),
                url
            )));
        }
        let body = resp.bytes().await?;
        let staging = path.with_extension("geojson.part");
        std::fs::write(&staging, &body)
            .and_then(|_| std::fs::rename(&staging, &path))
            .map_err(|e| Error::Storage(format!("cannot store {}: {}", path.display(), e)))?;
        Ok(path)
    }
}

fn cache_key(country: &str, subdivision: Option<&str>, resolution: BoundaryResolution) -> String {
    let mut hasher = Sha256::new();
    hasher.update(country.as_bytes());
    hasher.update(b"|");
    hasher.update(subdivision.unwrap_or("").as_bytes());
    hasher.update(b"|");
    hasher.update(resolution.as_str().as_bytes());
    let digest = hasher.finalize();
    bytes_to_hex_string(&digest)[..16].to_string()
}

fn load_cached_polygon(path: &Path) -> Result<Geometry, Error> {
    let wkt = std::fs::read_to_string(path)
        .map_err(|e| Error::Storage(format!("cannot read {}: {}", path.display(), e)))?;
    let mut geometry = Geometry::from_wkt(&wkt)?;
    geometry.set_spatial_ref(SpatialRef::from_epsg(4326)?);
    Ok(geometry)
}

/// Scan the layer for the matching feature. Natural Earth spells its
/// attribute names differently between admin-0 (upper case) and admin-1
/// (lower case), so both are probed.
fn extract_feature(
    layer_path: &Path,
    country: &str,
    subdivision: Option<&str>,
) -> Result<Geometry, Error> {
    let ds = GdalDataset::open(layer_path)?;
    let mut layer = ds.layer(0)?;
    for feature in layer.features() {
        let matched = match subdivision {
            Some(sub) => {
                field_matches(&feature, &["admin", "ADMIN"], country)
                    && field_matches(&feature, &["name", "NAME"], sub)
            }
            None => field_matches(&feature, &["ADMIN", "admin"], country),
        };
        if matched {
            let geometry = feature.geometry().ok_or_else(|| {
                Error::BoundaryNotFound(format!("feature for {:?} has no geometry", country))
            })?;
            let mut geometry = geometry.clone();
            geometry.set_spatial_ref(SpatialRef::from_epsg(4326)?);
            return Ok(geometry);
        }
    }
    Err(Error::BoundaryNotFound(match subdivision {
        Some(sub) => format!("{} / {}", country, sub),
        None => country.to_string(),
    }))
}

fn field_matches(feature: &Feature, names: &[&str], want: &str) -> bool {
    for name in names {
        if let Ok(idx) = feature.field_index(name) {
            if let Ok(Some(value)) = feature.field_as_string(idx) {
                return value == want;
            }
        }
    }
    false
}
