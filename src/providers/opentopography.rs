use bytes::Bytes;
use percent_encoding::{utf8_percent_encode, NON_ALPHANUMERIC};
use reqwest::Client;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use super::ProviderError;
use crate::datasets::Dataset;
use crate::tile_grid::TileId;

const API_URL: &str = "https://portal.opentopography.org/API/globaldem";

#[derive(Debug, Default)]
struct Stats {
    requests_count: AtomicUsize,
}

/// The OpenTopography global DEM API. Metered, keyed, but it serves every
/// dataset we know about, including ocean cells (as valid all-zero rasters),
/// which makes it the fallback of last resort behind the free mirrors.
pub struct OpenTopographyProvider {
    client: Client,
    api_key: String,
    stats: Stats,
}

impl OpenTopographyProvider {
    pub const ID: &'static str = "opentopography";

    pub fn new(api_key: &str) -> Result<OpenTopographyProvider, reqwest::Error> {
        let client = Client::builder().build()?;
        Ok(OpenTopographyProvider {
            client,
            api_key: api_key.to_string(),
            stats: Default::default(),
        })
    }

    pub fn serves(&self, _dataset: Dataset) -> bool {
        // Every dataset in the catalogue maps to a demtype below.
        true
    }

    fn demtype(dataset: Dataset) -> &'static str {
        match dataset {
            Dataset::Usa3dep10m => "USGS10m",
            Dataset::Srtm30m => "SRTMGL1",
            Dataset::Srtm90m => "SRTMGL3",
            Dataset::Copernicus30m => "COP30",
            Dataset::Copernicus90m => "COP90",
            Dataset::Aw3d30m => "AW3D30",
            Dataset::Gmted250m | Dataset::Gmted500m | Dataset::Gmted1000m => "GMTED2010",
        }
    }

    pub async fn fetch_tile(
        &self,
        tile: TileId,
        dataset: Dataset,
    ) -> Result<Bytes, ProviderError> {
        let bounds = tile.bounds();
        let url = format!(
            "{}?demtype={}&south={}&north={}&west={}&east={}&outputFormat=GTiff&API_Key={}",
            API_URL,
            Self::demtype(dataset),
            bounds.south,
            bounds.north,
            bounds.west,
            bounds.east,
            utf8_percent_encode(&self.api_key, NON_ALPHANUMERIC),
        );
        self.stats.requests_count.fetch_add(1, Ordering::Relaxed);

        let resp = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| ProviderError::Transient(format!("request failed: {}", e)))?;

        match resp.status().as_u16() {
            200 => resp
                .bytes()
                .await
                .map_err(|e| ProviderError::Transient(format!("body read failed: {}", e))),
            // OpenTopography signals an exhausted or rejected key with
            // 401/403 and quota pressure with 429; all of them mean "leave
            // this provider alone for a while".
            401 | 403 | 429 => Err(ProviderError::RateLimited {
                retry_after: parse_retry_after(&resp),
            }),
            204 | 404 => Err(ProviderError::NotAvailable),
            code @ 500..=599 => Err(ProviderError::Transient(format!("server error {}", code))),
            code => Err(ProviderError::Permanent(format!(
                "unexpected status {}",
                code
            ))),
        }
    }

    pub fn get_stats(&self) -> String {
        format!(
            "requests_count={}",
            self.stats.requests_count.load(Ordering::Relaxed)
        )
    }
}

pub(super) fn parse_retry_after(resp: &reqwest::Response) -> Option<Duration> {
    resp.headers()
        .get(reqwest::header::RETRY_AFTER)?
        .to_str()
        .ok()?
        .parse::<u64>()
        .ok()
        .map(Duration::from_secs)
}
