use bytes::Bytes;
use reqwest::Client;
use std::sync::atomic::{AtomicUsize, Ordering};

use super::ProviderError;
use crate::datasets::Dataset;
use crate::tile_grid::TileId;

#[derive(Debug, Default)]
struct Stats {
    requests_count: AtomicUsize,
}

/// Copernicus GLO-30/GLO-90 from the public AWS Open Data buckets. No
/// credentials, no metering, but strictly land tiles: the buckets simply do
/// not contain ocean cells, so a missing object is NotAvailable rather than
/// an error.
pub struct CopernicusAwsProvider {
    client: Client,
    stats: Stats,
}

impl CopernicusAwsProvider {
    pub const ID: &'static str = "copernicus-aws";

    pub fn new() -> Result<CopernicusAwsProvider, reqwest::Error> {
        let client = Client::builder().build()?;
        Ok(CopernicusAwsProvider {
            client,
            stats: Default::default(),
        })
    }

    pub fn serves(&self, dataset: Dataset) -> bool {
        matches!(dataset, Dataset::Copernicus30m | Dataset::Copernicus90m)
    }

    /// Object key for a cell, e.g.
    /// `Copernicus_DSM_COG_10_N50_00_E006_00_DEM/Copernicus_DSM_COG_10_N50_00_E006_00_DEM.tif`.
    /// The `10`/`30` segment is the grid spacing in tenths of an arcsecond
    /// (GLO-30 is 1", GLO-90 is 3").
    fn object_url(tile: TileId, dataset: Dataset) -> String {
        let (bucket, spacing) = match dataset {
            Dataset::Copernicus30m => ("copernicus-dem-30m", 10),
            Dataset::Copernicus90m => ("copernicus-dem-90m", 30),
            _ => unreachable!("serves() gates datasets"),
        };
        let ns = if tile.lat >= 0 { 'N' } else { 'S' };
        let ew = if tile.lon >= 0 { 'E' } else { 'W' };
        let stem = format!(
            "Copernicus_DSM_COG_{}_{}{:02}_00_{}{:03}_00_DEM",
            spacing,
            ns,
            tile.lat.abs(),
            ew,
            tile.lon.abs()
        );
        format!("https://{}.s3.amazonaws.com/{}/{}.tif", bucket, stem, stem)
    }

    pub async fn fetch_tile(
        &self,
        tile: TileId,
        dataset: Dataset,
    ) -> Result<Bytes, ProviderError> {
        if !self.serves(dataset) {
            return Err(ProviderError::NotAvailable);
        }
        let url = Self::object_url(tile, dataset);
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
            // S3 answers 403 for keys it will not admit exist; for this
            // public bucket that means the same thing as 404 (ocean cell).
            403 | 404 => Err(ProviderError::NotAvailable),
            429 => Err(ProviderError::RateLimited {
                retry_after: super::opentopography::parse_retry_after(&resp),
            }),
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
