//! Tile-cached downloader.
//!
//! Turns (region, dataset) into a merged raster covering the region's snapped
//! bounds, reusing the shared on-disk tile pool whenever it can. The pool is
//! content-addressed by filename (cell + resolution), so a tile downloaded
//! for one region is free for every neighbor that overlaps the same cell.

use bytes::Bytes;
use rand::Rng;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;

use crate::config::{ensure_dir, PipelineConfig};
use crate::datasets::Dataset;
use crate::providers::{Provider, ProviderError, ProviderRegistry, RateLimitRegistry};
use crate::raster;
use crate::regions::Region;
use crate::tile_grid::{snap_to_degree_grid, tiles_covering, TileId};
use crate::Error;

/// First retry backoff; doubles per attempt, plus jitter.
const RETRY_BASE: Duration = Duration::from_millis(250);
const RETRY_JITTER_MS: u64 = 250;

pub struct TileDownloader {
    config: Arc<PipelineConfig>,
    providers: Arc<ProviderRegistry>,
    ratelimits: Arc<RateLimitRegistry>,
}

impl TileDownloader {
    pub fn new(config: PipelineConfig, providers: ProviderRegistry) -> TileDownloader {
        TileDownloader {
            config: Arc::new(config),
            providers: Arc::new(providers),
            ratelimits: Arc::new(RateLimitRegistry::new()),
        }
    }

    /// The shared cooldown registry, mostly interesting to tests.
    pub fn ratelimits(&self) -> &RateLimitRegistry {
        &self.ratelimits
    }

    /// Produce a merged raster whose extent covers the snapped region bounds.
    ///
    /// On success the returned file is a valid single-band raster, every
    /// constituent tile validated. Re-running after success touches no
    /// network: cached tiles only get re-validated and the existing merge is
    /// reused byte-for-byte.
    pub async fn fetch_region_raster(
        &self,
        region: &Region,
        dataset: Dataset,
    ) -> Result<PathBuf, Error> {
        let aligned = snap_to_degree_grid(&region.bounds);
        let tiles = tiles_covering(&aligned);
        let pool_dir = self.config.tile_pool_dir(dataset);
        let merged_dir = self.config.merged_dir(dataset);
        ensure_dir(&pool_dir)?;
        ensure_dir(&merged_dir)?;
        let merged_path = merged_dir.join(format!(
            "{}_merged_{}m.tif",
            region.id,
            dataset.resolution_m()
        ));

        if self.providers.candidates_for(dataset).is_empty() {
            return Err(Error::ProviderUnavailable(format!(
                "no registered provider serves {}",
                dataset
            )));
        }

        // Plan phase: split the tile set into cached and missing, clearing
        // out stale staging files and invalid cache entries as we meet them.
        let mut missing: Vec<TileId> = Vec::new();
        for tile in &tiles {
            let path = pool_dir.join(tile.filename(dataset.resolution_m()));
            let staging = staging_path(&path);
            if staging.exists() {
                log::debug!("removing stale staging file {}", staging.display());
                let _ = std::fs::remove_file(&staging);
            }
            if path.exists() {
                // Empty-tile policy was already enforced at download time.
                match raster::validate_tile(&path, *tile, dataset, true) {
                    Ok(()) => continue,
                    Err(e) => {
                        log::warn!("cached tile invalid, refetching: {}", e);
                        let _ = std::fs::remove_file(&path);
                    }
                }
            }
            missing.push(*tile);
        }
        log::info!(
            "{}: {} tiles, {} cached, {} to download",
            region.id,
            tiles.len(),
            tiles.len() - missing.len(),
            missing.len()
        );

        let failed = self.fetch_missing(&missing, dataset, &pool_dir).await?;
        for provider in self.providers.candidates_for(dataset) {
            log::debug!("{}: {}", provider.id(), provider.get_stats());
        }
        if !failed.is_empty() {
            let mut missing_tiles = failed;
            missing_tiles.sort();
            return Err(Error::IncompleteCoverage {
                region: region.id.clone(),
                missing: missing_tiles,
            });
        }

        if merged_is_current(&merged_path, &aligned) {
            log::debug!("reusing merge {}", merged_path.display());
            return Ok(merged_path);
        }

        let ordered: Vec<(TileId, PathBuf)> = tiles
            .iter()
            .map(|t| (*t, pool_dir.join(t.filename(dataset.resolution_m()))))
            .collect();
        let tmp_path = merged_path.with_extension("tif.part");
        raster::merge_tiles(&ordered, dataset, &aligned, &tmp_path)?;
        tokio::fs::rename(&tmp_path, &merged_path)
            .await
            .map_err(|e| Error::Storage(format!("cannot finalize merge: {}", e)))?;
        Ok(merged_path)
    }

    /// Fetch all missing tiles concurrently (bounded by the semaphore) and
    /// return those that no provider could deliver. Partial progress is kept:
    /// tiles that succeeded stay in the pool even when others fail.
    async fn fetch_missing(
        &self,
        missing: &[TileId],
        dataset: Dataset,
        pool_dir: &Path,
    ) -> Result<Vec<TileId>, Error> {
        let semaphore = Arc::new(Semaphore::new(self.config.max_concurrent_tiles));
        let mut join_set = JoinSet::new();
        for tile in missing.iter().copied() {
            let providers = Arc::clone(&self.providers);
            let ratelimits = Arc::clone(&self.ratelimits);
            let config = Arc::clone(&self.config);
            let semaphore = Arc::clone(&semaphore);
            let pool_dir = pool_dir.to_path_buf();
            join_set.spawn(async move {
                let _permit = semaphore
                    .acquire_owned()
                    .await
                    .expect("semaphore never closed");
                let ok = fetch_one_tile(&providers, &ratelimits, &config, tile, dataset, &pool_dir)
                    .await;
                (tile, ok)
            });
        }

        let mut failed = Vec::new();
        while let Some(joined) = join_set.join_next().await {
            let (tile, ok) = joined.map_err(|e| Error::Storage(format!("fetch task died: {}", e)))?;
            match ok {
                Ok(()) => {}
                Err(e) => {
                    log::warn!("tile {} failed on all providers: {}", tile, e);
                    failed.push(tile);
                }
            }
        }
        Ok(failed)
    }
}

fn staging_path(final_path: &Path) -> PathBuf {
    final_path.with_extension("tif.part")
}

fn merged_is_current(path: &Path, aligned: &crate::bounds::GeoBounds) -> bool {
    if !path.exists() {
        return false;
    }
    match raster::open_info(path) {
        Ok(info) => {
            let extent = info.extent();
            let eps = 1e-6;
            extent.xmin <= aligned.west + eps
                && extent.ymin <= aligned.south + eps
                && extent.xmax >= aligned.east - eps
                && extent.ymax >= aligned.north - eps
        }
        Err(_) => false,
    }
}

/// Walk the provider fallback chain for one tile. `Ok(())` means the tile
/// now sits validated in the pool under its canonical name.
async fn fetch_one_tile(
    providers: &ProviderRegistry,
    ratelimits: &RateLimitRegistry,
    config: &PipelineConfig,
    tile: TileId,
    dataset: Dataset,
    pool_dir: &Path,
) -> Result<(), Error> {
    let final_path = pool_dir.join(tile.filename(dataset.resolution_m()));
    let mut last_failure = String::from("no provider attempted");

    for provider in providers.candidates_for(dataset) {
        if ratelimits.is_limited(provider.id()).await {
            log::debug!("{}: skipping {} (cooling down)", tile, provider.id());
            continue;
        }
        match fetch_with_retries(provider, tile, dataset, config).await {
            Attempt::Got(bytes) => {
                let staging = staging_path(&final_path);
                if let Err(e) = tokio::fs::write(&staging, &bytes).await {
                    return Err(Error::Storage(format!(
                        "cannot write {}: {}",
                        staging.display(),
                        e
                    )));
                }
                match raster::validate_tile(&staging, tile, dataset, provider.allows_empty_tiles())
                {
                    Ok(()) => {
                        // A concurrent process racing us to the same canonical
                        // name wrote the same bytes; either rename winning is
                        // fine.
                        tokio::fs::rename(&staging, &final_path).await.map_err(|e| {
                            Error::Storage(format!(
                                "cannot finalize {}: {}",
                                final_path.display(),
                                e
                            ))
                        })?;
                        ratelimits.clear(provider.id()).await;
                        log::debug!("{}: fetched from {}", tile, provider.id());
                        return Ok(());
                    }
                    Err(e) => {
                        let _ = tokio::fs::remove_file(&staging).await;
                        log::warn!("{}: {} from {}", tile, e, provider.id());
                        last_failure = format!("{}: {}", provider.id(), e);
                    }
                }
            }
            Attempt::RateLimited(retry_after) => {
                ratelimits
                    .mark_rate_limited(provider.id(), retry_after)
                    .await;
                last_failure = format!("{}: rate limited", provider.id());
            }
            Attempt::Failed(msg) => {
                log::debug!("{}: {} failed: {}", tile, provider.id(), msg);
                last_failure = format!("{}: {}", provider.id(), msg);
            }
        }
    }
    Err(Error::ProviderUnavailable(last_failure))
}

enum Attempt {
    Got(Bytes),
    RateLimited(Option<Duration>),
    Failed(String),
}

/// One provider, up to `max_retries` extra attempts on transient failures
/// with exponential backoff and jitter. A request past its deadline counts
/// as transient. Rate limits and permanent failures bail out immediately.
async fn fetch_with_retries(
    provider: &Provider,
    tile: TileId,
    dataset: Dataset,
    config: &PipelineConfig,
) -> Attempt {
    let deadline = Duration::from_secs(config.request_timeout_seconds);
    let mut attempt: u32 = 0;
    loop {
        attempt += 1;
        let transient_cause =
            match tokio::time::timeout(deadline, provider.fetch_tile(tile, dataset)).await {
                Ok(Ok(bytes)) => return Attempt::Got(bytes),
                Ok(Err(ProviderError::RateLimited { retry_after })) => {
                    return Attempt::RateLimited(retry_after)
                }
                Ok(Err(ProviderError::NotAvailable)) => {
                    return Attempt::Failed("no coverage".to_string())
                }
                Ok(Err(ProviderError::Permanent(msg))) => return Attempt::Failed(msg),
                Ok(Err(ProviderError::Transient(msg))) => msg,
                Err(_elapsed) => format!("deadline of {}s exceeded", deadline.as_secs()),
            };
        if attempt > config.max_retries {
            return Attempt::Failed(format!(
                "transient failure after {} attempts: {}",
                attempt, transient_cause
            ));
        }
        let backoff = RETRY_BASE * 2u32.pow(attempt - 1)
            + Duration::from_millis(rand::rng().random_range(0..RETRY_JITTER_MS));
        log::debug!(
            "{}: transient failure from {} ({}), retrying in {:?}",
            tile,
            provider.id(),
            transient_cause,
            backoff
        );
        tokio::time::sleep(backoff).await;
    }
}
