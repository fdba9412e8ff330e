//! Tile providers: transport endpoints that serve 1° elevation tiles.
//!
//! A dataset may be served by several providers; the downloader walks an
//! ordered candidate list per tile and the registry decides that order.

use bytes::Bytes;
use std::fmt;
use std::time::Duration;

mod copernicus_aws;
mod memory;
mod opentopography;
pub mod ratelimit;

pub use copernicus_aws::CopernicusAwsProvider;
pub use memory::{CallLog, MemoryProvider, Scripted};
pub use opentopography::OpenTopographyProvider;
pub use ratelimit::RateLimitRegistry;

use crate::config::PipelineConfig;
use crate::datasets::Dataset;
use crate::tile_grid::TileId;

/// Outcome classification for one fetch attempt. The downloader maps these
/// onto its retry/fallback policy; nothing here is fatal by itself.
#[derive(Debug)]
pub enum ProviderError {
    RateLimited { retry_after: Option<Duration> },
    NotAvailable,
    Transient(String),
    Permanent(String),
}

impl fmt::Display for ProviderError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProviderError::RateLimited { retry_after } => match retry_after {
                Some(d) => write!(f, "rate limited (retry after {}s)", d.as_secs()),
                None => write!(f, "rate limited"),
            },
            ProviderError::NotAvailable => write!(f, "not available"),
            ProviderError::Transient(msg) => write!(f, "transient failure: {}", msg),
            ProviderError::Permanent(msg) => write!(f, "permanent failure: {}", msg),
        }
    }
}

pub enum Provider {
    CopernicusAws(CopernicusAwsProvider),
    OpenTopography(OpenTopographyProvider),
    Memory(MemoryProvider),
}

impl fmt::Debug for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple(self.id()).finish()
    }
}

impl Provider {
    pub fn id(&self) -> &str {
        match self {
            Provider::CopernicusAws(_) => CopernicusAwsProvider::ID,
            Provider::OpenTopography(_) => OpenTopographyProvider::ID,
            Provider::Memory(p) => p.id(),
        }
    }

    pub fn serves(&self, dataset: Dataset) -> bool {
        match self {
            Provider::CopernicusAws(p) => p.serves(dataset),
            Provider::OpenTopography(p) => p.serves(dataset),
            Provider::Memory(_) => true,
        }
    }

    pub fn requires_credential(&self) -> bool {
        match self {
            Provider::CopernicusAws(_) => false,
            Provider::OpenTopography(_) => true,
            Provider::Memory(_) => false,
        }
    }

    /// Whether an all-no-data tile from this provider is legitimate (ocean
    /// areas). Providers that instead 404 on ocean cells return false, and
    /// an empty tile from them fails validation.
    pub fn allows_empty_tiles(&self) -> bool {
        match self {
            Provider::CopernicusAws(_) => false,
            Provider::OpenTopography(_) => true,
            Provider::Memory(_) => true,
        }
    }

    /// Fetch the 1° cell as a GeoTIFF.
    pub async fn fetch_tile(&self, tile: TileId, dataset: Dataset) -> Result<Bytes, ProviderError> {
        match self {
            Provider::CopernicusAws(p) => p.fetch_tile(tile, dataset).await,
            Provider::OpenTopography(p) => p.fetch_tile(tile, dataset).await,
            Provider::Memory(p) => p.fetch_tile(tile, dataset).await,
        }
    }

    pub fn get_stats(&self) -> String {
        match self {
            Provider::CopernicusAws(p) => p.get_stats(),
            Provider::OpenTopography(p) => p.get_stats(),
            Provider::Memory(p) => p.get_stats(),
        }
    }
}

/// The ordered set of providers available to a pipeline run.
pub struct ProviderRegistry {
    providers: Vec<Provider>,
}

impl ProviderRegistry {
    /// Build the default registry: the free S3 mirror first, then the
    /// metered API if a key was configured. A caller-supplied priority list
    /// pulls matching ids to the front in the given order.
    pub fn from_config(config: &PipelineConfig) -> Result<ProviderRegistry, crate::Error> {
        let mut providers = Vec::new();
        providers.push(Provider::CopernicusAws(CopernicusAwsProvider::new()?));
        match config.credentials.get(OpenTopographyProvider::ID) {
            Some(key) => {
                providers.push(Provider::OpenTopography(OpenTopographyProvider::new(key)?));
            }
            None => {
                log::warn!(
                    "no {} credential configured; that provider is disabled",
                    OpenTopographyProvider::ID
                );
            }
        }
        Ok(ProviderRegistry::with_priority(
            providers,
            &config.provider_priority,
        ))
    }

    /// Registry over explicit providers, in the given order. Used directly by
    /// tests and by callers bringing their own transports.
    pub fn with_providers(providers: Vec<Provider>) -> ProviderRegistry {
        ProviderRegistry { providers }
    }

    pub fn with_priority(mut providers: Vec<Provider>, priority: &[String]) -> ProviderRegistry {
        // Stable partition: listed ids first (in list order), the rest keep
        // their default relative order.
        let mut ordered = Vec::with_capacity(providers.len());
        for wanted in priority {
            if let Some(pos) = providers.iter().position(|p| p.id() == wanted) {
                ordered.push(providers.remove(pos));
            }
        }
        ordered.append(&mut providers);
        ProviderRegistry { providers: ordered }
    }

    pub fn is_empty(&self) -> bool {
        self.providers.is_empty()
    }

    /// Providers able to serve this dataset, in fallback order.
    pub fn candidates_for(&self, dataset: Dataset) -> Vec<&Provider> {
        self.providers.iter().filter(|p| p.serves(dataset)).collect()
    }
}
