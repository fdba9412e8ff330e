use bytes::Bytes;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use super::ProviderError;
use crate::datasets::Dataset;
use crate::tile_grid::TileId;

/// What a [`MemoryProvider`] answers for a tile.
#[derive(Debug, Clone)]
pub enum Scripted {
    Tile(Bytes),
    RateLimited(Option<Duration>),
    NotAvailable,
    Transient,
    Permanent,
}

/// An in-memory provider with scripted responses. This is the downloader's
/// test double: fallback, rate-limit and partial-failure behavior can all be
/// exercised without a network.
pub struct MemoryProvider {
    id: String,
    responses: HashMap<TileId, Scripted>,
    default: Scripted,
    calls: Arc<Mutex<Vec<TileId>>>,
}

/// A cloneable handle onto a provider's request log; stays usable after the
/// provider itself moved into a registry.
pub type CallLog = Arc<Mutex<Vec<TileId>>>;

impl MemoryProvider {
    pub fn new(id: &str) -> MemoryProvider {
        MemoryProvider {
            id: id.to_string(),
            responses: HashMap::new(),
            default: Scripted::NotAvailable,
            calls: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn with_default(mut self, default: Scripted) -> MemoryProvider {
        self.default = default;
        self
    }

    pub fn with_response(mut self, tile: TileId, response: Scripted) -> MemoryProvider {
        self.responses.insert(tile, response);
        self
    }

    pub fn call_log(&self) -> CallLog {
        Arc::clone(&self.calls)
    }

    pub fn get_stats(&self) -> String {
        format!("requests_count={}", self.calls.lock().unwrap().len())
    }

    pub async fn fetch_tile(
        &self,
        tile: TileId,
        _dataset: Dataset,
    ) -> Result<Bytes, ProviderError> {
        self.calls.lock().unwrap().push(tile);
        let scripted = self.responses.get(&tile).unwrap_or(&self.default);
        match scripted {
            Scripted::Tile(bytes) => Ok(bytes.clone()),
            Scripted::RateLimited(retry_after) => Err(ProviderError::RateLimited {
                retry_after: *retry_after,
            }),
            Scripted::NotAvailable => Err(ProviderError::NotAvailable),
            Scripted::Transient => Err(ProviderError::Transient("scripted failure".to_string())),
            Scripted::Permanent => Err(ProviderError::Permanent("scripted failure".to_string())),
        }
    }
}
