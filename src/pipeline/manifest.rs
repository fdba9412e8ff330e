//! The region manifest: the index viewers read to discover artifacts.

use chrono::Utc;
use flate2::write::GzEncoder;
use flate2::Compression;
use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::io::Write;
use std::path::{Path, PathBuf};
use tokio::sync::Mutex;

use super::export::{self, ArtifactBounds, FORMAT_VERSION};
use crate::regions::RegionType;
use crate::Error;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ManifestEntry {
    pub filename: String,
    pub display_name: String,
    pub region_type: RegionType,
    pub bounds: ArtifactBounds,
    pub source: String,
    pub width: usize,
    pub height: usize,
    pub generated: String,
    pub format_version: u32,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct Manifest {
    pub format_version: u32,
    pub generated: String,
    pub regions: BTreeMap<String, ManifestEntry>,
}

impl Manifest {
    fn empty() -> Manifest {
        Manifest {
            format_version: FORMAT_VERSION,
            generated: Utc::now().to_rfc3339(),
            regions: BTreeMap::new(),
        }
    }
}

// Manifest read-modify-write cycles are serialized process-wide; cross-host
// coordination is out of scope.
static WRITE_LOCK: Lazy<Mutex<()>> = Lazy::new(|| Mutex::new(()));

pub struct ManifestStore {
    path: PathBuf,
}

impl ManifestStore {
    pub fn new(path: PathBuf) -> ManifestStore {
        ManifestStore { path }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn load(&self) -> Result<Manifest, Error> {
        if !self.path.exists() {
            return Ok(Manifest::empty());
        }
        let bytes = std::fs::read(&self.path)?;
        Ok(serde_json::from_slice(&bytes)?)
    }

    /// Insert or replace one region's entry under the exclusive lock.
    ///
    /// The entry's format version must match the manifest's declared one;
    /// a mismatch (an artifact produced by newer code, or stale entries from
    /// an older format) fails the whole write. Mixed-version manifests are
    /// invalid by construction, so there is no partial update to roll back.
    pub async fn update(&self, region_id: &str, entry: ManifestEntry) -> Result<(), Error> {
        let _guard = WRITE_LOCK.lock().await;
        let mut manifest = self.load()?;

        if entry.format_version != manifest.format_version {
            return Err(Error::FormatVersionMismatch {
                expected: manifest.format_version,
                found: entry.format_version,
            });
        }
        if let Some(stale) = manifest
            .regions
            .values()
            .find(|e| e.format_version != manifest.format_version)
        {
            return Err(Error::FormatVersionMismatch {
                expected: manifest.format_version,
                found: stale.format_version,
            });
        }

        manifest.regions.insert(region_id.to_string(), entry);
        manifest.generated = Utc::now().to_rfc3339();
        self.write(&manifest)
    }

    /// Temp file, fsync, rename; then the gzip mirror the same way.
    fn write(&self, manifest: &Manifest) -> Result<(), Error> {
        if let Some(parent) = self.path.parent() {
            crate::config::ensure_dir(parent)?;
        }
        let json = serde_json::to_vec(manifest)?;

        let staging = self.path.with_extension("json.part");
        let persist = || -> std::io::Result<()> {
            let mut file = std::fs::File::create(&staging)?;
            file.write_all(&json)?;
            file.sync_all()?;
            std::fs::rename(&staging, &self.path)
        };
        persist().map_err(|e| {
            Error::Storage(format!("cannot write {}: {}", self.path.display(), e))
        })?;

        let gz_path = export::gz_sibling(&self.path);
        let gz_staging = gz_path.with_extension("gz.part");
        let persist_gz = || -> std::io::Result<()> {
            let file = std::fs::File::create(&gz_staging)?;
            let mut encoder = GzEncoder::new(file, Compression::default());
            encoder.write_all(&json)?;
            let file = encoder.finish()?;
            file.sync_all()?;
            std::fs::rename(&gz_staging, &gz_path)
        };
        persist_gz()
            .map_err(|e| Error::Storage(format!("cannot write {}: {}", gz_path.display(), e)))?;
        Ok(())
    }

    /// Check that every entry points at a readable artifact whose embedded
    /// version matches the manifest's declared one.
    pub fn verify_against(&self, regions_dir: &Path) -> Result<(), Error> {
        let manifest = self.load()?;
        for (region_id, entry) in &manifest.regions {
            let artifact_path = regions_dir.join(&entry.filename);
            let artifact = export::read_artifact(&artifact_path).map_err(|e| {
                Error::Storage(format!(
                    "manifest entry {} points at unreadable {}: {}",
                    region_id,
                    artifact_path.display(),
                    e
                ))
            })?;
            artifact.ensure_version(manifest.format_version)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(version: u32) -> ManifestEntry {
        ManifestEntry {
            filename: "ohio_SRTM_90m_4194304px_v2.json".to_string(),
            display_name: "Ohio".to_string(),
            region_type: RegionType::UsaState,
            bounds: ArtifactBounds {
                north: 41.98,
                south: 38.40,
                east: -80.52,
                west: -84.82,
            },
            source: "SRTM_90m".to_string(),
            width: 1536,
            height: 2048,
            generated: "2026-07-01T00:00:00Z".to_string(),
            format_version: version,
        }
    }

    #[tokio::test]
    async fn test_update_creates_and_accumulates() {
        let dir = tempfile::tempdir().unwrap();
        let store = ManifestStore::new(dir.path().join("regions_manifest.json"));
        store.update("ohio", entry(FORMAT_VERSION)).await.unwrap();
        let mut second = entry(FORMAT_VERSION);
        second.display_name = "Indiana".to_string();
        store.update("indiana", second).await.unwrap();

        let manifest = store.load().unwrap();
        assert_eq!(manifest.format_version, FORMAT_VERSION);
        assert_eq!(manifest.regions.len(), 2);
        assert!(manifest.regions.contains_key("ohio"));
        assert!(manifest.regions.contains_key("indiana"));

        // The gzip mirror decompresses to the same bytes.
        let raw = std::fs::read(store.path()).unwrap();
        let gz = std::fs::read(export::gz_sibling(store.path())).unwrap();
        let mut decoder = flate2::read::GzDecoder::new(&gz[..]);
        let mut decompressed = Vec::new();
        std::io::Read::read_to_end(&mut decoder, &mut decompressed).unwrap();
        assert_eq!(raw, decompressed);
    }

    #[tokio::test]
    async fn test_version_mismatch_refused_without_partial_update() {
        let dir = tempfile::tempdir().unwrap();
        let store = ManifestStore::new(dir.path().join("regions_manifest.json"));
        store.update("ohio", entry(FORMAT_VERSION)).await.unwrap();
        let before = std::fs::read(store.path()).unwrap();

        let err = store.update("indiana", entry(FORMAT_VERSION + 1)).await;
        assert!(matches!(
            err,
            Err(Error::FormatVersionMismatch {
                expected: FORMAT_VERSION,
                found: 3,
            })
        ));
        // Nothing was touched on disk.
        assert_eq!(std::fs::read(store.path()).unwrap(), before);
        assert_eq!(store.load().unwrap().regions.len(), 1);
    }

    #[tokio::test]
    async fn test_update_replaces_existing_entry() {
        let dir = tempfile::tempdir().unwrap();
        let store = ManifestStore::new(dir.path().join("regions_manifest.json"));
        store.update("ohio", entry(FORMAT_VERSION)).await.unwrap();
        let mut replacement = entry(FORMAT_VERSION);
        replacement.width = 999;
        store.update("ohio", replacement).await.unwrap();
        let manifest = store.load().unwrap();
        assert_eq!(manifest.regions.len(), 1);
        assert_eq!(manifest.regions["ohio"].width, 999);
    }
}
