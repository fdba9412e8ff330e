use crate::tile_grid::TileId;
use std::{fmt, io};

/// Crate-wide error. Variants follow the recovery taxonomy: everything that is
/// recoverable (transient network, rate limits, single-provider failures) is
/// handled inside the downloader and only surfaces here once recovery is
/// exhausted.
#[derive(Debug)]
pub enum Error {
    IO(io::Error),
    Http(reqwest::Error),
    Gdal(gdal::errors::GdalError),
    Json(serde_json::Error),
    RegionNotFound(String),
    InvalidRegion(String),
    NoDatasetCovers(String),
    IncompatibleDataset(String),
    IncompleteCoverage {
        region: String,
        missing: Vec<TileId>,
    },
    ProviderUnavailable(String),
    ValidationFailed(String),
    BoundaryNotFound(String),
    ReprojectionFailed(String),
    InsufficientCoverage {
        region: String,
        ratio: f64,
        minimum: f64,
    },
    ElevationOutOfRange(String),
    FormatVersionMismatch {
        expected: u32,
        found: u32,
    },
    Configuration(String),
    Storage(String),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::IO(err) => write!(f, "i/o error: {}", err),
            Error::Http(err) => write!(f, "http error: {}", err),
            Error::Gdal(err) => write!(f, "gdal error: {}", err),
            Error::Json(err) => write!(f, "json error: {}", err),
            Error::RegionNotFound(id) => write!(f, "unknown region {:?}", id),
            Error::InvalidRegion(msg) => write!(f, "invalid region: {}", msg),
            Error::NoDatasetCovers(msg) => write!(f, "no dataset covers {}", msg),
            Error::IncompatibleDataset(msg) => write!(f, "incompatible dataset: {}", msg),
            Error::IncompleteCoverage { region, missing } => write!(
                f,
                "incomplete coverage for {}: {} tile(s) could not be obtained ({})",
                region,
                missing.len(),
                missing
                    .iter()
                    .map(|t| t.to_string())
                    .collect::<Vec<_>>()
                    .join(", ")
            ),
            Error::ProviderUnavailable(msg) => write!(f, "no provider available: {}", msg),
            Error::ValidationFailed(msg) => write!(f, "tile validation failed: {}", msg),
            Error::BoundaryNotFound(msg) => write!(f, "boundary polygon not found: {}", msg),
            Error::ReprojectionFailed(msg) => write!(f, "reprojection failed: {}", msg),
            Error::InsufficientCoverage {
                region,
                ratio,
                minimum,
            } => write!(
                f,
                "insufficient coverage for {}: {:.1}% finite cells (minimum {:.1}%)",
                region,
                ratio * 100.0,
                minimum * 100.0
            ),
            Error::ElevationOutOfRange(msg) => write!(f, "elevation out of range: {}", msg),
            Error::FormatVersionMismatch { expected, found } => write!(
                f,
                "format version mismatch: manifest declares v{}, artifact has v{}",
                expected, found
            ),
            Error::Configuration(msg) => write!(f, "configuration error: {}", msg),
            Error::Storage(msg) => write!(f, "storage error: {}", msg),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::IO(err) => Some(err),
            Error::Http(err) => Some(err),
            Error::Gdal(err) => Some(err),
            Error::Json(err) => Some(err),
            _ => None,
        }
    }
}

impl From<io::Error> for Error {
    fn from(value: io::Error) -> Self {
        Error::IO(value)
    }
}

impl From<reqwest::Error> for Error {
    fn from(value: reqwest::Error) -> Self {
        Error::Http(value)
    }
}

impl From<gdal::errors::GdalError> for Error {
    fn from(value: gdal::errors::GdalError) -> Self {
        Error::Gdal(value)
    }
}

impl From<serde_json::Error> for Error {
    fn from(value: serde_json::Error) -> Self {
        Error::Json(value)
    }
}
