//! Typed catalogue of downloadable regions.
//!
//! The table is static and validated once at first access; after that the
//! registry is immutable. Every branch on [`RegionType`] in this crate is an
//! exhaustive `match`: an unknown classification is a defect, never a
//! fallthrough to "international".

use crate::bounds::GeoBounds;
use crate::Error;
use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};

pub const USA_COUNTRY_NAME: &str = "United States of America";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RegionType {
    #[serde(rename = "USA_STATE")]
    UsaState,
    #[serde(rename = "COUNTRY")]
    Country,
    #[serde(rename = "AREA")]
    Area,
}

impl RegionType {
    pub const fn as_str(self) -> &'static str {
        match self {
            RegionType::UsaState => "USA_STATE",
            RegionType::Country => "COUNTRY",
            RegionType::Area => "AREA",
        }
    }
}

#[derive(Debug, Clone)]
pub struct Region {
    pub id: String,
    pub display_name: String,
    pub bounds: GeoBounds,
    pub region_type: RegionType,
    /// For USA states this is always [`USA_COUNTRY_NAME`]; for countries the
    /// country itself; areas may or may not belong to one.
    pub country: Option<String>,
    pub clip_boundary: bool,
}

impl Region {
    pub fn new(
        id: &str,
        display_name: &str,
        bounds: (f64, f64, f64, f64),
        region_type: RegionType,
        country: Option<&str>,
        clip_boundary: bool,
    ) -> Result<Region, Error> {
        let bounds = GeoBounds::new(bounds.0, bounds.1, bounds.2, bounds.3)
            .map_err(|e| Error::InvalidRegion(format!("{}: {}", id, e)))?;
        let country = match region_type {
            RegionType::UsaState => {
                if !clip_boundary {
                    return Err(Error::InvalidRegion(format!(
                        "{}: USA states are always clipped to their admin-1 boundary",
                        id
                    )));
                }
                Some(USA_COUNTRY_NAME.to_string())
            }
            RegionType::Country => {
                if clip_boundary && country.is_none() {
                    return Err(Error::InvalidRegion(format!(
                        "{}: a clipped country needs a resolvable admin-0 name",
                        id
                    )));
                }
                country.map(str::to_string)
            }
            RegionType::Area => country.map(str::to_string),
        };
        Ok(Region {
            id: id.to_string(),
            display_name: display_name.to_string(),
            bounds,
            region_type,
            country,
            clip_boundary,
        })
    }
}

type StateRow = (&'static str, &'static str, (f64, f64, f64, f64));
type CountryRow = (&'static str, &'static str, (f64, f64, f64, f64), bool);
type AreaRow = (
    &'static str,
    &'static str,
    (f64, f64, f64, f64),
    Option<&'static str>,
);

// Curated WGS84 bounds (west, south, east, north). Alaska is cut at the
// Aleutian date-line crossing; the grid math does not wrap longitude.
#[rustfmt::skip]
const USA_STATES: &[StateRow] = &[
    ("alabama", "Alabama", (-88.47, 30.22, -84.89, 35.01)),
    ("alaska", "Alaska", (-168.00, 51.20, -129.99, 71.44)),
    ("arizona", "Arizona", (-114.82, 31.33, -109.05, 37.00)),
    ("arkansas", "Arkansas", (-94.62, 33.00, -89.64, 36.50)),
    ("california", "California", (-124.41, 32.53, -114.13, 42.01)),
    ("colorado", "Colorado", (-109.05, 36.99, -102.04, 41.00)),
    ("connecticut", "Connecticut", (-73.73, 40.98, -71.79, 42.05)),
    ("delaware", "Delaware", (-75.79, 38.45, -75.05, 39.84)),
    ("florida", "Florida", (-87.63, 24.52, -80.03, 31.00)),
    ("georgia", "Georgia", (-85.61, 30.36, -80.84, 35.00)),
    ("hawaii", "Hawaii", (-160.25, 18.91, -154.81, 22.24)),
    ("idaho", "Idaho", (-117.24, 42.00, -111.04, 49.00)),
    ("illinois", "Illinois", (-91.51, 36.97, -87.50, 42.51)),
    ("indiana", "Indiana", (-88.10, 37.77, -84.78, 41.76)),
    ("iowa", "Iowa", (-96.64, 40.38, -90.14, 43.50)),
    ("kansas", "Kansas", (-102.05, 36.99, -94.59, 40.00)),
    ("kentucky", "Kentucky", (-89.57, 36.50, -81.96, 39.15)),
    ("louisiana", "Louisiana", (-94.04, 28.93, -88.82, 33.02)),
    ("maine", "Maine", (-71.08, 43.06, -66.95, 47.46)),
    ("maryland", "Maryland", (-79.49, 37.89, -75.05, 39.72)),
    ("massachusetts", "Massachusetts", (-73.51, 41.24, -69.93, 42.89)),
    ("michigan", "Michigan", (-90.42, 41.70, -82.41, 48.26)),
    ("minnesota", "Minnesota", (-97.24, 43.50, -89.49, 49.38)),
    ("mississippi", "Mississippi", (-91.65, 30.17, -88.10, 35.00)),
    ("missouri", "Missouri", (-95.77, 35.99, -89.10, 40.61)),
    ("montana", "Montana", (-116.05, 44.36, -104.04, 49.00)),
    ("nebraska", "Nebraska", (-104.05, 40.00, -95.31, 43.00)),
    ("nevada", "Nevada", (-120.01, 35.00, -114.04, 42.00)),
    ("new-hampshire", "New Hampshire", (-72.56, 42.70, -70.61, 45.31)),
    ("new-jersey", "New Jersey", (-75.56, 38.93, -73.89, 41.36)),
    ("new-mexico", "New Mexico", (-109.05, 31.33, -103.00, 37.00)),
    ("new-york", "New York", (-79.76, 40.50, -71.86, 45.02)),
    ("north-carolina", "North Carolina", (-84.32, 33.84, -75.46, 36.59)),
    ("north-dakota", "North Dakota", (-104.05, 45.94, -96.55, 49.00)),
    ("ohio", "Ohio", (-84.82, 38.40, -80.52, 41.98)),
    ("oklahoma", "Oklahoma", (-103.00, 33.62, -94.43, 37.00)),
    ("oregon", "Oregon", (-124.57, 41.99, -116.46, 46.29)),
    ("pennsylvania", "Pennsylvania", (-80.52, 39.72, -74.69, 42.27)),
    ("rhode-island", "Rhode Island", (-71.86, 41.15, -71.12, 42.02)),
    ("south-carolina", "South Carolina", (-83.35, 32.03, -78.54, 35.22)),
    ("south-dakota", "South Dakota", (-104.06, 42.48, -96.44, 45.95)),
    ("tennessee", "Tennessee", (-90.31, 34.98, -81.65, 36.68)),
    ("texas", "Texas", (-106.65, 25.84, -93.51, 36.50)),
    ("utah", "Utah", (-114.05, 37.00, -109.04, 42.00)),
    ("vermont", "Vermont", (-73.44, 42.73, -71.46, 45.02)),
    ("virginia", "Virginia", (-83.68, 36.54, -75.24, 39.47)),
    ("washington", "Washington", (-124.85, 45.54, -116.92, 49.00)),
    ("west-virginia", "West Virginia", (-82.64, 37.20, -77.72, 40.64)),
    ("wisconsin", "Wisconsin", (-92.89, 42.49, -86.25, 47.31)),
    ("wyoming", "Wyoming", (-111.06, 41.00, -104.05, 45.01)),
];

#[rustfmt::skip]
const COUNTRIES: &[CountryRow] = &[
    ("austria", "Austria", (9.50, 46.30, 17.20, 49.00), true),
    ("brazil", "Brazil", (-74.00, -34.00, -34.00, 5.30), true),
    ("chile", "Chile", (-75.70, -55.90, -66.40, -17.50), true),
    ("ecuador", "Ecuador", (-81.00, -5.00, -75.20, 1.50), true),
    ("france", "France", (-5.15, 41.30, 9.60, 51.10), true),
    ("greece", "Greece", (19.30, 34.80, 28.30, 41.80), true),
    ("iceland", "Iceland", (-25.00, 63.00, -13.00, 67.00), true),
    ("italy", "Italy", (6.60, 36.60, 18.50, 47.10), true),
    ("japan", "Japan", (129.00, 31.00, 146.00, 45.60), true),
    ("kenya", "Kenya", (33.90, -4.70, 41.90, 5.50), true),
    ("madagascar", "Madagascar", (43.20, -25.60, 50.50, -11.90), true),
    ("mexico", "Mexico", (-117.10, 14.50, -86.70, 32.70), true),
    ("nepal", "Nepal", (80.00, 26.30, 88.20, 30.50), true),
    ("new-zealand", "New Zealand", (166.00, -47.50, 178.60, -34.30), true),
    ("norway", "Norway", (4.50, 57.90, 31.20, 71.20), true),
    ("peru", "Peru", (-81.40, -18.40, -68.60, 0.00), true),
    ("portugal", "Portugal", (-9.50, 36.90, -6.20, 42.20), true),
    ("south-korea", "South Korea", (126.00, 33.10, 129.60, 38.60), true),
    ("spain", "Spain", (-9.30, 36.00, 3.30, 43.80), true),
    ("switzerland", "Switzerland", (5.95, 45.80, 10.50, 47.80), true),
];

#[rustfmt::skip]
const AREAS: &[AreaRow] = &[
    ("alps", "Alps", (5.90, 44.00, 13.80, 48.00), None),
    ("death-valley", "Death Valley", (-117.30, 35.80, -116.20, 37.10), Some(USA_COUNTRY_NAME)),
    ("grand-canyon", "Grand Canyon", (-113.00, 35.70, -111.60, 36.60), Some(USA_COUNTRY_NAME)),
    ("himalaya", "Himalaya", (75.00, 26.00, 95.00, 36.00), None),
    ("kilimanjaro", "Kilimanjaro", (36.90, -3.50, 37.60, -2.80), None),
    ("mont-blanc", "Mont Blanc", (6.60, 45.70, 7.20, 46.10), None),
    ("mount-fuji", "Mount Fuji", (138.50, 35.10, 138.90, 35.50), Some("Japan")),
    ("patagonia", "Patagonia", (-73.60, -51.00, -68.30, -41.00), None),
    ("yosemite", "Yosemite", (-119.90, 37.50, -119.20, 38.20), Some(USA_COUNTRY_NAME)),
];

pub struct Registry {
    regions: Vec<Region>,
}

static GLOBAL: Lazy<Registry> = Lazy::new(|| {
    // The table is part of the crate; a bad row is a programming error and
    // should fail loudly at first use.
    Registry::load().unwrap_or_else(|e| panic!("region table invalid: {}", e))
});

impl Registry {
    pub fn global() -> &'static Registry {
        &GLOBAL
    }

    pub fn load() -> Result<Registry, Error> {
        let mut regions = Vec::new();
        for (id, name, bounds) in USA_STATES {
            regions.push(Region::new(id, name, *bounds, RegionType::UsaState, None, true)?);
        }
        for (id, name, bounds, clip) in COUNTRIES {
            regions.push(Region::new(
                id,
                name,
                *bounds,
                RegionType::Country,
                Some(name),
                *clip,
            )?);
        }
        for (id, name, bounds, country) in AREAS {
            regions.push(Region::new(
                id,
                name,
                *bounds,
                RegionType::Area,
                *country,
                false,
            )?);
        }

        let mut seen = std::collections::HashSet::new();
        for r in &regions {
            if !seen.insert(r.id.as_str()) {
                return Err(Error::InvalidRegion(format!("duplicate region id {}", r.id)));
            }
        }
        Ok(Registry { regions })
    }

    pub fn get(&self, region_id: &str) -> Result<&Region, Error> {
        self.regions
            .iter()
            .find(|r| r.id == region_id)
            .ok_or_else(|| Error::RegionNotFound(region_id.to_string()))
    }

    pub fn list(&self, filter: Option<RegionType>) -> Vec<&Region> {
        self.regions
            .iter()
            .filter(|r| filter.map_or(true, |t| r.region_type == t))
            .collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Region> {
        self.regions.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_registry_loads_and_finds_ohio() {
        let registry = Registry::global();
        let ohio = registry.get("ohio").unwrap();
        assert_eq!(ohio.display_name, "Ohio");
        assert_eq!(ohio.region_type, RegionType::UsaState);
        assert_eq!(ohio.country.as_deref(), Some(USA_COUNTRY_NAME));
        assert!(ohio.clip_boundary);
    }

    #[test]
    fn test_get_unknown_region() {
        match Registry::global().get("atlantis") {
            Err(Error::RegionNotFound(id)) => assert_eq!(id, "atlantis"),
            other => panic!("expected RegionNotFound, got {:?}", other.map(|r| &r.id)),
        }
    }

    #[test]
    fn test_list_filters_by_type() {
        let registry = Registry::global();
        let states = registry.list(Some(RegionType::UsaState));
        let countries = registry.list(Some(RegionType::Country));
        let areas = registry.list(Some(RegionType::Area));
        assert_eq!(states.len(), 50);
        assert!(countries.iter().all(|r| r.region_type == RegionType::Country));
        assert!(!areas.is_empty());
        assert_eq!(
            registry.list(None).len(),
            states.len() + countries.len() + areas.len()
        );
    }

    #[test]
    fn test_usa_state_requires_clipping() {
        let err = Region::new(
            "nowhere",
            "Nowhere",
            (-84.0, 38.0, -80.0, 42.0),
            RegionType::UsaState,
            None,
            false,
        );
        assert!(err.is_err());
    }

    #[test]
    fn test_clipped_country_requires_admin0_name() {
        let err = Region::new(
            "nowhere",
            "Nowhere",
            (-84.0, 38.0, -80.0, 42.0),
            RegionType::Country,
            None,
            true,
        );
        assert!(err.is_err());
    }

    #[test]
    fn test_degenerate_bounds_rejected_at_load() {
        let err = Region::new(
            "bad",
            "Bad",
            (-80.0, 42.0, -84.0, 38.0),
            RegionType::Area,
            None,
            false,
        );
        assert!(err.is_err());
    }

    #[test]
    fn test_region_type_serde_values() {
        assert_eq!(
            serde_json::to_string(&RegionType::UsaState).unwrap(),
            "\"USA_STATE\""
        );
        let parsed: RegionType = serde_json::from_str("\"COUNTRY\"").unwrap();
        assert_eq!(parsed, RegionType::Country);
        // A fourth value is a defect, not a default.
        assert!(serde_json::from_str::<RegionType>("\"CONTINENT\"").is_err());
    }
}
