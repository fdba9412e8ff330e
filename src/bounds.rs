use crate::Error;
use serde::{Deserialize, Serialize};

/// A geographic bounding box in WGS84 degrees.
///
/// Always satisfies west < east and south < north (no date-line wrapping, no
/// degenerate boxes). Constructed through [`GeoBounds::new`] which enforces
/// this.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoBounds {
    pub west: f64,
    pub south: f64,
    pub east: f64,
    pub north: f64,
}

impl GeoBounds {
    pub fn new(west: f64, south: f64, east: f64, north: f64) -> Result<GeoBounds, Error> {
        let b = GeoBounds {
            west,
            south,
            east,
            north,
        };
        b.validate()?;
        Ok(b)
    }

    fn validate(&self) -> Result<(), Error> {
        let values = [self.west, self.south, self.east, self.north];
        if values.iter().any(|v| !v.is_finite()) {
            return Err(Error::InvalidRegion(format!(
                "non-finite bounds: {:?}",
                self
            )));
        }
        if self.west >= self.east || self.south >= self.north {
            return Err(Error::InvalidRegion(format!(
                "degenerate bounds (need west<east, south<north): {:?}",
                self
            )));
        }
        if self.west < -180.0 || self.east > 180.0 || self.south < -90.0 || self.north > 90.0 {
            return Err(Error::InvalidRegion(format!(
                "bounds outside WGS84 range: {:?}",
                self
            )));
        }
        Ok(())
    }

    pub fn width_degrees(&self) -> f64 {
        self.east - self.west
    }

    pub fn height_degrees(&self) -> f64 {
        self.north - self.south
    }

    pub fn center_lat(&self) -> f64 {
        (self.south + self.north) / 2.0
    }

    pub fn center_lon(&self) -> f64 {
        (self.west + self.east) / 2.0
    }

    /// True if `other` lies entirely inside (or on the edge of) `self`.
    pub fn contains(&self, other: &GeoBounds) -> bool {
        self.west <= other.west
            && self.south <= other.south
            && self.east >= other.east
            && self.north >= other.north
    }
}

impl std::fmt::Display for GeoBounds {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "[{:.4}, {:.4}, {:.4}, {:.4}]",
            self.west, self.south, self.east, self.north
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_rejects_degenerate() {
        assert!(GeoBounds::new(10.0, 5.0, 10.0, 6.0).is_err());
        assert!(GeoBounds::new(10.0, 6.0, 11.0, 6.0).is_err());
        assert!(GeoBounds::new(11.0, 5.0, 10.0, 6.0).is_err());
    }

    #[test]
    fn test_new_rejects_out_of_range() {
        assert!(GeoBounds::new(-181.0, 5.0, 10.0, 6.0).is_err());
        assert!(GeoBounds::new(10.0, 5.0, 10.5, 91.0).is_err());
        assert!(GeoBounds::new(f64::NAN, 5.0, 10.0, 6.0).is_err());
    }

    #[test]
    fn test_contains() {
        let outer = GeoBounds::new(-85.0, 38.0, -80.0, 42.0).unwrap();
        let inner = GeoBounds::new(-84.0, 39.0, -81.0, 41.0).unwrap();
        assert!(outer.contains(&inner));
        assert!(!inner.contains(&outer));
        assert!(outer.contains(&outer));
    }
}
