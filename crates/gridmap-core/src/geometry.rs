use std::fmt;

use serde::{Deserialize, Serialize};

/// A 2D point in world coordinates (units of the owning coordinate system).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    pub fn distance_to(&self, other: &Point) -> f64 {
        ((self.x - other.x).powi(2) + (self.y - other.y).powi(2)).sqrt()
    }
}

/// Linear units of a coordinate system, used for scale computations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Units {
    Metres,
    Degrees,
    /// Unknown units; treated as metres.
    Unknown,
}

impl Units {
    /// Metres covered by one unit at the equator.
    pub fn metres_per_unit(&self) -> f64 {
        match self {
            // WGS84 equatorial circumference / 360
            Units::Degrees => 2.0 * std::f64::consts::PI * 6_378_137.0 / 360.0,
            Units::Metres | Units::Unknown => 1.0,
        }
    }
}

/// A coordinate reference system, identified by its authority code (e.g. `EPSG:4326`).
///
/// No reprojection is performed anywhere in gridmap: two systems are related
/// only if their codes match, or if either side is undefined.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CoordinateSystem {
    pub code: String,
    pub units: Units,
}

impl CoordinateSystem {
    pub fn new(code: &str, units: Units) -> Self {
        Self {
            code: code.to_string(),
            units,
        }
    }

    /// Geographic WGS84 (`EPSG:4326`).
    pub fn wgs84() -> Self {
        Self::new("EPSG:4326", Units::Degrees)
    }

    /// Spherical web mercator (`EPSG:3857`).
    pub fn web_mercator() -> Self {
        Self::new("EPSG:3857", Units::Metres)
    }

    /// A coordinate system with no authority, compatible with everything.
    pub fn undefined() -> Self {
        Self::new("", Units::Unknown)
    }

    pub fn is_undefined(&self) -> bool {
        self.code.is_empty()
    }

    pub fn is_compatible(&self, other: &CoordinateSystem) -> bool {
        self.is_undefined() || other.is_undefined() || self.code.eq_ignore_ascii_case(&other.code)
    }
}

impl Default for CoordinateSystem {
    fn default() -> Self {
        Self::undefined()
    }
}

impl fmt::Display for CoordinateSystem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_undefined() {
            write!(f, "<undefined>")
        } else {
            write!(f, "{}", self.code)
        }
    }
}

/// An axis-aligned world-space rectangle tagged with its coordinate system.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    pub min: Point,
    pub max: Point,
    #[serde(default)]
    pub crs: CoordinateSystem,
}

impl Envelope {
    /// Creates an envelope, normalizing the corner order.
    pub fn new(x1: f64, y1: f64, x2: f64, y2: f64, crs: CoordinateSystem) -> Self {
        Self {
            min: Point::new(x1.min(x2), y1.min(y2)),
            max: Point::new(x1.max(x2), y1.max(y2)),
            crs,
        }
    }

    pub fn from_points(points: &[Point], crs: CoordinateSystem) -> Option<Self> {
        if points.is_empty() {
            return None;
        }
        let mut min_x = f64::MAX;
        let mut min_y = f64::MAX;
        let mut max_x = f64::MIN;
        let mut max_y = f64::MIN;
        for p in points {
            min_x = min_x.min(p.x);
            min_y = min_y.min(p.y);
            max_x = max_x.max(p.x);
            max_y = max_y.max(p.y);
        }
        Some(Self {
            min: Point::new(min_x, min_y),
            max: Point::new(max_x, max_y),
            crs,
        })
    }

    pub fn width(&self) -> f64 {
        self.max.x - self.min.x
    }

    pub fn height(&self) -> f64 {
        self.max.y - self.min.y
    }

    pub fn center(&self) -> Point {
        Point::new(
            (self.min.x + self.max.x) / 2.0,
            (self.min.y + self.max.y) / 2.0,
        )
    }

    /// True when the envelope covers no area or has non-finite corners.
    pub fn is_empty(&self) -> bool {
        let finite = self.min.x.is_finite()
            && self.min.y.is_finite()
            && self.max.x.is_finite()
            && self.max.y.is_finite();
        !finite || self.width() <= 0.0 || self.height() <= 0.0
    }

    pub fn contains_point(&self, p: &Point) -> bool {
        p.x >= self.min.x && p.x <= self.max.x && p.y >= self.min.y && p.y <= self.max.y
    }

    pub fn intersects(&self, other: &Envelope) -> bool {
        self.min.x <= other.max.x
            && self.max.x >= other.min.x
            && self.min.y <= other.max.y
            && self.max.y >= other.min.y
    }

    /// Union of both envelopes, keeping this envelope's coordinate system.
    pub fn union(&self, other: &Envelope) -> Self {
        Self {
            min: Point::new(self.min.x.min(other.min.x), self.min.y.min(other.min.y)),
            max: Point::new(self.max.x.max(other.max.x), self.max.y.max(other.max.y)),
            crs: self.crs.clone(),
        }
    }
}

impl fmt::Display for Envelope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{}, {} : {}, {}] {}",
            self.min.x, self.min.y, self.max.x, self.max.y, self.crs
        )
    }
}

/// A pixel-space display rectangle anchored at the origin.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DisplayArea {
    pub width: u32,
    pub height: u32,
}

impl DisplayArea {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }
}
