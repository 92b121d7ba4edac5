use std::fmt::{Display, Formatter};

use approx::{AbsDiffEq, RelativeEq, abs_diff_eq, relative_eq};
use thiserror::Error;

use crate::measure::Degrees;

#[derive(Error, Debug)]
pub enum TypeError {
    #[error("geographic point invariant: invalid value {1:?} for {0:?}")]
    GeoPointInvariant(GeoPointDimension, Degrees<f64>),
}

type Result<T> = std::result::Result<T, TypeError>;

/// A point on the surface of the Earth.
///
/// Enforces valid latitude and longitude values as type invariants.
#[derive(Clone, Copy, PartialEq, Debug)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct GeoPoint {
    lat: Degrees<f64>,
    lng: Degrees<f64>,
}

#[derive(Debug)]
pub enum GeoPointDimension {
    Latitude,
    Longitude,
}

impl GeoPoint {
    pub fn new(lat: Degrees<f64>, lng: Degrees<f64>) -> Result<GeoPoint> {
        if !lat.0.is_finite() || lat.0 < -90.0 || lat.0 > 90.0 {
            return Err(TypeError::GeoPointInvariant(
                GeoPointDimension::Latitude,
                lat,
            ));
        }
        if !lng.0.is_finite() || lng.0 < -180.0 || lng.0 > 180.0 {
            return Err(TypeError::GeoPointInvariant(
                GeoPointDimension::Longitude,
                lng,
            ));
        }
        Ok(Self { lat, lng })
    }

    /// Get point latitude
    pub fn lat(&self) -> Degrees<f64> {
        self.lat
    }

    /// Get point longitude
    pub fn lng(&self) -> Degrees<f64> {
        self.lng
    }
}

impl Default for GeoPoint {
    fn default() -> GeoPoint {
        GeoPoint {
            lat: Degrees(0.0),
            lng: Degrees(0.0),
        }
    }
}

impl Display for GeoPoint {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:.6}, {:.6}", self.lat.0, self.lng.0)
    }
}

impl AbsDiffEq for GeoPoint {
    type Epsilon = f64;

    fn default_epsilon() -> Self::Epsilon {
        f64::EPSILON
    }

    fn abs_diff_eq(&self, other: &Self, epsilon: Self::Epsilon) -> bool {
        abs_diff_eq!(self.lat.0, other.lat.0, epsilon = epsilon)
            && abs_diff_eq!(self.lng.0, other.lng.0, epsilon = epsilon)
    }
}

impl RelativeEq for GeoPoint {
    fn default_max_relative() -> Self::Epsilon {
        0.000_000_000_000_001
    }

    fn relative_eq(
        &self,
        other: &Self,
        epsilon: Self::Epsilon,
        max_relative: Self::Epsilon,
    ) -> bool {
        relative_eq!(
            self.lat.0,
            other.lat.0,
            epsilon = epsilon,
            max_relative = max_relative
        ) && relative_eq!(
            self.lng.0,
            other.lng.0,
            epsilon = epsilon,
            max_relative = max_relative
        )
    }
}

/// Anything that has a position on the Earth's surface.
pub trait HasGeoPoint {
    fn geo(&self) -> &GeoPoint;
}

impl HasGeoPoint for GeoPoint {
    fn geo(&self) -> &GeoPoint {
        self
    }
}

impl HasGeoPoint for Waypoint {
    fn geo(&self) -> &GeoPoint {
        &self.point
    }
}

/// Stable identity of a waypoint.
///
/// Assigned once when the waypoint is created and never reused within a
/// store, unlike the waypoint's `order`, which changes on every reorder or
/// deletion.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Debug)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct WaypointId(pub(crate) u64);

impl WaypointId {
    pub fn get(self) -> u64 {
        self.0
    }
}

impl Display for WaypointId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "wp#{}", self.0)
    }
}

/// Where a waypoint's display name came from.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub enum NameSource {
    /// The temporary `"Stop {order}"` label given at creation.
    Placeholder,
    /// Filled in by reverse geocoding, possibly with the fallback label.
    Geocoded,
    /// Typed in by the operator. Geocoding results never overwrite these.
    Manual,
}

/// Operator-editable metadata attached to a stop.
#[derive(Clone, Default, PartialEq, Debug)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct StopDetails {
    /// Planned arrival time, free-form (e.g. `"09:30"`).
    pub arrival_time: Option<String>,

    /// Notes for the stop.
    pub description: Option<String>,

    /// Minutes spent at the stop.
    pub stop_duration_minutes: u32,
}

/// A single stop of a tour route.
#[derive(Clone, PartialEq, Debug)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct Waypoint {
    pub(crate) id: WaypointId,
    pub(crate) point: GeoPoint,
    pub(crate) name: String,
    pub(crate) name_source: NameSource,
    pub(crate) order: usize,
    pub(crate) details: StopDetails,
}

impl Waypoint {
    pub fn id(&self) -> WaypointId {
        self.id
    }

    pub fn point(&self) -> GeoPoint {
        self.point
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn name_source(&self) -> NameSource {
        self.name_source
    }

    /// One-based position of the waypoint within its route.
    pub fn order(&self) -> usize {
        self.order
    }

    pub fn details(&self) -> &StopDetails {
        &self.details
    }

    pub fn arrival_time(&self) -> Option<&str> {
        self.details.arrival_time.as_deref()
    }

    pub fn description(&self) -> Option<&str> {
        self.details.description.as_deref()
    }

    pub fn stop_duration_minutes(&self) -> u32 {
        self.details.stop_duration_minutes
    }
}

/// Instantiate a `GeoPoint` with a tuple-like syntax.
#[macro_export]
macro_rules! geo_point {
    ( $lat:expr, $lng:expr ) => {
        $crate::types::GeoPoint::new(
            $crate::measure::Degrees($lat),
            $crate::measure::Degrees($lng),
        )?
    };
}

/// Instantiate a vec of `GeoPoint` with tuple-like syntax.
#[macro_export]
macro_rules! geo_points {
    ( $( ( $lat:expr, $lng:expr $(,)? ) ),* $(,)? ) => {
        vec![ $( $crate::geo_point!($lat, $lng) ),* ]
    };
}
