//! Route distance and path geometry
//!
//! Distances are great-circle distances on a spherical Earth, computed with
//! the haversine formula. That is accurate to within about half a percent,
//! which is plenty for showing an operator how long a tour is.
//!
//! All functions here operate on anything implementing [`HasGeoPoint`], so
//! they work the same on bare [`GeoPoint`]s and on stored waypoints.

use tracing::instrument;

use crate::measure::{Degrees, Kilometers, Radians};
use crate::types::{GeoPoint, HasGeoPoint};

/// Mean radius of the Earth.
pub const EARTH_RADIUS: Kilometers<f64> = Kilometers(6371.0);

/// Great-circle distance between two points.
pub fn haversine(point1: &GeoPoint, point2: &GeoPoint) -> Kilometers<f64> {
    let lat1: Radians<f64> = point1.lat().into();
    let lat2: Radians<f64> = point2.lat().into();
    let dlat: Radians<f64> = (point2.lat() - point1.lat()).into();
    let dlng: Radians<f64> = (point2.lng() - point1.lng()).into();

    let a = (dlat / 2.0).sin().powi(2) + lat1.cos() * lat2.cos() * (dlng / 2.0).sin().powi(2);
    EARTH_RADIUS * (2.0 * a.sqrt().atan2((1.0 - a).sqrt()))
}

/// Distances of each leg of the route, in route order.
///
/// A route of `N` points has `N - 1` legs.
pub fn leg_distances<P: HasGeoPoint>(points: &[P]) -> Vec<Kilometers<f64>> {
    points
        .windows(2)
        .map(|pair| haversine(pair[0].geo(), pair[1].geo()))
        .collect()
}

/// Total length of the route, following the points in order.
///
/// Zero for routes with fewer than two points.
#[instrument(level = "trace", skip_all)]
pub fn total_distance<P: HasGeoPoint>(points: &[P]) -> Kilometers<f64> {
    points
        .windows(2)
        .map(|pair| haversine(pair[0].geo(), pair[1].geo()))
        .sum()
}

/// Distance along the route at which each point is reached.
///
/// The first point is at zero; the last is at [`total_distance`].
pub fn cumulative_distances<P: HasGeoPoint>(points: &[P]) -> Vec<Kilometers<f64>> {
    let mut cumulative_distance = Kilometers(0.0);
    let mut result = Vec::with_capacity(points.len());
    if !points.is_empty() {
        result.push(cumulative_distance);
    }
    for leg in leg_distances(points) {
        cumulative_distance += leg;
        result.push(cumulative_distance);
    }
    result
}

/// The coordinates of the line connecting the route's points.
///
/// Empty for routes with fewer than two points, since there is nothing to
/// connect.
pub fn path_points<P: HasGeoPoint>(points: &[P]) -> Vec<GeoPoint> {
    if points.len() < 2 {
        return Vec::new();
    }
    points.iter().map(|p| *p.geo()).collect()
}

/// An axis-aligned latitude/longitude box.
#[derive(Clone, Copy, PartialEq, Debug)]
pub struct Bounds {
    pub south: Degrees<f64>,
    pub west: Degrees<f64>,
    pub north: Degrees<f64>,
    pub east: Degrees<f64>,
}

impl Bounds {
    /// Midpoint of the box, for centering the map camera.
    pub fn center(&self) -> (Degrees<f64>, Degrees<f64>) {
        (
            (self.south + self.north) / 2.0,
            (self.west + self.east) / 2.0,
        )
    }
}

/// Smallest box containing every point, or `None` for an empty route.
///
/// Does not attempt to handle routes crossing the antimeridian.
pub fn bounds<P: HasGeoPoint>(points: &[P]) -> Option<Bounds> {
    let first = points.first()?.geo();
    let init = Bounds {
        south: first.lat(),
        west: first.lng(),
        north: first.lat(),
        east: first.lng(),
    };
    Some(points.iter().skip(1).fold(init, |b, p| {
        let p = p.geo();
        Bounds {
            south: if p.lat() < b.south { p.lat() } else { b.south },
            west: if p.lng() < b.west { p.lng() } else { b.west },
            north: if p.lat() > b.north { p.lat() } else { b.north },
            east: if p.lng() > b.east { p.lng() } else { b.east },
        }
    }))
}
