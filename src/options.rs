use std::time::Duration;

use crate::geocode::{DEFAULT_GEOCODE_WORKERS, DEFAULT_PLACEHOLDER_NAME, RetryPolicy};
use crate::panel::SettleThresholds;
use crate::reorder::LiftStyle;

/// Options for a [`RouteBuilder`](crate::session::RouteBuilder) session.
#[derive(Clone, Debug)]
pub struct RouteBuilderOptions {
    /// Retry policy for reverse geocoding.
    pub geocode_retry: RetryPolicy,

    /// How many lookups may run at once.
    pub geocode_workers: usize,

    /// Name used when reverse geocoding gives up.
    pub placeholder_name: String,

    /// How a released panel decides whether to open or close.
    pub settle: SettleThresholds,

    /// Look of a row lifted for reordering.
    pub lift: LiftStyle,

    /// Zoom level the map camera moves to when a point is tapped.
    pub camera_zoom: f64,

    /// Stop duration given to new waypoints.
    pub default_stop_duration_minutes: u32,
}

impl Default for RouteBuilderOptions {
    fn default() -> Self {
        Self {
            geocode_retry: RetryPolicy::default(),
            geocode_workers: DEFAULT_GEOCODE_WORKERS,
            placeholder_name: DEFAULT_PLACEHOLDER_NAME.to_owned(),
            settle: SettleThresholds::default(),
            lift: LiftStyle::default(),
            camera_zoom: 14.0,
            default_stop_duration_minutes: 0,
        }
    }
}

impl RouteBuilderOptions {
    pub fn with_geocode_attempts(mut self, attempts: u32) -> Self {
        self.geocode_retry.attempts = attempts;
        self
    }

    pub fn with_geocode_backoff(mut self, backoff: Duration) -> Self {
        self.geocode_retry.backoff = backoff;
        self
    }

    pub fn with_geocode_workers(mut self, workers: usize) -> Self {
        self.geocode_workers = workers;
        self
    }

    pub fn with_placeholder_name(mut self, name: String) -> Self {
        self.placeholder_name = name;
        self
    }

    pub fn with_settle_thresholds(mut self, settle: SettleThresholds) -> Self {
        self.settle = settle;
        self
    }

    pub fn with_lift_style(mut self, lift: LiftStyle) -> Self {
        self.lift = lift;
        self
    }

    pub fn with_camera_zoom(mut self, zoom: f64) -> Self {
        self.camera_zoom = zoom;
        self
    }

    pub fn with_default_stop_duration(mut self, minutes: u32) -> Self {
        self.default_stop_duration_minutes = minutes;
        self
    }
}
