//! A library and CLI for planning tours on a map.
//!
//! An operator taps points on a map to build an ordered list of stops. Each
//! stop is drawn right away under a placeholder name while a reverse geocoding
//! lookup for a human-readable name runs in the background. Stops can be
//! reordered by dragging, deleted, renamed and annotated in a collapsible
//! panel, which also shows the great-circle length of the route. The finished
//! tour, or a single picked location, is handed to a repository for saving.
//!
//! See [`RouteBuilder`] for the main entry point into the library. It drives
//! a [`MapSurface`], a [`PanelView`] and a [`TourRepository`] supplied by the
//! caller, and resolves names with any [`ReverseGeocoder`].
//!
//! # Feature flags
//!
//! - `rayon` (default) runs geocoding lookups on a small rayon pool instead
//!   of a thread per lookup
//! - `serde` derives serialization for confirmed tours and address fixtures
//! - `cli` enables the additional dependencies needed by the CLI

pub mod geocode;
pub mod geometry;
pub mod measure;
pub mod options;
pub mod panel;
pub mod reorder;
pub mod session;
pub mod store;
pub mod surface;
pub mod testonly;
pub mod types;

pub use crate::geocode::{AddressCandidate, LookupError, RetryPolicy, ReverseGeocoder};
pub use crate::options::RouteBuilderOptions;
pub use crate::panel::{PanelEvent, PanelState};
pub use crate::session::{FinalizedTour, RouteBuilder, SelectionMode, SessionError};
pub use crate::store::{StoreError, WaypointStore};
pub use crate::surface::{MapSurface, PanelView, RepositoryError, TourRepository};
pub use crate::types::{GeoPoint, StopDetails, TypeError, Waypoint, WaypointId};
