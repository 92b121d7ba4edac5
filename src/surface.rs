//! Boundaries to the surfaces the route builder drives
//!
//! The route builder does not render anything itself. It reports what should
//! be shown to a [`MapSurface`] and a [`PanelView`], and hands the finished
//! route to a [`TourRepository`]. Implementations for tests and the CLI live
//! in [`crate::testonly`].

use thiserror::Error;

use crate::panel::PanelRender;
use crate::reorder::DragFeedback;
use crate::session::{FinalizedTour, SinglePointPrompt};
use crate::types::{GeoPoint, WaypointId};

/// The map on which the operator taps points.
///
/// Drawing a point with an identity that is already drawn replaces it.
pub trait MapSurface {
    fn draw_point(&mut self, id: WaypointId, point: &GeoPoint, label: &str);
    fn remove_point(&mut self, id: WaypointId);
    fn draw_path(&mut self, points: &[GeoPoint]);
    fn clear_path(&mut self);
    fn move_camera(&mut self, point: &GeoPoint, zoom: f64);
}

/// The panel listing the route's waypoints.
pub trait PanelView {
    /// Redraws the panel for its current state.
    fn render(&mut self, render: &PanelRender);

    /// Shows or clears the lifted look of a row being dragged.
    fn set_drag_feedback(&mut self, feedback: Option<DragFeedback>);

    /// Shows a short inline message, such as a prompt to add stops first.
    fn show_message(&mut self, message: &str);

    /// Shows or hides the single-point confirmation prompt.
    fn show_confirmation(&mut self, prompt: Option<&SinglePointPrompt>);
}

#[derive(Error, Debug)]
pub enum RepositoryError {
    #[error("tour repository rejected the tour: {0}")]
    Rejected(String),
    #[error("tour repository error")]
    Backend(#[from] Box<dyn std::error::Error + Send + Sync>),
}

/// Where confirmed tours go.
pub trait TourRepository {
    fn save(&mut self, tour: &FinalizedTour) -> Result<(), RepositoryError>;
}
