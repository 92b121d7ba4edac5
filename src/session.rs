//! A route-building session
//!
//! [`RouteBuilder`] is the single owner of a session's state. It receives map
//! taps and panel gestures, applies them to the [`WaypointStore`], keeps the
//! map, the panel and the background geocoding in step with the store, and
//! finally hands the confirmed result to a [`TourRepository`].
//!
//! The session runs in one of two [`SelectionMode`]s, chosen when it is
//! created:
//!
//! - [`SelectionMode::MultiStop`] builds an ordered tour. Taps append stops,
//!   and the panel, reordering and the route line are all active.
//! - [`SelectionMode::SinglePoint`] picks one location, such as a meeting
//!   point. Each tap replaces the selection and shows a confirmation prompt;
//!   the panel and route line stay off.
//!
//! All mutation happens through `&mut self` on the owning thread. Geocoding
//! results computed in the background are only applied when the owner calls
//! [`RouteBuilder::process_completions`] or
//! [`RouteBuilder::wait_for_geocoding`].

use std::time::Duration;

use chrono::{DateTime, Utc};
use strum::{Display, EnumString};
use thiserror::Error;
use tracing::{debug, info, instrument, warn};

use crate::geocode::{GeocodeDispatcher, ResolvedName, Resolver, ReverseGeocoder};
use crate::geometry::{bounds, path_points, total_distance};
use crate::measure::{Degrees, Kilometers};
use crate::options::RouteBuilderOptions;
use crate::panel::{PanelEvent, PanelState, PanelStateMachine, Transition, summary_text};
use crate::reorder::{DragFeedback, ReorderController, ReorderOutcome, ReorderRequest};
use crate::store::{NameUpdate, StoreError, WaypointStore};
use crate::surface::{MapSurface, PanelView, RepositoryError, TourRepository};
use crate::types::{GeoPoint, StopDetails, TypeError, Waypoint, WaypointId};

/// Inline message shown when confirming with nothing selected.
pub const EMPTY_ROUTE_MESSAGE: &str = "Add at least one stop before confirming";

/// Inline message shown when the repository refuses a tour.
pub const SAVE_FAILED_MESSAGE: &str = "The tour could not be saved, please try again";

#[derive(Clone, Copy, PartialEq, Eq, Debug, Display, EnumString)]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub enum SelectionMode {
    MultiStop,
    SinglePoint,
}

#[derive(Error, Debug)]
pub enum SessionError {
    #[error("nothing has been selected to confirm")]
    EmptyRouteConfirm,
    #[error("operation is not available in {0} mode")]
    NotInMode(SelectionMode),
    #[error("the session has already been confirmed")]
    Finished,
    #[error("waypoint store error")]
    Store(#[from] StoreError),
    #[error("core type error")]
    Type(#[from] TypeError),
    #[error("tour repository error")]
    Repository(#[from] RepositoryError),
}

type Result<T> = std::result::Result<T, SessionError>;

/// The confirmation prompt shown for a single-point selection.
#[derive(Clone, PartialEq, Debug)]
pub struct SinglePointPrompt {
    pub id: WaypointId,
    pub name: String,
    pub point: GeoPoint,

    /// Whether a better name may still arrive from geocoding.
    pub resolving: bool,
}

/// A confirmed selection, as handed to the [`TourRepository`].
#[derive(Clone, PartialEq, Debug)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
#[cfg_attr(feature = "serde", serde(tag = "mode", rename_all = "snake_case"))]
pub enum FinalizedTour {
    MultiStop {
        waypoints: Vec<Waypoint>,
        total_distance: Kilometers<f64>,
        confirmed_at: DateTime<Utc>,
    },
    SinglePoint {
        waypoint: Waypoint,
        confirmed_at: DateTime<Utc>,
    },
}

impl FinalizedTour {
    pub fn waypoints(&self) -> &[Waypoint] {
        match self {
            FinalizedTour::MultiStop { waypoints, .. } => waypoints,
            FinalizedTour::SinglePoint { waypoint, .. } => std::slice::from_ref(waypoint),
        }
    }

    pub fn confirmed_at(&self) -> DateTime<Utc> {
        match self {
            FinalizedTour::MultiStop { confirmed_at, .. }
            | FinalizedTour::SinglePoint { confirmed_at, .. } => *confirmed_at,
        }
    }
}

pub struct RouteBuilder<M, P, R>
where
    M: MapSurface,
    P: PanelView,
    R: TourRepository,
{
    mode: SelectionMode,
    options: RouteBuilderOptions,
    store: WaypointStore,
    geocoding: GeocodeDispatcher,
    panel: PanelStateMachine,
    reorder: ReorderController,
    prompt: Option<SinglePointPrompt>,
    finished: bool,
    map: M,
    view: P,
    repository: R,
}

impl<M, P, R> RouteBuilder<M, P, R>
where
    M: MapSurface,
    P: PanelView,
    R: TourRepository,
{
    pub fn new<G>(
        mode: SelectionMode,
        geocoder: G,
        map: M,
        view: P,
        repository: R,
        options: RouteBuilderOptions,
    ) -> Self
    where
        G: ReverseGeocoder + 'static,
    {
        let resolver = Resolver::new(geocoder)
            .with_retry(options.geocode_retry)
            .with_placeholder(options.placeholder_name.clone());
        let mut builder = Self {
            mode,
            store: WaypointStore::new()
                .with_default_stop_duration(options.default_stop_duration_minutes),
            geocoding: GeocodeDispatcher::with_workers(resolver, options.geocode_workers),
            panel: PanelStateMachine::new(options.settle),
            reorder: ReorderController::new(options.lift),
            prompt: None,
            finished: false,
            options,
            map,
            view,
            repository,
        };
        debug!("Starting {} session", mode);
        builder.refresh_panel();
        builder
    }

    pub fn mode(&self) -> SelectionMode {
        self.mode
    }

    pub fn store(&self) -> &WaypointStore {
        &self.store
    }

    /// The waypoints in route order.
    pub fn waypoints(&self) -> &[Waypoint] {
        self.store.waypoints()
    }

    pub fn total_distance(&self) -> Kilometers<f64> {
        total_distance(self.store.waypoints())
    }

    pub fn path_points(&self) -> Vec<GeoPoint> {
        path_points(self.store.waypoints())
    }

    /// One-line route summary, as shown in the collapsed panel.
    pub fn summary(&self) -> String {
        summary_text(self.store.waypoints())
    }

    pub fn panel_state(&self) -> PanelState {
        self.panel.state()
    }

    pub fn prompt(&self) -> Option<&SinglePointPrompt> {
        self.prompt.as_ref()
    }

    pub fn is_finished(&self) -> bool {
        self.finished
    }

    pub fn pending_geocoding(&self) -> usize {
        self.geocoding.pending_count()
    }

    pub fn map(&self) -> &M {
        &self.map
    }

    pub fn view(&self) -> &P {
        &self.view
    }

    pub fn repository(&self) -> &R {
        &self.repository
    }

    /// Handles a tap on the map at the given coordinates.
    ///
    /// Returns the identity of the waypoint created for the tap. The waypoint
    /// starts out with a placeholder name, and a lookup for a better one is
    /// started in the background.
    #[instrument(level = "trace", skip(self))]
    pub fn tap_at(&mut self, lat: f64, lng: f64) -> Result<WaypointId> {
        self.ensure_active()?;
        let point = GeoPoint::new(Degrees(lat), Degrees(lng))?;
        let id = match self.mode {
            SelectionMode::MultiStop => {
                let was_empty = self.store.is_empty();
                let id = self.store.add(point);
                if was_empty {
                    self.panel.handle(PanelEvent::FirstWaypointAdded);
                }
                id
            }
            SelectionMode::SinglePoint => {
                let (id, previous) = self.store.replace_single(point)?;
                if let Some(previous) = previous {
                    self.geocoding.forget(previous.id());
                    self.map.remove_point(previous.id());
                }
                id
            }
        };
        self.geocoding.dispatch(id, point);
        self.map.move_camera(&point, self.options.camera_zoom);
        self.sync_map();
        self.refresh_panel();
        if self.mode == SelectionMode::SinglePoint {
            self.show_prompt_for(id);
        }
        Ok(id)
    }

    /// Deletes the stop at `index`.
    ///
    /// An out-of-range index leaves the route untouched.
    pub fn remove_at(&mut self, index: usize) -> Result<Waypoint> {
        self.ensure_mode(SelectionMode::MultiStop)?;
        self.ensure_active()?;
        let removed = self.store.remove_at(index).inspect_err(|e| {
            warn!("Ignoring delete: {}", e);
        })?;
        self.cancel_drag();
        self.geocoding.forget(removed.id());
        self.map.remove_point(removed.id());
        self.sync_map();
        self.refresh_panel();
        Ok(removed)
    }

    /// Deletes the stop with identity `id`.
    pub fn remove(&mut self, id: WaypointId) -> Result<Waypoint> {
        let index = self
            .store
            .index_of(id)
            .ok_or(SessionError::Store(StoreError::UnknownWaypoint(id)))?;
        self.remove_at(index)
    }

    /// Deletes every stop and collapses the panel.
    pub fn clear_all(&mut self) -> Result<()> {
        self.ensure_mode(SelectionMode::MultiStop)?;
        self.ensure_active()?;
        self.cancel_drag();
        for id in self.store.clear_all() {
            self.geocoding.forget(id);
            self.map.remove_point(id);
        }
        self.map.clear_path();
        self.panel.handle(PanelEvent::RouteCleared);
        self.refresh_panel();
        Ok(())
    }

    /// Starts dragging the row at `index`.
    pub fn drag_started(&mut self, index: usize) -> Result<DragFeedback> {
        self.ensure_mode(SelectionMode::MultiStop)?;
        self.ensure_active()?;
        let feedback = self
            .reorder
            .begin(index, self.store.len())
            .inspect_err(|e| warn!("Ignoring drag: {}", e))?;
        self.view.set_drag_feedback(Some(feedback));
        Ok(feedback)
    }

    /// Follows the dragged row over position `index`. Does not change the
    /// route.
    pub fn drag_moved(&mut self, index: usize) -> Option<DragFeedback> {
        let feedback = self.reorder.hover(index, self.store.len())?;
        self.view.set_drag_feedback(Some(feedback));
        Some(feedback)
    }

    /// Drops the dragged row at `index`, reordering the route in one step.
    pub fn drag_ended(&mut self, index: usize) -> Result<ReorderOutcome> {
        self.ensure_mode(SelectionMode::MultiStop)?;
        self.ensure_active()?;
        let outcome = self.reorder.drop_at(index, &mut self.store);
        self.view.set_drag_feedback(None);
        let outcome = outcome.inspect_err(|e| warn!("Ignoring drop: {}", e))?;
        if let ReorderOutcome::Moved(_) = outcome {
            self.sync_map();
            self.refresh_panel();
        }
        Ok(outcome)
    }

    /// Abandons the drag in progress.
    pub fn drag_cancelled(&mut self) {
        self.cancel_drag();
    }

    fn cancel_drag(&mut self) {
        if self.reorder.cancel() {
            self.view.set_drag_feedback(None);
        }
    }

    /// Applies a complete reorder request, as reported by a panel that
    /// tracks drags itself. Abandons any drag in progress.
    pub fn reorder(&mut self, request: ReorderRequest) -> Result<ReorderOutcome> {
        self.ensure_mode(SelectionMode::MultiStop)?;
        self.ensure_active()?;
        self.cancel_drag();
        let outcome = self
            .reorder
            .apply(request, &mut self.store)
            .inspect_err(|e| warn!("Ignoring reorder: {}", e))?;
        if let ReorderOutcome::Moved(_) = outcome {
            self.sync_map();
            self.refresh_panel();
        }
        Ok(outcome)
    }

    /// Passes a gesture on the panel to its state machine.
    ///
    /// Ignored in single-point mode, where the panel is disabled.
    pub fn panel_event(&mut self, event: PanelEvent) -> Option<Transition> {
        if self.mode != SelectionMode::MultiStop {
            return None;
        }
        let transition = self.panel.handle(event)?;
        self.refresh_panel();
        Some(transition)
    }

    /// Renames a stop by hand. Later geocoding results will not replace the
    /// name.
    pub fn rename(&mut self, id: WaypointId, name: String) -> Result<()> {
        self.ensure_active()?;
        self.store.rename(id, name)?;
        self.after_name_change(id);
        Ok(())
    }

    /// Sets the arrival time, description and duration of a stop.
    pub fn update_details(&mut self, id: WaypointId, details: StopDetails) -> Result<()> {
        self.ensure_mode(SelectionMode::MultiStop)?;
        self.ensure_active()?;
        self.store.update_details(id, details)?;
        self.refresh_panel();
        Ok(())
    }

    /// Applies any geocoding results that have arrived, without blocking.
    ///
    /// Returns how many waypoints were renamed.
    pub fn process_completions(&mut self) -> usize {
        let completions = self.geocoding.drain();
        self.apply_completions(completions)
    }

    /// Waits up to `timeout` for outstanding geocoding, applying results as
    /// they arrive.
    ///
    /// Returns how many waypoints were renamed.
    pub fn wait_for_geocoding(&mut self, timeout: Duration) -> usize {
        let completions = self.geocoding.wait(timeout);
        self.apply_completions(completions)
    }

    /// Moves the camera to take in the whole route.
    pub fn fit_route(&mut self) {
        let Some(b) = bounds(self.store.waypoints()) else {
            return;
        };
        let (lat, lng) = b.center();
        let Ok(center) = GeoPoint::new(lat, lng) else {
            return;
        };
        let span = (b.north - b.south).0.max((b.east - b.west).0);
        let zoom = if span > 0.0 {
            (360.0 / span).log2().clamp(1.0, self.options.camera_zoom)
        } else {
            self.options.camera_zoom
        };
        self.map.move_camera(&center, zoom);
    }

    /// Hides the single-point prompt so the operator can tap again.
    pub fn dismiss_prompt(&mut self) -> Result<()> {
        self.ensure_mode(SelectionMode::SinglePoint)?;
        self.prompt = None;
        self.view.show_confirmation(None);
        Ok(())
    }

    /// Shows the single-point prompt again for the current selection.
    pub fn reopen_prompt(&mut self) -> Result<()> {
        self.ensure_mode(SelectionMode::SinglePoint)?;
        self.ensure_active()?;
        let id = self
            .store
            .waypoints()
            .first()
            .map(|w| w.id())
            .ok_or(SessionError::EmptyRouteConfirm)?;
        self.show_prompt_for(id);
        Ok(())
    }

    /// Finalizes the session and hands the result to the repository.
    ///
    /// Fails with [`SessionError::EmptyRouteConfirm`], after showing an inline
    /// message, if there is nothing to confirm. If the repository refuses the
    /// tour the session stays open so the operator can try again.
    #[instrument(level = "debug", skip_all)]
    pub fn confirm(&mut self) -> Result<FinalizedTour> {
        self.ensure_active()?;
        let confirmed_at = Utc::now();
        let tour = match self.mode {
            SelectionMode::MultiStop if !self.store.is_empty() => FinalizedTour::MultiStop {
                waypoints: self.store.waypoints().to_vec(),
                total_distance: self.total_distance(),
                confirmed_at,
            },
            SelectionMode::SinglePoint if self.store.len() == 1 => FinalizedTour::SinglePoint {
                waypoint: self.store.waypoints()[0].clone(),
                confirmed_at,
            },
            _ => {
                self.view.show_message(EMPTY_ROUTE_MESSAGE);
                return Err(SessionError::EmptyRouteConfirm);
            }
        };

        if let Err(e) = self.repository.save(&tour) {
            warn!("Saving tour failed: {}", e);
            self.view.show_message(SAVE_FAILED_MESSAGE);
            return Err(e.into());
        }

        self.finished = true;
        self.cancel_drag();
        self.geocoding.forget_all();
        if self.prompt.take().is_some() {
            self.view.show_confirmation(None);
        }
        info!(
            "Confirmed {} selection with {} stops over {:.1}",
            self.mode,
            tour.waypoints().len(),
            total_distance(tour.waypoints())
        );
        Ok(tour)
    }

    /// Accepts the single-point selection. Same as [`RouteBuilder::confirm`].
    pub fn accept(&mut self) -> Result<FinalizedTour> {
        self.ensure_mode(SelectionMode::SinglePoint)?;
        self.confirm()
    }

    fn apply_completions(&mut self, completions: Vec<ResolvedName>) -> usize {
        let mut applied = 0;
        for ResolvedName { id, name } in completions {
            match self.store.apply_resolved_name(id, name) {
                NameUpdate::Applied => {
                    applied += 1;
                    self.after_name_change(id);
                }
                NameUpdate::Pinned if self.prompt.as_ref().is_some_and(|p| p.id == id) => {
                    self.show_prompt_for(id);
                }
                NameUpdate::Pinned | NameUpdate::Dropped => {}
            }
        }
        applied
    }

    fn after_name_change(&mut self, id: WaypointId) {
        if let Some(waypoint) = self.store.get(id) {
            let label = self.label(waypoint);
            self.map.draw_point(id, &waypoint.point(), &label);
        }
        if self.prompt.as_ref().is_some_and(|p| p.id == id) {
            self.show_prompt_for(id);
        }
        self.refresh_panel();
    }

    fn show_prompt_for(&mut self, id: WaypointId) {
        let Some(waypoint) = self.store.get(id) else {
            return;
        };
        let prompt = SinglePointPrompt {
            id,
            name: waypoint.name().to_owned(),
            point: waypoint.point(),
            resolving: self.geocoding.is_pending(id),
        };
        self.view.show_confirmation(Some(&prompt));
        self.prompt = Some(prompt);
    }

    fn label(&self, waypoint: &Waypoint) -> String {
        match self.mode {
            SelectionMode::MultiStop => format!("{}. {}", waypoint.order(), waypoint.name()),
            SelectionMode::SinglePoint => waypoint.name().to_owned(),
        }
    }

    fn sync_map(&mut self) {
        for waypoint in self.store.waypoints() {
            let label = self.label(waypoint);
            self.map.draw_point(waypoint.id(), &waypoint.point(), &label);
        }
        if self.mode != SelectionMode::MultiStop {
            return;
        }
        let path = path_points(self.store.waypoints());
        if path.is_empty() {
            self.map.clear_path();
        } else {
            self.map.draw_path(&path);
        }
    }

    fn refresh_panel(&mut self) {
        if self.mode != SelectionMode::MultiStop {
            return;
        }
        let render = self.panel.render(self.store.waypoints());
        self.view.render(&render);
    }

    fn ensure_mode(&self, mode: SelectionMode) -> Result<()> {
        if self.mode != mode {
            return Err(SessionError::NotInMode(self.mode));
        }
        Ok(())
    }

    fn ensure_active(&self) -> Result<()> {
        if self.finished {
            return Err(SessionError::Finished);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::str::FromStr;
    use std::sync::mpsc::{self, Receiver, Sender};
    use std::sync::{Arc, Mutex};
    use std::time::{Duration, Instant};

    use anyhow::Result;
    use approx::assert_relative_eq;

    use super::*;
    use crate::geocode::{AddressCandidate, LookupError};
    use crate::measure::Meters;
    use crate::panel::{PanelContent, Release};
    use crate::testonly::{
        FixtureGeocoder, MemoryTourRepository, RecordingMap, RecordingPanel, ScriptedGeocoder,
        candidate,
    };

    type TestBuilder = RouteBuilder<RecordingMap, RecordingPanel, MemoryTourRepository>;

    const WAIT: Duration = Duration::from_secs(5);

    fn options() -> RouteBuilderOptions {
        RouteBuilderOptions::default().with_geocode_backoff(Duration::ZERO)
    }

    fn builder<G: ReverseGeocoder + 'static>(mode: SelectionMode, geocoder: G) -> TestBuilder {
        RouteBuilder::new(
            mode,
            geocoder,
            RecordingMap::default(),
            RecordingPanel::default(),
            MemoryTourRepository::default(),
            options(),
        )
    }

    fn places() -> Result<FixtureGeocoder> {
        Ok(FixtureGeocoder::new(Meters(5000.0))
            .with_place(
                crate::geo_point!(0.0, 0.0),
                candidate(None, Some("Alpha St"), None, None, None),
            )
            .with_place(
                crate::geo_point!(0.0, 1.0),
                candidate(None, Some("Bravo St"), None, None, None),
            )
            .with_place(
                crate::geo_point!(0.0, 2.0),
                candidate(None, Some("Charlie St"), None, None, None),
            ))
    }

    fn names(builder: &TestBuilder) -> Vec<String> {
        builder
            .waypoints()
            .iter()
            .map(|w| w.name().to_owned())
            .collect()
    }

    /// Holds every lookup until released.
    struct GatedGeocoder {
        gate: Mutex<Receiver<()>>,
    }

    impl GatedGeocoder {
        fn new() -> (Self, Sender<()>) {
            let (tx, rx) = mpsc::channel();
            (Self { gate: Mutex::new(rx) }, tx)
        }
    }

    impl ReverseGeocoder for GatedGeocoder {
        fn lookup(
            &self,
            _point: &GeoPoint,
        ) -> std::result::Result<Vec<AddressCandidate>, LookupError> {
            let gate = self.gate.lock().map_err(|_| LookupError::Unavailable("poisoned".into()))?;
            gate.recv_timeout(WAIT)
                .map_err(|_| LookupError::Unavailable("gate closed".into()))?;
            Ok(vec![candidate(None, Some("Late Ave"), None, None, None)])
        }
    }

    #[test]
    fn mode_names() -> Result<()> {
        assert_eq!(SelectionMode::MultiStop.to_string(), "MULTI_STOP");
        assert_eq!(
            SelectionMode::from_str("SINGLE_POINT")?,
            SelectionMode::SinglePoint
        );
        Ok(())
    }

    #[test]
    fn initial_render_shows_prompt() {
        let b = builder(SelectionMode::MultiStop, ScriptedGeocoder::empty());
        assert_eq!(
            b.view().last_render().map(|r| r.content.clone()),
            Some(PanelContent::Summary(crate::panel::EMPTY_ROUTE_PROMPT.to_owned()))
        );
    }

    #[test]
    fn tap_does_not_wait_for_geocoding() -> Result<()> {
        let (geocoder, release) = GatedGeocoder::new();
        let mut b = builder(SelectionMode::MultiStop, geocoder);

        let start = Instant::now();
        let id = b.tap_at(-12.0464, -77.0428)?;
        assert!(start.elapsed() < Duration::from_secs(1));
        assert_eq!(names(&b), vec!["Stop 1"]);
        assert_eq!(b.pending_geocoding(), 1);

        release.send(())?;
        assert_eq!(b.wait_for_geocoding(WAIT), 1);
        assert_eq!(b.store().get(id).map(|w| w.name()), Some("Late Ave"));
        Ok(())
    }

    #[test]
    fn first_tap_expands_panel() -> Result<()> {
        let mut b = builder(SelectionMode::MultiStop, ScriptedGeocoder::empty());
        assert_eq!(b.panel_state(), PanelState::Hidden);
        b.tap_at(1.0, 1.0)?;
        assert_eq!(b.panel_state(), PanelState::Expanded);

        b.panel_event(PanelEvent::CloseTapped);
        b.tap_at(1.0, 1.1)?;
        // Only the first stop opens the panel.
        assert_eq!(b.panel_state(), PanelState::Hidden);
        Ok(())
    }

    #[test]
    fn taps_draw_points_and_path() -> Result<()> {
        let mut b = builder(SelectionMode::MultiStop, places()?);
        let a = b.tap_at(0.0, 0.0)?;
        assert!(b.map().path.is_empty());
        let c = b.tap_at(0.0, 1.0)?;

        assert_eq!(b.map().path.len(), 2);
        assert_eq!(b.map().label(a), Some("1. Stop 1"));
        assert_eq!(b.map().label(c), Some("2. Stop 2"));
        assert_eq!(b.map().camera.map(|(p, _)| p), Some(crate::geo_point!(0.0, 1.0)));

        b.wait_for_geocoding(WAIT);
        assert_eq!(b.map().label(a), Some("1. Alpha St"));
        assert_eq!(b.map().label(c), Some("2. Bravo St"));
        Ok(())
    }

    #[test]
    fn invalid_tap_is_rejected() {
        let mut b = builder(SelectionMode::MultiStop, ScriptedGeocoder::empty());
        assert!(matches!(b.tap_at(91.0, 0.0), Err(SessionError::Type(_))));
        assert!(b.waypoints().is_empty());
    }

    #[test]
    fn names_survive_reorder_and_delete_in_flight() -> Result<()> {
        let mut b = builder(SelectionMode::MultiStop, places()?);
        let alpha = b.tap_at(0.0, 0.0)?;
        let bravo = b.tap_at(0.0, 1.0)?;
        let charlie = b.tap_at(0.0, 2.0)?;

        // Structural edits land before any lookup result is applied.
        b.reorder(ReorderRequest {
            source: 2,
            target: 0,
        })?;
        b.remove(bravo)?;
        b.wait_for_geocoding(WAIT);

        let ids = b.waypoints().iter().map(|w| w.id()).collect::<Vec<_>>();
        assert_eq!(ids, vec![charlie, alpha]);
        assert_eq!(names(&b), vec!["Charlie St", "Alpha St"]);
        assert_eq!(b.pending_geocoding(), 0);
        Ok(())
    }

    #[test]
    fn delete_renumbers_and_keeps_names() -> Result<()> {
        let mut b = builder(SelectionMode::MultiStop, places()?);
        b.tap_at(0.0, 0.0)?;
        let middle = b.tap_at(0.0, 1.0)?;
        b.tap_at(0.0, 2.0)?;
        b.wait_for_geocoding(WAIT);

        let removed = b.remove_at(1)?;
        assert_eq!(removed.id(), middle);
        assert_eq!(
            b.waypoints().iter().map(|w| w.order()).collect::<Vec<_>>(),
            vec![1, 2]
        );
        assert_eq!(names(&b), vec!["Alpha St", "Charlie St"]);
        assert!(!b.map().points.contains_key(&middle));
        Ok(())
    }

    #[test]
    fn invalid_delete_is_a_noop() -> Result<()> {
        let mut b = builder(SelectionMode::MultiStop, ScriptedGeocoder::empty());
        b.tap_at(1.0, 1.0)?;
        assert!(matches!(
            b.remove_at(3),
            Err(SessionError::Store(StoreError::InvalidIndex { index: 3, len: 1 }))
        ));
        assert_eq!(b.waypoints().len(), 1);
        Ok(())
    }

    #[test]
    fn drag_gesture_reorders_on_drop() -> Result<()> {
        let mut b = builder(SelectionMode::MultiStop, ScriptedGeocoder::empty());
        let ids = (0..4)
            .map(|i| b.tap_at(0.0, i as f64 * 0.1))
            .collect::<std::result::Result<Vec<_>, _>>()?;

        b.drag_started(3)?;
        b.drag_moved(2);
        b.drag_moved(1);
        assert_eq!(b.view().feedback.map(|f| f.hover), Some(1));
        // Nothing moves until the drop.
        assert_eq!(b.waypoints()[3].id(), ids[3]);

        b.drag_ended(1)?;
        assert!(b.view().feedback.is_none());
        let moved = b.waypoints().iter().map(|w| w.id()).collect::<Vec<_>>();
        assert_eq!(moved, vec![ids[0], ids[3], ids[1], ids[2]]);
        assert_eq!(
            b.waypoints().iter().map(|w| w.order()).collect::<Vec<_>>(),
            vec![1, 2, 3, 4]
        );
        assert_eq!(b.map().label(ids[3]), Some("2. Stop 4"));
        Ok(())
    }

    #[test]
    fn drag_cancel_clears_feedback() -> Result<()> {
        let mut b = builder(SelectionMode::MultiStop, ScriptedGeocoder::empty());
        b.tap_at(0.0, 0.0)?;
        b.tap_at(0.0, 0.1)?;
        b.drag_started(0)?;
        b.drag_cancelled();
        assert!(b.view().feedback.is_none());
        assert_eq!(b.drag_ended(1)?, ReorderOutcome::Unchanged);
        Ok(())
    }

    #[test]
    fn confirm_ends_drag_in_progress() -> Result<()> {
        let mut b = builder(SelectionMode::MultiStop, ScriptedGeocoder::empty());
        let ids = (0..3)
            .map(|i| b.tap_at(0.0, i as f64 * 0.1))
            .collect::<std::result::Result<Vec<_>, _>>()?;

        b.drag_started(2)?;
        let tour = b.confirm()?;
        assert!(b.view().feedback.is_none());
        assert!(matches!(b.drag_ended(0), Err(SessionError::Finished)));
        assert!(b.drag_moved(1).is_none());

        let kept = b.waypoints().iter().map(|w| w.id()).collect::<Vec<_>>();
        assert_eq!(kept, ids);
        assert_eq!(b.waypoints(), tour.waypoints());
        assert_eq!(b.repository().tours, vec![tour]);
        Ok(())
    }

    #[test]
    fn reorder_during_drag_ends_the_drag() -> Result<()> {
        let mut b = builder(SelectionMode::MultiStop, ScriptedGeocoder::empty());
        let ids = (0..3)
            .map(|i| b.tap_at(0.0, i as f64 * 0.1))
            .collect::<std::result::Result<Vec<_>, _>>()?;

        b.drag_started(0)?;
        b.reorder(ReorderRequest {
            source: 2,
            target: 0,
        })?;
        assert!(b.view().feedback.is_none());

        // The stale drag no longer moves whatever now sits at its old row.
        assert_eq!(b.drag_ended(2)?, ReorderOutcome::Unchanged);
        let order = b.waypoints().iter().map(|w| w.id()).collect::<Vec<_>>();
        assert_eq!(order, vec![ids[2], ids[0], ids[1]]);
        Ok(())
    }

    #[test]
    fn clear_all_hides_panel() -> Result<()> {
        let mut b = builder(SelectionMode::MultiStop, ScriptedGeocoder::empty());
        b.tap_at(0.0, 0.0)?;
        b.tap_at(0.0, 0.1)?;
        assert_eq!(b.panel_state(), PanelState::Expanded);

        b.clear_all()?;
        assert_eq!(b.panel_state(), PanelState::Hidden);
        assert!(b.waypoints().is_empty());
        assert!(b.map().points.is_empty());
        assert!(b.map().path.is_empty());
        assert_eq!(b.pending_geocoding(), 0);
        Ok(())
    }

    #[test]
    fn panel_gestures() -> Result<()> {
        let mut b = builder(SelectionMode::MultiStop, ScriptedGeocoder::empty());
        b.tap_at(0.0, 0.0)?;
        b.panel_event(PanelEvent::HandleDragStarted);
        b.panel_event(PanelEvent::HandleReleased(Release {
            position: 0.1,
            velocity: -100.0,
        }));
        assert_eq!(b.panel_state(), PanelState::Settling);
        b.panel_event(PanelEvent::SettleFinished);
        assert_eq!(b.panel_state(), PanelState::Hidden);
        let last = b.view().last_render().cloned();
        assert_eq!(
            last.map(|r| r.content),
            Some(PanelContent::Summary("1 stop – 0.0 km".to_owned()))
        );
        Ok(())
    }

    #[test]
    fn manual_rename_wins_over_geocoding() -> Result<()> {
        let (geocoder, release) = GatedGeocoder::new();
        let mut b = builder(SelectionMode::MultiStop, geocoder);
        let id = b.tap_at(0.0, 0.0)?;
        b.rename(id, "Meeting point".to_owned())?;
        assert_eq!(b.pending_geocoding(), 1);

        // The late result still arrives but does not replace the name.
        release.send(())?;
        assert_eq!(b.wait_for_geocoding(WAIT), 0);
        assert_eq!(b.pending_geocoding(), 0);
        assert_eq!(names(&b), vec!["Meeting point"]);
        assert_eq!(b.map().label(id), Some("1. Meeting point"));
        Ok(())
    }

    #[test]
    fn renamed_selection_stops_resolving() -> Result<()> {
        let (geocoder, release) = GatedGeocoder::new();
        let mut b = builder(SelectionMode::SinglePoint, geocoder);
        let id = b.tap_at(0.0, 0.0)?;
        b.rename(id, "Gate 3".to_owned())?;
        assert_eq!(b.prompt().map(|p| p.resolving), Some(true));

        release.send(())?;
        b.wait_for_geocoding(WAIT);
        let prompt = b.prompt().cloned().unwrap();
        assert_eq!(prompt.name, "Gate 3");
        assert!(!prompt.resolving);
        Ok(())
    }

    #[test]
    fn update_details_shows_in_panel() -> Result<()> {
        let mut b = builder(SelectionMode::MultiStop, ScriptedGeocoder::empty());
        let id = b.tap_at(0.0, 0.0)?;
        b.update_details(
            id,
            StopDetails {
                arrival_time: Some("09:00".to_owned()),
                description: None,
                stop_duration_minutes: 30,
            },
        )?;
        let Some(PanelContent::List(list)) = b.view().last_render().map(|r| r.content.clone())
        else {
            panic!("expected the waypoint list");
        };
        assert_eq!(list.total_stop_minutes, 30);
        Ok(())
    }

    #[test]
    fn confirm_empty_route() {
        let mut b = builder(SelectionMode::MultiStop, ScriptedGeocoder::empty());
        assert!(matches!(b.confirm(), Err(SessionError::EmptyRouteConfirm)));
        assert_eq!(b.view().messages, vec![EMPTY_ROUTE_MESSAGE.to_owned()]);
        assert!(!b.is_finished());
        assert!(b.repository().tours.is_empty());
    }

    #[test]
    fn confirm_multi_stop() -> Result<()> {
        let mut b = builder(SelectionMode::MultiStop, places()?);
        b.tap_at(0.0, 0.0)?;
        b.tap_at(0.0, 1.0)?;
        b.wait_for_geocoding(WAIT);

        let tour = b.confirm()?;
        let FinalizedTour::MultiStop {
            waypoints,
            total_distance,
            ..
        } = &tour
        else {
            panic!("expected a multi-stop tour");
        };
        assert_eq!(waypoints.len(), 2);
        assert_relative_eq!(*total_distance, b.total_distance());
        assert_eq!(b.repository().tours, vec![tour.clone()]);
        assert!(b.is_finished());
        assert!(matches!(b.tap_at(1.0, 1.0), Err(SessionError::Finished)));
        Ok(())
    }

    #[test]
    fn failed_save_keeps_session_open() -> Result<()> {
        let mut b = RouteBuilder::new(
            SelectionMode::MultiStop,
            ScriptedGeocoder::empty(),
            RecordingMap::default(),
            RecordingPanel::default(),
            MemoryTourRepository::failing(),
            options(),
        );
        b.tap_at(0.0, 0.0)?;
        assert!(matches!(b.confirm(), Err(SessionError::Repository(_))));
        assert!(!b.is_finished());
        assert_eq!(b.view().messages, vec![SAVE_FAILED_MESSAGE.to_owned()]);
        Ok(())
    }

    #[test]
    fn single_point_replaces_selection() -> Result<()> {
        let mut b = builder(SelectionMode::SinglePoint, places()?);
        let first = b.tap_at(0.0, 0.0)?;
        let second = b.tap_at(0.0, 2.0)?;

        assert_ne!(first, second);
        assert_eq!(b.waypoints().len(), 1);
        assert!(!b.map().points.contains_key(&first));
        assert!(b.map().path.is_empty());
        assert!(b.view().renders.is_empty());

        b.wait_for_geocoding(WAIT);
        let prompt = b.prompt().cloned().unwrap();
        assert_eq!(prompt.id, second);
        assert_eq!(prompt.name, "Charlie St");
        assert!(!prompt.resolving);
        assert_eq!(b.view().prompt.as_ref(), Some(&prompt));
        Ok(())
    }

    #[test]
    fn single_point_disables_route_features() -> Result<()> {
        let mut b = builder(SelectionMode::SinglePoint, ScriptedGeocoder::empty());
        b.tap_at(0.0, 0.0)?;
        assert!(b.panel_event(PanelEvent::SummaryTapped).is_none());
        assert!(matches!(
            b.drag_started(0),
            Err(SessionError::NotInMode(SelectionMode::SinglePoint))
        ));
        assert!(matches!(b.clear_all(), Err(SessionError::NotInMode(_))));
        Ok(())
    }

    #[test]
    fn single_point_dismiss_and_retap() -> Result<()> {
        let mut b = builder(SelectionMode::SinglePoint, places()?);
        b.tap_at(0.0, 0.0)?;
        b.dismiss_prompt()?;
        assert!(b.prompt().is_none());
        assert!(b.view().prompt.is_none());

        b.tap_at(0.0, 1.0)?;
        b.wait_for_geocoding(WAIT);
        let tour = b.accept()?;
        let FinalizedTour::SinglePoint { waypoint, .. } = tour else {
            panic!("expected a single point");
        };
        assert_eq!(waypoint.name(), "Bravo St");
        assert!(b.is_finished());
        assert!(b.view().prompt.is_none());
        Ok(())
    }

    #[test]
    fn single_point_confirm_without_selection() {
        let mut b = builder(SelectionMode::SinglePoint, ScriptedGeocoder::empty());
        assert!(matches!(b.accept(), Err(SessionError::EmptyRouteConfirm)));
        assert!(matches!(
            b.reopen_prompt(),
            Err(SessionError::EmptyRouteConfirm)
        ));
    }

    #[test]
    fn fit_route_centers_camera() -> Result<()> {
        let mut b = builder(SelectionMode::MultiStop, ScriptedGeocoder::empty());
        b.tap_at(-12.0, -77.0)?;
        b.tap_at(-13.0, -72.0)?;
        b.fit_route();
        let (center, zoom) = b.map().camera.unwrap();
        assert_relative_eq!(center, crate::geo_point!(-12.5, -74.5));
        assert!(zoom < options().camera_zoom);
        Ok(())
    }

    #[test]
    fn geocoder_shared_with_caller() -> Result<()> {
        let geocoder = Arc::new(ScriptedGeocoder::new(vec![Ok(vec![]), Ok(vec![])]));
        let mut b = builder(SelectionMode::MultiStop, Arc::clone(&geocoder));
        b.tap_at(0.0, 0.0)?;
        b.wait_for_geocoding(WAIT);
        assert_eq!(names(&b), vec!["Selected Location"]);
        assert_eq!(geocoder.calls(), 2);
        Ok(())
    }
}
