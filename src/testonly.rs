//! Exports intended for testing use only.
//!
//! These are exported for the crate's integration tests and the CLI's
//! `--places` fixtures, but they are not intended for use by external code.

use std::collections::{BTreeMap, VecDeque};
use std::sync::Mutex;
use std::sync::PoisonError;
use std::sync::atomic::{AtomicUsize, Ordering};

use crate::geocode::{AddressCandidate, LookupError, ReverseGeocoder};
use crate::geometry::haversine;
use crate::measure::{Degrees, Meters};
use crate::panel::PanelRender;
use crate::reorder::DragFeedback;
use crate::session::{FinalizedTour, SinglePointPrompt};
use crate::surface::{MapSurface, PanelView, RepositoryError, TourRepository};
use crate::types::{GeoPoint, TypeError, WaypointId};

/// Builds an [`AddressCandidate`] from optional parts, in the order feature
/// name, thoroughfare, locality, sub-locality, admin area.
pub fn candidate(
    feature_name: Option<&str>,
    thoroughfare: Option<&str>,
    locality: Option<&str>,
    sub_locality: Option<&str>,
    admin_area: Option<&str>,
) -> AddressCandidate {
    AddressCandidate {
        feature_name: feature_name.map(str::to_owned),
        thoroughfare: thoroughfare.map(str::to_owned),
        locality: locality.map(str::to_owned),
        sub_locality: sub_locality.map(str::to_owned),
        admin_area: admin_area.map(str::to_owned),
    }
}

type LookupResult = Result<Vec<AddressCandidate>, LookupError>;

/// Replays a fixed list of lookup results, one per call, regardless of the
/// point asked about. Answers with no candidates once the script runs out.
#[derive(Default)]
pub struct ScriptedGeocoder {
    script: Mutex<VecDeque<LookupResult>>,
    calls: AtomicUsize,
}

impl ScriptedGeocoder {
    pub fn new(script: Vec<LookupResult>) -> Self {
        Self {
            script: Mutex::new(script.into()),
            calls: AtomicUsize::new(0),
        }
    }

    /// A geocoder that never finds anything.
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl ReverseGeocoder for ScriptedGeocoder {
    fn lookup(&self, _point: &GeoPoint) -> LookupResult {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.script
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .pop_front()
            .unwrap_or_else(|| Ok(vec![]))
    }
}

/// One known place, as read from a JSON fixture.
#[derive(Clone, Debug)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize))]
pub struct PlaceFixture {
    pub lat: f64,
    pub lng: f64,
    #[cfg_attr(feature = "serde", serde(flatten))]
    pub address: AddressCandidate,
}

/// Answers lookups with the nearest of a set of known places.
///
/// Points farther than `radius` from every place get no candidates.
pub struct FixtureGeocoder {
    places: Vec<(GeoPoint, AddressCandidate)>,
    radius: Meters<f64>,
}

impl FixtureGeocoder {
    pub fn new(radius: Meters<f64>) -> Self {
        Self {
            places: vec![],
            radius,
        }
    }

    pub fn from_fixtures(
        fixtures: Vec<PlaceFixture>,
        radius: Meters<f64>,
    ) -> Result<Self, TypeError> {
        let mut geocoder = Self::new(radius);
        for fixture in fixtures {
            let point = GeoPoint::new(Degrees(fixture.lat), Degrees(fixture.lng))?;
            geocoder.places.push((point, fixture.address));
        }
        Ok(geocoder)
    }

    pub fn with_place(mut self, point: GeoPoint, address: AddressCandidate) -> Self {
        self.places.push((point, address));
        self
    }
}

impl ReverseGeocoder for FixtureGeocoder {
    fn lookup(&self, point: &GeoPoint) -> LookupResult {
        let nearest = self
            .places
            .iter()
            .map(|(p, address)| (Meters::from(haversine(point, p)), address))
            .filter(|(distance, _)| *distance <= self.radius)
            .min_by(|(a, _), (b, _)| a.0.total_cmp(&b.0));
        Ok(nearest.map(|(_, a)| a.clone()).into_iter().collect())
    }
}

/// A map that remembers what is currently drawn on it.
#[derive(Default, Debug)]
pub struct RecordingMap {
    pub points: BTreeMap<WaypointId, (GeoPoint, String)>,
    pub path: Vec<GeoPoint>,
    pub camera: Option<(GeoPoint, f64)>,
}

impl RecordingMap {
    pub fn label(&self, id: WaypointId) -> Option<&str> {
        self.points.get(&id).map(|(_, label)| label.as_str())
    }
}

impl MapSurface for RecordingMap {
    fn draw_point(&mut self, id: WaypointId, point: &GeoPoint, label: &str) {
        self.points.insert(id, (*point, label.to_owned()));
    }

    fn remove_point(&mut self, id: WaypointId) {
        self.points.remove(&id);
    }

    fn draw_path(&mut self, points: &[GeoPoint]) {
        self.path = points.to_vec();
    }

    fn clear_path(&mut self) {
        self.path.clear();
    }

    fn move_camera(&mut self, point: &GeoPoint, zoom: f64) {
        self.camera = Some((*point, zoom));
    }
}

/// A panel that keeps every render and message it is given.
#[derive(Default, Debug)]
pub struct RecordingPanel {
    pub renders: Vec<PanelRender>,
    pub feedback: Option<DragFeedback>,
    pub messages: Vec<String>,
    pub prompt: Option<SinglePointPrompt>,
}

impl RecordingPanel {
    pub fn last_render(&self) -> Option<&PanelRender> {
        self.renders.last()
    }
}

impl PanelView for RecordingPanel {
    fn render(&mut self, render: &PanelRender) {
        self.renders.push(render.clone());
    }

    fn set_drag_feedback(&mut self, feedback: Option<DragFeedback>) {
        self.feedback = feedback;
    }

    fn show_message(&mut self, message: &str) {
        self.messages.push(message.to_owned());
    }

    fn show_confirmation(&mut self, prompt: Option<&SinglePointPrompt>) {
        self.prompt = prompt.cloned();
    }
}

/// Keeps saved tours in memory.
#[derive(Default, Debug)]
pub struct MemoryTourRepository {
    pub tours: Vec<FinalizedTour>,
    reject: bool,
}

impl MemoryTourRepository {
    /// A repository that refuses every tour.
    pub fn failing() -> Self {
        Self {
            tours: vec![],
            reject: true,
        }
    }
}

impl TourRepository for MemoryTourRepository {
    fn save(&mut self, tour: &FinalizedTour) -> Result<(), RepositoryError> {
        if self.reject {
            return Err(RepositoryError::Rejected("repository is read-only".to_owned()));
        }
        self.tours.push(tour.clone());
        Ok(())
    }
}
