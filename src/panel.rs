//! Visibility state of the waypoint panel
//!
//! The panel is either collapsed to a one-line summary strip or expanded into
//! the editable waypoint list, and can be dragged between the two by its
//! handle. Rather than toggling the strip and the list independently, the
//! panel is a single state machine, so there is no way to end up showing both
//! or neither.
//!
//! ```text
//!            summary tap / first stop added
//!   Hidden ----------------------------------> Expanded
//!     ^  <-------------------------------------  |
//!     |        close tap / route cleared         |
//!     |                                          |
//!     |        handle drag           handle drag |
//!     +----------------> Dragging <--------------+
//!                          |  release
//!                          v
//!                       Settling --> Expanded or Hidden
//! ```

use strum::{Display, EnumString};
use tracing::{debug, trace};

use crate::geometry::{cumulative_distances, leg_distances, total_distance};
use crate::measure::{Degrees, Kilometers};
use crate::types::{GeoPoint, Waypoint, WaypointId};

/// Prompt shown in the summary strip before any stop has been added.
pub const EMPTY_ROUTE_PROMPT: &str = "Tap the map to add stops";

#[derive(Clone, Copy, PartialEq, Eq, Debug, Display, EnumString)]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum PanelState {
    Hidden,
    Expanded,
    Dragging,
    Settling,
}

/// Something that happened to the panel or the route it shows.
#[derive(Clone, Copy, PartialEq, Debug)]
pub enum PanelEvent {
    /// The collapsed summary strip was tapped.
    SummaryTapped,
    /// The close control on the expanded list was tapped.
    CloseTapped,
    /// The operator grabbed the panel handle.
    HandleDragStarted,
    /// The operator let go of the handle.
    HandleReleased(Release),
    /// The settling animation finished.
    SettleFinished,
    /// A stop was added to a previously empty route.
    FirstWaypointAdded,
    /// Every stop was removed at once.
    RouteCleared,
}

/// Where and how fast the handle was let go.
#[derive(Clone, Copy, PartialEq, Debug)]
pub struct Release {
    /// How much of the list was showing, from `0.0` (collapsed) to `1.0`
    /// (fully expanded).
    pub position: f64,

    /// Speed towards expanding in pixels per second. Negative when moving
    /// towards collapsed.
    pub velocity: f64,
}

/// Decides which way a released panel settles.
#[derive(Clone, Copy, PartialEq, Debug)]
pub struct SettleThresholds {
    /// Panels released at or past this fraction open; others close.
    pub open_fraction: f64,

    /// Flings at least this fast settle in their direction regardless of
    /// position.
    pub fling_velocity: f64,
}

impl Default for SettleThresholds {
    fn default() -> Self {
        Self {
            open_fraction: 0.5,
            fling_velocity: 800.0,
        }
    }
}

impl SettleThresholds {
    pub fn resolve(&self, release: Release) -> PanelState {
        if release.velocity.abs() >= self.fling_velocity {
            if release.velocity > 0.0 {
                PanelState::Expanded
            } else {
                PanelState::Hidden
            }
        } else if release.position >= self.open_fraction {
            PanelState::Expanded
        } else {
            PanelState::Hidden
        }
    }
}

/// A state change of the panel.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct Transition {
    pub from: PanelState,
    pub to: PanelState,
}

pub struct PanelStateMachine {
    state: PanelState,
    /// The last of `Hidden` or `Expanded` the panel rested in.
    resting: PanelState,
    settle_target: Option<PanelState>,
    thresholds: SettleThresholds,
}

impl Default for PanelStateMachine {
    fn default() -> Self {
        Self::new(SettleThresholds::default())
    }
}

impl PanelStateMachine {
    pub fn new(thresholds: SettleThresholds) -> Self {
        Self {
            state: PanelState::Hidden,
            resting: PanelState::Hidden,
            settle_target: None,
            thresholds,
        }
    }

    pub fn state(&self) -> PanelState {
        self.state
    }

    /// Where a settling panel is headed.
    pub fn settle_target(&self) -> Option<PanelState> {
        self.settle_target
    }

    /// Applies `event`, returning the transition it caused, if any.
    ///
    /// Events that make no sense in the current state are ignored.
    pub fn handle(&mut self, event: PanelEvent) -> Option<Transition> {
        use PanelState::*;

        let next = match (self.state, event) {
            (Hidden, PanelEvent::SummaryTapped) => Expanded,
            (Hidden, PanelEvent::FirstWaypointAdded) => Expanded,
            (Expanded, PanelEvent::CloseTapped) => Hidden,
            (Hidden | Expanded | Settling, PanelEvent::HandleDragStarted) => Dragging,
            (Dragging, PanelEvent::HandleReleased(release)) => {
                let target = self.thresholds.resolve(release);
                trace!("Panel released at {:?}, settling to {}", release, target);
                self.settle_target = Some(target);
                Settling
            }
            (Settling, PanelEvent::SettleFinished) => self.settle_target.unwrap_or(self.resting),
            (Expanded | Dragging | Settling, PanelEvent::RouteCleared) => Hidden,
            (state, event) => {
                trace!("Panel ignoring {:?} while {}", event, state);
                return None;
            }
        };

        let transition = Transition {
            from: self.state,
            to: next,
        };
        self.state = next;
        if matches!(next, Hidden | Expanded) {
            self.resting = next;
            self.settle_target = None;
        }
        debug!("Panel {} -> {}", transition.from, transition.to);
        Some(transition)
    }

    /// Rotation of the expand/collapse indicator.
    ///
    /// Follows the state the panel last rested in, so it does not flicker
    /// while the panel is being dragged.
    pub fn indicator_angle(&self) -> Degrees<f64> {
        match self.resting {
            PanelState::Expanded => Degrees(180.0),
            _ => Degrees(0.0),
        }
    }

    /// What the panel should show for the given route.
    pub fn render(&self, waypoints: &[Waypoint]) -> PanelRender {
        let content = match self.state {
            PanelState::Hidden => PanelContent::Summary(summary_text(waypoints)),
            PanelState::Expanded | PanelState::Dragging | PanelState::Settling => {
                PanelContent::List(RouteList::new(waypoints))
            }
        };
        PanelRender {
            state: self.state,
            indicator_angle: self.indicator_angle(),
            content,
        }
    }
}

/// One-line description of the route for the collapsed panel.
pub fn summary_text(waypoints: &[Waypoint]) -> String {
    if waypoints.is_empty() {
        return EMPTY_ROUTE_PROMPT.to_owned();
    }
    let noun = if waypoints.len() == 1 { "stop" } else { "stops" };
    format!(
        "{} {} – {:.1}",
        waypoints.len(),
        noun,
        total_distance(waypoints)
    )
}

/// Everything the panel needs to draw itself.
#[derive(Clone, PartialEq, Debug)]
pub struct PanelRender {
    pub state: PanelState,
    pub indicator_angle: Degrees<f64>,
    pub content: PanelContent,
}

#[derive(Clone, PartialEq, Debug)]
pub enum PanelContent {
    /// The collapsed strip.
    Summary(String),
    /// The editable list, with clear-all and confirm controls.
    List(RouteList),
}

#[derive(Clone, PartialEq, Debug)]
pub struct RouteList {
    pub rows: Vec<WaypointRow>,
    pub total_distance: Kilometers<f64>,
    pub total_stop_minutes: u32,
    pub can_clear: bool,
    pub can_confirm: bool,
}

impl RouteList {
    fn new(waypoints: &[Waypoint]) -> Self {
        let legs = leg_distances(waypoints);
        let cumulative = cumulative_distances(waypoints);
        let rows = waypoints
            .iter()
            .enumerate()
            .map(|(i, w)| WaypointRow {
                id: w.id(),
                order: w.order(),
                name: w.name().to_owned(),
                point: w.point(),
                leg_distance: i.checked_sub(1).and_then(|prev| legs.get(prev).copied()),
                cumulative_distance: cumulative[i],
            })
            .collect();
        Self {
            rows,
            total_distance: total_distance(waypoints),
            total_stop_minutes: waypoints.iter().map(|w| w.stop_duration_minutes()).sum(),
            can_clear: !waypoints.is_empty(),
            can_confirm: !waypoints.is_empty(),
        }
    }
}

/// A row of the expanded waypoint list.
#[derive(Clone, PartialEq, Debug)]
pub struct WaypointRow {
    pub id: WaypointId,
    pub order: usize,
    pub name: String,
    pub point: GeoPoint,

    /// Distance from the previous stop. `None` for the first stop.
    pub leg_distance: Option<Kilometers<f64>>,

    /// Distance from the first stop.
    pub cumulative_distance: Kilometers<f64>,
}
