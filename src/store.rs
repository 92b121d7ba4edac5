//! Ordered collection of tour waypoints
//!
//! [`WaypointStore`] owns the waypoints of the route being built and keeps the
//! ordering invariant: after every mutation, the `order` values of the stored
//! waypoints are exactly `1..=N` and match their position in the list.
//!
//! Waypoints are addressed two ways. Structural edits coming from the panel
//! (delete, reorder) use positional indices, because that is what the operator
//! sees. Anything that may arrive late, such as a reverse geocoding result,
//! uses the waypoint's [`WaypointId`], which is assigned once and never
//! reused, so that it cannot land on the wrong row after the list has moved.

use thiserror::Error;
use tracing::{debug, trace};

use crate::types::{GeoPoint, NameSource, StopDetails, Waypoint, WaypointId};

#[derive(Error, Debug, PartialEq)]
pub enum StoreError {
    #[error("waypoint index {index} out of range for a route of {len} stops")]
    InvalidIndex { index: usize, len: usize },
    #[error("no waypoint with identity {0}")]
    UnknownWaypoint(WaypointId),
    #[error("single-point replacement on a route with {0} stops")]
    WrongMode(usize),
}

type Result<T> = std::result::Result<T, StoreError>;

/// Outcome of delivering a reverse geocoding result to the store.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum NameUpdate {
    /// The waypoint was renamed.
    Applied,
    /// The waypoint no longer exists.
    Dropped,
    /// The operator already named the waypoint by hand.
    Pinned,
}

/// The waypoints of a route, in route order.
pub struct WaypointStore {
    waypoints: Vec<Waypoint>,
    next_id: u64,
    default_stop_duration_minutes: u32,
}

impl Default for WaypointStore {
    fn default() -> Self {
        Self::new()
    }
}

impl WaypointStore {
    pub fn new() -> Self {
        Self {
            waypoints: Vec::new(),
            next_id: 1,
            default_stop_duration_minutes: 0,
        }
    }

    /// Sets the stop duration given to newly created waypoints.
    pub fn with_default_stop_duration(mut self, minutes: u32) -> Self {
        self.default_stop_duration_minutes = minutes;
        self
    }

    /// Appends a waypoint at `point`.
    ///
    /// The new waypoint is labeled `"Stop {order}"` until a better name is
    /// applied with [`WaypointStore::apply_resolved_name`].
    pub fn add(&mut self, point: GeoPoint) -> WaypointId {
        let id = self.allocate_id();
        let order = self.waypoints.len() + 1;
        self.waypoints.push(Waypoint {
            id,
            point,
            name: placeholder_name(order),
            name_source: NameSource::Placeholder,
            order,
            details: StopDetails {
                stop_duration_minutes: self.default_stop_duration_minutes,
                ..StopDetails::default()
            },
        });
        debug!("Added waypoint {} as stop {} at {}", id, order, point);
        id
    }

    /// Removes the waypoint at `index` and renumbers the rest.
    pub fn remove_at(&mut self, index: usize) -> Result<Waypoint> {
        self.check_index(index)?;
        let removed = self.waypoints.remove(index);
        self.renumber();
        debug!(
            "Removed waypoint {} from position {}, {} remain",
            removed.id,
            index,
            self.waypoints.len()
        );
        Ok(removed)
    }

    /// Removes the waypoint with identity `id` and renumbers the rest.
    pub fn remove(&mut self, id: WaypointId) -> Result<Waypoint> {
        let index = self.index_of(id).ok_or(StoreError::UnknownWaypoint(id))?;
        self.remove_at(index)
    }

    /// Moves the waypoint at `from` so that it ends up at `to`, shifting the
    /// waypoints in between, then renumbers the route.
    pub fn reorder(&mut self, from: usize, to: usize) -> Result<()> {
        self.check_index(from)?;
        self.check_index(to)?;
        if from == to {
            return Ok(());
        }
        let moved = self.waypoints.remove(from);
        self.waypoints.insert(to, moved);
        self.renumber();
        debug!("Moved stop from position {} to {}", from, to);
        Ok(())
    }

    /// Removes every waypoint, returning the identities that were dropped.
    pub fn clear_all(&mut self) -> Vec<WaypointId> {
        let removed = self.waypoints.drain(..).map(|w| w.id).collect::<Vec<_>>();
        debug!("Cleared {} waypoints", removed.len());
        removed
    }

    /// Replaces the sole waypoint of a single-point selection.
    ///
    /// Returns the new waypoint's identity along with the waypoint it
    /// replaced, if any. Fails if the store holds a multi-stop route.
    pub fn replace_single(&mut self, point: GeoPoint) -> Result<(WaypointId, Option<Waypoint>)> {
        if self.waypoints.len() > 1 {
            return Err(StoreError::WrongMode(self.waypoints.len()));
        }
        let previous = self.waypoints.pop();
        let id = self.add(point);
        Ok((id, previous))
    }

    /// Applies a reverse geocoded name to the waypoint with identity `id`.
    ///
    /// Results for waypoints that have since been deleted are dropped, and
    /// names the operator typed in are kept.
    pub fn apply_resolved_name(&mut self, id: WaypointId, name: String) -> NameUpdate {
        match self.get_mut(id) {
            None => {
                trace!("Dropping resolved name for removed waypoint {}", id);
                NameUpdate::Dropped
            }
            Some(waypoint) if waypoint.name_source == NameSource::Manual => NameUpdate::Pinned,
            Some(waypoint) => {
                debug!("Waypoint {} resolved to {:?}", id, name);
                waypoint.name = name;
                waypoint.name_source = NameSource::Geocoded;
                NameUpdate::Applied
            }
        }
    }

    /// Renames a waypoint by hand.
    pub fn rename(&mut self, id: WaypointId, name: String) -> Result<()> {
        let waypoint = self.get_mut(id).ok_or(StoreError::UnknownWaypoint(id))?;
        waypoint.name = name;
        waypoint.name_source = NameSource::Manual;
        Ok(())
    }

    /// Replaces the stop details of a waypoint.
    pub fn update_details(&mut self, id: WaypointId, details: StopDetails) -> Result<()> {
        let waypoint = self.get_mut(id).ok_or(StoreError::UnknownWaypoint(id))?;
        waypoint.details = details;
        Ok(())
    }

    pub fn get(&self, id: WaypointId) -> Option<&Waypoint> {
        self.waypoints.iter().find(|w| w.id == id)
    }

    pub fn index_of(&self, id: WaypointId) -> Option<usize> {
        self.waypoints.iter().position(|w| w.id == id)
    }

    /// The waypoints in route order.
    pub fn waypoints(&self) -> &[Waypoint] {
        &self.waypoints
    }

    pub fn len(&self) -> usize {
        self.waypoints.len()
    }

    pub fn is_empty(&self) -> bool {
        self.waypoints.is_empty()
    }

    fn get_mut(&mut self, id: WaypointId) -> Option<&mut Waypoint> {
        self.waypoints.iter_mut().find(|w| w.id == id)
    }

    fn allocate_id(&mut self) -> WaypointId {
        let id = WaypointId(self.next_id);
        self.next_id += 1;
        id
    }

    fn check_index(&self, index: usize) -> Result<()> {
        if index >= self.waypoints.len() {
            return Err(StoreError::InvalidIndex {
                index,
                len: self.waypoints.len(),
            });
        }
        Ok(())
    }

    fn renumber(&mut self) {
        // Names, including "Stop N" placeholders, stay with their waypoint.
        for (i, waypoint) in self.waypoints.iter_mut().enumerate() {
            waypoint.order = i + 1;
        }
    }
}

fn placeholder_name(order: usize) -> String {
    format!("Stop {order}")
}
