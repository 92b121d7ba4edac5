//! Drag-and-drop reordering of the waypoint list
//!
//! While a row is being dragged, nothing in the route changes: the controller
//! only hands the panel cosmetic feedback for the lifted row. The route is
//! reordered once, when the row is dropped, as a single move from the row's
//! original position to the drop position.
//!
//! Rows can only be dragged up or down. There is no swipe-to-delete; removing
//! a stop is a separate action on the panel.

use tracing::{debug, trace};

use crate::store::{StoreError, WaypointStore};

type Result<T> = std::result::Result<T, StoreError>;

/// A request to move the row at `source` to `target`.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct ReorderRequest {
    pub source: usize,
    pub target: usize,
}

/// How a lifted row is drawn while being dragged.
#[derive(Clone, Copy, PartialEq, Debug)]
pub struct DragFeedback {
    /// Index of the row being dragged, as it was when the drag began.
    pub source: usize,

    /// Index the row would land at if dropped now.
    pub hover: usize,

    /// Shadow elevation of the lifted row.
    pub elevation: f32,

    /// Scale of the lifted row.
    pub scale: f32,
}

/// Styling applied to a lifted row.
#[derive(Clone, Copy, PartialEq, Debug)]
pub struct LiftStyle {
    pub elevation: f32,
    pub scale: f32,
}

impl Default for LiftStyle {
    fn default() -> Self {
        Self {
            elevation: 8.0,
            scale: 1.03,
        }
    }
}

/// What a completed drop did to the route.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum ReorderOutcome {
    Moved(ReorderRequest),
    /// Dropped where it started.
    Unchanged,
}

#[derive(Default)]
pub struct ReorderController {
    active: Option<DragFeedback>,
    lift: LiftStyle,
}

impl ReorderController {
    pub fn new(lift: LiftStyle) -> Self {
        Self { active: None, lift }
    }

    /// Feedback for the drag in progress, if any.
    pub fn active(&self) -> Option<DragFeedback> {
        self.active
    }

    /// Lifts the row at `source` out of a list of `len` rows.
    pub fn begin(&mut self, source: usize, len: usize) -> Result<DragFeedback> {
        if source >= len {
            return Err(StoreError::InvalidIndex { index: source, len });
        }
        let feedback = DragFeedback {
            source,
            hover: source,
            elevation: self.lift.elevation,
            scale: self.lift.scale,
        };
        trace!("Drag started on row {}", source);
        self.active = Some(feedback);
        Ok(feedback)
    }

    /// Follows the dragged row over position `hover` of a list of `len` rows.
    ///
    /// Returns updated feedback, or `None` if no drag is in progress.
    pub fn hover(&mut self, hover: usize, len: usize) -> Option<DragFeedback> {
        let feedback = self.active.as_mut()?;
        feedback.hover = hover.min(len.saturating_sub(1));
        Some(*feedback)
    }

    /// Drops the dragged row at `target`, applying the move to `store`.
    ///
    /// The drag ends whether or not the move succeeds.
    pub fn drop_at(&mut self, target: usize, store: &mut WaypointStore) -> Result<ReorderOutcome> {
        let Some(feedback) = self.active.take() else {
            trace!("Drop without an active drag");
            return Ok(ReorderOutcome::Unchanged);
        };
        self.apply(
            ReorderRequest {
                source: feedback.source,
                target,
            },
            store,
        )
    }

    /// Abandons the drag in progress without touching the route.
    pub fn cancel(&mut self) -> bool {
        self.active.take().is_some()
    }

    /// Applies a complete reorder request as one store mutation.
    pub fn apply(
        &mut self,
        request: ReorderRequest,
        store: &mut WaypointStore,
    ) -> Result<ReorderOutcome> {
        store.reorder(request.source, request.target)?;
        if request.source == request.target {
            return Ok(ReorderOutcome::Unchanged);
        }
        debug!("Applied {:?}", request);
        Ok(ReorderOutcome::Moved(request))
    }
}
