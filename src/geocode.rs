//! Reverse geocoding of tapped points
//!
//! # Usage
//!
//! A [`ReverseGeocoder`] is the boundary to whatever service turns
//! coordinates into address candidates. [`Resolver`] wraps one with the retry
//! policy and the rules for composing a display name from a candidate, and
//! never fails: when nothing usable comes back it yields a fixed placeholder.
//!
//! [`GeocodeDispatcher`] runs resolutions in the background so waypoint
//! creation never waits on the network. Completed names are queued on a
//! channel and picked up by the owner of the [`WaypointStore`] whenever it
//! calls [`GeocodeDispatcher::drain`], keyed by the waypoint's identity.
//!
//! Lookups block on the service and on retry backoff, so each dispatcher runs
//! them on a small pool of its own and never on rayon's global pool.
//!
//! [`WaypointStore`]: crate::store::WaypointStore

use std::collections::HashSet;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::time::{Duration, Instant};

use thiserror::Error;
use tracing::{debug, instrument, trace, warn};

use crate::types::{GeoPoint, WaypointId};

/// Name given to a point when reverse geocoding comes up empty.
pub const DEFAULT_PLACEHOLDER_NAME: &str = "Selected Location";

/// Number of lookups a dispatcher runs at once.
pub const DEFAULT_GEOCODE_WORKERS: usize = 4;

/// An error reported by a geocoding service.
#[derive(Error, Debug)]
pub enum LookupError {
    #[error("geocoding service unavailable: {0}")]
    Unavailable(String),
    #[error("geocoding service error")]
    Service(#[from] Box<dyn std::error::Error + Send + Sync>),
}

/// One candidate address returned by a geocoding service.
///
/// Any of the fields may be missing.
#[derive(Clone, Default, PartialEq, Debug)]
#[cfg_attr(
    feature = "serde",
    derive(serde::Serialize, serde::Deserialize),
    serde(rename_all = "camelCase", default)
)]
pub struct AddressCandidate {
    pub feature_name: Option<String>,
    pub thoroughfare: Option<String>,
    pub locality: Option<String>,
    pub sub_locality: Option<String>,
    pub admin_area: Option<String>,
}

/// A service that resolves coordinates into candidate addresses.
///
/// Lookups are blocking and are only ever called off the owning thread.
pub trait ReverseGeocoder: Send + Sync {
    fn lookup(&self, point: &GeoPoint) -> Result<Vec<AddressCandidate>, LookupError>;
}

impl<G> ReverseGeocoder for Arc<G>
where
    G: ReverseGeocoder + ?Sized,
{
    fn lookup(&self, point: &GeoPoint) -> Result<Vec<AddressCandidate>, LookupError> {
        (**self).lookup(point)
    }
}

impl<G> ReverseGeocoder for Box<G>
where
    G: ReverseGeocoder + ?Sized,
{
    fn lookup(&self, point: &GeoPoint) -> Result<Vec<AddressCandidate>, LookupError> {
        (**self).lookup(point)
    }
}

/// How many times a lookup is attempted, and how long to wait in between.
#[derive(Clone, Copy, PartialEq, Debug)]
pub struct RetryPolicy {
    /// Total attempts, including the first. At least one is always made.
    pub attempts: u32,

    /// Fixed delay before each attempt after the first.
    pub backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            attempts: 2,
            backoff: Duration::from_millis(500),
        }
    }
}

impl RetryPolicy {
    pub fn with_attempts(mut self, attempts: u32) -> Self {
        self.attempts = attempts;
        self
    }

    pub fn with_backoff(mut self, backoff: Duration) -> Self {
        self.backoff = backoff;
        self
    }
}

/// Composes a display name from an address candidate.
///
/// Takes the feature name (unless it is just a house number), the
/// thoroughfare and the locality, in that order, joined with `", "`. If none
/// of those are present, falls back to the sub-locality and then the
/// administrative area.
pub fn compose_name(candidate: &AddressCandidate) -> Option<String> {
    let feature = non_empty(&candidate.feature_name).filter(|f| !is_numeric(f));
    let parts = [
        feature,
        non_empty(&candidate.thoroughfare),
        non_empty(&candidate.locality),
    ]
    .into_iter()
    .flatten()
    .collect::<Vec<_>>();

    let name = if parts.is_empty() {
        non_empty(&candidate.sub_locality)
            .or_else(|| non_empty(&candidate.admin_area))?
            .to_owned()
    } else {
        parts.join(", ")
    };

    let name = name.trim_end_matches(|c: char| c == ',' || c.is_whitespace());
    if name.is_empty() {
        None
    } else {
        Some(name.to_owned())
    }
}

fn non_empty(field: &Option<String>) -> Option<&str> {
    field.as_deref().map(str::trim).filter(|s| !s.is_empty())
}

fn is_numeric(s: &str) -> bool {
    s.chars().all(|c| c.is_ascii_digit())
}

/// Resolves points to display names using a [`ReverseGeocoder`].
pub struct Resolver {
    geocoder: Box<dyn ReverseGeocoder>,
    retry: RetryPolicy,
    placeholder: String,
}

impl Resolver {
    pub fn new<G: ReverseGeocoder + 'static>(geocoder: G) -> Self {
        Self {
            geocoder: Box::new(geocoder),
            retry: RetryPolicy::default(),
            placeholder: DEFAULT_PLACEHOLDER_NAME.to_owned(),
        }
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_placeholder(mut self, placeholder: String) -> Self {
        self.placeholder = placeholder;
        self
    }

    /// Resolves `point` to a display name, blocking for the duration of the
    /// lookups and backoff.
    ///
    /// Never fails. Service errors, panics and empty responses all count as
    /// an unsuccessful attempt, and once the attempts are used up the
    /// placeholder name is returned.
    #[instrument(level = "trace", skip(self))]
    pub fn resolve(&self, point: &GeoPoint) -> String {
        for attempt in 0..self.retry.attempts.max(1) {
            if attempt > 0 {
                std::thread::sleep(self.retry.backoff);
            }
            if let Some(name) = self.attempt(point) {
                return name;
            }
            debug!("Geocoding attempt {} for {} came up empty", attempt + 1, point);
        }
        self.placeholder.clone()
    }

    fn attempt(&self, point: &GeoPoint) -> Option<String> {
        let candidates =
            match panic::catch_unwind(AssertUnwindSafe(|| self.geocoder.lookup(point))) {
                Ok(Ok(candidates)) => candidates,
                Ok(Err(e)) => {
                    warn!("Geocoding lookup for {} failed: {}", point, e);
                    return None;
                }
                Err(_) => {
                    warn!("Geocoding lookup for {} panicked", point);
                    return None;
                }
            };
        candidates.iter().find_map(compose_name)
    }
}

/// A name resolved in the background for a waypoint.
#[derive(Clone, PartialEq, Debug)]
pub struct ResolvedName {
    pub id: WaypointId,
    pub name: String,
}

/// Runs resolutions off the owning thread and collects their results.
pub struct GeocodeDispatcher {
    resolver: Arc<Resolver>,
    workers: Workers,
    tx: Sender<ResolvedName>,
    rx: Receiver<ResolvedName>,
    pending: HashSet<WaypointId>,
}

impl GeocodeDispatcher {
    pub fn new(resolver: Resolver) -> Self {
        Self::with_workers(resolver, DEFAULT_GEOCODE_WORKERS)
    }

    /// Creates a dispatcher running at most `workers` lookups at once.
    pub fn with_workers(resolver: Resolver, workers: usize) -> Self {
        let (tx, rx) = mpsc::channel();
        Self {
            resolver: Arc::new(resolver),
            workers: Workers::start(workers.max(1)),
            tx,
            rx,
            pending: HashSet::new(),
        }
    }

    /// Starts resolving a name for waypoint `id` at `point`.
    ///
    /// Returns `false` without starting anything if a resolution for `id` is
    /// already outstanding.
    pub fn dispatch(&mut self, id: WaypointId, point: GeoPoint) -> bool {
        if !self.pending.insert(id) {
            trace!("Geocoding for {} already pending", id);
            return false;
        }
        let resolver = Arc::clone(&self.resolver);
        let tx = self.tx.clone();
        self.workers.spawn(move || {
            let name = resolver.resolve(&point);
            // The receiving side is gone once the session has been dropped.
            let _ = tx.send(ResolvedName { id, name });
        });
        debug!("Dispatched geocoding for {} at {}", id, point);
        true
    }

    /// Stops waiting on the resolution for `id`. A late result is discarded.
    pub fn forget(&mut self, id: WaypointId) {
        self.pending.remove(&id);
    }

    pub fn forget_all(&mut self) {
        self.pending.clear();
    }

    pub fn is_pending(&self, id: WaypointId) -> bool {
        self.pending.contains(&id)
    }

    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    /// Collects every result that has arrived, without blocking.
    pub fn drain(&mut self) -> Vec<ResolvedName> {
        let mut results = Vec::new();
        while let Ok(resolved) = self.rx.try_recv() {
            self.accept(resolved, &mut results);
        }
        results
    }

    /// Collects results until nothing is pending or `timeout` elapses.
    pub fn wait(&mut self, timeout: Duration) -> Vec<ResolvedName> {
        let deadline = Instant::now() + timeout;
        let mut results = Vec::new();
        while !self.pending.is_empty() {
            let remaining = deadline.saturating_duration_since(Instant::now());
            match self.rx.recv_timeout(remaining) {
                Ok(resolved) => self.accept(resolved, &mut results),
                Err(RecvTimeoutError::Timeout) => {
                    warn!(
                        "Timed out with {} geocoding lookups pending",
                        self.pending.len()
                    );
                    break;
                }
                Err(RecvTimeoutError::Disconnected) => break,
            }
        }
        results
    }

    fn accept(&mut self, resolved: ResolvedName, results: &mut Vec<ResolvedName>) {
        if self.pending.remove(&resolved.id) {
            results.push(resolved);
        } else {
            trace!("Discarding stale geocoding result for {}", resolved.id);
        }
    }
}

/// Where a dispatcher's lookups run.
enum Workers {
    #[cfg(feature = "rayon")]
    Pool(rayon::ThreadPool),
    /// A thread per lookup.
    Threads,
}

impl Workers {
    #[cfg(feature = "rayon")]
    fn start(count: usize) -> Self {
        match rayon::ThreadPoolBuilder::new()
            .num_threads(count)
            .thread_name(|i| format!("geocode-{i}"))
            .build()
        {
            Ok(pool) => Workers::Pool(pool),
            Err(e) => {
                warn!("Starting geocoding pool failed, using a thread per lookup: {}", e);
                Workers::Threads
            }
        }
    }

    #[cfg(not(feature = "rayon"))]
    fn start(_count: usize) -> Self {
        Workers::Threads
    }

    fn spawn<F>(&self, f: F)
    where
        F: FnOnce() + Send + 'static,
    {
        match self {
            #[cfg(feature = "rayon")]
            Workers::Pool(pool) => pool.spawn(f),
            Workers::Threads => {
                std::thread::spawn(f);
            }
        }
    }
}
