use std::fmt::Write;
use std::fs::File;
use std::io::BufReader;
use std::path::PathBuf;
use std::sync::LazyLock;
use std::time::Duration;

use anyhow::{Context, Result, anyhow, bail};
use clap::builder::styling::Styles;
use clap::{Args, ColorChoice, Parser, Subcommand, crate_version};
use clap_cargo::style::{ERROR, HEADER, INVALID, LITERAL, PLACEHOLDER, USAGE, VALID};
use regex::Regex;
use tracing::level_filters::LevelFilter;
use tracing::{Level, debug, info, instrument, trace};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::{Layer, Registry, fmt};

use tourplotter::geocode::ReverseGeocoder;
use tourplotter::measure::Meters;
use tourplotter::panel::{PanelContent, PanelRender};
use tourplotter::reorder::{DragFeedback, ReorderRequest};
use tourplotter::session::SinglePointPrompt;
use tourplotter::testonly::{FixtureGeocoder, PlaceFixture};
use tourplotter::{
    FinalizedTour, GeoPoint, MapSurface, PanelEvent, PanelView, RepositoryError, RouteBuilder,
    RouteBuilderOptions, SelectionMode, SessionError, TourRepository, WaypointId,
};

pub const CLAP_STYLING: Styles = Styles::styled()
    .header(HEADER)
    .usage(USAGE)
    .literal(LITERAL)
    .placeholder(PLACEHOLDER)
    .error(ERROR)
    .valid(VALID)
    .invalid(INVALID);

static LONG_VERSION: LazyLock<String> =
    LazyLock::new(|| format!("{} (rustc {})", crate_version!(), env!("RUSTC_VERSION")));

/// Plan tours by tapping points on a map
///
/// Builds a tour from a list of coordinates as if each had been tapped on the
/// map in turn, names every stop by reverse geocoding, and prints the route
/// with its great-circle length.
#[derive(Parser)]
#[command(
    name = "tourplotter",
    version,
    long_version = LONG_VERSION.as_str(),
    about,
    color = ColorChoice::Auto,
    styles = CLAP_STYLING,
)]
struct Cli {
    #[command(subcommand)]
    cmd: Commands,

    /// Configure diagnostic logging level
    #[clap(long, short = 'L', default_value_t = Level::ERROR)]
    log_level: Level,

    /// Log to a file
    #[clap(long)]
    log_file: Option<PathBuf>,

    /// JSON file of known places to name stops from
    ///
    /// An array of objects with `lat` and `lng` plus any of `featureName`,
    /// `thoroughfare`, `locality`, `subLocality` and `adminArea`. Without it
    /// every stop gets the placeholder name.
    #[clap(long, short = 'p')]
    places: Option<PathBuf>,

    /// How close a known place must be to a stop to name it, in meters
    #[clap(long, default_value_t = 1000.0)]
    radius_m: f64,

    /// Reverse geocoding lookups run at once
    #[clap(long, default_value_t = 4)]
    geocode_workers: usize,

    /// Reverse geocoding attempts per stop
    #[clap(long, default_value_t = 2)]
    attempts: u32,

    /// Wait between reverse geocoding attempts, in milliseconds
    #[clap(long, default_value_t = 500)]
    backoff_ms: u64,

    /// Give up waiting for reverse geocoding after this many seconds
    #[clap(long, default_value_t = 30)]
    timeout_secs: u64,
}

#[derive(Args, Debug)]
struct PlotArgs {
    /// Stops as LAT,LNG in route order
    #[clap(required = true, allow_hyphen_values = true)]
    points: Vec<String>,

    /// Move the stop at FROM to TO, as 1-based positions. May be repeated.
    #[clap(long, short)]
    reorder: Vec<String>,

    /// Delete the stop at this 1-based position after reordering. May be
    /// repeated.
    #[clap(long)]
    remove: Vec<usize>,

    /// Print the confirmed tour as JSON
    #[clap(long, action)]
    json: bool,
}

#[derive(Args, Debug)]
struct PickArgs {
    /// Location as LAT,LNG
    #[clap(allow_hyphen_values = true)]
    point: String,

    /// Print the picked location as JSON
    #[clap(long, action)]
    json: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Build a multi-stop tour
    Plot(PlotArgs),

    /// Pick a single location
    Pick(PickArgs),
}

/// Logs what would be drawn on the map.
struct TraceMap;

impl MapSurface for TraceMap {
    fn draw_point(&mut self, id: WaypointId, point: &GeoPoint, label: &str) {
        trace!("map: draw {} at {} as {:?}", id, point, label);
    }

    fn remove_point(&mut self, id: WaypointId) {
        trace!("map: remove {}", id);
    }

    fn draw_path(&mut self, points: &[GeoPoint]) {
        trace!("map: path through {} points", points.len());
    }

    fn clear_path(&mut self) {
        trace!("map: clear path");
    }

    fn move_camera(&mut self, point: &GeoPoint, zoom: f64) {
        trace!("map: camera to {} at zoom {}", point, zoom);
    }
}

/// Keeps the latest panel render for the final report.
#[derive(Default)]
struct ReportPanel {
    last: Option<PanelRender>,
    messages: Vec<String>,
}

impl PanelView for ReportPanel {
    fn render(&mut self, render: &PanelRender) {
        trace!("panel: {} {:?}", render.state, render.content);
        self.last = Some(render.clone());
    }

    fn set_drag_feedback(&mut self, feedback: Option<DragFeedback>) {
        trace!("panel: drag feedback {:?}", feedback);
    }

    fn show_message(&mut self, message: &str) {
        self.messages.push(message.to_owned());
    }

    fn show_confirmation(&mut self, prompt: Option<&SinglePointPrompt>) {
        trace!("panel: confirmation {:?}", prompt);
    }
}

/// Holds on to the confirmed tour so it can be printed.
#[derive(Default)]
struct KeepTour(Option<FinalizedTour>);

impl TourRepository for KeepTour {
    fn save(&mut self, tour: &FinalizedTour) -> Result<(), RepositoryError> {
        self.0 = Some(tour.clone());
        Ok(())
    }
}

type CliBuilder = RouteBuilder<TraceMap, ReportPanel, KeepTour>;

fn parse_point(s: &str) -> Result<(f64, f64)> {
    let re = Regex::new(r"^\s*(-?\d+(?:\.\d+)?)\s*,\s*(-?\d+(?:\.\d+)?)\s*$")?;
    let caps = re
        .captures(s)
        .ok_or_else(|| anyhow!("Expected a point as LAT,LNG but got {:?}", s))?;
    let lat = caps[1].parse::<f64>()?;
    let lng = caps[2].parse::<f64>()?;
    Ok((lat, lng))
}

fn parse_move(s: &str, len: usize) -> Result<ReorderRequest> {
    let re = Regex::new(r"^(\d+):(\d+)$")?;
    let caps = re
        .captures(s)
        .ok_or_else(|| anyhow!("Expected a reorder as FROM:TO but got {:?}", s))?;
    Ok(ReorderRequest {
        source: zero_based(caps[1].parse()?, len)?,
        target: zero_based(caps[2].parse()?, len)?,
    })
}

fn zero_based(position: usize, len: usize) -> Result<usize> {
    if position == 0 || position > len {
        bail!("Stop {} does not exist, the tour has {} stops", position, len);
    }
    Ok(position - 1)
}

fn geocoder(args: &Cli) -> Result<Box<dyn ReverseGeocoder>> {
    let radius = Meters(args.radius_m);
    let Some(path) = &args.places else {
        return Ok(Box::new(FixtureGeocoder::new(radius)));
    };
    let file = BufReader::new(
        File::open(path).context("Opening the --places file. Check that it exists.")?,
    );
    let fixtures: Vec<PlaceFixture> =
        serde_json::from_reader(file).context("Reading the --places file as JSON")?;
    info!("Loaded {} known places from {:?}", fixtures.len(), path);
    Ok(Box::new(FixtureGeocoder::from_fixtures(fixtures, radius)?))
}

fn session(args: &Cli, mode: SelectionMode) -> Result<CliBuilder> {
    let options = RouteBuilderOptions::default()
        .with_geocode_attempts(args.attempts)
        .with_geocode_backoff(Duration::from_millis(args.backoff_ms))
        .with_geocode_workers(args.geocode_workers);
    Ok(RouteBuilder::new(
        mode,
        geocoder(args)?,
        TraceMap,
        ReportPanel::default(),
        KeepTour::default(),
        options,
    ))
}

fn wait(args: &Cli, builder: &mut CliBuilder) {
    let renamed = builder.wait_for_geocoding(Duration::from_secs(args.timeout_secs));
    debug!("Geocoding renamed {} stops", renamed);
}

fn confirm(builder: &mut CliBuilder) -> Result<FinalizedTour> {
    match builder.confirm() {
        Err(SessionError::EmptyRouteConfirm) => {
            let message = builder.view().messages.last().cloned().unwrap_or_default();
            Err(anyhow!(message).context("Nothing to confirm"))
        }
        res => Ok(res?),
    }
}

#[instrument(level = "trace", skip_all)]
fn plot_cmd(args: &Cli, sub_args: &PlotArgs) -> Result<String> {
    debug!("plot args: {:?}", sub_args);

    let mut builder = session(args, SelectionMode::MultiStop)?;
    for point in &sub_args.points {
        let (lat, lng) = parse_point(point)?;
        builder.tap_at(lat, lng)?;
    }
    wait(args, &mut builder);

    for arg in &sub_args.reorder {
        let request = parse_move(arg, builder.waypoints().len())?;
        builder.reorder(request)?;
    }
    for position in &sub_args.remove {
        let index = zero_based(*position, builder.waypoints().len())?;
        builder.remove_at(index)?;
    }

    // The list view carries the per-leg distances for the report.
    if builder.panel_state() != tourplotter::PanelState::Expanded {
        builder.panel_event(PanelEvent::SummaryTapped);
    }
    let render = builder.view().last.clone();
    let summary = builder.summary();
    let tour = confirm(&mut builder)?;

    if sub_args.json {
        return Ok(serde_json::to_string_pretty(&tour)? + "\n");
    }

    let mut r = String::new();
    if let Some(PanelContent::List(list)) = render.map(|r| r.content) {
        for row in &list.rows {
            write!(&mut r, "{:>3}. {} ({})", row.order, row.name, row.point)?;
            match row.leg_distance {
                Some(leg) => writeln!(
                    &mut r,
                    "  +{:.2} = {:.2}",
                    leg, row.cumulative_distance
                )?,
                None => writeln!(&mut r)?,
            }
        }
        if list.total_stop_minutes > 0 {
            writeln!(&mut r, "\nTime at stops: {} min", list.total_stop_minutes)?;
        }
    }
    writeln!(&mut r, "\n{}", summary)?;
    Ok(r)
}

#[instrument(level = "trace", skip_all)]
fn pick_cmd(args: &Cli, sub_args: &PickArgs) -> Result<String> {
    debug!("pick args: {:?}", sub_args);

    let mut builder = session(args, SelectionMode::SinglePoint)?;
    let (lat, lng) = parse_point(&sub_args.point)?;
    builder.tap_at(lat, lng)?;
    wait(args, &mut builder);
    let tour = builder.accept()?;

    if sub_args.json {
        return Ok(serde_json::to_string_pretty(&tour)? + "\n");
    }

    let mut r = String::new();
    for waypoint in tour.waypoints() {
        writeln!(&mut r, "{} ({})", waypoint.name(), waypoint.point())?;
    }
    Ok(r)
}

fn main() -> Result<()> {
    // Intentionally avoid wrapping argument parsing errors in anyhow::Result so
    // we preserve Clap's pretty formatting of usage info.
    let args = Cli::parse();

    let log_w: Box<dyn std::io::Write + Send> = match &args.log_file {
        Some(path) => Box::new(File::create(path).context("Creating the log file")?),
        None => Box::new(std::io::stderr()),
    };
    let (appender, _guard) = tracing_appender::non_blocking(log_w);

    let fmt_layer = fmt::Layer::new()
        .with_writer(appender)
        .with_ansi(args.log_file.is_none())
        .with_target(false)
        .with_filter(LevelFilter::from_level(args.log_level));
    tracing::subscriber::set_global_default(Registry::default().with(fmt_layer))?;

    debug!("tourplotter {}", crate_version!());

    let report = match &args.cmd {
        Commands::Plot(sub_args) => plot_cmd(&args, sub_args),
        Commands::Pick(sub_args) => pick_cmd(&args, sub_args),
    }?;

    print!("{report}");
    Ok(())
}
