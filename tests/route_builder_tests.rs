use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use approx::assert_relative_eq;

use tourplotter::geocode::LookupError;
use tourplotter::measure::{Kilometers, Meters};
use tourplotter::panel::PanelContent;
use tourplotter::reorder::ReorderRequest;
use tourplotter::testonly::{
    FixtureGeocoder, MemoryTourRepository, RecordingMap, RecordingPanel, ScriptedGeocoder,
    candidate,
};
use tourplotter::{
    FinalizedTour, PanelState, ReverseGeocoder, RouteBuilder, RouteBuilderOptions, SelectionMode,
    geo_point,
};

type TestBuilder = RouteBuilder<RecordingMap, RecordingPanel, MemoryTourRepository>;

const WAIT: Duration = Duration::from_secs(5);

fn multi_stop<G: ReverseGeocoder + 'static>(geocoder: G) -> TestBuilder {
    RouteBuilder::new(
        SelectionMode::MultiStop,
        geocoder,
        RecordingMap::default(),
        RecordingPanel::default(),
        MemoryTourRepository::default(),
        RouteBuilderOptions::default().with_geocode_backoff(Duration::ZERO),
    )
}

fn orders(builder: &TestBuilder) -> Vec<usize> {
    builder.waypoints().iter().map(|w| w.order()).collect()
}

#[test]
fn lima_to_cusco_distance() -> Result<()> {
    let mut builder = multi_stop(ScriptedGeocoder::empty());
    builder.tap_at(-12.0464, -77.0428)?;
    builder.tap_at(-13.1631, -72.5450)?;

    assert_relative_eq!(
        builder.total_distance(),
        Kilometers(503.611784),
        epsilon = 1e-3
    );
    assert_eq!(builder.summary(), "2 stops – 503.6 km");
    assert_eq!(builder.path_points().len(), 2);
    Ok(())
}

#[test]
fn single_stop_summary() -> Result<()> {
    let mut builder = multi_stop(ScriptedGeocoder::empty());
    builder.tap_at(-12.0464, -77.0428)?;
    assert_eq!(builder.summary(), "1 stop – 0.0 km");
    Ok(())
}

#[test]
fn delete_middle_stop() -> Result<()> {
    let geocoder = FixtureGeocoder::new(Meters(1000.0))
        .with_place(
            geo_point!(-12.0464, -77.0428),
            candidate(None, Some("Plaza Mayor"), Some("Lima"), None, None),
        )
        .with_place(
            geo_point!(-12.1211, -77.0297),
            candidate(None, Some("Av. Larco"), Some("Miraflores"), None, None),
        )
        .with_place(
            geo_point!(-12.1500, -77.0200),
            candidate(None, None, Some("Barranco"), None, None),
        );
    let mut builder = multi_stop(geocoder);
    builder.tap_at(-12.0464, -77.0428)?;
    builder.tap_at(-12.1211, -77.0297)?;
    builder.tap_at(-12.1500, -77.0200)?;
    builder.wait_for_geocoding(WAIT);

    builder.remove_at(1)?;

    let remaining = builder
        .waypoints()
        .iter()
        .map(|w| (w.point(), w.name().to_owned()))
        .collect::<Vec<_>>();
    assert_eq!(
        remaining,
        vec![
            (geo_point!(-12.0464, -77.0428), "Plaza Mayor, Lima".to_owned()),
            (geo_point!(-12.1500, -77.0200), "Barranco".to_owned()),
        ]
    );
    assert_eq!(orders(&builder), vec![1, 2]);
    Ok(())
}

#[test]
fn reorder_last_to_second() -> Result<()> {
    let mut builder = multi_stop(ScriptedGeocoder::empty());
    let mut ids = vec![];
    for i in 0..4 {
        ids.push(builder.tap_at(-12.0, -77.0 + i as f64 * 0.01)?);
    }

    builder.reorder(ReorderRequest {
        source: 3,
        target: 1,
    })?;

    assert_eq!(orders(&builder), vec![1, 2, 3, 4]);
    let moved = builder.waypoints().iter().map(|w| w.id()).collect::<Vec<_>>();
    assert_eq!(moved, vec![ids[0], ids[3], ids[1], ids[2]]);
    Ok(())
}

#[test]
fn geocoding_falls_back_to_placeholder() -> Result<()> {
    let geocoder = Arc::new(ScriptedGeocoder::new(vec![Ok(vec![]), Ok(vec![])]));
    let mut builder = multi_stop(Arc::clone(&geocoder));
    builder.tap_at(-12.0464, -77.0428)?;
    assert_eq!(builder.wait_for_geocoding(WAIT), 1);

    assert_eq!(builder.waypoints()[0].name(), "Selected Location");
    assert_eq!(geocoder.calls(), 2);
    Ok(())
}

#[test]
fn geocoding_failure_then_success() -> Result<()> {
    let geocoder = ScriptedGeocoder::new(vec![
        Err(LookupError::Unavailable("timeout".to_owned())),
        Ok(vec![candidate(None, None, Some("Cusco"), None, None)]),
    ]);
    let mut builder = multi_stop(geocoder);
    builder.tap_at(-13.5320, -71.9675)?;
    builder.wait_for_geocoding(WAIT);
    assert_eq!(builder.waypoints()[0].name(), "Cusco");
    Ok(())
}

#[test]
fn numeric_feature_name_is_skipped() -> Result<()> {
    let geocoder = ScriptedGeocoder::new(vec![Ok(vec![candidate(
        Some("123"),
        Some("Av. Test"),
        None,
        None,
        None,
    )])]);
    let mut builder = multi_stop(geocoder);
    builder.tap_at(-12.0464, -77.0428)?;
    builder.wait_for_geocoding(WAIT);
    assert_eq!(builder.waypoints()[0].name(), "Av. Test");
    Ok(())
}

#[test]
fn first_stop_expands_panel() -> Result<()> {
    let mut builder = multi_stop(ScriptedGeocoder::empty());
    assert_eq!(builder.panel_state(), PanelState::Hidden);

    builder.tap_at(-12.0464, -77.0428)?;

    assert_eq!(builder.panel_state(), PanelState::Expanded);
    let render = builder.view().last_render().cloned();
    assert!(matches!(
        render.map(|r| r.content),
        Some(PanelContent::List(list)) if list.rows.len() == 1 && list.can_confirm
    ));
    Ok(())
}

#[test]
fn confirmed_tour_reaches_repository() -> Result<()> {
    let mut builder = multi_stop(ScriptedGeocoder::empty());
    builder.tap_at(-12.0464, -77.0428)?;
    builder.tap_at(-13.1631, -72.5450)?;
    builder.confirm()?;

    let tours = &builder.repository().tours;
    assert_eq!(tours.len(), 1);
    let FinalizedTour::MultiStop {
        waypoints,
        total_distance,
        ..
    } = &tours[0]
    else {
        panic!("expected a multi-stop tour");
    };
    assert_eq!(waypoints.len(), 2);
    assert_relative_eq!(*total_distance, Kilometers(503.611784), epsilon = 1e-3);
    Ok(())
}
