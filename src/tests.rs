use std::{
    sync::{
        atomic::{AtomicBool, AtomicUsize, Ordering},
        Arc, Mutex,
    },
    time::Duration,
};

use pretty_assertions::assert_eq;
use tokio::sync::Notify;

use crate::*;
use api::ShuttleSource;
use error::Result;
use refresh::{LoopState, RefreshLoop, TickOutcome};
use session::load_campus;
use view::ViewModel;

const PERIOD: Duration = Duration::from_secs(10);

/// In-memory backend. Every campus has two stops and two shuttles whose
/// latitude creeps north on each fetch. The first `simulate` call can be held
/// open to stand in for a slow in-flight tick, and the first `stops` call to
/// stand in for a slow initial load.
#[derive(Default)]
struct MockSource {
    calls: Mutex<Vec<String>>,
    fetches: AtomicUsize,
    fail_stops: AtomicBool,
    fail_shuttles: AtomicBool,
    hold_next_simulate: AtomicBool,
    entered: Notify,
    release: Notify,
    hold_stops: AtomicBool,
    release_stops: Notify,
}

impl MockSource {
    fn new() -> Self {
        Self::default()
    }

    fn holding_first_tick() -> Self {
        let source = Self::default();
        source.hold_next_simulate.store(true, Ordering::SeqCst);
        source
    }

    fn record(&self, call: &str, campus: Campus) {
        self.calls.lock().unwrap().push(format!("{call} {campus}"));
    }

    fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    fn count(&self, call: &str) -> usize {
        self.calls().iter().filter(|c| c.starts_with(call)).count()
    }
}

fn campus_stops(campus: Campus) -> Vec<Stop> {
    vec![
        Stop {
            code: "A".to_string(),
            name: format!("{campus} Gate"),
            latitude: 0.0,
            longitude: 0.0,
        },
        Stop {
            code: "B".to_string(),
            name: format!("{campus} Library"),
            latitude: 0.0,
            longitude: 1.0,
        },
    ]
}

impl ShuttleSource for MockSource {
    async fn stops(&self, campus: Campus) -> Result<Vec<Stop>> {
        self.record("stops", campus);
        if self.hold_stops.swap(false, Ordering::SeqCst) {
            self.release_stops.notified().await;
        }
        if self.fail_stops.load(Ordering::SeqCst) {
            return Err(error::Error::Network("connection refused".to_string()));
        }
        Ok(campus_stops(campus))
    }

    async fn shuttles(&self, campus: Campus) -> Result<Vec<Shuttle>> {
        self.record("shuttles", campus);
        if self.fail_shuttles.load(Ordering::SeqCst) {
            return Err(error::Error::MalformedResponse("expected a list".to_string()));
        }
        let n = self.fetches.fetch_add(1, Ordering::SeqCst) as f64;
        Ok(vec![
            Shuttle {
                id: format!("{campus}-1"),
                identifier: "EV-01".to_string(),
                latitude: Some(n * 0.001),
                longitude: Some(0.5),
                status: Some("en_route".to_string()),
                battery_level: Some(90.0),
                route_name: Some("Loop".to_string()),
            },
            Shuttle {
                id: format!("{campus}-2"),
                identifier: "EV-02".to_string(),
                latitude: None,
                longitude: None,
                status: Some("charging".to_string()),
                battery_level: None,
                route_name: None,
            },
        ])
    }

    async fn simulate(&self, campus: Campus) -> Result<()> {
        self.record("simulate", campus);
        if self.hold_next_simulate.swap(false, Ordering::SeqCst) {
            self.entered.notify_one();
            self.release.notified().await;
        }
        Ok(())
    }
}

async fn loaded_view(source: &MockSource, campus: Campus) -> SharedView {
    let view = SharedView::new(campus);
    let ticket = view.lock().set_campus(campus);
    load_campus(source, &view, ticket).await;
    view
}

#[tokio::test]
async fn initial_load_applies_both_collections() {
    let source = MockSource::new();
    let view = loaded_view(&source, Campus::Abokobi).await;
    let snapshot = view.snapshot();

    assert_eq!(snapshot.stops(), campus_stops(Campus::Abokobi).as_slice());
    assert_eq!(snapshot.shuttles().len(), 2);
    assert!(snapshot.last_updated().is_some());
}

#[tokio::test]
async fn failed_initial_load_keeps_view() {
    let source = MockSource::new();
    source.fail_stops.store(true, Ordering::SeqCst);
    let view = loaded_view(&source, Campus::Tesano).await;

    let snapshot = view.snapshot();
    assert!(snapshot.stops().is_empty());
    assert!(snapshot.shuttles().is_empty());
    assert_eq!(snapshot.last_updated(), None);
}

#[tokio::test]
async fn initial_load_for_old_campus_is_dropped() {
    let source = MockSource::new();
    let view = SharedView::new(Campus::Tesano);
    let old = view.lock().set_campus(Campus::Tesano);
    view.lock().set_campus(Campus::MainCampus);

    load_campus(&source, &view, old).await;

    assert!(view.snapshot().stops().is_empty());
}

#[tokio::test(start_paused = true)]
async fn tick_fires_after_one_period() {
    let source = Arc::new(MockSource::new());
    let view = loaded_view(&source, Campus::Tesano).await;
    let before = view.snapshot();

    let mut refresh = RefreshLoop::new(Arc::clone(&source), view.clone(), PERIOD);
    assert_eq!(refresh.state(), LoopState::Idle);
    refresh.start(Campus::Tesano).unwrap();
    assert_eq!(refresh.state(), LoopState::Scheduled);

    tokio::time::sleep(PERIOD - Duration::from_millis(1)).await;
    assert_eq!(source.count("simulate"), 0);

    tokio::time::sleep(Duration::from_millis(2)).await;
    let after = view.snapshot();
    assert_eq!(&source.calls()[2..], ["simulate Tesano", "shuttles Tesano"]);
    assert_ne!(after.shuttles(), before.shuttles());
    assert_eq!(after.stops(), before.stops());
    assert!(after.last_updated() >= before.last_updated());
    assert_eq!(refresh.state(), LoopState::Scheduled);
}

#[tokio::test(start_paused = true)]
async fn tick_notifies_subscribers() {
    let source = Arc::new(MockSource::new());
    let view = loaded_view(&source, Campus::Tesano).await;
    let mut changes = view.subscribe();

    let mut refresh = RefreshLoop::new(Arc::clone(&source), view.clone(), PERIOD);
    refresh.start(Campus::Tesano).unwrap();

    changes.changed().await.unwrap();
    assert_eq!(source.count("simulate"), 1);
}

#[tokio::test(start_paused = true)]
async fn failed_tick_leaves_view_untouched() {
    let source = Arc::new(MockSource::new());
    let view = loaded_view(&source, Campus::Tesano).await;
    let before = view.snapshot();
    source.fail_shuttles.store(true, Ordering::SeqCst);

    let mut refresh = RefreshLoop::new(Arc::clone(&source), view.clone(), PERIOD);
    refresh.start(Campus::Tesano).unwrap();
    tokio::time::sleep(PERIOD * 2 + Duration::from_millis(1)).await;

    assert_eq!(source.count("simulate"), 2);
    assert_eq!(view.snapshot(), before);
    assert_eq!(refresh.state(), LoopState::Scheduled);
}

#[tokio::test(start_paused = true)]
async fn stop_discards_in_flight_tick() {
    let source = Arc::new(MockSource::holding_first_tick());
    let view = loaded_view(&source, Campus::Tesano).await;
    let before = view.snapshot();

    let mut refresh = RefreshLoop::new(Arc::clone(&source), view.clone(), PERIOD);
    refresh.start(Campus::Tesano).unwrap();
    source.entered.notified().await;
    assert_eq!(refresh.state(), LoopState::Firing);

    refresh.stop();
    assert_eq!(refresh.state(), LoopState::Cancelled);
    source.release.notify_one();
    tokio::time::sleep(PERIOD * 3).await;

    assert_eq!(view.snapshot(), before);
    assert_eq!(source.count("simulate"), 1);
}

#[tokio::test]
async fn late_resolution_after_cancel_is_noop() {
    let source = Arc::new(MockSource::holding_first_tick());
    let view = loaded_view(&source, Campus::Tesano).await;
    let before: ViewModel = view.snapshot();
    let state = Arc::new(Mutex::new(LoopState::Scheduled));

    let tick = tokio::spawn({
        let (source, view, state) = (Arc::clone(&source), view.clone(), Arc::clone(&state));
        async move { refresh::fire(source.as_ref(), &view, &state, Campus::Tesano).await }
    });

    source.entered.notified().await;
    *state.lock().unwrap() = LoopState::Cancelled;
    source.release.notify_one();

    let outcome = tick.await.unwrap();
    assert!(matches!(outcome, TickOutcome::Stale(_)), "{outcome:?}");
    assert_eq!(view.snapshot(), before);
}

#[tokio::test(start_paused = true)]
async fn slow_tick_is_never_overlapped() {
    let source = Arc::new(MockSource::holding_first_tick());
    let view = loaded_view(&source, Campus::Tesano).await;

    let mut refresh = RefreshLoop::new(Arc::clone(&source), view.clone(), PERIOD);
    refresh.start(Campus::Tesano).unwrap();
    source.entered.notified().await;

    tokio::time::sleep(PERIOD * 3).await;
    assert_eq!(source.count("simulate"), 1);
    assert_eq!(refresh.state(), LoopState::Firing);

    source.release.notify_one();
    tokio::time::sleep(PERIOD + Duration::from_millis(1)).await;
    assert!(source.count("simulate") >= 2);
    assert_eq!(refresh.state(), LoopState::Scheduled);
}

#[tokio::test]
async fn loop_starts_once() {
    let source = Arc::new(MockSource::new());
    let view = SharedView::new(Campus::Tesano);
    let mut refresh = RefreshLoop::new(source, view, PERIOD);

    refresh.start(Campus::Tesano).unwrap();
    let err = refresh.start(Campus::Tesano).unwrap_err();
    assert_eq!(err.code(), "already_started");

    refresh.stop();
    assert!(matches!(
        refresh.start(Campus::Tesano),
        Err(error::Error::AlreadyStarted(LoopState::Cancelled))
    ));
}

#[tokio::test(start_paused = true)]
async fn campus_switch_mid_flight_never_mixes() {
    let source = Arc::new(MockSource::holding_first_tick());
    let mut session = Session::new(Arc::clone(&source), Campus::Tesano, PERIOD);
    session.select_campus(Campus::Tesano).unwrap();

    source.entered.notified().await;
    assert_eq!(session.view().snapshot().stops(), campus_stops(Campus::Tesano).as_slice());

    session.select_campus(Campus::Abokobi).unwrap();
    source.release.notify_one();
    tokio::time::sleep(PERIOD * 2 + Duration::from_millis(1)).await;

    let snapshot = session.view().snapshot();
    assert_eq!(snapshot.campus(), Campus::Abokobi);
    assert_eq!(snapshot.stops(), campus_stops(Campus::Abokobi).as_slice());
    assert!(snapshot.shuttles().iter().all(|s| s.id.starts_with("Abokobi")));
    assert!(source.count("simulate Abokobi") >= 1);
    assert!(session.is_live());
}

#[tokio::test(start_paused = true)]
async fn stop_live_keeps_last_snapshot() {
    let source = Arc::new(MockSource::new());
    let mut session = Session::new(Arc::clone(&source), Campus::MainCampus, PERIOD);
    session.select_campus(Campus::MainCampus).unwrap();
    tokio::time::sleep(PERIOD + Duration::from_millis(1)).await;

    session.stop_live();
    let before = session.view().snapshot();
    tokio::time::sleep(PERIOD * 3).await;

    assert!(!session.is_live());
    assert_eq!(session.view().snapshot(), before);
    assert_eq!(before.stops().len(), 2);
    assert_eq!(source.count("simulate"), 1);
}

#[tokio::test(start_paused = true)]
async fn slow_stops_survive_an_earlier_tick() {
    let source = Arc::new(MockSource::new());
    source.hold_stops.store(true, Ordering::SeqCst);
    let mut session = Session::new(Arc::clone(&source), Campus::Tesano, PERIOD);
    session.select_campus(Campus::Tesano).unwrap();

    tokio::time::sleep(PERIOD + Duration::from_millis(1)).await;
    assert_eq!(source.count("simulate"), 1);
    assert!(session.view().snapshot().stops().is_empty());

    source.release_stops.notify_one();
    tokio::time::sleep(Duration::from_millis(1)).await;

    let snapshot = session.view().snapshot();
    assert_eq!(snapshot.stops(), campus_stops(Campus::Tesano).as_slice());
    assert_ne!(snapshot.shuttles()[0].latitude, Some(0.0));
    let frame = session.view().lock().frame(&projector::Canvas::default(), 3);
    assert_eq!(frame.stops.len(), 2);
    assert_eq!(frame.distances.len(), 2);
}

#[tokio::test(start_paused = true)]
async fn resume_live_keeps_snapshot_and_ticks_again() {
    let source = Arc::new(MockSource::new());
    let mut session = Session::new(Arc::clone(&source), Campus::Abokobi, PERIOD);
    session.select_campus(Campus::Abokobi).unwrap();
    tokio::time::sleep(PERIOD + Duration::from_millis(1)).await;

    session.stop_live();
    let before = session.view().snapshot();
    session.resume_live().unwrap();

    assert!(session.is_live());
    assert_eq!(session.view().snapshot(), before);
    assert_eq!(source.count("stops"), 1);

    session.resume_live().unwrap();
    tokio::time::sleep(PERIOD + Duration::from_millis(1)).await;

    let after = session.view().snapshot();
    assert_eq!(source.count("simulate"), 2);
    assert_eq!(after.stops(), before.stops());
    assert_ne!(after.shuttles(), before.shuttles());
}

#[test]
fn parses_commands() {
    assert_eq!(parse_command("help").unwrap(), Command::Help);
    assert_eq!(parse_command("/campus main campus").unwrap(), Command::Campus(Campus::MainCampus));
    assert_eq!(parse_command("  STOP ").unwrap(), Command::Stop);
    assert!(parse_command("campus legon").is_err());
    assert!(parse_command("fly").is_err());
}

#[test]
fn parses_booking() {
    let cmd = parse_command("book - B ama@gctu.edu.gh Ama Mensah").unwrap();
    assert_eq!(
        cmd,
        Command::Book(BookingArgs {
            pickup: None,
            dropoff: Some("B".to_string()),
            email: "ama@gctu.edu.gh".to_string(),
            name: "Ama Mensah".to_string(),
            scheduled_time: None,
        })
    );

    let Command::Book(args) = parse_command("book A B ama@gctu.edu.gh Ama @2026-10-15T09:30").unwrap() else {
        panic!("expected a booking");
    };
    assert_eq!(args.name, "Ama");
    assert!(args.scheduled_time.is_some());

    assert!(parse_command("book A B").is_err());
    assert!(parse_command("book A B ama@x.edu Ama @tomorrow").is_err());
}
