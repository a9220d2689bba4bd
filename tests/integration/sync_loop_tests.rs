//! Integration tests for the sensors → safety → store → supervisor loop.
//!
//! Every test wires a real [`ValveSyncLoop`] and [`ValveStore`] to the
//! mocks in `mock_hw` and checks what reached the relay, the flash and
//! the supervisor.

use gasvalve::app::events::{AppEvent, ChangeCause};
use gasvalve::app::ports::StorageError;
use gasvalve::app::service::{FALLBACK_WEIGHT, ValveSyncLoop};
use gasvalve::config::SystemConfig;
use gasvalve::error::{Error, NetworkError, SensorError};
use gasvalve::safety::Verdict;
use gasvalve::store::ValveStore;
use gasvalve::valve::ValveState;

use crate::mock_hw::{
    MockHardware, MockSupervisor, MockWatchdog, RecordingSink, SharedFlash,
};

struct Rig {
    app: ValveSyncLoop<SharedFlash>,
    hw: MockHardware,
    sup: MockSupervisor,
    wdt: MockWatchdog,
    sink: RecordingSink,
    flash: SharedFlash,
}

/// Boot a loop over `flash` (pre-seeded with `stored`, if any).
fn boot(flash: SharedFlash, stored: Option<ValveState>, gas: u16, sup: MockSupervisor) -> Rig {
    if let Some(state) = stored {
        ValveStore::new(flash.clone()).store(state).unwrap();
    }
    let mut app = ValveSyncLoop::new(&SystemConfig::default(), ValveStore::new(flash.clone()));
    let mut hw = MockHardware::with_gas(gas);
    let mut sink = RecordingSink::default();
    app.start(&mut hw, &mut sink);
    Rig {
        app,
        hw,
        sup,
        wdt: MockWatchdog::default(),
        sink,
        flash,
    }
}

impl Rig {
    fn tick(&mut self) -> gasvalve::app::service::TickReport {
        let report = self
            .app
            .tick(&mut self.hw, &mut self.sup, &mut self.wdt, &mut self.sink);
        // The relay and the in-memory state never disagree after an iteration.
        assert_eq!(self.hw.level(), Some(self.app.valve()));
        report
    }
}

// ── Emergency path ────────────────────────────────────────────

#[test]
fn gas_520_closes_open_valve_without_fetching() {
    let flash = SharedFlash::new();
    let mut sup = MockSupervisor::wanting(ValveState::Open);
    sup.watch = Some(flash.clone());
    let mut rig = boot(flash, Some(ValveState::Open), 520, sup);
    assert_eq!(rig.hw.level(), Some(ValveState::Open));

    let report = rig.tick();

    assert_eq!(report.verdict, Verdict::Emergency);
    assert_eq!(report.valve, ValveState::Closed);
    assert!(report.changed);
    assert!(!report.fetched_target);
    assert_eq!(rig.sup.fetches, 0);
    assert_eq!(rig.flash.valve_byte(), Some(0));

    // Telemetry still goes out, but only after the closure was committed.
    assert_eq!(rig.sup.reports.len(), 1);
    assert_eq!(rig.sup.reports[0].gas_concentration, 520);
    assert_eq!(rig.sup.byte_at_report, vec![Some(0)]);

    assert!(rig.sink.events.contains(&AppEvent::EmergencyShutoff { gas: Some(520) }));
    assert!(rig.sink.events.contains(&AppEvent::ValveChanged {
        from: ValveState::Open,
        to: ValveState::Closed,
        cause: ChangeCause::Emergency,
    }));
}

#[test]
fn gas_at_threshold_is_not_an_emergency() {
    let mut rig = boot(
        SharedFlash::new(),
        None,
        500,
        MockSupervisor::wanting(ValveState::Closed),
    );
    let report = rig.tick();
    assert_eq!(report.verdict, Verdict::Normal);
    assert!(report.fetched_target);
    assert_eq!(rig.sup.fetches, 1);
}

#[test]
fn sustained_emergency_drives_closed_every_iteration_but_writes_once() {
    let mut rig = boot(
        SharedFlash::new(),
        Some(ValveState::Open),
        900,
        MockSupervisor::wanting(ValveState::Open),
    );
    let writes_before = rig.flash.writes();

    for _ in 0..3 {
        let report = rig.tick();
        assert_eq!(report.valve, ValveState::Closed);
    }

    // start() drove the restored level, then one Closed per iteration.
    assert_eq!(
        rig.hw.drives,
        vec![
            ValveState::Open,
            ValveState::Closed,
            ValveState::Closed,
            ValveState::Closed
        ]
    );
    assert_eq!(rig.flash.writes(), writes_before + 1);
    assert_eq!(rig.sup.fetches, 0);
}

#[test]
fn unreadable_gas_sensor_is_an_emergency() {
    let mut rig = boot(
        SharedFlash::new(),
        Some(ValveState::Open),
        0,
        MockSupervisor::wanting(ValveState::Open),
    );
    rig.hw.gas = Err(SensorError::AdcReadFailed);

    let report = rig.tick();

    assert_eq!(report.verdict, Verdict::Emergency);
    assert_eq!(report.valve, ValveState::Closed);
    assert_eq!(rig.flash.valve_byte(), Some(0));
    assert_eq!(rig.sup.fetches, 0);
    // No gas reading, so nothing meaningful to report.
    assert!(rig.sup.reports.is_empty());
    assert!(report.errors.contains(&Error::Sensor(SensorError::AdcReadFailed)));
    assert!(rig.sink.events.contains(&AppEvent::EmergencyShutoff { gas: None }));
}

#[test]
fn emergency_closes_even_when_store_rejects_the_write() {
    let flash = SharedFlash::new();
    let mut rig = boot(
        flash,
        Some(ValveState::Open),
        700,
        MockSupervisor::wanting(ValveState::Open),
    );
    rig.flash.set_fail_writes(true);

    let report = rig.tick();

    assert_eq!(rig.hw.level(), Some(ValveState::Closed));
    assert!(!rig.app.is_persistence_trusted());
    assert!(report.errors.contains(&Error::Storage(StorageError::IoError)));
    // The stale Open byte is still on flash; the trust flag says so.
    assert_eq!(rig.flash.valve_byte(), Some(1));
}

// ── Remote path ───────────────────────────────────────────────

#[test]
fn remote_open_is_applied_and_persisted() {
    let mut rig = boot(
        SharedFlash::new(),
        None,
        100,
        MockSupervisor::wanting(ValveState::Open),
    );
    assert_eq!(rig.app.valve(), ValveState::Closed);

    let report = rig.tick();

    assert_eq!(report.verdict, Verdict::Normal);
    assert_eq!(report.valve, ValveState::Open);
    assert!(report.changed);
    assert!(report.errors.is_empty());
    assert_eq!(rig.hw.level(), Some(ValveState::Open));
    assert_eq!(rig.flash.valve_byte(), Some(1));
    assert!(rig.sink.events.contains(&AppEvent::ValveChanged {
        from: ValveState::Closed,
        to: ValveState::Open,
        cause: ChangeCause::Remote,
    }));
}

#[test]
fn telemetry_is_reported_before_fetching() {
    let mut rig = boot(
        SharedFlash::new(),
        None,
        321,
        MockSupervisor::wanting(ValveState::Closed),
    );
    rig.hw.weight = Ok(7.25);
    rig.tick();
    assert_eq!(rig.sup.reports.len(), 1);
    assert_eq!(rig.sup.reports[0].gas_concentration, 321);
    assert!((rig.sup.reports[0].weight - 7.25).abs() < f32::EPSILON);
}

#[test]
fn matching_remote_target_is_a_no_op() {
    let mut rig = boot(
        SharedFlash::new(),
        Some(ValveState::Open),
        100,
        MockSupervisor::wanting(ValveState::Open),
    );
    let writes_before = rig.flash.writes();

    let report = rig.tick();

    assert!(!report.changed);
    // Only the drive from start().
    assert_eq!(rig.hw.drives, vec![ValveState::Open]);
    assert_eq!(rig.flash.writes(), writes_before);

    assert!(!rig
        .app
        .apply_remote_target(ValveState::Open, &mut rig.hw, &mut rig.sink));
    assert_eq!(rig.hw.drives.len(), 1);
}

#[test]
fn failed_fetch_leaves_state_untouched() {
    let mut rig = boot(
        SharedFlash::new(),
        Some(ValveState::Open),
        100,
        MockSupervisor::unreachable(),
    );
    let writes_before = rig.flash.writes();

    let report = rig.tick();

    assert_eq!(report.valve, ValveState::Open);
    assert!(!report.changed);
    assert_eq!(rig.hw.drives, vec![ValveState::Open]);
    assert_eq!(rig.flash.writes(), writes_before);
    assert_eq!(
        report.errors.as_slice(),
        &[
            Error::Network(NetworkError::Timeout),
            Error::Network(NetworkError::Timeout)
        ]
    );
    assert_eq!(
        rig.sink
            .count(|e| matches!(e, AppEvent::SupervisorUnreachable(_))),
        2
    );
}

#[test]
fn failed_report_does_not_block_fetch() {
    let mut sup = MockSupervisor::wanting(ValveState::Open);
    sup.report_result = Err(NetworkError::Status(503));
    let mut rig = boot(SharedFlash::new(), None, 100, sup);

    let report = rig.tick();

    assert_eq!(rig.sup.fetches, 1);
    assert_eq!(report.valve, ValveState::Open);
    assert_eq!(
        report.errors.as_slice(),
        &[Error::Network(NetworkError::Status(503))]
    );
}

#[test]
fn weight_failure_reports_last_good_weight() {
    let mut rig = boot(
        SharedFlash::new(),
        None,
        100,
        MockSupervisor::wanting(ValveState::Open),
    );
    rig.hw.weight = Ok(9.5);
    rig.tick();
    rig.hw.weight = Err(SensorError::NotReady);

    let report = rig.tick();

    assert_eq!(rig.sup.reports.len(), 2);
    assert_eq!(rig.sup.reports[1].gas_concentration, 100);
    assert!((rig.sup.reports[1].weight - 9.5).abs() < f32::EPSILON);
    assert_eq!(rig.sup.fetches, 2);
    assert_eq!(report.valve, ValveState::Open);
    assert!(report.errors.contains(&Error::Sensor(SensorError::NotReady)));
}

#[test]
fn emergency_with_dead_load_cell_still_reports_gas() {
    let mut rig = boot(
        SharedFlash::new(),
        Some(ValveState::Open),
        900,
        MockSupervisor::wanting(ValveState::Open),
    );
    rig.hw.weight = Err(SensorError::NotReady);

    let report = rig.tick();

    assert_eq!(report.verdict, Verdict::Emergency);
    assert_eq!(report.valve, ValveState::Closed);
    assert_eq!(rig.sup.fetches, 0);
    assert_eq!(rig.sup.reports.len(), 1);
    assert_eq!(rig.sup.reports[0].gas_concentration, 900);
    assert!((rig.sup.reports[0].weight - FALLBACK_WEIGHT).abs() < f32::EPSILON);
}

// ── Persistence ───────────────────────────────────────────────

#[test]
fn never_written_store_boots_closed() {
    let rig = boot(
        SharedFlash::new(),
        None,
        100,
        MockSupervisor::unreachable(),
    );
    assert_eq!(rig.app.valve(), ValveState::Closed);
    assert_eq!(rig.hw.drives, vec![ValveState::Closed]);
    assert!(rig
        .sink
        .events
        .contains(&AppEvent::Started(ValveState::Closed)));
}

#[test]
fn unreadable_store_at_boot_is_untrusted_and_overwritten() {
    let flash = SharedFlash::new();
    ValveStore::new(flash.clone()).store(ValveState::Open).unwrap();
    flash.set_fail_reads(true);

    let mut rig = boot(
        flash.clone(),
        None,
        100,
        MockSupervisor::wanting(ValveState::Closed),
    );
    assert_eq!(rig.app.valve(), ValveState::Closed);
    assert_eq!(rig.hw.drives, vec![ValveState::Closed]);
    assert!(!rig.app.is_persistence_trusted());

    // Reads still failing: the write lands but cannot be confirmed.
    let first = rig.tick();
    assert!(first.errors.contains(&Error::Storage(StorageError::VerifyFailed)));
    assert!(!rig.app.is_persistence_trusted());
    assert_eq!(flash.valve_byte(), Some(0));

    flash.set_fail_reads(false);
    for _ in 0..3 {
        rig.tick();
    }
    assert_eq!(rig.app.valve(), ValveState::Closed);
    assert!(rig.app.is_persistence_trusted());
    assert_eq!(flash.valve_byte(), Some(0));
    assert!(rig
        .sink
        .events
        .contains(&AppEvent::PersistRecovered(ValveState::Closed)));
}

#[test]
fn state_survives_reboot() {
    let flash = SharedFlash::new();
    let mut rig = boot(
        flash.clone(),
        None,
        100,
        MockSupervisor::wanting(ValveState::Open),
    );
    rig.tick();
    assert_eq!(rig.app.valve(), ValveState::Open);
    let medium = rig.app.into_store().into_inner();

    // Power cycle: fresh loop, fresh relay, same flash contents.
    let rebooted = boot(medium, None, 100, MockSupervisor::unreachable());
    assert_eq!(rebooted.app.valve(), ValveState::Open);
    assert_eq!(rebooted.hw.drives, vec![ValveState::Open]);
    assert_eq!(flash.valve_byte(), Some(1));
}

#[test]
fn failed_write_is_retried_until_committed() {
    let mut rig = boot(
        SharedFlash::new(),
        None,
        100,
        MockSupervisor::wanting(ValveState::Open),
    );
    rig.flash.set_fail_writes(true);

    let first = rig.tick();
    assert_eq!(first.valve, ValveState::Open);
    assert_eq!(rig.hw.level(), Some(ValveState::Open));
    assert!(!rig.app.is_persistence_trusted());
    assert!(first.errors.contains(&Error::Storage(StorageError::IoError)));
    assert_eq!(rig.flash.valve_byte(), None);
    assert!(rig.sink.events.contains(&AppEvent::PersistFailed {
        state: ValveState::Open,
        error: StorageError::IoError,
    }));

    // Still failing: retried, still untrusted.
    let second = rig.tick();
    assert!(second.errors.contains(&Error::Storage(StorageError::IoError)));
    assert!(!rig.app.is_persistence_trusted());

    // Medium recovers: the pending write lands without any new target.
    rig.flash.set_fail_writes(false);
    let third = rig.tick();
    assert!(third.errors.is_empty());
    assert!(rig.app.is_persistence_trusted());
    assert_eq!(rig.flash.valve_byte(), Some(1));
    assert!(rig
        .sink
        .events
        .contains(&AppEvent::PersistRecovered(ValveState::Open)));
}

// ── Watchdog ──────────────────────────────────────────────────

#[test]
fn watchdog_fed_around_every_network_call() {
    let mut rig = boot(
        SharedFlash::new(),
        None,
        100,
        MockSupervisor::wanting(ValveState::Closed),
    );
    rig.tick();
    // Iteration start, before+after report, before+after fetch.
    assert_eq!(rig.wdt.feeds, 5);
}

#[test]
fn watchdog_fed_on_emergency_iteration() {
    let mut rig = boot(
        SharedFlash::new(),
        None,
        800,
        MockSupervisor::wanting(ValveState::Open),
    );
    rig.tick();
    // Iteration start, before+after report.
    assert_eq!(rig.wdt.feeds, 3);
}

#[test]
fn tick_counter_advances() {
    let mut rig = boot(
        SharedFlash::new(),
        None,
        100,
        MockSupervisor::unreachable(),
    );
    for _ in 0..4 {
        rig.tick();
    }
    assert_eq!(rig.app.tick_count(), 4);
}
