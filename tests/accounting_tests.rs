//! End-to-end accounting behaviour through the public API:
//! commits, restarts, interface churn and manual corrections.

mod test_support;

use netquota::common::BYTES_PER_GB;
use netquota::{
    ConfigUpdate, CounterSnapshot, CounterSource, InterfaceSelector, ManualCounters, QuotaError,
    StateStore, UsageEngine,
};
use std::cell::Cell;
use std::fs;
use std::rc::Rc;
use tempfile::TempDir;

fn snap(sent: u64, received: u64) -> CounterSnapshot {
    CounterSnapshot::new(sent, received)
}

/// A store whose saved state already selects `name`.
fn store_selecting(name: &str) -> (TempDir, StateStore) {
    let (dir, store) = test_support::temp_store();
    fs::write(
        store.path(),
        format!(r#"{{"total_limit_gb": 50.0, "selected_interface": "{}"}}"#, name),
    )
    .unwrap();
    (dir, store)
}

/// Counters that lose one read after a set number of good ones, the way an
/// interface can vanish between two OS scans.
struct FlickeringCounters {
    inner: ManualCounters,
    reads_before_drop: Rc<Cell<Option<u32>>>,
}

impl CounterSource for FlickeringCounters {
    fn read(&self, selector: &InterfaceSelector) -> Option<CounterSnapshot> {
        match self.reads_before_drop.get() {
            Some(0) => {
                self.reads_before_drop.set(None);
                return None;
            }
            Some(n) => self.reads_before_drop.set(Some(n - 1)),
            None => {}
        }
        self.inner.read(selector)
    }
}

#[test]
fn test_second_commit_without_traffic_adds_zero() {
    let _guard = test_support::init();
    let (_dir, store) = test_support::temp_store();
    let counters = ManualCounters::new();
    counters.set_aggregate(snap(1_000, 1_000));
    let mut engine = UsageEngine::open(store, counters.clone());

    counters.set_aggregate(snap(4_000, 2_000));
    assert_eq!(engine.commit().unwrap(), 4_000);
    assert_eq!(engine.commit().unwrap(), 0);
    assert_eq!(engine.state().committed_bytes(), 4_000);
}

#[test]
fn test_reads_between_commits_do_not_double_count() {
    let _guard = test_support::init();
    let (_dir, store) = test_support::temp_store();
    let counters = ManualCounters::new();
    let mut engine = UsageEngine::open(store, counters.clone());

    let steps = [(100, 50), (400, 90), (400, 90), (1_000, 500)];
    let mut expected = 0;
    let mut previous = snap(0, 0);
    for (sent, received) in steps {
        let current = snap(sent, received);
        counters.set_aggregate(current);
        for _ in 0..3 {
            engine.current_usage();
        }
        expected += current.delta_since(&previous);
        previous = current;
        engine.commit().unwrap();
    }

    assert_eq!(engine.state().committed_bytes(), expected);
    assert_eq!(engine.current_usage(), 1_500);
}

#[test]
fn test_usage_survives_restart() {
    let _guard = test_support::init();
    let (_dir, store) = test_support::temp_store();
    let counters = ManualCounters::new();
    counters.set_aggregate(snap(0, 0));

    {
        let mut engine = UsageEngine::open(store.clone(), counters.clone());
        counters.set_aggregate(snap(2_000, 3_000));
        engine.commit().unwrap();
    }

    // new process: counters keep running, baseline is taken fresh
    counters.set_aggregate(snap(9_000, 9_000));
    let mut engine = UsageEngine::open(store, counters.clone());
    assert_eq!(engine.current_usage(), 5_000);

    counters.set_aggregate(snap(9_100, 9_000));
    assert_eq!(engine.current_usage(), 5_100);
}

#[test]
fn test_counter_reset_after_reboot_is_clamped() {
    let _guard = test_support::init();
    let (_dir, store) = test_support::temp_store();
    let counters = ManualCounters::new();
    counters.set_aggregate(snap(50_000, 80_000));
    let mut engine = UsageEngine::open(store, counters.clone());

    counters.set_aggregate(snap(10, 20));
    assert_eq!(engine.live_session_delta(), 0);
    assert_eq!(engine.commit().unwrap(), 0);

    counters.set_aggregate(snap(110, 20));
    assert_eq!(engine.commit().unwrap(), 100);
}

#[test]
fn test_interface_unplug_and_replug_has_no_spike() {
    let _guard = test_support::init();
    let (_dir, store) = test_support::temp_store();
    let counters = ManualCounters::new();
    let mut engine = UsageEngine::open(store, counters.clone());
    engine
        .set_config(
            ConfigUpdate::new(50.0, 1).with_interface(InterfaceSelector::Named("usb0".into())),
        )
        .unwrap();

    // absent: zero counters, not live
    assert_eq!(engine.live_session_delta(), 0);
    assert_eq!(engine.commit().unwrap(), 0);

    counters.set_interface("usb0", snap(10_000_000_000, 5_000_000_000));
    assert_eq!(engine.live_session_delta(), 0);

    counters.set_interface("usb0", snap(10_000_001_000, 5_000_000_000));
    assert_eq!(engine.live_session_delta(), 1_000);
    assert_eq!(engine.commit().unwrap(), 1_000);

    counters.remove_interface("usb0");
    assert_eq!(engine.commit().unwrap(), 0);

    counters.set_interface("usb0", snap(20_000_000_000, 6_000_000_000));
    assert_eq!(engine.commit().unwrap(), 0);
    assert_eq!(engine.current_usage(), 1_000);
}

#[test]
fn test_switch_from_aggregate_ignores_aggregate_counters() {
    let _guard = test_support::init();
    let (_dir, store) = test_support::temp_store();
    let counters = ManualCounters::new();
    counters.set_aggregate(snap(900_000_000, 900_000_000));
    counters.set_interface("wlan0", snap(7_000, 3_000));
    let mut engine = UsageEngine::open(store, counters.clone());

    engine
        .set_config(
            ConfigUpdate::new(50.0, 1).with_interface(InterfaceSelector::Named("wlan0".into())),
        )
        .unwrap();
    assert_eq!(engine.current_usage(), 0);
    assert_eq!(engine.baseline(), snap(7_000, 3_000));

    counters.set_aggregate(snap(999_000_000, 999_000_000));
    counters.set_interface("wlan0", snap(7_500, 3_000));
    assert_eq!(engine.current_usage(), 500);
}

#[test]
fn test_switch_back_to_aggregate() {
    let _guard = test_support::init();
    let (_dir, store) = test_support::temp_store();
    let counters = ManualCounters::new();
    counters.set_interface("wlan0", snap(100, 100));
    let mut engine = UsageEngine::open(store, counters.clone());
    engine
        .set_config(
            ConfigUpdate::new(50.0, 1).with_interface(InterfaceSelector::Named("wlan0".into())),
        )
        .unwrap();

    counters.set_aggregate(snap(1_000_000, 1_000_000));
    engine
        .set_config(ConfigUpdate::new(50.0, 1).with_interface(InterfaceSelector::Aggregate))
        .unwrap();
    assert!(engine.state().selected_interface.is_none());
    assert_eq!(engine.current_usage(), 0);
}

#[test]
fn test_manual_override_replaces_history() {
    let _guard = test_support::init();
    let (_dir, store) = test_support::temp_store();
    let counters = ManualCounters::new();
    let mut engine = UsageEngine::open(store.clone(), counters.clone());

    counters.set_aggregate(snap(25_000_000_000, 15_000_000_000));
    engine.commit().unwrap();
    assert_eq!(engine.state().committed_bytes(), 40_000_000_000);

    engine
        .set_config(ConfigUpdate::new(50.0, 1).with_offset_gb(5.0))
        .unwrap();
    assert_eq!(engine.state().committed_bytes(), 0);
    assert_eq!(engine.state().offset_usage, 5.0);
    assert_eq!(engine.current_usage(), 5 * BYTES_PER_GB);

    // micro-session after the override counts on top
    counters.set_aggregate(snap(25_000_000_100, 15_000_000_000));
    assert_eq!(engine.current_usage(), 5 * BYTES_PER_GB + 100);

    // and the override is what a restart sees
    let persisted = store.load();
    assert_eq!(persisted.offset_usage, 5.0);
    assert_eq!(persisted.committed_bytes(), 0);
}

#[test]
fn test_config_without_offset_keeps_usage() {
    let _guard = test_support::init();
    let (_dir, store) = test_support::temp_store();
    let counters = ManualCounters::new();
    let mut engine = UsageEngine::open(store, counters.clone());

    counters.set_aggregate(snap(3_000, 0));
    engine.set_config(ConfigUpdate::new(100.0, 20)).unwrap();

    assert_eq!(engine.current_usage(), 3_000);
    assert_eq!(engine.state().total_limit_gb, 100.0);
    assert_eq!(engine.state().reset_day, 20);
}

#[test]
fn test_invalid_configuration_is_reported() {
    let _guard = test_support::init();
    let (_dir, store) = test_support::temp_store();
    let mut engine = UsageEngine::open(store, ManualCounters::new());

    for update in [
        ConfigUpdate::new(0.0, 1),
        ConfigUpdate::new(f64::NAN, 1),
        ConfigUpdate::new(50.0, 0),
        ConfigUpdate::new(50.0, 32),
        ConfigUpdate::new(50.0, 1).with_offset_gb(-1.0),
        ConfigUpdate::new(50.0, 1).with_interface(InterfaceSelector::Named("  ".into())),
    ] {
        let err = engine.set_config(update).unwrap_err();
        assert!(matches!(err, QuotaError::InvalidConfiguration(_)), "{}", err);
    }
    assert_eq!(engine.state().total_limit_gb, 50.0);
}

#[test]
fn test_report_against_quota() {
    let _guard = test_support::init();
    let (_dir, store) = test_support::temp_store();
    let counters = ManualCounters::new();
    let mut engine = UsageEngine::open(store, counters.clone());
    engine
        .set_config(ConfigUpdate::new(10.0, 5).with_offset_gb(2.5))
        .unwrap();

    let today = chrono::NaiveDate::from_ymd_opt(2025, 11, 20).unwrap();
    let report = engine.report_at(today);
    assert_eq!(report.used_bytes, 2 * BYTES_PER_GB + BYTES_PER_GB / 2);
    assert_eq!(report.limit_bytes, 10 * BYTES_PER_GB);
    assert!((report.percent_used() - 25.0).abs() < 1e-9);
    assert_eq!(
        report.next_reset,
        chrono::NaiveDate::from_ymd_opt(2025, 12, 5).unwrap()
    );
    assert!(report.interface.is_aggregate());
}

#[test]
fn test_saved_live_interface_counts_first_delta() {
    let _guard = test_support::init();
    let (_dir, store) = store_selecting("usb0");
    let counters = ManualCounters::new();
    counters.set_interface("usb0", snap(1_000, 1_000));

    let mut engine = UsageEngine::open(store, counters.clone());
    assert_eq!(engine.selector(), InterfaceSelector::Named("usb0".into()));
    assert_eq!(engine.baseline(), snap(1_000, 1_000));

    // live at startup: the first traffic is ordinary usage, not a reappearance
    counters.set_interface("usb0", snap(1_500, 1_000));
    assert_eq!(engine.live_session_delta(), 500);
    assert_eq!(engine.commit().unwrap(), 500);
}

#[test]
fn test_saved_absent_interface_appearing_later_has_no_spike() {
    let _guard = test_support::init();
    let (_dir, store) = store_selecting("usb0");
    let counters = ManualCounters::new();

    let mut engine = UsageEngine::open(store, counters.clone());
    assert_eq!(engine.live_session_delta(), 0);
    assert_eq!(engine.commit().unwrap(), 0);

    counters.set_interface("usb0", snap(8_000_000_000, 2_000_000_000));
    assert_eq!(engine.current_usage(), 0);

    counters.set_interface("usb0", snap(8_000_000_300, 2_000_000_000));
    assert_eq!(engine.commit().unwrap(), 300);
    assert_eq!(engine.state().committed_bytes(), 300);
}

#[test]
fn test_interface_vanishing_between_scans_does_not_spike() {
    let _guard = test_support::init();
    let (_dir, store) = store_selecting("usb0");
    let counters = ManualCounters::new();
    counters.set_interface("usb0", snap(10_000_000_000, 5_000_000_000));
    let drop_after = Rc::new(Cell::new(None));
    let source = FlickeringCounters {
        inner: counters.clone(),
        reads_before_drop: Rc::clone(&drop_after),
    };
    let mut engine = UsageEngine::open(store, source);

    // a second scan inside this commit would miss the interface
    drop_after.set(Some(1));
    assert_eq!(engine.commit().unwrap(), 0);
    drop_after.set(None);
    assert_eq!(engine.baseline(), snap(10_000_000_000, 5_000_000_000));

    counters.set_interface("usb0", snap(10_000_000_100, 5_000_000_000));
    assert_eq!(engine.commit().unwrap(), 100);
    assert_eq!(engine.state().committed_bytes(), 100);
}
