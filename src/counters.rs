//! Counter source adapter.
//!
//! Supplies cumulative bytes sent/received since OS boot for either one named
//! interface or the aggregate of all interfaces. Absence of a named interface
//! is an expected condition (unplugged tethering, VPN down) and is reported as
//! `None`, never as an error.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard};
use sysinfo::Networks;

/// Point-in-time byte counters for one selector.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CounterSnapshot {
    pub bytes_sent: u64,
    pub bytes_received: u64,
}

impl CounterSnapshot {
    pub fn new(bytes_sent: u64, bytes_received: u64) -> Self {
        Self {
            bytes_sent,
            bytes_received,
        }
    }

    /// Bytes accrued since `baseline`.
    ///
    /// Each direction is clamped at zero: a counter that went backwards
    /// (reboot without restart, wraparound) contributes nothing.
    pub fn delta_since(&self, baseline: &CounterSnapshot) -> u64 {
        let sent = self.bytes_sent.saturating_sub(baseline.bytes_sent);
        let received = self.bytes_received.saturating_sub(baseline.bytes_received);
        sent.saturating_add(received)
    }
}

/// Which interface(s) usage is measured on.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub enum InterfaceSelector {
    /// Sum over every interface the OS reports.
    #[default]
    Aggregate,
    /// One interface by OS name (e.g. `wlan0`, `usb0`).
    Named(String),
}

impl InterfaceSelector {
    /// Builds a selector from the persisted representation (`None` = aggregate).
    pub fn from_option(name: Option<&str>) -> Self {
        match name {
            Some(name) if !name.is_empty() => InterfaceSelector::Named(name.to_string()),
            _ => InterfaceSelector::Aggregate,
        }
    }

    /// Persisted representation (`None` = aggregate).
    pub fn as_option(&self) -> Option<String> {
        match self {
            InterfaceSelector::Aggregate => None,
            InterfaceSelector::Named(name) => Some(name.clone()),
        }
    }

    pub fn is_aggregate(&self) -> bool {
        matches!(self, InterfaceSelector::Aggregate)
    }
}

impl fmt::Display for InterfaceSelector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InterfaceSelector::Aggregate => write!(f, "all interfaces"),
            InterfaceSelector::Named(name) => write!(f, "{}", name),
        }
    }
}

/// Read-only view of OS network counters.
pub trait CounterSource {
    /// Counters for `selector`, or `None` when a named interface is absent.
    ///
    /// The aggregate selector always yields `Some`.
    fn read(&self, selector: &InterfaceSelector) -> Option<CounterSnapshot>;

    /// Whether `selector` is currently present.
    ///
    /// The aggregate is always live; a named interface is live iff it appears
    /// in the OS interface-stats listing.
    fn is_live(&self, selector: &InterfaceSelector) -> bool {
        match selector {
            InterfaceSelector::Aggregate => true,
            InterfaceSelector::Named(_) => self.read(selector).is_some(),
        }
    }

    /// Counters for `selector`, zeroed when the interface is absent.
    fn snapshot(&self, selector: &InterfaceSelector) -> CounterSnapshot {
        self.read(selector).unwrap_or_default()
    }

    /// Liveness and counters taken from a single read.
    ///
    /// Calling [`is_live`](Self::is_live) and [`snapshot`](Self::snapshot)
    /// separately scans twice, and an interface can vanish in between.
    fn observe(&self, selector: &InterfaceSelector) -> (bool, CounterSnapshot) {
        let read = self.read(selector);
        let live = selector.is_aggregate() || read.is_some();
        (live, read.unwrap_or_default())
    }
}

/// Host counters via `sysinfo`.
///
/// Each call takes a fresh listing so the adapter holds no state between
/// reads; the cost is one scan of `/proc/net/dev` (or the platform equivalent).
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemCounters;

impl SystemCounters {
    pub fn new() -> Self {
        SystemCounters
    }

    /// Names of every interface with available stats, sorted.
    pub fn interfaces(&self) -> Vec<String> {
        let networks = Networks::new_with_refreshed_list();
        let mut names: Vec<String> = networks.iter().map(|(name, _)| name.to_string()).collect();
        names.sort();
        names
    }

    /// Per-interface counters, sorted by name.
    pub fn per_interface(&self) -> Vec<(String, CounterSnapshot)> {
        let networks = Networks::new_with_refreshed_list();
        let mut out: Vec<(String, CounterSnapshot)> = networks
            .iter()
            .map(|(name, data)| {
                (
                    name.to_string(),
                    CounterSnapshot::new(data.total_transmitted(), data.total_received()),
                )
            })
            .collect();
        out.sort_by(|a, b| a.0.cmp(&b.0));
        out
    }
}

impl CounterSource for SystemCounters {
    fn read(&self, selector: &InterfaceSelector) -> Option<CounterSnapshot> {
        let networks = Networks::new_with_refreshed_list();
        match selector {
            InterfaceSelector::Aggregate => {
                let mut total = CounterSnapshot::default();
                for (_name, data) in networks.iter() {
                    total.bytes_sent = total.bytes_sent.saturating_add(data.total_transmitted());
                    total.bytes_received =
                        total.bytes_received.saturating_add(data.total_received());
                }
                Some(total)
            }
            InterfaceSelector::Named(wanted) => networks
                .iter()
                .find(|(name, _)| name.as_str() == wanted.as_str())
                .map(|(_, data)| {
                    CounterSnapshot::new(data.total_transmitted(), data.total_received())
                }),
        }
    }
}

#[derive(Debug, Default)]
struct ManualTable {
    aggregate: CounterSnapshot,
    interfaces: HashMap<String, CounterSnapshot>,
}

/// Counter source fed by the caller.
///
/// For embedding netquota where counters come from somewhere other than the
/// local OS (a router, a container runtime), and for deterministic tests.
/// Clones share one table, so a handle kept by the caller updates what an
/// engine holding another clone reads.
#[derive(Debug, Clone, Default)]
pub struct ManualCounters {
    table: Arc<Mutex<ManualTable>>,
}

impl ManualCounters {
    pub fn new() -> Self {
        Self::default()
    }

    fn table(&self) -> MutexGuard<'_, ManualTable> {
        self.table.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn set_aggregate(&self, snapshot: CounterSnapshot) {
        self.table().aggregate = snapshot;
    }

    /// Add or update an interface; it becomes live.
    pub fn set_interface(&self, name: &str, snapshot: CounterSnapshot) {
        self.table().interfaces.insert(name.to_string(), snapshot);
    }

    /// Drop an interface; it stops being live.
    pub fn remove_interface(&self, name: &str) {
        self.table().interfaces.remove(name);
    }
}

impl CounterSource for ManualCounters {
    fn read(&self, selector: &InterfaceSelector) -> Option<CounterSnapshot> {
        let table = self.table();
        match selector {
            InterfaceSelector::Aggregate => Some(table.aggregate),
            InterfaceSelector::Named(name) => table.interfaces.get(name).copied(),
        }
    }
}
