//! Usage accounting engine.
//!
//! Turns ever-increasing OS byte counters into a durable "usage so far this
//! cycle" figure:
//!
//! ```text
//! total = committed + live session delta + manual offset
//! ```
//!
//! A session is the span since the baseline snapshot was taken (construction,
//! last commit, interface switch, manual override, or interface reappearance).
//! Only [`UsageEngine::commit`] folds the session into the committed total and
//! moves the baseline, so reads never double count.
//!
//! The engine is single-owner: callers serialize access (one polling thread,
//! or a lock around the engine). Use [`StateStore::lock`] to keep a second
//! process off the same state file.

use chrono::{Datelike, NaiveDate};
use log::{debug, info};

use crate::common;
use crate::counters::{CounterSnapshot, CounterSource, InterfaceSelector};
use crate::cycle;
use crate::display::UsageReport;
use crate::error::{QuotaError, Result};
use crate::state::{StateStore, UsageState};

/// Validated input for [`UsageEngine::set_config`].
#[derive(Debug, Clone, PartialEq)]
pub struct ConfigUpdate {
    /// Monthly quota in gigabytes
    pub quota_gb: f64,
    /// Day of month the cycle resets (1-31)
    pub reset_day: u32,
    /// "Usage so far is exactly this many GB"; discards committed usage
    pub manual_offset_gb: Option<f64>,
    /// Interface to measure.
    ///
    /// `None` keeps the current selection rather than falling back to the
    /// aggregate; pass `Some(InterfaceSelector::Aggregate)` to measure all
    /// interfaces again.
    pub interface: Option<InterfaceSelector>,
}

impl ConfigUpdate {
    pub fn new(quota_gb: f64, reset_day: u32) -> Self {
        ConfigUpdate {
            quota_gb,
            reset_day,
            manual_offset_gb: None,
            interface: None,
        }
    }

    pub fn with_offset_gb(mut self, offset_gb: f64) -> Self {
        self.manual_offset_gb = Some(offset_gb);
        self
    }

    pub fn with_interface(mut self, interface: InterfaceSelector) -> Self {
        self.interface = Some(interface);
        self
    }

    /// Build an update from user-typed text.
    ///
    /// Only plain numeric parsing is applied; anything else is an
    /// [`QuotaError::InvalidConfiguration`].
    pub fn parse(
        quota_gb: &str,
        reset_day: &str,
        manual_offset_gb: Option<&str>,
        interface: Option<&str>,
    ) -> Result<Self> {
        let quota_gb = quota_gb.trim().parse::<f64>().map_err(|_| {
            QuotaError::invalid_config(format!("quota is not a number: {:?}", quota_gb))
        })?;
        let reset_day = reset_day.trim().parse::<u32>().map_err(|_| {
            QuotaError::invalid_config(format!("reset day is not a whole number: {:?}", reset_day))
        })?;
        let manual_offset_gb = manual_offset_gb
            .map(|raw| {
                raw.trim().parse::<f64>().map_err(|_| {
                    QuotaError::invalid_config(format!("usage offset is not a number: {:?}", raw))
                })
            })
            .transpose()?;

        let update = ConfigUpdate {
            quota_gb,
            reset_day,
            manual_offset_gb,
            interface: interface.map(|name| InterfaceSelector::Named(name.trim().to_string())),
        };
        update.validate()?;
        Ok(update)
    }

    pub fn validate(&self) -> Result<()> {
        if !self.quota_gb.is_finite() || self.quota_gb <= 0.0 {
            return Err(QuotaError::invalid_config(format!(
                "quota must be a positive number of GB, got {}",
                self.quota_gb
            )));
        }
        if !(1..=31).contains(&self.reset_day) {
            return Err(QuotaError::invalid_config(format!(
                "reset day must be between 1 and 31, got {}",
                self.reset_day
            )));
        }
        if let Some(offset) = self.manual_offset_gb {
            if !offset.is_finite() || offset < 0.0 {
                return Err(QuotaError::invalid_config(format!(
                    "usage offset must be zero or more GB, got {}",
                    offset
                )));
            }
        }
        if let Some(InterfaceSelector::Named(name)) = &self.interface {
            if name.trim().is_empty() || name.contains('\0') {
                return Err(QuotaError::invalid_config("interface name is empty"));
            }
        }
        Ok(())
    }
}

/// Accounting engine over one state file and one counter source.
pub struct UsageEngine<C: CounterSource> {
    source: C,
    store: StateStore,
    state: UsageState,
    baseline: CounterSnapshot,
    last_live: bool,
    auto_reset: bool,
}

impl<C: CounterSource> UsageEngine<C> {
    /// Load persisted state (defaults on any load problem) and open a session.
    pub fn open(store: StateStore, source: C) -> Self {
        let state = store.load();
        Self::with_state(store, state, source)
    }

    /// Open a session over an already loaded state.
    ///
    /// Liveness starts at whatever the source reports now, so startup never
    /// counts as a reappearance.
    pub fn with_state(store: StateStore, state: UsageState, source: C) -> Self {
        let selector = state.selector();
        let (last_live, baseline) = source.observe(&selector);
        debug!(
            "Session opened on {} (live={}, baseline={:?})",
            selector, last_live, baseline
        );

        UsageEngine {
            source,
            store,
            state,
            baseline,
            last_live,
            auto_reset: false,
        }
    }

    /// Zero usage automatically when a commit finds the reset date has passed.
    pub fn with_auto_reset(mut self, enabled: bool) -> Self {
        self.auto_reset = enabled;
        self
    }

    pub fn state(&self) -> &UsageState {
        &self.state
    }

    pub fn store(&self) -> &StateStore {
        &self.store
    }

    pub fn selector(&self) -> InterfaceSelector {
        self.state.selector()
    }

    pub fn baseline(&self) -> CounterSnapshot {
        self.baseline
    }

    /// Total usage this cycle in bytes.
    ///
    /// Never persists anything. It may still rebase the baseline when the
    /// selected interface has just reappeared.
    pub fn current_usage(&mut self) -> u64 {
        let (live, current) = self.observe();
        let session = self.session_delta(live, current);
        self.state
            .committed_bytes()
            .saturating_add(session)
            .saturating_add(self.state.offset_bytes())
    }

    /// Bytes accrued in the open session.
    pub fn live_session_delta(&mut self) -> u64 {
        let (live, current) = self.observe();
        self.session_delta(live, current)
    }

    /// Fold the session into committed usage and persist.
    ///
    /// Returns the bytes committed. If the save fails the error is returned,
    /// but the in-memory total already includes the session and the baseline
    /// has moved, so the next successful commit writes it without counting it
    /// twice.
    pub fn commit(&mut self) -> Result<u64> {
        self.commit_at(common::today())
    }

    /// [`commit`](Self::commit) with an explicit calendar date for cycle rollover.
    pub fn commit_at(&mut self, today: NaiveDate) -> Result<u64> {
        let committed = self.fold_session();
        if self.auto_reset {
            self.apply_rollover(today);
        }
        self.persist()?;
        Ok(committed)
    }

    /// Apply a quota / reset day / offset / interface change.
    ///
    /// Usage accrued so far is committed under the old settings first.
    pub fn set_config(&mut self, update: ConfigUpdate) -> Result<()> {
        update.validate()?;
        self.commit()?;

        self.state.total_limit_gb = update.quota_gb;
        self.state.reset_day = update.reset_day;

        if let Some(selector) = update.interface {
            if selector != self.selector() {
                info!("Switching measured interface {} -> {}", self.selector(), selector);
                self.state.set_selector(&selector);
                self.rebase();
            }
        }

        if let Some(offset_gb) = update.manual_offset_gb {
            info!(
                "Manual usage override: {} GB (discarding {} committed bytes)",
                offset_gb,
                self.state.committed_bytes()
            );
            self.state.offset_usage = offset_gb;
            self.state.set_committed_bytes(0);
            self.rebase();
        }

        self.persist()
    }

    /// Start a new cycle now: zero committed usage and the manual offset.
    pub fn reset_cycle(&mut self, today: NaiveDate) -> Result<()> {
        self.fold_session();
        self.start_cycle(cycle::last_reset_on_or_before(today, self.state.reset_day), today);
        self.persist()
    }

    /// Usage against quota for display.
    pub fn report(&mut self) -> UsageReport {
        self.report_at(common::today())
    }

    pub fn report_at(&mut self, today: NaiveDate) -> UsageReport {
        let used = self.current_usage();
        UsageReport {
            used_bytes: used,
            limit_bytes: self.state.quota_bytes(),
            interface: self.selector(),
            interface_live: self.last_live,
            next_reset: cycle::upcoming_reset(today, self.state.reset_day),
        }
    }

    fn observe(&self) -> (bool, CounterSnapshot) {
        self.source.observe(&self.selector())
    }

    /// Clamped diff against the baseline, driven by the liveness state machine:
    ///
    /// | was live | live now | result                          |
    /// |----------|----------|---------------------------------|
    /// | false    | false    | 0                               |
    /// | false    | true     | rebase to `current`, 0          |
    /// | true     | true     | clamped diff                    |
    /// | true     | false    | 0                               |
    fn session_delta(&mut self, live_now: bool, current: CounterSnapshot) -> u64 {
        if live_now && !self.last_live {
            info!(
                "Interface {} reappeared, rebasing session at {:?}",
                self.selector(),
                current
            );
            self.baseline = current;
            self.last_live = true;
            return 0;
        }

        if !live_now && self.last_live {
            info!("Interface {} disappeared, pausing accounting", self.selector());
        }
        self.last_live = live_now;

        if !live_now {
            return 0;
        }

        if current.bytes_sent < self.baseline.bytes_sent
            || current.bytes_received < self.baseline.bytes_received
        {
            debug!(
                "Counter went backwards on {} ({:?} -> {:?}), clamping",
                self.selector(),
                self.baseline,
                current
            );
        }

        current.delta_since(&self.baseline)
    }

    /// Add the session delta to committed usage and move the baseline to now.
    fn fold_session(&mut self) -> u64 {
        let (live, current) = self.observe();
        let delta = self.session_delta(live, current);
        let committed = self.state.committed_bytes().saturating_add(delta);
        self.state.set_committed_bytes(committed);
        self.baseline = current;
        debug!("Committed {} bytes (cycle total {})", delta, committed);
        delta
    }

    fn rebase(&mut self) {
        let (live, current) = self.observe();
        self.baseline = current;
        self.last_live = live;
    }

    fn apply_rollover(&mut self, today: NaiveDate) {
        let reset_day = self.state.reset_day;
        let start = self.state.cycle_start.as_deref().and_then(cycle::parse_date);

        match start {
            None => {
                let start = cycle::last_reset_on_or_before(today, reset_day);
                debug!("Cycle start initialised to {}", start);
                self.state.cycle_start = Some(cycle::format_date(start));
                self.state.cycle_month = today.month();
            }
            Some(start) => {
                if let Some(new_start) = cycle::rollover_due(start, reset_day, today) {
                    info!(
                        "Cycle rolled over ({} -> {}), clearing {} bytes of usage",
                        start,
                        new_start,
                        self.state.committed_bytes()
                    );
                    self.start_cycle(new_start, today);
                }
            }
        }
    }

    fn start_cycle(&mut self, start: NaiveDate, today: NaiveDate) {
        self.state.set_committed_bytes(0);
        self.state.offset_usage = 0.0;
        self.state.cycle_start = Some(cycle::format_date(start));
        self.state.cycle_month = today.month();
    }

    fn persist(&mut self) -> Result<()> {
        self.state.last_save_time = common::epoch_seconds();
        self.store.save(&self.state)
    }
}
