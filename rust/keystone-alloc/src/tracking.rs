//! Call-site diagnostics for slack decisions.
//!
//! When the `slack-tracking` feature is enabled, every slack calculation is
//! reported to the installed [`SlackTracker`] together with the source
//! location that triggered it. Containers mark their resizing methods with
//! `#[track_caller]` under the same feature, so the location points at user
//! code rather than at the container internals.
//!
//! Reporting never changes the value a calculation returns. Without the
//! feature, the calls are compiled out entirely.

use std::{
    panic::Location,
    sync::{Arc, Mutex, OnceLock, PoisonError},
};

use ahash::HashMap;
use keystone_common::{Result, error::Error};

use crate::policy::SizeType;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SlackOp {
    Reserve,
    Grow,
    Shrink,
}

/// One slack decision.
#[derive(Debug, Clone, Copy)]
pub struct SlackSample {
    pub op: SlackOp,
    /// Requested element count.
    pub element_count: SizeType,
    /// Capacity before the decision (0 for reserve).
    pub allocated_count: SizeType,
    pub bytes_per_element: usize,
    /// Capacity returned by the calculation.
    pub slack: SizeType,
    pub location: &'static Location<'static>,
}

impl SlackSample {
    /// Slots handed out beyond the requested count.
    pub fn spare_slots(&self) -> u64 {
        (i64::from(self.slack) - i64::from(self.element_count)).max(0) as u64
    }

    pub fn spare_bytes(&self) -> u64 {
        self.spare_slots()
            .saturating_mul(self.bytes_per_element as u64)
    }
}

/// Receiver of slack samples. Called synchronously from the container that
/// made the decision, possibly from several threads at once.
pub trait SlackTracker: Send + Sync {
    fn record(&self, sample: &SlackSample);
}

static TRACKER: OnceLock<Arc<dyn SlackTracker>> = OnceLock::new();

/// Installs the process-wide slack tracker. Only one tracker can ever be
/// installed.
pub fn install_slack_tracker(tracker: Arc<dyn SlackTracker>) -> Result<()> {
    TRACKER
        .set(tracker)
        .map_err(|_| Error::invalid_operation("a slack tracker is already installed"))?;
    log::info!(
        "slack tracker installed (reporting {})",
        if cfg!(feature = "slack-tracking") {
            "enabled"
        } else {
            "disabled at compile time"
        }
    );
    Ok(())
}

pub fn installed_tracker() -> Option<&'static Arc<dyn SlackTracker>> {
    TRACKER.get()
}

#[cfg(feature = "slack-tracking")]
#[track_caller]
pub(crate) fn report(
    op: SlackOp,
    element_count: SizeType,
    allocated_count: SizeType,
    bytes_per_element: usize,
    slack: SizeType,
) {
    if let Some(tracker) = TRACKER.get() {
        tracker.record(&SlackSample {
            op,
            element_count,
            allocated_count,
            bytes_per_element,
            slack,
            location: Location::caller(),
        });
    }
}

/// Writes every sample to the `log` facade at trace level.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogSlackTracker;

impl SlackTracker for LogSlackTracker {
    fn record(&self, sample: &SlackSample) {
        log::trace!(
            "{:?} at {}: {} -> {} slots (was {}, {} bytes each)",
            sample.op,
            sample.location,
            sample.element_count,
            sample.slack,
            sample.allocated_count,
            sample.bytes_per_element,
        );
    }
}

/// Totals of the samples reported from one call site.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SiteStats {
    pub reserves: u64,
    pub grows: u64,
    pub shrinks: u64,
    /// Sum of the slots returned beyond the requested counts.
    pub spare_slots: u64,
    pub spare_bytes: u64,
}

impl SiteStats {
    pub fn samples(&self) -> u64 {
        self.reserves + self.grows + self.shrinks
    }

    fn add(&mut self, sample: &SlackSample) {
        match sample.op {
            SlackOp::Reserve => self.reserves += 1,
            SlackOp::Grow => self.grows += 1,
            SlackOp::Shrink => self.shrinks += 1,
        }
        self.spare_slots = self.spare_slots.saturating_add(sample.spare_slots());
        self.spare_bytes = self.spare_bytes.saturating_add(sample.spare_bytes());
    }
}

/// Aggregates samples per call site.
#[derive(Debug, Default)]
pub struct SlackReport {
    sites: Mutex<HashMap<&'static Location<'static>, SiteStats>>,
}

impl SlackReport {
    pub fn new() -> SlackReport {
        Default::default()
    }

    pub fn site(&self, location: &'static Location<'static>) -> Option<SiteStats> {
        self.lock().get(location).copied()
    }

    /// All call sites, most spare bytes first.
    pub fn snapshot(&self) -> Vec<(&'static Location<'static>, SiteStats)> {
        let mut sites = self
            .lock()
            .iter()
            .map(|(location, stats)| (*location, *stats))
            .collect::<Vec<_>>();
        sites.sort_by(|a, b| {
            b.1.spare_bytes
                .cmp(&a.1.spare_bytes)
                .then_with(|| a.0.file().cmp(b.0.file()))
                .then_with(|| a.0.line().cmp(&b.0.line()))
        });
        sites
    }

    pub fn clear(&self) {
        self.lock().clear();
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<&'static Location<'static>, SiteStats>> {
        self.sites.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl SlackTracker for SlackReport {
    fn record(&self, sample: &SlackSample) {
        self.lock().entry(sample.location).or_default().add(sample);
    }
}
