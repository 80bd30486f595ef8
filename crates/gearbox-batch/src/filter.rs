//! Work unit filtering: exclude/include lists and recent-run skipping.

use chrono::{DateTime, TimeDelta, Utc};
use gearbox_core::batch::BatchRunOptions;
use gearbox_core::work_unit::WorkUnit;
use serde::Serialize;
use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum SkipReason {
    ExcludedCenter,
    ExcludedStudy,
    NotIncluded,
    RecentRun { last_run: DateTime<Utc> },
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SkipReason::ExcludedCenter => write!(f, "center excluded"),
            SkipReason::ExcludedStudy => write!(f, "study excluded"),
            SkipReason::NotIncluded => write!(f, "not in include list"),
            SkipReason::RecentRun { last_run } => write!(f, "ran at {}", last_run.to_rfc3339()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SkippedUnit {
    pub unit: String,
    pub reason: SkipReason,
}

#[derive(Debug, Clone, Default)]
pub struct FilterOutcome {
    pub kept: Vec<WorkUnit>,
    pub skipped: Vec<SkippedUnit>,
}

/// Filter for one scheduling run of one gear.
pub struct UnitFilter<'a> {
    options: &'a BatchRunOptions,
    gear_name: &'a str,
    now: DateTime<Utc>,
}

impl<'a> UnitFilter<'a> {
    pub fn new(options: &'a BatchRunOptions, gear_name: &'a str, now: DateTime<Utc>) -> Self {
        Self {
            options,
            gear_name,
            now,
        }
    }

    /// Split units into kept and skipped, preserving discovery order.
    pub fn apply(&self, units: Vec<WorkUnit>) -> FilterOutcome {
        let mut outcome = FilterOutcome::default();
        for unit in units {
            match self.check(&unit) {
                None => outcome.kept.push(unit),
                Some(reason) => outcome.skipped.push(SkippedUnit {
                    unit: unit.key(),
                    reason,
                }),
            }
        }
        outcome
    }

    fn check(&self, unit: &WorkUnit) -> Option<SkipReason> {
        let options = self.options;
        let study = unit.study_id.as_deref();

        if options.exclude_centers.contains(&unit.center_id) {
            return Some(SkipReason::ExcludedCenter);
        }
        if study.is_some_and(|s| options.exclude_studies.iter().any(|e| e == s)) {
            return Some(SkipReason::ExcludedStudy);
        }
        if !options.include_centers.is_empty() && !options.include_centers.contains(&unit.center_id)
        {
            return Some(SkipReason::NotIncluded);
        }
        if !options.include_studies.is_empty()
            && !study.is_some_and(|s| options.include_studies.iter().any(|i| i == s))
        {
            return Some(SkipReason::NotIncluded);
        }

        self.recent_run(unit)
    }

    fn recent_run(&self, unit: &WorkUnit) -> Option<SkipReason> {
        if self.options.time_interval_days < 0 {
            return None;
        }
        let last_run = unit.last_run(self.gear_name)?;
        // An interval too large for chrono covers every recorded run.
        let recent = TimeDelta::try_days(self.options.time_interval_days)
            .is_none_or(|interval| self.now - last_run < interval);
        recent.then_some(SkipReason::RecentRun { last_run })
    }
}
