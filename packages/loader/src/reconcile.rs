//! Reconciliation of parsed bundles against a scheduler.
//!
//! Bundles are applied one at a time: the job first, then each of its
//! triggers. A failure stops the call immediately, so a bundle may be left
//! partially applied.

use serde::Serialize;

use crate::error::{LoaderError, Result};
use crate::model::{BundleRegistry, JobBundle, JobKey};
use crate::scheduler::Scheduler;

/// What happened to one bundle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BundleOutcome {
    /// The job and all of its triggers were written.
    Scheduled(JobKey),
    /// The job already exists and overwriting is disabled.
    Skipped(JobKey),
    /// The bundle has no job detail.
    Invalid,
}

/// Jobs written and jobs left alone by one reconciliation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ReconcileReport {
    pub scheduled: Vec<JobKey>,
    pub skipped: Vec<JobKey>,
}

impl ReconcileReport {
    fn record(&mut self, outcome: BundleOutcome) {
        match outcome {
            BundleOutcome::Scheduled(key) => self.scheduled.push(key),
            BundleOutcome::Skipped(key) => self.skipped.push(key),
            BundleOutcome::Invalid => {}
        }
    }
}

/// Apply every bundle in registry order.
///
/// # Errors
/// Returns [`LoaderError::NonDurableJobWithoutTriggers`] for a non-durable
/// job without triggers and [`LoaderError::Scheduler`] for any scheduler
/// failure. Bundles before the failing one stay applied.
pub fn reconcile<S: Scheduler + ?Sized>(
    bundles: &BundleRegistry,
    scheduler: &mut S,
    overwrite: bool,
) -> Result<ReconcileReport> {
    tracing::info!(bundles = bundles.len(), overwrite, "Reconciling job bundles");

    let mut report = ReconcileReport::default();
    for bundle in bundles.bundles() {
        report.record(schedule_bundle(bundle, scheduler, overwrite)?);
    }

    tracing::info!(
        scheduled = report.scheduled.len(),
        skipped = report.skipped.len(),
        "Reconciliation complete"
    );
    Ok(report)
}

/// Apply a single bundle.
///
/// # Errors
/// See [`reconcile`].
pub fn schedule_bundle<S: Scheduler + ?Sized>(
    bundle: &JobBundle,
    scheduler: &mut S,
    overwrite: bool,
) -> Result<BundleOutcome> {
    let Some(detail) = &bundle.job_detail else {
        tracing::debug!("Skipping bundle without job detail");
        return Ok(BundleOutcome::Invalid);
    };
    let key = &detail.key;

    let existing = scheduler.job_detail(key)?;
    if existing.is_some() && !overwrite {
        tracing::debug!(job = %key, "Not overwriting existing job");
        return Ok(BundleOutcome::Skipped(key.clone()));
    }

    if bundle.triggers.is_empty() && !detail.durable {
        return Err(LoaderError::NonDurableJobWithoutTriggers(key.full_name()));
    }

    tracing::debug!(
        job = %key,
        replacing = existing.is_some(),
        class = %detail.job_class,
        "Adding job"
    );
    scheduler.add_job(detail, true)?;

    for declared in &bundle.triggers {
        let mut trigger = declared.clone();
        trigger.stamp(key);

        if scheduler.trigger(&trigger.key)?.is_some() {
            tracing::debug!(trigger = %trigger.key, job = %key, "Rescheduling trigger");
            scheduler.reschedule_job(&trigger.key, &trigger)?;
        } else {
            tracing::debug!(trigger = %trigger.key, job = %key, "Scheduling trigger");
            scheduler.schedule_job(&trigger)?;
        }
    }

    Ok(BundleOutcome::Scheduled(key.clone()))
}
