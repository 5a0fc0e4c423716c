//! Selection of the object subset one deploy run must attempt.

use chrono::{DateTime, Utc};

use crate::mapping::{DeploymentRecord, Resolution, WorkingMapping};
use crate::types::{ContentPackage, DeployType, MetadataType, RecordMode, RunStatus};

#[derive(Debug)]
pub struct DeltaSelection {
    pub selected: Vec<ContentPackage>,
    /// Packages filtered out by the delta baseline (not by type).
    pub skipped: usize,
    /// Timestamp of the last successful deploy, when one exists.
    pub baseline: Option<DateTime<Utc>>,
}

/// Narrow the checkpointed object set for one run.
///
/// FULL takes every package passing the type filter. DELTA keeps a package if
/// it was never successfully imported into this target (no entry, or an entry
/// still pending — covering retries of previously failed imports) or if it
/// changed after the last successful deploy. With no successful DELTA/FULL
/// record to diff against, DELTA degrades to FULL.
pub fn select_packages(
    deploy_type: DeployType,
    packages: Vec<ContentPackage>,
    working: &WorkingMapping,
    target_history: &[DeploymentRecord],
    metadata_types: &[MetadataType],
) -> DeltaSelection {
    let typed: Vec<ContentPackage> = packages
        .into_iter()
        .filter(|p| metadata_types.is_empty() || metadata_types.contains(&p.metadata_type))
        .collect();

    let baseline = match deploy_type {
        DeployType::Full => None,
        DeployType::Delta => last_successful_deploy(target_history).map(|record| record.at),
    };

    let Some(baseline_at) = baseline else {
        return DeltaSelection {
            selected: typed,
            skipped: 0,
            baseline: None,
        };
    };

    let total = typed.len();
    let selected: Vec<ContentPackage> = typed
        .into_iter()
        .filter(|package| requires_import(package, working, baseline_at))
        .collect();

    DeltaSelection {
        skipped: total - selected.len(),
        baseline: Some(baseline_at),
        selected,
    }
}

fn last_successful_deploy(history: &[DeploymentRecord]) -> Option<&DeploymentRecord> {
    history.iter().rev().find(|record| {
        matches!(record.mode, RecordMode::Delta | RecordMode::Full)
            && record.status != RunStatus::Error
    })
}

fn requires_import(
    package: &ContentPackage,
    working: &WorkingMapping,
    baseline: DateTime<Utc>,
) -> bool {
    match working.resolve(&package.guid) {
        Resolution::Unknown | Resolution::Pending => true,
        Resolution::Mapped(_) | Resolution::Override(_) => package.modified_at > baseline,
    }
}
