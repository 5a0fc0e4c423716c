//! Deploy run orchestration.
//!
//! One invocation walks `PENDING -> VALIDATING -> IMPORTING -> {COMMITTED |
//! FAILED}` (validate-only runs stop after validation). Mapping state is read
//! before any API call and written back only after per-object outcomes are
//! known, per the active policy.

use std::collections::BTreeMap;
use std::sync::Arc;

use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

use crate::api::{ContentApi, ImportOutcome};
use crate::error::{CoreError, ValidationError};
use crate::mapping::{DeploymentRecord, MappingStore, RecordInfo, merge_mappings};
use crate::types::{ContentPackage, DeployPolicy, Guid, MetadataType, RunStatus};

use super::delta::select_packages;
use super::validate::{PreparedPackage, prepare_package, type_index};
use super::{DeployOptions, DeployReport, ImportedObject, PackageFailure, RunState};

pub struct Deployer<'a> {
    api: Arc<dyn ContentApi>,
    store: &'a dyn MappingStore,
    options: DeployOptions,
}

impl<'a> Deployer<'a> {
    pub fn new(
        api: Arc<dyn ContentApi>,
        store: &'a dyn MappingStore,
        options: DeployOptions,
    ) -> Self {
        Self {
            api,
            store,
            options,
        }
    }

    pub fn options(&self) -> &DeployOptions {
        &self.options
    }

    /// Run one deploy over the checkpointed object set of the source
    /// environment. Per-package errors land in the report; only store/IO
    /// failures and worker crashes surface as `Err`.
    pub async fn run(&self, packages: Vec<ContentPackage>) -> anyhow::Result<DeployReport> {
        let options = &self.options;
        let mode = options.deploy_type.record_mode();

        // mapping state for both sides must load before any API call
        let mut source_file = self.store.load(&options.source)?;
        let mut target_file = self.store.load(&options.target)?;
        let mut working = merge_mappings(&source_file, &target_file);
        let conflicts = working.conflicts().to_vec();

        let selection = select_packages(
            options.deploy_type,
            packages,
            &working,
            &target_file.history,
            &options.metadata_types,
        );
        let selected = selection.selected.len();
        let skipped = selection.skipped;
        info!(
            source = %options.source,
            target = %options.target,
            deploy_type = %options.deploy_type,
            policy = %options.policy,
            selected,
            skipped,
            "deploy selection complete"
        );

        // VALIDATING
        let types_by_guid = type_index(&selection.selected);
        let same_environment = options.source == options.target;
        let prepared: Vec<PreparedPackage> = selection
            .selected
            .iter()
            .map(|package| prepare_package(package, &working, &types_by_guid, same_environment))
            .collect();
        let validation_errors: Vec<ValidationError> = prepared
            .iter()
            .flat_map(|p| p.errors.iter().cloned())
            .collect();

        if options.policy == DeployPolicy::ValidateOnly {
            // dry run: no API calls, no mapping writes, no history
            let ok = validation_errors.is_empty();
            return Ok(DeployReport {
                state: if ok { RunState::Committed } else { RunState::Failed },
                status: if ok { RunStatus::Ok } else { RunStatus::Error },
                deploy_type: options.deploy_type,
                policy: options.policy,
                selected,
                skipped,
                imported: Vec::new(),
                failures: Vec::new(),
                validation_errors,
                conflicts,
                policy_error: None,
            });
        }

        let (valid, invalid): (Vec<PreparedPackage>, Vec<PreparedPackage>) =
            prepared.into_iter().partition(PreparedPackage::is_valid);

        if options.policy == DeployPolicy::AllOrNone && !invalid.is_empty() {
            // nothing could be committed; skip the platform entirely
            let violation = CoreError::PolicyViolation {
                policy: options.policy,
                failed: invalid.len(),
                selected,
            };
            warn!(error = %violation, "aborting before import");
            let record = DeploymentRecord::new(options.actor.clone(), mode, RunStatus::Error)
                .with_info(RecordInfo {
                    objects_imported: Some(0),
                    ..RecordInfo::default()
                });
            self.store.append_history(&options.target, record)?;
            return Ok(DeployReport {
                state: RunState::Failed,
                status: RunStatus::Error,
                deploy_type: options.deploy_type,
                policy: options.policy,
                selected,
                skipped,
                imported: Vec::new(),
                failures: Vec::new(),
                validation_errors,
                conflicts,
                policy_error: Some(violation.to_string()),
            });
        }

        // IMPORTING: sequential batches in the caller-supplied type order,
        // bounded concurrency inside each batch
        let semaphore = Arc::new(Semaphore::new(options.concurrency.max(1)));
        let mut imported: Vec<ImportedObject> = Vec::new();
        let mut failures: Vec<PackageFailure> = Vec::new();
        let mut halted = false;

        for batch in batch_by_type(valid, &options.type_order) {
            if halted {
                break;
            }

            let mut join_set = JoinSet::new();
            for prepared in batch {
                let api = Arc::clone(&self.api);
                let semaphore = Arc::clone(&semaphore);
                join_set.spawn(async move {
                    let guid = prepared.package.guid.clone();
                    let _permit = match semaphore.acquire_owned().await {
                        Ok(permit) => permit,
                        Err(_) => return (guid, Err(anyhow::anyhow!("import pool closed"))),
                    };
                    let outcome = api.import_package(&prepared.package).await;
                    (guid, outcome)
                });
            }

            let mut results: Vec<(Guid, anyhow::Result<ImportOutcome>)> = Vec::new();
            while let Some(joined) = join_set.join_next().await {
                match joined {
                    Ok(result) => results.push(result),
                    Err(err) => anyhow::bail!("import worker failed: {err}"),
                }
            }
            results.sort_by(|a, b| a.0.cmp(&b.0));

            let mut batch_successes = 0usize;
            for (guid, outcome) in results {
                match outcome {
                    Ok(outcome) if outcome.status != RunStatus::Error => {
                        debug!(old = %guid, new = %outcome.guid, status = %outcome.status, "imported");
                        working.record_import(&guid, outcome.guid.clone());
                        imported.push(ImportedObject {
                            guid,
                            target_guid: outcome.guid,
                            status: outcome.status,
                        });
                        batch_successes += 1;
                    }
                    Ok(outcome) => {
                        let message = outcome
                            .message
                            .unwrap_or_else(|| "import rejected".to_string());
                        warn!(guid = %guid, %message, "import error");
                        failures.push(PackageFailure { guid, message });
                    }
                    Err(err) => {
                        warn!(guid = %guid, error = %err, "import failed");
                        failures.push(PackageFailure {
                            guid,
                            message: err.to_string(),
                        });
                    }
                }
            }

            match options.policy {
                DeployPolicy::Partial if batch_successes > 0 => {
                    // per-package commits survive interruption of later batches
                    working.apply_to(&mut source_file);
                    working.apply_to(&mut target_file);
                    self.store.save(&options.source, &source_file)?;
                    self.store.save(&options.target, &target_file)?;
                }
                DeployPolicy::AllOrNone if !failures.is_empty() => {
                    // later batches could never be committed
                    halted = true;
                }
                _ => {}
            }
        }

        let failed = failures.len() + invalid.len();
        let has_warnings = !validation_errors.is_empty()
            || imported.iter().any(|o| o.status == RunStatus::Warning);

        let (state, status, policy_error) = match options.policy {
            DeployPolicy::AllOrNone => {
                if failed == 0 {
                    let status = if has_warnings {
                        RunStatus::Warning
                    } else {
                        RunStatus::Ok
                    };
                    (RunState::Committed, status, None)
                } else {
                    let violation = CoreError::PolicyViolation {
                        policy: options.policy,
                        failed,
                        selected,
                    };
                    (RunState::Failed, RunStatus::Error, Some(violation.to_string()))
                }
            }
            _ => {
                if selected == 0 || (failed == 0 && !has_warnings) {
                    (RunState::Committed, RunStatus::Ok, None)
                } else if failed == 0 || !imported.is_empty() {
                    (RunState::Committed, RunStatus::Warning, None)
                } else {
                    (RunState::Failed, RunStatus::Error, None)
                }
            }
        };

        if state == RunState::Committed {
            working.apply_to(&mut source_file);
            working.apply_to(&mut target_file);
            self.store.save(&options.source, &source_file)?;
            self.store.save(&options.target, &target_file)?;
        }

        let record = DeploymentRecord::new(options.actor.clone(), mode, status).with_info(
            RecordInfo {
                objects_imported: Some(imported.len() as u64),
                ..RecordInfo::default()
            },
        );
        self.store.append_history(&options.target, record)?;

        info!(
            imported = imported.len(),
            failed,
            status = %status,
            "deploy finished"
        );

        Ok(DeployReport {
            state,
            status,
            deploy_type: options.deploy_type,
            policy: options.policy,
            selected,
            skipped,
            imported,
            failures,
            validation_errors,
            conflicts,
            policy_error,
        })
    }
}

/// Group prepared packages into batches following the caller-supplied type
/// priority. Types without an explicit priority run last, in name order.
fn batch_by_type(
    prepared: Vec<PreparedPackage>,
    type_order: &[MetadataType],
) -> Vec<Vec<PreparedPackage>> {
    let mut by_type: BTreeMap<MetadataType, Vec<PreparedPackage>> = BTreeMap::new();
    for package in prepared {
        by_type
            .entry(package.package.metadata_type.clone())
            .or_default()
            .push(package);
    }

    let mut batches = Vec::new();
    for metadata_type in type_order {
        if let Some(batch) = by_type.remove(metadata_type) {
            batches.push(batch);
        }
    }
    batches.extend(by_type.into_values());
    batches
}
