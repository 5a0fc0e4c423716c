//! Checkpoint behavior and the checkpoint-then-deploy round trip.

mod support;

use std::sync::Arc;

use chrono::{Duration, Utc};
use tempfile::TempDir;

use ferry_core::checkpoint::{CheckpointOptions, Checkpointer};
use ferry_core::deploy::{DeployOptions, Deployer, RunState};
use ferry_core::mapping::{FsMappingStore, MappingStore};
use ferry_core::packages::FsPackageStore;
use ferry_core::types::{
    DeployPolicy, DeployType, Environment, Guid, MetadataType, RecordMode, RunStatus,
};

use support::{ScriptedApi, package, package_with_refs};

fn env(name: &str) -> Environment {
    Environment::new(name).unwrap()
}

struct Stores {
    _tmp: TempDir,
    mappings: FsMappingStore,
    packages: FsPackageStore,
}

fn stores() -> Stores {
    let tmp = TempDir::new().expect("tempdir should succeed");
    let mappings = FsMappingStore::new(tmp.path().join("mappings"));
    let packages = FsPackageStore::new(tmp.path().join("packages"));
    Stores {
        _tmp: tmp,
        mappings,
        packages,
    }
}

#[tokio::test]
async fn test_checkpoint_registers_guids_and_appends_export_record() {
    let now = Utc::now();
    let api = Arc::new(
        ScriptedApi::new()
            .with_package(package("t1", "TABLE", now))
            .with_package(package_with_refs("board", "LIVEBOARD", now, &["t1"])),
    );
    let stores = stores();

    let checkpointer = Checkpointer::new(api.clone(), &stores.mappings, &stores.packages);
    let report = checkpointer
        .run(&CheckpointOptions::new(env("dev")))
        .await
        .expect("checkpoint should succeed");

    assert_eq!(report.status, RunStatus::Ok);
    assert_eq!(report.expected, 2);
    assert_eq!(report.exported, 2);
    assert_eq!(report.registered, 2);

    let file = stores.mappings.load(&env("dev")).expect("load should succeed");
    assert_eq!(file.mapping.len(), 2);
    assert!(file.mapping.values().all(|v| v.is_none()));
    assert_eq!(file.history.len(), 1);
    assert_eq!(file.history[0].mode, RecordMode::Export);
    assert_eq!(file.history[0].info.files_expected, Some(2));
    assert_eq!(file.history[0].info.files_exported, Some(2));

    // packages are addressable by GUID and type
    let listed = stores.packages.list(&env("dev")).expect("list should succeed");
    assert_eq!(listed.len(), 2);
}

#[tokio::test]
async fn test_checkpoint_records_warning_when_some_exports_fail() {
    let now = Utc::now();
    let api = Arc::new(
        ScriptedApi::new()
            .with_package(package("t1", "TABLE", now))
            .with_package(package("t2", "TABLE", now))
            .fail_export("t2", "export timed out"),
    );
    let stores = stores();

    let checkpointer = Checkpointer::new(api, &stores.mappings, &stores.packages);
    let report = checkpointer
        .run(&CheckpointOptions::new(env("dev")))
        .await
        .expect("checkpoint should succeed");

    assert_eq!(report.status, RunStatus::Warning);
    assert_eq!(report.exported, 1);
    assert_eq!(report.failures.len(), 1);
    assert_eq!(report.failures[0].guid, Guid::from("t2"));

    let file = stores.mappings.load(&env("dev")).expect("load should succeed");
    assert_eq!(file.history[0].status, RunStatus::Warning);
    assert_eq!(file.history[0].info.files_expected, Some(2));
    assert_eq!(file.history[0].info.files_exported, Some(1));
    // only the exported object was registered
    assert_eq!(file.mapping.len(), 1);
}

#[tokio::test]
async fn test_checkpoint_with_explicit_guids_reports_missing_ones() {
    let now = Utc::now();
    let api = Arc::new(ScriptedApi::new().with_package(package("t1", "TABLE", now)));
    let stores = stores();

    let options = CheckpointOptions::new(env("dev"))
        .with_guids(vec![Guid::from("t1"), Guid::from("ghost")]);
    let checkpointer = Checkpointer::new(api, &stores.mappings, &stores.packages);
    let report = checkpointer.run(&options).await.expect("checkpoint should succeed");

    assert_eq!(report.status, RunStatus::Warning);
    assert_eq!(report.expected, 2);
    assert_eq!(report.exported, 1);
    assert_eq!(report.failures[0].guid, Guid::from("ghost"));
}

#[tokio::test]
async fn test_recheckpoint_preserves_resolved_mappings_and_appends_history() {
    let now = Utc::now();
    let api = Arc::new(ScriptedApi::new().with_package(package("t1", "TABLE", now)));
    let stores = stores();

    let checkpointer = Checkpointer::new(api.clone(), &stores.mappings, &stores.packages);
    checkpointer
        .run(&CheckpointOptions::new(env("dev")))
        .await
        .expect("checkpoint should succeed");

    // a later deploy resolved the mapping
    let mut file = stores.mappings.load(&env("dev")).expect("load should succeed");
    file.mapping
        .insert(Guid::from("t1"), Some(Guid::from("t1-prod")));
    stores
        .mappings
        .save(&env("dev"), &file)
        .expect("save should succeed");

    checkpointer
        .run(&CheckpointOptions::new(env("dev")))
        .await
        .expect("checkpoint should succeed");

    let file = stores.mappings.load(&env("dev")).expect("load should succeed");
    assert_eq!(
        file.mapping.get(&Guid::from("t1")),
        Some(&Some(Guid::from("t1-prod")))
    );
    assert_eq!(file.history.len(), 2);
}

#[tokio::test]
async fn test_roundtrip_same_environment_deploy_is_a_noop() {
    let exported_at = Utc::now() - Duration::hours(1);
    let api = Arc::new(
        ScriptedApi::new()
            .with_package(package("t1", "TABLE", exported_at))
            .with_package(package_with_refs("board", "LIVEBOARD", exported_at, &["t1"])),
    );
    let stores = stores();

    let checkpointer = Checkpointer::new(api.clone(), &stores.mappings, &stores.packages);
    checkpointer
        .run(&CheckpointOptions::new(env("dev")))
        .await
        .expect("checkpoint should succeed");

    let deploy_options = || {
        DeployOptions::new(env("dev"), env("dev"))
            .with_deploy_type(DeployType::Delta)
            .with_policy(DeployPolicy::Partial)
            .with_type_order(vec![MetadataType::new("TABLE"), MetadataType::new("LIVEBOARD")])
    };

    // first deploy: nothing to diff against, everything resolves to itself
    let deployer = Deployer::new(api.clone(), &stores.mappings, deploy_options());
    let packages = stores.packages.list(&env("dev")).expect("list should succeed");
    let report = deployer.run(packages).await.expect("run should succeed");

    assert_eq!(report.state, RunState::Committed);
    assert_eq!(report.status, RunStatus::Ok);
    assert!(report.failures.is_empty());
    assert!(report.validation_errors.is_empty());

    // references were not rewritten away from themselves
    for seen in api.imports_seen() {
        if seen.guid == Guid::from("board") {
            assert_eq!(seen.payload["depends_on"][0], serde_json::json!("t1"));
        }
    }

    let after_first = stores.mappings.load(&env("dev")).expect("load should succeed");
    for (old, new) in &after_first.mapping {
        assert_eq!(new.as_ref(), Some(old), "identity mapping expected");
    }
    let imports_after_first = api.import_count();

    // second delta deploy: nothing changed, nothing is selected
    let deployer = Deployer::new(api.clone(), &stores.mappings, deploy_options());
    let packages = stores.packages.list(&env("dev")).expect("list should succeed");
    let report = deployer.run(packages).await.expect("run should succeed");

    assert_eq!(report.state, RunState::Committed);
    assert_eq!(report.status, RunStatus::Ok);
    assert_eq!(report.selected, 0);
    assert_eq!(report.skipped, 2);
    assert_eq!(api.import_count(), imports_after_first);

    let after_second = stores.mappings.load(&env("dev")).expect("load should succeed");
    assert_eq!(after_second.mapping, after_first.mapping, "mapping must not change");
}

#[tokio::test]
async fn test_corrupt_mapping_file_aborts_before_any_api_call() {
    let api = Arc::new(ScriptedApi::new().with_package(package("t1", "TABLE", Utc::now())));
    let stores = stores();

    std::fs::create_dir_all(stores.mappings.root()).expect("create_dir_all should succeed");
    std::fs::write(
        stores.mappings.root().join("dev.mapping.json"),
        b"not json at all",
    )
    .expect("write should succeed");

    let checkpointer = Checkpointer::new(api.clone(), &stores.mappings, &stores.packages);
    let err = checkpointer
        .run(&CheckpointOptions::new(env("dev")))
        .await
        .expect_err("checkpoint should fail");

    assert!(err.to_string().contains("corrupt mapping file"));
    assert_eq!(api.import_count(), 0);
}
