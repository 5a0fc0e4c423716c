//! Ferry - environment content promotion
//!
//! Usage:
//!   ferry checkpoint --environment dev --metadata-types TABLE,LIVEBOARD
//!   ferry deploy --source-environment dev --target-environment prod \
//!       --deploy-type delta --deploy-policy partial
//!   ferry search --environment prod --pattern "sales"

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use console::style;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use ferry_core::api::{ContentApi, RestContentApi};
use ferry_core::checkpoint::{CheckpointOptions, CheckpointReport, Checkpointer};
use ferry_core::config::{ConfigStore, FerryConfig};
use ferry_core::deploy::{DeployOptions, DeployReport, Deployer};
use ferry_core::mapping::FsMappingStore;
use ferry_core::packages::FsPackageStore;
use ferry_core::types::{
    DeployPolicy, DeployType, Environment, Guid, MetadataType, RunStatus, SearchFilter,
};

#[derive(Parser)]
#[command(name = "ferry")]
#[command(about = "Promote content between platform environments", long_about = None)]
struct Cli {
    /// Path to ferry.toml (defaults to the platform config directory)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Export content from an environment and register its GUIDs
    Checkpoint {
        /// Source environment name
        #[arg(long)]
        environment: String,

        /// Restrict to these metadata types (comma separated)
        #[arg(long, value_delimiter = ',')]
        metadata_types: Vec<String>,

        /// Restrict to content carrying these tags
        #[arg(long, value_delimiter = ',')]
        tags: Vec<String>,

        /// Explicit GUIDs instead of a search selection
        #[arg(long, value_delimiter = ',')]
        guids: Vec<String>,

        /// Output format
        #[arg(short, long, default_value = "table")]
        format: OutputFormat,
    },

    /// Import checkpointed content into a target environment
    Deploy {
        /// Environment the content was checkpointed from
        #[arg(long)]
        source_environment: String,

        /// Environment to import into
        #[arg(long)]
        target_environment: String,

        /// DELTA imports only changed-since-last-success objects
        #[arg(long, value_enum, ignore_case = true, default_value = "delta")]
        deploy_type: DeployTypeArg,

        /// How individual object failures affect the run
        #[arg(long, value_enum, ignore_case = true, default_value = "partial")]
        deploy_policy: DeployPolicyArg,

        /// Restrict to these metadata types (comma separated)
        #[arg(long, value_delimiter = ',')]
        metadata_types: Vec<String>,

        /// Skip the confirmation prompt
        #[arg(short, long)]
        yes: bool,

        /// Output format
        #[arg(short, long, default_value = "table")]
        format: OutputFormat,
    },

    /// Search content in an environment
    Search {
        /// Environment to search
        #[arg(long)]
        environment: String,

        /// Restrict to these metadata types (comma separated)
        #[arg(long, value_delimiter = ',')]
        metadata_types: Vec<String>,

        /// Restrict to content carrying these tags
        #[arg(long, value_delimiter = ',')]
        tags: Vec<String>,

        /// Name pattern understood by the platform
        #[arg(long)]
        pattern: Option<String>,

        /// Output format
        #[arg(short, long, default_value = "table")]
        format: OutputFormat,
    },

    /// Export packages to a directory without touching the mapping
    Export {
        /// Environment to export from
        #[arg(long)]
        environment: String,

        /// GUIDs to export (comma separated)
        #[arg(long, value_delimiter = ',')]
        guids: Vec<String>,

        /// Destination directory
        #[arg(long)]
        directory: PathBuf,
    },

    /// Delete a single object from an environment
    Delete {
        /// Environment to delete from
        #[arg(long)]
        environment: String,

        #[arg(long)]
        guid: String,

        #[arg(long)]
        metadata_type: String,

        /// Skip the confirmation prompt
        #[arg(short, long)]
        yes: bool,
    },
}

#[derive(Clone, Copy, ValueEnum, Default)]
enum OutputFormat {
    /// Human-readable table
    #[default]
    Table,
    /// Machine-readable JSON
    Json,
}

#[derive(Clone, Copy, PartialEq, Eq, ValueEnum)]
enum DeployTypeArg {
    Delta,
    Full,
}

impl From<DeployTypeArg> for DeployType {
    fn from(value: DeployTypeArg) -> Self {
        match value {
            DeployTypeArg::Delta => DeployType::Delta,
            DeployTypeArg::Full => DeployType::Full,
        }
    }
}

#[derive(Clone, Copy, PartialEq, Eq, ValueEnum)]
enum DeployPolicyArg {
    ValidateOnly,
    Partial,
    AllOrNone,
}

impl From<DeployPolicyArg> for DeployPolicy {
    fn from(value: DeployPolicyArg) -> Self {
        match value {
            DeployPolicyArg::ValidateOnly => DeployPolicy::ValidateOnly,
            DeployPolicyArg::Partial => DeployPolicy::Partial,
            DeployPolicyArg::AllOrNone => DeployPolicy::AllOrNone,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "ferry=debug,info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();

    let config_store = match cli.config {
        Some(path) => ConfigStore::from_path(path),
        None => ConfigStore::from_default_location()?,
    };
    tracing::debug!(path = %config_store.config_path().display(), "loading configuration");
    let config = config_store.load()?;

    match cli.command {
        Commands::Checkpoint {
            environment,
            metadata_types,
            tags,
            guids,
            format,
        } => run_checkpoint(&config, environment, metadata_types, tags, guids, format).await,
        Commands::Deploy {
            source_environment,
            target_environment,
            deploy_type,
            deploy_policy,
            metadata_types,
            yes,
            format,
        } => {
            run_deploy(
                &config,
                source_environment,
                target_environment,
                deploy_type.into(),
                deploy_policy.into(),
                metadata_types,
                yes,
                format,
            )
            .await
        }
        Commands::Search {
            environment,
            metadata_types,
            tags,
            pattern,
            format,
        } => run_search(&config, environment, metadata_types, tags, pattern, format).await,
        Commands::Export {
            environment,
            guids,
            directory,
        } => run_export(&config, environment, guids, directory).await,
        Commands::Delete {
            environment,
            guid,
            metadata_type,
            yes,
        } => run_delete(&config, environment, guid, metadata_type, yes).await,
    }
}

fn api_for(config: &FerryConfig, environment: &Environment) -> Result<Arc<dyn ContentApi>> {
    let env_config = config.environment(environment)?;
    let token = config.token_for(env_config)?;
    Ok(Arc::new(RestContentApi::new(env_config.url.clone(), token)))
}

fn parse_types(raw: Vec<String>) -> Vec<MetadataType> {
    raw.iter().map(MetadataType::new).collect()
}

async fn run_checkpoint(
    config: &FerryConfig,
    environment: String,
    metadata_types: Vec<String>,
    tags: Vec<String>,
    guids: Vec<String>,
    format: OutputFormat,
) -> Result<()> {
    let environment = Environment::new(environment)?;
    let api = api_for(config, &environment)?;

    let storage_root = config.storage_root()?;
    let mapping_store = FsMappingStore::new(storage_root.join("mappings"));
    let package_store = FsPackageStore::new(storage_root.join("packages"));

    let options = CheckpointOptions::new(environment)
        .with_metadata_types(parse_types(metadata_types))
        .with_tags(tags)
        .with_guids(guids.into_iter().map(Guid::from).collect());

    let checkpointer = Checkpointer::new(api, &mapping_store, &package_store);
    let report = checkpointer.run(&options).await?;

    print_checkpoint_report(&report, format)?;
    if !report.exit_ok() {
        std::process::exit(1);
    }
    Ok(())
}

#[allow(clippy::too_many_arguments)]
async fn run_deploy(
    config: &FerryConfig,
    source_environment: String,
    target_environment: String,
    deploy_type: DeployType,
    deploy_policy: DeployPolicy,
    metadata_types: Vec<String>,
    yes: bool,
    format: OutputFormat,
) -> Result<()> {
    let source = Environment::new(source_environment)?;
    let target = Environment::new(target_environment)?;

    if deploy_type == DeployType::Full && deploy_policy != DeployPolicy::ValidateOnly && !yes {
        let confirmed = dialoguer::Confirm::new()
            .with_prompt(format!("Full deploy from '{source}' into '{target}'. Continue?"))
            .default(false)
            .interact()
            .context("Confirmation prompt failed")?;
        if !confirmed {
            println!("Aborted.");
            return Ok(());
        }
    }

    let api = api_for(config, &target)?;
    let storage_root = config.storage_root()?;
    let mapping_store = FsMappingStore::new(storage_root.join("mappings"));
    let package_store = FsPackageStore::new(storage_root.join("packages"));
    let packages = package_store.list(&source)?;

    let options = DeployOptions::new(source, target)
        .with_deploy_type(deploy_type)
        .with_policy(deploy_policy)
        .with_metadata_types(parse_types(metadata_types))
        .with_type_order(config.type_order())
        .with_concurrency(config.deploy.concurrency);

    let deployer = Deployer::new(api, &mapping_store, options);
    let report = deployer.run(packages).await?;

    print_deploy_report(&report, format)?;
    if !report.exit_ok() {
        std::process::exit(1);
    }
    Ok(())
}

async fn run_search(
    config: &FerryConfig,
    environment: String,
    metadata_types: Vec<String>,
    tags: Vec<String>,
    pattern: Option<String>,
    format: OutputFormat,
) -> Result<()> {
    let environment = Environment::new(environment)?;
    let api = api_for(config, &environment)?;

    let filter = SearchFilter {
        metadata_types: parse_types(metadata_types),
        tags,
        pattern,
    };
    let summaries = api.search(&filter).await?;

    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&summaries)?),
        OutputFormat::Table => {
            if summaries.is_empty() {
                println!("No matching content.");
                return Ok(());
            }
            println!("{:<38} {:<12} {}", "GUID", "TYPE", "NAME");
            for summary in &summaries {
                println!(
                    "{:<38} {:<12} {}",
                    summary.guid, summary.metadata_type, summary.name
                );
            }
        }
    }
    Ok(())
}

async fn run_export(
    config: &FerryConfig,
    environment: String,
    guids: Vec<String>,
    directory: PathBuf,
) -> Result<()> {
    let environment = Environment::new(environment)?;
    let api = api_for(config, &environment)?;

    // one-off dump: packages land in the given directory, the mapping file
    // is not involved
    let store = FsPackageStore::new(directory);
    let filter = SearchFilter::default();
    let summaries = api.search(&filter).await?;

    let mut exported = 0usize;
    for raw in &guids {
        let guid = Guid::from(raw.as_str());
        let summary = summaries
            .iter()
            .find(|s| s.guid == guid)
            .with_context(|| format!("No such object: {guid}"))?;
        let package = api.export_package(&guid, &summary.metadata_type).await?;
        store.save(&environment, &package)?;
        exported += 1;
    }

    println!(
        "{} exported {} package(s) to {}",
        style("OK").green().bold(),
        exported,
        store.root().display()
    );
    Ok(())
}

async fn run_delete(
    config: &FerryConfig,
    environment: String,
    guid: String,
    metadata_type: String,
    yes: bool,
) -> Result<()> {
    let environment = Environment::new(environment)?;
    let guid = Guid::from(guid);
    let metadata_type = MetadataType::new(metadata_type);

    if !yes {
        let confirmed = dialoguer::Confirm::new()
            .with_prompt(format!(
                "Delete {metadata_type} {guid} from '{environment}'?"
            ))
            .default(false)
            .interact()
            .context("Confirmation prompt failed")?;
        if !confirmed {
            println!("Aborted.");
            return Ok(());
        }
    }

    let api = api_for(config, &environment)?;
    api.delete(&guid, &metadata_type).await?;
    println!("{} deleted {guid}", style("OK").green().bold());
    Ok(())
}

fn status_label(status: RunStatus) -> console::StyledObject<&'static str> {
    match status {
        RunStatus::Ok => style("OK").green().bold(),
        RunStatus::Warning => style("WARNING").yellow().bold(),
        RunStatus::Error => style("ERROR").red().bold(),
    }
}

fn print_checkpoint_report(report: &CheckpointReport, format: OutputFormat) -> Result<()> {
    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(report)?),
        OutputFormat::Table => {
            println!(
                "{} checkpoint: {}/{} packages exported, {} newly registered",
                status_label(report.status),
                report.exported,
                report.expected,
                report.registered
            );
            for failure in &report.failures {
                println!("  {} {}: {}", style("failed").red(), failure.guid, failure.message);
            }
        }
    }
    Ok(())
}

fn print_deploy_report(report: &DeployReport, format: OutputFormat) -> Result<()> {
    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(report)?),
        OutputFormat::Table => {
            println!(
                "{} deploy {} ({}): {} selected, {} unchanged, {} imported",
                status_label(report.status),
                report.deploy_type,
                report.policy,
                report.selected,
                report.skipped,
                report.imported.len()
            );
            for conflict in &report.conflicts {
                println!(
                    "  {} {}: kept target value {} over {}",
                    style("conflict").yellow(),
                    conflict.guid,
                    conflict.target_value,
                    conflict.source_value
                );
            }
            for error in &report.validation_errors {
                println!("  {} {}", style("invalid").red(), error);
            }
            for failure in &report.failures {
                println!("  {} {}: {}", style("failed").red(), failure.guid, failure.message);
            }
            if let Some(policy_error) = &report.policy_error {
                println!("  {} {}", style("aborted").red().bold(), policy_error);
            }
        }
    }
    Ok(())
}
