//! Command-line publisher for Buildstash.

mod ci;
mod config;
mod git;

use anyhow::{Context, Result};
use buildstash_core::{BuildRecord, Structure, UploadRequest, VcProvenance, Version, parse_list};
use buildstash_metadata::{CiContextBuilder, DetectionContext, Resolver, StaticRootUrl};
use buildstash_storage::WorkspaceFiles;
use buildstash_uploader::{Artifacts, Publisher};
use clap::{Args, Parser, Subcommand};
use config::Overrides;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

#[derive(Parser)]
#[command(name = "buildstash")]
#[command(about = "Publish build artifacts to Buildstash")]
#[command(version)]
struct Cli {
    /// Configuration file path
    #[arg(
        long,
        global = true,
        env = "BUILDSTASH_CONFIG",
        default_value = "buildstash.toml"
    )]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Upload a build and publish it
    Upload(Box<UploadArgs>),
    /// Print the version control provenance that would be attached to an upload
    Provenance(ProvenanceArgs),
}

#[derive(Args)]
struct UploadArgs {
    /// API key (overrides configuration)
    #[arg(long, env = "BUILDSTASH_API_KEY", hide_env_values = true)]
    api_key: Option<String>,

    /// API base URL (overrides configuration)
    #[arg(long)]
    base_url: Option<String>,

    /// Workspace directory; artifact paths are relative to it
    #[arg(long, default_value = ".")]
    workspace: PathBuf,

    /// Primary artifact
    #[arg(long)]
    primary_file: String,

    /// Expansion artifact, required for file+expansion
    #[arg(long)]
    expansion_file: Option<String>,

    /// Upload structure: file or file+expansion
    #[arg(long, default_value = "file")]
    structure: Structure,

    #[arg(long)]
    version_major: Option<String>,

    #[arg(long)]
    version_minor: Option<String>,

    #[arg(long)]
    version_patch: Option<String>,

    /// Pre-release component, e.g. beta
    #[arg(long)]
    version_extra: Option<String>,

    /// Build metadata component
    #[arg(long)]
    version_meta: Option<String>,

    #[arg(long)]
    custom_build_number: Option<String>,

    /// Labels, one per line
    #[arg(long)]
    labels: Option<String>,

    /// Architectures, one per line
    #[arg(long)]
    architectures: Option<String>,

    #[arg(long)]
    platform: Option<String>,

    #[arg(long)]
    stream: Option<String>,

    #[arg(long)]
    notes: Option<String>,

    /// Parts uploaded concurrently (overrides configuration)
    #[arg(long)]
    parallel: Option<usize>,

    /// Overall publish deadline in seconds (overrides configuration)
    #[arg(long)]
    timeout: Option<u64>,

    /// CI server root URL for run and pipeline links
    #[arg(long)]
    ci_root_url: Option<String>,

    /// When the CI run started, as Unix seconds or milliseconds; sent as
    /// the elapsed build duration
    #[arg(long, value_parser = ci::parse_started_at)]
    ci_started_at: Option<time::OffsetDateTime>,

    /// Print the published build as JSON
    #[arg(long, default_value_t = false)]
    json: bool,

    #[command(flatten)]
    vc: VcArgs,
}

#[derive(Args)]
struct ProvenanceArgs {
    /// Workspace directory to inspect
    #[arg(long, default_value = ".")]
    workspace: PathBuf,

    #[command(flatten)]
    vc: VcArgs,
}

/// Explicit provenance. Values given here are never replaced by detection.
#[derive(Args, Clone, Default)]
struct VcArgs {
    /// Version control system, e.g. git or perforce
    #[arg(long)]
    vc_host_type: Option<String>,

    /// Hosting service, e.g. github
    #[arg(long)]
    vc_host: Option<String>,

    #[arg(long)]
    vc_repo_name: Option<String>,

    #[arg(long)]
    vc_repo_url: Option<String>,

    #[arg(long)]
    vc_branch: Option<String>,

    #[arg(long)]
    vc_commit_sha: Option<String>,

    #[arg(long)]
    vc_commit_url: Option<String>,

    /// Do not inspect the local Git checkout
    #[arg(long, default_value_t = false)]
    no_git: bool,
}

impl VcArgs {
    fn provenance(&self) -> VcProvenance {
        VcProvenance {
            host_type: self.vc_host_type.clone(),
            host: self.vc_host.clone(),
            repo_name: self.vc_repo_name.clone(),
            repo_url: self.vc_repo_url.clone(),
            branch: self.vc_branch.clone(),
            commit_sha: self.vc_commit_sha.clone(),
            commit_url: self.vc_commit_url.clone(),
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Logs go to stderr so stdout carries only results.
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let Cli { config, command } = Cli::parse();

    match command {
        Commands::Upload(args) => handle_upload(&config, *args).await,
        Commands::Provenance(args) => handle_provenance(args).await,
    }
}

async fn handle_upload(config_path: &Path, args: UploadArgs) -> Result<()> {
    let mut config = config::load_config(config_path)?;
    Overrides {
        base_url: args.base_url.clone(),
        api_key: args.api_key.clone(),
        max_parallel_parts: args.parallel,
        timeout_secs: args.timeout,
        ci_root_url: args.ci_root_url.clone(),
    }
    .apply(&mut config);

    let publisher = Publisher::new(&config)?;

    let workspace = WorkspaceFiles::new(&args.workspace);
    let primary = workspace
        .open(&args.primary_file)
        .await
        .with_context(|| format!("primary file {}", args.primary_file))?;
    let mut artifacts = Artifacts::new(Arc::new(primary));
    if let Some(path) = args.expansion_file.as_deref() {
        let expansion = workspace
            .open(path)
            .await
            .with_context(|| format!("expansion file {path}"))?;
        artifacts = artifacts.with_expansion(Arc::new(expansion));
    }

    let ctx = detection_context(&args.workspace, args.vc.no_git).await;
    let root_url = config
        .ci
        .root_url
        .clone()
        .or_else(|| ci::root_url(&ctx.env));
    let ci = CiContextBuilder::new(Arc::new(StaticRootUrl(root_url)), config.ci.source.clone())
        .build(&ci::run_info(&ctx.env, args.ci_started_at));

    let request = UploadRequest {
        structure: args.structure,
        primary_file: None,
        expansion_file: None,
        version: Version {
            major: args.version_major.unwrap_or_default(),
            minor: args.version_minor.unwrap_or_default(),
            patch: args.version_patch.unwrap_or_default(),
            extra: args.version_extra,
            meta: args.version_meta,
        },
        custom_build_number: args.custom_build_number,
        labels: args.labels.as_deref().map(parse_list).unwrap_or_default(),
        architectures: args
            .architectures
            .as_deref()
            .map(parse_list)
            .unwrap_or_default(),
        platform: args.platform.unwrap_or_default(),
        stream: args.stream.unwrap_or_default(),
        notes: args.notes,
        ci,
        vc: args.vc.provenance(),
    };

    let cancel = CancellationToken::new();
    let on_interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("Interrupted, cancelling upload");
            on_interrupt.cancel();
        }
    });

    let record = publisher
        .publish(request, &artifacts, &ctx, &cancel)
        .await
        .context("upload failed")?;

    print_record(&record, args.json)
}

async fn handle_provenance(args: ProvenanceArgs) -> Result<()> {
    let ctx = detection_context(&args.workspace, args.vc.no_git).await;
    let resolved = Resolver::default().resolve(&ctx, args.vc.provenance());
    println!("{}", serde_json::to_string_pretty(&resolved)?);
    Ok(())
}

async fn detection_context(workspace: &Path, no_git: bool) -> DetectionContext {
    let scm = if no_git {
        None
    } else {
        git::snapshot(workspace).await
    };
    DetectionContext::from_process_env(scm)
}

fn print_record(record: &BuildRecord, json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(record)?);
        return Ok(());
    }

    println!("Build published: {}", record.build_id);
    if let Some(url) = record.build_info_url.as_deref() {
        println!("  Build info: {url}");
    }
    if let Some(url) = record.download_url.as_deref() {
        println!("  Download:   {url}");
    }
    if record.pending_processing {
        println!("  Processing: pending");
    }
    Ok(())
}
