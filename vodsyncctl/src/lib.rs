use std::io;
use std::path::PathBuf;
use std::sync::Arc;

use clap::{Args, CommandFactory, Parser, Subcommand, ValueEnum};
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;
use url::Url;
use vodsync_core::catalog::{CatalogClient, CatalogError, LibraryConfig, ServerConfig};
use vodsync_core::jobs::{
    build_from_template, sanitize_job_name, wait_until_complete, JobClient, JobError,
    TemplateError, TemplateValues, WatchError, TRANSCODE_JOB_TEMPLATE,
};
use vodsync_core::publish::{PublishError, Publisher};
use vodsync_core::{load_config, VodsyncConfig};

pub type Result<T> = std::result::Result<T, AppError>;

const CATALOG_TOKEN_ENV: &str = "VODSYNC_CATALOG_TOKEN";

#[derive(Debug, Error)]
pub enum AppError {
    #[error("config error: {0}")]
    Config(#[from] vodsync_core::ConfigError),
    #[error("missing required parameter: {0}")]
    MissingParameter(&'static str),
    #[error("invalid cluster api url: {0}")]
    InvalidApiUrl(#[from] url::ParseError),
    #[error("io error: {0}")]
    Io(#[from] io::Error),
    #[error("template error: {0}")]
    Template(#[from] TemplateError),
    #[error("job error: {0}")]
    Job(#[from] JobError),
    #[error("watch error: {0}")]
    Watch(#[from] WatchError),
    #[error("catalog error: {0}")]
    Catalog(#[from] CatalogError),
    #[error("publish error: {0}")]
    Publish(#[from] PublishError),
    #[error("serialization error: {0}")]
    Serialize(#[from] serde_json::Error),
}

#[derive(Parser, Debug)]
#[command(author, version, about = "Transcode job submission and catalog publishing", long_about = None)]
pub struct Cli {
    /// Optional TOML file supplying defaults for cluster and library settings
    #[arg(long)]
    pub config: Option<PathBuf>,
    /// Output format
    #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
    pub format: OutputFormat,
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Submit a transcode job and wait for it to finish
    Transcode(TranscodeArgs),
    /// Upload a finished transcode to the published share and clean up
    Publish(PublishArgs),
    /// Generate shell completions
    Completions(CompletionsArgs),
}

#[derive(Args, Debug)]
pub struct TranscodeArgs {
    /// Video to transcode, as seen from inside the cluster
    #[arg(long)]
    pub input: PathBuf,
    /// Path the transcoded video should be written to
    #[arg(long)]
    pub output: PathBuf,
    /// Transcoding preset name
    #[arg(long)]
    pub preset: Option<String>,
    /// Base URL of the cluster batch API
    #[arg(long)]
    pub api_url: Option<String>,
    /// Namespace override for the job
    #[arg(long)]
    pub namespace: Option<String>,
    /// Bearer token for the cluster API
    #[arg(long)]
    pub cluster_token: Option<String>,
    /// Alternative job manifest template
    #[arg(long)]
    pub template: Option<PathBuf>,
    /// Keep the job resource on the cluster after completion
    #[arg(long, default_value_t = false)]
    pub keep_job: bool,
}

#[derive(Args, Debug)]
pub struct PublishArgs {
    /// Transcoded video file to upload
    #[arg(long, short = 'f')]
    pub file: PathBuf,
    /// Relative path of the destination below the published share
    #[arg(long)]
    pub suffix: PathBuf,
    /// Original raw video file to clean up
    #[arg(long)]
    pub raw: PathBuf,
    /// Base URL of the catalog server, e.g. http://192.168.0.105:32400
    #[arg(long)]
    pub server: Option<String>,
    /// Catalog authentication token [env: VODSYNC_CATALOG_TOKEN]
    #[arg(long)]
    pub token: Option<String>,
    /// Name of the catalog library
    #[arg(long)]
    pub library: Option<String>,
    /// Root of the published share
    #[arg(long)]
    pub share: Option<PathBuf>,
}

#[derive(Args, Debug)]
pub struct CompletionsArgs {
    #[arg(value_enum)]
    pub shell: clap_complete::Shell,
}

pub fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(false)
        .init();
}

pub async fn run(cli: Cli) -> Result<()> {
    let config = match &cli.config {
        Some(path) => load_config(path)?,
        None => VodsyncConfig::default(),
    };
    match cli.command {
        Commands::Transcode(args) => transcode(args, &config).await,
        Commands::Publish(args) => publish(args, &config, cli.format).await,
        Commands::Completions(args) => {
            let mut command = Cli::command();
            clap_complete::generate(args.shell, &mut command, "vodsyncctl", &mut io::stdout());
            Ok(())
        }
    }
}

async fn transcode(args: TranscodeArgs, config: &VodsyncConfig) -> Result<()> {
    let api_url = args
        .api_url
        .or_else(|| config.cluster.api_url.clone())
        .ok_or(AppError::MissingParameter("--api-url"))?;
    let preset = args
        .preset
        .or_else(|| config.transcode.preset.clone())
        .ok_or(AppError::MissingParameter("--preset"))?;
    let token = args.cluster_token.or_else(|| config.cluster.token.clone());

    let filename = args
        .input
        .file_name()
        .ok_or(AppError::MissingParameter("--input must name a file"))?
        .to_string_lossy();
    info!(file = %filename, "creating transcode job");
    let values = TemplateValues {
        name: sanitize_job_name(&filename),
        input_path: args.input.to_string_lossy().into_owned(),
        output_path: args.output.to_string_lossy().into_owned(),
        preset,
    };

    let template = match args
        .template
        .as_deref()
        .or(config.transcode.template_path.as_deref().map(std::path::Path::new))
    {
        Some(path) => std::fs::read_to_string(path)?,
        None => TRANSCODE_JOB_TEMPLATE.to_string(),
    };
    let mut job = build_from_template(&template, &values)?;
    if let Some(namespace) = args.namespace.or_else(|| config.cluster.namespace.clone()) {
        job.metadata.namespace = namespace;
    }
    let namespace = job.metadata.namespace.clone();

    let api_url: Url = api_url.parse()?;
    let client = JobClient::new(api_url, token)?;
    let name = client.create(&job).await?;

    let cancel = CancellationToken::new();
    let (mut jobs, mut errs) =
        wait_until_complete(Arc::new(client.clone()), namespace.clone(), name.clone(), cancel.clone());

    let mut errs_open = true;
    let finished = loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("cancellation requested, releasing the watch");
                cancel.cancel();
            }
            job = jobs.recv() => break job,
            err = errs.recv(), if errs_open => match err {
                Some(WatchError::Malformed(detail)) => {
                    warn!(%detail, "ignoring unreadable watch event");
                }
                Some(fatal) => return Err(fatal.into()),
                None => errs_open = false,
            }
        }
    };

    match finished {
        Some(job) => {
            info!(job = %job.metadata.name, "transcode complete");
            if !args.keep_job {
                client.delete(&name, &namespace).await?;
            }
            Ok(())
        }
        None => {
            info!("watch ended before the job completed");
            Ok(())
        }
    }
}

async fn publish(args: PublishArgs, config: &VodsyncConfig, format: OutputFormat) -> Result<()> {
    let lib_config = LibraryConfig {
        server: ServerConfig {
            url: args
                .server
                .or_else(|| config.library.server_url.clone())
                .ok_or(AppError::MissingParameter("--server"))?,
            token: args
                .token
                .or_else(|| std::env::var(CATALOG_TOKEN_ENV).ok())
                .or_else(|| config.library.token.clone())
                .ok_or(AppError::MissingParameter("--token"))?,
        },
        name: args
            .library
            .or_else(|| config.library.name.clone())
            .ok_or(AppError::MissingParameter("--library"))?,
        share: args
            .share
            .or_else(|| config.library.share.clone().map(PathBuf::from))
            .ok_or(AppError::MissingParameter("--share"))?,
    };

    let client = CatalogClient::new(lib_config.server.clone())?;
    let library = client.find_library(&lib_config.name).await?;

    let publisher = Publisher::new(
        Arc::new(library),
        &lib_config.share,
        &args.suffix,
        args.file,
        args.raw,
    );
    let report = publisher.run().await?;

    match format {
        OutputFormat::Text => {
            println!("uploaded:          {}", yes_no(report.uploaded));
            println!("catalog refreshed: {}", yes_no(report.refreshed));
            println!("removed transcode: {}", yes_no(report.removed_transcoded));
            println!("removed raw:       {}", yes_no(report.removed_raw));
        }
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
    }
    Ok(())
}

fn yes_no(value: bool) -> &'static str {
    if value {
        "yes"
    } else {
        "no"
    }
}
