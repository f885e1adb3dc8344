use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand, ValueEnum};
use gcp_assess::assessment::{run_assessment, AssessmentOptions};
use gcp_assess::collect::compute;
use gcp_assess::config::Config;
use gcp_assess::export::ExportTarget;
use gcp_assess::gcp::client::GcpCli;
use gcp_assess::gcp::projects::ScopeFlags;
use gcp_assess::gcp::runner::SystemRunner;
use gcp_assess::orchestrator::{
    self, ChildArgs, OrchestratorOptions, DEFAULT_DOMAIN_TIMEOUT_SECS, DEFAULT_SUMMARY_REPORT,
};
use gcp_assess::resource::domain::parse_services;
use gcp_assess::resource::Domain;
use gcp_assess::{validate, VERSION};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;
use tracing::Level;
use tracing_subscriber::fmt::writer::MakeWriterExt;

const MASTER_LOG_FILE: &str = "gcp_master_assessment.log";

/// Organization-wide GCP inventory assessment
#[derive(Parser, Debug)]
#[command(name = "gcp-assess", version = VERSION, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Inventory Compute Engine instances and their utilization
    Compute(ComputeArgs),
    /// Inventory VPCs, subnets, firewall rules, load balancers, NAT, VPN and DNS
    Networking(DomainArgs),
    /// Inventory Cloud Storage buckets and their usage
    Storage(DomainArgs),
    /// Inventory GKE clusters, node pools and workloads
    Gke(DomainArgs),
    /// Run several assessments as separate processes and write a summary report
    All(AllArgs),
    /// Check tools, authentication and permissions
    Validate(ValidateArgs),
}

/// Mutually exclusive scope flags; the environment fills in when none is given
#[derive(Args, Debug, Clone)]
#[group(id = "scope", multiple = false)]
struct ScopeArgs {
    /// Organization ID to assess
    #[arg(long)]
    org_id: Option<String>,

    /// Folder ID to assess
    #[arg(long)]
    folder_id: Option<String>,

    /// Comma-separated list of project IDs
    #[arg(long)]
    project_ids: Option<String>,
}

#[derive(Args, Debug, Clone)]
struct CommonArgs {
    /// Maximum parallel project workers
    #[arg(long)]
    max_workers: Option<usize>,

    /// Logging level
    #[arg(long, value_enum, ignore_case = true, default_value = "info")]
    log_level: LogLevel,

    /// Pause after each collector call, in milliseconds
    #[arg(long)]
    request_delay_ms: Option<u64>,

    /// Timeout for each data query, in seconds
    #[arg(long)]
    command_timeout: Option<u64>,
}

#[derive(Args, Debug)]
struct DomainArgs {
    #[command(flatten)]
    scope: ScopeArgs,

    /// Output filename prefix
    #[arg(long)]
    output_prefix: Option<String>,

    #[command(flatten)]
    common: CommonArgs,
}

#[derive(Args, Debug)]
struct ComputeArgs {
    #[command(flatten)]
    domain: DomainArgs,

    /// Inventory CSV path (overrides the generated name)
    #[arg(long)]
    inventory_file: Option<PathBuf>,

    /// Utilization CSV path (overrides the generated name)
    #[arg(long)]
    utilization_file: Option<PathBuf>,
}

#[derive(Args, Debug)]
struct AllArgs {
    #[command(flatten)]
    scope: ScopeArgs,

    /// Comma-separated services to assess
    #[arg(long, default_value = "compute,networking,storage,gke")]
    services: String,

    /// Run assessments in parallel (default: sequential)
    #[arg(long)]
    parallel: bool,

    /// Timeout per assessment in seconds
    #[arg(long, default_value_t = DEFAULT_DOMAIN_TIMEOUT_SECS)]
    timeout: u64,

    /// Summary report filename
    #[arg(long, default_value = DEFAULT_SUMMARY_REPORT)]
    summary_report: PathBuf,

    #[command(flatten)]
    common: CommonArgs,
}

#[derive(Args, Debug)]
struct ValidateArgs {
    #[command(flatten)]
    scope: ScopeArgs,

    /// Logging level
    #[arg(long, value_enum, ignore_case = true, default_value = "info")]
    log_level: LogLevel,
}

impl From<ScopeArgs> for ScopeFlags {
    fn from(args: ScopeArgs) -> Self {
        ScopeFlags {
            organization_id: args.org_id,
            folder_id: args.folder_id,
            project_ids: args.project_ids,
        }
    }
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum LogLevel {
    Debug,
    Info,
    Warning,
    Error,
}

impl LogLevel {
    fn to_tracing_level(self) -> Level {
        match self {
            LogLevel::Debug => Level::DEBUG,
            LogLevel::Info => Level::INFO,
            LogLevel::Warning => Level::WARN,
            LogLevel::Error => Level::ERROR,
        }
    }

    /// Name as passed on to child processes
    fn flag_value(self) -> &'static str {
        match self {
            LogLevel::Debug => "DEBUG",
            LogLevel::Info => "INFO",
            LogLevel::Warning => "WARNING",
            LogLevel::Error => "ERROR",
        }
    }
}

/// Log to stdout and, when given, to a file in the working directory
fn setup_logging(
    level: LogLevel,
    log_file: Option<&str>,
) -> Option<tracing_appender::non_blocking::WorkerGuard> {
    let tracing_level = level.to_tracing_level();
    let builder = tracing_subscriber::fmt()
        .with_max_level(tracing_level)
        .with_ansi(false)
        .with_target(false);

    let file = log_file.and_then(|path| {
        match std::fs::OpenOptions::new().create(true).append(true).open(path) {
            Ok(file) => Some(file),
            Err(e) => {
                eprintln!("Cannot open log file {}: {}", path, e);
                None
            }
        }
    });

    match file {
        Some(file) => {
            let (non_blocking, guard) = tracing_appender::non_blocking(file);
            builder
                .with_writer(std::io::stdout.and(non_blocking).with_max_level(tracing_level))
                .init();
            Some(guard)
        }
        None => {
            builder.with_writer(std::io::stdout).init();
            None
        }
    }
}

/// Config file values with the CLI overrides applied
fn load_config(common: &CommonArgs) -> Config {
    let mut config = Config::load();
    if let Some(delay) = common.request_delay_ms {
        config.request_delay_ms = delay;
    }
    if let Some(timeout) = common.command_timeout {
        config.command_timeout_secs = timeout;
    }
    config
}

fn build_cli(config: &Config) -> GcpCli {
    GcpCli::new(Arc::new(SystemRunner), config)
}

async fn run_domain(domain: Domain, args: DomainArgs, overrides: Vec<(&str, PathBuf)>) -> ExitCode {
    let _log_guard = setup_logging(args.common.log_level, Some(domain.log_file().as_str()));
    let config = load_config(&args.common);

    let mut target = ExportTarget::new(
        args.output_prefix
            .unwrap_or_else(|| domain.default_prefix()),
    );
    for (key, path) in overrides {
        target = target.with_override(key, path);
    }

    let flags = ScopeFlags::from(args.scope).or_env();
    let options = AssessmentOptions {
        domain,
        scope: flags.scope(),
        organization_id: flags.organization_id,
        max_workers: config.effective_max_workers(args.common.max_workers),
        target,
    };

    match run_assessment(build_cli(&config), options).await {
        Ok(_) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("{:#}", e);
            ExitCode::from(1)
        }
    }
}

async fn run_all(args: AllArgs) -> Result<ExitCode> {
    let _log_guard = setup_logging(args.common.log_level, Some(MASTER_LOG_FILE));

    let services = match parse_services(&args.services) {
        Ok(services) => services,
        Err(invalid) => {
            tracing::error!("Invalid services: {}", invalid.join(", "));
            tracing::error!(
                "Available services: {}",
                Domain::ALL.map(|d| d.name()).join(", ")
            );
            return Ok(ExitCode::from(1));
        }
    };

    if args.scope.org_id.is_none() && args.scope.folder_id.is_none() && args.scope.project_ids.is_none() {
        tracing::warn!("No scope specified. Will assess all accessible projects.");
    }

    let program = std::env::current_exe().context("locating the gcp-assess executable")?;
    let options = OrchestratorOptions {
        program: program.to_string_lossy().into_owned(),
        services,
        child: ChildArgs {
            organization_id: args.scope.org_id,
            folder_id: args.scope.folder_id,
            project_ids: args.scope.project_ids,
            max_workers: args.common.max_workers,
            log_level: Some(args.common.log_level.flag_value().to_string()),
            request_delay_ms: args.common.request_delay_ms,
            command_timeout: args.common.command_timeout,
        },
        parallel: args.parallel,
        timeout: Duration::from_secs(args.timeout),
    };

    let summary = orchestrator::run_all(&SystemRunner, &options).await;
    let report = orchestrator::render_summary(&summary, &chrono::Utc::now());
    orchestrator::write_summary(&args.summary_report, &report)?;
    orchestrator::log_completion(&summary, &args.summary_report);

    Ok(if summary.all_succeeded() {
        ExitCode::SUCCESS
    } else {
        ExitCode::from(1)
    })
}

async fn run_validate(args: ValidateArgs) -> ExitCode {
    let _log_guard = setup_logging(args.log_level, None);
    let config = Config::load();
    let cli = build_cli(&config);

    let inputs = validate::ValidationInputs::from_cli_or_env(
        args.scope.org_id,
        args.scope.folder_id,
        args.scope.project_ids,
    );
    let results = validate::run_validation(&cli, &inputs).await;

    if validate::all_passed(&results) {
        ExitCode::SUCCESS
    } else {
        ExitCode::from(1)
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let result = match cli.command {
        Command::Compute(args) => {
            let mut overrides = Vec::new();
            if let Some(path) = args.inventory_file {
                overrides.push((compute::INVENTORY, path));
            }
            if let Some(path) = args.utilization_file {
                overrides.push((compute::UTILIZATION, path));
            }
            Ok(run_domain(Domain::Compute, args.domain, overrides).await)
        }
        Command::Networking(args) => Ok(run_domain(Domain::Networking, args, Vec::new()).await),
        Command::Storage(args) => Ok(run_domain(Domain::Storage, args, Vec::new()).await),
        Command::Gke(args) => Ok(run_domain(Domain::Gke, args, Vec::new()).await),
        Command::All(args) => run_all(args).await,
        Command::Validate(args) => Ok(run_validate(args).await),
    };

    match result {
        Ok(code) => code,
        Err(err) => {
            tracing::error!("{:#}", err);
            eprintln!("Error: {err:#}");
            ExitCode::from(2)
        }
    }
}
