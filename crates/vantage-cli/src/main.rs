//! Vantage - Observability Stack Deployment
//!
//! Usage:
//!   vantage check            # Validate and summarize the configuration
//!   vantage plan             # Show what a deployment would do
//!   vantage deploy           # Run the deployment over SSH

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Result;
use clap::{Parser, Subcommand, ValueEnum};
use console::style;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use vantage_core::commands::{
    CheckCommand, CheckOptions, CheckReport, DEFAULT_CONFIG_PATH, DEFAULT_DOWNLOAD_DIR,
    DeployCommand, DeployOptions, PlanCommand, PlanOptions, PlanReport,
};
use vantage_core::inventory::TargetGroup;
use vantage_core::report::{DeployReport, StepOutcome};

#[derive(Parser)]
#[command(name = "vantage")]
#[command(about = "Observability stack deployment over SSH", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Load and validate the configuration, print a summary
    Check {
        /// Configuration file path
        #[arg(long, default_value = DEFAULT_CONFIG_PATH)]
        config_path: PathBuf,

        /// Output format
        #[arg(short, long, default_value = "table")]
        format: OutputFormat,
    },

    /// Show the full deployment plan without touching the network
    Plan {
        /// Configuration file path
        #[arg(long, default_value = DEFAULT_CONFIG_PATH)]
        config_path: PathBuf,

        /// Directory for downloaded archives
        #[arg(long, default_value = DEFAULT_DOWNLOAD_DIR)]
        download_dir: PathBuf,

        /// Plan as if existing archives were overwritten
        #[arg(long)]
        overwrite: bool,

        /// Restrict to one inventory group
        #[arg(long, value_name = "GROUP")]
        limit: Option<TargetGroup>,

        /// Output format
        #[arg(short, long, default_value = "table")]
        format: OutputFormat,
    },

    /// Run the deployment
    Deploy {
        /// Configuration file path
        #[arg(long, default_value = DEFAULT_CONFIG_PATH)]
        config_path: PathBuf,

        /// Directory for downloaded archives
        #[arg(long, default_value = DEFAULT_DOWNLOAD_DIR)]
        download_dir: PathBuf,

        /// Re-download and re-upload archives that already exist
        #[arg(long)]
        overwrite: bool,

        /// Restrict execution to one inventory group
        #[arg(long, value_name = "GROUP")]
        limit: Option<TargetGroup>,

        /// Skip the confirmation prompt (for CI/CD)
        #[arg(short = 'y', long)]
        yes: bool,

        /// Additionally write logs to a daily-rotated file in DIR
        #[arg(long, value_name = "DIR")]
        log_dir: Option<PathBuf>,

        /// Output format
        #[arg(short, long, default_value = "table")]
        format: OutputFormat,
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

// Returning the exit code (instead of process::exit) lets the
// tracing-appender guard drop and flush buffered file-log lines.
fn main() -> Result<ExitCode> {
    let cli = Cli::parse();

    let log_dir = match &cli.command {
        Commands::Deploy { log_dir, .. } => log_dir.clone(),
        _ => None,
    };
    let _guard = init_tracing(log_dir);

    match cli.command {
        Commands::Check {
            config_path,
            format,
        } => {
            run_check(config_path, format)?;
            Ok(ExitCode::SUCCESS)
        }
        Commands::Plan {
            config_path,
            download_dir,
            overwrite,
            limit,
            format,
        } => {
            run_plan(config_path, download_dir, overwrite, limit, format)?;
            Ok(ExitCode::SUCCESS)
        }
        Commands::Deploy {
            config_path,
            download_dir,
            overwrite,
            limit,
            yes,
            format,
            ..
        } => run_deploy(config_path, download_dir, overwrite, limit, yes, format),
    }
}

fn init_tracing(log_dir: Option<PathBuf>) -> Option<tracing_appender::non_blocking::WorkerGuard> {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "vantage=debug,info".into());

    if let Some(dir) = log_dir {
        let appender = tracing_appender::rolling::daily(dir, "vantage.log");
        let (writer, guard) = tracing_appender::non_blocking(appender);
        tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer())
            .with(
                tracing_subscriber::fmt::layer()
                    .with_writer(writer)
                    .with_ansi(false),
            )
            .init();
        Some(guard)
    } else {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer())
            .init();
        None
    }
}

fn run_check(config_path: PathBuf, format: OutputFormat) -> Result<()> {
    let report = CheckCommand::new().execute(&CheckOptions::new(config_path))?;

    match format {
        OutputFormat::Table => print_check_table(&report),
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&report)?),
    }
    Ok(())
}

fn print_check_table(report: &CheckReport) {
    println!("Configuration: {}", report.config_path.display());
    println!("Cluster mode: {:?}", report.cluster_mode);
    println!();

    println!("Target groups:");
    for group in &report.groups {
        println!("  {:<22} {} host(s)", group.group.to_string(), group.hosts);
    }
    println!();

    println!("Packages:");
    for package in &report.packages {
        let availability = if package.available {
            style("present").green().to_string()
        } else {
            style("missing (will download)").yellow().to_string()
        };
        println!(
            "  {:<15} {:<25} {}",
            package.service.to_string(),
            availability,
            package.local_path.display()
        );
    }
    println!();

    if report.proxy.direct {
        println!("Downloads: direct (no proxy)");
    } else {
        println!(
            "Downloads: via {}{}",
            report.proxy.url.as_deref().unwrap_or("-"),
            if report.proxy.verify_ssl {
                ""
            } else {
                " (TLS verification disabled)"
            }
        );
    }

    println!();
    println!("{} Configuration is valid", style("✓").green());
}

fn run_plan(
    config_path: PathBuf,
    download_dir: PathBuf,
    overwrite: bool,
    limit: Option<TargetGroup>,
    format: OutputFormat,
) -> Result<()> {
    let mut options = PlanOptions::new(config_path, download_dir).with_overwrite(overwrite);
    if let Some(group) = limit {
        options = options.with_limit(group);
    }
    let report = PlanCommand::new().execute(&options)?;

    match format {
        OutputFormat::Table => print_plan_table(&report),
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&report)?),
    }
    Ok(())
}

fn print_plan_table(report: &PlanReport) {
    use vantage_core::packages::ProvisionKind;

    println!("Provisioning:");
    for action in &report.provisioning {
        let what = match &action.kind {
            ProvisionKind::UseLocal => "use local archive".to_string(),
            ProvisionKind::Download { url } => format!("download from {url}"),
            ProvisionKind::Missing => style("no archive and no URL").red().to_string(),
        };
        println!("  {:<15} {}", action.service.to_string(), what);
    }
    println!();

    println!("Staging uploads:");
    for upload in &report.staging {
        println!(
            "  {:<15} -> {}",
            upload.service.to_string(),
            upload.remote_path.display()
        );
    }

    for service in &report.services {
        println!();
        println!(
            "{} {} on {}",
            style("==").bold(),
            style(service.service.to_string()).bold(),
            service.hosts.join(", ")
        );
        for (index, step) in service.steps.iter().enumerate() {
            println!("  {}. {}", index + 1, step);
        }
    }
}

fn run_deploy(
    config_path: PathBuf,
    download_dir: PathBuf,
    overwrite: bool,
    limit: Option<TargetGroup>,
    yes: bool,
    format: OutputFormat,
) -> Result<ExitCode> {
    if !yes && !confirm_deploy(&config_path, limit)? {
        println!("Deployment cancelled.");
        return Ok(ExitCode::SUCCESS);
    }

    let mut options = DeployOptions::new(config_path, download_dir).with_overwrite(overwrite);
    if let Some(group) = limit {
        options = options.with_limit(group);
    }
    let report = DeployCommand::new().execute(&options)?;

    match format {
        OutputFormat::Table => print_deploy_table(&report),
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&report)?),
    }

    Ok(deploy_exit(report.failed()))
}

fn deploy_exit(failed: bool) -> ExitCode {
    if failed {
        ExitCode::FAILURE
    } else {
        ExitCode::SUCCESS
    }
}

fn confirm_deploy(config_path: &std::path::Path, limit: Option<TargetGroup>) -> Result<bool> {
    let scope = match limit {
        Some(group) => format!("group '{group}'"),
        None => "all configured hosts".to_string(),
    };
    let prompt = format!(
        "Deploy the observability stack from {} to {}?",
        config_path.display(),
        scope
    );
    Ok(dialoguer::Confirm::new()
        .with_prompt(prompt)
        .default(false)
        .interact()?)
}

fn print_deploy_table(report: &DeployReport) {
    println!("Staged archives:");
    for archive in &report.staged {
        let action = if archive.uploaded {
            style("uploaded").green().to_string()
        } else {
            "already present".to_string()
        };
        println!(
            "  {:<15} {:<18} {}",
            archive.service.to_string(),
            action,
            archive.remote_path.display()
        );
    }

    for host in &report.hosts {
        println!();
        println!(
            "{} {} ({})",
            style("Host").bold(),
            style(&host.ip).bold(),
            host.service
        );
        for step in &host.steps {
            match &step.outcome {
                StepOutcome::Changed => {
                    println!("  {} {}", style("✓").green(), step.description)
                }
                StepOutcome::Skipped => println!("  • {} (skipped)", step.description),
                StepOutcome::Failed { message } => {
                    println!("  {} {}", style("✗").red(), step.description);
                    println!("    {}", style(message).red());
                }
            }
        }
    }

    let (changed, skipped, failed) = report.step_totals();
    let duration = report.finished_at - report.started_at;
    println!();
    println!(
        "Summary: {} changed, {} skipped, {} failed across {} host(s) in {}s",
        changed,
        skipped,
        failed,
        report.hosts.len(),
        duration.num_seconds()
    );
    if failed > 0 {
        println!("{}", style("Deployment finished with failures").red());
    } else {
        println!("{}", style("Deployment finished successfully").green());
    }
}
