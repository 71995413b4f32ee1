//! hwtemp_exporter - Hardware Temperature Exporter Binary
//!
//! Samples lm-sensors and smartctl temperatures and serves them to Prometheus.

use anyhow::{Context, Result};
use clap::builder::BoolishValueParser;
use clap::{ArgAction, Args, Parser, Subcommand, ValueEnum};
use hwtemp_exporter::config::{
    DEFAULT_CPU_PATH, DEFAULT_NVME_PATH, DEFAULT_SSD_DEVICE, DEFAULT_WIFI_PATH,
};
use hwtemp_exporter::metrics::data::{
    CPU_TEMPERATURE, NETWORK_TEMPERATURE, NVME_TEMPERATURE, SSD_TEMPERATURE,
};
use hwtemp_exporter::{
    start_web_server, ExporterConfig, FieldPath, MetricPublisher, MissingPolicy, ReadingAcquirer,
    SystemCommandRunner, TemperatureCollector, WebConfig, DEFAULT_COOLDOWN_SECS,
    DEFAULT_INTERVAL_SECS, DEFAULT_PORT,
};
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{error, info, warn};
use tracing_subscriber::{filter::LevelFilter, EnvFilter, FmtSubscriber};

#[derive(Parser)]
#[command(name = "hwtemp_exporter")]
#[command(about = "🌡️ Hardware temperature exporter for Prometheus")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(
    long_about = "Samples lm-sensors and smartctl temperatures and serves them as Prometheus gauges"
)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Web server bind address
    #[arg(long, env = "HWTEMP_HOST", default_value = "0.0.0.0")]
    host: String,

    /// Web server port
    #[arg(short, long, env = "HWTEMP_PORT", default_value_t = DEFAULT_PORT)]
    port: u16,

    /// Path serving the metrics
    #[arg(long, env = "HWTEMP_METRICS_PATH", default_value = "/metrics")]
    metrics_path: String,

    /// Collection interval in seconds
    #[arg(short, long, env = "HWTEMP_INTERVAL", default_value_t = DEFAULT_INTERVAL_SECS)]
    interval: u64,

    /// Pause after a failed collection cycle, in seconds
    #[arg(long, env = "HWTEMP_COOLDOWN", default_value_t = DEFAULT_COOLDOWN_SECS)]
    cooldown: u64,

    /// lm-sensors executable
    #[arg(long, env = "HWTEMP_SENSORS_BIN", default_value = "sensors")]
    sensors_bin: String,

    /// smartctl executable
    #[arg(long, env = "HWTEMP_SMARTCTL_BIN", default_value = "smartctl")]
    smartctl_bin: String,

    /// Run smartctl directly instead of through sudo
    #[arg(
        long,
        env = "HWTEMP_NO_SUDO",
        action = ArgAction::SetTrue,
        value_parser = BoolishValueParser::new()
    )]
    no_sudo: bool,

    /// Field path of the CPU temperature in `sensors -j` output
    #[arg(long, env = "HWTEMP_CPU_PATH", default_value = DEFAULT_CPU_PATH, value_parser = parse_field_path)]
    cpu_path: FieldPath,

    /// Field path of the NVMe composite temperature
    #[arg(long, env = "HWTEMP_NVME_PATH", default_value = DEFAULT_NVME_PATH, value_parser = parse_field_path)]
    nvme_path: FieldPath,

    /// Field path of the wireless adapter temperature
    #[arg(long, env = "HWTEMP_WIFI_PATH", default_value = DEFAULT_WIFI_PATH, value_parser = parse_field_path)]
    wifi_path: FieldPath,

    /// Block device queried with smartctl
    #[arg(long, env = "HWTEMP_SSD_DEVICE", default_value = DEFAULT_SSD_DEVICE)]
    ssd_device: String,

    /// What to expose when a reading is missing: retain, zero or sentinel:<value>
    #[arg(long, env = "HWTEMP_ON_MISSING", default_value = "retain", value_parser = parse_missing_policy)]
    on_missing: MissingPolicy,

    /// Per-metric override of --on-missing, as <metric>=<policy> (repeatable)
    #[arg(
        long,
        env = "HWTEMP_ON_MISSING_FOR",
        value_delimiter = ',',
        value_parser = parse_policy_override
    )]
    on_missing_for: Vec<(String, MissingPolicy)>,

    /// Consecutive misses on one series before a warning is logged, 0 to never warn
    #[arg(long, env = "HWTEMP_WARN_AFTER", default_value_t = 5)]
    warn_after: u32,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    /// Enable debug logging
    #[arg(short, long)]
    debug: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Collect periodically and serve metrics (default)
    Serve,

    /// Run a single collection cycle, print the result and exit
    Once(OnceArgs),
}

#[derive(Args)]
struct OnceArgs {
    /// Output format
    #[arg(short, long, value_enum, default_value_t = OutputFormat::Text)]
    format: OutputFormat,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
enum OutputFormat {
    /// Prometheus exposition text
    Text,
    /// Per-target report as JSON
    Json,
}

fn parse_field_path(s: &str) -> Result<FieldPath, String> {
    FieldPath::new(s).map_err(|e| e.to_string())
}

fn parse_missing_policy(s: &str) -> Result<MissingPolicy, String> {
    s.parse().map_err(|e: hwtemp_exporter::ExporterError| e.to_string())
}

fn parse_policy_override(s: &str) -> Result<(String, MissingPolicy), String> {
    let (metric, policy) = s
        .split_once('=')
        .ok_or_else(|| format!("expected <metric>=<policy>, got '{}'", s))?;
    Ok((metric.trim().to_string(), parse_missing_policy(policy)?))
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize tracing/logging
    init_logging(&cli)?;

    let config = build_config(&cli)?;

    match &cli.command {
        Some(Commands::Once(args)) => once_command(config, args).await,
        Some(Commands::Serve) | None => serve_command(&cli, config).await,
    }
}

fn init_logging(cli: &Cli) -> Result<()> {
    let level = if cli.debug {
        LevelFilter::DEBUG
    } else if cli.verbose {
        LevelFilter::INFO
    } else {
        LevelFilter::WARN
    };

    let subscriber = FmtSubscriber::builder()
        .with_env_filter(
            EnvFilter::builder()
                .with_default_directive(level.into())
                .from_env_lossy(),
        )
        .with_target(false)
        .compact()
        .finish();

    tracing::subscriber::set_global_default(subscriber)?;

    Ok(())
}

fn build_config(cli: &Cli) -> Result<ExporterConfig> {
    let privilege_prefix = if cli.no_sudo {
        None
    } else {
        Some("sudo".to_string())
    };

    let config = cli
        .on_missing_for
        .iter()
        .fold(ExporterConfig::default(), |config, (metric, policy)| {
            config.with_policy_override(metric.as_str(), *policy)
        })
        .with_interval_secs(cli.interval)
        .with_cooldown_secs(cli.cooldown)
        .with_sensors_bin(&cli.sensors_bin)
        .with_smartctl_bin(&cli.smartctl_bin)
        .with_privilege_prefix(privilege_prefix)
        .with_missing_policy(cli.on_missing)
        .with_warn_after_misses(cli.warn_after)
        .with_sensor_path(CPU_TEMPERATURE.name, cli.cpu_path.clone())
        .with_sensor_path(NVME_TEMPERATURE.name, cli.nvme_path.clone())
        .with_sensor_path(NETWORK_TEMPERATURE.name, cli.wifi_path.clone())
        .with_disk_device(SSD_TEMPERATURE.name, &cli.ssd_device);

    config.validate().context("Invalid configuration")?;
    Ok(config)
}

fn print_banner() {
    println!("🌡️  hwtemp_exporter - Hardware Temperature Exporter");
    println!("   Version: {}", env!("CARGO_PKG_VERSION"));
    println!();
}

async fn serve_command(cli: &Cli, config: ExporterConfig) -> Result<()> {
    print_banner();
    info!("Starting hardware temperature exporter...");

    let publisher = Arc::new(MetricPublisher::new(&config).context("Failed to register metrics")?);

    info!("Collection configuration:");
    info!("  - Interval: {}s", config.interval_secs);
    info!("  - Cool-down after failure: {}s", config.cooldown_secs);
    info!("  - Missing readings: {}", config.missing_policy);
    for target in &config.sensor_targets {
        info!(
            "  - {}{{{}}} <- sensors {}",
            target.metric, target.label_value, target.path
        );
    }
    for target in &config.disk_targets {
        info!(
            "  - {}{{{}}} <- {}",
            target.metric,
            target.label_value,
            config.disk_command(&target.device)
        );
    }

    let acquirer = ReadingAcquirer::new(SystemCommandRunner::new(), config);
    let collector = TemperatureCollector::new(acquirer, publisher.clone());

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let collection = tokio::spawn(collector.run(shutdown_rx));

    let web_config = WebConfig::new(&cli.host, cli.port).with_metrics_path(&cli.metrics_path);
    let served = start_web_server(web_config, publisher, shutdown_signal()).await;

    // The receiver may already be gone if the loop exited on its own.
    let _ = shutdown_tx.send(true);
    if let Err(e) = collection.await {
        warn!("Collection task ended abnormally: {}", e);
    }

    served.context("Metrics server failed")?;
    info!("Shutdown complete");
    Ok(())
}

async fn once_command(config: ExporterConfig, args: &OnceArgs) -> Result<()> {
    let publisher = Arc::new(MetricPublisher::new(&config)?);
    let acquirer = ReadingAcquirer::new(SystemCommandRunner::new(), config);
    let mut collector = TemperatureCollector::new(acquirer, publisher.clone());

    let report = collector.tick().await?;

    match args.format {
        OutputFormat::Text => print!("{}", publisher.render()?),
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&report)?),
    }

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to listen for Ctrl-C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!("Failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received SIGINT, shutting down"),
        _ = terminate => info!("Received SIGTERM, shutting down"),
    }
}
