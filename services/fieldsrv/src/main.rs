//! EDS field unit service
//!
//! Runs the orchestration loop and a few maintenance commands.

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use eds_schedule::ActivationLedger;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

use common::config_loader::resolve_config_path;
use common::service_bootstrap::{self, ServiceInfo};
use fieldsrv::simulated::simulated_hardware;
use fieldsrv::status;
use fieldsrv::{Config, ConfigSource, OrchestrationLoop};

const SERVICE_NAME: &str = "fieldsrv";

#[derive(Parser, Debug)]
#[command(author, version, about = "fieldsrv - EDS field test orchestrator")]
struct Args {
    /// Configuration file (default: $FIELDSRV_CONFIG or config/fieldsrv.yaml)
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Log level, overridden by RUST_LOG
    #[arg(short, long, value_name = "LEVEL")]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Run the orchestration loop until SIGINT/SIGTERM
    Run {
        /// Use the simulated hardware backend
        #[arg(long)]
        simulate: bool,

        /// Manual switch flag file for the simulated backend
        #[arg(long, value_name = "FILE", default_value = "manual_test.flag")]
        switch_flag: PathBuf,
    },
    /// Validate the configuration and show today's schedule
    Check,
    /// Inspect or reset the activation ledger
    Ledger {
        #[command(subcommand)]
        action: LedgerAction,
    },
    /// Write the default configuration as YAML
    InitConfig {
        #[arg(value_name = "FILE")]
        path: PathBuf,
    },
}

#[derive(Debug, Subcommand)]
enum LedgerAction {
    /// Print every panel record
    Show,
    /// Forget every activation (after a schedule change)
    Reset,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    if let Some(Commands::InitConfig { path }) = &args.command {
        return init_config(path);
    }

    let config_path = resolve_config_path(SERVICE_NAME, args.config.clone());
    let (config, source) = Config::load(&config_path)
        .with_context(|| format!("loading {}", config_path.display()))?;

    let service = ServiceInfo::new(
        SERVICE_NAME,
        env!("CARGO_PKG_VERSION"),
        "EDS field test orchestrator",
    );
    let level = args
        .log_level
        .clone()
        .unwrap_or_else(|| config.logging.level.clone());
    service_bootstrap::init_logging(
        &service,
        config.logging.dir.as_deref(),
        Some(level.as_str()),
    )?;
    match &source {
        ConfigSource::File(path) => info!("Configuration loaded from {}", path.display()),
        ConfigSource::Defaults(path) => warn!(
            "Configuration file {} not found, using built-in defaults",
            path.display()
        ),
    }

    match args.command {
        Some(Commands::Check) => check(&config),
        Some(Commands::Ledger { action }) => ledger(&config, action),
        Some(Commands::Run {
            simulate,
            switch_flag,
        }) => run(config, &service, simulate, switch_flag).await,
        Some(Commands::InitConfig { .. }) => Ok(()),
        None => run(config, &service, false, PathBuf::from("manual_test.flag")).await,
    }
}

async fn run(
    config: Config,
    service: &ServiceInfo,
    simulate: bool,
    switch_flag: PathBuf,
) -> anyhow::Result<()> {
    if !simulate {
        bail!("no hardware backend is built into this binary, start with `run --simulate`");
    }
    service_bootstrap::print_startup_banner(service);
    info!("Using the simulated hardware backend");

    let hardware = simulated_hardware(&config, switch_flag);
    let mut orchestrator = OrchestrationLoop::open(config, hardware)?;
    let token = common::shutdown::shutdown_token();
    orchestrator.run(token).await?;
    Ok(())
}

fn check(config: &Config) -> anyhow::Result<()> {
    let now = chrono::Local::now().naive_local();
    status::write_schedule(config, now, &mut std::io::stdout().lock())?;
    Ok(())
}

fn ledger(config: &Config, action: LedgerAction) -> anyhow::Result<()> {
    match action {
        LedgerAction::Show => status::write_ledger(config, &mut std::io::stdout().lock())?,
        LedgerAction::Reset => {
            let (mut ledger, _) =
                ActivationLedger::load(&config.storage.ledger_path, &config.eds_panel_ids())?;
            ledger.reset()?;
            println!("Ledger {} reset", ledger.path().display());
        },
    }
    Ok(())
}

fn init_config(path: &Path) -> anyhow::Result<()> {
    if path.exists() {
        bail!("{} already exists", path.display());
    }
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, Config::default().to_yaml()?)?;
    println!("Default configuration written to {}", path.display());
    Ok(())
}
