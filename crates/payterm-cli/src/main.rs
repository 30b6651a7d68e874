//! `payterm` command line tool.
//!
//! Loads terminal settings from an optional JSON file, `.env` and the
//! environment, then either prints them or runs a complete payment session
//! against the simulated terminal driver.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand, ValueEnum};
use payterm_core::TerminalSettings;
use payterm_device::mock::{InitResponse, MockTerminalFactory, MockTerminalHandle};
use payterm_device::{DeviceEvent, DeviceStatus, PaymentCompletedEvent};
use payterm_terminal::{TerminalManager, TerminalState};
use rust_decimal::Decimal;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "payterm", version, about = "Payment terminal connection tool")]
struct Cli {
    /// Increase log verbosity (-v info, -vv debug, -vvv trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Environment file to load before reading settings
    #[arg(long, global = true, env = "PAYTERM_ENV_FILE")]
    env_file: Option<PathBuf>,

    /// JSON settings file; environment variables override its values
    #[arg(long, global = true, env = "PAYTERM_CONFIG_FILE")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Print the resolved terminal settings as JSON
    Config,

    /// Run a full session against the simulated terminal
    Demo(DemoArgs),
}

#[derive(clap::Args)]
struct DemoArgs {
    /// How the simulated terminal answers initialization
    #[arg(long, value_enum, default_value_t = Scenario::Ready)]
    scenario: Scenario,

    /// Payment amount in major units
    #[arg(long, default_value = "12.50")]
    amount: Decimal,

    /// Currency code; the configured default when omitted
    #[arg(long)]
    currency: Option<String>,

    /// Use server-mode initialization
    #[arg(long)]
    server_mode: bool,

    /// Override every initialization wait bound (milliseconds)
    #[arg(long)]
    timeout_ms: Option<u64>,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum Scenario {
    /// Terminal reports success right away
    Ready,
    /// Pairing required, pairing login succeeds
    Pairing,
    /// Pairing required, terminal refuses every login
    PairingLocked,
    /// Terminal never answers
    Silent,
}

impl Scenario {
    fn script(self, handle: &MockTerminalHandle) {
        match self {
            Scenario::Ready => {}
            Scenario::Pairing => {
                handle.queue_init(InitResponse::status(-30, "Device configuration required"));
            }
            Scenario::PairingLocked => {
                handle.set_default_init(InitResponse::status(-30, "Device configuration required"));
                handle.set_default_login(DeviceStatus::new(-150, "Terminal locked"));
            }
            Scenario::Silent => handle.set_default_init(InitResponse::Silent),
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match &cli.env_file {
        Some(path) => {
            dotenvy::from_path(path)
                .with_context(|| format!("failed to load {}", path.display()))?;
        }
        None => {
            // A missing .env is fine; settings fall back to defaults.
            dotenvy::dotenv().ok();
        }
    }
    init_tracing(cli.verbose);

    let settings = match &cli.config {
        Some(path) => TerminalSettings::load(path),
        None => TerminalSettings::from_env(),
    }
    .context("invalid terminal settings")?;

    match cli.command {
        Command::Config => {
            println!("{}", serde_json::to_string_pretty(&settings)?);
            Ok(())
        }
        Command::Demo(args) => run_demo(settings, args).await,
    }
}

fn init_tracing(verbosity: u8) {
    let filter = match verbosity {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_target(false)
        .init();
}

async fn run_demo(mut settings: TerminalSettings, args: DemoArgs) -> Result<()> {
    if let Some(ms) = args.timeout_ms {
        let bound = Duration::from_millis(ms);
        settings = settings.with_timeouts(bound, bound, bound);
    }

    let (factory, handle) = MockTerminalFactory::new();
    args.scenario.script(&handle);

    let manager = TerminalManager::new(factory, settings);
    let mut payments = manager.subscribe_payments();

    info!(scenario = ?args.scenario, server_mode = args.server_mode, "initializing terminal");
    let init = if args.server_mode {
        manager.initialize_terminal_server_mode()
    } else {
        manager.initialize_terminal()
    };
    let state = init.wait().await;
    println!("{}", serde_json::to_string_pretty(&manager.status())?);

    if state != TerminalState::Ready {
        bail!("terminal not ready: {}", manager.last_error());
    }

    manager.login()?;
    manager.start_session()?;
    let submission = manager.submit_payment(args.amount, args.currency.as_deref())?;
    println!("{}", serde_json::to_string_pretty(&submission)?);

    // The simulated terminal approves the payment straight away.
    handle.emit(DeviceEvent::PaymentCompleted(PaymentCompletedEvent {
        status: DeviceStatus::success("Approved"),
        payment_id: submission.payment_id.clone(),
    }));
    match tokio::time::timeout(Duration::from_secs(1), payments.recv()).await {
        Ok(Ok(update)) => println!("{}", serde_json::to_string_pretty(&update)?),
        Ok(Err(e)) => warn!(error = %e, "payment updates unavailable"),
        Err(_) => warn!("no payment completion received"),
    }

    manager.end_session()?;
    manager.tear_down()?;
    info!("session complete");
    Ok(())
}
