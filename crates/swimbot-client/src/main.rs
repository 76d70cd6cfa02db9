//! swimbot: command-line front end for the swimming robot.
//!
//! Connects to the robot's TCP control socket, runs one command, and exits;
//! or, with `monitor`, keeps the connection supervised and prints every
//! status update and connection event until Ctrl+C.
//!
//! # Usage
//!
//! ```text
//! swimbot [OPTIONS] <COMMAND>
//!
//! Commands:
//!   status       Print one status snapshot
//!   mode         Switch the operating mode (servo-off, init-pose, stay, swim, raise, emergency-surface)
//!   swim         Send a locomotion command (forward, turn-left, turn-right, rise-up, stay)
//!   params       Upload gait parameters
//!   monitor      Poll the robot and print events until Ctrl+C
//!   init-config  Write the default config file
//!
//! Options:
//!   --config   <PATH>   Config file [default: platform config dir]
//!   --host     <HOST>   Robot host, overrides the config file
//!   --port     <PORT>   Robot port, overrides the config file
//!   --location <NAME>   Use a [[locations]] preset from the config file
//! ```
//!
//! # Environment variable overrides
//!
//! | Variable           | Flag         |
//! |--------------------|--------------|
//! | `SWIMBOT_CONFIG`   | `--config`   |
//! | `SWIMBOT_HOST`     | `--host`     |
//! | `SWIMBOT_PORT`     | `--port`     |
//! | `SWIMBOT_LOCATION` | `--location` |
//!
//! The log level comes from `RUST_LOG` when set, otherwise from
//! `[logging] log_level` in the config file.

use std::path::PathBuf;

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use tokio::sync::broadcast::error::RecvError;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use swimbot_client::infrastructure::storage::config::{
    config_file_path, load_config, load_config_from, save_config, save_config_to, AppConfig,
    ConfigError,
};
use swimbot_client::{
    spawn, ConnectionSupervisor, DeviceAddress, RobotHandle, SupervisorEvent, TcpConnector,
};
use swimbot_core::{Mode, SwimCommand, SwimParameters};

// ── CLI argument definitions ──────────────────────────────────────────────────

/// Control client for the swimming robot.
#[derive(Debug, Parser)]
#[command(name = "swimbot", about = "Control client for the swimming robot", version)]
struct Cli {
    /// Path to the TOML config file.
    #[arg(long, global = true, env = "SWIMBOT_CONFIG")]
    config: Option<PathBuf>,

    /// Robot hostname or IP address.
    #[arg(long, global = true, env = "SWIMBOT_HOST")]
    host: Option<String>,

    /// Robot control port.
    #[arg(long, global = true, env = "SWIMBOT_PORT")]
    port: Option<u16>,

    /// Named location preset from the config file (e.g. `home`, `school`).
    #[arg(long, global = true, env = "SWIMBOT_LOCATION")]
    location: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Print one status snapshot.
    Status {
        /// Print JSON instead of a human-readable line.
        #[arg(long)]
        json: bool,
    },
    /// Switch the robot's operating mode.
    Mode {
        #[arg(value_name = "MODE")]
        mode: Mode,
    },
    /// Send a locomotion command.
    Swim {
        #[arg(value_name = "COMMAND")]
        command: SwimCommand,
    },
    /// Upload gait parameters.  Unset flags fall back to `[swim]` in the
    /// config file; every value is clamped to its valid range first.
    Params {
        /// Stroke period in seconds (0.5–3.0).
        #[arg(long)]
        period: Option<f32>,
        /// Wing amplitude in degrees (0–90).
        #[arg(long)]
        wing: Option<f32>,
        /// Maximum body angle in degrees (0–45).
        #[arg(long)]
        max_angle: Option<f32>,
        /// Yaw rate (-1.0–1.0).
        #[arg(long, allow_hyphen_values = true)]
        y_rate: Option<f32>,
        /// Swim backwards.
        #[arg(long)]
        backward: bool,
    },
    /// Keep the connection supervised and print events until Ctrl+C.
    Monitor {
        /// Print one JSON object per event.
        #[arg(long)]
        json: bool,
    },
    /// Write the default config file.
    InitConfig {
        /// Overwrite an existing file.
        #[arg(long)]
        force: bool,
    },
}

impl Cli {
    fn config_path(&self) -> Result<PathBuf, ConfigError> {
        match &self.config {
            Some(path) => Ok(path.clone()),
            None => config_file_path(),
        }
    }

    /// `--config` if given, else the platform file; built-in defaults when
    /// the platform has no config directory.
    fn load_config(&self) -> anyhow::Result<AppConfig> {
        match &self.config {
            Some(path) => load_config_from(path)
                .with_context(|| format!("loading config from {}", path.display())),
            None => match load_config() {
                Ok(config) => Ok(config),
                Err(ConfigError::NoPlatformConfigDir) => Ok(AppConfig::default()),
                Err(e) => Err(e).context("loading the platform config file"),
            },
        }
    }

    /// Resolves the robot address: `--location` preset or `[device]`, then
    /// `--host` / `--port` on top.
    fn device_address(&self, config: &AppConfig) -> anyhow::Result<DeviceAddress> {
        let mut address = config
            .device_address(self.location.as_deref())
            .context("resolving the robot address")?;
        if let Some(host) = &self.host {
            address.host = host.clone();
        }
        if let Some(port) = self.port {
            address.port = port;
        }
        Ok(address)
    }
}

// ── Entry point ───────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // The config file also carries the default log level, so it is read first.
    let config = cli.load_config()?;

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(&config.logging.log_level)),
        )
        .with_writer(std::io::stderr)
        .init();

    if let Command::InitConfig { force } = cli.command {
        return init_config(&cli, &config, force);
    }

    let address = cli.device_address(&config)?;
    let supervisor = ConnectionSupervisor::new(Box::new(TcpConnector), address.clone(), config.policy());
    let (handle, worker) = spawn(supervisor);

    let result = run_command(&cli.command, &config, &handle, &address).await;

    handle.shutdown().await;
    if let Err(e) = worker.await {
        warn!("robot service task ended abnormally: {e}");
    }
    result
}

async fn run_command(
    command: &Command,
    config: &AppConfig,
    handle: &RobotHandle,
    address: &DeviceAddress,
) -> anyhow::Result<()> {
    match command {
        Command::Status { json } => {
            connect(handle, address).await?;
            let Some(status) = handle.query_status().await else {
                bail!("robot at {address} did not return a valid status");
            };
            if *json {
                println!("{}", serde_json::to_string_pretty(&status)?);
            } else {
                println!("{status}");
            }
        }
        Command::Mode { mode } => {
            connect(handle, address).await?;
            if !handle.set_mode(*mode).await {
                bail!("robot did not accept mode {mode}");
            }
            println!("mode set to {mode}");
        }
        Command::Swim { command } => {
            connect(handle, address).await?;
            if !handle.send_swim_command(*command).await {
                bail!("robot did not accept swim command {command}");
            }
            println!("swim command {command} sent");
        }
        Command::Params {
            period,
            wing,
            max_angle,
            y_rate,
            backward,
        } => {
            let defaults = config.swim;
            let requested = SwimParameters::new(
                period.unwrap_or(defaults.period_sec),
                wing.unwrap_or(defaults.wing_deg),
                max_angle.unwrap_or(defaults.max_angle_deg),
                y_rate.unwrap_or(defaults.y_rate),
                *backward || defaults.is_backward,
            );
            let params = requested.clamped();
            if params != requested {
                warn!("parameters clamped to valid ranges: {params:?}");
            }
            connect(handle, address).await?;
            if !handle.send_parameters(params).await {
                bail!("robot did not accept the parameters");
            }
            println!(
                "parameters sent: period={:.2}s wing={:.1}° max_angle={:.1}° y_rate={:.2} backward={}",
                params.period_sec, params.wing_deg, params.max_angle_deg, params.y_rate, params.is_backward
            );
        }
        Command::Monitor { json } => monitor(handle, address, *json).await?,
        Command::InitConfig { .. } => unreachable!("handled before connecting"),
    }
    Ok(())
}

/// Connects once; single-shot commands do not wait for poll retries.
async fn connect(handle: &RobotHandle, address: &DeviceAddress) -> anyhow::Result<()> {
    if !handle.connect().await {
        bail!("could not connect to robot at {address}");
    }
    Ok(())
}

async fn monitor(handle: &RobotHandle, address: &DeviceAddress, json: bool) -> anyhow::Result<()> {
    let mut events = handle.subscribe();
    info!("monitoring {address}; press Ctrl+C to stop");

    // A failed first attempt is fine here: the poll loop keeps retrying.
    handle.connect().await;

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("shutdown signal received");
                handle.disconnect().await;
                return Ok(());
            }
            event = events.recv() => match event {
                Ok(event) => {
                    print_event(&event, json)?;
                    if let SupervisorEvent::RetryExhausted { attempts } = event {
                        bail!("gave up on {address} after {attempts} failed connect attempt(s)");
                    }
                }
                Err(RecvError::Lagged(skipped)) => warn!("monitor fell behind; {skipped} event(s) skipped"),
                Err(RecvError::Closed) => return Ok(()),
            }
        }
    }
}

fn print_event(event: &SupervisorEvent, json: bool) -> anyhow::Result<()> {
    if json {
        println!("{}", serde_json::to_string(event)?);
        return Ok(());
    }
    match event {
        SupervisorEvent::Connecting { address, attempt } => {
            println!("connecting to {address} (attempt {attempt})")
        }
        SupervisorEvent::Connected { address } => println!("connected to {address}"),
        SupervisorEvent::ConnectFailed {
            attempt,
            max_retries,
            reason,
        } => println!("connect failed ({attempt}/{max_retries}): {reason}"),
        SupervisorEvent::Disconnected { reason } => println!("disconnected: {reason:?}"),
        SupervisorEvent::RetryExhausted { attempts } => {
            println!("retries exhausted after {attempts} attempt(s)")
        }
        SupervisorEvent::StatusUpdated { status } => println!("{status}"),
        SupervisorEvent::MalformedResponses { consecutive } => {
            println!("{consecutive} malformed status responses in a row")
        }
    }
    Ok(())
}

fn init_config(cli: &Cli, config: &AppConfig, force: bool) -> anyhow::Result<()> {
    let path = cli.config_path().context("locating the config file")?;
    if path.exists() && !force {
        bail!("{} already exists; pass --force to overwrite", path.display());
    }
    let fresh = if force { AppConfig::default() } else { config.clone() };
    let written = match &cli.config {
        Some(_) => save_config_to(&path, &fresh).map(|()| path.clone()),
        None => save_config(&fresh),
    }
    .with_context(|| format!("writing {}", path.display()))?;
    println!("wrote {}", written.display());
    Ok(())
}
