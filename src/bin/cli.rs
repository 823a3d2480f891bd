//! FOTA CLI - Main entry point
//!
//! Runs the update server and offers direct registry management on the
//! data directory.

use clap::Parser;
use colored::Colorize;
use fota_lib::engine::{
    api::{create_router, ApiState},
    auth::Credentials,
    cli::{self, Cli, Commands, DevicesAction, OutputFormat},
    config::Config,
    protocol::{UpdateDecision, UpdateEngine},
};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    if let Err(e) = run_cli(cli) {
        eprintln!("{}", cli::error_line(&e.to_string()));
        std::process::exit(1);
    }
}

fn run_cli(cli: Cli) -> Result<(), Box<dyn std::error::Error>> {
    let config = load_config(&cli)?;
    let json_output = cli.format == OutputFormat::Json;

    match cli.command {
        Commands::Serve { port, host } => {
            let mut config = config;
            if let Some(port) = port {
                config.port = port;
            }
            if let Some(host) = host {
                config.host = host;
            }
            cmd_serve(config)?;
        }
        Commands::Devices { action } => {
            cmd_devices(action, &config, json_output)?;
        }
        Commands::Check { device_id, version } => {
            cmd_check(&config, &device_id, &version, json_output)?;
        }
    }

    Ok(())
}

fn load_config(cli: &Cli) -> Result<Config, Box<dyn std::error::Error>> {
    let mut config = match &cli.config {
        Some(path) => Config::load(path)?,
        None => Config::load_or_default(&cli.get_data_dir())?,
    };
    config.apply_env()?;
    if let Some(data_dir) = &cli.data_dir {
        config.data_dir = data_dir.clone();
    }
    Ok(config)
}

fn open_engine(config: &Config) -> Result<UpdateEngine, Box<dyn std::error::Error>> {
    Ok(UpdateEngine::open(&config.data_dir, config.upload_limits())?)
}

#[tokio::main]
async fn cmd_serve(config: Config) -> Result<(), Box<dyn std::error::Error>> {
    let engine = open_engine(&config)?;

    if config.auth.username.is_empty() || config.auth.password.is_empty() {
        warn!("running with an empty username or password");
    }
    let credentials = Credentials::new(&config.auth.username, &config.auth.password);

    let app = create_router(ApiState::new(engine, credentials));

    let addr = config.bind_addr();
    info!(
        %addr,
        data_dir = %config.data_dir.display(),
        upload_timeout_secs = config.upload_timeout_secs,
        "FOTA server listening"
    );

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            tokio::signal::ctrl_c().await.ok();
            info!("shutting down");
        })
        .await?;

    Ok(())
}

fn cmd_devices(
    action: DevicesAction,
    config: &Config,
    json: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    let engine = open_engine(config)?;

    match action {
        DevicesAction::List => {
            let devices = engine.list_devices()?;
            if json {
                println!("{}", serde_json::to_string_pretty(&devices)?);
            } else if devices.is_empty() {
                println!("{}", "(no devices registered)".yellow());
            } else {
                for device in &devices {
                    println!("{}", cli::device_line(device));
                }
            }
        }
        DevicesAction::Register {
            device_id,
            version,
            firmware_ref,
        } => {
            engine.register_device(&device_id, &version, &firmware_ref)?;
            if json {
                println!(
                    "{}",
                    serde_json::json!({
                        "success": true,
                        "device_id": device_id,
                        "desired_version": version,
                        "firmware_ref": firmware_ref
                    })
                );
            } else {
                println!(
                    "{}",
                    cli::success_line(&format!(
                        "Registered {} -> {} ({})",
                        device_id, version, firmware_ref
                    ))
                );
            }
        }
        DevicesAction::Remove { device_id } => {
            engine.deregister_device(&device_id)?;
            if json {
                println!(
                    "{}",
                    serde_json::json!({ "success": true, "device_id": device_id })
                );
            } else {
                println!("{}", cli::success_line(&format!("Removed {}", device_id)));
            }
        }
    }

    Ok(())
}

#[tokio::main]
async fn cmd_check(
    config: &Config,
    device_id: &str,
    version: &str,
    json: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    let engine = open_engine(config)?;
    let decision = engine.check_for_update(device_id, version).await?;

    match (decision, json) {
        (UpdateDecision::NoUpdateAvailable, true) => {
            println!("{}", serde_json::json!({ "update": false }));
        }
        (UpdateDecision::NoUpdateAvailable, false) => {
            println!("{}", cli::success_line(&format!("{} is up to date", device_id)));
        }
        (UpdateDecision::UpdateAvailable { firmware_ref }, true) => {
            println!(
                "{}",
                serde_json::json!({ "update": true, "firmware_ref": firmware_ref })
            );
        }
        (UpdateDecision::UpdateAvailable { firmware_ref }, false) => {
            println!(
                "{} {} should update to {}",
                "⬆".cyan().bold(),
                device_id,
                firmware_ref.bright_white().bold()
            );
        }
    }

    Ok(())
}
