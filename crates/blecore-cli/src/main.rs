use std::time::Duration;

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::EnvFilter;

use blecore_cli::cli::{Cli, Commands};
use blecore_cli::commands::{ConnectArgs, NotifyArgs, cmd_config, cmd_connect, cmd_notify, cmd_scan};
use blecore_cli::config::{Config, resolve_device, resolve_format, resolve_timeout};
use blecore_cli::util::{hardware_client, open_output, parse_uuid, require_device};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize tracing
    // When quiet mode is enabled, suppress info-level logging
    let filter = if cli.quiet {
        EnvFilter::new("warn")
    } else if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let config_path = cli.config.clone().unwrap_or_else(Config::default_path);
    let config = Config::load_from(&config_path);
    let mut out = open_output(cli.output.as_ref())?;

    match cli.command {
        Commands::Config { action } => cmd_config(&action, &config_path, out.as_mut()),
        Commands::Scan {
            timeout,
            services,
            output,
        } => {
            let filters = services
                .iter()
                .map(|s| parse_uuid(s))
                .collect::<Result<Vec<_>>>()?;
            let ble = config
                .ble_config(None)
                .scan_filters(filters)
                .logging_enabled(!cli.quiet);
            let client = hardware_client(ble).await?;
            if !cli.quiet {
                tracing::info!("Scanning for devices (timeout: {}s)...", timeout);
            }
            cmd_scan(
                &client,
                Duration::from_secs(timeout),
                resolve_format(output.format, &config),
                out.as_mut(),
            )
            .await
        }
        Commands::Connect {
            device,
            duration,
            rssi_interval,
            output,
        } => {
            let args = ConnectArgs {
                address: require_device(resolve_device(device.device, &config))?,
                timeout: Duration::from_secs(resolve_timeout(device.timeout, &config)),
                format: resolve_format(output.format, &config),
            };
            let ble = config
                .ble_config(rssi_interval)
                .logging_enabled(!cli.quiet);
            let client = hardware_client(ble).await?;
            cmd_connect(&client, &args, out.as_mut(), shutdown(duration)).await
        }
        Commands::Notify {
            device,
            service,
            characteristic,
            count,
            output,
        } => {
            let args = NotifyArgs {
                address: require_device(resolve_device(device.device, &config))?,
                timeout: Duration::from_secs(resolve_timeout(device.timeout, &config)),
                service: parse_uuid(&service)?,
                characteristic: parse_uuid(&characteristic)?,
                count,
                format: resolve_format(output.format, &config),
            };
            let ble = config.ble_config(Some(0)).logging_enabled(!cli.quiet);
            let client = hardware_client(ble).await?;
            let received = cmd_notify(&client, &args, out.as_mut(), shutdown(None)).await?;
            tracing::debug!(received, "Notify finished");
            Ok(())
        }
    }
}

/// Resolves on Ctrl-C, or after `seconds` if given.
async fn shutdown(seconds: Option<u64>) {
    let ctrl_c = async {
        if tokio::signal::ctrl_c().await.is_err() {
            // No signal handler available; only the timer can stop us.
            std::future::pending::<()>().await;
        }
    };
    match seconds {
        Some(secs) => {
            tokio::select! {
                _ = ctrl_c => {}
                _ = tokio::time::sleep(Duration::from_secs(secs)) => {}
            }
        }
        None => ctrl_c.await,
    }
}
