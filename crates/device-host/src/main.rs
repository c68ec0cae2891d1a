use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use dotenv::dotenv;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use application::{HostEnvironment, PeripheralService};
use domain::{DeviceKind, ReceiptItem, ReceiptPayload, ScaleProtocol};
use infrastructure::{DeviceHost, PeripheralConfig, SystemPortProvider, system_notifier};

#[derive(Parser, Debug)]
#[command(author, version, about = "POS scale and receipt printer host", long_about = None)]
struct Args {
    /// Path to config directory (optional)
    #[arg(long, global = true)]
    config_dir: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Serve peripheral requests as JSON lines over stdin/stdout
    Serve,
    /// List ports and devices visible to the selected backend
    Scan,
    /// Connect a scale and take one reading
    Weigh {
        #[arg(long)]
        port: String,
        #[arg(long)]
        protocol: Option<ScaleProtocol>,
        /// 0 uses the configured read timeout
        #[arg(long, default_value_t = 0)]
        timeout_ms: u64,
    },
    /// Print a sample receipt
    PrintTest {
        #[arg(long)]
        port: String,
    },
}

fn config_dir(arg: Option<String>) -> String {
    if let Some(dir) = arg {
        return dir;
    }
    let dev_dir = "crates/device-host/config";
    if Path::new(dev_dir).exists() {
        dev_dir.to_string()
    } else {
        "config".to_string()
    }
}

/// The stdio protocol owns stdout, so logs go to stderr.
fn init_tracing() {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| {
                "info,device_host=debug,application=debug,infrastructure=debug".into()
            }),
        ))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

fn sample_receipt() -> ReceiptPayload {
    ReceiptPayload {
        order_number: "0001".to_string(),
        customer_name: "Teste de impressão".to_string(),
        customer_phone: None,
        items: vec![
            ReceiptItem::new(1.0, "Prato feito", 24.9).with_notes("sem cebola"),
            ReceiptItem::new(0.350, "Buffet por quilo", 20.65),
        ],
        total: 45.55,
    }
}

fn service(config: &PeripheralConfig) -> Result<PeripheralService> {
    let env = HostEnvironment::from_config(config)?;
    // A command typed at the terminal counts as the user's gesture
    env.activation.grant();
    let service = env.into_service(config)?;
    info!(backend = %service.backend_kind(), "Backend ready");
    Ok(service)
}

async fn serve(config: &PeripheralConfig) -> Result<()> {
    let host = Arc::new(DeviceHost::new(
        Arc::new(SystemPortProvider::new()),
        system_notifier(&config.notifications),
        config.printer.clone(),
        &config.scale,
    ));
    info!("Device host serving on stdio");

    tokio::select! {
        served = infrastructure::ipc::serve_stdio(host.clone()) => {
            served?;
            info!("Input closed");
        }
        signal = tokio::signal::ctrl_c() => match signal {
            Ok(()) => info!("Shutting down..."),
            Err(err) => warn!(error = %err, "Unable to listen for shutdown signal"),
        },
    }
    Ok(())
}

async fn weigh(
    config: &PeripheralConfig,
    port: &str,
    protocol: Option<ScaleProtocol>,
    timeout_ms: u64,
) -> Result<()> {
    let service = service(config)?;
    let protocol = protocol.unwrap_or(config.scale.default_protocol);

    let connected = service.connect_scale(port, protocol).await;
    if !connected.success {
        bail!("connect failed: {}", connected.message);
    }

    let result = service.read_weight(port, timeout_ms).await;
    println!("{}", serde_json::to_string_pretty(&result)?);
    service.disconnect(port).await;

    if !result.success {
        bail!(
            "read failed: {}",
            result.message.unwrap_or_else(|| "unknown".to_string())
        );
    }
    Ok(())
}

async fn print_test(config: &PeripheralConfig, port: &str) -> Result<()> {
    let service = service(config)?;
    let connected = service.connect(port, DeviceKind::Printer).await;
    if !connected.success {
        bail!("connect failed: {}", connected.message);
    }

    let result = service.print(port, &sample_receipt()).await;
    println!("{}", serde_json::to_string_pretty(&result)?);
    service.disconnect(port).await;

    if !result.success {
        bail!("print failed: {}", result.message);
    }
    Ok(())
}

async fn run() -> Result<()> {
    dotenv().ok();
    init_tracing();

    let args = Args::parse();
    let config_dir = config_dir(args.config_dir);
    info!(config_dir = %config_dir, "Loading configuration...");
    let config = PeripheralConfig::load(&config_dir)
        .with_context(|| format!("invalid configuration in {}", config_dir))?;

    match args.command {
        Command::Serve => serve(&config).await,
        Command::Scan => {
            let result = service(&config)?.scan().await;
            println!("{}", serde_json::to_string_pretty(&result)?);
            Ok(())
        }
        Command::Weigh {
            port,
            protocol,
            timeout_ms,
        } => weigh(&config, &port, protocol, timeout_ms).await,
        Command::PrintTest { port } => print_test(&config, &port).await,
    }
}

fn main() {
    let rt = match tokio::runtime::Runtime::new() {
        Ok(rt) => rt,
        Err(e) => {
            eprintln!("Failed to start runtime: {}", e);
            std::process::exit(1);
        }
    };
    if let Err(e) = rt.block_on(run()) {
        eprintln!("Error: {:?}", e);
        std::process::exit(1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_weigh_arguments() {
        let args = Args::parse_from([
            "device-host",
            "weigh",
            "--port",
            "COM4",
            "--protocol",
            "filizola",
            "--timeout-ms",
            "2000",
        ]);
        match args.command {
            Command::Weigh {
                port,
                protocol,
                timeout_ms,
            } => {
                assert_eq!(port, "COM4");
                assert_eq!(protocol, Some(ScaleProtocol::Filizola));
                assert_eq!(timeout_ms, 2000);
            }
            other => panic!("unexpected command {:?}", other),
        }
    }

    #[test]
    fn test_config_dir_override() {
        let args = Args::parse_from(["device-host", "scan", "--config-dir", "/etc/pos"]);
        assert_eq!(config_dir(args.config_dir), "/etc/pos");
    }

    #[test]
    fn test_sample_receipt_total() {
        let receipt = sample_receipt();
        let sum: f64 = receipt.items.iter().map(|i| i.subtotal).sum();
        assert!((sum - receipt.total).abs() < 1e-9);
    }
}
