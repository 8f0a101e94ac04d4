use clap::Parser;
use lgwd::concentrator::MockConcentrator;
use lgwd::config::{ConcentratorConfig, GatewayConfig};
use lgwd::coordinator::Coordinator;
use lgwd::gps::StaticGpsSource;
use lgwd::logging::{init_logger, log_error, log_info};
use lgwd::GatewayError;
use std::sync::Arc;

#[derive(Parser)]
#[command(name = "lgwd")]
#[command(about = "LoRa packet-forwarder gateway daemon")]
#[command(version)]
struct Cli {
    /// Path to the gateway-level JSON configuration document.
    #[arg(short = 'c', long = "gwcfg", default_value = "gateway_conf.json")]
    gwcfg: String,

    /// Path to the concentrator-level JSON configuration document.
    #[arg(short = 's', long = "sxcfg", default_value = "concentrator_conf.json")]
    sxcfg: String,

    /// Enable debug-level logging regardless of RUST_LOG.
    #[arg(short = 'v', long = "verbose")]
    verbose: bool,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    if cli.verbose {
        std::env::set_var("RUST_LOG", "debug");
    }
    init_logger();

    match run(&cli).await {
        Ok(()) => {}
        Err(e) => {
            log_error(&format!("fatal: {e}"));
            std::process::exit(e.exit_code());
        }
    }
}

async fn run(cli: &Cli) -> Result<(), GatewayError> {
    let gateway_config = GatewayConfig::load(&cli.gwcfg)?;
    // Board/channel layout is opaque here: this crate has no physical
    // concentrator HAL binding, only the Concentrator trait it drives. Still
    // loaded and validated as JSON so a missing/malformed file is caught at
    // startup rather than silently ignored.
    let _concentrator_config = ConcentratorConfig::load(&cli.sxcfg)?;

    log_info(&format!(
        "starting gateway {} with {} enabled service(s)",
        gateway_config.gateway_id,
        gateway_config.enabled_services().count()
    ));

    let concentrator = Arc::new(MockConcentrator::new());
    let gps = Arc::new(StaticGpsSource::unlocked());
    let coordinator = Coordinator::build(&gateway_config, concentrator, gps).await?;

    tokio::select! {
        result = coordinator.run() => result,
        _ = tokio::signal::ctrl_c() => {
            log_info("received shutdown signal");
            Ok(())
        }
    }
}
