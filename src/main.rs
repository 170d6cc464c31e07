use mailbell::{GatewayConfig, build_server};
use std::env;
use std::process;

use tracing::{error, info, warn};

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    let path = env::args().nth(1).unwrap_or_else(|| "mailbell.toml".to_string());

    let config = match GatewayConfig::load(&path) {
        Ok(config) => config,
        Err(e) => {
            error!(path = %path, error = %e, "Failed to load configuration");
            process::exit(1);
        }
    };

    let addr = config.smtp.address();
    info!(
        address = %addr,
        hostname = %config.smtp.hostname,
        services = config.services.len(),
        "Starting mailbell"
    );
    if config.services.is_empty() {
        warn!("No services configured; accepted mail will not be relayed anywhere");
    }

    let server = build_server(&config);
    if let Err(e) = server.start(&addr) {
        error!(address = %addr, error = %e, "Failed to start server");
        process::exit(1);
    }
}
