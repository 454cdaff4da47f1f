use std::net::SocketAddr;
use std::path::PathBuf;

use tracing::info;

use multiserver_common::Config;
use multiserver_controller::Panel;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let config_path = std::env::var_os("MULTISERVER_CONFIG")
        .map(PathBuf::from)
        .unwrap_or_else(multiserver_common::default_config_path);

    let mut config = Config::load(&config_path)?;
    config.apply_env_overrides();

    let web_addr: SocketAddr = config.web.listen.parse()?;
    let panel = Panel::open(&config)?;

    info!(
        "Starting multiserver API on http://{} (store: {:?}, failure policy: {})",
        web_addr, config.store_path, config.controller.failure_policy
    );

    multiserver_web::serve(web_addr, panel).await
}
