mod compose;
mod docker;
mod envfile;
mod http;
mod icecast;
mod scheduler;

use mixctl_core::config::Config;
use tracing::info;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_ansi(false))
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info,mixctld=debug")),
        )
        .init();

    let config = Config::load()?;
    info!("Config loaded from: {:?}", Config::config_path());
    info!(
        "Controlling stack: engine={} scheduler={} compose={}",
        config.stack.engine_container,
        config.stack.scheduler_container,
        config.stack.compose_file.display()
    );

    let state = http::AppState::new(config);
    http::serve(state).await
}
