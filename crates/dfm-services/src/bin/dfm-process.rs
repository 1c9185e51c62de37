//! Process service entry point: HTTP ingress, runs until ctrl-c.

use dfm_services::config::ProcessConfig;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let config = ProcessConfig::from_env()?;
    dfm_services::process::run(config).await
}
