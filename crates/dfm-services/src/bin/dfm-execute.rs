//! Execute service entry point: claims jobs off the `execute` channel, compiles
//! and dispatches them. Adapter and provider factories are a deployment
//! concern — this binary wires none of its own, only the claim/compile/dispatch
//! loop against whatever `SiteConfig` it's pointed at.

use dfm_services::config::ExecuteConfig;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let config = ExecuteConfig::from_env()?;
    dfm_services::execute::run(config).await
}
