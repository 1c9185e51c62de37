//! Scheduler service entry point: the deadline-ordered holding area between
//! Process and Execute. Runs until killed.

use dfm_services::config::SchedulerConfig;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let config = SchedulerConfig::from_env()?;
    dfm_services::scheduler::run(config).await
}
