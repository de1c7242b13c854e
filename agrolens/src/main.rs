use agrolens::{config, init_tracing, start_app};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = config::get_configuration()?;
    init_tracing(config.log_level.as_str());

    start_app(config).await?;

    Ok(())
}
