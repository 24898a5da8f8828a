use pdfchat_ui::{AppConfig, run_server, telemetry};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let config = AppConfig::from_env()?;
    telemetry::init(config.log_format);

    run_server(config).await
}
