use brewledger_infra::AppConfig;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    brewledger_observability::init();

    let config = AppConfig::from_env()?;
    let service = brewledger_api::app::services::build_service(&config).await?;
    let app = brewledger_api::app::build_app(config.jwt_secret.clone(), service);

    let listener = tokio::net::TcpListener::bind(config.bind_addr).await?;
    tracing::info!("listening on {}", listener.local_addr()?);

    axum::serve(listener, app).await?;
    Ok(())
}
