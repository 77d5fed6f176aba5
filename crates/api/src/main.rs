use clinicflow_api::config::ApiConfig;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    clinicflow_observability::init();

    let config = ApiConfig::from_env()?;
    let app = clinicflow_api::app::build_app(&config).await?;

    let listener = tokio::net::TcpListener::bind(config.bind_addr).await?;
    tracing::info!("listening on {}", listener.local_addr()?);

    axum::serve(listener, app).await?;
    Ok(())
}
