use std::sync::Arc;
use tokio::net::TcpListener;
use tracing_subscriber::EnvFilter;
use tds_explorer::{
    api::routes::create_router,
    config::Config,
    queries::Templates,
    startup::Bootstrap,
    warehouse::BigQueryGateway,
    AppState,
};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("tds_explorer=info,tower_http=info")),
        )
        .init();

    // Load configuration
    let config = Config::load().inspect_err(|e| tracing::error!(error = %e, "Startup failed"))?;
    let server_addr = config.server_addr;
    tracing::info!(project = %config.project, "Connecting to BigQuery");

    let gateway = Arc::new(BigQueryGateway::new(&config)?);
    let templates = Arc::new(Templates::new(config.tables.clone()));

    // Pre-fetch option sets and generate the word clouds
    let options = Bootstrap {
        gateway: gateway.as_ref(),
        templates: &templates,
        word_limit: config.word_limit,
        img_dir: &config.img_dir,
    }
    .run()
    .await
    .inspect_err(|e| tracing::error!(error = %e, "Startup failed"))?;

    let app_state = AppState {
        gateway,
        templates,
        options: Arc::new(options),
    };

    let app = create_router(app_state);

    let listener = TcpListener::bind(server_addr).await?;

    tracing::info!("Dashboard available at http://{}/dash/", server_addr);
    axum::serve(listener, app).await?;

    Ok(())
}
