use std::{error::Error, net::SocketAddr, sync::Arc};

use recipe_share::{config::Config, jwt::TokenService, routes::api};
use sqlx::postgres::PgPoolOptions;
use tokio::signal::{
    self,
    unix::{signal, SignalKind},
};
use tracing_subscriber::{fmt, EnvFilter};

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    let _ = dotenvy::dotenv();
    fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = Config::load()?;
    let tokens = Arc::new(
        TokenService::from_config(&config).map_err(|e| format!("Invalid JWT_KEY: {e}"))?,
    );

    log::info!("Connecting to database...");
    let pool = PgPoolOptions::new()
        .max_connections(config.database_max_connections)
        .connect(&config.database_url)
        .await?;

    log::info!("Running migrations...");
    sqlx::migrate!("./migrations").run(&pool).await?;

    let address = SocketAddr::from(([0, 0, 0, 0], config.port));
    let routes = api(pool.clone(), tokens, &config.cors_origin);

    let (address, server) =
        warp::serve(routes).try_bind_with_graceful_shutdown(address, shutdown_signal())?;
    log::info!("Server running on {address}");
    server.await;

    pool.close().await;
    log::info!("Server shut down");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            log::error!("Failed to listen for Ctrl+C: {e}");
            std::future::pending::<()>().await;
        }
        log::info!("Received Ctrl+C, shutting down");
    };

    let terminate = async {
        match signal(SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
                log::info!("Received terminate signal, shutting down");
            }
            Err(e) => {
                log::error!("Failed to listen for SIGTERM: {e}");
                std::future::pending::<()>().await;
            }
        }
    };

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
