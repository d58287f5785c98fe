use std::path::PathBuf;

use chipi_common::Result;
use chipi_config::AppConfig;
use tokio::net::TcpListener;
use tracing::info;

use crate::bootstrap::{build_state, spawn_api_diagnostics};
use crate::router::build_router;

/// Binds the configured address and serves pages and the JSON API.
pub struct GatewayServer {
    config: AppConfig,
    db_path: PathBuf,
}

impl GatewayServer {
    pub fn new(config: AppConfig, db_path: impl Into<PathBuf>) -> Self {
        Self {
            config,
            db_path: db_path.into(),
        }
    }

    pub async fn run(self) -> Result<()> {
        let addr = format!("{}:{}", self.config.gateway.host, self.config.gateway.port);
        let app_name = self.config.app.name.clone();

        let state = build_state(self.config, &self.db_path)?;
        state.spawn_session_cleanup();
        spawn_api_diagnostics(&state);
        let app = build_router(state);

        let listener = TcpListener::bind(&addr).await?;
        info!("{app_name} listening on http://{addr}");

        axum::serve(listener, app)
            .await
            .map_err(|e| chipi_common::Error::Gateway(format!("server error: {e}")))?;

        Ok(())
    }
}
