use std::path::Path;
use std::sync::Arc;

use chipi_agents::Assistant;
use chipi_common::Result;
use chipi_config::AppConfig;
use chipi_db::Database;
use tracing::{info, warn};

use crate::state::{AppState, SharedState};

/// Open the database, build the assistant and assemble the shared state.
pub fn build_state(config: AppConfig, db_path: &Path) -> Result<SharedState> {
    let db = Arc::new(Database::open(db_path)?);
    build_state_with_db(config, db)
}

pub fn build_state_with_db(config: AppConfig, db: Arc<Database>) -> Result<SharedState> {
    let assistant = Assistant::from_config(&config.llm)?;
    if config.gateway.secret_key.is_none() {
        info!("no SECRET_KEY set, sessions are kept in memory only");
    }
    Ok(Arc::new(AppState::new(config, db, assistant)))
}

/// Probe the model endpoint once in the background and log the outcome.
/// Startup never waits on it.
pub fn spawn_api_diagnostics(state: &SharedState) {
    let Some(provider) = state.assistant.provider().cloned() else {
        warn!("model API not configured, replies will use the offline table");
        return;
    };

    tokio::spawn(async move {
        match provider.health_check().await {
            Ok(true) => info!("model API reachable ({})", provider.provider_id()),
            Ok(false) => warn!("model API rejected the configured key"),
            Err(e) => warn!("model API unreachable: {e}"),
        }
    });
}
