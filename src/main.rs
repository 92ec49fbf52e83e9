use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use api_rest::AppState;
use register_core::config::{review_due_days_from_env_value, synonym_ttl_from_env_value};
use register_core::constants::DEFAULT_DATABASE_PATH;
use register_core::synonyms::{StaticSynonymProvider, SynonymProvider, YamlSynonymProvider};
use register_core::{CoreConfig, RegisterServices};
use register_store_sqlite::{SqliteRegister, SqliteStoreConfig};

/// Main entry point for the register service
///
/// Opens the SQLite register, wires the engine services over it and serves the REST API.
///
/// # Environment Variables
/// - `REGISTER_REST_ADDR`: REST server address (default: "0.0.0.0:3000")
/// - `REGISTER_DB_PATH`: SQLite database file (default: "register.sqlite3")
/// - `REGISTER_SYNONYMS_FILE`: YAML mapping of first name to synonyms (optional)
/// - `REGISTER_REVIEW_DUE_DAYS`: days before a review task falls due (default: 5)
/// - `REGISTER_SYNONYM_TTL_SECS`: synonym cache lifetime in seconds (default: 3600)
///
/// # Errors
/// Returns an error if:
/// - the logging/tracing configuration cannot be initialised,
/// - any configuration value is invalid,
/// - the database cannot be opened, or
/// - the server address cannot be bound or the HTTP server fails while running.
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("register_run=info".parse()?)
                .add_directive("register_core=info".parse()?)
                .add_directive("api_rest=info".parse()?),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let rest_addr =
        std::env::var("REGISTER_REST_ADDR").unwrap_or_else(|_| "0.0.0.0:3000".into());
    let db_path = std::env::var("REGISTER_DB_PATH")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from(DEFAULT_DATABASE_PATH));

    let cfg = Arc::new(CoreConfig::new(
        review_due_days_from_env_value(std::env::var("REGISTER_REVIEW_DUE_DAYS").ok())?,
        synonym_ttl_from_env_value(std::env::var("REGISTER_SYNONYM_TTL_SECS").ok())?,
    )?);

    let synonyms: Arc<dyn SynonymProvider> = match std::env::var("REGISTER_SYNONYMS_FILE") {
        Ok(path) if !path.trim().is_empty() => {
            tracing::info!("++ Loading name synonyms from {}", path);
            Arc::new(YamlSynonymProvider::new(path))
        }
        _ => {
            tracing::warn!("REGISTER_SYNONYMS_FILE not set; first names match literally");
            Arc::new(StaticSynonymProvider::new(HashMap::new()))
        }
    };

    let store = SqliteRegister::open(SqliteStoreConfig::new(db_path))?;
    let services = RegisterServices::new(cfg, store.ports(synonyms));

    tracing::info!("++ Starting register REST on {}", rest_addr);

    let app = api_rest::router(AppState::new(services));
    let listener = tokio::net::TcpListener::bind(&rest_addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
