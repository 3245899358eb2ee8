use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use api_rest::{router, AppState};
use formentry_core::config::{persist_from_env_value, resolve_form_dir, validate_form_dir};
use formentry_core::{CoreConfig, DataStore, FormRepository};

/// Main entry point for the form entry service
///
/// Validates the form directory, loads the dataset and serves the REST API until interrupted.
///
/// # Environment Variables
/// - `FORMENTRY_REST_ADDR`: REST server address (default: "0.0.0.0:3000")
/// - `FORMENTRY_FORM_DIR`: Form template directory (default: nearest `forms/`)
/// - `FORMENTRY_DATASET`: Dataset YAML file loaded at startup (default: empty store)
/// - `FORMENTRY_PERSIST`: Write the dataset back after each change (`true`/`false`)
///
/// # Returns
/// * `Ok(())` - If the server starts and shuts down cleanly
/// * `Err(anyhow::Error)` - If configuration, startup or the server fails
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("formentry=info".parse()?),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let rest_addr =
        std::env::var("FORMENTRY_REST_ADDR").unwrap_or_else(|_| "0.0.0.0:3000".into());

    let form_dir = resolve_form_dir(std::env::var("FORMENTRY_FORM_DIR").ok().map(PathBuf::from))?;
    let form_count = validate_form_dir(&form_dir)?;
    tracing::info!("++ Loaded {} forms from {}", form_count, form_dir.display());

    let dataset = std::env::var("FORMENTRY_DATASET").ok().map(PathBuf::from);
    let persist = persist_from_env_value(std::env::var("FORMENTRY_PERSIST").ok())?;
    let cfg = Arc::new(CoreConfig::new(form_dir, dataset, persist)?);
    let store = DataStore::open(&cfg)?;

    let state = AppState {
        store,
        forms: FormRepository::new(cfg),
    };

    tracing::info!("++ Starting form entry REST on {}", rest_addr);
    let listener = tokio::net::TcpListener::bind(&rest_addr).await?;
    axum::serve(listener, router(state))
        .with_graceful_shutdown(async {
            tokio::signal::ctrl_c().await.ok();
            tracing::info!("-- Shutting down");
        })
        .await?;

    Ok(())
}
