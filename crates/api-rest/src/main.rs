//! Standalone REST API server binary.
//!
//! ## Purpose
//! Runs the REST API server on its own.
//!
//! ## Intended use
//! Useful for development when serving a form directory against a throwaway dataset. The
//! workspace's main `formentry-run` binary does the same with validation of the form directory.

use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use api_rest::{router, AppState};
use formentry_core::config::{persist_from_env_value, resolve_form_dir};
use formentry_core::{CoreConfig, DataStore, FormRepository};

/// Main entry point for the form entry REST API server
///
/// # Environment Variables
/// - `FORMENTRY_REST_ADDR`: Server address (default: "0.0.0.0:3000")
/// - `FORMENTRY_FORM_DIR`: Form template directory (default: nearest `forms/`)
/// - `FORMENTRY_DATASET`: Dataset YAML file loaded at startup (default: empty store)
/// - `FORMENTRY_PERSIST`: Write the dataset back after each change (`true`/`false`)
///
/// # Errors
/// Returns an error if:
/// - the logging/tracing configuration cannot be initialised,
/// - the form directory or dataset cannot be loaded,
/// - the server address cannot be bound, or
/// - the HTTP server fails while running.
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("api_rest=info".parse()?),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let addr = std::env::var("FORMENTRY_REST_ADDR").unwrap_or_else(|_| "0.0.0.0:3000".into());

    tracing::info!("-- Starting form entry REST API on {}", addr);

    let form_dir = resolve_form_dir(std::env::var("FORMENTRY_FORM_DIR").ok().map(PathBuf::from))?;
    let dataset = std::env::var("FORMENTRY_DATASET").ok().map(PathBuf::from);
    let persist = persist_from_env_value(std::env::var("FORMENTRY_PERSIST").ok())?;

    let cfg = Arc::new(CoreConfig::new(form_dir, dataset, persist)?);
    let state = AppState {
        store: DataStore::open(&cfg)?,
        forms: FormRepository::new(cfg),
    };

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, router(state)).await?;

    Ok(())
}
