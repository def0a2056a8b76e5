//! Process bootstrap: wires settings, store, generator, and modules together.

use std::sync::Arc;

use anyhow::Context;
use libris_db::Database;
use libris_genai::{LocalGenerator, OpenAiClient, OpenAiConfig, TextGenerator};
use libris_kernel::{
    settings::{GenAiProvider, GenAiSettings, Settings},
    InitCtx, ModuleRegistry,
};

use crate::modules;

/// Build the text generator selected by `genai.provider`.
pub fn build_generator(settings: &GenAiSettings) -> anyhow::Result<Arc<dyn TextGenerator>> {
    match settings.provider {
        GenAiProvider::OpenAi => {
            let client = OpenAiClient::new(OpenAiConfig {
                base_url: settings.base_url.clone(),
                api_key: settings.api_key.clone().unwrap_or_default(),
                chat_model: settings.chat_model.clone(),
                embedding_model: settings.embedding_model.clone(),
                temperature: settings.temperature,
                max_tokens: settings.max_tokens,
                dimensions: settings.dimensions,
                timeout_secs: settings.timeout_secs,
            })
            .context("failed to configure OpenAI generator (set OPENAI_API_KEY or genai.api_key)")?;
            Ok(Arc::new(client))
        }
        GenAiProvider::Local => Ok(Arc::new(LocalGenerator::new(settings.dimensions))),
    }
}

pub fn build_registry(db: &Database, generator: Arc<dyn TextGenerator>) -> ModuleRegistry {
    let mut registry = ModuleRegistry::new();
    modules::register_all(&mut registry, db, generator);
    registry
}

/// Apply every module migration that has not run yet against `db`.
pub async fn apply_migrations(registry: &ModuleRegistry, db: &Database) -> anyhow::Result<usize> {
    let migrations = registry.collect_migrations();
    db.apply_migrations(&migrations)
        .await
        .context("failed to apply migrations")
}

/// Connect to the store and bring its schema up to date, then exit.
pub async fn migrate(settings: &Settings) -> anyhow::Result<usize> {
    let db = Database::connect(&settings.database.url, settings.database.max_connections).await?;
    // Migrations never call the generator; the offline one avoids requiring an API key.
    let generator: Arc<dyn TextGenerator> = Arc::new(LocalGenerator::new(settings.genai.dimensions));
    let registry = build_registry(&db, generator);

    let applied = apply_migrations(&registry, &db).await;
    db.close().await;
    applied
}

/// Run the service until Ctrl-C or SIGTERM.
pub async fn serve(settings: Settings) -> anyhow::Result<()> {
    tracing::info!(
        env = ?settings.environment,
        db = %settings.database.url,
        generator = ?settings.genai.provider,
        "libris bootstrap starting"
    );

    let db = Database::connect(&settings.database.url, settings.database.max_connections).await?;
    let generator = build_generator(&settings.genai)?;
    let registry = build_registry(&db, generator);

    let applied = apply_migrations(&registry, &db).await?;
    tracing::info!(applied, "schema up to date");

    let ctx = InitCtx {
        settings: &settings,
        db: &db,
    };
    registry.init_all(&ctx).await?;
    registry.start_all(&ctx).await?;

    let served = libris_http::start_server(&registry, &settings, shutdown_signal()).await;
    shut_down(&registry, &db, served).await
}

/// Stop modules and close the pool whatever the server outcome was.
///
/// A server error takes precedence; a module stop failure alongside it is logged.
async fn shut_down(
    registry: &ModuleRegistry,
    db: &Database,
    served: anyhow::Result<()>,
) -> anyhow::Result<()> {
    let stopped = registry.stop_all().await;
    db.close().await;

    match (served, stopped) {
        (Err(serve_err), Err(stop_err)) => {
            tracing::error!(error = %format!("{stop_err:#}"), "module shutdown failed");
            Err(serve_err)
        }
        (Err(err), Ok(())) | (Ok(()), Err(err)) => Err(err),
        (Ok(()), Ok(())) => Ok(()),
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "failed to listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("shutdown signal received");
}
