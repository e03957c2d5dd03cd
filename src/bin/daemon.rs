use bunny_worker::cache::CacheRefresher;
use bunny_worker::config::DaemonSettings;
use bunny_worker::db::UnconfiguredDbClient;
use bunny_worker::dialect;
use bunny_worker::disclosure::from_obfuscation_settings;
use bunny_worker::dispatch::execute_query;
use bunny_worker::task_api::{polling_endpoint, TaskApiClient};
use tracing_subscriber::EnvFilter;

/// Long-running counterpart to `bunny`: polls the coordinator's task API
/// forever, solving each job against the same dispatcher the CLI uses and
/// posting results back. Mirrors `daemon.py`'s loop shape, generalized onto
/// `poll_for_tasks`'s backoff/dispatch machinery.
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let settings = DaemonSettings::from_env()?;

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(settings.logging.tracing_filter())),
        )
        .init();

    tracing::info!(database = %settings.database.redacted(), "daemon settings loaded");

    let sql_dialect = dialect::for_engine(&settings.database.drivername)?;
    let db = UnconfiguredDbClient;
    let modifiers = from_obfuscation_settings(&settings.obfuscation);

    // The distribution cache is a standalone service, not wired into the
    // per-task path below — the source never calls it from its own polling
    // loop either. Only the background refresher runs here.
    let refresher = CacheRefresher::start(settings.cache.ttl_hours, settings.cache.enabled);

    let client = TaskApiClient::new(&settings.task_api);
    let endpoint = polling_endpoint(
        &settings.task_api.collection_id,
        settings.task_api.task_type.as_deref(),
    );

    tokio::select! {
        _ = bunny_worker::polling::poll_for_tasks(&client, &settings.polling, &endpoint, None, |task_data| {
            let db = &db;
            let dialect = sql_dialect.as_ref();
            let modifiers = &modifiers;
            let client = &client;
            async move {
                let result = execute_query(db, dialect, &task_data, modifiers).await;
                client.send_result(&result).await;
            }
        }) => {}
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("shutdown signal received");
        }
    }

    if let Some(refresher) = refresher {
        refresher.stop().await;
    }

    Ok(())
}
