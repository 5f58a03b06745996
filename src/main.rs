use std::sync::Arc;

use anyhow::Context;
use futures::FutureExt;
use futures::future::BoxFuture;
use tokio_util::sync::CancellationToken;

use photo_library::config::ServiceConfig;
use photo_library::dateindex::DateIndex;
use photo_library::geocoding::{self, GeoIndex, Geocoder, NominatimProvider};
use photo_library::index::{self, Indexer, StoreIndexTracker};
use photo_library::library::{self, BasicPhotoLibrary, Photo};
use photo_library::store::{KvStore, LibSqlStore};
use photo_library::tasks::{SerialExecutor, TaskExecutor, TaskRegistry, launch_startup_tasks};
use photo_library::{api, importer};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    let config = ServiceConfig::from_env().context("Invalid configuration")?;

    eprintln!("📷 Photo Library v{}", env!("CARGO_PKG_VERSION"));
    eprintln!("   Library: {}", config.library_dir.display());
    eprintln!("   Database: {}", config.db_path.display());
    eprintln!("   API: http://0.0.0.0:{}/api/tasks", config.port);

    // ── Storage ──────────────────────────────────────────────────────────
    let store: Arc<dyn KvStore> = Arc::new(
        LibSqlStore::new_local(&config.db_path)
            .await
            .with_context(|| format!("Failed to open database at {}", config.db_path.display()))?,
    );
    let library = Arc::new(
        BasicPhotoLibrary::new(&config.library_dir, store.clone())
            .await
            .with_context(|| format!("Failed to open library at {}", config.library_dir.display()))?,
    );

    let capacity = (config.queue_capacity > 0).then_some(config.queue_capacity);
    let executor = Arc::new(SerialExecutor::new(library.clone(), capacity));
    let dyn_executor: Arc<dyn TaskExecutor> = executor.clone();

    // ── Indexes ──────────────────────────────────────────────────────────
    let geocoder = Arc::new(Geocoder::new(
        Arc::new(NominatimProvider::new(config.geocoder_url.clone())),
        store.clone(),
    ));
    let tracker = Arc::new(StoreIndexTracker::new(store.clone()));
    let mut indexer = Indexer::new(tracker, dyn_executor.clone());
    indexer.register_direct(
        DateIndex::NAME,
        DateIndex::VERSION,
        Arc::new(DateIndex::new(store.clone())),
    );
    indexer.register_deferred(
        Geocoder::INDEX,
        Geocoder::VERSION,
        Arc::new(GeoIndex::new(geocoder.clone())),
    );
    let indexer = Arc::new(indexer);

    // ── Task types ───────────────────────────────────────────────────────
    let mut registry = TaskRegistry::new();
    library::register_tasks(&mut registry)?;
    index::register_tasks(&indexer, &mut registry)?;
    geocoding::register_tasks(&geocoder, &mut registry)?;
    importer::register_tasks(&mut registry)?;
    let registry = Arc::new(registry);

    {
        let indexer = indexer.clone();
        library.add_callback(Arc::new(
            move |photo: Photo| -> BoxFuture<'static, photo_library::Result<()>> {
                let indexer = indexer.clone();
                async move {
                    indexer.add(&photo).await?;
                    Ok(())
                }
                .boxed()
            },
        ));
    }

    // ── Executor ─────────────────────────────────────────────────────────
    let cancel = CancellationToken::new();
    let drain = tokio::spawn({
        let executor = executor.clone();
        let cancel = cancel.clone();
        async move { executor.drain_tasks(cancel).await }
    });

    let launched = launch_startup_tasks(&registry, executor.as_ref()).await?;
    tracing::info!(count = launched.len(), "Startup tasks submitted");

    if let Some(interval) = config.reindex_interval {
        let _ticker = index::spawn_reindex_ticker(
            indexer.clone(),
            dyn_executor.clone(),
            interval,
            cancel.clone(),
        );
        eprintln!("   Reindex: every {}s", interval.as_secs());
    }

    // ── HTTP API ─────────────────────────────────────────────────────────
    let app = api::routes(registry.clone(), dyn_executor.clone());
    let listener = tokio::net::TcpListener::bind(format!("0.0.0.0:{}", config.port))
        .await
        .with_context(|| format!("Failed to bind API port {}", config.port))?;
    tracing::info!(port = config.port, "API server started");

    tokio::spawn({
        let cancel = cancel.clone();
        async move {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!(error = %e, "Failed to listen for shutdown signal");
            }
            tracing::info!("Shutting down");
            cancel.cancel();
        }
    });
    let served = api::serve(listener, app, cancel.clone(), config.shutdown_timeout).await;

    // ── Shutdown ─────────────────────────────────────────────────────────
    cancel.cancel();
    match tokio::time::timeout(config.shutdown_timeout, drain).await {
        Ok(Ok(())) => tracing::info!("Executor stopped"),
        Ok(Err(e)) => tracing::error!(error = %e, "Executor loop failed"),
        Err(_) => tracing::warn!(
            timeout_secs = config.shutdown_timeout.as_secs(),
            "Executor did not stop in time"
        ),
    }
    served.context("API server failed")?;

    Ok(())
}
