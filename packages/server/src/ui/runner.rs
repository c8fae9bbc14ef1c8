//! Server start-up: storage selection, background flush task and the axum server.

use std::{future::Future, sync::Arc};

use tokio::{net::TcpListener, sync::watch};

use crate::{
    config::{ServerArgs, ServerSettings},
    domain::{MessageCache, MessageStore, RoomRepository, SystemClock},
    error::ServerError,
    infrastructure::{
        cache::InMemoryMessageCache,
        repository::{
            InMemoryMessageStore, InMemoryRoomRepository, SqliteMessageStore,
            SqliteRoomRepository, sqlite,
        },
    },
    usecase::{ChatEngine, PersistenceBuffer},
};

use super::{router::create_router, signal::shutdown_signal, state::AppState};

/// Bind the configured address and serve until Ctrl+C / SIGTERM.
pub async fn run(args: ServerArgs) -> Result<(), ServerError> {
    let settings = args.settings()?;
    let addr = args.bind_addr();
    let listener = TcpListener::bind(&addr)
        .await
        .map_err(|source| ServerError::Bind {
            addr: addr.clone(),
            source,
        })?;
    serve(listener, settings, shutdown_signal()).await
}

/// Serve on `listener` until `shutdown` resolves.
///
/// The persistence buffer is stopped after the HTTP server and runs a final flush.
pub async fn serve<F>(
    listener: TcpListener,
    settings: ServerSettings,
    shutdown: F,
) -> Result<(), ServerError>
where
    F: Future<Output = ()> + Send + 'static,
{
    let rooms: Arc<dyn RoomRepository>;
    let store: Arc<dyn MessageStore>;
    match &settings.database_url {
        Some(url) => {
            let pool = sqlite::connect(url).await?;
            rooms = Arc::new(SqliteRoomRepository::new(pool.clone()));
            store = Arc::new(SqliteMessageStore::new(pool));
        }
        None => {
            tracing::info!("No database configured, using in-memory storage");
            rooms = Arc::new(InMemoryRoomRepository::new());
            store = Arc::new(InMemoryMessageStore::new());
        }
    }
    let cache: Arc<dyn MessageCache> = Arc::new(InMemoryMessageCache::new());

    let engine = ChatEngine::new(
        rooms,
        cache.clone(),
        store.clone(),
        Arc::new(SystemClock),
        settings.history,
    )
    .await?;

    let buffer = Arc::new(PersistenceBuffer::new(
        cache,
        store,
        settings.flush_batch_size,
        settings.flush_interval,
    ));
    let (stop_tx, stop_rx) = watch::channel(false);
    let flush_task = buffer.spawn(stop_rx);

    let state = Arc::new(AppState::new(Arc::new(engine), settings));
    let app = create_router(state);

    let addr = listener.local_addr()?;
    tracing::info!("WebSocket server listening on ws://{}/ws", addr);
    tracing::info!("HTTP API available at http://{}/api", addr);

    let served = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await;

    let _ = stop_tx.send(true);
    if let Err(e) = flush_task.await {
        tracing::error!("Persistence buffer task failed: {}", e);
    }
    served.map_err(ServerError::from)
}
