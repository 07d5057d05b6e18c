use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use connector_api_server::{AppState, Observability};
use pipeline::{spawn_ingest, AppendEngine, Ingest};
use sheets_api::{SessionFactory, SinkError};
use sheets_client::{GoogleSessionFactory, MemorySessionFactory, MemorySheets, OAuthClient};

use crate::config::{ServeArgs, ServerConfig, SheetsKind};
use crate::error::ServerError;

pub async fn run(args: ServeArgs) -> Result<(), ServerError> {
    tracing::info!("sheets-connector starting");

    // --- Load config ---
    let config = ServerConfig::load(&args.config)?;
    config.validate()?;
    tracing::info!(config = %args.config, "loaded config");

    // --- CancellationToken for graceful shutdown ---
    let token = CancellationToken::new();

    // --- Broker ---
    let broker = super::build_broker(&config)?;

    // --- Sheets: один HTTP pool на OAuth и все сессии ---
    let http = reqwest::Client::builder()
        .timeout(config.sheets.request_timeout())
        .build()
        .map_err(|e| SinkError::Client(format!("http client: {e}")))?;

    let oauth = config
        .oauth
        .clone()
        .map(|oauth| Arc::new(OAuthClient::new(http.clone(), oauth)));
    if oauth.is_none() {
        tracing::warn!("oauth not configured, login endpoints disabled");
    }

    let sessions: Arc<dyn SessionFactory> = match config.sheets.kind {
        SheetsKind::Google => {
            let mut factory = GoogleSessionFactory::with_client(http);
            if let Some(base_url) = &config.sheets.base_url {
                factory = factory.with_base_url(base_url.clone());
            }
            if let Some(oauth) = &oauth {
                factory = factory.with_oauth(Arc::clone(oauth));
            }
            Arc::new(factory)
        }
        SheetsKind::Memory => {
            tracing::warn!("using in-memory sheets store");
            Arc::new(MemorySessionFactory::new(MemorySheets::new()))
        }
    };
    let engine = Arc::new(AppendEngine::new());
    let observability = Observability::install(config.server.labels());

    // --- Ingestion ---
    let ingest = Ingest::new(broker, Arc::clone(&sessions), Arc::clone(&engine), config.ingest.clone())?;
    let mut ingest_handle = spawn_ingest(ingest, token.clone());
    tracing::info!(
        topics = ?config.ingest.topics,
        dead_letter = ?config.ingest.dead_letter_topic,
        "spawned ingestion"
    );

    // --- API server ---
    let state = AppState { oauth, sessions, engine, observability };
    let mut api_handle = tokio::spawn(connector_api_server::run(
        config.server.port,
        state,
        token.clone(),
    ));

    tracing::info!(port = config.server.port, "server ready");

    // --- Ожидание Ctrl+C (или падения API сервера) ---
    tokio::select! {
        signal = tokio::signal::ctrl_c() => {
            signal?;
            tracing::info!("shutting down...");
        }
        result = &mut api_handle => {
            token.cancel();
            if tokio::time::timeout(config.server.shutdown_grace(), &mut ingest_handle).await.is_err() {
                ingest_handle.abort();
            }
            return Err(match result {
                Ok(Err(e)) => ServerError::Api(e),
                Ok(Ok(())) => ServerError::Api("stopped unexpectedly".into()),
                Err(e) => ServerError::Api(format!("task: {e}")),
            });
        }
    }

    // Signal all tasks to stop cooperatively
    token.cancel();

    // Drain: начатый append доводится до конца в пределах grace
    let grace = config.server.shutdown_grace();
    let drained = tokio::time::timeout(grace, async {
        if let Err(e) = (&mut ingest_handle).await {
            tracing::error!(error = ?e, "ingestion task failed");
        }
        match (&mut api_handle).await {
            Ok(Err(e)) => tracing::error!(error = %e, "api server error"),
            Err(e) => tracing::error!(error = ?e, "api server task failed"),
            Ok(Ok(())) => {}
        }
    })
    .await;

    if drained.is_err() {
        tracing::warn!(grace_secs = grace.as_secs(), "grace period elapsed, aborting tasks; unacknowledged message will be redelivered");
        ingest_handle.abort();
        api_handle.abort();
    }

    tracing::info!("shutdown complete");
    Ok(())
}
