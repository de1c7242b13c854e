use crate::config::Config;
use crate::routes::openapi::OpenApiDocument;
use crate::server::{HttpServer, SharedState};
use crate::telemetry::Metrics;
use crate::treatment::TreatmentClient;

use plant_classifier::{
    config::Validatable, Classifier, LabelCatalog, MetadataTable, OrtModelService,
};
use std::{future::Future, sync::Arc};
use tokio::{signal, sync::broadcast, task::JoinHandle};

pub async fn start_app(config: Config) -> anyhow::Result<()> {
    let state = build_state(&config)?;
    let server = HttpServer::new(state, &config.server).await?;

    let (shutdown_tx, _) = broadcast::channel(1);
    let server_handle = server.run(shutdown_tx.subscribe()).await?;

    serve_until(server_handle, shutdown_tx, shutdown_signal()).await
}

/// Waits for `signal` or for the server to stop on its own, whichever comes first.
///
/// A server error is returned either way.
async fn serve_until<F>(
    mut server_handle: JoinHandle<anyhow::Result<()>>,
    shutdown_tx: broadcast::Sender<()>,
    signal: F,
) -> anyhow::Result<()>
where
    F: Future<Output = ()>,
{
    tokio::select! {
        _ = signal => {
            tracing::info!("Shutdown signal received, starting graceful shutdown.");
            let _ = shutdown_tx.send(());
            server_handle.await??;
        }
        result = &mut server_handle => {
            if let Err(e) = result.map_err(anyhow::Error::from).and_then(|served| served) {
                tracing::error!("Server stopped unexpectedly: {}", e);
                return Err(e);
            }
            tracing::warn!("Server stopped before any shutdown signal.");
        }
    }

    Ok(())
}

/// Loads every startup dependency once.
///
/// Catalog and metadata are required. A model or OpenAPI file that fails to
/// load is logged and the matching endpoints answer with errors instead.
pub fn build_state(config: &Config) -> anyhow::Result<SharedState<OrtModelService>> {
    let catalog = match &config.labels {
        Some(labels) => LabelCatalog::from_file(&labels.get_path())?,
        None => LabelCatalog::plant_village(),
    };
    let catalog = Arc::new(catalog);
    tracing::info!("Loaded label catalog with {} classes", catalog.len());

    let metadata = MetadataTable::from_file(
        &config.metadata.get_path(),
        &catalog,
        config.metadata.unmatched,
    )?;

    let input_spec = config.model.input_spec();
    let classifier = match OrtModelService::new(&config.model) {
        Ok(model) => Classifier::new(model, catalog.clone(), input_spec),
        Err(e) => {
            tracing::error!("Failed to load model, diagnosis will answer 500: {}", e);
            Classifier::without_model(catalog.clone(), input_spec)
        }
    };

    let treatment = TreatmentClient::new(&config.treatment, config.treatment.read_token())?;

    let openapi = match OpenApiDocument::load(&config.openapi.get_path()) {
        Ok(document) => Some(Arc::new(document)),
        Err(e) => {
            tracing::error!("Failed to load OpenAPI document: {}", e);
            None
        }
    };

    Ok(SharedState {
        classifier: Arc::new(classifier),
        metadata: Arc::new(metadata),
        treatment: Arc::new(treatment),
        openapi,
        metrics: Arc::new(Metrics::new()?),
    })
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
