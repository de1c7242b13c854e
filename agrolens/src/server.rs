use crate::{
    config::ServerConfig, routes::api_routes, routes::openapi::OpenApiDocument,
    telemetry::Metrics, treatment::TreatmentClient,
};
use axum::{extract::DefaultBodyLimit, Router};
use axum_otel_metrics::HttpMetricsLayerBuilder;
use plant_classifier::{Classifier, MetadataTable, ModelService};
use std::sync::Arc;
use tokio::{net::TcpListener, sync::broadcast::Receiver, task::JoinHandle};
use tower_http::trace::TraceLayer;

/// Everything a handler needs, built once at startup and never mutated.
pub struct SharedState<M: ModelService> {
    pub classifier: Arc<Classifier<M>>,
    pub metadata: Arc<MetadataTable>,
    pub treatment: Arc<TreatmentClient>,
    pub openapi: Option<Arc<OpenApiDocument>>,
    pub metrics: Arc<Metrics>,
}

impl<M: ModelService> Clone for SharedState<M> {
    fn clone(&self) -> Self {
        Self {
            classifier: self.classifier.clone(),
            metadata: self.metadata.clone(),
            treatment: self.treatment.clone(),
            openapi: self.openapi.clone(),
            metrics: self.metrics.clone(),
        }
    }
}

pub fn create_app<M: ModelService>(state: SharedState<M>, max_upload_bytes: usize) -> Router {
    let metrics_layer = HttpMetricsLayerBuilder::new().build();

    Router::new()
        .merge(api_routes::<M>())
        .with_state(state)
        .layer(DefaultBodyLimit::max(max_upload_bytes))
        .layer(TraceLayer::new_for_http())
        .layer(metrics_layer)
}

pub struct HttpServer {
    router: Router,
    listener: TcpListener,
}

impl HttpServer {
    pub async fn new<M: ModelService>(
        state: SharedState<M>,
        config: &ServerConfig,
    ) -> anyhow::Result<Self> {
        let addr = config.get_address();
        let router = create_app(state, config.max_upload_bytes);
        let listener = TcpListener::bind(addr).await?;

        Ok(Self { router, listener })
    }

    pub async fn run(
        self,
        shutdown_rx: Receiver<()>,
    ) -> anyhow::Result<JoinHandle<anyhow::Result<()>>> {
        tracing::info!("Starting app on {}", self.listener.local_addr()?);

        let listener = self.listener;
        let router = self.router;
        let server_handle = tokio::spawn({
            let mut shutdown_rx = shutdown_rx.resubscribe();
            async move {
                axum::serve(listener, router)
                    .with_graceful_shutdown(async move {
                        shutdown_rx.recv().await.ok();
                    })
                    .await?;
                Ok(())
            }
        });

        Ok(server_handle)
    }
}
