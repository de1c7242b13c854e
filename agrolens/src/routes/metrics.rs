use crate::{error::ApiError, server::SharedState};
use axum::{extract::State, response::IntoResponse};
use plant_classifier::ModelService;
use prometheus::{Encoder, TextEncoder};

pub async fn metrics_handler<M: ModelService>(
    State(state): State<SharedState<M>>,
) -> Result<impl IntoResponse, ApiError> {
    let metric_families = state.metrics.registry.gather();

    let mut buffer = Vec::new();
    let encoder = TextEncoder::new();
    encoder.encode(&metric_families, &mut buffer).map_err(|e| {
        tracing::error!("Failed to encode metrics: {}", e);
        ApiError::Internal
    })?;

    String::from_utf8(buffer).map_err(|e| {
        tracing::error!("Metrics are not valid UTF-8: {}", e);
        ApiError::Internal
    })
}
