mod diagnosis;
mod health;
mod metrics;
mod treatment;

pub mod openapi;

use crate::server::SharedState;
use axum::{
    routing::{get, post},
    Router,
};
use plant_classifier::ModelService;

pub use diagnosis::Diagnosis;

pub fn api_routes<M: ModelService>() -> Router<SharedState<M>> {
    Router::new()
        .route("/", get(health::root))
        .route("/health", get(health::healthcheck::<M>))
        .route("/imageDiagnosis", post(diagnosis::image_diagnosis::<M>))
        .route("/treatment", get(treatment::treatment::<M>))
        .route("/openapi.yaml", get(openapi::openapi_document::<M>))
        .route("/metrics", get(metrics::metrics_handler::<M>))
}
