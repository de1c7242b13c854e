use crate::server::SharedState;
use axum::{extract::State, response::IntoResponse, response::Json};
use plant_classifier::ModelService;
use serde::{Deserialize, Serialize};

#[derive(Serialize, Deserialize)]
pub struct Message {
    message: String,
}

#[derive(Serialize, Deserialize)]
pub struct Status {
    status: String,
    model_loaded: bool,
    treatment_credential: bool,
    labels_without_metadata: Vec<String>,
}

pub async fn root() -> impl IntoResponse {
    Json(Message {
        message: "AgroLens API is up.".into(),
    })
}

pub async fn healthcheck<M: ModelService>(
    State(state): State<SharedState<M>>,
) -> impl IntoResponse {
    Json(Status {
        status: "Available".into(),
        model_loaded: state.classifier.is_ready(),
        treatment_credential: state.treatment.has_credential(),
        labels_without_metadata: state.metadata.missing_labels().to_vec(),
    })
}
