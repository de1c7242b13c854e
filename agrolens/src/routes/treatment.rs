use crate::{error::ApiError, server::SharedState};
use axum::{
    extract::{rejection::QueryRejection, Query, State},
    Json,
};
use plant_classifier::ModelService;
use serde::Deserialize;
use serde_json::Value;
use tracing::instrument;

#[derive(Debug, Deserialize)]
pub struct TreatmentParams {
    #[serde(rename = "diseaseName")]
    disease_name: String,
}

#[instrument(skip(state, params))]
pub async fn treatment<M: ModelService>(
    State(state): State<SharedState<M>>,
    params: Result<Query<TreatmentParams>, QueryRejection>,
) -> Result<Json<Value>, ApiError> {
    state.metrics.record_request("/treatment");

    let Query(params) = params.map_err(|e| ApiError::BadRequest(e.body_text()))?;
    let disease_name = params.disease_name.as_str();
    if disease_name.trim().is_empty() {
        return Err(ApiError::BadRequest("`diseaseName` must not be empty".to_string()));
    }

    let data = state.treatment.lookup(disease_name).await.map_err(|e| {
        tracing::warn!("Treatment lookup for {} failed: {}", disease_name, e);
        ApiError::from(e)
    })?;

    Ok(Json(data))
}
