use crate::{error::ApiError, server::SharedState};
use axum::{
    body::Bytes,
    extract::{
        multipart::{MultipartError, MultipartRejection},
        Multipart, State,
    },
    http::StatusCode,
    Json,
};
use plant_classifier::ModelService;
use serde::{Deserialize, Serialize};
use std::time::Instant;
use tracing::instrument;

const FILE_FIELD: &str = "file";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Diagnosis {
    pub scientific_name: String,
    pub crop: String,
    pub common_name: String,
    pub description: String,
    pub confidence: f32,
}

#[instrument(skip(state, multipart))]
pub async fn image_diagnosis<M: ModelService>(
    State(state): State<SharedState<M>>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Json<Diagnosis>, ApiError> {
    state.metrics.record_request("/imageDiagnosis");
    let started = Instant::now();

    let result = diagnose(&state, multipart).await;

    state
        .metrics
        .record_diagnosis_duration(started.elapsed().as_millis() as u64);
    let status = match &result {
        Ok(_) => 200,
        Err(e) => e.status_code().as_u16(),
    };
    state.metrics.record_diagnosis_outcome(status);

    result.map(Json)
}

async fn diagnose<M: ModelService>(
    state: &SharedState<M>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Diagnosis, ApiError> {
    let multipart = multipart.map_err(|e| ApiError::BadRequest(e.body_text()))?;
    let image_data = read_upload(multipart).await?;

    let prediction = state
        .classifier
        .classify(&image_data)
        .await
        .map_err(|e| {
            if e.is_client_error() {
                tracing::warn!("Rejected uploaded image: {}", e);
            } else {
                tracing::error!("Image diagnosis failed: {}", e);
            }
            ApiError::Internal
        })?;

    let Some(info) = state.metadata.get(&prediction.label) else {
        tracing::warn!("No metadata for predicted label {}", prediction.label);
        return Err(ApiError::NotFound);
    };

    tracing::info!(
        "Diagnosed {} with confidence {:.3}",
        prediction.label,
        prediction.confidence
    );

    Ok(Diagnosis {
        scientific_name: info.scientific_name.clone(),
        crop: info.crop.clone(),
        common_name: info.common_name.clone(),
        description: info.description.clone(),
        confidence: prediction.confidence,
    })
}

/// The part named `file`, or failing that the first part that carries a file name.
async fn read_upload(mut multipart: Multipart) -> Result<Bytes, ApiError> {
    let mut fallback = None;

    while let Some(field) = multipart.next_field().await.map_err(upload_error)? {
        let is_file_field = field.name() == Some(FILE_FIELD);
        if !is_file_field && (fallback.is_some() || field.file_name().is_none()) {
            continue;
        }

        let data = field.bytes().await.map_err(upload_error)?;

        if is_file_field {
            return Ok(data);
        }
        fallback = Some(data);
    }

    fallback.ok_or_else(|| ApiError::BadRequest("missing `file` upload".to_string()))
}

fn upload_error(e: MultipartError) -> ApiError {
    tracing::warn!("Failed to read multipart upload: {}", e);
    if e.status() == StatusCode::PAYLOAD_TOO_LARGE {
        ApiError::PayloadTooLarge
    } else {
        ApiError::BadRequest(e.body_text())
    }
}
