use crate::{error::ApiError, server::SharedState};
use axum::{
    extract::State,
    http::header,
    response::{IntoResponse, Response},
};
use plant_classifier::ModelService;
use std::{fs, io, path::Path};

/// The OpenAPI description shipped with the service, served as loaded.
#[derive(Debug, Clone)]
pub struct OpenApiDocument {
    pub content: String,
    pub content_type: &'static str,
}

impl OpenApiDocument {
    pub fn load(path: &Path) -> io::Result<Self> {
        let content = fs::read_to_string(path)?;
        if content.trim().is_empty() {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!("OpenAPI document {:?} is empty", path),
            ));
        }

        let content_type = match path.extension().and_then(|ext| ext.to_str()) {
            Some("json") => "application/json",
            _ => "application/yaml",
        };

        Ok(Self {
            content,
            content_type,
        })
    }
}

pub async fn openapi_document<M: ModelService>(
    State(state): State<SharedState<M>>,
) -> Result<Response, ApiError> {
    let document = state.openapi.as_ref().ok_or(ApiError::NotFound)?;

    Ok((
        [(header::CONTENT_TYPE, document.content_type)],
        document.content.clone(),
    )
        .into_response())
}
