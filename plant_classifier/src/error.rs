use thiserror::Error;

#[derive(Error, Debug)]
pub enum ClassifierError {
    #[error("Image data is empty")]
    EmptyImage,
    #[error("Error decoding image: {0}")]
    Decode(String),
    #[error("Model is not loaded")]
    ModelUnavailable,
    #[error("Failed to load model: {0}")]
    ModelLoad(String),
    #[error("Inference failed: {0}")]
    Inference(String),
    #[error("Model returned {got} scores but the catalog holds {expected} labels")]
    OutputMismatch { expected: usize, got: usize },
}

impl ClassifierError {
    /// True when the caller sent something that is not an image.
    pub fn is_client_error(&self) -> bool {
        matches!(self, Self::EmptyImage | Self::Decode(_))
    }
}

impl From<ort::Error> for ClassifierError {
    fn from(err: ort::Error) -> Self {
        ClassifierError::Inference(err.to_string())
    }
}

#[derive(Error, Debug)]
pub enum CatalogError {
    #[error("Failed to read labels file: {0}")]
    Io(#[from] std::io::Error),
    #[error("Label catalog is empty")]
    Empty,
    #[error("Duplicate label in catalog: {0}")]
    Duplicate(String),
}

#[derive(Error, Debug)]
pub enum MetadataError {
    #[error("Failed to read metadata file: {0}")]
    Io(#[from] std::io::Error),
    #[error("Invalid metadata file: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("No metadata for catalog labels: {0:?}")]
    MissingLabels(Vec<String>),
    #[error("Metadata entries match no catalog label: {0:?}")]
    UnknownLabels(Vec<String>),
}
