mod classifier;
mod error;
mod model_service;
mod ort_service;
mod preprocess;

pub mod catalog;
pub mod config;
pub mod evaluation;
pub mod metadata;

pub use catalog::LabelCatalog;
pub use classifier::{argmax, Classifier, Prediction, RankedLabel};
pub use error::{CatalogError, ClassifierError, MetadataError};
pub use metadata::{DiseaseInfo, MetadataTable};
pub use model_service::ModelService;
pub use ort_service::{softmax, OrtModelService};
pub use preprocess::{decode_image, image_to_tensor, prepare_input};
