use crate::{
    catalog::LabelCatalog, config::InputSpec, error::ClassifierError,
    model_service::ModelService, preprocess::prepare_input,
};
use std::sync::Arc;
use tracing::instrument;

#[derive(Debug, Clone, PartialEq)]
pub struct Prediction {
    pub index: usize,
    pub label: String,
    pub confidence: f32,
    pub probabilities: Vec<f32>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RankedLabel {
    pub index: usize,
    pub label: String,
    pub probability: f32,
}

impl Prediction {
    /// The `k` most probable classes, best first.
    pub fn top_k(&self, catalog: &LabelCatalog, k: usize) -> Vec<RankedLabel> {
        let mut indexed: Vec<(usize, f32)> = self
            .probabilities
            .iter()
            .copied()
            .enumerate()
            .filter(|(_, p)| !p.is_nan())
            .collect();
        indexed.sort_by(|a, b| b.1.total_cmp(&a.1));

        indexed
            .into_iter()
            .take(k)
            .filter_map(|(index, probability)| {
                catalog.label(index).map(|label| RankedLabel {
                    index,
                    label: label.to_string(),
                    probability,
                })
            })
            .collect()
    }
}

/// Index and score of the highest finite score, `None` if there is none.
pub fn argmax(scores: &[f32]) -> Option<(usize, f32)> {
    scores
        .iter()
        .copied()
        .enumerate()
        .filter(|(_, score)| !score.is_nan())
        .reduce(|best, candidate| if candidate.1 > best.1 { candidate } else { best })
}

/// Decodes an image, runs the network once and names the winning class.
///
/// A classifier built without a model answers every call with
/// [`ClassifierError::ModelUnavailable`], so a service can start and report
/// the failure per request.
pub struct Classifier<M: ModelService> {
    model: Option<Arc<M>>,
    catalog: Arc<LabelCatalog>,
    input_spec: InputSpec,
}

impl<M: ModelService> Classifier<M> {
    pub fn new(model: M, catalog: Arc<LabelCatalog>, input_spec: InputSpec) -> Self {
        Self {
            model: Some(Arc::new(model)),
            catalog,
            input_spec,
        }
    }

    pub fn without_model(catalog: Arc<LabelCatalog>, input_spec: InputSpec) -> Self {
        Self {
            model: None,
            catalog,
            input_spec,
        }
    }

    pub fn is_ready(&self) -> bool {
        self.model.is_some()
    }

    pub fn catalog(&self) -> &LabelCatalog {
        &self.catalog
    }

    #[instrument(skip(self, image_data), fields(bytes = image_data.len()))]
    pub async fn classify(&self, image_data: &[u8]) -> Result<Prediction, ClassifierError> {
        let model = self.model.as_ref().ok_or(ClassifierError::ModelUnavailable)?;

        let input = prepare_input(image_data, &self.input_spec)?;
        let probabilities = model.forward(input).await?;

        if probabilities.len() != self.catalog.len() {
            return Err(ClassifierError::OutputMismatch {
                expected: self.catalog.len(),
                got: probabilities.len(),
            });
        }

        let (index, score) = argmax(&probabilities)
            .ok_or_else(|| ClassifierError::Inference("model returned no finite score".into()))?;
        let label = self
            .catalog
            .label(index)
            .ok_or(ClassifierError::OutputMismatch {
                expected: self.catalog.len(),
                got: probabilities.len(),
            })?
            .to_string();

        tracing::debug!("Predicted {} ({}) with confidence {:.3}", label, index, score);

        Ok(Prediction {
            index,
            label,
            confidence: score.clamp(0.0, 1.0),
            probabilities,
        })
    }
}
