use crate::{
    config::{ModelConfig, Validatable},
    error::ClassifierError,
    model_service::ModelService,
};
use async_trait::async_trait;
use ndarray::{Array, Ix4};
use ort::{
    session::{builder::GraphOptimizationLevel, Session},
    value::TensorRef,
};
use std::sync::{
    atomic::{AtomicUsize, Ordering},
    Arc, Mutex,
};

#[derive(Clone)]
pub struct OrtModelService {
    sessions: Arc<Vec<Arc<Mutex<Session>>>>,
    counter: Arc<AtomicUsize>,
    output_name: String,
    apply_softmax: bool,
}

impl OrtModelService {
    pub fn new(model_config: &ModelConfig) -> Result<Self, ClassifierError> {
        model_config.validate().map_err(ClassifierError::ModelLoad)?;

        let num_instances = model_config.num_instances;
        let sessions = (0..num_instances)
            .map(|_| {
                Session::builder()?
                    .with_optimization_level(GraphOptimizationLevel::Level3)?
                    .commit_from_file(model_config.get_path())
            })
            .collect::<Result<Vec<_>, ort::Error>>()
            .map_err(|e| ClassifierError::ModelLoad(e.to_string()))?;

        let available: Vec<String> = sessions
            .first()
            .map(|session| {
                session
                    .outputs
                    .iter()
                    .map(|output| output.name.clone())
                    .collect()
            })
            .unwrap_or_default();
        let output_name = resolve_output_name(&available, model_config.output_name.as_deref())?;

        tracing::info!(
            "Created {} ONNX sessions from {:?}, reading output {}",
            num_instances,
            model_config.get_path(),
            output_name
        );

        Ok(Self {
            counter: Arc::new(AtomicUsize::new(0)),
            sessions: Arc::new(
                sessions
                    .into_iter()
                    .map(|session| Arc::new(Mutex::new(session)))
                    .collect(),
            ),
            output_name,
            apply_softmax: model_config.apply_softmax,
        })
    }

    pub fn run_inference(&self, input: &Array<f32, Ix4>) -> Result<Vec<f32>, ClassifierError> {
        let index = self.counter.fetch_add(1, Ordering::SeqCst) % self.sessions.len();
        let mut session = self.sessions[index]
            .lock()
            .map_err(|e| ClassifierError::Inference(format!("session mutex poisoned: {}", e)))?;

        tracing::debug!("Handling request with session {}", index);
        let owned_buffer;
        let input_view = if input.view().is_standard_layout() {
            input.view()
        } else {
            owned_buffer = input.as_standard_layout().to_owned();
            owned_buffer.view()
        };

        let tensor_ref = TensorRef::from_array_view(input_view)?;
        let outputs = session.run(ort::inputs![tensor_ref])?;

        let output = outputs.get(self.output_name.as_str()).ok_or_else(|| {
            ClassifierError::Inference(format!("model produced no output {}", self.output_name))
        })?;
        let (_, data) = output.try_extract_tensor::<f32>()?;

        let scores = data.to_vec();
        Ok(if self.apply_softmax {
            softmax(&scores)
        } else {
            scores
        })
    }
}

#[async_trait]
impl ModelService for OrtModelService {
    async fn forward(&self, input: Array<f32, Ix4>) -> Result<Vec<f32>, ClassifierError> {
        let service = self.clone();
        tokio::task::spawn_blocking(move || service.run_inference(&input))
            .await
            .map_err(|e| ClassifierError::Inference(format!("inference task failed: {}", e)))?
    }
}

/// The configured output if the model declares it, otherwise the first declared output.
fn resolve_output_name(
    available: &[String],
    requested: Option<&str>,
) -> Result<String, ClassifierError> {
    match requested {
        Some(name) if available.iter().any(|output| output == name) => Ok(name.to_string()),
        Some(name) => Err(ClassifierError::ModelLoad(format!(
            "model has no output {}, available outputs: {:?}",
            name, available
        ))),
        None => available
            .first()
            .cloned()
            .ok_or_else(|| ClassifierError::ModelLoad("model declares no outputs".to_string())),
    }
}

pub fn softmax(scores: &[f32]) -> Vec<f32> {
    let max = scores.iter().copied().fold(f32::NEG_INFINITY, f32::max);
    let exps: Vec<f32> = scores.iter().map(|s| (s - max).exp()).collect();
    let sum: f32 = exps.iter().sum();
    if sum == 0.0 || !sum.is_finite() {
        return vec![0.0; scores.len()];
    }
    exps.into_iter().map(|e| e / sum).collect()
}
