use crate::error::ClassifierError;
use async_trait::async_trait;
use ndarray::{Array, Ix4};

/// One forward pass: a batch of one image in, one score per class out.
#[async_trait]
pub trait ModelService: Send + Sync + 'static {
    async fn forward(&self, input: Array<f32, Ix4>) -> Result<Vec<f32>, ClassifierError>;
}
