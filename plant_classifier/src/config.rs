use serde::Deserialize;
use std::path::PathBuf;

pub trait Validatable {
    fn get_path(&self) -> PathBuf;

    fn validate(&self) -> Result<(), String> {
        if !self.get_path().exists() {
            return Err(format!("File not found: {:?}", self.get_path()));
        }
        Ok(())
    }
}

#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum TensorLayout {
    #[default]
    Nhwc,
    Nchw,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ModelConfig {
    pub onnx_file: String,
    pub model_dir: PathBuf,
    #[serde(default = "default_model_instances")]
    pub num_instances: usize,
    #[serde(default = "default_input_size")]
    pub input_size: u32,
    #[serde(default)]
    pub layout: TensorLayout,
    #[serde(default = "default_pixel_scale")]
    pub pixel_scale: f32,
    #[serde(default)]
    pub output_name: Option<String>,
    #[serde(default)]
    pub apply_softmax: bool,
}

fn default_model_instances() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(4)
}

fn default_input_size() -> u32 {
    224
}

fn default_pixel_scale() -> f32 {
    1.0
}

impl ModelConfig {
    pub fn input_spec(&self) -> InputSpec {
        InputSpec {
            size: self.input_size,
            layout: self.layout,
            pixel_scale: self.pixel_scale,
        }
    }
}

impl Validatable for ModelConfig {
    fn get_path(&self) -> PathBuf {
        self.model_dir.join(&self.onnx_file)
    }

    fn validate(&self) -> Result<(), String> {
        if !self.get_path().exists() {
            return Err(format!("Model file not found: {:?}", self.get_path()));
        }
        if self.num_instances == 0 {
            return Err("num_instances must be at least 1".to_string());
        }
        if self.input_size == 0 {
            return Err("input_size must be greater than 0".to_string());
        }
        Ok(())
    }
}

/// Shape and scaling of the tensor fed to the network.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct InputSpec {
    pub size: u32,
    pub layout: TensorLayout,
    pub pixel_scale: f32,
}

impl Default for InputSpec {
    fn default() -> Self {
        Self {
            size: default_input_size(),
            layout: TensorLayout::default(),
            pixel_scale: default_pixel_scale(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct LabelsConfig {
    pub labels_file: String,
    pub labels_dir: PathBuf,
}

impl Validatable for LabelsConfig {
    fn get_path(&self) -> PathBuf {
        self.labels_dir.join(&self.labels_file)
    }
}

/// What to do when the metadata file and the label catalog disagree.
#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum UnmatchedPolicy {
    #[default]
    Warn,
    Reject,
}

#[derive(Debug, Deserialize, Clone)]
pub struct MetadataConfig {
    pub metadata_file: String,
    pub metadata_dir: PathBuf,
    #[serde(default)]
    pub unmatched: UnmatchedPolicy,
}

impl Validatable for MetadataConfig {
    fn get_path(&self) -> PathBuf {
        self.metadata_dir.join(&self.metadata_file)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn model_config_defaults_follow_training_resolution() {
        let config: ModelConfig = serde_json::from_str(
            r#"{"onnx_file": "model.onnx", "model_dir": "./models"}"#,
        )
        .unwrap();

        assert_eq!(config.get_path(), PathBuf::from("./models/model.onnx"));
        assert_eq!(config.input_spec(), InputSpec::default());
        assert!(config.num_instances >= 1);
        assert!(!config.apply_softmax);
        assert!(config.output_name.is_none());
    }

    #[test]
    fn missing_model_file_fails_validation() {
        let config = ModelConfig {
            onnx_file: "missing.onnx".to_string(),
            model_dir: PathBuf::from("/definitely/not/here"),
            num_instances: 1,
            input_size: 224,
            layout: TensorLayout::Nhwc,
            pixel_scale: 1.0,
            output_name: None,
            apply_softmax: false,
        };

        let err = config.validate().unwrap_err();
        assert!(err.contains("Model file not found"));
    }

    #[test]
    fn unmatched_policy_parses_lowercase() {
        let config: MetadataConfig = serde_json::from_str(
            r#"{"metadata_file": "d.json", "metadata_dir": ".", "unmatched": "reject"}"#,
        )
        .unwrap();
        assert_eq!(config.unmatched, UnmatchedPolicy::Reject);
    }
}
