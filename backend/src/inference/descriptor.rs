use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};

#[derive(Debug, thiserror::Error)]
pub enum DescriptorError {
    #[error("Failed to read model descriptor {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Failed to parse model descriptor: {0}")]
    Parse(#[from] serde_yaml::Error),
    #[error("Invalid model descriptor: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModelFormat {
    Onnx,
    Torchscript,
}

/// Model file and label list shipped as one versioned artifact.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelDescriptor {
    pub version: u32,
    pub format: ModelFormat,
    pub model_path: PathBuf,
    pub input: InputSpec,
    pub normalization: NormalizationSpec,
    #[serde(default = "default_apply_softmax")]
    pub apply_softmax: bool,
    pub labels: Vec<String>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct InputSpec {
    pub width: u32,
    pub height: u32,
    #[serde(default = "default_channels")]
    pub channels: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NormalizationSpec {
    pub mean: Vec<f32>,
    pub std: Vec<f32>,
}

fn default_apply_softmax() -> bool {
    true
}

fn default_channels() -> u32 {
    3
}

impl ModelDescriptor {
    /// Loads the descriptor and resolves `model_path` against its directory.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, DescriptorError> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path).map_err(|source| DescriptorError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let mut descriptor = Self::from_yaml(&contents)?;
        if descriptor.model_path.is_relative() {
            let base = path.parent().unwrap_or_else(|| Path::new("."));
            descriptor.model_path = base.join(&descriptor.model_path);
        }
        Ok(descriptor)
    }

    pub fn from_yaml(contents: &str) -> Result<Self, DescriptorError> {
        let descriptor: ModelDescriptor = serde_yaml::from_str(contents)?;
        descriptor.validate()?;
        Ok(descriptor)
    }

    pub fn validate(&self) -> Result<(), DescriptorError> {
        if self.labels.is_empty() {
            return Err(DescriptorError::Invalid("label list is empty".into()));
        }
        let mut seen = HashSet::new();
        for label in &self.labels {
            if label.trim().is_empty() {
                return Err(DescriptorError::Invalid("label list contains an empty label".into()));
            }
            if !seen.insert(label.as_str()) {
                return Err(DescriptorError::Invalid(format!("duplicate label '{}'", label)));
            }
        }

        if self.input.width == 0 || self.input.height == 0 {
            return Err(DescriptorError::Invalid("input dimensions must be non-zero".into()));
        }
        if self.input.channels != 1 && self.input.channels != 3 {
            return Err(DescriptorError::Invalid(format!(
                "unsupported channel count {}",
                self.input.channels
            )));
        }

        let channels = self.input.channels as usize;
        if self.normalization.mean.len() != channels || self.normalization.std.len() != channels {
            return Err(DescriptorError::Invalid(format!(
                "normalization needs {} mean and std values",
                channels
            )));
        }
        if self.normalization.std.iter().any(|s| *s == 0.0 || !s.is_finite()) {
            return Err(DescriptorError::Invalid("normalization std must be finite and non-zero".into()));
        }
        Ok(())
    }

    pub fn num_classes(&self) -> usize {
        self.labels.len()
    }

    /// NCHW shape of the single-image input tensor.
    pub fn input_shape(&self) -> [usize; 4] {
        [
            1,
            self.input.channels as usize,
            self.input.height as usize,
            self.input.width as usize,
        ]
    }
}
