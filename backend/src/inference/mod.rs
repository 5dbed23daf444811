pub mod descriptor;
pub mod model;
#[cfg(feature = "onnx")]
pub mod onnx;
pub mod preprocess;
#[cfg(feature = "torch")]
pub mod torch;

use descriptor::{ModelDescriptor, ModelFormat};
use model::{Classifier, Predictor};

#[derive(Debug, thiserror::Error)]
pub enum LoadError {
    #[error(transparent)]
    Descriptor(#[from] descriptor::DescriptorError),
    #[error("Model file not found: {0}")]
    MissingModel(std::path::PathBuf),
    #[cfg(any(feature = "onnx", feature = "torch"))]
    #[error("Failed to load {format:?} model: {message}")]
    Backend { format: ModelFormat, message: String },
    #[error("Support for {0:?} models was not compiled into this build")]
    BackendUnavailable(ModelFormat),
}

/// Deserializes the model named by the descriptor with the matching backend.
pub fn load_classifier(descriptor: &ModelDescriptor) -> Result<Box<dyn Classifier>, LoadError> {
    if !descriptor.model_path.is_file() {
        return Err(LoadError::MissingModel(descriptor.model_path.clone()));
    }

    match descriptor.format {
        #[cfg(feature = "onnx")]
        ModelFormat::Onnx => {
            let classifier = onnx::OnnxClassifier::load(&descriptor.model_path, descriptor.input_shape())
                .map_err(|e| LoadError::Backend {
                    format: ModelFormat::Onnx,
                    message: e.to_string(),
                })?;
            Ok(Box::new(classifier))
        }
        #[cfg(feature = "torch")]
        ModelFormat::Torchscript => {
            let classifier = torch::TorchClassifier::load(&descriptor.model_path).map_err(|e| {
                LoadError::Backend {
                    format: ModelFormat::Torchscript,
                    message: e.to_string(),
                }
            })?;
            Ok(Box::new(classifier))
        }
        #[allow(unreachable_patterns)]
        format => Err(LoadError::BackendUnavailable(format)),
    }
}

pub fn load_predictor(descriptor_path: &std::path::Path) -> Result<Predictor, LoadError> {
    let descriptor = ModelDescriptor::load(descriptor_path)?;
    let classifier = load_classifier(&descriptor)?;
    Ok(Predictor::new(descriptor, classifier))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::inference::descriptor::tests::SAMPLE;

    #[test]
    fn missing_model_file_fails_at_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("model.yaml");
        std::fs::write(&path, SAMPLE).unwrap();

        let err = load_predictor(&path).err().unwrap();
        assert!(matches!(err, LoadError::MissingModel(_)));
    }

    #[test]
    fn corrupt_model_file_fails_at_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("model.yaml");
        std::fs::write(&path, SAMPLE).unwrap();
        std::fs::write(dir.path().join("food.onnx"), b"definitely not protobuf").unwrap();

        let err = load_predictor(&path).err().unwrap();
        #[cfg(feature = "onnx")]
        assert!(matches!(err, LoadError::Backend { .. }));
        #[cfg(not(feature = "onnx"))]
        assert!(matches!(err, LoadError::BackendUnavailable(_)));
    }
}
