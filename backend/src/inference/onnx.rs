use std::path::Path;

use tract_onnx::prelude::*;

use super::model::{Classifier, InferenceError};
use super::preprocess::InputTensor;

type OnnxPlan = TypedRunnableModel<TypedModel>;

/// ONNX model optimized for the fixed single-image input shape.
///
/// The runnable plan holds no per-run state, so concurrent requests share it
/// without locking.
pub struct OnnxClassifier {
    plan: OnnxPlan,
    shape: [usize; 4],
}

impl OnnxClassifier {
    pub fn load(path: &Path, shape: [usize; 4]) -> TractResult<Self> {
        let plan = tract_onnx::onnx()
            .model_for_path(path)?
            .with_input_fact(0, InferenceFact::dt_shape(f32::datum_type(), tvec!(shape[0], shape[1], shape[2], shape[3])))?
            .into_optimized()?
            .into_runnable()?;
        Ok(Self { plan, shape })
    }
}

impl Classifier for OnnxClassifier {
    fn forward(&self, input: &InputTensor) -> Result<Vec<f32>, InferenceError> {
        if input.shape() != self.shape {
            return Err(InferenceError::Backend(format!(
                "input shape {:?} does not match model shape {:?}",
                input.shape(),
                self.shape
            )));
        }
        let tensor = Tensor::from_shape(&self.shape, &input.to_vec())
            .map_err(|e| InferenceError::Backend(e.to_string()))?;
        let outputs = self
            .plan
            .run(tvec!(tensor.into()))
            .map_err(|e| InferenceError::Backend(e.to_string()))?;
        let scores = outputs[0]
            .to_array_view::<f32>()
            .map_err(|e| InferenceError::Backend(e.to_string()))?
            .iter()
            .copied()
            .collect();
        Ok(scores)
    }
}
