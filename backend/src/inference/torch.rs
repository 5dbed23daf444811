use std::path::Path;
use std::sync::Mutex;

use tch::{CModule, Device, Kind, Tensor};

use super::model::{Classifier, InferenceError};
use super::preprocess::InputTensor;

/// TorchScript module. `CModule` is not `Sync`, so runs are serialized.
pub struct TorchClassifier {
    model: Mutex<CModule>,
    device: Device,
}

impl TorchClassifier {
    pub fn load(path: &Path) -> Result<Self, tch::TchError> {
        let device = Device::cuda_if_available();
        let mut model = CModule::load_on_device(path, device)?;
        model.set_eval();
        log::info!("TorchScript model loaded on {:?}", device);
        Ok(Self {
            model: Mutex::new(model),
            device,
        })
    }
}

impl Classifier for TorchClassifier {
    fn forward(&self, input: &InputTensor) -> Result<Vec<f32>, InferenceError> {
        let shape: Vec<i64> = input.shape().iter().map(|d| *d as i64).collect();
        let tensor = Tensor::from_slice(&input.to_vec())
            .view(shape.as_slice())
            .to_device(self.device);

        let output = {
            let model = self.model.lock().map_err(|_| InferenceError::Poisoned)?;
            tch::no_grad(|| model.forward_ts(&[tensor]))
                .map_err(|e| InferenceError::Backend(e.to_string()))?
        };

        let output_flat = output.to_kind(Kind::Float).to_device(Device::Cpu).view([-1]);
        let num_elements = output_flat.size()[0] as usize;
        let mut output_vec = vec![0.0f32; num_elements];
        output_flat.copy_data(&mut output_vec, num_elements);
        Ok(output_vec)
    }
}
