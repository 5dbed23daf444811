use image::imageops::FilterType;
use image::DynamicImage;
use ndarray::Array4;

use super::descriptor::ModelDescriptor;

const PIXEL_SCALE: f32 = 1. / 255.;

#[derive(Debug, thiserror::Error)]
#[error("Failed to decode image: {0}")]
pub struct DecodeError(#[from] pub image::ImageError);

/// Normalized NCHW input for a single image.
#[derive(Debug, Clone)]
pub struct InputTensor {
    array: Array4<f32>,
}

impl InputTensor {
    pub fn shape(&self) -> [usize; 4] {
        let dim = self.array.dim();
        [dim.0, dim.1, dim.2, dim.3]
    }

    /// Values in row-major NCHW order.
    pub fn to_vec(&self) -> Vec<f32> {
        self.array.iter().copied().collect()
    }

    #[cfg(test)]
    pub(crate) fn array(&self) -> &Array4<f32> {
        &self.array
    }
}

pub fn decode(bytes: &[u8]) -> Result<DynamicImage, DecodeError> {
    Ok(image::load_from_memory(bytes)?)
}

pub fn preprocess(bytes: &[u8], descriptor: &ModelDescriptor) -> Result<InputTensor, DecodeError> {
    let image = decode(bytes)?;
    Ok(to_tensor(&image, descriptor))
}

pub fn to_tensor(image: &DynamicImage, descriptor: &ModelDescriptor) -> InputTensor {
    let [_, channels, height, width] = descriptor.input_shape();
    let mean = &descriptor.normalization.mean;
    let std = &descriptor.normalization.std;
    let resized = image.resize_exact(width as u32, height as u32, FilterType::Triangle);

    let array = if channels == 1 {
        let luma = resized.to_luma8();
        Array4::from_shape_fn((1, 1, height, width), |(_, _, y, x)| {
            let v = luma[(x as u32, y as u32)][0] as f32 * PIXEL_SCALE;
            (v - mean[0]) / std[0]
        })
    } else {
        let rgb = resized.to_rgb8();
        Array4::from_shape_fn((1, 3, height, width), |(_, c, y, x)| {
            let v = rgb[(x as u32, y as u32)][c] as f32 * PIXEL_SCALE;
            (v - mean[c]) / std[c]
        })
    };
    InputTensor { array }
}
