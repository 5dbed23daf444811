use shared::LabelScore;

use super::descriptor::ModelDescriptor;
use super::preprocess::{self, DecodeError, InputTensor};

#[derive(Debug, thiserror::Error)]
pub enum InferenceError {
    #[error("Backend error: {0}")]
    Backend(String),
    #[cfg(feature = "torch")]
    #[error("Model lock poisoned")]
    Poisoned,
}

#[derive(Debug, thiserror::Error)]
pub enum PredictError {
    #[error(transparent)]
    Decode(#[from] DecodeError),
    #[error("Model inference error: {0}")]
    Inference(#[from] InferenceError),
    #[error("Model produced {outputs} outputs but {labels} labels are configured")]
    OutputMismatch { outputs: usize, labels: usize },
    #[error("Failed to read scratch image: {0}")]
    Io(#[from] std::io::Error),
}

/// A loaded model that maps one input tensor to one score per class.
pub trait Classifier: Send + Sync {
    fn forward(&self, input: &InputTensor) -> Result<Vec<f32>, InferenceError>;
}

pub const TOP_PREDICTIONS: usize = 3;

#[derive(Debug, Clone, PartialEq)]
pub struct ClassificationResult {
    pub index: usize,
    pub label: String,
    pub confidence: f32,
    pub top: Vec<LabelScore>,
}

impl ClassificationResult {
    pub fn from_scores(
        scores: &[f32],
        labels: &[String],
        apply_softmax: bool,
    ) -> Result<Self, PredictError> {
        if scores.len() != labels.len() || scores.is_empty() {
            return Err(PredictError::OutputMismatch {
                outputs: scores.len(),
                labels: labels.len(),
            });
        }
        if let Some(position) = scores.iter().position(|s| !s.is_finite()) {
            return Err(InferenceError::Backend(format!(
                "model produced non-finite score {} for class {}",
                scores[position], position
            ))
            .into());
        }

        // Softmax preserves order, so the raw scores pick the class.
        let mut index = 0;
        for (i, score) in scores.iter().enumerate() {
            if *score > scores[index] {
                index = i;
            }
        }

        let probabilities = if apply_softmax {
            softmax(scores)
        } else {
            scores.to_vec()
        };

        let mut ranked: Vec<usize> = (0..scores.len()).collect();
        ranked.sort_by(|a, b| {
            scores[*b]
                .partial_cmp(&scores[*a])
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        let top = ranked
            .into_iter()
            .take(TOP_PREDICTIONS)
            .map(|i| LabelScore {
                label: labels[i].clone(),
                probability: probabilities[i],
            })
            .collect();

        Ok(Self {
            index,
            label: labels[index].clone(),
            confidence: probabilities[index],
            top,
        })
    }
}

/// Expects finite scores.
pub fn softmax(scores: &[f32]) -> Vec<f32> {
    let max = scores.iter().copied().fold(f32::NEG_INFINITY, f32::max);
    let exps: Vec<f32> = scores.iter().map(|s| (s - max).exp()).collect();
    let sum: f32 = exps.iter().sum();
    exps.into_iter().map(|e| e / sum).collect()
}

pub struct Predictor {
    descriptor: ModelDescriptor,
    classifier: Box<dyn Classifier>,
}

impl Predictor {
    pub fn new(descriptor: ModelDescriptor, classifier: Box<dyn Classifier>) -> Self {
        Self {
            descriptor,
            classifier,
        }
    }

    pub fn descriptor(&self) -> &ModelDescriptor {
        &self.descriptor
    }

    pub fn labels(&self) -> &[String] {
        &self.descriptor.labels
    }

    pub fn predict(&self, image: &[u8]) -> Result<ClassificationResult, PredictError> {
        let tensor = preprocess::preprocess(image, &self.descriptor)?;
        let scores = self.classifier.forward(&tensor)?;
        ClassificationResult::from_scores(&scores, &self.descriptor.labels, self.descriptor.apply_softmax)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::inference::descriptor::tests::SAMPLE;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    /// Scores each class by how close the mean red value is to a fixed anchor.
    pub(crate) struct RednessClassifier {
        pub calls: Arc<AtomicUsize>,
        pub classes: usize,
    }

    impl RednessClassifier {
        pub(crate) fn new(classes: usize) -> (Self, Arc<AtomicUsize>) {
            let calls = Arc::new(AtomicUsize::new(0));
            (
                Self {
                    calls: calls.clone(),
                    classes,
                },
                calls,
            )
        }
    }

    impl Classifier for RednessClassifier {
        fn forward(&self, input: &InputTensor) -> Result<Vec<f32>, InferenceError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let [_, _, height, width] = input.shape();
            let red = &input.to_vec()[..height * width];
            let mean = red.iter().sum::<f32>() / red.len() as f32;
            Ok((0..self.classes)
                .map(|i| -(mean - i as f32).abs())
                .collect())
        }
    }

    fn labels(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn picks_argmax_label() {
        let result =
            ClassificationResult::from_scores(&[0.1, 2.0, 0.3], &labels(&["a", "b", "c"]), true)
                .unwrap();
        assert_eq!(result.index, 1);
        assert_eq!(result.label, "b");
        assert!(result.confidence > 0.5 && result.confidence < 1.0);
    }

    #[test]
    fn first_maximum_wins() {
        let result =
            ClassificationResult::from_scores(&[0.1, 0.4, 0.4], &labels(&["a", "b", "c"]), false)
                .unwrap();
        assert_eq!(result.label, "b");
        assert_eq!(result.confidence, 0.4);
    }

    #[test]
    fn infinite_score_is_rejected_not_mislabelled() {
        let err = ClassificationResult::from_scores(
            &[0.0, f32::INFINITY, 1.0],
            &labels(&["a", "b", "c"]),
            true,
        )
        .unwrap_err();
        assert!(matches!(err, PredictError::Inference(InferenceError::Backend(_))));
    }

    #[test]
    fn nan_scores_are_rejected() {
        for scores in [[f32::NAN, f32::NAN, f32::NAN], [0.2, f32::NAN, 0.1]] {
            let err = ClassificationResult::from_scores(&scores, &labels(&["a", "b", "c"]), true)
                .unwrap_err();
            assert!(matches!(err, PredictError::Inference(_)), "{:?}", scores);
        }
    }

    #[test]
    fn large_logits_keep_finite_confidence() {
        let result = ClassificationResult::from_scores(
            &[1.0e30, 3.0e38, -3.0e38],
            &labels(&["a", "b", "c"]),
            true,
        )
        .unwrap();
        assert_eq!(result.label, "b");
        assert!(result.confidence.is_finite());
        assert!((result.confidence - 1.0).abs() < 1e-6);
    }

    #[test]
    fn top_predictions_are_ranked_and_capped() {
        let result = ClassificationResult::from_scores(
            &[0.5, 3.0, 1.0, 2.0],
            &labels(&["a", "b", "c", "d"]),
            true,
        )
        .unwrap();
        let ranked: Vec<&str> = result.top.iter().map(|p| p.label.as_str()).collect();
        assert_eq!(ranked, vec!["b", "d", "c"]);
        assert_eq!(result.top[0].probability, result.confidence);
        assert!(result.top[1].probability > result.top[2].probability);

        let two = ClassificationResult::from_scores(&[1.0, 2.0], &labels(&["x", "y"]), false).unwrap();
        assert_eq!(two.top.len(), 2);
    }

    #[test]
    fn output_length_mismatch_is_reported() {
        let err = ClassificationResult::from_scores(&[0.5, 0.5], &labels(&["a", "b", "c"]), true)
            .unwrap_err();
        assert!(matches!(
            err,
            PredictError::OutputMismatch {
                outputs: 2,
                labels: 3
            }
        ));
    }

    #[test]
    fn softmax_sums_to_one() {
        let probabilities = softmax(&[1.0, 2.0, 3.0]);
        let sum: f32 = probabilities.iter().sum();
        assert!((sum - 1.0).abs() < 1e-6);
        assert!(probabilities[2] > probabilities[1]);
    }

    #[test]
    fn predictor_is_deterministic_and_in_range() {
        let descriptor = ModelDescriptor::from_yaml(SAMPLE).unwrap();
        let (classifier, calls) = RednessClassifier::new(descriptor.num_classes());
        let predictor = Predictor::new(descriptor, Box::new(classifier));

        let image = image::RgbImage::from_pixel(32, 32, image::Rgb([200, 40, 40]));
        let mut bytes = std::io::Cursor::new(Vec::new());
        image.write_to(&mut bytes, image::ImageFormat::Jpeg).unwrap();
        let bytes = bytes.into_inner();

        let first = predictor.predict(&bytes).unwrap();
        let second = predictor.predict(&bytes).unwrap();
        assert_eq!(first, second);
        assert!(predictor.labels().contains(&first.label));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn undecodable_bytes_never_reach_the_classifier() {
        let descriptor = ModelDescriptor::from_yaml(SAMPLE).unwrap();
        let (classifier, calls) = RednessClassifier::new(descriptor.num_classes());
        let predictor = Predictor::new(descriptor, Box::new(classifier));

        let err = predictor.predict(b"not an image").unwrap_err();
        assert!(matches!(err, PredictError::Decode(_)));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }
}
