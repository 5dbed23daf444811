use actix_web::http::StatusCode;
use actix_web::web;
use sha2::{Digest, Sha256};
use shared::UnknownCategoryPolicy;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::Semaphore;
use uuid::Uuid;

use crate::inference::model::{ClassificationResult, PredictError, Predictor};
use crate::inference::preprocess::DecodeError;
use crate::intake::{IntakeError, IntakeLimits, Upload, DEFAULT_QUANTITY_GRAMS};
use crate::nutrition::table::{NutritionTable, UnknownCategory};
use crate::report::{RenderError, Report, ReportRenderer};

#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error(transparent)]
    InvalidInput(IntakeError),
    #[error(transparent)]
    Decode(#[from] DecodeError),
    #[error("Configuration error: {0}")]
    Configuration(String),
    #[error(transparent)]
    UnknownCategory(#[from] UnknownCategory),
    #[error("Inference failed: {0}")]
    Inference(String),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Worker pool error: {0}")]
    Worker(String),
    #[error(transparent)]
    Render(#[from] RenderError),
}

impl From<IntakeError> for PipelineError {
    fn from(err: IntakeError) -> Self {
        match err {
            IntakeError::Io(e) => PipelineError::Io(e),
            other => PipelineError::InvalidInput(other),
        }
    }
}

impl From<PredictError> for PipelineError {
    fn from(err: PredictError) -> Self {
        match err {
            PredictError::Decode(e) => PipelineError::Decode(e),
            PredictError::Io(e) => PipelineError::Io(e),
            PredictError::Inference(e) => PipelineError::Inference(e.to_string()),
            mismatch @ PredictError::OutputMismatch { .. } => {
                PipelineError::Configuration(mismatch.to_string())
            }
        }
    }
}

impl PipelineError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            PipelineError::InvalidInput(IntakeError::FileTooLarge(_)) => StatusCode::PAYLOAD_TOO_LARGE,
            PipelineError::InvalidInput(_) => StatusCode::BAD_REQUEST,
            PipelineError::Decode(_) => StatusCode::UNPROCESSABLE_ENTITY,
            PipelineError::UnknownCategory(_) => StatusCode::NOT_FOUND,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn title(&self) -> &'static str {
        match self {
            PipelineError::InvalidInput(_) => "Invalid upload",
            PipelineError::Decode(_) => "Unreadable image",
            PipelineError::UnknownCategory(_) => "Unknown food",
            _ => "Something went wrong",
        }
    }

    /// Message safe to show to the client.
    pub fn public_message(&self) -> String {
        if self.status_code().is_server_error() {
            "The image could not be analysed. Please try again later.".to_string()
        } else {
            self.to_string()
        }
    }

    pub fn log(&self, request_id: &Uuid) {
        match self {
            PipelineError::Configuration(_) => {
                log::error!("[{}] {} (check model descriptor and labels)", request_id, self)
            }
            e if e.status_code().is_server_error() => log::error!("[{}] {}", request_id, e),
            e => log::warn!("[{}] {}", request_id, e),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Analysis {
    pub request_id: Uuid,
    pub classification: ClassificationResult,
    pub image_sha256: String,
    pub report: Report,
    pub generated_at: String,
}

/// Read-only state built at startup and shared by every request.
pub struct AppContext {
    pub predictor: Arc<Predictor>,
    pub table: NutritionTable,
    pub renderer: ReportRenderer,
    pub policy: UnknownCategoryPolicy,
    pub limits: IntakeLimits,
    inference_slots: Semaphore,
    started_at: Instant,
}

impl AppContext {
    pub fn new(
        predictor: Predictor,
        table: NutritionTable,
        renderer: ReportRenderer,
        policy: UnknownCategoryPolicy,
        limits: IntakeLimits,
        max_concurrent_inferences: usize,
    ) -> Self {
        Self {
            predictor: Arc::new(predictor),
            table,
            renderer,
            policy,
            limits,
            inference_slots: Semaphore::new(max_concurrent_inferences.max(1)),
            started_at: Instant::now(),
        }
    }

    pub fn uptime_seconds(&self) -> u64 {
        self.started_at.elapsed().as_secs()
    }

    /// Runs prediction and report assembly for an image already in scratch.
    ///
    /// The caller keeps `upload` alive until the response is built.
    pub async fn analyze(
        &self,
        upload: &Upload,
        fallback_quantity: Option<f64>,
        request_id: Uuid,
    ) -> Result<Analysis, PipelineError> {
        let quantity = upload
            .quantity
            .or(fallback_quantity)
            .unwrap_or(DEFAULT_QUANTITY_GRAMS);

        let (image_sha256, classification) = {
            let _permit = self
                .inference_slots
                .acquire()
                .await
                .map_err(|e| PipelineError::Worker(e.to_string()))?;

            let predictor = self.predictor.clone();
            let path = upload.image.path().to_path_buf();
            web::block(move || -> Result<(String, ClassificationResult), PredictError> {
                let bytes = std::fs::read(&path)?;
                let digest = hex::encode(Sha256::digest(&bytes));
                let result = predictor.predict(&bytes)?;
                Ok((digest, result))
            })
            .await
            .map_err(|e| PipelineError::Worker(e.to_string()))??
        };

        log::info!(
            "[{}] {} ({} bytes, sha256 {}) classified as '{}' (class {}) with confidence {:.3}",
            request_id,
            upload.image.original_name(),
            upload.image.size(),
            image_sha256,
            classification.label,
            classification.index,
            classification.confidence
        );

        let report = Report::build(&classification, &self.table, self.policy, quantity)?;

        Ok(Analysis {
            request_id,
            classification,
            image_sha256,
            report,
            generated_at: chrono::Utc::now().format("%Y-%m-%d %H:%M:%S UTC").to_string(),
        })
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::inference::descriptor::ModelDescriptor;
    use crate::inference::model::Classifier;

    pub(crate) const LABELS_YAML: &str = r#"
version: 1
format: onnx
model_path: unused.onnx
input: { width: 224, height: 224, channels: 3 }
normalization:
  mean: [0.485, 0.456, 0.406]
  std: [0.229, 0.224, 0.225]
labels: [apple, banana, durian]
"#;

    pub(crate) fn context(
        classifier: Box<dyn Classifier>,
        policy: UnknownCategoryPolicy,
        scratch_dir: &std::path::Path,
    ) -> AppContext {
        let descriptor = ModelDescriptor::from_yaml(LABELS_YAML).unwrap();
        let table = NutritionTable::from_yaml(
            r#"
version: 1
foods:
  apple: { calories: 52, protein: 0.3, fat: 0.2, carbohydrates: 13.8, serving: 182 }
  banana: { calories: 89, protein: 1.1, fat: 0.3, carbohydrates: 22.8 }
"#,
        )
        .unwrap();
        AppContext::new(
            Predictor::new(descriptor, classifier),
            table,
            ReportRenderer::new().unwrap(),
            policy,
            IntakeLimits {
                scratch_dir: scratch_dir.to_path_buf(),
                max_upload_bytes: 1024 * 1024,
            },
            2,
        )
    }

    #[test]
    fn error_taxonomy_maps_to_status_codes() {
        let invalid = PipelineError::from(IntakeError::UnsupportedExtension("a.gif".into()));
        assert_eq!(invalid.status_code(), StatusCode::BAD_REQUEST);

        let too_large = PipelineError::from(IntakeError::FileTooLarge(1024));
        assert_eq!(too_large.status_code(), StatusCode::PAYLOAD_TOO_LARGE);
        assert_eq!(too_large.title(), "Invalid upload");

        let mismatch = PipelineError::from(PredictError::OutputMismatch {
            outputs: 2,
            labels: 3,
        });
        assert!(matches!(mismatch, PipelineError::Configuration(_)));
        assert_eq!(mismatch.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
        assert!(!mismatch.public_message().contains("outputs"));

        let unknown = PipelineError::from(UnknownCategory("durian".into()));
        assert_eq!(unknown.status_code(), StatusCode::NOT_FOUND);
        assert!(unknown.public_message().contains("durian"));

        let io = PipelineError::from(IntakeError::Io(std::io::Error::other("disk full")));
        assert!(matches!(io, PipelineError::Io(_)));
    }
}
