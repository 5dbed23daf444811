use actix_multipart::Multipart;
use futures::{StreamExt, TryStreamExt};
use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;

pub const DEFAULT_QUANTITY_GRAMS: f64 = 100.0;
pub const MAX_QUANTITY_GRAMS: f64 = 5000.0;

#[derive(Debug, thiserror::Error)]
pub enum IntakeError {
    #[error("Unsupported file type '{0}': only JPG and PNG images are accepted")]
    UnsupportedExtension(String),
    #[error("No image was uploaded")]
    MissingFile,
    #[error("Only one image can be analysed per request")]
    MultipleFiles,
    #[error("The uploaded image is empty")]
    EmptyFile,
    #[error("The uploaded image exceeds {0} bytes")]
    FileTooLarge(usize),
    #[error("Invalid quantity '{0}': expected grams between 0 and 5000")]
    InvalidQuantity(String),
    #[error("Malformed upload: {0}")]
    Multipart(#[from] actix_multipart::MultipartError),
    #[error("Failed to write scratch file: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageKind {
    Jpeg,
    Png,
}

impl ImageKind {
    pub fn suffix(&self) -> &'static str {
        match self {
            ImageKind::Jpeg => ".jpg",
            ImageKind::Png => ".png",
        }
    }
}

pub fn validate_extension(filename: &str) -> Result<ImageKind, IntakeError> {
    let extension = Path::new(filename)
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase)
        .unwrap_or_default();

    match extension.as_str() {
        "jpg" | "jpeg" => Ok(ImageKind::Jpeg),
        "png" => Ok(ImageKind::Png),
        _ => Err(IntakeError::UnsupportedExtension(filename.to_string())),
    }
}

pub fn parse_quantity(raw: &str) -> Result<f64, IntakeError> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Ok(DEFAULT_QUANTITY_GRAMS);
    }
    match trimmed.replace(',', "").parse::<f64>() {
        Ok(q) if q.is_finite() && q > 0.0 && q <= MAX_QUANTITY_GRAMS => Ok(q),
        _ => Err(IntakeError::InvalidQuantity(raw.to_string())),
    }
}

/// An uploaded image held in the scratch directory.
///
/// The file is removed when this value is dropped.
#[derive(Debug)]
pub struct ScratchImage {
    file: NamedTempFile,
    original_name: String,
    size: usize,
}

impl ScratchImage {
    pub fn create(dir: &Path, original_name: &str, kind: ImageKind) -> Result<Self, IntakeError> {
        let file = tempfile::Builder::new()
            .prefix("nutriscan-")
            .suffix(kind.suffix())
            .tempfile_in(dir)?;
        Ok(Self {
            file,
            original_name: original_name.to_string(),
            size: 0,
        })
    }

    pub fn path(&self) -> &Path {
        self.file.path()
    }

    pub fn original_name(&self) -> &str {
        &self.original_name
    }

    pub fn size(&self) -> usize {
        self.size
    }

    fn append(&mut self, chunk: &[u8], limit: usize) -> Result<(), IntakeError> {
        if self.size + chunk.len() > limit {
            return Err(IntakeError::FileTooLarge(limit));
        }
        self.file.write_all(chunk)?;
        self.size += chunk.len();
        Ok(())
    }

    fn finish(mut self) -> Result<Self, IntakeError> {
        if self.size == 0 {
            return Err(IntakeError::EmptyFile);
        }
        self.file.flush()?;
        Ok(self)
    }
}

#[derive(Debug, Clone)]
pub struct IntakeLimits {
    pub scratch_dir: PathBuf,
    pub max_upload_bytes: usize,
}

#[derive(Debug)]
pub struct Upload {
    pub image: ScratchImage,
    pub quantity: Option<f64>,
}

/// Reads one image and an optional `quantity` field from a multipart body.
///
/// The filename is checked before anything is written to disk.
pub async fn receive(mut payload: Multipart, limits: &IntakeLimits) -> Result<Upload, IntakeError> {
    let mut image: Option<ScratchImage> = None;
    let mut quantity = None;

    while let Some(mut field) = payload.try_next().await? {
        let filename = field
            .content_disposition()
            .and_then(|cd| cd.get_filename())
            .filter(|name| !name.is_empty())
            .map(str::to_string);

        match filename {
            Some(filename) => {
                if image.is_some() {
                    return Err(IntakeError::MultipleFiles);
                }
                let kind = validate_extension(&filename)?;
                let mut scratch = ScratchImage::create(&limits.scratch_dir, &filename, kind)?;
                while let Some(chunk) = field.next().await {
                    let data = chunk?;
                    scratch.append(&data, limits.max_upload_bytes)?;
                }
                image = Some(scratch.finish()?);
            }
            None if field.name() == Some("quantity") => {
                let mut raw = Vec::new();
                while let Some(chunk) = field.next().await {
                    let data = chunk?;
                    if raw.len() + data.len() > 64 {
                        return Err(IntakeError::InvalidQuantity("<too long>".into()));
                    }
                    raw.extend_from_slice(&data);
                }
                let raw = String::from_utf8_lossy(&raw);
                quantity = Some(parse_quantity(&raw)?);
            }
            None => {
                // Unused fields, and file inputs submitted with no file chosen.
                while let Some(chunk) = field.next().await {
                    chunk?;
                }
            }
        }
    }

    let image = image.ok_or(IntakeError::MissingFile)?;
    Ok(Upload { image, quantity })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_allowed_extensions_case_insensitively() {
        assert_eq!(validate_extension("meal.jpg").unwrap(), ImageKind::Jpeg);
        assert_eq!(validate_extension("MEAL.JPEG").unwrap(), ImageKind::Jpeg);
        assert_eq!(validate_extension("snap.Png").unwrap(), ImageKind::Png);
    }

    #[test]
    fn rejects_other_extensions() {
        for name in ["cat.gif", "notes.txt", "noext", "", "archive.png.zip", ".png"] {
            assert!(
                matches!(validate_extension(name), Err(IntakeError::UnsupportedExtension(_))),
                "{} should be rejected",
                name
            );
        }
    }

    #[test]
    fn parses_quantity() {
        assert_eq!(parse_quantity("").unwrap(), DEFAULT_QUANTITY_GRAMS);
        assert_eq!(parse_quantity(" 250 ").unwrap(), 250.0);
        assert_eq!(parse_quantity("1,200").unwrap(), 1200.0);
        assert!(parse_quantity("0").is_err());
        assert!(parse_quantity("-5").is_err());
        assert!(parse_quantity("lots").is_err());
        assert!(parse_quantity("9000").is_err());
    }

    #[test]
    fn scratch_file_is_removed_on_drop() {
        let dir = tempfile::tempdir().unwrap();
        let mut scratch = ScratchImage::create(dir.path(), "lunch.png", ImageKind::Png).unwrap();
        scratch.append(b"12345", 1024).unwrap();
        let scratch = scratch.finish().unwrap();
        let path = scratch.path().to_path_buf();

        assert!(path.exists());
        assert_eq!(scratch.size(), 5);
        assert!(path.to_string_lossy().ends_with(".png"));
        drop(scratch);
        assert!(!path.exists());
    }

    #[test]
    fn scratch_enforces_size_limit() {
        let dir = tempfile::tempdir().unwrap();
        let mut scratch = ScratchImage::create(dir.path(), "big.jpg", ImageKind::Jpeg).unwrap();
        let err = scratch.append(&[0u8; 16], 8).unwrap_err();
        assert!(matches!(err, IntakeError::FileTooLarge(8)));
    }

    #[test]
    fn empty_upload_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let scratch = ScratchImage::create(dir.path(), "empty.jpg", ImageKind::Jpeg).unwrap();
        assert!(matches!(scratch.finish(), Err(IntakeError::EmptyFile)));
    }
}
