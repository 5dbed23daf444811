use shared::UnknownCategoryPolicy;
use std::path::PathBuf;
use std::str::FromStr;

const DEFAULT_PORT: u16 = 8081;
const DEFAULT_MAX_UPLOAD_BYTES: usize = 10 * 1024 * 1024;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid value for {key}: '{value}'")]
    InvalidValue { key: &'static str, value: String },
}

#[derive(Debug, Clone)]
pub struct Settings {
    pub bind_address: String,
    pub port: u16,
    pub model_descriptor: PathBuf,
    pub nutrition_table: Option<PathBuf>,
    pub scratch_dir: PathBuf,
    pub static_dir: PathBuf,
    pub max_upload_bytes: usize,
    pub max_concurrent_inferences: usize,
    pub unknown_category_policy: UnknownCategoryPolicy,
}

impl Settings {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_source(|key| std::env::var(key).ok())
    }

    pub fn from_source<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let default_workers = std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(1);

        let max_concurrent_inferences = parse_or(&get, "MAX_CONCURRENT_INFERENCES", default_workers)?;
        if max_concurrent_inferences == 0 {
            return Err(ConfigError::InvalidValue {
                key: "MAX_CONCURRENT_INFERENCES",
                value: "0".into(),
            });
        }
        let max_upload_bytes = parse_or(&get, "MAX_UPLOAD_BYTES", DEFAULT_MAX_UPLOAD_BYTES)?;
        if max_upload_bytes == 0 {
            return Err(ConfigError::InvalidValue {
                key: "MAX_UPLOAD_BYTES",
                value: "0".into(),
            });
        }

        Ok(Self {
            bind_address: get("BIND_ADDRESS").unwrap_or_else(|| "0.0.0.0".to_string()),
            port: parse_or(&get, "PORT", DEFAULT_PORT)?,
            model_descriptor: get("MODEL_DESCRIPTOR")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("config/model.yaml")),
            nutrition_table: get("NUTRITION_TABLE").map(PathBuf::from),
            scratch_dir: get("SCRATCH_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(std::env::temp_dir),
            static_dir: get("STATIC_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from(concat!(env!("CARGO_MANIFEST_DIR"), "/static"))),
            max_upload_bytes,
            max_concurrent_inferences,
            unknown_category_policy: parse_or(&get, "UNKNOWN_CATEGORY_POLICY", UnknownCategoryPolicy::default())?,
        })
    }

    pub fn socket_address(&self) -> String {
        format!("{}:{}", self.bind_address, self.port)
    }
}

fn parse_or<T, G>(get: &G, key: &'static str, default: T) -> Result<T, ConfigError>
where
    T: FromStr,
    G: Fn(&str) -> Option<String>,
{
    match get(key) {
        Some(value) => value
            .trim()
            .parse()
            .map_err(|_| ConfigError::InvalidValue { key, value }),
        None => Ok(default),
    }
}
