use anyhow::{anyhow, Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

use crate::counter::CountOptions;
use crate::detect::TrackerConfig;

const DEFAULT_DB_PATH: &str = "counter.db";
const DEFAULT_CLASSES_PATH: &str = "data.yaml";
const DEFAULT_BACKEND: &str = "tract";
const DEFAULT_INPUT_SIZE: u32 = 640;
const DEFAULT_MIN_CONFIDENCE: f32 = 0.3;
const DEFAULT_NMS_IOU: f32 = 0.7;
const DEFAULT_TOLERANCE: i32 = 5;
const DEFAULT_FRAME_SKIP: u32 = 1;
const DEFAULT_API_ADDR: &str = "127.0.0.1:8800";
const DEFAULT_MAX_UPLOAD_BYTES: u64 = 256 * 1024 * 1024;

#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct CounterConfigFile {
    db_path: Option<String>,
    classes_path: Option<PathBuf>,
    model: Option<ModelConfigFile>,
    counting: Option<CountingConfigFile>,
    tracker: Option<TrackerConfigFile>,
    api: Option<ApiConfigFile>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct ModelConfigFile {
    backend: Option<String>,
    path: Option<PathBuf>,
    input_width: Option<u32>,
    input_height: Option<u32>,
    min_confidence: Option<f32>,
    iou: Option<f32>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct CountingConfigFile {
    line_y: Option<i32>,
    tolerance: Option<i32>,
    frame_skip: Option<u32>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct TrackerConfigFile {
    iou_threshold: Option<f32>,
    max_missing: Option<u64>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct ApiConfigFile {
    addr: Option<String>,
    max_upload_bytes: Option<u64>,
    upload_dir: Option<PathBuf>,
}

#[derive(Debug, Clone)]
pub struct CounterConfig {
    pub db_path: String,
    pub classes_path: PathBuf,
    pub model: ModelConfig,
    pub counting: CountingSettings,
    pub tracker: TrackerConfig,
    pub api: ApiSettings,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ModelConfig {
    /// `"tract"` (ONNX) or `"scripted"` (JSON detection script).
    pub backend: String,
    pub path: Option<PathBuf>,
    pub input_width: u32,
    pub input_height: u32,
    pub min_confidence: f32,
    /// IoU above which same-class boxes are merged by NMS.
    pub iou: f32,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            backend: DEFAULT_BACKEND.to_string(),
            path: None,
            input_width: DEFAULT_INPUT_SIZE,
            input_height: DEFAULT_INPUT_SIZE,
            min_confidence: DEFAULT_MIN_CONFIDENCE,
            iou: DEFAULT_NMS_IOU,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct CountingSettings {
    pub line_y: Option<i32>,
    pub tolerance: i32,
    pub frame_skip: u32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ApiSettings {
    pub addr: String,
    pub max_upload_bytes: u64,
    /// Where uploads are staged while they are counted; the system temp dir when unset.
    pub upload_dir: Option<PathBuf>,
}

impl CounterConfig {
    pub fn load() -> Result<Self> {
        let config_path = std::env::var("COUNTER_CONFIG").ok();
        let file_cfg = match config_path.as_deref() {
            Some(path) if !path.trim().is_empty() => Some(read_config_file(Path::new(path))?),
            _ => None,
        };
        let mut cfg = Self::from_file(file_cfg.unwrap_or_default());
        cfg.apply_env()?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Parse a TOML document on top of the defaults, without consulting the environment.
    pub fn from_toml(raw: &str) -> Result<Self> {
        let file: CounterConfigFile = toml::from_str(raw)?;
        let cfg = Self::from_file(file);
        cfg.validate()?;
        Ok(cfg)
    }

    fn from_file(file: CounterConfigFile) -> Self {
        let model_file = file.model.unwrap_or_default();
        let counting_file = file.counting.unwrap_or_default();
        let tracker_file = file.tracker.unwrap_or_default();
        let api_file = file.api.unwrap_or_default();
        let tracker_default = TrackerConfig::default();

        Self {
            db_path: file.db_path.unwrap_or_else(|| DEFAULT_DB_PATH.to_string()),
            classes_path: file
                .classes_path
                .unwrap_or_else(|| PathBuf::from(DEFAULT_CLASSES_PATH)),
            model: ModelConfig {
                backend: model_file
                    .backend
                    .unwrap_or_else(|| DEFAULT_BACKEND.to_string()),
                path: model_file.path,
                input_width: model_file.input_width.unwrap_or(DEFAULT_INPUT_SIZE),
                input_height: model_file.input_height.unwrap_or(DEFAULT_INPUT_SIZE),
                min_confidence: model_file.min_confidence.unwrap_or(DEFAULT_MIN_CONFIDENCE),
                iou: model_file.iou.unwrap_or(DEFAULT_NMS_IOU),
            },
            counting: CountingSettings {
                line_y: counting_file.line_y,
                tolerance: counting_file.tolerance.unwrap_or(DEFAULT_TOLERANCE),
                frame_skip: counting_file.frame_skip.unwrap_or(DEFAULT_FRAME_SKIP),
            },
            tracker: TrackerConfig {
                iou_threshold: tracker_file
                    .iou_threshold
                    .unwrap_or(tracker_default.iou_threshold),
                max_missing: tracker_file
                    .max_missing
                    .unwrap_or(tracker_default.max_missing),
            },
            api: ApiSettings {
                addr: api_file
                    .addr
                    .unwrap_or_else(|| DEFAULT_API_ADDR.to_string()),
                max_upload_bytes: api_file
                    .max_upload_bytes
                    .unwrap_or(DEFAULT_MAX_UPLOAD_BYTES),
                upload_dir: api_file.upload_dir,
            },
        }
    }

    fn apply_env(&mut self) -> Result<()> {
        if let Some(path) = env_nonempty("COUNTER_DB_PATH") {
            self.db_path = path;
        }
        if let Some(path) = env_nonempty("COUNTER_CLASSES") {
            self.classes_path = PathBuf::from(path);
        }
        if let Some(path) = env_nonempty("COUNTER_MODEL") {
            self.model.path = Some(PathBuf::from(path));
        }
        if let Some(backend) = env_nonempty("COUNTER_BACKEND") {
            self.model.backend = backend;
        }
        if let Some(addr) = env_nonempty("COUNTER_API_ADDR") {
            self.api.addr = addr;
        }
        if let Some(dir) = env_nonempty("COUNTER_UPLOAD_DIR") {
            self.api.upload_dir = Some(PathBuf::from(dir));
        }
        if let Some(tolerance) = env_nonempty("COUNTER_TOLERANCE") {
            self.counting.tolerance = tolerance
                .parse()
                .map_err(|_| anyhow!("COUNTER_TOLERANCE must be an integer number of pixels"))?;
        }
        if let Some(skip) = env_nonempty("COUNTER_FRAME_SKIP") {
            self.counting.frame_skip = skip
                .parse()
                .map_err(|_| anyhow!("COUNTER_FRAME_SKIP must be a positive integer"))?;
        }
        Ok(())
    }

    fn validate(&self) -> Result<()> {
        self.count_options()
            .validate()
            .map_err(|err| anyhow!("{}", err))?;
        if !matches!(self.model.backend.as_str(), "tract" | "scripted") {
            return Err(anyhow!(
                "model.backend must be \"tract\" or \"scripted\", got {:?}",
                self.model.backend
            ));
        }
        if self.model.input_width == 0 || self.model.input_height == 0 {
            return Err(anyhow!("model input size must be non-zero"));
        }
        if !(self.model.iou > 0.0 && self.model.iou <= 1.0) {
            return Err(anyhow!("model.iou must be in (0, 1]"));
        }
        if !(self.tracker.iou_threshold > 0.0 && self.tracker.iou_threshold <= 1.0) {
            return Err(anyhow!("tracker.iou_threshold must be in (0, 1]"));
        }
        if self.api.max_upload_bytes == 0 {
            return Err(anyhow!("api.max_upload_bytes must be greater than zero"));
        }
        Ok(())
    }

    pub fn count_options(&self) -> CountOptions {
        CountOptions {
            line_y: self.counting.line_y,
            tolerance: self.counting.tolerance,
            frame_skip: self.counting.frame_skip,
            min_confidence: self.model.min_confidence,
        }
    }
}

fn env_nonempty(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|value| !value.trim().is_empty())
}

fn read_config_file(path: &Path) -> Result<CounterConfigFile> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read config file {}", path.display()))?;
    let cfg = toml::from_str(&raw)
        .map_err(|e| anyhow!("invalid config file {}: {}", path.display(), e))?;
    Ok(cfg)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_document_yields_defaults() -> Result<()> {
        let cfg = CounterConfig::from_toml("")?;
        assert_eq!(cfg.db_path, DEFAULT_DB_PATH);
        assert_eq!(cfg.model, ModelConfig::default());
        assert_eq!(cfg.count_options(), CountOptions::default());
        assert_eq!(cfg.tracker, TrackerConfig::default());
        assert_eq!(cfg.api.addr, DEFAULT_API_ADDR);
        Ok(())
    }

    #[test]
    fn nested_sections_override_defaults() -> Result<()> {
        let cfg = CounterConfig::from_toml(
            r#"
            classes_path = "rice.yaml"

            [model]
            backend = "scripted"
            path = "script.json"
            min_confidence = 0.5

            [counting]
            line_y = 120
            frame_skip = 3
            "#,
        )?;
        assert_eq!(cfg.classes_path, PathBuf::from("rice.yaml"));
        assert_eq!(cfg.model.backend, "scripted");
        let options = cfg.count_options();
        assert_eq!(options.line_y, Some(120));
        assert_eq!(options.frame_skip, 3);
        assert_eq!(options.tolerance, DEFAULT_TOLERANCE);
        assert_eq!(options.min_confidence, 0.5);
        Ok(())
    }

    #[test]
    fn invalid_values_are_rejected() {
        assert!(CounterConfig::from_toml("[counting]\nframe_skip = 0").is_err());
        assert!(CounterConfig::from_toml("[counting]\ntolerance = -2").is_err());
        assert!(CounterConfig::from_toml("[model]\nbackend = \"opencv\"").is_err());
        assert!(CounterConfig::from_toml("[model]\nmin_confidence = 1.5").is_err());
        assert!(CounterConfig::from_toml("unknown_key = 1").is_err());
    }
}
