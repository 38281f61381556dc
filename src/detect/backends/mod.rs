use anyhow::{anyhow, Result};

use crate::config::ModelConfig;
use crate::detect::backend::DetectorBackend;

pub mod scripted;

#[cfg(feature = "backend-tract")]
pub mod tract;

pub use scripted::ScriptedBackend;

#[cfg(feature = "backend-tract")]
pub use tract::TractBackend;

/// Build the backend named by `model.backend`.
pub fn build_backend(model: &ModelConfig) -> Result<Box<dyn DetectorBackend>> {
    match model.backend.as_str() {
        "scripted" => {
            let path = model
                .path
                .as_ref()
                .ok_or_else(|| anyhow!("scripted backend requires model.path (JSON script)"))?;
            Ok(Box::new(ScriptedBackend::from_json_file(path)?))
        }
        "tract" => build_tract(model),
        other => Err(anyhow!("unknown detector backend: {}", other)),
    }
}

#[cfg(feature = "backend-tract")]
fn build_tract(model: &ModelConfig) -> Result<Box<dyn DetectorBackend>> {
    let path = model
        .path
        .as_ref()
        .ok_or_else(|| anyhow!("tract backend requires model.path (ONNX file)"))?;
    let backend = TractBackend::new(path, model.input_width, model.input_height)?.with_iou(model.iou);
    Ok(Box::new(backend))
}

#[cfg(not(feature = "backend-tract"))]
fn build_tract(_model: &ModelConfig) -> Result<Box<dyn DetectorBackend>> {
    Err(anyhow!(
        "tract backend not built; rebuild with --features backend-tract"
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_backend_is_rejected() {
        let model = ModelConfig {
            backend: "opencv".to_string(),
            ..ModelConfig::default()
        };
        assert!(build_backend(&model).is_err());
    }

    #[test]
    fn scripted_backend_needs_a_path() {
        let model = ModelConfig {
            backend: "scripted".to_string(),
            path: None,
            ..ModelConfig::default()
        };
        assert!(build_backend(&model).is_err());
    }
}
