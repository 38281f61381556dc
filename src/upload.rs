//! Upload boundary: one video in, one persisted count document out.
//!
//! Each upload gets a fresh v4 UUID, is staged to a temporary file that is removed on every
//! exit path, and is counted with the service's `CounterContext`. Only a successful count is
//! written to the result store.

use std::io::Write;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::counter::{CancelFlag, CountOptions, CounterContext};
use crate::error::CountError;
use crate::storage::{CountDocument, ResultStore};

pub const STATUS_PROCESSED: &str = "processed";

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploadResponse {
    pub status: String,
    pub video_id: String,
    pub results: CountDocument,
}

#[derive(Debug, Error)]
pub enum UploadError {
    #[error("upload is empty")]
    Empty,
    #[error(transparent)]
    Count(#[from] CountError),
    #[error("failed to stage upload: {0:#}")]
    Staging(anyhow::Error),
    #[error("failed to persist result: {0:#}")]
    Store(anyhow::Error),
}

impl UploadError {
    pub fn kind(&self) -> &'static str {
        match self {
            UploadError::Empty => "empty_upload",
            UploadError::Count(err) => err.kind(),
            UploadError::Staging(_) => "staging",
            UploadError::Store(_) => "store",
        }
    }
}

pub struct UploadService {
    context: CounterContext,
    store: Box<dyn ResultStore>,
    options: CountOptions,
    upload_dir: Option<PathBuf>,
}

impl UploadService {
    pub fn new(context: CounterContext, store: Box<dyn ResultStore>, options: CountOptions) -> Self {
        Self {
            context,
            store,
            options,
            upload_dir: None,
        }
    }

    pub fn with_upload_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.upload_dir = Some(dir.into());
        self
    }

    /// Count one uploaded video. `filename` only contributes its extension to the staged file.
    pub fn process(
        &mut self,
        bytes: &[u8],
        filename: Option<&str>,
        cancel: &CancelFlag,
    ) -> Result<UploadResponse, UploadError> {
        if bytes.is_empty() {
            return Err(UploadError::Empty);
        }
        let video_id = Uuid::new_v4().to_string();
        let staged = self.stage(&video_id, bytes, filename)?;
        let path = staged
            .path()
            .to_str()
            .ok_or_else(|| UploadError::Staging(anyhow::anyhow!("staging path is not UTF-8")))?
            .to_string();

        log::info!("upload {}: {} bytes staged at {}", video_id, bytes.len(), path);
        let counted = self.context.count(&path, &self.options, None, cancel);
        if let Err(err) = staged.close() {
            log::warn!("upload {}: failed to remove staged file: {}", video_id, err);
        }
        let report = counted.map_err(|err| {
            log::warn!("upload {} rejected: {}", video_id, err);
            err
        })?;

        let results = CountDocument::from(&report.snapshot);
        self.store
            .put(&video_id, &results)
            .map_err(UploadError::Store)?;
        log::info!(
            "upload {}: stored total_count={}",
            video_id,
            results.total_count
        );
        Ok(UploadResponse {
            status: STATUS_PROCESSED.to_string(),
            video_id,
            results,
        })
    }

    /// Stored result for a previous upload.
    pub fn result(&mut self, video_id: &str) -> anyhow::Result<Option<CountDocument>> {
        self.store.get(video_id)
    }

    fn stage(
        &self,
        video_id: &str,
        bytes: &[u8],
        filename: Option<&str>,
    ) -> Result<tempfile::NamedTempFile, UploadError> {
        let suffix = filename
            .and_then(|name| Path::new(name).extension())
            .and_then(|ext| ext.to_str())
            .filter(|ext| ext.chars().all(|c| c.is_ascii_alphanumeric()))
            .map(|ext| format!(".{}", ext))
            .unwrap_or_else(|| ".mp4".to_string());
        let prefix = format!("{}-", video_id);
        let mut builder = tempfile::Builder::new();
        builder.prefix(&prefix).suffix(&suffix);
        let staged = match &self.upload_dir {
            Some(dir) => builder.tempfile_in(dir),
            None => builder.tempfile(),
        };
        let mut staged = staged.map_err(|err| UploadError::Staging(err.into()))?;
        staged
            .write_all(bytes)
            .and_then(|_| staged.flush())
            .map_err(|err| UploadError::Staging(err.into()))?;
        Ok(staged)
    }
}
