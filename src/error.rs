use thiserror::Error;

/// Failures that end a counting invocation.
///
/// Recoverable conditions (tracker fallback, malformed boxes, sink write errors) never surface
/// here; they are logged where they happen.
#[derive(Debug, Error)]
pub enum CountError {
    #[error("cannot open video source {source_name}: {reason}")]
    VideoOpen { source_name: String, reason: String },
    #[error("class id {class_id} is outside the class table ({table_len} entries)")]
    UnknownClass { class_id: u32, table_len: usize },
    #[error("invalid counting options: {message}")]
    InvalidOptions { message: String },
    #[error("counting cancelled after {frames} frames")]
    Cancelled { frames: u64 },
    #[error("detector failed on frame {frame_index}: {source}")]
    Detector {
        frame_index: u64,
        #[source]
        source: anyhow::Error,
    },
    #[error("count snapshot inconsistent: total {total} != class sum {class_sum}")]
    Inconsistent { total: u64, class_sum: u64 },
}

impl CountError {
    /// Stable snake_case code for responses and logs.
    pub fn kind(&self) -> &'static str {
        match self {
            CountError::VideoOpen { .. } => "video_open",
            CountError::UnknownClass { .. } => "unknown_class",
            CountError::InvalidOptions { .. } => "invalid_options",
            CountError::Cancelled { .. } => "cancelled",
            CountError::Detector { .. } => "detector",
            CountError::Inconsistent { .. } => "inconsistent",
        }
    }

    pub fn video_open(source_name: impl Into<String>, reason: impl std::fmt::Display) -> Self {
        CountError::VideoOpen {
            source_name: source_name.into(),
            reason: reason.to_string(),
        }
    }

    pub(crate) fn invalid(message: impl Into<String>) -> Self {
        CountError::InvalidOptions {
            message: message.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kinds_are_stable_codes() {
        let err = CountError::UnknownClass {
            class_id: 7,
            table_len: 2,
        };
        assert_eq!(err.kind(), "unknown_class");
        assert!(err.to_string().contains("class id 7"));

        let err = CountError::video_open("missing.mp4", "no such file");
        assert_eq!(err.kind(), "video_open");
        assert!(err.to_string().contains("missing.mp4"));
    }
}
