use serde::Serialize;

use crate::detect::{Detection, Point};

/// How detections are mapped to deduplication keys for one invocation.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum IdentityPolicy {
    /// The tracker supplies ids. A detection it left without one falls back to its positional
    /// identity.
    Tracked,
    /// No tracker. Every identity is positional, so it changes every frame.
    PositionalFallback,
}

/// Deduplication key for a counted object.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum ObjectIdentity {
    Tracked(u64),
    Positional {
        class_name: String,
        x: i32,
        y: i32,
        frame_index: u64,
    },
}

impl IdentityPolicy {
    pub fn identify(
        &self,
        detection: &Detection,
        class_name: &str,
        center: Point,
        frame_index: u64,
    ) -> ObjectIdentity {
        match (self, detection.track_id) {
            (IdentityPolicy::Tracked, Some(track_id)) => ObjectIdentity::Tracked(track_id),
            _ => ObjectIdentity::Positional {
                class_name: class_name.to_string(),
                x: center.x,
                y: center.y,
                frame_index,
            },
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            IdentityPolicy::Tracked => "tracked",
            IdentityPolicy::PositionalFallback => "positional_fallback",
        }
    }
}
