mod adapter;
mod backend;
pub mod backends;
mod result;
mod tracker;

pub use adapter::{FrameResult, FrameStream};
pub use backend::DetectorBackend;
pub use backends::{build_backend, ScriptedBackend};
pub use result::{suppress_overlaps, BoundingBox, Detection, Point};
pub use tracker::{IouTracker, PassthroughTracker, Tracker, TrackerConfig};

#[cfg(feature = "backend-tract")]
pub use backends::TractBackend;
