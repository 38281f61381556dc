//! Line-crossing object counter
//!
//! This crate counts objects in a stored video whose bounding-box centre passes through a band
//! around a horizontal counting line, deduplicated per object and broken down by class.
//!
//! # Pipeline
//!
//! Frame source → detector backend (+ tracker) → counting state machine → snapshot
//!
//! - Sources decode one video, in order, exactly once.
//! - Backends produce frame-local detections. When a tracker can be initialised the stream
//!   carries track ids and each id is counted at most once; otherwise every detection is keyed
//!   by its class, centre and frame index.
//! - The annotator renders the same detections for an optional frame sink and never feeds back
//!   into counting.
//!
//! # Module Structure
//!
//! - `counting`: counting line, identities, per-invocation state, snapshot
//! - `counter`: `CounterContext` and the per-invocation driver loop
//! - `detect`: detections, backends (scripted, tract), trackers, frame stream adapter
//! - `ingest`: frame sources (stub, y4m, ffmpeg)
//! - `annotate`: annotated frames and sinks
//! - `storage`, `upload`, `api`: result persistence and the HTTP upload boundary
//! - `config`, `classes`: settings and the class-name table

pub mod annotate;
pub mod api;
pub mod classes;
pub mod config;
pub mod counter;
pub mod counting;
pub mod detect;
pub mod error;
pub mod frame;
pub mod ingest;
pub mod storage;
pub mod upload;

pub use classes::ClassTable;
pub use counter::{CancelFlag, CountOptions, CountReport, CounterContext};
pub use counting::{CountSnapshot, CountingLine, IdentityPolicy};
pub use detect::{BoundingBox, Detection, DetectorBackend, ScriptedBackend};
pub use error::CountError;
pub use frame::{Frame, VideoInfo};
pub use storage::{CountDocument, InMemoryResultStore, ResultStore, SqliteResultStore};
pub use upload::{UploadError, UploadResponse, UploadService};
