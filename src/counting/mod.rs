//! Line-crossing counting core.
//!
//! One [`CountingState`] exists per invocation. It consumes detections frame by frame, counts
//! every identity whose box centre falls inside the tolerance band of the [`CountingLine`] at
//! most once, and is consumed by [`CountingState::finish`] into an immutable [`CountSnapshot`].
//!
//! The state never touches pixels, decoders or models; the counter loop feeds it.

mod identity;
mod line;
mod snapshot;
mod state;

pub use identity::{IdentityPolicy, ObjectIdentity};
pub use line::CountingLine;
pub use snapshot::CountSnapshot;
pub use state::{CountStats, CountingState, FrameOutcome};
