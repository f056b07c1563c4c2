pub mod processed;
pub mod segment_watcher;

pub use processed::ProcessedSegments;
pub use segment_watcher::{DetectedSegment, SegmentWatcher};
