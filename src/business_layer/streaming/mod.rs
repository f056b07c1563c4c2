pub mod chunk_types;
pub mod manifest_store;
pub mod segment_distributor;
pub mod session_tracker;

pub use chunk_types::ChunkDescriptor;
pub use manifest_store::{ManifestError, ManifestStore};
pub use segment_distributor::{DistributorSettings, SegmentDistributor};
pub use session_tracker::SessionTracker;
