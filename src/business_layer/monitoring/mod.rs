pub mod metrics_collector;
pub mod metrics_types;

pub use metrics_collector::MetricsCollector;
pub use metrics_types::{ChunkReport, DistributionMetrics};
