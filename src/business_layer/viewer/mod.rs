pub mod chunk_fetcher;
pub mod decode_buffer;
pub mod delivery_engine;

pub use chunk_fetcher::{ChunkDownloader, DeliveryMode, HttpChunkSource, ReqwestChunkSource};
pub use decode_buffer::{DecodeBuffer, TimelineBuffer};
pub use delivery_engine::{EngineSettings, EngineStats, ViewerDeliveryEngine, ViewerEvent};
