pub mod durable_store;
pub mod s3_client;
pub mod s3_types;

pub use durable_store::{object_key, DurableStore};
pub use s3_client::S3ClientWrapper;
