pub mod monitoring;
pub mod streaming;
pub mod viewer;
