pub mod content_type;
pub mod log_error;
