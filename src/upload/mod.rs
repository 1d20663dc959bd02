// Upload pipeline - staging, content sniffing and batch registration
mod core;
mod error;
mod handlers;
pub mod sniff;
mod types;

pub use core::{StagingFile, UploadPipeline, discard_all};
pub use error::UploadError;
pub use handlers::upload_handler;
pub use types::*;
