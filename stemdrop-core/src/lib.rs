pub mod config;
pub mod content_type;
pub mod link_import;
pub mod retry;
pub mod transport;
pub mod upload;
