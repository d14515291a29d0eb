pub mod blob_handlers;
pub mod extract;
pub mod file_handlers;
pub mod health_handlers;
pub mod share_handlers;
pub mod views;
