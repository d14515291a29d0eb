pub mod access;
pub mod blob_store;
pub mod database;
pub mod file_error;
pub mod file_service;
pub mod share_service;
pub mod tree_store;
