pub mod buckets;
pub mod file_id;
pub mod file_service;
pub mod listing;
pub mod local_store;
pub mod memory_store;
pub mod object_store;
pub mod upload;
