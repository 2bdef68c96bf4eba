pub mod auth_service;
pub mod chunk_store;
pub mod content_store;
pub mod ledger;
pub mod object_service;
