pub mod access_guard;
pub mod file_service;
pub mod key_resolver;
