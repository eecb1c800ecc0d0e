pub mod cache;
pub mod fs;
pub mod store;
