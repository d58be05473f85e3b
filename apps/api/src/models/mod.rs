pub mod candidate;
pub mod connection;
pub mod mapping;
pub mod transaction;
