pub mod codec;
pub mod config;
pub mod executor;
pub mod job;
pub mod session;
