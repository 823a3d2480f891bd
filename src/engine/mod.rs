// FOTA Engine - Core module structure
pub mod error;
pub mod config;
pub mod registry;
pub mod blobs;
pub mod upload;
pub mod records;
pub mod protocol;
pub mod auth;
pub mod api;
pub mod cli;

pub use config::Config;
pub use error::FotaError;
pub use protocol::UpdateEngine;
