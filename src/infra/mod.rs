//! Infrastructure adapters and runtime bootstrap.

pub mod auth;
pub mod db;
pub mod error;
pub mod http;
pub mod memory;
pub mod revalidate;
pub mod storage;
pub mod telemetry;
