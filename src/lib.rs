#![forbid(unsafe_code)]

pub mod config;
pub mod desktop;
pub mod errors;
pub mod ipc;
pub mod operations;
pub mod process;
pub mod registry;
pub mod runtime;
pub mod ui;

pub use config::RuntimeConfig;
pub use errors::{AppError, Result};
