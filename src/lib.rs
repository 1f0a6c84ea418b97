pub mod app;
pub mod backend;
pub mod cli;
pub mod config;
pub mod error;
pub mod highlight;
pub mod model;
pub mod pantry;
pub mod ui;

pub use config::{AppConfig, ConfigLoader, ConfigPaths};
pub use error::{BackendError, BackendResult};
pub use pantry::Pantry;
