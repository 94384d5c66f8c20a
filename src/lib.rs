pub mod analytics;
pub mod app;
pub mod assignment;
pub mod automation;
pub mod cli;
pub mod config;
pub mod error;
pub mod process;
pub mod simulator;
pub mod store;
pub mod ui;

pub use error::{FluxoError, Result};
