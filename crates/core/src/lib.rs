pub mod collab;
pub mod config;
pub mod error;
pub mod event_bus;
pub mod session;
pub mod types;

pub use config::AppConfig;
pub use error::{EngineError, EngineResult};
