//! Observability support: structured logging initialization.

pub mod logging;

pub use logging::{init_default_logging, init_logging, LogFormat};
