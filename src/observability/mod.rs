//! Observability for the reactor bridge
//!
//! Structured logging through `tracing`, with a span macro for adapter work.

pub mod logging;

// Re-export for convenience
pub use logging::{init_default_logging, init_from_config, init_logging, parse_level, LogFormat};

// Span macros for structured logging
pub use logging::adapter_span;
