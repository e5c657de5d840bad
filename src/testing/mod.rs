//! Testing utilities and mock implementations
//!
//! This module provides mock implementations for exercising the socket
//! adapter without an MQTT broker, a network or a real event loop.

pub mod mocks;

pub use mocks::*;
