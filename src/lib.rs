//! MQTT Reactor Bridge
//!
//! Drives an MQTT client library that owns its own socket from an external
//! single-threaded event loop.
//!
//! # Overview
//!
//! - [`SocketAdapter`] turns readiness notifications into `loop_read` /
//!   `loop_write` calls and a repeating timer into `loop_misc` calls, and
//!   keeps the event loop's registrations in step with the socket lifecycle
//! - [`ManagedClient`] wraps the MQTT primitive, gives every connect call a
//!   fresh adapter and reports a tri-state [`ConnectionStatus`]
//! - [`BridgeConfig`] loads adapter, broker and logging settings from TOML
//!
//! # Quick Start
//!
//! ```rust
//! use mqtt_reactor::testing::{ManualReactor, MockMqttClient};
//! use mqtt_reactor::{ConnectionStatus, ManagedClient};
//! use std::rc::Rc;
//! use std::time::Duration;
//!
//! let reactor = Rc::new(ManualReactor::new());
//! let client = ManagedClient::new(MockMqttClient::new().with_auto_open(7), Rc::clone(&reactor));
//!
//! client.connect("broker.example", 1883, 60, "").unwrap();
//! assert_eq!(client.connection_status(), ConnectionStatus::Connected);
//! assert_eq!(client.descriptor(), 7);
//!
//! // housekeeping ran once on open; the reactor now drives the rest
//! assert_eq!(client.misc_calls(), 1);
//! reactor.notify_readable();
//! reactor.advance(Duration::from_millis(1500));
//! assert_eq!(client.misc_calls(), 2);
//! ```

#[cfg(not(unix))]
compile_error!("mqtt-reactor needs unix file descriptors");

pub mod config;
pub mod error;
pub mod observability;
pub mod testing;
pub mod transport;

pub use config::{
    AdapterSection, BridgeConfig, BrokerSection, ConfigError, ConnectMode, LoggingSection,
};
pub use error::{BridgeError, BridgeResult};
pub use transport::{
    ConnectionStatus, Descriptor, ManagedClient, MqttPrimitive, MqttStatus, Reactor,
    SocketAdapter, SocketCallbacks, TimerId, INVALID_DESCRIPTOR,
};
