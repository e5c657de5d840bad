//! Reactor transport for MQTT clients
//!
//! This module connects an MQTT client library that owns its socket to a
//! single-threaded event loop that owns readiness notification and timers.

pub mod adapter;
pub mod client;
pub mod primitive;
pub mod reactor;
pub mod socket;

pub use adapter::SocketAdapter;
pub use client::{ConnectionStatus, ManagedClient};
pub use primitive::{MqttPrimitive, MqttStatus, SocketCallbacks};
pub use reactor::{same_descriptor, Descriptor, Reactor, RepeatingTask, TimerId};
pub use socket::{checked_fileno, Socket, SocketRef, INVALID_DESCRIPTOR};
