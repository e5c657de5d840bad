//! The MQTT client primitive seen from the adapter's side
//!
//! The primitive implements MQTT itself: framing, QoS, session state. It is
//! written to poll its own socket, but exposes enough hooks for someone else
//! to do the polling:
//!
//! - four socket lifecycle callbacks delivered through [`SocketCallbacks`]
//! - non-blocking `loop_read` / `loop_write` entry points
//! - a `loop_misc` housekeeping entry point for keepalive and retries
//!
//! All calls happen on one thread. Callbacks may be delivered re-entrantly,
//! for example `on_socket_close` from inside `loop_read` when the broker
//! hangs up.

use super::socket::SocketRef;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::rc::Rc;

/// Result code of a non-blocking primitive operation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MqttStatus {
    Again,
    Success,
    NoMem,
    Protocol,
    Inval,
    NoConn,
    ConnRefused,
    NotFound,
    ConnLost,
    Tls,
    PayloadSize,
    NotSupported,
    Auth,
    AclDenied,
    Unknown,
    Errno,
    QueueSize,
    KeepAlive,
}

impl MqttStatus {
    /// Map a numeric result code onto a status; unrecognised codes become `Unknown`
    pub fn from_code(code: i32) -> Self {
        match code {
            -1 => Self::Again,
            0 => Self::Success,
            1 => Self::NoMem,
            2 => Self::Protocol,
            3 => Self::Inval,
            4 => Self::NoConn,
            5 => Self::ConnRefused,
            6 => Self::NotFound,
            7 => Self::ConnLost,
            8 => Self::Tls,
            9 => Self::PayloadSize,
            10 => Self::NotSupported,
            11 => Self::Auth,
            12 => Self::AclDenied,
            14 => Self::Errno,
            15 => Self::QueueSize,
            16 => Self::KeepAlive,
            _ => Self::Unknown,
        }
    }

    /// Numeric result code
    pub fn code(self) -> i32 {
        match self {
            Self::Again => -1,
            Self::Success => 0,
            Self::NoMem => 1,
            Self::Protocol => 2,
            Self::Inval => 3,
            Self::NoConn => 4,
            Self::ConnRefused => 5,
            Self::NotFound => 6,
            Self::ConnLost => 7,
            Self::Tls => 8,
            Self::PayloadSize => 9,
            Self::NotSupported => 10,
            Self::Auth => 11,
            Self::AclDenied => 12,
            Self::Unknown => 13,
            Self::Errno => 14,
            Self::QueueSize => 15,
            Self::KeepAlive => 16,
        }
    }

    pub fn is_success(self) -> bool {
        self == Self::Success
    }

    /// Human-readable description of the status
    pub fn description(self) -> &'static str {
        match self {
            Self::Again => "Resource temporarily unavailable.",
            Self::Success => "No error.",
            Self::NoMem => "Out of memory.",
            Self::Protocol => "A network protocol error occurred when communicating with the broker.",
            Self::Inval => "Invalid function arguments provided.",
            Self::NoConn => "The client is not currently connected.",
            Self::ConnRefused => "The connection was refused.",
            Self::NotFound => "Message not found (internal error).",
            Self::ConnLost => "The connection was lost.",
            Self::Tls => "A TLS error occurred.",
            Self::PayloadSize => "Payload too large.",
            Self::NotSupported => "This feature is not supported.",
            Self::Auth => "Authorisation failed.",
            Self::AclDenied => "Access denied by ACL.",
            Self::Unknown => "Unknown error.",
            Self::Errno => "Error defined by errno.",
            Self::QueueSize => "Message queue full.",
            Self::KeepAlive => "Client or broker did not communicate in the keepalive interval.",
        }
    }
}

impl fmt::Display for MqttStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.description(), self.code())
    }
}

/// Socket lifecycle hooks the primitive invokes while it owns a connection
pub trait SocketCallbacks {
    /// A connection's socket has been opened
    fn on_socket_open(&self, sock: &SocketRef);

    /// The socket is about to be closed
    fn on_socket_close(&self, sock: &SocketRef);

    /// A write would have blocked; the socket needs write-readiness notifications
    fn on_socket_register_write(&self, sock: &SocketRef);

    /// The outgoing buffer drained; write-readiness notifications are no longer needed
    fn on_socket_unregister_write(&self, sock: &SocketRef);
}

/// MQTT client primitive that can hand its socket to an external event loop
///
/// Methods take `&self`: the primitive keeps its own state behind interior
/// mutability because callbacks re-enter it on the same thread.
pub trait MqttPrimitive: 'static {
    type Error: std::error::Error + Send + Sync + 'static;

    /// Install (or with `None`, remove) the socket lifecycle callback sink
    fn set_socket_callbacks(&self, callbacks: Option<Rc<dyn SocketCallbacks>>);

    /// Process bytes pending on the socket without blocking
    fn loop_read(&self) -> MqttStatus;

    /// Flush pending outgoing bytes without blocking
    fn loop_write(&self) -> MqttStatus;

    /// Periodic housekeeping: keepalive pings, timeouts, retries
    fn loop_misc(&self) -> MqttStatus;

    /// Connect to a broker, blocking until the socket is established
    fn connect(
        &self,
        host: &str,
        port: u16,
        keepalive: u16,
        bind_address: &str,
    ) -> Result<(), Self::Error>;

    /// Record connection parameters; the socket is opened on a later reconnect
    fn connect_async(
        &self,
        host: &str,
        port: u16,
        keepalive: u16,
        bind_address: &str,
    ) -> Result<(), Self::Error>;

    /// Connect to a broker found through DNS SRV records of `domain`
    fn connect_srv(
        &self,
        domain: Option<&str>,
        keepalive: u16,
        bind_address: &str,
    ) -> Result<(), Self::Error>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_code_roundtrip_for_known_codes() {
        for code in -1..=16 {
            if code == 13 {
                continue;
            }
            assert_eq!(MqttStatus::from_code(code).code(), code, "code {code}");
        }
    }

    #[test]
    fn test_unrecognised_codes_map_to_unknown() {
        assert_eq!(MqttStatus::from_code(13), MqttStatus::Unknown);
        assert_eq!(MqttStatus::from_code(99), MqttStatus::Unknown);
        assert_eq!(MqttStatus::from_code(-42), MqttStatus::Unknown);
    }

    #[test]
    fn test_only_success_is_success() {
        assert!(MqttStatus::Success.is_success());
        assert!(!MqttStatus::Again.is_success());
        assert!(!MqttStatus::NoConn.is_success());
        assert!(!MqttStatus::KeepAlive.is_success());
    }

    #[test]
    fn test_status_display_includes_code() {
        let text = MqttStatus::ConnLost.to_string();
        assert!(text.contains("connection was lost"));
        assert!(text.ends_with("(7)"));
    }

    #[test]
    fn test_status_serde_names() {
        let json = serde_json::to_string(&MqttStatus::ConnRefused).unwrap();
        assert_eq!(json, "\"conn_refused\"");
        let parsed: MqttStatus = serde_json::from_str("\"keep_alive\"").unwrap();
        assert_eq!(parsed, MqttStatus::KeepAlive);
    }
}
