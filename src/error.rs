//! Error types for the reactor bridge
//!
//! Most failures in this crate are recovered locally: a failed descriptor
//! lookup becomes the invalid-descriptor sentinel and a failed maintenance
//! pass stops the maintenance timer. The variants below name those
//! failures so they can be logged and inspected.

use crate::transport::primitive::MqttStatus;
use thiserror::Error;

/// Main error type for adapter and managed-client operations
#[derive(Debug, Error)]
pub enum BridgeError {
    #[error("No socket is currently held")]
    NotConnected,

    #[error("Descriptor lookup failed: {0}")]
    DescriptorLookup(#[from] std::io::Error),

    #[error("Maintenance failed: {status}")]
    MaintenanceFailed { status: MqttStatus },

    #[error("MQTT client was dropped")]
    PrimitiveDropped,

    #[error("Connect failed: {0}")]
    ConnectFailed(#[source] Box<dyn std::error::Error + Send + Sync>),

    #[error("Configuration error: {0}")]
    ConfigError(#[from] crate::config::ConfigError),
}

impl BridgeError {
    /// Create maintenance failure error
    pub fn maintenance_failed(status: MqttStatus) -> Self {
        Self::MaintenanceFailed { status }
    }

    /// Wrap an error returned by the MQTT primitive's connect call
    pub fn connect_failed<E>(error: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Self::ConnectFailed(Box::new(error))
    }

    /// Whether this error only means "no socket right now"
    pub fn is_disconnected(&self) -> bool {
        matches!(self, Self::NotConnected | Self::DescriptorLookup(_))
    }
}

/// Result type for bridge operations
pub type BridgeResult<T> = Result<T, BridgeError>;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ConfigError;
    use std::io;

    #[test]
    fn test_maintenance_failed_constructor() {
        let error = BridgeError::maintenance_failed(MqttStatus::NoConn);
        assert!(matches!(
            error,
            BridgeError::MaintenanceFailed {
                status: MqttStatus::NoConn
            }
        ));
        assert!(error.to_string().starts_with("Maintenance failed:"));
        assert!(error.to_string().contains("(4)"));
    }

    #[test]
    fn test_connect_failed_keeps_source() {
        let inner = io::Error::new(io::ErrorKind::ConnectionRefused, "broker down");
        let error = BridgeError::connect_failed(inner);

        assert_eq!(error.to_string(), "Connect failed: broker down");
        let source = std::error::Error::source(&error).expect("source should be kept");
        assert_eq!(source.to_string(), "broker down");
    }

    #[test]
    fn test_io_error_converts_to_descriptor_lookup() {
        let error: BridgeError = io::Error::from(io::ErrorKind::NotConnected).into();
        assert!(matches!(error, BridgeError::DescriptorLookup(_)));
        assert!(error.is_disconnected());
    }

    #[test]
    fn test_disconnected_classification() {
        assert!(BridgeError::NotConnected.is_disconnected());
        assert!(!BridgeError::PrimitiveDropped.is_disconnected());
        assert!(!BridgeError::maintenance_failed(MqttStatus::ConnLost).is_disconnected());
    }

    #[test]
    fn test_config_error_conversion() {
        let error: BridgeError = ConfigError::InvalidConfig("bad port".to_string()).into();
        assert_eq!(
            error.to_string(),
            "Configuration error: Invalid configuration: bad port"
        );
    }
}
