//! MQTT client bound to a reactor
//!
//! [`ManagedClient`] wraps an MQTT primitive and gives every connect call
//! a fresh [`SocketAdapter`], so a connection attempt never inherits
//! registrations or timers from the one before it.

use super::adapter::SocketAdapter;
use super::primitive::{MqttPrimitive, SocketCallbacks};
use super::reactor::Reactor;
use super::socket::INVALID_DESCRIPTOR;
use crate::config::{AdapterSection, BrokerSection, ConnectMode};
use crate::error::{BridgeError, BridgeResult};
use serde::{Deserialize, Serialize};
use std::cell::RefCell;
use std::fmt;
use std::ops::Deref;
use std::os::fd::RawFd;
use std::rc::Rc;
use tracing::{debug, info};

/// Connection status as seen from the reactor side
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ConnectionStatus {
    /// A socket is open and registered
    Connected,
    /// A connect was issued but no socket is open
    Disconnected,
    /// No connect has been issued yet
    NeverConnected,
}

impl ConnectionStatus {
    /// Numeric form: 1, 0 and -1
    pub fn code(self) -> i32 {
        match self {
            Self::Connected => 1,
            Self::Disconnected => 0,
            Self::NeverConnected => -1,
        }
    }

    pub fn is_connected(self) -> bool {
        self == Self::Connected
    }
}

impl fmt::Display for ConnectionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Connected => "connected",
            Self::Disconnected => "disconnected",
            Self::NeverConnected => "never-connected",
        };
        f.write_str(name)
    }
}

/// MQTT primitive whose sockets are driven by a reactor
pub struct ManagedClient<P: MqttPrimitive, R: Reactor + ?Sized> {
    primitive: Rc<P>,
    reactor: Rc<R>,
    settings: AdapterSection,
    adapter: RefCell<Option<Rc<SocketAdapter<P, R>>>>,
}

impl<P: MqttPrimitive, R: Reactor + ?Sized> ManagedClient<P, R> {
    pub fn new(primitive: P, reactor: Rc<R>) -> Self {
        Self::with_settings(primitive, reactor, AdapterSection::default())
    }

    pub fn with_settings(primitive: P, reactor: Rc<R>, settings: AdapterSection) -> Self {
        Self {
            primitive: Rc::new(primitive),
            reactor,
            settings,
            adapter: RefCell::new(None),
        }
    }

    /// Connect immediately
    pub fn connect(
        &self,
        host: &str,
        port: u16,
        keepalive: u16,
        bind_address: &str,
    ) -> Result<(), P::Error> {
        self.install_adapter();
        debug!(host, port, keepalive, "connecting");
        self.primitive.connect(host, port, keepalive, bind_address)
    }

    /// Record connection parameters; the primitive connects later
    pub fn connect_async(
        &self,
        host: &str,
        port: u16,
        keepalive: u16,
        bind_address: &str,
    ) -> Result<(), P::Error> {
        self.install_adapter();
        debug!(host, port, keepalive, "connecting asynchronously");
        self.primitive
            .connect_async(host, port, keepalive, bind_address)
    }

    /// Connect to a broker found through DNS SRV records
    pub fn connect_srv(
        &self,
        domain: Option<&str>,
        keepalive: u16,
        bind_address: &str,
    ) -> Result<(), P::Error> {
        self.install_adapter();
        debug!(?domain, keepalive, "connecting through SRV lookup");
        self.primitive.connect_srv(domain, keepalive, bind_address)
    }

    /// Connect using a `[broker]` configuration section
    pub fn connect_with(&self, broker: &BrokerSection) -> BridgeResult<()> {
        info!(
            host = %broker.host,
            port = broker.port,
            mode = ?broker.mode,
            "connecting to broker"
        );
        let result = match broker.mode {
            ConnectMode::Blocking => self.connect(
                &broker.host,
                broker.port,
                broker.keepalive_secs,
                &broker.bind_address,
            ),
            ConnectMode::Async => self.connect_async(
                &broker.host,
                broker.port,
                broker.keepalive_secs,
                &broker.bind_address,
            ),
            ConnectMode::Srv => self.connect_srv(
                broker.srv_domain.as_deref(),
                broker.keepalive_secs,
                &broker.bind_address,
            ),
        };
        result.map_err(BridgeError::connect_failed)
    }

    pub fn connection_status(&self) -> ConnectionStatus {
        match self.adapter.borrow().as_ref() {
            None => ConnectionStatus::NeverConnected,
            Some(adapter) if adapter.has_socket() => ConnectionStatus::Connected,
            Some(_) => ConnectionStatus::Disconnected,
        }
    }

    /// Descriptor of the current socket, or [`INVALID_DESCRIPTOR`]
    pub fn descriptor(&self) -> RawFd {
        self.adapter()
            .map(|adapter| adapter.descriptor())
            .unwrap_or(INVALID_DESCRIPTOR)
    }

    /// Adapter of the latest connect call
    pub fn adapter(&self) -> Option<Rc<SocketAdapter<P, R>>> {
        self.adapter.borrow().clone()
    }

    pub fn primitive(&self) -> &Rc<P> {
        &self.primitive
    }

    pub fn reactor(&self) -> &Rc<R> {
        &self.reactor
    }

    pub fn settings(&self) -> &AdapterSection {
        &self.settings
    }

    fn install_adapter(&self) {
        let adapter = SocketAdapter::new(
            Rc::downgrade(&self.primitive),
            Rc::clone(&self.reactor),
            self.settings.clone(),
        );
        let previous = self.adapter.replace(Some(Rc::clone(&adapter)));
        if let Some(previous) = previous {
            previous.deactivate();
        }
        self.primitive
            .set_socket_callbacks(Some(adapter as Rc<dyn SocketCallbacks>));
    }
}

impl<P: MqttPrimitive, R: Reactor + ?Sized> Deref for ManagedClient<P, R> {
    type Target = P;

    fn deref(&self) -> &P {
        &self.primitive
    }
}

impl<P: MqttPrimitive, R: Reactor + ?Sized> Drop for ManagedClient<P, R> {
    fn drop(&mut self) {
        if let Some(adapter) = self.adapter.get_mut().take() {
            adapter.deactivate();
        }
        self.primitive.set_socket_callbacks(None);
    }
}

impl<P: MqttPrimitive, R: Reactor + ?Sized> fmt::Debug for ManagedClient<P, R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ManagedClient")
            .field("status", &self.connection_status())
            .field("adapter", &self.adapter())
            .finish()
    }
}
