//! Socket adapter between an MQTT primitive and a reactor
//!
//! The adapter is the only place where readiness-driven I/O and
//! time-driven maintenance meet the primitive:
//!
//! - readable / writable notifications from the reactor become
//!   `loop_read` / `loop_write` calls
//! - a repeating reactor timer becomes `loop_misc` calls
//! - socket lifecycle callbacks from the primitive keep the reactor's
//!   read set, write set and timer in step with the connection
//!
//! Everything runs on the reactor's thread. No `RefCell` borrow is held
//! across a call into the primitive or the reactor, because either may
//! call straight back into the adapter.

use super::primitive::{MqttPrimitive, MqttStatus, SocketCallbacks};
use super::reactor::{Descriptor, Reactor, TimerId};
use super::socket::{checked_fileno, Socket, SocketRef, INVALID_DESCRIPTOR};
use crate::config::AdapterSection;
use crate::error::{BridgeError, BridgeResult};
use std::cell::{Cell, RefCell};
use std::fmt;
use std::ops::ControlFlow;
use std::os::fd::RawFd;
use std::rc::{Rc, Weak};
use std::time::Duration;
use tracing::{debug, info, trace, warn};

/// Bridges reactor callbacks to one MQTT primitive for one connection attempt
pub struct SocketAdapter<P: MqttPrimitive, R: Reactor + ?Sized> {
    client: Weak<P>,
    reactor: Rc<R>,
    settings: AdapterSection,
    sock: RefCell<Option<Weak<dyn Socket>>>,
    timer: Cell<Option<TimerId>>,
    last_failure: Cell<Option<MqttStatus>>,
    this: Weak<Self>,
}

impl<P: MqttPrimitive, R: Reactor + ?Sized> SocketAdapter<P, R> {
    pub fn new(client: Weak<P>, reactor: Rc<R>, settings: AdapterSection) -> Rc<Self> {
        Rc::new_cyclic(|this| Self {
            client,
            reactor,
            settings,
            sock: RefCell::new(None),
            timer: Cell::new(None),
            last_failure: Cell::new(None),
            this: this.clone(),
        })
    }

    /// Descriptor of the held socket, or [`INVALID_DESCRIPTOR`]
    ///
    /// Lookup failures never escape; they read as "no socket".
    pub fn descriptor(&self) -> RawFd {
        match self.try_descriptor() {
            Ok(fd) => fd,
            Err(error) => {
                trace!(prefix = %self.settings.log_prefix, %error, "descriptor unavailable");
                INVALID_DESCRIPTOR
            }
        }
    }

    /// Descriptor of the held socket, with the reason when there is none
    pub fn try_descriptor(&self) -> BridgeResult<RawFd> {
        let sock = self.socket().ok_or(BridgeError::NotConnected)?;
        Ok(checked_fileno(sock.as_ref())?)
    }

    /// The reactor reports the socket readable
    pub fn on_readable(&self) {
        match self.client() {
            Ok(client) => {
                let status = client.loop_read();
                if !status.is_success() {
                    debug!(prefix = %self.settings.log_prefix, %status, "loop_read did not succeed");
                }
            }
            Err(error) => debug!(%error, "readable notification ignored"),
        }
    }

    /// The reactor reports the socket writable
    pub fn on_writable(&self) {
        match self.client() {
            Ok(client) => {
                let status = client.loop_write();
                if !status.is_success() {
                    debug!(prefix = %self.settings.log_prefix, %status, "loop_write did not succeed");
                }
            }
            Err(error) => debug!(%error, "writable notification ignored"),
        }
    }

    /// One pass of protocol housekeeping, driven by the maintenance timer
    ///
    /// Runs once when the socket opens and then on every timer firing. Any
    /// non-success status stops the timer for good; a later connect creates
    /// a fresh adapter with a fresh timer.
    pub fn maintenance_tick(&self) -> ControlFlow<()> {
        let running = self.timer.get();
        match self.run_maintenance() {
            Ok(()) => ControlFlow::Continue(()),
            Err(error) => {
                warn!(prefix = %self.settings.log_prefix, %error, "stopping maintenance timer");
                // loop_misc may have reopened the socket and started a new timer
                if let Some(id) = running {
                    if self.timer.get() == Some(id) {
                        self.timer.set(None);
                        self.reactor.cancel(id);
                    }
                }
                ControlFlow::Break(())
            }
        }
    }

    /// Stop watching the socket and stop the timer, then forget the socket
    pub fn deactivate(&self) {
        if !self.is_active() {
            return;
        }
        if let Some(descriptor) = self.as_descriptor() {
            self.reactor.remove_reader(&descriptor);
            self.reactor.remove_writer(&descriptor);
        }
        if let Some(id) = self.timer.take() {
            self.reactor.cancel(id);
        }
        self.sock.borrow_mut().take();
    }

    /// Holds a socket or a running timer
    pub fn is_active(&self) -> bool {
        self.sock.borrow().is_some() || self.timer.get().is_some()
    }

    /// Holds a socket that still exists
    pub fn has_socket(&self) -> bool {
        self.socket().is_some()
    }

    pub fn has_timer(&self) -> bool {
        self.timer.get().is_some()
    }

    pub fn maintenance_interval(&self) -> Duration {
        self.settings.maintenance_interval()
    }

    /// Status of the maintenance pass that stopped the timer, if any
    pub fn last_maintenance_failure(&self) -> Option<MqttStatus> {
        self.last_failure.get()
    }

    /// The held socket, if it still exists
    pub fn socket(&self) -> Option<SocketRef> {
        self.sock.borrow().as_ref().and_then(Weak::upgrade)
    }

    fn client(&self) -> BridgeResult<Rc<P>> {
        self.client.upgrade().ok_or(BridgeError::PrimitiveDropped)
    }

    fn as_descriptor(&self) -> Option<Rc<dyn Descriptor>> {
        self.this
            .upgrade()
            .map(|adapter| adapter as Rc<dyn Descriptor>)
    }

    fn run_maintenance(&self) -> BridgeResult<()> {
        let client = self.client()?;
        let status = client.loop_misc();
        if status.is_success() {
            Ok(())
        } else {
            self.last_failure.set(Some(status));
            Err(BridgeError::maintenance_failed(status))
        }
    }

    fn start_timer(&self) {
        if let Some(previous) = self.timer.take() {
            self.reactor.cancel(previous);
        }
        let this = self.this.clone();
        let id = self.reactor.call_every(
            self.maintenance_interval(),
            Box::new(move || match this.upgrade() {
                Some(adapter) => adapter.maintenance_tick(),
                None => ControlFlow::Break(()),
            }),
        );
        self.timer.set(Some(id));
    }
}

impl<P: MqttPrimitive, R: Reactor + ?Sized> SocketCallbacks for SocketAdapter<P, R> {
    fn on_socket_open(&self, sock: &SocketRef) {
        let fd = checked_fileno(sock.as_ref()).unwrap_or(INVALID_DESCRIPTOR);
        let _span = crate::adapter_span!(fd = fd, prefix = %self.settings.log_prefix).entered();

        *self.sock.borrow_mut() = Some(Rc::downgrade(sock));
        if let Some(descriptor) = self.as_descriptor() {
            self.reactor.add_reader(descriptor);
        }
        self.start_timer();

        info!(
            interval_ms = self.settings.maintenance_interval_ms,
            "socket opened, watching for reads"
        );

        // first housekeeping pass runs right away, then once per interval
        if self.maintenance_tick().is_break() {
            debug!("maintenance stopped on its first pass");
        }
    }

    fn on_socket_close(&self, sock: &SocketRef) {
        let fd = checked_fileno(sock.as_ref()).unwrap_or(INVALID_DESCRIPTOR);
        let _span = crate::adapter_span!(fd = fd, prefix = %self.settings.log_prefix).entered();

        if !self.is_active() {
            debug!("socket close on inactive adapter ignored");
            return;
        }
        self.deactivate();
        info!("socket closed, stopped watching and stopped maintenance");
    }

    fn on_socket_register_write(&self, _sock: &SocketRef) {
        if !self.has_socket() {
            debug!(prefix = %self.settings.log_prefix, "write registration without a socket ignored");
            return;
        }
        if let Some(descriptor) = self.as_descriptor() {
            self.reactor.add_writer(descriptor);
        }
        trace!(prefix = %self.settings.log_prefix, "watching for writes");
    }

    fn on_socket_unregister_write(&self, _sock: &SocketRef) {
        if let Some(descriptor) = self.as_descriptor() {
            self.reactor.remove_writer(&descriptor);
        }
        trace!(prefix = %self.settings.log_prefix, "stopped watching for writes");
    }
}

impl<P: MqttPrimitive, R: Reactor + ?Sized> Descriptor for SocketAdapter<P, R> {
    fn fileno(&self) -> RawFd {
        self.descriptor()
    }

    fn do_read(&self) {
        self.on_readable();
    }

    fn do_write(&self) {
        self.on_writable();
    }

    fn connection_lost(&self, reason: &str) {
        debug!(prefix = %self.settings.log_prefix, reason, "reactor dropped the adapter");
    }

    fn log_prefix(&self) -> &str {
        &self.settings.log_prefix
    }
}

impl<P: MqttPrimitive, R: Reactor + ?Sized> fmt::Debug for SocketAdapter<P, R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SocketAdapter")
            .field("prefix", &self.settings.log_prefix)
            .field("descriptor", &self.descriptor())
            .field("timer", &self.timer.get())
            .field("last_failure", &self.last_failure.get())
            .finish()
    }
}
