//! Mock implementations for testing
//!
//! Provides a mock MQTT primitive, a mock socket and a manually driven
//! reactor so adapter behavior can be tested without a broker, a network or
//! a real event loop.

use crate::transport::primitive::{MqttPrimitive, MqttStatus, SocketCallbacks};
use crate::transport::reactor::{Descriptor, Reactor, RepeatingTask, TimerId};
use crate::transport::socket::{Socket, SocketRef};
use std::cell::{Cell, RefCell};
use std::collections::{BTreeMap, VecDeque};
use std::io;
use std::ops::ControlFlow;
use std::os::fd::RawFd;
use std::rc::Rc;
use std::time::Duration;
use thiserror::Error;

/// Socket with a fixed descriptor that can be marked closed
#[derive(Debug)]
pub struct MockSocket {
    fd: RawFd,
    closed: Cell<bool>,
}

impl MockSocket {
    pub fn new(fd: RawFd) -> Self {
        Self {
            fd,
            closed: Cell::new(false),
        }
    }

    pub fn fd(&self) -> RawFd {
        self.fd
    }

    /// Make descriptor lookups fail from now on
    pub fn close(&self) {
        self.closed.set(true);
    }

    pub fn is_closed(&self) -> bool {
        self.closed.get()
    }
}

impl Socket for MockSocket {
    fn fileno(&self) -> io::Result<RawFd> {
        if self.closed.get() {
            Err(io::Error::new(io::ErrorKind::Other, "bad file descriptor"))
        } else {
            Ok(self.fd)
        }
    }
}

/// Calls recorded by [`MockMqttClient`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MockCall {
    Connect {
        host: String,
        port: u16,
        keepalive: u16,
        bind_address: String,
    },
    ConnectAsync {
        host: String,
        port: u16,
        keepalive: u16,
        bind_address: String,
    },
    ConnectSrv {
        domain: Option<String>,
        keepalive: u16,
        bind_address: String,
    },
    Reconnect,
    LoopRead,
    LoopWrite,
    LoopMisc,
}

/// Error returned by [`MockMqttClient`] connects when told to fail
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("mock connect failure: {0}")]
pub struct MockMqttError(pub String);

/// Scriptable MQTT primitive
///
/// Socket lifecycle is simulated by invoking the installed callbacks the
/// way a real client does: the old socket is closed before a new one is
/// opened, and the close callback runs before the socket itself is closed.
/// A `ConnLost` read status also closes the socket.
pub struct MockMqttClient {
    callbacks: RefCell<Option<Rc<dyn SocketCallbacks>>>,
    socket: RefCell<Option<Rc<MockSocket>>>,
    calls: RefCell<Vec<MockCall>>,
    read_status: Cell<MqttStatus>,
    write_status: Cell<MqttStatus>,
    misc_statuses: RefCell<VecDeque<MqttStatus>>,
    connect_error: RefCell<Option<String>>,
    auto_open_fd: Cell<Option<RawFd>>,
    close_on_maintenance_failure: Cell<bool>,
}

impl Default for MockMqttClient {
    fn default() -> Self {
        Self::new()
    }
}

impl MockMqttClient {
    pub fn new() -> Self {
        Self {
            callbacks: RefCell::new(None),
            socket: RefCell::new(None),
            calls: RefCell::new(Vec::new()),
            read_status: Cell::new(MqttStatus::Success),
            write_status: Cell::new(MqttStatus::Success),
            misc_statuses: RefCell::new(VecDeque::new()),
            connect_error: RefCell::new(None),
            auto_open_fd: Cell::new(None),
            close_on_maintenance_failure: Cell::new(false),
        }
    }

    /// Open a socket with descriptor `fd` whenever a connect establishes one
    pub fn with_auto_open(self, fd: RawFd) -> Self {
        self.auto_open_fd.set(Some(fd));
        self
    }

    /// Make every connect call fail with `message`
    pub fn fail_connect(&self, message: impl Into<String>) {
        *self.connect_error.borrow_mut() = Some(message.into());
    }

    pub fn clear_connect_failure(&self) {
        self.connect_error.borrow_mut().take();
    }

    pub fn set_read_status(&self, status: MqttStatus) {
        self.read_status.set(status);
    }

    pub fn set_write_status(&self, status: MqttStatus) {
        self.write_status.set(status);
    }

    /// Status for a future `loop_misc` call; once the queue is empty calls succeed
    pub fn queue_misc_status(&self, status: MqttStatus) {
        self.misc_statuses.borrow_mut().push_back(status);
    }

    /// Close the socket from inside `loop_misc` when it reports a failure
    pub fn close_socket_on_maintenance_failure(&self, enabled: bool) {
        self.close_on_maintenance_failure.set(enabled);
    }

    /// Open a socket and announce it, closing any previous one first
    pub fn open_socket(&self, fd: RawFd) -> Rc<MockSocket> {
        self.close_socket();
        let mock = Rc::new(MockSocket::new(fd));
        *self.socket.borrow_mut() = Some(Rc::clone(&mock));
        let sock: SocketRef = mock.clone();
        if let Some(callbacks) = self.callbacks() {
            callbacks.on_socket_open(&sock);
        }
        mock
    }

    /// Announce and close the current socket, if any
    pub fn close_socket(&self) {
        let Some(mock) = self.socket.borrow_mut().take() else {
            return;
        };
        let sock: SocketRef = mock.clone();
        if let Some(callbacks) = self.callbacks() {
            callbacks.on_socket_close(&sock);
        }
        mock.close();
    }

    /// Pretend a write would block
    pub fn block_writes(&self) {
        if let (Some(sock), Some(callbacks)) = (self.current_socket(), self.callbacks()) {
            callbacks.on_socket_register_write(&sock);
        }
    }

    /// Pretend the outgoing buffer drained
    pub fn unblock_writes(&self) {
        if let (Some(sock), Some(callbacks)) = (self.current_socket(), self.callbacks()) {
            callbacks.on_socket_unregister_write(&sock);
        }
    }

    /// Open a socket using the parameters of an earlier `connect_async`
    pub fn reconnect(&self) -> Result<(), MockMqttError> {
        self.record(MockCall::Reconnect);
        self.establish()
    }

    pub fn socket(&self) -> Option<Rc<MockSocket>> {
        self.socket.borrow().clone()
    }

    pub fn has_callbacks(&self) -> bool {
        self.callbacks.borrow().is_some()
    }

    pub fn calls(&self) -> Vec<MockCall> {
        self.calls.borrow().clone()
    }

    pub fn read_calls(&self) -> usize {
        self.count(|call| matches!(call, MockCall::LoopRead))
    }

    pub fn write_calls(&self) -> usize {
        self.count(|call| matches!(call, MockCall::LoopWrite))
    }

    pub fn misc_calls(&self) -> usize {
        self.count(|call| matches!(call, MockCall::LoopMisc))
    }

    pub fn clear_history(&self) {
        self.calls.borrow_mut().clear();
    }

    fn count(&self, predicate: impl Fn(&MockCall) -> bool) -> usize {
        self.calls.borrow().iter().filter(|call| predicate(*call)).count()
    }

    fn record(&self, call: MockCall) {
        self.calls.borrow_mut().push(call);
    }

    fn callbacks(&self) -> Option<Rc<dyn SocketCallbacks>> {
        self.callbacks.borrow().clone()
    }

    fn current_socket(&self) -> Option<SocketRef> {
        self.socket
            .borrow()
            .as_ref()
            .map(|mock| Rc::clone(mock) as SocketRef)
    }

    fn check_connect(&self) -> Result<(), MockMqttError> {
        match self.connect_error.borrow().as_ref() {
            Some(message) => Err(MockMqttError(message.clone())),
            None => Ok(()),
        }
    }

    fn establish(&self) -> Result<(), MockMqttError> {
        self.check_connect()?;
        self.close_socket();
        if let Some(fd) = self.auto_open_fd.get() {
            self.open_socket(fd);
        }
        Ok(())
    }
}

impl MqttPrimitive for MockMqttClient {
    type Error = MockMqttError;

    fn set_socket_callbacks(&self, callbacks: Option<Rc<dyn SocketCallbacks>>) {
        *self.callbacks.borrow_mut() = callbacks;
    }

    fn loop_read(&self) -> MqttStatus {
        self.record(MockCall::LoopRead);
        let status = self.read_status.get();
        if status == MqttStatus::ConnLost {
            self.close_socket();
        }
        status
    }

    fn loop_write(&self) -> MqttStatus {
        self.record(MockCall::LoopWrite);
        self.write_status.get()
    }

    fn loop_misc(&self) -> MqttStatus {
        self.record(MockCall::LoopMisc);
        let status = self
            .misc_statuses
            .borrow_mut()
            .pop_front()
            .unwrap_or(MqttStatus::Success);
        if !status.is_success() && self.close_on_maintenance_failure.get() {
            self.close_socket();
        }
        status
    }

    fn connect(
        &self,
        host: &str,
        port: u16,
        keepalive: u16,
        bind_address: &str,
    ) -> Result<(), Self::Error> {
        self.record(MockCall::Connect {
            host: host.to_string(),
            port,
            keepalive,
            bind_address: bind_address.to_string(),
        });
        self.establish()
    }

    fn connect_async(
        &self,
        host: &str,
        port: u16,
        keepalive: u16,
        bind_address: &str,
    ) -> Result<(), Self::Error> {
        self.record(MockCall::ConnectAsync {
            host: host.to_string(),
            port,
            keepalive,
            bind_address: bind_address.to_string(),
        });
        self.check_connect()
    }

    fn connect_srv(
        &self,
        domain: Option<&str>,
        keepalive: u16,
        bind_address: &str,
    ) -> Result<(), Self::Error> {
        self.record(MockCall::ConnectSrv {
            domain: domain.map(str::to_string),
            keepalive,
            bind_address: bind_address.to_string(),
        });
        self.establish()
    }
}

/// Registration call received by [`ManualReactor`]
///
/// Descriptor numbers are read when the call arrives.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReactorEvent {
    AddReader(RawFd),
    RemoveReader(RawFd),
    AddWriter(RawFd),
    RemoveWriter(RawFd),
    Schedule(TimerId),
    Cancel(TimerId),
}

struct ManualTimer {
    interval: Duration,
    due: Duration,
    task: Option<RepeatingTask>,
}

/// Deterministic reactor driven by hand
///
/// Time is virtual and only moves through [`ManualReactor::advance`].
/// Readiness is delivered with [`ManualReactor::notify_readable`] and
/// [`ManualReactor::notify_writable`]. Zero intervals run as 1 ms.
pub struct ManualReactor {
    now: Cell<Duration>,
    readers: RefCell<Vec<Rc<dyn Descriptor>>>,
    writers: RefCell<Vec<Rc<dyn Descriptor>>>,
    timers: RefCell<BTreeMap<TimerId, ManualTimer>>,
    next_timer: Cell<u64>,
    ticks: Cell<u64>,
    events: RefCell<Vec<ReactorEvent>>,
}

impl Default for ManualReactor {
    fn default() -> Self {
        Self::new()
    }
}

impl ManualReactor {
    pub fn new() -> Self {
        Self {
            now: Cell::new(Duration::ZERO),
            readers: RefCell::new(Vec::new()),
            writers: RefCell::new(Vec::new()),
            timers: RefCell::new(BTreeMap::new()),
            next_timer: Cell::new(1),
            ticks: Cell::new(0),
            events: RefCell::new(Vec::new()),
        }
    }

    /// Virtual time elapsed since creation
    pub fn now(&self) -> Duration {
        self.now.get()
    }

    /// Move time forward, firing due timers in order; returns how many fired
    pub fn advance(&self, by: Duration) -> usize {
        let target = self.now.get() + by;
        let mut fired = 0;
        while let Some((id, due)) = self.next_due(target) {
            self.now.set(due);
            if self.fire(id) {
                fired += 1;
            }
        }
        self.now.set(target);
        fired
    }

    /// Deliver a readable notification to every registered reader
    pub fn notify_readable(&self) -> usize {
        let snapshot = self.readers.borrow().clone();
        let mut delivered = 0;
        for descriptor in snapshot {
            // an earlier callback may have unregistered it
            if contains(&self.readers.borrow(), &descriptor) {
                descriptor.do_read();
                delivered += 1;
            }
        }
        delivered
    }

    /// Deliver a writable notification to every registered writer
    pub fn notify_writable(&self) -> usize {
        let snapshot = self.writers.borrow().clone();
        let mut delivered = 0;
        for descriptor in snapshot {
            if contains(&self.writers.borrow(), &descriptor) {
                descriptor.do_write();
                delivered += 1;
            }
        }
        delivered
    }

    /// Drop every registration and timer, telling descriptors why
    pub fn shutdown(&self, reason: &str) {
        let readers = std::mem::take(&mut *self.readers.borrow_mut());
        let writers = std::mem::take(&mut *self.writers.borrow_mut());
        let timers = std::mem::take(&mut *self.timers.borrow_mut());
        drop(timers);

        let mut notified: Vec<Rc<dyn Descriptor>> = Vec::new();
        for descriptor in readers.into_iter().chain(writers) {
            if !contains(&notified, &descriptor) {
                descriptor.connection_lost(reason);
                notified.push(descriptor);
            }
        }
    }

    pub fn is_reading<D: ?Sized>(&self, descriptor: &Rc<D>) -> bool {
        contains(&self.readers.borrow(), descriptor)
    }

    pub fn is_writing<D: ?Sized>(&self, descriptor: &Rc<D>) -> bool {
        contains(&self.writers.borrow(), descriptor)
    }

    pub fn reader_count(&self) -> usize {
        self.readers.borrow().len()
    }

    pub fn writer_count(&self) -> usize {
        self.writers.borrow().len()
    }

    /// Descriptors currently watched for reads
    pub fn reader_fds(&self) -> Vec<RawFd> {
        let snapshot = self.readers.borrow().clone();
        snapshot.iter().map(|descriptor| descriptor.fileno()).collect()
    }

    pub fn timer_count(&self) -> usize {
        self.timers.borrow().len()
    }

    /// Total timer invocations so far
    pub fn ticks_fired(&self) -> u64 {
        self.ticks.get()
    }

    /// Number of add/remove/schedule/cancel calls received
    pub fn registration_calls(&self) -> usize {
        self.events.borrow().len()
    }

    /// Registration calls in arrival order
    pub fn events(&self) -> Vec<ReactorEvent> {
        self.events.borrow().clone()
    }

    pub fn clear_events(&self) {
        self.events.borrow_mut().clear();
    }

    fn record(&self, event: ReactorEvent) {
        self.events.borrow_mut().push(event);
    }

    fn next_due(&self, target: Duration) -> Option<(TimerId, Duration)> {
        self.timers
            .borrow()
            .iter()
            .filter(|(_, timer)| timer.task.is_some() && timer.due <= target)
            .min_by_key(|(id, timer)| (timer.due, **id))
            .map(|(id, timer)| (*id, timer.due))
    }

    fn fire(&self, id: TimerId) -> bool {
        let task = self
            .timers
            .borrow_mut()
            .get_mut(&id)
            .and_then(|timer| timer.task.take());
        let Some(mut task) = task else {
            return false;
        };

        self.ticks.set(self.ticks.get() + 1);
        let flow = task();

        // the task may have cancelled itself while running
        let finished = {
            let mut timers = self.timers.borrow_mut();
            match (flow, timers.get_mut(&id)) {
                (ControlFlow::Continue(()), Some(timer)) => {
                    timer.due += timer.interval;
                    timer.task = Some(task);
                    None
                }
                _ => Some(task),
            }
        };
        if finished.is_some() {
            self.timers.borrow_mut().remove(&id);
        }
        // dropped outside the borrow
        drop(finished);
        true
    }
}

impl Reactor for ManualReactor {
    fn add_reader(&self, descriptor: Rc<dyn Descriptor>) {
        self.record(ReactorEvent::AddReader(descriptor.fileno()));
        let mut readers = self.readers.borrow_mut();
        if !contains(&readers, &descriptor) {
            readers.push(descriptor);
        }
    }

    fn remove_reader(&self, descriptor: &Rc<dyn Descriptor>) {
        self.record(ReactorEvent::RemoveReader(descriptor.fileno()));
        let removed = remove(&mut self.readers.borrow_mut(), descriptor);
        drop(removed);
    }

    fn add_writer(&self, descriptor: Rc<dyn Descriptor>) {
        self.record(ReactorEvent::AddWriter(descriptor.fileno()));
        let mut writers = self.writers.borrow_mut();
        if !contains(&writers, &descriptor) {
            writers.push(descriptor);
        }
    }

    fn remove_writer(&self, descriptor: &Rc<dyn Descriptor>) {
        self.record(ReactorEvent::RemoveWriter(descriptor.fileno()));
        let removed = remove(&mut self.writers.borrow_mut(), descriptor);
        drop(removed);
    }

    fn call_every(&self, interval: Duration, task: RepeatingTask) -> TimerId {
        let interval = interval.max(Duration::from_millis(1));
        let id = TimerId(self.next_timer.get());
        self.next_timer.set(id.0 + 1);
        self.record(ReactorEvent::Schedule(id));
        self.timers.borrow_mut().insert(
            id,
            ManualTimer {
                interval,
                due: self.now.get() + interval,
                task: Some(task),
            },
        );
        id
    }

    fn cancel(&self, timer: TimerId) {
        self.record(ReactorEvent::Cancel(timer));
        let removed = self.timers.borrow_mut().remove(&timer);
        drop(removed);
    }
}

fn contains<D: ?Sized>(set: &[Rc<dyn Descriptor>], descriptor: &Rc<D>) -> bool {
    let target = Rc::as_ptr(descriptor) as *const ();
    set.iter()
        .any(|entry| Rc::as_ptr(entry) as *const () == target)
}

fn remove(set: &mut Vec<Rc<dyn Descriptor>>, descriptor: &Rc<dyn Descriptor>) -> Vec<Rc<dyn Descriptor>> {
    let target = Rc::as_ptr(descriptor) as *const ();
    let mut removed = Vec::new();
    let mut index = 0;
    while index < set.len() {
        if Rc::as_ptr(&set[index]) as *const () == target {
            removed.push(set.remove(index));
        } else {
            index += 1;
        }
    }
    removed
}
