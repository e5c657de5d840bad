//! The host event loop seen from the adapter's side
//!
//! A [`Reactor`] owns readiness polling and timers for a single thread.
//! Descriptors are registered by identity of their `Rc` allocation, never
//! by descriptor number, so a descriptor whose socket has already gone away
//! can still be removed.

use std::ops::ControlFlow;
use std::os::fd::RawFd;
use std::rc::Rc;
use std::time::Duration;

/// Something the reactor can watch for readiness
pub trait Descriptor {
    /// Descriptor to poll, or a negative value when there is nothing to poll
    fn fileno(&self) -> RawFd;

    /// The descriptor is readable
    fn do_read(&self);

    /// The descriptor is writable
    fn do_write(&self);

    /// The reactor dropped this descriptor, e.g. during shutdown
    fn connection_lost(&self, _reason: &str) {}

    /// Prefix the reactor uses when logging about this descriptor
    fn log_prefix(&self) -> &str {
        "descriptor"
    }
}

/// Identifier of a repeating task scheduled with [`Reactor::call_every`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TimerId(pub u64);

/// Repeating task; returning `Break` stops it
pub type RepeatingTask = Box<dyn FnMut() -> ControlFlow<()>>;

/// Single-threaded event loop with readiness sets and repeating timers
///
/// Registration calls are set operations: adding a registered descriptor or
/// removing an absent one is a no-op.
pub trait Reactor: 'static {
    fn add_reader(&self, descriptor: Rc<dyn Descriptor>);

    fn remove_reader(&self, descriptor: &Rc<dyn Descriptor>);

    fn add_writer(&self, descriptor: Rc<dyn Descriptor>);

    fn remove_writer(&self, descriptor: &Rc<dyn Descriptor>);

    /// Run `task` every `interval`, starting one interval from now
    fn call_every(&self, interval: Duration, task: RepeatingTask) -> TimerId;

    /// Stop a repeating task
    ///
    /// Unknown or finished timers are ignored. Cancelling a task from inside
    /// its own invocation is allowed and takes effect once it returns.
    fn cancel(&self, timer: TimerId);
}

/// Whether two handles refer to the same descriptor allocation
pub fn same_descriptor(a: &Rc<dyn Descriptor>, b: &Rc<dyn Descriptor>) -> bool {
    Rc::as_ptr(a) as *const () == Rc::as_ptr(b) as *const ()
}
