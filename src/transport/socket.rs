//! Non-owning socket handles
//!
//! The MQTT primitive owns its socket. Everything in this crate only ever
//! asks a socket for its descriptor identity, so the handle surface is a
//! single fallible lookup.

use std::io;
use std::os::fd::{AsRawFd, RawFd};
use std::rc::Rc;

/// Descriptor value reported when no usable socket is held
pub const INVALID_DESCRIPTOR: RawFd = -1;

/// An OS socket whose descriptor identity can be queried
pub trait Socket {
    /// Look up the OS descriptor backing this socket
    ///
    /// Fails when the socket has already been closed underneath the handle.
    fn fileno(&self) -> io::Result<RawFd>;
}

/// Shared handle to a socket owned by the MQTT primitive
pub type SocketRef = Rc<dyn Socket>;

impl Socket for std::net::TcpStream {
    fn fileno(&self) -> io::Result<RawFd> {
        Ok(self.as_raw_fd())
    }
}

impl Socket for std::net::UdpSocket {
    fn fileno(&self) -> io::Result<RawFd> {
        Ok(self.as_raw_fd())
    }
}

impl Socket for std::os::unix::net::UnixStream {
    fn fileno(&self) -> io::Result<RawFd> {
        Ok(self.as_raw_fd())
    }
}

/// Resolve a descriptor, mapping negative values to a lookup error
pub fn checked_fileno(socket: &dyn Socket) -> io::Result<RawFd> {
    let fd = socket.fileno()?;
    if fd < 0 {
        return Err(io::Error::new(
            io::ErrorKind::InvalidInput,
            format!("socket reported invalid descriptor {fd}"),
        ));
    }
    Ok(fd)
}
