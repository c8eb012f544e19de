//! Network stack error types

use core::fmt;

pub type Result<T> = core::result::Result<T, NetError>;

/// Errors surfaced by the process-facing operations.
///
/// Mapping these to negative syscall returns is the marshaling layer's
/// job; inside the stack they stay structured.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NetError {
    /// bind: the port already has a socket.
    PortInUse,
    /// bind: every socket slot is taken.
    NoFreeSocket,
    /// recv: no socket is bound to the port.
    NotBound,
    /// recv: the blocked wait was cancelled (process kill).
    Cancelled,
    /// send: headers plus payload exceed one packet buffer.
    FrameTooLong,
    /// send: no memory for the outbound frame.
    NoMem,
    /// send/recv: the user-memory copy failed.
    CopyFailed,
}

impl fmt::Display for NetError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::PortInUse => write!(f, "port already bound"),
            Self::NoFreeSocket => write!(f, "no free socket slots"),
            Self::NotBound => write!(f, "port not bound"),
            Self::Cancelled => write!(f, "wait cancelled"),
            Self::FrameTooLong => write!(f, "frame exceeds buffer size"),
            Self::NoMem => write!(f, "out of packet buffers"),
            Self::CopyFailed => write!(f, "user memory copy failed"),
        }
    }
}
