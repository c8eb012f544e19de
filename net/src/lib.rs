//! Minimal in-kernel network stack.
//!
//! Demultiplexes inbound frames (ARP/IP/UDP) coming off the e1000 ring
//! driver, queues UDP datagrams on a fixed table of bound-port sockets
//! with blocking receive, and assembles outbound UDP and ARP frames.
//!
//! The syscall marshaling layer, the scheduler, and user-memory copying
//! stay outside: they plug in through [`WaitOps`] and the
//! [`UserSink`]/[`UserSource`] seams.

#![no_std]

#[cfg(test)]
extern crate std;

pub mod checksum;
pub mod error;
pub mod socket;
pub mod stack;
pub mod usercopy;
pub mod wire;

#[cfg(test)]
pub(crate) mod testutil;

pub use error::{NetError, Result};
pub use socket::{Cancelled, RecvMeta, SocketTable, WaitOps, NSOCK, SOCK_QUEUE};
pub use stack::{LocalIdentity, NetStack, Transmit};
pub use usercopy::{CopyFault, UserSink, UserSource};
