//! Bound-port datagram sockets.
//!
//! A fixed table of [`NSOCK`] slots. Each bound slot owns a bounded FIFO
//! of received frames; readers block on the slot's wait key while the
//! queue is empty. Lock order: the registry lock is taken before any slot
//! lock and is never held while blocking.

use core::array;

use pktbuf::PacketBuf;
use spin::{Mutex, MutexGuard};

use crate::error::{NetError, Result};
use crate::usercopy::UserSink;
use crate::wire::{IpHeader, UdpHeader, ETH_HLEN, IP_HLEN, UDP_HLEN};

/// Socket table capacity.
pub const NSOCK: usize = 16;
/// Per-socket receive queue depth.
pub const SOCK_QUEUE: usize = 16;

/// A blocked wait ended without a wakeup.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Cancelled;

/// Scheduler hooks for blocking receives.
///
/// `block` must atomically release the slot lock, suspend the caller
/// until [`WaitOps::wake`] is called with the same key (or the process is
/// cancelled), and reacquire the lock before returning — the monitor
/// contract that rules out missed wakeups. Implementations register the
/// waiter on `key` before dropping the guard.
pub trait WaitOps {
    fn block<'a, T>(
        &self,
        key: usize,
        lock: &'a Mutex<T>,
        guard: MutexGuard<'a, T>,
    ) -> core::result::Result<MutexGuard<'a, T>, Cancelled>;

    /// Wake every waiter blocked on `key`.
    fn wake(&self, key: usize);
}

/// Source address and size of a delivered datagram (host byte order).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecvMeta {
    pub src_ip: u32,
    pub src_port: u16,
    pub len: usize,
}

/// One slot's receive queue: a ring of owned frames.
struct SockQueue {
    queue: [Option<PacketBuf>; SOCK_QUEUE],
    r: usize,
    w: usize,
}

impl SockQueue {
    fn is_empty(&self) -> bool {
        self.r == self.w
    }

    fn is_full(&self) -> bool {
        (self.w + 1) % SOCK_QUEUE == self.r
    }

    fn push(&mut self, frame: PacketBuf) -> core::result::Result<(), PacketBuf> {
        if self.is_full() {
            return Err(frame);
        }
        self.queue[self.w] = Some(frame);
        self.w = (self.w + 1) % SOCK_QUEUE;
        Ok(())
    }

    fn pop(&mut self) -> Option<PacketBuf> {
        if self.is_empty() {
            return None;
        }
        let frame = self.queue[self.r].take();
        self.r = (self.r + 1) % SOCK_QUEUE;
        frame
    }

    fn reset(&mut self) {
        for slot in self.queue.iter_mut() {
            *slot = None;
        }
        self.r = 0;
        self.w = 0;
    }
}

/// Fixed-capacity registry of bound ports.
pub struct SocketTable<W: WaitOps> {
    /// Slot index -> bound port. Guarded by the registry lock.
    registry: Mutex<[Option<u16>; NSOCK]>,
    slots: [Mutex<SockQueue>; NSOCK],
    wait: W,
}

impl<W: WaitOps> SocketTable<W> {
    pub fn new(wait: W) -> Self {
        Self {
            registry: Mutex::new([None; NSOCK]),
            slots: array::from_fn(|_| {
                Mutex::new(SockQueue {
                    queue: array::from_fn(|_| None),
                    r: 0,
                    w: 0,
                })
            }),
            wait,
        }
    }

    /// Bind `port`, claiming the first free slot.
    pub fn bind(&self, port: u16) -> Result<()> {
        let mut map = self.registry.lock();
        if map.iter().any(|b| *b == Some(port)) {
            return Err(NetError::PortInUse);
        }
        let Some(free) = map.iter().position(|b| b.is_none()) else {
            return Err(NetError::NoFreeSocket);
        };
        map[free] = Some(port);
        // A freshly bound slot always starts with an empty queue.
        self.slots[free].lock().reset();
        Ok(())
    }

    /// Release the socket bound to `port`, dropping everything still
    /// queued. Unbinding a port that was never bound is a no-op.
    pub fn unbind(&self, port: u16) -> Result<()> {
        let mut map = self.registry.lock();
        if let Some(i) = map.iter().position(|b| *b == Some(port)) {
            let mut q = self.slots[i].lock();
            q.reset();
            drop(q);
            map[i] = None;
        }
        Ok(())
    }

    /// Queue an inbound frame for the socket bound to `dport`.
    ///
    /// Ownership of `frame` moves into the queue on success; on an
    /// unbound port or a full queue the frame is dropped here — UDP
    /// promises no delivery and there is no feedback channel.
    pub fn deliver(&self, dport: u16, frame: PacketBuf) {
        let map = self.registry.lock();
        let Some(i) = map.iter().position(|b| *b == Some(dport)) else {
            log::debug!("udp: no socket bound to port {dport}, dropping");
            return;
        };
        let mut q = self.slots[i].lock();
        drop(map);
        match q.push(frame) {
            Ok(()) => self.wait.wake(i),
            Err(frame) => {
                log::debug!("udp: queue full on port {dport}, dropping");
                drop(frame);
            }
        }
    }

    /// Dequeue the next datagram for `dport`, blocking while the queue is
    /// empty.
    ///
    /// At most `max_len` payload bytes go through `sink`; the returned
    /// metadata carries the source address and the copied length, host
    /// order. The dequeued frame is released on every path out of this
    /// function, including a failed copy.
    pub fn recv(
        &self,
        dport: u16,
        max_len: usize,
        sink: &mut impl UserSink,
    ) -> Result<RecvMeta> {
        let slot = {
            let map = self.registry.lock();
            match map.iter().position(|b| *b == Some(dport)) {
                Some(i) => i,
                None => return Err(NetError::NotBound),
            }
        };

        let mut q = self.slots[slot].lock();
        let frame = loop {
            if let Some(frame) = q.pop() {
                break frame;
            }
            q = match self.wait.block(slot, &self.slots[slot], q) {
                Ok(guard) => guard,
                Err(Cancelled) => return Err(NetError::Cancelled),
            };
        };
        // Header parsing and the user copy happen outside the slot lock.
        drop(q);

        let bytes = frame.as_slice();
        // A queued frame is a full page, so the header reads cannot run
        // out of bytes; the dispatcher already classified it as UDP.
        let Some(ip) = IpHeader::parse(&bytes[ETH_HLEN..]) else {
            return Err(NetError::CopyFailed);
        };
        let Some(udp) = UdpHeader::parse(&bytes[ETH_HLEN + IP_HLEN..]) else {
            return Err(NetError::CopyFailed);
        };

        let payload_off = ETH_HLEN + IP_HLEN + UDP_HLEN;
        // The length field arrived off the wire; clamp it to the buffer.
        let payload_len = (udp.len as usize)
            .saturating_sub(UDP_HLEN)
            .min(bytes.len() - payload_off);
        let copy_len = payload_len.min(max_len);

        if sink.write(&bytes[payload_off..payload_off + copy_len]).is_err() {
            return Err(NetError::CopyFailed); // frame still drops below
        }

        Ok(RecvMeta {
            src_ip: ip.src,
            src_port: udp.sport,
            len: copy_len,
        })
    }
}
