//! Shared helpers for the in-crate test modules.

use pktbuf::PacketBuf;
use spin::{Mutex, MutexGuard};

use crate::socket::{Cancelled, WaitOps};
use crate::wire::{
    EthHeader, IpHeader, UdpHeader, ETHTYPE_IP, ETH_HLEN, IPPROTO_UDP, IP_HLEN, UDP_HLEN,
};

/// Build a well-formed inbound Ethernet/IPv4/UDP frame carrying `payload`.
pub(crate) fn udp_datagram(
    src_ip: u32,
    sport: u16,
    dport: u16,
    payload: &[u8],
) -> (PacketBuf, usize) {
    let mut frame = PacketBuf::try_new().unwrap();
    let len = ETH_HLEN + IP_HLEN + UDP_HLEN + payload.len();
    let b = frame.as_mut_slice();
    EthHeader {
        dst: [0x52, 0x54, 0x00, 0x12, 0x34, 0x56],
        src: [0x52, 0x55, 0x0a, 0x00, 0x02, 0x02],
        ethertype: ETHTYPE_IP,
    }
    .emit(b);
    IpHeader {
        total_len: (IP_HLEN + UDP_HLEN + payload.len()) as u16,
        ttl: 64,
        protocol: IPPROTO_UDP,
        src: src_ip,
        dst: u32::from_be_bytes([10, 0, 2, 15]),
    }
    .emit(&mut b[ETH_HLEN..]);
    UdpHeader {
        sport,
        dport,
        len: (UDP_HLEN + payload.len()) as u16,
    }
    .emit(&mut b[ETH_HLEN + IP_HLEN..]);
    b[ETH_HLEN + IP_HLEN + UDP_HLEN..][..payload.len()].copy_from_slice(payload);
    (frame, len)
}

pub(crate) fn udp_frame(src_ip: u32, sport: u16, dport: u16, payload: &[u8]) -> PacketBuf {
    udp_datagram(src_ip, sport, dport, payload).0
}

/// Wait hooks for tests that never block.
pub(crate) struct NoWait;

impl WaitOps for NoWait {
    fn block<'a, T>(
        &self,
        key: usize,
        _lock: &'a Mutex<T>,
        _guard: MutexGuard<'a, T>,
    ) -> core::result::Result<MutexGuard<'a, T>, Cancelled> {
        panic!("unexpected block on key {key}");
    }

    fn wake(&self, _key: usize) {}
}

/// Wait hooks that cancel the first block, letting tests observe a
/// would-have-slept receive without a second thread.
pub(crate) struct CancelWait;

impl WaitOps for CancelWait {
    fn block<'a, T>(
        &self,
        _key: usize,
        _lock: &'a Mutex<T>,
        guard: MutexGuard<'a, T>,
    ) -> core::result::Result<MutexGuard<'a, T>, Cancelled> {
        drop(guard);
        Err(Cancelled)
    }

    fn wake(&self, _key: usize) {}
}

/// Counts wakeups; blocking is still a test failure.
pub(crate) struct WakeCounter {
    count: core::sync::atomic::AtomicUsize,
}

impl WakeCounter {
    pub(crate) fn new() -> Self {
        Self {
            count: core::sync::atomic::AtomicUsize::new(0),
        }
    }

    pub(crate) fn wakes(&self) -> usize {
        self.count.load(core::sync::atomic::Ordering::SeqCst)
    }
}

impl WaitOps for WakeCounter {
    fn block<'a, T>(
        &self,
        key: usize,
        _lock: &'a Mutex<T>,
        _guard: MutexGuard<'a, T>,
    ) -> core::result::Result<MutexGuard<'a, T>, Cancelled> {
        panic!("unexpected block on key {key}");
    }

    fn wake(&self, _key: usize) {
        self.count
            .fetch_add(1, core::sync::atomic::Ordering::SeqCst);
    }
}
