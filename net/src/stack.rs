//! Frame dispatch and datagram assembly.
//!
//! [`NetStack`] sits between the driver and the socket table: inbound
//! frames arrive through [`FrameSink`], outbound datagrams leave through
//! a [`Transmit`] implementation. Addresses are static — there is no
//! ARP cache or routing, only a fixed local identity and gateway MAC.

use core::sync::atomic::{AtomicBool, Ordering};

use ion_e1000::{DeviceRegs, FrameSink, TxFull, E1000};
use pktbuf::PacketBuf;
use spin::Mutex;

use crate::error::{NetError, Result};
use crate::socket::{RecvMeta, SocketTable, WaitOps};
use crate::usercopy::{UserSink, UserSource};
use crate::wire::{
    ArpPacket, EthHeader, IpHeader, UdpHeader, ARP_LEN, ARP_OP_REPLY, ARP_OP_REQUEST,
    ETHTYPE_ARP, ETHTYPE_IP, ETH_HLEN, IPPROTO_UDP, IP_HLEN, UDP_HLEN,
};

/// Time-to-live stamped on every outbound IP header.
const SEND_TTL: u8 = 100;

/// The static addresses this host answers to.
#[derive(Debug, Clone, Copy)]
pub struct LocalIdentity {
    pub mac: [u8; 6],
    pub ip: u32,
    /// Every outbound frame is addressed to this MAC.
    pub peer_mac: [u8; 6],
}

impl LocalIdentity {
    /// The addresses QEMU's user-mode network assigns a guest: the guest
    /// at 10.0.2.15 talking through the gateway at 10.0.2.2.
    pub const fn qemu_default() -> Self {
        Self {
            mac: [0x52, 0x54, 0x00, 0x12, 0x34, 0x56],
            ip: u32::from_be_bytes([10, 0, 2, 15]),
            peer_mac: [0x52, 0x55, 0x0a, 0x00, 0x02, 0x02],
        }
    }
}

/// Outbound frame seam between the stack and the driver.
pub trait Transmit {
    fn transmit(&self, frame: PacketBuf, len: usize) -> core::result::Result<(), TxFull>;
}

impl<R: DeviceRegs> Transmit for E1000<R> {
    fn transmit(&self, frame: PacketBuf, len: usize) -> core::result::Result<(), TxFull> {
        E1000::transmit(self, frame, len)
    }
}

/// The gateway probes once at startup; after the first reply the
/// responder goes quiet.
enum ArpState {
    AwaitingFirst,
    Replied,
}

/// Protocol dispatch plus the socket table.
pub struct NetStack<T: Transmit, W: WaitOps> {
    ident: LocalIdentity,
    sockets: SocketTable<W>,
    tx: T,
    arp: Mutex<ArpState>,
    ip_seen: AtomicBool,
}

impl<T: Transmit, W: WaitOps> NetStack<T, W> {
    pub fn new(ident: LocalIdentity, tx: T, wait: W) -> Self {
        Self {
            ident,
            sockets: SocketTable::new(wait),
            tx,
            arp: Mutex::new(ArpState::AwaitingFirst),
            ip_seen: AtomicBool::new(false),
        }
    }

    pub fn bind(&self, port: u16) -> Result<()> {
        self.sockets.bind(port)
    }

    pub fn unbind(&self, port: u16) -> Result<()> {
        self.sockets.unbind(port)
    }

    pub fn recv(&self, port: u16, max_len: usize, sink: &mut impl UserSink) -> Result<RecvMeta> {
        self.sockets.recv(port, max_len, sink)
    }

    /// Assemble and transmit a UDP datagram of `len` payload bytes read
    /// from `payload`.
    ///
    /// Delivery is fire-and-forget: a full transmit ring drops the frame
    /// and still reports success, exactly as the wire itself might.
    pub fn send(
        &self,
        sport: u16,
        dst_ip: u32,
        dport: u16,
        payload: &mut impl UserSource,
        len: usize,
    ) -> Result<()> {
        let total = ETH_HLEN + IP_HLEN + UDP_HLEN + len;
        if total > PacketBuf::SIZE {
            return Err(NetError::FrameTooLong);
        }
        let Some(mut frame) = PacketBuf::try_new() else {
            return Err(NetError::NoMem);
        };
        {
            let b = frame.as_mut_slice();
            payload
                .read_into(&mut b[ETH_HLEN + IP_HLEN + UDP_HLEN..][..len])
                .map_err(|_| NetError::CopyFailed)?;
            EthHeader {
                dst: self.ident.peer_mac,
                src: self.ident.mac,
                ethertype: ETHTYPE_IP,
            }
            .emit(b);
            IpHeader {
                total_len: (IP_HLEN + UDP_HLEN + len) as u16,
                ttl: SEND_TTL,
                protocol: IPPROTO_UDP,
                src: self.ident.ip,
                dst: dst_ip,
            }
            .emit(&mut b[ETH_HLEN..]);
            UdpHeader {
                sport,
                dport,
                len: (UDP_HLEN + len) as u16,
            }
            .emit(&mut b[ETH_HLEN + IP_HLEN..]);
        }
        if let Err(TxFull(frame)) = self.tx.transmit(frame, total) {
            log::debug!("udp: transmit ring full, dropping outbound datagram");
            drop(frame);
        }
        Ok(())
    }

    fn arp_rx(&self, frame: PacketBuf, len: usize) {
        let req = {
            let bytes = &frame.as_slice()[..len];
            match ArpPacket::parse(&bytes[ETH_HLEN..]) {
                Some(req) => req,
                None => return,
            }
        };
        drop(frame);
        if req.op != ARP_OP_REQUEST || req.target_ip != self.ident.ip {
            return;
        }

        let mut state = self.arp.lock();
        if matches!(*state, ArpState::Replied) {
            return;
        }
        *state = ArpState::Replied;
        drop(state);
        log::info!("arp: received an ARP packet");

        let Some(mut reply) = PacketBuf::try_new() else {
            log::warn!("arp: no memory for reply frame");
            return;
        };
        {
            let b = reply.as_mut_slice();
            EthHeader {
                dst: req.sender_mac,
                src: self.ident.mac,
                ethertype: ETHTYPE_ARP,
            }
            .emit(b);
            ArpPacket {
                op: ARP_OP_REPLY,
                sender_mac: self.ident.mac,
                sender_ip: self.ident.ip,
                target_mac: req.sender_mac,
                target_ip: req.sender_ip,
            }
            .emit(&mut b[ETH_HLEN..]);
        }
        if self.tx.transmit(reply, ETH_HLEN + ARP_LEN).is_err() {
            log::warn!("arp: transmit ring full, reply dropped");
        }
    }

    fn ip_rx(&self, frame: PacketBuf, len: usize) {
        let dport = {
            let bytes = &frame.as_slice()[..len];
            let Some(ip) = IpHeader::parse(&bytes[ETH_HLEN..]) else {
                return;
            };
            if ip.protocol != IPPROTO_UDP {
                log::trace!("ip: dropping protocol {}", ip.protocol);
                return;
            }
            if len < ETH_HLEN + IP_HLEN + UDP_HLEN {
                return;
            }
            let Some(udp) = UdpHeader::parse(&bytes[ETH_HLEN + IP_HLEN..]) else {
                return;
            };
            udp.dport
        };
        if !self.ip_seen.swap(true, Ordering::Relaxed) {
            log::info!("ip: received an IP packet");
        }
        self.sockets.deliver(dport, frame);
    }
}

impl<T: Transmit, W: WaitOps> FrameSink for NetStack<T, W> {
    /// Classify one received frame and hand it to the matching protocol
    /// handler. Ownership of `frame` transfers here; anything that is not
    /// a well-formed ARP or IP frame is released on the spot.
    fn on_frame(&self, frame: PacketBuf, len: usize) {
        let len = len.min(PacketBuf::SIZE);
        let Some(eth) = EthHeader::parse(&frame.as_slice()[..len]) else {
            log::trace!("eth: runt frame ({len} bytes)");
            return;
        };
        match eth.ethertype {
            ETHTYPE_ARP if len >= ETH_HLEN + ARP_LEN => self.arp_rx(frame, len),
            ETHTYPE_IP if len >= ETH_HLEN + IP_HLEN => self.ip_rx(frame, len),
            other => log::trace!("eth: dropping ethertype {other:#06x}"),
        }
    }
}
