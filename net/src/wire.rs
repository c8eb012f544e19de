//! Wire formats: Ethernet, ARP, IPv4, UDP.
//!
//! All multi-byte fields are big-endian on the wire; addresses and ports
//! cross this module's boundary in host order. Parsing and emission work
//! on plain byte slices, so no header type ever aliases device memory.

use crate::checksum::internet_checksum;

/// Octets in a MAC address.
pub const ETH_ALEN: usize = 6;
/// Ethernet header length.
pub const ETH_HLEN: usize = 14;
/// Ethertype: IPv4.
pub const ETHTYPE_IP: u16 = 0x0800;
/// Ethertype: ARP.
pub const ETHTYPE_ARP: u16 = 0x0806;

/// ARP body length (Ethernet/IPv4 flavor).
pub const ARP_LEN: usize = 28;
/// ARP hardware type: Ethernet.
pub const ARP_HRD_ETHER: u16 = 1;
/// ARP operation: request.
pub const ARP_OP_REQUEST: u16 = 1;
/// ARP operation: reply.
pub const ARP_OP_REPLY: u16 = 2;

/// IPv4 header length (no options).
pub const IP_HLEN: usize = 20;
/// IP protocol number: UDP.
pub const IPPROTO_UDP: u8 = 17;

/// UDP header length.
pub const UDP_HLEN: usize = 8;

pub type MacAddr = [u8; ETH_ALEN];

fn get_u16(b: &[u8], off: usize) -> u16 {
    u16::from_be_bytes([b[off], b[off + 1]])
}

fn put_u16(b: &mut [u8], off: usize, v: u16) {
    b[off..off + 2].copy_from_slice(&v.to_be_bytes());
}

fn get_u32(b: &[u8], off: usize) -> u32 {
    u32::from_be_bytes([b[off], b[off + 1], b[off + 2], b[off + 3]])
}

fn put_u32(b: &mut [u8], off: usize, v: u32) {
    b[off..off + 4].copy_from_slice(&v.to_be_bytes());
}

fn get_mac(b: &[u8], off: usize) -> MacAddr {
    let mut mac = [0u8; ETH_ALEN];
    mac.copy_from_slice(&b[off..off + ETH_ALEN]);
    mac
}

/// Ethernet header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EthHeader {
    pub dst: MacAddr,
    pub src: MacAddr,
    pub ethertype: u16,
}

impl EthHeader {
    /// Parse the leading header of `frame`; `None` if it is too short.
    pub fn parse(frame: &[u8]) -> Option<Self> {
        if frame.len() < ETH_HLEN {
            return None;
        }
        Some(Self {
            dst: get_mac(frame, 0),
            src: get_mac(frame, ETH_ALEN),
            ethertype: get_u16(frame, 2 * ETH_ALEN),
        })
    }

    /// Write the header into the first [`ETH_HLEN`] bytes of `frame`.
    pub fn emit(&self, frame: &mut [u8]) {
        frame[..ETH_ALEN].copy_from_slice(&self.dst);
        frame[ETH_ALEN..2 * ETH_ALEN].copy_from_slice(&self.src);
        put_u16(frame, 2 * ETH_ALEN, self.ethertype);
    }
}

/// ARP packet body (the 28 bytes after the Ethernet header).
///
/// The hardware/protocol preamble is fixed for Ethernet + IPv4 and is
/// filled in by `emit`; `parse` skips over it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ArpPacket {
    pub op: u16,
    pub sender_mac: MacAddr,
    pub sender_ip: u32,
    pub target_mac: MacAddr,
    pub target_ip: u32,
}

impl ArpPacket {
    pub fn parse(body: &[u8]) -> Option<Self> {
        if body.len() < ARP_LEN {
            return None;
        }
        Some(Self {
            op: get_u16(body, 6),
            sender_mac: get_mac(body, 8),
            sender_ip: get_u32(body, 14),
            target_mac: get_mac(body, 18),
            target_ip: get_u32(body, 24),
        })
    }

    pub fn emit(&self, body: &mut [u8]) {
        put_u16(body, 0, ARP_HRD_ETHER);
        put_u16(body, 2, ETHTYPE_IP);
        body[4] = ETH_ALEN as u8;
        body[5] = 4; // IPv4 address length
        put_u16(body, 6, self.op);
        body[8..14].copy_from_slice(&self.sender_mac);
        put_u32(body, 14, self.sender_ip);
        body[18..24].copy_from_slice(&self.target_mac);
        put_u32(body, 24, self.target_ip);
    }
}

/// The IPv4 header fields this stack reads and writes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IpHeader {
    pub total_len: u16,
    pub ttl: u8,
    pub protocol: u8,
    pub src: u32,
    pub dst: u32,
}

impl IpHeader {
    pub fn parse(b: &[u8]) -> Option<Self> {
        if b.len() < IP_HLEN {
            return None;
        }
        Some(Self {
            total_len: get_u16(b, 2),
            ttl: b[8],
            protocol: b[9],
            src: get_u32(b, 12),
            dst: get_u32(b, 16),
        })
    }

    /// Write a 20-byte header (version 4, no options, no fragmentation)
    /// with its checksum computed over the header bytes.
    pub fn emit(&self, b: &mut [u8]) {
        b[0] = 0x45; // version 4, header length 5 words
        b[1] = 0; // type of service
        put_u16(b, 2, self.total_len);
        put_u16(b, 4, 0); // identification
        put_u16(b, 6, 0); // flags / fragment offset
        b[8] = self.ttl;
        b[9] = self.protocol;
        put_u16(b, 10, 0);
        put_u32(b, 12, self.src);
        put_u32(b, 16, self.dst);
        let sum = internet_checksum(&b[..IP_HLEN]);
        put_u16(b, 10, sum);
    }
}

/// UDP header. The length field counts header plus payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UdpHeader {
    pub sport: u16,
    pub dport: u16,
    pub len: u16,
}

impl UdpHeader {
    pub fn parse(b: &[u8]) -> Option<Self> {
        if b.len() < UDP_HLEN {
            return None;
        }
        Some(Self {
            sport: get_u16(b, 0),
            dport: get_u16(b, 2),
            len: get_u16(b, 4),
        })
    }

    /// Write the header. The checksum is emitted as zero: optional for
    /// IPv4 UDP, and never verified on receive.
    pub fn emit(&self, b: &mut [u8]) {
        put_u16(b, 0, self.sport);
        put_u16(b, 2, self.dport);
        put_u16(b, 4, self.len);
        put_u16(b, 6, 0);
    }
}
